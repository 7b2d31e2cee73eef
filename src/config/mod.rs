//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{CliArgs, Command, EngineOverrides, RenderArgs, ServeArgs, ServeOverrides};

use std::{
    net::SocketAddr,
    num::NonZeroU64,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::{
    application::{
        convert::{
            DEFAULT_CLOSE_TIMEOUT, DEFAULT_COMPLETION_TIMEOUT, DEFAULT_LAUNCH_TIMEOUT,
            DEFAULT_LOAD_TIMEOUT, DEFAULT_POLL_INTERVAL, DEFAULT_PRINT_TIMEOUT,
            DEFAULT_SETTLE_DELAY, RenderTimings,
        },
        wait::{CompletionWaitPolicy, WaitTimings},
    },
    infra::engine::{DeploymentMode, LaunchProfile},
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "stampa";
const ENV_PREFIX: &str = "STAMPA";
/// Port variable injected by hosting platforms; applied after `STAMPA__*` variables.
const PLATFORM_PORT_VAR: &str = "PORT";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_BODY_LIMIT_BYTES: u64 = 50 * 1024 * 1024;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
/// Slack added on top of the longest step budget for individual DevTools requests.
const ENGINE_REQUEST_SLACK: Duration = Duration::from_secs(5);

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub engine: EngineSettings,
    pub render: RenderSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub body_limit_bytes: NonZeroU64,
    pub platform: String,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub mode: DeploymentMode,
    pub executable: Option<PathBuf>,
    pub user_data_root: PathBuf,
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub wait_policy: CompletionWaitPolicy,
    pub timings: RenderTimings,
}

impl Settings {
    /// Launch profile for the configured engine.
    pub fn launch_profile(&self) -> LaunchProfile {
        let timings = &self.render.timings;
        let request_timeout =
            timings.load_timeout.max(timings.print_timeout) + ENGINE_REQUEST_SLACK;
        LaunchProfile::for_mode(
            self.engine.mode,
            self.engine.executable.clone(),
            self.engine.user_data_root.clone(),
            &self.engine.extra_args,
            request_timeout,
        )
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_platform_port(std::env::var(PLATFORM_PORT_VAR).ok())?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Render(args)) => raw.apply_engine_overrides(&args.engine),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    engine: RawEngineSettings,
    render: RawRenderSettings,
}

impl RawSettings {
    fn apply_platform_port(&mut self, port: Option<String>) -> Result<(), LoadError> {
        let Some(port) = port else {
            return Ok(());
        };
        let trimmed = port.trim();
        if trimmed.is_empty() {
            return Ok(());
        }
        let parsed = trimmed.parse::<u16>().map_err(|err| {
            LoadError::invalid("PORT", format!("`{trimmed}` is not a valid port: {err}"))
        })?;
        self.server.port = Some(parsed);
        Ok(())
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(limit) = overrides.server_body_limit_bytes {
            self.server.body_limit_bytes = Some(limit);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }

        self.apply_engine_overrides(&overrides.engine);
    }

    fn apply_engine_overrides(&mut self, overrides: &EngineOverrides) {
        if let Some(mode) = overrides.engine_mode.as_ref() {
            self.engine.mode = Some(mode.clone());
        }
        if let Some(path) = overrides.engine_executable.as_ref() {
            self.engine.executable = Some(path.clone());
        }
        if let Some(path) = overrides.engine_user_data_root.as_ref() {
            self.engine.user_data_root = Some(path.clone());
        }
        if let Some(policy) = overrides.wait_policy.as_ref() {
            self.render.wait_policy = Some(policy.clone());
        }
        if let Some(delay) = overrides.settle_delay_ms {
            self.render.settle_delay_ms = Some(delay);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            engine,
            render,
        } = raw;

        let engine = build_engine_settings(engine)?;
        let server = build_server_settings(server, engine.mode)?;
        let logging = build_logging_settings(logging)?;
        let render = build_render_settings(render)?;

        Ok(Self {
            server,
            logging,
            engine,
            render,
        })
    }
}

fn build_server_settings(
    server: RawServerSettings,
    mode: DeploymentMode,
) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let body_limit_value = server
        .body_limit_bytes
        .unwrap_or(DEFAULT_BODY_LIMIT_BYTES);
    let body_limit_bytes = NonZeroU64::new(body_limit_value).ok_or_else(|| {
        LoadError::invalid("server.body_limit_bytes", "must be greater than zero")
    })?;
    usize::try_from(body_limit_value).map_err(|_| {
        LoadError::invalid(
            "server.body_limit_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    let platform = server
        .platform
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| mode.as_str().to_string());

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        body_limit_bytes,
        platform,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_engine_settings(engine: RawEngineSettings) -> Result<EngineSettings, LoadError> {
    let mode = match engine.mode.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => DeploymentMode::from_str(value)
            .map_err(|reason| LoadError::invalid("engine.mode", reason))?,
        _ => DeploymentMode::detect(),
    };

    let executable = engine
        .executable
        .filter(|path| !path.as_os_str().is_empty());
    if mode == DeploymentMode::Serverless && executable.is_none() {
        return Err(LoadError::invalid(
            "engine.executable",
            "serverless mode requires an explicit Chromium executable",
        ));
    }

    let user_data_root = engine
        .user_data_root
        .unwrap_or_else(std::env::temp_dir);
    if user_data_root.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "engine.user_data_root",
            "path must not be empty",
        ));
    }

    let extra_args = engine
        .extra_args
        .unwrap_or_default()
        .into_iter()
        .map(|arg| arg.trim().to_string())
        .filter(|arg| !arg.is_empty())
        .collect();

    Ok(EngineSettings {
        mode,
        executable,
        user_data_root,
        extra_args,
    })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let wait_policy = match render.wait_policy {
        Some(value) => CompletionWaitPolicy::from_str(&value)
            .map_err(|err| LoadError::invalid("render.wait_policy", err.to_string()))?,
        None => CompletionWaitPolicy::default(),
    };

    let launch_timeout = positive_secs(
        render.launch_timeout_secs,
        DEFAULT_LAUNCH_TIMEOUT,
        "render.launch_timeout_secs",
    )?;
    let load_timeout = positive_secs(
        render.load_timeout_secs,
        DEFAULT_LOAD_TIMEOUT,
        "render.load_timeout_secs",
    )?;
    let completion_timeout = positive_secs(
        render.completion_timeout_secs,
        DEFAULT_COMPLETION_TIMEOUT,
        "render.completion_timeout_secs",
    )?;
    let print_timeout = positive_secs(
        render.print_timeout_secs,
        DEFAULT_PRINT_TIMEOUT,
        "render.print_timeout_secs",
    )?;
    let close_timeout = positive_secs(
        render.close_timeout_secs,
        DEFAULT_CLOSE_TIMEOUT,
        "render.close_timeout_secs",
    )?;

    let poll_interval = match render.poll_interval_ms {
        Some(0) => {
            return Err(LoadError::invalid(
                "render.poll_interval_ms",
                "must be greater than zero",
            ));
        }
        Some(ms) => Duration::from_millis(ms),
        None => DEFAULT_POLL_INTERVAL,
    };
    // Every policy ends with this grace period, so it cannot be disabled.
    let settle_delay = match render.settle_delay_ms {
        Some(0) => {
            return Err(LoadError::invalid(
                "render.settle_delay_ms",
                "must be greater than zero",
            ));
        }
        Some(ms) => Duration::from_millis(ms),
        None => DEFAULT_SETTLE_DELAY,
    };

    Ok(RenderSettings {
        wait_policy,
        timings: RenderTimings {
            launch_timeout,
            load_timeout,
            wait: WaitTimings {
                completion_timeout,
                poll_interval,
                settle_delay,
            },
            print_timeout,
            close_timeout,
        },
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    body_limit_bytes: Option<u64>,
    platform: Option<String>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawEngineSettings {
    mode: Option<String>,
    executable: Option<PathBuf>,
    user_data_root: Option<PathBuf>,
    extra_args: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    wait_policy: Option<String>,
    launch_timeout_secs: Option<u64>,
    load_timeout_secs: Option<u64>,
    completion_timeout_secs: Option<u64>,
    poll_interval_ms: Option<u64>,
    settle_delay_ms: Option<u64>,
    print_timeout_secs: Option<u64>,
    close_timeout_secs: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn positive_secs(
    value: Option<u64>,
    default: Duration,
    key: &'static str,
) -> Result<Duration, LoadError> {
    match value {
        Some(0) => Err(LoadError::invalid(key, "must be greater than zero")),
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => Ok(default),
    }
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
