//! Launch profiles: which flags and binary a session starts Chromium with.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use chromiumoxide::browser::BrowserConfig;

use crate::application::engine::EngineError;

/// Environment variables whose presence identifies a managed serverless platform.
pub const SERVERLESS_ENV_VARS: [&str; 2] = ["VERCEL", "AWS_LAMBDA_FUNCTION_NAME"];

const LOCAL_ARGS: [&str; 2] = ["--disable-dev-shm-usage", "--disable-gpu"];
const SERVERLESS_EXTRA_ARGS: [&str; 3] = ["--no-first-run", "--no-zygote", "--single-process"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentMode {
    Local,
    Serverless,
}

impl DeploymentMode {
    /// Detect the mode from the process environment.
    pub fn detect() -> Self {
        Self::detect_with(|key| std::env::var_os(key).is_some_and(|value| !value.is_empty()))
    }

    pub fn detect_with(is_set: impl Fn(&str) -> bool) -> Self {
        if SERVERLESS_ENV_VARS.iter().any(|key| is_set(key)) {
            Self::Serverless
        } else {
            Self::Local
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Serverless => "serverless",
        }
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "serverless" => Ok(Self::Serverless),
            other => Err(format!(
                "unknown deployment mode `{other}` (expected local or serverless)"
            )),
        }
    }
}

/// Everything needed to start one browser process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchProfile {
    pub mode: DeploymentMode,
    pub executable: Option<PathBuf>,
    /// Parent of the per-session profile directories; must be writable.
    pub user_data_root: PathBuf,
    pub args: Vec<String>,
    pub sandbox: bool,
    /// Upper bound for a single DevTools request.
    pub request_timeout: Duration,
}

impl LaunchProfile {
    pub fn for_mode(
        mode: DeploymentMode,
        executable: Option<PathBuf>,
        user_data_root: PathBuf,
        extra_args: &[String],
        request_timeout: Duration,
    ) -> Self {
        let mut args: Vec<String> = LOCAL_ARGS.iter().map(|arg| arg.to_string()).collect();
        if mode == DeploymentMode::Serverless {
            args.extend(SERVERLESS_EXTRA_ARGS.iter().map(|arg| arg.to_string()));
        }
        for arg in extra_args {
            if !args.contains(arg) {
                args.push(arg.clone());
            }
        }

        Self {
            mode,
            executable,
            user_data_root,
            args,
            sandbox: false,
            request_timeout,
        }
    }

    pub(crate) fn browser_config(&self, user_data_dir: &Path) -> Result<BrowserConfig, EngineError> {
        let mut builder = BrowserConfig::builder()
            .user_data_dir(user_data_dir)
            .request_timeout(self.request_timeout)
            .args(self.args.clone());
        if !self.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(executable) = self.executable.as_ref() {
            builder = builder.chrome_executable(executable);
        }
        builder.build().map_err(EngineError::unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(mode: DeploymentMode, extra: &[String]) -> LaunchProfile {
        LaunchProfile::for_mode(
            mode,
            None,
            PathBuf::from("/tmp"),
            extra,
            Duration::from_secs(65),
        )
    }

    #[test]
    fn detects_serverless_from_platform_variables() {
        assert_eq!(
            DeploymentMode::detect_with(|key| key == "VERCEL"),
            DeploymentMode::Serverless
        );
        assert_eq!(
            DeploymentMode::detect_with(|key| key == "AWS_LAMBDA_FUNCTION_NAME"),
            DeploymentMode::Serverless
        );
        assert_eq!(
            DeploymentMode::detect_with(|key| key == "HOME"),
            DeploymentMode::Local
        );
    }

    #[test]
    fn parses_mode_names() {
        assert_eq!("Local".parse(), Ok(DeploymentMode::Local));
        assert_eq!("serverless".parse(), Ok(DeploymentMode::Serverless));
        assert!("lambda".parse::<DeploymentMode>().is_err());
    }

    #[test]
    fn local_profile_uses_minimal_flags() {
        let profile = profile(DeploymentMode::Local, &[]);
        assert_eq!(profile.args, vec!["--disable-dev-shm-usage", "--disable-gpu"]);
        assert!(!profile.sandbox);
    }

    #[test]
    fn serverless_profile_runs_single_process() {
        let profile = profile(DeploymentMode::Serverless, &[]);
        assert!(profile.args.iter().any(|arg| arg == "--single-process"));
        assert!(profile.args.iter().any(|arg| arg == "--no-zygote"));
    }

    #[test]
    fn extra_args_are_appended_once() {
        let extra = vec!["--disable-gpu".to_string(), "--lang=pt-BR".to_string()];
        let profile = profile(DeploymentMode::Local, &extra);
        assert_eq!(
            profile.args,
            vec!["--disable-dev-shm-usage", "--disable-gpu", "--lang=pt-BR"]
        );
    }
}
