use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the Stampa binary.
#[derive(Debug, Parser)]
#[command(
    name = "stampa",
    version,
    about = "Render HTML or Markdown+LaTeX documents to PDF with headless Chromium"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "STAMPA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP conversion service.
    Serve(Box<ServeArgs>),
    /// Convert a local file to PDF and exit.
    Render(RenderArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct EngineOverrides {
    /// Override the deployment mode (local|serverless).
    #[arg(long = "engine-mode", value_name = "MODE")]
    pub engine_mode: Option<String>,

    /// Override the Chromium executable path.
    #[arg(long = "engine-executable", value_name = "PATH", value_hint = ValueHint::ExecutablePath)]
    pub engine_executable: Option<PathBuf>,

    /// Override the directory that holds per-session browser profiles.
    #[arg(long = "engine-user-data-root", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub engine_user_data_root: Option<PathBuf>,

    /// Override the completion wait policy (callback|marker|fixed-delay|combined).
    #[arg(long = "wait-policy", value_name = "POLICY")]
    pub wait_policy: Option<String>,

    /// Override the settle delay applied before printing.
    #[arg(long = "settle-delay-ms", value_name = "MILLISECONDS")]
    pub settle_delay_ms: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub engine: EngineOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the maximum request body size in bytes.
    #[arg(long = "server-body-limit-bytes", value_name = "BYTES")]
    pub server_body_limit_bytes: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub engine: EngineOverrides,

    /// Document to convert.
    #[arg(long, short = 'i', value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub input: PathBuf,

    /// Where to write the PDF.
    #[arg(long, short = 'o', value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub output: PathBuf,

    /// Treat the input as Markdown with LaTeX math instead of HTML.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub markdown: bool,

    /// Cover image placed on its own page before Markdown content.
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath, requires = "markdown")]
    pub cover: Option<PathBuf>,
}
