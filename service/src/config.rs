use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use sse::StreamMode;

/// Minimum poll interval accepted from clients or configuration, in seconds.
pub const MIN_REFRESH_INTERVAL: u64 = 5;
/// Minimum heartbeat interval accepted from clients or configuration, in seconds.
pub const MIN_PING_INTERVAL: u64 = 20;

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "127.0.0.1")]
    pub interface: String,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 3000)]
    pub port: u16,

    /// Default poll interval in seconds for clients that do not send an
    /// esp-refresh-interval header. Effective values are floored to 5 seconds.
    #[arg(long, env, default_value_t = MIN_REFRESH_INTERVAL)]
    pub refresh_interval: u64,

    /// Default heartbeat interval in seconds for clients that do not send an
    /// esp-ping-interval header. Effective values are floored to 20 seconds.
    #[arg(long, env, default_value_t = MIN_PING_INTERVAL)]
    pub ping_interval: u64,

    /// Default delivery mode for clients that do not send an esp-mode header.
    #[arg(
        long,
        env,
        default_value_t = StreamMode::Patch,
        value_parser = clap::builder::PossibleValuesParser::new(["patch", "data"])
            .map(|s| s.parse::<StreamMode>().unwrap()),
    )]
    pub mode: StreamMode,

    /// Request header names forwarded to the upstream resource.
    #[arg(
        long,
        env,
        value_delimiter = ',',
        default_value = "auth-header,authorization"
    )]
    pub pass_headers: Vec<String>,

    /// Timeout in seconds for a single upstream fetch
    #[arg(long, env, default_value_t = 30)]
    pub fetch_timeout_secs: u64,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
    )]
    pub log_level_filter: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }
}
