//! [`tracing_subscriber`] utilities.

use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// The format of the logs.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
#[clap(rename_all = "lowercase")]
pub enum LogFormat {
    /// Full format (default).
    #[default]
    Full,
    /// JSON format.
    Json,
    /// Pretty format.
    Pretty,
    /// Compact format.
    Compact,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Full => "full",
            Self::Json => "json",
            Self::Pretty => "pretty",
            Self::Compact => "compact",
        };
        f.write_str(s)
    }
}

/// Global logging configuration, flattened into a command's CLI args (§13).
#[derive(Debug, Clone, clap::Args)]
pub struct LogConfig {
    /// Verbosity level (0-5). `0` silences all logs from this crate.
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,
    /// Output format for log lines.
    #[arg(long = "log.format", default_value_t = LogFormat::Full, value_enum, global = true)]
    pub format: LogFormat,
}

impl LogConfig {
    const fn level(&self) -> tracing::Level {
        match self.verbosity {
            0 => tracing::Level::ERROR,
            1 => tracing::Level::WARN,
            2 => tracing::Level::INFO,
            3 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }

    /// Initializes the global `tracing` subscriber.
    ///
    /// `env_filter` overrides the verbosity-derived default; pass `None` to honor `-v`/`RUST_LOG`.
    pub fn init_tracing_subscriber(
        &self,
        env_filter: Option<EnvFilter>,
    ) -> Result<(), tracing_subscriber::util::TryInitError> {
        let env_filter = env_filter.unwrap_or_else(|| {
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.level().to_string()))
        });

        let fmt_layer = match self.format {
            LogFormat::Full => tracing_subscriber::fmt::layer().boxed(),
            LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
            LogFormat::Pretty => tracing_subscriber::fmt::layer().pretty().boxed(),
            LogFormat::Compact => tracing_subscriber::fmt::layer().compact().boxed(),
        };

        tracing_subscriber::registry().with(env_filter).with(fmt_layer).try_init()
    }
}

/// Initializes tracing for test environments; failures (already initialized) are ignored.
pub fn init_test_tracing() {
    let _ = LogConfig { verbosity: 5, format: LogFormat::Full }.init_tracing_subscriber(None);
}
