use serde::Deserialize;
use tracing::metadata::LevelFilter;

#[derive(Debug, Default, Copy, Clone, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Every message and timer
    Trace,
    /// Measurements
    Debug,
    /// Role and grandmaster changes
    #[default]
    Info,
    /// Discarded and rejected input
    Warn,
    /// Failures
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        LevelFilter::from_level(value.into())
    }
}

impl From<LogLevel> for log::LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("could not forward log records: {0}")]
    Log(#[from] log::SetLoggerError),
    #[error("could not install the subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Install the global subscriber. Records of the `log` crate, which the
/// protocol core uses, are forwarded to it.
pub fn tracing_init(level: LogLevel) -> Result<(), LoggingError> {
    tracing_log::LogTracer::init_with_filter(level.into())?;

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::from(level))
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        level: LogLevel,
    }

    #[test]
    fn parses_lowercase_levels() {
        let wrapper: Wrapper = toml::from_str("level = \"debug\"").unwrap();
        assert_eq!(wrapper.level, LogLevel::Debug);

        assert!(toml::from_str::<Wrapper>("level = \"Debug\"").is_err());
    }

    #[test]
    fn levels_match_between_facades() {
        assert_eq!(LevelFilter::from(LogLevel::Warn), LevelFilter::WARN);
        assert_eq!(log::LevelFilter::from(LogLevel::Warn), log::LevelFilter::Warn);
    }
}
