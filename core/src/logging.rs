//! Process-wide logging setup
//!
//! Logging is configured once, at process start, from an explicit
//! [`LoggingConfig`]. Components never read the environment to decide how
//! to log; they receive a [`LogContext`] at construction and tag every
//! record with its target.

use crate::error::{MiraiError, Result};
use log::LevelFilter;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::str::FromStr;

/// Base name of the log target
pub const LOGGER_NAME: &str = "mirai";

/// Where formatted records are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSink {
    /// Standard error stream
    Stderr,
    /// File opened in append mode
    File(PathBuf),
}

/// Logging configuration applied once per process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: LevelFilter,
    pub sinks: Vec<LogSink>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Warn,
            sinks: vec![LogSink::Stderr],
        }
    }
}

impl LoggingConfig {
    /// Creates a stderr-only configuration at the given level
    pub fn new(level: LevelFilter) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    /// Adds an append-mode log file sink
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sinks.push(LogSink::File(path.into()));
        self
    }
}

/// Parses a level name, accepting "WARNING" and "CRITICAL" spellings
pub fn parse_level(name: &str) -> Result<LevelFilter> {
    let normalized = match name.trim().to_uppercase().as_str() {
        "WARNING" => "WARN".to_string(),
        "CRITICAL" | "FATAL" => "ERROR".to_string(),
        other => other.to_string(),
    };
    LevelFilter::from_str(&normalized)
        .map_err(|_| MiraiError::Configuration(format!("unknown log level '{}'", name)))
}

/// Handle passed to components so their records share one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogContext {
    target: String,
}

impl LogContext {
    /// Context tagged with the current process id
    pub fn for_process() -> Self {
        Self::named(format!("{}-process-{}", LOGGER_NAME, std::process::id()))
    }

    /// Context with an explicit target name
    pub fn named(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Default for LogContext {
    fn default() -> Self {
        Self::named(LOGGER_NAME)
    }
}

/// Writes every record to all configured sinks
struct SinkWriter {
    stderr: bool,
    files: Vec<File>,
}

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.stderr {
            io::stderr().write_all(buf)?;
        }
        for file in &mut self.files {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.stderr {
            io::stderr().flush()?;
        }
        for file in &mut self.files {
            file.flush()?;
        }
        Ok(())
    }
}

/// Installs the global logger and returns the process log context
///
/// Must be called at most once; a second call fails with a configuration
/// error because the `log` facade accepts a single logger per process.
pub fn init(config: &LoggingConfig) -> Result<LogContext> {
    let mut writer = SinkWriter {
        stderr: false,
        files: Vec::new(),
    };
    for sink in &config.sinks {
        match sink {
            LogSink::Stderr => writer.stderr = true,
            LogSink::File(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                writer.files.push(file);
            }
        }
    }

    let debug_format = config.level >= LevelFilter::Debug;
    env_logger::Builder::new()
        .filter_level(config.level)
        .target(env_logger::Target::Pipe(Box::new(writer)))
        .format(move |buf, record| {
            if debug_format {
                writeln!(
                    buf,
                    "[{}] [{}:{}] {} - {}",
                    buf.timestamp(),
                    record.file().unwrap_or("?"),
                    record.line().unwrap_or(0),
                    record.level(),
                    record.args()
                )
            } else {
                writeln!(
                    buf,
                    "[{}] {} - {}",
                    buf.timestamp(),
                    record.level(),
                    record.args()
                )
            }
        })
        .try_init()
        .map_err(|e| MiraiError::Configuration(format!("logger already initialized: {}", e)))?;

    Ok(LogContext::for_process())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("DEBUG", LevelFilter::Debug)]
    #[case("info", LevelFilter::Info)]
    #[case("WARNING", LevelFilter::Warn)]
    #[case("critical", LevelFilter::Error)]
    #[case("off", LevelFilter::Off)]
    fn test_parse_level(#[case] name: &str, #[case] expected: LevelFilter) {
        assert_eq!(parse_level(name).unwrap(), expected);
    }

    #[test]
    fn test_parse_level_unknown() {
        assert!(matches!(
            parse_level("loud"),
            Err(MiraiError::Configuration(_))
        ));
    }

    #[test]
    fn test_config_with_file() {
        let config = LoggingConfig::new(LevelFilter::Info).with_file("/tmp/mirai.log");
        assert_eq!(
            config.sinks,
            vec![LogSink::Stderr, LogSink::File(PathBuf::from("/tmp/mirai.log"))]
        );
    }

    #[test]
    fn test_process_context_target() {
        let ctx = LogContext::for_process();
        assert!(ctx.target().starts_with("mirai-process-"));
    }

    #[test]
    fn test_sink_writer_appends_to_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .unwrap();
        let mut writer = SinkWriter {
            stderr: false,
            files: vec![file],
        };
        writer.write_all(b"first\n").unwrap();
        writer.write_all(b"second\n").unwrap();
        writer.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "first\nsecond\n");
    }
}
