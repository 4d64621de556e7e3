//! Rolling-file logging bootstrap for the pantry core.
//!
//! # Responsibility
//! - Start one `flexi_logger` file backend per process.
//! - Keep events metadata-only: item names and tokens are never logged.
//!
//! # Invariants
//! - Repeating init with the same level and directory is a no-op.
//! - A running logger is never reconfigured; conflicting init is an error.
//! - Init never panics.

use crate::config::PantryConfig;
use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "pantry";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 5 * 1024 * 1024;
const MAX_LOG_FILES: usize = 3;
const MAX_PANIC_PAYLOAD_CHARS: usize = 120;

static ACTIVE_LOGGER: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    UnsupportedLevel(String),
    EmptyDir,
    RelativeDir(PathBuf),
    CreateDir { path: PathBuf, message: String },
    Start(String),
    Reconfigure { active: String, requested: String },
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedLevel(level) => write!(
                f,
                "unsupported log level `{level}`; expected trace|debug|info|warn|error"
            ),
            Self::EmptyDir => write!(f, "log_dir cannot be empty"),
            Self::RelativeDir(path) => {
                write!(f, "log_dir must be an absolute path, got `{}`", path.display())
            }
            Self::CreateDir { path, message } => write!(
                f,
                "failed to create log directory `{}`: {message}",
                path.display()
            ),
            Self::Start(message) => write!(f, "failed to start logger: {message}"),
            Self::Reconfigure { active, requested } => write!(
                f,
                "logging already running as `{active}`; refusing to switch to `{requested}`"
            ),
        }
    }
}

impl Error for LoggingError {}

struct ActiveLogger {
    level: &'static str,
    log_dir: PathBuf,
    _handle: LoggerHandle,
}

impl ActiveLogger {
    fn describe(level: &str, log_dir: &Path) -> String {
        format!("{level}@{}", log_dir.display())
    }

    fn check_same(&self, level: &'static str, log_dir: &Path) -> Result<(), LoggingError> {
        if self.level == level && self.log_dir == log_dir {
            return Ok(());
        }
        Err(LoggingError::Reconfigure {
            active: Self::describe(self.level, &self.log_dir),
            requested: Self::describe(level, log_dir),
        })
    }
}

/// Starts file logging at `level` under `log_dir`.
///
/// # Errors
/// - Unknown `level`, empty or relative `log_dir`.
/// - The directory cannot be created or the backend fails to start.
/// - A logger is already running with another level or directory.
pub fn init_logging(level: &str, log_dir: impl AsRef<Path>) -> Result<(), LoggingError> {
    let level = parse_level(level)
        .ok_or_else(|| LoggingError::UnsupportedLevel(level.trim().to_string()))?;
    let log_dir = check_log_dir(log_dir.as_ref())?;

    if let Some(active) = ACTIVE_LOGGER.get() {
        return active.check_same(level, &log_dir);
    }
    ACTIVE_LOGGER
        .get_or_try_init(|| start_logger(level, &log_dir))?
        .check_same(level, &log_dir)
}

/// Starts logging as described by `config`; a config without `log_dir`
/// leaves logging off.
pub fn init_logging_from_config(config: &PantryConfig) -> Result<(), LoggingError> {
    match &config.log_dir {
        Some(dir) => init_logging(&config.log_level, dir),
        None => Ok(()),
    }
}

/// `(level, log_dir)` of the running logger, if any.
pub fn logging_status() -> Option<(&'static str, PathBuf)> {
    ACTIVE_LOGGER
        .get()
        .map(|active| (active.level, active.log_dir.clone()))
}

/// `debug` for debug builds, `info` otherwise.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

/// Maps a user-supplied level onto the canonical spelling.
pub(crate) fn parse_level(level: &str) -> Option<&'static str> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" => Some("error"),
        _ => None,
    }
}

fn check_log_dir(log_dir: &Path) -> Result<PathBuf, LoggingError> {
    if log_dir.as_os_str().is_empty() {
        return Err(LoggingError::EmptyDir);
    }
    if !log_dir.is_absolute() {
        return Err(LoggingError::RelativeDir(log_dir.to_path_buf()));
    }
    Ok(log_dir.to_path_buf())
}

fn start_logger(level: &'static str, log_dir: &Path) -> Result<ActiveLogger, LoggingError> {
    std::fs::create_dir_all(log_dir).map_err(|err| LoggingError::CreateDir {
        path: log_dir.to_path_buf(),
        message: err.to_string(),
    })?;

    let handle = Logger::try_with_str(level)
        .map_err(|err| LoggingError::Start(err.to_string()))?
        .log_to_file(
            FileSpec::default()
                .directory(log_dir)
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(MAX_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| LoggingError::Start(err.to_string()))?;

    install_panic_hook();

    info!(
        "event=logging_init module=logging status=ok level={} version={} os={}",
        level,
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS
    );

    Ok(ActiveLogger {
        level,
        log_dir: log_dir.to_path_buf(),
        _handle: handle,
    })
}

fn install_panic_hook() {
    if PANIC_HOOK.set(()).is_err() {
        return;
    }

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_info
            .payload()
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| panic_info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(
            "event=panic_captured module=logging status=error location={} payload={}",
            location,
            single_line(&payload, MAX_PANIC_PAYLOAD_CHARS)
        );
        previous_hook(panic_info);
    }));
}

/// Flattens `value` onto one line and caps it at `max_chars`.
fn single_line(value: &str, max_chars: usize) -> String {
    let flattened = value.replace(['\n', '\r'], " ");
    if flattened.chars().count() <= max_chars {
        return flattened;
    }
    let mut capped: String = flattened.chars().take(max_chars).collect();
    capped.push_str("...");
    capped
}

#[cfg(test)]
mod tests {
    use super::{
        init_logging, init_logging_from_config, logging_status, parse_level, single_line,
        LoggingError,
    };
    use crate::config::PantryConfig;
    use rstest::rstest;
    use std::path::PathBuf;

    #[rstest]
    #[case("INFO", Some("info"))]
    #[case(" warning ", Some("warn"))]
    #[case("Trace", Some("trace"))]
    #[case("verbose", None)]
    fn levels_normalize(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(parse_level(raw), expected);
    }

    #[test]
    fn bad_directories_are_rejected_before_start() {
        assert_eq!(
            init_logging("info", "logs/dev"),
            Err(LoggingError::RelativeDir(PathBuf::from("logs/dev")))
        );
        assert_eq!(init_logging("info", ""), Err(LoggingError::EmptyDir));
        assert!(matches!(
            init_logging("chatty", "/tmp"),
            Err(LoggingError::UnsupportedLevel(_))
        ));
    }

    #[test]
    fn single_line_flattens_and_caps() {
        assert_eq!(single_line("a\nb", 10), "a b");
        let capped = single_line("line1\nline2\rline3", 8);
        assert_eq!(capped, "line1 li...");
    }

    #[test]
    fn init_is_idempotent_and_rejects_reconfiguration() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();

        init_logging("info", first.path()).unwrap();
        init_logging("INFO", first.path()).unwrap();

        assert!(matches!(
            init_logging("debug", first.path()),
            Err(LoggingError::Reconfigure { .. })
        ));
        assert!(matches!(
            init_logging("info", second.path()),
            Err(LoggingError::Reconfigure { .. })
        ));

        let (level, dir) = logging_status().unwrap();
        assert_eq!(level, "info");
        assert_eq!(dir, first.path());

        let mut config = PantryConfig::for_owner("owner");
        config.log_level = "info".to_string();
        init_logging_from_config(&config).unwrap();
        config.log_dir = Some(first.path().to_path_buf());
        init_logging_from_config(&config).unwrap();
    }
}
