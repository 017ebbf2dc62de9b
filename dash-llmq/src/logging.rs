//! Logging setup for nodes embedding the LLMQ subsystem.
//!
//! Console output, an optional `run.log` file in a log directory, and rotation of the
//! previous run's file to `dash-llmq.<timestamp>.log`.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{LoggingError, LoggingResult};

const LOG_FILE_PREFIX: &str = "dash-llmq.";
const ACTIVE_LOG_NAME: &str = "run.log";
const DEFAULT_MAX_FILES: usize = 20;

/// Keeps the non-blocking file writer alive. Buffered lines are flushed on drop.
#[derive(Debug)]
pub struct LoggingGuard {
    _worker_guard: Option<WorkerGuard>,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Falls back to `RUST_LOG`, then INFO, when unset.
    pub level: Option<LevelFilter>,
    pub console: bool,
    pub file: Option<LogFileConfig>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            console: true,
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Log to `<data_dir>/logs` in addition to the console.
    pub fn with_data_dir(mut self, data_dir: impl AsRef<Path>) -> Self {
        self.file = Some(LogFileConfig {
            log_dir: data_dir.as_ref().join("logs"),
            max_files: DEFAULT_MAX_FILES,
        });
        self
    }

    pub fn with_level(mut self, level: LevelFilter) -> Self {
        self.level = Some(level);
        self
    }
}

#[derive(Debug, Clone)]
pub struct LogFileConfig {
    pub log_dir: PathBuf,
    /// Archived logs kept besides `run.log`.
    pub max_files: usize,
}

/// Console-only logging at `level`.
pub fn init_console_logging(level: LevelFilter) -> LoggingResult<LoggingGuard> {
    init_logging(LoggingConfig::default().with_level(level))
}

/// Installs the global tracing subscriber.
///
/// With neither console nor file output configured nothing is installed and the
/// tracing macros stay no-ops.
///
/// # Errors
///
/// Fails if the log directory cannot be prepared or a global subscriber is already set.
pub fn init_logging(config: LoggingConfig) -> LoggingResult<LoggingGuard> {
    if !config.console && config.file.is_none() {
        return Ok(LoggingGuard {
            _worker_guard: None,
        });
    }

    let env_filter = match config.level {
        Some(level) => EnvFilter::new(level.to_string()),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(LevelFilter::INFO.to_string())),
    };

    let (file_layer, guard) = match config.file {
        Some(ref file_config) => {
            let (writer, guard) = open_log_file(file_config)?;
            let layer = fmt::layer().with_target(true).with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let console_layer = config.console.then(|| fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| LoggingError::SubscriberInit(e.to_string()))?;

    Ok(LoggingGuard {
        _worker_guard: guard,
    })
}

fn open_log_file(config: &LogFileConfig) -> LoggingResult<(NonBlocking, WorkerGuard)> {
    fs::create_dir_all(&config.log_dir)?;
    archive_previous_log(&config.log_dir)?;
    prune_archived_logs(&config.log_dir, config.max_files)?;

    let file = File::create(config.log_dir.join(ACTIVE_LOG_NAME))?;
    Ok(tracing_appender::non_blocking(file))
}

/// Moves an existing `run.log` to `dash-llmq.YYYY-MM-DD.HHMMSS.log`, stamped with its
/// modification time.
fn archive_previous_log(log_dir: &Path) -> LoggingResult<()> {
    let active = log_dir.join(ACTIVE_LOG_NAME);
    if !active.exists() {
        return Ok(());
    }

    let stamp =
        modified_at(&active).unwrap_or_else(Local::now).format("%Y-%m-%d.%H%M%S").to_string();
    let target = std::iter::once(format!("{}{}.log", LOG_FILE_PREFIX, stamp))
        .chain((1..=999).map(|i| format!("{}{}-{}.log", LOG_FILE_PREFIX, stamp, i)))
        .map(|name| log_dir.join(name))
        .find(|path| !path.exists())
        .ok_or_else(|| {
            LoggingError::RotationFailed("too many log files with same timestamp".to_string())
        })?;

    fs::rename(&active, &target).map_err(|e| LoggingError::RotationFailed(e.to_string()))
}

fn modified_at(path: &Path) -> Option<DateTime<Local>> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::from(modified))
}

fn is_archived_log(name: &str) -> bool {
    name.starts_with(LOG_FILE_PREFIX) && name.ends_with(".log")
}

/// Deletes the oldest archives until at most `max_files` remain.
fn prune_archived_logs(log_dir: &Path, max_files: usize) -> LoggingResult<()> {
    let mut archived: Vec<_> = fs::read_dir(log_dir)
        .map_err(|e| LoggingError::RotationFailed(format!("failed to read log dir: {}", e)))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_str().is_some_and(is_archived_log))
        .collect();

    if archived.len() <= max_files {
        return Ok(());
    }

    archived.sort_by_key(|entry| entry.metadata().and_then(|m| m.modified()).ok());

    let excess = archived.len() - max_files;
    for entry in archived.into_iter().take(excess) {
        if let Err(e) = fs::remove_file(entry.path()) {
            tracing::warn!("Failed to remove old log file {:?}: {}", entry.path(), e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;

    fn archived_count(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| is_archived_log(&e.file_name().to_string_lossy()))
            .count()
    }

    fn write_archives(dir: &Path, count: usize) {
        for i in 1..=count {
            let mut file =
                File::create(dir.join(format!("dash-llmq.2025-01-{:02}.120000.log", i))).unwrap();
            writeln!(file, "log {}", i).unwrap();
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_archive_without_previous_log_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        archive_previous_log(temp_dir.path()).unwrap();
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_archive_keeps_content() {
        let temp_dir = TempDir::new().unwrap();
        let mut file = File::create(temp_dir.path().join(ACTIVE_LOG_NAME)).unwrap();
        writeln!(file, "INFO recovery finished").unwrap();
        drop(file);

        archive_previous_log(temp_dir.path()).unwrap();

        assert!(!temp_dir.path().join(ACTIVE_LOG_NAME).exists());
        let archived: Vec<_> =
            fs::read_dir(temp_dir.path()).unwrap().filter_map(|e| e.ok()).collect();
        assert_eq!(archived.len(), 1);
        assert!(is_archived_log(&archived[0].file_name().to_string_lossy()));
        let content = fs::read_to_string(archived[0].path()).unwrap();
        assert!(content.contains("recovery finished"));
    }

    #[test]
    fn test_prune_keeps_newest_and_ignores_other_files() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        write_archives(dir, 6);
        File::create(dir.join(ACTIVE_LOG_NAME)).unwrap();
        File::create(dir.join("notes.txt")).unwrap();
        File::create(dir.join("dash-llmq.backup")).unwrap();

        prune_archived_logs(dir, 2).unwrap();

        assert_eq!(archived_count(dir), 2);
        assert!(dir.join("dash-llmq.2025-01-06.120000.log").exists());
        assert!(dir.join("dash-llmq.2025-01-05.120000.log").exists());
        assert!(dir.join(ACTIVE_LOG_NAME).exists());
        assert!(dir.join("notes.txt").exists());
        assert!(dir.join("dash-llmq.backup").exists());
    }

    #[test]
    fn test_prune_under_limit_keeps_everything() {
        let temp_dir = TempDir::new().unwrap();
        write_archives(temp_dir.path(), 3);
        prune_archived_logs(temp_dir.path(), 7).unwrap();
        assert_eq!(archived_count(temp_dir.path()), 3);
    }

    #[test]
    fn test_open_log_file_creates_nested_directory() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = temp_dir.path().join("node").join("logs");

        let config = LogFileConfig {
            log_dir: log_dir.clone(),
            max_files: 3,
        };
        let (_writer, _guard) = open_log_file(&config).unwrap();

        assert!(log_dir.join(ACTIVE_LOG_NAME).exists());
    }

    #[test]
    fn test_data_dir_config_points_to_logs_subdir() {
        let config = LoggingConfig::default().with_data_dir("/var/lib/dash");
        let file = config.file.unwrap();
        assert_eq!(file.log_dir, PathBuf::from("/var/lib/dash/logs"));
        assert_eq!(file.max_files, DEFAULT_MAX_FILES);
    }

    #[test]
    fn test_init_logging_without_outputs() {
        let guard = init_logging(LoggingConfig {
            level: Some(LevelFilter::DEBUG),
            console: false,
            file: None,
        });
        assert!(guard.is_ok());
    }
}
