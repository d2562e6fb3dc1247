use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use correcteur_platform::AppPaths;
#[cfg(debug_assertions)]
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use simplelog::{CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, WriteLogger};

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Log file handle that reopens the file, and its directory, when they are
/// removed while the process runs.
struct ReopeningLogFile {
    path: PathBuf,
    file: Mutex<File>,
}

impl ReopeningLogFile {
    fn open(path: PathBuf) -> io::Result<Self> {
        let file = open_append(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    fn with_file<T>(&self, action: impl FnOnce(&mut File) -> io::Result<T>) -> io::Result<T> {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.path.exists() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            *file = open_append(&self.path)?;
        }
        action(&mut file)
    }
}

impl Write for ReopeningLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_file(|file| file.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_file(File::flush)
    }
}

/// Once the log exceeds `max_size`, keep only its last `max_size / 2` bytes,
/// starting at a line boundary. Returns whether the file was rewritten.
fn trim_to_recent(path: &Path, max_size: u64) -> io::Result<bool> {
    if std::fs::metadata(path)?.len() <= max_size {
        return Ok(false);
    }
    let contents = std::fs::read(path)?;
    let keep = usize::try_from(max_size / 2).unwrap_or(usize::MAX);
    let cut = contents.len().saturating_sub(keep);
    let start = contents[cut..]
        .iter()
        .position(|&byte| byte == b'\n')
        .map_or(contents.len(), |newline| cut + newline + 1);
    std::fs::write(path, &contents[start..])?;
    Ok(true)
}

/// Route `log` records from the correcteur crates to `<data dir>/debug.log`,
/// and to stderr in debug builds.
pub fn init_logging(paths: &AppPaths, debug_enabled: bool) {
    let log_path = paths.log_file();
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("correcteur")
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    if let Ok(writer) = ReopeningLogFile::open(log_path.clone()) {
        loggers.push(WriteLogger::new(LevelFilter::Debug, config.clone(), writer));
    }

    // stdout carries command output only.
    #[cfg(debug_assertions)]
    loggers.push(TermLogger::new(
        LevelFilter::Debug,
        config,
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ));

    if !loggers.is_empty() {
        let _ = CombinedLogger::init(loggers);
    }
    set_logging_enabled(debug_enabled);
    log::debug!("Logging to {}", log_path.display());
}

/// Cut the log file down once it has grown past `max_log_size`. The open
/// writer appends, so later records land after the kept tail.
pub fn limit_log_size(paths: &AppPaths, max_log_size: u64) {
    let log_path = paths.log_file();
    match trim_to_recent(&log_path, max_log_size) {
        Ok(true) => log::info!("Log file exceeded {max_log_size} bytes and was trimmed"),
        Ok(false) => {}
        Err(error) => log::debug!("Log file {} not trimmed: {error}", log_path.display()),
    }
}

/// Debug detail when enabled; otherwise the update audit trail and warnings.
pub fn set_logging_enabled(enabled: bool) {
    log::set_max_level(if enabled {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    });
}
