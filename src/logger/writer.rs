//! Log writer module
//!
//! Thread-safe log writing to files or stdout/stderr. File targets are
//! rotated by size: `app.log` becomes `app.log.1`, older backups shift up
//! and the oldest is dropped.

use std::ffi::OsString;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, OnceLock};

use crate::config::LoggingConfig;

/// Global log writer instance
static LOG_WRITER: OnceLock<LogWriter> = OnceLock::new();

/// Server log severity, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" | "trace" => Ok(Self::Debug),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        })
    }
}

/// Append-only file that rotates once it reaches `max_size` bytes
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    file: File,
    size: u64,
    /// 0 disables rotation
    max_size: u64,
    max_backups: usize,
}

impl RotatingFile {
    pub fn open(path: &Path, max_size: u64, max_backups: usize) -> io::Result<Self> {
        let file = open_log_file(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            size,
            max_size,
            max_backups,
        })
    }

    pub fn write_line(&mut self, message: &str) -> io::Result<()> {
        let len = message.len() as u64 + 1;
        if self.max_size > 0 && self.size > 0 && self.size + len > self.max_size {
            self.rotate()?;
        }
        writeln!(self.file, "{message}")?;
        self.size += len;
        Ok(())
    }

    fn rotate(&mut self) -> io::Result<()> {
        if self.max_backups == 0 {
            self.file = OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(&self.path)?;
            self.size = 0;
            return Ok(());
        }

        match fs::remove_file(backup_path(&self.path, self.max_backups)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
            _ => {}
        }
        for n in (1..self.max_backups).rev() {
            let from = backup_path(&self.path, n);
            if from.exists() {
                fs::rename(&from, backup_path(&self.path, n + 1))?;
            }
        }
        fs::rename(&self.path, backup_path(&self.path, 1))?;

        self.file = open_log_file(&self.path)?;
        self.size = 0;
        Ok(())
    }
}

fn backup_path(path: &Path, n: usize) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

/// Log output target
#[derive(Debug)]
enum LogTarget {
    Stdout,
    Stderr,
    File(RotatingFile),
}

impl LogTarget {
    fn open(path: Option<&Path>, console: Self, config: &LoggingConfig) -> io::Result<Self> {
        match path.filter(|p| !p.as_os_str().is_empty()) {
            Some(p) => Ok(Self::File(RotatingFile::open(
                p,
                config.max_file_size,
                config.max_backups,
            )?)),
            None => Ok(console),
        }
    }

    fn write(&mut self, message: &str) {
        match self {
            Self::Stdout => println!("{message}"),
            Self::Stderr => eprintln!("{message}"),
            Self::File(file) => {
                if let Err(e) = file.write_line(message) {
                    eprintln!("Failed to write log file: {e}");
                    eprintln!("{message}");
                }
            }
        }
    }
}

/// Thread-safe log writer
#[derive(Debug)]
pub struct LogWriter {
    level: LogLevel,
    access: Mutex<LogTarget>,
    /// `None` when the server log shares the access log file
    error: Option<Mutex<LogTarget>>,
}

impl LogWriter {
    /// Create a writer from the logging section of the configuration
    pub fn new(config: &LoggingConfig) -> io::Result<Self> {
        let level = config
            .level
            .parse::<LogLevel>()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let access_path = config.access_log_file.as_deref();
        let error_path = config.error_log_file.as_deref();
        let access = LogTarget::open(access_path, LogTarget::Stdout, config)?;

        let shared = matches!((access_path, error_path), (Some(a), Some(e)) if a == e);
        let error = if shared {
            None
        } else {
            Some(Mutex::new(LogTarget::open(error_path, LogTarget::Stderr, config)?))
        };

        Ok(Self {
            level,
            access: Mutex::new(access),
            error,
        })
    }

    pub const fn level(&self) -> LogLevel {
        self.level
    }

    /// Write to access log
    pub fn write_access(&self, message: &str) {
        if let Ok(mut target) = self.access.lock() {
            target.write(message);
        }
    }

    /// Write to the server log
    pub fn write_error(&self, message: &str) {
        let target = self.error.as_ref().unwrap_or(&self.access);
        if let Ok(mut target) = target.lock() {
            target.write(message);
        }
    }
}

/// Open or create a log file for appending
fn open_log_file(path: &Path) -> io::Result<File> {
    // Create parent directories if they don't exist
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    OpenOptions::new().create(true).append(true).open(path)
}

/// Initialize the global log writer
///
/// This should be called once at application startup.
/// Returns error if log files cannot be opened or the level is unknown.
pub fn init(config: &LoggingConfig) -> io::Result<()> {
    let writer = LogWriter::new(config)?;
    LOG_WRITER.set(writer).map_err(|_| {
        io::Error::new(
            io::ErrorKind::AlreadyExists,
            "Log writer already initialized",
        )
    })
}

/// Get the global log writer, if initialized
pub fn get() -> Option<&'static LogWriter> {
    LOG_WRITER.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logging(dir: &Path) -> LoggingConfig {
        LoggingConfig {
            level: "warn".to_string(),
            access_log: true,
            access_log_format: "combined".to_string(),
            access_log_file: Some(dir.join("access.log")),
            error_log_file: Some(dir.join("access.log")),
            max_file_size: 0,
            max_backups: 1,
        }
    }

    #[test]
    fn test_parse_level() {
        assert_eq!("INFO".parse::<LogLevel>(), Ok(LogLevel::Info));
        assert_eq!("warning".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("loud".parse::<LogLevel>().is_err());
        assert!(LogLevel::Error < LogLevel::Debug);
    }

    #[test]
    fn test_rotation_keeps_backups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut file = RotatingFile::open(&path, 10, 2).unwrap();

        file.write_line("aaaaaaa").unwrap();
        file.write_line("bbbbbbb").unwrap();
        file.write_line("ccccccc").unwrap();
        file.write_line("ddddddd").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "ddddddd\n");
        assert_eq!(fs::read_to_string(backup_path(&path, 1)).unwrap(), "ccccccc\n");
        assert_eq!(fs::read_to_string(backup_path(&path, 2)).unwrap(), "bbbbbbb\n");
        assert!(!backup_path(&path, 3).exists());
    }

    #[test]
    fn test_rotation_without_backups_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut file = RotatingFile::open(&path, 10, 0).unwrap();

        file.write_line("aaaaaaa").unwrap();
        file.write_line("bbbbbbb").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "bbbbbbb\n");
        assert!(!backup_path(&path, 1).exists());
    }

    #[test]
    fn test_shared_file_target() {
        let dir = tempfile::tempdir().unwrap();
        let writer = LogWriter::new(&logging(dir.path())).unwrap();
        assert_eq!(writer.level(), LogLevel::Warn);

        writer.write_access("access line");
        writer.write_error("error line");

        let contents = fs::read_to_string(dir.path().join("access.log")).unwrap();
        assert_eq!(contents, "access line\nerror line\n");
    }

    #[test]
    fn test_invalid_level_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = logging(dir.path());
        config.level = "loud".to_string();
        assert!(LogWriter::new(&config).is_err());
    }
}
