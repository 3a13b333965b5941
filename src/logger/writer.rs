//! Log writer module
//!
//! Thread-safe log sinks backed by stdout/stderr or append-mode files.
//! Installed once at startup; callers fall back to stdout/stderr before that.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use super::format::AccessFormat;

static LOG_WRITER: OnceLock<LogWriter> = OnceLock::new();

/// Severity of a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    /// Parse a configured level name; unknown names mean `Info`
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "warn" | "warning" => Self::Warn,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }
}

enum LogTarget {
    Stdout,
    Stderr,
    File(Mutex<File>),
}

impl LogTarget {
    fn open(path: Option<&str>, fallback: Self) -> io::Result<Self> {
        match path {
            Some(p) => Ok(Self::File(Mutex::new(open_log_file(p)?))),
            None => Ok(fallback),
        }
    }

    fn write_line(&self, message: &str) {
        match self {
            Self::Stdout => println!("{message}"),
            Self::Stderr => eprintln!("{message}"),
            Self::File(file) => {
                if let Ok(mut f) = file.lock() {
                    let _ = writeln!(f, "{message}");
                }
            }
        }
    }
}

/// Sinks and filters shared by every log call
pub struct LogWriter {
    level: Level,
    info: LogTarget,
    error: LogTarget,
    access_format: Option<AccessFormat>,
}

impl LogWriter {
    fn new(
        level: Level,
        info_file: Option<&str>,
        error_file: Option<&str>,
        access_format: Option<AccessFormat>,
    ) -> io::Result<Self> {
        Ok(Self {
            level,
            info: LogTarget::open(info_file, LogTarget::Stdout)?,
            error: LogTarget::open(error_file, LogTarget::Stderr)?,
            access_format,
        })
    }

    /// Write a line at `level` if it passes the configured filter
    pub fn write(&self, level: Level, message: &str) {
        if level < self.level {
            return;
        }
        match level {
            Level::Info => self.info.write_line(message),
            Level::Warn | Level::Error => self.error.write_line(message),
        }
    }

    /// Access lines share the info target and bypass the level filter
    pub fn write_access(&self, message: &str) {
        self.info.write_line(message);
    }

    #[must_use]
    pub const fn access_format(&self) -> Option<AccessFormat> {
        self.access_format
    }
}

fn open_log_file(path: &str) -> io::Result<File> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the global log writer. Fails if called twice or a file cannot be opened.
pub fn init(
    level: Level,
    info_file: Option<&str>,
    error_file: Option<&str>,
    access_format: Option<AccessFormat>,
) -> io::Result<()> {
    let writer = LogWriter::new(level, info_file, error_file, access_format)?;
    LOG_WRITER.set(writer).map_err(|_| {
        io::Error::new(
            io::ErrorKind::AlreadyExists,
            "Log writer already initialized",
        )
    })
}

/// The global writer, if `init` has run
#[must_use]
pub fn get() -> Option<&'static LogWriter> {
    LOG_WRITER.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parse() {
        assert_eq!(Level::parse("info"), Level::Info);
        assert_eq!(Level::parse("WARN"), Level::Warn);
        assert_eq!(Level::parse("error"), Level::Error);
        assert_eq!(Level::parse("verbose"), Level::Info);
    }

    #[test]
    fn test_level_ordering() {
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
    }

    #[test]
    fn test_file_target_appends() {
        let dir = std::env::temp_dir().join(format!("gee-log-{}", std::process::id()));
        let path = dir.join("nested").join("info.log");
        let path_str = path.to_string_lossy().to_string();

        let writer = LogWriter::new(Level::Warn, Some(&path_str), Some(&path_str), None)
            .expect("open log file");
        writer.write(Level::Info, "filtered out");
        writer.write(Level::Warn, "first");
        writer.write(Level::Error, "second");
        writer.write_access("access line");

        let content = std::fs::read_to_string(&path).expect("read log file");
        assert!(!content.contains("filtered out"));
        assert!(content.contains("first\n"));
        assert!(content.contains("second\n"));
        assert!(content.contains("access line\n"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
