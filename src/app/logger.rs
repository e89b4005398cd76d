use std::fs::{File, OpenOptions};
use std::io::Write;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

const LEVEL_ENV: &str = "GLUCOFRAME_LOG_LEVEL";
const PATH_ENV: &str = "GLUCOFRAME_LOG_PATH";

/// Log verbosity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    #[default]
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(()),
        }
    }
}

/// Leveled stderr logger with an optional append-only file sink; cheap to clone per thread.
#[derive(Debug, Clone)]
pub struct Logger {
    level: LogLevel,
    file: Option<Arc<Mutex<File>>>,
    stderr: bool,
}

impl Logger {
    pub fn new(level: LogLevel, file_path: Option<String>) -> Self {
        let effective_level = std::env::var(LEVEL_ENV)
            .ok()
            .and_then(|s| LogLevel::from_str(&s).ok())
            .unwrap_or(level);

        let path = file_path.or_else(|| std::env::var(PATH_ENV).ok());
        let file = path.and_then(|p| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(p)
                .ok()
                .map(|f| Arc::new(Mutex::new(f)))
        });
        Self {
            level: effective_level,
            file,
            stderr: true,
        }
    }

    /// Discards everything; for tests that do not care about output.
    pub fn silent() -> Self {
        Self {
            level: LogLevel::Error,
            file: None,
            stderr: false,
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn log(&self, level: LogLevel, msg: impl AsRef<str>) {
        if level > self.level {
            return;
        }
        let ts = humantime::format_rfc3339_millis(SystemTime::now());
        let line = format!("[{ts}] [{level:?}] {}", msg.as_ref());
        if self.stderr {
            eprintln!("{line}");
        }
        if let Some(file) = self.file.as_ref() {
            if let Ok(mut file) = file.lock() {
                let _ = writeln!(file, "{line}");
            }
        }
    }

    pub fn error(&self, msg: impl AsRef<str>) {
        self.log(LogLevel::Error, msg);
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        self.log(LogLevel::Warn, msg);
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        self.log(LogLevel::Info, msg);
    }

    pub fn debug(&self, msg: impl AsRef<str>) {
        self.log(LogLevel::Debug, msg);
    }

    pub fn trace(&self, msg: impl AsRef<str>) {
        self.log(LogLevel::Trace, msg);
    }
}
