pub mod alarm;
pub mod app;
pub mod classify;
pub mod cli;
pub mod clock;
pub mod config;
pub mod display;
pub mod hardware;
pub mod history;
pub mod reading;
pub mod storage;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    InvalidArgs(String),
    Io(std::io::Error),
    Parse(String),
    Network(String),
    Config(String),
    /// The device has no usable configuration and must go back through setup.
    NeedsSetup(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidArgs(msg) => write!(f, "invalid arguments: {msg}"),
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::Parse(msg) => write!(f, "parse error: {msg}"),
            Error::Network(msg) => write!(f, "network error: {msg}"),
            Error::Config(msg) => write!(f, "config error: {msg}"),
            Error::NeedsSetup(msg) => write!(f, "setup required: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Parse(format!("json: {value}"))
    }
}
