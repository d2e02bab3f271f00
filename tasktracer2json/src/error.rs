use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Malformed input text: a log line, a file name or an embedded value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{msg}{}", at_line(.line))]
pub struct ParseError {
    pub msg: String,
    pub line: Option<String>,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        ParseError { msg: msg.into(), line: None }
    }

    pub fn at(mut self, line: &str) -> Self {
        self.line = Some(line.to_string());
        self
    }
}

fn at_line(line: &Option<String>) -> String {
    match line {
        Some(line) => format!("\n@line: '{}'", line),
        None => String::new(),
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("failed to access {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("invalid TaskTracer profile {}: {source}", .path.display())]
    Profile { path: PathBuf, source: serde_json::Error },

    #[error("failed to write {}: {source}", .path.display())]
    Output { path: PathBuf, source: serde_json::Error },

    #[error(transparent)]
    Symbols(#[from] vptr2sym::Error),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }
}
