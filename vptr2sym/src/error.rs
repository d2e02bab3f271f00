use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{msg}\n@line: '{line}'")]
    Parse { msg: String, line: String },

    #[error("failed to read {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to run {}: {source}", .tool.display())]
    ToolSpawn { tool: PathBuf, source: io::Error },

    #[error("{} exited with {status}: {stderr}", .tool.display())]
    ToolFailed { tool: PathBuf, status: ExitStatus, stderr: String },

    #[error("failed to parse ELF file {}: {source}", .path.display())]
    Elf { path: PathBuf, source: goblin::error::Error },
}

impl Error {
    pub(crate) fn parse(msg: impl Into<String>, line: &str) -> Self {
        Error::Parse { msg: msg.into(), line: line.to_string() }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }
}
