use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TsmError {
    #[error("configfs report directory {0} not found")]
    Unavailable(PathBuf),

    #[error("failed to create report entry {path}: {source}")]
    CreateEntry {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {attribute}: {source}")]
    Write {
        attribute: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {attribute}: {source}")]
    Read {
        attribute: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid generation value {0:?}")]
    InvalidGeneration(String),

    /// Another writer touched the entry while the report was being read.
    #[error("report generation was {got} when expecting {expected}")]
    GenerationChanged { expected: u64, got: u64 },
}

pub type Result<T> = std::result::Result<T, TsmError>;
