//! Extraction errors

use std::path::PathBuf;

/// Errors raised while extracting artifacts from source
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// No extractor registered for the file extension
    #[error("no extractor registered for extension: '{0}'")]
    NoExtractorForExtension(String),

    /// Source does not parse
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        /// 1-based line
        line: usize,
        /// 1-based column
        column: usize,
        /// Offending construct
        message: String,
    },

    /// Grammar could not be loaded
    #[error("parser init failed: {0}")]
    ParserInit(String),

    /// Parser returned no tree
    #[error("parse failed")]
    ParseFailed,

    /// Source is not valid UTF-8 where text was needed
    #[error("invalid utf-8 in source: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// IO error reading the source file
    #[error("io error reading {path}: {source}")]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl ExtractError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
