use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum BxhError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("invalid data id (expected YYYYMMDD_#####): {0}")]
    InvalidDataId(String),

    #[error("invalid BIDS entity key: {0}")]
    InvalidEntityKey(String),

    #[error("invalid modality: {0}")]
    InvalidModality(String),

    #[error("session info file not found: {0}")]
    MissingSessionConfig(PathBuf),

    #[error("template file not found: {0}")]
    MissingTemplate(PathBuf),

    #[error("failed to parse {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("source study directory does not look like a study directory: {0}")]
    InvalidSourceLayout(PathBuf),

    #[error("target study directory not found: {0}")]
    MissingTarget(PathBuf),

    #[error("malformed metadata in {path}: {message}")]
    MalformedMetadata { path: PathBuf, message: String },

    #[error("metadata is missing required element: {0}")]
    MissingElement(String),

    #[error("field {field} is not a valid {expected}: {value}")]
    MalformedField {
        field: String,
        expected: String,
        value: String,
    },

    #[error("required field missing from metadata: {0}")]
    MissingField(String),

    #[error("dual-echo field map needs two echo times, got: {0:?}")]
    MissingSecondEcho(String),

    #[error("scan description not found in modality rules: {0}")]
    UnknownDescription(String),

    #[error("malformed acquisition description {description}: {reason}")]
    MalformedDescription { description: String, reason: String },

    #[error("{file} matched more than one session entry: {tokens:?}")]
    AmbiguousMatch { file: String, tokens: Vec<String> },

    #[error("functional file not matched with any session entry: {0}")]
    UnmatchedFunctional(String),

    #[error("output {name} collides with another acquisition of the session")]
    SessionConfigConflict { name: String },

    #[error("output file already exists: {0}")]
    OutputExists(PathBuf),

    #[error("events file cannot be found: {0}")]
    MissingEventsFile(PathBuf),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
