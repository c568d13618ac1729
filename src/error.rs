use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum DownloaderError {
    #[error("invalid study identifier: {0}")]
    InvalidStudyId(String),

    #[error("invalid file name in listing: {0}")]
    InvalidFileName(String),

    #[error("missing required input: {0}")]
    MissingCredential(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("authorization failed: {0}")]
    #[diagnostic(help("check the username and password for the private portal"))]
    Auth(String),

    #[error("metadata request failed: {0}")]
    Metadata(String),

    #[error("metadata service returned status {status}: {message}")]
    MetadataStatus { status: u16, message: String },

    #[error("directory {path} can not be created: {message}")]
    Directory { path: String, message: String },

    #[error("transfer of {url} failed: {message}")]
    Transfer { url: String, message: String },

    #[error("transfer of {url} returned status {status}")]
    TransferStatus { url: String, status: u16 },

    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
