// Error types for the library layers. The binaries wrap these in
// `anyhow::Error` and turn them into an exit code.

use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// A `--sessions` token that is neither a digit string nor a `A-B` range.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid session token: {token:?} ({reason})")]
pub struct SessionTokenError {
    pub token: String,
    pub reason: &'static str,
}

/// Failures while walking the data directory.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The data root itself is missing or not a directory
    #[error("Data directory not found: {0}")]
    DataDirNotFound(PathBuf),

    /// A directory that exists could not be listed
    #[error("Failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Failures talking to the annotation server.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid host URL: {0}")]
    InvalidHost(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Failed to build upload form: {0}")]
    Multipart(#[source] reqwest::Error),

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Login failed: {status} - {body}")]
    LoginRejected { status: StatusCode, body: String },

    #[error("Failed to open view file {path}: {source}")]
    OpenView {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Server answered with something other than 201 Created
    #[error("Task creation failed: {status} - {body}")]
    TaskRejected { status: StatusCode, body: String },

    #[error("Invalid task response: {0}")]
    InvalidResponse(#[source] reqwest::Error),

    #[error("Invalid header value for {name}")]
    InvalidHeader { name: &'static str },
}

/// Failures while resolving the API token for the sample tool.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("No API token available (pass --token, set MULTIVIEW_API_TOKEN, or use --from-docker)")]
    Missing,

    #[error("Failed to run docker compose: {0}")]
    Docker(#[source] std::io::Error),

    #[error("docker compose exited with {status}: {stderr}")]
    DockerFailed { status: String, stderr: String },

    #[error("Token file error at {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
