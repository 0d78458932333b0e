//! Error types shared by the extraction, planning and emission layers.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for mediaflow operations.
pub type FlowResult<T> = Result<T, FlowError>;

/// Errors that can occur while building, planning or emitting workflows.
#[derive(Debug, Error)]
pub enum FlowError {
    /// A file could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file or directory could not be written.
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The template directory does not exist.
    #[error("Template directory not found: {0}")]
    TemplateDirNotFound(PathBuf),

    /// A template file is not valid YAML for the template schema.
    #[error("Invalid template {path}: {source}")]
    TemplateParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The keyword table is malformed.
    #[error("Invalid keyword table: {0}")]
    Keywords(String),

    /// The node database could not be (de)serialized.
    #[error("Node database error: {0}")]
    Database(#[from] serde_json::Error),

    /// YAML serialization failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A node id is not present in the database.
    #[error("Unknown task node: {0}")]
    UnknownNode(String),

    /// Declared dependencies form a cycle.
    #[error("Dependency cycle between task nodes: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}
