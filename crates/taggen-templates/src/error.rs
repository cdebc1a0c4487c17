use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    ParseFile {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to parse templates: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid template `{name}`: {reason}")]
    Invalid { name: String, reason: String },
}
