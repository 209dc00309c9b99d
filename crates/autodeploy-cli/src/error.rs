//! Error types for the CLI

use std::path::PathBuf;

use autodeploy_chart::ChartError;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Chart(#[from] ChartError),

    #[error("failed to read values file {}: {source}", path.display())]
    ReadValues {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn read_values(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::ReadValues {
            path: path.into(),
            source,
        }
    }
}
