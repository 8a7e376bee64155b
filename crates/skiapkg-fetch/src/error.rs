use thiserror::Error;

use crate::config::ConfigError;
use crate::http::FetchError;
use crate::pipeline::Stage;
use crate::stage::StageError;
use crate::version::VersionError;

#[derive(Error, Debug)]
pub enum Error {
    // Network errors
    #[error("Download failed")]
    Fetch(#[from] FetchError),

    // Extraction / payload / copy errors
    #[error(transparent)]
    Stage(#[from] StageError),

    // Milestone and tag parsing
    #[error(transparent)]
    Version(#[from] VersionError),

    // Config errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    // IO errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    /// A `fetch_and_stage` run that failed; `stage` is where it stopped.
    #[error("Failed to stage {artifact} while {stage}")]
    Pipeline {
        artifact: String,
        stage: Stage,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// The innermost error, looking through pipeline wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Pipeline { source, .. } => source.root(),
            other => other,
        }
    }

    /// Stage at which a pipeline run failed, if this is a pipeline error.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Pipeline { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
