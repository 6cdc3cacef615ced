use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

use crate::remote::{JobId, JobState};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status} from {url}")]
    HttpStatus {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("Remote compute error: {0}")]
    Remote(String),

    #[error("No source observation for {0}")]
    DataUnavailable(NaiveDate),

    #[error("Remote job {id} ended as {state}")]
    JobTerminated { id: JobId, state: JobState },

    #[error("Persistence error at {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt record in {}: {source}", path.display())]
    CorruptRecord {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Warehouse load failed: {0}")]
    Warehouse(String),

    #[error("Initialization failed: {0}")]
    FatalInit(String),

    #[error("Invalid input: {0}")]
    Invalid(String),
}

/// Coarse taxonomy used by drivers to decide between skip, fallback and abort.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    /// Per-unit remote failure; the unit stays incomplete and is retried on resume.
    TransientRemote,
    /// The source has no observation for the requested day.
    DataUnavailable,
    /// Durable state could not be written or read back; the run must stop.
    Persistence,
    /// Summary rows could not be inserted into the warehouse.
    WarehouseLoad,
    /// Startup could not reach a required collaborator or artifact.
    FatalInit,
    /// Caller supplied something the pipeline cannot act on.
    InvalidInput,
}

impl PipelineError {
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            PipelineError::Http(_)
            | PipelineError::HttpStatus { .. }
            | PipelineError::Remote(_)
            | PipelineError::JobTerminated { .. } => ErrorClass::TransientRemote,
            // A reply we cannot decode is treated like any other bad remote answer.
            PipelineError::Serialization(_) => ErrorClass::TransientRemote,
            PipelineError::DataUnavailable(_) => ErrorClass::DataUnavailable,
            PipelineError::Persistence { .. }
            | PipelineError::CorruptRecord { .. } => ErrorClass::Persistence,
            PipelineError::Warehouse(_) => ErrorClass::WarehouseLoad,
            PipelineError::FatalInit(_) => ErrorClass::FatalInit,
            PipelineError::Invalid(_) => ErrorClass::InvalidInput,
        }
    }

    /// Whether the batch driver must stop instead of counting the unit as errored.
    pub fn aborts_run(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::Persistence | ErrorClass::FatalInit
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
