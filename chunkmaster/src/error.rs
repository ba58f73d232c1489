use std::error::Error;
use std::fmt::Display;

use crate::chunkmaster_state::chunkserver_details::ChunkserverStatus;

#[derive(Clone, Debug, PartialEq)]
pub enum ChunkmasterError {
    MalformedRequest(String),
    NotFound(String),
    AlreadyExists(String),
    /// durable status did not match the expected one
    StatusConflict {
        key: String,
        expected: ChunkserverStatus,
        actual: ChunkserverStatus,
    },
    InvalidTransition {
        key: String,
        status: ChunkserverStatus,
    },
    FidExhausted,
    Metadata(String),
}

impl Display for ChunkmasterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkmasterError::MalformedRequest(msg) => {
                write!(f, "Malformed request : {}", msg)
            }
            ChunkmasterError::NotFound(key) => {
                write!(f, "Chunkserver does not exist : {}", key)
            }
            ChunkmasterError::AlreadyExists(key) => {
                write!(f, "Chunkserver already exists : {}", key)
            }
            ChunkmasterError::StatusConflict {
                key,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Status of chunkserver {} is {:?}, expected {:?}",
                    key, actual, expected
                )
            }
            ChunkmasterError::InvalidTransition { key, status } => {
                write!(
                    f,
                    "Chunkserver {} in status {:?} can't take this transition",
                    key, status
                )
            }
            ChunkmasterError::FidExhausted => {
                write!(f, "Fid space is exhausted")
            }
            ChunkmasterError::Metadata(msg) => {
                write!(f, "Metadata store error : {}", msg)
            }
        }
    }
}

impl Error for ChunkmasterError {}

impl From<std::io::Error> for ChunkmasterError {
    fn from(value: std::io::Error) -> Self {
        ChunkmasterError::Metadata(value.to_string())
    }
}

impl From<serde_json::Error> for ChunkmasterError {
    fn from(value: serde_json::Error) -> Self {
        ChunkmasterError::Metadata(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChunkmasterError>;
