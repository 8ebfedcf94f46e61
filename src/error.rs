//! Public error types. Contract violations that the original engine treats
//! as fatal assertions surface here as `Result` instead, so an embedding
//! application can decide how to react rather than aborting.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum WorldError {
    #[error("handle {index} (generation {generation}) is stale or was never allocated")]
    StaleHandle { index: u32, generation: u32 },

    #[error("shape is degenerate (zero or negative area / radius)")]
    DegenerateShape,

    #[error("joint references a body handle that does not exist")]
    UnknownJointBody,

    #[error("dynamic body must have positive mass")]
    NonPositiveMass,
}

pub type Result<T> = std::result::Result<T, WorldError>;
