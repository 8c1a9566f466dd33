//! Error taxonomy for the generation pipeline
//!
//! Warnings are not errors here: anything recoverable is reported through
//! `tracing::warn!` and generation continues. A `PostError` cancels the
//! current robot program only; the run moves on to the next program.

use crate::model::{MotionSpace, MotionType, PointId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PostError {
    #[error(
        "operation '{operation}' carries a handshake but follows the disabled home operation '{home}'"
    )]
    HandshakeAfterDisabledHome { home: String, operation: String },

    #[error("touch offsets need {needed} position registers but the window holds {available}")]
    RegisterWindowExhausted { needed: u32, available: u32 },

    #[error(
        "point {point}: {motion_type:?} motion in {motion_space:?} space has no Fanuc representation"
    )]
    UnsupportedMotion {
        point: PointId,
        motion_type: MotionType,
        motion_space: MotionSpace,
    },
}

#[derive(Error, Debug)]
pub enum CellError {
    #[error("cannot read cell description: {0}")]
    Io(#[from] std::io::Error),

    #[error("cell description is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
