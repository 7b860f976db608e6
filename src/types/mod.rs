//! Core types shared across the crate.
//!
//! - [`id`]: identifier types (`ObjectId`, `ExpectationId`, `Time`)
//! - [`status`]: aggregate status and per-expectation state
//! - [`cancel`]: the cancellable one-shot capability

pub mod cancel;
pub mod id;
pub mod status;

pub use cancel::Cancellable;
pub(crate) use cancel::{Phase, PhaseCell};
pub use id::{ExpectationId, ObjectId, Time};
pub use status::{DetectionStatus, ExpectationKind, ExpectationState};
