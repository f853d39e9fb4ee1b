//! Incremental-response controller.
//!
//! Turns the fragment stream of a generation capability into session state
//! (accumulated text, loading flag, error) and keeps an output region
//! following the text as it grows.

/// Submission lifecycle and stream consumption.
pub mod controller;
pub mod display;
pub mod events;
/// Scroll synchronization for the output region.
pub mod presentation;
/// Session record and its reducer.
pub mod session;

pub use controller::{CredentialSource, SubmissionController, SubmitError};
pub use display::{DisplayState, ResponsePanel};
pub use events::{StreamEventMapped, StreamEventPayload};
pub use presentation::{OutputRegion, ScrollFollower};
pub use session::{
    GENERIC_FAILURE_MESSAGE, GenerationSession, SessionChange, SessionEvent, SessionId,
    SessionRejection, SessionTransitionResult, reduce,
};
