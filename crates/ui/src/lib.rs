#![deny(unsafe_code)]

//! Terminal front end for streamed text generation.
//!
//! Prompts come from the command line or from stdin, one per line. Responses
//! are rendered incrementally and the output follows the tail while streaming.

pub mod app;
/// Prompt text box state and resubmission policy.
pub mod input;
/// Settings persistence and credential lookup.
pub mod settings;
pub mod terminal;
