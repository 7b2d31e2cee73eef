//! Application layer: the conversion orchestrator and its collaborators.

pub mod convert;
pub mod document;
pub mod engine;
pub mod error;
pub mod wait;
