//! Client for the local inference service.
//!
//! The service hosts the two vision models that run on every frame or event
//! without a per-call cost: the bin detector (`POST /detect`) and the binary
//! overflow classifier (`POST /classify/overflow`).

pub mod client;
pub mod error;
pub mod types;

pub use client::{InferenceClient, InferenceClientConfig};
pub use error::{MlError, MlResult};
pub use types::{DetectedBox, OverflowLabel, OverflowVerdict};
