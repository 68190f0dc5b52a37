//! # Keywarden Core
//!
//! Shared profile model, duration handling and policy validation for the
//! keywarden key lifecycle engine. Every other crate in the workspace speaks
//! in these types; none of them own profile state.

pub mod duration;
pub mod error;
pub mod types;
pub mod validation;

pub use error::{CoreError, Result};
pub use types::{
    KeyProfile, KeyProfileSpec, KeySpec, OutputConfig, Phase, PublishTarget, RotationPolicy,
    RotationState, ServiceAccountRef, TlsConfig,
};
