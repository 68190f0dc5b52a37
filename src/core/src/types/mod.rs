//! Profile model shared by the lifecycle engine
//!
//! A [`KeyProfile`] is owned by an external profile store. The engine reads
//! the spec and the current [`RotationState`] and only ever returns a proposed
//! new state; it never writes back on its own.

pub mod profile;
pub mod status;

pub use profile::{
    KeyProfile, KeyProfileSpec, KeySpec, OutputConfig, PublishTarget, RotationPolicy,
    ServiceAccountRef, TlsConfig,
};
pub use status::{Phase, RotationState};
