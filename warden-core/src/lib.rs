//! Warden core library: script registry, configuration, errors.
//!
//! - [`types`]: newtypes and domain structs
//! - [`config`]: [`Config`], loaded from the store directory
//! - [`error`]: [`RegistryError`]
//! - [`registry`]: add / list over the symlink store

pub mod config;
pub mod error;
pub mod registry;
pub mod types;

pub use config::Config;
pub use error::RegistryError;
pub use types::{ProcessTitle, ScriptEntry, ScriptName};
