//! Shared types for Unitas.
//!
//! The error taxonomy, the entity base contract and configuration structs used
//! by every other crate in the workspace.
//!
//! Zero infrastructure dependencies -- only serde, uuid, regex, thiserror.

pub mod config;
pub mod entity;
pub mod error;
pub mod naming;
