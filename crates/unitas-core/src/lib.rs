//! Storage-agnostic building blocks and repository ports for Unitas.
//!
//! This crate defines the statements repositories execute, pagination and
//! deduplication rules, the unit-of-work scope lifecycle, and the "ports"
//! (repository traits) that the infrastructure layer implements. It depends
//! only on `unitas-types` -- never on `unitas-infra` or any database crate.

pub mod dedup;
pub mod pagination;
pub mod repository;
pub mod scope;
pub mod statement;
