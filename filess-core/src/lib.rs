//! Filess Core
//!
//! Resource, state and provider abstractions shared by the Filess provider,
//! its state backends and the CLI.

pub mod diagnostic;
pub mod provider;
pub mod resource;
pub mod schema;
