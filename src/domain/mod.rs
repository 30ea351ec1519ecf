//! Domain layer for the fixloop engine
//!
//! Core models, the ports adapters implement, and domain errors.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
