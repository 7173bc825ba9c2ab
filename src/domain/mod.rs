//! Domain layer for tracesift
//!
//! This module contains the core data model, errors and the port traits
//! that external collaborators implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
