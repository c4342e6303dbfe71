//! Domain layer: core types, traits, and invariants

pub mod error;
pub mod experiment;

pub use error::DomainError;
