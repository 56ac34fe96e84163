//! ciceron-core - Core types and traits for the Ciceron tourism assistant
//!
//! This crate provides the domain types, capability traits, configuration
//! and error handling shared by the retrieval pipeline and its backends.

pub mod config;
pub mod error;
pub mod similarity;
pub mod text;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::{CiceronError, Result};
pub use traits::*;
pub use types::*;
