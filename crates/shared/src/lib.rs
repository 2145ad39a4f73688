//! ScaleHub Shared Types and Utilities
//!
//! This crate contains types, errors, and utilities shared across the ScaleHub services.

pub mod db;
pub mod error;
pub mod types;

pub use db::*;
pub use error::*;
pub use types::*;
