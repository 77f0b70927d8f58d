//! # cglimits-common
//!
//! Shared utilities and types for the cglimits workspace.
//!
//! This crate provides:
//! - The error taxonomy used by limit lookups and pressure monitoring
//! - The filesystem layout of the pseudo-files cglimits reads

#![warn(missing_docs)]

pub mod error;
pub mod paths;

pub use error::{LimitsError, LimitsResult};
pub use paths::SysPaths;
