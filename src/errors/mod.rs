//! Centralized error handling for the channel VPN switcher
//!
//! Most of the engine treats missing data as an expected outcome rather than an
//! error (see [`crate::pipeline::PipelineOutcome`]). The types here cover the
//! failures that remain: host RPC faults, unreadable files and bad configuration.
//!
//! # Usage
//!
//! ```rust
//! use channel_vpn_switch::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     Err(AppError::configuration("missing data directory"))
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;
