//! # Sakahan Library
//!
//! This library exposes the Sakahan modules for testing and integration.
//!
//! The main binary uses these modules through the `main.rs` entry point.

pub mod api;
pub mod cli;
pub mod config;

// Re-export sakahan_core for convenience
pub use sakahan_core;
