//! Dispatch Console Shared Types
//!
//! This crate contains types shared between the realtime client and the console host.

pub mod types;

pub use types::*;
