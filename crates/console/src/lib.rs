//! Dispatch console
//!
//! Watches one service request's realtime events and keeps a bounded history.

pub mod config;
pub mod history;
pub mod monitor;

pub use config::ConsoleConfig;
pub use history::EventHistory;
pub use monitor::ConnectionMonitor;
