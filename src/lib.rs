//! Local-first sync layer for countdown timers, countdown events and user
//! settings.
//!
//! Every entity store keeps its state in memory, writes each mutation through
//! to a local key-value store and, while a user is signed in, mirrors it to a
//! remote document store and reconciles against that store's snapshots.

pub mod app;
pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod ids;
pub mod migration;
pub mod models;
pub mod remote;
pub mod store;
pub mod sync;

pub use app::AppContext;
pub use error::{SyncError, SyncResult};
