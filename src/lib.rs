// Internal Modules
pub mod cli;
pub mod error;
pub mod handlers;
pub mod models;
pub mod network;
pub mod sandboxed;
pub mod storage;
pub mod sync;
pub mod transfer;
pub mod utils;

// Reexportes
pub use error::{Result, SyncError};
