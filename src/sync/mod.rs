mod client;
mod content_hasher;
mod diff;
pub mod file_indexer;
mod server;
mod session;

pub use client::*;
pub use content_hasher::*;
pub use diff::*;
pub use file_indexer::{FileIndex, relative_path, scan};
pub use server::*;
pub use session::*;
