mod log;
mod unwrap_or_exit;

pub use log::*;
pub use unwrap_or_exit::*;
