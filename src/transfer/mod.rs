mod engine;
mod receiver;

pub use engine::*;
pub use receiver::*;
