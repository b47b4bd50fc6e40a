mod settings;
mod snapshot;

pub use settings::*;
pub use snapshot::*;
