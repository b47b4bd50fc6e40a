mod command;
mod connection;
mod dispatcher;
mod frame;

pub use command::*;
pub use connection::*;
pub use dispatcher::*;
pub use frame::*;
