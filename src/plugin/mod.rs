use crate::proto::Message;

pub use error::Error;
pub use registry::{init, Plugins};

pub type Result<T> = std::result::Result<T, Error>;

/// Source of messages. Blocks until one is available or the
/// plugin is closed.
pub trait Reader: Send + Sync {
    fn read(&self) -> Result<Message>;

    fn close(&self) {}
}

/// Destination of messages, returning the number of bytes accepted.
pub trait Writer: Send + Sync {
    fn write(&self, msg: Message) -> Result<usize>;

    fn close(&self) {}
}

mod error;
mod registry;
