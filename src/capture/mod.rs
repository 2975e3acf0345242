pub use datagram::Datagram;
pub use decode::{decode, Segment};
pub use listener::{record, Listener};

mod datagram;
mod decode;
mod listener;
