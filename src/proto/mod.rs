pub use header::{body, header, is_request, meta, meta_with_body};
pub use header::{ip_from_bytes, Kind};
pub use message::{nanos, Message, Response};

mod header;
mod message;
