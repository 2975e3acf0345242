pub use http::HttpInput;
pub use udp::{split, UdpInput};

mod http;
mod udp;
