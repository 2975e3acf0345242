pub use http::HttpOutput;
pub use queue::{Queue, Stop};
pub use stats::Stats;
pub use stdout::{NullOutput, StdOutput, SEPARATOR};
pub use udp::UdpOutput;

mod http;
mod queue;
mod stats;
mod stdout;
mod udp;

#[cfg(test)]
mod test;
