use std::io::{self, Write};
use crate::plugin::{Result, Writer};
use crate::proto::Message;

pub const SEPARATOR: &[u8] = "\n🐵🙈🙉\n".as_bytes();

/// Prints every message to stdout, for inspecting inputs.
pub struct StdOutput;

impl StdOutput {
    pub fn new() -> Self {
        StdOutput
    }
}

impl Writer for StdOutput {
    fn write(&self, msg: Message) -> Result<usize> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        out.write_all(&msg.meta)?;
        out.write_all(&msg.data)?;
        out.write_all(SEPARATOR)?;
        Ok(msg.len() + SEPARATOR.len())
    }
}

/// Drops everything.
pub struct NullOutput;

impl NullOutput {
    pub fn new() -> Self {
        NullOutput
    }
}

impl Writer for NullOutput {
    fn write(&self, msg: Message) -> Result<usize> {
        Ok(msg.len() + SEPARATOR.len())
    }
}
