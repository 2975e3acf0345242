use anyhow::{anyhow, Result};
use crossbeam_channel::{select, Receiver};
use log::info;
use crate::capture::{Datagram, Listener};
use crate::output::Stop;
use crate::plugin::{self, Error, Reader};
use crate::proto::Message;

/// Captured UDP traffic for one `host:port`. Requests are datagrams
/// sent to the port; responses are only reported with tracking on.
pub struct UdpInput {
    rx:       Receiver<Datagram>,
    stop:     Stop,
    _capture: Listener,
}

impl UdpInput {
    pub fn new(address: &str, track_response: bool) -> Result<Self> {
        let (host, port) = split(address)?;

        info!("listening for traffic on: {}", address);
        let capture = Listener::new(host, port, track_response)?;

        Ok(Self {
            rx:       capture.receiver(),
            stop:     Stop::new(),
            _capture: capture,
        })
    }
}

impl Reader for UdpInput {
    fn read(&self) -> plugin::Result<Message> {
        select! {
            recv(self.stop.receiver()) -> _     => Err(Error::Stopped),
            recv(self.rx)              -> dgram => dgram.map(Message::from).map_err(|_| Error::Eof),
        }
    }

    fn close(&self) {
        self.stop.close();
    }
}

/// Split `host:port`, where host may be empty or a bracketed IPv6
/// address.
pub fn split(address: &str) -> Result<(&str, u16)> {
    let (host, port) = address.rsplit_once(':').ok_or_else(|| {
        anyhow!("missing port in address '{}'", address)
    })?;

    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port = port.parse().map_err(|_| anyhow!("invalid port in address '{}'", address))?;

    Ok((host, port))
}
