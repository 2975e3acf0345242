use std::fmt;
use std::time::SystemTime;
use log::warn;
use pnet::packet::Packet;
use pnet::packet::udp::UdpPacket;
use sha1::{Digest, Sha1};
use crate::proto::{self, header, ip_from_bytes, Kind, Message};

/// A UDP datagram seen on the wire, before correlation.
#[derive(Clone, Debug)]
pub struct Datagram {
    pub incoming: bool,
    pub start:    SystemTime,
    pub src_ip:   Vec<u8>,
    pub dst_ip:   Vec<u8>,
    pub src_port: u16,
    pub dst_port: u16,
    length:       u16,
    checksum:     u16,
    data:         Vec<u8>,
}

impl Datagram {
    /// Decode the UDP header at the front of `segment`. A segment too
    /// short to hold one still yields a datagram, with zeroed header
    /// fields and no payload.
    pub fn new(segment: &[u8], src_ip: &[u8], dst_ip: &[u8], incoming: bool, start: SystemTime) -> Self {
        let (src_port, dst_port, length, checksum, data) = match UdpPacket::new(segment) {
            Some(udp) => (
                udp.get_source(),
                udp.get_destination(),
                udp.get_length(),
                udp.get_checksum(),
                udp.payload().to_vec(),
            ),
            None => {
                warn!("error decoding udp segment of {} bytes", segment.len());
                (0, 0, 0, 0, Vec::new())
            }
        };

        Self {
            incoming: incoming,
            start:    start,
            src_ip:   src_ip.to_vec(),
            dst_ip:   dst_ip.to_vec(),
            src_port: src_port,
            dst_port: dst_port,
            length:   length,
            checksum: checksum,
            data:     data,
        }
    }

    /// SHA-1 over the decimal start time, source port, destination port
    /// and declared length, hex encoded.
    ///
    /// Ports are hashed in wire order, so a request and its reply (ports
    /// swapped) get different ids unless they are paired by the caller.
    pub fn id(&self) -> Vec<u8> {
        let key = format!("{}{}{}{}", proto::nanos(self.start), self.src_port, self.dst_port, self.length);
        let sha = Sha1::digest(key.as_bytes());
        hex::encode(sha).into_bytes()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn length(&self) -> u16 {
        self.length
    }

    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    pub fn kind(&self) -> Kind {
        match self.incoming {
            true  => Kind::Request,
            false => Kind::Response,
        }
    }
}

impl From<Datagram> for Message {
    fn from(dgram: Datagram) -> Self {
        let ip   = ip_from_bytes(&dgram.src_ip);
        let meta = header(dgram.kind(), &dgram.id(), proto::nanos(dgram.start), ip);
        Message::new(meta, dgram.data)
    }
}

impl fmt::Display for Datagram {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SrcPort: {} | DstPort: {} | Length: {} | Checksum: {} | Data: {}",
               self.src_port, self.dst_port, self.length, self.checksum,
               String::from_utf8_lossy(&self.data))
    }
}
