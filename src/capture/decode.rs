use pnet::packet::ethernet::{EthernetPacket, EtherTypes};
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::udp::UdpPacket;
use pnet::packet::vlan::VlanPacket;

/// Addresses and raw UDP bytes lifted out of a link-layer frame.
#[derive(Debug)]
pub struct Segment<'a> {
    pub src: Vec<u8>,
    pub dst: Vec<u8>,
    pub udp: &'a [u8],
}

impl<'a> Segment<'a> {
    pub fn ports(&self) -> Option<(u16, u16)> {
        let udp = UdpPacket::new(self.udp)?;
        Some((udp.get_source(), udp.get_destination()))
    }
}

pub fn decode(frame: &[u8]) -> Option<Segment> {
    let eth = EthernetPacket::new(frame)?;

    let mut ethertype = eth.get_ethertype();
    let mut offset    = EthernetPacket::minimum_packet_size();

    while ethertype == EtherTypes::Vlan {
        let vlan  = VlanPacket::new(&frame[offset..])?;
        ethertype = vlan.get_ethertype();
        offset   += VlanPacket::minimum_packet_size();
    }

    match ethertype {
        EtherTypes::Ipv4 => ipv4(&frame[offset..]),
        EtherTypes::Ipv6 => ipv6(&frame[offset..]),
        _                => None,
    }
}

fn ipv4(payload: &[u8]) -> Option<Segment> {
    let pkt = Ipv4Packet::new(payload)?;
    let n   = pkt.get_header_length() as usize * 4;

    if pkt.get_next_level_protocol() == IpNextHeaderProtocols::Ipv4 {
        return ipv4(payload.get(n..)?);
    }

    if !udp(pkt.get_next_level_protocol()) {
        return None;
    }

    // ethernet pads short frames past the end of the datagram
    let end = (pkt.get_total_length() as usize).min(payload.len());

    Some(Segment {
        src: pkt.get_source().octets().to_vec(),
        dst: pkt.get_destination().octets().to_vec(),
        udp: payload.get(n..end)?,
    })
}

fn ipv6(payload: &[u8]) -> Option<Segment> {
    let pkt = Ipv6Packet::new(payload)?;

    if !udp(pkt.get_next_header()) {
        return None;
    }

    let n   = Ipv6Packet::minimum_packet_size();
    let end = (n + pkt.get_payload_length() as usize).min(payload.len());

    Some(Segment {
        src: pkt.get_source().octets().to_vec(),
        dst: pkt.get_destination().octets().to_vec(),
        udp: &payload[n..end],
    })
}

fn udp(protocol: IpNextHeaderProtocol) -> bool {
    protocol == IpNextHeaderProtocols::Udp
}
