use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// First byte of every record header.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Kind {
    Request          = b'1',
    Response         = b'2',
    ReplayedResponse = b'3',
}

impl Kind {
    pub fn byte(self) -> u8 {
        self as u8
    }
}

// Example:
//   3 f45590522cd1838b4a0d5c5aab80b77929dea3b3 1231 192.168.1.102\n
//
// `id` and the address text must not contain spaces or newlines.
pub fn header(kind: Kind, id: &[u8], timing: i64, ip: Option<IpAddr>) -> Vec<u8> {
    let time = timing.to_string();
    let ip   = ip.map(|ip| ip.to_string()).unwrap_or_default();

    let len = 1 + 1 + id.len() + 1 + time.len() + 1 + ip.len() + 1;

    let mut header = vec![b' '; len];
    header[0]       = kind.byte();
    header[len - 1] = b'\n';

    let id_at   = 2;
    let time_at = id_at + id.len() + 1;
    let ip_at   = time_at + time.len() + 1;

    header[id_at..id_at + id.len()].copy_from_slice(id);
    header[time_at..time_at + time.len()].copy_from_slice(time.as_bytes());
    header[ip_at..ip_at + ip.len()].copy_from_slice(ip.as_bytes());

    header
}

/// Everything after the first newline, or the whole payload if
/// there is none.
pub fn body(payload: &[u8]) -> &[u8] {
    match newline(payload) {
        Some(n) => &payload[n + 1..],
        None    => payload,
    }
}

/// Space separated header fields: kind, id, timestamp and address.
pub fn meta(payload: &[u8]) -> Vec<&[u8]> {
    let end = newline(payload).unwrap_or(0);
    payload[..end].split(|&b| b == b' ').collect()
}

/// Header (with its newline) and body. A payload without a header
/// comes back as an empty header and the full payload.
pub fn meta_with_body(payload: &[u8]) -> (&[u8], &[u8]) {
    match newline(payload) {
        Some(n) if n > 0 && payload.len() > n + 1 => payload.split_at(n + 1),
        _                                         => (&[], payload),
    }
}

pub fn is_request(payload: &[u8]) -> bool {
    payload.first() == Some(&Kind::Request.byte())
}

/// Captured addresses arrive as raw octets; anything that is not
/// 4 or 16 bytes long has no textual form.
pub fn ip_from_bytes(ip: &[u8]) -> Option<IpAddr> {
    match ip.len() {
        4  => {
            let mut octets = [0u8; 4];
            octets.copy_from_slice(ip);
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        },
        16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(ip);
            Some(IpAddr::V6(Ipv6Addr::from(octets)).to_canonical())
        },
        _  => None,
    }
}

fn newline(payload: &[u8]) -> Option<usize> {
    payload.iter().position(|&b| b == b'\n')
}
