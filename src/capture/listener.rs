use std::io::ErrorKind;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, SystemTime};
use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, info, warn};
use pnet::datalink::{self, Channel, Config, DataLinkReceiver, NetworkInterface};
use super::{decode, Datagram};

/// Live UDP capture on every interface that carries `host`.
pub struct Listener {
    rx:   Receiver<Datagram>,
    stop: Arc<AtomicBool>,
}

impl Listener {
    pub fn new(host: &str, port: u16, track_response: bool) -> Result<Self> {
        let (tx, rx) = bounded(1_000);
        let stop     = Arc::new(AtomicBool::new(false));

        for link in interfaces(host)? {
            let name = link.name.clone();
            let task = Task::new(&link, port, track_response, tx.clone(), stop.clone())?;

            thread::spawn(move || {
                info!("capturing udp port {} on {}", port, name);
                match task.poll() {
                    Ok(()) => debug!("capture {} finished", name),
                    Err(e) => warn!("capture {} stopped: {:?}", name, e),
                }
            });
        }

        Ok(Self { rx, stop })
    }

    pub fn receiver(&self) -> Receiver<Datagram> {
        self.rx.clone()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

struct Task {
    rx:    Box<dyn DataLinkReceiver>,
    port:  u16,
    track: bool,
    tx:    Sender<Datagram>,
    stop:  Arc<AtomicBool>,
}

impl Task {
    fn new(link: &NetworkInterface, port: u16, track: bool, tx: Sender<Datagram>, stop: Arc<AtomicBool>) -> Result<Self> {
        let cfg = Config {
            read_timeout: Some(Duration::from_millis(100)),
            ..Default::default()
        };

        let rx = match datalink::channel(link, cfg)? {
            Channel::Ethernet(_, rx) => rx,
            _                        => return Err(anyhow!("link {} not ethernet", link.name)),
        };

        Ok(Self { rx, port, track, tx, stop })
    }

    fn poll(mut self) -> Result<()> {
        while !self.stop.load(Ordering::Acquire) {
            let frame = match self.rx.next() {
                Ok(frame)                   => frame,
                Err(e) if timeout(e.kind()) => continue,
                Err(e)                      => return Err(e.into()),
            };

            if let Some(dgram) = record(frame, self.port, self.track) {
                if self.tx.send(dgram).is_err() {
                    break;
                }
            }
        }
        Ok(())
    }
}

/// Datagrams sent to `port` are requests; with `track` set, datagrams
/// sent from it are kept as responses.
pub fn record(frame: &[u8], port: u16, track: bool) -> Option<Datagram> {
    let seg = decode(frame)?;
    let (src, dst) = seg.ports()?;

    let incoming = match (src, dst) {
        (_, dst) if dst == port => true,
        (src, _) if src == port => false,
        _                       => return None,
    };

    if !incoming && !track {
        return None;
    }

    Some(Datagram::new(seg.udp, &seg.src, &seg.dst, incoming, SystemTime::now()))
}

fn interfaces(host: &str) -> Result<Vec<NetworkInterface>> {
    let addr = match host {
        ""          => None,
        "localhost" => Some(IpAddr::from([127, 0, 0, 1])),
        host        => Some(host.parse::<IpAddr>()?),
    };

    let links = datalink::interfaces().into_iter().filter(|link| {
        link.is_up() && match addr {
            Some(addr) if !addr.is_unspecified() => link.ips.iter().any(|net| net.ip() == addr),
            _                                    => true,
        }
    }).collect::<Vec<_>>();

    match links.is_empty() {
        true  => Err(anyhow!("no interface carries '{}'", host)),
        false => Ok(links),
    }
}

fn timeout(kind: ErrorKind) -> bool {
    kind == ErrorKind::TimedOut || kind == ErrorKind::WouldBlock
}
