use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use log::{debug, warn};
use crate::plugin::{self, Error, Reader, Writer};
use crate::proto::{is_request, meta, Message, Response};
use crate::settings::UdpConfig;
use super::{Queue, Stats, Stop};

const INITIAL_WORKERS: usize    = 10;
const QUEUE_LEN:       usize    = 10_000;
const IDLE_TICK:       Duration = Duration::from_millis(100);
const IDLE_LIMIT:      usize    = 20;

/// Replays requests to a UDP address. With `workers` unset the pool
/// grows while the queue outpaces it and idle workers exit after about
/// two seconds, never leaving fewer than one.
pub struct UdpOutput {
    inner: Arc<Inner>,
}

struct Inner {
    address:   SocketAddr,
    config:    UdpConfig,
    active:    AtomicUsize,
    queue:     Queue<Message>,
    responses: Option<Queue<Response>>,
    need_tx:   Sender<usize>,
    need_rx:   Receiver<usize>,
    stop:      Stop,
    stats:     Option<Stats>,
}

enum Wake {
    Message(Message),
    Idle,
    Stop,
}

impl UdpOutput {
    pub fn new(address: &str, config: UdpConfig) -> Result<Self> {
        let address = resolve(address)?;

        let (need_tx, need_rx) = bounded(1);

        let responses = match config.ignore_response {
            true  => None,
            false => Some(Queue::new(QUEUE_LEN)),
        };

        let stats = match config.stats {
            true  => Some(Stats::new("output_udp", Duration::from_secs(5))),
            false => None,
        };

        let initial = match config.workers {
            0 => INITIAL_WORKERS,
            n => n,
        };
        need_tx.send(initial)?;

        let inner = Arc::new(Inner {
            address:   address,
            config:    config,
            active:    AtomicUsize::new(0),
            queue:     Queue::new(QUEUE_LEN),
            responses: responses,
            need_tx:   need_tx,
            need_rx:   need_rx,
            stop:      Stop::new(),
            stats:     stats,
        });

        let master = inner.clone();
        thread::spawn(move || master.master());

        Ok(Self { inner })
    }

    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    pub fn queued(&self) -> usize {
        self.inner.queue.len()
    }
}

impl Inner {
    fn dynamic(&self) -> bool {
        self.config.workers == 0
    }

    fn master(self: Arc<Self>) {
        loop {
            let need = select! {
                recv(self.need_rx)         -> n => n.ok(),
                recv(self.stop.receiver()) -> _ => None,
            };

            let need = match need {
                Some(n) => n,
                None    => return,
            };

            debug!("starting {} udp workers", need);
            for _ in 0..need {
                self.active.fetch_add(1, Ordering::SeqCst);
                let inner = self.clone();
                thread::spawn(move || inner.worker());
            }

            if !self.dynamic() {
                return;
            }
        }
    }

    fn worker(self: Arc<Self>) {
        let client = match Client::new(self.address, self.config.timeout) {
            Ok(client) => client,
            Err(e)     => {
                warn!("[UDP-OUTPUT] client for {} failed: {}", self.address, e);
                self.active.fetch_sub(1, Ordering::SeqCst);
                return;
            }
        };

        let mut idle = 0;

        loop {
            match self.wait() {
                Wake::Message(msg) => {
                    self.send(&client, msg);
                    idle = 0;
                },
                Wake::Idle if self.dynamic() => {
                    idle += 1;
                    if idle > IDLE_LIMIT && self.retire() {
                        return;
                    }
                },
                Wake::Idle => (),
                Wake::Stop => break,
            }
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    fn wait(&self) -> Wake {
        select! {
            recv(self.queue.receiver()) -> msg => msg.map(Wake::Message).unwrap_or(Wake::Stop),
            recv(self.stop.receiver())  -> _   => Wake::Stop,
            default(IDLE_TICK)                 => Wake::Idle,
        }
    }

    /// Leave the pool unless this is the last worker.
    fn retire(&self) -> bool {
        self.active.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            match n > 1 {
                true  => Some(n - 1),
                false => None,
            }
        }).is_ok()
    }

    fn send(&self, client: &Client, msg: Message) {
        let responses = match &self.responses {
            Some(responses) => responses,
            None            => {
                if let Err(e) = client.send(&msg.data) {
                    warn!("[UDP-OUTPUT] error when sending: {}", e);
                }
                return;
            }
        };

        let started = SystemTime::now();
        let timer   = Instant::now();

        let payload = match client.request(&msg.data) {
            Ok(payload) => payload,
            Err(e)      => {
                warn!("[UDP-OUTPUT] error when sending: {}", e);
                return;
            }
        };

        let response = Response {
            payload:    payload,
            id:         id(&msg.meta),
            started_at: started,
            elapsed:    timer.elapsed(),
        };

        if responses.push(response, &self.stop).is_err() {
            debug!("[UDP-OUTPUT] closed, response dropped");
        }
    }
}

impl Writer for UdpOutput {
    fn write(&self, msg: Message) -> plugin::Result<usize> {
        if !is_request(&msg.meta) {
            return Ok(msg.data.len());
        }

        let n = msg.len();
        self.inner.queue.push(msg, &self.inner.stop)?;

        let depth = self.inner.queue.len();

        if let Some(stats) = &self.inner.stats {
            stats.write(depth);
        }

        if self.inner.dynamic() && depth > self.active() {
            // a pending request already covers this one
            let _ = self.inner.need_tx.try_send(depth);
        }

        Ok(n)
    }

    fn close(&self) {
        self.inner.stop.close();
    }
}

impl Reader for UdpOutput {
    fn read(&self) -> plugin::Result<Message> {
        match &self.inner.responses {
            Some(responses) => Ok(responses.pop(&self.inner.stop)?.round_trip()),
            None            => Err(Error::Stopped),
        }
    }
}

impl Drop for UdpOutput {
    fn drop(&mut self) {
        self.inner.stop.close();
    }
}

/// One socket per worker, connected to the replay target.
pub struct Client {
    sock: UdpSocket,
}

impl Client {
    pub fn new(addr: SocketAddr, timeout: Duration) -> io::Result<Self> {
        let bind: SocketAddr = match addr {
            SocketAddr::V4(_) => ([0, 0, 0, 0], 0).into(),
            SocketAddr::V6(_) => ([0u16; 8], 0).into(),
        };

        let timeout = Some(timeout).filter(|t| *t > Duration::from_secs(0));

        let sock = UdpSocket::bind(bind)?;
        sock.connect(addr)?;
        sock.set_read_timeout(timeout)?;
        sock.set_write_timeout(timeout)?;

        Ok(Self { sock })
    }

    pub fn send(&self, data: &[u8]) -> io::Result<()> {
        self.sock.send(data)?;
        Ok(())
    }

    /// Send and wait for a single reply datagram.
    pub fn request(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        self.sock.send(data)?;
        let mut buf = vec![0u8; 64 * 1024];
        let n = self.sock.recv(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }
}

fn id(header: &[u8]) -> Vec<u8> {
    match meta(header).get(1) {
        Some(id) => id.to_vec(),
        None     => {
            warn!("[UDP-OUTPUT] receive meta incorrect: {}", String::from_utf8_lossy(header));
            Vec::new()
        }
    }
}

fn resolve(address: &str) -> Result<SocketAddr> {
    let address = match address.starts_with(':') {
        true  => format!("127.0.0.1{}", address),
        false => address.to_owned(),
    };
    address.to_socket_addrs()?.next().ok_or_else(|| anyhow!("unresolved address '{}'", address))
}
