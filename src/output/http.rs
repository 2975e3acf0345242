use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use log::{debug, warn};
use reqwest::header::{HeaderValue, CONTENT_TYPE, HOST};
use reqwest::redirect::Policy;
use tokio::runtime::Handle;
use url::Url;
use crate::plugin::{self, Error, Reader, Writer};
use crate::proto::{is_request, meta, Message, Response};
use crate::settings::HttpConfig;
use super::{Queue, Stats, Stop};

/// Replays requests as POSTs to a URL. Starts with `workers_min`
/// workers, adds one per write while the queue is backed up, and every
/// `worker_timeout` retires workers down to the minimum while the
/// queue is empty.
pub struct HttpOutput {
    inner: Arc<Inner>,
}

struct Inner {
    config:    HttpConfig,
    client:    Client,
    handle:    Handle,
    active:    AtomicUsize,
    queue:     Queue<Message>,
    responses: Option<Queue<Response>>,
    retire_tx: Sender<()>,
    retire_rx: Receiver<()>,
    stop:      Stop,
    stats:     Option<Stats>,
}

impl HttpOutput {
    pub fn new(address: &str, config: HttpConfig, handle: Handle) -> Result<Self> {
        let config = config.normalize();
        let url    = target(address)?;
        let client = Client::new(&config, url)?;

        // unbuffered, so a retired worker has really left the pool
        let (retire_tx, retire_rx) = bounded(0);

        let responses = match config.track_responses {
            true  => Some(Queue::new(config.queue_len)),
            false => None,
        };

        let stats = match config.stats {
            true  => Some(Stats::new("output_http", Duration::from_millis(config.stats_ms))),
            false => None,
        };

        let workers = config.workers_min;

        let inner = Arc::new(Inner {
            queue:     Queue::new(config.queue_len),
            config:    config,
            client:    client,
            handle:    handle,
            active:    AtomicUsize::new(workers),
            responses: responses,
            retire_tx: retire_tx,
            retire_rx: retire_rx,
            stop:      Stop::new(),
            stats:     stats,
        });

        for _ in 0..workers {
            inner.spawn();
        }

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

    /// Wait for the master and every worker to exit after close, so no
    /// send is left inside the runtime. Returns false on timeout.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Arc::strong_count(&self.inner) > 1 {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        true
    }
}

impl Inner {
    fn spawn(self: &Arc<Self>) {
        let inner = self.clone();
        thread::spawn(move || inner.worker());
    }

    fn master(self: Arc<Self>) {
        let timeout = self.config.worker_timeout;

        loop {
            let stopped = select! {
                recv(self.stop.receiver()) -> _ => true,
                default(timeout)                => false,
            };

            if stopped {
                return;
            }

            while self.queue.is_empty() && self.shrink() {
                if !self.retire() {
                    return;
                }
            }
        }
    }

    fn worker(self: Arc<Self>) {
        while !self.stop.stopped() {
            let msg = select! {
                recv(self.retire_rx)        -> _   => None,
                recv(self.stop.receiver())  -> _   => None,
                recv(self.queue.receiver()) -> msg => msg.ok(),
            };

            match msg {
                Some(msg) => self.send(msg),
                None      => return,
            }
        }
    }

    fn grow(&self) -> bool {
        let max = self.config.workers_max;
        self.active.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            match n < max {
                true  => Some(n + 1),
                false => None,
            }
        }).is_ok()
    }

    fn shrink(&self) -> bool {
        let min = self.config.workers_min;
        self.active.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            match n > min {
                true  => Some(n - 1),
                false => None,
            }
        }).is_ok()
    }

    /// Hand one worker the signal to exit. Returns false if the output
    /// was closed first.
    fn retire(&self) -> bool {
        select! {
            send(self.retire_tx, ())   -> res => res.is_ok(),
            recv(self.stop.receiver()) -> _   => false,
        }
    }

    fn send(&self, msg: Message) {
        let Message { meta: header, data } = msg;

        let started = SystemTime::now();
        let timer   = Instant::now();

        let payload = match self.handle.block_on(self.client.send(&header, data)) {
            Ok(Some(payload)) => payload,
            Ok(None)          => return,
            Err(e)            => {
                warn!("[HTTP-OUTPUT] error when sending: {}", e);
                return;
            }
        };

        if let Some(responses) = &self.responses {
            let response = Response {
                payload:    payload,
                id:         id(&header),
                started_at: started,
                elapsed:    timer.elapsed(),
            };

            if responses.push(response, &self.stop).is_err() {
                debug!("[HTTP-OUTPUT] closed, response dropped");
            }
        }
    }
}

impl Writer for HttpOutput {
    fn write(&self, msg: Message) -> plugin::Result<usize> {
        if !is_request(&msg.meta) {
            return Ok(msg.data.len());
        }

        let n = msg.len();
        self.inner.queue.push(msg, &self.inner.stop)?;

        if let Some(stats) = &self.inner.stats {
            stats.write(self.inner.queue.len());
        }

        if !self.inner.queue.is_empty() && self.inner.grow() {
            self.inner.spawn();
        }

        Ok(n)
    }

    fn close(&self) {
        let timeout = self.inner.config.timeout;
        if self.inner.stop.close() && !self.wait(timeout) {
            warn!("[HTTP-OUTPUT] requests still in flight after {:?}", timeout);
        }
    }
}

impl Reader for HttpOutput {
    fn read(&self) -> plugin::Result<Message> {
        match &self.inner.responses {
            Some(responses) => Ok(responses.pop(&self.inner.stop)?.started()),
            None            => Err(Error::Stopped),
        }
    }
}

impl Drop for HttpOutput {
    fn drop(&mut self) {
        self.inner.stop.close();
    }
}

/// HTTP client shared by all workers of one output.
pub struct Client {
    client: reqwest::Client,
    url:    Url,
    host:   Option<HeaderValue>,
    track:  bool,
}

impl Client {
    pub fn new(config: &HttpConfig, url: Url) -> Result<Self> {
        let limit  = config.redirect_limit;
        let policy = Policy::custom(move |attempt| {
            if attempt.previous().len() >= limit {
                warn!("[HTTPCLIENT] maximum output-http-redirects[{}] reached!", limit);
                return attempt.stop();
            }
            let from = attempt.previous().last().map(Url::as_str).unwrap_or("");
            debug!("[HTTPCLIENT] HTTP redirects from {:?} to {:?} with {:?}", from, attempt.url().as_str(), attempt.status());
            attempt.follow()
        });

        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(config.timeout)
            .redirect(policy)
            .danger_accept_invalid_certs(config.skip_verify)
            .build()?;

        let host = match config.original_host {
            true  => None,
            false => Some(HeaderValue::from_str(&authority(&url)?)?),
        };

        Ok(Self {
            client: client,
            url:    url,
            host:   host,
            track:  config.track_responses,
        })
    }

    /// POST `body`, returning the dumped response when tracking.
    pub async fn send(&self, header: &[u8], body: Vec<u8>) -> plugin::Result<Option<Vec<u8>>> {
        let mut request = self.client.post(self.url.clone());
        request = request.header(CONTENT_TYPE, "application/octet-stream");

        let fields = meta(header);
        match fields.len() {
            4 => request = request.header("X-Real-IP", fields[3]),
            _ => warn!("[HTTPCLIENT] receive meta incorrect: {}", String::from_utf8_lossy(header)),
        }

        if let Some(host) = &self.host {
            request = request.header(HOST, host.clone());
        }

        let response = request.body(body).send().await?;

        if !self.track {
            return Ok(None);
        }

        Ok(Some(dump(response).await?))
    }
}

/// Status line, headers and body, as they would appear on the wire.
async fn dump(response: reqwest::Response) -> plugin::Result<Vec<u8>> {
    let status = format!("{:?} {}\r\n", response.version(), response.status());

    let mut dump = status.into_bytes();
    for (name, value) in response.headers() {
        dump.extend_from_slice(name.as_str().as_bytes());
        dump.extend_from_slice(b": ");
        dump.extend_from_slice(value.as_bytes());
        dump.extend_from_slice(b"\r\n");
    }
    dump.extend_from_slice(b"\r\n");
    dump.extend_from_slice(&response.bytes().await?);

    Ok(dump)
}

fn id(header: &[u8]) -> Vec<u8> {
    match meta(header).get(1) {
        Some(id) => id.to_vec(),
        None     => Vec::new(),
    }
}

pub fn target(address: &str) -> Result<Url> {
    let url = match address.contains("://") {
        true  => Url::parse(address)?,
        false => Url::parse(&format!("http://{}", address))?,
    };

    match url.host_str() {
        Some(_) => Ok(url),
        None    => Err(anyhow!("[OUTPUT-HTTP] no host in URL '{}'", address)),
    }
}

fn authority(url: &Url) -> Result<String> {
    let host = url.host_str().ok_or_else(|| anyhow!("no host in {}", url))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None       => host.to_owned(),
    })
}
