use std::net::{IpAddr, SocketAddr, TcpListener};
use std::time::SystemTime;
use anyhow::Result;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use uuid::Uuid;
use crate::output::Stop;
use crate::plugin::{self, Error, Reader};
use crate::proto::{header, nanos, Kind, Message};

/// Accepts requests over HTTP and turns each body into a request
/// message with a fresh random id.
pub struct HttpInput {
    addr:     SocketAddr,
    rx:       Receiver<Message>,
    stop:     Stop,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl HttpInput {
    pub fn new(address: &str, handle: &Handle) -> Result<Self> {
        let address = match address.starts_with(':') {
            true  => format!("0.0.0.0{}", address),
            false => address.to_owned(),
        };

        let listener = TcpListener::bind(&address)?;
        let addr     = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let (tx, rx)                = bounded(1_000);
        let (shutdown, shutdown_rx) = oneshot::channel();

        let app = Router::new().fallback(receive).with_state(tx);

        let _guard   = handle.enter();
        let listener = tokio::net::TcpListener::from_std(listener)?;

        handle.spawn(async move {
            let service = app.into_make_service_with_connect_info::<SocketAddr>();
            let server  = axum::serve(listener, service).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });

            match server.await {
                Ok(()) => debug!("http input {} finished", addr),
                Err(e) => warn!("http input {} failed: {}", addr, e),
            }
        });

        info!("http input listening on {}", addr);

        Ok(Self {
            addr:     addr,
            rx:       rx,
            stop:     Stop::new(),
            shutdown: Mutex::new(Some(shutdown)),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Reader for HttpInput {
    fn read(&self) -> plugin::Result<Message> {
        select! {
            recv(self.stop.receiver()) -> _   => Err(Error::Stopped),
            recv(self.rx)              -> msg => msg.map_err(|_| Error::Eof),
        }
    }

    fn close(&self) {
        if self.stop.close() {
            if let Some(shutdown) = self.shutdown.lock().take() {
                let _ = shutdown.send(());
            }
        }
    }
}

impl Drop for HttpInput {
    fn drop(&mut self) {
        self.close();
    }
}

async fn receive(
    State(tx):         State<Sender<Message>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers:           HeaderMap,
    body:              Bytes,
) -> (StatusCode, &'static str) {
    let ip = headers.get("X-Real-IP")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
        .unwrap_or_else(|| peer.ip());

    let id   = Uuid::new_v4().to_string();
    let meta = header(Kind::Request, id.as_bytes(), nanos(SystemTime::now()), Some(ip));
    let msg  = Message::new(meta, body.to_vec());

    // the queue may be full, so hand off outside the async executor
    match tokio::task::spawn_blocking(move || tx.send(msg)).await {
        Ok(Ok(())) => (StatusCode::OK, "OK\n"),
        _          => (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable\n"),
    }
}
