use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, UNIX_EPOCH};
use anyhow::Result;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tokio::runtime::Runtime;
use crate::capture::Datagram;
use crate::emitter::copy_multi;
use crate::plugin::{Error, Reader, Writer};
use crate::proto::{header, meta, Kind, Message};
use crate::settings::{HttpConfig, UdpConfig};
use super::{HttpOutput, NullOutput, Queue, Stats, Stop, UdpOutput, SEPARATOR};

const WAIT: Duration = Duration::from_secs(5);

struct Request {
    head: String,
    body: Vec<u8>,
}

const OK: &str = "HTTP/1.1 200 OK\r\nContent-Length: 4\r\nX-Test: yes\r\nConnection: close\r\n\r\npong";
const REDIRECT: &str = "HTTP/1.1 302 Found\r\nLocation: /next\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

/// Minimal HTTP responder. Each request is reported, then held until
/// the gate yields or is dropped.
fn server(reply: &'static str, gate: Option<Receiver<()>>) -> Result<(String, Receiver<Request>)> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let url      = format!("http://{}/", listener.local_addr()?);
    let (tx, rx) = unbounded();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(_)     => return,
            };
            let tx   = tx.clone();
            let gate = gate.clone();
            thread::spawn(move || handle(stream, tx, gate, reply));
        }
    });

    Ok((url, rx))
}

fn handle(mut stream: TcpStream, tx: Sender<Request>, gate: Option<Receiver<()>>, reply: &str) -> io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut head   = String::new();
    let mut length = 0;

    loop {
        let mut line = String::new();
        reader.read_line(&mut line)?;
        if line == "\r\n" || line.is_empty() {
            break;
        }
        let lower = line.to_ascii_lowercase();
        if let Some(n) = lower.strip_prefix("content-length:") {
            length = n.trim().parse().unwrap_or(0);
        }
        head.push_str(&lower);
    }

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body)?;
    let _ = tx.send(Request { head, body });

    if let Some(gate) = gate {
        let _ = gate.recv();
    }

    stream.write_all(reply.as_bytes())?;
    stream.flush()
}

fn echo() -> Result<SocketAddr> {
    let sock = UdpSocket::bind("127.0.0.1:0")?;
    let addr = sock.local_addr()?;
    thread::spawn(move || {
        let mut buf = [0u8; 2048];
        while let Ok((n, peer)) = sock.recv_from(&mut buf) {
            let mut reply = b"echo:".to_vec();
            reply.extend_from_slice(&buf[..n]);
            let _ = sock.send_to(&reply, peer);
        }
    });
    Ok(addr)
}

fn request(id: &str, body: &str) -> Message {
    let ip = "10.1.2.3".parse().ok();
    Message::new(header(Kind::Request, id.as_bytes(), 1, ip), body.as_bytes().to_vec())
}

fn http_config(min: usize, max: usize, queue: usize) -> HttpConfig {
    HttpConfig {
        workers_min: min,
        workers_max: max,
        queue_len:   queue,
        ..Default::default()
    }
}

fn eventually<F: Fn() -> bool>(f: F) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if f() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    false
}

struct Feed {
    queue: Mutex<VecDeque<Message>>,
}

impl Reader for Feed {
    fn read(&self) -> crate::plugin::Result<Message> {
        self.queue.lock().pop_front().ok_or(Error::Eof)
    }
}

#[test]
fn queue_backpressure() -> Result<()> {
    let queue = Arc::new(Queue::new(1));
    let stop  = Arc::new(Stop::new());

    queue.push(1, &stop)?;

    let (done_tx, done_rx) = bounded(1);
    let (q, s) = (queue.clone(), stop.clone());
    thread::spawn(move || {
        let _ = done_tx.send(q.push(2, &s));
    });

    assert!(done_rx.recv_timeout(Duration::from_millis(200)).is_err());
    assert_eq!(Ok(1), queue.pop(&stop));
    assert_eq!(Ok(Ok(())), done_rx.recv_timeout(WAIT));
    assert_eq!(Ok(2), queue.pop(&stop));

    Ok(())
}

#[test]
fn queue_close_wakes_push() -> Result<()> {
    let queue = Arc::new(Queue::new(1));
    let stop  = Arc::new(Stop::new());

    queue.push(1, &stop)?;

    let (done_tx, done_rx) = bounded(1);
    let (q, s) = (queue.clone(), stop.clone());
    thread::spawn(move || {
        let _ = done_tx.send(q.push(2, &s));
    });

    assert!(done_rx.recv_timeout(Duration::from_millis(200)).is_err());
    stop.close();

    assert_eq!(Ok(Err(Error::Stopped)), done_rx.recv_timeout(WAIT));
    assert_eq!(1, queue.len());

    Ok(())
}

#[test]
fn queue_stop() -> Result<()> {
    let queue = Queue::new(1);
    let stop  = Stop::new();

    queue.push("a", &stop)?;
    assert!(stop.close());
    assert!(!stop.close());

    assert_eq!(Err(Error::Stopped), queue.push("b", &stop));
    assert_eq!(1, queue.len());

    Ok(())
}

#[test]
fn stats_summary() {
    let interval = Duration::from_secs(5);
    let stats = Stats::new("output_test", interval);
    stats.write(2);
    stats.write(4);
    stats.write(0);
    assert_eq!("output_test:0,3,4,3,0", stats.summary(interval));
}

#[test]
fn null_output_length() -> Result<()> {
    let msg = request("id", "payload");
    let len = msg.len();
    assert_eq!(len + SEPARATOR.len(), NullOutput::new().write(msg)?);
    assert_eq!("\n🐵🙈🙉\n".as_bytes(), SEPARATOR);
    Ok(())
}

#[test]
fn udp_response_tracking() -> Result<()> {
    let addr   = echo()?;
    let config = UdpConfig { workers: 2, ..Default::default() };
    let output = UdpOutput::new(&addr.to_string(), config)?;

    let msg = request("abc", "ping");
    assert_eq!(msg.len(), output.write(msg)?);

    let reply  = output.read()?;
    let fields = meta(&reply.meta);
    assert_eq!(b"3", fields[0]);
    assert_eq!(b"abc", fields[1]);
    assert_eq!(b"echo:ping".to_vec(), reply.data);

    Writer::close(&output);
    assert_eq!(Err(Error::Stopped), output.read());

    Ok(())
}

#[test]
fn udp_skips_responses() -> Result<()> {
    let addr   = echo()?;
    let config = UdpConfig { workers: 1, ignore_response: true, ..Default::default() };
    let output = UdpOutput::new(&addr.to_string(), config)?;

    let msg = Message::new(header(Kind::Response, b"id", 1, None), b"data".to_vec());
    assert_eq!(4, output.write(msg)?);
    assert_eq!(0, output.queued());

    assert_eq!(Err(Error::Stopped), output.read());

    Ok(())
}

#[test]
fn udp_write_after_close() -> Result<()> {
    let addr   = echo()?;
    let output = UdpOutput::new(&addr.to_string(), UdpConfig::default())?;
    Writer::close(&output);
    assert_eq!(Err(Error::Stopped), output.write(request("id", "x")));
    Ok(())
}

#[test]
fn udp_fixed_workers() -> Result<()> {
    let addr   = echo()?;
    let config = UdpConfig { workers: 3, ignore_response: true, ..Default::default() };
    let output = UdpOutput::new(&addr.to_string(), config)?;

    assert!(eventually(|| output.active() == 3));
    thread::sleep(Duration::from_millis(2_500));
    assert_eq!(3, output.active());

    Ok(())
}

#[test]
fn udp_dynamic_floor() -> Result<()> {
    let addr   = echo()?;
    let config = UdpConfig { ignore_response: true, ..Default::default() };
    let output = UdpOutput::new(&addr.to_string(), config)?;

    assert!(eventually(|| output.active() == 10));
    assert!(eventually(|| output.active() == 1));

    thread::sleep(Duration::from_millis(2_500));
    assert_eq!(1, output.active());

    Ok(())
}

#[test]
fn udp_dynamic_growth() -> Result<()> {
    // never answers, so every worker waits out its timeout
    let silent = UdpSocket::bind("127.0.0.1:0")?;
    let config = UdpConfig { timeout: Duration::from_secs(2), ..Default::default() };
    let output = UdpOutput::new(&silent.local_addr()?.to_string(), config)?;

    assert!(eventually(|| output.active() == 10));

    for i in 0..40 {
        output.write(request(&i.to_string(), "x"))?;
    }

    assert!(eventually(|| output.active() > 10));

    Ok(())
}

#[test]
fn udp_end_to_end() -> Result<()> {
    let addr   = echo()?;
    let config = UdpConfig { workers: 1, ..Default::default() };
    let output = Arc::new(UdpOutput::new(&addr.to_string(), config)?);

    let start = UNIX_EPOCH + Duration::from_secs(1);
    let seg   = |sport: u16, dport: u16, data: &[u8]| {
        let mut seg = Vec::new();
        seg.extend_from_slice(&sport.to_be_bytes());
        seg.extend_from_slice(&dport.to_be_bytes());
        seg.extend_from_slice(&(8 + data.len() as u16).to_be_bytes());
        seg.extend_from_slice(&[0, 0]);
        seg.extend_from_slice(data);
        seg
    };

    let req = Datagram::new(&seg(5000, 53, b"query"), &[10, 0, 0, 1], &[10, 0, 0, 2], true, start);
    let rsp = Datagram::new(&seg(53, 5000, b"reply"), &[10, 0, 0, 2], &[10, 0, 0, 1], false, start);
    let id  = req.id();

    let feed = Feed {
        queue: Mutex::new(vec![Message::from(req), Message::from(rsp)].into()),
    };

    let writers = vec![output.clone() as Arc<dyn Writer>];
    copy_multi(&feed, &writers)?;

    let reply = output.read()?;
    assert_eq!(&id[..], meta(&reply.meta)[1]);
    assert_eq!(b"echo:query".to_vec(), reply.data);

    let (tx, rx) = bounded(1);
    let reader = output.clone();
    thread::spawn(move || {
        let _ = tx.send(reader.read());
    });
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

    Writer::close(&*output);
    assert_eq!(Ok(Err(Error::Stopped)), rx.recv_timeout(WAIT));

    Ok(())
}

#[test]
fn http_single_worker() -> Result<()> {
    let rt = Runtime::new()?;
    let (gate_tx, gate_rx) = unbounded();
    let (url, requests) = server(OK, Some(gate_rx))?;

    let output = Arc::new(HttpOutput::new(&url, http_config(1, 1, 1), rt.handle().clone())?);

    output.write(request("one", "first body"))?;

    let first = requests.recv_timeout(WAIT)?;
    assert!(first.head.starts_with("post / http/1.1"));
    assert!(first.head.contains("content-type: application/octet-stream"));
    assert!(first.head.contains("x-real-ip: 10.1.2.3"));
    assert_eq!(b"first body".to_vec(), first.body);

    output.write(request("two", "second body"))?;

    let (done_tx, done_rx) = bounded(1);
    let writer = output.clone();
    thread::spawn(move || {
        let _ = done_tx.send(writer.write(request("three", "third body")));
    });

    assert!(done_rx.recv_timeout(Duration::from_millis(300)).is_err());
    assert!(requests.try_recv().is_err());
    assert_eq!(1, output.active());

    gate_tx.send(())?;

    assert!(done_rx.recv_timeout(WAIT)?.is_ok());
    assert_eq!(b"second body".to_vec(), requests.recv_timeout(WAIT)?.body);

    drop(gate_tx);
    assert_eq!(b"third body".to_vec(), requests.recv_timeout(WAIT)?.body);
    assert_eq!(1, output.active());

    Writer::close(&*output);

    Ok(())
}

#[test]
fn http_close_pending_write() -> Result<()> {
    let rt = Runtime::new()?;
    let (gate_tx, gate_rx) = unbounded::<()>();
    let (url, requests) = server(OK, Some(gate_rx))?;

    let config = HttpConfig {
        timeout: Duration::from_secs(1),
        ..http_config(1, 1, 1)
    };
    let output = Arc::new(HttpOutput::new(&url, config, rt.handle().clone())?);

    output.write(request("one", "a"))?;
    requests.recv_timeout(WAIT)?;
    output.write(request("two", "b"))?;

    let (done_tx, done_rx) = bounded(1);
    let writer = output.clone();
    thread::spawn(move || {
        let _ = done_tx.send(writer.write(request("three", "c")));
    });

    assert!(done_rx.recv_timeout(Duration::from_millis(300)).is_err());

    Writer::close(&*output);
    Writer::close(&*output);

    assert_eq!(Err(Error::Stopped), done_rx.recv_timeout(WAIT)?);
    assert_eq!(Err(Error::Stopped), output.write(request("four", "d")));

    drop(gate_tx);
    thread::sleep(Duration::from_millis(100));

    Ok(())
}

#[test]
fn http_close_waits_for_send() -> Result<()> {
    let rt = Runtime::new()?;
    let (gate_tx, gate_rx) = unbounded::<()>();
    let (url, requests) = server(OK, Some(gate_rx))?;

    let output = HttpOutput::new(&url, http_config(1, 2, 10), rt.handle().clone())?;

    output.write(request("one", "a"))?;
    requests.recv_timeout(WAIT)?;

    thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        drop(gate_tx);
    });

    let start = Instant::now();
    Writer::close(&output);

    assert!(start.elapsed() >= Duration::from_millis(150));
    assert!(output.wait(Duration::from_millis(0)));

    drop(rt);

    Ok(())
}

#[test]
fn http_worker_bounds() -> Result<()> {
    let rt = Runtime::new()?;
    let (gate_tx, gate_rx) = unbounded::<()>();
    let (url, requests) = server(OK, Some(gate_rx))?;

    let config = HttpConfig {
        worker_timeout: Duration::from_millis(200),
        ..http_config(1, 3, 100)
    };
    let output = HttpOutput::new(&url, config, rt.handle().clone())?;
    assert_eq!(1, output.active());

    for i in 0..10 {
        output.write(request(&i.to_string(), "burst"))?;
        assert!(output.active() <= 3);
    }

    for _ in 0..3 {
        requests.recv_timeout(WAIT)?;
    }
    assert!(requests.recv_timeout(Duration::from_millis(300)).is_err());
    assert_eq!(3, output.active());

    drop(gate_tx);

    for _ in 3..10 {
        requests.recv_timeout(WAIT)?;
    }

    assert!(eventually(|| output.active() == 1));
    thread::sleep(Duration::from_millis(500));
    assert_eq!(1, output.active());

    Ok(())
}

#[test]
fn http_response_tracking() -> Result<()> {
    let rt = Runtime::new()?;
    let (url, requests) = server(OK, None)?;

    let config = HttpConfig {
        track_responses: true,
        ..http_config(1, 1, 10)
    };
    let output = HttpOutput::new(&url, config, rt.handle().clone())?;

    output.write(request("abc", "ping"))?;
    requests.recv_timeout(WAIT)?;

    let reply  = output.read()?;
    let fields = meta(&reply.meta);
    assert_eq!(b"3", fields[0]);
    assert_eq!(b"abc", fields[1]);

    let dump = String::from_utf8(reply.data)?;
    assert!(dump.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(dump.contains("x-test: yes\r\n"));
    assert!(dump.ends_with("\r\n\r\npong"));

    Ok(())
}

#[test]
fn http_without_tracking() -> Result<()> {
    let rt = Runtime::new()?;
    let (url, requests) = server(OK, None)?;
    let output = HttpOutput::new(&url, http_config(1, 1, 10), rt.handle().clone())?;

    let reply = Message::new(header(Kind::ReplayedResponse, b"id", 1, None), b"skip".to_vec());
    assert_eq!(4, output.write(reply)?);
    assert_eq!(Err(Error::Stopped), output.read());

    output.write(Message::new(b"1 id\n".to_vec(), b"short meta".to_vec()))?;
    let req = requests.recv_timeout(WAIT)?;
    assert!(!req.head.contains("x-real-ip"));
    assert_eq!(b"short meta".to_vec(), req.body);

    Ok(())
}

#[test]
fn http_host_header() -> Result<()> {
    let rt = Runtime::new()?;
    let (url, requests) = server(OK, None)?;
    let output = HttpOutput::new(&url, http_config(1, 1, 10), rt.handle().clone())?;

    output.write(request("id", "x"))?;
    let req  = requests.recv_timeout(WAIT)?;
    let host = url.trim_start_matches("http://").trim_end_matches('/');
    assert!(req.head.contains(&format!("host: {}", host)));

    Ok(())
}

#[test]
fn http_redirect_limit() -> Result<()> {
    let rt = Runtime::new()?;

    for &(limit, expect) in &[(0usize, 1usize), (1, 1), (2, 2), (3, 3)] {
        let (url, requests) = server(REDIRECT, None)?;
        let config = HttpConfig {
            track_responses: true,
            redirect_limit:  limit,
            ..http_config(1, 1, 10)
        };
        let output = HttpOutput::new(&url, config, rt.handle().clone())?;

        output.write(request("id", "x"))?;

        let reply = output.read()?;
        assert!(String::from_utf8(reply.data)?.starts_with("HTTP/1.1 302 Found"));

        let mut seen = 0;
        while requests.recv_timeout(Duration::from_millis(300)).is_ok() {
            seen += 1;
        }
        assert_eq!(expect, seen);
    }

    Ok(())
}

#[test]
fn http_bad_url() {
    let rt = Runtime::new().unwrap();
    assert!(HttpOutput::new("http://", HttpConfig::default(), rt.handle().clone()).is_err());
}
