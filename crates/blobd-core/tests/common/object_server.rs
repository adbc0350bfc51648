//! Minimal HTTP/1.1 object server for integration tests.
//!
//! Serves one body for every path except those containing `missing` (404).
//! Honours `Range: bytes=X-` with 206 and can trickle the body out in chunks
//! so a transfer is still running when a test pauses it. Ranged responses can
//! be cut short to simulate a connection lost mid-resume.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct ObjectServerOptions {
    /// Bytes written per chunk.
    pub chunk_size: usize,
    /// Pause between chunks.
    pub chunk_delay: Duration,
}

impl Default for ObjectServerOptions {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            chunk_delay: Duration::ZERO,
        }
    }
}

pub struct ObjectServer {
    pub endpoint: String,
    ranged_requests: Arc<AtomicUsize>,
    ranged_cutoff: Arc<AtomicUsize>,
}

const NO_CUTOFF: usize = usize::MAX;

impl ObjectServer {
    /// Number of GETs that carried a Range header.
    pub fn ranged_requests(&self) -> usize {
        self.ranged_requests.load(Ordering::SeqCst)
    }

    /// Ranged responses announce the full length but close after `bytes`.
    pub fn cut_ranged_responses_after(&self, bytes: usize) {
        self.ranged_cutoff.store(bytes, Ordering::SeqCst);
    }

    pub fn serve_full_ranges(&self) {
        self.ranged_cutoff.store(NO_CUTOFF, Ordering::SeqCst);
    }
}

/// Starts a server in a background thread serving `body`.
/// The server runs until the process exits.
pub fn start(body: Vec<u8>, opts: ObjectServerOptions) -> ObjectServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let ranged = Arc::new(AtomicUsize::new(0));
    let cutoff = Arc::new(AtomicUsize::new(NO_CUTOFF));
    let ranged_srv = Arc::clone(&ranged);
    let cutoff_srv = Arc::clone(&cutoff);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let ranged = Arc::clone(&ranged_srv);
            let cutoff = cutoff_srv.load(Ordering::SeqCst);
            thread::spawn(move || handle(stream, &body, opts, &ranged, cutoff));
        }
    });
    ObjectServer {
        endpoint: format!("http://127.0.0.1:{}", port),
        ranged_requests: ranged,
        ranged_cutoff: cutoff,
    }
}

fn handle(
    mut stream: std::net::TcpStream,
    body: &[u8],
    opts: ObjectServerOptions,
    ranged: &AtomicUsize,
    ranged_cutoff: usize,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let (path, range_start) = parse_request(request);
    if path.contains("missing") {
        let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\n\r\nnot found");
        return;
    }
    let total = body.len();
    let (status, slice, sent) = match range_start {
        Some(start) => {
            ranged.fetch_add(1, Ordering::SeqCst);
            if start >= total {
                let _ = stream.write_all(
                    format!("HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{}\r\nContent-Length: 0\r\n\r\n", total)
                        .as_bytes(),
                );
                return;
            }
            (
                format!("206 Partial Content\r\nContent-Range: bytes {}-{}/{}", start, total - 1, total),
                &body[start..],
                ranged_cutoff.min(total - start),
            )
        }
        None => ("200 OK".to_string(), body, total),
    };
    let head = format!("HTTP/1.1 {}\r\nContent-Length: {}\r\n\r\n", status, slice.len());
    if stream.write_all(head.as_bytes()).is_err() {
        return;
    }
    for chunk in slice[..sent].chunks(opts.chunk_size.max(1)) {
        if stream.write_all(chunk).and_then(|_| stream.flush()).is_err() {
            return;
        }
        if !opts.chunk_delay.is_zero() {
            thread::sleep(opts.chunk_delay);
        }
    }
}

/// Returns (path, optional start offset for `Range: bytes=X-`).
fn parse_request(request: &str) -> (String, Option<usize>) {
    let mut lines = request.lines();
    let path = lines
        .next()
        .and_then(|l| l.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    let mut range = None;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                let value = value.trim();
                if let Some(spec) = value.strip_prefix("bytes=") {
                    if let Some((a, _)) = spec.split_once('-') {
                        range = a.trim().parse::<usize>().ok();
                    }
                }
            }
        }
    }
    (path, range)
}
