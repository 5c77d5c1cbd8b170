//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves bodies by request path (query string ignored) from a map the test
//! can change while the server runs. Paths marked failing answer 500; unknown
//! paths answer 404. Every request target is recorded.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Default)]
struct State {
    files: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
    requests: Vec<String>,
}

#[derive(Clone)]
pub struct FileServer {
    base: String,
    state: Arc<Mutex<State>>,
}

impl FileServer {
    /// Starts a server in a background thread. The server runs until the process exits.
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(State::default()));
        let shared = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let state = Arc::clone(&shared);
                thread::spawn(move || handle(stream, &state));
            }
        });
        Self {
            base: format!("http://127.0.0.1:{}/", port),
            state,
        }
    }

    /// Base URL with trailing slash, e.g. "http://127.0.0.1:12345/".
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path.trim_start_matches('/'))
    }

    pub fn put(&self, path: &str, body: impl Into<Vec<u8>>) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(key(path), body.into());
    }

    pub fn delete(&self, path: &str) {
        self.state.lock().unwrap().files.remove(&key(path));
    }

    pub fn fail(&self, path: &str) {
        self.state.lock().unwrap().failing.insert(key(path));
    }

    pub fn heal(&self, path: &str) {
        self.state.lock().unwrap().failing.remove(&key(path));
    }

    /// Request targets seen so far (path and query).
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Requests for `path`, ignoring any query string.
    pub fn hits(&self, path: &str) -> usize {
        let want = key(path);
        self.requests()
            .iter()
            .filter(|r| key(r.split('?').next().unwrap_or(r)) == want)
            .count()
    }
}

fn key(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

fn handle(mut stream: std::net::TcpStream, state: &Mutex<State>) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) => return,
        Ok(n) => n,
        Err(_) => return,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let (method, target) = parse_request_line(request);
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        return;
    }

    let path = key(target.split('?').next().unwrap_or(target));
    let (status, body) = {
        let mut st = state.lock().unwrap();
        st.requests.push(target.to_string());
        if st.failing.contains(&path) {
            ("500 Internal Server Error", b"failing".to_vec())
        } else {
            match st.files.get(&path) {
                Some(body) => ("200 OK", body.clone()),
                None => ("404 Not Found", b"not found".to_vec()),
            }
        }
    };
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(&body);
}

/// Returns (method, request target) from the request line.
fn parse_request_line(request: &str) -> (&str, &str) {
    let mut parts = request.lines().next().unwrap_or("").split_whitespace();
    let method = parts.next().unwrap_or("");
    let target = parts.next().unwrap_or("/");
    (method, target)
}
