//! Connection handling for the host's request transport.
//!
//! Each connection carries one JSONL request and receives one JSONL response.
//! Requests that cannot be read or parsed are answered with a `400` response
//! where the stream still allows it.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use graft_components::{Request, Response};

use super::LISTENER_TARGET;
use crate::host::InProcessHost;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

const MAX_REQUEST_BYTES: usize = 64 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Stream types accepted by the request listener.
pub(crate) enum ConnectionStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl ConnectionStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.set_read_timeout(timeout),
            #[cfg(unix)]
            Self::Unix(stream) => stream.set_read_timeout(timeout),
        }
    }
}

impl Read for ConnectionStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for ConnectionStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Self::Unix(stream) => stream.flush(),
        }
    }
}

/// Handles accepted socket connections.
pub(crate) trait ConnectionHandler: Send + Sync + 'static {
    /// Handles a single connection. Implementations should avoid panicking.
    fn handle(&self, stream: ConnectionStream);
}

/// Reads one request line, serves it through the host and writes the
/// response line.
pub(crate) struct RequestConnectionHandler {
    host: Arc<InProcessHost>,
}

impl RequestConnectionHandler {
    pub(crate) fn new(host: Arc<InProcessHost>) -> Self {
        Self { host }
    }

    fn respond(&self, line: &[u8]) -> Response {
        match parse_request(line) {
            Ok(request) => self.host.handle(request),
            Err(message) => {
                debug!(target: LISTENER_TARGET, %message, "malformed request");
                let mut response = Response::with_status(400);
                response.write(&message);
                response
            }
        }
    }
}

impl ConnectionHandler for RequestConnectionHandler {
    fn handle(&self, mut stream: ConnectionStream) {
        if let Err(error) = stream.set_read_timeout(Some(READ_TIMEOUT)) {
            warn!(target: LISTENER_TARGET, %error, "failed to set read timeout");
        }
        let response = match read_request_line(&mut stream) {
            Ok(Some(line)) => self.respond(&line),
            Ok(None) => return,
            Err(error) if error.kind() == io::ErrorKind::InvalidData => {
                let mut response = Response::with_status(400);
                response.write(&error.to_string());
                response
            }
            Err(error) => {
                warn!(target: LISTENER_TARGET, %error, "connection handler error");
                return;
            }
        };
        if let Err(error) = write_response(&mut stream, &response) {
            warn!(target: LISTENER_TARGET, %error, "connection handler error");
        }
    }
}

fn parse_request(line: &[u8]) -> Result<Request, String> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return Err(String::from("empty request line"));
    }
    let request: Request =
        serde_json::from_slice(trimmed).map_err(|error| format!("malformed request: {error}"))?;
    if !request.path().starts_with('/') {
        return Err(format!("request path '{}' must start with '/'", request.path()));
    }
    Ok(request)
}

fn write_response(stream: &mut ConnectionStream, response: &Response) -> io::Result<()> {
    let mut payload = serde_json::to_vec(response).map_err(io::Error::other)?;
    payload.push(b'\n');
    stream.write_all(&payload)?;
    stream.flush()
}

fn read_request_line(stream: &mut ConnectionStream) -> io::Result<Option<Vec<u8>>> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 1024];
    loop {
        let bytes_read = read_chunk_with_retry(stream, &mut chunk)?;
        let Some(read) = chunk.get(..bytes_read) else {
            return Err(io::Error::other("reader reported more bytes than buffered"));
        };

        if read.is_empty() {
            return Ok((!buffer.is_empty()).then_some(buffer));
        }

        if let Some(pos) = read.iter().position(|byte| *byte == b'\n') {
            buffer.extend(read.iter().take(pos + 1));
            enforce_request_limit(buffer.len())?;
            return Ok(Some(buffer));
        }

        buffer.extend_from_slice(read);
        enforce_request_limit(buffer.len())?;
    }
}

fn read_chunk_with_retry(stream: &mut ConnectionStream, chunk: &mut [u8]) -> io::Result<usize> {
    loop {
        match stream.read(chunk) {
            Ok(read) => return Ok(read),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(error),
        }
    }
}

fn enforce_request_limit(size: usize) -> io::Result<()> {
    if size > MAX_REQUEST_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "request exceeds maximum size",
        ));
    }
    Ok(())
}
