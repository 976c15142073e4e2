// SPDX-License-Identifier: Apache-2.0

//! Minimal HTTP/1.0 client transport.
//!
//! One request per connection: `connect` resolves, dials, optionally
//! wraps the socket in TLS, and sends the GET in a single write. The
//! response body is framed by connection close (that is why HTTP/1.0),
//! so the only response parsing needed is finding the `\r\n\r\n` header
//! terminator. Reads are non-blocking polls; the cursor-aware byte/chunk
//! accessors refill a fixed buffer from the socket only when it runs dry.
//!
//! The wire is reached through the small [`PollRead`] seam so tests can
//! drive the exact same buffer logic with a scripted stream.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use pulljson::ByteSource;
use rustls::pki_types::ServerName;
use rustls::{ClientConnection, StreamOwned};

use crate::url::Url;

/// Size of the response chunk buffer.
pub const CHUNK_CAPACITY: usize = 2048;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);
/// Pause between polls while the peer has nothing for us yet.
const RETRY_PAUSE: Duration = Duration::from_millis(2);

/// Transport failure. Everything here fails the fetch; retry policy lives
/// with the periodic caller.
#[derive(Debug)]
pub enum HttpError {
    /// Scheme the transport does not speak (only http/https dial).
    UnsupportedScheme(String),
    /// Host did not resolve to any address.
    Dns { host: String },
    /// TCP connect failed for every resolved address.
    Connect(io::Error),
    /// Host name not usable for TLS verification.
    BadServerName(String),
    /// TLS session setup was rejected.
    Tls(rustls::Error),
    /// The TLS handshake died mid-flight.
    Handshake(io::Error),
    /// Hard socket error; the connection has been invalidated.
    Io(io::Error),
    /// Peer closed before the header terminator arrived.
    TruncatedHeader,
    /// No data within the read deadline.
    Timeout,
}

impl core::fmt::Display for HttpError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HttpError::UnsupportedScheme(s) => write!(f, "unsupported scheme {s:?}"),
            HttpError::Dns { host } => write!(f, "couldn't resolve host {host}"),
            HttpError::Connect(e) => write!(f, "connect failed: {e}"),
            HttpError::BadServerName(h) => write!(f, "invalid TLS server name {h:?}"),
            HttpError::Tls(e) => write!(f, "TLS setup failed: {e}"),
            HttpError::Handshake(e) => write!(f, "TLS handshake failed: {e}"),
            HttpError::Io(e) => write!(f, "socket error: {e}"),
            HttpError::TruncatedHeader => write!(f, "connection closed before end of header"),
            HttpError::Timeout => write!(f, "timed out waiting for response data"),
        }
    }
}

impl std::error::Error for HttpError {}

/// Outcome of one zero-wait poll of the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// This many bytes landed in the buffer.
    Data(usize),
    /// Nothing pending right now; try again later. Not end-of-stream.
    NotReady,
    /// Peer closed the connection; the body is complete.
    Closed,
}

/// Zero-wait read seam between the connection logic and the wire.
pub trait PollRead {
    fn poll_read(&mut self, buf: &mut [u8]) -> io::Result<ReadStatus>;
}

/// The real wire: plain TCP or a rustls session over it.
pub enum NetStream {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl NetStream {
    fn set_nonblocking(&self, on: bool) -> io::Result<()> {
        match self {
            NetStream::Plain(s) => s.set_nonblocking(on),
            NetStream::Tls(s) => s.sock.set_nonblocking(on),
        }
    }
}

impl Write for NetStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            NetStream::Plain(s) => s.write(buf),
            NetStream::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            NetStream::Plain(s) => s.flush(),
            NetStream::Tls(s) => s.flush(),
        }
    }
}

impl PollRead for NetStream {
    fn poll_read(&mut self, buf: &mut [u8]) -> io::Result<ReadStatus> {
        let result = match self {
            NetStream::Plain(s) => s.read(buf),
            NetStream::Tls(s) => s.read(buf),
        };
        match result {
            Ok(0) => Ok(ReadStatus::Closed),
            Ok(n) => Ok(ReadStatus::Data(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(ReadStatus::NotReady),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(ReadStatus::NotReady),
            // Servers speaking body-until-close routinely skip close_notify.
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(ReadStatus::Closed),
            Err(e) => Err(e),
        }
    }
}

/// One in-flight GET and its buffered response bytes.
pub struct HttpConnection<S = NetStream> {
    url: Url,
    /// `None` once closed or invalidated by a hard error.
    stream: Option<S>,
    /// The request bytes as sent, kept for debugging.
    message: Vec<u8>,
    chunk: [u8; CHUNK_CAPACITY],
    chunk_len: usize,
    chunk_off: usize,
    read_timeout: Duration,
    /// Hard error observed during a byte/chunk refill, kept so the caller
    /// can tell a transport failure from a clean end of body.
    last_error: Option<HttpError>,
}

impl HttpConnection<NetStream> {
    /// Resolve, dial, handshake if https, and send the request.
    pub fn connect(url: Url, agent: &str) -> Result<Self, HttpError> {
        let use_tls = match url.scheme() {
            "http" => false,
            "https" => true,
            other => return Err(HttpError::UnsupportedScheme(other.to_string())),
        };

        let addrs: Vec<_> = (url.host(), url.port())
            .to_socket_addrs()
            .map_err(|_| HttpError::Dns {
                host: url.host().to_string(),
            })?
            .collect();
        if addrs.is_empty() {
            return Err(HttpError::Dns {
                host: url.host().to_string(),
            });
        }

        let mut sock = None;
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(s) => {
                    sock = Some(s);
                    break;
                }
                Err(e) => {
                    warn!("failed connecting to {} ({addr}): {e}", url.host());
                    last_err = Some(e);
                }
            }
        }
        let sock = match sock {
            Some(s) => s,
            None => {
                return Err(HttpError::Connect(last_err.unwrap_or_else(|| {
                    io::Error::new(io::ErrorKind::NotConnected, "no addresses")
                })))
            }
        };

        let stream = if use_tls {
            NetStream::Tls(Box::new(tls_handshake(sock, url.host())?))
        } else {
            NetStream::Plain(sock)
        };

        let mut conn = HttpConnection {
            url,
            stream: Some(stream),
            message: Vec::new(),
            chunk: [0u8; CHUNK_CAPACITY],
            chunk_len: 0,
            chunk_off: 0,
            read_timeout: DEFAULT_READ_TIMEOUT,
            last_error: None,
        };
        conn.send_request(agent)?;
        Ok(conn)
    }

    fn send_request(&mut self, agent: &str) -> Result<(), HttpError> {
        let message = format!(
            "GET {} HTTP/1.0\r\nHost: {}\r\nUser-Agent: {}\r\nAccept: */*\r\n\r\n",
            self.url.path(),
            self.url.host(),
            agent
        );
        debug!(">>> [{}] {}", message.len(), message.trim_end());

        let stream = match self.stream.as_mut() {
            Some(s) => s,
            None => return Err(HttpError::Io(io::Error::from(io::ErrorKind::NotConnected))),
        };
        stream
            .write_all(message.as_bytes())
            .and_then(|()| stream.flush())
            .map_err(HttpError::Io)?;
        // The request went out over a blocking socket; every read from
        // here on is a zero-wait poll.
        stream.set_nonblocking(true).map_err(HttpError::Io)?;
        self.message = message.into_bytes();
        Ok(())
    }
}

impl<S: PollRead> HttpConnection<S> {
    #[cfg(test)]
    fn over(stream: S) -> Self {
        let url = Url::parse("http://test.invalid/").expect("static url");
        HttpConnection {
            url,
            stream: Some(stream),
            message: Vec::new(),
            chunk: [0u8; CHUNK_CAPACITY],
            chunk_len: 0,
            chunk_off: 0,
            read_timeout: DEFAULT_READ_TIMEOUT,
            last_error: None,
        }
    }

    /// Deadline for the internal retry loops in [`Self::skip_header`] and
    /// the byte/chunk refill path.
    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The request exactly as sent.
    pub fn request_bytes(&self) -> &[u8] {
        &self.message
    }

    /// Poll the wire once, without waiting. A hard error invalidates the
    /// connection; polling a closed connection reports `Closed`.
    pub fn read_some(&mut self, buf: &mut [u8]) -> Result<ReadStatus, HttpError> {
        let stream = match self.stream.as_mut() {
            Some(s) => s,
            None => return Ok(ReadStatus::Closed),
        };
        match stream.poll_read(buf) {
            Ok(status) => Ok(status),
            Err(e) => {
                self.stream = None;
                Err(HttpError::Io(e))
            }
        }
    }

    /// Read and discard the response header, leaving the chunk buffer
    /// positioned at the first body byte.
    ///
    /// The terminator may arrive split across reads, so the last three
    /// bytes of the previous read are kept in place before each refill.
    pub fn skip_header(&mut self) -> Result<(), HttpError> {
        let deadline = Instant::now() + self.read_timeout;
        loop {
            if self.chunk_len > 3 {
                let keep_from = self.chunk_len - 3;
                self.chunk.copy_within(keep_from..self.chunk_len, 0);
                self.chunk_len = 3;
            }
            match self.poll_read_at(self.chunk_len)? {
                ReadStatus::NotReady => {
                    if Instant::now() >= deadline {
                        return Err(HttpError::Timeout);
                    }
                    std::thread::sleep(RETRY_PAUSE);
                }
                ReadStatus::Closed => return Err(HttpError::TruncatedHeader),
                ReadStatus::Data(n) => {
                    trace!("<<< header chunk [{n}]");
                    self.chunk_len += n;
                    if let Some(body_at) = find_header_end(&self.chunk[..self.chunk_len]) {
                        self.chunk.copy_within(body_at..self.chunk_len, 0);
                        self.chunk_len -= body_at;
                        self.chunk_off = 0;
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Next body byte without consuming it. `None` is end of body — or a
    /// stashed transport failure; see [`Self::take_error`].
    pub fn byte_peek(&mut self) -> Option<u8> {
        self.refill()?;
        Some(self.chunk[self.chunk_off])
    }

    /// Consume and return the next body byte.
    pub fn byte_read(&mut self) -> Option<u8> {
        let byte = self.byte_peek()?;
        self.chunk_off += 1;
        Some(byte)
    }

    /// Every buffered-but-unread body byte, without consuming.
    pub fn chunk_peek(&mut self) -> Option<&[u8]> {
        self.refill()?;
        Some(&self.chunk[self.chunk_off..self.chunk_len])
    }

    /// Consume and return every buffered body byte.
    pub fn chunk_read(&mut self) -> Option<&[u8]> {
        self.refill()?;
        let from = self.chunk_off;
        self.chunk_off = self.chunk_len;
        Some(&self.chunk[from..self.chunk_len])
    }

    /// The hard error that ended the body early, if any.
    pub fn take_error(&mut self) -> Option<HttpError> {
        self.last_error.take()
    }

    /// Tear everything down. Idempotent, and safe on a connection that
    /// errored during setup.
    pub fn close(&mut self) {
        self.stream = None;
        self.message.clear();
        self.chunk_len = 0;
        self.chunk_off = 0;
    }

    /// Make sure at least one unread byte is buffered. `None` on end of
    /// body, deadline expiry, or hard error (the latter two are stashed).
    fn refill(&mut self) -> Option<()> {
        if self.chunk_off < self.chunk_len {
            return Some(());
        }
        let deadline = Instant::now() + self.read_timeout;
        loop {
            match self.poll_read_at(0) {
                Ok(ReadStatus::Data(n)) => {
                    trace!("<<< body chunk [{n}]");
                    self.chunk_len = n;
                    self.chunk_off = 0;
                    return Some(());
                }
                Ok(ReadStatus::NotReady) => {
                    if Instant::now() >= deadline {
                        self.last_error = Some(HttpError::Timeout);
                        return None;
                    }
                    std::thread::sleep(RETRY_PAUSE);
                }
                Ok(ReadStatus::Closed) => return None,
                Err(e) => {
                    self.last_error = Some(e);
                    return None;
                }
            }
        }
    }

    /// Poll into the chunk buffer starting at `start`. Hard errors
    /// invalidate the connection.
    fn poll_read_at(&mut self, start: usize) -> Result<ReadStatus, HttpError> {
        let stream = match self.stream.as_mut() {
            Some(s) => s,
            None => return Ok(ReadStatus::Closed),
        };
        match stream.poll_read(&mut self.chunk[start..]) {
            Ok(status) => Ok(status),
            Err(e) => {
                self.stream = None;
                Err(HttpError::Io(e))
            }
        }
    }
}

impl<S: PollRead> ByteSource for HttpConnection<S> {
    fn next_byte(&mut self) -> Option<u8> {
        self.byte_read()
    }

    fn peek_byte(&mut self) -> Option<u8> {
        self.byte_peek()
    }
}

impl<S> Drop for HttpConnection<S> {
    fn drop(&mut self) {
        self.stream = None;
    }
}

/// Position just past the `\r\n\r\n` header terminator, if present.
fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|at| at + 4)
}

/// Drive a rustls handshake to completion over a fresh socket. A
/// would-block result from the socket is a continuation signal, not a
/// failure.
fn tls_handshake(
    mut sock: TcpStream,
    host: &str,
) -> Result<StreamOwned<ClientConnection, TcpStream>, HttpError> {
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| HttpError::BadServerName(host.to_string()))?;

    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    );

    let mut session =
        ClientConnection::new(config, server_name).map_err(HttpError::Tls)?;
    while session.is_handshaking() {
        match session.complete_io(&mut sock) {
            Ok(_) => {}
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                continue;
            }
            Err(e) => return Err(HttpError::Handshake(e)),
        }
    }
    Ok(StreamOwned::new(session, sock))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted wire for driving the buffer logic deterministically.
    struct Scripted {
        steps: VecDeque<ScriptStep>,
    }

    enum ScriptStep {
        Data(Vec<u8>),
        NotReady,
        Closed,
        Fail(io::ErrorKind),
    }

    impl Scripted {
        fn new(steps: Vec<ScriptStep>) -> Self {
            Self {
                steps: steps.into(),
            }
        }
    }

    impl PollRead for Scripted {
        fn poll_read(&mut self, buf: &mut [u8]) -> io::Result<ReadStatus> {
            match self.steps.pop_front() {
                None | Some(ScriptStep::Closed) => Ok(ReadStatus::Closed),
                Some(ScriptStep::NotReady) => Ok(ReadStatus::NotReady),
                Some(ScriptStep::Fail(kind)) => Err(io::Error::from(kind)),
                Some(ScriptStep::Data(bytes)) => {
                    assert!(bytes.len() <= buf.len(), "script step larger than buffer");
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(ReadStatus::Data(bytes.len()))
                }
            }
        }
    }

    fn conn(steps: Vec<ScriptStep>) -> HttpConnection<Scripted> {
        HttpConnection::over(Scripted::new(steps))
    }

    fn drain(conn: &mut HttpConnection<Scripted>) -> Vec<u8> {
        let mut body = Vec::new();
        while let Some(b) = conn.byte_read() {
            body.push(b);
        }
        body
    }

    #[test]
    fn header_in_one_read() {
        let mut c = conn(vec![ScriptStep::Data(
            b"HTTP/1.0 200 OK\r\nServer: x\r\n\r\nBODY".to_vec(),
        )]);
        c.skip_header().unwrap();
        assert_eq!(drain(&mut c), b"BODY");
    }

    #[test]
    fn terminator_split_between_reads() {
        // The exact split from the transport contract: "...\r" then "\nBODY".
        let mut c = conn(vec![
            ScriptStep::Data(b"HTTP/1.0 200 OK\r\n\r".to_vec()),
            ScriptStep::Data(b"\nBODY".to_vec()),
        ]);
        c.skip_header().unwrap();
        assert_eq!(drain(&mut c), b"BODY");
    }

    #[test_log::test]
    fn terminator_split_at_every_boundary() {
        let raw = b"HTTP/1.0 200 OK\r\nContent-Type: application/json\r\n\r\n{\"ok\":1}";
        for split in 1..raw.len() {
            let mut c = conn(vec![
                ScriptStep::Data(raw[..split].to_vec()),
                ScriptStep::NotReady,
                ScriptStep::Data(raw[split..].to_vec()),
            ]);
            c.skip_header().unwrap_or_else(|e| panic!("split {split}: {e}"));
            assert_eq!(drain(&mut c), b"{\"ok\":1}", "split {split}");
        }
    }

    #[test]
    fn not_ready_reads_are_retried() {
        let mut c = conn(vec![
            ScriptStep::NotReady,
            ScriptStep::NotReady,
            ScriptStep::Data(b"HTTP/1.0 200 OK\r\n\r\nx".to_vec()),
        ]);
        c.skip_header().unwrap();
        assert_eq!(drain(&mut c), b"x");
    }

    #[test]
    fn close_before_terminator_is_a_framing_error() {
        let mut c = conn(vec![
            ScriptStep::Data(b"HTTP/1.0 200 OK\r\n".to_vec()),
            ScriptStep::Closed,
        ]);
        assert!(matches!(c.skip_header(), Err(HttpError::TruncatedHeader)));
    }

    #[test]
    fn deadline_expiry_is_a_timeout() {
        let mut c = conn(vec![ScriptStep::NotReady, ScriptStep::NotReady]);
        c.set_read_timeout(Duration::ZERO);
        assert!(matches!(c.skip_header(), Err(HttpError::Timeout)));
    }

    #[test]
    fn hard_error_during_header_invalidates() {
        let mut c = conn(vec![ScriptStep::Fail(io::ErrorKind::ConnectionReset)]);
        assert!(matches!(c.skip_header(), Err(HttpError::Io(_))));
        // Invalidated: further polls report Closed.
        let mut buf = [0u8; 8];
        assert_eq!(c.read_some(&mut buf).unwrap(), ReadStatus::Closed);
    }

    #[test]
    fn read_some_passes_status_through() {
        let mut c = conn(vec![
            ScriptStep::NotReady,
            ScriptStep::Data(b"abc".to_vec()),
            ScriptStep::Closed,
        ]);
        let mut buf = [0u8; 8];
        assert_eq!(c.read_some(&mut buf).unwrap(), ReadStatus::NotReady);
        assert_eq!(c.read_some(&mut buf).unwrap(), ReadStatus::Data(3));
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(c.read_some(&mut buf).unwrap(), ReadStatus::Closed);
    }

    #[test]
    fn byte_accessors_keep_cursor_invariants() {
        let mut c = conn(vec![
            ScriptStep::Data(b"HTTP/1.0 200 OK\r\n\r\nab".to_vec()),
            ScriptStep::Data(b"cd".to_vec()),
        ]);
        c.skip_header().unwrap();
        assert_eq!(c.byte_peek(), Some(b'a'));
        assert_eq!(c.byte_peek(), Some(b'a'));
        assert_eq!(c.byte_read(), Some(b'a'));
        assert_eq!(c.byte_read(), Some(b'b'));
        // Buffer exhausted; the next access refills from the wire.
        assert_eq!(c.byte_read(), Some(b'c'));
        assert_eq!(c.byte_read(), Some(b'd'));
        assert_eq!(c.byte_read(), None);
        assert!(c.take_error().is_none());
    }

    #[test]
    fn chunk_accessors_consume_in_slabs() {
        let mut c = conn(vec![
            ScriptStep::Data(b"HTTP/1.0 200 OK\r\n\r\nhello".to_vec()),
            ScriptStep::Data(b" world".to_vec()),
        ]);
        c.skip_header().unwrap();
        assert_eq!(c.byte_read(), Some(b'h'));
        assert_eq!(c.chunk_peek(), Some(&b"ello"[..]));
        assert_eq!(c.chunk_read(), Some(&b"ello"[..]));
        assert_eq!(c.chunk_read(), Some(&b" world"[..]));
        assert_eq!(c.chunk_read(), None);
    }

    #[test]
    fn hard_error_mid_body_is_stashed() {
        let mut c = conn(vec![
            ScriptStep::Data(b"HTTP/1.0 200 OK\r\n\r\n{\"tem".to_vec()),
            ScriptStep::Fail(io::ErrorKind::ConnectionReset),
        ]);
        c.skip_header().unwrap();
        assert_eq!(drain(&mut c), b"{\"tem");
        let err = c.take_error().expect("the reset should be stashed");
        assert!(matches!(err, HttpError::Io(_)));
        // Taken once; clean afterwards.
        assert!(c.take_error().is_none());
    }

    #[test]
    fn close_is_idempotent() {
        let mut c = conn(vec![ScriptStep::Data(b"HTTP/1.0 200 OK\r\n\r\nx".to_vec())]);
        c.close();
        c.close();
        assert_eq!(c.byte_read(), None);
        let mut buf = [0u8; 4];
        assert_eq!(c.read_some(&mut buf).unwrap(), ReadStatus::Closed);
    }

    #[test]
    fn byte_source_impl_feeds_the_parser() {
        use pulljson::{Event, JsonStream};

        let mut c = conn(vec![
            ScriptStep::Data(b"HTTP/1.0 200 OK\r\n\r\n{\"temp\"".to_vec()),
            ScriptStep::NotReady,
            ScriptStep::Data(b": 72.5}".to_vec()),
            ScriptStep::Closed,
        ]);
        c.skip_header().unwrap();
        let mut stream = JsonStream::new(&mut c);
        assert_eq!(stream.next_event().unwrap(), Event::ObjectStart);
        assert_eq!(stream.next_event().unwrap(), Event::String("temp"));
        assert_eq!(stream.next_event().unwrap(), Event::Number(72.5));
        assert_eq!(stream.next_event().unwrap(), Event::ObjectEnd);
        assert_eq!(stream.next_event().unwrap(), Event::EndDocument);
    }

    #[test]
    fn find_header_end_positions() {
        assert_eq!(find_header_end(b"\r\n\r\n"), Some(4));
        assert_eq!(find_header_end(b"x\r\n\r\ny"), Some(5));
        assert_eq!(find_header_end(b"\r\n\r"), None);
        assert_eq!(find_header_end(b""), None);
        assert_eq!(find_header_end(b"\n\n\n\n"), None);
    }
}
