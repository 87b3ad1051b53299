//! TCP front end.
//!
//! Each accepted connection carries exactly one request:
//!
//! ```text
//! AWAIT_LINE -> PARSE -> DISPATCH -> RESPOND -> CLOSE
//! ```
//!
//! The accept loop hands connections to a [`WorkerPool`]; a worker reads one
//! line, runs it through the [`Dispatcher`], writes one response line and
//! closes the connection, whether or not the request succeeded.

pub mod command;
pub mod dispatcher;
pub mod pool;
pub mod response;

pub use command::{Command, InstancePath};
pub use dispatcher::{Dispatcher, SharedTree};
pub use pool::WorkerPool;

use crate::config::ServerConfig;
use crate::error::{CacheError, Result};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lower bound on how much trailing input is discarded before close.
const MIN_DRAIN_BYTES: u64 = 64 * 1024;

/// Per-connection read limits.
#[derive(Debug, Clone, Copy)]
struct ConnectionLimits {
    read_timeout: Duration,
    max_line_bytes: usize,
}

/// A bound listener plus the worker pool that serves it.
pub struct Server {
    listener: TcpListener,
    dispatcher: Dispatcher,
    pool: WorkerPool,
    limits: ConnectionLimits,
}

impl Server {
    /// Validates `config`, binds the listener and starts the workers.
    ///
    /// # Errors
    ///
    /// - `CacheError::InvalidConfig` for an unusable configuration
    /// - `CacheError::IoError` if the address cannot be bound
    pub fn bind(config: &ServerConfig, dispatcher: Dispatcher) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(&config.bind_addr)?;
        let pool = WorkerPool::new(config.workers, config.total_queue_capacity())?;
        info!(
            "Listening on {} with {} workers",
            listener.local_addr()?,
            pool.size()
        );

        Ok(Self {
            listener,
            dispatcher,
            pool,
            limits: ConnectionLimits {
                read_timeout: config.read_timeout,
                max_line_bytes: config.max_line_bytes,
            },
        })
    }

    /// Returns the bound address. Useful when binding to port 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until the listener fails or the pool shuts down.
    ///
    /// Accepting blocks while the job queue is full.
    pub fn serve(self) -> Result<()> {
        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    warn!("Accept failed: {}", err);
                    continue;
                }
            };

            let dispatcher = self.dispatcher.clone();
            let limits = self.limits;
            self.pool.execute(move || {
                if let Err(err) = handle_connection(&dispatcher, stream, limits) {
                    warn!("Connection failed: {}", err);
                }
            })?;
        }
        Ok(())
    }
}

fn handle_connection(
    dispatcher: &Dispatcher,
    mut stream: TcpStream,
    limits: ConnectionLimits,
) -> Result<()> {
    stream.set_read_timeout(Some(limits.read_timeout))?;

    let reply = match read_request_line(&stream, limits.max_line_bytes) {
        Ok(line) => dispatcher.handle(&line),
        Err(err) => {
            warn!("Unreadable request: {}", err);
            response::error(&err)
        }
    };

    stream.write_all(reply.as_bytes())?;
    stream.write_all(b"\n")?;
    stream.flush()?;

    if let Err(err) = stream.shutdown(Shutdown::Write) {
        debug!("Shutdown after reply failed: {}", err);
        return Ok(());
    }
    // Closing with unread input resets the connection and can discard the
    // reply on the client side.
    let limit = u64::try_from(limits.max_line_bytes)
        .unwrap_or(u64::MAX)
        .max(MIN_DRAIN_BYTES);
    if let Err(err) = io::copy(&mut (&stream).take(limit), &mut io::sink()) {
        debug!("Draining request input failed: {}", err);
    }
    Ok(())
}

/// Reads one `\n`-terminated line of at most `max_line_bytes` bytes.
///
/// A trailing `\r` is dropped. End of stream also ends the line.
fn read_request_line(stream: &TcpStream, max_line_bytes: usize) -> Result<String> {
    let limit = u64::try_from(max_line_bytes)
        .unwrap_or(u64::MAX)
        .saturating_add(1);
    let mut reader = BufReader::new(stream.take(limit));
    let mut buf = Vec::new();
    reader.read_until(b'\n', &mut buf)?;

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if buf.len() > max_line_bytes {
        return Err(CacheError::MalformedRequest(format!(
            "line exceeds {max_line_bytes} bytes"
        )));
    }

    String::from_utf8(buf)
        .map_err(|_| CacheError::MalformedRequest("line is not valid UTF-8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    /// Writes `payload` into a fresh socket and reads it back through `read_request_line`.
    fn read_via_socket(payload: &'static [u8], max: usize) -> Result<String> {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let writer = thread::spawn(move || {
            let mut client = TcpStream::connect(addr).unwrap();
            client.write_all(payload).unwrap();
            client.shutdown(Shutdown::Write).unwrap();
        });
        let (server_side, _) = listener.accept().unwrap();
        let result = read_request_line(&server_side, max);
        writer.join().unwrap();
        result
    }

    #[test]
    fn test_reads_one_line() {
        assert_eq!(read_via_socket(b"PING\nSIZE 1\n", 64).unwrap(), "PING");
        assert_eq!(read_via_socket(b"PING\r\n", 64).unwrap(), "PING");
        assert_eq!(read_via_socket(b"PING", 64).unwrap(), "PING");
    }

    #[test]
    fn test_line_at_limit_is_accepted() {
        assert_eq!(read_via_socket(b"PING\n", 4).unwrap(), "PING");
    }

    #[test]
    fn test_line_over_limit_is_rejected() {
        let err = read_via_socket(b"GETALL 1\n", 4).unwrap_err();
        assert_eq!(err.kind(), "MalformedRequest");
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let err = read_via_socket(b"PI\xffNG\n", 64).unwrap_err();
        assert_eq!(err.kind(), "MalformedRequest");
    }
}
