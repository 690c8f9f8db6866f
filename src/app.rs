//! A single Server Instance: one bound TCP listener serving HTTP/1.x with a
//! shared [`Handler`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hello_ports::app::Server;
//! use hello_ports::handler::hello_world;
//!
//! # async fn run() -> hello_ports::error::ServerResult<()> {
//! let server = Server::bind("127.0.0.1:8000".parse().unwrap(), Arc::new(hello_world)).await?;
//! server.serve().await
//! # }
//! ```

use crate::error::{ServerError, ServerResult};
use crate::handler::{Handler, HttpResponse};
use crate::http::request::read_line;
use crate::http::{Method, Request, Response};
use futures::FutureExt;
use std::io;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::Instrument;

pub const SERVER_NAME: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Pause after a failed `accept()`, so errors like EMFILE do not spin.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct Server {
    pub max_connections: usize,
    pub keep_alive: Duration,
    listener: TcpListener,
    local_addr: SocketAddr,
    handler: Arc<dyn Handler>,
}

impl Server {
    /// Binds `addr`. Failure is reported as [`ServerError::Bind`].
    pub async fn bind(addr: SocketAddr, handler: Arc<dyn Handler>) -> ServerResult<Server> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Self {
            max_connections: 256,
            keep_alive: Duration::from_secs(5),
            listener,
            local_addr,
            handler,
        })
    }

    pub fn max_connections(&mut self, max_connections: usize) -> &mut Self {
        self.max_connections = max_connections;
        self
    }

    pub fn keep_alive(&mut self, keep_alive: Duration) -> &mut Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections forever, one task per connection. At most
    /// `max_connections` are handled at once; the rest wait in the backlog.
    pub async fn serve(self) -> ServerResult<()> {
        let limiter = Arc::new(Semaphore::new(self.max_connections.max(1)));
        tracing::info!(addr = %self.local_addr, "Listening");

        loop {
            let Ok(permit) = Arc::clone(&limiter).acquire_owned().await else {
                return Ok(());
            };

            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let handler = Arc::clone(&self.handler);
                    let keep_alive = self.keep_alive;
                    let span = tracing::debug_span!(
                        "connection",
                        port = self.local_addr.port(),
                        %peer
                    );

                    tokio::spawn(
                        async move {
                            tracing::debug!("Accepted connection");
                            if let Err(e) = handle_connection(stream, handler, keep_alive).await {
                                tracing::debug!(error = %e, "Connection error");
                            }
                            drop(permit);
                        }
                        .instrument(span),
                    );
                }
                Err(e) => accept_failed(self.local_addr, &e).await,
            }
        }
    }
}

async fn accept_failed(addr: SocketAddr, err: &io::Error) {
    tracing::warn!(%addr, error = %err, "Connection failed");
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}

/// Serves requests off one connection until the peer closes it, asks for
/// `Connection: close`, idles past `keep_alive`, or sends a request that
/// cannot be answered in-line.
///
/// `keep_alive` only bounds the wait for the first byte of each request.
pub async fn handle_connection<S>(
    stream: S,
    handler: Arc<dyn Handler>,
    keep_alive: Duration,
) -> ServerResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    loop {
        match tokio::time::timeout(keep_alive, reader.fill_buf()).await {
            Err(_) => {
                tracing::debug!("Idle timeout");
                break;
            }
            Ok(Ok(buf)) if buf.is_empty() => break,
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(ServerError::IoError(e)),
        }

        let request = match read_request(&mut reader).await {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(ServerError::IoError(e)) => return Err(ServerError::IoError(e)),
            Err(err) => {
                tracing::info!(status = err.status_code(), error = %err, "Rejected request");
                let mut response = Response::error(err);
                response.stamp(SERVER_NAME).keep_alive(false);
                write_half.write_all(&response.to_bytes(true)).await?;
                break;
            }
        };

        let include_body = request.method != Method::HEAD;
        let method = request.method.clone();
        let path = request.path.clone();
        let version = request.version;
        let wants_keep_alive = request.wants_keep_alive();

        let (mut response, keep) = match dispatch(&handler, request).await {
            Ok(response) => (response, wants_keep_alive),
            Err(err) => {
                let keep = wants_keep_alive && err.is_recoverable();
                (Response::error(err), keep)
            }
        };
        tracing::info!(
            %method,
            %path,
            version = version.as_str(),
            status = response.status,
            "Request"
        );

        response.stamp(SERVER_NAME).keep_alive(keep);
        write_half.write_all(&response.to_bytes(include_body)).await?;
        write_half.flush().await?;

        if !keep {
            break;
        }
    }

    write_half.shutdown().await?;
    Ok(())
}

// Reads a request head and discards any body, framed by chunked
// Transfer-Encoding or Content-Length, so the next request on the
// connection starts at a message boundary.
async fn read_request<R>(reader: &mut R) -> ServerResult<Option<Request>>
where
    R: AsyncBufRead + Unpin,
{
    let Some(request) = Request::read_from(reader).await? else {
        return Ok(None);
    };

    let complete = if request.is_chunked()? {
        drain_chunked(reader).await?
    } else {
        drain_exact(reader, request.content_length()?).await?
    };
    Ok(complete.then_some(request))
}

// Returns false when the peer hung up before `length` bytes arrived.
async fn drain_exact<R>(reader: &mut R, length: u64) -> ServerResult<bool>
where
    R: AsyncBufRead + Unpin,
{
    if length == 0 {
        return Ok(true);
    }
    let drained = tokio::io::copy(&mut (&mut *reader).take(length), &mut tokio::io::sink()).await?;
    Ok(drained == length)
}

async fn drain_chunked<R>(reader: &mut R) -> ServerResult<bool>
where
    R: AsyncBufRead + Unpin,
{
    let too_long = || ServerError::BadRequest("Chunk line too long".to_string());

    loop {
        let Some(line) = read_line(reader, too_long).await? else {
            return Ok(false);
        };
        let line = String::from_utf8_lossy(&line);
        let size = line.split(';').next().unwrap_or_default().trim();
        let size = u64::from_str_radix(size, 16)
            .map_err(|_| ServerError::BadRequest(format!("Invalid chunk size ('{}')", size)))?;

        if size == 0 {
            // Trailer fields up to the terminating blank line.
            loop {
                match read_line(reader, too_long).await? {
                    None => return Ok(false),
                    Some(trailer) if trailer.is_empty() => return Ok(true),
                    Some(_) => {}
                }
            }
        }

        if !drain_exact(reader, size).await? {
            return Ok(false);
        }
        match read_line(reader, too_long).await? {
            None => return Ok(false),
            Some(end) if end.is_empty() => {}
            Some(_) => {
                return Err(ServerError::BadRequest("Chunk data overruns its size".to_string()))
            }
        }
    }
}

async fn dispatch(handler: &Arc<dyn Handler>, mut req: Request) -> HttpResponse {
    match req.method {
        Method::GET => {}
        Method::HEAD => req.method = Method::GET,
        _ => return Err(ServerError::NotImplemented(req.method.to_string())),
    }

    match AssertUnwindSafe(handler.handle(req)).catch_unwind().await {
        Ok(response) => response,
        Err(err) => {
            let panic_msg = if let Some(msg) = err.downcast_ref::<&str>() {
                msg.to_string()
            } else if let Some(msg) = err.downcast_ref::<String>() {
                msg.clone()
            } else {
                "Unknown panic".to_string()
            };
            Err(ServerError::PanicError(panic_msg))
        }
    }
}
