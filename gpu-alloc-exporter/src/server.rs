//! Prometheus metrics HTTP endpoint

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use gpu_alloc_core::AllocationRegistry;

/// Upper bound on the request head read before routing
const MAX_REQUEST_HEAD: usize = 8192;

/// Time a client gets to send its request head
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// How a request is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    /// Metrics exposition; `head` suppresses the body
    Metrics { head: bool },
    NotFound,
    MethodNotAllowed,
    BadRequest,
}

/// Route a request by its request line
fn route(request: &str, metrics_path: &str) -> Route {
    let mut parts = request.lines().next().unwrap_or_default().split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return Route::BadRequest;
    };

    let path = target.split('?').next().unwrap_or(target);
    if path != metrics_path {
        return Route::NotFound;
    }
    match method {
        "GET" => Route::Metrics { head: false },
        "HEAD" => Route::Metrics { head: true },
        _ => Route::MethodNotAllowed,
    }
}

/// Metrics server bound to its listening socket
pub struct MetricsServer {
    listener: TcpListener,
    registry: Arc<AllocationRegistry>,
    path: Arc<str>,
}

impl MetricsServer {
    /// Bind the listener; fails if the address is unavailable
    pub async fn bind(
        bind_address: &str,
        port: u16,
        path: &str,
        registry: Arc<AllocationRegistry>,
    ) -> Result<Self> {
        let addr = format!("{}:{}", bind_address, port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind metrics endpoint on {}", addr))?;

        Ok(Self {
            listener,
            registry,
            path: Arc::from(path),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read metrics listener address")
    }

    /// Accept and answer scrape requests until the task is dropped
    pub async fn serve(self) {
        info!(addr = ?self.listener.local_addr().ok(), path = %self.path, "Metrics server listening");

        loop {
            let (socket, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "Failed to accept metrics connection");
                    continue;
                }
            };

            let registry = self.registry.clone();
            let path = self.path.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(socket, &registry, &path).await {
                    debug!(peer = %peer, error = %e, "Metrics connection failed");
                }
            });
        }
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    registry: &AllocationRegistry,
    metrics_path: &str,
) -> Result<()> {
    let raw = tokio::time::timeout(REQUEST_READ_TIMEOUT, read_request_head(&mut socket))
        .await
        .context("Timed out reading request")??;
    let request = String::from_utf8_lossy(&raw);

    let response = match route(&request, metrics_path) {
        Route::Metrics { head } => match registry.render().await {
            Ok(body) => response("200 OK", &registry.content_type(), &body, !head),
            Err(e) => {
                error!(error = %e, "Failed to encode metrics");
                response("500 Internal Server Error", "text/plain; charset=utf-8", "", true)
            }
        },
        Route::NotFound => {
            response("404 Not Found", "text/plain; charset=utf-8", "Not Found\n", true)
        }
        Route::MethodNotAllowed => response(
            "405 Method Not Allowed",
            "text/plain; charset=utf-8",
            "Method Not Allowed\n",
            true,
        ),
        Route::BadRequest => response("400 Bad Request", "text/plain; charset=utf-8", "", true),
    };

    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await?;
    Ok(())
}

/// Read until the blank line ending the request head, EOF or the size cap
async fn read_request_head(socket: &mut TcpStream) -> Result<Vec<u8>> {
    let mut head = Vec::with_capacity(1024);
    let mut buf = [0; 1024];
    loop {
        let read = socket.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        head.extend_from_slice(&buf[..read]);
        if head.len() >= MAX_REQUEST_HEAD || head.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    Ok(head)
}

/// Format a response; Content-Length always reflects `body`, even when
/// `send_body` is false (HEAD)
fn response(status: &str, content_type: &str, body: &str, send_body: bool) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        if send_body { body } else { "" }
    )
}
