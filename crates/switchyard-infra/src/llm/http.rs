//! HTTP plumbing shared by the provider adapters.
//!
//! Adapters issue exactly one request per call: there is no retry or
//! backoff here. Failover and retry decisions belong to the orchestrator.

use std::time::Duration;

use switchyard_types::provider::ProviderError;

/// Build the HTTP client an adapter owns.
pub(crate) fn build_client() -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| ProviderError::Unknown(format!("failed to create HTTP client: {e}")))
}

/// Normalize a transport-level failure.
pub(crate) fn map_reqwest_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(err.to_string())
    } else if err.is_connect() || err.is_request() {
        ProviderError::TransientServer(format!("HTTP request failed: {err}"))
    } else {
        ProviderError::Unknown(format!("HTTP request failed: {err}"))
    }
}

/// Read `retry-after-ms`, falling back to `retry-after` in whole seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
    };
    header("retry-after-ms")
        .map(|ms| ms as u64)
        .or_else(|| header("retry-after").map(|secs| (secs * 1000.0) as u64))
}

/// Minimal one-connection-at-a-time HTTP server for adapter tests.
///
/// Each accepted connection is handed to the supplied handler together with
/// the raw request head and body that were read from it.
#[cfg(test)]
pub(crate) mod test_server {
    use std::future::Future;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    pub struct TestServer {
        pub addr: SocketAddr,
        hits: Arc<AtomicUsize>,
    }

    impl TestServer {
        pub fn base_url(&self) -> String {
            format!("http://{}", self.addr)
        }

        pub fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    /// Serve connections with `handler` until the test ends.
    pub async fn spawn<F, Fut>(handler: F) -> TestServer
    where
        F: Fn(TcpStream) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                read_request(&mut socket).await;
                tokio::spawn(handler(socket));
            }
        });
        TestServer { addr, hits }
    }

    /// Consume one request (head plus `content-length` body) from the socket.
    pub async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = find_head_end(&buf) {
                let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                while buf.len() < end + 4 + body_len {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        return;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                return;
            }
        }
    }

    fn find_head_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|w| w == b"\r\n\r\n")
    }

    /// A complete response with a JSON body.
    pub async fn respond_json(socket: &mut TcpStream, status: &str, extra_headers: &str, body: &str) {
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n{extra_headers}\r\n{body}",
            body.len()
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
    }

    /// Start an SSE response; the caller writes events and decides when to close.
    pub async fn start_sse(socket: &mut TcpStream) {
        let head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncache-control: no-cache\r\nconnection: close\r\n\r\n";
        let _ = socket.write_all(head.as_bytes()).await;
    }

    pub async fn send_event(socket: &mut TcpStream, event: Option<&str>, data: &str) {
        let frame = match event {
            Some(name) => format!("event: {name}\ndata: {data}\n\n"),
            None => format!("data: {data}\n\n"),
        };
        let _ = socket.write_all(frame.as_bytes()).await;
        let _ = socket.flush().await;
    }

    /// Wait up to `limit` for the peer to close; true when it did.
    pub async fn peer_closed(socket: &mut TcpStream, limit: std::time::Duration) -> bool {
        let mut chunk = [0u8; 256];
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            match tokio::time::timeout_at(deadline, socket.read(&mut chunk)).await {
                Ok(Ok(0)) | Ok(Err(_)) => return true,
                Ok(Ok(_)) => continue,
                Err(_) => return false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert("retry-after", HeaderValue::from_static("2"));
        assert_eq!(parse_retry_after(&headers), Some(2_000));

        headers.insert("retry-after-ms", HeaderValue::from_static("750"));
        assert_eq!(parse_retry_after(&headers), Some(750));

        let mut junk = HeaderMap::new();
        junk.insert("retry-after", HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(parse_retry_after(&junk), None);
    }
}
