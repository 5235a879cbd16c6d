use std::time::Duration;

use tokio::net::TcpStream;

use crate::protocol::error::{Result, TetherError};

/// Default timeout for establishing a connection (5 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connects to a remote endpoint.
///
/// The address may resolve to several socket addresses; each one is tried
/// in turn until one succeeds.
///
/// # Example
///
/// ```no_run
/// use tether_common::transport::{connect, DEFAULT_CONNECT_TIMEOUT};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let stream = connect("127.0.0.1:9999", DEFAULT_CONNECT_TIMEOUT).await?;
/// # Ok(())
/// # }
/// ```
pub async fn connect(addr: &str, timeout: Duration) -> Result<TcpStream> {
    let socket_addrs = tokio::net::lookup_host(addr)
        .await
        .map_err(|e| TetherError::Connection(format!("Invalid address '{}': {}", addr, e)))?;

    let mut last_err = None;
    for socket_addr in socket_addrs {
        match tokio::time::timeout(timeout, TcpStream::connect(socket_addr)).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Ok(Err(e)) => last_err = Some(map_io_error(e, "connecting", timeout)),
            Err(_) => last_err = Some(TetherError::Timeout(timeout.as_millis() as u64)),
        }
    }

    Err(match last_err {
        Some(TetherError::Timeout(ms)) => TetherError::Timeout(ms),
        Some(e) => TetherError::Connection(format!("Failed to connect to {}: {}", addr, e)),
        None => TetherError::Connection(format!("Failed to connect to {}: no addresses", addr)),
    })
}

/// Map IO errors to the matching `TetherError` variant
///
/// - Timeouts/would block -> `Timeout`
/// - Connection errors -> `Connection`
/// - Other IO errors -> `Io`
pub fn map_io_error(err: std::io::Error, context: &str, timeout: Duration) -> TetherError {
    match err.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
            TetherError::Timeout(timeout.as_millis() as u64)
        }
        std::io::ErrorKind::ConnectionRefused
        | std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::NotConnected => {
            TetherError::Connection(format!("{}: {}", context, err))
        }
        _ => TetherError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_to_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let stream = connect(&addr.to_string(), DEFAULT_CONNECT_TIMEOUT).await;
        assert!(stream.is_ok());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_connect_resolves_host_names() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let stream = connect(&format!("localhost:{}", port), DEFAULT_CONNECT_TIMEOUT).await;
        assert!(stream.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let result = connect("not an address", DEFAULT_CONNECT_TIMEOUT).await;
        assert!(matches!(result, Err(TetherError::Connection(_))));
    }

    #[test]
    fn test_io_error_mapping() {
        let timeout = Duration::from_millis(250);

        let err = map_io_error(std::io::ErrorKind::TimedOut.into(), "reading", timeout);
        assert!(matches!(err, TetherError::Timeout(250)));

        let err = map_io_error(std::io::ErrorKind::ConnectionReset.into(), "reading", timeout);
        assert!(matches!(err, TetherError::Connection(_)));

        let err = map_io_error(std::io::ErrorKind::PermissionDenied.into(), "reading", timeout);
        assert!(matches!(err, TetherError::Io(_)));
    }
}
