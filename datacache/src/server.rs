//! The request server: a connection-per-request line protocol over TCP.
//! Each accepted connection is handled by a task drawn from a
//! `tokio::sync::Semaphore`-bounded pool, the async idiom for a bounded
//! worker pool standing in for a thread-pool executor.

use datacache_common::consts::MAX_REQUEST_LINE_BYTES;
use datacache_common::protocol::{Response, parse_request};
use datacache_core::{AdmitResult, CacheCoordinator, CheckResult};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

/// Bounded read timeout for a single connection, from the first byte to the
/// newline.
const CONNECTION_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Accept loop: binds `addr`, then services connections until `shutdown`
/// resolves. Each connection is handled non-blockingly with respect to the
/// loader — a handler never awaits a load finishing, it dispatches into the
/// coordinator and returns.
pub async fn serve(
    addr: &str,
    coordinator: Arc<CacheCoordinator>,
    worker_pool_size: usize,
    shutdown: impl std::future::Future<Output = ()>,
) -> io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    let permits = Arc::new(Semaphore::new(worker_pool_size.max(1)));
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        continue;
                    }
                };

                let coordinator = Arc::clone(&coordinator);
                let permits = Arc::clone(&permits);
                tokio::spawn(async move {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .expect("semaphore is never closed while the accept loop runs");
                    if let Err(e) = handle_connection(stream, peer, &coordinator).await {
                        tracing::debug!(%peer, error = %e, "connection ended with an error");
                    }
                });
            }
            _ = &mut shutdown => {
                tracing::info!("accept loop stopping for shutdown");
                return Ok(());
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    coordinator: &CacheCoordinator,
) -> io::Result<()> {
    let span = tracing::info_span!("connection", %peer);
    let _enter = span.enter();

    let line = match read_request_line(&mut stream).await {
        Ok(line) => line,
        Err(e) => {
            tracing::warn!(error = %e, "failed to read request line");
            let _ = write_response(&mut stream, &Response::Invalid).await;
            return Ok(());
        }
    };

    let response = match parse_request(line.trim()) {
        Ok(request) => {
            tracing::debug!(command = ?request, "dispatching");
            dispatch(coordinator, &request)
        }
        Err(e) => {
            tracing::warn!(error = %e, raw = %line, "protocol violation");
            Response::Invalid
        }
    };

    write_response(&mut stream, &response).await
}

/// Read one line, up to [`MAX_REQUEST_LINE_BYTES`], framed by the first
/// newline or end-of-stream. A line exceeding the byte limit without a
/// newline is treated as malformed.
async fn read_request_line(stream: &mut TcpStream) -> io::Result<String> {
    let read = tokio::time::timeout(CONNECTION_READ_TIMEOUT, async {
        let mut buf = Vec::with_capacity(128);
        let mut byte = [0u8; 1];
        loop {
            if buf.len() >= MAX_REQUEST_LINE_BYTES {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "request line exceeds maximum length",
                ));
            }
            match stream.read(&mut byte).await? {
                0 => break, // end-of-stream
                _ if byte[0] == b'\n' => break,
                _ => buf.push(byte[0]),
            }
        }
        Ok(buf)
    })
    .await
    .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connection read timed out"))??;

    String::from_utf8(read)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

async fn write_response(stream: &mut TcpStream, response: &Response) -> io::Result<()> {
    stream.write_all(response.to_string().as_bytes()).await?;
    stream.flush().await
}

/// Dispatch a parsed request into the coordinator, holding the coordinator
/// lock only for the duration of the state transition it invokes. Any
/// coordinator error becomes `INVALID_REQUEST` — none of these are fatal.
fn dispatch(coordinator: &CacheCoordinator, request: &datacache_common::protocol::Request) -> Response {
    use datacache_common::protocol::Request;

    match request {
        Request::Request { id } => match coordinator.request(id) {
            Ok(AdmitResult::Ready(descriptor)) => Response::Ready(descriptor),
            Ok(AdmitResult::Wait) => Response::Wait,
            Err(e) => {
                tracing::error!(id = %id, error = %e, "request admission failed");
                Response::Invalid
            }
        },
        Request::Check { id } => match coordinator.check(id) {
            CheckResult::Ready(descriptor) => Response::Ready(descriptor),
            CheckResult::Wait => Response::Wait,
            CheckResult::Unknown => Response::Invalid,
        },
        Request::Complete { id } => match coordinator.complete(id) {
            Ok(()) => Response::Ack,
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "complete rejected");
                Response::Invalid
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::sync_channel;

    async fn roundtrip(addr: &str, line: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(line.as_bytes()).await.unwrap();
        stream.write_all(b"\n").await.unwrap();
        stream.shutdown().await.unwrap();
        let mut out = String::new();
        stream.read_to_string(&mut out).await.unwrap();
        out
    }

    async fn spawn_test_server(
        coordinator: Arc<CacheCoordinator>,
    ) -> (String, tokio::sync::oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let addr_for_server = addr.clone();
        let server = tokio::spawn(async move {
            serve(&addr_for_server, coordinator, 4, async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        (addr, shutdown_tx, server)
    }

    #[tokio::test]
    async fn invalid_command_yields_invalid_request() {
        let data_dir = tempfile::tempdir().unwrap();
        let (job_sender, _job_receiver) = sync_channel(8);
        let coordinator = Arc::new(CacheCoordinator::new(
            1024,
            data_dir.path().to_path_buf(),
            "bin".to_string(),
            job_sender,
        ));

        let (addr, shutdown_tx, server) = spawn_test_server(coordinator).await;
        let response = roundtrip(&addr, "FOO#bar").await;
        assert_eq!(response, "INVALID_REQUEST");

        let _ = shutdown_tx.send(());
        let _ = server.await;
    }

    #[tokio::test]
    async fn complete_for_never_requested_id_is_invalid() {
        let data_dir = tempfile::tempdir().unwrap();
        let (job_sender, _job_receiver) = sync_channel(8);
        let coordinator = Arc::new(CacheCoordinator::new(
            1024,
            data_dir.path().to_path_buf(),
            "bin".to_string(),
            job_sender,
        ));

        let (addr, shutdown_tx, server) = spawn_test_server(coordinator).await;
        let response = roundtrip(&addr, "COMPLETE#never_requested").await;
        assert_eq!(response, "INVALID_REQUEST");

        let _ = shutdown_tx.send(());
        let _ = server.await;
    }

    #[tokio::test]
    async fn request_for_missing_dataset_file_is_invalid() {
        let data_dir = tempfile::tempdir().unwrap();
        let (job_sender, _job_receiver) = sync_channel(8);
        let coordinator = Arc::new(CacheCoordinator::new(
            1024,
            data_dir.path().to_path_buf(),
            "bin".to_string(),
            job_sender,
        ));

        let (addr, shutdown_tx, server) = spawn_test_server(coordinator).await;
        let response = roundtrip(&addr, "REQUEST#nonexistent").await;
        assert_eq!(response, "INVALID_REQUEST");

        let _ = shutdown_tx.send(());
        let _ = server.await;
    }

    #[tokio::test]
    async fn request_for_readable_dataset_waits_until_loaded() {
        let data_dir = tempfile::tempdir().unwrap();
        std::fs::write(data_dir.path().join("abc.bin"), vec![0u8; 64]).unwrap();

        let (job_sender, job_receiver) = sync_channel(8);
        let coordinator = Arc::new(CacheCoordinator::new(
            1 << 20,
            data_dir.path().to_path_buf(),
            "bin".to_string(),
            job_sender,
        ));

        let (addr, shutdown_tx, server) = spawn_test_server(Arc::clone(&coordinator)).await;
        let response = roundtrip(&addr, "REQUEST#abc").await;
        assert_eq!(response, "WAIT");
        assert!(job_receiver.try_recv().is_ok(), "a load job should have been enqueued");

        let _ = shutdown_tx.send(());
        let _ = server.await;
    }
}
