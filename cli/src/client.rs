use shared::ipc::{Command, IpcError, Response};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::{timeout, Duration};
use tracing::warn;

/// Bound on each of connect, write and read.
const SOCKET_TIMEOUT: Duration = Duration::from_secs(5);

/// `$XDG_RUNTIME_DIR/visaidd.sock`, or `/tmp/visaidd.sock` without a runtime dir.
pub fn default_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .map(|dir| dir.join("visaidd.sock"))
        .unwrap_or_else(|| PathBuf::from("/tmp/visaidd.sock"))
}

pub struct DaemonClient {
    socket_path: PathBuf,
    io_timeout: Duration,
}

impl DaemonClient {
    pub fn new() -> Self {
        Self::at(default_socket_path())
    }

    pub fn at(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            io_timeout: SOCKET_TIMEOUT,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// One request per connection: the daemon answers and closes its end.
    pub async fn send_command(&self, cmd: Command) -> Result<Response, IpcError> {
        let request = serde_json::to_vec(&cmd)?;
        let mut stream = self.connect().await?;

        self.bounded("sending to", stream.write_all(&request)).await?;

        // Prediction snapshots can span several reads
        let mut reply = Vec::new();
        self.bounded("waiting for", stream.read_to_end(&mut reply))
            .await?;

        Ok(serde_json::from_slice(&reply)?)
    }

    async fn connect(&self) -> Result<UnixStream, IpcError> {
        match self.bounded("connecting to", UnixStream::connect(&self.socket_path)).await {
            Err(IpcError::Io(e))
                if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::ConnectionRefused) =>
            {
                Err(IpcError::ConnectionRefused)
            }
            other => other,
        }
    }

    async fn bounded<T>(
        &self,
        stage: &str,
        io: impl Future<Output = std::io::Result<T>>,
    ) -> Result<T, IpcError> {
        match timeout(self.io_timeout, io).await {
            Ok(result) => result.map_err(IpcError::from),
            Err(_) => {
                warn!(
                    "Timed out {} visaidd at {} after {:?}",
                    stage,
                    self.socket_path.display(),
                    self.io_timeout
                );
                Err(IpcError::Timeout)
            }
        }
    }
}
