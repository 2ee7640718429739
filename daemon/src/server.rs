use shared::ipc::{Command, Response};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::state::DaemonState;

/// Uses the XDG runtime directory if available, falls back to /tmp.
pub fn get_socket_path() -> PathBuf {
    match dirs::runtime_dir() {
        Some(runtime_dir) => runtime_dir.join("visaidd.sock"),
        None => PathBuf::from("/tmp/visaidd.sock"),
    }
}

pub struct DaemonServer {
    socket_path: PathBuf,
    state: Arc<Mutex<DaemonState>>,
    io_timeout: Duration,
}

impl DaemonServer {
    pub fn new(socket_path: PathBuf, state: Arc<Mutex<DaemonState>>, io_timeout: Duration) -> Self {
        Self {
            socket_path,
            state,
            io_timeout,
        }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let socket_path = self.socket_path.clone();

        if socket_path.exists() {
            std::fs::remove_file(&socket_path)?;
        }

        info!("Starting socket server at {}", socket_path.display());

        let listener = UnixListener::bind(&socket_path)?;
        debug!("Listener bound successfully");

        loop {
            let state = Arc::clone(&self.state);
            let io_timeout = self.io_timeout;
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("Connection accepted");
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(state, stream, io_timeout).await {
                            error!("Error handling connection: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }

    async fn handle_connection(
        state: Arc<Mutex<DaemonState>>,
        mut stream: UnixStream,
        io_timeout: Duration,
    ) -> anyhow::Result<()> {
        let mut buffer = vec![0u8; 1024];
        let n = timeout(io_timeout, stream.read(&mut buffer))
            .await
            .map_err(|_| anyhow::anyhow!("Timed out reading command"))??;

        if n == 0 {
            return Ok(());
        }

        buffer.truncate(n);

        let response = match serde_json::from_slice::<Command>(&buffer) {
            Ok(command) => {
                info!("Received command: {:?}", command);
                dispatch(&state, command).await
            }
            Err(e) => {
                warn!("Malformed command: {}", e);
                Response::Error(format!("Malformed command: {}", e))
            }
        };

        let response_json = serde_json::to_vec(&response)?;
        timeout(io_timeout, async {
            stream.write_all(&response_json).await?;
            stream.shutdown().await
        })
        .await
        .map_err(|_| anyhow::anyhow!("Timed out writing response"))??;

        debug!("Sent response: {:?}", response);

        Ok(())
    }
}

/// Applies one command to the daemon state. Refused commands come back as
/// [`Response::Error`], never as a dropped connection.
pub async fn dispatch(state: &Mutex<DaemonState>, command: Command) -> Response {
    let mut state = state.lock().await;

    let result = match command {
        Command::Start => state.activate(),
        Command::Stop => state.deactivate().await,
        Command::Toggle => state.toggle().await,
        Command::Status => return Response::Status(state.get_status()),
        Command::Predictions => return Response::Predictions(state.predictions()),
        Command::SetMode(mode) => {
            state.set_mode(mode);
            Ok(())
        }
    };

    match result {
        Ok(()) => Response::Ok,
        Err(e) => {
            warn!("Command refused: {}", e);
            Response::Error(e.to_string())
        }
    }
}

impl Drop for DaemonServer {
    fn drop(&mut self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}
