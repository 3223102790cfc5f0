use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::VfsError;
use crate::provider::{VfsFuture, VfsProvider};

/// Configuration for an HTTP byte source.
pub struct HttpConfig {
    /// Base URL that provider paths are appended to, e.g.
    /// `https://cdn.example.com/assets`.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl HttpConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Largest buffer reserved up front from a `Content-Length` header. Bigger
/// bodies grow the buffer as they arrive.
const MAX_PREALLOC: u64 = 1 << 20;

/// Download state of one path.
#[derive(Debug, Clone, Copy, Default)]
struct Download {
    received: u64,
    total: Option<u64>,
    /// Reads of this path that have not been answered yet.
    readers: usize,
}

type DownloadTable = Arc<Mutex<HashMap<String, Download>>>;

fn begin_download(downloads: &DownloadTable, path: &str) {
    downloads.lock().entry(path.to_owned()).or_default().readers += 1;
}

fn end_download(downloads: &DownloadTable, path: &str) {
    let mut downloads = downloads.lock();
    if let Some(download) = downloads.get_mut(path) {
        download.readers = download.readers.saturating_sub(1);
        if download.readers == 0 {
            downloads.remove(path);
        }
    }
}

fn initial_capacity(content_length: Option<u64>) -> usize {
    content_length.map_or(0, |len| len.min(MAX_PREALLOC) as usize)
}

/// Byte source that fetches files over HTTP(S).
///
/// Spawns a dedicated background thread that performs blocking `ureq`
/// requests one at a time. Commands are dispatched via [`std::sync::mpsc`]
/// and results arrive through per-request [`tokio::sync::oneshot`]
/// channels, so the returned futures can be polled from a cooperative pool
/// or blocked on.
///
/// Download progress is tracked per path while a request is in flight and
/// the server sent a `Content-Length`.
///
/// # Example `resources.toml`
///
/// ```toml
/// [[backend]]
/// prefix = "https"
/// type = "http"
/// url = "https://cdn.example.com/assets"
/// ```
pub struct HttpProvider {
    sender: mpsc::Sender<HttpCommand>,
    downloads: DownloadTable,
    _thread: thread::JoinHandle<()>,
}

enum HttpCommand {
    Get {
        path: String,
        reply: tokio::sync::oneshot::Sender<Result<Vec<u8>, VfsError>>,
    },
    Head {
        path: String,
        reply: tokio::sync::oneshot::Sender<Result<bool, VfsError>>,
    },
    Shutdown,
}

fn closed_err() -> VfsError {
    VfsError::Http("HTTP worker shut down".into())
}

impl HttpProvider {
    /// Start the worker thread for the given configuration.
    pub fn new(config: HttpConfig) -> Result<Self, VfsError> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<HttpCommand>();
        let downloads: DownloadTable = Arc::new(Mutex::new(HashMap::new()));

        let worker_downloads = downloads.clone();
        let handle = thread::Builder::new()
            .name("http-worker".into())
            .spawn(move || run_command_loop(config, cmd_rx, worker_downloads))
            .map_err(VfsError::Io)?;

        Ok(Self {
            sender: cmd_tx,
            downloads,
            _thread: handle,
        })
    }
}

impl Drop for HttpProvider {
    fn drop(&mut self) {
        let _ = self.sender.send(HttpCommand::Shutdown);
    }
}

impl VfsProvider for HttpProvider {
    fn read(&self, path: &str) -> VfsFuture<Vec<u8>> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        // Tracked before sending so the worker always finds the record.
        begin_download(&self.downloads, path);
        let command = HttpCommand::Get {
            path: path.to_owned(),
            reply: tx,
        };
        if self.sender.send(command).is_err() {
            end_download(&self.downloads, path);
            return Box::pin(async { Err(closed_err()) });
        }
        Box::pin(async move { rx.await.map_err(|_| closed_err())? })
    }

    fn exists(&self, path: &str) -> VfsFuture<bool> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let _ = self.sender.send(HttpCommand::Head {
            path: path.to_owned(),
            reply: tx,
        });
        Box::pin(async move { rx.await.map_err(|_| closed_err())? })
    }

    fn progress(&self, path: &str) -> Option<f32> {
        let downloads = self.downloads.lock();
        let download = downloads.get(path)?;
        let total = download.total.filter(|&t| t > 0)?;
        Some((download.received as f64 / total as f64).min(1.0) as f32)
    }
}

// ---------------------------------------------------------------------------
// Background thread implementation
// ---------------------------------------------------------------------------

fn run_command_loop(config: HttpConfig, cmd_rx: mpsc::Receiver<HttpCommand>, downloads: DownloadTable) {
    let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
    let base = config.base_url.trim_end_matches('/').to_owned();
    log::info!("HTTP worker started for {base}");

    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            HttpCommand::Get { path, reply } => {
                let url = format!("{base}/{path}");
                let result = fetch(&agent, &url, &path, &downloads);
                end_download(&downloads, &path);
                let _ = reply.send(result);
            }
            HttpCommand::Head { path, reply } => {
                let url = format!("{base}/{path}");
                let result = match agent.head(&url).call() {
                    Ok(_) => Ok(true),
                    Err(ureq::Error::Status(404, _)) => Ok(false),
                    Err(ureq::Error::Status(code, _)) => {
                        Err(VfsError::Http(format!("HEAD {url}: status {code}")))
                    }
                    Err(e) => Err(VfsError::Http(format!("HEAD {url}: {e}"))),
                };
                let _ = reply.send(result);
            }
            HttpCommand::Shutdown => break,
        }
    }

    log::info!("HTTP worker for {base} shut down");
}

fn fetch(
    agent: &ureq::Agent,
    url: &str,
    path: &str,
    downloads: &DownloadTable,
) -> Result<Vec<u8>, VfsError> {
    let response = match agent.get(url).call() {
        Ok(response) => response,
        Err(ureq::Error::Status(404, _)) => return Err(VfsError::NotFound(url.to_owned())),
        Err(ureq::Error::Status(code, _)) => {
            return Err(VfsError::Http(format!("GET {url}: status {code}")));
        }
        Err(e) => return Err(VfsError::Http(format!("GET {url}: {e}"))),
    };

    let total = response
        .header("Content-Length")
        .and_then(|value| value.parse::<u64>().ok());
    if let Some(download) = downloads.lock().get_mut(path) {
        download.total = total;
        download.received = 0;
    }

    let mut reader = response.into_reader();
    let mut data = Vec::with_capacity(initial_capacity(total));
    let mut chunk = [0u8; 16 * 1024];
    loop {
        let read = reader.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..read]);
        if let Some(download) = downloads.lock().get_mut(path) {
            download.received = data.len() as u64;
        }
    }

    log::debug!("Downloaded {} bytes from {url}", data.len());
    Ok(data)
}
