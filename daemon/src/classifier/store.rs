use super::ClassifierError;
use crate::config::ModelConfig;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

pub const MODEL_FILE: &str = "model.onnx";
pub const METADATA_FILE: &str = "metadata.json";

const MAX_DOWNLOAD_ATTEMPTS: u32 = 3;
const CHUNK_TIMEOUT: Duration = Duration::from_secs(30);

/// Local paths of a resolved model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFiles {
    pub model: PathBuf,
    pub metadata: PathBuf,
}

/// Turns a model base location into local files, downloading remote models
/// into a cache directory.
#[derive(Debug, Clone)]
pub struct ModelStore {
    cache_dir: PathBuf,
    download_timeout: Duration,
}

impl ModelStore {
    pub fn new(cache_dir: impl Into<PathBuf>, download_timeout: Duration) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            download_timeout,
        }
    }

    pub fn default_cache_dir() -> Result<PathBuf, ClassifierError> {
        dirs::data_local_dir()
            .map(|dir| dir.join("visaid").join("models"))
            .ok_or_else(|| ClassifierError::Load("could not determine data directory".to_string()))
    }

    pub fn is_remote(base_location: &str) -> bool {
        base_location.starts_with("http://") || base_location.starts_with("https://")
    }

    pub fn join_location(base_location: &str, file: &str) -> String {
        format!("{}/{}", base_location.trim_end_matches('/'), file)
    }

    /// Directory name used for a remote base location inside the cache.
    pub fn cache_key(base_location: &str) -> String {
        let stripped = base_location
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');

        stripped
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect()
    }

    pub async fn resolve(&self, model: &ModelConfig) -> Result<ModelFiles, ClassifierError> {
        if Self::is_remote(&model.base_location) {
            self.resolve_remote(model).await
        } else {
            Self::resolve_local(model)
        }
    }

    fn resolve_local(model: &ModelConfig) -> Result<ModelFiles, ClassifierError> {
        let dir = PathBuf::from(&model.base_location);
        let files = ModelFiles {
            model: dir.join(MODEL_FILE),
            metadata: dir.join(METADATA_FILE),
        };

        for path in [&files.model, &files.metadata] {
            if !path.exists() {
                return Err(ClassifierError::Load(format!("{} not found", path.display())));
            }
        }

        if let Some(expected) = &model.model_checksum {
            let actual = Self::compute_file_checksum(&files.model)?;
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(ClassifierError::Load(format!(
                    "checksum mismatch for {}: expected {}, got {}",
                    files.model.display(),
                    expected,
                    actual
                )));
            }
        }

        info!("Using local model at {:?}", dir);
        Ok(files)
    }

    async fn resolve_remote(&self, model: &ModelConfig) -> Result<ModelFiles, ClassifierError> {
        let dir = self.cache_dir.join(Self::cache_key(&model.base_location));
        tokio::fs::create_dir_all(&dir).await?;

        let files = ModelFiles {
            model: dir.join(MODEL_FILE),
            metadata: dir.join(METADATA_FILE),
        };

        let model_url = Self::join_location(&model.base_location, MODEL_FILE);
        let needs_model = match (&model.model_checksum, files.model.exists()) {
            (_, false) => true,
            (None, true) => false,
            (Some(expected), true) => {
                let actual = Self::compute_file_checksum(&files.model)?;
                if actual.eq_ignore_ascii_case(expected) {
                    info!("Cached model checksum verification passed: {}", actual);
                    false
                } else {
                    warn!(
                        "Cached model checksum mismatch (expected {}, got {}), re-downloading",
                        expected, actual
                    );
                    true
                }
            }
        };
        if needs_model {
            self.download(&model_url, &files.model, model.model_checksum.as_deref())
                .await?;
        }

        // Metadata is tiny and labels may change between exports.
        let metadata_url = Self::join_location(&model.base_location, METADATA_FILE);
        self.download(&metadata_url, &files.metadata, None).await?;

        Ok(files)
    }

    async fn download(
        &self,
        url: &str,
        dest: &Path,
        checksum: Option<&str>,
    ) -> Result<(), ClassifierError> {
        let temp_path = PathBuf::from(format!("{}.tmp", dest.display()));
        if temp_path.exists() {
            warn!("Removing existing temporary file: {:?}", temp_path);
            tokio::fs::remove_file(&temp_path).await?;
        }

        let mut last_error = None;

        for attempt in 1..=MAX_DOWNLOAD_ATTEMPTS {
            debug!("Download attempt {}/{} for {}", attempt, MAX_DOWNLOAD_ATTEMPTS, url);

            match self.download_once(url, &temp_path).await {
                Ok(actual) => {
                    if let Some(expected) = checksum {
                        if !actual.eq_ignore_ascii_case(expected) {
                            error!(
                                "Checksum verification failed! Expected: {}, Got: {}",
                                expected, actual
                            );
                            tokio::fs::remove_file(&temp_path).await?;
                            last_error = Some(format!(
                                "checksum mismatch: expected {}, got {}",
                                expected, actual
                            ));
                            continue;
                        }
                        info!("Checksum verification passed: {}", actual);
                    }

                    tokio::fs::rename(&temp_path, dest).await?;
                    info!("Downloaded {} to {:?}", url, dest);
                    return Ok(());
                }
                Err(e) => {
                    error!("Download attempt {} failed: {}", attempt, e);
                    last_error = Some(e.to_string());

                    if temp_path.exists() {
                        if let Err(cleanup_err) = tokio::fs::remove_file(&temp_path).await {
                            warn!("Failed to clean up temporary file: {}", cleanup_err);
                        }
                    }

                    if attempt < MAX_DOWNLOAD_ATTEMPTS {
                        let delay_ms = 1000 * 2_u64.pow(attempt);
                        info!("Waiting {} ms before retry", delay_ms);
                        sleep(Duration::from_millis(delay_ms)).await;
                    }
                }
            }
        }

        Err(ClassifierError::Load(format!(
            "failed to download {} after {} attempts: {}",
            url,
            MAX_DOWNLOAD_ATTEMPTS,
            last_error.unwrap_or_else(|| "unknown error".to_string())
        )))
    }

    /// Streams `url` into `temp_path` and returns the SHA-256 of the body.
    async fn download_once(&self, url: &str, temp_path: &Path) -> Result<String, ClassifierError> {
        use futures_util::StreamExt;
        use tokio::io::AsyncWriteExt;

        let client = reqwest::Client::builder()
            .timeout(self.download_timeout)
            .connect_timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| ClassifierError::Load(format!("failed to create HTTP client: {}", e)))?;

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| ClassifierError::Load(format!("GET {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(ClassifierError::Load(format!(
                "GET {} returned HTTP {}",
                url,
                response.status()
            )));
        }

        let total_bytes = response.content_length();
        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();
        let mut hasher = Sha256::new();
        let mut file = tokio::fs::File::create(temp_path).await?;

        loop {
            let chunk = match timeout(CHUNK_TIMEOUT, stream.next()).await {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(e))) => {
                    return Err(ClassifierError::Load(format!("download error: {}", e)));
                }
                Ok(None) => break,
                Err(_) => {
                    return Err(ClassifierError::Load(format!(
                        "no data received for {} seconds",
                        CHUNK_TIMEOUT.as_secs()
                    )));
                }
            };

            downloaded += chunk.len() as u64;
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
        }

        file.flush().await?;
        drop(file);

        if let Some(expected) = total_bytes {
            if downloaded != expected {
                return Err(ClassifierError::Load(format!(
                    "size mismatch: expected {}, got {}",
                    pretty_bytes(expected),
                    pretty_bytes(downloaded)
                )));
            }
        }

        debug!("Downloaded {} from {}", pretty_bytes(downloaded), url);
        Ok(hex::encode(hasher.finalize()))
    }

    pub fn compute_file_checksum(path: &Path) -> Result<String, ClassifierError> {
        use std::io::Read;

        let mut file = std::fs::File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 8192];

        loop {
            let n = file.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(hex::encode(hasher.finalize()))
    }
}

fn pretty_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}
