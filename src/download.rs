//! Model downloading from `HuggingFace` repositories
//!
//! Files are streamed into a temporary directory and moved into the cache
//! only once every required file has arrived.

use crate::cache::ModelCache;
use crate::error::{BgRemovalError, Result};
use futures_util::stream::TryStreamExt;
use reqwest::Client;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

const HUGGINGFACE_PREFIX: &str = "https://huggingface.co/";

/// Files that need to be downloaded for a `HuggingFace` model
const REQUIRED_FILES: &[&str] = &["config.json", "preprocessor_config.json"];

/// ONNX model files to attempt downloading
const ONNX_FILES: &[(&str, &str)] = &[
    ("onnx/model.onnx", "fp32"),
    ("onnx/model_fp16.onnx", "fp16"),
];

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Downloads model repositories into a [`ModelCache`]
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
}

impl ModelDownloader {
    /// Create a downloader backed by the default cache
    ///
    /// # Errors
    /// - Failed to create HTTP client
    /// - Failed to initialize model cache
    pub fn new() -> Result<Self> {
        Self::with_cache(ModelCache::new()?)
    }

    /// Create a downloader writing into the given cache
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn with_cache(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|e| BgRemovalError::network_error("Failed to create HTTP client", e))?;

        Ok(Self { client, cache })
    }

    /// Download a model repository into the cache, returning its model ID
    ///
    /// Already cached models are not downloaded again.
    ///
    /// # Errors
    /// - Invalid or unsupported URL
    /// - Network errors, or no ONNX variant could be fetched
    /// - File system errors while moving the model into the cache
    pub async fn download_model(&self, url: &str) -> Result<String> {
        validate_model_url(url)?;

        let model_id = ModelCache::url_to_model_id(url);
        if self.cache.is_model_cached(&model_id) {
            tracing::debug!(model_id = %model_id, "Model already cached");
            return Ok(model_id);
        }

        tracing::info!(url = %url, model_id = %model_id, "Downloading model");

        let temp_dir = Self::create_temp_download_dir(&model_id)?;
        let final_dir = self.cache.get_model_path(&model_id);

        if let Err(e) = self.download_model_files(url, &temp_dir).await {
            if let Err(cleanup_err) = fs::remove_dir_all(&temp_dir) {
                tracing::warn!(error = %cleanup_err, "Failed to clean up temp directory");
            }
            return Err(e);
        }

        if final_dir.exists() {
            fs::remove_dir_all(&final_dir).map_err(|e| {
                BgRemovalError::file_io_error("remove existing model directory", &final_dir, &e)
            })?;
        }
        Self::move_dir(&temp_dir, &final_dir)?;

        tracing::info!(model_id = %model_id, path = %final_dir.display(), "Model downloaded");
        Ok(model_id)
    }

    /// Rename, falling back to copy when temp and cache are on different devices
    fn move_dir(from: &Path, to: &Path) -> Result<()> {
        if fs::rename(from, to).is_ok() {
            return Ok(());
        }

        Self::copy_dir(from, to)?;
        fs::remove_dir_all(from)
            .map_err(|e| BgRemovalError::file_io_error("remove temp directory", from, &e))
    }

    fn copy_dir(from: &Path, to: &Path) -> Result<()> {
        fs::create_dir_all(to)
            .map_err(|e| BgRemovalError::file_io_error("create directory", to, &e))?;

        let entries = fs::read_dir(from)
            .map_err(|e| BgRemovalError::file_io_error("read directory", from, &e))?;
        for entry in entries {
            let entry = entry?;
            let target = to.join(entry.file_name());
            if entry.file_type()?.is_dir() {
                Self::copy_dir(&entry.path(), &target)?;
            } else {
                fs::copy(entry.path(), &target)
                    .map_err(|e| BgRemovalError::file_io_error("copy model file", &target, &e))?;
            }
        }
        Ok(())
    }

    fn create_temp_download_dir(model_id: &str) -> Result<PathBuf> {
        let temp_dir = std::env::temp_dir().join(format!("bgremove-server-{model_id}"));

        if temp_dir.exists() {
            fs::remove_dir_all(&temp_dir).map_err(|e| {
                BgRemovalError::file_io_error("remove existing temp directory", &temp_dir, &e)
            })?;
        }

        fs::create_dir_all(&temp_dir)
            .map_err(|e| BgRemovalError::file_io_error("create temp directory", &temp_dir, &e))?;

        Ok(temp_dir)
    }

    async fn download_model_files(&self, base_url: &str, download_dir: &Path) -> Result<()> {
        let raw_base = format!("{}/resolve/main/", base_url.trim_end_matches('/'));

        for file_name in REQUIRED_FILES {
            let file_url = format!("{raw_base}{file_name}");
            self.download_file(&file_url, &download_dir.join(file_name))
                .await?;
        }

        // At least one variant has to succeed
        let mut downloaded_models = 0;
        for (file_path, variant) in ONNX_FILES {
            let file_url = format!("{raw_base}{file_path}");
            match self
                .download_file(&file_url, &download_dir.join(file_path))
                .await
            {
                Ok(bytes) => {
                    downloaded_models += 1;
                    tracing::info!(
                        variant = %variant,
                        size = %crate::cache::format_size(bytes),
                        "Downloaded model variant"
                    );
                },
                Err(e) => {
                    tracing::warn!(variant = %variant, error = %e, "Failed to download variant");
                },
            }
        }

        if downloaded_models == 0 {
            return Err(BgRemovalError::network_error(
                "Failed to download any ONNX model variants",
                base_url,
            ));
        }

        Ok(())
    }

    /// Stream a single file to disk, returning the number of bytes written
    ///
    /// Bytes go to a `.part` sibling that is renamed into place only after the
    /// whole body arrived, so a failed transfer never leaves a truncated file.
    async fn download_file(&self, url: &str, local_path: &Path) -> Result<u64> {
        tracing::debug!(url = %url, path = %local_path.display(), "Downloading file");

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| BgRemovalError::file_io_error("create directory", parent, &e))?;
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BgRemovalError::network_error(format!("Failed to download {url}"), e))?;

        if !response.status().is_success() {
            return Err(BgRemovalError::network_error(
                format!("Failed to download {url}"),
                format!("HTTP {}", response.status()),
            ));
        }

        let part_path = partial_path(local_path);
        let downloaded = match Self::stream_to_file(response, &part_path).await {
            Ok(downloaded) => downloaded,
            Err(e) => {
                if let Err(cleanup_err) = fs::remove_file(&part_path) {
                    if cleanup_err.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(
                            path = %part_path.display(),
                            error = %cleanup_err,
                            "Failed to remove partial download"
                        );
                    }
                }
                return Err(e);
            },
        };

        fs::rename(&part_path, local_path)
            .map_err(|e| BgRemovalError::file_io_error("finalize download", local_path, &e))?;

        Ok(downloaded)
    }

    async fn stream_to_file(response: reqwest::Response, path: &Path) -> Result<u64> {
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| BgRemovalError::file_io_error("create file", path, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut downloaded = 0u64;
        let mut buffer = vec![0; 8192];
        loop {
            let bytes_read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| BgRemovalError::network_error("Failed to read download stream", e))?;
            if bytes_read == 0 {
                break;
            }

            file.write_all(buffer.get(..bytes_read).unwrap_or(&[]))
                .await
                .map_err(|e| BgRemovalError::file_io_error("write to file", path, &e))?;
            downloaded += bytes_read as u64;
        }

        file.flush()
            .await
            .map_err(|e| BgRemovalError::file_io_error("flush file", path, &e))?;

        Ok(downloaded)
    }

    /// Cache this downloader writes into
    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Validate that a URL points at a `HuggingFace` repository
///
/// # Errors
/// - Empty URL, a non-`HuggingFace` host, or a missing `user/repo` path
pub fn validate_model_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(BgRemovalError::invalid_config("Model URL cannot be empty"));
    }

    let Some(repo_path) = url.strip_prefix(HUGGINGFACE_PREFIX) else {
        return Err(BgRemovalError::invalid_config(format!(
            "Unsupported URL format: {url}. Only HuggingFace repositories are supported (https://huggingface.co/...)"
        )));
    };

    if repo_path.is_empty() || !repo_path.contains('/') {
        return Err(BgRemovalError::invalid_config(format!(
            "Invalid HuggingFace repository URL: {url}. Expected format: https://huggingface.co/username/repo-name"
        )));
    }

    Ok(())
}

/// Split a `HuggingFace` URL into `(username, repository)`
///
/// # Errors
/// - The URL fails [`validate_model_url`]
pub fn parse_huggingface_url(url: &str) -> Result<(String, String)> {
    validate_model_url(url)?;

    let repo_path = url.strip_prefix(HUGGINGFACE_PREFIX).unwrap_or_default();
    let mut parts = repo_path.split('/');
    match (parts.next(), parts.next()) {
        (Some(user), Some(repo)) if !user.is_empty() && !repo.is_empty() => {
            Ok((user.to_string(), repo.to_string()))
        },
        _ => Err(BgRemovalError::invalid_config(format!(
            "Invalid HuggingFace URL format: {url}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_model_url() {
        assert!(validate_model_url("https://huggingface.co/imgly/isnet-general-onnx").is_ok());
        assert!(validate_model_url("https://huggingface.co/ZhengPeng7/BiRefNet").is_ok());

        let invalid_urls = [
            "http://huggingface.co/user/repo",
            "https://github.com/user/repo",
            "https://huggingface.co/",
            "https://huggingface.co/onlyuser",
            "https://subdomain.huggingface.co/user/repo",
        ];
        for url in invalid_urls {
            assert!(validate_model_url(url).is_err(), "URL should be invalid: {url}");
        }

        let err = validate_model_url("").unwrap_err();
        assert!(err.to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_parse_huggingface_url() {
        let (user, repo) =
            parse_huggingface_url("https://huggingface.co/imgly/isnet-general-onnx").unwrap();
        assert_eq!(user, "imgly");
        assert_eq!(repo, "isnet-general-onnx");

        let (user, repo) =
            parse_huggingface_url("https://huggingface.co/user/repo/tree/main").unwrap();
        assert_eq!(user, "user");
        assert_eq!(repo, "repo");

        assert!(parse_huggingface_url("https://huggingface.co/single").is_err());
        assert!(parse_huggingface_url("not-a-url").is_err());
    }

    #[test]
    fn test_create_temp_download_dir_replaces_stale_contents() {
        let model_id = "bgremove-test-stale";

        let first = ModelDownloader::create_temp_download_dir(model_id).unwrap();
        let stale_file = first.join("partial.onnx");
        fs::write(&stale_file, "partial").unwrap();

        let second = ModelDownloader::create_temp_download_dir(model_id).unwrap();
        assert!(second.is_dir());
        assert!(second.to_string_lossy().contains(model_id));
        assert!(!stale_file.exists());

        let _ = fs::remove_dir_all(&second);
    }

    #[test]
    fn test_move_dir_preserves_layout() {
        let temp = TempDir::new().unwrap();
        let from = temp.path().join("download");
        fs::create_dir_all(from.join("onnx")).unwrap();
        fs::write(from.join("config.json"), "{}").unwrap();
        fs::write(from.join("onnx/model.onnx"), b"onnx").unwrap();

        let to = temp.path().join("cache/model");
        fs::create_dir_all(temp.path().join("cache")).unwrap();
        ModelDownloader::move_dir(&from, &to).unwrap();

        assert!(!from.exists());
        assert!(to.join("config.json").is_file());
        assert_eq!(fs::read(to.join("onnx/model.onnx")).unwrap(), b"onnx");
    }

    #[tokio::test]
    async fn test_cached_model_is_not_downloaded_again() {
        let temp = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp.path()).unwrap();
        let url = "https://huggingface.co/imgly/isnet-general-onnx";
        let model_path = cache.get_model_path(&ModelCache::url_to_model_id(url));
        fs::create_dir_all(&model_path).unwrap();
        crate::models::tests::write_model_dir(&model_path, &["fp16"]);

        let downloader = ModelDownloader::with_cache(cache).unwrap();
        let model_id = downloader.download_model(url).await.unwrap();
        assert_eq!(model_id, "imgly--isnet-general-onnx");
    }

    /// Serve one canned HTTP response on a local port
    async fn serve_once(response: &'static [u8]) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = vec![0; 4096];
            let _ = socket.read(&mut request).await;
            socket.write_all(response).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{addr}/resolve/main/onnx/model_fp16.onnx")
    }

    fn downloader(temp: &TempDir) -> ModelDownloader {
        let cache = ModelCache::with_custom_cache_dir(&temp.path().join("cache")).unwrap();
        ModelDownloader::with_cache(cache).unwrap()
    }

    #[tokio::test]
    async fn test_interrupted_download_leaves_no_file() {
        let temp = TempDir::new().unwrap();
        let url = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\ntruncated").await;
        let target = temp.path().join("download/onnx/model_fp16.onnx");

        let result = downloader(&temp).download_file(&url, &target).await;

        assert!(result.is_err());
        assert!(!target.exists());
        assert!(!partial_path(&target).exists());
        assert_eq!(fs::read_dir(target.parent().unwrap()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_http_error_creates_no_file() {
        let temp = TempDir::new().unwrap();
        let url = serve_once(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n").await;
        let target = temp.path().join("download/onnx/model.onnx");

        let err = downloader(&temp).download_file(&url, &target).await.unwrap_err();

        assert!(err.to_string().contains("404"));
        assert!(!target.exists());
        assert!(!partial_path(&target).exists());
    }

    #[tokio::test]
    async fn test_complete_download_is_renamed_into_place() {
        let temp = TempDir::new().unwrap();
        let url = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nonnx").await;
        let target = temp.path().join("download/onnx/model.onnx");

        let bytes = downloader(&temp).download_file(&url, &target).await.unwrap();

        assert_eq!(bytes, 4);
        assert_eq!(fs::read(&target).unwrap(), b"onnx");
        assert!(!partial_path(&target).exists());
    }

    #[tokio::test]
    async fn test_download_rejects_unsupported_url() {
        let temp = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp.path()).unwrap();
        let downloader = ModelDownloader::with_cache(cache).unwrap();

        let err = downloader
            .download_model("https://example.com/model")
            .await
            .unwrap_err();
        assert!(matches!(err, BgRemovalError::InvalidConfig(_)));
    }
}
