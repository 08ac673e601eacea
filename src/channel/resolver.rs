//! Receiver endpoint discovery
//!
//! The discovery record is a single line holding the receiver's base URL.
//! Readers key their cache on the file's modification time so a steady-state
//! resolve costs one `stat` and no content read.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::{debug, info, trace};

use crate::error::ChannelError;

/// Attempts made when the record content does not parse (partial write)
const READ_ATTEMPTS: usize = 3;
const RETRY_DELAY: Duration = Duration::from_millis(20);

/// Locates the active receiver
///
/// The file-backed implementation is the only one today; a registry service
/// can replace it without touching sender or receiver code.
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    /// Current receiver address, or `None` when no receiver is known
    async fn resolve(&self) -> Option<String>;

    /// Announce this process's receiver address
    async fn publish(&self, address: &str) -> Result<(), ChannelError>;
}

#[derive(Debug, Clone)]
struct CachedRecord {
    modified: SystemTime,
    address: String,
}

/// Discovery record stored at a well-known filesystem path
///
/// Last writer wins; there is no locking between processes.
#[derive(Debug)]
pub struct DiscoveryFile {
    path: PathBuf,
    cache: Mutex<Option<CachedRecord>>,
    content_reads: AtomicUsize,
}

impl DiscoveryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
            content_reads: AtomicUsize::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of times the record's content has been read
    pub fn content_reads(&self) -> usize {
        self.content_reads.load(Ordering::Relaxed)
    }
}

/// Extract the endpoint address from record text
fn parse_record(text: &str) -> Option<String> {
    let line = text.lines().next()?.trim();
    let url = reqwest::Url::parse(line).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.port_or_known_default()?;
    url.host_str()?;
    Some(line.trim_end_matches('/').to_string())
}

#[async_trait]
impl EndpointResolver for DiscoveryFile {
    async fn resolve(&self) -> Option<String> {
        // Held across the whole check-read-update so concurrent resolves
        // observe one consistent cache
        let mut cache = self.cache.lock().await;

        let modified = match tokio::fs::metadata(&self.path)
            .await
            .and_then(|meta| meta.modified())
        {
            Ok(modified) => modified,
            Err(e) => {
                trace!("No discovery record at {}: {}", self.path.display(), e);
                *cache = None;
                return None;
            }
        };

        if let Some(record) = cache.as_ref() {
            if record.modified == modified {
                return Some(record.address.clone());
            }
        }

        for attempt in 1..=READ_ATTEMPTS {
            self.content_reads.fetch_add(1, Ordering::Relaxed);
            let text = match tokio::fs::read_to_string(&self.path).await {
                Ok(text) => text,
                Err(e) => {
                    debug!("Discovery record unreadable: {}", e);
                    *cache = None;
                    return None;
                }
            };

            if let Some(address) = parse_record(&text) {
                debug!(address = %address, "Resolved receiver endpoint");
                *cache = Some(CachedRecord {
                    modified,
                    address: address.clone(),
                });
                return Some(address);
            }

            trace!(attempt, "Discovery record did not parse, retrying");
            if attempt < READ_ATTEMPTS {
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }

        *cache = None;
        None
    }

    async fn publish(&self, address: &str) -> Result<(), ChannelError> {
        let publish_err = |source| ChannelError::Publish {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(publish_err)?;
        }

        // Write beside the record and rename over it so readers rarely see
        // a partial line
        let staging = self.path.with_extension("tmp");
        tokio::fs::write(&staging, format!("{}\n", address))
            .await
            .map_err(publish_err)?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(publish_err)?;

        info!("Published receiver endpoint {} to {}", address, self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;

    fn write_record(path: &Path, text: &str, modified: SystemTime) {
        fs::write(path, text).unwrap();
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(modified)
            .unwrap();
    }

    #[test]
    fn test_parse_record() {
        assert_eq!(
            parse_record("http://127.0.0.1:5123/\n"),
            Some("http://127.0.0.1:5123".to_string())
        );
        assert_eq!(
            parse_record("  http://localhost:80  "),
            Some("http://localhost:80".to_string())
        );
        assert_eq!(parse_record(""), None);
        assert_eq!(parse_record("http://"), None);
        assert_eq!(parse_record("ftp://127.0.0.1:21"), None);
        assert_eq!(parse_record("not a url"), None);
    }

    #[tokio::test]
    async fn test_missing_record_is_no_receiver() {
        let dir = tempdir().unwrap();
        let resolver = DiscoveryFile::new(dir.path().join("absent.endpoint"));
        assert_eq!(resolver.resolve().await, None);
        assert_eq!(resolver.content_reads(), 0);
    }

    #[tokio::test]
    async fn test_cache_follows_modification_time() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("receiver.endpoint");
        let resolver = DiscoveryFile::new(&path);

        let t1 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let t2 = t1 + Duration::from_secs(60);

        write_record(&path, "http://127.0.0.1:1111\n", t1);
        assert_eq!(resolver.resolve().await.as_deref(), Some("http://127.0.0.1:1111"));
        assert_eq!(resolver.resolve().await.as_deref(), Some("http://127.0.0.1:1111"));
        assert_eq!(resolver.content_reads(), 1);

        write_record(&path, "http://127.0.0.1:2222\n", t2);
        assert_eq!(resolver.resolve().await.as_deref(), Some("http://127.0.0.1:2222"));
        assert_eq!(resolver.resolve().await.as_deref(), Some("http://127.0.0.1:2222"));
        assert_eq!(resolver.content_reads(), 2);

        fs::remove_file(&path).unwrap();
        assert_eq!(resolver.resolve().await, None);
    }

    #[tokio::test]
    async fn test_malformed_record_retried_then_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("receiver.endpoint");
        let resolver = DiscoveryFile::new(&path);

        write_record(&path, "http://", SystemTime::now());
        assert_eq!(resolver.resolve().await, None);
        assert_eq!(resolver.content_reads(), READ_ATTEMPTS);

        // Not cached: the next resolve reads again
        assert_eq!(resolver.resolve().await, None);
        assert_eq!(resolver.content_reads(), READ_ATTEMPTS * 2);
    }

    #[tokio::test]
    async fn test_publish_creates_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("receiver.endpoint");
        let resolver = DiscoveryFile::new(&path);

        resolver.publish("http://127.0.0.1:4242").await.unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "http://127.0.0.1:4242\n");
        assert_eq!(resolver.resolve().await.as_deref(), Some("http://127.0.0.1:4242"));
    }
}
