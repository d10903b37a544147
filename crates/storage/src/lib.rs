use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use darc_core::{hash_hex, CrawlError, FetchResponse, Link, LinkHash, RenderResponse};

/// File-based persisted state under `PATH_DATA` (spec.md §6 "Persisted
/// state"). Each sink file gets its own lock (spec.md §5 "Shared-resource
/// discipline") — a per-path `Mutex` held in a `DashMap`, grounded on the
/// same concurrent-map idiom `crates/frontier` uses for per-hash locks.
pub struct Storage {
    root: PathBuf,
    file_locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl Storage {
    pub fn new(path_data: impl Into<PathBuf>) -> Self {
        Self {
            root: path_data.into(),
            file_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        self.file_locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn append_line(&self, path: &Path, line: &str) -> Result<(), CrawlError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CrawlError::StoreUnavailable(e.to_string()))?;
        }
        let lock = self.lock_for(path);
        let _guard = lock.lock().await;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| CrawlError::StoreUnavailable(e.to_string()))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| CrawlError::StoreUnavailable(e.to_string()))?;
        file.write_all(b"\n")
            .await
            .map_err(|e| CrawlError::StoreUnavailable(e.to_string()))
    }

    /// `{PATH_DATA}/link.csv` — append-only log of observed link hashes and
    /// their URLs, one row per first-seen (spec.md §6).
    pub async fn record_link(&self, hash: &LinkHash, url: &str) -> Result<(), CrawlError> {
        let path = self.root.join("link.csv");
        let line = format!("{},{}", hash_hex(hash), url);
        debug!(url, "recording link to link.csv");
        self.append_line(&path, &line).await
    }

    /// `{PATH_DATA}/misc/{family}.txt` — append-only line-per-URL sink for a
    /// non-fetchable link family (spec.md §4.1 "no (save)", §6).
    pub async fn record_non_fetchable(&self, family: &str, url: &str) -> Result<(), CrawlError> {
        let path = self.root.join("misc").join(format!("{family}.txt"));
        self.append_line(&path, url).await
    }

    fn link_dir(&self, link: &Link) -> PathBuf {
        self.root.join(&link.host).join(hash_hex(&link.hash))
    }

    /// Persist a fetch response's headers and body under
    /// `{PATH_DATA}/{host}/{hash}/` (spec.md §6 "headers, bodies, rendered
    /// HTML, screenshots").
    pub async fn save_fetch_artifacts(&self, link: &Link, response: &FetchResponse) -> Result<(), CrawlError> {
        let dir = self.link_dir(link);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CrawlError::StoreUnavailable(e.to_string()))?;

        let headers_json = serde_headers(response);
        write_file(&dir.join("headers.json"), headers_json.as_bytes()).await?;
        write_file(&dir.join("body.bin"), &response.body).await?;
        Ok(())
    }

    /// Persist rendered HTML and a full-page screenshot under the same
    /// per-link artifact directory.
    pub async fn save_render_artifacts(&self, link: &Link, response: &RenderResponse) -> Result<(), CrawlError> {
        let dir = self.link_dir(link);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CrawlError::StoreUnavailable(e.to_string()))?;

        write_file(&dir.join("rendered.html"), response.html.as_bytes()).await?;
        write_file(&dir.join("screenshot.png"), &response.screenshot).await?;
        Ok(())
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), CrawlError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| CrawlError::StoreUnavailable(e.to_string()))
}

fn serde_headers(response: &FetchResponse) -> String {
    let mut lines = vec![
        format!("\"status\": {}", response.status),
        format!("\"final_url\": {:?}", response.final_url),
    ];
    for (k, v) in &response.headers {
        lines.push(format!("{:?}: {:?}", k, v));
    }
    format!("{{{}}}", lines.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use darc_core::link::parse;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[tokio::test]
    async fn link_csv_is_append_only() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());
        let link = parse("http://example.com/").unwrap();

        storage.record_link(&link.hash, &link.url).await.unwrap();
        storage.record_link(&link.hash, &link.url).await.unwrap();

        let contents = tokio::fs::read_to_string(dir.path().join("link.csv")).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn non_fetchable_sink_is_per_family() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());

        storage.record_non_fetchable("mailto", "mailto:a@b.com").await.unwrap();
        storage.record_non_fetchable("magnet", "magnet:?xt=abc").await.unwrap();

        assert!(dir.path().join("misc/mailto.txt").exists());
        assert!(dir.path().join("misc/magnet.txt").exists());
    }

    #[tokio::test]
    async fn fetch_artifacts_saved_under_host_hash_dir() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());
        let link = parse("http://example.com/page").unwrap();
        let response = FetchResponse {
            url: link.url.clone(),
            final_url: link.url.clone(),
            status: 200,
            headers: HashMap::new(),
            cookies: vec![],
            body: b"hello".to_vec(),
            content_type: Some("text/html".into()),
            fetched_at: Utc::now(),
            response_time_ms: 5,
        };

        storage.save_fetch_artifacts(&link, &response).await.unwrap();

        let dir_path = dir.path().join("example.com").join(hash_hex(&link.hash));
        assert!(dir_path.join("headers.json").exists());
        assert!(dir_path.join("body.bin").exists());
    }
}
