use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use linkhop_core::{
    Backend, BatchReport, NewLink, Result, ShortCode, StorageError, UserId, SYNTHETIC_OWNER,
};
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// One line of the append-only log.
///
/// Lines written before ownership and deletion were tracked only carry the
/// first three fields; the rest default so those lines still load.
#[derive(Debug, Serialize, Deserialize)]
struct LogLine {
    #[serde(rename = "UUID", default)]
    uuid: String,
    short_url: ShortCode,
    original_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "is_false")]
    is_deleted: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl LogLine {
    fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = serde_json::to_vec(self)
            .map_err(|e| StorageError::InvalidData(format!("failed to encode log line: {e}")))?;
        buf.push(b'\n');
        Ok(buf)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    uuid: String,
    original_url: String,
    owner: UserId,
    deleted: bool,
}

impl From<LogLine> for Entry {
    fn from(line: LogLine) -> Self {
        Self {
            uuid: line.uuid,
            original_url: line.original_url,
            owner: line.user_id.unwrap_or(SYNTHETIC_OWNER),
            deleted: line.is_deleted,
        }
    }
}

/// Counters reported by [`FileLogBackend::replay`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Lines applied to the index.
    pub loaded: usize,
    /// Blank or malformed lines that were ignored.
    pub skipped: usize,
}

/// Backend persisting every write as a JSON line in an append-only file.
///
/// Reads are served from an in-process index rebuilt by [`replay`] at
/// startup. Soft deletion appends a tombstone line for the same short code;
/// the last line for a code wins on replay. Existing lines are never
/// rewritten.
///
/// [`replay`]: FileLogBackend::replay
#[derive(Debug)]
pub struct FileLogBackend {
    path: PathBuf,
    /// Held for the whole check-append-index sequence of every write.
    writer: Mutex<File>,
    index: DashMap<String, Entry>,
}

impl FileLogBackend {
    /// Opens the log at `path` for appending, creating it and its parent
    /// directories if needed. The index starts empty until [`Self::replay`].
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            writer: Mutex::new(file),
            index: DashMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of distinct short codes in the index, deleted ones included.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Rebuilds the index by reading the log front to back.
    ///
    /// Malformed lines are logged and skipped; they never abort the load.
    /// A final line left without its newline by a crash is terminated, so the
    /// next append starts on a line of its own.
    pub async fn replay(&self) -> Result<ReplayStats> {
        // Block writers so the index matches the file once we return.
        let mut writer = self.writer.lock().await;

        let file = File::open(&self.path).await?;
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        let mut stats = ReplayStats::default();
        let mut line_no = 0usize;
        let mut torn_tail = false;

        self.index.clear();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            line_no += 1;
            torn_tail = buf.last() != Some(&b'\n');

            if buf.iter().all(u8::is_ascii_whitespace) {
                stats.skipped += 1;
                continue;
            }

            match serde_json::from_slice::<LogLine>(&buf) {
                Ok(line) => {
                    let code = line.short_url.as_str().to_owned();
                    self.index.insert(code, Entry::from(line));
                    stats.loaded += 1;
                }
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        line = line_no,
                        error = %e,
                        "skipping malformed log line"
                    );
                    stats.skipped += 1;
                }
            }
        }

        if torn_tail {
            warn!(
                path = %self.path.display(),
                line = line_no,
                "terminating unfinished last line"
            );
            Self::append(&mut writer, b"\n").await?;
        }

        Ok(stats)
    }

    async fn append(file: &mut File, bytes: &[u8]) -> Result<()> {
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }
}

#[async_trait]
impl Backend for FileLogBackend {
    async fn restore(&self) -> Result<()> {
        let stats = self.replay().await?;
        info!(
            path = %self.path.display(),
            loaded = stats.loaded,
            skipped = stats.skipped,
            entries = self.index.len(),
            "replayed link log"
        );
        Ok(())
    }

    async fn add(&self, link: NewLink) -> Result<()> {
        let mut writer = self.writer.lock().await;

        if self.index.contains_key(link.code.as_str()) {
            return Err(StorageError::IdTaken(link.code.to_string()));
        }

        let line = LogLine {
            uuid: link.uuid,
            short_url: link.code,
            original_url: link.original_url,
            user_id: Some(link.owner),
            is_deleted: false,
        };
        Self::append(&mut writer, &line.encode()?).await?;

        debug!(code = %line.short_url, "appended link");
        let code = line.short_url.as_str().to_owned();
        self.index.insert(code, Entry::from(line));
        Ok(())
    }

    async fn add_batch(&self, links: Vec<NewLink>) -> Result<BatchReport> {
        let mut report = BatchReport::default();

        for link in links {
            let code = link.code.clone();
            match self.add(link).await {
                Ok(()) => report.stored.push(code),
                Err(e) => {
                    warn!(code = %code, error = %e, "skipping batch record");
                    report.failed.push((code, e));
                }
            }
        }

        Ok(report)
    }

    async fn get(&self, code: &ShortCode) -> Result<String> {
        let Some(entry) = self.index.get(code.as_str()) else {
            return Err(StorageError::NotFound(code.to_string()));
        };

        if entry.deleted {
            return Err(StorageError::Deleted(code.to_string()));
        }

        Ok(entry.original_url.clone())
    }

    async fn delete_batch(&self, owner: UserId, codes: &[ShortCode]) -> Result<usize> {
        let mut writer = self.writer.lock().await;
        let mut tombstones = Vec::new();
        let mut flagged = Vec::new();

        for code in codes {
            let Some(entry) = self.index.get(code.as_str()) else {
                continue;
            };
            if entry.owner != owner || entry.deleted || flagged.contains(&code.as_str()) {
                continue;
            }

            let line = LogLine {
                uuid: entry.uuid.clone(),
                short_url: code.clone(),
                original_url: entry.original_url.clone(),
                user_id: Some(owner),
                is_deleted: true,
            };
            tombstones.extend(line.encode()?);
            flagged.push(code.as_str());
        }

        if flagged.is_empty() {
            return Ok(0);
        }

        Self::append(&mut writer, &tombstones).await?;

        for code in &flagged {
            if let Some(mut entry) = self.index.get_mut(*code) {
                entry.deleted = true;
            }
        }

        debug!(owner = %owner, count = flagged.len(), "appended tombstones");
        Ok(flagged.len())
    }

    async fn close(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.flush().await?;
        writer.sync_all().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn code(s: &str) -> ShortCode {
        ShortCode::new_unchecked(s)
    }

    fn link(c: &str, url: &str) -> NewLink {
        NewLink::new(code(c), url, SYNTHETIC_OWNER)
    }

    async fn open_in(dir: &TempDir) -> FileLogBackend {
        let backend = FileLogBackend::open(dir.path().join("links.json"))
            .await
            .unwrap();
        backend.restore().await.unwrap();
        backend
    }

    #[tokio::test]
    async fn replay_restores_every_added_link() {
        let dir = TempDir::new().unwrap();

        {
            let backend = open_in(&dir).await;
            for i in 0..20 {
                backend
                    .add(link(&format!("code{i}"), &format!("https://example.com/{i}")))
                    .await
                    .unwrap();
            }
            backend.close().await.unwrap();
        }

        let reopened = open_in(&dir).await;
        assert_eq!(reopened.len(), 20);
        for i in 0..20 {
            let url = reopened.get(&code(&format!("code{i}"))).await.unwrap();
            assert_eq!(url, format!("https://example.com/{i}"));
        }
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.json");
        let contents = concat!(
            r#"{"UUID":"1","short_url":"first","original_url":"https://one.example"}"#,
            "\n",
            "this is not json\n",
            "\n",
            r#"{"UUID":"2","short_url":"bad code!","original_url":"https://bad.example"}"#,
            "\n",
            r#"{"UUID":"3","short_url":"third","original_url":"https://three.example"}"#,
            "\n",
        );
        tokio::fs::write(&path, contents).await.unwrap();

        let backend = FileLogBackend::open(&path).await.unwrap();
        let stats = backend.replay().await.unwrap();

        assert_eq!(stats, ReplayStats { loaded: 2, skipped: 3 });
        assert_eq!(backend.get(&code("first")).await.unwrap(), "https://one.example");
        assert_eq!(backend.get(&code("third")).await.unwrap(), "https://three.example");
    }

    #[tokio::test]
    async fn write_after_torn_tail_survives_replay() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.json");
        let contents = concat!(
            r#"{"UUID":"1","short_url":"ok","original_url":"https://ok.example"}"#,
            "\n",
            r#"{"UUID":"2","short_u"#,
        );
        tokio::fs::write(&path, contents).await.unwrap();

        {
            let backend = FileLogBackend::open(&path).await.unwrap();
            let stats = backend.replay().await.unwrap();
            assert_eq!(stats, ReplayStats { loaded: 1, skipped: 1 });

            backend.add(link("acked", "https://acked.example")).await.unwrap();
            backend.close().await.unwrap();
        }

        let reopened = FileLogBackend::open(&path).await.unwrap();
        let stats = reopened.replay().await.unwrap();

        assert_eq!(stats, ReplayStats { loaded: 2, skipped: 1 });
        assert_eq!(reopened.get(&code("ok")).await.unwrap(), "https://ok.example");
        assert_eq!(reopened.get(&code("acked")).await.unwrap(), "https://acked.example");
    }

    #[tokio::test]
    async fn writes_one_self_contained_line_per_add() {
        let dir = TempDir::new().unwrap();
        let backend = open_in(&dir).await;

        backend
            .add(NewLink::with_uuid("corr-1", code("abc"), "https://example.com", SYNTHETIC_OWNER))
            .await
            .unwrap();

        let raw = tokio::fs::read_to_string(backend.path()).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(raw.trim_end()).unwrap();
        assert_eq!(value["UUID"], "corr-1");
        assert_eq!(value["short_url"], "abc");
        assert_eq!(value["original_url"], "https://example.com");
        assert!(value.get("is_deleted").is_none());
    }

    #[tokio::test]
    async fn taken_code_is_rejected_without_writing() {
        let dir = TempDir::new().unwrap();
        let backend = open_in(&dir).await;

        backend.add(link("abc", "https://example.com")).await.unwrap();
        let err = backend.add(link("abc", "https://other.com")).await.unwrap_err();

        assert!(matches!(err, StorageError::IdTaken(_)));
        let raw = tokio::fs::read_to_string(backend.path()).await.unwrap();
        assert_eq!(raw.lines().count(), 1);
    }

    #[tokio::test]
    async fn batch_is_best_effort() {
        let dir = TempDir::new().unwrap();
        let backend = open_in(&dir).await;

        let report = backend
            .add_batch(vec![
                link("a", "https://a.example"),
                link("b", "https://b.example"),
                link("a", "https://clash.example"),
                link("d", "https://d.example"),
            ])
            .await
            .unwrap();

        assert_eq!(report.stored.len(), 3);
        assert_eq!(report.failed.len(), 1);

        let reopened = open_in(&dir).await;
        assert_eq!(reopened.len(), 3);
    }

    #[tokio::test]
    async fn deletion_survives_replay() {
        let dir = TempDir::new().unwrap();

        {
            let backend = open_in(&dir).await;
            backend.add(link("gone", "https://gone.example")).await.unwrap();
            backend.add(link("kept", "https://kept.example")).await.unwrap();

            let flagged = backend
                .delete_batch(SYNTHETIC_OWNER, &[code("gone"), code("unknown")])
                .await
                .unwrap();
            assert_eq!(flagged, 1);

            let raw = tokio::fs::read_to_string(backend.path()).await.unwrap();
            assert_eq!(raw.lines().count(), 3);
        }

        let reopened = open_in(&dir).await;
        assert!(matches!(
            reopened.get(&code("gone")).await.unwrap_err(),
            StorageError::Deleted(_)
        ));
        assert_eq!(reopened.get(&code("kept")).await.unwrap(), "https://kept.example");
    }

    #[tokio::test]
    async fn delete_ignores_foreign_and_repeated_requests() {
        let dir = TempDir::new().unwrap();
        let backend = open_in(&dir).await;
        backend.add(link("abc", "https://example.com")).await.unwrap();

        assert_eq!(backend.delete_batch(UserId::new(7), &[code("abc")]).await.unwrap(), 0);
        assert_eq!(backend.delete_batch(SYNTHETIC_OWNER, &[code("abc")]).await.unwrap(), 1);
        assert_eq!(backend.delete_batch(SYNTHETIC_OWNER, &[code("abc")]).await.unwrap(), 0);

        let raw = tokio::fs::read_to_string(backend.path()).await.unwrap();
        assert_eq!(raw.lines().count(), 2);
    }

    #[tokio::test]
    async fn open_creates_missing_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("store").join("links.json");

        let backend = FileLogBackend::open(&path).await.unwrap();
        assert_eq!(backend.replay().await.unwrap(), ReplayStats::default());
        assert!(backend.is_empty());
        assert!(path.exists());
    }
}
