use std::path::PathBuf;
use std::sync::Mutex;

use flock_core::score::ScoreRecord;

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Format(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "score store I/O error: {e}"),
            Self::Format(m) => write!(f, "score store format error: {m}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// The two-operation contract against the persistent high-score store.
/// Append-only writes; reads return the top `n` by score, descending.
pub trait ScoreStore: Send + Sync {
    fn fetch_top(&self, n: usize) -> Result<Vec<ScoreRecord>, StoreError>;
    fn insert(&self, record: ScoreRecord) -> Result<(), StoreError>;
}

fn top_n(mut records: Vec<ScoreRecord>, n: usize) -> Vec<ScoreRecord> {
    records.sort_by(|a, b| b.score.cmp(&a.score));
    records.truncate(n);
    records
}

/// JSON-file-backed store. Every read hits the file; no caching.
pub struct FileScoreStore {
    path: PathBuf,
}

impl FileScoreStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<Vec<ScoreRecord>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content).map_err(|e| StoreError::Format(e.to_string()))
    }
}

impl ScoreStore for FileScoreStore {
    fn fetch_top(&self, n: usize) -> Result<Vec<ScoreRecord>, StoreError> {
        Ok(top_n(self.load()?, n))
    }

    fn insert(&self, record: ScoreRecord) -> Result<(), StoreError> {
        let mut records = self.load()?;
        records.push(record);
        let content =
            serde_json::to_string(&records).map_err(|e| StoreError::Format(e.to_string()))?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

/// In-memory store for tests and throwaway sessions.
#[derive(Default)]
pub struct MemScoreStore {
    records: Mutex<Vec<ScoreRecord>>,
}

impl MemScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<ScoreRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }
}

impl ScoreStore for MemScoreStore {
    fn fetch_top(&self, n: usize) -> Result<Vec<ScoreRecord>, StoreError> {
        Ok(top_n(self.records.lock().unwrap().clone(), n))
    }

    fn insert(&self, record: ScoreRecord) -> Result<(), StoreError> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, score: u32) -> ScoreRecord {
        ScoreRecord {
            username: name.to_string(),
            score,
        }
    }

    #[test]
    fn mem_store_returns_top_n_descending() {
        let store = MemScoreStore::new();
        for (name, score) in [("alice", 5), ("bob", 12), ("carol", 9), ("dave", 1)] {
            store.insert(record(name, score)).unwrap();
        }
        let top = store.fetch_top(3).unwrap();
        let scores: Vec<u32> = top.iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![12, 9, 5]);
    }

    #[test]
    fn fetch_from_empty_store() {
        let store = MemScoreStore::new();
        assert!(store.fetch_top(10).unwrap().is_empty());
    }

    #[test]
    fn inserts_are_append_only() {
        let store = MemScoreStore::new();
        store.insert(record("alice", 3)).unwrap();
        store.insert(record("alice", 7)).unwrap();
        // Both entries survive; the read path just orders them
        let top = store.fetch_top(10).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].score, 7);
    }

    #[test]
    fn file_store_roundtrip() {
        let path = std::env::temp_dir().join(format!(
            "flock-scores-test-{}.json",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        let store = FileScoreStore::new(&path);
        assert!(store.fetch_top(10).unwrap().is_empty());

        store.insert(record("alice", 20)).unwrap();
        store.insert(record("bob", 35)).unwrap();

        // A second handle sees persisted records (read-through, no cache)
        let other = FileScoreStore::new(&path);
        let top = other.fetch_top(10).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].username, "bob");

        std::fs::remove_file(&path).unwrap();
    }
}
