//! 记录存储 - 基础设施层
//!
//! 持久化 `file_path -> AnalysisRecord` 的键值映射，只暴露读写能力

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::models::AnalysisRecord;

/// 持久化记录存储
///
/// 职责：
/// - 按 file_path 读写记录
/// - 不认识指纹 / 批次
/// - 失败统一返回 `StorageError`
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, file_path: &str) -> Result<Option<AnalysisRecord>, StorageError>;

    /// 按 file_path 插入或覆盖
    async fn put(&self, record: &AnalysisRecord) -> Result<(), StorageError>;

    async fn all(&self) -> Result<Vec<AnalysisRecord>, StorageError>;
}

/// 内存记录存储
#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<String, AnalysisRecord>>,
    unavailable: AtomicBool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置记录
    pub fn with_records(records: impl IntoIterator<Item = AnalysisRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|r| (r.file_path.clone(), r))
            .collect();
        Self {
            records: RwLock::new(map),
            unavailable: AtomicBool::new(false),
        }
    }

    /// 模拟存储不可用
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable {
                reason: "内存存储已被标记为不可用".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, file_path: &str) -> Result<Option<AnalysisRecord>, StorageError> {
        self.check_available()?;
        Ok(self.records.read().await.get(file_path).cloned())
    }

    async fn put(&self, record: &AnalysisRecord) -> Result<(), StorageError> {
        self.check_available()?;
        self.records
            .write()
            .await
            .insert(record.file_path.clone(), record.clone());
        Ok(())
    }

    async fn all(&self) -> Result<Vec<AnalysisRecord>, StorageError> {
        self.check_available()?;
        let mut records: Vec<AnalysisRecord> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        Ok(records)
    }
}

/// JSON 文件记录存储
///
/// 每个源文件一个 JSON 文档：`<data_dir>/<文件名>-<路径摘要>.json`
pub struct JsonFileRecordStore {
    data_dir: PathBuf,
}

impl JsonFileRecordStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn record_path(&self, file_path: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(file_path.as_bytes()));
        let base = Path::new(file_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "record".to_string());
        self.data_dir
            .join(format!("{}-{}_analysis.json", base, &digest[..16]))
    }

    async fn read_record(path: &Path) -> Result<AnalysisRecord, StorageError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| StorageError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| StorageError::json(path, e))
    }
}

#[async_trait]
impl RecordStore for JsonFileRecordStore {
    async fn get(&self, file_path: &str) -> Result<Option<AnalysisRecord>, StorageError> {
        let path = self.record_path(file_path);
        match fs::metadata(&path).await {
            Ok(_) => Ok(Some(Self::read_record(&path).await?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    async fn put(&self, record: &AnalysisRecord) -> Result<(), StorageError> {
        fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| StorageError::io(&self.data_dir, e))?;

        let path = self.record_path(&record.file_path);
        let content =
            serde_json::to_string_pretty(record).map_err(|e| StorageError::json(&path, e))?;

        // 先写临时文件再改名，避免中断时留下半截记录
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .await
            .map_err(|e| StorageError::io(&tmp, e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;

        debug!("记录已写入: {} -> {}", record.file_path, path.display());
        Ok(())
    }

    async fn all(&self) -> Result<Vec<AnalysisRecord>, StorageError> {
        if !self.data_dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        let mut entries = fs::read_dir(&self.data_dir)
            .await
            .map_err(|e| StorageError::io(&self.data_dir, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.data_dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match Self::read_record(&path).await {
                Ok(record) => records.push(record),
                Err(e) => warn!("跳过无法解析的记录文件 {}: {}", path.display(), e),
            }
        }

        records.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::models::{ErrorKind, RecordStatus};
    use crate::services::ConfigFingerprint;

    fn fingerprint() -> ConfigFingerprint {
        ConfigFingerprint::compute(&AnalysisConfig::default())
    }

    #[tokio::test]
    async fn test_json_store_upsert_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileRecordStore::new(dir.path().join("data"));

        assert!(store.get("src/a.c").await.unwrap().is_none());

        let first = AnalysisRecord::failure("src/a.c", fingerprint(), ErrorKind::Vram, "oom", 12);
        store.put(&first).await.unwrap();
        let second = AnalysisRecord::success("src/a.c", fingerprint(), "results/a.json", 40);
        store.put(&second).await.unwrap();
        store
            .put(&AnalysisRecord::success("lib/a.c", fingerprint(), "results/b.json", 5))
            .await
            .unwrap();

        let loaded = store.get("src/a.c").await.unwrap().unwrap();
        assert_eq!(loaded.status, RecordStatus::Success);
        assert_eq!(loaded.error_kind, None);

        // 同名不同路径的文件不会互相覆盖
        let all = store.all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].file_path, "lib/a.c");
    }

    #[tokio::test]
    async fn test_json_store_skips_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileRecordStore::new(dir.path());
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        store
            .put(&AnalysisRecord::success("a.c", fingerprint(), "r", 1))
            .await
            .unwrap();

        assert_eq!(store.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_unavailable() {
        let store = MemoryRecordStore::new();
        store.set_available(false);
        let err = store.get("a.c").await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable { .. }));
        store.set_available(true);
        assert!(store.get("a.c").await.unwrap().is_none());
    }
}
