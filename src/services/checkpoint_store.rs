//! 检查点存储 - 业务能力层
//!
//! 职责：
//! - 回答"这个文件在当前配置下是否已经完成"
//! - 配置变更时把旧的成功记录标记为不兼容
//! - 按错误类型批量重置失败记录
//!
//! 不负责：持久化细节（由 `RecordStore` 提供）

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::infrastructure::RecordStore;
use crate::models::{AnalysisRecord, ErrorKind, RecordStatus};
use crate::services::ConfigFingerprint;

/// 检查点统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckpointSummary {
    pub total: usize,
    pub success: usize,
    pub pending: usize,
    pub failure: usize,
    pub incompatible: usize,
    /// 可直接复用的成功记录数（即省下的推理请求数）
    pub skipped_requests_saved: usize,
}

/// 检查点存储
#[derive(Clone)]
pub struct CheckpointStore {
    store: Arc<dyn RecordStore>,
}

impl CheckpointStore {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn load(&self, file_path: &str) -> Result<Option<AnalysisRecord>, StorageError> {
        self.store.get(file_path).await
    }

    /// 文件是否需要（重新）处理
    ///
    /// 成功记录的指纹与当前不一致时，会先被改写为 `incompatible`。
    pub async fn is_pending(
        &self,
        file_path: &str,
        current: &ConfigFingerprint,
    ) -> Result<bool, StorageError> {
        let Some(mut record) = self.store.get(file_path).await? else {
            return Ok(true);
        };

        match record.status {
            RecordStatus::Success if record.is_reusable(current) => Ok(false),
            RecordStatus::Success => {
                debug!(
                    "配置已变更，检查点失效: {} ({} -> {})",
                    file_path,
                    record.config_fingerprint.short(),
                    current.short()
                );
                record.mark_incompatible();
                self.store.put(&record).await?;
                Ok(true)
            }
            RecordStatus::Pending | RecordStatus::Failure | RecordStatus::Incompatible => Ok(true),
        }
    }

    pub async fn write(&self, record: &AnalysisRecord) -> Result<(), StorageError> {
        self.store.put(record).await
    }

    /// 把指定错误类型的失败记录重置为待处理，返回重置数量
    pub async fn clear_by_error_kind(&self, kinds: &HashSet<ErrorKind>) -> Result<usize, StorageError> {
        let mut count = 0;
        for mut record in self.store.all().await? {
            let matches = record.status == RecordStatus::Failure
                && record.error_kind.is_some_and(|k| kinds.contains(&k));
            if !matches {
                continue;
            }
            record.reset_to_pending();
            self.store.put(&record).await?;
            count += 1;
        }

        info!("🧹 已重置 {} 条失败记录 (类型: {})", count, format_kinds(kinds));
        Ok(count)
    }

    /// 统计给定文件列表在当前指纹下的检查点状况
    ///
    /// 不修改任何记录；没有记录的文件计入 `pending`。
    pub async fn summarize(
        &self,
        files: &[String],
        current: &ConfigFingerprint,
    ) -> Result<CheckpointSummary, StorageError> {
        let mut summary = CheckpointSummary {
            total: files.len(),
            ..Default::default()
        };

        for file in files {
            let Some(record) = self.store.get(file).await? else {
                summary.pending += 1;
                continue;
            };
            match record.status {
                RecordStatus::Success => {
                    summary.success += 1;
                    if record.is_reusable(current) {
                        summary.skipped_requests_saved += 1;
                    }
                }
                RecordStatus::Pending => summary.pending += 1,
                RecordStatus::Failure => summary.failure += 1,
                RecordStatus::Incompatible => summary.incompatible += 1,
            }
        }

        Ok(summary)
    }
}

fn format_kinds(kinds: &HashSet<ErrorKind>) -> String {
    let mut names: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
    names.sort_unstable();
    names.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::infrastructure::MemoryRecordStore;
    use tokio_test::{assert_err, assert_ok};

    fn fp(model: &str) -> ConfigFingerprint {
        ConfigFingerprint::compute(&AnalysisConfig {
            model: model.to_string(),
            ..AnalysisConfig::default()
        })
    }

    fn store_with(records: Vec<AnalysisRecord>) -> (Arc<MemoryRecordStore>, CheckpointStore) {
        let backend = Arc::new(MemoryRecordStore::with_records(records));
        let checkpoints = CheckpointStore::new(backend.clone());
        (backend, checkpoints)
    }

    #[tokio::test]
    async fn test_is_pending_absent_and_failure() {
        let current = fp("codellama:7b");
        let (_, checkpoints) = store_with(vec![AnalysisRecord::failure(
            "b.c",
            current.clone(),
            ErrorKind::Vram,
            "out of memory",
            10,
        )]);

        assert!(checkpoints.is_pending("a.c", &current).await.unwrap());
        assert!(checkpoints.is_pending("b.c", &current).await.unwrap());
    }

    #[tokio::test]
    async fn test_success_with_matching_fingerprint_is_done() {
        let current = fp("codellama:7b");
        let (_, checkpoints) = store_with(vec![AnalysisRecord::success("a.c", current.clone(), "r/a", 5)]);
        assert!(!checkpoints.is_pending("a.c", &current).await.unwrap());
    }

    #[tokio::test]
    async fn test_model_change_marks_incompatible() {
        let old = fp("codellama:7b");
        let new = fp("qwen2.5-coder:7b");
        let (_, checkpoints) = store_with(vec![AnalysisRecord::success("a.c", old, "r/a", 5)]);

        assert!(checkpoints.is_pending("a.c", &new).await.unwrap());
        let record = checkpoints.load("a.c").await.unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Incompatible);
        // 不兼容的记录在新配置下仍然待处理
        assert!(checkpoints.is_pending("a.c", &new).await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_by_error_kind_is_selective() {
        let current = fp("codellama:7b");
        let (_, checkpoints) = store_with(vec![
            AnalysisRecord::failure("a.c", current.clone(), ErrorKind::Vram, "oom", 1),
            AnalysisRecord::failure("b.c", current.clone(), ErrorKind::Vram, "oom", 1),
            AnalysisRecord::failure("c.c", current.clone(), ErrorKind::General, "boom", 1),
            AnalysisRecord::success("d.c", current.clone(), "r/d", 1),
        ]);

        let kinds: HashSet<ErrorKind> = [ErrorKind::Vram].into_iter().collect();
        assert_eq!(checkpoints.clear_by_error_kind(&kinds).await.unwrap(), 2);

        let a = checkpoints.load("a.c").await.unwrap().unwrap();
        assert_eq!(a.status, RecordStatus::Pending);
        assert_eq!(a.error_kind, None);
        assert_eq!(a.error_message, None);

        let c = checkpoints.load("c.c").await.unwrap().unwrap();
        assert_eq!(c.status, RecordStatus::Failure);
        assert_eq!(c.error_kind, Some(ErrorKind::General));

        let d = checkpoints.load("d.c").await.unwrap().unwrap();
        assert_eq!(d.status, RecordStatus::Success);

        // 再清理一次不会有变化
        assert_eq!(checkpoints.clear_by_error_kind(&kinds).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_summarize_counts() {
        let current = fp("codellama:7b");
        let old = fp("llama3");
        let (_, checkpoints) = store_with(vec![
            AnalysisRecord::success("a.c", current.clone(), "r/a", 1),
            AnalysisRecord::success("b.c", current.clone(), "r/b", 1),
            AnalysisRecord::success("c.c", old, "r/c", 1),
            AnalysisRecord::failure("d.c", current.clone(), ErrorKind::Timeout, "slow", 1),
        ]);

        let files: Vec<String> = ["a.c", "b.c", "c.c", "d.c", "e.c"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let summary = checkpoints.summarize(&files, &current).await.unwrap();

        assert_eq!(
            summary,
            CheckpointSummary {
                total: 5,
                success: 3,
                pending: 1,
                failure: 1,
                incompatible: 0,
                skipped_requests_saved: 2,
            }
        );
    }

    #[tokio::test]
    async fn test_storage_errors_propagate() {
        let current = fp("codellama:7b");
        let (backend, checkpoints) = store_with(Vec::new());
        backend.set_available(false);

        assert_err!(checkpoints.is_pending("a.c", &current).await);
        assert_err!(
            checkpoints
                .write(&AnalysisRecord::success("a.c", current.clone(), "r", 1))
                .await
        );

        backend.set_available(true);
        assert_ok!(
            checkpoints
                .write(&AnalysisRecord::success("a.c", current, "r", 1))
                .await
        );
    }
}
