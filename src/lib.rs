//! # Batch Analysis
//!
//! 源码批量分析的生命周期管理：检查点复用、失败分类、API 限流下的自动暂停与重试、
//! 区分总耗时与有效耗时的计时
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持久化记录，只暴露读写能力
//! - `RecordStore` - 内存 / JSON 文件两种实现
//!
//! ### ② 外部协作方（Clients）
//! - `clients/` - 推理调用与连通性探测
//! - `OllamaClient` / `OpenAiClient` - 具体后端
//!
//! ### ③ 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心流程
//! - `ConfigFingerprint` - 配置指纹
//! - `ErrorClassifier` - 错误分类
//! - `CheckpointStore` - 检查点判断与清理
//! - `TimingAccumulator` - 暂停感知的计时
//!
//! ### ④ 流程层（Workflow）
//! - `workflow/` - 定义"一个文件"的处理流程与自动暂停状态机
//! - `FileFlow` - 检查点 → 推理 → 记录
//! - `PauseController` - 等待 → 探测 → 恢复 / 耗尽
//!
//! ### ⑤ 编排层（Orchestration）
//! - `orchestrator/` - 批次会话、后台工作任务、手动操作
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{ConnectivityProbe, InferenceFailure, InferenceInvoker, InferenceOutput};
pub use config::{AnalysisConfig, BatchSettings, Config, InferenceBackend};
pub use error::{BatchError, ConfigError, StorageError};
pub use infrastructure::{JsonFileRecordStore, MemoryRecordStore, RecordStore};
pub use models::{AnalysisRecord, ErrorKind, RecordStatus, SessionState};
pub use orchestrator::{
    ActionResult, BatchOrchestrator, BatchReport, BatchStatus, ProgressEvent, ProgressOutcome,
};
pub use services::{
    CheckpointStore, CheckpointSummary, ConfigFingerprint, ErrorClassifier, TimingAccumulator,
    TimingExporter, TimingReport,
};
pub use workflow::{PauseController, PauseStatus};
