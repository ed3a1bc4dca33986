//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批次调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_orchestrator` - 批量分析编排器
//! - 启动批次、维持单会话约束
//! - 暴露手动操作（强制重试、取消、暂停 / 恢复）与状态查询
//! - 按错误类型清理失败记录
//!
//! ### `session_worker` - 批次工作任务
//! - 顺序遍历单个批次的文件（Vec<String>）
//! - 调用 FileFlow 处理单个文件
//! - 把结果落到会话上，推进游标，发出进度事件
//! - 瞬时错误交给 PauseController，挂起等待唤醒
//!
//! ### `events` - 进度与完成回调
//!
//! ## 层次关系
//!
//! ```text
//! batch_orchestrator (管理 BatchSession)
//!     ↓
//! session_worker (处理 Vec<String>)
//!     ↓
//! workflow::FileFlow / PauseController (处理单个文件 / 暂停状态机)
//!     ↓
//! services (能力层：fingerprint / classifier / checkpoint / timing)
//!     ↓
//! infrastructure (基础设施：RecordStore)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：batch_orchestrator 管会话，session_worker 管文件循环
//! 2. **顺序处理**：每个批次只有一个工作任务，文件从不并行
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure
//! 4. **单锁串行**：会话字段只在同一把锁内修改

pub mod batch_orchestrator;
pub mod events;
pub mod session_worker;

// 重新导出主要类型
pub use batch_orchestrator::{ActionResult, BatchOrchestrator, BatchStatus};
pub use events::{CompletionCallback, ProgressCallback, ProgressEvent, ProgressOutcome};
pub use session_worker::BatchReport;
