use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{error, info, warn};

use batch_analysis::clients::{OllamaClient, OllamaProbe, OpenAiClient, OpenAiProbe};
use batch_analysis::models::discover_source_files;
use batch_analysis::orchestrator::{CompletionCallback, ProgressCallback};
use batch_analysis::utils::logging;
use batch_analysis::{
    AnalysisRecord, BatchError, BatchOrchestrator, Config, ConfigFingerprint, ConnectivityProbe,
    ErrorKind, InferenceBackend, InferenceInvoker, JsonFileRecordStore, ProgressEvent,
    ProgressOutcome, TimingExporter,
};

/// 未指定类型时清理的错误（可能随环境恢复的那几类）
const DEFAULT_CLEAR_KINDS: [ErrorKind; 3] = [ErrorKind::Vram, ErrorKind::Timeout, ErrorKind::ApiError];

const USAGE: &str = "用法: batch-analysis <run | status | clear-errors [kind...]>";

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::load().context("加载配置失败")?;

    // 初始化日志
    logging::init(config.verbose_logging);

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("run") => run(config).await,
        Some("status") => status(config).await,
        Some("clear-errors") => clear_errors(config, &args[1..]).await,
        Some(other) => bail!("未知命令: {}\n{}", other, USAGE),
    }
}

/// 按配置的后端创建推理客户端与探测器
fn build_collaborators(config: &Config) -> (Arc<dyn InferenceInvoker>, Arc<dyn ConnectivityProbe>) {
    match config.backend {
        InferenceBackend::Ollama => (
            Arc::new(OllamaClient::new(config)),
            Arc::new(OllamaProbe::new(config)),
        ),
        InferenceBackend::OpenAiCompatible => (
            Arc::new(OpenAiClient::new(config)),
            Arc::new(OpenAiProbe::new(config)),
        ),
    }
}

fn build_orchestrator(config: &Config) -> BatchOrchestrator {
    let (invoker, probe) = build_collaborators(config);
    let store = Arc::new(JsonFileRecordStore::new(config.data_dir()));
    BatchOrchestrator::new(invoker, probe, store, config.batch_settings())
}

async fn load_files(config: &Config) -> Result<Vec<String>> {
    info!("\n📁 正在扫描源文件: {}", config.project_dir);
    discover_source_files(&config.project_dir, &config.analysis.language).await
}

async fn run(config: Config) -> Result<()> {
    logging::init_log_file(&config.output_log_file, &config.project_name)?;

    let files = load_files(&config).await?;
    if files.is_empty() {
        warn!("⚠️ 没有找到待分析的源文件，程序结束");
        return Ok(());
    }

    let on_progress: ProgressCallback = Arc::new(|event: &ProgressEvent| match &event.outcome {
        ProgressOutcome::Checkpointed { .. } => {
            info!("[{:>3}%] ♻️  {} (检查点)", event.percent, event.file_path)
        }
        ProgressOutcome::Completed { record } => info!(
            "[{:>3}%] ✅ {} ({} ms)",
            event.percent, event.file_path, record.timing_ms
        ),
        ProgressOutcome::Failed { kind, message } => warn!(
            "[{:>3}%] ❌ {} ({}): {}",
            event.percent,
            event.file_path,
            kind,
            logging::truncate_text(message, 120)
        ),
    });
    let on_complete: CompletionCallback =
        Arc::new(|results: &[AnalysisRecord], error: Option<&BatchError>| match error {
            Some(e) => error!("🛑 批次终止: {} (已产出 {} 条结果)", e, results.len()),
            None => info!("🏁 批次结束，共 {} 条结果", results.len()),
        });

    let orchestrator = Arc::new(
        build_orchestrator(&config)
            .with_progress_callback(on_progress)
            .with_completion_callback(on_complete),
    );

    let summary = orchestrator.summarize(&files, &config.analysis).await?;
    logging::log_files_loaded(&summary);

    let session_id = orchestrator.run(files, &config.analysis).await?;
    logging::log_startup(
        &session_id,
        &config.analysis.model,
        ConfigFingerprint::compute(&config.analysis).short(),
    );

    // Ctrl-C 从另一个任务发起取消
    let canceller = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let result = orchestrator.cancel().await;
                warn!("收到 Ctrl-C: {}", result.message);
            }
        })
    };

    let report = orchestrator.wait().await?;
    canceller.abort();

    let exporter = TimingExporter::new(config.export_dir());
    match exporter.export(&config.project_name, &report.timing).await {
        Ok(path) => info!("⏱️ 计时已导出: {}", path.display()),
        Err(e) => error!("计时导出失败: {}", e),
    }

    logging::print_final_stats(
        report.success_count(),
        report.failure_count(),
        report.results.len(),
        &report.timing,
        &config.output_log_file,
    );

    if let Some(e) = report.error {
        return Err(e).context("批次未能完成");
    }
    Ok(())
}

async fn status(config: Config) -> Result<()> {
    let files = load_files(&config).await?;
    let orchestrator = build_orchestrator(&config);
    let summary = orchestrator.summarize(&files, &config.analysis).await?;

    let json = serde_json::to_string_pretty(&summary)?;
    info!("检查点统计:\n{}", json);
    Ok(())
}

async fn clear_errors(config: Config, args: &[String]) -> Result<()> {
    let kinds: HashSet<ErrorKind> = if args.is_empty() {
        DEFAULT_CLEAR_KINDS.into_iter().collect()
    } else {
        args.iter()
            .map(|s| s.parse::<ErrorKind>())
            .collect::<std::result::Result<HashSet<ErrorKind>, String>>()
            .map_err(|e| anyhow::anyhow!("{}\n{}", e, USAGE))?
    };

    let orchestrator = build_orchestrator(&config);
    let count = orchestrator.clear_errors(&kinds).await?;
    info!("✓ 已重置 {} 条失败记录", count);
    Ok(())
}
