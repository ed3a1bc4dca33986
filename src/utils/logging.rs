use anyhow::{Context, Result};
/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use std::fs;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::services::{CheckpointSummary, TimingReport};

/// 初始化 tracing 日志
///
/// 默认级别 info，可通过 `RUST_LOG` 覆盖；重复调用不会报错
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
/// - `project_name`: 项目名称
pub fn init_log_file(log_file_path: &str, project_name: &str) -> Result<()> {
    let log_header = format!(
        "{}\n源码批量分析日志 - {} - {}\n{}\n\n",
        "=".repeat(60),
        project_name,
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)
        .with_context(|| format!("无法写入日志文件: {}", log_file_path))?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(session_id: &str, model: &str, fingerprint: &str) {
    info!("{}", "=".repeat(60));
    info!("🚀 批量分析启动 [session {}]", session_id);
    info!("🤖 模型: {}", model);
    info!("🔑 配置指纹: {}", fingerprint);
    info!("{}", "=".repeat(60));
}

/// 记录文件扫描结果与检查点情况
pub fn log_files_loaded(summary: &CheckpointSummary) {
    info!("✓ 找到 {} 个源文件", summary.total);
    info!(
        "♻️  可复用检查点: {} 个，待处理: {} 个",
        summary.skipped_requests_saved,
        summary.total - summary.skipped_requests_saved
    );
    if summary.failure > 0 {
        info!("💡 其中 {} 个文件上次分析失败，将重新尝试", summary.failure);
    }
    info!("");
}

/// 打印最终统计信息
///
/// # 参数
/// - `success`: 成功数量
/// - `failed`: 失败数量
/// - `total`: 总数
/// - `timing`: 计时报告
/// - `log_file_path`: 日志文件路径
pub fn print_final_stats(
    success: usize,
    failed: usize,
    total: usize,
    timing: &TimingReport,
    log_file_path: &str,
) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", success, total);
    info!("❌ 失败: {}", failed);
    info!("⏱️  总耗时: {}", format_duration_ms(timing.total_analysis_time_ms));
    info!(
        "⚡ 有效耗时: {}",
        format_duration_ms(timing.effective_analysis_time_ms)
    );
    info!("⏸️  暂停耗时: {}", format_duration_ms(timing.total_pause_time_ms));
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 把毫秒格式化为 `1h 02m 03s`
pub fn format_duration_ms(ms: u64) -> String {
    let secs = ms / 1000;
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h {:02}m {:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{}.{:03}s", s, ms % 1000)
    }
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("短文本", 10), "短文本");
        assert_eq!(truncate_text("一二三四五", 3), "一二三...");
    }

    #[test]
    fn test_format_duration_ms() {
        assert_eq!(format_duration_ms(1_500), "1.500s");
        assert_eq!(format_duration_ms(125_000), "2m 05s");
        assert_eq!(format_duration_ms(3_723_000), "1h 02m 03s");
    }

    #[test]
    fn test_init_log_file_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis_log.txt");
        init_log_file(path.to_str().unwrap(), "demo").unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("源码批量分析日志 - demo"));
    }
}
