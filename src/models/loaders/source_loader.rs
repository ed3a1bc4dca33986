use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 每种语言对应的源码扩展名
pub fn extensions_for_language(language: &str) -> &'static [&'static str] {
    match language.trim().to_ascii_lowercase().as_str() {
        "c" => &["c", "h"],
        "cpp" | "c++" => &["cpp", "cc", "cxx", "hpp", "hh", "h"],
        "python" => &["py"],
        "java" => &["java"],
        "javascript" => &["js", "jsx", "mjs"],
        "typescript" => &["ts", "tsx"],
        "rust" => &["rs"],
        "go" => &["go"],
        _ => &["c", "h"],
    }
}

/// 递归扫描文件夹，返回指定语言的全部源文件（已排序）
pub async fn discover_source_files(folder_path: &str, language: &str) -> Result<Vec<String>> {
    let root = PathBuf::from(folder_path);

    if !root.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let extensions = extensions_for_language(language);
    let mut files = Vec::new();
    let mut pending_dirs = vec![root];

    while let Some(dir) = pending_dirs.pop() {
        let mut entries = fs::read_dir(&dir)
            .await
            .with_context(|| format!("无法读取文件夹: {}", dir.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;

            if file_type.is_dir() {
                pending_dirs.push(path);
            } else if file_type.is_file() && has_extension(&path, extensions) {
                files.push(path.to_string_lossy().to_string());
            }
        }
    }

    files.sort();
    tracing::info!("在 {} 中找到 {} 个 {} 源文件", folder_path, files.len(), language);

    Ok(files)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}
