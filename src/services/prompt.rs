//! 分析提示词

use std::path::Path;

use crate::config::AnalysisConfig;

/// 送入模型的源码最大字符数
pub const MAX_CODE_CHARS: usize = 10_000;

const SYSTEM_PROMPT: &str = "你是一名资深软件工程师，擅长源码分析与系统架构。\
请阅读给定的源文件，先给出技术分析，再输出描述调用关系的 JSON 图（nodes / edges / meta）。";

/// 分析提示词
#[derive(Debug, Clone)]
pub struct AnalysisPrompt {
    pub system: String,
    pub user: String,
}

/// 根据源码与分析配置构建提示词
pub fn build_analysis_prompt(file_path: &str, code: &str, config: &AnalysisConfig) -> AnalysisPrompt {
    let filename = Path::new(file_path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file_path.to_string());

    let mut tasks = vec![format!("分析深度: {}", config.analysis_level)];
    if config.include_comments {
        tasks.push("结合代码注释说明设计意图".to_string());
    }
    if config.analyze_dependencies {
        tasks.push("列出外部依赖与被调用的函数".to_string());
    }

    let user = format!(
        "要求:\n- {}\n\n--- 文件: {} ---\n```{}\n{}\n```\n\n--- 完整分析 ---\n",
        tasks.join("\n- "),
        filename,
        config.language,
        truncate_chars(code, MAX_CODE_CHARS)
    );

    AnalysisPrompt {
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains_file_and_language() {
        let config = AnalysisConfig::default();
        let prompt = build_analysis_prompt("src/net/socket.c", "int main() {}", &config);
        assert!(prompt.user.contains("socket.c"));
        assert!(prompt.user.contains("```c\nint main() {}"));
        assert!(prompt.user.contains("依赖"));
    }

    #[test]
    fn test_prompt_respects_flags() {
        let config = AnalysisConfig {
            include_comments: false,
            analyze_dependencies: false,
            ..AnalysisConfig::default()
        };
        let prompt = build_analysis_prompt("a.c", "x", &config);
        assert!(!prompt.user.contains("注释"));
        assert!(!prompt.user.contains("依赖"));
    }

    #[test]
    fn test_code_is_truncated_on_char_boundary() {
        let code = "中".repeat(MAX_CODE_CHARS + 50);
        let prompt = build_analysis_prompt("a.c", &code, &AnalysisConfig::default());
        assert_eq!(prompt.user.matches('中').count(), MAX_CODE_CHARS);
    }
}
