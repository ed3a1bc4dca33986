//! 配置指纹 - 业务能力层
//!
//! 只负责"这份结果还能不能复用"的判断依据

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

use crate::config::AnalysisConfig;

/// 配置指纹
///
/// 对影响分析输出的配置做规范化 JSON 后取 SHA-256，
/// 字段顺序不同但取值相同的配置得到相同指纹。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigFingerprint(String);

impl ConfigFingerprint {
    /// 计算分析配置的指纹
    pub fn compute(config: &AnalysisConfig) -> Self {
        // AnalysisConfig 只包含可序列化的基础类型，失败时退化为 Null 也仍然是确定的
        let value = serde_json::to_value(config).unwrap_or(JsonValue::Null);
        Self::from_value(&value)
    }

    /// 计算任意 JSON 配置的指纹
    pub fn from_value(value: &JsonValue) -> Self {
        let mut canonical = String::new();
        write_canonical(value, &mut canonical);
        let digest = Sha256::digest(canonical.as_bytes());
        Self(format!("sha256:{}", hex::encode(digest)))
    }

    /// 两个指纹是否兼容（即摘要相同）
    pub fn is_compatible(&self, other: &ConfigFingerprint) -> bool {
        self == other
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 日志里使用的短格式
    pub fn short(&self) -> &str {
        let hex = self.0.trim_start_matches("sha256:");
        &hex[..hex.len().min(12)]
    }
}

impl Display for ConfigFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 键按字典序输出的紧凑 JSON
fn write_canonical(value: &JsonValue, out: &mut String) {
    match value {
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&JsonValue::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        JsonValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equal_configs_have_equal_fingerprints() {
        let a = AnalysisConfig::default();
        let b = AnalysisConfig::default();
        assert_eq!(ConfigFingerprint::compute(&a), ConfigFingerprint::compute(&b));
    }

    #[test]
    fn test_field_order_does_not_matter() {
        let a = json!({"model": "llama3", "analysis_level": "basic", "include_comments": true});
        let b = json!({"include_comments": true, "model": "llama3", "analysis_level": "basic"});
        assert_eq!(ConfigFingerprint::from_value(&a), ConfigFingerprint::from_value(&b));
    }

    #[test]
    fn test_model_change_breaks_compatibility() {
        let a = AnalysisConfig::default();
        let b = AnalysisConfig {
            model: "deepseek-coder:6.7b".to_string(),
            ..AnalysisConfig::default()
        };
        let fa = ConfigFingerprint::compute(&a);
        let fb = ConfigFingerprint::compute(&b);
        assert!(!fa.is_compatible(&fb));
    }

    #[test]
    fn test_extra_options_participate() {
        let mut b = AnalysisConfig::default();
        b.extra_options.insert("prompt_version".to_string(), json!(2));
        assert_ne!(
            ConfigFingerprint::compute(&AnalysisConfig::default()),
            ConfigFingerprint::compute(&b)
        );
    }

    #[test]
    fn test_format_and_short_form() {
        let fp = ConfigFingerprint::compute(&AnalysisConfig::default());
        assert!(fp.as_str().starts_with("sha256:"));
        assert_eq!(fp.as_str().len(), "sha256:".len() + 64);
        assert_eq!(fp.short().len(), 12);
    }
}
