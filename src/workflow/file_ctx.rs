//! 文件处理上下文
//!
//! 封装"我正在处理哪个批次的第几个文件"这一信息

use std::fmt::Display;

/// 文件处理上下文
#[derive(Debug, Clone)]
pub struct FileCtx {
    /// 批次ID
    pub session_id: String,

    /// 文件在批次中的索引（从0开始）
    pub index: usize,

    /// 批次文件总数
    pub total: usize,

    /// 文件路径
    pub file_path: String,
}

impl FileCtx {
    pub fn new(session_id: String, index: usize, total: usize, file_path: String) -> Self {
        Self {
            session_id,
            index,
            total,
            file_path,
        }
    }
}

impl Display for FileCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[session {} 文件 {}/{} {}]",
            short_id(&self.session_id),
            self.index + 1,
            self.total,
            self.file_path
        )
    }
}

fn short_id(session_id: &str) -> &str {
    session_id.get(..8).unwrap_or(session_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_one_based() {
        let ctx = FileCtx::new(
            "0b5c7e2a-1111-2222-3333-444455556666".to_string(),
            0,
            12,
            "src/main.c".to_string(),
        );
        assert_eq!(ctx.to_string(), "[session 0b5c7e2a 文件 1/12 src/main.c]");
    }
}
