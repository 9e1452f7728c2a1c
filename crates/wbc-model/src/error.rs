//! 模型层错误类型定义

use thiserror::Error;

/// 动力学模型查询错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// 请求的 body frame 不存在于模型中
    #[error("Unknown body frame: {frame}")]
    UnknownFrame { frame: String },

    /// 输出缓冲区尺寸与模型 DOF 数不一致
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}
