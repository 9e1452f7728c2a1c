//! 核心层错误类型定义

use thiserror::Error;
use wbc_model::ModelError;

/// 核心层错误类型
#[derive(Error, Debug)]
pub enum CoreError {
    /// 初始化失败（模型未就绪、DOF 不匹配等）
    ///
    /// 调用方收到此错误后**不得**进入伺服循环。
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// 配置加载失败
    ///
    /// 只中止该计划元素的构造，不影响其他元素。
    #[error("Config error in element '{element}': {reason}")]
    Config { element: String, reason: String },

    /// 雅可比 / DOF 尺寸不一致
    ///
    /// 合成步骤跳过该任务在本周期的贡献并上报，而不是中止整个控制器。
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// 契约违反（如 init 之前调用 get_command），视为致命错误
    #[error("Contract violation: {0}")]
    Misuse(&'static str),

    /// 约束集包含冗余或线性相关的行
    #[error("Constraint set is ill-conditioned: {rows} rows, rank {rank}")]
    IllConditionedConstraints { rows: usize, rank: usize },

    /// 按名称查找任务失败
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    /// 更新线程已在运行
    #[error("Task updater thread is already running")]
    UpdaterAlreadyRunning,

    /// 后台线程未能在限定窗口内退出
    ///
    /// 致命错误：说明存在未完成写入的不安全析构窗口。
    #[error("Background thread failed to shut down within the timeout window")]
    ShutdownTimeout,

    /// 动力学模型查询错误
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

#[cfg(test)]
mod tests {
    use super::CoreError;
    use wbc_model::ModelError;

    /// 测试 CoreError 的 Display 实现
    #[test]
    fn test_core_error_display() {
        let err = CoreError::Config {
            element: "RightHandTask".to_string(),
            reason: "missing key `frame`".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("RightHandTask") && msg.contains("missing key"));

        let err = CoreError::DimensionMismatch {
            expected: 6,
            actual: 7,
        };
        assert!(format!("{}", err).contains("expected 6"));

        let err = CoreError::IllConditionedConstraints { rows: 3, rank: 2 };
        let msg = format!("{}", err);
        assert!(msg.contains("3 rows") && msg.contains("rank 2"));
    }

    /// 测试 From<ModelError> 转换
    #[test]
    fn test_from_model_error() {
        let model_err = ModelError::UnknownFrame {
            frame: "palm".to_string(),
        };
        let err: CoreError = model_err.into();
        match err {
            CoreError::Model(ModelError::UnknownFrame { frame }) => assert_eq!(frame, "palm"),
            _ => panic!("Expected Model variant"),
        }
    }
}
