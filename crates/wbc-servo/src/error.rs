//! 伺服层错误类型定义

use thiserror::Error;
use wbc_core::CoreError;

/// 伺服层错误类型
#[derive(Error, Debug)]
pub enum ServoError {
    /// 非法伺服频率（必须是有限正数）
    #[error("Invalid servo frequency: {0} Hz")]
    InvalidFrequency(f64),

    /// 伺服线程已在运行
    #[error("Servo clock is already running")]
    AlreadyRunning,

    /// 伺服线程未在运行
    #[error("Servo clock is not running")]
    NotRunning,

    /// 伺服线程未能在限定窗口内退出
    #[error("Servo thread failed to shut down within the timeout window")]
    ShutdownTimeout,

    /// 线程创建失败
    #[error("Failed to spawn servo thread: {0}")]
    Spawn(String),

    /// 控制核心错误
    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}
