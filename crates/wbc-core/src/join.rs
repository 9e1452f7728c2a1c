//! 限时 join 扩展
//!
//! 停机路径需要在限定窗口内确认后台线程退出，超出窗口即视为存在
//! 未完成写入的不安全析构窗口。`std::thread::JoinHandle::join` 没有
//! 超时版本，这里通过一条看门狗线程代持阻塞 join、调用方在通道上
//! 限时等待结果来补上。

use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;

/// 限时 join 的失败原因
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    /// 线程未在窗口内退出；看门狗线程继续代持 join，由操作系统在
    /// 进程退出时回收
    #[error("thread did not exit within the timeout window")]
    Timeout,

    /// 线程在退出前 panic
    #[error("thread panicked before exiting")]
    Panicked,
}

/// 给 [`JoinHandle`] 加上限时 join 的扩展 trait
pub trait JoinTimeout {
    /// 在 `timeout` 内等待线程退出
    fn join_timeout(self, timeout: Duration) -> Result<(), JoinError>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> Result<(), JoinError> {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            // 接收端超时离开后发送失败，忽略即可
            let _ = tx.send(self.join());
        });

        match rx.recv_timeout(timeout) {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(JoinError::Panicked),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(JoinError::Timeout),
            // 看门狗自身消失而没有发送结果，只可能是被 join 的线程
            // 让它 panic 了
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(JoinError::Panicked),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_within_timeout() {
        let handle = std::thread::spawn(|| std::thread::sleep(Duration::from_millis(10)));
        assert_eq!(handle.join_timeout(Duration::from_secs(1)), Ok(()));
    }

    #[test]
    fn test_join_timeout_expires() {
        let handle = std::thread::spawn(|| std::thread::sleep(Duration::from_secs(5)));
        assert_eq!(
            handle.join_timeout(Duration::from_millis(20)),
            Err(JoinError::Timeout)
        );
    }

    #[test]
    fn test_panicked_thread_reported() {
        let handle = std::thread::spawn(|| panic!("worker died"));
        assert_eq!(
            handle.join_timeout(Duration::from_secs(1)),
            Err(JoinError::Panicked)
        );
    }
}
