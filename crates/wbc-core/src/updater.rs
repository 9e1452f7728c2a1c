//! 任务状态更新线程
//!
//! 拥有一条专用后台线程，把可能较慢的逐任务状态重算（雅可比、目标）
//! 从确定性的高频控制循环中剥离出来。控制线程每个周期通过一个有界
//! 信箱把最新模型快照递交过来（`try_send`，永不阻塞）；更新线程收到
//! 快照后对每个使能且状态为 IDLE 的任务调用
//! [`Task::update_state`]，UPDATING/READY 状态的任务跳过直到被消费。
//!
//! 快照只在单轮更新内持有，轮末即丢弃 —— 模型引用不跨周期。

use crate::error::CoreError;
use crate::join::JoinTimeout;
use crate::task::Task;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, trace, warn};
use wbc_model::DynamicsModel;

/// 信箱容量：一份在手加一份待取，足以覆盖控制线程超前一个周期
const MAILBOX_CAPACITY: usize = 2;

/// 空转守护超时：没有快照到达时周期性检查运行标志
const GUARD_TIMEOUT: Duration = Duration::from_millis(100);

/// 停机时等待线程退出的窗口
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// 后台任务状态更新器
pub struct TaskUpdater {
    registry: Vec<Arc<Task>>,
    snapshot_tx: Option<Sender<Arc<dyn DynamicsModel>>>,
    thread: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl TaskUpdater {
    pub fn new() -> Self {
        Self {
            registry: Vec::new(),
            snapshot_tx: None,
            thread: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 注册任务（启动前一次）；重复注册同一任务会被忽略
    pub fn register(&mut self, task: Arc<Task>) {
        if self.registry.iter().any(|t| Arc::ptr_eq(t, &task)) {
            warn!("Task '{}' is already registered with the updater", task.name());
            return;
        }
        self.registry.push(task);
    }

    /// 已注册的任务数
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// 启动后台线程
    pub fn start_thread(&mut self) -> Result<(), CoreError> {
        if self.thread.is_some() {
            return Err(CoreError::UpdaterAlreadyRunning);
        }

        let (tx, rx) = crossbeam_channel::bounded::<Arc<dyn DynamicsModel>>(MAILBOX_CAPACITY);
        self.running.store(true, Ordering::Release);

        let tasks = self.registry.clone();
        let running = Arc::clone(&self.running);
        let handle = std::thread::Builder::new()
            .name("wbc-task-updater".to_string())
            .spawn(move || update_loop(tasks, rx, running))
            .map_err(|e| {
                // 线程没起来：运行标志不能留在 true
                self.running.store(false, Ordering::Release);
                CoreError::Initialization(format!("failed to spawn updater thread: {e}"))
            })?;

        self.snapshot_tx = Some(tx);
        self.thread = Some(handle);
        Ok(())
    }

    /// 控制线程：递交本周期的模型快照（永不阻塞）
    ///
    /// 模型的任何修改必须发生在控制线程上、且严格早于本次递交。
    /// 信箱满（更新线程落后超过一个周期）时丢弃本次快照并返回
    /// `false` —— 宁可让更新线程用稍旧的快照，也不能阻塞实时路径。
    pub fn dispatch(&self, model: Arc<dyn DynamicsModel>) -> bool {
        let Some(tx) = &self.snapshot_tx else {
            return false;
        };
        match tx.try_send(model) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                trace!("Updater mailbox full, snapshot dropped for this cycle");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                error!("Updater thread is gone, snapshot dropped");
                false
            }
        }
    }

    /// 停机：设置运行标志、关闭信箱并限时 join
    ///
    /// 返回 `Ok` 之后保证不再有任何对非活动缓冲的写入。超时返回
    /// [`CoreError::ShutdownTimeout`]，属于致命错误。
    pub fn stop(&mut self) -> Result<(), CoreError> {
        self.running.store(false, Ordering::Release);
        // 先真正 drop 掉 Sender，接收端才会 Disconnected 并立即醒来
        self.snapshot_tx = None;

        if let Some(handle) = self.thread.take() {
            handle
                .join_timeout(JOIN_TIMEOUT)
                .map_err(|_| CoreError::ShutdownTimeout)?;
        }
        Ok(())
    }
}

impl Default for TaskUpdater {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskUpdater {
    fn drop(&mut self) {
        if self.thread.is_some()
            && let Err(e) = self.stop()
        {
            error!("Task updater failed to shut down cleanly: {}", e);
        }
    }
}

fn update_loop(
    tasks: Vec<Arc<Task>>,
    rx: Receiver<Arc<dyn DynamicsModel>>,
    running: Arc<AtomicBool>,
) {
    trace!("Task updater thread started with {} tasks", tasks.len());

    while running.load(Ordering::Acquire) {
        let mut model = match rx.recv_timeout(GUARD_TIMEOUT) {
            Ok(model) => model,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        };
        // 信箱里若有更新的快照，直接换成最新的
        while let Ok(newer) = rx.try_recv() {
            model = newer;
        }

        for task in &tasks {
            if !task.is_enabled() {
                continue;
            }
            match task.update_state(model.as_ref()) {
                Ok(_) => {}
                Err(e) => warn!("Task '{}' state update failed: {}", task.name(), e),
            }
        }
        // 快照只在本轮内持有
        drop(model);
    }

    trace!("Task updater thread exiting");
}
