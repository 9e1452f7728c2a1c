//! 三态双缓冲单元
//!
//! 更新线程（写者）与控制线程（读者）之间解耦任务状态重算的核心机制。
//! 一个 [`StateCell`] 拥有两份状态缓冲：*活动* 缓冲只被读者读取，
//! *非活动* 缓冲只被写者写入。两条线程之间唯一共享的可变对象是一个
//! 原子三态标志：
//!
//! ```text
//! IDLE --begin_update()--> UPDATING --commit()--> READY --try_swap()--> IDLE
//!                              |                                        ^
//!                              +-------- guard 未提交即丢弃 ------------+
//! ```
//!
//! 状态缓冲本身不加锁：正确性完全依赖三态协议（状态迁移即发布点）加上
//! 模型引用不得跨周期持有的规则。交换只是句柄（索引）翻转，不拷贝数据。
//!
//! # 线程约定
//!
//! 单写者 / 单读者：`begin_update` 只能由更新线程调用；`try_swap`、
//! `active`、`try_reset` 只能由控制线程调用。读者不得把 `active()`
//! 返回的引用保留到下一次 `try_swap` 之后。

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

const IDLE: u8 = 0;
const UPDATING: u8 = 1;
const READY: u8 = 2;

/// 更新线程的三态状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    /// 空闲，可以开始一次新的更新
    Idle,
    /// 更新线程正在写入非活动缓冲
    Updating,
    /// 非活动缓冲已写完，等待控制线程交换
    Ready,
}

impl UpdateStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            UPDATING => UpdateStatus::Updating,
            READY => UpdateStatus::Ready,
            _ => UpdateStatus::Idle,
        }
    }

    /// 诊断输出用的字符串表示
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStatus::Idle => "IDLE",
            UpdateStatus::Updating => "UPDATING",
            UpdateStatus::Ready => "READY",
        }
    }
}

/// 活动 / 非活动双缓冲加一个原子三态标志
pub struct StateCell<T> {
    buffers: [UnsafeCell<T>; 2],
    /// 活动缓冲的下标，只由读者线程修改
    active: AtomicUsize,
    status: AtomicU8,
}

// 安全性：
// - status 的 CAS 保证同一时刻至多存在一个 UpdateGuard，写者只触碰非活动
//   缓冲；读者只读活动缓冲。
// - active 下标只在 status == READY 时翻转（此时没有存活的 guard），
//   写者下一次 CAS 成功（Acquire）时必然看到读者 Release 发布的新下标。
// - commit 的 Release 写与 try_swap 的 Acquire 读配对，保证缓冲内容
//   先于 READY 对读者可见。
unsafe impl<T: Send> Sync for StateCell<T> {}

impl<T> StateCell<T> {
    /// 用两份初始缓冲创建，状态为 IDLE，缓冲 0 为活动缓冲
    pub fn new(active: T, inactive: T) -> Self {
        Self {
            buffers: [UnsafeCell::new(active), UnsafeCell::new(inactive)],
            active: AtomicUsize::new(0),
            status: AtomicU8::new(IDLE),
        }
    }

    /// 当前三态状态（诊断用）
    pub fn status(&self) -> UpdateStatus {
        UpdateStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// 写者：尝试开始一次更新
    ///
    /// 状态为 IDLE 时迁移到 UPDATING 并返回指向非活动缓冲的 guard；
    /// 否则返回 `None`（上一次结果尚未被消费，或已在更新中）。
    pub fn begin_update(&self) -> Option<UpdateGuard<'_, T>> {
        self.status
            .compare_exchange(IDLE, UPDATING, Ordering::Acquire, Ordering::Relaxed)
            .ok()?;
        let index = 1 - self.active.load(Ordering::Relaxed);
        Some(UpdateGuard {
            cell: self,
            index,
            committed: false,
        })
    }

    /// 读者：若有已就绪的更新则交换活动 / 非活动缓冲
    ///
    /// 只翻转下标，不拷贝数据。无更新就绪时返回 `false` 且无副作用。
    pub fn try_swap(&self) -> bool {
        if self.status.load(Ordering::Acquire) != READY {
            return false;
        }
        let index = self.active.load(Ordering::Relaxed);
        self.active.store(1 - index, Ordering::Relaxed);
        self.status.store(IDLE, Ordering::Release);
        true
    }

    /// 读者：访问活动缓冲
    pub fn active(&self) -> &T {
        let index = self.active.load(Ordering::Relaxed);
        // 安全性：活动缓冲只会被读者线程（即调用者）读取；写者只写
        // 非活动缓冲，下标只在读者自己的 try_swap 中翻转。
        unsafe { &*self.buffers[index].get() }
    }

    /// 读者：夺取写权并重置两份缓冲（init / reinit 路径）
    ///
    /// 从 IDLE 或 READY 夺取 UPDATING 写权，对两份缓冲依次调用 `f`，
    /// 然后回到 IDLE。更新线程恰好正在写入时返回 `false`，调用者应
    /// 稍后重试（任务禁用期间更新线程不会开始新的写入，这个窗口极短）。
    pub fn try_reset(&self, mut f: impl FnMut(&mut T)) -> bool {
        let claimed = self
            .status
            .compare_exchange(IDLE, UPDATING, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
            || self
                .status
                .compare_exchange(READY, UPDATING, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok();
        if !claimed {
            return false;
        }
        // 安全性：持有 UPDATING 写权，更新线程无法进入；唯一的读者
        // 就是当前调用者，因此两份缓冲都可独占访问。
        unsafe {
            f(&mut *self.buffers[0].get());
            f(&mut *self.buffers[1].get());
        }
        self.status.store(IDLE, Ordering::Release);
        true
    }
}

/// 指向非活动缓冲的写入 guard
///
/// [`commit`](UpdateGuard::commit) 把状态发布为 READY —— 状态迁移本身
/// 就是发布点。未提交即丢弃则回到 IDLE，部分写入的缓冲永远不会发布。
pub struct UpdateGuard<'a, T> {
    cell: &'a StateCell<T>,
    index: usize,
    committed: bool,
}

impl<T> std::ops::Deref for UpdateGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // 安全性：guard 存在期间状态为 UPDATING，读者不会触碰非活动缓冲
        unsafe { &*self.cell.buffers[self.index].get() }
    }
}

impl<T> std::ops::DerefMut for UpdateGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // 安全性：同 Deref，且 CAS 保证 guard 唯一
        unsafe { &mut *self.cell.buffers[self.index].get() }
    }
}

impl<T> UpdateGuard<'_, T> {
    /// 发布本次更新：UPDATING → READY
    pub fn commit(mut self) {
        self.committed = true;
        self.cell.status.store(READY, Ordering::Release);
    }
}

impl<T> Drop for UpdateGuard<'_, T> {
    fn drop(&mut self) {
        if !self.committed {
            // 更新中途放弃：回到 IDLE，未写完的缓冲不可见
            self.cell.status.store(IDLE, Ordering::Release);
        }
    }
}
