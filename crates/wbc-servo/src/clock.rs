//! 固定频率伺服时钟
//!
//! 拥有一条专用控制线程，以固定频率驱动一个 [`Servoable`]：启动后先
//! 调用一次 `servo_init`，随后每个周期调用一次 `servo_update`。
//!
//! 周期调度使用绝对时间锚点（`next_tick += period`）消除累积漂移；
//! 单周期超时（overrun）只告警并把锚点重置到当前时间，不会让后续
//! 周期为了追赶而挤在一起。停止请求在周期边界生效，绝不在周期中途
//! 打断 `servo_update`。

use crate::error::ServoError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};
use wbc_core::JoinTimeout;

/// 停机时等待伺服线程退出的窗口
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// 被伺服时钟周期性驱动的控制循环
///
/// 两个方法都只会在伺服线程上被调用：`servo_init` 恰好一次（第一个
/// 周期之前），`servo_update` 每个周期一次。
pub trait Servoable: Send + 'static {
    /// 第一个周期之前的一次性初始化
    fn servo_init(&mut self) -> Result<(), ServoError> {
        Ok(())
    }

    /// 执行一个控制周期
    ///
    /// 返回 `Err` 视为致命故障：时钟停止驱动并退出伺服线程。
    fn servo_update(&mut self) -> Result<(), ServoError>;
}

/// 固定频率伺服时钟
pub struct ServoClock {
    frequency: f64,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ServoClock {
    /// 创建时钟；频率必须是有限正数
    pub fn new(frequency: f64) -> Result<Self, ServoError> {
        if !frequency.is_finite() || frequency <= 0.0 {
            return Err(ServoError::InvalidFrequency(frequency));
        }
        Ok(Self {
            frequency,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        })
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// 名义周期
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frequency)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// 启动伺服线程，开始周期驱动
    pub fn start<S: Servoable>(&mut self, servoable: S) -> Result<(), ServoError> {
        if self.thread.is_some() {
            return Err(ServoError::AlreadyRunning);
        }

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let period = self.period();
        let handle = std::thread::Builder::new()
            .name("wbc-servo".to_string())
            .spawn(move || servo_loop(servoable, period, running))
            .map_err(|e| {
                // 线程没起来：运行标志不能留在 true
                self.running.store(false, Ordering::Release);
                ServoError::Spawn(e.to_string())
            })?;
        self.thread = Some(handle);
        Ok(())
    }

    /// 请求停止并限时等待伺服线程退出
    ///
    /// 停止在周期边界生效：正在执行的 `servo_update` 会先完成。
    pub fn stop(&mut self) -> Result<(), ServoError> {
        let Some(handle) = self.thread.take() else {
            return Err(ServoError::NotRunning);
        };
        self.running.store(false, Ordering::Release);
        handle
            .join_timeout(JOIN_TIMEOUT)
            .map_err(|_| ServoError::ShutdownTimeout)
    }
}

impl Drop for ServoClock {
    fn drop(&mut self) {
        if self.thread.is_some()
            && let Err(e) = self.stop()
        {
            error!("Servo clock failed to shut down cleanly: {}", e);
        }
    }
}

#[cfg(feature = "realtime")]
fn promote_thread_priority() {
    use thread_priority::{ThreadPriority, set_current_thread_priority};
    if let Err(e) = set_current_thread_priority(ThreadPriority::Max) {
        warn!(
            "Failed to raise servo thread priority, running at normal priority: {:?}",
            e
        );
    }
}

fn servo_loop<S: Servoable>(mut servoable: S, period: Duration, running: Arc<AtomicBool>) {
    #[cfg(feature = "realtime")]
    promote_thread_priority();

    if let Err(e) = servoable.servo_init() {
        error!("Servo init failed, clock will not run: {}", e);
        running.store(false, Ordering::Release);
        return;
    }
    debug!("Servo thread started, period {:?}", period);

    // 绝对时间锚点：消除累积漂移
    let mut next_tick = Instant::now();
    while running.load(Ordering::Acquire) {
        next_tick += period;

        if let Err(e) = servoable.servo_update() {
            error!("Servo update failed, stopping clock: {}", e);
            break;
        }

        let now = Instant::now();
        if next_tick > now {
            spin_sleep::sleep(next_tick - now);
        } else {
            warn!(
                "Servo cycle overrun: update took {:?} against a {:?} period, resetting anchor",
                now.duration_since(next_tick - period),
                period
            );
            next_tick = now;
        }
    }

    running.store(false, Ordering::Release);
    debug!("Servo thread exiting");
}
