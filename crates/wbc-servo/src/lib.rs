//! 固定频率伺服层
//!
//! 本 crate 把 `wbc-core` 的控制周期接到一条真实的固定频率线程上：
//! - [`Servoable`]：控制循环的能力接口（一次 `servo_init` 加周期性
//!   `servo_update`）
//! - [`ServoClock`]：绝对时间锚点调度的伺服时钟，带超时告警与周期
//!   边界停止语义
//!
//! 开启 `realtime` 特性后伺服线程会尝试提升调度优先级，失败时降级
//! 为普通优先级并告警。

mod clock;
mod error;

pub use clock::{ServoClock, Servoable};
pub use error::ServoError;
