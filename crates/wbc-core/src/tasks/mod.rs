//! 任务种类库
//!
//! 封闭的 [`TaskKind`](crate::task::TaskKind) 具体种类集合：
//! - [`JointPositionTask`]：关节空间全姿态 PD 目标
//! - [`CartesianPositionTask`]：指定 body frame 的笛卡尔位置 PD 目标

mod cartesian_position;
mod joint_position;

pub use cartesian_position::{CartesianPositionConfig, CartesianPositionTask};
pub use joint_position::{JointPositionConfig, JointPositionTask};
