//! 整机控制核心
//!
//! 本 crate 提供整机力矩控制器的全部核心机制，包括：
//! - 三态双缓冲（[`state_cell`]）：更新线程与控制线程之间的无锁状态交接
//! - 任务层（[`task`] / [`tasks`]）：双缓冲控制目标与具体任务种类
//! - 约束层（[`constraint`] / [`constraints`] / [`constraint_set`]）：
//!   完整约束的行聚合与秩检查
//! - 合成层（[`controller`]）：优先级分层零空间投影，聚合为关节力矩
//! - 更新线程（[`updater`]）：把慢路径状态重算剥离出实时循环
//! - 计划配置（[`config`]）：TOML 计划文档的加载、工厂构建与保存
//!
//! # 线程模型
//!
//! 两条线程：控制线程以固定频率执行合成（见 `wbc-servo`），更新线程
//! 异步重算任务状态。二者只通过每任务的三态缓冲与一个有界快照信箱
//! 交互，控制路径上没有任何阻塞原语。

pub mod command;
pub mod compound_task;
pub mod config;
pub mod constraint;
pub mod constraint_set;
pub mod constraints;
pub mod controller;
pub mod error;
mod join;
pub mod plan;
pub mod state_cell;
pub mod task;
pub mod tasks;
pub mod updater;

pub use command::{Command, CommandType};
pub use compound_task::CompoundTask;
pub use config::{ElementConfig, PlanConfig, load_plan, save_plan, save_plan_from};
pub use constraint::Constraint;
pub use constraint_set::ConstraintSet;
pub use controller::{CompositionPolicy, HierarchicalNullSpace, TaskContribution, TorqueController};
pub use error::CoreError;
pub use join::{JoinError, JoinTimeout};
pub use plan::PlanElement;
pub use state_cell::{StateCell, UpdateStatus};
pub use task::{Task, TaskKind, TaskState};
pub use updater::TaskUpdater;
