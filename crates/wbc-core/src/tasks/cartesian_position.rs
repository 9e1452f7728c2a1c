//! 笛卡尔位置任务
//!
//! 对模型中一个命名 body frame 的任务空间位置施加 PD 目标：
//! `goal = kp * (x_des - x) - kd * J qd`，雅可比直接取自模型。

use crate::error::CoreError;
use crate::task::{TaskKind, TaskState};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::fmt;
use wbc_model::DynamicsModel;

/// 笛卡尔位置任务配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CartesianPositionConfig {
    /// 目标 body frame 名
    pub frame: String,
    /// 位置增益（1/s²）
    pub kp: f64,
    /// 速度增益（1/s）
    pub kd: f64,
    /// 目标任务空间位置；空表示原点
    pub goal: Vec<f64>,
}

impl Default for CartesianPositionConfig {
    fn default() -> Self {
        Self {
            frame: String::new(),
            kp: 400.0,
            kd: 40.0,
            goal: Vec::new(),
        }
    }
}

/// 指定 frame 的笛卡尔位置 PD 任务
#[derive(Debug, Clone, Default)]
pub struct CartesianPositionTask {
    config: CartesianPositionConfig,
}

impl CartesianPositionTask {
    pub fn new(config: CartesianPositionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CartesianPositionConfig {
        &self.config
    }

    fn goal_position(&self, index: usize) -> f64 {
        self.config.goal.get(index).copied().unwrap_or(0.0)
    }
}

impl TaskKind for CartesianPositionTask {
    fn type_name(&self) -> &'static str {
        "cartesian_position"
    }

    fn allocate_state(&self, model: &dyn DynamicsModel) -> Result<TaskState, CoreError> {
        if self.config.frame.is_empty() {
            return Err(CoreError::Initialization(
                "cartesian_position task requires a frame name".to_string(),
            ));
        }
        let mut jacobian = nalgebra::DMatrix::zeros(0, 0);
        model.body_jacobian(&self.config.frame, &mut jacobian)?;
        let dims = jacobian.nrows();
        if !self.config.goal.is_empty() && self.config.goal.len() != dims {
            return Err(CoreError::Initialization(format!(
                "cartesian_position goal has {} entries for a {}-dimensional frame",
                self.config.goal.len(),
                dims
            )));
        }
        Ok(TaskState::zeros(dims, model.num_dofs()))
    }

    fn update_state(
        &self,
        model: &dyn DynamicsModel,
        state: &mut TaskState,
    ) -> Result<(), CoreError> {
        if state.jacobian.ncols() != model.num_dofs() {
            return Err(CoreError::DimensionMismatch {
                expected: model.num_dofs(),
                actual: state.jacobian.ncols(),
            });
        }
        model.body_jacobian(&self.config.frame, &mut state.jacobian)?;

        let mut position = DVector::zeros(state.jacobian.nrows());
        model.body_position(&self.config.frame, &mut position)?;
        let velocity = &state.jacobian * model.joint_velocities();

        for i in 0..state.goal.len() {
            state.goal[i] =
                self.config.kp * (self.goal_position(i) - position[i]) - self.config.kd * velocity[i];
        }
        Ok(())
    }

    fn command(
        &self,
        _model: &dyn DynamicsModel,
        state: &TaskState,
        out: &mut DVector<f64>,
    ) -> Result<(), CoreError> {
        if out.len() != state.goal.len() {
            *out = DVector::zeros(state.goal.len());
        }
        out.copy_from(&state.goal);
        Ok(())
    }

    fn load_config(&mut self, value: &toml::Value) -> Result<(), CoreError> {
        self.config = value.clone().try_into().map_err(|e: toml::de::Error| {
            CoreError::Config {
                element: self.type_name().to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(())
    }

    fn save_config(&self) -> Result<toml::Value, CoreError> {
        toml::Value::try_from(&self.config).map_err(|e| CoreError::Config {
            element: self.type_name().to_string(),
            reason: e.to_string(),
        })
    }

    fn dump(&self, out: &mut dyn fmt::Write, prefix: &str) -> fmt::Result {
        writeln!(out, "{}frame: {}", prefix, self.config.frame)?;
        writeln!(out, "{}kp: {}", prefix, self.config.kp)?;
        writeln!(out, "{}kd: {}", prefix, self.config.kd)?;
        writeln!(out, "{}goal: {:?}", prefix, self.config.goal)
    }
}
