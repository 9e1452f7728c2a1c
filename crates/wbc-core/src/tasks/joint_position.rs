//! 关节姿态任务
//!
//! 对每个驱动 DOF 施加 PD 目标加速度：
//! `goal_i = kp * (q_des_i - q_i) - kd * qd_i`。
//! 雅可比是驱动 DOF 选择矩阵（虚拟 DOF 列为零）。

use crate::error::CoreError;
use crate::task::{TaskKind, TaskState};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::fmt;
use wbc_model::DynamicsModel;

/// 关节姿态任务配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JointPositionConfig {
    /// 位置增益（1/s²）
    pub kp: f64,
    /// 速度增益（1/s）
    pub kd: f64,
    /// 目标关节位置（按驱动 DOF 顺序）；空表示全零姿态
    pub goal: Vec<f64>,
}

impl Default for JointPositionConfig {
    fn default() -> Self {
        Self {
            kp: 100.0,
            kd: 20.0,
            goal: Vec::new(),
        }
    }
}

/// 关节空间全姿态 PD 任务
#[derive(Debug, Clone, Default)]
pub struct JointPositionTask {
    config: JointPositionConfig,
}

impl JointPositionTask {
    pub fn new(config: JointPositionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &JointPositionConfig {
        &self.config
    }

    /// 第 i 个驱动 DOF 的目标位置（goal 为空时取零）
    fn goal_position(&self, index: usize) -> f64 {
        self.config.goal.get(index).copied().unwrap_or(0.0)
    }
}

impl TaskKind for JointPositionTask {
    fn type_name(&self) -> &'static str {
        "joint_position"
    }

    fn allocate_state(&self, model: &dyn DynamicsModel) -> Result<TaskState, CoreError> {
        let actuated = model.num_actuated_dofs();
        if actuated == 0 {
            return Err(CoreError::Initialization(
                "joint_position task requires at least one actuated DOF".to_string(),
            ));
        }
        if !self.config.goal.is_empty() && self.config.goal.len() != actuated {
            return Err(CoreError::Initialization(format!(
                "joint_position goal has {} entries for {} actuated DOFs",
                self.config.goal.len(),
                actuated
            )));
        }
        Ok(TaskState::zeros(actuated, model.num_dofs()))
    }

    fn update_state(
        &self,
        model: &dyn DynamicsModel,
        state: &mut TaskState,
    ) -> Result<(), CoreError> {
        let num_dofs = model.num_dofs();
        let virtual_dofs = model.num_virtual_dofs();
        let actuated = model.num_actuated_dofs();
        if state.jacobian.ncols() != num_dofs || state.jacobian.nrows() != actuated {
            return Err(CoreError::DimensionMismatch {
                expected: num_dofs,
                actual: state.jacobian.ncols(),
            });
        }

        // 雅可比：驱动 DOF 选择矩阵
        state.jacobian.fill(0.0);
        for i in 0..actuated {
            state.jacobian[(i, virtual_dofs + i)] = 1.0;
        }

        // 目标：PD 得到的任务空间加速度
        let q = model.joint_positions();
        let qd = model.joint_velocities();
        for i in 0..actuated {
            let j = virtual_dofs + i;
            state.goal[i] = self.config.kp * (self.goal_position(i) - q[j]) - self.config.kd * qd[j];
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
        writeln!(out, "{}kp: {}", prefix, self.config.kp)?;
        writeln!(out, "{}kd: {}", prefix, self.config.kd)?;
        writeln!(out, "{}goal: {:?}", prefix, self.config.goal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wbc_model::fixture::PlanarArmModel;

    #[test]
    fn test_selector_jacobian_skips_virtual_dofs() {
        let model = PlanarArmModel::new(8).with_virtual_dofs(2);
        let kind = JointPositionTask::default();
        let mut state = kind.allocate_state(&model).unwrap();
        kind.update_state(&model, &mut state).unwrap();

        assert_eq!(state.jacobian.nrows(), 6);
        assert_eq!(state.jacobian.ncols(), 8);
        // 虚拟 DOF 列为零
        assert!(state.jacobian.column(0).iter().all(|v| *v == 0.0));
        assert!(state.jacobian.column(1).iter().all(|v| *v == 0.0));
        assert_eq!(state.jacobian[(0, 2)], 1.0);
        assert_eq!(state.jacobian[(5, 7)], 1.0);
    }

    #[test]
    fn test_pd_goal() {
        let q = DVector::from_vec(vec![0.5, -0.25]);
        let qd = DVector::from_vec(vec![0.1, 0.0]);
        let model = PlanarArmModel::new(2).with_joint_state(q, qd);
        let kind = JointPositionTask::new(JointPositionConfig {
            kp: 10.0,
            kd: 2.0,
            goal: vec![1.0, 0.0],
        });
        let mut state = kind.allocate_state(&model).unwrap();
        kind.update_state(&model, &mut state).unwrap();

        // goal_0 = 10 * (1.0 - 0.5) - 2 * 0.1 = 4.8
        assert!((state.goal[0] - 4.8).abs() < 1e-12);
        // goal_1 = 10 * (0.0 + 0.25) - 0 = 2.5
        assert!((state.goal[1] - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_goal_length_checked_at_allocate() {
        let model = PlanarArmModel::new(4);
        let kind = JointPositionTask::new(JointPositionConfig {
            goal: vec![0.0; 3],
            ..Default::default()
        });
        assert!(matches!(
            kind.allocate_state(&model),
            Err(CoreError::Initialization(_))
        ));
    }

    #[test]
    fn test_config_round_trip() {
        let mut kind = JointPositionTask::new(JointPositionConfig {
            kp: 50.0,
            kd: 5.0,
            goal: vec![0.1, 0.2],
        });
        let saved = kind.save_config().unwrap();
        let mut other = JointPositionTask::default();
        other.load_config(&saved).unwrap();
        assert_eq!(kind.config, other.config);

        // 缺失的可选键取默认值
        let sparse: toml::Value = toml::from_str("kp = 7.5").unwrap();
        kind.load_config(&sparse).unwrap();
        assert_eq!(kind.config.kp, 7.5);
        assert_eq!(kind.config.kd, JointPositionConfig::default().kd);
        assert!(kind.config.goal.is_empty());
    }
}
