//! 力矩控制器与合成算法
//!
//! 每个周期：
//! 1. 轮询所有任务的状态交换（对更新线程产出的唯一交互，绝不阻塞等待）
//! 2. 按优先级顺序收集使能任务的活动雅可比 / 任务指令，以及约束集合
//!    的聚合雅可比
//! 3. 通过合成策略求解关节指令：高优先级任务先满足，低优先级任务只在
//!    所有更高优先级任务雅可比与约束雅可比的零空间内求解
//! 4. 把每个驱动 DOF 的结果写入 [`Command`]
//!
//! 合成策略可插拔（[`CompositionPolicy`]），默认实现为带阻尼最小二乘
//! 伪逆的分层零空间投影（[`HierarchicalNullSpace`]），确定性算法。
//!
//! 部分失败策略：某个任务返回尺寸不一致时跳过其本周期贡献并上报，
//! 一个坏目标不能中止整机控制；契约违反（Misuse）则按致命错误传播。

use crate::command::{Command, CommandType};
use crate::compound_task::CompoundTask;
use crate::constraint_set::ConstraintSet;
use crate::error::CoreError;
use nalgebra::{DMatrix, DVector};
use smallvec::SmallVec;
use tracing::warn;
use wbc_model::DynamicsModel;

/// 一个使能任务在本周期的贡献
#[derive(Debug, Clone, PartialEq)]
pub struct TaskContribution {
    /// 任务雅可比（任务维数 × DOF 数）
    pub jacobian: DMatrix<f64>,
    /// 任务空间指令（长度 = 任务维数）
    pub command: DVector<f64>,
}

/// 合成策略接口
///
/// 实现必须是给定输入下的确定性纯函数。
pub trait CompositionPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// 把任务贡献与约束雅可比合成为每个驱动 DOF 的指令值
    fn compose(
        &self,
        model: &dyn DynamicsModel,
        tasks: &[TaskContribution],
        constraint_jacobian: Option<&DMatrix<f64>>,
        command_type: CommandType,
        out: &mut DVector<f64>,
    ) -> Result<(), CoreError>;
}

/// 分层零空间投影合成
///
/// 加速度域算法：
/// 1. 先由约束雅可比构造零空间投影 `N = I - Jc⁺ Jc`
/// 2. 按优先级逐任务求解：`q̈ += (Jᵢ N)⁺ (aᵢ - Jᵢ q̈)`，随后
///    `N ← N (I - (Jᵢ N)⁺ (Jᵢ N))`
/// 3. 主导指令类型为力矩时经 `τ = M q̈ + h` 映射到关节力矩
///
/// 伪逆使用阻尼最小二乘（奇异值滤波 `σ/(σ² + λ²)`），对奇异构型有界，
/// 且对固定输入完全确定。
#[derive(Debug, Clone)]
pub struct HierarchicalNullSpace {
    /// 阻尼系数 λ
    pub damping: f64,
}

impl Default for HierarchicalNullSpace {
    fn default() -> Self {
        Self { damping: 1e-3 }
    }
}

impl HierarchicalNullSpace {
    /// 阻尼最小二乘伪逆
    fn damped_pinv(&self, matrix: &DMatrix<f64>) -> Result<DMatrix<f64>, CoreError> {
        let svd = matrix.clone().svd(true, true);
        let (Some(u), Some(v_t)) = (&svd.u, &svd.v_t) else {
            // svd(true, true) 必然给出两个因子；防御性传播而非 panic
            return Err(CoreError::Misuse("SVD did not produce factors"));
        };

        let k = svd.singular_values.len();
        let mut sigma_inv = DMatrix::zeros(k, k);
        let lambda_sq = self.damping * self.damping;
        for i in 0..k {
            let sigma = svd.singular_values[i];
            sigma_inv[(i, i)] = sigma / (sigma * sigma + lambda_sq);
        }

        Ok(v_t.transpose() * sigma_inv * u.transpose())
    }
}

impl CompositionPolicy for HierarchicalNullSpace {
    fn name(&self) -> &'static str {
        "hierarchical_null_space"
    }

    fn compose(
        &self,
        model: &dyn DynamicsModel,
        tasks: &[TaskContribution],
        constraint_jacobian: Option<&DMatrix<f64>>,
        command_type: CommandType,
        out: &mut DVector<f64>,
    ) -> Result<(), CoreError> {
        let n = model.num_dofs();
        let mut qdd = DVector::zeros(n);
        let mut nullspace = DMatrix::identity(n, n);

        // 约束零空间优先：任何任务都不得扰动约束方向
        if let Some(jc) = constraint_jacobian
            && jc.nrows() > 0
        {
            if jc.ncols() != n {
                return Err(CoreError::DimensionMismatch {
                    expected: n,
                    actual: jc.ncols(),
                });
            }
            let jc_pinv = self.damped_pinv(jc)?;
            nullspace -= &jc_pinv * jc;
        }

        for contribution in tasks {
            let jacobian = &contribution.jacobian;
            if jacobian.ncols() != n {
                return Err(CoreError::DimensionMismatch {
                    expected: n,
                    actual: jacobian.ncols(),
                });
            }
            if contribution.command.len() != jacobian.nrows() {
                return Err(CoreError::DimensionMismatch {
                    expected: jacobian.nrows(),
                    actual: contribution.command.len(),
                });
            }

            let projected = jacobian * &nullspace;
            let residual = &contribution.command - jacobian * &qdd;
            let projected_pinv = self.damped_pinv(&projected)?;
            qdd += &projected_pinv * &residual;
            nullspace = &nullspace * (DMatrix::identity(n, n) - &projected_pinv * &projected);
        }

        let actuated = model.num_actuated_dofs();
        let virtual_dofs = model.num_virtual_dofs();
        if out.len() != actuated {
            *out = DVector::zeros(actuated);
        }
        match command_type {
            CommandType::Acceleration => out.copy_from(&qdd.rows(virtual_dofs, actuated)),
            CommandType::Torque => {
                let torque = model.mass_matrix() * &qdd + model.bias_forces();
                out.copy_from(&torque.rows(virtual_dofs, actuated));
            }
        }
        Ok(())
    }
}

/// 整机力矩控制器
pub struct TorqueController {
    name: String,
    policy: Box<dyn CompositionPolicy>,
}

impl TorqueController {
    /// 用默认合成策略（分层零空间投影）创建
    pub fn new(name: &str) -> Self {
        Self::with_policy(name, Box::new(HierarchicalNullSpace::default()))
    }

    /// 用指定合成策略创建
    pub fn with_policy(name: &str, policy: Box<dyn CompositionPolicy>) -> Self {
        Self {
            name: name.to_string(),
            policy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// 执行一个控制周期（见模块文档的四个步骤）
    ///
    /// 对当前活动任务状态、约束集合与模型快照是纯函数：相同输入重复
    /// 调用得到相同输出。
    pub fn compute_command(
        &self,
        model: &dyn DynamicsModel,
        compound_task: &CompoundTask,
        constraint_set: &ConstraintSet,
        command: &mut Command,
    ) -> Result<(), CoreError> {
        // 1. 轮询状态交换（绝不阻塞等待更新线程）
        compound_task.check_updated_states();

        // 2. 按优先级收集使能任务的贡献
        let mut contributions: SmallVec<[TaskContribution; 8]> = SmallVec::new();
        for task in compound_task.enabled_tasks() {
            let mut jacobian = DMatrix::zeros(0, 0);
            match task.get_jacobian(model, &mut jacobian) {
                Ok(()) => {}
                Err(e @ CoreError::DimensionMismatch { .. }) => {
                    warn!("Task '{}' skipped for this tick: {}", task.name(), e);
                    continue;
                }
                Err(e) => return Err(e),
            }
            let mut task_command = DVector::zeros(jacobian.nrows());
            match task.get_command(model, &mut task_command) {
                Ok(()) => {}
                Err(e @ CoreError::DimensionMismatch { .. }) => {
                    warn!("Task '{}' skipped for this tick: {}", task.name(), e);
                    continue;
                }
                Err(e) => return Err(e),
            }
            if task_command.len() != jacobian.nrows() {
                warn!(
                    "Task '{}' skipped for this tick: command length {} does not match {} task rows",
                    task.name(),
                    task_command.len(),
                    jacobian.nrows()
                );
                continue;
            }
            contributions.push(TaskContribution {
                jacobian,
                command: task_command,
            });
        }

        // 约束集合的聚合雅可比（病态集合在这里报错）
        let mut constraint_jacobian = DMatrix::zeros(0, model.num_dofs());
        let jc = if constraint_set.is_empty() {
            None
        } else {
            constraint_set.jacobian(model, &mut constraint_jacobian)?;
            (constraint_jacobian.nrows() > 0).then_some(&constraint_jacobian)
        };

        // 3/4. 合成并写入指令
        let command_type = compound_task
            .dominant_command_type()
            .unwrap_or(CommandType::Torque);
        let mut values = DVector::zeros(model.num_actuated_dofs());
        self.policy
            .compose(model, &contributions, jc, command_type, &mut values)?;
        command.assign(&values, command_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wbc_model::fixture::PlanarArmModel;

    fn row(n: usize, index: usize) -> DMatrix<f64> {
        let mut m = DMatrix::zeros(1, n);
        m[(0, index)] = 1.0;
        m
    }

    /// 满秩任务：合成结果（加速度域）几乎等于任务目标
    #[test]
    fn test_full_rank_task_tracks_goal() {
        let model = PlanarArmModel::new(4);
        let policy = HierarchicalNullSpace::default();
        let tasks = [TaskContribution {
            jacobian: DMatrix::identity(4, 4),
            command: DVector::from_vec(vec![1.0, -2.0, 0.5, 0.0]),
        }];

        let mut out = DVector::zeros(4);
        policy
            .compose(&model, &tasks, None, CommandType::Acceleration, &mut out)
            .unwrap();
        for i in 0..4 {
            assert!((out[i] - tasks[0].command[i]).abs() < 1e-4);
        }
    }

    /// 低优先级任务只在高优先级任务的零空间内生效
    #[test]
    fn test_priority_null_space() {
        let model = PlanarArmModel::new(3);
        let policy = HierarchicalNullSpace::default();
        let tasks = [
            TaskContribution {
                jacobian: row(3, 0),
                command: DVector::from_vec(vec![2.0]),
            },
            TaskContribution {
                // 低优先级同时想要 DOF 0 和 DOF 1
                jacobian: DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
                command: DVector::from_vec(vec![-5.0, 1.0]),
            },
        ];

        let mut out = DVector::zeros(3);
        policy
            .compose(&model, &tasks, None, CommandType::Acceleration, &mut out)
            .unwrap();
        // DOF 0 由高优先级任务决定，低优先级的 -5.0 被投影掉
        assert!((out[0] - 2.0).abs() < 1e-3);
        // DOF 1 在零空间内，低优先级任务得到满足
        assert!((out[1] - 1.0).abs() < 1e-3);
        assert!(out[2].abs() < 1e-6);
    }

    /// 约束方向不被任何任务扰动
    #[test]
    fn test_constraint_null_space() {
        let model = PlanarArmModel::new(3);
        let policy = HierarchicalNullSpace::default();
        let constraint = row(3, 0);
        let tasks = [TaskContribution {
            jacobian: DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
            command: DVector::from_vec(vec![5.0, 1.0]),
        }];

        let mut out = DVector::zeros(3);
        policy
            .compose(
                &model,
                &tasks,
                Some(&constraint),
                CommandType::Acceleration,
                &mut out,
            )
            .unwrap();
        assert!(out[0].abs() < 1e-3);
        assert!((out[1] - 1.0).abs() < 1e-3);
    }

    /// 力矩映射：τ = M q̈ + h
    #[test]
    fn test_torque_mapping() {
        let model = PlanarArmModel::new(2);
        let policy = HierarchicalNullSpace::default();
        let goal = DVector::from_vec(vec![1.0, -1.0]);
        let tasks = [TaskContribution {
            jacobian: DMatrix::identity(2, 2),
            command: goal.clone(),
        }];

        let mut accel = DVector::zeros(2);
        policy
            .compose(&model, &tasks, None, CommandType::Acceleration, &mut accel)
            .unwrap();
        let mut torque = DVector::zeros(2);
        policy
            .compose(&model, &tasks, None, CommandType::Torque, &mut torque)
            .unwrap();

        let expected = model.mass_matrix() * &accel + model.bias_forces();
        for i in 0..2 {
            assert!((torque[i] - expected[i]).abs() < 1e-9);
        }
    }

    /// 确定性：相同输入重复合成得到逐位相同的输出
    #[test]
    fn test_compose_deterministic() {
        let model = PlanarArmModel::new(5).with_virtual_dofs(1);
        let policy = HierarchicalNullSpace::default();
        let tasks = [
            TaskContribution {
                jacobian: DMatrix::from_fn(2, 5, |r, c| ((r + c) as f64 * 0.3).cos()),
                command: DVector::from_vec(vec![0.7, -0.2]),
            },
            TaskContribution {
                jacobian: DMatrix::from_fn(3, 5, |r, c| ((r * c) as f64 * 0.1).sin()),
                command: DVector::from_vec(vec![0.1, 0.2, 0.3]),
            },
        ];
        let constraint = row(5, 0);

        let mut a = DVector::zeros(4);
        let mut b = DVector::zeros(4);
        policy
            .compose(&model, &tasks, Some(&constraint), CommandType::Torque, &mut a)
            .unwrap();
        policy
            .compose(&model, &tasks, Some(&constraint), CommandType::Torque, &mut b)
            .unwrap();
        assert_eq!(a, b);
    }

    /// 虚拟 DOF 不出现在指令里
    #[test]
    fn test_virtual_dofs_excluded_from_command() {
        let model = PlanarArmModel::new(5).with_virtual_dofs(2);
        let policy = HierarchicalNullSpace::default();
        let tasks = [TaskContribution {
            jacobian: DMatrix::identity(5, 5),
            command: DVector::from_vec(vec![9.0, 9.0, 1.0, 2.0, 3.0]),
        }];

        let mut out = DVector::zeros(3);
        policy
            .compose(&model, &tasks, None, CommandType::Acceleration, &mut out)
            .unwrap();
        assert_eq!(out.len(), 3);
        assert!((out[0] - 1.0).abs() < 1e-3);
        assert!((out[2] - 3.0).abs() < 1e-3);
    }
}
