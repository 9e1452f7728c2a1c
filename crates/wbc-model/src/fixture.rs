//! 确定性测试模型
//!
//! 提供一个 n-DOF 平面链模型的固定快照，用于各 crate 的测试和演示。
//! 快照通过 Builder 风格的 `with_*` 方法构造，构造完成后不可变，
//! 因此可以安全地以 `Arc` 形式在控制线程与更新线程之间共享。

use crate::{DynamicsModel, ModelError};
use nalgebra::{DMatrix, DVector};
use std::collections::HashMap;

/// 平面链测试模型
///
/// 默认参数：
/// - 虚拟 DOF 数为 0（固定基座）
/// - 关节位置 / 速度全零
/// - 质量矩阵为对角阵，第 i 个对角元为 `1.0 + 0.25 * i`
/// - 偏置力第 i 个分量为 `9.81 * 0.1 * (i + 1)`
///
/// # Example
///
/// ```
/// use wbc_model::DynamicsModel;
/// use wbc_model::fixture::PlanarArmModel;
///
/// let model = PlanarArmModel::new(6).with_virtual_dofs(0);
/// assert_eq!(model.num_actuated_dofs(), 6);
/// ```
#[derive(Debug, Clone)]
pub struct PlanarArmModel {
    num_dofs: usize,
    num_virtual: usize,
    positions: DVector<f64>,
    velocities: DVector<f64>,
    mass_matrix: DMatrix<f64>,
    bias_forces: DVector<f64>,
    frames: HashMap<String, DMatrix<f64>>,
}

impl PlanarArmModel {
    /// 创建默认 n-DOF 模型
    pub fn new(num_dofs: usize) -> Self {
        let mass_matrix =
            DMatrix::from_fn(num_dofs, num_dofs, |r, c| {
                if r == c { 1.0 + 0.25 * r as f64 } else { 0.0 }
            });
        let bias_forces = DVector::from_fn(num_dofs, |i, _| 9.81 * 0.1 * (i + 1) as f64);

        Self {
            num_dofs,
            num_virtual: 0,
            positions: DVector::zeros(num_dofs),
            velocities: DVector::zeros(num_dofs),
            mass_matrix,
            bias_forces,
            frames: HashMap::new(),
        }
    }

    /// 设置虚拟（浮动基座）DOF 数
    ///
    /// # Panics
    ///
    /// 虚拟 DOF 数超过总 DOF 数时 panic（测试夹具，直接报错即可）。
    pub fn with_virtual_dofs(mut self, num_virtual: usize) -> Self {
        assert!(
            num_virtual <= self.num_dofs,
            "virtual DOF count {} exceeds total {}",
            num_virtual,
            self.num_dofs
        );
        self.num_virtual = num_virtual;
        self
    }

    /// 设置关节位置与速度
    pub fn with_joint_state(mut self, positions: DVector<f64>, velocities: DVector<f64>) -> Self {
        assert_eq!(positions.len(), self.num_dofs);
        assert_eq!(velocities.len(), self.num_dofs);
        self.positions = positions;
        self.velocities = velocities;
        self
    }

    /// 设置质量矩阵
    pub fn with_mass_matrix(mut self, mass_matrix: DMatrix<f64>) -> Self {
        assert_eq!(mass_matrix.nrows(), self.num_dofs);
        assert_eq!(mass_matrix.ncols(), self.num_dofs);
        self.mass_matrix = mass_matrix;
        self
    }

    /// 设置偏置力
    pub fn with_bias_forces(mut self, bias_forces: DVector<f64>) -> Self {
        assert_eq!(bias_forces.len(), self.num_dofs);
        self.bias_forces = bias_forces;
        self
    }

    /// 注册一个命名 frame 及其雅可比
    pub fn with_frame(mut self, name: &str, jacobian: DMatrix<f64>) -> Self {
        assert_eq!(jacobian.ncols(), self.num_dofs);
        self.frames.insert(name.to_string(), jacobian);
        self
    }

    /// 注册一个合成 frame：3 × n 的确定性雅可比
    ///
    /// 第 (r, c) 个元素为 `sin(seed + r as f64 + 0.5 * c as f64)`，
    /// 仅用于测试中需要非平凡、满秩行的场景。
    pub fn with_synthetic_frame(self, name: &str, seed: f64) -> Self {
        let n = self.num_dofs;
        let jacobian = DMatrix::from_fn(3, n, |r, c| (seed + r as f64 + 0.5 * c as f64).sin());
        self.with_frame(name, jacobian)
    }
}

impl DynamicsModel for PlanarArmModel {
    fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    fn num_virtual_dofs(&self) -> usize {
        self.num_virtual
    }

    fn joint_positions(&self) -> &DVector<f64> {
        &self.positions
    }

    fn joint_velocities(&self) -> &DVector<f64> {
        &self.velocities
    }

    fn mass_matrix(&self) -> &DMatrix<f64> {
        &self.mass_matrix
    }

    fn bias_forces(&self) -> &DVector<f64> {
        &self.bias_forces
    }

    fn body_jacobian(&self, frame: &str, out: &mut DMatrix<f64>) -> Result<(), ModelError> {
        let jacobian = self.frames.get(frame).ok_or_else(|| ModelError::UnknownFrame {
            frame: frame.to_string(),
        })?;

        if out.nrows() != jacobian.nrows() || out.ncols() != jacobian.ncols() {
            *out = DMatrix::zeros(jacobian.nrows(), jacobian.ncols());
        }
        out.copy_from(jacobian);
        Ok(())
    }

    fn body_position(&self, frame: &str, out: &mut DVector<f64>) -> Result<(), ModelError> {
        let jacobian = self.frames.get(frame).ok_or_else(|| ModelError::UnknownFrame {
            frame: frame.to_string(),
        })?;

        // 夹具模型用线性化位置 x = J q，确定且足够非平凡
        let position = jacobian * &self.positions;
        if out.len() != position.len() {
            *out = DVector::zeros(position.len());
        }
        out.copy_from(&position);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_dimensions() {
        let model = PlanarArmModel::new(6);
        assert_eq!(model.num_dofs(), 6);
        assert_eq!(model.num_virtual_dofs(), 0);
        assert_eq!(model.num_actuated_dofs(), 6);
        assert_eq!(model.mass_matrix().nrows(), 6);
        assert_eq!(model.bias_forces().len(), 6);
    }

    #[test]
    fn test_virtual_dof_split() {
        let model = PlanarArmModel::new(8).with_virtual_dofs(2);
        assert_eq!(model.num_dofs(), 8);
        assert_eq!(model.num_virtual_dofs(), 2);
        assert_eq!(model.num_actuated_dofs(), 6);
    }

    #[test]
    fn test_body_jacobian_lookup() {
        let model = PlanarArmModel::new(4).with_synthetic_frame("wrist", 0.3);

        let mut out = DMatrix::zeros(0, 0);
        model.body_jacobian("wrist", &mut out).unwrap();
        assert_eq!(out.nrows(), 3);
        assert_eq!(out.ncols(), 4);
        // 确定性：重复查询得到同一矩阵
        let mut again = DMatrix::zeros(3, 4);
        model.body_jacobian("wrist", &mut again).unwrap();
        assert_eq!(out, again);
    }

    #[test]
    fn test_body_position_matches_linearization() {
        let q = DVector::from_vec(vec![0.1, 0.2, 0.3, 0.4]);
        let qd = DVector::zeros(4);
        let model = PlanarArmModel::new(4)
            .with_joint_state(q.clone(), qd)
            .with_synthetic_frame("wrist", 1.0);

        let mut jacobian = DMatrix::zeros(3, 4);
        model.body_jacobian("wrist", &mut jacobian).unwrap();
        let mut position = DVector::zeros(3);
        model.body_position("wrist", &mut position).unwrap();
        assert_eq!(position, &jacobian * &q);
    }

    #[test]
    fn test_unknown_frame() {
        let model = PlanarArmModel::new(4);
        let mut out = DMatrix::zeros(3, 4);
        let err = model.body_jacobian("nope", &mut out).unwrap_err();
        assert_eq!(
            err,
            ModelError::UnknownFrame {
                frame: "nope".to_string()
            }
        );
    }

    #[test]
    fn test_mass_matrix_is_diagonal_default() {
        let model = PlanarArmModel::new(3);
        let m = model.mass_matrix();
        assert_eq!(m[(0, 0)], 1.0);
        assert_eq!(m[(1, 1)], 1.25);
        assert_eq!(m[(2, 2)], 1.5);
        assert_eq!(m[(0, 1)], 0.0);
    }
}
