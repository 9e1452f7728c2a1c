//! 约束集合
//!
//! 按注册顺序把所有使能约束的雅可比行堆叠成一个矩阵，并在堆叠后做
//! 秩检查：重复或线性相关的行意味着病态系统，必须报错而不是静默求解。

use crate::constraint::Constraint;
use crate::error::CoreError;
use nalgebra::DMatrix;
use std::fmt;
use wbc_model::DynamicsModel;

/// 秩检查的相对奇异值容差
const RANK_TOLERANCE: f64 = 1e-10;

/// 有序约束集合
pub struct ConstraintSet {
    name: String,
    constraints: Vec<Box<dyn Constraint>>,
}

impl ConstraintSet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            constraints: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 追加约束；聚合雅可比的行块顺序即注册顺序
    pub fn add_constraint(&mut self, constraint: Box<dyn Constraint>) {
        self.constraints.push(constraint);
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn constraints(&self) -> &[Box<dyn Constraint>] {
        &self.constraints
    }

    /// 按名称查找约束
    pub fn constraint(&self, instance_name: &str) -> Option<&dyn Constraint> {
        self.constraints
            .iter()
            .find(|c| c.plan().instance_name() == instance_name)
            .map(|c| c.as_ref())
    }

    /// 初始化所有约束
    pub fn init(&mut self, model: &dyn DynamicsModel) -> Result<(), CoreError> {
        for constraint in &mut self.constraints {
            constraint.init(model)?;
        }
        Ok(())
    }

    /// 当前使能约束贡献的总行数
    pub fn enabled_row_count(&self, model: &dyn DynamicsModel) -> usize {
        self.constraints
            .iter()
            .filter(|c| c.plan().is_enabled())
            .map(|c| c.row_count(model))
            .sum()
    }

    /// 堆叠所有使能约束的雅可比（行块按注册顺序）
    ///
    /// 行线性相关时返回 [`CoreError::IllConditionedConstraints`]。
    pub fn jacobian(&self, model: &dyn DynamicsModel, out: &mut DMatrix<f64>) -> Result<(), CoreError> {
        let n = model.num_dofs();
        let rows = self.enabled_row_count(model);
        if out.nrows() != rows || out.ncols() != n {
            *out = DMatrix::zeros(rows, n);
        }

        let mut offset = 0;
        let mut scratch = DMatrix::zeros(0, 0);
        for constraint in &self.constraints {
            if !constraint.plan().is_enabled() {
                continue;
            }
            constraint.jacobian(model, &mut scratch)?;
            if scratch.ncols() != n {
                return Err(CoreError::DimensionMismatch {
                    expected: n,
                    actual: scratch.ncols(),
                });
            }
            out.rows_mut(offset, scratch.nrows()).copy_from(&scratch);
            offset += scratch.nrows();
        }

        if rows > 1 {
            let rank = Self::rank(out);
            if rank < rows {
                return Err(CoreError::IllConditionedConstraints { rows, rank });
            }
        }
        Ok(())
    }

    fn rank(matrix: &DMatrix<f64>) -> usize {
        let svd = matrix.clone().svd(false, false);
        let max = svd.singular_values.max();
        if max <= 0.0 {
            return 0;
        }
        svd.singular_values
            .iter()
            .filter(|sigma| **sigma > RANK_TOLERANCE * max)
            .count()
    }

    /// 诊断输出：集合名加逐约束内容
    pub fn dump(&self, out: &mut dyn fmt::Write, prefix: &str) -> fmt::Result {
        writeln!(out, "{}constraint_set: {}", prefix, self.name)?;
        let inner = format!("{}  ", prefix);
        for constraint in &self.constraints {
            constraint.dump(out, &inner)?;
        }
        Ok(())
    }
}
