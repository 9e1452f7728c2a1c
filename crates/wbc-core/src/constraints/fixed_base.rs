//! 固定基座约束
//!
//! 钉住模型的虚拟（浮动基座）DOF 前缀：每个虚拟 DOF 贡献一行单位
//! 向量，强制其加速度为零。

use crate::constraint::Constraint;
use crate::error::CoreError;
use crate::plan::PlanElement;
use nalgebra::DMatrix;
use std::fmt;
use wbc_model::DynamicsModel;

/// 虚拟 DOF 钉住约束
#[derive(Debug)]
pub struct FixedBaseConstraint {
    plan: PlanElement,
}

impl FixedBaseConstraint {
    pub fn new(instance_name: &str) -> Self {
        Self {
            plan: PlanElement::new("fixed_base", instance_name),
        }
    }
}

impl Constraint for FixedBaseConstraint {
    fn plan(&self) -> &PlanElement {
        &self.plan
    }

    fn row_count(&self, model: &dyn DynamicsModel) -> usize {
        model.num_virtual_dofs()
    }

    fn init(&mut self, model: &dyn DynamicsModel) -> Result<(), CoreError> {
        if model.num_virtual_dofs() == 0 {
            tracing::warn!(
                "Fixed-base constraint '{}' on a model with no virtual DOFs contributes no rows",
                self.plan.instance_name()
            );
        }
        Ok(())
    }

    fn jacobian(&self, model: &dyn DynamicsModel, out: &mut DMatrix<f64>) -> Result<(), CoreError> {
        let rows = model.num_virtual_dofs();
        let n = model.num_dofs();
        if out.nrows() != rows || out.ncols() != n {
            *out = DMatrix::zeros(rows, n);
        } else {
            out.fill(0.0);
        }
        for i in 0..rows {
            out[(i, i)] = 1.0;
        }
        Ok(())
    }

    fn load_config(&mut self, _value: &toml::Value) -> Result<(), CoreError> {
        // 无参数
        Ok(())
    }

    fn save_config(&self) -> Result<toml::Value, CoreError> {
        Ok(toml::Value::Table(toml::Table::new()))
    }

    fn dump(&self, out: &mut dyn fmt::Write, prefix: &str) -> fmt::Result {
        self.plan.dump(out, prefix)
    }
}
