//! 传动约束
//!
//! 编码 `slave = ratio * master` 的耦合关系，贡献一行雅可比：
//! slave 下标处的单位向量减去 ratio 乘 master 下标处的单位向量。

use crate::constraint::Constraint;
use crate::error::CoreError;
use crate::plan::PlanElement;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;
use wbc_model::DynamicsModel;

/// 传动约束配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmissionConfig {
    /// 主动 DOF 下标
    pub master_dof: usize,
    /// 从动 DOF 下标
    pub slave_dof: usize,
    /// 传动比
    pub ratio: f64,
}

impl Default for TransmissionConfig {
    fn default() -> Self {
        Self {
            master_dof: 0,
            slave_dof: 1,
            ratio: 1.0,
        }
    }
}

/// `slave = ratio * master` 传动约束
#[derive(Debug)]
pub struct TransmissionConstraint {
    plan: PlanElement,
    config: TransmissionConfig,
}

impl TransmissionConstraint {
    pub fn new(instance_name: &str, config: TransmissionConfig) -> Self {
        Self {
            plan: PlanElement::new("transmission", instance_name),
            config,
        }
    }

    pub fn config(&self) -> &TransmissionConfig {
        &self.config
    }
}

impl Constraint for TransmissionConstraint {
    fn plan(&self) -> &PlanElement {
        &self.plan
    }

    fn row_count(&self, _model: &dyn DynamicsModel) -> usize {
        1
    }

    fn init(&mut self, model: &dyn DynamicsModel) -> Result<(), CoreError> {
        let n = model.num_dofs();
        if self.config.master_dof >= n || self.config.slave_dof >= n {
            return Err(CoreError::Initialization(format!(
                "transmission '{}': DOF indices ({}, {}) out of range for a {}-DOF model",
                self.plan.instance_name(),
                self.config.master_dof,
                self.config.slave_dof,
                n
            )));
        }
        if self.config.master_dof == self.config.slave_dof {
            return Err(CoreError::Initialization(format!(
                "transmission '{}': master and slave DOF must differ",
                self.plan.instance_name()
            )));
        }
        Ok(())
    }

    fn jacobian(&self, model: &dyn DynamicsModel, out: &mut DMatrix<f64>) -> Result<(), CoreError> {
        let n = model.num_dofs();
        if self.config.master_dof >= n || self.config.slave_dof >= n {
            return Err(CoreError::DimensionMismatch {
                expected: n,
                actual: self.config.master_dof.max(self.config.slave_dof) + 1,
            });
        }
        if out.nrows() != 1 || out.ncols() != n {
            *out = DMatrix::zeros(1, n);
        } else {
            out.fill(0.0);
        }
        out[(0, self.config.slave_dof)] = 1.0;
        out[(0, self.config.master_dof)] = -self.config.ratio;
        Ok(())
    }

    fn load_config(&mut self, value: &toml::Value) -> Result<(), CoreError> {
        self.config = value.clone().try_into().map_err(|e: toml::de::Error| {
            CoreError::Config {
                element: self.plan.instance_name().to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(())
    }

    fn save_config(&self) -> Result<toml::Value, CoreError> {
        toml::Value::try_from(&self.config).map_err(|e| CoreError::Config {
            element: self.plan.instance_name().to_string(),
            reason: e.to_string(),
        })
    }

    fn dump(&self, out: &mut dyn fmt::Write, prefix: &str) -> fmt::Result {
        self.plan.dump(out, prefix)?;
        writeln!(out, "{}master_dof: {}", prefix, self.config.master_dof)?;
        writeln!(out, "{}slave_dof: {}", prefix, self.config.slave_dof)?;
        writeln!(out, "{}ratio: {}", prefix, self.config.ratio)
    }
}
