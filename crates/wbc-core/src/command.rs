//! 关节指令类型
//!
//! 控制器每个周期的产出：每个驱动 DOF 一个标量，语义（力矩或加速度）
//! 由复合任务中占主导的指令类型决定，交给外部执行器层消费。

use crate::error::CoreError;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// 任务产出的指令语义
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    /// 关节力矩（Nm）
    Torque,
    /// 关节加速度（rad/s²）
    Acceleration,
}

impl CommandType {
    /// 诊断输出用的字符串表示
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::Torque => "torque",
            CommandType::Acceleration => "acceleration",
        }
    }
}

/// 每个驱动 DOF 一个标量的关节指令
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    values: DVector<f64>,
    command_type: CommandType,
}

impl Command {
    /// 创建全零指令
    pub fn new(num_actuated_dofs: usize, command_type: CommandType) -> Self {
        Self {
            values: DVector::zeros(num_actuated_dofs),
            command_type,
        }
    }

    /// 驱动 DOF 数
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.len() == 0
    }

    /// 指令值（按驱动 DOF 顺序）
    pub fn values(&self) -> &DVector<f64> {
        &self.values
    }

    pub fn command_type(&self) -> CommandType {
        self.command_type
    }

    /// 写入一组新的指令值与语义
    ///
    /// 长度不一致时返回 [`CoreError::DimensionMismatch`]。
    pub fn assign(&mut self, values: &DVector<f64>, command_type: CommandType) -> Result<(), CoreError> {
        if values.len() != self.values.len() {
            return Err(CoreError::DimensionMismatch {
                expected: self.values.len(),
                actual: values.len(),
            });
        }
        self.values.copy_from(values);
        self.command_type = command_type;
        Ok(())
    }
}
