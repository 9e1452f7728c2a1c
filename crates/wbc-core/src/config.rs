//! 计划配置的加载 / 保存与元素工厂
//!
//! 控制计划（任务列表 + 约束列表）用 TOML 文档描述。每个元素一张表：
//! `type` 选择具体种类，`name` 是实例名，`enabled` 缺省为真，其余键
//! 原样交给该种类自己的配置结构（缺失的可选键取默认值）。
//!
//! ```toml
//! [[tasks]]
//! type = "joint_position"
//! name = "Posture"
//! command_type = "torque"
//! kp = 100.0
//!
//! [[constraints]]
//! type = "transmission"
//! name = "GripperCoupling"
//! master_dof = 4
//! slave_dof = 5
//! ratio = 2.0
//! ```
//!
//! 构建计划时单个元素失败只丢弃该元素并上报，不影响其余元素；
//! 保存路径从活动元素反向导出配置，保存结果重新加载后等价。

use crate::command::CommandType;
use crate::compound_task::CompoundTask;
use crate::constraint::Constraint;
use crate::constraint_set::ConstraintSet;
use crate::constraints::{FixedBaseConstraint, TransmissionConstraint};
use crate::error::CoreError;
use crate::task::{Task, TaskKind};
use crate::tasks::{CartesianPositionTask, JointPositionTask};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

fn default_enabled() -> bool {
    true
}

fn default_plan_name() -> String {
    "plan".to_string()
}

/// 一个任务或约束的配置表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementConfig {
    /// 种类名（工厂分发键）
    #[serde(rename = "type")]
    pub type_name: String,
    /// 实例名
    pub name: String,
    /// 使能标志，缺省为真
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 指令类型（仅任务使用；缺省为力矩）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_type: Option<CommandType>,
    /// 种类特有参数，原样传给具体配置结构
    #[serde(flatten)]
    pub params: toml::Table,
}

/// 整个控制计划的配置文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanConfig {
    /// 计划名
    #[serde(default = "default_plan_name")]
    pub name: String,
    /// 任务列表；文档顺序即优先级顺序
    #[serde(default)]
    pub tasks: Vec<ElementConfig>,
    /// 约束列表；文档顺序即行块顺序
    #[serde(default)]
    pub constraints: Vec<ElementConfig>,
}

/// 解析 TOML 计划文档
pub fn load_plan(text: &str) -> Result<PlanConfig, CoreError> {
    toml::from_str(text).map_err(|e| CoreError::Config {
        element: "plan".to_string(),
        reason: e.to_string(),
    })
}

/// 序列化计划文档；重新加载后应得到等价计划
pub fn save_plan(config: &PlanConfig) -> Result<String, CoreError> {
    toml::to_string_pretty(config).map_err(|e| CoreError::Config {
        element: "plan".to_string(),
        reason: e.to_string(),
    })
}

/// 任务工厂：按 `type` 分发到具体种类并加载参数
pub fn build_task(config: &ElementConfig) -> Result<Arc<Task>, CoreError> {
    let mut kind: Box<dyn TaskKind> = match config.type_name.as_str() {
        "joint_position" => Box::new(JointPositionTask::default()),
        "cartesian_position" => Box::new(CartesianPositionTask::default()),
        other => {
            return Err(CoreError::Config {
                element: config.name.clone(),
                reason: format!("unknown task type '{other}'"),
            });
        }
    };
    kind.load_config(&toml::Value::Table(config.params.clone()))?;

    let command_type = config.command_type.unwrap_or(CommandType::Torque);
    let task = Task::new(&config.name, command_type, kind);
    task.set_enabled(config.enabled);
    Ok(Arc::new(task))
}

/// 约束工厂：按 `type` 分发到具体种类并加载参数
pub fn build_constraint(config: &ElementConfig) -> Result<Box<dyn Constraint>, CoreError> {
    let mut constraint: Box<dyn Constraint> = match config.type_name.as_str() {
        "transmission" => Box::new(TransmissionConstraint::new(
            &config.name,
            Default::default(),
        )),
        "fixed_base" => Box::new(FixedBaseConstraint::new(&config.name)),
        other => {
            return Err(CoreError::Config {
                element: config.name.clone(),
                reason: format!("unknown constraint type '{other}'"),
            });
        }
    };
    constraint.load_config(&toml::Value::Table(config.params.clone()))?;
    constraint.plan().set_enabled(config.enabled);
    Ok(constraint)
}

/// 从配置构建复合任务
///
/// 单个任务构建失败时上报并丢弃该任务，其余任务照常进入计划。
pub fn build_compound_task(config: &PlanConfig) -> CompoundTask {
    let mut compound = CompoundTask::new(&config.name);
    for element in &config.tasks {
        match build_task(element) {
            Ok(task) => compound.add_task(task),
            Err(e) => error!("Task '{}' dropped from the plan: {}", element.name, e),
        }
    }
    compound
}

/// 从配置构建约束集合（失败策略与任务一致）
pub fn build_constraint_set(config: &PlanConfig) -> ConstraintSet {
    let mut set = ConstraintSet::new(&config.name);
    for element in &config.constraints {
        match build_constraint(element) {
            Ok(constraint) => set.add_constraint(constraint),
            Err(e) => error!("Constraint '{}' dropped from the plan: {}", element.name, e),
        }
    }
    set
}

fn params_table(value: toml::Value, element: &str) -> Result<toml::Table, CoreError> {
    match value {
        toml::Value::Table(table) => Ok(table),
        other => Err(CoreError::Config {
            element: element.to_string(),
            reason: format!("saved parameters are not a table: {other}"),
        }),
    }
}

/// 从活动元素反向导出配置文档
pub fn save_plan_from(
    compound: &CompoundTask,
    constraint_set: &ConstraintSet,
) -> Result<PlanConfig, CoreError> {
    let mut tasks = Vec::with_capacity(compound.len());
    for task in compound.tasks() {
        tasks.push(ElementConfig {
            type_name: task.plan().type_name().to_string(),
            name: task.name().to_string(),
            enabled: task.is_enabled(),
            command_type: Some(task.command_type()),
            params: params_table(task.save_config()?, task.name())?,
        });
    }

    let mut constraints = Vec::with_capacity(constraint_set.len());
    for constraint in constraint_set.constraints() {
        let plan = constraint.plan();
        constraints.push(ElementConfig {
            type_name: plan.type_name().to_string(),
            name: plan.instance_name().to_string(),
            enabled: plan.is_enabled(),
            command_type: None,
            params: params_table(constraint.save_config()?, plan.instance_name())?,
        });
    }

    Ok(PlanConfig {
        name: compound.name().to_string(),
        tasks,
        constraints,
    })
}
