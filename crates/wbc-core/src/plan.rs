//! 计划元素基础能力
//!
//! 任务与约束共享的身份信息（类型名 / 实例名）与运行期可变的使能标志。
//! 原型系统用继承表达这一层，这里改为组合：`Task` 和各约束以字段形式
//! 嵌入一个 [`PlanElement`]。

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// 所有任务 / 约束的公共身份与使能标志
///
/// 使能标志可在运行期由操作员 / 监督器修改（跨线程可见），身份信息在
/// 构造时确定后不再变化。
#[derive(Debug)]
pub struct PlanElement {
    type_name: String,
    instance_name: String,
    enabled: AtomicBool,
}

impl PlanElement {
    /// 创建计划元素，默认使能
    pub fn new(type_name: &str, instance_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            instance_name: instance_name.to_string(),
            enabled: AtomicBool::new(true),
        }
    }

    /// 类型名（如 "joint_position"、"transmission"）
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// 实例名（如 "RightArmPosture"）
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// 纯查询：该元素是否使能
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// 修改使能标志
    ///
    /// 使用 Release 确保修改对控制线程与更新线程都可见。
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// 输出缩进的诊断文本，给定状态下结果确定
    pub fn dump(&self, out: &mut dyn fmt::Write, prefix: &str) -> fmt::Result {
        writeln!(out, "{}type: {}", prefix, self.type_name)?;
        writeln!(out, "{}name: {}", prefix, self.instance_name)?;
        writeln!(out, "{}enabled: {}", prefix, self.is_enabled())
    }
}
