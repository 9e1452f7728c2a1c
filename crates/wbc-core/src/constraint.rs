//! 约束能力接口
//!
//! 约束是完整约束（holonomic）的限制条件，在控制器周期内**同步**从
//! 当前模型重算自己的雅可比行 —— 计算假定足够便宜，因此不做双缓冲，
//! 也没有持久状态。

use crate::error::CoreError;
use crate::plan::PlanElement;
use nalgebra::DMatrix;
use std::fmt;
use wbc_model::DynamicsModel;

/// 约束的能力接口
///
/// 与任务不同，约束每个周期直接在控制线程上重算，`jacobian` 必须是
/// 给定模型下的纯函数。`model` 是借用参数，不得存储。
pub trait Constraint: Send {
    /// 身份与使能标志
    fn plan(&self) -> &PlanElement;

    /// 该约束贡献的雅可比行数
    fn row_count(&self, model: &dyn DynamicsModel) -> usize;

    /// 初始化：校验参数对当前模型是否有效
    fn init(&mut self, model: &dyn DynamicsModel) -> Result<(), CoreError>;

    /// 把约束雅可比行计算进 `out`（会被重设为 行数 × DOF 数）
    fn jacobian(&self, model: &dyn DynamicsModel, out: &mut DMatrix<f64>) -> Result<(), CoreError>;

    /// 从配置表加载参数；缺失的可选键取默认值
    fn load_config(&mut self, value: &toml::Value) -> Result<(), CoreError>;

    /// 保存参数；保存结果重新加载后应得到等价配置
    fn save_config(&self) -> Result<toml::Value, CoreError>;

    /// 诊断输出
    fn dump(&self, out: &mut dyn fmt::Write, prefix: &str) -> fmt::Result {
        self.plan().dump(out, prefix)
    }
}
