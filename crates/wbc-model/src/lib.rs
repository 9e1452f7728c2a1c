//! 动力学模型查询接口
//!
//! 本模块定义整机控制器对刚体动力学引擎的只读查询界面：
//! - DOF 数量（虚拟 + 驱动）
//! - 关节状态（位置 / 速度）
//! - 质量矩阵与偏置力（重力 + 科氏力）
//! - 指定 body frame 处的雅可比矩阵
//!
//! # 快照约定
//!
//! 控制线程在每个伺服周期开始时更新一次模型快照，之后该快照在本周期内
//! 只读。任务与约束**不得**持有模型引用跨越周期：所有需要模型的调用都
//! 以借用参数的形式接收模型（`&dyn DynamicsModel`），由接口形状保证
//! "不存储"规则，而不是靠注释约定。
//!
//! 跨线程共享时使用 `Arc<dyn DynamicsModel>`：trait 方法全部是 `&self`
//! 查询，快照类型构造完成后不可变，因此更新线程读取期间不存在并发写。

mod error;
pub mod fixture;

pub use error::ModelError;

use nalgebra::{DMatrix, DVector};

/// 刚体动力学模型的只读查询接口
///
/// DOF 向量的排布约定：前 `num_virtual_dofs()` 个为虚拟（浮动基座）
/// 自由度，其余为驱动自由度。
pub trait DynamicsModel: Send + Sync {
    /// 总 DOF 数（虚拟 + 驱动）
    fn num_dofs(&self) -> usize;

    /// 虚拟（不可驱动）DOF 数，位于 DOF 向量前缀
    fn num_virtual_dofs(&self) -> usize;

    /// 驱动 DOF 数
    fn num_actuated_dofs(&self) -> usize {
        self.num_dofs() - self.num_virtual_dofs()
    }

    /// 当前关节位置（长度 = `num_dofs()`）
    fn joint_positions(&self) -> &DVector<f64>;

    /// 当前关节速度（长度 = `num_dofs()`）
    fn joint_velocities(&self) -> &DVector<f64>;

    /// 质量矩阵 M（`num_dofs()` × `num_dofs()`）
    fn mass_matrix(&self) -> &DMatrix<f64>;

    /// 偏置力 h（重力 + 科氏力，长度 = `num_dofs()`）
    fn bias_forces(&self) -> &DVector<f64>;

    /// 计算指定 body frame 处的任务空间雅可比
    ///
    /// `out` 会被重设为该 frame 的雅可比尺寸（行数 = frame 任务维数，
    /// 列数 = `num_dofs()`）。frame 不存在时返回
    /// [`ModelError::UnknownFrame`]。
    fn body_jacobian(&self, frame: &str, out: &mut DMatrix<f64>) -> Result<(), ModelError>;

    /// 指定 body frame 的当前任务空间位置
    ///
    /// `out` 会被重设为该 frame 的任务维数。frame 不存在时返回
    /// [`ModelError::UnknownFrame`]。
    fn body_position(&self, frame: &str, out: &mut DVector<f64>) -> Result<(), ModelError>;
}
