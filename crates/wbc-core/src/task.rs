//! 双缓冲控制目标
//!
//! [`Task`] 是一个控制目标：雅可比加目标向量，由更新线程异步重算、
//! 经三态协议交换后对控制线程可见。具体目标种类（关节姿态、笛卡尔
//! 位置等）通过 [`TaskKind`] 接口对象注入，而不是继承链。
//!
//! # 生命周期
//!
//! 配置工厂构造 → `init` 一次 → （禁用 → 重新使能时 `reinit`）→
//! 更新线程 join 之后销毁。`reinit` 必须在每次 禁用→使能 迁移时调用：
//! 缓冲可能已经过期或未按当前模型尺寸分配。

use crate::command::CommandType;
use crate::error::CoreError;
use crate::plan::PlanElement;
use crate::state_cell::{StateCell, UpdateStatus};
use nalgebra::{DMatrix, DVector};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use wbc_model::DynamicsModel;

/// reinit 等待在途更新结束时的轮询间隔
const RESET_POLL: Duration = Duration::from_millis(1);

/// 在途更新必须在此窗口内结束，否则视为更新线程卡死
const RESET_TIMEOUT: Duration = Duration::from_secs(2);

/// 一份任务状态：雅可比加目标向量
///
/// 每个任务持有两份：活动份被控制线程读取，非活动份被更新线程写入。
#[derive(Debug, Clone, PartialEq)]
pub struct TaskState {
    /// 任务雅可比（行数 = 任务维数，列数 = DOF 数）
    pub jacobian: DMatrix<f64>,
    /// 任务空间目标向量（长度 = 任务维数）
    pub goal: DVector<f64>,
}

impl TaskState {
    /// 创建全零状态
    pub fn zeros(task_dims: usize, num_dofs: usize) -> Self {
        Self {
            jacobian: DMatrix::zeros(task_dims, num_dofs),
            goal: DVector::zeros(task_dims),
        }
    }
}

/// 任务种类的能力接口
///
/// 封闭的具体种类集合（见 [`crate::tasks`]）通过该接口注入 [`Task`]。
/// 构造与配置加载完成后种类对象不再变化，因此 `update_state` 和
/// `command` 都是 `&self` 查询，可以跨线程共享。
pub trait TaskKind: Send + Sync {
    /// 种类名（配置文档中的 `type` 键）
    fn type_name(&self) -> &'static str;

    /// 按当前模型尺寸分配一份任务状态
    ///
    /// `init`/`reinit` 用它重置两份缓冲。模型尺寸与配置参数不一致时
    /// 返回 [`CoreError::Initialization`]。
    fn allocate_state(&self, model: &dyn DynamicsModel) -> Result<TaskState, CoreError>;

    /// 把雅可比与目标计算进给定缓冲
    ///
    /// 只能通过更新线程持有的写 guard 到达这里。`model` 是借用参数，
    /// 不得存储。
    fn update_state(
        &self,
        model: &dyn DynamicsModel,
        state: &mut TaskState,
    ) -> Result<(), CoreError>;

    /// 由活动状态计算任务空间指令
    ///
    /// 对给定的状态与模型是纯函数，不得改变任务状态。
    fn command(
        &self,
        model: &dyn DynamicsModel,
        state: &TaskState,
        out: &mut DVector<f64>,
    ) -> Result<(), CoreError>;

    /// 从配置表加载参数；缺失的可选键取默认值
    fn load_config(&mut self, value: &toml::Value) -> Result<(), CoreError>;

    /// 保存参数；保存结果重新加载后应得到等价配置
    fn save_config(&self) -> Result<toml::Value, CoreError>;

    /// 种类特有的诊断输出
    fn dump(&self, out: &mut dyn fmt::Write, prefix: &str) -> fmt::Result {
        let _ = (out, prefix);
        Ok(())
    }
}

/// 双缓冲控制目标
pub struct Task {
    plan: PlanElement,
    command_type: CommandType,
    kind: Box<dyn TaskKind>,
    cell: StateCell<TaskState>,
    initialized: AtomicBool,
}

impl Task {
    /// 用种类对象创建任务；缓冲尺寸在 `init` 时确定
    pub fn new(instance_name: &str, command_type: CommandType, kind: Box<dyn TaskKind>) -> Self {
        Self {
            plan: PlanElement::new(kind.type_name(), instance_name),
            command_type,
            kind,
            cell: StateCell::new(TaskState::zeros(0, 0), TaskState::zeros(0, 0)),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        self.plan.instance_name()
    }

    pub fn plan(&self) -> &PlanElement {
        &self.plan
    }

    pub fn is_enabled(&self) -> bool {
        self.plan.is_enabled()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.plan.set_enabled(enabled);
    }

    pub fn command_type(&self) -> CommandType {
        self.command_type
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// 当前三态状态（诊断用）
    pub fn update_status(&self) -> UpdateStatus {
        self.cell.status()
    }

    /// 初始化：按当前模型尺寸分配两份缓冲，状态回到 IDLE
    ///
    /// 启动时调用一次。由控制线程调用。更新线程恰好在写入本任务时
    /// 等待其完成再重置：任务禁用后更新线程不会开始新的写入，等待
    /// 以一次重算为界。超过 [`RESET_TIMEOUT`] 仍未结束说明更新线程
    /// 卡死，返回 [`CoreError::Initialization`]。
    pub fn init(&self, model: &dyn DynamicsModel) -> Result<(), CoreError> {
        if model.num_dofs() == 0 {
            return Err(CoreError::Initialization(format!(
                "task '{}': model has no DOFs",
                self.name()
            )));
        }
        let prototype = self.kind.allocate_state(model)?;
        if prototype.jacobian.ncols() != model.num_dofs() {
            return Err(CoreError::Initialization(format!(
                "task '{}': allocated {} columns for a {}-DOF model",
                self.name(),
                prototype.jacobian.ncols(),
                model.num_dofs()
            )));
        }
        let deadline = Instant::now() + RESET_TIMEOUT;
        while !self.cell.try_reset(|state| state.clone_from(&prototype)) {
            if Instant::now() >= deadline {
                return Err(CoreError::Initialization(format!(
                    "task '{}': in-flight state update did not finish within {:?}",
                    self.name(),
                    RESET_TIMEOUT
                )));
            }
            std::thread::sleep(RESET_POLL);
        }
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// 重新初始化：每次 禁用→使能 迁移后必须调用
    pub fn reinit(&self, model: &dyn DynamicsModel) -> Result<(), CoreError> {
        self.init(model)
    }

    /// 更新线程专用：重算非活动缓冲
    ///
    /// 仅当任务使能、已初始化且状态为 IDLE 时才会真正计算；
    /// 返回 `Ok(true)` 表示本次发布了新的状态。
    /// UPDATING/READY 状态下直接返回 `Ok(false)`（上一次结果待消费）。
    pub fn update_state(&self, model: &dyn DynamicsModel) -> Result<bool, CoreError> {
        if !self.is_enabled() || !self.is_initialized() {
            return Ok(false);
        }
        let Some(mut guard) = self.cell.begin_update() else {
            return Ok(false);
        };
        match self.kind.update_state(model, &mut guard) {
            Ok(()) => {
                guard.commit();
                Ok(true)
            }
            // guard 丢弃：回到 IDLE，部分写入不会发布
            Err(e) => Err(e),
        }
    }

    /// 控制线程专用：若有已就绪的更新则交换缓冲
    ///
    /// 只是句柄交换，不拷贝数据。无更新时返回 `false` 且无副作用。
    pub fn check_updated_state(&self) -> bool {
        self.cell.try_swap()
    }

    /// 读取活动缓冲中的雅可比
    ///
    /// 未初始化时返回 [`CoreError::Misuse`]；缓冲列数与模型 DOF 数
    /// 不一致时返回 [`CoreError::DimensionMismatch`]。
    pub fn get_jacobian(
        &self,
        model: &dyn DynamicsModel,
        out: &mut DMatrix<f64>,
    ) -> Result<(), CoreError> {
        if !self.is_initialized() {
            return Err(CoreError::Misuse("get_jacobian called before init"));
        }
        let state = self.cell.active();
        if state.jacobian.ncols() != model.num_dofs() {
            return Err(CoreError::DimensionMismatch {
                expected: model.num_dofs(),
                actual: state.jacobian.ncols(),
            });
        }
        if out.nrows() != state.jacobian.nrows() || out.ncols() != state.jacobian.ncols() {
            *out = DMatrix::zeros(state.jacobian.nrows(), state.jacobian.ncols());
        }
        out.copy_from(&state.jacobian);
        Ok(())
    }

    /// 由活动状态计算任务空间指令（纯函数，不改变任务状态）
    ///
    /// `init` 之前调用属于契约违反，返回 [`CoreError::Misuse`]。
    pub fn get_command(
        &self,
        model: &dyn DynamicsModel,
        out: &mut DVector<f64>,
    ) -> Result<(), CoreError> {
        if !self.is_initialized() {
            return Err(CoreError::Misuse("get_command called before init"));
        }
        self.kind.command(model, self.cell.active(), out)
    }

    /// 从配置表加载种类参数（构造阶段，共享之前）
    pub fn load_config(&mut self, value: &toml::Value) -> Result<(), CoreError> {
        self.kind.load_config(value)
    }

    /// 保存种类参数
    pub fn save_config(&self) -> Result<toml::Value, CoreError> {
        self.kind.save_config()
    }

    /// 诊断输出：身份、指令类型、三态状态加种类参数
    pub fn dump(&self, out: &mut dyn fmt::Write, prefix: &str) -> fmt::Result {
        self.plan.dump(out, prefix)?;
        writeln!(out, "{}command_type: {}", prefix, self.command_type.as_str())?;
        writeln!(out, "{}initialized: {}", prefix, self.is_initialized())?;
        writeln!(out, "{}update_status: {}", prefix, self.update_status().as_str())?;
        self.kind.dump(out, prefix)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name())
            .field("type", &self.plan.type_name())
            .field("enabled", &self.is_enabled())
            .field("initialized", &self.is_initialized())
            .field("status", &self.update_status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::JointPositionTask;
    use wbc_model::fixture::PlanarArmModel;

    fn make_task() -> Task {
        Task::new(
            "Posture",
            CommandType::Acceleration,
            Box::new(JointPositionTask::default()),
        )
    }

    /// 规格场景：单任务，DOF = 6，一次 update_state 加一次
    /// check_updated_state 恰好驱动 IDLE→UPDATING→READY→IDLE 一轮，
    /// 交换之后 get_jacobian 才返回新计算的矩阵。
    #[test]
    fn test_single_update_cycle_six_dofs() {
        let model = PlanarArmModel::new(6);
        let task = make_task();
        task.init(&model).unwrap();
        assert_eq!(task.update_status(), UpdateStatus::Idle);

        // 初始化后活动雅可比为零
        let mut jacobian = DMatrix::zeros(0, 0);
        task.get_jacobian(&model, &mut jacobian).unwrap();
        assert!(jacobian.iter().all(|v| *v == 0.0));

        assert!(task.update_state(&model).unwrap());
        assert_eq!(task.update_status(), UpdateStatus::Ready);

        // 交换之前更新不可见
        task.get_jacobian(&model, &mut jacobian).unwrap();
        assert!(jacobian.iter().all(|v| *v == 0.0));

        assert!(task.check_updated_state());
        assert_eq!(task.update_status(), UpdateStatus::Idle);

        // 交换之后可见：关节姿态任务的雅可比是驱动 DOF 选择矩阵
        task.get_jacobian(&model, &mut jacobian).unwrap();
        assert_eq!(jacobian.nrows(), 6);
        assert_eq!(jacobian.ncols(), 6);
        assert_eq!(jacobian[(0, 0)], 1.0);
        assert_eq!(jacobian[(5, 5)], 1.0);

        // 没有新的更新：第二次 check 返回 false
        assert!(!task.check_updated_state());
    }

    /// READY 未消费时更新线程跳过该任务
    #[test]
    fn test_update_skipped_until_consumed() {
        let model = PlanarArmModel::new(4);
        let task = make_task();
        task.init(&model).unwrap();

        assert!(task.update_state(&model).unwrap());
        assert!(!task.update_state(&model).unwrap());
        assert!(task.check_updated_state());
        assert!(task.update_state(&model).unwrap());
    }

    /// 禁用的任务不参与重算
    #[test]
    fn test_disabled_task_not_updated() {
        let model = PlanarArmModel::new(4);
        let task = make_task();
        task.init(&model).unwrap();
        task.set_enabled(false);

        assert!(!task.update_state(&model).unwrap());
        assert_eq!(task.update_status(), UpdateStatus::Idle);
    }

    /// init 之前的 get_command / get_jacobian 是契约违反
    #[test]
    fn test_misuse_before_init() {
        let model = PlanarArmModel::new(4);
        let task = make_task();

        let mut out = DVector::zeros(0);
        assert!(matches!(
            task.get_command(&model, &mut out),
            Err(CoreError::Misuse(_))
        ));
        let mut jacobian = DMatrix::zeros(0, 0);
        assert!(matches!(
            task.get_jacobian(&model, &mut jacobian),
            Err(CoreError::Misuse(_))
        ));
    }

    /// 模型 DOF 数变化而未 reinit：尺寸不一致错误；reinit 之后恢复
    #[test]
    fn test_dimension_mismatch_until_reinit() {
        let small = PlanarArmModel::new(4);
        let big = PlanarArmModel::new(6);
        let task = make_task();
        task.init(&small).unwrap();

        let mut jacobian = DMatrix::zeros(0, 0);
        assert!(matches!(
            task.get_jacobian(&big, &mut jacobian),
            Err(CoreError::DimensionMismatch {
                expected: 6,
                actual: 4
            })
        ));

        task.reinit(&big).unwrap();
        task.get_jacobian(&big, &mut jacobian).unwrap();
        assert_eq!(jacobian.ncols(), 6);
    }

    /// 在途更新与 reinit 竞争：reinit 等待写入结束，不报错
    ///
    /// 操作员序列 禁用 → reinit → 重新使能 随时可能撞上一次进行中的
    /// 慢重算，必须是合法操作。
    #[test]
    fn test_reinit_waits_for_inflight_update() {
        use std::sync::Arc;

        struct SlowKind;

        impl TaskKind for SlowKind {
            fn type_name(&self) -> &'static str {
                "slow"
            }

            fn allocate_state(&self, model: &dyn DynamicsModel) -> Result<TaskState, CoreError> {
                Ok(TaskState::zeros(1, model.num_dofs()))
            }

            fn update_state(
                &self,
                _model: &dyn DynamicsModel,
                state: &mut TaskState,
            ) -> Result<(), CoreError> {
                // 故意慢的重算，拉长 UPDATING 窗口
                std::thread::sleep(Duration::from_millis(200));
                state.goal[0] = 1.0;
                Ok(())
            }

            fn command(
                &self,
                _model: &dyn DynamicsModel,
                state: &TaskState,
                out: &mut DVector<f64>,
            ) -> Result<(), CoreError> {
                if out.len() != state.goal.len() {
                    *out = DVector::zeros(state.goal.len());
                }
                out.copy_from(&state.goal);
                Ok(())
            }

            fn load_config(&mut self, _value: &toml::Value) -> Result<(), CoreError> {
                Ok(())
            }

            fn save_config(&self) -> Result<toml::Value, CoreError> {
                Ok(toml::Value::Table(toml::Table::new()))
            }
        }

        let model = PlanarArmModel::new(4);
        let task = Arc::new(Task::new(
            "Slow",
            CommandType::Acceleration,
            Box::new(SlowKind),
        ));
        task.init(&model).unwrap();

        let worker = {
            let task = Arc::clone(&task);
            let model = model.clone();
            std::thread::spawn(move || task.update_state(&model).unwrap())
        };
        // 等到写入真正开始
        while task.update_status() == UpdateStatus::Idle {
            std::thread::sleep(Duration::from_millis(1));
        }

        // 操作员序列：先禁用，再 reinit，最后重新使能
        task.set_enabled(false);
        task.reinit(&model).unwrap();
        assert_eq!(task.update_status(), UpdateStatus::Idle);
        task.set_enabled(true);

        assert!(worker.join().unwrap());

        // reinit 之后缓冲回到全零，竞争中的那次发布不会泄漏进来
        let mut out = DVector::zeros(0);
        task.get_command(&model, &mut out).unwrap();
        assert_eq!(out[0], 0.0);
    }

    /// get_command 是纯函数：重复调用得到相同结果
    #[test]
    fn test_get_command_pure() {
        let model = PlanarArmModel::new(4);
        let task = make_task();
        task.init(&model).unwrap();
        task.update_state(&model).unwrap();
        task.check_updated_state();

        let mut a = DVector::zeros(0);
        let mut b = DVector::zeros(0);
        task.get_command(&model, &mut a).unwrap();
        task.get_command(&model, &mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_dump_contains_identity_and_status() {
        let model = PlanarArmModel::new(4);
        let task = make_task();
        task.init(&model).unwrap();

        let mut text = String::new();
        task.dump(&mut text, "  ").unwrap();
        assert!(text.contains("  name: Posture"));
        assert!(text.contains("  type: joint_position"));
        assert!(text.contains("  update_status: IDLE"));
    }
}
