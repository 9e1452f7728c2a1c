//! 复合任务
//!
//! 按优先级排序的任务集合：注册顺序即优先级顺序。负责把所有任务注册
//! 到更新线程、替控制器轮询状态交换，并枚举当前使能任务供合成使用。

use crate::command::CommandType;
use crate::error::CoreError;
use crate::task::Task;
use crate::updater::TaskUpdater;
use std::fmt;
use std::sync::Arc;
use wbc_model::DynamicsModel;

/// 优先级有序的任务集合
pub struct CompoundTask {
    name: String,
    tasks: Vec<Arc<Task>>,
}

impl CompoundTask {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tasks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 追加任务；越早注册优先级越高
    pub fn add_task(&mut self, task: Arc<Task>) {
        self.tasks.push(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// 按优先级顺序遍历全部任务
    pub fn tasks(&self) -> &[Arc<Task>] {
        &self.tasks
    }

    /// 按名称查找任务
    pub fn task(&self, instance_name: &str) -> Option<&Arc<Task>> {
        self.tasks.iter().find(|t| t.name() == instance_name)
    }

    /// 初始化所有任务（启动时一次）
    pub fn init(&self, model: &dyn DynamicsModel) -> Result<(), CoreError> {
        for task in &self.tasks {
            task.init(model)?;
        }
        Ok(())
    }

    /// 把每个任务注册到更新线程（启动时一次）
    pub fn add_tasks_to_updater(&self, updater: &mut TaskUpdater) {
        for task in &self.tasks {
            updater.register(Arc::clone(task));
        }
    }

    /// 控制线程：轮询每个任务的状态交换，返回本周期交换的任务数
    pub fn check_updated_states(&self) -> usize {
        self.tasks.iter().filter(|t| t.check_updated_state()).count()
    }

    /// 按优先级顺序遍历当前使能的任务
    pub fn enabled_tasks(&self) -> impl Iterator<Item = &Arc<Task>> {
        self.tasks.iter().filter(|t| t.is_enabled())
    }

    /// 主导指令类型：优先级最高的使能任务的指令类型
    pub fn dominant_command_type(&self) -> Option<CommandType> {
        self.enabled_tasks().next().map(|t| t.command_type())
    }

    /// 重新使能一个任务：先 reinit 再打开使能标志
    ///
    /// 顺序不可颠倒：任务仍处于禁用状态时更新线程不会碰它的缓冲，
    /// reinit 才能安全地重置两份缓冲。
    pub fn reinit_task(&self, instance_name: &str, model: &dyn DynamicsModel) -> Result<(), CoreError> {
        let task = self
            .task(instance_name)
            .ok_or_else(|| CoreError::UnknownTask(instance_name.to_string()))?;
        task.reinit(model)?;
        task.set_enabled(true);
        Ok(())
    }

    /// 诊断输出：集合名加逐任务内容
    pub fn dump(&self, out: &mut dyn fmt::Write, prefix: &str) -> fmt::Result {
        writeln!(out, "{}compound_task: {}", prefix, self.name)?;
        let inner = format!("{}  ", prefix);
        for task in &self.tasks {
            task.dump(out, &inner)?;
        }
        Ok(())
    }
}
