//! 约束种类库
//!
//! 封闭的 [`Constraint`](crate::constraint::Constraint) 具体种类集合：
//! - [`TransmissionConstraint`]：传动耦合 `slave = ratio * master`
//! - [`FixedBaseConstraint`]：钉住虚拟（浮动基座）DOF

mod fixed_base;
mod transmission;

pub use fixed_base::FixedBaseConstraint;
pub use transmission::{TransmissionConfig, TransmissionConstraint};
