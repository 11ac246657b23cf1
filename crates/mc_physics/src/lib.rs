// crates/mc_physics/src/lib.rs

//! MagCube Physics Layer (Layer 3)
//!
//! 四个耦合自旋霍尔纳米振荡器的读出与耦合模型，以及驱动传输管线的块生产者。
//!
//! # 模块概览
//!
//! - [`oscillator`]: OscillatorState、耦合矩阵与区域平均
//! - [`outputs`]: Rout1..4 / Jcpl1..4 标量输出表
//! - [`commands`]: 参数设置命令表
//! - [`producer`]: BlockProducer 设备通道生产者
//! - [`error`]: 物理层错误类型

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod commands;
pub mod error;
pub mod oscillator;
pub mod outputs;
pub mod producer;

/// 层级标识
pub const LAYER: u8 = 3;

pub use commands::{dispatch, Command, CommandSpec, COMMANDS};
pub use error::PhysicsError;
pub use oscillator::{region_averages, region_of, CouplingMatrix, Excitation, OscillatorState, REGION_COUNT};
pub use outputs::{evaluate_all, lookup, ScalarOutput, OUTPUTS};
pub use producer::{precession_mx, BlockProducer};
