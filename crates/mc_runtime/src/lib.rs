// crates/mc_runtime/src/lib.rs

//! MagCube Runtime Layer (Layer 1)
//!
//! 运行时抽象层，提供块通道、分块策略与加速器抽象。
//!
//! # 模块概览
//!
//! - [`storage`]: Storage trait、形状与主机内存
//! - [`channel`]: 单生产者/单消费者块通道（环形缓冲区）
//! - [`block`]: 块长推导策略
//! - [`accelerator`]: Accelerator trait（上下文、传输流、异步拷贝）
//! - [`emulated`]: 主机模拟加速器，支持故障注入
//! - [`stop`]: 协作式停止信号
//! - [`metrics`]: 传输计数与计时
//! - [`error`]: 运行时错误类型
//!
//! # 层级架构
//!
//! ```text
//! Layer 4: mc_cli      ─> 命令行入口
//! Layer 3: mc_stream   ─> TransferStage<A: Accelerator>, StageHandle
//!          mc_physics  ─> OscillatorState, BlockProducer
//! Layer 2: mc_config   ─> StreamConfig, Precision
//! Layer 1: mc_runtime  ─> Channel, Accelerator, BlockPolicy (本层)
//! ```
//!
//! # 设计原则
//!
//! 1. **块借用即所有权**: 获取块借用端点，同一端不会同时持有两个块
//! 2. **显式释放**: 未 `release` 而丢弃的块视为放弃，游标不前进
//! 3. **零成本抽象**: 加速器通过泛型单态化，运行时无动态分发

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accelerator;
pub mod block;
pub mod channel;
pub mod emulated;
pub mod error;
pub mod metrics;
pub mod stop;
pub mod storage;

#[cfg(feature = "gpu")]
pub mod wgpu_accel;

/// 层级标识
pub const LAYER: u8 = 1;

// 重导出核心类型
pub use accelerator::Accelerator;
pub use block::{BlockPlan, BlockPolicy, DEFAULT_TARGET_BLOCKS};
pub use channel::{
    channel, BlockRef, ChanProbe, ChanReader, ChanWriter, Cursors, ReadBlock, WriteBlock,
};
pub use emulated::{EmulatedAccelerator, EmulatedDeviceMemory, EmulatedStream, Fault};
pub use error::{AccelError, AccelOp, AccelResult, BlockError, ChanError};
pub use metrics::{Counter, Timer, TransferMetrics, TransferSnapshot};
pub use stop::StopToken;
pub use storage::{HostAccessible, HostMemory, HostRegion, MemoryLocation, Shape, Storage};

#[cfg(feature = "gpu")]
pub use wgpu_accel::{WgpuAccelerator, WgpuDeviceMemory, WgpuStream};

/// Prelude 模块
pub mod prelude {
    //! 常用类型预导入
    pub use crate::{
        channel, Accelerator, BlockPolicy, ChanReader, ChanWriter, EmulatedAccelerator,
        HostAccessible, HostMemory, Shape, StopToken, Storage,
    };
}
