// crates/mc_stream/src/lib.rs

//! MagCube 传输阶段
//!
//! 将设备通道（加速器驻留的缓冲区）逐块排空到主机通道。
//!
//! # 使用示例
//!
//! ```rust,no_run
//! use mc_runtime::{channel, Accelerator, EmulatedAccelerator, HostMemory, Shape};
//! use mc_stream::{StageHandle, StageOptions, TransferStage};
//!
//! let accel = EmulatedAccelerator::new(0);
//! let device = accel.alloc::<f32>(Shape::new(1, 32, 32)).unwrap();
//! let (device_tx, device_rx) = channel(device);
//! let (host_tx, host_rx) = channel(HostMemory::<f32>::zeroed([1, 32, 32]));
//!
//! let stage = TransferStage::new(accel, device_rx, host_tx, StageOptions::default()).unwrap();
//! let handle = StageHandle::spawn(stage).unwrap();
//! // 生产者写 device_tx，消费者读 host_rx
//! # drop((device_tx, host_rx));
//! handle.shutdown().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod options;
pub mod runner;
pub mod stage;

pub use error::StageError;
pub use options::StageOptions;
pub use runner::StageHandle;
pub use stage::{StageExit, TransferStage};
