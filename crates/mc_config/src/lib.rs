// crates/mc_config/src/lib.rs

//! MagCube Config Layer (Layer 2)
//!
//! 配置层，提供精度选择与管线配置。
//! 本层完全无泛型，使用 `Precision` 枚举进行运行时精度分发。
//!
//! # 模块概览
//!
//! - [`precision`]: Precision 枚举（F32/F64）
//! - [`stream_config`]: StreamConfig 管线配置
//! - [`error`]: 配置错误类型
//!
//! # 层级架构
//!
//! ```text
//! Layer 4: mc_cli      ─> uses StreamConfig
//! Layer 3: mc_stream   ─> impl From<&StageConfig> for StageOptions
//! Layer 2: mc_config   ─> Precision, StreamConfig (本层)
//! Layer 1: mc_runtime
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod precision;
pub mod stream_config;

/// 层级标识
pub const LAYER: u8 = 2;

// 重导出核心类型
pub use error::ConfigError;
pub use precision::Precision;
pub use stream_config::{MeshConfig, OscillatorConfig, RunConfig, StageConfig, StreamConfig};
