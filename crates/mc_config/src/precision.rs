// crates/mc_config/src/precision.rs

//! 通道元素精度
//!
//! 配置层不引入泛型，由 `Precision` 在应用层选择通道元素类型
//! （`f32` 或 `f64`），再分发到对应的单态化管线。

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// 通道元素精度
///
/// # 示例
///
/// ```rust
/// use mc_config::Precision;
///
/// let precision = Precision::F32;
/// assert_eq!(precision.bytes_for(256), 1024);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// 单精度 (f32)
    ///
    /// 磁化分量的默认存储精度，传输量减半。
    #[default]
    F32,
    /// 双精度 (f64)
    F64,
}

impl Precision {
    /// 精度名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }

    /// 每个元素占用的字节数
    pub fn size_bytes(&self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    /// `len` 个元素的字节数
    pub fn bytes_for(&self, len: usize) -> usize {
        len * self.size_bytes()
    }
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 精度解析错误
#[derive(Debug, Clone)]
pub struct PrecisionParseError(String);

impl FromStr for Precision {
    type Err = PrecisionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "f32" | "float" | "single" => Ok(Self::F32),
            "f64" | "double" => Ok(Self::F64),
            _ => Err(PrecisionParseError(s.to_string())),
        }
    }
}

impl std::fmt::Display for PrecisionParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "无效的精度值: '{}', 期望 'f32' 或 'f64'", self.0)
    }
}

impl std::error::Error for PrecisionParseError {}
