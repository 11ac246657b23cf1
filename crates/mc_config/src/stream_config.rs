// crates/mc_config/src/stream_config.rs

//! StreamConfig - 传输管线配置
//!
//! 描述网格形状、传输阶段、振荡器参数与演示运行参数。
//! 全部使用非泛型类型，数值以 f64 存储，便于 JSON 序列化。

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::precision::Precision;

/// 管线配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// 通道元素精度
    #[serde(default)]
    pub precision: Precision,

    /// 网格配置
    #[serde(default)]
    pub mesh: MeshConfig,

    /// 传输阶段配置
    #[serde(default)]
    pub stage: StageConfig,

    /// 振荡器参数
    #[serde(default)]
    pub oscillator: OscillatorConfig,

    /// 演示运行参数
    #[serde(default)]
    pub run: RunConfig,
}

/// 网格配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshConfig {
    /// 缓冲区形状 `[nz, ny, nx]`
    #[serde(default = "default_shape")]
    pub shape: [usize; 3],
}

fn default_shape() -> [usize; 3] { [1, 32, 32] }

impl Default for MeshConfig {
    fn default() -> Self {
        Self { shape: default_shape() }
    }
}

impl MeshConfig {
    /// 总元素数
    pub fn total(&self) -> usize {
        self.shape.iter().product()
    }
}

/// 传输阶段配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// 每轮完整传输的最少块数
    #[serde(default = "default_target_blocks")]
    pub target_blocks: usize,

    /// 显式块长（元素数），须整除总长度
    #[serde(default)]
    pub block_len: Option<usize>,

    /// 工作线程名
    #[serde(default = "default_thread_name")]
    pub thread_name: String,

    /// 等待通道时检查停止信号的间隔 [ms]
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// 加速器设备序号
    #[serde(default)]
    pub device_ordinal: usize,
}

fn default_target_blocks() -> usize { 4 }
fn default_thread_name() -> String { "mc-transfer".to_string() }
fn default_poll_interval_ms() -> u64 { 10 }

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            target_blocks: default_target_blocks(),
            block_len: None,
            thread_name: default_thread_name(),
            poll_interval_ms: default_poll_interval_ms(),
            device_ordinal: 0,
        }
    }
}

/// 耦合振荡器参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OscillatorConfig {
    /// 平行态电阻 [Ohm]
    #[serde(default)]
    pub rp: f64,

    /// 反平行态电阻 [Ohm]
    #[serde(default)]
    pub rap: f64,

    /// 读取电流密度 [A/m2]
    #[serde(default)]
    pub jread: f64,

    /// 耦合电导 `[s12, s13, s14, s23, s24, s34]`
    #[serde(default)]
    pub coupling: [f64; 6],
}

/// 演示运行参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// 完整传输轮数
    #[serde(default = "default_passes")]
    pub passes: usize,

    /// 每轮对应的模拟时间步长 [s]
    #[serde(default = "default_dt")]
    pub dt: f64,

    /// 演示磁化进动频率 [Hz]
    #[serde(default = "default_frequency")]
    pub frequency: f64,
}

fn default_passes() -> usize { 4 }
fn default_dt() -> f64 { 1e-11 }
fn default_frequency() -> f64 { 5e9 }

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            passes: default_passes(),
            dt: default_dt(),
            frequency: default_frequency(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            precision: Precision::default(),
            mesh: MeshConfig::default(),
            stage: StageConfig::default(),
            oscillator: OscillatorConfig::default(),
            run: RunConfig::default(),
        }
    }
}

impl StreamConfig {
    /// 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;

        let config: StreamConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 网格
        if self.mesh.shape.iter().any(|&d| d == 0) {
            return Err(ConfigError::invalid(
                "mesh.shape",
                format!("{:?}", self.mesh.shape),
                "各维度必须大于 0",
            ));
        }

        // 分块
        if self.stage.target_blocks == 0 {
            return Err(ConfigError::invalid(
                "stage.target_blocks",
                self.stage.target_blocks,
                "目标块数必须大于 0",
            ));
        }
        if let Some(block_len) = self.stage.block_len {
            let total = self.mesh.total();
            if block_len == 0 || total % block_len != 0 {
                return Err(ConfigError::invalid(
                    "stage.block_len",
                    block_len,
                    &format!("块长必须整除总长度 {}", total),
                ));
            }
        }
        if self.stage.thread_name.trim().is_empty() {
            return Err(ConfigError::invalid(
                "stage.thread_name",
                &self.stage.thread_name,
                "线程名不能为空",
            ));
        }
        if self.stage.poll_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "stage.poll_interval_ms",
                self.stage.poll_interval_ms,
                "检查间隔必须大于 0",
            ));
        }

        // 振荡器
        let osc = &self.oscillator;
        for (key, value) in [("oscillator.rp", osc.rp), ("oscillator.rap", osc.rap)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::invalid(key, value, "电阻必须为非负有限值"));
            }
        }
        if !osc.jread.is_finite() {
            return Err(ConfigError::invalid("oscillator.jread", osc.jread, "必须为有限值"));
        }
        if let Some(s) = osc.coupling.iter().find(|s| !s.is_finite()) {
            return Err(ConfigError::invalid("oscillator.coupling", s, "耦合电导必须为有限值"));
        }

        // 运行
        if self.run.passes == 0 {
            return Err(ConfigError::invalid("run.passes", self.run.passes, "轮数必须大于 0"));
        }
        if !(self.run.dt > 0.0) {
            return Err(ConfigError::invalid("run.dt", self.run.dt, "时间步长必须为正"));
        }
        if !self.run.frequency.is_finite() {
            return Err(ConfigError::invalid("run.frequency", self.run.frequency, "必须为有限值"));
        }

        Ok(())
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, content).map_err(ConfigError::Io)?;
        Ok(())
    }
}
