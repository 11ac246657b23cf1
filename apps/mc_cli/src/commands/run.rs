// apps/mc_cli/src/commands/run.rs

//! 运行演示管线
//!
//! 生产者线程 → 设备通道 → 传输阶段 → 主机通道 → 消费者（振荡器读出）。
//!
//! # 架构说明
//!
//! - 使用 `StreamConfig` 配置管线，命令行参数可覆盖部分字段
//! - 精度通过 `Precision` 枚举选择，在此处分发到单态化管线
//! - 加速器为模拟实现，可通过 `--fault` 注入驱动故障

use anyhow::{anyhow, bail, Context, Result};
use bytemuck::Pod;
use clap::Args;
use mc_config::{Precision, StreamConfig};
use mc_physics::{
    outputs::{table_header, table_row},
    precession_mx, region_averages, BlockProducer, Command, OscillatorState, ScalarOutput,
    OUTPUTS,
};
use mc_runtime::{
    channel, AccelOp, Accelerator, ChanError, EmulatedAccelerator, HostMemory, Shape,
};
use mc_stream::{StageHandle, StageOptions, TransferStage};
use std::path::PathBuf;
use std::thread;
use std::time::Instant;
use tracing::{info, warn};

use super::parse_shape;

/// 运行参数
#[derive(Args)]
pub struct RunArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 缓冲区形状，形如 1x32x32（覆盖配置）
    #[arg(short, long)]
    pub shape: Option<String>,

    /// 完整传输轮数（覆盖配置）
    #[arg(short, long)]
    pub passes: Option<usize>,

    /// 通道元素精度 f32/f64（覆盖配置）
    #[arg(long)]
    pub precision: Option<String>,

    /// 振荡器命令，形如 "SetJread(1e10)"，可重复
    #[arg(long = "command")]
    pub commands: Vec<String>,

    /// 注入加速器故障，形如 synchronize:2，可重复
    #[arg(long = "fault")]
    pub faults: Vec<String>,
}

/// 通道元素类型
trait Element: Pod + Send + Sync + Into<f64> {
    fn from_f64(v: f64) -> Self;
}

impl Element for f32 {
    #[inline]
    fn from_f64(v: f64) -> Self {
        v as f32
    }
}

impl Element for f64 {
    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }
}

/// 执行运行命令
pub fn execute(args: RunArgs) -> Result<()> {
    info!("=== MagCube 管线启动 ===");

    let mut config = match &args.config {
        Some(path) => StreamConfig::from_file(path)
            .with_context(|| format!("无法加载配置文件 {}", path.display()))?,
        None => StreamConfig::default(),
    };
    if let Some(text) = &args.shape {
        config.mesh.shape = parse_shape(text)?.dims();
    }
    if let Some(passes) = args.passes {
        config.run.passes = passes;
    }
    if let Some(text) = &args.precision {
        config.precision = text.parse::<Precision>().map_err(|e| anyhow!(e))?;
    }
    config.validate().context("配置无效")?;

    let mut state = OscillatorState::from_config(&config.oscillator);
    for text in &args.commands {
        let command: Command = text.parse().with_context(|| format!("无效的命令 '{}'", text))?;
        command.apply(&mut state);
        info!("已执行命令: {}", text.trim());
    }

    let mut accel = EmulatedAccelerator::new(config.stage.device_ordinal);
    for text in &args.faults {
        let (op, call) = parse_fault(text)?;
        accel = accel.with_fault(op, call);
        warn!("注入故障: {} 第 {} 次调用", op, call);
    }

    info!("使用精度: {}", config.precision);
    match config.precision {
        Precision::F32 => run_pipeline::<f32>(&config, accel, state),
        Precision::F64 => run_pipeline::<f64>(&config, accel, state),
    }
}

/// 解析 `op:n`
fn parse_fault(text: &str) -> Result<(AccelOp, u64)> {
    let (name, call) = text
        .split_once(':')
        .ok_or_else(|| anyhow!("无效的故障描述 '{}': 期望 op:n", text))?;
    let op = AccelOp::from_name(name.trim()).ok_or_else(|| {
        let names: Vec<_> = AccelOp::ALL.iter().map(|op| op.name()).collect();
        anyhow!("未知操作 '{}'，可选: {}", name, names.join(", "))
    })?;
    let call: u64 = call
        .trim()
        .parse()
        .with_context(|| format!("无效的调用序号 '{}'", call))?;
    if call == 0 {
        bail!("调用序号从 1 开始");
    }
    Ok((op, call))
}

fn run_pipeline<T: Element>(
    config: &StreamConfig,
    accel: EmulatedAccelerator,
    mut state: OscillatorState,
) -> Result<()> {
    let shape = Shape::from(config.mesh.shape);
    let total = shape.len();
    let (passes, dt, frequency) = (config.run.passes, config.run.dt, config.run.frequency);

    let device = accel.alloc::<T>(shape).context("分配设备缓冲区失败")?;
    let (device_tx, device_rx) = channel(device);
    let (host_tx, mut host_rx) = channel(HostMemory::<T>::zeroed(shape));

    let options = StageOptions::from(&config.stage);
    let poll = options.poll_interval;
    let stage = TransferStage::new(accel, device_rx, host_tx, options)
        .context("构建传输阶段失败")?;
    let plan = *stage.plan();
    let stop = stage.stop_token();
    info!(
        "管线: {} ({} 个元素), {} 块 × {} 元素, {} 轮",
        shape, total, plan.block_count, plan.block_len, passes
    );

    let start = Instant::now();
    let handle = StageHandle::spawn(stage).context("启动传输线程失败")?;

    let producer_stop = stop.clone();
    let producer = thread::Builder::new()
        .name("mc-producer".to_string())
        .spawn(move || -> Result<u64> {
            let mut producer = BlockProducer::new(device_tx, plan.block_len)?;
            for pass in 0..passes {
                let t = pass as f64 * dt;
                for _ in 0..producer.blocks_per_pass() {
                    let sample = |i| T::from_f64(precession_mx(i, total, t, frequency));
                    match producer.produce_cancellable(&producer_stop, poll, sample) {
                        Ok(()) => {}
                        Err(ChanError::Cancelled) => return Ok(producer.blocks()),
                        Err(e) => return Err(e.into()),
                    }
                }
            }
            Ok(producer.blocks())
        })
        .context("启动生产者线程失败")?;

    // 消费者：每轮按区域求平均 m_x，更新振荡器并输出一行
    let columns: Vec<&ScalarOutput> = OUTPUTS.iter().collect();
    println!("# t (s)\t{}", table_header(&columns));
    let mut values: Vec<f64> = Vec::with_capacity(total);
    let mut completed = 0;
    'passes: for pass in 0..passes {
        values.clear();
        for _ in 0..plan.block_count {
            let block = match host_rx.acquire_readable_cancellable(plan.block_len, &stop, poll) {
                Ok(block) => block,
                Err(ChanError::Cancelled) => break 'passes,
                Err(e) => return Err(e.into()),
            };
            values.extend(block.as_slice().iter().map(|&v| v.into()));
            block.release();
        }
        state.update_output_resistance(region_averages(&values));
        println!("{:e}\t{}", pass as f64 * dt, table_row(&columns, &state));
        completed += 1;
    }

    let snapshot = handle.snapshot();
    let stage_result = handle.shutdown();
    let produced = producer
        .join()
        .map_err(|_| anyhow!("生产者线程异常退出"))??;
    let exit = stage_result.context("传输阶段失败")?;

    if completed < passes {
        warn!("仅完成 {}/{} 轮", completed, passes);
    }

    info!("=== 管线完成 ===");
    info!("生产块数: {}", produced);
    info!("传输迭代: {}", exit.iterations());
    info!("{}", snapshot.summary());
    info!("传输占比: {:.1}%", snapshot.busy_ratio() * 100.0);
    info!("总耗时: {:.3} s", start.elapsed().as_secs_f64());

    Ok(())
}
