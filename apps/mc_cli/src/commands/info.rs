// apps/mc_cli/src/commands/info.rs

//! 信息显示命令
//!
//! 显示分块方案、默认配置、输出量与命令表。

use anyhow::{Context, Result};
use clap::Args;
use mc_config::{Precision, StreamConfig};
use mc_physics::{COMMANDS, OUTPUTS};
use mc_runtime::{BlockPlan, BlockPolicy, Shape};
use std::path::PathBuf;
use tracing::info;

use super::parse_shape;

/// 信息显示参数
#[derive(Args)]
pub struct InfoArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 缓冲区形状，形如 1x32x32（覆盖配置）
    #[arg(short, long)]
    pub shape: Option<String>,

    /// 目标块数（覆盖配置）
    #[arg(long)]
    pub target_blocks: Option<usize>,

    /// 显式块长（覆盖配置）
    #[arg(long)]
    pub block_len: Option<usize>,

    /// 显示默认配置
    #[arg(long)]
    pub defaults: bool,

    /// 显示输出量与命令表
    #[arg(long)]
    pub tables: bool,
}

/// 执行信息命令
pub fn execute(args: InfoArgs) -> Result<()> {
    info!("=== MagCube 信息 ===");

    let config = match &args.config {
        Some(path) => StreamConfig::from_file(path)
            .with_context(|| format!("无法加载配置文件 {}", path.display()))?,
        None => StreamConfig::default(),
    };

    let shape = match &args.shape {
        Some(text) => parse_shape(text)?,
        None => Shape::from(config.mesh.shape),
    };
    let policy = BlockPolicy {
        target_blocks: args.target_blocks.unwrap_or(config.stage.target_blocks),
        block_len: args.block_len.or(config.stage.block_len),
    };
    let plan = policy
        .plan(shape)
        .with_context(|| format!("无法为形状 {} 推导分块方案", shape))?;
    print_plan(&plan, config.precision);

    if args.defaults {
        println!();
        print_default_config()?;
    }

    if args.tables {
        println!();
        print_tables();
    }

    print_accelerators(config.stage.device_ordinal);

    Ok(())
}

fn print_plan(plan: &BlockPlan, precision: Precision) {
    println!("=== 分块方案 ===");
    println!("形状: {} ({} 个元素)", plan.shape, plan.total());
    println!("行数: {} (每行 {} 个元素)", plan.shape.rows(), plan.shape.row_len());
    println!("块数: {}", plan.block_count);
    println!("块长: {} 个元素", plan.block_len);
    match plan.rows_per_block() {
        Some(rows) => println!("每块行数: {}", rows),
        None => println!("每块行数: 非整行"),
    }
    println!(
        "每块字节数 ({}): {}",
        precision,
        precision.bytes_for(plan.block_len)
    );
}

fn print_default_config() -> Result<()> {
    println!("=== 默认配置 ===");
    let json = serde_json::to_string_pretty(&StreamConfig::default())?;
    println!("{}", json);
    Ok(())
}

fn print_tables() {
    println!("=== 输出量 ===");
    for output in OUTPUTS.iter() {
        println!("  {:<6} [{}] {}", output.name, output.unit, output.description);
    }

    println!("\n=== 命令 ===");
    for cmd in COMMANDS.iter() {
        println!("  {}({} 个参数) {}", cmd.name, cmd.arity, cmd.description);
    }
}

fn print_accelerators(ordinal: usize) {
    println!("\n=== 加速器 (设备序号 {}) ===", ordinal);
    println!("  - Emulated: ✓");

    #[cfg(feature = "gpu")]
    {
        match mc_runtime::WgpuAccelerator::with_ordinal(ordinal) {
            Ok(Some(accel)) => println!("  - wgpu: ✓ ({})", accel.adapter_name()),
            Ok(None) => println!("  - wgpu: 序号 {} 无可用适配器", ordinal),
            Err(e) => println!("  - wgpu: 初始化失败 ({})", e),
        }
    }

    #[cfg(not(feature = "gpu"))]
    println!("  - wgpu: 未启用（使用 --features gpu 构建）");
}
