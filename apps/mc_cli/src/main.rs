// apps/mc_cli/src/main.rs

//! MagCube 命令行界面
//!
//! 设备到主机流式传输管线的演示与诊断工具。
//!
//! # 架构层级
//!
//! 本模块属于 **Layer 4: Application**：
//! - 配置通过 `StreamConfig` 读取，不含泛型
//! - 通过 `Precision` 枚举选择通道元素类型

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// MagCube 流式传输命令行工具
#[derive(Parser)]
#[command(name = "mc_cli")]
#[command(author = "MagCube Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "MagCube device-to-host streaming pipeline", long_about = None)]
struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 运行演示管线
    Run(commands::run::RunArgs),
    /// 显示分块方案与输出表
    Info(commands::info::InfoArgs),
    /// 验证配置
    Validate(commands::validate::ValidateArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 初始化日志
    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // try_init 同时桥接 runtime/physics 层的 log 记录
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args),
        Commands::Info(args) => commands::info::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
    }
}
