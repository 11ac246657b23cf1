// apps/mc_cli/src/commands/validate.rs

//! 配置验证命令
//!
//! 检查配置文件能否加载，并给出分块方案与振荡器参数的提示。

use anyhow::{bail, Result};
use clap::Args;
use mc_config::StreamConfig;
use mc_physics::OscillatorState;
use mc_runtime::Shape;
use mc_stream::StageOptions;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// 验证参数
#[derive(Args)]
pub struct ValidateArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 严格模式（警告也视为错误）
    #[arg(long)]
    pub strict: bool,
}

/// 验证结果
#[derive(Default)]
struct ValidationResult {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ValidationResult {
    fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn is_ok_strict(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

/// 执行验证命令
pub fn execute(args: ValidateArgs) -> Result<()> {
    info!("=== MagCube 配置验证 ===");

    let Some(path) = &args.config else {
        println!("用法: mc_cli validate --config <配置文件> [--strict]");
        return Ok(());
    };

    let mut result = ValidationResult::default();
    validate_config(path, &mut result);
    print_validation_result(&result, args.strict)
}

fn validate_config(path: &Path, result: &mut ValidationResult) {
    println!("\n检查配置文件: {}", path.display());

    if !path.exists() {
        result.add_error(format!("配置文件不存在: {}", path.display()));
        return;
    }

    let config = match StreamConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            result.add_error(e.to_string());
            return;
        }
    };
    println!("  ✓ 配置文件格式有效");

    check_config(&config, result);
}

fn check_config(config: &StreamConfig, result: &mut ValidationResult) {
    // 分块
    let shape = Shape::from(config.mesh.shape);
    match StageOptions::from(&config.stage).block.plan(shape) {
        Ok(plan) => {
            println!(
                "  ✓ 分块方案: {} 块 × {} 元素 ({})",
                plan.block_count, plan.block_len, shape
            );
            if plan.block_count < 2 {
                result.add_warning("只有 1 个块，传输与消费无法重叠");
            }
        }
        Err(e) => result.add_error(format!("分块方案无效: {}", e)),
    }

    // 振荡器
    let osc = OscillatorState::from_config(&config.oscillator);
    if osc.rp() > osc.rap() {
        result.add_warning(format!(
            "平行态电阻 {} 大于反平行态电阻 {}",
            osc.rp(),
            osc.rap()
        ));
    }
    let uncoupled = config.oscillator.coupling.iter().all(|&s| s == 0.0);
    if osc.jread() != 0.0 && uncoupled {
        result.add_warning("设置了读取电流但耦合电导全为 0，耦合电流恒为 0");
    }
}

fn print_validation_result(result: &ValidationResult, strict: bool) -> Result<()> {
    println!("\n=== 验证结果 ===");

    if !result.errors.is_empty() {
        println!("\n错误 ({}):", result.errors.len());
        for err in &result.errors {
            error!("  ✗ {}", err);
            println!("  ✗ {}", err);
        }
    }

    if !result.warnings.is_empty() {
        println!("\n警告 ({}):", result.warnings.len());
        for warning in &result.warnings {
            warn!("  ⚠ {}", warning);
            println!("  ⚠ {}", warning);
        }
    }

    let success = if strict {
        result.is_ok_strict()
    } else {
        result.is_ok()
    };

    if success {
        println!("\n✓ 验证通过");
        Ok(())
    } else {
        println!("\n✗ 验证失败");
        bail!(
            "验证失败：发现 {} 个错误，{} 个警告",
            result.errors.len(),
            result.warnings.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_clean() {
        let mut result = ValidationResult::default();
        check_config(&StreamConfig::default(), &mut result);
        assert!(result.is_ok_strict());
    }

    #[test]
    fn test_warnings() {
        let mut config = StreamConfig::default();
        config.mesh.shape = [1, 1, 64];
        config.oscillator.rp = 300.0;
        config.oscillator.rap = 100.0;
        config.oscillator.jread = 1e10;

        let mut result = ValidationResult::default();
        check_config(&config, &mut result);
        assert!(result.is_ok());
        assert_eq!(result.warnings.len(), 3);
        assert!(!result.is_ok_strict());
    }

    #[test]
    fn test_missing_and_invalid_files() {
        let mut result = ValidationResult::default();
        validate_config(Path::new("/nonexistent/stream.json"), &mut result);
        assert_eq!(result.errors.len(), 1);

        let dir = std::env::temp_dir().join(format!("mc_cli_validate_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.json");
        std::fs::write(&path, r#"{ "stage": { "block_len": 300 } }"#).unwrap();

        let mut result = ValidationResult::default();
        validate_config(&path, &mut result);
        assert!(!result.is_ok());
        assert!(print_validation_result(&result, false).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
