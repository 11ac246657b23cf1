// apps/mc_cli/src/commands/mod.rs

//! 子命令实现

pub mod info;
pub mod run;
pub mod validate;

use mc_runtime::Shape;

/// 解析 `NZxNYxNX` 形式的形状
pub fn parse_shape(text: &str) -> anyhow::Result<Shape> {
    let dims = text
        .split(['x', 'X'])
        .map(|d| d.trim().parse::<usize>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow::anyhow!("无效的形状 '{}': {}", text, e))?;
    match dims.as_slice() {
        [nz, ny, nx] => Ok(Shape::new(*nz, *ny, *nx)),
        [ny, nx] => Ok(Shape::new(1, *ny, *nx)),
        [n] => Ok(Shape::flat(*n)),
        _ => anyhow::bail!("无效的形状 '{}': 期望 NZxNYxNX", text),
    }
}
