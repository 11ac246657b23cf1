// crates/mc_runtime/src/block.rs

//! 分块策略
//!
//! 由缓冲区总长度与自然形状推导每次传输的块长。
//!
//! # 策略
//!
//! 一行为 `nx` 个连续元素，共 `nz * ny` 行。块数取行数中不小于
//! `target_blocks` 的最小因子（行数不足时每行一块），块长 = 总长 / 块数。
//! 因此块长总能整除总长度，每轮完整传输恰好 `block_count` 次握手。
//!
//! 显式指定的块长优先，但必须整除总长度，否则视为配置错误。

use serde::{Deserialize, Serialize};

use crate::error::BlockError;
use crate::storage::Shape;

/// 默认目标块数
pub const DEFAULT_TARGET_BLOCKS: usize = 4;

/// 分块策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPolicy {
    /// 每轮完整传输的最少块数
    pub target_blocks: usize,
    /// 显式块长（元素数）
    pub block_len: Option<usize>,
}

impl Default for BlockPolicy {
    fn default() -> Self {
        Self {
            target_blocks: DEFAULT_TARGET_BLOCKS,
            block_len: None,
        }
    }
}

impl BlockPolicy {
    /// 指定目标块数
    pub fn with_target_blocks(mut self, target_blocks: usize) -> Self {
        self.target_blocks = target_blocks;
        self
    }

    /// 指定显式块长
    pub fn with_block_len(mut self, block_len: usize) -> Self {
        self.block_len = Some(block_len);
        self
    }

    /// 为给定形状推导分块方案
    pub fn plan(&self, shape: Shape) -> Result<BlockPlan, BlockError> {
        let total = shape.len();
        if total == 0 {
            return Err(BlockError::EmptyShape { shape: shape.dims() });
        }

        if let Some(block_len) = self.block_len {
            if block_len == 0 || total % block_len != 0 {
                return Err(BlockError::Uneven { block_len, total });
            }
            return Ok(BlockPlan {
                shape,
                block_len,
                block_count: total / block_len,
            });
        }

        if self.target_blocks == 0 {
            return Err(BlockError::ZeroTarget);
        }

        let rows = shape.rows();
        let block_count = smallest_divisor_at_least(rows, self.target_blocks).unwrap_or(rows);
        Ok(BlockPlan {
            shape,
            block_len: total / block_count,
            block_count,
        })
    }
}

/// `n` 中不小于 `min` 的最小因子
fn smallest_divisor_at_least(n: usize, min: usize) -> Option<usize> {
    (min.max(1)..=n).find(|d| n % d == 0)
}

/// 分块方案
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPlan {
    /// 缓冲区形状
    pub shape: Shape,
    /// 块长（元素数）
    pub block_len: usize,
    /// 每轮完整传输的块数
    pub block_count: usize,
}

impl BlockPlan {
    /// 每块包含的整行数（块不按行对齐时为 `None`）
    pub fn rows_per_block(&self) -> Option<usize> {
        let row_len = self.shape.row_len();
        (row_len > 0 && self.block_len % row_len == 0).then(|| self.block_len / row_len)
    }

    /// 总元素数
    pub fn total(&self) -> usize {
        self.block_len * self.block_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_plane_splits_into_four() {
        let plan = BlockPolicy::default().plan(Shape::new(1, 32, 32)).unwrap();
        assert_eq!(plan.block_len, 256);
        assert_eq!(plan.block_count, 4);
        assert_eq!(plan.rows_per_block(), Some(8));
        assert_eq!(plan.total(), 1024);
    }

    #[test]
    fn test_rows_without_exact_target_divisor() {
        // 30 行：不小于 4 的最小因子为 5
        let plan = BlockPolicy::default().plan(Shape::new(3, 10, 16)).unwrap();
        assert_eq!(plan.block_count, 5);
        assert_eq!(plan.block_len, 96);
    }

    #[test]
    fn test_few_rows_one_block_per_row() {
        let plan = BlockPolicy::default().plan(Shape::new(1, 2, 64)).unwrap();
        assert_eq!(plan.block_count, 2);
        assert_eq!(plan.block_len, 64);

        let flat = BlockPolicy::default().plan(Shape::flat(1024)).unwrap();
        assert_eq!(flat.block_count, 1);
        assert_eq!(flat.block_len, 1024);
    }

    #[test]
    fn test_prime_rows_fall_back_to_single_rows() {
        let plan = BlockPolicy::default().plan(Shape::new(1, 7, 8)).unwrap();
        assert_eq!(plan.block_count, 7);
        assert_eq!(plan.block_len, 8);
    }

    #[test]
    fn test_explicit_block_len() {
        let policy = BlockPolicy::default().with_block_len(128);
        let plan = policy.plan(Shape::new(1, 32, 32)).unwrap();
        assert_eq!(plan.block_count, 8);

        let uneven = BlockPolicy::default().with_block_len(300);
        assert_eq!(
            uneven.plan(Shape::new(1, 32, 32)),
            Err(BlockError::Uneven { block_len: 300, total: 1024 })
        );
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            BlockPolicy::default().plan(Shape::new(0, 4, 4)),
            Err(BlockError::EmptyShape { .. })
        ));
        assert_eq!(
            BlockPolicy::default().with_target_blocks(0).plan(Shape::new(1, 4, 4)),
            Err(BlockError::ZeroTarget)
        );
    }

    #[test]
    fn test_plan_is_deterministic() {
        let policy = BlockPolicy::default().with_target_blocks(6);
        let shape = Shape::new(4, 12, 20);
        assert_eq!(policy.plan(shape), policy.plan(shape));
    }
}
