// crates/mc_physics/src/oscillator.rs

//! 耦合自旋霍尔纳米振荡器（SHNO）
//!
//! 四个振荡器各对应一个网格区域，由 MTJ 读出电阻并通过电导矩阵相互耦合。
//!
//! # 模型
//!
//! 归一化电阻取自由层磁化的 x 分量：`r_i = -<m_x>_i`（区域未使用时为 0）。
//!
//! ```text
//! R_i   = (Rap - Rp) r_i / 2 + (Rp + Rap) / 2
//! J_cpl = Jread * Σ_j ((Rap - Rp) r_j / 2) G[i][j]
//! ```
//!
//! 耦合信号不含直流偏置项 `(Rp + Rap) / 2`。

use log::trace;
use mc_config::OscillatorConfig;

use crate::error::PhysicsError;

/// 振荡器（区域）数
pub const REGION_COUNT: usize = 4;

/// 每个区域的激励向量 `(0, 0, J)` [A/m2]
pub type Excitation = [[f64; 3]; REGION_COUNT];

/// 耦合电导矩阵
///
/// 对称、对角为 0：振荡器不与自身耦合，耦合互易 `G[i][j] = G[j][i]`。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CouplingMatrix([[f64; REGION_COUNT]; REGION_COUNT]);

impl CouplingMatrix {
    /// 由上三角元素构造
    pub fn from_pairs(s12: f64, s13: f64, s14: f64, s23: f64, s24: f64, s34: f64) -> Self {
        let mut g = [[0.0; REGION_COUNT]; REGION_COUNT];
        for (i, j, s) in [(0, 1, s12), (0, 2, s13), (0, 3, s14), (1, 2, s23), (1, 3, s24), (2, 3, s34)] {
            g[i][j] = s;
            g[j][i] = s;
        }
        Self(g)
    }

    /// 由 `[s12, s13, s14, s23, s24, s34]` 构造
    pub fn from_array(s: [f64; 6]) -> Self {
        Self::from_pairs(s[0], s[1], s[2], s[3], s[4], s[5])
    }

    /// 元素 `G[i][j]`
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.0[i][j]
    }

    /// 行 `G[i]`
    #[inline]
    pub fn row(&self, i: usize) -> &[f64; REGION_COUNT] {
        &self.0[i]
    }

    /// 是否对称
    pub fn is_symmetric(&self) -> bool {
        (0..REGION_COUNT).all(|i| (0..REGION_COUNT).all(|j| self.0[i][j] == self.0[j][i]))
    }
}

/// 振荡器状态
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OscillatorState {
    /// 平行态电阻 [Ohm]
    rp: f64,
    /// 反平行态电阻 [Ohm]
    rap: f64,
    /// 读取电流密度 [A/m2]
    jread: f64,
    coupling: CouplingMatrix,
    /// 归一化电阻 r_i = -<m_x>_i
    r: [f64; REGION_COUNT],
}

impl OscillatorState {
    /// 创建全零状态
    pub fn new() -> Self {
        Self::default()
    }

    /// 从配置创建
    pub fn from_config(config: &OscillatorConfig) -> Self {
        let mut state = Self::new();
        state.set_output_resistance(config.rp, config.rap);
        state.set_read_current(config.jread);
        state.coupling = CouplingMatrix::from_array(config.coupling);
        state
    }

    /// 设置 MTJ 平行/反平行电阻
    pub fn set_output_resistance(&mut self, rp: f64, rap: f64) {
        self.rp = rp;
        self.rap = rap;
    }

    /// 设置读取电流密度
    pub fn set_read_current(&mut self, jread: f64) {
        self.jread = jread;
    }

    /// 设置振荡器间的耦合电导
    pub fn set_coupling(&mut self, s12: f64, s13: f64, s14: f64, s23: f64, s24: f64, s34: f64) {
        self.coupling = CouplingMatrix::from_pairs(s12, s13, s14, s23, s24, s34);
    }

    /// 平行态电阻
    pub fn rp(&self) -> f64 {
        self.rp
    }

    /// 反平行态电阻
    pub fn rap(&self) -> f64 {
        self.rap
    }

    /// 读取电流密度
    pub fn jread(&self) -> f64 {
        self.jread
    }

    /// 耦合矩阵
    pub fn coupling(&self) -> &CouplingMatrix {
        &self.coupling
    }

    /// 归一化电阻 `r_i`
    pub fn normalized_resistance(&self) -> [f64; REGION_COUNT] {
        self.r
    }

    /// 由各区域平均 `m_x` 更新电阻，返回新的耦合激励
    ///
    /// `None` 或 NaN 表示该区域未使用，电阻置 0。
    pub fn update_output_resistance(&mut self, averages: [Option<f64>; REGION_COUNT]) -> Excitation {
        for (r, mx) in self.r.iter_mut().zip(averages) {
            *r = match mx {
                Some(mx) if !mx.is_nan() => -mx,
                _ => 0.0,
            };
        }
        trace!("oscillator resistance updated: {:?}", self.r);
        self.coupling_excitation()
    }

    /// 区域 `region`（从 0 计）的输出电阻 [Ohm]
    pub fn output_resistance(&self, region: usize) -> Result<f64, PhysicsError> {
        check_region(region)?;
        Ok(self.resistance_at(region))
    }

    /// 区域 `region`（从 0 计）的耦合电流密度 [A/m2]
    pub fn coupling_current(&self, region: usize) -> Result<f64, PhysicsError> {
        check_region(region)?;
        Ok(self.coupling_at(region))
    }

    /// 全部区域的耦合激励 `(0, 0, J_i)`
    pub fn coupling_excitation(&self) -> Excitation {
        let mut excitation = [[0.0; 3]; REGION_COUNT];
        for (i, e) in excitation.iter_mut().enumerate() {
            e[2] = self.coupling_at(i);
        }
        excitation
    }

    #[inline]
    pub(crate) fn resistance_at(&self, i: usize) -> f64 {
        (self.rap - self.rp) * self.r[i] / 2.0 + (self.rp + self.rap) / 2.0
    }

    #[inline]
    pub(crate) fn coupling_at(&self, region: usize) -> f64 {
        let half_swing = (self.rap - self.rp) / 2.0;
        let signal: f64 = self
            .r
            .iter()
            .zip(self.coupling.row(region))
            .map(|(r, g)| half_swing * r * g)
            .sum();
        signal * self.jread
    }
}

fn check_region(region: usize) -> Result<(), PhysicsError> {
    if region >= REGION_COUNT {
        return Err(PhysicsError::RegionOutOfRange {
            region,
            count: REGION_COUNT,
        });
    }
    Ok(())
}

/// 元素 `index` 所属区域：`index * REGION_COUNT / len`
///
/// `len` 不是 [`REGION_COUNT`] 的倍数时，各区域元素数相差不超过 1。
#[inline]
pub fn region_of(index: usize, len: usize) -> usize {
    (index % len) * REGION_COUNT / len
}

/// 按 [`region_of`] 划分缓冲区并求各区域平均值
///
/// 没有元素的区域返回 `None`。
pub fn region_averages<T>(values: &[T]) -> [Option<f64>; REGION_COUNT]
where
    T: Copy + Into<f64>,
{
    let len = values.len();
    let mut sums = [0.0; REGION_COUNT];
    let mut counts = [0usize; REGION_COUNT];
    for (i, &v) in values.iter().enumerate() {
        let region = region_of(i, len);
        sums[region] += v.into();
        counts[region] += 1;
    }

    let mut averages = [None; REGION_COUNT];
    for ((avg, sum), count) in averages.iter_mut().zip(sums).zip(counts) {
        if count > 0 {
            *avg = Some(sum / count as f64);
        }
    }
    averages
}
