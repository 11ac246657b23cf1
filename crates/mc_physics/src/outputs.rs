// crates/mc_physics/src/outputs.rs

//! 标量输出表
//!
//! 每个输出量是振荡器状态的纯函数，按名称查找，用于表格输出。

use crate::error::PhysicsError;
use crate::oscillator::OscillatorState;

/// 标量输出量
#[derive(Clone, Copy)]
pub struct ScalarOutput {
    /// 名称
    pub name: &'static str,
    /// 单位
    pub unit: &'static str,
    /// 描述
    pub description: &'static str,
    eval: fn(&OscillatorState) -> f64,
}

impl ScalarOutput {
    /// 在给定状态上求值
    #[inline]
    pub fn eval(&self, state: &OscillatorState) -> f64 {
        (self.eval)(state)
    }
}

impl std::fmt::Debug for ScalarOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScalarOutput")
            .field("name", &self.name)
            .field("unit", &self.unit)
            .finish()
    }
}

fn rout1(s: &OscillatorState) -> f64 { s.resistance_at(0) }
fn rout2(s: &OscillatorState) -> f64 { s.resistance_at(1) }
fn rout3(s: &OscillatorState) -> f64 { s.resistance_at(2) }
fn rout4(s: &OscillatorState) -> f64 { s.resistance_at(3) }
fn jcpl1(s: &OscillatorState) -> f64 { s.coupling_at(0) }
fn jcpl2(s: &OscillatorState) -> f64 { s.coupling_at(1) }
fn jcpl3(s: &OscillatorState) -> f64 { s.coupling_at(2) }
fn jcpl4(s: &OscillatorState) -> f64 { s.coupling_at(3) }

const fn output(
    name: &'static str,
    unit: &'static str,
    description: &'static str,
    eval: fn(&OscillatorState) -> f64,
) -> ScalarOutput {
    ScalarOutput { name, unit, description, eval }
}

/// 全部输出量
pub static OUTPUTS: [ScalarOutput; 8] = [
    output("Rout1", "Ohm", "SHNO 1 resistance", rout1),
    output("Rout2", "Ohm", "SHNO 2 resistance", rout2),
    output("Rout3", "Ohm", "SHNO 3 resistance", rout3),
    output("Rout4", "Ohm", "SHNO 4 resistance", rout4),
    output("Jcpl1", "A/m2", "SHNO 1 coupling current density", jcpl1),
    output("Jcpl2", "A/m2", "SHNO 2 coupling current density", jcpl2),
    output("Jcpl3", "A/m2", "SHNO 3 coupling current density", jcpl3),
    output("Jcpl4", "A/m2", "SHNO 4 coupling current density", jcpl4),
];

/// 按名称查找输出量
pub fn lookup(name: &str) -> Result<&'static ScalarOutput, PhysicsError> {
    OUTPUTS
        .iter()
        .find(|o| o.name == name)
        .ok_or_else(|| PhysicsError::UnknownQuantity(name.to_string()))
}

/// 对全部输出量求值
pub fn evaluate_all(state: &OscillatorState) -> Vec<(&'static str, f64)> {
    OUTPUTS.iter().map(|o| (o.name, o.eval(state))).collect()
}

/// 表头，形如 `Rout1 (Ohm)\tRout2 (Ohm)...`
pub fn table_header(outputs: &[&ScalarOutput]) -> String {
    outputs
        .iter()
        .map(|o| format!("{} ({})", o.name, o.unit))
        .collect::<Vec<_>>()
        .join("\t")
}

/// 一行表格数据
pub fn table_row(outputs: &[&ScalarOutput], state: &OscillatorState) -> String {
    outputs
        .iter()
        .map(|o| format!("{:e}", o.eval(state)))
        .collect::<Vec<_>>()
        .join("\t")
}
