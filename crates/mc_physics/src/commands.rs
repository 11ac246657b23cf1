// crates/mc_physics/src/commands.rs

//! 振荡器命令表
//!
//! 按名称分发参数设置命令，并检查参数个数。支持 `Name(a, b, ...)` 文本形式。

use std::str::FromStr;

use log::debug;

use crate::error::PhysicsError;
use crate::oscillator::OscillatorState;

/// 命令描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    /// 命令名
    pub name: &'static str,
    /// 参数个数
    pub arity: usize,
    /// 描述
    pub description: &'static str,
}

/// 全部命令
pub const COMMANDS: [CommandSpec; 3] = [
    CommandSpec {
        name: "SetOutputResistance",
        arity: 2,
        description: "Set MTJ P/AP resistance",
    },
    CommandSpec {
        name: "SetJread",
        arity: 1,
        description: "Set MTJ read current density",
    },
    CommandSpec {
        name: "SetCoupling",
        arity: 6,
        description: "Set coupling conductances between 4 SHNOs",
    },
];

/// 振荡器命令
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// 设置平行/反平行电阻
    SetOutputResistance {
        /// 平行态电阻 [Ohm]
        rp: f64,
        /// 反平行态电阻 [Ohm]
        rap: f64,
    },
    /// 设置读取电流密度
    SetJread {
        /// 读取电流密度 [A/m2]
        jread: f64,
    },
    /// 设置耦合电导 `[s12, s13, s14, s23, s24, s34]`
    SetCoupling([f64; 6]),
}

impl Command {
    /// 按名称与参数构造命令
    pub fn new(name: &str, args: &[f64]) -> Result<Self, PhysicsError> {
        let spec = COMMANDS
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| PhysicsError::UnknownCommand(name.to_string()))?;
        if args.len() != spec.arity {
            return Err(PhysicsError::Arity {
                command: spec.name,
                expected: spec.arity,
                got: args.len(),
            });
        }

        Ok(match spec.name {
            "SetOutputResistance" => Self::SetOutputResistance {
                rp: args[0],
                rap: args[1],
            },
            "SetJread" => Self::SetJread { jread: args[0] },
            _ => Self::SetCoupling([args[0], args[1], args[2], args[3], args[4], args[5]]),
        })
    }

    /// 命令名
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetOutputResistance { .. } => "SetOutputResistance",
            Self::SetJread { .. } => "SetJread",
            Self::SetCoupling(_) => "SetCoupling",
        }
    }

    /// 作用于振荡器状态
    pub fn apply(&self, state: &mut OscillatorState) {
        debug!("apply {:?}", self);
        match *self {
            Self::SetOutputResistance { rp, rap } => state.set_output_resistance(rp, rap),
            Self::SetJread { jread } => state.set_read_current(jread),
            Self::SetCoupling([s12, s13, s14, s23, s24, s34]) => {
                state.set_coupling(s12, s13, s14, s23, s24, s34)
            }
        }
    }
}

impl FromStr for Command {
    type Err = PhysicsError;

    /// 解析 `Name(a, b, ...)`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let syntax = || PhysicsError::Syntax(s.to_string());
        let text = s.trim();
        let (name, rest) = text.split_once('(').ok_or_else(syntax)?;
        let body = rest.strip_suffix(')').ok_or_else(syntax)?;

        let args = if body.trim().is_empty() {
            Vec::new()
        } else {
            body.split(',')
                .map(|a| a.trim().parse::<f64>().map_err(|_| syntax()))
                .collect::<Result<Vec<_>, _>>()?
        };
        Self::new(name.trim(), &args)
    }
}

/// 按名称分发命令
pub fn dispatch(state: &mut OscillatorState, name: &str, args: &[f64]) -> Result<(), PhysicsError> {
    Command::new(name, args)?.apply(state);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_sets_state() {
        let mut state = OscillatorState::new();
        dispatch(&mut state, "SetOutputResistance", &[100.0, 250.0]).unwrap();
        dispatch(&mut state, "SetJread", &[3e10]).unwrap();
        dispatch(&mut state, "SetCoupling", &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();

        assert_eq!(state.rp(), 100.0);
        assert_eq!(state.rap(), 250.0);
        assert_eq!(state.jread(), 3e10);
        assert_eq!(state.coupling().get(2, 1), 4.0);
    }

    #[test]
    fn test_arity_checked() {
        let mut state = OscillatorState::new();
        let err = dispatch(&mut state, "SetCoupling", &[1.0, 2.0]).unwrap_err();
        assert_eq!(
            err,
            PhysicsError::Arity {
                command: "SetCoupling",
                expected: 6,
                got: 2
            }
        );
        assert_eq!(state, OscillatorState::new());
    }

    #[test]
    fn test_unknown_command() {
        assert!(matches!(
            Command::new("SetTemperature", &[300.0]),
            Err(PhysicsError::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_parse_text_form() {
        let cmd: Command = "SetOutputResistance(100, 2.5e2)".parse().unwrap();
        assert_eq!(cmd, Command::SetOutputResistance { rp: 100.0, rap: 250.0 });
        assert_eq!(cmd.name(), "SetOutputResistance");

        let cmd: Command = " SetJread( 1e10 ) ".parse().unwrap();
        assert_eq!(cmd, Command::SetJread { jread: 1e10 });

        assert!(matches!("SetJread 1e10".parse::<Command>(), Err(PhysicsError::Syntax(_))));
        assert!(matches!("SetJread(abc)".parse::<Command>(), Err(PhysicsError::Syntax(_))));
        assert!(matches!("SetJread()".parse::<Command>(), Err(PhysicsError::Arity { .. })));
    }
}
