//! The data model for assembled warrior programmes: instruction cells,
//! opcodes, addressing modes, and the [`Warrior`] record produced by the
//! assembler and consumed by the core.

use std::fmt;

use itertools::Itertools;

mod addr;

pub use addr::Addr;

/// The identifier of a warrior. `0` means "no warrior": a cell whose
/// marker is 0 has never been written by any programme.
pub type WarriorId = u8;

/// An instruction operation code.
///
/// `Dat` is the zero/default variant, and `AddrMode::Immediate` likewise,
/// so that a zeroed cell reads back as `DAT #0`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[repr(u8)]
pub enum Opcode {
    #[default]
    Dat = 0,
    Mov,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Jmp,
    Jmz,
    Jmn,
    Skl,
    Ske,
    Skn,
    Skg,
    Spl,
}

impl Opcode {
    /// How many operands the opcode carries in source and dump form.
    /// One-operand instructions use only the B operand.
    #[must_use]
    pub fn num_operands(self) -> usize {
        match self {
            Opcode::Dat | Opcode::Jmp | Opcode::Spl => 1,
            _ => 2,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic = match self {
            Opcode::Dat => "DAT",
            Opcode::Mov => "MOV",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Mod => "MOD",
            Opcode::Jmp => "JMP",
            Opcode::Jmz => "JMZ",
            Opcode::Jmn => "JMN",
            Opcode::Skl => "SKL",
            Opcode::Ske => "SKE",
            Opcode::Skn => "SKN",
            Opcode::Skg => "SKG",
            Opcode::Spl => "SPL",
        };
        f.write_str(mnemonic)
    }
}

/// An operand addressing mode.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[repr(u8)]
pub enum AddrMode {
    /// `#`: the operand field itself is the value.
    #[default]
    Immediate = 0,
    /// `$`: the operand is an offset from the instruction.
    Direct,
    /// `@`: the operand points at a cell whose B field is the offset.
    Indirect,
}

impl fmt::Display for AddrMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self {
            AddrMode::Immediate => "#",
            AddrMode::Direct => "$",
            AddrMode::Indirect => "@",
        };
        f.write_str(marker)
    }
}

/// One simulated instruction word.
///
/// Operands always hold values in `[0, core_size)`; negative source
/// operands are reduced by the assembler before they are stored.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Cell {
    /// The id of the last warrior to write this cell.
    pub marker: WarriorId,
    pub op_code: Opcode,
    pub mode_a: AddrMode,
    pub mode_b: AddrMode,
    pub op_a: u16,
    pub op_b: u16,
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op_code.num_operands() {
            1 => write!(f, "{} {}{}", self.op_code, self.mode_b, self.op_b),
            _ => write!(
                f,
                "{} {}{}, {}{}",
                self.op_code, self.mode_a, self.op_a, self.mode_b, self.op_b
            ),
        }
    }
}

/// An assembled warrior programme.
///
/// Assembly fills in everything here; the battle-time state (task ring,
/// alive flag, score) lives with the core, which is reloaded per battle.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Warrior {
    /// 1-based warrior id, also stamped into every cell it writes.
    pub id: WarriorId,
    /// The warrior's name. Never empty: the assembler fills in
    /// `Warrior<id>` when the source has no NAM directive.
    pub name: String,
    pub version: Option<String>,
    pub author: Option<String>,
    /// The assembled instructions, programme-relative.
    pub insns: Vec<Cell>,
    /// The programme-relative offset execution starts at.
    pub init_pc: u16,
}

impl Warrior {
    /// The number of assembled instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.insns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }
}

/// The loader's view of a programme, suitable for `-d` output: header
/// comments, a `START:` marker on the initial instruction, and one row
/// per instruction with its programme-relative offset.
impl fmt::Display for Warrior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, ";")?;
        writeln!(f, "; Name:    {}", self.name)?;
        if let Some(version) = &self.version {
            writeln!(f, "; Version: {}", version)?;
        }
        if let Some(author) = &self.author {
            writeln!(f, "; Author:  {}", author)?;
        }
        writeln!(f, ";")?;

        let mut rows = self.insns.iter().enumerate().map(|(i, insn)| {
            let row = format!("  {:<20} ; {}", insn.to_string(), i);
            if i == self.init_pc as usize {
                format!("START:\n{}", row)
            } else {
                row
            }
        });
        write!(f, "{}", rows.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn default_cell_is_dat_0() {
        let cell = Cell::default();
        assert_eq!(cell.op_code, Opcode::Dat);
        assert_eq!(cell.mode_b, AddrMode::Immediate);
        assert_eq!(cell.to_string(), "DAT #0");
    }

    #[test]
    fn display_cell() {
        let cell = Cell {
            marker: 1,
            op_code: Opcode::Mov,
            mode_a: AddrMode::Direct,
            mode_b: AddrMode::Indirect,
            op_a: 0,
            op_b: 7999,
        };
        assert_eq!(cell.to_string(), "MOV $0, @7999");

        let cell = Cell {
            op_code: Opcode::Jmp,
            mode_b: AddrMode::Direct,
            op_b: 2,
            ..Cell::default()
        };
        assert_eq!(cell.to_string(), "JMP $2");
    }

    #[test]
    fn dump_warrior() {
        let warrior = Warrior {
            id: 1,
            name: "imp".into(),
            version: Some("1.0".into()),
            author: None,
            insns: vec![
                Cell {
                    op_code: Opcode::Mov,
                    mode_a: AddrMode::Direct,
                    mode_b: AddrMode::Direct,
                    op_a: 0,
                    op_b: 1,
                    ..Cell::default()
                },
                Cell {
                    op_code: Opcode::Jmp,
                    mode_b: AddrMode::Direct,
                    op_b: 7999,
                    ..Cell::default()
                },
            ],
            init_pc: 0,
        };

        let expected = "\
;
; Name:    imp
; Version: 1.0
;
START:
  MOV $0, $1           ; 0
  JMP $7999            ; 1";

        assert_eq!(warrior.to_string(), expected);
    }
}
