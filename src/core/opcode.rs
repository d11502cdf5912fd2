//! Opcode-specific logic run during a simulation step.
//!
//! Everything here uses B-field semantics: the value of a source operand
//! is its cell's B field, arithmetic writes into the destination's B
//! field, and MOV copies the whole cell. Every write into the core also
//! stamps the cell with the executing warrior's id.

use crate::config::SimConfig;
use crate::load_file::{Addr, AddrMode, Cell, Opcode, WarriorId};

use super::task::TaskRing;

/// What a single executed instruction did.
#[derive(Debug)]
pub(crate) struct Executed {
    /// The core address the instruction wrote, if it wrote one.
    pub modified: Option<Addr>,
    /// Whether the executing task was killed (DAT, or division by zero).
    pub task_killed: bool,
}

/// A fetched operand: a live core cell, or the ephemeral cell
/// synthesised for immediate mode. Writes to the latter are discarded.
enum Operand {
    Core(usize),
    Immediate(u16),
}

impl Operand {
    /// The operand's B field value.
    fn b_value(&self, cells: &[Cell]) -> u16 {
        match self {
            Operand::Core(index) => cells[*index].op_b,
            Operand::Immediate(value) => *value,
        }
    }

    /// The operand as a whole cell, for MOV.
    fn as_cell(&self, cells: &[Cell]) -> Cell {
        match self {
            Operand::Core(index) => cells[*index],
            Operand::Immediate(value) => Cell {
                op_b: *value,
                ..Cell::default()
            },
        }
    }
}

/// Resolve one operand of the instruction at `pc`, returning it together
/// with the address it names.
fn fetch(cells: &[Cell], mode: AddrMode, op: u16, pc: Addr, core_size: i32) -> (Operand, Addr) {
    match mode {
        AddrMode::Immediate => (Operand::Immediate(op), Addr::new(i32::from(op), core_size)),
        AddrMode::Direct => {
            let addr = pc + i32::from(op);
            (Operand::Core(addr.index()), addr)
        }
        AddrMode::Indirect => {
            let pointer = pc + i32::from(op);
            let addr = pointer + i32::from(cells[pointer.index()].op_b);
            (Operand::Core(addr.index()), addr)
        }
    }
}

/// Execute the current task's instruction for `warrior`, updating the
/// core, the task ring, and the task's PC.
pub(crate) fn execute(
    cells: &mut [Cell],
    tasks: &mut TaskRing,
    warrior: WarriorId,
    config: &SimConfig,
) -> Executed {
    let core_size = config.core_size;
    let pc = Addr::new(i32::from(tasks.pc()), core_size);
    let cell = cells[pc.index()];

    let mut modified = None;

    match cell.op_code {
        Opcode::Dat => {
            tasks.kill_current();
            return Executed {
                modified: None,
                task_killed: true,
            };
        }

        Opcode::Mov => {
            let (src, _) = fetch(cells, cell.mode_a, cell.op_a, pc, core_size);
            let (dst, addr_b) = fetch(cells, cell.mode_b, cell.op_b, pc, core_size);

            let value = src.as_cell(cells);
            if let Operand::Core(index) = dst {
                cells[index] = value;
                cells[index].marker = warrior;
                modified = Some(addr_b);
            }
            tasks.set_pc((pc + 1).cell());
        }

        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod => {
            let (src, _) = fetch(cells, cell.mode_a, cell.op_a, pc, core_size);
            let (dst, addr_b) = fetch(cells, cell.mode_b, cell.op_b, pc, core_size);

            let src_b = src.b_value(cells);
            let dst_b = dst.b_value(cells);

            if matches!(cell.op_code, Opcode::Div | Opcode::Mod) && src_b == 0 {
                // Division by zero is as fatal to the task as DAT.
                tasks.kill_current();
                return Executed {
                    modified: None,
                    task_killed: true,
                };
            }

            let result = match cell.op_code {
                Opcode::Add => Addr::new(i32::from(src_b) + i32::from(dst_b), core_size).cell(),
                Opcode::Sub => Addr::new(i32::from(dst_b) - i32::from(src_b), core_size).cell(),
                // A full-range product overflows 32 bits, so widen first.
                Opcode::Mul => {
                    (i64::from(src_b) * i64::from(dst_b)).rem_euclid(i64::from(core_size)) as u16
                }
                Opcode::Div => dst_b / src_b,
                Opcode::Mod => dst_b % src_b,
                _ => unreachable!(),
            };

            if let Operand::Core(index) = dst {
                cells[index].op_b = result;
                cells[index].marker = warrior;
                modified = Some(addr_b);
            }
            tasks.set_pc((pc + 1).cell());
        }

        Opcode::Jmp => {
            let (_, addr_b) = fetch(cells, cell.mode_b, cell.op_b, pc, core_size);
            tasks.set_pc(addr_b.cell());
        }

        Opcode::Jmz | Opcode::Jmn => {
            let (src, _) = fetch(cells, cell.mode_a, cell.op_a, pc, core_size);
            let (_, addr_b) = fetch(cells, cell.mode_b, cell.op_b, pc, core_size);

            let src_b = src.b_value(cells);
            let jump = match cell.op_code {
                Opcode::Jmz => src_b == 0,
                _ => src_b != 0,
            };

            if jump {
                tasks.set_pc(addr_b.cell());
            } else {
                tasks.set_pc((pc + 1).cell());
            }
        }

        Opcode::Skl | Opcode::Ske | Opcode::Skn | Opcode::Skg => {
            let (src, _) = fetch(cells, cell.mode_a, cell.op_a, pc, core_size);
            let val_a = src.b_value(cells);

            let (dst, _) = fetch(cells, cell.mode_b, cell.op_b, pc, core_size);
            let val_b = dst.b_value(cells);

            let skip = match cell.op_code {
                Opcode::Skl => val_a < val_b,
                Opcode::Ske => val_a == val_b,
                Opcode::Skn => val_a != val_b,
                _ => val_a > val_b,
            };

            tasks.set_pc((pc + if skip { 2 } else { 1 }).cell());
        }

        Opcode::Spl => {
            let (_, addr_b) = fetch(cells, cell.mode_b, cell.op_b, pc, core_size);
            tasks.set_pc((pc + 1).cell());

            // A new task is spawned only if the warrior can afford one.
            // It lands after every task that already existed: the ring
            // cursor moves onto the new task, so the next advance
            // resumes with the originally-next task.
            if (tasks.len() as i32) < config.max_prog_tasks {
                tasks.spawn_after(addr_b.cell());
            }
        }
    }

    Executed {
        modified,
        task_killed: false,
    }
}
