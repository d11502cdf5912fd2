//! The visualiser contract and its console implementation.
//!
//! The engine knows nothing about presentation: it is handed a
//! [`BattleUi`] value and polls it between instructions with a read-only
//! view of the core. Implementations may block (pausing the battle) and
//! answer with the user's wish.

use crate::core::{BattleStatus, Core, UserWish};
use crate::load_file::Warrior;

mod term;

pub use term::TermUi;

/// The three calls a battle makes to its user interface.
pub trait BattleUi {
    /// Called once per battle, after loading but before the first
    /// instruction. May block.
    fn start_battle(&mut self, core: &Core, warriors: &[Warrior]) -> UserWish;

    /// Called between instructions, after the engine has advanced to
    /// `current`, the warrior about to execute. `modified` is the core
    /// address written by the last instruction, if it wrote one.
    fn update_battle(
        &mut self,
        core: &Core,
        current: usize,
        modified: Option<u16>,
        cycles: i32,
    ) -> UserWish;

    /// Called when the battle is over; blocks to present the result.
    /// Answers whether to reload for another battle or quit.
    fn finish_battle(
        &mut self,
        core: &Core,
        warriors: &[Warrior],
        status: BattleStatus,
        end_warrior: usize,
    ) -> UserWish;
}

/// The non-interactive interface: never interferes with a battle, prints
/// one result line per battle, and quits after a fixed number of them.
pub struct ConsoleUi {
    battles: u32,
    battles_run: u32,
}

impl ConsoleUi {
    #[must_use]
    pub fn new(battles: u32) -> Self {
        Self {
            battles,
            battles_run: 0,
        }
    }
}

impl BattleUi for ConsoleUi {
    fn start_battle(&mut self, _core: &Core, _warriors: &[Warrior]) -> UserWish {
        UserWish::Continue
    }

    fn update_battle(
        &mut self,
        _core: &Core,
        _current: usize,
        _modified: Option<u16>,
        _cycles: i32,
    ) -> UserWish {
        UserWish::Continue
    }

    fn finish_battle(
        &mut self,
        _core: &Core,
        warriors: &[Warrior],
        status: BattleStatus,
        _end_warrior: usize,
    ) -> UserWish {
        print!("{:>4}. ", self.battles_run);
        match status {
            BattleStatus::WarriorKilled(id) => {
                match warriors.iter().find(|w| w.id == id) {
                    Some(warrior) => println!("\"{}\" was killed.", warrior.name),
                    None => println!("warrior {} was killed.", id),
                }
            }
            BattleStatus::CyclesExhausted => println!("Timed out."),
            BattleStatus::UserInterrupted => println!("User interrupted."),
            BattleStatus::EngineFault => eprintln!("** Internal Error **"),
        }

        self.battles_run += 1;
        if self.battles_run >= self.battles {
            UserWish::Quit
        } else {
            UserWish::Reload
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::parser;
    use crate::SimConfig;

    use super::*;

    #[test]
    fn console_ui_counts_battles() {
        let config = SimConfig::default();
        let warrior = parser::assemble("DAT #0\n", "w.cw", 1, &config).unwrap();
        let mut core = Core::new(config).unwrap();
        core.reset();
        core.load_warrior_at(&warrior, 0).unwrap();

        let mut ui = ConsoleUi::new(2);
        assert_eq!(ui.start_battle(&core, &[warrior.clone()]), UserWish::Continue);
        assert_eq!(ui.update_battle(&core, 0, None, 1), UserWish::Continue);

        let status = BattleStatus::WarriorKilled(1);
        assert_eq!(
            ui.finish_battle(&core, &[warrior.clone()], status, 0),
            UserWish::Reload
        );
        assert_eq!(
            ui.finish_battle(&core, &[warrior], status, 0),
            UserWish::Quit
        );
    }
}
