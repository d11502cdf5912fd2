//! The core: a ring of instruction cells in which loaded warriors battle.
//!
//! The [`Core`] owns the cells, the per-warrior runtime state, and the
//! accumulated scores. It is allocated once and reloaded per battle; a
//! load zeroes every cell (leaving the whole ring reading as `DAT #0`)
//! and rebuilds each warrior's task ring.

use std::fmt;

use log::trace;
use rand::Rng;
use thiserror::Error as ThisError;

use crate::config::{SimConfig, MAX_WARRIORS};
use crate::load_file::{Addr, Cell, Warrior, WarriorId};
use crate::ui::BattleUi;

mod opcode;
mod task;

pub use task::TaskRing;

/// An error creating a core or loading warriors into it.
#[derive(ThisError, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The configured core size cannot be addressed by a 16-bit operand.
    #[error("cannot create a core with size {0}; must be in 1..={}", u16::MAX)]
    InvalidCoreSize(i32),

    /// The warrior has more instructions than a programme may carry.
    #[error("warrior has too many instructions")]
    WarriorTooLong,

    /// No warriors were given to load.
    #[error("no warriors to load")]
    NoWarriors,

    /// More warriors than the core supports.
    #[error("cannot load more than {} warriors", MAX_WARRIORS)]
    TooManyWarriors,

    /// The core cannot hold this many warriors at the required spacing.
    #[error("a core of size {0} cannot separate {1} warriors")]
    CoreTooSmall(i32, usize),
}

/// A command from the user, relayed by the visualiser.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UserWish {
    Continue,
    Reload,
    Quit,
}

/// How a battle ended.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BattleStatus {
    /// The named warrior lost its last task.
    WarriorKilled(WarriorId),
    /// The cycle cap was reached with more than one survivor.
    CyclesExhausted,
    /// The visualiser asked to stop mid-battle.
    UserInterrupted,
    /// The engine detected a broken task ring.
    EngineFault,
}

impl fmt::Display for BattleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BattleStatus::WarriorKilled(id) => write!(f, "warrior {} was killed", id),
            BattleStatus::CyclesExhausted => write!(f, "timed out"),
            BattleStatus::UserInterrupted => write!(f, "user interrupted"),
            BattleStatus::EngineFault => write!(f, "internal error"),
        }
    }
}

/// The result of one battle.
#[derive(Debug)]
pub struct BattleOutcome {
    pub status: BattleStatus,
    /// Index of the warrior whose instruction the battle ended on.
    pub end_warrior: usize,
    /// What the driver should do next.
    pub wish: UserWish,
}

/// The battle-time state of one loaded warrior.
#[derive(Debug)]
pub struct Fighter {
    id: WarriorId,
    alive: bool,
    tasks: TaskRing,
}

impl Fighter {
    #[must_use]
    pub fn id(&self) -> WarriorId {
        self.id
    }

    #[must_use]
    pub fn alive(&self) -> bool {
        self.alive
    }

    /// The number of live tasks.
    #[must_use]
    pub fn task_count(&self) -> u32 {
        self.tasks.len()
    }

    /// The core address this warrior executes next (or died at).
    #[must_use]
    pub fn current_pc(&self) -> u16 {
        self.tasks.pc()
    }
}

/// The full simulated memory at a given point in time.
pub struct Core {
    config: SimConfig,
    cells: Box<[Cell]>,
    fighters: Vec<Fighter>,
    scores: Vec<u32>,
    steps_taken: i32,
}

impl Core {
    /// Create an empty core for the given configuration.
    pub fn new(config: SimConfig) -> Result<Self, Error> {
        if config.core_size < 1 || config.core_size > i32::from(u16::MAX) {
            return Err(Error::InvalidCoreSize(config.core_size));
        }

        Ok(Self {
            cells: vec![Cell::default(); config.core_size as usize].into_boxed_slice(),
            config,
            fighters: Vec::new(),
            scores: Vec::new(),
            steps_taken: 0,
        })
    }

    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The number of cells in the core.
    #[must_use]
    pub fn len(&self) -> i32 {
        self.config.core_size
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Instructions executed so far in the current battle.
    #[must_use]
    pub fn steps_taken(&self) -> i32 {
        self.steps_taken
    }

    #[must_use]
    pub fn fighters(&self) -> &[Fighter] {
        &self.fighters
    }

    /// Scores accumulated across battles, indexed by load order.
    #[must_use]
    pub fn scores(&self) -> &[u32] {
        &self.scores
    }

    fn addr(&self, value: i32) -> Addr {
        Addr::new(value, self.config.core_size)
    }

    /// The cell at `index`, reduced into the ring.
    #[must_use]
    pub fn get(&self, index: i32) -> &Cell {
        &self.cells[self.addr(index).index()]
    }

    /// Zero every cell and drop all fighters, leaving the whole ring
    /// reading as `DAT #0`. Scores survive a reset.
    pub fn reset(&mut self) {
        self.cells.fill(Cell::default());
        self.fighters.clear();
        self.steps_taken = 0;
    }

    /// Place one warrior at a fixed base address and give it a single
    /// task at `base + init_pc`. Deterministic counterpart of
    /// [`Self::load_warriors`]; callers wanting a fixed layout use this
    /// directly after [`Self::reset`].
    pub fn load_warrior_at(&mut self, warrior: &Warrior, base: i32) -> Result<(), Error> {
        if warrior.len() > self.config.max_prog_insns as usize {
            return Err(Error::WarriorTooLong);
        }
        if self.fighters.len() >= MAX_WARRIORS {
            return Err(Error::TooManyWarriors);
        }

        let base = self.addr(base);
        for (j, insn) in warrior.insns.iter().enumerate() {
            let mut cell = *insn;
            cell.marker = warrior.id;
            self.cells[(base + j as i32).index()] = cell;
        }

        let start = base + i32::from(warrior.init_pc);
        self.fighters.push(Fighter {
            id: warrior.id,
            alive: true,
            tasks: TaskRing::new(start.cell()),
        });

        if self.scores.len() < self.fighters.len() {
            self.scores.push(0);
        }

        trace!(
            "loaded warrior {} at {} ({} instructions, starting at {})",
            warrior.id,
            base,
            warrior.len(),
            start,
        );

        Ok(())
    }

    /// Load all warriors at randomised positions.
    ///
    /// Each warrior is placed a full programme's length past the
    /// previous one plus a random offset drawn from a range that shrinks
    /// with every placement, which keeps the programmes separated
    /// without ever overlapping.
    pub fn load_warriors<R: Rng>(
        &mut self,
        warriors: &[Warrior],
        rng: &mut R,
    ) -> Result<(), Error> {
        if warriors.is_empty() {
            return Err(Error::NoWarriors);
        }
        if warriors.len() > MAX_WARRIORS {
            return Err(Error::TooManyWarriors);
        }

        self.reset();

        let mut avail_range = self.config.core_size;
        let mut prev_base = 0;

        for warrior in warriors {
            if avail_range <= 0 {
                return Err(Error::CoreTooSmall(self.config.core_size, warriors.len()));
            }

            let base = self
                .addr(prev_base + self.config.max_prog_insns + rng.gen_range(0..avail_range))
                .value();

            prev_base = base;
            avail_range -= 2 * self.config.max_prog_insns;

            self.load_warrior_at(warrior, base)?;
        }

        Ok(())
    }

    /// Run one battle to its end.
    ///
    /// Warriors take turns executing one instruction of their current
    /// task; the visualiser is polled between instructions. The battle
    /// ends when at most one warrior is left alive, when the cycle cap
    /// is reached, or when the visualiser asks to stop.
    pub fn run(&mut self, ui: &mut dyn BattleUi) -> BattleOutcome {
        if self.fighters.is_empty() {
            return BattleOutcome {
                status: BattleStatus::EngineFault,
                end_warrior: 0,
                wish: UserWish::Quit,
            };
        }

        let mut wish = UserWish::Continue;
        let mut status = BattleStatus::CyclesExhausted;

        let mut alive = self.fighters.iter().filter(|f| f.alive).count();
        let mut curr = 0;
        let mut end_warrior = 0;
        self.steps_taken = 0;

        while self.steps_taken < self.config.max_cycles && wish == UserWish::Continue {
            let mut modified = None;

            if self.fighters[curr].alive {
                if !self.fighters[curr].tasks.is_coherent() {
                    // A broken ring would loop or skip tasks forever;
                    // give up on the whole battle.
                    status = BattleStatus::EngineFault;
                    wish = UserWish::Quit;
                    break;
                }

                trace!(
                    "step {:>6}: w{} {:0>5} {}",
                    self.steps_taken,
                    self.fighters[curr].id,
                    self.fighters[curr].tasks.pc(),
                    self.get(i32::from(self.fighters[curr].tasks.pc())),
                );

                let executed = {
                    let Core {
                        cells,
                        fighters,
                        config,
                        ..
                    } = self;
                    let fighter = &mut fighters[curr];
                    opcode::execute(cells, &mut fighter.tasks, fighter.id, config)
                };

                modified = executed.modified;

                if executed.task_killed && self.fighters[curr].tasks.is_empty() {
                    self.fighters[curr].alive = false;
                    alive -= 1;
                    status = BattleStatus::WarriorKilled(self.fighters[curr].id);

                    // A lone warrior dying, or a battle down to a single
                    // survivor, ends the simulation.
                    if alive <= 1 {
                        wish = UserWish::Reload;
                    }
                }

                if wish == UserWish::Continue && self.fighters[curr].tasks.len() > 1 {
                    self.fighters[curr].tasks.advance();
                }
            }

            self.steps_taken += 1;
            end_warrior = curr;

            if wish == UserWish::Continue {
                // Pick the next living warrior, cyclically.
                loop {
                    curr = (curr + 1) % self.fighters.len();
                    if alive == 0 || self.fighters[curr].alive {
                        break;
                    }
                }

                // The visualiser sees the warrior that is *about to*
                // execute, together with the cell the previous
                // instruction wrote.
                let answer =
                    ui.update_battle(self, curr, modified.map(Addr::cell), self.steps_taken);
                if answer != UserWish::Continue {
                    wish = answer;
                    status = BattleStatus::UserInterrupted;
                }
            }
        }

        if self.steps_taken == self.config.max_cycles {
            status = BattleStatus::CyclesExhausted;
        }

        if status != BattleStatus::UserInterrupted && status != BattleStatus::EngineFault {
            self.update_scores();
        }

        BattleOutcome {
            status,
            end_warrior,
            wish,
        }
    }

    /// Award every survivor `(N² − 1) / S` points, `N` warriors loaded
    /// and `S` of them surviving.
    fn update_scores(&mut self) {
        let survivors = self.fighters.iter().filter(|f| f.alive).count() as u32;
        let loaded = self.fighters.len() as u32;

        let points = if survivors == 0 {
            0
        } else {
            (loaded * loaded - 1) / survivors
        };

        for (i, fighter) in self.fighters.iter().enumerate() {
            if fighter.alive {
                self.scores[i] += points;
            }
        }
    }
}

impl fmt::Debug for Core {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Core")
            .field("core_size", &self.config.core_size)
            .field("fighters", &self.fighters)
            .field("steps_taken", &self.steps_taken)
            .finish_non_exhaustive()
    }
}
