//! Tunable simulation parameters, shared by the assembler (which exposes
//! them to programmes as predefined symbols) and the battle engine.

/// The maximum number of warriors that can battle in one core.
pub const MAX_WARRIORS: usize = 2;

/// The maximum number of characters allowed on a source line.
pub const MAX_LINE_LEN: usize = 255;

/// The maximum number of characters in an identifier or string.
pub const MAX_STR_IDENT_LEN: usize = 127;

/// The maximum number of decimal digits in a number.
pub const MAX_NUMBER_LEN: usize = 5;

const DEFAULT_CORE_SIZE: i32 = 8_000;
const DEFAULT_MAX_CYCLES: i32 = 100_000;
const DEFAULT_MAX_PROG_INSNS: i32 = 1_000;
const DEFAULT_MAX_PROG_TASKS: i32 = 4_000;
const DEFAULT_MIN_SEPARATION: i32 = 1_000;
const DEFAULT_BATTLES: u32 = 10;

/// Configuration for a simulation run.
#[derive(Clone, Debug)]
pub struct SimConfig {
    /// The number of cells in the core.
    pub core_size: i32,
    /// The maximum number of cycles to run a battle for.
    pub max_cycles: i32,
    /// The maximum number of instructions in an assembled programme.
    pub max_prog_insns: i32,
    /// The maximum number of tasks a single programme may run.
    pub max_prog_tasks: i32,
    /// The minimum number of cells separating two loaded programmes.
    pub min_separation: i32,
    /// How many battles to run in non-interactive mode.
    pub battles: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            core_size: DEFAULT_CORE_SIZE,
            max_cycles: DEFAULT_MAX_CYCLES,
            max_prog_insns: DEFAULT_MAX_PROG_INSNS,
            max_prog_tasks: DEFAULT_MAX_PROG_TASKS,
            min_separation: DEFAULT_MIN_SEPARATION,
            battles: DEFAULT_BATTLES,
        }
    }
}
