use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;
use structopt::StructOpt;

use coreclash::{
    config::MAX_WARRIORS,
    core::{BattleStatus, Core, UserWish},
    load_file::Warrior,
    parser,
    ui::{BattleUi, ConsoleUi, TermUi},
    SimConfig,
};

#[derive(Debug, StructOpt)]
#[structopt(rename_all = "kebab")]
/// Assemble warrior programmes and battle them in a circular core
struct Options {
    /// Use the command-line interface (no terminal UI); print textual results
    #[structopt(short = "c")]
    console: bool,

    /// Dump assembled programmes to stdout and exit
    #[structopt(short = "d")]
    dump: bool,

    /// Run the terminal UI with more frequent redraws
    #[structopt(short = "f")]
    full_screen: bool,

    /// Allow only a single task per programme
    #[structopt(short = "s")]
    single_task: bool,

    /// The size of the core. Defaults to 8,000.
    #[structopt(long)]
    core_size: Option<i32>,

    /// The maximum number of cycles per battle. Defaults to 100,000.
    #[structopt(long)]
    max_cycles: Option<i32>,

    /// The maximum number of instructions per programme. Defaults to 1,000.
    #[structopt(long)]
    max_insns: Option<i32>,

    /// The maximum number of tasks per programme. Defaults to 4,000.
    #[structopt(long)]
    max_tasks: Option<i32>,

    /// How many battles to run in non-interactive mode. Defaults to 10.
    #[structopt(long)]
    battles: Option<u32>,

    /// Seed for the load-placement RNG; random if omitted
    #[structopt(long)]
    seed: Option<u64>,

    /// Warrior source files (one or two)
    #[structopt(parse(from_os_str))]
    files: Vec<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let options = Options::from_args();

    if options.files.is_empty() {
        bail!("no warrior programme specified");
    }
    if options.files.len() > MAX_WARRIORS {
        bail!("at most {} warrior programmes can battle", MAX_WARRIORS);
    }

    let mut config = SimConfig::default();
    if let Some(core_size) = options.core_size {
        config.core_size = core_size;
    }
    if let Some(max_cycles) = options.max_cycles {
        config.max_cycles = max_cycles;
    }
    if let Some(max_insns) = options.max_insns {
        config.max_prog_insns = max_insns;
    }
    if let Some(max_tasks) = options.max_tasks {
        config.max_prog_tasks = max_tasks;
    }
    if let Some(battles) = options.battles {
        config.battles = battles;
    }
    if options.single_task {
        config.max_prog_tasks = 1;
    }

    let warriors = options
        .files
        .iter()
        .enumerate()
        .map(|(i, path)| assemble_warrior(path, i as u8 + 1, &config))
        .collect::<Result<Vec<Warrior>>>()?;

    if options.dump {
        for warrior in &warriors {
            println!("{}\n", warrior);
        }
        return Ok(());
    }

    let mut core = Core::new(config.clone())?;

    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut ui: Box<dyn BattleUi> = if options.console {
        println!("Battle Results:");
        Box::new(ConsoleUi::new(config.battles))
    } else {
        Box::new(TermUi::new(options.full_screen)?)
    };

    let mut wish = UserWish::Reload;
    while wish == UserWish::Reload {
        core.load_warriors(&warriors, &mut rng)?;

        wish = ui.start_battle(&core, &warriors);
        if wish != UserWish::Continue {
            continue;
        }

        let outcome = core.run(ui.as_mut());
        debug!(
            "battle over after {} steps: {}",
            core.steps_taken(),
            outcome.status
        );

        wish = match (outcome.wish, outcome.status) {
            (UserWish::Quit, _) => UserWish::Quit,
            // A mid-battle reload was the user's explicit choice; skip
            // the results screen.
            (answer, BattleStatus::UserInterrupted) => answer,
            _ => ui.finish_battle(&core, &warriors, outcome.status, outcome.end_warrior),
        };
    }

    drop(ui);

    if options.console {
        println!("\nFinal Scores:");
        for (i, warrior) in warriors.iter().enumerate() {
            println!("    \"{}\" - {}", warrior.name, core.scores()[i]);
        }
    }

    Ok(())
}

/// Read and assemble one warrior file, printing its diagnostics to
/// stderr on failure.
fn assemble_warrior(path: &Path, id: u8, config: &SimConfig) -> Result<Warrior> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("could not open file {}", path.display()))?;

    parser::assemble(&source, &path.to_string_lossy(), id, config).map_err(|diagnostics| {
        for diagnostic in &diagnostics {
            eprintln!("{}", diagnostic);
        }
        anyhow::anyhow!(
            "assembly of {} failed with {} error{}",
            path.display(),
            diagnostics.len(),
            if diagnostics.len() == 1 { "" } else { "s" },
        )
    })
}
