//! End-to-end battles over the public API, with deterministic placement.

use pretty_assertions::assert_eq;

use coreclash::core::{BattleStatus, Core, UserWish};
use coreclash::load_file::{AddrMode, Cell, Opcode, Warrior};
use coreclash::parser::{self, ErrorKind};
use coreclash::ui::ConsoleUi;
use coreclash::SimConfig;

fn assemble(source: &str, id: u8, config: &SimConfig) -> Warrior {
    parser::assemble(source, "warrior.cw", id, config).expect("assembly failed")
}

/// Load each warrior at a fixed base, in order.
fn core_with(config: SimConfig, warriors: &[(&Warrior, i32)]) -> Core {
    let mut core = Core::new(config).expect("bad config");
    core.reset();
    for (warrior, base) in warriors {
        core.load_warrior_at(warrior, *base).expect("load failed");
    }
    core
}

fn ui() -> ConsoleUi {
    ConsoleUi::new(1)
}

#[test]
fn lone_dat_dies_on_its_first_step() {
    let config = SimConfig::default();
    let warrior = assemble("DAT #0\n", 1, &config);

    assert_eq!(
        warrior.insns,
        vec![Cell {
            marker: 0,
            op_code: Opcode::Dat,
            mode_a: AddrMode::Immediate,
            mode_b: AddrMode::Immediate,
            op_a: 0,
            op_b: 0,
        }]
    );

    let mut core = core_with(config, &[(&warrior, 0)]);
    let outcome = core.run(&mut ui());

    assert_eq!(outcome.status, BattleStatus::WarriorKilled(1));
    assert_eq!(core.steps_taken(), 1);
    assert_eq!(core.scores(), &[0]);
}

#[test]
fn imp_clones_itself_across_the_core() {
    let cycles = 128;
    let config = SimConfig {
        max_cycles: cycles,
        ..SimConfig::default()
    };
    let warrior = assemble("ORG START\nSTART:\nMOV $0, $1\nJMP $-1\n", 1, &config);

    let mut core = core_with(config, &[(&warrior, 0)]);
    let outcome = core.run(&mut ui());

    assert_eq!(outcome.status, BattleStatus::CyclesExhausted);

    // Step k copies the MOV into cell k; every touched cell carries the
    // imp's marker.
    let stamped: Vec<i32> = (0..core.len()).filter(|&i| core.get(i).marker == 1).collect();
    assert_eq!(stamped, (0..=cycles).collect::<Vec<i32>>());
}

#[test]
fn spl_spawns_until_the_task_cap() {
    let config = SimConfig {
        max_cycles: 200,
        max_prog_tasks: 16,
        ..SimConfig::default()
    };
    let warrior = assemble("SPL $0\nJMP $0\n", 1, &config);

    let mut core = core_with(config, &[(&warrior, 0)]);
    core.run(&mut ui());

    let fighter = &core.fighters()[0];
    assert!(fighter.alive());
    assert_eq!(fighter.task_count(), 16);
}

#[test]
fn def_forward_reference_is_rejected() {
    let config = SimConfig::default();
    let err = parser::assemble("DEF FOO = BAR\nDEF BAR = 1\n", "w.cw", 1, &config)
        .expect_err("assembly succeeded");

    assert_eq!(err[0].kind, ErrorKind::DefinedTooLate);
    assert_eq!(err[0].line, 1);
}

#[test]
fn self_referencing_add_relocates_anywhere() {
    let config = SimConfig::default();
    let core_size = config.core_size;
    let warrior = assemble("ORG LAB\nLAB:\nADD #1, $LAB\n", 1, &config);

    assert_eq!(warrior.insns[0].op_a, 1);
    // The label is a whole loop away from its own cell.
    assert_eq!(warrior.insns[0].op_b, 0);

    // Wherever the programme lands, the operand points back at the
    // instruction's own cell.
    for base in [0, 37, core_size - 1] {
        let config = SimConfig {
            max_cycles: 1,
            ..config.clone()
        };
        let mut core = core_with(config, &[(&warrior, base)]);
        assert_eq!(i32::from(core.fighters()[0].current_pc()), base);

        let outcome = core.run(&mut ui());
        assert_eq!(outcome.status, BattleStatus::CyclesExhausted);
        assert_eq!(core.get(base).op_b, 1);
        assert_eq!(core.get(base).marker, 1);
    }
}

#[test]
fn imp_beats_a_sitting_dat() {
    let config = SimConfig::default();
    let imp = assemble("ORG START\nSTART:\nMOV $0, $1\nJMP $-1\n", 1, &config);
    let dat = assemble("DAT #0\n", 2, &config);

    let mut core = core_with(config, &[(&imp, 0), (&dat, 4000)]);
    let outcome = core.run(&mut ui());

    // Warrior 2's first step lands on its own DAT.
    assert_eq!(outcome.status, BattleStatus::WarriorKilled(2));
    assert_eq!(outcome.wish, UserWish::Reload);
    assert!(core.fighters()[0].alive());
    assert!(!core.fighters()[1].alive());

    // The lone survivor of a two-warrior battle earns (2² − 1)/1 = 3.
    assert_eq!(core.scores(), &[3, 0]);
}

#[test]
fn random_loads_give_both_warriors_their_own_code() {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    let config = SimConfig::default();
    let imp = assemble("MOV $0, $1\nJMP $-1\n", 1, &config);
    let dwarf = assemble(
        "DEF STEP = 4\nORG START\nSTART:\nADD #STEP, $BOMB\nMOV $BOMB, @BOMB\nJMP $START\nBOMB:\nDAT #0\n",
        2,
        &config,
    );

    for seed in [1_u64, 17, 4242] {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut core = Core::new(config.clone()).unwrap();
        core.load_warriors(&[imp.clone(), dwarf.clone()], &mut rng)
            .expect("load failed");

        for fighter in core.fighters() {
            assert_eq!(
                core.get(i32::from(fighter.current_pc())).marker,
                fighter.id()
            );
        }

        // Same seed, same layout: reloading reproduces the battle.
        let mut rng_again = StdRng::seed_from_u64(seed);
        let mut again = Core::new(config.clone()).unwrap();
        again
            .load_warriors(&[imp.clone(), dwarf.clone()], &mut rng_again)
            .unwrap();
        for (a, b) in core.fighters().iter().zip(again.fighters()) {
            assert_eq!(a.current_pc(), b.current_pc());
        }

        let outcome = core.run(&mut ui());
        assert_ne!(outcome.status, BattleStatus::EngineFault);
    }
}
