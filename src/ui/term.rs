//! The terminal visualiser.
//!
//! Renders the core as a grid of glyphs, one per chunk of cells,
//! coloured by the warrior whose marker owns the chunk, with a status
//! line underneath. Raw mode and the alternate screen are restored on
//! drop even if the battle loop bails out early.

use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute, queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{
        self, disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};

use crate::core::{BattleStatus, Core, UserWish};
use crate::load_file::Warrior;

use super::BattleUi;

const HELP: &str = "space pause | r reload | q quit";

fn warrior_color(marker: u8) -> Color {
    match marker {
        1 => Color::Cyan,
        2 => Color::Yellow,
        _ => Color::White,
    }
}

pub struct TermUi {
    entered: bool,
    /// Redraw (and poll the keyboard) every this many cycles.
    refresh: i32,
}

impl TermUi {
    /// Set up the terminal. `full_screen` only chooses a more eager
    /// redraw rate; a terminal is as full-screen as it gets.
    pub fn new(full_screen: bool) -> Result<Self> {
        let mut ui = Self {
            entered: false,
            refresh: if full_screen { 64 } else { 256 },
        };
        ui.enter().context("failed to set up the terminal")?;
        Ok(ui)
    }

    fn enter(&mut self) -> io::Result<()> {
        if !self.entered {
            enable_raw_mode()?;
            execute!(io::stdout(), EnterAlternateScreen, Hide)?;
            self.entered = true;
        }
        Ok(())
    }

    fn leave(&mut self) {
        if self.entered {
            let _ = execute!(io::stdout(), LeaveAlternateScreen, Show);
            let _ = disable_raw_mode();
            self.entered = false;
        }
    }

    fn draw(&self, core: &Core, cycles: i32, footer: &str) -> io::Result<()> {
        let (width, height) = terminal::size()?;
        let grid_w = width.max(1) as usize;
        let grid_h = height.saturating_sub(2).max(1) as usize;

        let core_size = core.len() as usize;
        let glyphs = grid_w * grid_h;
        let per_glyph = core_size.div_ceil(glyphs).max(1);

        let task_pcs: Vec<usize> = core
            .fighters()
            .iter()
            .filter(|f| f.alive())
            .map(|f| usize::from(f.current_pc()))
            .collect();

        let mut stdout = io::stdout();
        queue!(stdout, MoveTo(0, 0), Clear(ClearType::All))?;

        let mut index = 0;
        for row in 0..grid_h {
            queue!(stdout, MoveTo(0, row as u16))?;
            for _ in 0..grid_w {
                if index >= core_size {
                    break;
                }
                let chunk = index..(index + per_glyph).min(core_size);
                index += per_glyph;

                let pc_here = task_pcs.iter().any(|pc| chunk.contains(pc));
                let marker = chunk
                    .clone()
                    .map(|i| core.get(i as i32).marker)
                    .find(|&m| m != 0);

                match (pc_here, marker) {
                    (true, m) => queue!(
                        stdout,
                        SetForegroundColor(warrior_color(m.unwrap_or(0))),
                        Print('@')
                    )?,
                    (false, Some(m)) => {
                        queue!(stdout, SetForegroundColor(warrior_color(m)), Print('#'))?
                    }
                    (false, None) => queue!(stdout, ResetColor, Print('.'))?,
                }
            }
        }

        let status: String = core
            .fighters()
            .iter()
            .map(|f| {
                format!(
                    "w{} {} [{} task{}]",
                    f.id(),
                    if f.alive() { "alive" } else { "dead" },
                    f.task_count(),
                    if f.task_count() == 1 { "" } else { "s" },
                )
            })
            .collect::<Vec<_>>()
            .join("  ");

        queue!(
            stdout,
            ResetColor,
            MoveTo(0, grid_h as u16),
            Clear(ClearType::CurrentLine),
            Print(format!("cycle {:>6}  {}", cycles, status)),
            MoveTo(0, grid_h as u16 + 1),
            Clear(ClearType::CurrentLine),
            Print(footer),
        )?;

        stdout.flush()
    }

    /// A key press translated to a wish, or `None` for anything else.
    fn wish_for(key: &event::KeyEvent) -> Option<UserWish> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => Some(UserWish::Quit),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(UserWish::Quit)
            }
            KeyCode::Char('r') => Some(UserWish::Reload),
            _ => None,
        }
    }

    /// Drain pending key presses without blocking. Space pauses: the
    /// battle holds until space resumes it (or q/r end it).
    fn poll_wish(&self, core: &Core, cycles: i32) -> io::Result<UserWish> {
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                if let Some(wish) = Self::wish_for(&key) {
                    return Ok(wish);
                }
                if key.kind == KeyEventKind::Press && key.code == KeyCode::Char(' ') {
                    return self.pause(core, cycles);
                }
            }
        }
        Ok(UserWish::Continue)
    }

    fn pause(&self, core: &Core, cycles: i32) -> io::Result<UserWish> {
        self.draw(core, cycles, "paused | space resume | r reload | q quit")?;
        loop {
            if let Event::Key(key) = event::read()? {
                if let Some(wish) = Self::wish_for(&key) {
                    return Ok(wish);
                }
                if key.kind == KeyEventKind::Press && key.code == KeyCode::Char(' ') {
                    return Ok(UserWish::Continue);
                }
            }
        }
    }

    /// Block until the user decides what happens after a battle.
    fn wait_for_verdict(&self) -> io::Result<UserWish> {
        loop {
            if let Event::Key(key) = event::read()? {
                if let Some(wish) = Self::wish_for(&key) {
                    return Ok(wish);
                }
            }
        }
    }

    fn describe(status: BattleStatus, warriors: &[Warrior]) -> String {
        match status {
            BattleStatus::WarriorKilled(id) => warriors
                .iter()
                .find(|w| w.id == id)
                .map_or_else(
                    || format!("warrior {} was killed", id),
                    |w| format!("\"{}\" was killed", w.name),
                ),
            other => other.to_string(),
        }
    }
}

impl BattleUi for TermUi {
    fn start_battle(&mut self, core: &Core, _warriors: &[Warrior]) -> UserWish {
        match self.draw(core, 0, HELP) {
            Ok(()) => UserWish::Continue,
            Err(_) => UserWish::Quit,
        }
    }

    fn update_battle(
        &mut self,
        core: &Core,
        _current: usize,
        _modified: Option<u16>,
        cycles: i32,
    ) -> UserWish {
        if cycles % self.refresh != 0 {
            return UserWish::Continue;
        }

        if self.draw(core, cycles, HELP).is_err() {
            return UserWish::Quit;
        }
        self.poll_wish(core, cycles).unwrap_or(UserWish::Quit)
    }

    fn finish_battle(
        &mut self,
        core: &Core,
        warriors: &[Warrior],
        status: BattleStatus,
        _end_warrior: usize,
    ) -> UserWish {
        let footer = format!(
            "{} | r battle again | q quit",
            Self::describe(status, warriors)
        );
        if self.draw(core, core.steps_taken(), &footer).is_err() {
            return UserWish::Quit;
        }
        self.wait_for_verdict().unwrap_or(UserWish::Quit)
    }
}

impl Drop for TermUi {
    fn drop(&mut self) {
        self.leave();
    }
}
