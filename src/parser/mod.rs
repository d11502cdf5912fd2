//! The two-pass assembler.
//!
//! Pass 1 tokenizes each line, builds expression trees for every operand,
//! and collects labels and DEF bodies into the symbol table. Pass 2
//! evaluates every operand relative to its instruction's offset, reduces
//! the results into the core's address range, and emits the final cells.
//! Labels are stored as programme-relative offsets and only turned into
//! ring distances at evaluation time, so the same source assembles to the
//! same cells wherever the programme is later loaded.
//!
//! The assembler reports one diagnostic per bad line and keeps scanning,
//! failing the assembly at the end if anything was reported.

use log::debug;

use crate::config::{SimConfig, MAX_LINE_LEN};
use crate::load_file::{Addr, AddrMode, Cell, Opcode, Warrior, WarriorId};

mod error;
mod expr;
mod lexer;
mod symbol;

pub use error::{Diagnostic, ErrorKind};

use expr::{evaluate, EvalError, Expr, ExprKind};
use lexer::{Lexer, LineError, TokenKind};
use symbol::{Symbol, SymbolTable};

/// What an instruction expects for one of its operands.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum ArgKind {
    /// The operand slot is unused in source form.
    None,
    /// A `#`-prefixed value.
    Immediate,
    /// A `$`- or `@`-prefixed core address; `#` is rejected.
    Address,
    /// Either of the above, but a mode marker is still required.
    Any,
}

/// The operand kinds each opcode accepts, in (A, B) order.
fn arg_kinds(op: Opcode) -> (ArgKind, ArgKind) {
    match op {
        Opcode::Dat => (ArgKind::None, ArgKind::Immediate),
        Opcode::Jmp | Opcode::Spl => (ArgKind::None, ArgKind::Address),
        Opcode::Skl | Opcode::Ske | Opcode::Skn | Opcode::Skg => (ArgKind::Any, ArgKind::Any),
        _ => (ArgKind::Any, ArgKind::Address),
    }
}

/// A partially assembled instruction: modes are fixed, operands are
/// still expression trees awaiting pass 2.
#[derive(Debug)]
struct PendingInsn {
    op_code: Opcode,
    mode_a: AddrMode,
    mode_b: AddrMode,
    op_a: Option<Expr>,
    op_b: Option<Expr>,
}

/// Assemble warrior source into a [`Warrior`] with the given id.
///
/// `file` is used only for diagnostics. On failure every collected
/// diagnostic is returned, in source order.
pub fn assemble(
    source: &str,
    file: &str,
    id: WarriorId,
    config: &SimConfig,
) -> Result<Warrior, Vec<Diagnostic>> {
    let mut asm = Assembler::new(file, config);

    asm.first_pass(source);
    if !asm.diagnostics.is_empty() {
        return Err(asm.diagnostics);
    }

    match asm.second_pass(id) {
        Some(warrior) => {
            debug!(
                "assembled \"{}\" from {}: {} instructions, start offset {}",
                warrior.name,
                file,
                warrior.len(),
                warrior.init_pc
            );
            Ok(warrior)
        }
        None => Err(asm.diagnostics),
    }
}

struct Assembler<'a> {
    config: &'a SimConfig,
    file: String,
    line_num: u32,
    symbols: SymbolTable,
    insns: Vec<PendingInsn>,
    start_pc: Option<Expr>,
    name: Option<String>,
    version: Option<String>,
    author: Option<String>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Assembler<'a> {
    fn new(file: &str, config: &'a SimConfig) -> Self {
        Self {
            config,
            file: file.to_owned(),
            line_num: 0,
            symbols: SymbolTable::new(),
            insns: Vec::new(),
            start_pc: None,
            name: None,
            version: None,
            author: None,
            diagnostics: Vec::new(),
        }
    }

    /// Symbols every programme can refer to without defining them.
    fn install_predefined(&mut self) {
        self.symbols
            .put("CORE_SIZE", Symbol::Constant(self.config.core_size));
        self.symbols
            .put("MAX_INSNS", Symbol::Constant(self.config.max_prog_insns));
        self.symbols
            .put("MAX_TASKS", Symbol::Constant(self.config.max_prog_tasks));
        self.symbols
            .put("MAX_CYCLES", Symbol::Constant(self.config.max_cycles));
        self.symbols
            .put("MIN_DISTANCE", Symbol::Constant(self.config.min_separation));
    }

    fn report(&mut self, kind: ErrorKind, col: Option<usize>, source_line: &str) {
        self.diagnostics.push(Diagnostic {
            kind,
            file: self.file.clone(),
            line: self.line_num,
            col,
            source_line: source_line.to_owned(),
        });
    }

    fn first_pass(&mut self, source: &str) {
        self.install_predefined();

        for (idx, line) in source.lines().enumerate() {
            self.line_num = idx as u32 + 1;

            if line.len() > MAX_LINE_LEN {
                self.report(ErrorKind::LineTooLong, None, "");
                continue;
            }

            let mut lexer = Lexer::new(line);
            if let Err(err) = self.parse_line(&mut lexer) {
                self.report(err.kind, Some(err.col), line);
            }
        }
    }

    /// Parse one logical line: empty, directive, label, or instruction.
    fn parse_line(&mut self, lexer: &mut Lexer) -> Result<(), LineError> {
        let token = lexer.next_token()?;

        match token.kind {
            TokenKind::Opcode(op) => self.parse_instruction(lexer, op)?,

            TokenKind::Org => {
                // A later ORG silently replaces an earlier one.
                self.start_pc = Some(self.parse_expr(lexer)?);
            }

            TokenKind::Nam => self.name = Some(Self::parse_string_directive(lexer)?),
            TokenKind::Ver => self.version = Some(Self::parse_string_directive(lexer)?),
            TokenKind::Aut => self.author = Some(Self::parse_string_directive(lexer)?),

            TokenKind::Def => self.parse_def(lexer)?,

            TokenKind::Ident(name) => self.parse_label(lexer, &name, token.start)?,

            TokenKind::Eol => return Ok(()),

            _ => return Err(LineError::new(ErrorKind::UnexpectedToken, token.start)),
        }

        self.end_line(lexer)
    }

    /// Anything left before the end of the line is an error.
    fn end_line(&mut self, lexer: &mut Lexer) -> Result<(), LineError> {
        let token = lexer.next_token()?;
        if token.kind == TokenKind::Eol {
            Ok(())
        } else {
            Err(LineError::new(ErrorKind::ExtraText, token.start))
        }
    }

    /// A label line: the name binds to the offset of the next instruction.
    fn parse_label(
        &mut self,
        lexer: &mut Lexer,
        name: &str,
        start: usize,
    ) -> Result<(), LineError> {
        let offset = self.insns.len() as u16;
        match self.symbols.get(name) {
            // A forward reference is refined in place once the label
            // line is reached.
            None | Some(Symbol::Undefined) => self.symbols.put(name, Symbol::Label(offset)),
            Some(_) => return Err(LineError::new(ErrorKind::LabelRedefined, start)),
        }

        let colon = lexer.next_token()?;
        if colon.kind == TokenKind::Colon {
            Ok(())
        } else {
            Err(LineError::new(ErrorKind::MissingColon, colon.start))
        }
    }

    /// `DEF name = expr`. Forward references to DEF names are rejected:
    /// allowing them would admit circular definitions between two or
    /// more identifiers.
    fn parse_def(&mut self, lexer: &mut Lexer) -> Result<(), LineError> {
        let ident = lexer.next_token()?;
        let name = match ident.kind {
            TokenKind::Ident(name) => name,
            _ => return Err(LineError::new(ErrorKind::ExpectedIdentifier, ident.start)),
        };

        let equals = lexer.next_token()?;
        if equals.kind != TokenKind::Equal {
            return Err(LineError::new(ErrorKind::ExpectedEquals, equals.start));
        }

        let body = self.parse_expr(lexer)?;

        match self.symbols.get(&name) {
            None => {
                self.symbols.put(&name, Symbol::Expr(body));
                Ok(())
            }
            Some(Symbol::Undefined) => Err(LineError::new(ErrorKind::DefinedTooLate, ident.start)),
            Some(_) => Err(LineError::new(ErrorKind::IdentifierRedefined, ident.start)),
        }
    }

    /// `NAM`/`VER`/`AUT` argument. A repeated directive replaces the
    /// previously stored string.
    fn parse_string_directive(lexer: &mut Lexer) -> Result<String, LineError> {
        let token = lexer.next_token()?;
        match token.kind {
            TokenKind::Str(body) => Ok(body),
            _ => Err(LineError::new(ErrorKind::ExpectedString, token.start)),
        }
    }

    fn parse_instruction(&mut self, lexer: &mut Lexer, op_code: Opcode) -> Result<(), LineError> {
        let (kind_a, kind_b) = arg_kinds(op_code);

        let mut mode_a = AddrMode::Immediate;
        let mut mode_b = AddrMode::Immediate;
        let mut op_a = None;
        let mut op_b = None;

        if kind_a != ArgKind::None {
            op_a = Some(self.parse_argument(lexer, kind_a, &mut mode_a)?);

            if kind_b != ArgKind::None {
                let comma = lexer.next_token()?;
                if comma.kind != TokenKind::Comma {
                    return Err(LineError::new(ErrorKind::MissingComma, comma.start));
                }
            }
        }

        if kind_b != ArgKind::None {
            op_b = Some(self.parse_argument(lexer, kind_b, &mut mode_b)?);
        }

        self.insns.push(PendingInsn {
            op_code,
            mode_a,
            mode_b,
            op_a,
            op_b,
        });

        Ok(())
    }

    fn parse_argument(
        &mut self,
        lexer: &mut Lexer,
        kind: ArgKind,
        mode: &mut AddrMode,
    ) -> Result<Expr, LineError> {
        match kind {
            ArgKind::None => unreachable!("no argument to parse"),

            ArgKind::Immediate => {
                let token = lexer.next_token()?;
                if token.kind == TokenKind::Hash {
                    *mode = AddrMode::Immediate;
                    self.parse_factor(lexer)
                } else {
                    Err(LineError::new(ErrorKind::ExpectedImmediate, token.start))
                }
            }

            ArgKind::Address => self.parse_address(lexer, mode),

            ArgKind::Any => {
                let token = lexer.next_token()?;
                if token.kind == TokenKind::Hash {
                    *mode = AddrMode::Immediate;
                    self.parse_factor(lexer)
                } else {
                    lexer.unget(&token);
                    self.parse_address(lexer, mode)
                }
            }
        }
    }

    /// `$ factor` or `@ factor`. A bare factor is missing its mode
    /// marker; `#` is rejected outright.
    fn parse_address(&mut self, lexer: &mut Lexer, mode: &mut AddrMode) -> Result<Expr, LineError> {
        let token = lexer.next_token()?;
        match token.kind {
            TokenKind::Dollar => *mode = AddrMode::Direct,
            TokenKind::At => *mode = AddrMode::Indirect,
            TokenKind::Hash => {
                return Err(LineError::new(ErrorKind::ImmediateNotAllowed, token.start))
            }
            TokenKind::Eol => return Err(LineError::new(ErrorKind::UnexpectedEol, token.start)),
            _ => return Err(LineError::new(ErrorKind::MissingModeMarker, token.start)),
        }

        self.parse_factor(lexer)
    }

    /// `expr = term (("+"|"-") term)*`, left-associative.
    fn parse_expr(&mut self, lexer: &mut Lexer) -> Result<Expr, LineError> {
        let mut expr = self.parse_term(lexer)?;

        loop {
            let token = lexer.next_token()?;
            let op = match token.kind {
                TokenKind::Plus => ExprKind::Add,
                TokenKind::Minus => ExprKind::Subtract,
                _ => {
                    lexer.unget(&token);
                    return Ok(expr);
                }
            };

            let rhs = self.parse_term(lexer)?;
            expr = Expr::new(op(Box::new(expr), Box::new(rhs)), self.line_num);
        }
    }

    /// `term = factor (("*"|"/"|"%") factor)*`, left-associative.
    fn parse_term(&mut self, lexer: &mut Lexer) -> Result<Expr, LineError> {
        let mut expr = self.parse_factor(lexer)?;

        loop {
            let token = lexer.next_token()?;
            let op = match token.kind {
                TokenKind::Star => ExprKind::Multiply,
                TokenKind::Slash => ExprKind::Divide,
                TokenKind::Percent => ExprKind::Modulus,
                _ => {
                    lexer.unget(&token);
                    return Ok(expr);
                }
            };

            let rhs = self.parse_factor(lexer)?;
            expr = Expr::new(op(Box::new(expr), Box::new(rhs)), self.line_num);
        }
    }

    /// `factor = NUMBER | IDENT | "-" factor | "(" expr ")"`.
    fn parse_factor(&mut self, lexer: &mut Lexer) -> Result<Expr, LineError> {
        let token = lexer.next_token()?;

        let kind = match token.kind {
            TokenKind::Minus => ExprKind::Negate(Box::new(self.parse_factor(lexer)?)),

            TokenKind::LParen => {
                let inner = self.parse_expr(lexer)?;
                let close = lexer.next_token()?;
                if close.kind != TokenKind::RParen {
                    return Err(LineError::new(ErrorKind::UnmatchedParen, token.start));
                }
                return Ok(inner);
            }

            TokenKind::Number(value) => ExprKind::Number(value),

            TokenKind::Ident(name) => {
                // First sighting of a name: remember it as undefined so a
                // later label line can refine it, and a later DEF cannot.
                if self.symbols.get(&name).is_none() {
                    self.symbols.put(&name, Symbol::Undefined);
                }
                ExprKind::Ident(name)
            }

            TokenKind::Eol => return Err(LineError::new(ErrorKind::UnexpectedEol, token.start)),

            _ => return Err(LineError::new(ErrorKind::UnexpectedInput, token.start)),
        };

        Ok(Expr::new(kind, self.line_num))
    }

    fn report_eval(&mut self, err: &EvalError) {
        let kind = match err {
            EvalError::UndefinedSymbol { name, .. } => ErrorKind::UndefinedSymbol(name.clone()),
            EvalError::DivisionByZero { .. } => ErrorKind::DivisionByZero,
        };
        self.diagnostics.push(Diagnostic {
            kind,
            file: self.file.clone(),
            line: err.line(),
            col: None,
            source_line: String::new(),
        });
    }

    /// Evaluate an operand expression for the instruction at programme
    /// offset `for_pc` and reduce it into the core's address range. A
    /// missing operand assembles to 0.
    fn eval_operand(&mut self, operand: &Option<Expr>, for_pc: u16) -> u16 {
        let Some(expr) = operand else { return 0 };

        match evaluate(expr, for_pc, &self.symbols, self.config.core_size) {
            Ok(value) => Addr::new(value, self.config.core_size).cell(),
            Err(err) => {
                self.report_eval(&err);
                0
            }
        }
    }

    fn second_pass(&mut self, id: WarriorId) -> Option<Warrior> {
        if self.insns.is_empty() {
            self.report(ErrorKind::ProgramEmpty, None, "");
            return None;
        }
        if self.insns.len() > self.config.max_prog_insns as usize {
            self.report(ErrorKind::ProgramTooLarge, None, "");
            return None;
        }

        let init_pc = match self.start_pc.take() {
            Some(start) => self.eval_operand(&Some(start), 0),
            None => 0,
        };

        let pending = std::mem::take(&mut self.insns);
        let insns = pending
            .iter()
            .enumerate()
            .map(|(i, insn)| Cell {
                marker: 0,
                op_code: insn.op_code,
                mode_a: insn.mode_a,
                mode_b: insn.mode_b,
                op_a: self.eval_operand(&insn.op_a, i as u16),
                op_b: self.eval_operand(&insn.op_b, i as u16),
            })
            .collect();

        // Expressions and the symbol table are done with; the warrior
        // record is all that survives assembly.
        self.symbols.clear();

        if !self.diagnostics.is_empty() {
            return None;
        }

        Some(Warrior {
            id,
            name: self
                .name
                .take()
                .unwrap_or_else(|| format!("Warrior{}", id)),
            version: self.version.take(),
            author: self.author.take(),
            insns,
            init_pc,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::*;

    fn assemble_ok(source: &str) -> Warrior {
        assemble(source, "test.cw", 1, &SimConfig::default()).expect("assembly failed")
    }

    fn assemble_err(source: &str) -> Vec<Diagnostic> {
        assemble(source, "test.cw", 1, &SimConfig::default()).expect_err("assembly succeeded")
    }

    #[test]
    fn assemble_imp() {
        let warrior = assemble_ok("MOV $0, $1\nJMP $-1\n");

        assert_eq!(
            warrior.insns,
            vec![
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
            ]
        );
        assert_eq!(warrior.init_pc, 0);
        assert_eq!(warrior.name, "Warrior1");
    }

    #[test]
    fn assemble_dat() {
        let warrior = assemble_ok("DAT #0");
        assert_eq!(warrior.insns, vec![Cell::default()]);
    }

    #[test]
    fn labels_resolve_to_ring_distance() {
        // The ADD refers to the label on its own cell: a whole loop of
        // the ring, which reduces to 0.
        let warrior = assemble_ok("LAB:\nADD #1, $LAB\nORG LAB\n");

        assert_eq!(warrior.init_pc, 0);
        assert_eq!(
            warrior.insns,
            vec![Cell {
                op_code: Opcode::Add,
                mode_a: AddrMode::Immediate,
                mode_b: AddrMode::Direct,
                op_a: 1,
                op_b: 0,
                ..Cell::default()
            }]
        );
    }

    #[test]
    fn forward_reference_to_label() {
        let warrior = assemble_ok("ORG START\nMOV $0, $1\nSTART:\nJMP $START\n");

        assert_eq!(warrior.init_pc, 1);
        // From offset 1, the label at offset 1 is a full loop away.
        assert_eq!(warrior.insns[1].op_b, 0);
    }

    #[test]
    fn last_org_wins() {
        let warrior = assemble_ok("ORG 0\nMOV $0, $1\nJMP $-1\nORG 1\n");
        assert_eq!(warrior.init_pc, 1);
    }

    #[test]
    fn def_expands_position_independently() {
        let warrior = assemble_ok("DEF STEP = 2 * 2\nMOV $0, $STEP\nADD #STEP, $1\n");

        assert_eq!(warrior.insns[0].op_b, 4);
        assert_eq!(warrior.insns[1].op_a, 4);
    }

    #[test]
    fn predefined_symbols() {
        let warrior = assemble_ok("JMP $CORE_SIZE\nDAT #MAX_TASKS\n");

        // CORE_SIZE reduces to 0 in a core of exactly that size.
        assert_eq!(warrior.insns[0].op_b, 0);
        assert_eq!(warrior.insns[1].op_b, 4_000);
    }

    #[test]
    fn descriptive_directives() {
        let warrior = assemble_ok(
            "NAM \"Stone\"\nVER \"0.3\"\nAUT \"A. Nonymous\"\nDAT #7\n",
        );

        assert_eq!(warrior.name, "Stone");
        assert_eq!(warrior.version.as_deref(), Some("0.3"));
        assert_eq!(warrior.author.as_deref(), Some("A. Nonymous"));
    }

    #[test]
    fn repeated_nam_replaces() {
        let warrior = assemble_ok("NAM \"first\"\nNAM \"second\"\nDAT #0\n");
        assert_eq!(warrior.name, "second");
    }

    #[test]
    fn parenthesised_operands() {
        let warrior = assemble_ok("MOV $(1 + 2 * 3), @-(2 - 1)\n");

        assert_eq!(warrior.insns[0].op_a, 7);
        assert_eq!(warrior.insns[0].mode_b, AddrMode::Indirect);
        assert_eq!(warrior.insns[0].op_b, 7999);
    }

    #[test_case("MOV $0 $1", ErrorKind::MissingComma; "missing comma")]
    #[test_case("MOV 0, $1", ErrorKind::MissingModeMarker; "bare factor")]
    #[test_case("DAT $0", ErrorKind::ExpectedImmediate; "dat needs immediate")]
    #[test_case("JMP #1", ErrorKind::ImmediateNotAllowed; "jmp rejects immediate")]
    #[test_case("MOV $0,", ErrorKind::UnexpectedEol; "truncated operand")]
    #[test_case("MOV $(1, $2", ErrorKind::UnmatchedParen; "unmatched paren")]
    #[test_case("MOV $0, $1 extra", ErrorKind::ExtraText; "extra text")]
    #[test_case("LOOP", ErrorKind::MissingColon; "label missing colon")]
    #[test_case("123", ErrorKind::UnexpectedToken; "number at line start")]
    #[test_case("NAM imp", ErrorKind::ExpectedString; "nam needs string")]
    #[test_case("DEF 5 = 1", ErrorKind::ExpectedIdentifier; "def needs identifier")]
    #[test_case("DEF FOO 1", ErrorKind::ExpectedEquals; "def needs equals")]
    #[test_case("MOV $0, $!", ErrorKind::UnexpectedInput; "garbage factor")]
    fn line_errors(source: &str, expected: ErrorKind) {
        let diagnostics = assemble_err(source);
        assert_eq!(diagnostics[0].kind, expected);
        assert_eq!(diagnostics[0].line, 1);
    }

    #[test]
    fn def_forward_reference_is_too_late() {
        let diagnostics = assemble_err("DEF FOO = BAR\nDEF BAR = 1\n");

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, ErrorKind::DefinedTooLate);
        assert_eq!(diagnostics[0].line, 1);
    }

    #[test]
    fn redefinitions() {
        let diagnostics = assemble_err("DEF CORE_SIZE = 1\nX:\nX:\nDEF X = 2\n");

        assert_eq!(
            diagnostics.iter().map(|d| d.kind.clone()).collect::<Vec<_>>(),
            vec![
                ErrorKind::IdentifierRedefined,
                ErrorKind::LabelRedefined,
                ErrorKind::IdentifierRedefined,
            ]
        );
    }

    #[test]
    fn undefined_symbol_reported_in_pass_two() {
        let diagnostics = assemble_err("JMP $NOWHERE\n");

        assert_eq!(
            diagnostics[0].kind,
            ErrorKind::UndefinedSymbol("NOWHERE".into())
        );
    }

    #[test]
    fn division_by_zero_in_operand() {
        let diagnostics = assemble_err("MOV $0, $(1/0)\n");
        assert_eq!(diagnostics[0].kind, ErrorKind::DivisionByZero);
    }

    #[test]
    fn empty_programme() {
        let diagnostics = assemble_err("; nothing but comments\n\n");
        assert_eq!(diagnostics[0].kind, ErrorKind::ProgramEmpty);
    }

    #[test]
    fn programme_too_large() {
        let config = SimConfig {
            max_prog_insns: 2,
            ..SimConfig::default()
        };
        let diagnostics =
            assemble("DAT #0\nDAT #0\nDAT #0\n", "test.cw", 1, &config).unwrap_err();

        assert_eq!(diagnostics[0].kind, ErrorKind::ProgramTooLarge);
    }

    #[test]
    fn line_too_long() {
        let source = format!("; {}\nDAT #0\n", "x".repeat(300));
        let diagnostics = assemble(&source, "test.cw", 1, &SimConfig::default()).unwrap_err();

        assert_eq!(diagnostics[0].kind, ErrorKind::LineTooLong);
        assert_eq!(diagnostics[0].line, 1);
    }

    #[test]
    fn keeps_scanning_after_an_error() {
        let diagnostics = assemble_err("MOV $0 $1\nJMP #0\n");

        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].line, 1);
        assert_eq!(diagnostics[1].line, 2);
    }

    #[test]
    fn assembly_is_deterministic() {
        let source = "ORG START\nSTART:\nMOV $0, $1\nJMP $START\n";
        let first = assemble_ok(source);
        let second = assemble_ok(source);
        assert_eq!(first, second);
    }
}
