//! Operand expression trees and their position-aware evaluation.

use thiserror::Error as ThisError;

use super::symbol::{Symbol, SymbolTable};

/// A node in an operand expression tree. Children are owned; whole trees
/// are owned either by a symbol-table entry (DEF bodies) or by a pending
/// instruction, and are dropped with their owner at the end of pass 2.
#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    /// The source line the node came from, for error messages.
    pub line: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Number(u32),
    Ident(String),
    Add(Box<Expr>, Box<Expr>),
    Subtract(Box<Expr>, Box<Expr>),
    Multiply(Box<Expr>, Box<Expr>),
    Divide(Box<Expr>, Box<Expr>),
    Modulus(Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
}

impl Expr {
    #[must_use]
    pub fn new(kind: ExprKind, line: u32) -> Self {
        Self { kind, line }
    }
}

/// An error raised while evaluating an expression.
#[derive(ThisError, Clone, Debug, Eq, PartialEq)]
pub enum EvalError {
    #[error("Undefined symbol \"{name}\"")]
    UndefinedSymbol { name: String, line: u32 },

    #[error("Division by zero")]
    DivisionByZero { line: u32 },
}

impl EvalError {
    #[must_use]
    pub fn line(&self) -> u32 {
        match self {
            EvalError::UndefinedSymbol { line, .. } | EvalError::DivisionByZero { line } => *line,
        }
    }
}

/// Evaluate `expr` as seen from the instruction at programme offset
/// `for_pc`.
///
/// A label evaluates to its ring distance from the referring
/// instruction, `label_offset + core_size - for_pc`, so the same source
/// assembles identically wherever the programme later lands in the core.
/// DEF bodies are evaluated with `for_pc = 0` and are therefore
/// position-independent. Arithmetic wraps; the caller reduces the result
/// into `[0, core_size)` afterwards.
pub fn evaluate(
    expr: &Expr,
    for_pc: u16,
    symbols: &SymbolTable,
    core_size: i32,
) -> Result<i32, EvalError> {
    match &expr.kind {
        ExprKind::Number(n) => Ok(*n as i32),

        ExprKind::Ident(name) => match symbols.get(name) {
            Some(Symbol::Constant(value)) => Ok(*value),
            Some(Symbol::Label(offset)) => Ok(*offset as i32 + core_size - for_pc as i32),
            Some(Symbol::Expr(body)) => evaluate(body, 0, symbols, core_size),
            Some(Symbol::Undefined) | None => Err(EvalError::UndefinedSymbol {
                name: name.clone(),
                line: expr.line,
            }),
        },

        ExprKind::Add(lhs, rhs) => Ok(evaluate(lhs, for_pc, symbols, core_size)?
            .wrapping_add(evaluate(rhs, for_pc, symbols, core_size)?)),
        ExprKind::Subtract(lhs, rhs) => Ok(evaluate(lhs, for_pc, symbols, core_size)?
            .wrapping_sub(evaluate(rhs, for_pc, symbols, core_size)?)),
        ExprKind::Multiply(lhs, rhs) => Ok(evaluate(lhs, for_pc, symbols, core_size)?
            .wrapping_mul(evaluate(rhs, for_pc, symbols, core_size)?)),

        ExprKind::Divide(lhs, rhs) => {
            let num = evaluate(lhs, for_pc, symbols, core_size)?;
            let denom = evaluate(rhs, for_pc, symbols, core_size)?;
            if denom == 0 {
                Err(EvalError::DivisionByZero { line: rhs.line })
            } else {
                Ok(num / denom)
            }
        }
        ExprKind::Modulus(lhs, rhs) => {
            let num = evaluate(lhs, for_pc, symbols, core_size)?;
            let denom = evaluate(rhs, for_pc, symbols, core_size)?;
            if denom == 0 {
                Err(EvalError::DivisionByZero { line: rhs.line })
            } else {
                Ok(num % denom)
            }
        }

        ExprKind::Negate(inner) => Ok(evaluate(inner, for_pc, symbols, core_size)?.wrapping_neg()),
    }
}
