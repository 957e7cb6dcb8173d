//! The expression-evaluator / line-parser boundary.
//!
//! The lexer, expression grammar and line-parsing state machine are an
//! external collaborator (see module scope notes); this module defines
//! only the trait the assembly engine calls through, modeled the same
//! way the upstream visitor trait exposes a bitstream parser to an
//! external consumer without the library owning the consumer's logic.

use crate::context::AssemblyContext;

/// Outcome of asking the line parser to evaluate the expression at the
/// current column.
pub enum EvalOutcome {
    /// A concrete numeric value.
    Value(f64),
    /// The expression references a symbol not yet defined in this pass;
    /// the engine substitutes a pass-appropriate placeholder and keeps
    /// going rather than aborting assembly.
    Unresolved,
    /// A genuine syntax or semantic error, carrying a message suitable
    /// for surfacing to the user.
    Error(String),
}

/// Boundary between the assembly engine and the (externally supplied)
/// line parser / expression evaluator.
pub trait ExprEvaluator {
    /// Evaluates a numeric expression starting at the current column.
    /// `allow_close_paren` tells the evaluator whether a bare trailing
    /// `)` should terminate the expression rather than be consumed as
    /// part of it (needed while disambiguating indirect addressing
    /// modes, where the engine itself owns one of the parens).
    fn eval_number(&mut self, ctx: &mut AssemblyContext, allow_close_paren: bool) -> EvalOutcome;

    /// Evaluates a string expression (e.g. an `EQUS` operand).
    fn eval_string(&mut self, ctx: &mut AssemblyContext) -> Result<String, String>;

    /// Peeks the next token without consuming it, used by the
    /// addressing-mode decision tree to look for a bare accumulator
    /// operand (`A`) versus the start of a label expression.
    fn peek_token(&self) -> Option<&str>;

    /// Consumes one character if it equals `c`; returns whether it did.
    fn accept_char(&mut self, c: char) -> bool;

    /// Consumes the next token (case-insensitively) if it equals
    /// `token`, leaving the cursor untouched otherwise. Used for the
    /// `,X`/`,Y` index letters and the indirect-mode `X`/`Y` markers.
    fn accept_token(&mut self, token: &str) -> bool;

    /// Consumes the next token only if it equals `token` (case
    /// insensitively) *and* doing so would leave the cursor at the end
    /// of the statement; otherwise the cursor is left completely
    /// untouched, even if the token itself matched. This is the named
    /// state the bare accumulator operand needs: `ASL A` is accumulator
    /// mode only when nothing follows the `A`, while `ASL APTR` or a
    /// label named `A` used in a larger expression must fall through
    /// to ordinary expression evaluation with no characters consumed.
    fn accept_token_if_end_of_statement(&mut self, token: &str) -> bool;

    /// Whether the cursor is at the end of the current statement (no
    /// more operand characters, modulo trailing whitespace).
    fn at_end_of_statement(&self) -> bool;
}
