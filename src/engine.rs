//! Two-pass assembly engine: instruction recognition, the addressing-mode
//! decision tree, and directive dispatch.
//!
//! This module owns none of the lexing or expression grammar (an
//! external collaborator, see [`crate::eval::ExprEvaluator`]); it is
//! handed a recognised mnemonic and a cursor positioned just after it,
//! and is responsible for everything from there: picking the right
//! addressing mode, evaluating and range-checking the operand, and
//! emitting bytes through [`crate::memory::ObjectMemory`] while keeping
//! `P%`/`O%`/`CPU` synced into the symbol table.

use thiserror::Error;

use crate::context::AssemblyContext;
use crate::eval::{EvalOutcome, ExprEvaluator};
use crate::memory::Pass;
use crate::opcodes::{self, AddressingMode, CpuLevel, OpcodeDef};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Syntax(String),

    #[error("'{0}' is not a recognised instruction mnemonic")]
    NotAnInstruction(String),

    #[error("this instruction does not take an operand")]
    NoImplied,
    #[error("this instruction has no immediate addressing mode")]
    NoImmediate,
    #[error("immediate operand out of range (0-255)")]
    ImmTooLarge,
    #[error("immediate operand cannot be negative")]
    ImmNegative,
    #[error("unexpected comma after immediate operand")]
    UnexpectedComma,
    #[error("this instruction has no indirect addressing mode")]
    NoIndirect,
    #[error("malformed indirect operand")]
    BadIndirect,
    #[error("mismatched parentheses")]
    MismatchedParentheses,
    #[error("JMP (&xxFF) falls victim to the NMOS 6502 indirect-jump bug")]
    SixFiveZeroTwoBug,
    #[error("branch target out of range (-128..127)")]
    BranchOutOfRange,
    #[error("value is not a zero-page address (0-255)")]
    NotZeroPage,
    #[error("address out of range")]
    BadAddress,
    #[error("malformed absolute operand")]
    BadAbsolute,
    #[error("this instruction has no absolute or zero-page addressing mode")]
    NoAbsolute,
    #[error("malformed indexed operand")]
    BadIndexed,
    #[error("this instruction has no indexed-X addressing mode")]
    NoIndexedX,
    #[error("this instruction has no indexed-Y addressing mode")]
    NoIndexedY,

    #[error("symbol not defined")]
    SymbolNotDefined,

    #[error("O% cannot be assigned unless OPT bit 2 (offset assembly) is set")]
    OffsetRequiresOpt2,

    #[error(transparent)]
    Memory(#[from] crate::memory::Error),

    #[error(transparent)]
    Symbol(#[from] crate::symtab::Error),
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Syntax(msg)
    }
}

/// A directive with its operands already evaluated by the (external)
/// line parser. Lexing and expression evaluation are out of scope for
/// this crate (see spec §1's Non-goals); this engine only performs the
/// bookkeeping each directive implies against [`AssemblyContext`].
#[derive(Debug, Clone)]
pub enum Directive {
    /// `CPU n`
    SetCpu(u8),
    /// `ORG a` / `P% = a`
    SetPc(u32),
    /// `O% = a`
    SetOffsetPc(u32),
    /// `OPT n`
    SetOpt(u8),
    /// `GUARD a, len`
    Guard(u32, u32),
    /// `CLEAR start, end`
    Clear(u32, u32),
    EquB(Vec<u8>),
    EquW(Vec<u16>),
    EquD(Vec<u32>),
    EquS(String),
    /// `INCBIN` -- file reading happens at the CLI boundary; this
    /// directive carries the bytes already read.
    IncBin(Vec<u8>),
    /// `MAPCHAR ascii, n`
    MapChar(u8, u8),
    /// `SAVE "name", start, end [, exec [, reload]]`
    Save { name: String, start: u32, end: u32, exec: Option<u32>, reload: bool },
    /// `{`
    PushBrace,
    /// `FOR name = value`
    PushFor { name: String, value: f64 },
    /// `}` / `NEXT`
    PopScope,
}

/// A `SAVE` directive recorded for later packaging into a disc image.
/// Accumulated only during the pass that ultimately counts (pass 2),
/// the same way object memory's final contents are pass 2's.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveDirective {
    pub name: String,
    pub start: u32,
    pub end: u32,
    pub exec: u32,
    pub reload: bool,
}

/// Drives one assembly job: two passes over whatever source the
/// (external) line parser feeds it, instruction-by-instruction and
/// directive-by-directive.
#[derive(Default)]
pub struct Engine {
    pub saves: Vec<SaveDirective>,
}

impl Engine {
    pub fn new() -> Self {
        Engine { saves: Vec::new() }
    }

    /// Implements `InitialisePass` (§4.3): resets `CPU` to NMOS, `OPT`
    /// to 3, clears `O%`, wipes (pass 1) or partially resets (pass 2)
    /// object memory, restores the identity `MAPCHAR` table, and empties
    /// every stack symbol. Queued `SAVE` directives are also cleared --
    /// only the pass that actually counts should leave its saves queued.
    #[tracing::instrument(skip(self, ctx), fields(pass = ?pass))]
    pub fn begin_pass(&mut self, ctx: &mut AssemblyContext, pass: Pass) {
        ctx.options.cpu = CpuLevel::Nmos6502;
        ctx.memory.opt = 3;
        ctx.begin_pass(pass);
        ctx.memory.reset_ascii_map();
        ctx.symbols.reset_stacks();
        let _ = ctx.symbols.change("P%", 0.0);
        let _ = ctx.symbols.change("O%", 0.0);
        let _ = ctx.symbols.change("CPU", 0.0);
        self.saves.clear();
    }

    /// Walks the opcode table in order looking for a case-insensitive
    /// match against the head of `text`, skipping any mnemonic whose
    /// lowest CPU level exceeds `cpu` entirely (§4.3 "Instruction
    /// recognition"). Returns the matching definition and how many
    /// characters of `text` it consumed.
    pub fn recognize_instruction(cpu: CpuLevel, text: &str) -> Option<(&'static OpcodeDef, usize)> {
        for def in opcodes::OPCODE_TABLE {
            if def.min_cpu_level() > cpu {
                continue;
            }
            let name_len = def.mnemonic.len();
            if text.len() < name_len {
                continue;
            }
            if text.as_bytes()[..name_len].eq_ignore_ascii_case(def.mnemonic.as_bytes()) {
                return Some((def, name_len));
            }
        }
        None
    }

    /// Resolves the addressing mode for `def` from the evaluator's
    /// current cursor and emits the instruction, implementing the
    /// decision tree in §4.3 end to end.
    #[tracing::instrument(skip(self, ctx, eval, def), fields(mnemonic = def.mnemonic))]
    pub fn assemble_instruction(
        &mut self,
        ctx: &mut AssemblyContext,
        eval: &mut impl ExprEvaluator,
        def: &OpcodeDef,
    ) -> Result<(), Error> {
        let cpu = ctx.options.cpu;

        // 1. no operand at all => implied.
        if eval.at_end_of_statement() {
            return match def.opcode_for(AddressingMode::Implied, cpu) {
                Some(op) => self.assemble1(ctx, op),
                None => Err(Error::NoImplied),
            };
        }

        // 2. '#' => immediate.
        if eval.accept_char('#') {
            return self.assemble_immediate(ctx, eval, def, cpu);
        }

        // 3. bare 'A' with nothing after it => accumulator, only if
        // this mnemonic actually has that mode; otherwise the cursor is
        // left untouched so 'A' can be read later as a label.
        if def.has_mode(AddressingMode::Accumulator, cpu)
            && eval.accept_token_if_end_of_statement("A")
        {
            let op = def.opcode_for(AddressingMode::Accumulator, cpu).unwrap();
            return self.assemble1(ctx, op);
        }

        // 4. '(' => one of the indirect modes.
        if eval.accept_char('(') {
            return self.assemble_indirect(ctx, eval, def, cpu);
        }

        // 5. otherwise a plain expression: relative, zp/abs, or indexed.
        self.assemble_direct_or_indexed(ctx, eval, def, cpu)
    }

    fn assemble_immediate(
        &mut self,
        ctx: &mut AssemblyContext,
        eval: &mut impl ExprEvaluator,
        def: &OpcodeDef,
        cpu: CpuLevel,
    ) -> Result<(), Error> {
        if !def.has_mode(AddressingMode::Immediate, cpu) {
            return Err(Error::NoImmediate);
        }
        let value = resolve(ctx, eval, false, 0.0)?;
        if value < 0.0 {
            return Err(Error::ImmNegative);
        }
        if value > 255.0 {
            return Err(Error::ImmTooLarge);
        }
        if eval.accept_char(',') {
            return Err(Error::UnexpectedComma);
        }
        let op = def.opcode_for(AddressingMode::Immediate, cpu).unwrap();
        self.assemble2(ctx, op, value as u8)
    }

    fn assemble_indirect(
        &mut self,
        ctx: &mut AssemblyContext,
        eval: &mut impl ExprEvaluator,
        def: &OpcodeDef,
        cpu: CpuLevel,
    ) -> Result<(), Error> {
        let default = ctx.memory.pc as f64;
        let value = resolve(ctx, eval, true, default)?;

        if eval.accept_char(')') {
            if eval.accept_char(',') {
                // ) , Y => (ind),Y
                if !eval.accept_token("Y") {
                    return Err(Error::BadIndirect);
                }
                if !def.has_mode(AddressingMode::IndirectY, cpu) {
                    return Err(Error::NoIndirect);
                }
                require_zero_page(value)?;
                let op = def.opcode_for(AddressingMode::IndirectY, cpu).unwrap();
                return self.assemble2(ctx, op, value as u8);
            }

            // ')' alone => ind16 (if present, rejecting the NMOS JMP
            // (&xxFF) bug) else plain zero-page indirect.
            if let Some(op) = def.opcode_for(AddressingMode::Indirect16, cpu) {
                if cpu == CpuLevel::Nmos6502 && (value as i64 as u32) & 0xFF == 0xFF {
                    return Err(Error::SixFiveZeroTwoBug);
                }
                return self.assemble3(ctx, op, value as u16);
            }
            if let Some(op) = def.opcode_for(AddressingMode::Indirect, cpu) {
                require_zero_page(value)?;
                return self.assemble2(ctx, op, value as u8);
            }
            return Err(Error::NoIndirect);
        }

        if eval.accept_char(',') {
            if !eval.accept_token("X") {
                return Err(Error::BadIndirect);
            }
            if !eval.accept_char(')') {
                return Err(Error::MismatchedParentheses);
            }
            if let Some(op) = def.opcode_for(AddressingMode::Indirect16X, cpu) {
                return self.assemble3(ctx, op, value as u16);
            }
            if let Some(op) = def.opcode_for(AddressingMode::IndirectX, cpu) {
                require_zero_page(value)?;
                return self.assemble2(ctx, op, value as u8);
            }
            return Err(Error::NoIndirect);
        }

        Err(Error::BadIndirect)
    }

    fn assemble_direct_or_indexed(
        &mut self,
        ctx: &mut AssemblyContext,
        eval: &mut impl ExprEvaluator,
        def: &OpcodeDef,
        cpu: CpuLevel,
    ) -> Result<(), Error> {
        let default = ctx.memory.pc as f64;
        let value = resolve(ctx, eval, false, default)?;

        if !eval.accept_char(',') {
            if eval.at_end_of_statement() {
                return self.assemble_relative_or_absolute(ctx, def, cpu, value);
            }
            return Err(Error::BadAbsolute);
        }

        if eval.accept_token("X") {
            if !eval.at_end_of_statement() {
                return Err(Error::BadIndexed);
            }
            if value < 0.0 || value > 65535.0 {
                return Err(Error::BadAddress);
            }
            if value < 256.0 {
                if let Some(op) = def.opcode_for(AddressingMode::ZeroPageX, cpu) {
                    return self.assemble2(ctx, op, value as u8);
                }
            }
            if let Some(op) = def.opcode_for(AddressingMode::AbsoluteX, cpu) {
                return self.assemble3(ctx, op, value as u16);
            }
            return Err(Error::NoIndexedX);
        }

        if eval.accept_token("Y") {
            if !eval.at_end_of_statement() {
                return Err(Error::BadIndexed);
            }
            if value < 0.0 || value > 65535.0 {
                return Err(Error::BadAddress);
            }
            if value < 256.0 {
                if let Some(op) = def.opcode_for(AddressingMode::ZeroPageY, cpu) {
                    return self.assemble2(ctx, op, value as u8);
                }
            }
            if let Some(op) = def.opcode_for(AddressingMode::AbsoluteY, cpu) {
                return self.assemble3(ctx, op, value as u16);
            }
            return Err(Error::NoIndexedY);
        }

        Err(Error::BadIndexed)
    }

    fn assemble_relative_or_absolute(
        &mut self,
        ctx: &mut AssemblyContext,
        def: &OpcodeDef,
        cpu: CpuLevel,
        value: f64,
    ) -> Result<(), Error> {
        if let Some(op) = def.opcode_for(AddressingMode::Relative, cpu) {
            let pc_after = ctx.memory.pc as i64 + 2;
            let branch = value as i64 - pc_after;
            if !(-128..=127).contains(&branch) {
                return Err(Error::BranchOutOfRange);
            }
            return self.assemble2(ctx, op, (branch as i8) as u8);
        }

        if value < 0.0 || value > 65535.0 {
            return Err(Error::BadAddress);
        }
        if value < 256.0 {
            if let Some(op) = def.opcode_for(AddressingMode::ZeroPage, cpu) {
                return self.assemble2(ctx, op, value as u8);
            }
        }
        if let Some(op) = def.opcode_for(AddressingMode::Absolute, cpu) {
            return self.assemble3(ctx, op, value as u16);
        }
        Err(Error::NoAbsolute)
    }

    fn assemble1(&mut self, ctx: &mut AssemblyContext, opcode: u8) -> Result<(), Error> {
        tracing::debug!(opcode, "assemble1");
        ctx.memory.assemble_instruction(&[opcode])?;
        ctx.sync_pc_symbols();
        Ok(())
    }

    fn assemble2(&mut self, ctx: &mut AssemblyContext, opcode: u8, operand: u8) -> Result<(), Error> {
        tracing::debug!(opcode, operand, "assemble2");
        ctx.memory.assemble_instruction(&[opcode, operand])?;
        ctx.sync_pc_symbols();
        Ok(())
    }

    fn assemble3(&mut self, ctx: &mut AssemblyContext, opcode: u8, operand: u16) -> Result<(), Error> {
        tracing::debug!(opcode, operand, "assemble3");
        ctx.memory.assemble_instruction(&[opcode, (operand & 0xFF) as u8, (operand >> 8) as u8])?;
        ctx.sync_pc_symbols();
        Ok(())
    }

    /// Dispatches one already-evaluated [`Directive`] (§4.3's directive
    /// list). Each arm is the bookkeeping the directive implies against
    /// object memory, the symbol table, or (for `SAVE`) this engine's
    /// queue of pending disc files.
    #[tracing::instrument(skip(self, ctx, directive))]
    pub fn handle_directive(
        &mut self,
        ctx: &mut AssemblyContext,
        directive: Directive,
    ) -> Result<(), Error> {
        match directive {
            Directive::SetCpu(level) => {
                ctx.options.cpu = if level == 0 { CpuLevel::Nmos6502 } else { CpuLevel::Cmos65C02 };
                let _ = ctx.symbols.change("CPU", level as f64);
                Ok(())
            }
            Directive::SetPc(addr) => {
                ctx.memory.pc = addr & 0xFFFF;
                ctx.sync_pc_symbols();
                Ok(())
            }
            Directive::SetOffsetPc(addr) => {
                if !ctx.memory.offset_assembly_active() {
                    return Err(Error::OffsetRequiresOpt2);
                }
                ctx.memory.offset_pc = Some(addr & 0xFFFF);
                ctx.sync_pc_symbols();
                Ok(())
            }
            Directive::SetOpt(n) => {
                ctx.memory.opt = n;
                Ok(())
            }
            Directive::Guard(addr, len) => Ok(ctx.memory.set_guard(addr, len)?),
            Directive::Clear(start, end) => Ok(ctx.memory.clear(start, end, true)?),
            Directive::EquB(bytes) => {
                for b in bytes {
                    ctx.memory.put_byte(b)?;
                    ctx.sync_pc_symbols();
                }
                Ok(())
            }
            Directive::EquW(words) => {
                for w in words {
                    ctx.memory.put_byte((w & 0xFF) as u8)?;
                    ctx.sync_pc_symbols();
                    ctx.memory.put_byte((w >> 8) as u8)?;
                    ctx.sync_pc_symbols();
                }
                Ok(())
            }
            Directive::EquD(dwords) => {
                for d in dwords {
                    for shift in [0, 8, 16, 24] {
                        ctx.memory.put_byte(((d >> shift) & 0xFF) as u8)?;
                        ctx.sync_pc_symbols();
                    }
                }
                Ok(())
            }
            Directive::EquS(text) => {
                for ch in text.bytes() {
                    ctx.memory.put_byte(ctx.memory.get_mapping(ch))?;
                    ctx.sync_pc_symbols();
                }
                Ok(())
            }
            Directive::IncBin(bytes) => {
                ctx.memory.inc_bin(bytes.as_slice())?;
                ctx.sync_pc_symbols();
                Ok(())
            }
            Directive::MapChar(ascii, mapped) => {
                ctx.memory.set_mapping(ascii, mapped);
                Ok(())
            }
            Directive::Save { name, start, end, exec, reload } => {
                tracing::debug!(name, start, end, "queued SAVE");
                self.saves.push(SaveDirective { name, start, end, exec: exec.unwrap_or(start), reload });
                Ok(())
            }
            Directive::PushBrace => {
                ctx.symbols.push_brace();
                Ok(())
            }
            Directive::PushFor { name, value } => {
                ctx.symbols.push_for(&name);
                ctx.symbols.push_stack(&name, value);
                Ok(())
            }
            Directive::PopScope => Ok(ctx.symbols.pop_scope()?),
        }
    }
}

/// A value that was in fact guaranteed zero-page (0..=255) by the
/// grammar (the zero-page-only indirect modes IND/INDX/INDY), mapping
/// to the two errors §4.3 names for it.
fn require_zero_page(value: f64) -> Result<(), Error> {
    if value > 255.0 {
        return Err(Error::NotZeroPage);
    }
    if value < 0.0 {
        return Err(Error::BadAddress);
    }
    Ok(())
}

/// Evaluates one numeric operand, implementing §4.3's "Unknown symbols
/// in pass 1" rule: pass 1 substitutes `default` for an unresolved
/// symbol and keeps going (so forward references can be sized
/// optimistically), while pass 2 treats the same condition as fatal,
/// since every label must be known by then.
pub(crate) fn resolve(
    ctx: &mut AssemblyContext,
    eval: &mut impl ExprEvaluator,
    allow_close_paren: bool,
    default: f64,
) -> Result<f64, Error> {
    match eval.eval_number(ctx, allow_close_paren) {
        EvalOutcome::Value(v) => Ok(v),
        EvalOutcome::Unresolved => {
            if ctx.memory.current_pass() == Pass::One {
                Ok(default)
            } else {
                Err(Error::SymbolNotDefined)
            }
        }
        EvalOutcome::Error(msg) => Err(Error::Syntax(msg)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symtab::Symbol;

    /// A minimal stand-in for the real (external) line parser, just
    /// enough to drive the decision tree in tests: operates on a plain
    /// ASCII operand string with `P%`/labels resolved against the
    /// context's symbol table.
    struct FakeEval<'a> {
        text: &'a str,
        pos: usize,
    }

    impl<'a> FakeEval<'a> {
        fn new(text: &'a str) -> Self {
            FakeEval { text, pos: 0 }
        }

        fn skip_ws(&mut self) {
            while self.pos < self.text.len() && self.text.as_bytes()[self.pos] == b' ' {
                self.pos += 1;
            }
        }

        fn remaining(&self) -> &str {
            &self.text[self.pos..]
        }
    }

    impl<'a> ExprEvaluator for FakeEval<'a> {
        fn eval_number(&mut self, ctx: &mut AssemblyContext, allow_close_paren: bool) -> EvalOutcome {
            self.skip_ws();
            let bytes = self.text.as_bytes();
            let start = self.pos;
            let mut end = start;
            while end < bytes.len() {
                let c = bytes[end] as char;
                if c == ',' || c == ')' || c == ' ' {
                    if c == ')' && !allow_close_paren {
                        end += 1;
                        continue;
                    }
                    break;
                }
                end += 1;
            }
            let token = &self.text[start..end];
            self.pos = end;

            if let Some(hex) = token.strip_prefix('&') {
                return match i64::from_str_radix(hex, 16) {
                    Ok(v) => EvalOutcome::Value(v as f64),
                    Err(_) => EvalOutcome::Error(format!("bad hex literal {token}")),
                };
            }
            if let Ok(v) = token.parse::<f64>() {
                return EvalOutcome::Value(v);
            }
            match ctx.symbols.get(token) {
                Some(Symbol::Scalar(v)) => EvalOutcome::Value(*v),
                Some(Symbol::Stack(s)) => EvalOutcome::Value(*s.last().unwrap_or(&0.0)),
                None => EvalOutcome::Unresolved,
            }
        }

        fn eval_string(&mut self, _ctx: &mut AssemblyContext) -> Result<String, String> {
            Err("not needed in these tests".to_string())
        }

        fn peek_token(&self) -> Option<&str> {
            let mut p = self.pos;
            let bytes = self.text.as_bytes();
            while p < bytes.len() && bytes[p] == b' ' {
                p += 1;
            }
            let start = p;
            while p < bytes.len() && (bytes[p] as char).is_alphanumeric() {
                p += 1;
            }
            if p > start {
                Some(&self.text[start..p])
            } else {
                None
            }
        }

        fn accept_char(&mut self, c: char) -> bool {
            self.skip_ws();
            if self.remaining().starts_with(c) {
                self.pos += c.len_utf8();
                true
            } else {
                false
            }
        }

        fn accept_token(&mut self, token: &str) -> bool {
            self.skip_ws();
            let rest = self.remaining();
            if rest.len() >= token.len()
                && rest[..token.len()].eq_ignore_ascii_case(token)
                && rest[token.len()..].chars().next().is_none_or(|c| !c.is_alphanumeric())
            {
                self.pos += token.len();
                true
            } else {
                false
            }
        }

        fn accept_token_if_end_of_statement(&mut self, token: &str) -> bool {
            let saved = self.pos;
            if self.accept_token(token) && self.at_end_of_statement() {
                true
            } else {
                self.pos = saved;
                false
            }
        }

        fn at_end_of_statement(&self) -> bool {
            self.text[self.pos..].trim_start().is_empty()
        }
    }

    fn ctx_at(pc: u16) -> AssemblyContext {
        let mut ctx = AssemblyContext::new();
        ctx.memory.pc = pc as u32;
        ctx
    }

    fn assemble(ctx: &mut AssemblyContext, mnemonic: &str, operand: &str) -> Result<(), Error> {
        let def = Engine::recognize_instruction(ctx.options.cpu, mnemonic).unwrap().0;
        let mut eval = FakeEval::new(operand);
        Engine::new().assemble_instruction(ctx, &mut eval, def)
    }

    #[test]
    fn lda_immediate_zero() {
        let mut ctx = ctx_at(0x1000);
        assemble(&mut ctx, "LDA", "#0").unwrap();
        assert_eq!(ctx.memory.peek(0x1000).unwrap(), 0xA9);
        assert_eq!(ctx.memory.peek(0x1001).unwrap(), 0x00);
    }

    #[test]
    fn lda_zero_page_preferred_over_absolute() {
        let mut ctx = ctx_at(0x1000);
        assemble(&mut ctx, "LDA", "&70").unwrap();
        assert_eq!(ctx.memory.peek(0x1000).unwrap(), 0xA5);
        assert_eq!(ctx.memory.peek(0x1001).unwrap(), 0x70);
    }

    #[test]
    fn jmp_to_local_label() {
        let mut ctx = ctx_at(0x1000);
        ctx.symbols.add("loop", Symbol::Scalar(0x1000 as f64), true).unwrap();
        assemble(&mut ctx, "JMP", "loop").unwrap();
        assert_eq!(ctx.memory.peek(0x1000).unwrap(), 0x4C);
        assert_eq!(ctx.memory.peek(0x1001).unwrap(), 0x00);
        assert_eq!(ctx.memory.peek(0x1002).unwrap(), 0x10);
    }

    #[test]
    fn bne_backwards_branch() {
        let mut ctx = ctx_at(0x1006);
        ctx.symbols.add("loop", Symbol::Scalar(0x1000 as f64), true).unwrap();
        assemble(&mut ctx, "BNE", "loop").unwrap();
        assert_eq!(ctx.memory.peek(0x1006).unwrap(), 0xD0);
        assert_eq!(ctx.memory.peek(0x1007).unwrap(), 0xF8);
    }

    #[test]
    fn branch_one_byte_out_of_range_fails() {
        let mut ctx = ctx_at(0x1000);
        // target P%+2-129: one beyond the -128 boundary
        ctx.symbols.add("dest", Symbol::Scalar((0x1002 - 129) as f64), true).unwrap();
        assert!(matches!(assemble(&mut ctx, "BNE", "dest"), Err(Error::BranchOutOfRange)));
    }

    #[test]
    fn branch_at_exact_negative_boundary_succeeds() {
        let mut ctx = ctx_at(0x1000);
        ctx.symbols.add("dest", Symbol::Scalar((0x1002 - 128) as f64), true).unwrap();
        assemble(&mut ctx, "BNE", "dest").unwrap();
        assert_eq!(ctx.memory.peek(0x1001).unwrap(), 0x80);
    }

    #[test]
    fn cmos_indirect_lda() {
        let mut ctx = ctx_at(0x1000);
        ctx.options.cpu = CpuLevel::Cmos65C02;
        assemble(&mut ctx, "LDA", "(&70)").unwrap();
        assert_eq!(ctx.memory.peek(0x1000).unwrap(), 0xB2);
        assert_eq!(ctx.memory.peek(0x1001).unwrap(), 0x70);
    }

    #[test]
    fn nmos_has_no_indirect_mode_for_lda() {
        let mut ctx = ctx_at(0x1000);
        assert!(matches!(assemble(&mut ctx, "LDA", "(&70)"), Err(Error::NoIndirect)));
    }

    #[test]
    fn jmp_indirect_16_ff_bug_on_nmos() {
        let mut ctx = ctx_at(0x1000);
        assert!(matches!(
            assemble(&mut ctx, "JMP", "(&12FF)"),
            Err(Error::SixFiveZeroTwoBug)
        ));
    }

    #[test]
    fn jmp_indirect_16_ff_permitted_on_cmos() {
        let mut ctx = ctx_at(0x1000);
        ctx.options.cpu = CpuLevel::Cmos65C02;
        assemble(&mut ctx, "JMP", "(&12FF)").unwrap();
        assert_eq!(ctx.memory.peek(0x1000).unwrap(), 0x6C);
    }

    #[test]
    fn indy_requires_zero_page() {
        let mut ctx = ctx_at(0x1000);
        assert!(matches!(
            assemble(&mut ctx, "LDA", "(&1234),Y"),
            Err(Error::NotZeroPage)
        ));
    }

    #[test]
    fn indx_zero_page() {
        let mut ctx = ctx_at(0x1000);
        assemble(&mut ctx, "LDA", "(&70,X)").unwrap();
        assert_eq!(ctx.memory.peek(0x1000).unwrap(), 0xA1);
        assert_eq!(ctx.memory.peek(0x1001).unwrap(), 0x70);
    }

    #[test]
    fn absolute_x_indexed() {
        let mut ctx = ctx_at(0x1000);
        assemble(&mut ctx, "LDA", "&1234,X").unwrap();
        assert_eq!(ctx.memory.peek(0x1000).unwrap(), 0xBD);
        assert_eq!(ctx.memory.peek(0x1001).unwrap(), 0x34);
        assert_eq!(ctx.memory.peek(0x1002).unwrap(), 0x12);
    }

    #[test]
    fn zero_page_x_indexed_preferred() {
        let mut ctx = ctx_at(0x1000);
        assemble(&mut ctx, "LDA", "&70,X").unwrap();
        assert_eq!(ctx.memory.peek(0x1000).unwrap(), 0xB5);
        assert_eq!(ctx.memory.peek(0x1001).unwrap(), 0x70);
    }

    #[test]
    fn bare_accumulator_mode() {
        let mut ctx = ctx_at(0x1000);
        assemble(&mut ctx, "ASL", "A").unwrap();
        assert_eq!(ctx.memory.peek(0x1000).unwrap(), 0x0A);
    }

    #[test]
    fn accumulator_label_falls_through_to_zero_page() {
        // STA has no ACC mode at all, so a bare "A" operand must be
        // looked up as an ordinary (here undefined, pass-1-default)
        // label rather than erroring out as a bad accumulator operand.
        let mut ctx = ctx_at(0x1000);
        ctx.symbols.add("A", Symbol::Scalar(0x50 as f64), true).unwrap();
        assemble(&mut ctx, "STA", "A").unwrap();
        assert_eq!(ctx.memory.peek(0x1000).unwrap(), 0x85);
        assert_eq!(ctx.memory.peek(0x1001).unwrap(), 0x50);
    }

    #[test]
    fn implied_mode_with_no_operand() {
        let mut ctx = ctx_at(0x1000);
        assemble(&mut ctx, "CLC", "").unwrap();
        assert_eq!(ctx.memory.peek(0x1000).unwrap(), 0x18);
    }

    #[test]
    fn unknown_mnemonic_not_recognized() {
        assert!(Engine::recognize_instruction(CpuLevel::Nmos6502, "FROB").is_none());
    }

    #[test]
    fn bra_unavailable_on_nmos_cpu() {
        assert!(Engine::recognize_instruction(CpuLevel::Nmos6502, "BRA").is_none());
        assert!(Engine::recognize_instruction(CpuLevel::Cmos65C02, "BRA").is_some());
    }

    #[test]
    fn p_percent_and_o_percent_sync_after_each_emit() {
        let mut ctx = ctx_at(0x1000);
        assemble(&mut ctx, "LDA", "#0").unwrap();
        assert!(matches!(ctx.symbols.get("P%"), Some(Symbol::Scalar(v)) if *v == 0x1002 as f64));
    }

    #[test]
    fn offset_assembly_writes_at_o_percent_while_p_percent_still_advances() {
        let mut engine = Engine::new();
        let mut ctx = ctx_at(0x1000);
        ctx.memory.opt = 0b0100;
        ctx.memory.offset_pc = Some(0x2000);
        engine.handle_directive(&mut ctx, Directive::EquB(vec![0xEA])).unwrap();
        assert_eq!(ctx.memory.peek(0x2000).unwrap(), 0xEA);
        assert_eq!(ctx.memory.peek(0x1000).unwrap(), 0x00);
        assert_eq!(ctx.memory.pc, 0x1001);
        assert_eq!(ctx.memory.offset_pc, Some(0x2001));
    }

    #[test]
    fn set_offset_pc_rejected_without_opt_bit_2() {
        let mut engine = Engine::new();
        let mut ctx = ctx_at(0x1000);
        assert!(matches!(
            engine.handle_directive(&mut ctx, Directive::SetOffsetPc(0x2000)),
            Err(Error::OffsetRequiresOpt2)
        ));
    }

    #[test]
    fn guard_directive_then_emit_fails() {
        let mut engine = Engine::new();
        let mut ctx = ctx_at(0x8000);
        engine.handle_directive(&mut ctx, Directive::Guard(0x8000, 1)).unwrap();
        assert!(matches!(
            engine.handle_directive(&mut ctx, Directive::EquB(vec![0])),
            Err(Error::Memory(crate::memory::Error::GuardHit(0x8000)))
        ));
    }

    #[test]
    fn save_directive_is_queued_not_written_immediately() {
        let mut engine = Engine::new();
        let mut ctx = ctx_at(0x1000);
        engine
            .handle_directive(
                &mut ctx,
                Directive::Save {
                    name: "CODE".to_string(),
                    start: 0x1000,
                    end: 0x1010,
                    exec: None,
                    reload: false,
                },
            )
            .unwrap();
        assert_eq!(engine.saves.len(), 1);
        assert_eq!(engine.saves[0].exec, 0x1000);
    }

    #[test]
    fn brace_scope_push_and_pop() {
        let mut engine = Engine::new();
        let mut ctx = ctx_at(0x1000);
        engine.handle_directive(&mut ctx, Directive::PushBrace).unwrap();
        ctx.symbols.add("local", Symbol::Scalar(1.0), true).unwrap();
        engine.handle_directive(&mut ctx, Directive::PopScope).unwrap();
        assert!(!ctx.symbols.dump(false, false).contains("local@"));
    }

    #[test]
    fn pass_one_defaults_unresolved_general_expr_to_pc() {
        let mut ctx = ctx_at(0x1000);
        // "undefined" is not in the symbol table: pass 1 must not fail,
        // substituting P% (0x1000) so a 16-bit mode is assumed.
        assemble(&mut ctx, "JMP", "undefined").unwrap();
        assert_eq!(ctx.memory.peek(0x1000).unwrap(), 0x4C);
    }

    #[test]
    fn pass_two_treats_unresolved_symbol_as_fatal() {
        let mut ctx = ctx_at(0x1000);
        ctx.memory.initialise_pass(Pass::Two);
        assert!(matches!(assemble(&mut ctx, "JMP", "undefined"), Err(Error::SymbolNotDefined)));
    }

    #[test]
    fn equs_applies_mapchar_translation() {
        let mut engine = Engine::new();
        let mut ctx = ctx_at(0x1000);
        ctx.memory.set_mapping(b'A', b'Z');
        engine.handle_directive(&mut ctx, Directive::EquS("A".to_string())).unwrap();
        assert_eq!(ctx.memory.peek(0x1000).unwrap(), b'Z');
    }
}
