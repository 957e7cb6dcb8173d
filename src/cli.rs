//! Thin command-line front end.
//!
//! The real lexer and expression evaluator are an external collaborator
//! (see [`crate::eval`]); this module supplies one concrete, self
//! contained implementation of [`ExprEvaluator`] so the `beebasm` binary
//! has something to drive [`Engine`] with end to end. It understands
//! labels, the directive set and a small arithmetic grammar over `&hex`,
//! decimal literals and symbol names — enough for real assembly source,
//! not a claim to the original line parser's full feature set.

use std::fs;
use std::path::PathBuf;

use clap::Parser;

use crate::context::AssemblyContext;
use crate::disc::DiscImage;
use crate::engine::{self, Directive, Engine};
use crate::error::AsmError;
use crate::eval::{EvalOutcome, ExprEvaluator};
use crate::memory::Pass;
use crate::symtab::Symbol;

/// Command-line flags, mirroring the upstream tool's flat flag set.
#[derive(Debug, Parser)]
#[command(name = "beebasm", about = "Cross-assembler for the 6502/65C02 and BBC BASIC")]
pub struct Cli {
    /// Source files, assembled in the order given.
    #[arg(short = 'i', long = "input", required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,

    /// Raw object output: the bytes of the first `SAVE` region.
    #[arg(short = 'o', long = "output")]
    pub object_output: Option<PathBuf>,

    /// DFS disc image output; one file per `SAVE` directive encountered.
    #[arg(long = "do")]
    pub disc_output: Option<PathBuf>,

    #[arg(long = "title", default_value = "")]
    pub disc_title: String,

    #[arg(long = "boot")]
    pub boot_file: Option<String>,

    #[arg(long = "opt", default_value_t = 0)]
    pub disc_opt: u8,

    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// `name` or `name=value`, repeatable, command-line-origin symbols.
    #[arg(short = 'D', long = "define")]
    pub defines: Vec<String>,

    /// Writes every label symbol out as genuine JSON (an addition on
    /// top of the frozen, non-JSON symbol-dump format `SymbolTable`
    /// itself produces).
    #[arg(long = "dump-json")]
    pub dump_json: Option<PathBuf>,
}

/// Runs one assembly job end to end. Returns the process exit code
/// (0 on success, 1 if any source line reported an error).
pub fn run(cli: &Cli) -> Result<i32, AsmError> {
    crate::log::init(cli.verbose);

    let mut sources = Vec::with_capacity(cli.inputs.len());
    for path in &cli.inputs {
        sources.push(fs::read_to_string(path)?);
    }

    let mut ctx = AssemblyContext::new();
    for def in &cli.defines {
        ctx.symbols.add_command_line(def)?;
    }

    let mut engine = Engine::new();
    if let Err(e) = assemble_sources(&mut ctx, &mut engine, &sources) {
        tracing::error!(%e, "assembly failed");
        return Ok(1);
    }

    if let Some(path) = &cli.object_output {
        match engine.saves.first() {
            Some(save) => {
                let bytes = &ctx.memory.image()[save.start as usize..save.end as usize];
                fs::write(path, bytes)?;
            }
            None => tracing::warn!("no SAVE directive encountered; object output not written"),
        }
    }

    if let Some(path) = &cli.dump_json {
        let json = serde_json::to_string_pretty(&ctx.symbols.dump_json())
            .map_err(|e| AsmError::Io(e.to_string()))?;
        fs::write(path, json)?;
    }

    if let Some(path) = &cli.disc_output {
        let mut disc = DiscImage::new(&cli.disc_title, cli.disc_opt, cli.boot_file.as_deref())?;
        for save in &engine.saves {
            let bytes = &ctx.memory.image()[save.start as usize..save.end as usize];
            disc.add_file(&save.name, bytes, save.start, save.exec, bytes.len())?;
        }
        disc.save(path)?;
    }

    Ok(0)
}

/// Drives both assembly passes over `sources`, in order.
pub(crate) fn assemble_sources(
    ctx: &mut AssemblyContext,
    engine: &mut Engine,
    sources: &[String],
) -> Result<(), AsmError> {
    for pass in [Pass::One, Pass::Two] {
        engine.begin_pass(ctx, pass);
        for source in sources {
            for line in source.lines() {
                process_line(engine, ctx, line)?;
            }
        }
    }
    Ok(())
}

fn process_line(engine: &mut Engine, ctx: &mut AssemblyContext, line: &str) -> Result<(), AsmError> {
    let mut p = LineCursor::new(strip_comment(line));
    p.skip_ws();
    if p.at_end() {
        return Ok(());
    }

    if p.accept_char('{') {
        return Ok(engine.handle_directive(ctx, Directive::PushBrace)?);
    }
    if p.accept_char('}') {
        return Ok(engine.handle_directive(ctx, Directive::PopScope)?);
    }

    if p.accept_char('.') {
        let name = p
            .take_identifier()
            .ok_or_else(|| AsmError::Io("expected a label name after '.'".to_string()))?;
        define_label(ctx, &name)?;
        p.skip_ws();
        if p.at_end() {
            return Ok(());
        }
    }

    let word = match p.peek_identifier() {
        Some(w) => w,
        None => return Ok(()),
    };

    match word.to_ascii_uppercase().as_str() {
        "CPU" => {
            p.take_identifier();
            let n = eval_required(ctx, &mut p)?;
            engine.handle_directive(ctx, Directive::SetCpu(n as u8))?;
        }
        "ORG" => {
            p.take_identifier();
            let a = eval_required(ctx, &mut p)?;
            engine.handle_directive(ctx, Directive::SetPc(a as u32))?;
        }
        "OPT" => {
            p.take_identifier();
            let n = eval_required(ctx, &mut p)?;
            engine.handle_directive(ctx, Directive::SetOpt(n as u8))?;
        }
        "GUARD" => {
            p.take_identifier();
            let a = eval_required(ctx, &mut p)?;
            p.expect_char(',').map_err(AsmError::Io)?;
            let len = eval_required(ctx, &mut p)?;
            engine.handle_directive(ctx, Directive::Guard(a as u32, len as u32))?;
        }
        "CLEAR" => {
            p.take_identifier();
            let s = eval_required(ctx, &mut p)?;
            p.expect_char(',').map_err(AsmError::Io)?;
            let e = eval_required(ctx, &mut p)?;
            engine.handle_directive(ctx, Directive::Clear(s as u32, e as u32))?;
        }
        "EQUB" => {
            p.take_identifier();
            let values = eval_list(ctx, &mut p)?;
            engine.handle_directive(ctx, Directive::EquB(values.into_iter().map(|v| v as u8).collect()))?;
        }
        "EQUW" => {
            p.take_identifier();
            let values = eval_list(ctx, &mut p)?;
            engine.handle_directive(ctx, Directive::EquW(values.into_iter().map(|v| v as u16).collect()))?;
        }
        "EQUD" => {
            p.take_identifier();
            let values = eval_list(ctx, &mut p)?;
            engine.handle_directive(ctx, Directive::EquD(values.into_iter().map(|v| v as u32).collect()))?;
        }
        "EQUS" => {
            p.take_identifier();
            p.skip_ws();
            let s = p.take_string().map_err(AsmError::Io)?;
            engine.handle_directive(ctx, Directive::EquS(s))?;
        }
        "INCBIN" => {
            p.take_identifier();
            p.skip_ws();
            let path = p.take_string().map_err(AsmError::Io)?;
            let bytes = fs::read(&path)?;
            engine.handle_directive(ctx, Directive::IncBin(bytes))?;
        }
        "MAPCHAR" => {
            p.take_identifier();
            let a = eval_required(ctx, &mut p)?;
            p.expect_char(',').map_err(AsmError::Io)?;
            let n = eval_required(ctx, &mut p)?;
            engine.handle_directive(ctx, Directive::MapChar(a as u8, n as u8))?;
        }
        "SAVE" => parse_save(engine, ctx, &mut p)?,
        "FOR" => {
            p.take_identifier();
            p.skip_ws();
            let name = p
                .take_identifier()
                .ok_or_else(|| AsmError::Io("expected induction variable after FOR".to_string()))?;
            p.expect_char('=').map_err(AsmError::Io)?;
            let value = eval_required(ctx, &mut p)?;
            // Driving the loop body across multiple iterations is the
            // line parser's job (see module docs); this front end only
            // opens the induction variable's scope once.
            engine.handle_directive(ctx, Directive::PushFor { name, value })?;
        }
        "NEXT" => {
            p.take_identifier();
            engine.handle_directive(ctx, Directive::PopScope)?;
        }
        _ => {
            if !try_assignment(engine, ctx, &mut p, &word)? {
                match Engine::recognize_instruction(ctx.options.cpu, p.remaining()) {
                    Some((def, len)) => {
                        p.advance(len);
                        engine.assemble_instruction(ctx, &mut p, def)?;
                    }
                    None => {
                        return Err(AsmError::Io(format!(
                            "'{word}' is not a recognised directive or instruction"
                        )));
                    }
                }
            }
        }
    }

    Ok(())
}

/// Recognises `name = expr`, including the magic `P%`/`O%` put-address
/// assignments. Returns `Ok(false)` (cursor untouched) if `word` is not
/// followed by `=`, so the caller can fall through to instruction
/// recognition.
fn try_assignment(
    engine: &mut Engine,
    ctx: &mut AssemblyContext,
    p: &mut LineCursor,
    word: &str,
) -> Result<bool, AsmError> {
    let saved = p.pos;
    p.take_identifier();
    p.skip_ws();
    if !p.accept_char('=') {
        p.pos = saved;
        return Ok(false);
    }

    let value = eval_required(ctx, p)?;
    match word {
        "P%" => engine.handle_directive(ctx, Directive::SetPc(value as u32))?,
        "O%" => engine.handle_directive(ctx, Directive::SetOffsetPc(value as u32))?,
        _ => {
            if ctx.symbols.is_defined(word) {
                ctx.symbols.change(word, value)?;
            } else {
                ctx.symbols.add(word, Symbol::Scalar(value), false)?;
            }
        }
    }
    Ok(true)
}

fn parse_save(engine: &mut Engine, ctx: &mut AssemblyContext, p: &mut LineCursor) -> Result<(), AsmError> {
    p.take_identifier();
    p.skip_ws();
    let name = p.take_string().map_err(AsmError::Io)?;
    p.expect_char(',').map_err(AsmError::Io)?;
    let start = eval_required(ctx, p)?;
    p.expect_char(',').map_err(AsmError::Io)?;
    let end = eval_required(ctx, p)?;

    let mut exec = None;
    let mut reload = false;
    p.skip_ws();
    if p.accept_char(',') {
        exec = Some(eval_required(ctx, p)? as u32);
        p.skip_ws();
        if p.accept_char(',') {
            reload = eval_required(ctx, p)? != 0.0;
        }
    }

    engine.handle_directive(
        ctx,
        Directive::Save { name, start: start as u32, end: end as u32, exec, reload },
    )?;
    Ok(())
}

fn define_label(ctx: &mut AssemblyContext, name: &str) -> Result<(), AsmError> {
    let addr = ctx.memory.pc as f64;
    if ctx.memory.current_pass() == Pass::One {
        ctx.symbols.add(name, Symbol::Scalar(addr), true)?;
    } else {
        ctx.symbols.change(name, addr)?;
    }
    Ok(())
}

fn eval_required(ctx: &mut AssemblyContext, p: &mut LineCursor) -> Result<f64, AsmError> {
    Ok(engine::resolve(ctx, p, false, ctx.memory.pc as f64)?)
}

fn eval_list(ctx: &mut AssemblyContext, p: &mut LineCursor) -> Result<Vec<f64>, AsmError> {
    let mut out = Vec::new();
    loop {
        p.skip_ws();
        if p.peek_char() == Some('"') {
            let s = p.take_string().map_err(AsmError::Io)?;
            out.extend(s.bytes().map(|b| b as f64));
        } else {
            out.push(eval_required(ctx, p)?);
        }
        p.skip_ws();
        if !p.accept_char(',') {
            break;
        }
    }
    Ok(out)
}

fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    for (i, b) in line.bytes().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b';' if !in_quotes => return &line[..i],
            _ => {}
        }
    }
    line
}

enum ExprError {
    Unresolved,
    Message(String),
}

/// A minimal hand-rolled scanner over one source line, doubling as the
/// reference [`ExprEvaluator`] implementation.
struct LineCursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> LineCursor<'a> {
    fn new(text: &'a str) -> Self {
        LineCursor { text, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.remaining().trim_start().is_empty()
    }

    fn peek_char(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek_char(), Some(' ') | Some('\t')) {
            self.pos += 1;
        }
    }

    fn accept_char(&mut self, c: char) -> bool {
        if self.peek_char() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect_char(&mut self, c: char) -> Result<(), String> {
        self.skip_ws();
        if self.accept_char(c) {
            Ok(())
        } else {
            Err(format!("expected '{c}'"))
        }
    }

    fn advance(&mut self, n: usize) {
        self.pos += n;
    }

    fn is_ident_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '_' || c == '%' || c == '$'
    }

    fn peek_identifier_str(&self) -> Option<&'a str> {
        let rest = self.remaining();
        let mut chars = rest.char_indices();
        let (_, first) = chars.next()?;
        if !first.is_ascii_alphabetic() {
            return None;
        }
        let mut end = first.len_utf8();
        for (i, c) in chars {
            if Self::is_ident_char(c) {
                end = i + c.len_utf8();
            } else {
                break;
            }
        }
        Some(&rest[..end])
    }

    fn peek_identifier(&self) -> Option<String> {
        self.peek_identifier_str().map(str::to_string)
    }

    fn take_identifier(&mut self) -> Option<String> {
        let ident = self.peek_identifier_str()?.to_string();
        self.pos += ident.len();
        Some(ident)
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while self.peek_char().map(&pred).unwrap_or(false) {
            self.pos += 1;
        }
        self.text[start..self.pos].to_string()
    }

    fn take_string(&mut self) -> Result<String, String> {
        self.skip_ws();
        if !self.accept_char('"') {
            return Err("expected a quoted string".to_string());
        }
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c == '"' {
                break;
            }
            self.pos += c.len_utf8();
        }
        if self.pos >= self.text.len() {
            return Err("unterminated string literal".to_string());
        }
        let s = self.text[start..self.pos].to_string();
        self.pos += 1;
        Ok(s)
    }

    fn parse_expr(&mut self, ctx: &AssemblyContext) -> Result<f64, ExprError> {
        let mut v = self.parse_term(ctx)?;
        loop {
            self.skip_ws();
            if self.accept_char('+') {
                v += self.parse_term(ctx)?;
            } else if self.accept_char('-') {
                v -= self.parse_term(ctx)?;
            } else {
                break;
            }
        }
        Ok(v)
    }

    fn parse_term(&mut self, ctx: &AssemblyContext) -> Result<f64, ExprError> {
        let mut v = self.parse_factor(ctx)?;
        loop {
            self.skip_ws();
            if self.accept_char('*') {
                v *= self.parse_factor(ctx)?;
            } else if self.accept_char('/') {
                let rhs = self.parse_factor(ctx)?;
                if rhs == 0.0 {
                    return Err(ExprError::Message("division by zero".to_string()));
                }
                v /= rhs;
            } else {
                break;
            }
        }
        Ok(v)
    }

    fn parse_factor(&mut self, ctx: &AssemblyContext) -> Result<f64, ExprError> {
        self.skip_ws();
        if self.accept_char('-') {
            return Ok(-self.parse_factor(ctx)?);
        }
        if self.accept_char('(') {
            let v = self.parse_expr(ctx)?;
            self.skip_ws();
            if !self.accept_char(')') {
                return Err(ExprError::Message("mismatched parentheses".to_string()));
            }
            return Ok(v);
        }
        if self.accept_char('&') {
            let hex = self.take_while(|c| c.is_ascii_hexdigit());
            if hex.is_empty() {
                return Err(ExprError::Message("expected hex digits after '&'".to_string()));
            }
            return i64::from_str_radix(&hex, 16)
                .map(|v| v as f64)
                .map_err(|_| ExprError::Message(format!("bad hex literal &{hex}")));
        }
        if self.peek_char().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            let digits = self.take_while(|c| c.is_ascii_digit() || c == '.');
            return digits
                .parse::<f64>()
                .map_err(|_| ExprError::Message(format!("bad number literal {digits}")));
        }
        if let Some(name) = self.take_identifier() {
            return match ctx.symbols.get(&name) {
                Some(Symbol::Scalar(v)) => Ok(*v),
                Some(Symbol::Stack(s)) => Ok(*s.last().unwrap_or(&0.0)),
                None => Err(ExprError::Unresolved),
            };
        }
        Err(ExprError::Message("expected an operand".to_string()))
    }
}

impl<'a> ExprEvaluator for LineCursor<'a> {
    fn eval_number(&mut self, ctx: &mut AssemblyContext, _allow_close_paren: bool) -> EvalOutcome {
        self.skip_ws();
        match self.parse_expr(ctx) {
            Ok(v) => EvalOutcome::Value(v),
            Err(ExprError::Unresolved) => EvalOutcome::Unresolved,
            Err(ExprError::Message(m)) => EvalOutcome::Error(m),
        }
    }

    fn eval_string(&mut self, _ctx: &mut AssemblyContext) -> Result<String, String> {
        self.take_string()
    }

    fn peek_token(&self) -> Option<&str> {
        self.peek_identifier_str()
    }

    fn accept_char(&mut self, c: char) -> bool {
        LineCursor::accept_char(self, c)
    }

    fn accept_token(&mut self, token: &str) -> bool {
        self.skip_ws();
        let rest = self.remaining();
        if rest.len() >= token.len() && rest[..token.len()].eq_ignore_ascii_case(token) {
            let boundary_ok = rest[token.len()..]
                .chars()
                .next()
                .map(|c| !Self::is_ident_char(c))
                .unwrap_or(true);
            if boundary_ok {
                self.pos += token.len();
                return true;
            }
        }
        false
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
        self.remaining().trim_start().is_empty()
    }
}
