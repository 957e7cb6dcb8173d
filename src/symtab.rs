//! Symbol table: scalar and stack (`FOR`-induction) symbols, the `{ }`
//! / `FOR`/`NEXT` scope stack, and the command-line override precedence
//! rule.

use std::collections::hash_map::Entry as MapEntry;
use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("symbol '{0}' is already defined")]
    AlreadyDefined(String),

    #[error("symbol '{0}' is not defined")]
    NotDefined(String),

    #[error("symbol '{0}' is not a label")]
    NotALabel(String),

    #[error("symbol '{0}' is not a stack")]
    NotAStack(String),

    #[error("stack '{0}' is empty")]
    StackEmpty(String),

    #[error("cannot pop scope: no scope is open")]
    NoOpenScope,

    #[error("malformed command-line symbol definition '{0}'")]
    MalformedCommandLineDef(String),
}

/// Where a symbol's current value came from, governing the one-time
/// override rule: a `-D` command-line definition silently loses to the
/// *first* source-level `Add` of the same name, after which the name
/// behaves as an ordinary source symbol.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SymbolOrigin {
    Source,
    CommandLine,
}

#[derive(Debug, Clone)]
pub enum Symbol {
    Scalar(f64),
    Stack(Vec<f64>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Symbol,
    is_label: bool,
    origin: SymbolOrigin,
}

enum ScopeFrame {
    Brace { id: u32 },
    ForLoop { id: u32, #[allow(dead_code)] induction_symbol: String },
}

impl ScopeFrame {
    fn id(&self) -> u32 {
        match self {
            ScopeFrame::Brace { id } => *id,
            ScopeFrame::ForLoop { id, .. } => *id,
        }
    }
}

pub struct SymbolTable {
    symbols: HashMap<String, Entry>,
    scopes: Vec<ScopeFrame>,
    scope_seq: u32,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut table = SymbolTable {
            symbols: HashMap::new(),
            scopes: Vec::new(),
            scope_seq: 0,
        };
        table.install_magic_symbols();
        table
    }

    fn install_magic_symbols(&mut self) {
        for (name, value) in [
            ("PI", std::f64::consts::PI),
            ("TRUE", -1.0),
            ("FALSE", 0.0),
            // P% (the program counter) and CPU (the selected CPU level)
            // are live values the engine keeps in sync via `change`
            // before each expression evaluation; the values installed
            // here are just the initial state.
            ("P%", 0.0),
            ("O%", 0.0),
            ("CPU", 0.0),
        ] {
            self.symbols.insert(
                name.to_string(),
                Entry { value: Symbol::Scalar(value), is_label: false, origin: SymbolOrigin::Source },
            );
        }
    }

    /// Mangles `name` for the innermost open scope, matching the
    /// original's name-mangling-by-scope-id scheme so that `{ }` blocks
    /// and `FOR` loops can reuse local label names across iterations.
    /// Used when a name is being newly *written* into the current
    /// scope; `resolve_key` is used for lookups, which must also see
    /// through to enclosing scopes and to globals.
    fn mangled(&self, name: &str) -> String {
        match self.scopes.last() {
            Some(frame) => format!("{name}@{}", frame.id()),
            None => name.to_string(),
        }
    }

    /// Finds the key under which `name` is actually stored, walking
    /// outward from the innermost open scope to the outermost, then
    /// falling back to the unmangled (global) name. This is how a
    /// local label in one scope stays invisible once that scope's
    /// frame is popped, while names declared in an enclosing scope (or
    /// never scoped at all, like `P%`) remain reachable from inside
    /// nested scopes.
    fn resolve_key(&self, name: &str) -> Option<String> {
        for frame in self.scopes.iter().rev() {
            let mangled = format!("{name}@{}", frame.id());
            if self.symbols.contains_key(&mangled) {
                return Some(mangled);
            }
        }
        if self.symbols.contains_key(name) {
            Some(name.to_string())
        } else {
            None
        }
    }

    /// Adds a new symbol under source-level precedence rules. If a
    /// command-line override of the same name already exists, this call
    /// silently takes over the name (the override is consumed) rather
    /// than failing with `AlreadyDefined`.
    pub fn add(&mut self, name: &str, value: Symbol, is_label: bool) -> Result<(), Error> {
        let key = self.mangled(name);
        if let Some(existing) = self.symbols.get(&key) {
            match existing.origin {
                SymbolOrigin::CommandLine => {
                    // first source-level Add after a command-line define
                    // silently overrides it
                }
                SymbolOrigin::Source => return Err(Error::AlreadyDefined(name.to_string())),
            }
        }
        self.symbols.insert(key, Entry { value, is_label, origin: SymbolOrigin::Source });
        Ok(())
    }

    /// Parses and installs a `-D name` or `-D name=value` command-line
    /// definition. A bare name defaults to the value `1`.
    pub fn add_command_line(&mut self, def: &str) -> Result<(), Error> {
        let (name, value) = match def.split_once('=') {
            Some((name, value)) => {
                let value: f64 = value
                    .parse()
                    .map_err(|_| Error::MalformedCommandLineDef(def.to_string()))?;
                (name, value)
            }
            None => (def, 1.0),
        };

        if name.is_empty()
            || !name.chars().enumerate().all(|(i, c)| {
                c.is_ascii_alphabetic() || c == '_' || (i > 0 && c.is_ascii_digit())
            })
        {
            return Err(Error::MalformedCommandLineDef(def.to_string()));
        }

        if self.symbols.contains_key(name) {
            return Err(Error::AlreadyDefined(name.to_string()));
        }

        self.symbols.insert(
            name.to_string(),
            Entry { value: Symbol::Scalar(value), is_label: false, origin: SymbolOrigin::CommandLine },
        );
        Ok(())
    }

    /// Changes an existing scalar's value (used for `P%`/`O%` tracking
    /// and `FOR` induction-variable updates); unlike `add`, does not
    /// create a new symbol.
    pub fn change(&mut self, name: &str, value: f64) -> Result<(), Error> {
        let key = self
            .resolve_key(name)
            .ok_or_else(|| Error::NotDefined(name.to_string()))?;
        let entry = self.symbols.get_mut(&key).expect("resolve_key found it");
        entry.value = Symbol::Scalar(value);
        Ok(())
    }

    /// Looks up `name`, walking outward through enclosing scopes the
    /// way the original resolves locally-mangled labels.
    pub fn get(&self, name: &str) -> Option<&Symbol> {
        let key = self.resolve_key(name)?;
        self.symbols.get(&key).map(|e| &e.value)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn push_brace(&mut self) {
        self.scope_seq += 1;
        self.scopes.push(ScopeFrame::Brace { id: self.scope_seq });
    }

    pub fn push_for(&mut self, induction_symbol: &str) {
        self.scope_seq += 1;
        self.scopes.push(ScopeFrame::ForLoop {
            id: self.scope_seq,
            induction_symbol: induction_symbol.to_string(),
        });
    }

    pub fn pop_scope(&mut self) -> Result<(), Error> {
        self.scopes.pop().ok_or(Error::NoOpenScope)?;
        Ok(())
    }

    /// Pushes `value` onto `name`'s stack, converting a previously
    /// scalar or brand-new symbol into a one-element stack. `FOR`
    /// induction variables use this to save the enclosing value across
    /// nested loops reusing the same name.
    pub fn push_stack(&mut self, name: &str, value: f64) {
        let key = self.mangled(name);
        match self.symbols.entry(key) {
            MapEntry::Occupied(mut e) => match &mut e.get_mut().value {
                Symbol::Stack(stack) => stack.push(value),
                Symbol::Scalar(_) => e.get_mut().value = Symbol::Stack(vec![value]),
            },
            MapEntry::Vacant(e) => {
                e.insert(Entry {
                    value: Symbol::Stack(vec![value]),
                    is_label: false,
                    origin: SymbolOrigin::Source,
                });
            }
        }
    }

    /// Pops and returns the top of `name`'s stack.
    pub fn pop_stack(&mut self, name: &str) -> Result<f64, Error> {
        let key = self.mangled(name);
        let entry = self
            .symbols
            .get_mut(&key)
            .ok_or_else(|| Error::NotDefined(name.to_string()))?;
        match &mut entry.value {
            Symbol::Stack(stack) => stack.pop().ok_or_else(|| Error::StackEmpty(name.to_string())),
            Symbol::Scalar(_) => Err(Error::NotAStack(name.to_string())),
        }
    }

    pub fn is_stack(&self, name: &str) -> bool {
        matches!(self.get(name), Some(Symbol::Stack(_)))
    }

    pub fn is_empty(&self, name: &str) -> Result<bool, Error> {
        match self.get(name) {
            Some(Symbol::Stack(stack)) => Ok(stack.is_empty()),
            Some(Symbol::Scalar(_)) => Err(Error::NotAStack(name.to_string())),
            None => Err(Error::NotDefined(name.to_string())),
        }
    }

    /// Empties every stack-valued symbol, leaving scalars untouched.
    /// Used between passes so `FOR` nesting starts from a clean slate.
    pub fn reset_stacks(&mut self) {
        for entry in self.symbols.values_mut() {
            if let Symbol::Stack(stack) = &mut entry.value {
                stack.clear();
            }
        }
    }

    /// Produces the `[{'name':value L,...}]` dump format: a single
    /// object wrapped in the outer array, single-quoted keys, bare `L`
    /// suffix marking label-valued entries, names containing `@`
    /// (scope-mangled locals) excluded unless `all` is set, in which
    /// case each scope's locals follow as a nested `'@id':[{...}]`
    /// member of that same object. This is a frozen external format,
    /// not real JSON.
    pub fn dump(&self, labels_only: bool, all: bool) -> String {
        let mut top_level: Vec<(&String, &Entry)> = self
            .symbols
            .iter()
            .filter(|(name, _)| !name.contains('@'))
            .filter(|(_, e)| !labels_only || e.is_label)
            .collect();
        top_level.sort_by(|a, b| a.0.cmp(b.0));

        let mut members: Vec<String> = top_level
            .iter()
            .map(|(name, entry)| dump_one(name, entry))
            .collect();

        if all {
            let mut by_scope: HashMap<&str, Vec<(&String, &Entry)>> = HashMap::new();
            for (name, entry) in self.symbols.iter().filter(|(name, _)| name.contains('@')) {
                if labels_only && !entry.is_label {
                    continue;
                }
                let scope_id = name.rsplit('@').next().unwrap_or("");
                by_scope.entry(scope_id).or_default().push((name, entry));
            }
            let mut scope_ids: Vec<&&str> = by_scope.keys().collect();
            scope_ids.sort();
            for scope_id in scope_ids {
                let mut scope_members = by_scope[scope_id].clone();
                scope_members.sort_by(|a, b| a.0.cmp(b.0));
                let entries: Vec<String> = scope_members
                    .iter()
                    .map(|(name, entry)| format!("{{{}}}", dump_one(name, entry)))
                    .collect();
                members.push(format!("'@{scope_id}':[{}]", entries.join(",")));
            }
        }

        format!("[{{{}}}]", members.join(","))
    }
}

/// One entry of the genuinely-JSON `--dump-json` export: an addition
/// on top of the frozen `dump` format above, for tooling that wants
/// real JSON rather than the BASIC-era single-quoted dump.
#[derive(Debug, Serialize)]
pub struct JsonSymbol {
    pub name: String,
    pub value: f64,
    pub is_label: bool,
}

impl SymbolTable {
    /// Every non-scope-mangled label symbol as plain JSON, sorted by
    /// name -- a machine-readable counterpart to [`Self::dump`].
    pub fn dump_json(&self) -> Vec<JsonSymbol> {
        let mut out: Vec<JsonSymbol> = self
            .symbols
            .iter()
            .filter(|(name, e)| e.is_label && !name.contains('@'))
            .map(|(name, e)| JsonSymbol {
                name: name.clone(),
                value: match &e.value {
                    Symbol::Scalar(v) => *v,
                    Symbol::Stack(s) => *s.last().unwrap_or(&0.0),
                },
                is_label: e.is_label,
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

fn dump_one(name: &str, entry: &Entry) -> String {
    let value = match &entry.value {
        Symbol::Scalar(v) => format_value(*v),
        Symbol::Stack(stack) => format_value(*stack.last().unwrap_or(&0.0)),
    };
    let suffix = if entry.is_label { " L" } else { "" };
    format!("'{name}':{value}{suffix}")
}

fn format_value(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}
