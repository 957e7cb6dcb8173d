//! The owning assembly context threaded explicitly through every
//! phase, replacing the upstream's `SymbolTable`/`ObjectCode`/`GlobalData`
//! process-global singletons with one value the caller constructs and
//! passes by `&mut`.

use crate::memory::{ObjectMemory, Pass};
use crate::opcodes::CpuLevel;
use crate::symtab::SymbolTable;

/// Assembly-wide options that used to live in a global singleton.
pub struct Options {
    pub cpu: CpuLevel,
    pub verbose: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options { cpu: CpuLevel::Nmos6502, verbose: false }
    }
}

/// Everything one assembly run needs, owned by the caller and
/// re-entrant: nothing here is global, so multiple contexts (e.g. in a
/// test harness) can coexist.
pub struct AssemblyContext {
    pub symbols: SymbolTable,
    pub memory: ObjectMemory,
    pub options: Options,
}

impl Default for AssemblyContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AssemblyContext {
    pub fn new() -> Self {
        AssemblyContext {
            symbols: SymbolTable::new(),
            memory: ObjectMemory::new(),
            options: Options::default(),
        }
    }

    /// Resets object memory for the start of `pass`, keeping symbols
    /// (pass 2 relies on what pass 1 resolved).
    pub fn begin_pass(&mut self, pass: Pass) {
        self.memory.initialise_pass(pass);
    }

    /// Mirrors the live `P%`/`O%` counters into their magic symbol-table
    /// entries. Every emit that advances the put-address must call this
    /// so that a subsequent expression referencing `P%` or `O%` sees
    /// the post-advance value, matching §4.2's "every increment also
    /// mirrors the values into the symbol table".
    pub fn sync_pc_symbols(&mut self) {
        let _ = self.symbols.change("P%", self.memory.pc as f64);
        if let Some(o) = self.memory.offset_pc {
            let _ = self.symbols.change("O%", o as f64);
        }
    }
}
