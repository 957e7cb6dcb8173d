//! Two-pass 6502/65C02 cross-assembler, object memory model, BBC BASIC
//! token codec and DFS disc image packager.

pub mod error;

/// Opcode table, addressing modes, cycle counting
pub mod opcodes;
/// 64KiB object memory and its parallel per-byte flag array
pub mod memory;
/// Scalar/stack symbols, scope stack, command-line overrides
pub mod symtab;
/// Expression evaluator trait boundary
pub mod eval;
/// Two-pass assembly engine and directive dispatch
pub mod engine;
/// Owning context threaded through assembly (replaces process-global state)
pub mod context;
/// Lehmer pseudo-random generator for RANDOMIZE/RND
pub mod random;
/// DFS disc image packaging
pub mod disc;

/// BBC BASIC plain-text <-> tokenised codec
pub mod basic {
    pub mod export;
    pub mod import;
    pub mod keywords;
    pub mod linenum;

    pub use self::export::detokenise;
    pub use self::import::tokenise;
}

/// tracing-subscriber setup
pub mod log;

/// Argument parsing and the reference line parser behind `bin/beebasm.rs`
pub mod cli;

pub use self::context::AssemblyContext;
pub use self::engine::Engine;
pub use self::error::AsmError;
pub use self::memory::ObjectMemory;
pub use self::symtab::SymbolTable;
