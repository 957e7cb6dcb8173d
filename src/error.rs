//! Crate-wide error composition.
//!
//! Each subsystem owns a concrete `Error` enum; [`AsmError`] composes
//! them with `#[from]` so a caller driving the whole pipeline can match
//! on one type while a caller using a single module (say, just the
//! BASIC codec) can work with that module's error directly.

use thiserror::Error;

use crate::basic::export::Error as BasicError;
pub use crate::basic::export::Error as BasicExportError;
use crate::disc::Error as DiscError;
use crate::engine::Error as EngineError;
use crate::memory::Error as MemoryError;
use crate::symtab::Error as SymbolError;

/// Umbrella error returned by whole-pipeline operations (assemble a
/// file, pack a disc image, run the CLI).
#[derive(Debug, Error)]
pub enum AsmError {
    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Symbol(#[from] SymbolError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Disc(#[from] DiscError),

    #[error(transparent)]
    Basic(#[from] BasicError),

    #[error("{0}")]
    Io(String),
}

impl From<std::io::Error> for AsmError {
    fn from(e: std::io::Error) -> Self {
        AsmError::Io(e.to_string())
    }
}
