//! A sequent-calculus prover kernel built around taclets, schematic rules
//! that are matched against terms and sequents and applied to the goals of a
//! proof tree.
//!
//! On top of the kernel sit two proof analyses: [`layout`] computes the
//! possible aliasing of heap objects at a proof node and the memory layouts
//! that follow from it, and [`truth`] traces the truth values of labeled
//! formulas through a proof.

pub mod app;
pub mod condition;
pub mod executor;
pub mod index;
pub mod inst;
pub mod layout;
pub mod matching;
pub mod problem;
pub mod proof;
pub mod rules;
pub mod schema;
pub mod sequent;
pub mod side_proof;
pub mod sort;
pub mod strategy;
pub mod syntax;
pub mod taclet;
pub mod term;
pub mod truth;
pub mod util;

mod cli;
#[cfg(feature = "bin")]
pub use cli::bin;

pub use symbol_table::GlobalSymbol as Symbol;
use thiserror::Error;

pub use syntax::ParseError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("sort mismatch in {context}: expected {expected}, found {found}")]
    SortMismatch {
        context: String,
        expected: String,
        found: String,
    },
    #[error("{op} expects {expected} arguments, got {found}")]
    ArityMismatch {
        op: String,
        expected: usize,
        found: usize,
    },
    #[error("illegal instantiation of {sv}: {msg}")]
    IllegalInstantiation { sv: Symbol, msg: String },
    #[error("taclet {taclet} is not complete, uninstantiated: {missing}")]
    IncompleteApp { taclet: Symbol, missing: String },
    #[error("taclet {taclet} is not executable at {pos}")]
    NotExecutable { taclet: Symbol, pos: String },
    #[error("invalid taclet {taclet}: {msg}")]
    InvalidTaclet { taclet: Symbol, msg: String },
    #[error("{0}")]
    ProofInput(String),
    #[error("interrupted after {applied} rule applications")]
    Interrupted { applied: usize },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("IO error: {0}: {1}")]
    Io(std::path::PathBuf, std::io::Error),
    #[error("Check failed: {0}")]
    CheckFailed(String),
}
