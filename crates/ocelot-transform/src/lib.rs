//! IR Transformations for Ocelot
//!
//! This crate contains the passes that run on the instruction IR:
//! - Free-variable analysis
//! - Closure conversion (with known-function optimization)
//! - Verification of converted programs

pub mod closure;
pub mod error;
pub mod free_vars;
pub mod verify;

// Re-export main transformation functions
pub use closure::{
    classify, convert_closures, Classification, ConvertOptions, Decision, FunKind, Materialize,
};
pub use error::ClosureError;
pub use free_vars::{free_vars, free_vars_from, function_free_vars, KnownFunctions, NameSet};
pub use verify::{verify, Violation};
