//! Instruction IR for Ocelot
//!
//! The IR is a graph of blocks, each a linked list of instructions binding
//! one identifier to one value. Blocks live in an arena (`Ir`) and are
//! addressed by index, so passes can splice instructions in O(1) without
//! aliasing hazards.

pub mod builder;
pub mod dump;
pub mod ir;
pub mod tree;

pub use builder::IrBuilder;
pub use ir::*;
pub use tree::{ProgramTree, TreeBlock, TreeFunction, TreeInsn};
