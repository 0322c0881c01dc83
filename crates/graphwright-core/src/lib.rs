pub mod blocks;
pub mod catalog;
pub mod catalog_cache;
pub mod fixer;
pub mod ident;
pub mod layout;
pub mod patch;
pub mod schema;
mod graph;
mod validation;

pub use catalog::{BlockCatalog, BlockCategory, BlockDefinition, BlockSummary};
pub use fixer::{AppliedFix, FixOutcome, FixerSettings, GraphFixer, fix_graph};
pub use graph::*;
pub use patch::{PatchError, PatchIntent, PatchOp, apply_patch};
pub use validation::*;
