//! Semantic-layer surface consumed by the Fen linker back-end.
//!
//! The front end owns full semantic analysis; this crate carries the narrow
//! slice the back-end needs: arena-interned structural types with ABI layout
//! queries, declaration records, and the global error table.

pub mod decl;
pub mod errors;
pub mod types;

pub use decl::{Decl, DeclId, DeclKind};
pub use errors::{ErrorTable, InferredErrors};
pub use types::{
    align_up, canonical_bytes, ErrorSetKind, Field, Ty, TyCtx, TyData, UnionLayout, Variant,
};

use bumpalo::Bump;

/// Everything the back-end consumes from semantic analysis, bundled.
pub struct Analysis<'t> {
    pub types: TyCtx<'t>,
    pub errors: ErrorTable,
    pub inferred: InferredErrors,
}

impl<'t> Analysis<'t> {
    pub fn new(arena: &'t Bump) -> Analysis<'t> {
        Analysis {
            types: TyCtx::new(arena),
            errors: ErrorTable::default(),
            inferred: InferredErrors::default(),
        }
    }
}
