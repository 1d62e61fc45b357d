//! Per-declaration emission state.
//!
//! A `DeclState` accumulates the two byte streams for one declaration
//! between `init_decl_state` and `commit_decl`. The code generator appends
//! line-program rows to `line_program_mut` in between.

use common::Target;
use sema::{canonical_bytes, Ty};

/// One entry of the pending type-relocation table: where a type's record
/// has been (or will be) placed in the buffer, and every four-byte site that
/// must receive its final section offset.
pub(crate) struct PendingEntry<'t> {
    pub ty: Ty<'t>,
    pub off: Option<u32>,
    pub relocs: Vec<u32>,
    /// The type cannot be emitted in this pass; its sites go to the
    /// deferred queue at commit.
    pub deferred: bool,
}

/// Pending type relocations, keyed by the canonical encoding of the type
/// (which folds in the target, so identical shapes for different targets
/// stay distinct).
#[derive(Default)]
pub(crate) struct PendingTypeRelocs<'t> {
    entries: Vec<PendingEntry<'t>>,
    index: hashbrown::HashMap<Vec<u8>, usize>,
}

impl<'t> PendingTypeRelocs<'t> {
    fn entry_index(&mut self, target: &Target, ty: Ty<'t>) -> usize {
        let mut key = Vec::new();
        canonical_bytes(ty, target, &mut key);
        if let Some(&i) = self.index.get(&key) {
            return i;
        }
        let i = self.entries.len();
        self.entries.push(PendingEntry { ty, off: None, relocs: Vec::new(), deferred: false });
        self.index.insert(key, i);
        i
    }

    /// Record that the four bytes at `site` must be patched with the final
    /// offset of `ty`'s record.
    pub fn add_reloc(&mut self, target: &Target, ty: Ty<'t>, site: u32) {
        let i = self.entry_index(target, ty);
        self.entries[i].relocs.push(site);
    }

    /// Next entry that still needs its record emitted.
    pub fn next_pending(&self) -> Option<usize> {
        self.entries.iter().position(|e| e.off.is_none() && !e.deferred)
    }

    pub fn ty(&self, i: usize) -> Ty<'t> {
        self.entries[i].ty
    }

    pub fn set_off(&mut self, i: usize, off: u32) {
        self.entries[i].off = Some(off);
    }

    pub fn mark_deferred(&mut self, i: usize) {
        self.entries[i].deferred = true;
    }

    pub fn entries(&self) -> &[PendingEntry<'t>] {
        &self.entries
    }
}

/// Accumulated emission state for one declaration.
pub struct DeclState<'t> {
    pub(crate) dbg_line: Vec<u8>,
    pub(crate) dbg_info: Vec<u8>,
    pub(crate) pending: PendingTypeRelocs<'t>,
    /// Sites whose placeholder already holds a record-relative value; the
    /// record's final offset is added at commit.
    pub(crate) self_relocs: Vec<u32>,
    pub(crate) line_vaddr_site: Option<usize>,
    pub(crate) info_low_pc_site: Option<usize>,
    pub(crate) info_high_pc_site: Option<usize>,
}

impl<'t> DeclState<'t> {
    pub(crate) fn new() -> DeclState<'t> {
        DeclState {
            dbg_line: Vec::new(),
            dbg_info: Vec::new(),
            pending: PendingTypeRelocs::default(),
            self_relocs: Vec::new(),
            line_vaddr_site: None,
            info_low_pc_site: None,
            info_high_pc_site: None,
        }
    }

    /// The line program under construction. The code generator appends its
    /// row opcodes here after the prologue.
    pub fn line_program_mut(&mut self) -> &mut Vec<u8> {
        &mut self.dbg_line
    }

    /// Current length of the line fragment.
    pub fn line_len(&self) -> usize {
        self.dbg_line.len()
    }

    /// Current length of the info fragment.
    pub fn info_len(&self) -> usize {
        self.dbg_info.len()
    }
}
