//! Incremental DWARF emission for the Fen linker back-end.
//!
//! For every declaration the compiler emits, this crate produces a
//! `.debug_info` record and a `.debug_line` fragment and places them at
//! stable offsets inside the object file's debug regions. Re-emitting a
//! declaration with a larger payload relocates only that declaration's
//! record; neighbours keep their offsets, and vacated space is overwritten
//! with padding a consumer parses straight through.
//!
//! The per-declaration protocol is `init_decl_state` → code generation
//! (appending line rows to the state) → `commit_decl`. Once every
//! declaration of a compile is committed, `commit_error_set` materialises
//! the global error set and patches the references that had to wait for it.

pub mod consts;
mod die;
mod line;
mod nops;
mod records;
mod state;
mod strtab;

mod headers;

pub use line::{file_site, line_site, vaddr_site};
pub use records::{pad_to_ideal, MIN_NOP_SIZE};
pub use state::DeclState;
pub use strtab::StringTable;

use common::{create_logger, log, log_detail, Endian, Format, Logger, PtrWidth, Target};
use hashbrown::HashMap;
use objfile::{DebugSect, ObjectFile};
use records::{RecordIndex, RecordList};
use sema::{Analysis, Decl, DeclId, DeclKind, ErrorTable};
use std::fmt;
use std::io;

/// Bytes reserved at the front of `.debug_info` for the compilation-unit
/// header; the first record is placed at `pad_to_ideal` of this.
pub const INFO_HEADER_BYTES: u32 = 120;

/// Errors surfaced by the emitter.
#[derive(Debug)]
pub enum EmitError {
    /// Record or offset space is exhausted.
    OutOfMemory,
    /// A write or copy did not complete.
    InputOutput(io::Error),
    /// Pointer width outside the representable 1..=64 bits.
    UnsupportedTarget(u16),
    /// A commit arrived after the global error set was finalised.
    ErrorSetFinalized,
}

impl fmt::Display for EmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitError::OutOfMemory => write!(f, "out of record space"),
            EmitError::InputOutput(e) => write!(f, "io error: {}", e),
            EmitError::UnsupportedTarget(bits) => {
                write!(f, "unsupported pointer width: {} bits", bits)
            }
            EmitError::ErrorSetFinalized => {
                write!(f, "declaration committed after the error set was finalised")
            }
        }
    }
}

impl std::error::Error for EmitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EmitError::InputOutput(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for EmitError {
    fn from(e: io::Error) -> Self {
        EmitError::InputOutput(e)
    }
}

/// The incremental DWARF emitter.
pub struct Dwarf {
    target: Target,
    root_src_path: String,
    log: Logger,
    strtab: StringTable,
    atoms: RecordList,
    src_fns: RecordList,
    atom_by_decl: HashMap<DeclId, RecordIndex>,
    src_fn_by_decl: HashMap<DeclId, RecordIndex>,
    /// Section-relative sites awaiting the global error set's offset.
    deferred_relocs: Vec<u32>,
    error_set_atom: Option<RecordIndex>,
    error_set_committed: bool,
}

impl Dwarf {
    /// Build an emitter for one compilation unit rooted at `root_src_path`.
    pub fn new(
        ptr_bits: u16,
        endian: Endian,
        format: Format,
        root_src_path: &str,
    ) -> Result<Dwarf, EmitError> {
        let ptr_width =
            PtrWidth::from_bits(ptr_bits).ok_or(EmitError::UnsupportedTarget(ptr_bits))?;
        let target = match format {
            Format::Elf => Target::elf(ptr_width, endian),
            Format::MachO => Target::macho(ptr_width),
        };
        Ok(Dwarf {
            target,
            root_src_path: root_src_path.to_string(),
            log: create_logger("dwarf"),
            strtab: StringTable::new(),
            atoms: RecordList::new(),
            src_fns: RecordList::new(),
            atom_by_decl: HashMap::new(),
            src_fn_by_decl: HashMap::new(),
            deferred_relocs: Vec::new(),
            error_set_atom: None,
            error_set_committed: false,
        })
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Intern a string into `.debug_str`, returning its stable offset.
    pub fn make_string(&mut self, s: &str) -> u32 {
        self.strtab.make_string(s)
    }

    /// The `.debug_str` contents for the object writer to flush.
    pub fn string_bytes(&self) -> &[u8] {
        self.strtab.bytes()
    }

    /// Begin emission of one declaration. Functions get their line-program
    /// prologue and subprogram opening; the code generator then appends row
    /// opcodes via [`DeclState::line_program_mut`].
    pub fn init_decl_state<'t>(&mut self, decl: &Decl<'t>) -> Result<DeclState<'t>, EmitError> {
        if self.error_set_committed {
            return Err(EmitError::ErrorSetFinalized);
        }
        let mut state = DeclState::new();
        if let DeclKind::Fn { ret, lbrace_line } = decl.kind {
            line::write_prologue(&mut state, &self.target, decl.src_line, lbrace_line);
            die::write_subprogram(&mut state, &self.target, decl, ret);
        }
        Ok(state)
    }

    /// Finish one declaration: close both fragments, place every referenced
    /// type, assign or regrow the declaration's slots, and write the bytes.
    ///
    /// `sym_addr` and `sym_size` are the function's final virtual address
    /// and machine-code size from the code generator.
    pub fn commit_decl<'t>(
        &mut self,
        obj: &mut dyn ObjectFile,
        analysis: &mut Analysis<'t>,
        decl: &Decl<'t>,
        sym_addr: u64,
        sym_size: u32,
        mut state: DeclState<'t>,
    ) -> Result<(), EmitError> {
        if self.error_set_committed {
            return Err(EmitError::ErrorSetFinalized);
        }
        if !decl.is_fn() {
            // Global variables have no debug representation yet.
            return Ok(());
        }
        let endian = self.target.data_endian();
        let ptr = self.target.ptr_bytes();

        line::write_end_sequence(&mut state.dbg_line);
        if let Some(at) = state.line_vaddr_site {
            patch_addr(&mut state.dbg_line, at, endian, ptr, sym_addr);
        }

        if let Some(at) = state.info_low_pc_site {
            patch_addr(&mut state.dbg_info, at, endian, ptr, sym_addr);
        }
        if let Some(at) = state.info_high_pc_site {
            patch_u32(&mut state.dbg_info, at, endian, sym_size);
        }
        state.dbg_info.push(0); // end of subprogram children

        // Walk the pending table until every referenced type is placed in
        // this record or deferred to the error-set pass.
        loop {
            let i = match state.pending.next_pending() {
                Some(i) => i,
                None => break,
            };
            let ty = state.pending.ty(i);
            if die::is_unresolved_error_set(ty, &analysis.inferred) {
                state.pending.mark_deferred(i);
                continue;
            }
            state.pending.set_off(i, state.dbg_info.len() as u32);
            let mut em = die::TypeEmitter {
                buf: &mut state.dbg_info,
                pending: &mut state.pending,
                self_relocs: &mut state.self_relocs,
                types: &mut analysis.types,
                errors: &analysis.errors,
                inferred: &analysis.inferred,
                target: self.target,
                log: &self.log,
            };
            em.emit(ty);
        }

        // .debug_line slot
        let fn_idx = match self.src_fn_by_decl.get(&decl.id) {
            Some(&i) => i,
            None => {
                let i = self.src_fns.new_record()?;
                self.src_fn_by_decl.insert(decl.id, i);
                i
            }
        };
        let line_header = self.line_header_bytes();
        let vacated =
            self.src_fns.allocate_or_grow(fn_idx, state.dbg_line.len() as u32, line_header)?;
        if let Some((off, len)) = vacated {
            log!(self.log, "{} moved its line fragment from 0x{:x}", decl.name, off);
            let pos = obj.sect(DebugSect::Line);
            nops::fill_line(obj, pos.offset + off as u64, len)?;
        }
        self.grow_section(obj, DebugSect::Line, self.line_section_used())?;
        self.write_line_record(obj, fn_idx, &state.dbg_line)?;

        // .debug_info slot
        let atom_idx = match self.atom_by_decl.get(&decl.id) {
            Some(&i) => i,
            None => {
                let i = self.atoms.new_record()?;
                self.atom_by_decl.insert(decl.id, i);
                i
            }
        };
        let vacated =
            self.atoms.allocate_or_grow(atom_idx, state.dbg_info.len() as u32, INFO_HEADER_BYTES)?;
        if let Some((off, len)) = vacated {
            log!(self.log, "{} moved its info record from 0x{:x}", decl.name, off);
            let pos = obj.sect(DebugSect::Info);
            nops::fill_info(obj, pos.offset + off as u64, len)?;
        }
        self.grow_section(obj, DebugSect::Info, self.info_section_used())?;

        // Rebase type references now the record's final offset is known.
        let atom_off = self.atoms.get(atom_idx).off;
        for entry in state.pending.entries() {
            match entry.off {
                Some(off) => {
                    for &site in &entry.relocs {
                        patch_u32(&mut state.dbg_info, site as usize, endian, atom_off + off);
                    }
                }
                None => {
                    // Sites of unresolved error sets wait for the final
                    // error-set pass.
                    for &site in &entry.relocs {
                        self.deferred_relocs.push(atom_off + site);
                    }
                }
            }
        }
        for &site in &state.self_relocs {
            let at = site as usize;
            let mut stored = [0u8; 4];
            stored.copy_from_slice(&state.dbg_info[at..at + 4]);
            let cur = endian.read_u32(stored);
            patch_u32(&mut state.dbg_info, at, endian, cur + atom_off);
        }

        self.write_info_record(obj, atom_idx, &state.dbg_info)?;
        Ok(())
    }

    /// Drop a declaration's slots. The records are unlinked and their bytes
    /// overwritten with padding; the space is remembered in the free sets.
    pub fn free_decl(&mut self, obj: &mut dyn ObjectFile, id: DeclId) -> Result<(), EmitError> {
        if let Some(idx) = self.src_fn_by_decl.remove(&id) {
            let rec = *self.src_fns.get(idx);
            let pos = obj.sect(DebugSect::Line);
            nops::fill_line(obj, pos.offset + rec.off as u64, rec.len)?;
            self.src_fns.free_record(idx);
            self.grow_section(obj, DebugSect::Line, self.line_section_used())?;
        }
        if let Some(idx) = self.atom_by_decl.remove(&id) {
            let rec = *self.atoms.get(idx);
            let pos = obj.sect(DebugSect::Info);
            nops::fill_info(obj, pos.offset + rec.off as u64, rec.len)?;
            self.atoms.free_record(idx);
            self.grow_section(obj, DebugSect::Info, self.info_section_used())?;
        }
        log_detail!(self.log, "freed decl {}", id.0);
        Ok(())
    }

    /// Materialise the global error set and patch every deferred reference.
    /// Runs once, after the last `commit_decl` of the compile.
    pub fn commit_error_set(
        &mut self,
        obj: &mut dyn ObjectFile,
        errors: &ErrorTable,
    ) -> Result<(), EmitError> {
        if self.error_set_committed {
            return Err(EmitError::ErrorSetFinalized);
        }
        let endian = self.target.data_endian();
        let mut buf = Vec::new();
        die::write_error_set_die(&mut buf, endian, "anyerror", errors.iter());

        let idx = match self.error_set_atom {
            Some(i) => i,
            None => {
                let i = self.atoms.new_record()?;
                self.error_set_atom = Some(i);
                i
            }
        };
        let vacated = self.atoms.allocate_or_grow(idx, buf.len() as u32, INFO_HEADER_BYTES)?;
        if let Some((off, len)) = vacated {
            let pos = obj.sect(DebugSect::Info);
            nops::fill_info(obj, pos.offset + off as u64, len)?;
        }
        self.grow_section(obj, DebugSect::Info, self.info_section_used())?;
        self.write_info_record(obj, idx, &buf)?;

        let off = self.atoms.get(idx).off;
        let pos = obj.sect(DebugSect::Info);
        let patched = self.deferred_relocs.len();
        while let Some(r) = self.deferred_relocs.pop() {
            obj.pwrite_all(&endian.u32_bytes(off), pos.offset + r as u64)?;
        }
        log!(self.log, "error set committed at 0x{:x}, {} sites patched", off, patched);
        self.error_set_committed = true;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Section bookkeeping
    // ------------------------------------------------------------------

    /// Used bytes of `.debug_info`: the records plus the byte that closes
    /// the compilation unit's child list.
    fn info_section_used(&self) -> u64 {
        match self.atoms.last {
            Some(_) => self.atoms.used_end() as u64 + 1,
            None => INFO_HEADER_BYTES as u64,
        }
    }

    fn line_section_used(&self) -> u64 {
        match self.src_fns.last {
            Some(_) => self.src_fns.used_end() as u64,
            None => self.line_header_bytes() as u64,
        }
    }

    /// Exact byte length of the `.debug_line` program header for this unit.
    fn line_header_bytes(&self) -> u32 {
        let t = &self.target;
        t.initial_len_bytes()            // unit length
            + 2                          // version
            + t.sect_off_bytes()         // header length
            + 6                          // scalar header fields
            + 12                         // standard opcode lengths
            + 1                          // empty include directories
            + self.root_src_path.len() as u32 + 1 + 3 // one file entry
            + 1                          // end of file table
    }

    /// Grow (or shrink) a section to `needed` used bytes, relocating it to
    /// fresh file space when its current slot is too small.
    fn grow_section(
        &self,
        obj: &mut dyn ObjectFile,
        s: DebugSect,
        needed: u64,
    ) -> Result<(), EmitError> {
        let pos = obj.sect(s);
        if needed > obj.allocated_size(pos.offset) {
            let new_off = obj.find_free_space(records::pad_to_ideal_u64(needed), 1);
            log_detail!(self.log, "{} -> 0x{:x} ({} bytes)", s.name(), new_off, needed);
            obj.copy_range_all(pos.offset, new_off, pos.size)?;
            obj.set_sect_offset(s, new_off);
        }
        obj.set_sect_size(s, needed);
        obj.mark_sect_table_dirty();
        obj.mark_sect_dirty(s);
        Ok(())
    }

    fn write_line_record(
        &self,
        obj: &mut dyn ObjectFile,
        idx: RecordIndex,
        payload: &[u8],
    ) -> Result<(), EmitError> {
        let rec = *self.src_fns.get(idx);
        let pos = obj.sect(DebugSect::Line);
        let prev_pad = match rec.prev {
            Some(p) => {
                let pr = self.src_fns.get(p);
                rec.off - (pr.off + pr.len)
            }
            None => 0,
        };
        let next_pad = match rec.next {
            Some(n) => self.src_fns.get(n).off - (rec.off + rec.len),
            None => 0,
        };
        nops::pwrite_line_fragment(obj, pos.offset + rec.off as u64, prev_pad, payload, next_pad)?;
        Ok(())
    }

    fn write_info_record(
        &self,
        obj: &mut dyn ObjectFile,
        idx: RecordIndex,
        payload: &[u8],
    ) -> Result<(), EmitError> {
        let rec = *self.atoms.get(idx);
        let pos = obj.sect(DebugSect::Info);
        let prev_pad = match rec.prev {
            Some(p) => {
                let pr = self.atoms.get(p);
                rec.off - (pr.off + pr.len)
            }
            None => 0,
        };
        let next_pad = match rec.next {
            Some(n) => self.atoms.get(n).off - (rec.off + rec.len),
            None => 0,
        };
        nops::pwrite_info_fragment(
            obj,
            pos.offset + rec.off as u64,
            prev_pad,
            payload,
            next_pad,
            rec.next.is_none(),
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Introspection, used by the driver's sanity checks and by tests
    // ------------------------------------------------------------------

    /// `(off, len)` of a declaration's `.debug_info` record.
    pub fn decl_info_slot(&self, id: DeclId) -> Option<(u32, u32)> {
        self.atom_by_decl.get(&id).map(|&i| {
            let r = self.atoms.get(i);
            (r.off, r.len)
        })
    }

    /// `(off, len)` of a declaration's `.debug_line` fragment.
    pub fn decl_line_slot(&self, id: DeclId) -> Option<(u32, u32)> {
        self.src_fn_by_decl.get(&id).map(|&i| {
            let r = self.src_fns.get(i);
            (r.off, r.len)
        })
    }

    /// `(off, len)` of the global error set's record, once committed.
    pub fn error_set_slot(&self) -> Option<(u32, u32)> {
        self.error_set_atom.map(|i| {
            let r = self.atoms.get(i);
            (r.off, r.len)
        })
    }

    pub fn deferred_reloc_count(&self) -> usize {
        self.deferred_relocs.len()
    }

    /// Active `.debug_info` slots front to back.
    pub fn info_slots_in_order(&self) -> Vec<(u32, u32)> {
        self.atoms
            .in_order()
            .iter()
            .map(|&i| {
                let r = self.atoms.get(i);
                (r.off, r.len)
            })
            .collect()
    }

    /// Active `.debug_line` slots front to back.
    pub fn line_slots_in_order(&self) -> Vec<(u32, u32)> {
        self.src_fns
            .in_order()
            .iter()
            .map(|&i| {
                let r = self.src_fns.get(i);
                (r.off, r.len)
            })
            .collect()
    }

    pub fn info_free_count(&self) -> usize {
        self.atoms.free_count()
    }

    pub fn line_free_count(&self) -> usize {
        self.src_fns.free_count()
    }

    /// Assert the structural invariants that must hold after every commit:
    /// neighbouring slots leave room for minimum padding, and each list's
    /// end matches its section's reported size.
    pub fn check_invariants(&self, obj: &dyn ObjectFile) {
        for (list, sect, terminator) in [
            (&self.atoms, DebugSect::Info, 1u64),
            (&self.src_fns, DebugSect::Line, 0u64),
        ] {
            let order = list.in_order();
            for pair in order.windows(2) {
                let a = list.get(pair[0]);
                let b = list.get(pair[1]);
                assert!(
                    a.off + a.len + MIN_NOP_SIZE <= b.off,
                    "{}: slot [0x{:x}; {}] crowds its neighbour at 0x{:x}",
                    sect.name(),
                    a.off,
                    a.len,
                    b.off
                );
            }
            if list.last.is_some() {
                assert_eq!(
                    list.used_end() as u64 + terminator,
                    obj.sect(sect).size,
                    "{}: used size out of sync",
                    sect.name()
                );
            }
        }
    }
}

fn patch_u32(buf: &mut [u8], at: usize, endian: Endian, v: u32) {
    buf[at..at + 4].copy_from_slice(&endian.u32_bytes(v));
}

fn patch_addr(buf: &mut [u8], at: usize, endian: Endian, ptr_bytes: u8, v: u64) {
    if ptr_bytes == 4 {
        patch_u32(buf, at, endian, v as u32);
    } else {
        buf[at..at + 8].copy_from_slice(&endian.u64_bytes(v));
    }
}
