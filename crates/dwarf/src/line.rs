//! Per-function Line Number Program fragments.
//!
//! The prologue uses fixed widths throughout so the three patchable slots
//! (function address, line, file index) sit at constant offsets and updates
//! never change the fragment length.

use crate::consts::*;
use crate::state::DeclState;
use common::leb::write_uleb128_fixed4;
use common::Target;

/// Offset of the function-address slot within a fragment.
pub fn vaddr_site(_target: &Target) -> usize {
    3
}

/// Offset of the four-byte line slot.
pub fn line_site(target: &Target) -> usize {
    3 + target.ptr_bytes() as usize + 1
}

/// Offset of the four-byte file-index slot.
pub fn file_site(target: &Target) -> usize {
    line_site(target) + 5
}

/// Emit the fragment prologue: set_address (address patched at commit),
/// advance_line, set_file, then one row.
pub(crate) fn write_prologue(
    state: &mut DeclState<'_>,
    target: &Target,
    src_line: u32,
    lbrace_line: u32,
) {
    let buf = &mut state.dbg_line;
    let ptr = target.ptr_bytes();

    buf.push(0); // extended opcode
    buf.push(ptr + 1);
    buf.push(DW_LNE_SET_ADDRESS);
    debug_assert_eq!(buf.len(), vaddr_site(target));
    state.line_vaddr_site = Some(buf.len());
    buf.resize(buf.len() + ptr as usize, 0);

    buf.push(DW_LNS_ADVANCE_LINE);
    debug_assert_eq!(buf.len(), line_site(target));
    write_uleb128_fixed4(buf, src_line + lbrace_line);

    buf.push(DW_LNS_SET_FILE);
    debug_assert_eq!(buf.len(), file_site(target));
    write_uleb128_fixed4(buf, 1);

    buf.push(DW_LNS_COPY);
}

/// Close a fragment once the code generator has appended its rows.
pub(crate) fn write_end_sequence(buf: &mut Vec<u8>) {
    buf.extend_from_slice(&[0, 1, DW_LNE_END_SEQUENCE]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Endian, PtrWidth};

    #[test]
    fn test_prologue_p64() {
        let target = Target::elf(PtrWidth::P64, Endian::Little);
        let mut state = DeclState::new();
        write_prologue(&mut state, &target, 10, 2);
        let mut expect = vec![0x00, 0x09, DW_LNE_SET_ADDRESS];
        expect.extend_from_slice(&[0; 8]);
        expect.push(DW_LNS_ADVANCE_LINE);
        expect.extend_from_slice(&[0x8c, 0x80, 0x80, 0x00]); // 12, fixed width
        expect.push(DW_LNS_SET_FILE);
        expect.extend_from_slice(&[0x81, 0x80, 0x80, 0x00]); // 1, fixed width
        expect.push(DW_LNS_COPY);
        assert_eq!(state.dbg_line, expect);
    }

    #[test]
    fn test_prologue_p32_slots() {
        let target = Target::elf(PtrWidth::P32, Endian::Little);
        let mut state = DeclState::new();
        write_prologue(&mut state, &target, 0, 0);
        assert_eq!(state.line_vaddr_site, Some(3));
        assert_eq!(line_site(&target), 8);
        assert_eq!(file_site(&target), 13);
        assert_eq!(state.dbg_line[1], 5); // extended-op length: ptr + 1
        assert_eq!(state.dbg_line.len(), 18);
    }

    #[test]
    fn test_slot_offsets_shift_with_ptr_width() {
        let t32 = Target::elf(PtrWidth::P32, Endian::Little);
        let t64 = Target::elf(PtrWidth::P64, Endian::Little);
        assert_eq!(vaddr_site(&t32), vaddr_site(&t64));
        assert_eq!(line_site(&t32), 8);
        assert_eq!(line_site(&t64), 12);
        assert_eq!(file_site(&t64), 17);
    }

    #[test]
    fn test_end_sequence() {
        let mut buf = Vec::new();
        write_end_sequence(&mut buf);
        assert_eq!(buf, [0x00, 0x01, DW_LNE_END_SEQUENCE]);
    }
}
