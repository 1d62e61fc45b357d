//! Scatter-write padding around section fragments.
//!
//! Fragments are surrounded by instructions a DWARF consumer parses but
//! ignores: `DW_LNS_negate_stmt` bytes in `.debug_line`, zero abbreviation
//! codes in `.debug_info`. Each fragment and its padding go out in a single
//! vectored write built from static pages.

use crate::consts::{DW_LNS_ADVANCE_PC, DW_LNS_NEGATE_STMT};
use objfile::ObjectFile;
use std::io;
use std::io::IoSlice;

const PAGE: usize = 4096;

static LINE_NOPS: [u8; PAGE] = [DW_LNS_NEGATE_STMT; PAGE];
static INFO_NOPS: [u8; PAGE] = [0; PAGE];

/// `advance_pc 0` in three bytes, used to keep line paddings even-length.
static LINE_NOP3: [u8; 3] = [DW_LNS_ADVANCE_PC, 0x80, 0x00];

/// Ceiling on combined padding per write, from the iovec array limit.
pub const MAX_PADDING: u32 = 255 * PAGE as u32;

fn push_line_padding<'a>(vecs: &mut Vec<IoSlice<'a>>, mut count: u32) {
    // negate_stmt is a single byte; absorb an odd count with a three-byte
    // advance_pc so the remainder stays even.
    if count % 2 == 1 && count >= 3 {
        vecs.push(IoSlice::new(&LINE_NOP3));
        count -= 3;
    }
    while count > 0 {
        let take = count.min(PAGE as u32);
        vecs.push(IoSlice::new(&LINE_NOPS[..take as usize]));
        count -= take;
    }
}

fn push_info_padding<'a>(vecs: &mut Vec<IoSlice<'a>>, mut count: u32) {
    while count > 0 {
        let take = count.min(PAGE as u32);
        vecs.push(IoSlice::new(&INFO_NOPS[..take as usize]));
        count -= take;
    }
}

/// Append `count` bytes of line padding to an in-memory buffer, with the
/// same even-length discipline as the vectored writer.
pub(crate) fn extend_line_padding(buf: &mut Vec<u8>, mut count: u32) {
    if count % 2 == 1 && count >= 3 {
        buf.extend_from_slice(&LINE_NOP3);
        count -= 3;
    }
    buf.resize(buf.len() + count as usize, DW_LNS_NEGATE_STMT);
}

/// Write a `.debug_line` fragment at absolute offset `payload_abs`,
/// surrounded by `prev` and `next` bytes of line padding.
pub fn pwrite_line_fragment(
    obj: &mut dyn ObjectFile,
    payload_abs: u64,
    prev: u32,
    payload: &[u8],
    next: u32,
) -> io::Result<()> {
    assert!(prev as u64 + next as u64 <= MAX_PADDING as u64);
    let mut vecs: Vec<IoSlice<'_>> = Vec::new();
    push_line_padding(&mut vecs, prev);
    if !payload.is_empty() {
        vecs.push(IoSlice::new(payload));
    }
    push_line_padding(&mut vecs, next);
    if vecs.is_empty() {
        return Ok(());
    }
    obj.pwritev_all(&vecs, payload_abs - prev as u64)
}

/// Write a `.debug_info` fragment; `trailing_zero` appends the byte that
/// terminates the compilation unit's child list after the final record.
pub fn pwrite_info_fragment(
    obj: &mut dyn ObjectFile,
    payload_abs: u64,
    prev: u32,
    payload: &[u8],
    next: u32,
    trailing_zero: bool,
) -> io::Result<()> {
    assert!(prev as u64 + next as u64 <= MAX_PADDING as u64);
    let mut vecs: Vec<IoSlice<'_>> = Vec::new();
    push_info_padding(&mut vecs, prev);
    if !payload.is_empty() {
        vecs.push(IoSlice::new(payload));
    }
    push_info_padding(&mut vecs, next.saturating_add(trailing_zero as u32));
    if vecs.is_empty() {
        return Ok(());
    }
    obj.pwritev_all(&vecs, payload_abs - prev as u64)
}

/// Overwrite a vacated `.debug_line` slot with padding.
pub fn fill_line(obj: &mut dyn ObjectFile, abs: u64, len: u32) -> io::Result<()> {
    pwrite_line_fragment(obj, abs, 0, &[], len)
}

/// Overwrite a vacated `.debug_info` slot with padding.
pub fn fill_info(obj: &mut dyn ObjectFile, abs: u64, len: u32) -> io::Result<()> {
    pwrite_info_fragment(obj, abs, 0, &[], len, false)
}
