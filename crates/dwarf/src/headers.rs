//! Section headers: the abbreviation table, the compilation-unit header,
//! `.debug_aranges`, and the `.debug_line` program header.
//!
//! Each header owns a reserved region in front of the incremental records
//! and is rewritten in place as the unit grows. A header that outgrows its
//! region cannot be recovered from incrementally, so that is a hard panic.

use crate::consts::*;
use crate::records::pad_to_ideal;
use crate::{nops, Dwarf, EmitError, INFO_HEADER_BYTES};
use common::Endian;
use objfile::{DebugSect, ObjectFile};

impl Dwarf {
    /// Emit the fixed abbreviation table. The table never changes for the
    /// life of the unit, so this runs once per output file.
    pub fn write_abbrev_table(&mut self, obj: &mut dyn ObjectFile) -> Result<(), EmitError> {
        let mut buf = Vec::new();

        buf.extend_from_slice(&[abbrev::COMPILE_UNIT, DW_TAG_COMPILE_UNIT, DW_CHILDREN_YES]);
        attr(&mut buf, DW_AT_STMT_LIST, DW_FORM_SEC_OFFSET);
        attr(&mut buf, DW_AT_LOW_PC, DW_FORM_ADDR);
        attr(&mut buf, DW_AT_HIGH_PC, DW_FORM_ADDR);
        attr(&mut buf, DW_AT_NAME, DW_FORM_STRP);
        attr(&mut buf, DW_AT_COMP_DIR, DW_FORM_STRP);
        attr(&mut buf, DW_AT_PRODUCER, DW_FORM_STRP);
        attr(&mut buf, DW_AT_LANGUAGE, DW_FORM_DATA2);
        end_abbrev(&mut buf);

        buf.extend_from_slice(&[abbrev::SUBPROGRAM, DW_TAG_SUBPROGRAM, DW_CHILDREN_YES]);
        attr(&mut buf, DW_AT_LOW_PC, DW_FORM_ADDR);
        attr(&mut buf, DW_AT_HIGH_PC, DW_FORM_DATA4);
        attr(&mut buf, DW_AT_TYPE, DW_FORM_REF4);
        attr(&mut buf, DW_AT_NAME, DW_FORM_STRING);
        end_abbrev(&mut buf);

        buf.extend_from_slice(&[abbrev::SUBPROGRAM_RETVOID, DW_TAG_SUBPROGRAM, DW_CHILDREN_YES]);
        attr(&mut buf, DW_AT_LOW_PC, DW_FORM_ADDR);
        attr(&mut buf, DW_AT_HIGH_PC, DW_FORM_DATA4);
        attr(&mut buf, DW_AT_NAME, DW_FORM_STRING);
        end_abbrev(&mut buf);

        buf.extend_from_slice(&[abbrev::BASE_TYPE, DW_TAG_BASE_TYPE, DW_CHILDREN_NO]);
        attr(&mut buf, DW_AT_ENCODING, DW_FORM_DATA1);
        attr(&mut buf, DW_AT_BYTE_SIZE, DW_FORM_DATA1);
        attr(&mut buf, DW_AT_NAME, DW_FORM_STRING);
        end_abbrev(&mut buf);

        buf.extend_from_slice(&[abbrev::PTR_TYPE, DW_TAG_POINTER_TYPE, DW_CHILDREN_NO]);
        attr(&mut buf, DW_AT_TYPE, DW_FORM_REF4);
        end_abbrev(&mut buf);

        buf.extend_from_slice(&[abbrev::STRUCT_TYPE, DW_TAG_STRUCTURE_TYPE, DW_CHILDREN_YES]);
        attr(&mut buf, DW_AT_BYTE_SIZE, DW_FORM_SDATA);
        attr(&mut buf, DW_AT_NAME, DW_FORM_STRING);
        end_abbrev(&mut buf);

        buf.extend_from_slice(&[abbrev::STRUCT_MEMBER, DW_TAG_MEMBER, DW_CHILDREN_NO]);
        attr(&mut buf, DW_AT_NAME, DW_FORM_STRING);
        attr(&mut buf, DW_AT_TYPE, DW_FORM_REF4);
        attr(&mut buf, DW_AT_DATA_MEMBER_LOCATION, DW_FORM_SDATA);
        end_abbrev(&mut buf);

        buf.extend_from_slice(&[abbrev::ENUM_TYPE, DW_TAG_ENUMERATION_TYPE, DW_CHILDREN_YES]);
        attr(&mut buf, DW_AT_BYTE_SIZE, DW_FORM_SDATA);
        attr(&mut buf, DW_AT_NAME, DW_FORM_STRING);
        end_abbrev(&mut buf);

        buf.extend_from_slice(&[abbrev::ENUM_VARIANT, DW_TAG_ENUMERATOR, DW_CHILDREN_NO]);
        attr(&mut buf, DW_AT_NAME, DW_FORM_STRING);
        attr(&mut buf, DW_AT_CONST_VALUE, DW_FORM_DATA8);
        end_abbrev(&mut buf);

        buf.extend_from_slice(&[abbrev::UNION_TYPE, DW_TAG_UNION_TYPE, DW_CHILDREN_YES]);
        attr(&mut buf, DW_AT_BYTE_SIZE, DW_FORM_SDATA);
        attr(&mut buf, DW_AT_NAME, DW_FORM_STRING);
        end_abbrev(&mut buf);

        buf.extend_from_slice(&[abbrev::PARAMETER, DW_TAG_FORMAL_PARAMETER, DW_CHILDREN_NO]);
        attr(&mut buf, DW_AT_TYPE, DW_FORM_REF4);
        end_abbrev(&mut buf);

        buf.extend_from_slice(&[abbrev::PAD1, DW_TAG_UNSPECIFIED_TYPE, DW_CHILDREN_NO]);
        end_abbrev(&mut buf);

        buf.push(0); // end of table

        let pos = obj.sect(DebugSect::Abbrev);
        assert!(
            buf.len() as u64 <= obj.allocated_size(pos.offset),
            "abbreviation table overflows its region"
        );
        obj.pwrite_all(&buf, pos.offset)?;
        obj.set_sect_size(DebugSect::Abbrev, buf.len() as u64);
        obj.mark_sect_dirty(DebugSect::Abbrev);
        obj.mark_sect_table_dirty();
        Ok(())
    }

    /// Rewrite the compilation-unit header. `low_pc`/`high_pc` bound the
    /// text segment; `comp_dir` and `producer` land in `.debug_str`.
    pub fn write_info_header(
        &mut self,
        obj: &mut dyn ObjectFile,
        comp_dir: &str,
        producer: &str,
        low_pc: u64,
        high_pc: u64,
    ) -> Result<(), EmitError> {
        let t = self.target;
        let endian = t.data_endian();
        let used = self.info_section_used();
        let first_off = match self.atoms.first {
            Some(i) => self.atoms.get(i).off,
            None => pad_to_ideal(INFO_HEADER_BYTES),
        };

        let mut buf = Vec::with_capacity(first_off as usize);
        write_initial_length(&mut buf, endian, t.dwarf64(), used - t.initial_len_bytes() as u64);
        buf.extend_from_slice(&endian.u16_bytes(4)); // DWARF version
        write_sect_off(&mut buf, endian, t.dwarf64(), 0); // abbrev table offset
        buf.push(t.ptr_bytes());

        buf.push(abbrev::COMPILE_UNIT);
        write_sect_off(&mut buf, endian, t.dwarf64(), 0); // stmt_list
        write_addr(&mut buf, endian, t.ptr_bytes(), low_pc);
        write_addr(&mut buf, endian, t.ptr_bytes(), high_pc);
        let name_off = self.strtab.make_string(&self.root_src_path);
        write_sect_off(&mut buf, endian, t.dwarf64(), name_off as u64);
        let dir_off = self.strtab.make_string(comp_dir);
        write_sect_off(&mut buf, endian, t.dwarf64(), dir_off as u64);
        let producer_off = self.strtab.make_string(producer);
        write_sect_off(&mut buf, endian, t.dwarf64(), producer_off as u64);
        buf.extend_from_slice(&endian.u16_bytes(DW_LANG_C99));

        assert!(
            buf.len() as u32 <= INFO_HEADER_BYTES,
            "compilation-unit header overflows its reserved region"
        );
        buf.resize(first_off as usize, 0);

        self.grow_section(obj, DebugSect::Info, used.max(buf.len() as u64))?;
        let pos = obj.sect(DebugSect::Info);
        obj.pwrite_all(&buf, pos.offset)?;
        obj.mark_sect_dirty(DebugSect::Info);
        Ok(())
    }

    /// Rewrite the `.debug_line` program header.
    pub fn write_line_header(&mut self, obj: &mut dyn ObjectFile) -> Result<(), EmitError> {
        let t = self.target;
        let endian = t.data_endian();
        let used = self.line_section_used();
        let first_off = match self.src_fns.first {
            Some(i) => self.src_fns.get(i).off,
            None => pad_to_ideal(self.line_header_bytes()),
        };

        let mut buf = Vec::with_capacity(first_off as usize);
        write_initial_length(&mut buf, endian, t.dwarf64(), used - t.initial_len_bytes() as u64);
        buf.extend_from_slice(&endian.u16_bytes(4)); // line program version
        let header_len_at = buf.len();
        write_sect_off(&mut buf, endian, t.dwarf64(), 0); // patched below
        let prologue_start = buf.len();

        buf.push(1); // minimum_instruction_length
        buf.push(1); // maximum_operations_per_instruction
        buf.push(1); // default_is_stmt
        buf.push((-5i8) as u8); // line_base
        buf.push(14); // line_range
        buf.push(DW_LNS_SET_ISA + 1); // opcode_base
        buf.extend_from_slice(&[0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1]);
        buf.push(0); // no include directories
        buf.extend_from_slice(self.root_src_path.as_bytes());
        buf.push(0);
        buf.extend_from_slice(&[0, 0, 0]); // dir index, mtime, length
        buf.push(0); // end of file table

        let header_len = (buf.len() - prologue_start) as u64;
        patch_sect_off(&mut buf, header_len_at, endian, t.dwarf64(), header_len);
        debug_assert_eq!(buf.len() as u32, self.line_header_bytes());
        assert!(
            buf.len() as u32 <= first_off,
            "line program header overflows its reserved region"
        );
        let pad_len = first_off - buf.len() as u32;
        nops::extend_line_padding(&mut buf, pad_len);

        self.grow_section(obj, DebugSect::Line, used.max(buf.len() as u64))?;
        let pos = obj.sect(DebugSect::Line);
        obj.pwrite_all(&buf, pos.offset)?;
        obj.mark_sect_dirty(DebugSect::Line);
        Ok(())
    }

    /// Rewrite `.debug_aranges`: one range covering the text segment, then
    /// the terminating pair.
    pub fn write_aranges(
        &mut self,
        obj: &mut dyn ObjectFile,
        text_addr: u64,
        text_size: u64,
    ) -> Result<(), EmitError> {
        let t = self.target;
        let endian = t.data_endian();
        let ptr = t.ptr_bytes();

        let mut buf = Vec::new();
        write_initial_length(&mut buf, endian, t.dwarf64(), 0); // patched below
        buf.extend_from_slice(&endian.u16_bytes(2)); // aranges version
        write_sect_off(&mut buf, endian, t.dwarf64(), 0); // into .debug_info
        buf.push(ptr);
        buf.push(0); // flat address space

        // Tuples begin aligned to twice the address size.
        let tuple_align = 2 * ptr as usize;
        while buf.len() % tuple_align != 0 {
            buf.push(0);
        }
        write_addr(&mut buf, endian, ptr, text_addr);
        write_addr(&mut buf, endian, ptr, text_size);
        write_addr(&mut buf, endian, ptr, 0);
        write_addr(&mut buf, endian, ptr, 0);

        let unit_len = (buf.len() - t.initial_len_bytes() as usize) as u64;
        patch_initial_length(&mut buf, endian, t.dwarf64(), unit_len);

        let pos = obj.sect(DebugSect::Aranges);
        assert!(
            buf.len() as u64 <= obj.allocated_size(pos.offset),
            "address range table overflows its region"
        );
        obj.pwrite_all(&buf, pos.offset)?;
        obj.set_sect_size(DebugSect::Aranges, buf.len() as u64);
        obj.mark_sect_dirty(DebugSect::Aranges);
        obj.mark_sect_table_dirty();
        Ok(())
    }
}

fn attr(buf: &mut Vec<u8>, at: u8, form: u8) {
    buf.push(at);
    buf.push(form);
}

fn end_abbrev(buf: &mut Vec<u8>) {
    buf.push(0);
    buf.push(0);
}

fn write_initial_length(buf: &mut Vec<u8>, endian: Endian, dwarf64: bool, len: u64) {
    if dwarf64 {
        buf.extend_from_slice(&endian.u32_bytes(0xffff_ffff));
        buf.extend_from_slice(&endian.u64_bytes(len));
    } else {
        buf.extend_from_slice(&endian.u32_bytes(len as u32));
    }
}

fn patch_initial_length(buf: &mut [u8], endian: Endian, dwarf64: bool, len: u64) {
    if dwarf64 {
        buf[4..12].copy_from_slice(&endian.u64_bytes(len));
    } else {
        buf[0..4].copy_from_slice(&endian.u32_bytes(len as u32));
    }
}

fn write_sect_off(buf: &mut Vec<u8>, endian: Endian, dwarf64: bool, off: u64) {
    if dwarf64 {
        buf.extend_from_slice(&endian.u64_bytes(off));
    } else {
        buf.extend_from_slice(&endian.u32_bytes(off as u32));
    }
}

fn patch_sect_off(buf: &mut [u8], at: usize, endian: Endian, dwarf64: bool, off: u64) {
    if dwarf64 {
        buf[at..at + 8].copy_from_slice(&endian.u64_bytes(off));
    } else {
        buf[at..at + 4].copy_from_slice(&endian.u32_bytes(off as u32));
    }
}

fn write_addr(buf: &mut Vec<u8>, endian: Endian, ptr_bytes: u8, v: u64) {
    if ptr_bytes == 4 {
        buf.extend_from_slice(&endian.u32_bytes(v as u32));
    } else {
        buf.extend_from_slice(&endian.u64_bytes(v));
    }
}
