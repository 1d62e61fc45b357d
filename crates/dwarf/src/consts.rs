//! DWARF 4 constants, restricted to the subset the emitter produces.

pub const DW_TAG_COMPILE_UNIT: u8 = 0x11;
pub const DW_TAG_SUBPROGRAM: u8 = 0x2e;
pub const DW_TAG_BASE_TYPE: u8 = 0x24;
pub const DW_TAG_POINTER_TYPE: u8 = 0x0f;
pub const DW_TAG_STRUCTURE_TYPE: u8 = 0x13;
pub const DW_TAG_MEMBER: u8 = 0x0d;
pub const DW_TAG_ENUMERATION_TYPE: u8 = 0x04;
pub const DW_TAG_ENUMERATOR: u8 = 0x28;
pub const DW_TAG_UNION_TYPE: u8 = 0x17;
pub const DW_TAG_FORMAL_PARAMETER: u8 = 0x05;
pub const DW_TAG_UNSPECIFIED_TYPE: u8 = 0x3b;

pub const DW_CHILDREN_NO: u8 = 0x00;
pub const DW_CHILDREN_YES: u8 = 0x01;

pub const DW_AT_NAME: u8 = 0x03;
pub const DW_AT_BYTE_SIZE: u8 = 0x0b;
pub const DW_AT_STMT_LIST: u8 = 0x10;
pub const DW_AT_LOW_PC: u8 = 0x11;
pub const DW_AT_HIGH_PC: u8 = 0x12;
pub const DW_AT_LANGUAGE: u8 = 0x13;
pub const DW_AT_COMP_DIR: u8 = 0x1b;
pub const DW_AT_CONST_VALUE: u8 = 0x1c;
pub const DW_AT_PRODUCER: u8 = 0x25;
pub const DW_AT_DATA_MEMBER_LOCATION: u8 = 0x38;
pub const DW_AT_ENCODING: u8 = 0x3e;
pub const DW_AT_TYPE: u8 = 0x49;

pub const DW_FORM_ADDR: u8 = 0x01;
pub const DW_FORM_DATA2: u8 = 0x05;
pub const DW_FORM_DATA4: u8 = 0x06;
pub const DW_FORM_DATA8: u8 = 0x07;
pub const DW_FORM_STRING: u8 = 0x08;
pub const DW_FORM_DATA1: u8 = 0x0b;
pub const DW_FORM_SDATA: u8 = 0x0d;
pub const DW_FORM_STRP: u8 = 0x0e;
pub const DW_FORM_REF4: u8 = 0x13;
pub const DW_FORM_SEC_OFFSET: u8 = 0x17;

pub const DW_ATE_ADDRESS: u8 = 0x01;
pub const DW_ATE_BOOLEAN: u8 = 0x02;
pub const DW_ATE_SIGNED: u8 = 0x05;
pub const DW_ATE_UNSIGNED: u8 = 0x07;

pub const DW_LNS_COPY: u8 = 0x01;
pub const DW_LNS_ADVANCE_PC: u8 = 0x02;
pub const DW_LNS_ADVANCE_LINE: u8 = 0x03;
pub const DW_LNS_SET_FILE: u8 = 0x04;
pub const DW_LNS_NEGATE_STMT: u8 = 0x06;
pub const DW_LNS_SET_ISA: u8 = 0x0c;

pub const DW_LNE_END_SEQUENCE: u8 = 0x01;
pub const DW_LNE_SET_ADDRESS: u8 = 0x02;

pub const DW_LANG_C99: u16 = 0x000c;

/// Fixed abbreviation codes. The abbreviation table enumerates these in
/// order; every emitted DIE references one of them.
pub mod abbrev {
    pub const COMPILE_UNIT: u8 = 1;
    pub const SUBPROGRAM: u8 = 2;
    pub const SUBPROGRAM_RETVOID: u8 = 3;
    pub const BASE_TYPE: u8 = 4;
    pub const PTR_TYPE: u8 = 5;
    pub const STRUCT_TYPE: u8 = 6;
    pub const STRUCT_MEMBER: u8 = 7;
    pub const ENUM_TYPE: u8 = 8;
    pub const ENUM_VARIANT: u8 = 9;
    pub const UNION_TYPE: u8 = 10;
    pub const PARAMETER: u8 = 11;
    pub const PAD1: u8 = 12;
}
