//! Debugging Information Entry construction.
//!
//! The subprogram record is opened when a declaration starts emission;
//! type records are appended at commit by walking the pending table until
//! every referenced type has been placed or deferred. All `ref4` values are
//! written as record-relative placeholders and rebased once the record's
//! section offset is known.

use crate::consts::*;
use crate::state::{DeclState, PendingTypeRelocs};
use common::leb::write_sleb128;
use common::{Endian, Logger, Target};
use sema::{align_up, Decl, ErrorSetKind, ErrorTable, InferredErrors, Ty, TyCtx, TyData};

/// Open the subprogram record for a function declaration. low_pc, high_pc
/// and the return-type reference are placeholders until commit.
pub(crate) fn write_subprogram<'t>(
    state: &mut DeclState<'t>,
    target: &Target,
    decl: &Decl<'t>,
    ret: Ty<'t>,
) {
    let has_ret = ret.has_runtime_bits(target);
    let buf = &mut state.dbg_info;
    buf.push(if has_ret { abbrev::SUBPROGRAM } else { abbrev::SUBPROGRAM_RETVOID });
    state.info_low_pc_site = Some(buf.len());
    buf.resize(buf.len() + target.ptr_bytes() as usize, 0);
    state.info_high_pc_site = Some(buf.len());
    buf.resize(buf.len() + 4, 0);
    if has_ret {
        let site = buf.len() as u32;
        buf.resize(buf.len() + 4, 0);
        state.pending.add_reloc(target, ret, site);
    }
    buf.extend_from_slice(decl.name.as_bytes());
    buf.push(0);
}

/// Whether a type's record cannot be written until the global error set is
/// finalised.
pub(crate) fn is_unresolved_error_set(ty: Ty<'_>, inferred: &InferredErrors) -> bool {
    match *ty {
        TyData::ErrorSet(ErrorSetKind::Any) => true,
        TyData::ErrorSet(ErrorSetKind::Inferred { func }) => inferred.get(func).is_none(),
        _ => false,
    }
}

/// Emit an error-set enumeration: the reserved "no error" value plus one
/// enumerator per member, with values drawn from the global table.
pub(crate) fn write_error_set_die<'n>(
    buf: &mut Vec<u8>,
    endian: Endian,
    name: &str,
    members: impl Iterator<Item = (&'n str, u16)>,
) {
    buf.push(abbrev::ENUM_TYPE);
    write_sleb128(buf, 2); // error values are u16
    buf.extend_from_slice(name.as_bytes());
    buf.push(0);
    write_enum_variant(buf, endian, "(no error)", 0);
    for (member, value) in members {
        write_enum_variant(buf, endian, member, value as u64);
    }
    buf.push(0);
}

fn write_enum_variant(buf: &mut Vec<u8>, endian: Endian, name: &str, value: u64) {
    buf.push(abbrev::ENUM_VARIANT);
    buf.extend_from_slice(name.as_bytes());
    buf.push(0);
    buf.extend_from_slice(&endian.u64_bytes(value));
}

/// Appends type records to a declaration's info buffer.
pub(crate) struct TypeEmitter<'a, 't> {
    pub buf: &'a mut Vec<u8>,
    pub pending: &'a mut PendingTypeRelocs<'t>,
    pub self_relocs: &'a mut Vec<u32>,
    pub types: &'a mut TyCtx<'t>,
    pub errors: &'a ErrorTable,
    pub inferred: &'a InferredErrors,
    pub target: Target,
    pub log: &'a Logger,
}

impl<'a, 't> TypeEmitter<'a, 't> {
    fn endian(&self) -> Endian {
        self.target.data_endian()
    }

    /// Reserve a `ref4` to `ty` and register the site for patching.
    fn type_ref(&mut self, ty: Ty<'t>) {
        let site = self.buf.len() as u32;
        self.buf.resize(self.buf.len() + 4, 0);
        self.pending.add_reloc(&self.target, ty, site);
    }

    fn name(&mut self, name: &str) {
        self.buf.extend_from_slice(name.as_bytes());
        self.buf.push(0);
    }

    fn member(&mut self, name: &str, ty: Ty<'t>, offset: u64) {
        self.buf.push(abbrev::STRUCT_MEMBER);
        self.name(name);
        self.type_ref(ty);
        write_sleb128(self.buf, offset as i64);
    }

    fn base_type(&mut self, encoding: u8, byte_size: u64, name: &str) {
        self.buf.push(abbrev::BASE_TYPE);
        self.buf.push(encoding);
        self.buf.push(byte_size as u8);
        self.name(name);
    }

    fn pad1(&mut self) {
        self.buf.push(abbrev::PAD1);
    }

    /// Emit the record for `ty` at the current buffer position.
    pub fn emit(&mut self, ty: Ty<'t>) {
        let target = self.target;
        match *ty {
            TyData::Bool => self.base_type(DW_ATE_BOOLEAN, 1, "bool"),
            TyData::Int { signed, .. } => {
                let encoding = if signed { DW_ATE_SIGNED } else { DW_ATE_UNSIGNED };
                self.base_type(encoding, ty.abi_size(&target), &ty.to_string());
            }
            TyData::Optional { payload } => {
                if ty.is_pointer_like_optional() {
                    // null carries the "no value" case
                    self.base_type(DW_ATE_ADDRESS, ty.abi_size(&target), &ty.to_string());
                } else {
                    let abi_size = ty.abi_size(&target);
                    let payload_size = payload.abi_size(&target);
                    self.buf.push(abbrev::STRUCT_TYPE);
                    write_sleb128(self.buf, abi_size as i64);
                    self.name(&ty.to_string());
                    let bool_ty = self.types.bool_();
                    self.member("maybe", bool_ty, 0);
                    self.member("val", payload, abi_size - payload_size);
                    self.buf.push(0);
                }
            }
            TyData::Slice { elem } => {
                let ptr = target.ptr_bytes() as u64;
                self.buf.push(abbrev::STRUCT_TYPE);
                write_sleb128(self.buf, 2 * ptr as i64);
                self.name(&ty.to_string());
                let ptr_ty = self.types.pointer(elem);
                let usize_ty = self.types.usize_ty(&target);
                self.member("ptr", ptr_ty, 0);
                self.member("len", usize_ty, ptr);
                self.buf.push(0);
            }
            TyData::Pointer { elem } => {
                self.buf.push(abbrev::PTR_TYPE);
                self.type_ref(elem);
            }
            TyData::Struct { name, fields, packed } => {
                if packed {
                    // packed layout has no member encoding yet
                    common::log!(self.log, "no debug representation for packed struct {}", name);
                    self.pad1();
                    return;
                }
                self.buf.push(abbrev::STRUCT_TYPE);
                write_sleb128(self.buf, ty.abi_size(&target) as i64);
                self.name(name);
                for (i, field) in fields.iter().enumerate() {
                    self.member(field.name, field.ty, ty.field_offset(i, &target));
                }
                self.buf.push(0);
            }
            TyData::Tuple { fields } => {
                self.buf.push(abbrev::STRUCT_TYPE);
                write_sleb128(self.buf, ty.abi_size(&target) as i64);
                self.name(&ty.to_string());
                for (i, &field_ty) in fields.iter().enumerate() {
                    self.member(&i.to_string(), field_ty, ty.field_offset(i, &target));
                }
                self.buf.push(0);
            }
            TyData::Enum { name, variants, .. } => {
                self.buf.push(abbrev::ENUM_TYPE);
                write_sleb128(self.buf, ty.abi_size(&target) as i64);
                self.name(name);
                let endian = self.endian();
                for (i, v) in variants.iter().enumerate() {
                    write_enum_variant(self.buf, endian, v.name, v.value.unwrap_or(i as u64));
                }
                self.buf.push(0);
            }
            TyData::Union { name, tag: None, .. } => {
                self.bare_union(ty, name, 0);
                self.buf.push(0);
            }
            TyData::Union { name, tag: Some(tag_ty), .. } => {
                self.tagged_union(ty, name, tag_ty);
            }
            TyData::ErrorSet(ErrorSetKind::Concrete { name, errors }) => {
                let endian = self.endian();
                let table = self.errors;
                write_error_set_die(
                    self.buf,
                    endian,
                    name,
                    errors.iter().map(|&e| (e, table.value(e).unwrap_or(0))),
                );
            }
            TyData::ErrorSet(ErrorSetKind::Inferred { func }) => {
                // the commit loop defers unresolved sets before we get here
                let names = self.inferred.get(func).unwrap_or(&[]);
                let endian = self.endian();
                let table = self.errors;
                write_error_set_die(
                    self.buf,
                    endian,
                    &ty.to_string(),
                    names.iter().map(|e| (e.as_str(), table.value(e).unwrap_or(0))),
                );
            }
            TyData::ErrorUnion { err, payload } => {
                let value_off = align_up(err.abi_size(&target), payload.abi_align(&target));
                self.buf.push(abbrev::STRUCT_TYPE);
                write_sleb128(self.buf, ty.abi_size(&target) as i64);
                self.name(&ty.to_string());
                self.member("err", err, 0);
                self.member("value", payload, value_off);
                self.buf.push(0);
            }
            TyData::Void => self.pad1(),
            TyData::Float { .. } | TyData::ErrorSet(ErrorSetKind::Any) => {
                common::log!(self.log, "no debug representation for type {}", ty);
                self.pad1();
            }
        }
    }

    /// The payload of a tagged union nests a bare union record directly
    /// after the `payload` member; its `ref4` is record-relative and is
    /// rebased through the self-reloc list.
    fn tagged_union(&mut self, ty: Ty<'t>, name: &str, tag_ty: Ty<'t>) {
        let target = self.target;
        let layout = ty.union_layout(&target);

        self.buf.push(abbrev::STRUCT_TYPE);
        write_sleb128(self.buf, layout.abi_size as i64);
        self.name(name);

        self.buf.push(abbrev::STRUCT_MEMBER);
        self.name("payload");
        let site = self.buf.len();
        self.buf.resize(site + 4, 0);
        write_sleb128(self.buf, layout.payload_offset as i64);

        let inner_off = self.buf.len() as u32;
        let endian = self.endian();
        self.buf[site..site + 4].copy_from_slice(&endian.u32_bytes(inner_off));
        self.self_relocs.push(site as u32);

        self.bare_union(ty, "", layout.payload_size);
        self.buf.push(0);

        self.member("tag", tag_ty, layout.tag_offset);
        self.buf.push(0);
    }

    /// A union record without the tag wrapper. Callers terminate the child
    /// list. `size_override` of zero means use the type's own size.
    fn bare_union(&mut self, ty: Ty<'t>, name: &str, size_override: u64) {
        let target = self.target;
        let fields = match *ty {
            TyData::Union { fields, .. } => fields,
            _ => &[],
        };
        let size = if size_override != 0 { size_override } else { ty.abi_size(&target) };
        self.buf.push(abbrev::UNION_TYPE);
        write_sleb128(self.buf, size as i64);
        self.name(name);
        for field in fields {
            self.member(field.name, field.ty, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;
    use common::{create_logger, PtrWidth};
    use sema::Field;

    fn target() -> Target {
        Target::elf(PtrWidth::P64, Endian::Little)
    }

    struct Fixture<'t> {
        types: TyCtx<'t>,
        errors: ErrorTable,
        inferred: InferredErrors,
    }

    impl<'t> Fixture<'t> {
        fn new(arena: &'t Bump) -> Fixture<'t> {
            Fixture {
                types: TyCtx::new(arena),
                errors: ErrorTable::default(),
                inferred: InferredErrors::default(),
            }
        }

        fn emit(&mut self, ty: Ty<'t>) -> (Vec<u8>, Vec<u32>) {
            let mut buf = Vec::new();
            let mut pending = PendingTypeRelocs::default();
            let mut self_relocs = Vec::new();
            let log = create_logger("dwarf");
            let mut em = TypeEmitter {
                buf: &mut buf,
                pending: &mut pending,
                self_relocs: &mut self_relocs,
                types: &mut self.types,
                errors: &self.errors,
                inferred: &self.inferred,
                target: target(),
                log: &log,
            };
            em.emit(ty);
            (buf, self_relocs)
        }
    }

    #[test]
    fn test_bool_record() {
        let arena = Bump::new();
        let mut fx = Fixture::new(&arena);
        let ty = fx.types.bool_();
        let (buf, _) = fx.emit(ty);
        assert_eq!(buf, [abbrev::BASE_TYPE, DW_ATE_BOOLEAN, 1, b'b', b'o', b'o', b'l', 0]);
    }

    #[test]
    fn test_int_record() {
        let arena = Bump::new();
        let mut fx = Fixture::new(&arena);
        let ty = fx.types.int(true, 16);
        let (buf, _) = fx.emit(ty);
        assert_eq!(buf, [abbrev::BASE_TYPE, DW_ATE_SIGNED, 2, b'i', b'1', b'6', 0]);
    }

    #[test]
    fn test_pointer_record_reserves_ref4() {
        let arena = Bump::new();
        let mut fx = Fixture::new(&arena);
        let u8t = fx.types.int(false, 8);
        let ty = fx.types.pointer(u8t);
        let (buf, _) = fx.emit(ty);
        assert_eq!(buf, [abbrev::PTR_TYPE, 0, 0, 0, 0]);
    }

    #[test]
    fn test_pointer_like_optional_is_address() {
        let arena = Bump::new();
        let mut fx = Fixture::new(&arena);
        let u8t = fx.types.int(false, 8);
        let ptr = fx.types.pointer(u8t);
        let ty = fx.types.optional(ptr);
        let (buf, _) = fx.emit(ty);
        assert_eq!(buf[0], abbrev::BASE_TYPE);
        assert_eq!(buf[1], DW_ATE_ADDRESS);
        assert_eq!(buf[2], 8);
    }

    #[test]
    fn test_struct_record_members() {
        let arena = Bump::new();
        let mut fx = Fixture::new(&arena);
        let u32t = fx.types.int(false, 32);
        let fields = fx.types.alloc_fields(&[
            Field { name: "a", ty: u32t },
            Field { name: "b", ty: u32t },
        ]);
        let ty = fx.types.intern(TyData::Struct { name: "Pair", fields, packed: false });
        let (buf, _) = fx.emit(ty);
        assert_eq!(buf[0], abbrev::STRUCT_TYPE);
        assert_eq!(buf[1], 8); // byte size as sdata
        assert_eq!(&buf[2..7], b"Pair\0");
        // first member: abbrev, name, ref4, offset 0
        assert_eq!(buf[7], abbrev::STRUCT_MEMBER);
        assert_eq!(&buf[8..10], b"a\0");
        assert_eq!(&buf[10..14], &[0; 4]);
        assert_eq!(buf[14], 0); // offset 0
        // second member ends with offset 4 and the closing null
        assert_eq!(buf[buf.len() - 2], 4);
        assert_eq!(buf[buf.len() - 1], 0);
    }

    #[test]
    fn test_packed_struct_falls_back_to_pad1() {
        let arena = Bump::new();
        let mut fx = Fixture::new(&arena);
        let u8t = fx.types.int(false, 8);
        let fields = fx.types.alloc_fields(&[Field { name: "a", ty: u8t }]);
        let ty = fx.types.intern(TyData::Struct { name: "P", fields, packed: true });
        let (buf, _) = fx.emit(ty);
        assert_eq!(buf, [abbrev::PAD1]);
    }

    #[test]
    fn test_tuple_members_use_ordinal_names() {
        let arena = Bump::new();
        let mut fx = Fixture::new(&arena);
        let u8t = fx.types.int(false, 8);
        let u16t = fx.types.int(false, 16);
        let fields = fx.types.alloc_tys(&[u8t, u16t]);
        let ty = fx.types.intern(TyData::Tuple { fields });
        let (buf, _) = fx.emit(ty);
        let text = String::from_utf8_lossy(&buf);
        assert!(text.contains("0\0"));
        assert!(text.contains("1\0"));
    }

    #[test]
    fn test_enum_ordinal_values() {
        let arena = Bump::new();
        let mut fx = Fixture::new(&arena);
        let variants = fx.types.alloc_variants(&[
            sema::Variant { name: "red", value: None },
            sema::Variant { name: "green", value: Some(7) },
            sema::Variant { name: "blue", value: None },
        ]);
        let ty = fx.types.intern(TyData::Enum { name: "Color", tag_bits: 2, variants });
        let (buf, _) = fx.emit(ty);
        assert_eq!(buf[0], abbrev::ENUM_TYPE);
        // "red" gets ordinal 0, "green" keeps 7, "blue" gets ordinal 2
        let red = buf.windows(4).position(|w| w == b"red\0").unwrap() + 4;
        assert_eq!(&buf[red..red + 8], &0u64.to_le_bytes());
        let green = buf.windows(6).position(|w| w == b"green\0").unwrap() + 6;
        assert_eq!(&buf[green..green + 8], &7u64.to_le_bytes());
        let blue = buf.windows(5).position(|w| w == b"blue\0").unwrap() + 5;
        assert_eq!(&buf[blue..blue + 8], &2u64.to_le_bytes());
    }

    #[test]
    fn test_tagged_union_self_reloc() {
        // tag_align 4 < payload_align 8: payload first, tag after
        let arena = Bump::new();
        let mut fx = Fixture::new(&arena);
        let u32t = fx.types.int(false, 32);
        let u64t = fx.types.int(false, 64);
        let wide = fx.types.slice(u64t); // 16 bytes, align 8
        let fields = fx.types.alloc_fields(&[Field { name: "wide", ty: wide }]);
        let ty = fx.types.intern(TyData::Union { name: "U", tag: Some(u32t), fields });
        let layout = ty.union_layout(&target());
        assert_eq!(layout.payload_offset, 0);
        assert_eq!(layout.tag_offset, 16);

        let (buf, self_relocs) = fx.emit(ty);
        assert_eq!(self_relocs.len(), 1);
        let site = self_relocs[0] as usize;
        let stored = u32::from_le_bytes(buf[site..site + 4].try_into().unwrap());
        // payload offset of zero encodes in one byte, so the nested union
        // starts five bytes past the reference site
        assert_eq!(stored, site as u32 + 5);
        assert_eq!(buf[stored as usize], abbrev::UNION_TYPE);
    }

    #[test]
    fn test_bare_union_record() {
        let arena = Bump::new();
        let mut fx = Fixture::new(&arena);
        let u32t = fx.types.int(false, 32);
        let fields = fx.types.alloc_fields(&[Field { name: "a", ty: u32t }]);
        let ty = fx.types.intern(TyData::Union { name: "B", tag: None, fields });
        let (buf, self_relocs) = fx.emit(ty);
        assert!(self_relocs.is_empty());
        assert_eq!(buf[0], abbrev::UNION_TYPE);
        assert_eq!(buf[buf.len() - 1], 0);
    }

    #[test]
    fn test_concrete_error_set() {
        let arena = Bump::new();
        let mut fx = Fixture::new(&arena);
        fx.errors.intern("OutOfMemory");
        fx.errors.intern("FileNotFound");
        let names = fx.types.alloc_names(&["FileNotFound"]);
        let ty = fx
            .types
            .intern(TyData::ErrorSet(ErrorSetKind::Concrete { name: "OpenError", errors: names }));
        let (buf, _) = fx.emit(ty);
        let text = String::from_utf8_lossy(&buf);
        assert!(text.contains("(no error)\0"));
        assert!(text.contains("FileNotFound\0"));
        let at = buf.windows(13).position(|w| w == b"FileNotFound\0").unwrap() + 13;
        assert_eq!(&buf[at..at + 8], &2u64.to_le_bytes());
    }

    #[test]
    fn test_void_emits_pad1() {
        let arena = Bump::new();
        let mut fx = Fixture::new(&arena);
        let ty = fx.types.void();
        let (buf, _) = fx.emit(ty);
        assert_eq!(buf, [abbrev::PAD1]);
    }

    #[test]
    fn test_float_falls_back_to_pad1() {
        let arena = Bump::new();
        let mut fx = Fixture::new(&arena);
        let ty = fx.types.intern(TyData::Float { bits: 64 });
        let (buf, _) = fx.emit(ty);
        assert_eq!(buf, [abbrev::PAD1]);
    }

    #[test]
    fn test_subprogram_opening() {
        let arena = Bump::new();
        let mut fx = Fixture::new(&arena);
        let u32t = fx.types.int(false, 32);
        let t = target();
        let decl = Decl::new_fn(1, "pkg.answer", u32t, 4, 0);
        let mut state = DeclState::new();
        write_subprogram(&mut state, &t, &decl, u32t);
        let buf = &state.dbg_info;
        assert_eq!(buf[0], abbrev::SUBPROGRAM);
        assert_eq!(state.info_low_pc_site, Some(1));
        assert_eq!(state.info_high_pc_site, Some(9));
        // 1 + 8 (low_pc) + 4 (high_pc) + 4 (ref4) then the name
        assert_eq!(&buf[17..], b"pkg.answer\0");
    }

    #[test]
    fn test_subprogram_retvoid_has_no_type_ref() {
        let arena = Bump::new();
        let mut fx = Fixture::new(&arena);
        let void = fx.types.void();
        let t = target();
        let decl = Decl::new_fn(1, "pkg.main", void, 0, 0);
        let mut state = DeclState::new();
        write_subprogram(&mut state, &t, &decl, void);
        let buf = &state.dbg_info;
        assert_eq!(buf[0], abbrev::SUBPROGRAM_RETVOID);
        assert_eq!(&buf[13..], b"pkg.main\0");
    }

    #[test]
    fn test_unresolved_error_set_detection() {
        let arena = Bump::new();
        let mut fx = Fixture::new(&arena);
        let any = fx.types.intern(TyData::ErrorSet(ErrorSetKind::Any));
        assert!(is_unresolved_error_set(any, &fx.inferred));
        let inferred_ty =
            fx.types.intern(TyData::ErrorSet(ErrorSetKind::Inferred { func: sema::DeclId(9) }));
        assert!(is_unresolved_error_set(inferred_ty, &fx.inferred));
        fx.inferred.resolve(sema::DeclId(9), vec!["Late".to_string()]);
        assert!(!is_unresolved_error_set(inferred_ty, &fx.inferred));
        let bool_ty = fx.types.bool_();
        assert!(!is_unresolved_error_set(bool_ty, &fx.inferred));
    }
}
