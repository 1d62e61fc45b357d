//! Deferred resolution of error-set references: sites that cannot be
//! patched until the global error set is finalised.

use bumpalo::Bump;
use common::{Endian, Format};
use dwarf::consts::abbrev;
use dwarf::{Dwarf, EmitError};
use objfile::{DebugSect, MemObject, ObjectFile};
use sema::{Analysis, Decl, DeclId, ErrorSetKind, TyData};

fn emitter() -> Dwarf {
    Dwarf::new(64, Endian::Little, Format::Elf, "main.fen").unwrap()
}

fn commit<'t>(
    dw: &mut Dwarf,
    obj: &mut MemObject,
    analysis: &mut Analysis<'t>,
    decl: &Decl<'t>,
    addr: u64,
) {
    let state = dw.init_decl_state(decl).unwrap();
    dw.commit_decl(obj, analysis, decl, addr, 0x40, state).unwrap();
    dw.check_invariants(obj);
}

#[test]
fn unresolved_inferred_set_defers_one_site_per_reference() {
    let arena = Bump::new();
    let mut analysis = Analysis::new(&arena);
    let mut dw = emitter();
    let mut obj = MemObject::new();

    analysis.errors.intern("OutOfMemory");

    // fn fallible() !void, error set still unresolved at commit time
    let err = analysis
        .types
        .intern(TyData::ErrorSet(ErrorSetKind::Inferred { func: DeclId(1) }));
    let void = analysis.types.void();
    let ret = analysis.types.intern(TyData::ErrorUnion { err, payload: void });
    let f = Decl::new_fn(1, "pkg.fallible", ret, 3, 0);

    commit(&mut dw, &mut obj, &mut analysis, &f, 0x1000);
    assert_eq!(dw.deferred_reloc_count(), 1);
    assert!(dw.error_set_slot().is_none());
}

#[test]
fn anyerror_reference_is_deferred_then_patched() {
    let arena = Bump::new();
    let mut analysis = Analysis::new(&arena);
    let mut dw = emitter();
    let mut obj = MemObject::new();

    analysis.errors.intern("OutOfMemory");
    analysis.errors.intern("AccessDenied");

    let err = analysis.types.intern(TyData::ErrorSet(ErrorSetKind::Any));
    let u32t = analysis.types.int(false, 32);
    let ret = analysis.types.intern(TyData::ErrorUnion { err, payload: u32t });
    let f = Decl::new_fn(1, "pkg.load", ret, 3, 0);
    commit(&mut dw, &mut obj, &mut analysis, &f, 0x1000);
    assert_eq!(dw.deferred_reloc_count(), 1);

    dw.commit_error_set(&mut obj, &analysis.errors).unwrap();
    dw.check_invariants(&obj);
    assert_eq!(dw.deferred_reloc_count(), 0);

    let (err_off, err_len) = dw.error_set_slot().expect("error set record");
    let info = obj.sect(DebugSect::Info);
    let err_record = &obj.bytes()[(info.offset + err_off as u64) as usize..][..err_len as usize];
    assert_eq!(err_record[0], abbrev::ENUM_TYPE);
    let text = String::from_utf8_lossy(err_record);
    assert!(text.contains("anyerror\0"));
    assert!(text.contains("(no error)\0"));
    assert!(text.contains("OutOfMemory\0"));
    assert!(text.contains("AccessDenied\0"));

    // the deferred site inside pkg.load's record now holds the error-set
    // record's offset
    let (f_off, f_len) = dw.decl_info_slot(f.id).unwrap();
    let f_record = &obj.bytes()[(info.offset + f_off as u64) as usize..][..f_len as usize];
    let needle = err_off.to_le_bytes();
    assert!(
        f_record.windows(4).any(|w| w == needle),
        "patched reference to the error set record not found"
    );
}

#[test]
fn resolved_inferred_set_emits_inline() {
    let arena = Bump::new();
    let mut analysis = Analysis::new(&arena);
    let mut dw = emitter();
    let mut obj = MemObject::new();

    analysis.errors.intern("Overflow");
    analysis.inferred.resolve(DeclId(1), vec!["Overflow".to_string()]);

    let err = analysis
        .types
        .intern(TyData::ErrorSet(ErrorSetKind::Inferred { func: DeclId(1) }));
    let void = analysis.types.void();
    let ret = analysis.types.intern(TyData::ErrorUnion { err, payload: void });
    let f = Decl::new_fn(1, "pkg.checked", ret, 3, 0);
    commit(&mut dw, &mut obj, &mut analysis, &f, 0x1000);

    // nothing to defer: the set was resolved before commit
    assert_eq!(dw.deferred_reloc_count(), 0);
    let (off, len) = dw.decl_info_slot(f.id).unwrap();
    let info = obj.sect(DebugSect::Info);
    let record = &obj.bytes()[(info.offset + off as u64) as usize..][..len as usize];
    let text = String::from_utf8_lossy(record);
    assert!(text.contains("Overflow\0"));
}

#[test]
fn commits_after_the_error_set_are_rejected() {
    let arena = Bump::new();
    let mut analysis = Analysis::new(&arena);
    let mut dw = emitter();
    let mut obj = MemObject::new();

    let void = analysis.types.void();
    let a = Decl::new_fn(1, "pkg.a", void, 1, 0);
    commit(&mut dw, &mut obj, &mut analysis, &a, 0x1000);

    dw.commit_error_set(&mut obj, &analysis.errors).unwrap();

    assert!(matches!(dw.init_decl_state(&a), Err(EmitError::ErrorSetFinalized)));
    assert!(matches!(
        dw.commit_error_set(&mut obj, &analysis.errors),
        Err(EmitError::ErrorSetFinalized)
    ));
}

#[test]
fn two_references_defer_two_sites() {
    let arena = Bump::new();
    let mut analysis = Analysis::new(&arena);
    let mut dw = emitter();
    let mut obj = MemObject::new();

    let err = analysis.types.intern(TyData::ErrorSet(ErrorSetKind::Any));
    let void = analysis.types.void();
    let ret = analysis.types.intern(TyData::ErrorUnion { err, payload: void });
    let f = Decl::new_fn(1, "pkg.f", ret, 1, 0);
    let g = Decl::new_fn(2, "pkg.g", ret, 5, 0);
    commit(&mut dw, &mut obj, &mut analysis, &f, 0x1000);
    commit(&mut dw, &mut obj, &mut analysis, &g, 0x2000);
    assert_eq!(dw.deferred_reloc_count(), 2);

    dw.commit_error_set(&mut obj, &analysis.errors).unwrap();
    assert_eq!(dw.deferred_reloc_count(), 0);
}
