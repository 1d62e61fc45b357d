//! Structural types and ABI layout.
//!
//! Types are interned in a bump arena so a `Ty` is a plain shared reference
//! with identity equality after interning. Layout queries are computed
//! against a [`Target`] rather than stored, since the same type graph may be
//! laid out for more than one target during a build.

use crate::decl::DeclId;
use bumpalo::Bump;
use common::Target;
use hashbrown::HashMap;
use std::fmt;

/// An interned type.
pub type Ty<'t> = &'t TyData<'t>;

/// A struct or union field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Field<'t> {
    pub name: &'t str,
    pub ty: Ty<'t>,
}

/// An enum variant. `value` is `None` when the source left the tag value
/// implicit; consumers then use the ordinal index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Variant<'t> {
    pub name: &'t str,
    pub value: Option<u64>,
}

/// The three flavours of error set the back-end distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorSetKind<'t> {
    /// The global error set, `anyerror`. Only fully known once every
    /// declaration of the compile has been analysed.
    Any,
    /// A named error set with a known member list.
    Concrete { name: &'t str, errors: &'t [&'t str] },
    /// The inferred error set of a function. Whether it has been resolved
    /// yet is tracked in [`crate::InferredErrors`].
    Inferred { func: DeclId },
}

/// Structural type data. Interned; compare via `==` on `Ty`.
#[derive(Debug, PartialEq, Eq, Hash)]
pub enum TyData<'t> {
    Void,
    Bool,
    Int { signed: bool, bits: u16 },
    Float { bits: u16 },
    Pointer { elem: Ty<'t> },
    Slice { elem: Ty<'t> },
    Optional { payload: Ty<'t> },
    Struct { name: &'t str, fields: &'t [Field<'t>], packed: bool },
    Tuple { fields: &'t [Ty<'t>] },
    Enum { name: &'t str, tag_bits: u16, variants: &'t [Variant<'t>] },
    Union { name: &'t str, tag: Option<Ty<'t>>, fields: &'t [Field<'t>] },
    ErrorSet(ErrorSetKind<'t>),
    ErrorUnion { err: Ty<'t>, payload: Ty<'t> },
}

/// Interning context over a bump arena.
pub struct TyCtx<'t> {
    arena: &'t Bump,
    interned: HashMap<&'t TyData<'t>, ()>,
}

impl<'t> TyCtx<'t> {
    pub fn new(arena: &'t Bump) -> TyCtx<'t> {
        TyCtx { arena, interned: HashMap::new() }
    }

    /// Intern structural type data, returning the canonical reference.
    pub fn intern(&mut self, data: TyData<'t>) -> Ty<'t> {
        if let Some((&existing, _)) = self.interned.get_key_value(&data) {
            existing
        } else {
            let ty = &*self.arena.alloc(data);
            self.interned.insert(ty, ());
            ty
        }
    }

    pub fn alloc_str(&self, s: &str) -> &'t str {
        self.arena.alloc_str(s)
    }

    pub fn alloc_fields(&self, fields: &[Field<'t>]) -> &'t [Field<'t>] {
        self.arena.alloc_slice_copy(fields)
    }

    pub fn alloc_tys(&self, tys: &[Ty<'t>]) -> &'t [Ty<'t>] {
        self.arena.alloc_slice_copy(tys)
    }

    pub fn alloc_variants(&self, variants: &[Variant<'t>]) -> &'t [Variant<'t>] {
        self.arena.alloc_slice_copy(variants)
    }

    pub fn alloc_names(&self, names: &[&'t str]) -> &'t [&'t str] {
        self.arena.alloc_slice_copy(names)
    }

    pub fn void(&mut self) -> Ty<'t> {
        self.intern(TyData::Void)
    }

    pub fn bool_(&mut self) -> Ty<'t> {
        self.intern(TyData::Bool)
    }

    pub fn int(&mut self, signed: bool, bits: u16) -> Ty<'t> {
        self.intern(TyData::Int { signed, bits })
    }

    /// The pointer-sized unsigned integer of `target`.
    pub fn usize_ty(&mut self, target: &Target) -> Ty<'t> {
        let bits = target.ptr_width.bits();
        self.int(false, bits)
    }

    pub fn pointer(&mut self, elem: Ty<'t>) -> Ty<'t> {
        self.intern(TyData::Pointer { elem })
    }

    pub fn slice(&mut self, elem: Ty<'t>) -> Ty<'t> {
        self.intern(TyData::Slice { elem })
    }

    pub fn optional(&mut self, payload: Ty<'t>) -> Ty<'t> {
        self.intern(TyData::Optional { payload })
    }
}

/// Round `v` up to a multiple of `align`. `align` of zero is treated as one.
pub fn align_up(v: u64, align: u64) -> u64 {
    let align = align.max(1);
    v.div_ceil(align) * align
}

/// ABI byte size of an integer with the given bit width: the byte count
/// rounded up to a power of two.
fn int_bytes(bits: u16) -> u64 {
    if bits == 0 {
        return 0;
    }
    (bits as u64).div_ceil(8).next_power_of_two()
}

/// Smallest bit width able to represent `count` distinct tag values.
pub fn bits_needed(count: usize) -> u16 {
    if count <= 1 {
        0
    } else {
        (usize::BITS - (count - 1).leading_zeros()) as u16
    }
}

/// Layout of a union, tagged or bare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnionLayout {
    pub abi_size: u64,
    pub abi_align: u64,
    pub tag_size: u64,
    pub tag_align: u64,
    pub payload_size: u64,
    pub payload_align: u64,
    pub tag_offset: u64,
    pub payload_offset: u64,
}

impl<'t> TyData<'t> {
    /// Whether values of this type occupy bytes at runtime.
    pub fn has_runtime_bits(&self, target: &Target) -> bool {
        self.abi_size(target) > 0
    }

    /// An optional wrapping a plain pointer is represented as the pointer
    /// itself, with null standing in for "no value".
    pub fn is_pointer_like_optional(&self) -> bool {
        matches!(self, TyData::Optional { payload: TyData::Pointer { .. } })
    }

    pub fn abi_size(&self, target: &Target) -> u64 {
        let ptr = target.ptr_bytes() as u64;
        match *self {
            TyData::Void => 0,
            TyData::Bool => 1,
            TyData::Int { bits, .. } => int_bytes(bits),
            TyData::Float { bits } => (bits as u64).div_ceil(8),
            TyData::Pointer { .. } => ptr,
            TyData::Slice { .. } => 2 * ptr,
            TyData::Optional { payload } => {
                if self.is_pointer_like_optional() {
                    ptr
                } else if !payload.has_runtime_bits(target) {
                    1
                } else {
                    payload.abi_align(target) + payload.abi_size(target)
                }
            }
            TyData::Struct { fields, packed, .. } => {
                if packed {
                    fields.iter().map(|f| f.ty.abi_size(target)).sum()
                } else {
                    struct_layout(fields.iter().map(|f| f.ty), target).0
                }
            }
            TyData::Tuple { fields } => struct_layout(fields.iter().copied(), target).0,
            TyData::Enum { tag_bits, .. } => int_bytes(tag_bits),
            TyData::Union { .. } => self.union_layout(target).abi_size,
            TyData::ErrorSet(_) => 2,
            TyData::ErrorUnion { err, payload } => {
                let value_off = align_up(err.abi_size(target), payload.abi_align(target));
                align_up(
                    value_off + payload.abi_size(target),
                    err.abi_align(target).max(payload.abi_align(target)),
                )
            }
        }
    }

    pub fn abi_align(&self, target: &Target) -> u64 {
        let ptr = target.ptr_bytes() as u64;
        match *self {
            TyData::Void => 1,
            TyData::Bool => 1,
            TyData::Int { bits, .. } => int_bytes(bits).max(1).min(16),
            TyData::Float { bits } => ((bits as u64).div_ceil(8)).max(1).min(16),
            TyData::Pointer { .. } => ptr,
            TyData::Slice { .. } => ptr,
            TyData::Optional { payload } => {
                if self.is_pointer_like_optional() {
                    ptr
                } else {
                    payload.abi_align(target)
                }
            }
            TyData::Struct { fields, packed, .. } => {
                if packed {
                    1
                } else {
                    struct_layout(fields.iter().map(|f| f.ty), target).1
                }
            }
            TyData::Tuple { fields } => struct_layout(fields.iter().copied(), target).1,
            TyData::Enum { tag_bits, .. } => int_bytes(tag_bits).max(1).min(16),
            TyData::Union { .. } => self.union_layout(target).abi_align,
            TyData::ErrorSet(_) => 2,
            TyData::ErrorUnion { err, payload } => {
                err.abi_align(target).max(payload.abi_align(target))
            }
        }
    }

    /// Byte offset of each field of a non-packed struct or tuple.
    pub fn field_offset(&self, index: usize, target: &Target) -> u64 {
        let offsets: Vec<u64> = match *self {
            TyData::Struct { fields, .. } => {
                field_offsets(fields.iter().map(|f| f.ty), target)
            }
            TyData::Tuple { fields } => field_offsets(fields.iter().copied(), target),
            _ => Vec::new(),
        };
        offsets.get(index).copied().unwrap_or(0)
    }

    /// Full layout for a union type. The higher-aligned of tag and payload
    /// comes first.
    pub fn union_layout(&self, target: &Target) -> UnionLayout {
        let (tag, fields) = match *self {
            TyData::Union { tag, fields, .. } => (tag, fields),
            _ => {
                return UnionLayout {
                    abi_size: 0,
                    abi_align: 1,
                    tag_size: 0,
                    tag_align: 1,
                    payload_size: 0,
                    payload_align: 1,
                    tag_offset: 0,
                    payload_offset: 0,
                }
            }
        };
        let payload_size = fields.iter().map(|f| f.ty.abi_size(target)).max().unwrap_or(0);
        let payload_align =
            fields.iter().map(|f| f.ty.abi_align(target)).max().unwrap_or(1).max(1);
        let (tag_size, tag_align) = match tag {
            Some(t) => (t.abi_size(target), t.abi_align(target).max(1)),
            None => {
                return UnionLayout {
                    abi_size: align_up(payload_size, payload_align),
                    abi_align: payload_align,
                    tag_size: 0,
                    tag_align: 1,
                    payload_size,
                    payload_align,
                    tag_offset: 0,
                    payload_offset: 0,
                }
            }
        };
        let abi_align = tag_align.max(payload_align);
        if tag_align >= payload_align {
            let payload_offset = align_up(tag_size, payload_align);
            UnionLayout {
                abi_size: align_up(payload_offset + payload_size, abi_align),
                abi_align,
                tag_size,
                tag_align,
                payload_size,
                payload_align,
                tag_offset: 0,
                payload_offset,
            }
        } else {
            let tag_offset = align_up(payload_size, tag_align);
            UnionLayout {
                abi_size: align_up(tag_offset + tag_size, abi_align),
                abi_align,
                tag_size,
                tag_align,
                payload_size,
                payload_align,
                tag_offset,
                payload_offset: 0,
            }
        }
    }
}

fn struct_layout<'t>(fields: impl Iterator<Item = Ty<'t>>, target: &Target) -> (u64, u64) {
    let mut off = 0u64;
    let mut align = 1u64;
    for ty in fields {
        let a = ty.abi_align(target);
        off = align_up(off, a) + ty.abi_size(target);
        align = align.max(a);
    }
    (align_up(off, align), align)
}

fn field_offsets<'t>(fields: impl Iterator<Item = Ty<'t>>, target: &Target) -> Vec<u64> {
    let mut off = 0u64;
    let mut out = Vec::new();
    for ty in fields {
        off = align_up(off, ty.abi_align(target));
        out.push(off);
        off += ty.abi_size(target);
    }
    out
}

impl fmt::Display for TyData<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TyData::Void => write!(f, "void"),
            TyData::Bool => write!(f, "bool"),
            TyData::Int { signed, bits } => {
                write!(f, "{}{}", if signed { 'i' } else { 'u' }, bits)
            }
            TyData::Float { bits } => write!(f, "f{}", bits),
            TyData::Pointer { elem } => write!(f, "*{}", elem),
            TyData::Slice { elem } => write!(f, "[]{}", elem),
            TyData::Optional { payload } => write!(f, "?{}", payload),
            TyData::Struct { name, .. } => write!(f, "{}", name),
            TyData::Tuple { fields } => {
                write!(f, "(")?;
                for (i, ty) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", ty)?;
                }
                write!(f, ")")
            }
            TyData::Enum { name, .. } => write!(f, "{}", name),
            TyData::Union { name, .. } => write!(f, "{}", name),
            TyData::ErrorSet(ErrorSetKind::Any) => write!(f, "anyerror"),
            TyData::ErrorSet(ErrorSetKind::Concrete { name, .. }) => write!(f, "{}", name),
            TyData::ErrorSet(ErrorSetKind::Inferred { .. }) => write!(f, "error{{...}}"),
            TyData::ErrorUnion { err, payload } => write!(f, "{}!{}", err, payload),
        }
    }
}

/// Append a canonical byte encoding of `ty` for `target`. Two types encode
/// identically exactly when the back-end may merge their debug records, so
/// the target fields are folded in up front.
pub fn canonical_bytes(ty: Ty<'_>, target: &Target, out: &mut Vec<u8>) {
    out.push(target.ptr_bytes());
    out.push(match target.data_endian() {
        common::Endian::Little => 0,
        common::Endian::Big => 1,
    });
    out.push(match target.format {
        common::Format::Elf => 0,
        common::Format::MachO => 1,
    });
    encode(ty, out);
}

fn encode_str(s: &str, out: &mut Vec<u8>) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

fn encode(ty: Ty<'_>, out: &mut Vec<u8>) {
    match *ty {
        TyData::Void => out.push(0),
        TyData::Bool => out.push(1),
        TyData::Int { signed, bits } => {
            out.push(2);
            out.push(signed as u8);
            out.extend_from_slice(&bits.to_le_bytes());
        }
        TyData::Float { bits } => {
            out.push(3);
            out.extend_from_slice(&bits.to_le_bytes());
        }
        TyData::Pointer { elem } => {
            out.push(4);
            encode(elem, out);
        }
        TyData::Slice { elem } => {
            out.push(5);
            encode(elem, out);
        }
        TyData::Optional { payload } => {
            out.push(6);
            encode(payload, out);
        }
        TyData::Struct { name, fields, packed } => {
            out.push(7);
            encode_str(name, out);
            out.push(packed as u8);
            for field in fields {
                encode_str(field.name, out);
                encode(field.ty, out);
            }
            out.push(0xff);
        }
        TyData::Tuple { fields } => {
            out.push(8);
            for ty in fields {
                encode(ty, out);
            }
            out.push(0xff);
        }
        TyData::Enum { name, tag_bits, variants } => {
            out.push(9);
            encode_str(name, out);
            out.extend_from_slice(&tag_bits.to_le_bytes());
            for v in variants {
                encode_str(v.name, out);
                match v.value {
                    Some(val) => {
                        out.push(1);
                        out.extend_from_slice(&val.to_le_bytes());
                    }
                    None => out.push(0),
                }
            }
            out.push(0xff);
        }
        TyData::Union { name, tag, fields } => {
            out.push(10);
            encode_str(name, out);
            match tag {
                Some(t) => {
                    out.push(1);
                    encode(t, out);
                }
                None => out.push(0),
            }
            for field in fields {
                encode_str(field.name, out);
                encode(field.ty, out);
            }
            out.push(0xff);
        }
        TyData::ErrorSet(ErrorSetKind::Any) => out.push(11),
        TyData::ErrorSet(ErrorSetKind::Concrete { name, errors }) => {
            out.push(12);
            encode_str(name, out);
            for e in errors {
                encode_str(e, out);
            }
            out.push(0xff);
        }
        TyData::ErrorSet(ErrorSetKind::Inferred { func }) => {
            out.push(13);
            out.extend_from_slice(&func.0.to_le_bytes());
        }
        TyData::ErrorUnion { err, payload } => {
            out.push(14);
            encode(err, out);
            encode(payload, out);
        }
    }
}
