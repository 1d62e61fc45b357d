//! Target description consumed by the back-end.

/// Pointer width of the target machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PtrWidth {
    P32,
    P64,
}

impl PtrWidth {
    /// Classify a pointer bit width. Widths outside 1..=64 have no
    /// representation and yield `None`.
    pub fn from_bits(bits: u16) -> Option<PtrWidth> {
        match bits {
            1..=32 => Some(PtrWidth::P32),
            33..=64 => Some(PtrWidth::P64),
            _ => None,
        }
    }

    /// Pointer size in bytes.
    pub fn bytes(self) -> u8 {
        match self {
            PtrWidth::P32 => 4,
            PtrWidth::P64 => 8,
        }
    }

    /// Pointer size in bits.
    pub fn bits(self) -> u16 {
        self.bytes() as u16 * 8
    }
}

/// Byte order of emitted data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn u16_bytes(self, v: u16) -> [u8; 2] {
        match self {
            Endian::Little => v.to_le_bytes(),
            Endian::Big => v.to_be_bytes(),
        }
    }

    pub fn u32_bytes(self, v: u32) -> [u8; 4] {
        match self {
            Endian::Little => v.to_le_bytes(),
            Endian::Big => v.to_be_bytes(),
        }
    }

    pub fn u64_bytes(self, v: u64) -> [u8; 8] {
        match self {
            Endian::Little => v.to_le_bytes(),
            Endian::Big => v.to_be_bytes(),
        }
    }

    pub fn read_u32(self, b: [u8; 4]) -> u32 {
        match self {
            Endian::Little => u32::from_le_bytes(b),
            Endian::Big => u32::from_be_bytes(b),
        }
    }
}

/// Container format of the output object file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Elf,
    MachO,
}

/// The subset of the target triple the back-end cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Target {
    pub ptr_width: PtrWidth,
    pub endian: Endian,
    pub format: Format,
}

impl Target {
    pub fn elf(ptr_width: PtrWidth, endian: Endian) -> Target {
        Target { ptr_width, endian, format: Format::Elf }
    }

    /// Mach-O output. The `__DWARF` segment is always little-endian.
    pub fn macho(ptr_width: PtrWidth) -> Target {
        Target { ptr_width, endian: Endian::Little, format: Format::MachO }
    }

    /// Pointer size in bytes.
    pub fn ptr_bytes(&self) -> u8 {
        self.ptr_width.bytes()
    }

    /// Byte order of the debug sections. ELF follows the target; Mach-O
    /// debug data is little-endian regardless.
    pub fn data_endian(&self) -> Endian {
        match self.format {
            Format::Elf => self.endian,
            Format::MachO => Endian::Little,
        }
    }

    /// 64-bit ELF carries 64-bit DWARF (12-byte initial length, 8-byte
    /// section offsets); 32-bit ELF and Mach-O stay in the 32-bit format.
    pub fn dwarf64(&self) -> bool {
        self.format == Format::Elf && self.ptr_width == PtrWidth::P64
    }

    /// Size in bytes of a DWARF initial-length field.
    pub fn initial_len_bytes(&self) -> u32 {
        if self.dwarf64() {
            12
        } else {
            4
        }
    }

    /// Size in bytes of a DWARF section offset (strp, sec_offset).
    pub fn sect_off_bytes(&self) -> u32 {
        if self.dwarf64() {
            8
        } else {
            4
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ptr_width_from_bits() {
        assert_eq!(PtrWidth::from_bits(32), Some(PtrWidth::P32));
        assert_eq!(PtrWidth::from_bits(64), Some(PtrWidth::P64));
        assert_eq!(PtrWidth::from_bits(16), Some(PtrWidth::P32));
        assert_eq!(PtrWidth::from_bits(33), Some(PtrWidth::P64));
        assert_eq!(PtrWidth::from_bits(0), None);
        assert_eq!(PtrWidth::from_bits(65), None);
    }

    #[test]
    fn test_ptr_width_bytes() {
        assert_eq!(PtrWidth::P32.bytes(), 4);
        assert_eq!(PtrWidth::P64.bytes(), 8);
    }

    #[test]
    fn test_endian_bytes() {
        assert_eq!(Endian::Little.u32_bytes(0x0102_0304), [4, 3, 2, 1]);
        assert_eq!(Endian::Big.u32_bytes(0x0102_0304), [1, 2, 3, 4]);
        assert_eq!(Endian::Little.read_u32([4, 3, 2, 1]), 0x0102_0304);
        assert_eq!(Endian::Big.read_u32([1, 2, 3, 4]), 0x0102_0304);
    }

    #[test]
    fn test_macho_is_little_endian() {
        let t = Target::macho(PtrWidth::P64);
        assert_eq!(t.data_endian(), Endian::Little);
        assert!(!t.dwarf64());
    }

    #[test]
    fn test_elf64_uses_dwarf64() {
        let t = Target::elf(PtrWidth::P64, Endian::Little);
        assert!(t.dwarf64());
        assert_eq!(t.initial_len_bytes(), 12);
        assert_eq!(t.sect_off_bytes(), 8);
    }

    #[test]
    fn test_elf32_uses_dwarf32() {
        let t = Target::elf(PtrWidth::P32, Endian::Big);
        assert!(!t.dwarf64());
        assert_eq!(t.initial_len_bytes(), 4);
        assert_eq!(t.data_endian(), Endian::Big);
    }
}
