//! Declaration records.

use crate::types::Ty;

/// Stable identifier of a declaration, assigned by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclId(pub u32);

/// What kind of declaration this is, with the back-end-relevant details.
#[derive(Debug, Clone, Copy)]
pub enum DeclKind<'t> {
    /// A function body. `ret` is the return type; `lbrace_line` is the line
    /// of the opening brace relative to the declaration line.
    Fn { ret: Ty<'t>, lbrace_line: u32 },
    /// A global variable.
    Var,
}

/// One declaration as seen by the linker back-end.
#[derive(Debug, Clone, Copy)]
pub struct Decl<'t> {
    pub id: DeclId,
    /// Fully qualified name, e.g. `pkg.Parser.next`.
    pub name: &'t str,
    pub kind: DeclKind<'t>,
    /// Zero-based source line of the declaration.
    pub src_line: u32,
}

impl<'t> Decl<'t> {
    pub fn new_fn(id: u32, name: &'t str, ret: Ty<'t>, src_line: u32, lbrace_line: u32) -> Decl<'t> {
        Decl {
            id: DeclId(id),
            name,
            kind: DeclKind::Fn { ret, lbrace_line },
            src_line,
        }
    }

    pub fn new_var(id: u32, name: &'t str, src_line: u32) -> Decl<'t> {
        Decl { id: DeclId(id), name, kind: DeclKind::Var, src_line }
    }

    pub fn is_fn(&self) -> bool {
        matches!(self.kind, DeclKind::Fn { .. })
    }
}
