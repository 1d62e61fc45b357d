//! The global error table and inferred-error-set resolution state.

use crate::decl::DeclId;
use hashbrown::HashMap;

/// The global error name table. Every error name in the program receives one
/// stable nonzero value; zero is reserved to mean "no error".
#[derive(Debug, Default)]
pub struct ErrorTable {
    names: Vec<String>,
    index: HashMap<String, u16>,
}

impl ErrorTable {
    /// Register an error name, returning its value. Idempotent.
    pub fn intern(&mut self, name: &str) -> u16 {
        if let Some(&v) = self.index.get(name) {
            return v;
        }
        let value = self.names.len() as u16 + 1;
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), value);
        value
    }

    pub fn value(&self, name: &str) -> Option<u16> {
        self.index.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// All registered names with their values, in assignment order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u16)> {
        self.names.iter().enumerate().map(|(i, n)| (n.as_str(), i as u16 + 1))
    }
}

/// Resolution state of inferred error sets, keyed by the owning function.
/// Absent key means the set has not been resolved yet.
#[derive(Debug, Default)]
pub struct InferredErrors {
    map: HashMap<DeclId, Vec<String>>,
}

impl InferredErrors {
    pub fn resolve(&mut self, func: DeclId, names: Vec<String>) {
        self.map.insert(func, names);
    }

    pub fn get(&self, func: DeclId) -> Option<&[String]> {
        self.map.get(&func).map(|v| v.as_slice())
    }
}
