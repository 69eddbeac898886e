//! Identifier interning.
//!
//! Every name that flows through the compiler (variable names, type names,
//! permission names, field names) is interned once and handled as a [`NameId`]
//! afterwards. Interning happens in the parser and in core-library setup; the
//! passes only ever compare ids. The actual string is needed again solely for
//! diagnostics and mangling.

use ahash::AHashMap;

/// Index into the interner's storage.
///
/// Uses `u32` to save space (4 bytes vs 8 bytes for `usize`). This limits us to
/// ~4 billion unique names, which is more than sufficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct NameId(u32);

impl NameId {
    /// Returns the raw index value.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Insert-only string interner.
///
/// Names are never removed for the lifetime of a compilation; scope handling is
/// done by the name table on top of stable ids, not by forgetting strings.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct Interner {
    map: AHashMap<String, u32>,
    names: Vec<String>,
}

/// The placeholder name `_`: an assignment target that swallows its value.
pub const ANON_NAME: &str = "_";
/// The method receiver name.
pub const SELF_NAME: &str = "self";

impl Interner {
    /// Creates an interner pre-seeded with the well-known names the passes
    /// test against directly.
    pub fn new() -> Self {
        let mut interner = Self::default();
        interner.intern(ANON_NAME);
        interner.intern(SELF_NAME);
        interner
    }

    /// Interns a name, returning the id of the existing entry when seen before.
    pub fn intern(&mut self, name: &str) -> NameId {
        if let Some(&id) = self.map.get(name) {
            return NameId(id);
        }
        let id = u32::try_from(self.names.len()).expect("interner overflow");
        self.names.push(name.to_owned());
        self.map.insert(name.to_owned(), id);
        NameId(id)
    }

    /// Returns the id of an already-interned name without inserting.
    pub fn get(&self, name: &str) -> Option<NameId> {
        self.map.get(name).copied().map(NameId)
    }

    /// Returns the string for a previously interned id.
    pub fn name(&self, id: NameId) -> &str {
        &self.names[id.index()]
    }

    /// The id of the `_` placeholder name.
    pub fn anon(&self) -> NameId {
        NameId(0)
    }

    /// The id of the `self` receiver name.
    pub fn self_name(&self) -> NameId {
        NameId(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let mut interner = Interner::new();
        let a = interner.intern("point");
        let b = interner.intern("point");
        assert_eq!(a, b);
        assert_eq!(interner.name(a), "point");
    }

    #[test]
    fn well_known_names_are_seeded() {
        let interner = Interner::new();
        assert_eq!(interner.get(ANON_NAME), Some(interner.anon()));
        assert_eq!(interner.get(SELF_NAME), Some(interner.self_name()));
    }

    #[test]
    fn distinct_names_get_distinct_ids() {
        let mut interner = Interner::new();
        let a = interner.intern("x");
        let b = interner.intern("y");
        assert_ne!(a, b);
    }
}
