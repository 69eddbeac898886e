//! Structural type interning.
//!
//! Reference and pointer types are structural: two mentions of
//! `&region perm T` anywhere in a program are the same type. The table maps
//! each such type to one canonical node so the rest of the compiler can
//! compare and attach metadata by `NodeId`. Buckets are keyed by
//! [`itype_hash`]; candidates within a bucket compare with
//! [`itype_is_run_same`], the runtime equality relation (permissions erased).
//! Canonical nodes are never mutated after normalization.

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::{
    itype::{itype_hash, itype_is_run_same},
    node::{NodeArena, NodeId},
};

#[derive(Debug, Default)]
pub struct TypeTable {
    buckets: AHashMap<u64, SmallVec<[NodeId; 2]>>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the canonical node for `id`'s structural type, inserting `id`
    /// itself when the type has not been seen before.
    pub fn find_or_insert(&mut self, arena: &NodeArena, id: NodeId) -> NodeId {
        let hash = itype_hash(arena, id);
        let bucket = self.buckets.entry(hash).or_default();
        for &candidate in bucket.iter() {
            if itype_is_run_same(arena, candidate, id) {
                return candidate;
            }
        }
        bucket.push(id);
        id
    }

    /// Number of canonical types interned so far.
    pub fn len(&self) -> usize {
        self.buckets.values().map(SmallVec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
