//! Permission attributes and the permission subtype decision.
//!
//! A permission is a first-class type-level value bundling aliasing, mutation
//! and race-safety rights. The built-in set is fixed; user code never defines
//! new permissions. Each built-in carries an attribute bitset, and reference
//! subtyping consults those attributes both to decide whether one permission
//! may stand in for another and to pick the variance of the referent match.

use serde::{Deserialize, Serialize};

use crate::itype::TypeCompare;

/// Attribute bitset of a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PermAttrs(u8);

impl PermAttrs {
    pub const NONE: Self = Self(0);
    /// Values behind the reference may be read.
    pub const MAY_READ: Self = Self(1 << 0);
    /// Values behind the reference may be written.
    pub const MAY_WRITE: Self = Self(1 << 1);
    /// The reference may be freely copied.
    pub const MAY_ALIAS: Self = Self(1 << 2);
    /// Aliases may also write (shared mutation).
    pub const MAY_ALIAS_WRITE: Self = Self(1 << 3);
    /// Safe to send across threads.
    pub const RACE_SAFE: Self = Self(1 << 4);
    /// Interior references may be taken.
    pub const MAY_INT_REF: Self = Self(1 << 5);
    /// Access requires no runtime lock.
    pub const IS_LOCKLESS: Self = Self(1 << 6);

    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl std::ops::BitOr for PermAttrs {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitAnd for PermAttrs {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

/// The built-in permissions.
///
/// `ro` and `opaq` are aliases (of `const` and `id` respectively), resolved at
/// name-hook time; they have no kind of their own.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString, strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum PermKind {
    /// Uniquely writable: read/write, race safe, no aliasing.
    Mut,
    /// Shared mutable: read/write with writing aliases, single thread.
    Mmut,
    /// Immutable forever: read-only, freely aliasable, race safe.
    Imm,
    /// Read-only view: no writes through this reference.
    Const,
    /// Read-only view allowing interior references.
    Constx,
    /// Shared mutable with interior references, single thread.
    Mutx,
    /// Opaque handle: may be aliased and compared, never dereferenced.
    Id,
}

impl PermKind {
    /// The fixed attribute assignment for each built-in permission.
    pub fn attrs(self) -> PermAttrs {
        use PermAttrs as A;
        match self {
            Self::Mut => A::MAY_READ | A::MAY_WRITE | A::RACE_SAFE | A::MAY_INT_REF | A::IS_LOCKLESS,
            Self::Mmut => A::MAY_READ | A::MAY_WRITE | A::MAY_ALIAS | A::MAY_ALIAS_WRITE | A::IS_LOCKLESS,
            Self::Imm => A::MAY_READ | A::MAY_ALIAS | A::RACE_SAFE | A::MAY_INT_REF | A::IS_LOCKLESS,
            Self::Const => A::MAY_READ | A::MAY_ALIAS | A::IS_LOCKLESS,
            Self::Constx => A::MAY_READ | A::MAY_ALIAS | A::MAY_INT_REF | A::IS_LOCKLESS,
            Self::Mutx => A::MAY_READ | A::MAY_WRITE | A::MAY_ALIAS | A::MAY_INT_REF | A::IS_LOCKLESS,
            Self::Id => A::MAY_ALIAS | A::RACE_SAFE | A::IS_LOCKLESS,
        }
    }
}

/// Capability bits considered by the subtype decision. `IS_LOCKLESS` is an
/// implementation property, not a capability, and is excluded.
const CAPABILITY_MASK: PermAttrs = PermAttrs(
    PermAttrs::MAY_READ.0
        | PermAttrs::MAY_WRITE.0
        | PermAttrs::MAY_ALIAS.0
        | PermAttrs::MAY_ALIAS_WRITE.0
        | PermAttrs::RACE_SAFE.0
        | PermAttrs::MAY_INT_REF.0,
);

/// Decides whether a reference with permission `from` may be used where
/// permission `to` is expected.
///
/// Identical permissions match exactly; otherwise the target permission must
/// claim no capability the source lacks, which makes the coercion a free
/// reinterpretation (permissions are erased at runtime).
pub fn perm_matches(to: PermAttrs, from: PermAttrs, same: bool) -> TypeCompare {
    if same {
        return TypeCompare::EqMatch;
    }
    if from.contains(to & CAPABILITY_MASK) {
        TypeCompare::CastSubtype
    } else {
        TypeCompare::NoMatch
    }
}

/// Decides whether a borrow may be taken at permission `requested` from a
/// place whose declared permission is `source`.
///
/// Borrowing re-derives a new, scope-bounded reference, so only the access
/// rights matter: the borrow may not read or write more than the place allows.
pub fn perm_borrowable(requested: PermAttrs, source: PermAttrs) -> bool {
    let access = PermAttrs::MAY_READ | PermAttrs::MAY_WRITE;
    source.contains(requested & access)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn borrow_rights_are_capped_by_the_place() {
        // const borrow from a mut place: fine, reads only.
        assert!(perm_borrowable(PermKind::Const.attrs(), PermKind::Mut.attrs()));
        // mut borrow from an imm place: would gain write access.
        assert!(!perm_borrowable(PermKind::Mut.attrs(), PermKind::Imm.attrs()));
        // id borrow from anything: no access at all.
        assert!(perm_borrowable(PermKind::Id.attrs(), PermKind::Imm.attrs()));
    }

    #[test]
    fn attrs_match_the_built_in_table() {
        assert!(PermKind::Mut.attrs().contains(PermAttrs::MAY_WRITE | PermAttrs::RACE_SAFE));
        assert!(!PermKind::Mut.attrs().contains(PermAttrs::MAY_ALIAS));
        assert!(PermKind::Mmut.attrs().contains(PermAttrs::MAY_ALIAS_WRITE));
        assert!(!PermKind::Imm.attrs().contains(PermAttrs::MAY_WRITE));
        assert!(PermKind::Id.attrs().contains(PermAttrs::MAY_ALIAS));
        assert!(!PermKind::Id.attrs().intersects(PermAttrs::MAY_READ | PermAttrs::MAY_WRITE));
    }

    #[test]
    fn same_permission_is_an_exact_match() {
        let imm = PermKind::Imm.attrs();
        assert_eq!(perm_matches(imm, imm, true), TypeCompare::EqMatch);
    }

    #[test]
    fn capability_loss_is_a_free_cast() {
        // imm -> const: drops RaceSafe and MayIntRef, keeps read/alias.
        assert_eq!(
            perm_matches(PermKind::Const.attrs(), PermKind::Imm.attrs(), false),
            TypeCompare::CastSubtype
        );
        // -> id: needs aliasing and race safety, nothing else.
        for kind in [PermKind::Mut, PermKind::Mmut, PermKind::Imm, PermKind::Const] {
            let expect = if kind.attrs().contains(PermAttrs::MAY_ALIAS | PermAttrs::RACE_SAFE) {
                TypeCompare::CastSubtype
            } else {
                TypeCompare::NoMatch
            };
            assert_eq!(perm_matches(PermKind::Id.attrs(), kind.attrs(), false), expect, "{kind}");
        }
    }

    #[test]
    fn capability_gain_is_rejected() {
        // const -> mut: would gain write and race safety.
        assert_eq!(
            perm_matches(PermKind::Mut.attrs(), PermKind::Const.attrs(), false),
            TypeCompare::NoMatch
        );
        // mut -> const: would gain aliasing.
        assert_eq!(
            perm_matches(PermKind::Const.attrs(), PermKind::Mut.attrs(), false),
            TypeCompare::NoMatch
        );
        // mmut -> mutx: would gain interior references.
        assert_eq!(
            perm_matches(PermKind::Mutx.attrs(), PermKind::Mmut.attrs(), false),
            TypeCompare::NoMatch
        );
    }

    #[test]
    fn permission_names_round_trip() {
        for kind in [
            PermKind::Mut,
            PermKind::Mmut,
            PermKind::Imm,
            PermKind::Const,
            PermKind::Constx,
            PermKind::Mutx,
            PermKind::Id,
        ] {
            let shown = kind.to_string();
            assert_eq!(shown.parse::<PermKind>().unwrap(), kind);
        }
    }
}
