//! Registry of script overrides supplied by content packages.
//!
//! An override maps an original command pointer to a replacement. Resolution returns the
//! replacement for either end of a pair, so a cursor that already sits on a replacement stays
//! there. Entries are kept in registration order and the first match wins.
//!
//! A replacement installed in its own buffer is a stream authored by the registering owner;
//! [`OverrideResolver::stream_owner`] answers who wrote the command a cursor sits on once it
//! has moved past the replacement's entry point.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bytecode::format::{BufferId, ScriptPtr};

/// Identity of the package that registered an override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId(pub u32);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverrideEntry {
    pub original: ScriptPtr,
    pub replacement: ScriptPtr,
    pub owner: OwnerId,
}

impl OverrideEntry {
    fn matches(&self, ptr: ScriptPtr) -> bool {
        self.original == ptr || self.replacement == ptr
    }
}

/// Outcome of registering an override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Active,
    /// Another owner already claimed the same original; that entry keeps winning.
    Shadowed { by: OwnerId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub ptr: ScriptPtr,
    pub owner: Option<OwnerId>,
}

#[derive(Debug, Clone, Default)]
pub struct OverrideResolver {
    entries: Vec<OverrideEntry>,
}

impl OverrideResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        original: ScriptPtr,
        replacement: ScriptPtr,
        owner: OwnerId,
    ) -> Registration {
        let shadowed_by = self
            .entries
            .iter()
            .find(|entry| entry.original == original && entry.owner != owner)
            .map(|entry| entry.owner);
        self.entries.push(OverrideEntry {
            original,
            replacement,
            owner,
        });
        match shadowed_by {
            Some(by) => Registration::Shadowed { by },
            None => Registration::Active,
        }
    }

    /// Removes every entry registered by `owner`, returning how many were dropped.
    pub fn unregister_all(&mut self, owner: OwnerId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.owner != owner);
        before - self.entries.len()
    }

    pub fn resolve(&self, ptr: ScriptPtr) -> Resolution {
        match self.entries.iter().find(|entry| entry.matches(ptr)) {
            Some(entry) => Resolution {
                ptr: entry.replacement,
                owner: Some(entry.owner),
            },
            None => Resolution { ptr, owner: None },
        }
    }

    /// Owner of the replacement stream held in `buffer`, or `None` for base content.
    pub fn stream_owner(&self, buffer: BufferId) -> Option<OwnerId> {
        self.entries
            .iter()
            .find(|entry| entry.replacement.buffer == buffer && entry.original.buffer != buffer)
            .map(|entry| entry.owner)
    }

    pub fn entries(&self) -> &[OverrideEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ptr(buffer: u32, offset: u32) -> ScriptPtr {
        ScriptPtr::new(BufferId(buffer), offset)
    }

    #[test]
    fn both_ends_resolve_to_replacement() {
        let mut resolver = OverrideResolver::new();
        let (original, replacement) = (ptr(0, 0x40), ptr(5, 0));
        assert_eq!(resolver.register(original, replacement, OwnerId(1)), Registration::Active);
        for ptr_end in [original, replacement] {
            assert_eq!(
                resolver.resolve(ptr_end),
                Resolution {
                    ptr: replacement,
                    owner: Some(OwnerId(1))
                }
            );
        }
        assert_eq!(resolver.resolve(ptr(0, 0x44)).owner, None);
        assert_eq!(resolver.unregister_all(OwnerId(1)), 1);
        assert_eq!(resolver.resolve(original).ptr, original);
    }

    #[test]
    fn first_registration_wins_and_conflicts_are_reported() {
        let mut resolver = OverrideResolver::new();
        let original = ptr(0, 0);
        resolver.register(original, ptr(1, 0), OwnerId(1));
        assert_eq!(
            resolver.register(original, ptr(2, 0), OwnerId(2)),
            Registration::Shadowed { by: OwnerId(1) }
        );
        assert_eq!(resolver.resolve(original).ptr, ptr(1, 0));
        resolver.unregister_all(OwnerId(1));
        assert_eq!(resolver.resolve(original).ptr, ptr(2, 0));
    }

    #[test]
    fn stream_owner_follows_replacement_buffers() {
        let mut resolver = OverrideResolver::new();
        resolver.register(ptr(0, 0x10), ptr(4, 0), OwnerId(7));
        resolver.register(ptr(0, 0x20), ptr(0, 0x30), OwnerId(8));
        assert_eq!(resolver.stream_owner(BufferId(4)), Some(OwnerId(7)));
        assert_eq!(resolver.stream_owner(BufferId(0)), None);
        resolver.unregister_all(OwnerId(7));
        assert_eq!(resolver.stream_owner(BufferId(4)), None);
    }
}
