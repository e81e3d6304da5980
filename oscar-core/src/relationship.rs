//! Relationship engine: resolves pairwise visibility between two
//! identities from permit/deny/buddy lists and five privacy modes.
//!
//! Plain enums and pure functions over the lists it's handed, with
//! lookups going through a small trait so the engine stays independent
//! of how the persistent store actually keeps its rows.

use std::collections::HashSet;

use crate::identity::IdentityKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivacyMode {
    PermitAll,
    PermitOnList,
    PermitSome,
    DenyAll,
    DenySome,
}

/// One source's view of a user's lists.
#[derive(Debug, Clone, Default)]
pub struct RelationshipSource {
    pub mode: PrivacyMode,
    pub buddy: HashSet<IdentityKey>,
    pub permit: HashSet<IdentityKey>,
    pub deny: HashSet<IdentityKey>,
}

impl Default for PrivacyMode {
    fn default() -> PrivacyMode {
        PrivacyMode::PermitAll
    }
}

impl RelationshipSource {
    pub fn new(mode: PrivacyMode) -> RelationshipSource {
        RelationshipSource {
            mode,
            ..Default::default()
        }
    }

    /// Switching modes drops whatever permit/deny
    /// entries were meaningful only under the old mode, so a later
    /// switch back doesn't resurrect a stale entry.
    pub fn set_mode(&mut self, new_mode: PrivacyMode) {
        if new_mode != self.mode {
            self.permit.clear();
            self.deny.clear();
            self.mode = new_mode;
        }
    }
}

/// Both sources plus any runtime-only temp buddies for one identity.
#[derive(Debug, Clone, Default)]
pub struct UserRelationshipData {
    pub client: Option<RelationshipSource>,
    pub server: Option<RelationshipSource>,
    pub temp_buddies: HashSet<IdentityKey>,
}

impl UserRelationshipData {
    /// Client-side supersedes server-side per user when both exist:
    /// it represents a more recent runtime override.
    fn effective(&self) -> Option<&RelationshipSource> {
        self.client.as_ref().or(self.server.as_ref())
    }

    /// "My buddy list" for presence checks is the union across both
    /// sources plus temp buddies -- unlike mode/permit/deny, buddy
    /// membership is never superseded, only added to.
    fn combined_buddies(&self) -> HashSet<&IdentityKey> {
        let mut set: HashSet<&IdentityKey> = HashSet::new();
        if let Some(client) = &self.client {
            set.extend(client.buddy.iter());
        }
        if let Some(server) = &self.server {
            set.extend(server.buddy.iter());
        }
        set.extend(self.temp_buddies.iter());
        set
    }

    fn blocks(&self, candidate: &IdentityKey) -> bool {
        let Some(source) = self.effective() else {
            return false;
        };
        match source.mode {
            PrivacyMode::PermitAll => false,
            PrivacyMode::DenyAll => true,
            PrivacyMode::DenySome => source.deny.contains(candidate),
            PrivacyMode::PermitSome => !source.permit.contains(candidate),
            PrivacyMode::PermitOnList => !self.combined_buddies().contains(candidate),
        }
    }
}

/// Supplies relationship data for an identity; the persistent store and
/// a session's client-side overrides both implement this, independent
/// of the engine's pure resolution logic.
pub trait RelationshipDataSource {
    fn lookup(&self, identity: &IdentityKey) -> UserRelationshipData;
}

/// A `Relationship`, derived and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relationship {
    pub you_block: bool,
    pub blocks_you: bool,
    pub is_on_your_list: bool,
    pub is_on_their_list: bool,
}

/// Resolve a single pair.
pub fn resolve(
    me: &IdentityKey,
    them: &IdentityKey,
    source: &dyn RelationshipDataSource,
) -> Relationship {
    let mine = source.lookup(me);
    let theirs = source.lookup(them);
    Relationship {
        you_block: mine.blocks(them),
        blocks_you: theirs.blocks(me),
        is_on_your_list: mine.combined_buddies().contains(them),
        is_on_their_list: theirs.combined_buddies().contains(me),
    }
}

/// Resolve a filtered batch: every requested
/// identity appears in the output, including ones with no relationship
/// data on either side (all-false `Relationship`).
pub fn resolve_filtered(
    me: &IdentityKey,
    candidates: &[IdentityKey],
    source: &dyn RelationshipDataSource,
) -> Vec<(IdentityKey, Relationship)> {
    candidates
        .iter()
        .map(|them| (them.clone(), resolve(me, them, source)))
        .collect()
}
