use std::collections::HashSet;

use super::identity::Identity;

/// The set of peer identities an endpoint is willing to accept.
///
/// An empty set accepts nobody. That is a valid, maximally restrictive
/// configuration and not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustSet(HashSet<Identity>);

impl TrustSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// A set holding exactly one identity, e.g. the single pinned server
    pub fn only(identity: Identity) -> Self {
        Self(HashSet::from([identity]))
    }

    pub fn insert(&mut self, identity: Identity) -> bool {
        self.0.insert(identity)
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.0.contains(identity)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Identities in a stable (sorted) order
    pub fn sorted(&self) -> Vec<Identity> {
        let mut identities: Vec<_> = self.0.iter().copied().collect();
        identities.sort();
        identities
    }
}

impl FromIterator<Identity> for TrustSet {
    fn from_iter<T: IntoIterator<Item = Identity>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<Identity> for TrustSet {
    fn extend<T: IntoIterator<Item = Identity>>(&mut self, iter: T) {
        self.0.extend(iter)
    }
}
