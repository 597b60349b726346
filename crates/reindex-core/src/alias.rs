//! Atomic alias cutover from the source index to the destination.

use std::collections::BTreeSet;

use tracing::info;

use reindex_store::{AliasActions, AliasBinding, DocumentStore, StoreError};

/// Aliases to move, as read from the store once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasSet {
    /// Bound to the source when the set was read
    pub bound: BTreeSet<String>,
    /// Requested but not bound to the source; only added
    pub added: BTreeSet<String>,
}

impl AliasSet {
    pub fn is_empty(&self) -> bool {
        self.bound.is_empty() && self.added.is_empty()
    }

    /// Every alias in the set, sorted.
    pub fn names(&self) -> Vec<String> {
        self.bound.union(&self.added).cloned().collect()
    }
}

/// Repoints aliases in one request.
pub struct AliasCutover<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> AliasCutover<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    /// Aliases to move: those bound to `source` plus `extra` if given.
    pub async fn working_set(
        &self,
        source: &str,
        extra: Option<&str>,
    ) -> Result<AliasSet, StoreError> {
        let bound = self.store.aliases(source).await?;
        let added = extra
            .filter(|alias| !bound.contains(*alias))
            .map(|alias| BTreeSet::from([alias.to_string()]))
            .unwrap_or_default();
        Ok(AliasSet { bound, added })
    }

    /// Move every alias in `aliases` from `source` to `destination`.
    ///
    /// Returns the aliases moved; an empty set issues no request.
    pub async fn cutover(
        &self,
        aliases: &AliasSet,
        source: &str,
        destination: &str,
    ) -> Result<Vec<String>, StoreError> {
        if aliases.is_empty() {
            return Ok(Vec::new());
        }

        let mut actions = AliasActions::repoint(&aliases.bound, source, destination);
        for alias in &aliases.added {
            actions.add.push(AliasBinding::new(destination, alias.as_str()));
        }

        self.store.swap_aliases(&actions).await?;

        let moved = aliases.names();
        info!(
            source,
            destination,
            aliases = %moved.join(", "),
            "Aliases repointed"
        );
        Ok(moved)
    }
}
