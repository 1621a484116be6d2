//! Scoped variable store
//!
//! Four scopes in ascending precedence: Global < Collection < Environment <
//! Local. The store is assembled once per execution as an immutable snapshot
//! of the persistent scopes; script writes land in the snapshot and are
//! discarded when the execution ends unless the caller persists them.

use std::collections::HashMap;

use crate::model::{GlobalVariable, Variable};

/// Replacement value for secret variables in listings and echoes
pub const SECRET_MASK: &str = "***";

/// Variable scope, ordered by ascending precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableScope {
    Global,
    Collection,
    Environment,
    Local,
}

impl VariableScope {
    /// All scopes from lowest to highest precedence
    pub const ASCENDING: [VariableScope; 4] = [
        VariableScope::Global,
        VariableScope::Collection,
        VariableScope::Environment,
        VariableScope::Local,
    ];
}

/// One stored value with its flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableEntry {
    pub value: String,
    pub is_secret: bool,
    pub is_enabled: bool,
}

impl VariableEntry {
    pub fn enabled(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            is_secret: false,
            is_enabled: true,
        }
    }
}

/// A resolved value plus its effective secret flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVariable<'a> {
    pub value: &'a str,
    pub is_secret: bool,
}

/// Per-execution snapshot of all four scopes
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    global: HashMap<String, VariableEntry>,
    collection: HashMap<String, VariableEntry>,
    environment: HashMap<String, VariableEntry>,
    local: HashMap<String, VariableEntry>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from the persistent scopes
    pub fn assemble(
        globals: &[GlobalVariable],
        collection_vars: &[Variable],
        environment_vars: &[Variable],
    ) -> Self {
        let mut store = Self::new();
        for g in globals {
            store.global.insert(
                g.key.clone(),
                VariableEntry {
                    value: g.value.clone(),
                    is_secret: g.is_secret,
                    is_enabled: g.is_enabled,
                },
            );
        }
        for v in collection_vars {
            store.collection.insert(
                v.key.clone(),
                VariableEntry {
                    value: v.value.clone(),
                    is_secret: v.is_secret,
                    is_enabled: v.is_enabled,
                },
            );
        }
        for v in environment_vars {
            store.environment.insert(
                v.key.clone(),
                VariableEntry {
                    value: v.value.clone(),
                    is_secret: v.is_secret,
                    is_enabled: v.is_enabled,
                },
            );
        }
        store
    }

    fn scope_map(&self, scope: VariableScope) -> &HashMap<String, VariableEntry> {
        match scope {
            VariableScope::Global => &self.global,
            VariableScope::Collection => &self.collection,
            VariableScope::Environment => &self.environment,
            VariableScope::Local => &self.local,
        }
    }

    fn scope_map_mut(&mut self, scope: VariableScope) -> &mut HashMap<String, VariableEntry> {
        match scope {
            VariableScope::Global => &mut self.global,
            VariableScope::Collection => &mut self.collection,
            VariableScope::Environment => &mut self.environment,
            VariableScope::Local => &mut self.local,
        }
    }

    /// Read an entry from one specific scope
    pub fn get(&self, scope: VariableScope, name: &str) -> Option<&VariableEntry> {
        self.scope_map(scope).get(name)
    }

    /// Write into the Local scope (the per-execution working map)
    pub fn set_local(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.local.insert(name.into(), VariableEntry::enabled(value));
    }

    /// Write into a specific scope, keeping an existing entry's secret flag
    pub fn set_scoped(
        &mut self,
        scope: VariableScope,
        name: impl Into<String>,
        value: impl Into<String>,
    ) {
        let name = name.into();
        let map = self.scope_map_mut(scope);
        let is_secret = map.get(&name).map(|e| e.is_secret).unwrap_or(false);
        map.insert(
            name,
            VariableEntry {
                value: value.into(),
                is_secret,
                is_enabled: true,
            },
        );
    }

    /// Remove an entry from a specific scope
    pub fn unset(&mut self, scope: VariableScope, name: &str) {
        self.scope_map_mut(scope).remove(name);
    }

    /// Highest-precedence enabled value for the name
    ///
    /// The secret flag is the OR of every enabled entry matching the name
    /// across scopes, so a secret shadowed by a non-secret override still
    /// masks on output.
    pub fn resolve(&self, name: &str) -> Option<ResolvedVariable<'_>> {
        let mut winner: Option<&VariableEntry> = None;
        let mut is_secret = false;
        for scope in VariableScope::ASCENDING {
            if let Some(entry) = self.scope_map(scope).get(name) {
                if entry.is_enabled {
                    is_secret |= entry.is_secret;
                    winner = Some(entry);
                }
            }
        }
        winner.map(|entry| ResolvedVariable {
            value: &entry.value,
            is_secret,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_ascending() {
        let mut store = VariableStore::new();
        store.set_scoped(VariableScope::Global, "host", "global");
        assert_eq!(store.resolve("host").unwrap().value, "global");

        store.set_scoped(VariableScope::Collection, "host", "collection");
        assert_eq!(store.resolve("host").unwrap().value, "collection");

        store.set_scoped(VariableScope::Environment, "host", "environment");
        assert_eq!(store.resolve("host").unwrap().value, "environment");

        store.set_local("host", "local");
        assert_eq!(store.resolve("host").unwrap().value, "local");
    }

    #[test]
    fn test_disabled_entries_are_skipped() {
        let mut store = VariableStore::new();
        store.set_scoped(VariableScope::Global, "token", "fallback");
        store
            .scope_map_mut(VariableScope::Environment)
            .insert(
                "token".to_string(),
                VariableEntry {
                    value: "disabled".to_string(),
                    is_secret: false,
                    is_enabled: false,
                },
            );

        assert_eq!(store.resolve("token").unwrap().value, "fallback");
    }

    #[test]
    fn test_secret_flag_is_or_across_scopes() {
        let mut store = VariableStore::new();
        store.scope_map_mut(VariableScope::Environment).insert(
            "token".to_string(),
            VariableEntry {
                value: "xyz".to_string(),
                is_secret: true,
                is_enabled: true,
            },
        );
        // A non-secret local override still resolves as secret
        store.set_local("token", "override");

        let resolved = store.resolve("token").unwrap();
        assert_eq!(resolved.value, "override");
        assert!(resolved.is_secret);
    }

    #[test]
    fn test_unknown_name_resolves_none() {
        let store = VariableStore::new();
        assert!(store.resolve("missing").is_none());
    }

    #[test]
    fn test_set_scoped_preserves_secret_flag() {
        let mut store = VariableStore::new();
        store.scope_map_mut(VariableScope::Environment).insert(
            "apiKey".to_string(),
            VariableEntry {
                value: "old".to_string(),
                is_secret: true,
                is_enabled: true,
            },
        );

        store.set_scoped(VariableScope::Environment, "apiKey", "new");
        let entry = store.get(VariableScope::Environment, "apiKey").unwrap();
        assert_eq!(entry.value, "new");
        assert!(entry.is_secret);
    }

    #[test]
    fn test_local_writes_never_touch_other_scopes() {
        let mut store = VariableStore::new();
        store.set_scoped(VariableScope::Environment, "id", "env");
        store.set_local("id", "local");

        assert_eq!(
            store.get(VariableScope::Environment, "id").unwrap().value,
            "env"
        );
        assert_eq!(store.get(VariableScope::Local, "id").unwrap().value, "local");
    }

    #[test]
    fn test_unset_is_scope_local() {
        let mut store = VariableStore::new();
        store.set_scoped(VariableScope::Global, "k", "g");
        store.set_local("k", "l");

        store.unset(VariableScope::Local, "k");
        assert_eq!(store.resolve("k").unwrap().value, "g");
    }
}
