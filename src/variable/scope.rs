//! Namespaces and tags variables are exposed under.

use crate::core::config;
use crate::variable::name::to_underscored_name;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A name prefix plus a set of tags.
///
/// Scopes are immutable. Deriving a child scope returns a new one, registered
/// in the global [`ScopeRegistry`] under its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    prefix: String,
    separator: String,
    tags: BTreeMap<String, String>,
    id: String,
}

impl Scope {
    fn new(prefix: String, separator: String, tags: BTreeMap<String, String>) -> Self {
        let id = Self::scope_id(&prefix, &tags);
        Self {
            prefix,
            separator,
            tags,
            id,
        }
    }

    /// The root scope, built from the configuration on first use.
    pub fn root() -> Arc<Scope> {
        ScopeRegistry::global().root()
    }

    /// Start building a scope.
    pub fn builder() -> ScopeBuilder {
        ScopeBuilder::default()
    }

    /// `prefix` plus `+k=v,k=v` for sorted tags.
    pub fn scope_id(prefix: &str, tags: &BTreeMap<String, String>) -> String {
        if tags.is_empty() {
            return prefix.to_string();
        }
        let pairs: Vec<String> = tags.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        format!("{}+{}", prefix, pairs.join(","))
    }

    /// Name of `name` inside this scope.
    pub fn fully_qualified_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}{}{}", self.prefix, self.separator, name)
        }
    }

    /// Child scope whose prefix is `name` qualified by this scope.
    pub fn sub_scope(&self, name: &str) -> Arc<Scope> {
        self.sub_scope_tagged(name, &BTreeMap::new())
    }

    /// Child scope with a longer prefix and extra tags.
    pub fn sub_scope_tagged(&self, name: &str, tags: &BTreeMap<String, String>) -> Arc<Scope> {
        let prefix = self.fully_qualified_name(&to_underscored_name(name));
        ScopeRegistry::global().intern(Scope::new(
            prefix,
            self.separator.clone(),
            self.merged_tags(tags),
        ))
    }

    /// Same prefix with extra tags.
    pub fn tagged(&self, tags: &BTreeMap<String, String>) -> Arc<Scope> {
        ScopeRegistry::global().intern(Scope::new(
            self.prefix.clone(),
            self.separator.clone(),
            self.merged_tags(tags),
        ))
    }

    // Tags already on this scope win over the new ones.
    fn merged_tags(&self, tags: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut merged = tags.clone();
        merged.extend(self.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    /// Prefix prepended to names.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Text between prefix and name.
    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Tags merged into every reported variable.
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Registry key.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{name: {}, tags: {{", self.prefix)?;
        for (i, (k, v)) in self.tags.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{{{}: {}}}", k, v)?;
        }
        write!(f, "}}, id: {}}}", self.id)
    }
}

/// Builder for [`Scope`]; the prefix is normalized like a variable name.
#[derive(Debug, Default, Clone)]
pub struct ScopeBuilder {
    prefix: String,
    separator: Option<String>,
    tags: BTreeMap<String, String>,
}

impl ScopeBuilder {
    /// Set the name prefix, normalized like variable names.
    pub fn prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.prefix = to_underscored_name(prefix.as_ref());
        self
    }

    /// Text between prefix and name.
    pub fn separator<S: Into<String>>(mut self, separator: S) -> Self {
        self.separator = Some(separator.into());
        self
    }

    /// Add one tag.
    pub fn tag<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Add several tags.
    pub fn tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.tags.extend(tags);
        self
    }

    /// Build and register the scope. An existing scope with the same id is
    /// returned instead.
    pub fn build(self) -> Arc<Scope> {
        ScopeRegistry::global().intern(self.build_detached())
    }

    fn build_detached(self) -> Scope {
        let separator = self
            .separator
            .unwrap_or_else(|| config::current().variable.scope_separator.clone());
        Scope::new(self.prefix, separator, self.tags)
    }
}

/// Process-wide table of scopes keyed by id.
pub struct ScopeRegistry {
    scopes: RwLock<FxHashMap<String, Arc<Scope>>>,
    root: Lazy<Arc<Scope>>,
}

static SCOPES: Lazy<ScopeRegistry> = Lazy::new(|| ScopeRegistry {
    scopes: RwLock::new(FxHashMap::default()),
    root: Lazy::new(|| {
        let cfg = config::current();
        let root = ScopeBuilder::default()
            .prefix(&cfg.variable.root_scope_name)
            .separator(cfg.variable.scope_separator.clone())
            .build_detached();
        tracing::debug!(scope = %root, "root scope created");
        Arc::new(root)
    }),
});

impl ScopeRegistry {
    /// The process-wide registry.
    pub fn global() -> &'static ScopeRegistry {
        &SCOPES
    }

    /// The root scope. Its prefix and separator are read from the
    /// configuration once, on first use.
    pub fn root(&self) -> Arc<Scope> {
        Arc::clone(&self.root)
    }

    fn intern(&self, scope: Scope) -> Arc<Scope> {
        if let Some(existing) = self.scopes.read().get(&scope.id) {
            return Arc::clone(existing);
        }
        let mut scopes = self.scopes.write();
        let entry = scopes
            .entry(scope.id.clone())
            .or_insert_with(|| Arc::new(scope));
        Arc::clone(entry)
    }

    /// Ids of every registered scope, sorted.
    pub fn list_scopes(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.scopes.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Scope registered as `id`.
    pub fn get_scope(&self, id: &str) -> Option<Arc<Scope>> {
        self.scopes.read().get(id).map(Arc::clone)
    }

    /// Whether `id` is registered.
    pub fn has_scope(&self, id: &str) -> bool {
        self.scopes.read().contains_key(id)
    }

    /// Registered scopes, not counting the root.
    pub fn scope_count(&self) -> usize {
        self.scopes.read().len()
    }
}
