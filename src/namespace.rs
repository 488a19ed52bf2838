//! Namespace resolution and the namespace registry.
//!
//! Every entity key is fully qualified as `namespace:name`. Entities in the
//! default namespace have an empty namespace part, so their key starts with
//! the delimiter (`:name`).

use ahash::AHashSet as HashSet;
use log::debug;
use parking_lot::RwLock;

use crate::config::DatastoreConfig;
use crate::errors::{DatastoreError, Result};

/// Separator between the namespace and the bare name.
pub const DELIMITER: char = ':';
/// The default namespace.
pub const DEFAULT_NAMESPACE: &str = "";

/// Output of [`NamespaceResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedName {
    pub namespace: String,
    /// Empty when the input named a namespace only (`ns:`).
    pub name: String,
    /// `namespace:name`, or `namespace:` for a namespace-only input.
    pub fullname: String,
}

impl ResolvedName {
    pub fn is_namespace_only(&self) -> bool {
        self.name.is_empty()
    }
}

/// What a listing or lookup request addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTarget {
    /// Every entity of the given namespace (`ns:`, or `:` for the default one).
    Namespace(String),
    /// A single entity by fully-qualified name.
    Entity(String),
}

/// Builds `namespace:name`.
pub fn create_fullname(namespace: &str, name: &str) -> String {
    let mut fullname = String::with_capacity(namespace.len() + 1 + name.len());
    fullname.push_str(namespace);
    fullname.push(DELIMITER);
    fullname.push_str(name);
    fullname
}

/// Splits a fully-qualified name at its first delimiter.
///
/// # Errors
///
/// Returns `InvalidArgs` if `fullname` carries no delimiter.
pub fn split_fullname(fullname: &str) -> Result<(&str, &str)> {
    fullname
        .split_once(DELIMITER)
        .ok_or_else(|| DatastoreError::InvalidArgs(format!("not a full name: {}", fullname)))
}

/// Rewrites the namespace part of `fullname` to `namespace`.
pub fn replace_namespace(fullname: &str, namespace: &str) -> Result<String> {
    let (_, name) = split_fullname(fullname)?;
    Ok(create_fullname(namespace, name))
}

/// Returns true if `fullname` lives in `namespace`.
pub fn in_namespace(fullname: &str, namespace: &str) -> bool {
    fullname
        .strip_prefix(namespace)
        .is_some_and(|rest| rest.starts_with(DELIMITER))
}

struct Registry {
    current: String,
    namespaces: HashSet<String>,
}

/// Turns possibly-relative names into fully-qualified keys and keeps the set
/// of known namespaces together with the caller's current namespace.
pub struct NamespaceResolver {
    max_namespace_len: usize,
    max_name_len: usize,
    registry: RwLock<Registry>,
}

impl NamespaceResolver {
    pub fn new(config: &DatastoreConfig) -> Self {
        Self {
            max_namespace_len: config.max_namespace_len,
            max_name_len: config.max_name_len,
            registry: RwLock::new(Registry {
                current: DEFAULT_NAMESPACE.to_string(),
                namespaces: HashSet::new(),
            }),
        }
    }

    /// The caller's current namespace (empty for the default namespace).
    pub fn current(&self) -> String {
        self.registry.read().current.clone()
    }

    /// Returns true for the default namespace and every registered one.
    pub fn exists(&self, namespace: &str) -> bool {
        namespace == DEFAULT_NAMESPACE || self.registry.read().namespaces.contains(namespace)
    }

    /// Registered namespaces, sorted. The default namespace is not listed.
    pub fn namespaces(&self) -> Vec<String> {
        let mut list: Vec<String> = self.registry.read().namespaces.iter().cloned().collect();
        list.sort();
        list
    }

    /// Registers a new namespace.
    ///
    /// # Errors
    ///
    /// * `InvalidArgs` for the default namespace or a name containing the delimiter.
    /// * `TooLong` if the namespace exceeds the configured bound.
    /// * `AlreadyExists` if it is already registered.
    pub fn add(&self, namespace: &str) -> Result<()> {
        self.check_namespace(namespace)?;
        if namespace == DEFAULT_NAMESPACE {
            return Err(DatastoreError::InvalidArgs(
                "the default namespace can't be added".to_string(),
            ));
        }
        let mut registry = self.registry.write();
        if !registry.namespaces.insert(namespace.to_string()) {
            return Err(DatastoreError::AlreadyExists(format!(
                "namespace = {}",
                namespace
            )));
        }
        debug!("namespace added: {}", namespace);
        Ok(())
    }

    /// Unregisters a namespace. If it was current, the default namespace
    /// becomes current.
    pub fn remove(&self, namespace: &str) -> Result<()> {
        let mut registry = self.registry.write();
        if !registry.namespaces.remove(namespace) {
            return Err(DatastoreError::NotFound(format!("namespace = {}", namespace)));
        }
        if registry.current == namespace {
            registry.current = DEFAULT_NAMESPACE.to_string();
        }
        debug!("namespace removed: {}", namespace);
        Ok(())
    }

    pub fn set_current(&self, namespace: &str) -> Result<()> {
        let mut registry = self.registry.write();
        if namespace != DEFAULT_NAMESPACE && !registry.namespaces.contains(namespace) {
            return Err(DatastoreError::NotFound(format!("namespace = {}", namespace)));
        }
        registry.current = namespace.to_string();
        Ok(())
    }

    pub fn unset_current(&self) {
        self.registry.write().current = DEFAULT_NAMESPACE.to_string();
    }

    /// Resolves `input` against the current namespace.
    ///
    /// Accepted shapes:
    ///
    /// * `name` - a bare name in the current namespace.
    /// * `ns:` - namespace only (`:` alone is the default namespace).
    /// * `ns:name` or `:name` - fully qualified.
    ///
    /// # Errors
    ///
    /// * `InvalidArgs` for an empty input.
    /// * `InvalidNamespace` if an explicit namespace differs from a
    ///   non-default current namespace.
    /// * `TooLong` if either part exceeds its bound.
    pub fn resolve(&self, input: &str) -> Result<ResolvedName> {
        if input.is_empty() {
            return Err(DatastoreError::InvalidArgs("name is empty".to_string()));
        }
        let current = self.current();
        let (namespace, name) = match input.split_once(DELIMITER) {
            Some((ns, name)) => {
                if ns != current && current != DEFAULT_NAMESPACE {
                    return Err(DatastoreError::InvalidNamespace(format!(
                        "namespace = {}, current = {}",
                        ns, current
                    )));
                }
                (ns.to_string(), name.to_string())
            }
            None => (current, input.to_string()),
        };
        self.check_namespace(&namespace)?;
        self.check_name(&name)?;
        let fullname = create_fullname(&namespace, &name);
        Ok(ResolvedName {
            namespace,
            name,
            fullname,
        })
    }

    /// Bounds and delimiter checks on an already qualified name, without
    /// applying the current namespace.
    pub fn check_fullname(&self, fullname: &str) -> Result<()> {
        let (namespace, name) = split_fullname(fullname)?;
        self.check_namespace(namespace)?;
        self.check_name(name)
    }

    /// Resolves `input` and requires it to name a single entity.
    pub fn get_fullname(&self, input: &str) -> Result<String> {
        let resolved = self.resolve(input)?;
        if resolved.is_namespace_only() {
            return Err(DatastoreError::InvalidArgs(format!(
                "name is missing: {}",
                input
            )));
        }
        Ok(resolved.fullname)
    }

    /// Classifies a listing/lookup request. `None` lists the current namespace.
    pub fn search_target(&self, input: Option<&str>) -> Result<SearchTarget> {
        match input {
            None => Ok(SearchTarget::Namespace(self.current())),
            Some(input) => {
                let resolved = self.resolve(input)?;
                if resolved.is_namespace_only() {
                    Ok(SearchTarget::Namespace(resolved.namespace))
                } else {
                    Ok(SearchTarget::Entity(resolved.fullname))
                }
            }
        }
    }

    fn check_namespace(&self, namespace: &str) -> Result<()> {
        if namespace.contains(DELIMITER) {
            return Err(DatastoreError::InvalidArgs(format!(
                "namespace = {}",
                namespace
            )));
        }
        if namespace.len() > self.max_namespace_len {
            return Err(DatastoreError::TooLong(format!("namespace = {}", namespace)));
        }
        Ok(())
    }

    fn check_name(&self, name: &str) -> Result<()> {
        if name.contains(DELIMITER) {
            return Err(DatastoreError::InvalidArgs(format!("name = {}", name)));
        }
        if name.len() > self.max_name_len {
            return Err(DatastoreError::TooLong(format!("name = {}", name)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn resolver() -> NamespaceResolver {
        NamespaceResolver::new(&DatastoreConfig::default())
    }

    #[test]
    fn test_bare_name_uses_current_namespace() {
        let r = resolver();
        assert_eq!(r.get_fullname("c1").unwrap(), ":c1");
        r.add("ns1").unwrap();
        r.set_current("ns1").unwrap();
        assert_eq!(r.get_fullname("c1").unwrap(), "ns1:c1");
    }

    #[test]
    fn test_explicit_forms() {
        let r = resolver();
        r.add("ns1").unwrap();
        let resolved = r.resolve("ns1:c1").unwrap();
        assert_eq!(resolved.namespace, "ns1");
        assert_eq!(resolved.name, "c1");
        assert_eq!(resolved.fullname, "ns1:c1");
        assert_eq!(r.get_fullname(":c1").unwrap(), ":c1");
        assert_eq!(
            r.search_target(Some("ns1:")).unwrap(),
            SearchTarget::Namespace("ns1".into())
        );
        assert_eq!(
            r.search_target(Some(":")).unwrap(),
            SearchTarget::Namespace(String::new())
        );
        assert_eq!(
            r.search_target(Some("c1")).unwrap(),
            SearchTarget::Entity(":c1".into())
        );
    }

    #[test]
    fn test_foreign_namespace_rejected() {
        let r = resolver();
        r.add("ns1").unwrap();
        r.add("ns2").unwrap();
        r.set_current("ns1").unwrap();
        let err = r.get_fullname("ns2:c1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidNamespace);
    }

    #[test]
    fn test_too_long() {
        let config = DatastoreConfig::default().max_name_len(4);
        let r = NamespaceResolver::new(&config);
        assert!(r.get_fullname("abcd").is_ok());
        assert_eq!(r.get_fullname("abcde").unwrap_err().kind(), ErrorKind::TooLong);
    }

    #[test]
    fn test_name_with_second_delimiter_rejected() {
        let r = resolver();
        r.add("a").unwrap();
        assert_eq!(r.resolve("a:b:c").unwrap_err().kind(), ErrorKind::InvalidArgs);
        assert_eq!(r.get_fullname(":b:c").unwrap_err().kind(), ErrorKind::InvalidArgs);
        assert_eq!(r.get_fullname("a:b").unwrap(), "a:b");
    }

    #[test]
    fn test_check_fullname_bounds() {
        let config = DatastoreConfig::default().max_name_len(4);
        let r = NamespaceResolver::new(&config);
        r.add("ns1").unwrap();
        r.set_current("ns1").unwrap();
        // Qualified names are checked as given, not against the current namespace.
        assert!(r.check_fullname(":abcd").is_ok());
        assert_eq!(r.check_fullname(":abcde").unwrap_err().kind(), ErrorKind::TooLong);
        assert_eq!(r.check_fullname("ns1:a:b").unwrap_err().kind(), ErrorKind::InvalidArgs);
        assert_eq!(r.check_fullname("abcd").unwrap_err().kind(), ErrorKind::InvalidArgs);
    }

    #[test]
    fn test_replace_namespace() {
        assert_eq!(replace_namespace(":ch1", "ns2").unwrap(), "ns2:ch1");
        assert_eq!(replace_namespace("ns1:ch1", "").unwrap(), ":ch1");
        assert!(replace_namespace("ch1", "ns2").is_err());
        assert!(in_namespace("ns1:a", "ns1"));
        assert!(!in_namespace("ns10:a", "ns1"));
        assert!(in_namespace(":a", ""));
    }

    #[test]
    fn test_registry() {
        let r = resolver();
        r.add("ns1").unwrap();
        assert_eq!(r.add("ns1").unwrap_err().kind(), ErrorKind::AlreadyExists);
        r.set_current("ns1").unwrap();
        r.remove("ns1").unwrap();
        assert_eq!(r.current(), "");
        assert_eq!(r.set_current("nope").unwrap_err().kind(), ErrorKind::NotFound);
    }
}
