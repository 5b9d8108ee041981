//! The per-connection namespace registry: which namespaces the server has
//! confirmed, and the session id it assigned to each.

use crate::Error;

/// One confirmed namespace. The default namespace `/` is keyed by `None`,
/// never by the literal string.
#[derive(Debug, Clone)]
struct Entry {
    namespace: Option<String>,
    sid: String,
}

/// Insertion-ordered set of `(namespace, sid)` pairs. The population is a
/// handful of entries at most, so linear search is fine.
#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<Entry>,
}

impl Registry {
    pub fn new() -> Registry {
        Default::default()
    }

    /// Appends a namespace. A namespace can only be registered once;
    /// re-adding one is an error.
    pub fn add(&mut self, namespace: Option<&str>, sid: &str) -> Result<(), Error> {
        if self.contains(namespace) {
            return Err(Error::NamespaceRegistered(display(namespace)));
        }
        self.entries.push(Entry {
            namespace: namespace.map(str::to_string),
            sid: sid.to_string(),
        });
        Ok(())
    }

    pub fn contains(&self, namespace: Option<&str>) -> bool {
        self.find(namespace).is_some()
    }

    /// The server-assigned session id for a namespace, if registered.
    pub fn sid(&self, namespace: Option<&str>) -> Option<&str> {
        self.find(namespace)
            .map(|idx| self.entries[idx].sid.as_str())
    }

    /// Removes the first entry for a namespace.
    pub fn remove(&mut self, namespace: Option<&str>) -> Result<(), Error> {
        match self.find(namespace) {
            Some(idx) => {
                self.entries.remove(idx);
                Ok(())
            }
            None => Err(Error::NamespaceNotRegistered(display(namespace))),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn find(&self, namespace: Option<&str>) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.namespace.as_deref() == namespace)
    }
}

fn display(namespace: Option<&str>) -> String {
    namespace.unwrap_or("/").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_search_delete() {
        let mut registry = Registry::new();
        registry.add(None, "xyz").unwrap();
        registry.add(Some("/chat"), "qrs").unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(None));
        assert!(registry.contains(Some("/chat")));
        assert!(!registry.contains(Some("/other")));
        assert_eq!(registry.sid(None), Some("xyz"));
        assert_eq!(registry.sid(Some("/chat")), Some("qrs"));

        registry.remove(Some("/chat")).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains(Some("/chat")));
    }

    #[test]
    fn default_namespace_is_distinct_from_custom_ones() {
        let mut registry = Registry::new();
        registry.add(None, "a").unwrap();
        assert!(!registry.contains(Some("/a")));
        registry.add(Some("/a"), "b").unwrap();
        assert_eq!(registry.sid(None), Some("a"));
        assert_eq!(registry.sid(Some("/a")), Some("b"));
    }

    #[test]
    fn duplicate_add_is_rejected() {
        let mut registry = Registry::new();
        registry.add(Some("/chat"), "a").unwrap();
        assert!(matches!(
            registry.add(Some("/chat"), "b"),
            Err(Error::NamespaceRegistered(_))
        ));
        assert_eq!(registry.sid(Some("/chat")), Some("a"));
    }

    #[test]
    fn remove_missing_is_not_found() {
        let mut registry = Registry::new();
        assert!(matches!(
            registry.remove(Some("/chat")),
            Err(Error::NamespaceNotRegistered(_))
        ));
    }

    #[test]
    fn clear_releases_all_entries() {
        let mut registry = Registry::new();
        registry.add(None, "a").unwrap();
        registry.add(Some("/chat"), "b").unwrap();
        registry.clear();
        assert!(registry.is_empty());
    }
}
