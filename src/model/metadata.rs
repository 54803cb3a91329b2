//! Metadata entries and groups

use crate::error::{Error, Result};

/// Default `type` attribute of a metadata entry
pub const DEFAULT_METADATA_TYPE: &str = "xs:string";

/// A single `<metadata>` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Namespace URI of a qualified name, empty for core names like `Title`
    pub namespace: String,
    /// Local name
    pub name: String,
    /// Text value
    pub value: String,
    /// Value type, `xs:string` unless stated otherwise
    pub value_type: String,
    /// The `preserve` flag
    pub preserve: bool,
}

impl Metadata {
    /// Core metadata entry
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            namespace: String::new(),
            name: name.into(),
            value: value.into(),
            value_type: DEFAULT_METADATA_TYPE.to_string(),
            preserve: false,
        }
    }

    /// Entry whose name lives in a custom namespace
    pub fn namespaced(
        namespace: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::new(name, value)
        }
    }

    /// Set the preserve flag
    pub fn with_preserve(mut self, preserve: bool) -> Self {
        self.preserve = preserve;
        self
    }
}

/// Ordered metadata with unique (namespace, name) keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataGroup {
    entries: Vec<Metadata>,
}

impl MetadataGroup {
    /// Empty group
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry; names must be unique within the group
    pub fn add(&mut self, entry: Metadata) -> Result<()> {
        if self.get_ns(&entry.namespace, &entry.name).is_some() {
            return Err(Error::InvalidModel(format!(
                "Duplicate metadata name '{}'",
                entry.name
            )));
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Look up a core entry by name
    pub fn get(&self, name: &str) -> Option<&Metadata> {
        self.get_ns("", name)
    }

    /// Look up an entry by namespace and name
    pub fn get_ns(&self, namespace: &str, name: &str) -> Option<&Metadata> {
        self.entries
            .iter()
            .find(|m| m.namespace == namespace && m.name == name)
    }

    /// Remove an entry by namespace and name
    pub fn remove(&mut self, namespace: &str, name: &str) -> Option<Metadata> {
        let pos = self
            .entries
            .iter()
            .position(|m| m.namespace == namespace && m.name == name)?;
        Some(self.entries.remove(pos))
    }

    /// Entries in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, Metadata> {
        self.entries.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the group has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a MetadataGroup {
    type Item = &'a Metadata;
    type IntoIter = std::slice::Iter<'a, Metadata>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_names_rejected() {
        let mut group = MetadataGroup::new();
        group.add(Metadata::new("Title", "Cube")).unwrap();
        assert!(group.add(Metadata::new("Title", "Other")).is_err());
        assert_eq!(group.get("Title").unwrap().value, "Cube");
    }

    #[test]
    fn test_same_name_in_other_namespace_allowed() {
        let mut group = MetadataGroup::new();
        group.add(Metadata::new("Title", "Cube")).unwrap();
        group
            .add(Metadata::namespaced("http://example.com/x", "Title", "x"))
            .unwrap();
        assert_eq!(group.len(), 2);
        assert!(group.remove("http://example.com/x", "Title").is_some());
        assert_eq!(group.len(), 1);
    }
}
