//! Foreign (custom-namespace) attributes and elements kept for round-trip

/// An attribute in a namespace the engine does not interpret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnyAttribute {
    /// Namespace URI
    pub namespace: String,
    /// Local name
    pub name: String,
    /// Attribute value
    pub value: String,
}

impl AnyAttribute {
    /// Create a foreign attribute
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An element subtree in a preserved custom namespace
///
/// Attributes without a prefix carry an empty namespace.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ForeignElement {
    /// Namespace URI
    pub namespace: String,
    /// Local name
    pub name: String,
    /// Attributes in document order
    pub attributes: Vec<AnyAttribute>,
    /// Child elements in document order
    pub children: Vec<ForeignElement>,
    /// Concatenated character data
    pub text: String,
}

impl ForeignElement {
    /// Empty element
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Visit this element and all descendants
    pub(crate) fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a ForeignElement)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }
}

/// A custom namespace registered by the host, with the prefix used on write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomNamespace {
    /// Prefix
    pub prefix: String,
    /// Namespace URI
    pub uri: String,
}
