//! Reader configuration

use crate::keystore::{ContentCipher, KeyWrapper, SecureCallbacks};
use crate::model::CustomNamespace;
use crate::namespaces::Extension;
use crate::progress::ProgressCallback;
use std::collections::HashSet;
use std::fmt;

/// Configuration for reading 3MF packages
///
/// Declares which extensions the host accepts, which custom namespaces
/// must be preserved, whether warnings are fatal, and which callbacks
/// drive progress reporting and secure content.
///
/// # Example
///
/// ```
/// use lib3mf_engine::namespaces::Extension;
/// use lib3mf_engine::parser::ParserConfig;
///
/// let config = ParserConfig::core_only()
///     .with_extension(Extension::Material)
///     .with_custom_namespace("ex", "http://example.com/ext")
///     .with_strict_mode(true);
/// assert!(config.supports(Extension::Material));
/// assert!(!config.supports(Extension::Slice));
/// ```
pub struct ParserConfig {
    /// Core is always implicitly supported
    supported_extensions: HashSet<Extension>,
    custom_namespaces: Vec<CustomNamespace>,
    strict: bool,
    pub(crate) progress: Option<ProgressCallback>,
    pub(crate) secure: SecureCallbacks,
}

impl ParserConfig {
    /// Configuration accepting every extension this engine implements
    pub fn new() -> Self {
        Self {
            supported_extensions: Extension::all().iter().copied().collect(),
            custom_namespaces: Vec::new(),
            strict: false,
            progress: None,
            secure: SecureCallbacks::new(),
        }
    }

    /// Configuration accepting only the core specification
    pub fn core_only() -> Self {
        let mut supported = HashSet::new();
        supported.insert(Extension::Core);
        Self {
            supported_extensions: supported,
            ..Self::new()
        }
    }

    /// Accept an extension
    pub fn with_extension(mut self, extension: Extension) -> Self {
        self.supported_extensions.insert(extension);
        self
    }

    /// Reject an extension; elements in its namespace are skipped with a warning
    pub fn without_extension(mut self, extension: Extension) -> Self {
        if extension != Extension::Core {
            self.supported_extensions.remove(&extension);
        }
        self
    }

    /// Preserve elements and attributes of a custom namespace
    pub fn with_custom_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.add_custom_namespace(prefix, uri);
        self
    }

    /// Preserve elements and attributes of a custom namespace
    pub fn add_custom_namespace(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        let uri = uri.into();
        if !self.custom_namespaces.iter().any(|n| n.uri == uri) {
            self.custom_namespaces.push(CustomNamespace {
                prefix: prefix.into(),
                uri,
            });
        }
    }

    /// Promote every warning to an error
    pub fn with_strict_mode(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Toggle strict mode
    pub fn set_strict_mode(&mut self, strict: bool) {
        self.strict = strict;
    }

    /// Register the progress callback
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Register the key wrapper used for `consumer_id`
    pub fn with_key_wrapper(mut self, consumer_id: impl Into<String>, wrapper: Box<dyn KeyWrapper>) -> Self {
        self.secure.add_key_wrapper(consumer_id, wrapper);
        self
    }

    /// Register the content cipher
    pub fn with_content_cipher(mut self, cipher: Box<dyn ContentCipher>) -> Self {
        self.secure.set_content_cipher(cipher);
        self
    }

    /// Whether an extension is accepted
    pub fn supports(&self, extension: Extension) -> bool {
        extension == Extension::Core || self.supported_extensions.contains(&extension)
    }

    /// Registered custom namespace for a URI
    pub fn custom_namespace(&self, uri: &str) -> Option<&CustomNamespace> {
        self.custom_namespaces.iter().find(|n| n.uri == uri)
    }

    /// All registered custom namespaces
    pub fn custom_namespaces(&self) -> &[CustomNamespace] {
        &self.custom_namespaces
    }

    /// Whether warnings are fatal
    pub fn strict(&self) -> bool {
        self.strict
    }

    /// Secure content callbacks
    pub fn secure_callbacks(&mut self) -> &mut SecureCallbacks {
        &mut self.secure
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ParserConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut extensions: Vec<&Extension> = self.supported_extensions.iter().collect();
        extensions.sort();
        f.debug_struct("ParserConfig")
            .field("supported_extensions", &extensions)
            .field("custom_namespaces", &self.custom_namespaces)
            .field("strict", &self.strict)
            .field("has_progress", &self.progress.is_some())
            .field("secure", &self.secure)
            .finish()
    }
}
