//! Writer configuration

use crate::error::{Error, Result};
use crate::keystore::{ContentCipher, KeyWrapper, SecureCallbacks};
use crate::progress::ProgressCallback;
use std::fmt;

/// Decimal places written for coordinates and scalars unless configured
pub const DEFAULT_DECIMAL_PRECISION: usize = 6;

/// Largest accepted decimal precision
pub const MAX_DECIMAL_PRECISION: usize = 16;

/// Configuration for writing 3MF packages
///
/// # Example
///
/// ```
/// use lib3mf_engine::writer::WriterConfig;
///
/// let config = WriterConfig::new().with_decimal_precision(9).unwrap();
/// assert_eq!(config.decimal_precision(), 9);
/// assert!(WriterConfig::new().with_decimal_precision(0).is_err());
/// ```
pub struct WriterConfig {
    precision: usize,
    pub(crate) progress: Option<ProgressCallback>,
    pub(crate) secure: SecureCallbacks,
}

impl WriterConfig {
    /// Default precision, no callbacks
    pub fn new() -> Self {
        Self {
            precision: DEFAULT_DECIMAL_PRECISION,
            progress: None,
            secure: SecureCallbacks::new(),
        }
    }

    /// Set the decimal precision, in `1..=16`
    pub fn with_decimal_precision(mut self, precision: usize) -> Result<Self> {
        self.set_decimal_precision(precision)?;
        Ok(self)
    }

    /// Set the decimal precision, in `1..=16`
    pub fn set_decimal_precision(&mut self, precision: usize) -> Result<()> {
        if !(1..=MAX_DECIMAL_PRECISION).contains(&precision) {
            return Err(Error::InvalidModel(format!(
                "decimal precision {} outside 1..={}",
                precision, MAX_DECIMAL_PRECISION
            )));
        }
        self.precision = precision;
        Ok(())
    }

    /// Decimal places written for floating point values
    pub fn decimal_precision(&self) -> usize {
        self.precision
    }

    /// Report progress to `callback`
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Register the key wrapper of a consumer
    pub fn with_key_wrapper(mut self, consumer_id: impl Into<String>, wrapper: Box<dyn KeyWrapper>) -> Self {
        self.secure.add_key_wrapper(consumer_id, wrapper);
        self
    }

    /// Register the content cipher used for protected parts
    pub fn with_content_cipher(mut self, cipher: Box<dyn ContentCipher>) -> Self {
        self.secure.set_content_cipher(cipher);
        self
    }

    /// Bytes handed to the content cipher per call
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.secure.set_chunk_size(size);
        self
    }

    /// Secure content callbacks
    pub fn secure_callbacks(&mut self) -> &mut SecureCallbacks {
        &mut self.secure
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WriterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterConfig")
            .field("precision", &self.precision)
            .field("has_progress", &self.progress.is_some())
            .field("secure", &self.secure)
            .finish()
    }
}
