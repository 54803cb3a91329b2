//! Error types for 3MF reading and writing
//!
//! Every failure carries a stable numeric code. The code is part of the
//! Display output (`[E3004] ...`) and is also available through
//! [`Error::code`], which is what hosts should match on.
//!
//! # Error Codes
//!
//! Codes follow the pattern `E<category><number>`:
//! - **E1xxx**: container and I/O errors
//! - **E2xxx**: XML structure errors
//! - **E3xxx**: model invariant violations
//! - **E4xxx**: unsupported features and extensions
//! - **E5xxx**: secure content and callback failures
//! - **E6xxx**: host interaction (cancellation, format queries)

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for 3MF operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading, writing or mutating a 3MF model
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error on the underlying file or stream
    ///
    /// **Error Code**: E1001
    #[error("[E1001] I/O error: {0}")]
    Io(#[from] io::Error),

    /// ZIP archive error that is not a structural corruption
    ///
    /// **Error Code**: E1002
    #[error("[E1002] ZIP error: {0}")]
    Zip(zip::result::ZipError),

    /// A required part is missing from the package
    ///
    /// **Error Code**: E1003
    ///
    /// **Common Causes**:
    /// - `[Content_Types].xml` or `_rels/.rels` absent
    /// - A relationship targets a part that does not exist
    #[error("[E1003] Missing part: {0}")]
    MissingPart(String),

    /// The ZIP central directory or ZIP64 records are inconsistent
    ///
    /// **Error Code**: E1004
    #[error("[E1004] Corrupt container: {0}")]
    ContainerCorrupt(String),

    /// No relationship in `_rels/.rels` identifies the root model part
    ///
    /// **Error Code**: E1005
    #[error("[E1005] Missing root model: {0}")]
    MissingRootModel(String),

    /// Two parts share a name, or a part was written twice in one save
    ///
    /// **Error Code**: E1006
    #[error("[E1006] Duplicate part: {0}")]
    DuplicatePart(String),

    /// OPC-level format violation (content types, relationships, part names)
    ///
    /// **Error Code**: E1007
    #[error("[E1007] Invalid package: {0}")]
    InvalidPackage(String),

    /// Low-level XML syntax error
    ///
    /// **Error Code**: E2001
    #[error("[E2001] XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Malformed XML attribute
    ///
    /// **Error Code**: E2002
    #[error("[E2002] XML attribute error: {0}")]
    XmlAttr(String),

    /// Well-formed XML that does not match the expected element structure
    ///
    /// **Error Code**: E2003
    ///
    /// **Common Causes**:
    /// - Missing required attribute
    /// - Missing `<model>` root element
    /// - DOCTYPE declaration present
    #[error("[E2003] Invalid XML structure: {0}")]
    InvalidXml(String),

    /// Failure while producing XML output
    ///
    /// **Error Code**: E2004
    #[error("[E2004] XML writing error: {0}")]
    XmlWrite(String),

    /// Numeric attribute could not be parsed or is out of range
    ///
    /// **Error Code**: E2005
    #[error("[E2005] Parse error: {0}")]
    ParseError(String),

    /// Generic model invariant violation
    ///
    /// **Error Code**: E3001
    #[error("[E3001] Invalid model: {0}")]
    InvalidModel(String),

    /// A resource id is already in use within its package part
    ///
    /// **Error Code**: E3002
    #[error("[E3002] Duplicate resource id: {0}")]
    DuplicateResourceId(String),

    /// Lookup of a resource that does not exist
    ///
    /// **Error Code**: E3003
    #[error("[E3003] Resource not found: {0}")]
    ResourceNotFound(String),

    /// A resource cannot be removed because something still references it
    ///
    /// **Error Code**: E3004
    #[error("[E3004] Resource in use: {0}")]
    ResourceInUse(String),

    /// A reference does not resolve to any resource
    ///
    /// **Error Code**: E3005
    #[error("[E3005] Dangling reference: {0}")]
    DanglingReference(String),

    /// A components object contains itself directly or transitively
    ///
    /// **Error Code**: E3006
    #[error("[E3006] Cyclic component reference: {0}")]
    CyclicReference(String),

    /// Two build items (or other UUID-bearing entries) share a UUID
    ///
    /// **Error Code**: E3007
    #[error("[E3007] Duplicate UUID: {0}")]
    DuplicateUuid(String),

    /// A slice was inserted out of Z order
    ///
    /// **Error Code**: E3008
    #[error("[E3008] Slice order violation: {0}")]
    SliceOrder(String),

    /// A multi-property layer violates the layer composition rules
    ///
    /// **Error Code**: E3009
    #[error("[E3009] Invalid property layer: {0}")]
    InvalidPropertyLayer(String),

    /// A property id is not present in its group
    ///
    /// **Error Code**: E3010
    #[error("[E3010] Property not found: {0}")]
    PropertyNotFound(String),

    /// Mesh or slice index out of range
    ///
    /// **Error Code**: E3011
    #[error("[E3011] Index out of range: {0}")]
    IndexOutOfRange(String),

    /// Unsupported feature
    ///
    /// **Error Code**: E4001
    #[error("[E4001] Unsupported feature: {0}")]
    Unsupported(String),

    /// The model requires an extension this reader does not support
    ///
    /// **Error Code**: E4002
    #[error("[E4002] Required extension not supported: {0}")]
    UnsupportedExtension(String),

    /// Keystore content is malformed or inconsistent
    ///
    /// **Error Code**: E5001
    #[error("[E5001] Invalid secure content: {0}")]
    InvalidSecureContent(String),

    /// The keystore has resource data but no encryption callback is registered
    ///
    /// **Error Code**: E5002
    #[error("[E5002] Encryption callback missing: {0}")]
    EncryptionCallbackMissing(String),

    /// An encrypted part was found but no usable decryption callback is registered
    ///
    /// **Error Code**: E5003
    #[error("[E5003] Decryption callback missing: {0}")]
    DecryptionCallbackMissing(String),

    /// The key-wrapping callback reported failure
    ///
    /// **Error Code**: E5004
    #[error("[E5004] Key wrap failed: {0}")]
    KeyWrapFailed(String),

    /// The key-unwrapping callback reported failure
    ///
    /// **Error Code**: E5005
    #[error("[E5005] Key unwrap failed: {0}")]
    KeyUnwrapFailed(String),

    /// The content cipher reported failure while encrypting
    ///
    /// **Error Code**: E5006
    #[error("[E5006] Encryption failed: {0}")]
    EncryptionFailed(String),

    /// The content cipher reported failure while decrypting
    ///
    /// **Error Code**: E5007
    #[error("[E5007] Decryption failed: {0}")]
    DecryptionFailed(String),

    /// The authentication tag did not verify
    ///
    /// **Error Code**: E5008
    #[error("[E5008] Tag verification failed: {0}")]
    TagVerificationFailed(String),

    /// A callback reported more output than the buffer it was given
    ///
    /// **Error Code**: E5009
    #[error("[E5009] Callback size mismatch: {0}")]
    CallbackSizeMismatch(String),

    /// The progress callback requested cancellation
    ///
    /// **Error Code**: E6001
    #[error("[E6001] Calculation aborted")]
    CalculationAborted,

    /// `query_reader`/`query_writer` received an unknown format name
    ///
    /// **Error Code**: E6002
    #[error("[E6002] Unknown format: {0}")]
    UnknownFormat(String),

    /// A warning promoted to an error because strict mode is active
    ///
    /// **Error Code**: the code of the promoted warning
    #[error("[E{}] Strict mode: {}", .0.code, .0.message)]
    Strict(Warning),
}

impl Error {
    /// Stable numeric error code
    pub fn code(&self) -> u32 {
        match self {
            Error::Io(_) => 1001,
            Error::Zip(_) => 1002,
            Error::MissingPart(_) => 1003,
            Error::ContainerCorrupt(_) => 1004,
            Error::MissingRootModel(_) => 1005,
            Error::DuplicatePart(_) => 1006,
            Error::InvalidPackage(_) => 1007,
            Error::Xml(_) => 2001,
            Error::XmlAttr(_) => 2002,
            Error::InvalidXml(_) => 2003,
            Error::XmlWrite(_) => 2004,
            Error::ParseError(_) => 2005,
            Error::InvalidModel(_) => 3001,
            Error::DuplicateResourceId(_) => 3002,
            Error::ResourceNotFound(_) => 3003,
            Error::ResourceInUse(_) => 3004,
            Error::DanglingReference(_) => 3005,
            Error::CyclicReference(_) => 3006,
            Error::DuplicateUuid(_) => 3007,
            Error::SliceOrder(_) => 3008,
            Error::InvalidPropertyLayer(_) => 3009,
            Error::PropertyNotFound(_) => 3010,
            Error::IndexOutOfRange(_) => 3011,
            Error::Unsupported(_) => 4001,
            Error::UnsupportedExtension(_) => 4002,
            Error::InvalidSecureContent(_) => 5001,
            Error::EncryptionCallbackMissing(_) => 5002,
            Error::DecryptionCallbackMissing(_) => 5003,
            Error::KeyWrapFailed(_) => 5004,
            Error::KeyUnwrapFailed(_) => 5005,
            Error::EncryptionFailed(_) => 5006,
            Error::DecryptionFailed(_) => 5007,
            Error::TagVerificationFailed(_) => 5008,
            Error::CallbackSizeMismatch(_) => 5009,
            Error::CalculationAborted => 6001,
            Error::UnknownFormat(_) => 6002,
            Error::Strict(w) => w.code,
        }
    }

    /// Create an InvalidXml error for a specific element
    pub fn invalid_xml_element(element: &str, message: &str) -> Self {
        Error::InvalidXml(format!("Element '<{}>': {}", element, message))
    }

    /// Create an InvalidXml error for a missing required attribute
    pub fn missing_attribute(element: &str, attribute: &str) -> Self {
        Error::InvalidXml(format!(
            "Element '<{}>' is missing required attribute '{}'",
            element, attribute
        ))
    }

    /// Create a ParseError describing the field, the offending value and what was expected
    pub fn parse_error_with_context(field_name: &str, value: &str, expected_type: &str) -> Self {
        Error::ParseError(format!(
            "Failed to parse '{}': expected {}, got '{}'",
            field_name, expected_type, value
        ))
    }

    /// Create an XmlWrite error
    pub fn xml_write(message: String) -> Self {
        Error::XmlWrite(message)
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::InvalidArchive(msg) => Error::ContainerCorrupt(msg.to_string()),
            zip::result::ZipError::Io(e) => Error::Io(e),
            zip::result::ZipError::FileNotFound => {
                Error::MissingPart("entry not found in archive".to_string())
            }
            other => Error::Zip(other),
        }
    }
}

impl From<std::num::ParseFloatError> for Error {
    fn from(err: std::num::ParseFloatError) -> Self {
        Error::ParseError(format!("Failed to parse floating-point number: {}", err))
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(err: std::num::ParseIntError) -> Self {
        Error::ParseError(format!("Failed to parse integer: {}", err))
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::XmlAttr(err.to_string())
    }
}

/// A recoverable condition recorded while reading
///
/// Warnings are accumulated in document order and never abort a read
/// unless strict mode is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// Numeric code, drawn from the same table as [`Error::code`]
    pub code: u32,
    /// Human-readable description
    pub message: String,
}

impl Warning {
    /// Create a warning with the given code and message
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[E{}] {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_in_messages() {
        let io_err = Error::Io(io::Error::new(io::ErrorKind::NotFound, "test"));
        assert!(io_err.to_string().contains("[E1001]"));
        assert_eq!(io_err.code(), 1001);

        let in_use = Error::ResourceInUse("object 3".to_string());
        assert!(in_use.to_string().contains("[E3004]"));
        assert_eq!(in_use.code(), 3004);

        let aborted = Error::CalculationAborted;
        assert_eq!(aborted.to_string(), "[E6001] Calculation aborted");
        assert_eq!(aborted.code(), 6001);
    }

    #[test]
    fn test_display_code_matches_numeric_code() {
        let errors = vec![
            Error::MissingRootModel("x".into()),
            Error::SliceOrder("x".into()),
            Error::TagVerificationFailed("x".into()),
            Error::UnknownFormat("x".into()),
            Error::KeyUnwrapFailed("x".into()),
        ];
        for err in errors {
            let prefix = format!("[E{}]", err.code());
            assert!(err.to_string().starts_with(&prefix), "{}", err);
        }
    }

    #[test]
    fn test_strict_error_carries_warning_code() {
        let warning = Warning::new(2005, "bad number");
        let err = Error::Strict(warning.clone());
        assert_eq!(err.code(), 2005);
        assert!(err.to_string().contains("bad number"));
        assert_eq!(warning.to_string(), "[E2005] bad number");
    }

    #[test]
    fn test_invalid_archive_maps_to_container_corrupt() {
        let err = Error::from(zip::result::ZipError::InvalidArchive("bad eocd".into()));
        assert_eq!(err.code(), 1004);
    }

    #[test]
    fn test_missing_attribute_helper() {
        let err = Error::missing_attribute("object", "id");
        assert!(err.to_string().contains("Element '<object>'"));
        assert!(err.to_string().contains("'id'"));
        assert!(err.to_string().contains("[E2003]"));
    }

    #[test]
    fn test_parse_error_with_context_helper() {
        let err =
            Error::parse_error_with_context("vertex x coordinate", "abc", "floating-point number");
        assert!(err.to_string().contains("vertex x coordinate"));
        assert!(err.to_string().contains("'abc'"));
        assert_eq!(err.code(), 2005);
    }

    #[test]
    fn test_parse_int_error_conversion() {
        let parse_err: std::num::ParseIntError = "not_a_number".parse::<i32>().unwrap_err();
        let err = Error::from(parse_err);
        assert!(err.to_string().contains("Failed to parse integer"));
    }
}
