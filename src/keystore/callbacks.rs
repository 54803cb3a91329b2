//! Host callbacks performing the actual cryptography
//!
//! Both traits follow a two-phase buffer protocol. A call with `output`
//! set to `None` is a size query and returns the exact number of bytes the
//! transform will produce. A call with `Some(buffer)` performs the
//! transform and returns the number of bytes written. Returning `0` from
//! either phase reports failure.

use super::{Consumer, EncryptionAlgorithm, KekParams};
use std::collections::HashMap;
use std::fmt;

/// What a key wrap or unwrap operates on
#[derive(Debug, Clone, Copy)]
pub struct KeyWrapContext<'a> {
    /// Consumer whose key encrypts the content key
    pub consumer: &'a Consumer,
    /// Wrap parameters from the access right
    pub kek_params: &'a KekParams,
    /// Identifier of the content key
    pub key_uuid: &'a str,
}

/// Wraps and unwraps content keys for one consumer
pub trait KeyWrapper: Send {
    /// Encrypt `input` (the content key) with the consumer key
    fn wrap(&mut self, ctx: &KeyWrapContext<'_>, input: &[u8], output: Option<&mut [u8]>) -> usize;

    /// Recover the content key from `input`
    fn unwrap(&mut self, ctx: &KeyWrapContext<'_>, input: &[u8], output: Option<&mut [u8]>)
    -> usize;
}

/// Cipher state of one protected part
#[derive(Clone, PartialEq, Eq)]
pub struct CipherParams {
    /// Cipher
    pub algorithm: EncryptionAlgorithm,
    /// Content key
    pub key: Vec<u8>,
    /// Initialization vector
    pub iv: Vec<u8>,
    /// Authentication tag: written by the encryptor at finalize, checked by
    /// the decryptor at finalize
    pub tag: Vec<u8>,
    /// Additional authenticated data
    pub aad: Vec<u8>,
}

impl fmt::Debug for CipherParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherParams")
            .field("algorithm", &self.algorithm)
            .field("key", &"<redacted>")
            .field("iv", &self.iv)
            .field("tag", &self.tag)
            .field("aad", &self.aad)
            .finish()
    }
}

/// Per-call context of a content transform
#[derive(Debug)]
pub struct ContentContext<'a> {
    /// Part being transformed
    pub path: &'a str,
    /// Identifies one part transform; all chunks and the finalize call of a
    /// part share it
    pub session: u64,
    /// Offset of `input` within the part's input stream
    pub offset: u64,
    /// Key, IV, tag and AAD
    pub params: &'a mut CipherParams,
}

/// Encrypts and decrypts part content in chunks
///
/// After the last chunk the library issues a finalize call with empty
/// input and an empty output buffer. The encryptor then stores the
/// authentication tag in `ctx.params.tag`; the decryptor verifies it and
/// returns `0` on mismatch.
pub trait ContentCipher: Send {
    /// Encrypt one chunk, or finalize
    fn encrypt(&mut self, ctx: &mut ContentContext<'_>, input: &[u8], output: Option<&mut [u8]>)
    -> usize;

    /// Decrypt one chunk, or finalize
    fn decrypt(&mut self, ctx: &mut ContentContext<'_>, input: &[u8], output: Option<&mut [u8]>)
    -> usize;
}

/// Default chunk size of content transforms
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Registered secure content callbacks of a reader or writer
pub struct SecureCallbacks {
    pub(crate) wrappers: HashMap<String, Box<dyn KeyWrapper>>,
    pub(crate) cipher: Option<Box<dyn ContentCipher>>,
    pub(crate) chunk_size: usize,
    pub(crate) next_session: u64,
}

impl Default for SecureCallbacks {
    fn default() -> Self {
        Self {
            wrappers: HashMap::new(),
            cipher: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            next_session: 1,
        }
    }
}

impl fmt::Debug for SecureCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut consumers: Vec<&String> = self.wrappers.keys().collect();
        consumers.sort();
        f.debug_struct("SecureCallbacks")
            .field("key_wrappers", &consumers)
            .field("content_cipher", &self.cipher.is_some())
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

impl SecureCallbacks {
    /// No callbacks registered
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the key wrapper of a consumer, replacing any previous one
    pub fn add_key_wrapper(&mut self, consumer_id: impl Into<String>, wrapper: Box<dyn KeyWrapper>) {
        self.wrappers.insert(consumer_id.into(), wrapper);
    }

    /// Register the content cipher
    pub fn set_content_cipher(&mut self, cipher: Box<dyn ContentCipher>) {
        self.cipher = Some(cipher);
    }

    /// Chunk size of content transforms; zero selects the default
    pub fn set_chunk_size(&mut self, size: usize) {
        self.chunk_size = if size == 0 { DEFAULT_CHUNK_SIZE } else { size };
    }

    /// Whether a key wrapper is registered for the consumer
    pub fn has_key_wrapper(&self, consumer_id: &str) -> bool {
        self.wrappers.contains_key(consumer_id)
    }

    /// Whether a content cipher is registered
    pub fn has_content_cipher(&self) -> bool {
        self.cipher.is_some()
    }

    pub(crate) fn new_session(&mut self) -> u64 {
        let id = self.next_session;
        self.next_session += 1;
        id
    }
}
