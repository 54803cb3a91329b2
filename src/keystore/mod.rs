//! Secure content: the keystore model and its cipher plumbing
//!
//! A [`KeyStore`] lists the consumers allowed to read protected parts and
//! groups those parts by the content key (DEK) that encrypts them. Each
//! [`ResourceDataGroup`] holds one [`AccessRight`] per consumer, carrying
//! the DEK wrapped with that consumer's key (KEK).
//!
//! No cryptography happens here. Key wrapping and content encryption are
//! delegated to host callbacks, see [`KeyWrapper`] and [`ContentCipher`].

mod callbacks;
mod session;
pub(crate) mod xml;

pub use callbacks::{
    CipherParams, ContentCipher, ContentContext, KeyWrapContext, KeyWrapper, SecureCallbacks,
};

use crate::error::{Error, Result};
use crate::model::normalize_part_name;
use std::fmt;
use std::str::FromStr;

/// Default keystore part
pub const KEYSTORE_PART: &str = "/Secure/keystore.xml";

/// Size of a content key in bytes (AES-256)
pub const CONTENT_KEY_LEN: usize = 32;

/// Size of a freshly generated initialization vector in bytes
pub const IV_LEN: usize = 12;

macro_rules! uri_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $what:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $uri:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Identifying URI
            pub fn as_uri(&self) -> &'static str {
                match self {
                    $( Self::$variant => $uri ),+
                }
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $( $uri => Ok(Self::$variant), )+
                    _ => Err(Error::InvalidSecureContent(format!(
                        "unknown {} '{}'",
                        $what, s
                    ))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_uri())
            }
        }
    };
}

uri_enum! {
    /// Algorithm used to wrap the content key with a consumer key
    WrappingAlgorithm, "wrapping algorithm" {
        /// RSA-OAEP with MGF1, XML Encryption 1.0
        RsaOaepMgf1p => "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p",
        /// RSA-OAEP, XML Encryption 1.1
        RsaOaep => "http://www.w3.org/2009/xmlenc11#rsa-oaep",
    }
}

uri_enum! {
    /// Mask generation function of the key wrap
    MgfAlgorithm, "mask generation function" {
        /// MGF1 with SHA-1
        Sha1 => "http://www.w3.org/2009/xmlenc11#mgf1sha1",
        /// MGF1 with SHA-256
        Sha256 => "http://www.w3.org/2009/xmlenc11#mgf1sha256",
        /// MGF1 with SHA-384
        Sha384 => "http://www.w3.org/2009/xmlenc11#mgf1sha384",
        /// MGF1 with SHA-512
        Sha512 => "http://www.w3.org/2009/xmlenc11#mgf1sha512",
    }
}

uri_enum! {
    /// Message digest of the key wrap
    DigestMethod, "digest method" {
        /// SHA-1
        Sha1 => "http://www.w3.org/2000/09/xmldsig#sha1",
        /// SHA-256
        Sha256 => "http://www.w3.org/2001/04/xmlenc#sha256",
        /// SHA-384
        Sha384 => "http://www.w3.org/2001/04/xmlenc#sha384",
        /// SHA-512
        Sha512 => "http://www.w3.org/2001/04/xmlenc#sha512",
    }
}

uri_enum! {
    /// Content encryption algorithm
    EncryptionAlgorithm, "encryption algorithm" {
        /// AES-256 in Galois/Counter mode
        Aes256Gcm => "http://www.w3.org/2009/xmlenc11#aes256-gcm",
    }
}

/// Compression applied to a part before encryption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Compression {
    /// Stored as is
    #[default]
    None,
    /// Raw deflate
    Deflate,
}

impl Compression {
    /// XML attribute value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Deflate => "deflate",
        }
    }
}

impl FromStr for Compression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "deflate" => Ok(Self::Deflate),
            _ => Err(Error::InvalidSecureContent(format!(
                "unknown compression '{}'",
                s
            ))),
        }
    }
}

/// A party that may decrypt protected parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consumer {
    /// Unique consumer id
    pub id: String,
    /// Identifier of the consumer's key
    pub key_id: Option<String>,
    /// Public key value, usually PEM
    pub key_value: Option<String>,
}

impl Consumer {
    /// Consumer without key details
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key_id: None,
            key_value: None,
        }
    }
}

/// Parameters of the content key wrap for one consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KekParams {
    /// Wrapping algorithm
    pub wrapping_algorithm: WrappingAlgorithm,
    /// Mask generation function
    pub mgf_algorithm: Option<MgfAlgorithm>,
    /// Digest method
    pub digest_method: Option<DigestMethod>,
}

impl Default for KekParams {
    fn default() -> Self {
        Self {
            wrapping_algorithm: WrappingAlgorithm::RsaOaep,
            mgf_algorithm: Some(MgfAlgorithm::Sha1),
            digest_method: Some(DigestMethod::Sha1),
        }
    }
}

/// Entitlement of one consumer to the content key of a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRight {
    /// Consumer holding the right
    pub consumer_id: String,
    /// Key wrap parameters
    pub kek_params: KekParams,
    pub(crate) wrapped_key: Vec<u8>,
}

impl AccessRight {
    /// Content key wrapped for this consumer; empty until written or read
    pub fn wrapped_key(&self) -> &[u8] {
        &self.wrapped_key
    }
}

/// Content encryption parameters of one protected part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CekParams {
    /// Cipher
    pub algorithm: EncryptionAlgorithm,
    /// Compression before encryption
    pub compression: Compression,
    /// Initialization vector
    pub iv: Vec<u8>,
    /// Authentication tag
    pub tag: Vec<u8>,
    /// Additional authenticated data
    pub aad: Vec<u8>,
}

impl CekParams {
    fn new(algorithm: EncryptionAlgorithm, compression: Compression, aad: Vec<u8>) -> Self {
        Self {
            algorithm,
            compression,
            iv: Vec::new(),
            tag: Vec::new(),
            aad,
        }
    }
}

/// A protected package part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceData {
    /// Absolute part name
    pub path: String,
    /// Cipher parameters
    pub cek_params: CekParams,
}

/// Parts sharing one content key
#[derive(Clone, PartialEq, Eq)]
pub struct ResourceDataGroup {
    /// Identifier of the content key
    pub key_uuid: String,
    access_rights: Vec<AccessRight>,
    resource_data: Vec<ResourceData>,
    pub(crate) key: Option<Vec<u8>>,
}

impl fmt::Debug for ResourceDataGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDataGroup")
            .field("key_uuid", &self.key_uuid)
            .field("access_rights", &self.access_rights)
            .field("resource_data", &self.resource_data)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ResourceDataGroup {
    fn new(key_uuid: String) -> Self {
        Self {
            key_uuid,
            access_rights: Vec::new(),
            resource_data: Vec::new(),
            key: None,
        }
    }

    /// Decrypt rights in order
    pub fn access_rights(&self) -> &[AccessRight] {
        &self.access_rights
    }

    /// Protected parts in order
    pub fn resource_data(&self) -> &[ResourceData] {
        &self.resource_data
    }

    /// Access right of a consumer
    pub fn access_right(&self, consumer_id: &str) -> Option<&AccessRight> {
        self.access_rights
            .iter()
            .find(|a| a.consumer_id == consumer_id)
    }

    pub(crate) fn access_rights_mut(&mut self) -> &mut [AccessRight] {
        &mut self.access_rights
    }

    pub(crate) fn resource_data_mut(&mut self, path: &str) -> Option<&mut ResourceData> {
        self.resource_data.iter_mut().find(|r| r.path == path)
    }
}

/// Secure content descriptor of a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyStore {
    /// Keystore UUID
    pub uuid: String,
    consumers: Vec<Consumer>,
    groups: Vec<ResourceDataGroup>,
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStore {
    /// Empty keystore with a fresh UUID
    pub fn new() -> Self {
        Self::with_uuid(uuid::Uuid::new_v4().to_string())
    }

    pub(crate) fn with_uuid(uuid: String) -> Self {
        Self {
            uuid,
            consumers: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// Register a consumer; ids are unique
    pub fn add_consumer(&mut self, consumer: Consumer) -> Result<()> {
        if consumer.id.is_empty() {
            return Err(Error::InvalidSecureContent(
                "consumer id must not be empty".to_string(),
            ));
        }
        if self.consumer(&consumer.id).is_some() {
            return Err(Error::InvalidSecureContent(format!(
                "duplicate consumer id '{}'",
                consumer.id
            )));
        }
        self.consumers.push(consumer);
        Ok(())
    }

    /// Consumer by id
    pub fn consumer(&self, id: &str) -> Option<&Consumer> {
        self.consumers.iter().find(|c| c.id == id)
    }

    /// Consumers in order
    pub fn consumers(&self) -> &[Consumer] {
        &self.consumers
    }

    /// Remove a consumer together with all of its access rights
    pub fn remove_consumer(&mut self, id: &str) -> Result<Consumer> {
        let pos = self
            .consumers
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| Error::InvalidSecureContent(format!("no consumer '{}'", id)))?;
        for group in &mut self.groups {
            group.access_rights.retain(|a| a.consumer_id != id);
        }
        Ok(self.consumers.remove(pos))
    }

    /// Create a group with a new content key identifier, returning it
    pub fn add_resource_data_group(&mut self) -> String {
        let key_uuid = uuid::Uuid::new_v4().to_string();
        self.groups.push(ResourceDataGroup::new(key_uuid.clone()));
        key_uuid
    }

    pub(crate) fn push_group(&mut self, key_uuid: String) -> Result<&mut ResourceDataGroup> {
        if self.group(&key_uuid).is_some() {
            return Err(Error::InvalidSecureContent(format!(
                "duplicate key uuid '{}'",
                key_uuid
            )));
        }
        self.groups.push(ResourceDataGroup::new(key_uuid));
        let last = self.groups.len() - 1;
        Ok(&mut self.groups[last])
    }

    /// Groups in order
    pub fn groups(&self) -> &[ResourceDataGroup] {
        &self.groups
    }

    /// Group by key uuid
    pub fn group(&self, key_uuid: &str) -> Option<&ResourceDataGroup> {
        self.groups.iter().find(|g| g.key_uuid == key_uuid)
    }

    pub(crate) fn group_mut(&mut self, key_uuid: &str) -> Result<&mut ResourceDataGroup> {
        self.groups
            .iter_mut()
            .find(|g| g.key_uuid == key_uuid)
            .ok_or_else(|| Error::InvalidSecureContent(format!("no group '{}'", key_uuid)))
    }

    pub(crate) fn groups_mut(&mut self) -> &mut [ResourceDataGroup] {
        &mut self.groups
    }

    /// Remove a group and forget its parts
    pub fn remove_resource_data_group(&mut self, key_uuid: &str) -> Result<()> {
        let before = self.groups.len();
        self.groups.retain(|g| g.key_uuid != key_uuid);
        if self.groups.len() == before {
            return Err(Error::InvalidSecureContent(format!(
                "no group '{}'",
                key_uuid
            )));
        }
        Ok(())
    }

    /// Grant a consumer access to the content key of a group
    pub fn add_access_right(
        &mut self,
        key_uuid: &str,
        consumer_id: &str,
        kek_params: KekParams,
    ) -> Result<()> {
        if self.consumer(consumer_id).is_none() {
            return Err(Error::InvalidSecureContent(format!(
                "access right for unknown consumer '{}'",
                consumer_id
            )));
        }
        let group = self.group_mut(key_uuid)?;
        if group.access_right(consumer_id).is_some() {
            return Err(Error::InvalidSecureContent(format!(
                "consumer '{}' already has access to group '{}'",
                consumer_id, key_uuid
            )));
        }
        group.access_rights.push(AccessRight {
            consumer_id: consumer_id.to_string(),
            kek_params,
            wrapped_key: Vec::new(),
        });
        Ok(())
    }

    pub(crate) fn push_access_right(
        &mut self,
        key_uuid: &str,
        consumer_id: String,
        kek_params: KekParams,
        wrapped_key: Vec<u8>,
    ) -> Result<()> {
        self.group_mut(key_uuid)?.access_rights.push(AccessRight {
            consumer_id,
            kek_params,
            wrapped_key,
        });
        Ok(())
    }

    /// Protect a package part with the key of a group
    ///
    /// A part belongs to at most one group. Relationship parts cannot be
    /// protected.
    pub fn add_resource_data(
        &mut self,
        key_uuid: &str,
        path: &str,
        algorithm: EncryptionAlgorithm,
        compression: Compression,
        aad: Vec<u8>,
    ) -> Result<()> {
        let path = normalize_part_name(path.trim());
        Self::check_protectable(&path)?;
        if self.find_resource_data(&path).is_some() {
            return Err(Error::InvalidSecureContent(format!(
                "part '{}' is already protected",
                path
            )));
        }
        self.group_mut(key_uuid)?
            .resource_data
            .push(ResourceData {
                path,
                cek_params: CekParams::new(algorithm, compression, aad),
            });
        Ok(())
    }

    pub(crate) fn push_resource_data(&mut self, key_uuid: &str, data: ResourceData) -> Result<()> {
        Self::check_protectable(&data.path)?;
        if self.find_resource_data(&data.path).is_some() {
            return Err(Error::InvalidSecureContent(format!(
                "duplicate resource data path '{}'",
                data.path
            )));
        }
        self.group_mut(key_uuid)?.resource_data.push(data);
        Ok(())
    }

    fn check_protectable(path: &str) -> Result<()> {
        if path.len() <= 1 {
            return Err(Error::InvalidSecureContent(
                "resource data path must not be empty".to_string(),
            ));
        }
        if path.to_ascii_lowercase().ends_with(".rels") {
            return Err(Error::InvalidSecureContent(format!(
                "relationship part '{}' cannot be encrypted",
                path
            )));
        }
        Ok(())
    }

    /// Stop protecting a part
    pub fn remove_resource_data(&mut self, path: &str) -> Option<ResourceData> {
        let path = normalize_part_name(path);
        self.groups.iter_mut().find_map(|g| {
            let pos = g.resource_data.iter().position(|r| r.path == path)?;
            Some(g.resource_data.remove(pos))
        })
    }

    /// Group and record protecting a part
    pub fn find_resource_data(&self, path: &str) -> Option<(&ResourceDataGroup, &ResourceData)> {
        let path = normalize_part_name(path);
        self.groups.iter().find_map(|g| {
            g.resource_data
                .iter()
                .find(|r| r.path.eq_ignore_ascii_case(&path))
                .map(|r| (g, r))
        })
    }

    /// Whether a part is protected
    pub fn is_protected(&self, path: &str) -> bool {
        self.find_resource_data(path).is_some()
    }

    /// Whether any part is protected
    pub fn has_resource_data(&self) -> bool {
        self.groups.iter().any(|g| !g.resource_data.is_empty())
    }

    /// Whether the keystore carries no consumers and no groups
    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty() && self.groups.is_empty()
    }

    /// Check cross references between groups and consumers
    pub fn validate(&self) -> Result<()> {
        for group in &self.groups {
            for right in &group.access_rights {
                if self.consumer(&right.consumer_id).is_none() {
                    return Err(Error::InvalidSecureContent(format!(
                        "group '{}' grants access to unknown consumer '{}'",
                        group.key_uuid, right.consumer_id
                    )));
                }
            }
            if !group.resource_data.is_empty() && group.access_rights.is_empty() {
                return Err(Error::InvalidSecureContent(format!(
                    "group '{}' protects parts but grants no access",
                    group.key_uuid
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_group() -> (KeyStore, String) {
        let mut ks = KeyStore::new();
        ks.add_consumer(Consumer::new("alice")).unwrap();
        let g = ks.add_resource_data_group();
        (ks, g)
    }

    #[test]
    fn test_duplicate_consumer_rejected() {
        let (mut ks, _) = store_with_group();
        let err = ks.add_consumer(Consumer::new("alice")).unwrap_err();
        assert!(matches!(err, Error::InvalidSecureContent(_)));
        assert_eq!(ks.consumers().len(), 1);
    }

    #[test]
    fn test_part_in_one_group_only() {
        let (mut ks, g1) = store_with_group();
        let g2 = ks.add_resource_data_group();
        ks.add_resource_data(&g1, "3D/a.model", EncryptionAlgorithm::Aes256Gcm, Compression::None, vec![])
            .unwrap();
        let err = ks
            .add_resource_data(&g2, "/3D/a.model", EncryptionAlgorithm::Aes256Gcm, Compression::None, vec![])
            .unwrap_err();
        assert_eq!(err.code(), 5001);
        let (group, data) = ks.find_resource_data("/3D/a.model").unwrap();
        assert_eq!(group.key_uuid, g1);
        assert_eq!(data.path, "/3D/a.model");
    }

    #[test]
    fn test_rels_cannot_be_protected() {
        let (mut ks, g) = store_with_group();
        assert!(
            ks.add_resource_data(&g, "/3D/_rels/a.model.rels", EncryptionAlgorithm::Aes256Gcm, Compression::None, vec![])
                .is_err()
        );
        assert!(
            ks.add_resource_data(&g, "", EncryptionAlgorithm::Aes256Gcm, Compression::None, vec![])
                .is_err()
        );
    }

    #[test]
    fn test_remove_consumer_drops_rights() {
        let (mut ks, g) = store_with_group();
        ks.add_access_right(&g, "alice", KekParams::default()).unwrap();
        assert!(ks.add_access_right(&g, "bob", KekParams::default()).is_err());
        ks.remove_consumer("alice").unwrap();
        assert!(ks.group(&g).unwrap().access_rights().is_empty());
    }

    #[test]
    fn test_validate_requires_access_for_protected_parts() {
        let (mut ks, g) = store_with_group();
        ks.add_resource_data(&g, "/3D/a.model", EncryptionAlgorithm::Aes256Gcm, Compression::Deflate, vec![])
            .unwrap();
        assert!(ks.validate().is_err());
        ks.add_access_right(&g, "alice", KekParams::default()).unwrap();
        ks.validate().unwrap();
    }

    #[test]
    fn test_algorithm_uris() {
        let w: WrappingAlgorithm = "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p".parse().unwrap();
        assert_eq!(w, WrappingAlgorithm::RsaOaepMgf1p);
        assert!("http://example.com/rot13".parse::<WrappingAlgorithm>().is_err());
        assert_eq!(
            DigestMethod::Sha256.as_uri(),
            "http://www.w3.org/2001/04/xmlenc#sha256"
        );
        assert_eq!("deflate".parse::<Compression>().unwrap(), Compression::Deflate);
    }
}
