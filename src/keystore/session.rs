//! Driving the host callbacks for key and content transforms

use super::callbacks::{ContentCipher, ContentContext, KeyWrapContext, SecureCallbacks};
use super::{CONTENT_KEY_LEN, CipherParams, Compression, Consumer, IV_LEN, KeyStore, ResourceDataGroup};
use crate::error::{Error, Result};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use rand::RngExt;
use std::io::{Read, Write};
use tracing::{debug, trace};

/// One size query, then one data call
fn two_phase<F>(what: &str, fail: fn(String) -> Error, mut call: F) -> Result<Vec<u8>>
where
    F: FnMut(Option<&mut [u8]>) -> usize,
{
    let size = call(None);
    if size == 0 {
        return Err(fail(format!("{}: size query reported failure", what)));
    }
    let mut out = vec![0u8; size];
    let written = call(Some(out.as_mut_slice()));
    if written == 0 {
        return Err(fail(format!("{}: transform reported failure", what)));
    }
    if written > size {
        return Err(Error::CallbackSizeMismatch(format!(
            "{}: {} bytes reported for a buffer of {}",
            what, written, size
        )));
    }
    out.truncate(written);
    Ok(out)
}

pub(crate) fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    let mut rng = rand::rng();
    rng.fill(bytes.as_mut_slice());
    bytes
}

pub(crate) fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

pub(crate) fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::DecryptionFailed(format!("inflating content failed: {}", e)))?;
    Ok(out)
}

/// Encrypt `plain` chunk by chunk, then finalize to obtain the tag
pub(crate) fn encrypt_content(
    cipher: &mut dyn ContentCipher,
    path: &str,
    session: u64,
    params: &mut CipherParams,
    plain: &[u8],
    chunk_size: usize,
) -> Result<Vec<u8>> {
    let mut ctx = ContentContext {
        path,
        session,
        offset: 0,
        params,
    };
    let mut out = Vec::with_capacity(plain.len());
    for chunk in plain.chunks(chunk_size.max(1)) {
        let what = format!("encrypting '{}' at offset {}", path, ctx.offset);
        let bytes = two_phase(&what, Error::EncryptionFailed, |buf| {
            cipher.encrypt(&mut ctx, chunk, buf)
        })?;
        out.extend_from_slice(&bytes);
        ctx.offset += chunk.len() as u64;
    }
    let mut empty: [u8; 0] = [];
    if cipher.encrypt(&mut ctx, &[], Some(&mut empty[..])) == 0 {
        return Err(Error::EncryptionFailed(format!(
            "finalizing '{}' reported failure",
            path
        )));
    }
    if ctx.params.tag.is_empty() {
        return Err(Error::EncryptionFailed(format!(
            "no authentication tag produced for '{}'",
            path
        )));
    }
    Ok(out)
}

/// Decrypt `data` chunk by chunk, then finalize to verify the tag
pub(crate) fn decrypt_content(
    cipher: &mut dyn ContentCipher,
    path: &str,
    session: u64,
    params: &mut CipherParams,
    data: &[u8],
    chunk_size: usize,
) -> Result<Vec<u8>> {
    let mut ctx = ContentContext {
        path,
        session,
        offset: 0,
        params,
    };
    let mut out = Vec::with_capacity(data.len());
    for chunk in data.chunks(chunk_size.max(1)) {
        let what = format!("decrypting '{}' at offset {}", path, ctx.offset);
        let bytes = two_phase(&what, Error::DecryptionFailed, |buf| {
            cipher.decrypt(&mut ctx, chunk, buf)
        })?;
        out.extend_from_slice(&bytes);
        ctx.offset += chunk.len() as u64;
    }
    let mut empty: [u8; 0] = [];
    if cipher.decrypt(&mut ctx, &[], Some(&mut empty[..])) == 0 {
        return Err(Error::TagVerificationFailed(path.to_string()));
    }
    Ok(out)
}

fn group_of<'a>(store: &'a mut KeyStore, path: &str) -> Result<&'a mut ResourceDataGroup> {
    store
        .groups_mut()
        .iter_mut()
        .find(|g| {
            g.resource_data()
                .iter()
                .any(|r| r.path.eq_ignore_ascii_case(path))
        })
        .ok_or_else(|| Error::InvalidSecureContent(format!("part '{}' is not protected", path)))
}

fn find_consumer<'a>(consumers: &'a [Consumer], id: &str) -> Result<&'a Consumer> {
    consumers
        .iter()
        .find(|c| c.id == id)
        .ok_or_else(|| Error::InvalidSecureContent(format!("unknown consumer '{}'", id)))
}

impl SecureCallbacks {
    /// Make sure every group protecting parts has a content key, and wrap
    /// it once per access right
    ///
    /// A right whose consumer has no registered wrapper keeps a wrapped key
    /// obtained when the package was read, as long as the content key is
    /// the one it wraps.
    pub(crate) fn establish_keys(&mut self, store: &mut KeyStore) -> Result<()> {
        store.validate()?;
        if !store.has_resource_data() {
            return Ok(());
        }
        if self.cipher.is_none() {
            return Err(Error::EncryptionCallbackMissing(
                "the keystore protects parts but no content cipher is registered".to_string(),
            ));
        }
        let consumers = store.consumers().to_vec();
        for group in store.groups_mut() {
            if group.resource_data().is_empty() {
                continue;
            }
            let fresh = group.key.is_none();
            let key = group
                .key
                .get_or_insert_with(|| random_bytes(CONTENT_KEY_LEN))
                .clone();
            let key_uuid = group.key_uuid.clone();
            for right in group.access_rights_mut() {
                let consumer = find_consumer(&consumers, &right.consumer_id)?;
                match self.wrappers.get_mut(&right.consumer_id) {
                    Some(wrapper) => {
                        let ctx = KeyWrapContext {
                            consumer,
                            kek_params: &right.kek_params,
                            key_uuid: &key_uuid,
                        };
                        let what = format!("wrapping key '{}' for '{}'", key_uuid, consumer.id);
                        right.wrapped_key = two_phase(&what, Error::KeyWrapFailed, |buf| {
                            wrapper.wrap(&ctx, &key, buf)
                        })?;
                        trace!(consumer = %consumer.id, key = %key_uuid, "wrapped content key");
                    }
                    None if !fresh && !right.wrapped_key.is_empty() => {}
                    None => {
                        return Err(Error::EncryptionCallbackMissing(format!(
                            "no key wrapper registered for consumer '{}'",
                            consumer.id
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Encrypt the serialized bytes of a protected part
    ///
    /// Keys must have been established. A fresh IV is drawn for every call
    /// and the resulting tag is stored in the keystore.
    pub(crate) fn encrypt_part(
        &mut self,
        store: &mut KeyStore,
        path: &str,
        plain: Vec<u8>,
    ) -> Result<Vec<u8>> {
        let session = self.new_session();
        let chunk_size = self.chunk_size;
        let cipher = self.cipher.as_deref_mut().ok_or_else(|| {
            Error::EncryptionCallbackMissing(format!("no content cipher for '{}'", path))
        })?;
        let group = group_of(store, path)?;
        let key = group.key.clone().ok_or_else(|| {
            Error::InvalidSecureContent(format!("content key of '{}' not established", path))
        })?;
        let data = group
            .resource_data_mut(path)
            .ok_or_else(|| Error::InvalidSecureContent(format!("part '{}' is not protected", path)))?;

        let payload = match data.cek_params.compression {
            Compression::None => plain,
            Compression::Deflate => deflate(&plain)?,
        };
        let mut params = CipherParams {
            algorithm: data.cek_params.algorithm,
            key,
            iv: random_bytes(IV_LEN),
            tag: Vec::new(),
            aad: data.cek_params.aad.clone(),
        };
        let out = encrypt_content(cipher, path, session, &mut params, &payload, chunk_size)?;
        data.cek_params.iv = params.iv;
        data.cek_params.tag = params.tag;
        debug!(part = path, bytes = out.len(), "encrypted part");
        Ok(out)
    }

    /// Decrypt a protected part read from the package
    pub(crate) fn decrypt_part(
        &mut self,
        store: &mut KeyStore,
        path: &str,
        data: &[u8],
    ) -> Result<Vec<u8>> {
        let session = self.new_session();
        let chunk_size = self.chunk_size;
        let consumers = store.consumers().to_vec();
        let group = group_of(store, path)?;
        let key = match group.key.clone() {
            Some(key) => key,
            None => {
                let key = self.unwrap_group_key(&consumers, group)?;
                group.key = Some(key.clone());
                key
            }
        };
        let record = group
            .resource_data_mut(path)
            .ok_or_else(|| Error::InvalidSecureContent(format!("part '{}' is not protected", path)))?;
        let cipher = self.cipher.as_deref_mut().ok_or_else(|| {
            Error::DecryptionCallbackMissing(format!("no content cipher for '{}'", path))
        })?;
        let mut params = CipherParams {
            algorithm: record.cek_params.algorithm,
            key,
            iv: record.cek_params.iv.clone(),
            tag: record.cek_params.tag.clone(),
            aad: record.cek_params.aad.clone(),
        };
        let plain = decrypt_content(cipher, path, session, &mut params, data, chunk_size)?;
        debug!(part = path, bytes = plain.len(), "decrypted part");
        match record.cek_params.compression {
            Compression::None => Ok(plain),
            Compression::Deflate => inflate(&plain),
        }
    }

    fn unwrap_group_key(
        &mut self,
        consumers: &[Consumer],
        group: &ResourceDataGroup,
    ) -> Result<Vec<u8>> {
        let right = group
            .access_rights()
            .iter()
            .find(|r| self.wrappers.contains_key(&r.consumer_id))
            .ok_or_else(|| {
                Error::DecryptionCallbackMissing(format!(
                    "no key wrapper registered for any consumer of key '{}'",
                    group.key_uuid
                ))
            })?;
        if right.wrapped_key.is_empty() {
            return Err(Error::KeyUnwrapFailed(format!(
                "no wrapped key for consumer '{}'",
                right.consumer_id
            )));
        }
        let consumer = find_consumer(consumers, &right.consumer_id)?;
        let wrapper = self.wrappers.get_mut(&right.consumer_id).ok_or_else(|| {
            Error::DecryptionCallbackMissing(format!("no key wrapper for '{}'", right.consumer_id))
        })?;
        let ctx = KeyWrapContext {
            consumer,
            kek_params: &right.kek_params,
            key_uuid: &group.key_uuid,
        };
        let what = format!("unwrapping key '{}' for '{}'", group.key_uuid, consumer.id);
        two_phase(&what, Error::KeyUnwrapFailed, |buf| {
            wrapper.unwrap(&ctx, &right.wrapped_key, buf)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::{EncryptionAlgorithm, KekParams, KeyWrapper};

    /// XOR "cipher" with a running checksum as tag
    struct XorCipher {
        sum: u8,
    }

    impl XorCipher {
        fn run(&mut self, ctx: &mut ContentContext<'_>, input: &[u8], output: Option<&mut [u8]>, enc: bool) -> usize {
            match output {
                None => input.len(),
                Some(_) if input.is_empty() => {
                    if enc {
                        ctx.params.tag = vec![self.sum];
                        1
                    } else if ctx.params.tag == [self.sum] {
                        1
                    } else {
                        0
                    }
                }
                Some(buf) => {
                    for (o, i) in buf.iter_mut().zip(input) {
                        *o = i ^ ctx.params.key[0];
                        self.sum = self.sum.wrapping_add(if enc { *i } else { *o });
                    }
                    input.len()
                }
            }
        }
    }

    impl ContentCipher for XorCipher {
        fn encrypt(&mut self, ctx: &mut ContentContext<'_>, input: &[u8], output: Option<&mut [u8]>) -> usize {
            self.run(ctx, input, output, true)
        }
        fn decrypt(&mut self, ctx: &mut ContentContext<'_>, input: &[u8], output: Option<&mut [u8]>) -> usize {
            self.run(ctx, input, output, false)
        }
    }

    struct Identity;

    impl KeyWrapper for Identity {
        fn wrap(&mut self, _: &KeyWrapContext<'_>, input: &[u8], output: Option<&mut [u8]>) -> usize {
            match output {
                None => input.len(),
                Some(buf) => {
                    buf.copy_from_slice(input);
                    input.len()
                }
            }
        }
        fn unwrap(&mut self, ctx: &KeyWrapContext<'_>, input: &[u8], output: Option<&mut [u8]>) -> usize {
            self.wrap(ctx, input, output)
        }
    }

    /// Claims a larger write than the buffer it was given
    struct Liar;

    impl KeyWrapper for Liar {
        fn wrap(&mut self, _: &KeyWrapContext<'_>, input: &[u8], output: Option<&mut [u8]>) -> usize {
            match output {
                None => input.len(),
                Some(_) => input.len() + 1,
            }
        }
        fn unwrap(&mut self, _: &KeyWrapContext<'_>, _: &[u8], _: Option<&mut [u8]>) -> usize {
            0
        }
    }

    fn protected_store(compression: Compression) -> KeyStore {
        let mut ks = KeyStore::new();
        ks.add_consumer(Consumer::new("c1")).unwrap();
        let g = ks.add_resource_data_group();
        ks.add_access_right(&g, "c1", KekParams::default()).unwrap();
        ks.add_resource_data(&g, "/3D/a.model", EncryptionAlgorithm::Aes256Gcm, compression, b"aad".to_vec())
            .unwrap();
        ks
    }

    #[test]
    fn test_roundtrip_through_callbacks() {
        let mut ks = protected_store(Compression::Deflate);
        let mut cb = SecureCallbacks::new();
        cb.add_key_wrapper("c1", Box::new(Identity));
        cb.set_content_cipher(Box::new(XorCipher { sum: 0 }));
        cb.set_chunk_size(7);
        cb.establish_keys(&mut ks).unwrap();

        let plain = b"<model>hello hello hello</model>".to_vec();
        let sealed = cb.encrypt_part(&mut ks, "/3D/a.model", plain.clone()).unwrap();
        assert_ne!(sealed, plain);
        let right = &ks.groups()[0].access_rights()[0];
        assert_eq!(right.wrapped_key().len(), CONTENT_KEY_LEN);

        // Reading starts without a cached key
        ks.groups_mut()[0].key = None;
        let mut reader = SecureCallbacks::new();
        reader.add_key_wrapper("c1", Box::new(Identity));
        reader.set_content_cipher(Box::new(XorCipher { sum: 0 }));
        let opened = reader.decrypt_part(&mut ks, "/3D/a.model", &sealed).unwrap();
        assert_eq!(opened, plain);
    }

    #[test]
    fn test_missing_cipher_is_reported() {
        let mut ks = protected_store(Compression::None);
        let mut cb = SecureCallbacks::new();
        cb.add_key_wrapper("c1", Box::new(Identity));
        let err = cb.establish_keys(&mut ks).unwrap_err();
        assert!(matches!(err, Error::EncryptionCallbackMissing(_)));
    }

    #[test]
    fn test_missing_wrapper_on_read() {
        let mut ks = protected_store(Compression::None);
        let mut cb = SecureCallbacks::new();
        cb.set_content_cipher(Box::new(XorCipher { sum: 0 }));
        let err = cb.decrypt_part(&mut ks, "/3D/a.model", b"xx").unwrap_err();
        assert!(matches!(err, Error::DecryptionCallbackMissing(_)));
    }

    #[test]
    fn test_oversized_write_is_size_mismatch() {
        let mut ks = protected_store(Compression::None);
        let mut cb = SecureCallbacks::new();
        cb.add_key_wrapper("c1", Box::new(Liar));
        cb.set_content_cipher(Box::new(XorCipher { sum: 0 }));
        let err = cb.establish_keys(&mut ks).unwrap_err();
        assert_eq!(err.code(), 5009);
    }

    #[test]
    fn test_tampered_content_fails_tag() {
        let mut ks = protected_store(Compression::None);
        let mut cb = SecureCallbacks::new();
        cb.add_key_wrapper("c1", Box::new(Identity));
        cb.set_content_cipher(Box::new(XorCipher { sum: 0 }));
        cb.establish_keys(&mut ks).unwrap();
        let mut sealed = cb.encrypt_part(&mut ks, "/3D/a.model", b"abc".to_vec()).unwrap();
        sealed[0] ^= 0x01;
        cb.set_content_cipher(Box::new(XorCipher { sum: 0 }));
        let err = cb.decrypt_part(&mut ks, "/3D/a.model", &sealed).unwrap_err();
        assert!(matches!(err, Error::TagVerificationFailed(_)));
    }

    #[test]
    fn test_deflate_roundtrip() {
        let data = vec![42u8; 4096];
        let packed = deflate(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(inflate(&packed).unwrap(), data);
    }
}
