//! Shared helpers for the integration tests
//!
//! Not every test binary uses every helper.
#![allow(dead_code)]

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce, Tag};
use lib3mf_engine::keystore::{ContentCipher, ContentContext, KeyWrapContext, KeyWrapper};
use lib3mf_engine::model::{BuildItem, Mesh, Model, Object, ResourceId, Triangle, Vertex};
use lib3mf_engine::{ParserConfig, WriterConfig, read_3mf, write_3mf};
use std::io::Cursor;

/// Send library logs to the test output when `RUST_LOG` is set
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Axis-aligned cube with 8 vertices and 12 outward facing triangles
pub fn cube_mesh(size: f64) -> Mesh {
    let mut mesh = Mesh::new();
    for i in 0..8u32 {
        let x = if i & 1 != 0 { size } else { 0.0 };
        let y = if i & 2 != 0 { size } else { 0.0 };
        let z = if i & 4 != 0 { size } else { 0.0 };
        mesh.add_vertex(Vertex::new(x, y, z));
    }
    let faces = [
        [0, 2, 1], [1, 2, 3], // bottom
        [4, 5, 6], [5, 7, 6], // top
        [0, 1, 4], [1, 5, 4], // front
        [2, 6, 3], [3, 6, 7], // back
        [0, 4, 2], [2, 4, 6], // left
        [1, 3, 5], [3, 7, 5], // right
    ];
    for [a, b, c] in faces {
        mesh.add_triangle(Triangle::new(a, b, c)).unwrap();
    }
    mesh
}

/// Model with one cube object placed once in the build
pub fn cube_model() -> (Model, ResourceId) {
    let mut model = Model::new();
    let id = model
        .add_resource(Object::mesh(cube_mesh(10.0)).with_name("cube"))
        .unwrap();
    model.add_build_item(BuildItem::new(id)).unwrap();
    (model, id)
}

pub fn write_to_vec(model: &Model, config: &mut WriterConfig) -> Vec<u8> {
    write_3mf(model, Cursor::new(Vec::new()), config)
        .unwrap()
        .into_inner()
}

pub fn read_from_slice(bytes: &[u8], config: &mut ParserConfig) -> Model {
    read_3mf(Cursor::new(bytes), config).unwrap().model
}

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Wraps content keys with AES-256-GCM under a key encryption key
///
/// Output layout: nonce, ciphertext, tag.
pub struct AesKeyWrapper {
    kek: [u8; 32],
    counter: u64,
}

impl AesKeyWrapper {
    pub fn new(kek: [u8; 32]) -> Self {
        Self { kek, counter: 0 }
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.kek))
    }
}

impl KeyWrapper for AesKeyWrapper {
    fn wrap(&mut self, _: &KeyWrapContext<'_>, input: &[u8], output: Option<&mut [u8]>) -> usize {
        let size = NONCE_LEN + input.len() + TAG_LEN;
        let Some(out) = output else {
            return size;
        };
        self.counter += 1;
        let mut nonce = [0u8; NONCE_LEN];
        nonce[..8].copy_from_slice(&self.counter.to_le_bytes());
        let mut body = input.to_vec();
        let Ok(tag) = self
            .cipher()
            .encrypt_in_place_detached(Nonce::from_slice(&nonce), b"", &mut body)
        else {
            return 0;
        };
        out[..NONCE_LEN].copy_from_slice(&nonce);
        out[NONCE_LEN..NONCE_LEN + body.len()].copy_from_slice(&body);
        out[NONCE_LEN + body.len()..size].copy_from_slice(&tag);
        size
    }

    fn unwrap(&mut self, _: &KeyWrapContext<'_>, input: &[u8], output: Option<&mut [u8]>) -> usize {
        if input.len() < NONCE_LEN + TAG_LEN {
            return 0;
        }
        let size = input.len() - NONCE_LEN - TAG_LEN;
        let Some(out) = output else {
            return size;
        };
        let (nonce, rest) = input.split_at(NONCE_LEN);
        let (body, tag) = rest.split_at(size);
        let mut plain = body.to_vec();
        let verified = self.cipher().decrypt_in_place_detached(
            Nonce::from_slice(nonce),
            b"",
            &mut plain,
            Tag::from_slice(tag),
        );
        if verified.is_err() {
            return 0;
        }
        out[..size].copy_from_slice(&plain);
        size
    }
}

/// AES-256-GCM content cipher
///
/// GCM needs the whole message, so the configs using it must hand parts
/// over in one chunk (see [`whole_part_chunks`]).
#[derive(Default)]
pub struct AesContentCipher {
    pending_tag: Option<Vec<u8>>,
    verified: bool,
}

/// Chunk size that keeps every part in a single chunk
pub fn whole_part_chunks() -> usize {
    usize::MAX
}

impl ContentCipher for AesContentCipher {
    fn encrypt(&mut self, ctx: &mut ContentContext<'_>, input: &[u8], output: Option<&mut [u8]>) -> usize {
        let Some(out) = output else {
            return input.len();
        };
        if input.is_empty() {
            return match self.pending_tag.take() {
                Some(tag) => {
                    ctx.params.tag = tag;
                    1
                }
                None => 0,
            };
        }
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&ctx.params.key));
        let mut body = input.to_vec();
        let Ok(tag) = cipher.encrypt_in_place_detached(
            Nonce::from_slice(&ctx.params.iv),
            &ctx.params.aad,
            &mut body,
        ) else {
            return 0;
        };
        self.pending_tag = Some(tag.to_vec());
        out.copy_from_slice(&body);
        body.len()
    }

    fn decrypt(&mut self, ctx: &mut ContentContext<'_>, input: &[u8], output: Option<&mut [u8]>) -> usize {
        let Some(out) = output else {
            return input.len();
        };
        if input.is_empty() {
            let ok = std::mem::take(&mut self.verified);
            return usize::from(ok);
        }
        if ctx.params.tag.len() != TAG_LEN {
            return 0;
        }
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&ctx.params.key));
        let mut body = input.to_vec();
        self.verified = cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(&ctx.params.iv),
                &ctx.params.aad,
                &mut body,
                Tag::from_slice(&ctx.params.tag),
            )
            .is_ok();
        out.copy_from_slice(&body);
        body.len()
    }
}
