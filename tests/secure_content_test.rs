//! Protected parts written and read through host key wrappers and ciphers

mod common;

use common::{AesContentCipher, AesKeyWrapper, cube_mesh, init_tracing, whole_part_chunks, write_to_vec};
use lib3mf_engine::keystore::{
    Compression, Consumer, EncryptionAlgorithm, KekParams, KeyStore, KeyWrapContext, KeyWrapper,
};
use lib3mf_engine::model::{BuildItem, Model, Object};
use lib3mf_engine::{ParserConfig, WriterConfig, read_3mf};
use std::io::{Cursor, Read, Write};

const SECRET_PART: &str = "/3D/secret.model";
const PRINTER_KEK: [u8; 32] = [7; 32];

fn protected_model(compression: Compression) -> Model {
    let mut model = Model::new();
    let id = model
        .add_resource_in_part(SECRET_PART, Object::mesh(cube_mesh(3.0)).with_name("hidden"))
        .unwrap();
    model.add_build_item(BuildItem::new(id)).unwrap();

    let mut store = KeyStore::new();
    store.add_consumer(Consumer::new("printer")).unwrap();
    let group = store.add_resource_data_group();
    store
        .add_access_right(&group, "printer", KekParams::default())
        .unwrap();
    store
        .add_resource_data(
            &group,
            SECRET_PART,
            EncryptionAlgorithm::Aes256Gcm,
            compression,
            b"lib3mf-engine".to_vec(),
        )
        .unwrap();
    model.keystore = Some(store);
    model
}

fn writer_config() -> WriterConfig {
    WriterConfig::new()
        .with_key_wrapper("printer", Box::new(AesKeyWrapper::new(PRINTER_KEK)))
        .with_content_cipher(Box::new(AesContentCipher::default()))
        .with_chunk_size(whole_part_chunks())
}

fn reader_config(kek: [u8; 32]) -> ParserConfig {
    let mut config = ParserConfig::new()
        .with_key_wrapper("printer", Box::new(AesKeyWrapper::new(kek)))
        .with_content_cipher(Box::new(AesContentCipher::default()));
    config.secure_callbacks().set_chunk_size(whole_part_chunks());
    config
}

fn read_err(bytes: &[u8], config: &mut ParserConfig) -> u32 {
    read_3mf(Cursor::new(bytes), config).err().unwrap().code()
}

/// Raw bytes of a package entry
fn entry(bytes: &[u8], name: &str) -> Vec<u8> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut file = archive.by_name(name).unwrap();
    let mut data = Vec::new();
    file.read_to_end(&mut data).unwrap();
    data
}

/// Copy of a package with one entry's bytes changed
fn rewrite_entry(bytes: &[u8], name: &str, change: impl Fn(&mut Vec<u8>)) -> Vec<u8> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut out = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).unwrap();
        let entry_name = file.name().to_string();
        let mut data = Vec::new();
        file.read_to_end(&mut data).unwrap();
        if entry_name == name {
            change(&mut data);
        }
        out.start_file(entry_name, zip::write::SimpleFileOptions::default())
            .unwrap();
        out.write_all(&data).unwrap();
    }
    out.finish().unwrap().into_inner()
}

#[test]
fn test_protected_part_round_trip() {
    init_tracing();
    for compression in [Compression::None, Compression::Deflate] {
        let model = protected_model(compression);
        let bytes = write_to_vec(&model, &mut writer_config());

        let sealed = entry(&bytes, "3D/secret.model");
        assert!(!sealed.windows(6).any(|w| w == b"<model"));

        let out = read_3mf(Cursor::new(bytes.as_slice()), &mut reader_config(PRINTER_KEK)).unwrap();
        assert!(out.warnings.is_empty(), "{:?}", out.warnings);
        let back = out.model;
        let id = back.build().items()[0].object;
        assert_eq!(back.resource(id).unwrap().part(), SECRET_PART);
        assert_eq!(back.object(id).unwrap().name.as_deref(), Some("hidden"));
        assert_eq!(
            back.mesh(id).unwrap(),
            model.mesh(model.build().items()[0].object).unwrap()
        );

        let store = back.keystore.as_ref().unwrap();
        assert!(store.is_protected(SECRET_PART));
        assert_eq!(store.consumer("printer").unwrap().id, "printer");
        let (_, data) = store.find_resource_data(SECRET_PART).unwrap();
        assert_eq!(data.cek_params.compression, compression);
    }
}

#[test]
fn test_keystore_part_is_listed() {
    let bytes = write_to_vec(&protected_model(Compression::None), &mut writer_config());
    let rels = String::from_utf8(entry(&bytes, "_rels/.rels")).unwrap();
    assert!(rels.contains("/Secure/keystore.xml"));
    let keystore = String::from_utf8(entry(&bytes, "Secure/keystore.xml")).unwrap();
    assert!(keystore.contains("consumerid=\"printer\""));
    assert!(keystore.contains("/3D/secret.model"));
}

#[test]
fn test_wrong_consumer_key_fails_unwrap() {
    let bytes = write_to_vec(&protected_model(Compression::None), &mut writer_config());
    assert_eq!(read_err(&bytes, &mut reader_config([8; 32])), 5005);
}

#[test]
fn test_missing_callbacks() {
    let bytes = write_to_vec(&protected_model(Compression::None), &mut writer_config());

    let mut no_cipher = ParserConfig::new()
        .with_key_wrapper("printer", Box::new(AesKeyWrapper::new(PRINTER_KEK)));
    assert_eq!(read_err(&bytes, &mut no_cipher), 5003);

    let mut no_wrapper = ParserConfig::new().with_content_cipher(Box::new(AesContentCipher::default()));
    assert_eq!(read_err(&bytes, &mut no_wrapper), 5003);

    let model = protected_model(Compression::None);
    let mut no_wrapper = WriterConfig::new().with_content_cipher(Box::new(AesContentCipher::default()));
    let err = lib3mf_engine::write_3mf(&model, Cursor::new(Vec::new()), &mut no_wrapper)
        .err()
        .unwrap();
    assert_eq!(err.code(), 5002);
}

#[test]
fn test_tampered_content_fails_verification() {
    let bytes = write_to_vec(&protected_model(Compression::None), &mut writer_config());
    let tampered = rewrite_entry(&bytes, "3D/secret.model", |data| data[0] ^= 0x40);
    assert_eq!(read_err(&tampered, &mut reader_config(PRINTER_KEK)), 5008);
}

/// Reports a larger write than the buffer it was handed
struct OversizedWrapper;

impl KeyWrapper for OversizedWrapper {
    fn wrap(&mut self, _: &KeyWrapContext<'_>, input: &[u8], output: Option<&mut [u8]>) -> usize {
        match output {
            None => input.len(),
            Some(buf) => buf.len() + 16,
        }
    }

    fn unwrap(&mut self, _: &KeyWrapContext<'_>, _: &[u8], _: Option<&mut [u8]>) -> usize {
        0
    }
}

#[test]
fn test_oversized_callback_result() {
    let model = protected_model(Compression::None);
    let mut config = WriterConfig::new()
        .with_key_wrapper("printer", Box::new(OversizedWrapper))
        .with_content_cipher(Box::new(AesContentCipher::default()));
    let err = lib3mf_engine::write_3mf(&model, Cursor::new(Vec::new()), &mut config)
        .err()
        .unwrap();
    assert_eq!(err.code(), 5009);
}

#[test]
fn test_read_model_can_be_written_again() {
    let bytes = write_to_vec(&protected_model(Compression::Deflate), &mut writer_config());
    let back = read_3mf(Cursor::new(bytes.as_slice()), &mut reader_config(PRINTER_KEK))
        .unwrap()
        .model;

    let again = write_to_vec(&back, &mut writer_config());
    let out = read_3mf(Cursor::new(again.as_slice()), &mut reader_config(PRINTER_KEK)).unwrap();
    let id = out.model.build().items()[0].object;
    assert_eq!(out.model.mesh(id).unwrap().triangle_count(), 12);
}
