//! `<keystore>` part codec

use super::{
    CekParams, Compression, Consumer, EncryptionAlgorithm, KekParams, KeyStore, ResourceData,
};
use crate::error::{Error, Result};
use crate::model::normalize_part_name;
use crate::namespaces::{SECURE_CONTENT, SECURE_CONTENT_2019_04, XML_ENC};
use crate::parser::scope::{NamespaceScope, XmlElement, general_ref, text_content};
use crate::writer::emit::XmlSink;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextField {
    KeyValue,
    CipherValue,
    Iv,
    Tag,
    Aad,
}

#[derive(Default)]
struct PendingRight {
    consumer_index: usize,
    kek_params: Option<KekParams>,
    wrapped_key: Vec<u8>,
}

struct PendingData {
    path: String,
    cek_params: Option<CekParams>,
}

fn decode_base64(field: &str, text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64
        .decode(compact.as_bytes())
        .map_err(|e| Error::InvalidSecureContent(format!("invalid base64 in <{}>: {}", field, e)))
}

fn parse_kek_params(e: &XmlElement) -> Result<KekParams> {
    let wrapping_algorithm = e.require("wrappingalgorithm")?.parse()?;
    let mgf_algorithm = e.attr("mgfalgorithm").map(str::parse).transpose()?;
    let digest_method = e.attr("digestmethod").map(str::parse).transpose()?;
    Ok(KekParams {
        wrapping_algorithm,
        mgf_algorithm,
        digest_method,
    })
}

fn parse_cek_params(e: &XmlElement) -> Result<CekParams> {
    let algorithm: EncryptionAlgorithm = e.require("encryptionalgorithm")?.parse()?;
    let compression: Compression = e.attr("compression").unwrap_or("none").parse()?;
    Ok(CekParams {
        algorithm,
        compression,
        iv: Vec::new(),
        tag: Vec::new(),
        aad: Vec::new(),
    })
}

/// Parse a keystore part
pub(crate) fn read_keystore(data: &[u8]) -> Result<KeyStore> {
    let mut reader = Reader::from_reader(data);
    reader.config_mut().trim_text(true);

    let mut scope = NamespaceScope::new();
    let mut buf = Vec::with_capacity(4096);
    let mut store: Option<KeyStore> = None;
    let mut consumer: Option<Consumer> = None;
    let mut group: Option<String> = None;
    let mut right: Option<PendingRight> = None;
    let mut resource: Option<PendingData> = None;
    let mut field: Option<TextField> = None;
    let mut text = String::new();
    let mut paths = HashSet::new();

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let el = scope.push(e)?;
                let ns = el.ns.as_str();
                let own = ns == SECURE_CONTENT || ns == SECURE_CONTENT_2019_04;
                match (own, el.local.as_str()) {
                    (true, "keystore") => {
                        let uuid = el.require("UUID")?.to_string();
                        store = Some(KeyStore::with_uuid(uuid));
                    }
                    (true, "consumer") => {
                        let id = el.require("consumerid")?.to_string();
                        consumer = Some(Consumer {
                            id,
                            key_id: el.attr("keyid").map(str::to_string),
                            key_value: None,
                        });
                    }
                    (true, "keyvalue") => field = Some(TextField::KeyValue),
                    (true, "resourcedatagroup") => {
                        let key_uuid = el.require("keyuuid")?.to_string();
                        keystore_mut(&mut store)?.push_group(key_uuid.clone())?;
                        group = Some(key_uuid);
                    }
                    (true, "accessright") => {
                        let index = el.require("consumerindex")?;
                        let consumer_index = index.parse::<usize>().map_err(|_| {
                            Error::parse_error_with_context("consumerindex", index, "an index")
                        })?;
                        right = Some(PendingRight {
                            consumer_index,
                            ..PendingRight::default()
                        });
                    }
                    (true, "kekparams") => {
                        let params = parse_kek_params(&el)?;
                        if let Some(r) = right.as_mut() {
                            r.kek_params = Some(params);
                        }
                    }
                    (true, "cipherdata") => {}
                    (false, "CipherValue") if ns == XML_ENC => field = Some(TextField::CipherValue),
                    (true, "resourcedata") => {
                        let path = el.require("path")?.trim();
                        if path.is_empty() {
                            return Err(Error::InvalidSecureContent(
                                "resourcedata path must not be empty".to_string(),
                            ));
                        }
                        let path = normalize_part_name(path);
                        if !paths.insert(path.to_ascii_lowercase()) {
                            return Err(Error::InvalidSecureContent(format!(
                                "duplicate resourcedata path '{}'",
                                path
                            )));
                        }
                        resource = Some(PendingData {
                            path,
                            cek_params: None,
                        });
                    }
                    (true, "cekparams") => {
                        let params = parse_cek_params(&el)?;
                        if let Some(r) = resource.as_mut() {
                            r.cek_params = Some(params);
                        }
                    }
                    (true, "iv") => field = Some(TextField::Iv),
                    (true, "tag") => field = Some(TextField::Tag),
                    (true, "aad") => field = Some(TextField::Aad),
                    _ => debug!(element = %el.local, "skipping unknown keystore element"),
                }
                text.clear();
                if is_empty {
                    let name = el.local.clone();
                    close_element(
                        &name,
                        &mut store,
                        &mut consumer,
                        &mut group,
                        &mut right,
                        &mut resource,
                        &mut field,
                        &text,
                    )?;
                    scope.pop();
                }
            }
            Event::Text(ref t) => {
                if field.is_some() {
                    text.push_str(&text_content(t)?);
                }
            }
            Event::GeneralRef(ref r) => {
                if field.is_some() {
                    text.push_str(&general_ref(r)?);
                }
            }
            Event::End(ref e) => {
                let qname = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let local = qname.rsplit(':').next().unwrap_or(&qname).to_string();
                close_element(
                    &local,
                    &mut store,
                    &mut consumer,
                    &mut group,
                    &mut right,
                    &mut resource,
                    &mut field,
                    &text,
                )?;
                text.clear();
                scope.pop();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let store =
        store.ok_or_else(|| Error::InvalidSecureContent("missing <keystore> root".to_string()))?;
    store.validate()?;
    Ok(store)
}

fn keystore_mut(store: &mut Option<KeyStore>) -> Result<&mut KeyStore> {
    store
        .as_mut()
        .ok_or_else(|| Error::InvalidSecureContent("element outside <keystore>".to_string()))
}

#[allow(clippy::too_many_arguments)]
fn close_element(
    local: &str,
    store: &mut Option<KeyStore>,
    consumer: &mut Option<Consumer>,
    group: &mut Option<String>,
    right: &mut Option<PendingRight>,
    resource: &mut Option<PendingData>,
    field: &mut Option<TextField>,
    text: &str,
) -> Result<()> {
    match (local, *field) {
        ("keyvalue", Some(TextField::KeyValue)) => {
            if let Some(c) = consumer.as_mut() {
                c.key_value = Some(text.to_string());
            }
            *field = None;
        }
        ("CipherValue", Some(TextField::CipherValue)) => {
            if let Some(r) = right.as_mut() {
                r.wrapped_key = decode_base64("CipherValue", text)?;
            }
            *field = None;
        }
        ("iv", Some(TextField::Iv)) | ("tag", Some(TextField::Tag)) | ("aad", Some(TextField::Aad)) => {
            let bytes = decode_base64(local, text)?;
            if let Some(cek) = resource.as_mut().and_then(|r| r.cek_params.as_mut()) {
                match local {
                    "iv" => cek.iv = bytes,
                    "tag" => cek.tag = bytes,
                    _ => cek.aad = bytes,
                }
            }
            *field = None;
        }
        ("consumer", _) => {
            if let Some(c) = consumer.take() {
                keystore_mut(store)?.add_consumer(c)?;
            }
        }
        ("accessright", _) => {
            if let Some(r) = right.take() {
                let ks = keystore_mut(store)?;
                let consumer_id = ks
                    .consumers()
                    .get(r.consumer_index)
                    .map(|c| c.id.clone())
                    .ok_or_else(|| {
                        Error::InvalidSecureContent(format!(
                            "consumerindex {} does not name a consumer",
                            r.consumer_index
                        ))
                    })?;
                let kek_params = r.kek_params.ok_or_else(|| {
                    Error::InvalidSecureContent("accessright without <kekparams>".to_string())
                })?;
                let key_uuid = group.as_deref().ok_or_else(|| {
                    Error::InvalidSecureContent("accessright outside a group".to_string())
                })?;
                ks.push_access_right(key_uuid, consumer_id, kek_params, r.wrapped_key)?;
            }
        }
        ("resourcedata", _) => {
            if let Some(r) = resource.take() {
                let cek_params = r.cek_params.ok_or_else(|| {
                    Error::InvalidSecureContent(format!("resourcedata '{}' without <cekparams>", r.path))
                })?;
                let key_uuid = group.as_deref().ok_or_else(|| {
                    Error::InvalidSecureContent("resourcedata outside a group".to_string())
                })?;
                keystore_mut(store)?.push_resource_data(
                    key_uuid,
                    ResourceData {
                        path: r.path,
                        cek_params,
                    },
                )?;
            }
        }
        ("resourcedatagroup", _) => *group = None,
        _ => {}
    }
    Ok(())
}

/// Serialize a keystore part
pub(crate) fn write_keystore(store: &KeyStore) -> Result<Vec<u8>> {
    let mut sink = XmlSink::new(Vec::new());
    sink.decl()?;

    let mut root = BytesStart::new("keystore");
    root.push_attribute(("xmlns", SECURE_CONTENT));
    root.push_attribute(("xmlns:xenc", XML_ENC));
    root.push_attribute(("UUID", store.uuid.as_str()));
    sink.start(root)?;

    for consumer in store.consumers() {
        let mut e = BytesStart::new("consumer");
        e.push_attribute(("consumerid", consumer.id.as_str()));
        if let Some(key_id) = &consumer.key_id {
            e.push_attribute(("keyid", key_id.as_str()));
        }
        match &consumer.key_value {
            Some(value) => {
                sink.start(e)?;
                sink.text_element(BytesStart::new("keyvalue"), value)?;
                sink.end("consumer")?;
            }
            None => sink.empty(e)?,
        }
    }

    for group in store.groups() {
        let mut e = BytesStart::new("resourcedatagroup");
        e.push_attribute(("keyuuid", group.key_uuid.as_str()));
        sink.start(e)?;

        for right in group.access_rights() {
            let index = store
                .consumers()
                .iter()
                .position(|c| c.id == right.consumer_id)
                .ok_or_else(|| {
                    Error::InvalidSecureContent(format!("unknown consumer '{}'", right.consumer_id))
                })?;
            let mut e = BytesStart::new("accessright");
            e.push_attribute(("consumerindex", index.to_string().as_str()));
            sink.start(e)?;

            let mut kek = BytesStart::new("kekparams");
            kek.push_attribute(("wrappingalgorithm", right.kek_params.wrapping_algorithm.as_uri()));
            if let Some(mgf) = right.kek_params.mgf_algorithm {
                kek.push_attribute(("mgfalgorithm", mgf.as_uri()));
            }
            if let Some(digest) = right.kek_params.digest_method {
                kek.push_attribute(("digestmethod", digest.as_uri()));
            }
            sink.empty(kek)?;

            sink.start(BytesStart::new("cipherdata"))?;
            sink.text_element(
                BytesStart::new("xenc:CipherValue"),
                &BASE64.encode(right.wrapped_key()),
            )?;
            sink.end("cipherdata")?;
            sink.end("accessright")?;
        }

        for data in group.resource_data() {
            let mut e = BytesStart::new("resourcedata");
            e.push_attribute(("path", data.path.as_str()));
            sink.start(e)?;

            let cek = &data.cek_params;
            let mut params = BytesStart::new("cekparams");
            params.push_attribute(("encryptionalgorithm", cek.algorithm.as_uri()));
            params.push_attribute(("compression", cek.compression.as_str()));
            sink.start(params)?;
            sink.text_element(BytesStart::new("iv"), &BASE64.encode(&cek.iv))?;
            sink.text_element(BytesStart::new("tag"), &BASE64.encode(&cek.tag))?;
            if !cek.aad.is_empty() {
                sink.text_element(BytesStart::new("aad"), &BASE64.encode(&cek.aad))?;
            }
            sink.end("cekparams")?;
            sink.end("resourcedata")?;
        }

        sink.end("resourcedatagroup")?;
    }

    sink.end("keystore")?;
    Ok(sink.into_inner())
}
