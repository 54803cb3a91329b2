//! Read state shared by every part of one package read

use super::scope::XmlElement;
use crate::error::{Error, Result, Warning};
use crate::model::{Model, PropertyId, ResourceId, Transform};
use crate::opc::part_key;
use crate::progress::{ProgressMonitor, ProgressPhase};
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;
use tracing::warn;

/// Maps `(part, id attribute)` pairs to resource ids
///
/// Parts are keyed case-insensitively, as OPC part names are. A reference
/// to an id that has not been declared yet reserves a resource id. The
/// declaration later takes over the reserved id, so references resolve
/// regardless of document order.
#[derive(Debug, Default)]
pub(crate) struct IdResolver {
    declared: BTreeMap<(String, u32), ResourceId>,
    /// Reserved ids with the part name as first referenced
    pending: BTreeMap<(String, u32), (ResourceId, String)>,
}

impl IdResolver {
    /// Bind a declared id
    pub fn declare(&mut self, model: &mut Model, part: &str, model_id: u32) -> Result<ResourceId> {
        let key = (part_key(part), model_id);
        if self.declared.contains_key(&key) {
            return Err(Error::DuplicateResourceId(format!(
                "id {} declared twice in {}",
                model_id, part
            )));
        }
        let id = match self.pending.remove(&key) {
            Some((id, _)) => id,
            None => model.allocate_id(),
        };
        self.declared.insert(key, id);
        Ok(id)
    }

    /// Resource id a reference points to, reserving one for forward references
    pub fn resolve(&mut self, model: &mut Model, part: &str, model_id: u32) -> ResourceId {
        let key = (part_key(part), model_id);
        if let Some(id) = self.declared.get(&key) {
            return *id;
        }
        self.pending
            .entry(key)
            .or_insert_with(|| (model.allocate_id(), part.to_string()))
            .0
    }

    /// First reference into `part` (or any part) that was never declared
    pub fn unresolved(&self, part: Option<&str>) -> Option<(&str, u32)> {
        let want = part.map(part_key);
        self.pending
            .iter()
            .find(|((key, _), _)| want.as_ref().is_none_or(|want| want == key))
            .map(|((_, id), (_, name))| (name.as_str(), *id))
    }
}

/// Mutable state of one read: the model under construction, warnings,
/// reference resolution and progress
#[derive(Debug)]
pub(crate) struct ReadState {
    pub model: Model,
    pub warnings: Vec<Warning>,
    pub strict: bool,
    pub ids: IdResolver,
    pub progress: ProgressMonitor,
    /// Custom namespace URIs actually met in the document
    pub used_custom: HashSet<String>,
}

impl ReadState {
    pub fn new(strict: bool, progress: ProgressMonitor) -> Self {
        Self {
            model: Model::new(),
            warnings: Vec::new(),
            strict,
            ids: IdResolver::default(),
            progress,
            used_custom: HashSet::new(),
        }
    }

    /// Record a recoverable condition, or fail when strict
    pub fn warn(&mut self, code: u32, message: impl Into<String>) -> Result<()> {
        let warning = Warning::new(code, message);
        if self.strict {
            return Err(Error::Strict(warning));
        }
        warn!(code = warning.code, message = %warning.message, "read warning");
        self.warnings.push(warning);
        Ok(())
    }

    pub fn tick(&mut self, phase: ProgressPhase) -> Result<()> {
        self.progress.tick(phase)
    }

    pub fn declare(&mut self, part: &str, model_id: u32) -> Result<ResourceId> {
        self.ids.declare(&mut self.model, part, model_id)
    }

    pub fn resolve(&mut self, part: &str, model_id: u32) -> ResourceId {
        self.ids.resolve(&mut self.model, part, model_id)
    }

    /// Optional attribute parsed with `FromStr`; malformed values are a
    /// warning and read as absent
    pub fn opt<T: FromStr>(&mut self, el: &XmlElement, name: &str) -> Result<Option<T>> {
        self.parse_value(&el.local, name, el.attr(name))
    }

    /// Namespaced variant of [`ReadState::opt`]
    pub fn opt_ns<T: FromStr>(&mut self, el: &XmlElement, ns: &str, name: &str) -> Result<Option<T>> {
        self.parse_value(&el.local, name, el.attr_ns(ns, name))
    }

    fn parse_value<T: FromStr>(&mut self, element: &str, name: &str, raw: Option<&str>) -> Result<Option<T>> {
        let Some(raw) = raw else {
            return Ok(None);
        };
        match raw.trim().parse::<T>() {
            Ok(v) => Ok(Some(v)),
            Err(_) => {
                self.warn(
                    2005,
                    format!("<{}> attribute {}='{}' is malformed, ignored", element, name, raw),
                )?;
                Ok(None)
            }
        }
    }

    /// Attribute that must be present; a malformed value is a warning and
    /// reads as `default`
    pub fn required_or<T: FromStr>(&mut self, el: &XmlElement, name: &str, default: T) -> Result<T> {
        el.require(name)?;
        Ok(self.opt(el, name)?.unwrap_or(default))
    }

    /// Mandatory coordinate
    pub fn coord(&mut self, el: &XmlElement, name: &str) -> Result<f64> {
        el.require(name)?;
        Ok(self.float(el, name)?.unwrap_or(0.0))
    }

    /// Optional attribute with a default
    pub fn or<T: FromStr>(&mut self, el: &XmlElement, name: &str, default: T) -> Result<T> {
        Ok(self.opt(el, name)?.unwrap_or(default))
    }

    /// Finite floating point attribute; non-finite values are a warning
    pub fn float(&mut self, el: &XmlElement, name: &str) -> Result<Option<f64>> {
        match self.opt::<f64>(el, name)? {
            Some(v) if !v.is_finite() => {
                self.warn(
                    2005,
                    format!("<{}> attribute {} is not a finite number", el.local, name),
                )?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Mandatory floating point attribute
    pub fn req_float(&mut self, el: &XmlElement, name: &str) -> Result<f64> {
        let raw = el.require(name)?;
        let value = raw
            .trim()
            .parse::<f64>()
            .map_err(|_| Error::parse_error_with_context(name, raw, "a number"))?;
        if !value.is_finite() {
            return Err(Error::parse_error_with_context(name, raw, "a finite number"));
        }
        Ok(value)
    }

    /// Property index attribute; XML indices are zero based, property ids
    /// start at 1
    pub fn prop(&mut self, el: &XmlElement, name: &str) -> Result<Option<PropertyId>> {
        Ok(self.opt::<u32>(el, name)?.map(index_to_property))
    }

    /// Transform attribute
    pub fn transform(&mut self, el: &XmlElement, name: &str) -> Result<Option<Transform>> {
        self.opt::<Transform>(el, name)
    }
}

/// Zero-based XML property index to a property id
pub(crate) fn index_to_property(index: u32) -> PropertyId {
    PropertyId(index.saturating_add(1))
}

/// Mandatory unsigned index attribute; malformed values are fatal
pub(crate) fn req_index(el: &XmlElement, name: &str) -> Result<u32> {
    let raw = el.require(name)?;
    raw.trim()
        .parse::<u32>()
        .map_err(|_| Error::parse_error_with_context(name, raw, "an unsigned index"))
}

/// Resource id attribute value
pub(crate) fn parse_model_id(el: &XmlElement, name: &str, raw: &str) -> Result<u32> {
    let id = raw.trim().parse::<u32>().map_err(|_| {
        Error::parse_error_with_context(&format!("{}@{}", el.local, name), raw, "a resource id")
    })?;
    if id == 0 {
        return Err(Error::invalid_xml_element(&el.local, "resource ids start at 1"));
    }
    Ok(id)
}

/// Whitespace separated list of numbers
pub(crate) fn parse_list<T: FromStr>(el: &XmlElement, name: &str, raw: &str) -> Result<Vec<T>> {
    raw.split_ascii_whitespace()
        .map(|tok| {
            tok.parse::<T>()
                .map_err(|_| Error::parse_error_with_context(&format!("{}@{}", el.local, name), tok, "a number list"))
        })
        .collect()
}
