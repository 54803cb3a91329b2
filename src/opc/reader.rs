//! Reading an OPC container

use super::content_types::ContentTypes;
use super::relationships::{Relationship, parse_relationships, rels_path_for};
use super::validation::{part_key, validate_part_name};
use super::{CONTENT_TYPES_PART, ROOT_RELS_PART};
use crate::error::{Error, Result};
use crate::namespaces::MODEL_REL_TYPE;
use std::collections::HashMap;
use std::io::{Read, Seek};
use tracing::{debug, trace};
use zip::ZipArchive;

/// An opened 3MF package
///
/// Opening indexes every entry by case-insensitive part name, parses the
/// content types and package relationships, and locates the root model.
pub struct Package<R: Read + Seek> {
    archive: ZipArchive<R>,
    index: HashMap<String, usize>,
    names: Vec<String>,
    content_types: ContentTypes,
    root_rels: Vec<Relationship>,
    root_model: String,
}

impl<R: Read + Seek> Package<R> {
    /// Open a container
    pub fn open(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let mut index = HashMap::with_capacity(archive.len());
        let mut names = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let entry = archive.by_index_raw(i)?;
            if entry.is_dir() {
                continue;
            }
            let name = format!("/{}", entry.name().trim_start_matches('/'));
            drop(entry);
            if index.insert(part_key(&name), i).is_some() {
                return Err(Error::DuplicatePart(name));
            }
            names.push(name);
        }
        debug!(entries = names.len(), "opened container");

        let mut package = Self {
            archive,
            index,
            names,
            content_types: ContentTypes::new(),
            root_rels: Vec::new(),
            root_model: String::new(),
        };

        let ct = package
            .read_optional(CONTENT_TYPES_PART)?
            .ok_or_else(|| Error::InvalidPackage(format!("missing {}", CONTENT_TYPES_PART)))?;
        package.content_types = ContentTypes::parse(&ct)?;

        let rels = package
            .read_optional(ROOT_RELS_PART)?
            .ok_or_else(|| Error::MissingRootModel(format!("missing {}", ROOT_RELS_PART)))?;
        package.root_rels = parse_relationships(&rels, None)?;

        let mut starts = package
            .root_rels
            .iter()
            .filter(|r| r.rel_type == MODEL_REL_TYPE);
        let root = starts
            .next()
            .ok_or_else(|| Error::MissingRootModel("no 3D model relationship".to_string()))?
            .target
            .clone();
        if starts.next().is_some() {
            return Err(Error::InvalidPackage(
                "more than one 3D model relationship".to_string(),
            ));
        }
        if !package.has_part(&root) {
            return Err(Error::MissingRootModel(format!(
                "root model relationship targets missing part {}",
                root
            )));
        }
        for rel in &package.root_rels {
            if !package.has_part(&rel.target) {
                return Err(Error::MissingPart(format!(
                    "relationship {} targets {}",
                    rel.id, rel.target
                )));
            }
        }
        package.root_model = root;
        trace!(root = %package.root_model, "located root model");
        Ok(package)
    }

    /// Part name of the root model
    pub fn root_model_path(&self) -> &str {
        &self.root_model
    }

    /// Relationships of the package itself
    pub fn root_relationships(&self) -> &[Relationship] {
        &self.root_rels
    }

    /// Relationships whose source is `part`; empty when it has no `.rels`
    pub fn relationships_of(&mut self, part: &str) -> Result<Vec<Relationship>> {
        let rels_part = rels_path_for(Some(part));
        match self.read_optional(&rels_part)? {
            Some(data) => parse_relationships(&data, Some(part)),
            None => Ok(Vec::new()),
        }
    }

    /// Whether a part exists, ignoring case
    pub fn has_part(&self, part: &str) -> bool {
        self.index.contains_key(&part_key(part))
    }

    /// All part names in archive order
    pub fn part_names(&self) -> &[String] {
        &self.names
    }

    /// Content type of a part
    pub fn content_type(&self, part: &str) -> Option<&str> {
        self.content_types.content_type_of(part)
    }

    /// Read a whole part
    pub fn read_part(&mut self, part: &str) -> Result<Vec<u8>> {
        self.read_optional(part)?
            .ok_or_else(|| Error::MissingPart(part.to_string()))
    }

    /// Stream a part
    pub fn open_part(&mut self, part: &str) -> Result<impl Read + '_> {
        validate_part_name(part)?;
        let i = *self
            .index
            .get(&part_key(part))
            .ok_or_else(|| Error::MissingPart(part.to_string()))?;
        Ok(self.archive.by_index(i)?)
    }

    fn read_optional(&mut self, part: &str) -> Result<Option<Vec<u8>>> {
        let Some(&i) = self.index.get(&part_key(part)) else {
            return Ok(None);
        };
        let mut entry = self.archive.by_index(i)?;
        let mut data = Vec::with_capacity(entry.size().min(1 << 26) as usize);
        entry.read_to_end(&mut data)?;
        trace!(part, bytes = data.len(), "read part");
        Ok(Some(data))
    }
}
