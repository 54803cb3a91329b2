//! OPC (Open Packaging Conventions) container I/O
//!
//! A 3MF file is a ZIP archive of named parts. `[Content_Types].xml` maps
//! parts to MIME types and `.rels` parts link sources to targets with typed
//! relationships. [`Package`] reads such a container, [`PackageWriter`]
//! assembles one.

mod content_types;
mod reader;
mod relationships;
mod validation;
mod writer;

pub use content_types::ContentTypes;
pub use reader::Package;
pub use relationships::Relationship;
pub use writer::{PackageWriter, PartSink};

pub(crate) use relationships::rels_path_for;
pub(crate) use validation::{part_key, validate_part_name};

/// Content types part
pub const CONTENT_TYPES_PART: &str = "/[Content_Types].xml";

/// Package relationships part
pub const ROOT_RELS_PART: &str = "/_rels/.rels";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::io::{Cursor, Write};
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    const CONTENT_TYPES: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="model" ContentType="application/vnd.ms-package.3dmanufacturing-3dmodel+xml"/>
</Types>"#;

    fn zip_of(entries: &[(&str, &[u8])]) -> Cursor<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        let mut cursor = zip.finish().unwrap();
        cursor.set_position(0);
        cursor
    }

    fn rels_to(target: &str) -> Vec<u8> {
        format!(
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Target="{}" Id="rel0" Type="http://schemas.microsoft.com/3dmanufacturing/2013/01/3dmodel"/>
</Relationships>"#,
            target
        )
        .into_bytes()
    }

    #[test]
    fn test_empty_zip_is_rejected() {
        assert!(Package::open(zip_of(&[])).is_err());
    }

    #[test]
    fn test_missing_root_model_relationship() {
        let rels = br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"/>"#;
        let err = Package::open(zip_of(&[
            ("[Content_Types].xml", CONTENT_TYPES),
            ("_rels/.rels", rels),
        ]))
        .err()
        .unwrap();
        assert!(matches!(err, Error::MissingRootModel(_)));
        assert_eq!(err.code(), 1005);
    }

    #[test]
    fn test_percent_encoded_root_target() {
        let rels = rels_to("/2D/test%C3%86file.model");
        let p = Package::open(zip_of(&[
            ("[Content_Types].xml", CONTENT_TYPES),
            ("_rels/.rels", &rels),
            ("2D/testÆfile.model", b"<model/>"),
        ]))
        .unwrap();
        assert_eq!(p.root_model_path(), "/2D/testÆfile.model");
    }

    #[test]
    fn test_case_insensitive_duplicates() {
        let rels = rels_to("/3D/3dmodel.model");
        let err = Package::open(zip_of(&[
            ("[Content_Types].xml", CONTENT_TYPES),
            ("_rels/.rels", &rels),
            ("3D/3dmodel.model", b"<model/>"),
            ("3D/3DModel.model", b"<model/>"),
        ]))
        .err()
        .unwrap();
        assert!(matches!(err, Error::DuplicatePart(_)));
    }

    #[test]
    fn test_garbage_is_corrupt_container() {
        let err = Package::open(Cursor::new(b"not a zip at all".to_vec()))
            .err()
            .unwrap();
        assert_eq!(err.code(), 1004);
    }
}
