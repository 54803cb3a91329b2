//! Binary package parts carried alongside the model

use crate::namespaces::{JPEG_CONTENT_TYPE, PNG_CONTENT_TYPE, TEXTURE_CONTENT_TYPE};

/// A non-model part: texture, image sheet, thumbnail or custom payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Absolute part name, e.g. `/3D/Texture/wood.png`
    pub path: String,
    /// Relationship type linking the part from its source
    pub relationship_type: String,
    /// MIME content type
    pub content_type: String,
    /// Raw bytes
    pub data: Vec<u8>,
}

impl Attachment {
    /// Create an attachment, deriving the content type from the file extension
    pub fn new(path: impl Into<String>, relationship_type: impl Into<String>, data: Vec<u8>) -> Self {
        let path = normalize_part_name(&path.into());
        let content_type = content_type_for(&path).to_string();
        Self {
            path,
            relationship_type: relationship_type.into(),
            content_type,
            data,
        }
    }
}

/// Best-effort content type for a part name
pub fn content_type_for(path: &str) -> &'static str {
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(".png") {
        PNG_CONTENT_TYPE
    } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        JPEG_CONTENT_TYPE
    } else {
        TEXTURE_CONTENT_TYPE
    }
}

/// Part names are absolute inside the model
pub(crate) fn normalize_part_name(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_from_extension() {
        let a = Attachment::new("3D/Texture/a.PNG", "rel", vec![1, 2]);
        assert_eq!(a.path, "/3D/Texture/a.PNG");
        assert_eq!(a.content_type, "image/png");
        assert_eq!(content_type_for("/x.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("/x.bin"), TEXTURE_CONTENT_TYPE);
    }
}
