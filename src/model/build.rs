//! Build section: placements of objects in the print volume

use super::ResourceId;
use super::custom::AnyAttribute;
use super::metadata::MetadataGroup;
use super::transform::Transform;

/// A placement of one object
#[derive(Debug, Clone, PartialEq)]
pub struct BuildItem {
    /// Placed object
    pub object: ResourceId,
    /// Placement in build space
    pub transform: Option<Transform>,
    /// Part number
    pub part_number: Option<String>,
    /// Production extension UUID, unique across the build
    pub uuid: Option<String>,
    /// Item metadata
    pub metadata: MetadataGroup,
    /// Attributes in preserved custom namespaces
    pub custom_attributes: Vec<AnyAttribute>,
}

impl BuildItem {
    /// Item placing `object` without a transform
    pub fn new(object: ResourceId) -> Self {
        Self {
            object,
            transform: None,
            part_number: None,
            uuid: None,
            metadata: MetadataGroup::new(),
            custom_attributes: Vec::new(),
        }
    }

    /// Item with a transform
    pub fn with_transform(object: ResourceId, transform: Transform) -> Self {
        Self {
            transform: Some(transform),
            ..Self::new(object)
        }
    }

    /// Effective transform, identity when absent
    pub fn effective_transform(&self) -> Transform {
        self.transform.unwrap_or(Transform::IDENTITY)
    }
}

/// `<build>` element
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Build {
    pub(crate) items: Vec<BuildItem>,
    /// Production extension UUID of the build
    pub uuid: Option<String>,
}

impl Build {
    /// Items in order
    pub fn items(&self) -> &[BuildItem] {
        &self.items
    }

    pub(crate) fn has_uuid(&self, uuid: &str) -> bool {
        self.items.iter().any(|i| i.uuid.as_deref() == Some(uuid))
    }
}
