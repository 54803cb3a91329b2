//! Namespace and relationship constants
//!
//! All URI tables live here as immutable statics. Nothing in this module is
//! mutated at runtime.

/// 3MF core namespace (1.x)
pub const CORE: &str = "http://schemas.microsoft.com/3dmanufacturing/core/2015/02";
/// Legacy 0.93 core namespace, accepted on read
pub const CORE_093: &str = "http://schemas.microsoft.com/3dmanufacturing/2013/01";
/// Materials and properties extension
pub const MATERIAL: &str = "http://schemas.microsoft.com/3dmanufacturing/material/2015/02";
/// Production extension
pub const PRODUCTION: &str = "http://schemas.microsoft.com/3dmanufacturing/production/2015/06";
/// Slice extension
pub const SLICE: &str = "http://schemas.microsoft.com/3dmanufacturing/slice/2015/07";
/// Beam lattice extension
pub const BEAM_LATTICE: &str = "http://schemas.microsoft.com/3dmanufacturing/beamlattice/2017/02";
/// Beam lattice balls sub-extension
pub const BEAM_LATTICE_BALLS: &str =
    "http://schemas.microsoft.com/3dmanufacturing/beamlattice/balls/2020/07";
/// Secure content extension
pub const SECURE_CONTENT: &str =
    "http://schemas.microsoft.com/3dmanufacturing/securecontent/2019/07";
/// Pre-release secure content namespace, accepted on read
pub const SECURE_CONTENT_2019_04: &str =
    "http://schemas.microsoft.com/3dmanufacturing/securecontent/2019/04";
/// Volumetric extension, 2022/01 revision
pub const VOLUMETRIC: &str = "http://schemas.3mf.io/3dmanufacturing/volumetric/2022/01";
/// Volumetric extension, 2019/07 revision (volumetric stacks)
pub const VOLUMETRIC_1907: &str = "http://schemas.microsoft.com/3dmanufacturing/volumetric/2019/07";
/// Implicit function extension
pub const IMPLICIT: &str = "http://schemas.3mf.io/3dmanufacturing/implicit/2023/12";

/// The `xml:` prefix namespace
pub const XML: &str = "http://www.w3.org/XML/1998/namespace";
/// XML encryption namespace used inside the keystore
pub const XML_ENC: &str = "http://www.w3.org/2001/04/xmlenc#";
/// XML digital signature namespace used inside the keystore
pub const XML_DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";

/// Root model relationship type
pub const MODEL_REL_TYPE: &str = "http://schemas.microsoft.com/3dmanufacturing/2013/01/3dmodel";
/// OPC thumbnail relationship type
pub const THUMBNAIL_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships/metadata/thumbnail";
/// Texture relationship type
pub const TEXTURE_REL_TYPE: &str = "http://schemas.microsoft.com/3dmanufacturing/2013/01/3dtexture";
/// Keystore relationship type
pub const KEYSTORE_REL_TYPE: &str = "http://schemas.microsoft.com/3dmanufacturing/2019/07/keystore";
/// Keystore relationship type of the 2019/04 draft
pub const KEYSTORE_REL_TYPE_2019_04: &str =
    "http://schemas.microsoft.com/3dmanufacturing/2019/04/keystore";
/// Relationship from the keystore to each encrypted part
pub const ENCRYPTED_FILE_REL_TYPE: &str =
    "http://schemas.microsoft.com/3dmanufacturing/2019/07/encryptedfile";
/// Print ticket relationship type
pub const PRINT_TICKET_REL_TYPE: &str =
    "http://schemas.microsoft.com/3dmanufacturing/2013/01/printticket";

/// Content types part namespace
pub const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
/// Relationships part namespace
pub const RELATIONSHIPS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

/// Relationship part content type
pub const RELS_CONTENT_TYPE: &str = "application/vnd.openxmlformats-package.relationships+xml";
/// Model part content type
pub const MODEL_CONTENT_TYPE: &str = "application/vnd.ms-package.3dmanufacturing-3dmodel+xml";
/// Keystore part content type
pub const KEYSTORE_CONTENT_TYPE: &str = "application/vnd.ms-package.3dmanufacturing-keystore+xml";
/// Texture content type used when the image format is unknown
pub const TEXTURE_CONTENT_TYPE: &str = "application/vnd.ms-package.3dmanufacturing-3dmodeltexture";
/// PNG content type
pub const PNG_CONTENT_TYPE: &str = "image/png";
/// JPEG content type
pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

/// 3MF extensions known to this engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Extension {
    /// Core specification (always supported)
    Core,
    /// Materials and properties
    Material,
    /// Production (multi-part packages, UUIDs)
    Production,
    /// Slices
    Slice,
    /// Beam lattices
    BeamLattice,
    /// Beam lattice balls
    BeamLatticeBalls,
    /// Secure content
    SecureContent,
    /// Volumetric 2022/01
    Volumetric,
    /// Volumetric 2019/07 stacks
    Volumetric1907,
    /// Implicit functions
    Implicit,
}

/// One row of the namespace table
#[derive(Debug, Clone, Copy)]
pub struct NamespaceInfo {
    /// Namespace URI
    pub uri: &'static str,
    /// Prefix emitted by the writer
    pub prefix: &'static str,
    /// Extension the namespace belongs to
    pub extension: Extension,
}

/// Every namespace the reader understands, in writer declaration order
///
/// The first entry for an extension is the canonical one; later entries
/// with the same extension are aliases accepted on read only.
pub static NAMESPACES: &[NamespaceInfo] = &[
    NamespaceInfo {
        uri: CORE,
        prefix: "",
        extension: Extension::Core,
    },
    NamespaceInfo {
        uri: MATERIAL,
        prefix: "m",
        extension: Extension::Material,
    },
    NamespaceInfo {
        uri: PRODUCTION,
        prefix: "p",
        extension: Extension::Production,
    },
    NamespaceInfo {
        uri: SLICE,
        prefix: "s",
        extension: Extension::Slice,
    },
    NamespaceInfo {
        uri: BEAM_LATTICE,
        prefix: "b",
        extension: Extension::BeamLattice,
    },
    NamespaceInfo {
        uri: BEAM_LATTICE_BALLS,
        prefix: "b2",
        extension: Extension::BeamLatticeBalls,
    },
    NamespaceInfo {
        uri: SECURE_CONTENT,
        prefix: "sc",
        extension: Extension::SecureContent,
    },
    NamespaceInfo {
        uri: VOLUMETRIC,
        prefix: "v",
        extension: Extension::Volumetric,
    },
    NamespaceInfo {
        uri: VOLUMETRIC_1907,
        prefix: "vs",
        extension: Extension::Volumetric1907,
    },
    NamespaceInfo {
        uri: IMPLICIT,
        prefix: "i",
        extension: Extension::Implicit,
    },
    NamespaceInfo {
        uri: CORE_093,
        prefix: "",
        extension: Extension::Core,
    },
    NamespaceInfo {
        uri: SECURE_CONTENT_2019_04,
        prefix: "sc",
        extension: Extension::SecureContent,
    },
];

impl Extension {
    /// Canonical namespace URI
    pub fn namespace(&self) -> &'static str {
        self.info().uri
    }

    /// Canonical prefix used when writing
    pub fn prefix(&self) -> &'static str {
        self.info().prefix
    }

    /// Look up an extension by any URI it is known under
    pub fn from_namespace(uri: &str) -> Option<Self> {
        NAMESPACES
            .iter()
            .find(|info| info.uri == uri)
            .map(|info| info.extension)
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Extension::Core => "Core",
            Extension::Material => "Material",
            Extension::Production => "Production",
            Extension::Slice => "Slice",
            Extension::BeamLattice => "BeamLattice",
            Extension::BeamLatticeBalls => "BeamLatticeBalls",
            Extension::SecureContent => "SecureContent",
            Extension::Volumetric => "Volumetric",
            Extension::Volumetric1907 => "Volumetric1907",
            Extension::Implicit => "Implicit",
        }
    }

    /// All extensions
    pub fn all() -> &'static [Extension] {
        &[
            Extension::Core,
            Extension::Material,
            Extension::Production,
            Extension::Slice,
            Extension::BeamLattice,
            Extension::BeamLatticeBalls,
            Extension::SecureContent,
            Extension::Volumetric,
            Extension::Volumetric1907,
            Extension::Implicit,
        ]
    }

    fn info(&self) -> &'static NamespaceInfo {
        // Every variant has a canonical row; the fallback is the core row.
        NAMESPACES
            .iter()
            .find(|info| info.extension == *self)
            .unwrap_or(&NAMESPACES[0])
    }
}

/// True for namespaces whose elements and attributes belong to core 3MF
pub fn is_core(uri: &str) -> bool {
    uri == CORE || uri == CORE_093
}
