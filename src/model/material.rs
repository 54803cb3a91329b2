//! Property groups from the materials extension
//!
//! Every group hands out [`PropertyId`]s that are unique within the group
//! and never reused, even after removal. The XML index of an entry is its
//! current position in the group.

use super::ResourceId;
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Identifier of an entry inside one property group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyId(pub u32);

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered entries keyed by per-group property ids
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyGroup<T> {
    entries: Vec<(PropertyId, T)>,
    next_id: u32,
}

impl<T> Default for PropertyGroup<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }
}

impl<T> PropertyGroup<T> {
    /// Append an entry and return its new id
    pub fn add(&mut self, value: T) -> PropertyId {
        let id = PropertyId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, value));
        id
    }

    /// Entry for `id`
    pub fn get(&self, id: PropertyId) -> Result<&T> {
        self.entries
            .iter()
            .find(|(pid, _)| *pid == id)
            .map(|(_, v)| v)
            .ok_or_else(|| Error::PropertyNotFound(format!("property id {}", id)))
    }

    /// Mutable entry for `id`
    pub fn get_mut(&mut self, id: PropertyId) -> Result<&mut T> {
        self.entries
            .iter_mut()
            .find(|(pid, _)| *pid == id)
            .map(|(_, v)| v)
            .ok_or_else(|| Error::PropertyNotFound(format!("property id {}", id)))
    }

    /// Remove the entry for `id`; later entries shift down by one index
    ///
    /// Goes through [`crate::Model::remove_property`], which keeps entries
    /// that are still referenced.
    pub(crate) fn remove(&mut self, id: PropertyId) -> Result<T> {
        let pos = self
            .index_of(id)
            .ok_or_else(|| Error::PropertyNotFound(format!("property id {}", id)))?;
        Ok(self.entries.remove(pos).1)
    }

    /// All ids in order
    pub fn property_ids(&self) -> Vec<PropertyId> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    /// Position of `id`, which is its XML index
    pub fn index_of(&self, id: PropertyId) -> Option<usize> {
        self.entries.iter().position(|(pid, _)| *pid == id)
    }

    /// Id at an XML index
    pub fn id_at(&self, index: usize) -> Option<PropertyId> {
        self.entries.get(index).map(|(id, _)| *id)
    }

    /// Whether `id` is present
    pub fn contains(&self, id: PropertyId) -> bool {
        self.index_of(id).is_some()
    }

    /// Entries in order
    pub fn iter(&self) -> impl Iterator<Item = (PropertyId, &T)> {
        self.entries.iter().map(|(id, v)| (*id, v))
    }

    /// Values in order
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(_, v)| v)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// sRGB color with alpha
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    /// Red
    pub r: u8,
    /// Green
    pub g: u8,
    /// Blue
    pub b: u8,
    /// Alpha
    pub a: u8,
}

impl Color {
    /// Opaque color
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Color with alpha
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

impl FromStr for Color {
    type Err = Error;

    /// Parses `#RRGGBB` or `#RRGGBBAA`
    fn from_str(s: &str) -> Result<Self> {
        let hex = s
            .strip_prefix('#')
            .ok_or_else(|| Error::parse_error_with_context("color", s, "#RRGGBB or #RRGGBBAA"))?;
        if (hex.len() != 6 && hex.len() != 8) || !hex.is_ascii() {
            return Err(Error::parse_error_with_context(
                "color",
                s,
                "#RRGGBB or #RRGGBBAA",
            ));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| Error::parse_error_with_context("color", s, "hexadecimal digits"))
        };
        let a = if hex.len() == 8 { channel(6)? } else { 255 };
        Ok(Color::rgba(channel(0)?, channel(2)?, channel(4)?, a))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)?;
        if self.a != 255 {
            write!(f, "{:02X}", self.a)?;
        }
        Ok(())
    }
}

/// Named base material
#[derive(Debug, Clone, PartialEq)]
pub struct BaseMaterial {
    /// Display name
    pub name: String,
    /// Display color
    pub display_color: Color,
}

/// `<basematerials>` resource
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaseMaterialGroup {
    /// Materials keyed by property id
    pub materials: PropertyGroup<BaseMaterial>,
}

impl BaseMaterialGroup {
    /// Empty group
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a material
    pub fn add_material(&mut self, name: impl Into<String>, display_color: Color) -> PropertyId {
        self.materials.add(BaseMaterial {
            name: name.into(),
            display_color,
        })
    }

    /// Name of a material
    pub fn name(&self, id: PropertyId) -> Result<&str> {
        Ok(self.materials.get(id)?.name.as_str())
    }

    /// Display color of a material
    pub fn display_color(&self, id: PropertyId) -> Result<Color> {
        Ok(self.materials.get(id)?.display_color)
    }

    pub(crate) fn remove_material(&mut self, id: PropertyId) -> Result<()> {
        self.materials.remove(id).map(|_| ())
    }

    /// All property ids
    pub fn property_ids(&self) -> Vec<PropertyId> {
        self.materials.property_ids()
    }
}

/// `<colorgroup>` resource
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorGroup {
    /// Colors keyed by property id
    pub colors: PropertyGroup<Color>,
}

impl ColorGroup {
    /// Empty group
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a color
    pub fn add_color(&mut self, color: Color) -> PropertyId {
        self.colors.add(color)
    }
}

/// Texture tiling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TileStyle {
    /// Repeat
    #[default]
    Wrap,
    /// Repeat mirrored
    Mirror,
    /// Clamp to edge
    Clamp,
    /// No tiling
    None,
}

impl TileStyle {
    /// XML attribute value
    pub fn as_str(&self) -> &'static str {
        match self {
            TileStyle::Wrap => "wrap",
            TileStyle::Mirror => "mirror",
            TileStyle::Clamp => "clamp",
            TileStyle::None => "none",
        }
    }
}

impl FromStr for TileStyle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "wrap" => Ok(TileStyle::Wrap),
            "mirror" => Ok(TileStyle::Mirror),
            "clamp" => Ok(TileStyle::Clamp),
            "none" => Ok(TileStyle::None),
            _ => Err(Error::parse_error_with_context(
                "tilestyle",
                s,
                "wrap, mirror, clamp or none",
            )),
        }
    }
}

/// Texture sampling filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureFilter {
    /// Implementation choice
    #[default]
    Auto,
    /// Linear interpolation
    Linear,
    /// Nearest neighbour
    Nearest,
}

impl TextureFilter {
    /// XML attribute value
    pub fn as_str(&self) -> &'static str {
        match self {
            TextureFilter::Auto => "auto",
            TextureFilter::Linear => "linear",
            TextureFilter::Nearest => "nearest",
        }
    }
}

impl FromStr for TextureFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(TextureFilter::Auto),
            "linear" => Ok(TextureFilter::Linear),
            "nearest" => Ok(TextureFilter::Nearest),
            _ => Err(Error::parse_error_with_context(
                "filter",
                s,
                "auto, linear or nearest",
            )),
        }
    }
}

/// `<texture2d>` resource pointing at an image attachment
#[derive(Debug, Clone, PartialEq)]
pub struct Texture2D {
    /// Part name of the image attachment
    pub path: String,
    /// Image content type
    pub content_type: String,
    /// Tiling along u
    pub tile_style_u: TileStyle,
    /// Tiling along v
    pub tile_style_v: TileStyle,
    /// Sampling filter
    pub filter: TextureFilter,
}

impl Texture2D {
    /// Texture for an attachment path
    pub fn new(path: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content_type: content_type.into(),
            tile_style_u: TileStyle::default(),
            tile_style_v: TileStyle::default(),
            filter: TextureFilter::default(),
        }
    }
}

/// Texture coordinate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tex2Coord {
    /// u
    pub u: f64,
    /// v
    pub v: f64,
}

/// `<texture2dgroup>` resource
#[derive(Debug, Clone, PartialEq)]
pub struct Texture2DGroup {
    /// The `<texture2d>` sampled by this group
    pub texture: ResourceId,
    /// Coordinates keyed by property id
    pub coords: PropertyGroup<Tex2Coord>,
}

impl Texture2DGroup {
    /// Empty group sampling `texture`
    pub fn new(texture: ResourceId) -> Self {
        Self {
            texture,
            coords: PropertyGroup::default(),
        }
    }
}

/// Mixing ratios of one composite
#[derive(Debug, Clone, PartialEq)]
pub struct Composite {
    /// One ratio per base material in the group's `matindices`
    pub values: Vec<f64>,
}

/// `<compositematerials>` resource
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeMaterials {
    /// Base material group the ratios refer to
    pub base_materials: ResourceId,
    /// Materials mixed by each composite
    pub material_ids: Vec<PropertyId>,
    composites: PropertyGroup<Composite>,
}

impl CompositeMaterials {
    /// Empty composite group over `material_ids` of `base_materials`
    pub fn new(base_materials: ResourceId, material_ids: Vec<PropertyId>) -> Self {
        Self {
            base_materials,
            material_ids,
            composites: PropertyGroup::default(),
        }
    }

    /// Add a composite; ratios must match `material_ids` and lie in `[0, 1]`
    pub fn add_composite(&mut self, values: Vec<f64>) -> Result<PropertyId> {
        if values.len() != self.material_ids.len() {
            return Err(Error::InvalidModel(format!(
                "Composite has {} values but the group mixes {} materials",
                values.len(),
                self.material_ids.len()
            )));
        }
        if let Some(bad) = values
            .iter()
            .find(|v| !v.is_finite() || **v < 0.0 || **v > 1.0)
        {
            return Err(Error::InvalidModel(format!(
                "Composite mixing ratio {} is outside [0, 1]",
                bad
            )));
        }
        Ok(self.composites.add(Composite { values }))
    }

    /// Composites keyed by property id
    pub fn composites(&self) -> &PropertyGroup<Composite> {
        &self.composites
    }

    pub(crate) fn remove_composite(&mut self, id: PropertyId) -> Result<()> {
        self.composites.remove(id).map(|_| ())
    }
}

/// Blend method of a multi-property layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMethod {
    /// Linear mix
    #[default]
    Mix,
    /// Multiply
    Multiply,
}

impl BlendMethod {
    /// XML attribute value
    pub fn as_str(&self) -> &'static str {
        match self {
            BlendMethod::Mix => "mix",
            BlendMethod::Multiply => "multiply",
        }
    }
}

impl FromStr for BlendMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mix" => Ok(BlendMethod::Mix),
            "multiply" => Ok(BlendMethod::Multiply),
            _ => Err(Error::parse_error_with_context(
                "blendmethod",
                s,
                "mix or multiply",
            )),
        }
    }
}

/// One layer of a multi-property group
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultiPropertyLayer {
    /// Property group supplying this layer
    pub resource: ResourceId,
    /// How the layer blends with the ones below
    pub blend: BlendMethod,
}

/// Property ids of one multi, one per layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Multi {
    /// Entry of each layer's group
    pub property_ids: Vec<PropertyId>,
}

/// `<multiproperties>` resource
///
/// Layers are added through [`crate::Model::add_multi_property_layer`],
/// which checks the kinds of the referenced groups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiPropertyGroup {
    pub(crate) layers: Vec<MultiPropertyLayer>,
    /// Multis keyed by property id
    pub multis: PropertyGroup<Multi>,
}

impl MultiPropertyGroup {
    /// Empty group
    pub fn new() -> Self {
        Self::default()
    }

    /// Layers in order
    pub fn layers(&self) -> &[MultiPropertyLayer] {
        &self.layers
    }

    /// Remove a layer by position
    pub fn remove_layer(&mut self, index: usize) -> Result<MultiPropertyLayer> {
        if index >= self.layers.len() {
            return Err(Error::IndexOutOfRange(format!(
                "layer {} of {}",
                index,
                self.layers.len()
            )));
        }
        Ok(self.layers.remove(index))
    }

    /// Add a multi; it needs one property id per layer
    pub fn add_multi(&mut self, property_ids: Vec<PropertyId>) -> Result<PropertyId> {
        if property_ids.len() > self.layers.len() {
            return Err(Error::InvalidModel(format!(
                "Multi has {} property ids but the group has {} layers",
                property_ids.len(),
                self.layers.len()
            )));
        }
        Ok(self.multis.add(Multi { property_ids }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_ids_not_reused() {
        let mut group = BaseMaterialGroup::new();
        let a = group.add_material("PLA", Color::rgb(255, 0, 0));
        let b = group.add_material("ABS", Color::rgb(0, 0, 255));
        assert_ne!(a, b);
        group.remove_material(a).unwrap();
        let c = group.add_material("PETG", Color::rgb(0, 255, 0));
        assert_ne!(c, a);
        assert_eq!(group.materials.index_of(b), Some(0));
        assert_eq!(group.materials.index_of(c), Some(1));
    }

    #[test]
    fn test_removed_material_name_fails() {
        let mut group = BaseMaterialGroup::new();
        let a = group.add_material("PLA", Color::rgb(1, 2, 3));
        group.remove_material(a).unwrap();
        assert!(matches!(group.name(a), Err(Error::PropertyNotFound(_))));
        assert!(group.remove_material(a).is_err());
    }

    #[test]
    fn test_color_parse_and_display() {
        let c: Color = "#FF8000".parse().unwrap();
        assert_eq!(c, Color::rgb(255, 128, 0));
        assert_eq!(c.to_string(), "#FF8000");
        let c: Color = "#00000080".parse().unwrap();
        assert_eq!(c.a, 0x80);
        assert_eq!(c.to_string(), "#00000080");
        assert!("FF8000".parse::<Color>().is_err());
        assert!("#FF80".parse::<Color>().is_err());
        assert!("#GG0000".parse::<Color>().is_err());
    }

    #[test]
    fn test_composite_ratio_range() {
        let mut comp = CompositeMaterials::new(ResourceId(1), vec![PropertyId(1), PropertyId(2)]);
        assert!(comp.add_composite(vec![0.25, 0.75]).is_ok());
        assert!(comp.add_composite(vec![1.5, 0.0]).is_err());
        assert!(comp.add_composite(vec![0.5]).is_err());
        assert_eq!(comp.composites().len(), 1);
    }
}
