//! Element dispatch table
//!
//! Maps `(extension, local name)` to the handler that opens the element.
//! Elements not listed here are skipped with a warning.

use super::part::{Node, PartParser};
use super::scope::XmlElement;
use super::{beam_lattice, core, material, slice, volumetric};
use crate::error::Result;
use crate::model::{NodeKind, PortType};
use crate::namespaces::Extension;

pub(super) use super::core::open_model;

/// Opens one element and returns the node pushed for it
pub(crate) type OpenFn = fn(&mut PartParser<'_>, &XmlElement) -> Result<Node>;

struct Entry {
    extension: Extension,
    local: &'static str,
    open: OpenFn,
}

macro_rules! handlers {
    ($($ext:ident { $($local:literal => $open:path),* $(,)? })*) => {
        &[$($(Entry { extension: Extension::$ext, local: $local, open: $open },)*)*]
    };
}

static HANDLERS: &[Entry] = handlers! {
    Core {
        "resources" => core::open_resources,
        "object" => core::open_object,
        "mesh" => core::open_mesh,
        "vertices" => core::open_vertices,
        "vertex" => core::open_vertex,
        "triangles" => core::open_triangles,
        "triangle" => core::open_triangle,
        "components" => core::open_components,
        "component" => core::open_component,
        "build" => core::open_build,
        "item" => core::open_item,
        "metadata" => core::open_metadata,
        "metadatagroup" => core::open_metadata_group,
        "basematerials" => material::open_base_materials,
        "base" => material::open_base,
    }
    Material {
        "colorgroup" => material::open_color_group,
        "color" => material::open_color,
        "texture2d" => material::open_texture,
        "texture2dgroup" => material::open_texture_group,
        "tex2coord" => material::open_tex_coord,
        "compositematerials" => material::open_composite_materials,
        "composite" => material::open_composite,
        "multiproperties" => material::open_multi_properties,
        "multi" => material::open_multi,
    }
    Slice {
        "slicestack" => slice::open_slice_stack,
        "slice" => slice::open_slice,
        "vertices" => slice::open_vertices,
        "vertex" => slice::open_vertex,
        "polygon" => slice::open_polygon,
        "segment" => slice::open_segment,
        "sliceref" => slice::open_slice_ref,
    }
    BeamLattice {
        "beamlattice" => beam_lattice::open_lattice,
        "beams" => beam_lattice::open_beams,
        "beam" => beam_lattice::open_beam,
        "beamsets" => beam_lattice::open_beam_sets,
        "beamset" => beam_lattice::open_beam_set,
        "ref" => beam_lattice::open_beam_ref,
    }
    BeamLatticeBalls {
        "balls" => beam_lattice::open_balls,
        "ball" => beam_lattice::open_ball,
        "ballref" => beam_lattice::open_ball_ref,
    }
    Volumetric {
        "image3d" => volumetric::open_image3d,
        "imagestack" => volumetric::open_image_stack,
        "imagesheet" => volumetric::open_image_sheet,
        "scalarfield" => volumetric::open_scalar_field,
        "scalarfieldconstant" => volumetric::open_scalar_constant,
        "scalarfieldfromimage3d" => volumetric::open_scalar_from_image,
        "scalarfieldcomposed" => volumetric::open_scalar_composed,
        "vector3dfield" => volumetric::open_vector_field,
        "vector3dfieldconstant" => volumetric::open_vector_constant,
        "vector3dfieldfromimage3d" => volumetric::open_vector_from_image,
        "vector3dfieldcomposed" => volumetric::open_vector_composed,
        "functionfromimage3d" => volumetric::open_function_from_image,
        "volumedata" => volumetric::open_volume_data,
        "color" => volumetric::open_volume_color,
        "property" => volumetric::open_volume_property,
        "levelset" => volumetric::open_level_set,
    }
    Implicit {
        "implicitfunction" => volumetric::open_implicit_function,
        "in" => volumetric::open_inputs,
        "out" => volumetric::open_outputs,
    }
    Volumetric1907 {
        "volumetricstack" => volumetric::open_volumetric_stack,
        "dstchannel" => volumetric::open_dst_channel,
        "volumetriclayer" => volumetric::open_volumetric_layer,
        "maskchannel" => volumetric::open_mask_channel,
        "channelselector" => volumetric::open_channel_selector,
    }
};

/// Handler for an element, if the extension defines it
pub(crate) fn lookup(extension: Extension, local: &str) -> Option<OpenFn> {
    if let Some(entry) = HANDLERS
        .iter()
        .find(|e| e.extension == extension && e.local == local)
    {
        return Some(entry.open);
    }
    if extension == Extension::Implicit {
        if PortType::from_element(local).is_some() {
            return Some(volumetric::open_port);
        }
        if NodeKind::from_element(local).is_some() {
            return Some(volumetric::open_node);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_namespace_qualified() {
        assert!(lookup(Extension::Core, "vertex").is_some());
        assert!(lookup(Extension::Slice, "vertex").is_some());
        assert!(lookup(Extension::Material, "vertex").is_none());
        assert!(lookup(Extension::Core, "beamlattice").is_none());
    }

    #[test]
    fn test_implicit_nodes_resolve_by_kind() {
        assert!(lookup(Extension::Implicit, "addition").is_some());
        assert!(lookup(Extension::Implicit, "scalarref").is_some());
        assert!(lookup(Extension::Implicit, "nonsense").is_none());
    }

    #[test]
    fn test_table_has_no_duplicates() {
        for (i, a) in HANDLERS.iter().enumerate() {
            for b in &HANDLERS[i + 1..] {
                assert!(
                    a.extension != b.extension || a.local != b.local,
                    "duplicate handler for {}",
                    a.local
                );
            }
        }
    }
}
