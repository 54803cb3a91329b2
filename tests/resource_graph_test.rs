//! Invariants of the in-memory resource graph

mod common;

use common::{cube_mesh, cube_model};
use lib3mf_engine::model::{
    BaseMaterialGroup, BlendMethod, BuildItem, Color, ColorGroup, Component, CompositeMaterials,
    Model, MultiPropertyGroup, MultiPropertyLayer, Object, SliceStack,
};

#[test]
fn test_removed_material_is_gone_but_others_keep_their_ids() {
    let mut model = Model::new();
    let mut group = BaseMaterialGroup::new();
    let red = group.add_material("Red", Color::rgb(255, 0, 0));
    let green = group.add_material("Green", Color::rgb(0, 255, 0));
    assert_ne!(red, green);
    assert_eq!(group.property_ids().len(), 2);
    let gid = model.add_resource(group).unwrap();

    model.remove_property(gid, red).unwrap();
    let group = model.base_materials_mut(gid).unwrap();
    assert_eq!(group.property_ids(), vec![green]);
    assert_eq!(group.name(green).unwrap(), "Green");
    assert_eq!(group.name(red).unwrap_err().code(), 3010);

    let blue = group.add_material("Blue", Color::rgb(0, 0, 255));
    assert_ne!(blue, red);
    assert_eq!(model.remove_property(gid, red).unwrap_err().code(), 3010);
}

#[test]
fn test_referenced_properties_cannot_be_removed() {
    let mut model = Model::new();
    let mut metals = BaseMaterialGroup::new();
    let steel = metals.add_material("steel", Color::rgb(120, 120, 130));
    let brass = metals.add_material("brass", Color::rgb(180, 150, 60));
    let gid = model.add_resource(metals).unwrap();

    let mut object = Object::mesh(cube_mesh(1.0));
    object.pid = Some(gid);
    object.pindex = Some(brass);
    let id = model.add_resource(object).unwrap();
    model.add_build_item(BuildItem::new(id)).unwrap();

    assert_eq!(model.remove_property(gid, brass).unwrap_err().code(), 3004);
    assert_eq!(model.base_materials(gid).unwrap().property_ids().len(), 2);

    let mut colors = ColorGroup::new();
    let red = colors.add_color(Color::rgb(255, 0, 0));
    let cid = model.add_resource(colors).unwrap();
    model
        .mesh_mut(id)
        .unwrap()
        .set_triangle_properties(0, Some(cid), [Some(red), None, None])
        .unwrap();
    assert_eq!(model.remove_property(cid, red).unwrap_err().code(), 3004);

    let mut mixes = CompositeMaterials::new(gid, vec![steel]);
    mixes.add_composite(vec![1.0]).unwrap();
    model.add_resource(mixes).unwrap();
    assert_eq!(model.remove_property(gid, steel).unwrap_err().code(), 3004);

    model.object_mut(id).unwrap().pindex = Some(steel);
    model.remove_property(gid, brass).unwrap();
    let bytes = common::write_to_vec(&model, &mut lib3mf_engine::WriterConfig::new());
    assert!(!bytes.is_empty());
}

#[test]
fn test_slices_must_rise() {
    let mut stack = SliceStack::new(0.0);
    stack.add_slice(1.0).unwrap();
    assert_eq!(stack.add_slice(0.5).unwrap_err().code(), 3008);
    assert_eq!(stack.add_slice(1.0).unwrap_err().code(), 3008);
    stack.add_slice(2.0).unwrap();
    assert_eq!(stack.slices().len(), 2);

    let mut raised = SliceStack::new(3.0);
    assert_eq!(raised.add_slice(2.0).unwrap_err().code(), 3008);
}

#[test]
fn test_referenced_resources_cannot_be_removed() {
    let (mut model, cube) = cube_model();
    assert_eq!(model.remove_resource(cube).unwrap_err().code(), 3004);

    model.remove_build_item(0).unwrap();
    let assembly = model.add_resource(Object::components()).unwrap();
    model.add_component(assembly, Component::new(cube)).unwrap();
    assert_eq!(model.remove_resource(cube).unwrap_err().code(), 3004);
    assert_eq!(model.resource_count(), 2);

    model.remove_resource(assembly).unwrap();
    model.remove_resource(cube).unwrap();
    assert_eq!(model.resource_count(), 0);
    assert_eq!(model.remove_resource(cube).unwrap_err().code(), 3003);
}

#[test]
fn test_property_group_in_use_stays() {
    let mut model = Model::new();
    let mut colors = ColorGroup::new();
    colors.add_color(Color::rgb(1, 2, 3));
    let colors = model.add_resource(colors).unwrap();
    let mut object = Object::mesh(cube_mesh(1.0));
    object.pid = Some(colors);
    let object = model.add_resource(object).unwrap();

    assert_eq!(model.remove_resource(colors).unwrap_err().code(), 3004);
    model.remove_resource(object).unwrap();
    model.remove_resource(colors).unwrap();
}

#[test]
fn test_component_cycles_are_rejected() {
    let mut model = Model::new();
    let leaf = model.add_resource(Object::mesh(cube_mesh(1.0))).unwrap();
    let a = model.add_resource(Object::components()).unwrap();
    let b = model.add_resource(Object::components()).unwrap();
    model.add_component(a, Component::new(leaf)).unwrap();
    model.add_component(b, Component::new(a)).unwrap();

    assert_eq!(model.add_component(a, Component::new(b)).unwrap_err().code(), 3006);
    assert_eq!(model.add_component(a, Component::new(a)).unwrap_err().code(), 3006);
    assert_eq!(model.object(a).unwrap().component_list().len(), 1);
    model.check_acyclic().unwrap();
}

#[test]
fn test_build_item_needs_an_object() {
    let mut model = Model::new();
    let colors = model.add_resource(ColorGroup::new()).unwrap();
    assert!(model.add_build_item(BuildItem::new(colors)).is_err());
    assert!(model.build().items().is_empty());
}

#[test]
fn test_multi_property_layers_are_exclusive() {
    let mut model = Model::new();
    let mut base = BaseMaterialGroup::new();
    let steel = base.add_material("Steel", Color::rgb(90, 90, 90));
    let base = model.add_resource(base).unwrap();
    let other_base = model.add_resource(BaseMaterialGroup::new()).unwrap();
    let colors = model.add_resource(ColorGroup::new()).unwrap();
    let other_colors = model.add_resource(ColorGroup::new()).unwrap();
    let composite = model
        .add_resource(CompositeMaterials::new(base, vec![steel]))
        .unwrap();
    let group = model.add_resource(MultiPropertyGroup::new()).unwrap();
    let nested = model.add_resource(MultiPropertyGroup::new()).unwrap();

    let layer = |resource| MultiPropertyLayer {
        resource,
        blend: BlendMethod::Mix,
    };
    assert_eq!(model.add_multi_property_layer(group, layer(base)).unwrap(), 0);
    assert_eq!(model.add_multi_property_layer(group, layer(colors)).unwrap(), 1);

    for rejected in [other_base, composite, other_colors, nested] {
        let err = model.add_multi_property_layer(group, layer(rejected)).unwrap_err();
        assert_eq!(err.code(), 3009);
    }
    assert_eq!(model.multi_properties(group).unwrap().layers().len(), 2);
}

#[test]
fn test_multi_needs_at_most_one_id_per_layer() {
    let mut model = Model::new();
    let mut colors = ColorGroup::new();
    let white = colors.add_color(Color::rgb(255, 255, 255));
    let colors = model.add_resource(colors).unwrap();
    let group = model.add_resource(MultiPropertyGroup::new()).unwrap();
    model
        .add_multi_property_layer(
            group,
            MultiPropertyLayer {
                resource: colors,
                blend: BlendMethod::Multiply,
            },
        )
        .unwrap();

    let multis = model.multi_properties_mut(group).unwrap();
    multis.add_multi(vec![white]).unwrap();
    assert!(multis.add_multi(vec![white, white]).is_err());
}

#[test]
fn test_slice_references() {
    let mut model = Model::new();
    let mut solid = SliceStack::new(0.0);
    solid.add_slice(0.2).unwrap();
    let solid = model.add_resource(solid).unwrap();
    let linked = model.add_resource(SliceStack::new(0.0)).unwrap();

    model.add_slice_ref(linked, solid).unwrap();
    assert_eq!(model.slice_stack(linked).unwrap().slice_refs(), &[solid]);
    assert_eq!(model.add_slice_ref(linked, linked).unwrap_err().code(), 3006);

    let chained = model.add_resource(SliceStack::new(0.0)).unwrap();
    assert_eq!(model.add_slice_ref(chained, linked).unwrap_err().code(), 3001);
    assert_eq!(model.add_slice_ref(solid, chained).unwrap_err().code(), 3001);
    assert!(model.slice_stack_mut(linked).unwrap().add_slice(1.0).is_err());
}

#[test]
fn test_ids_stay_unique_after_removal() {
    let mut model = Model::new();
    let first = model.add_resource(ColorGroup::new()).unwrap();
    model.remove_resource(first).unwrap();
    let second = model.add_resource(ColorGroup::new()).unwrap();
    assert_ne!(first, second);
    let third = model.add_resource_in_part("/3D/other.model", ColorGroup::new()).unwrap();
    assert_ne!(second, third);
    assert_eq!(model.resource(third).unwrap().part(), "/3D/other.model");
}
