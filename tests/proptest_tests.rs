//! Property-based tests for lib3mf-engine
//!
//! Random meshes, resource graphs and slice stacks are generated to check
//! that the model invariants and the write/read cycle hold beyond the
//! handful of fixed cases in the other suites.

use lib3mf_engine::model::{
    BuildItem, ColorGroup, Color, Component, Mesh, Model, Object, SliceStack, Transform, Triangle,
    Vertex,
};
use lib3mf_engine::parser::read_model_xml;
use lib3mf_engine::writer::write_model_xml;
use lib3mf_engine::{ParserConfig, WriterConfig, read_3mf, write_3mf};
use proptest::prelude::*;
use std::collections::HashSet;
use std::io::Cursor;

// ============================================================================
// Generators
// ============================================================================

/// Coordinates on a 1/64 grid print exactly with six decimals
fn coordinate() -> impl Strategy<Value = f64> {
    (-64_000i32..64_000).prop_map(|k| k as f64 / 64.0)
}

fn vertex_strategy() -> impl Strategy<Value = Vertex> {
    (coordinate(), coordinate(), coordinate()).prop_map(|(x, y, z)| Vertex::new(x, y, z))
}

/// Mesh with 3..60 vertices and 1..40 non-degenerate triangles
fn mesh_strategy() -> impl Strategy<Value = Mesh> {
    prop::collection::vec(vertex_strategy(), 3..60).prop_flat_map(|vertices| {
        let n = vertices.len() as u32;
        let triangle = (0..n, 0..n, 0..n)
            .prop_filter("distinct corners", |(a, b, c)| a != b && b != c && a != c);
        prop::collection::vec(triangle, 1..40).prop_map(move |triangles| {
            let mut mesh = Mesh::new();
            for v in &vertices {
                mesh.add_vertex(*v);
            }
            for (a, b, c) in triangles {
                mesh.add_triangle(Triangle::new(a, b, c)).unwrap();
            }
            mesh
        })
    })
}

fn single_mesh_model(mesh: Mesh) -> Model {
    let mut model = Model::new();
    let id = model.add_resource(Object::mesh(mesh)).unwrap();
    model.add_build_item(BuildItem::new(id)).unwrap();
    model
}

/// Operations applied to a model to exercise id allocation
#[derive(Debug, Clone)]
enum GraphOp {
    AddColors,
    AddMesh,
    Remove(usize),
    Nest(usize, usize),
}

fn graph_op() -> impl Strategy<Value = GraphOp> {
    prop_oneof![
        Just(GraphOp::AddColors),
        Just(GraphOp::AddMesh),
        (0usize..32).prop_map(GraphOp::Remove),
        (0usize..32, 0usize..32).prop_map(|(a, b)| GraphOp::Nest(a, b)),
    ]
}

fn transform_strategy() -> impl Strategy<Value = Transform> {
    prop::array::uniform12(-8i32..8).prop_map(|m| Transform(m.map(|v| v as f64 / 4.0)))
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn mesh_survives_package_round_trip(mesh in mesh_strategy()) {
        let model = single_mesh_model(mesh.clone());
        let bytes = write_3mf(&model, Cursor::new(Vec::new()), &mut WriterConfig::new())
            .unwrap()
            .into_inner();
        let back = read_3mf(Cursor::new(bytes), &mut ParserConfig::new()).unwrap();
        prop_assert!(back.warnings.is_empty());
        let id = back.model.build().items()[0].object;
        prop_assert_eq!(back.model.mesh(id).unwrap(), &mesh);
    }

    #[test]
    fn writing_a_read_model_is_idempotent(mesh in mesh_strategy(), name in "[a-zA-Z0-9 ]{0,12}") {
        let mut model = single_mesh_model(mesh);
        let id = model.build().items()[0].object;
        model.object_mut(id).unwrap().name = Some(name);
        let config = WriterConfig::new();
        let first = write_model_xml(&model, &config).unwrap();
        let back = read_model_xml(&first, &mut ParserConfig::new()).unwrap().model;
        let second = write_model_xml(&back, &config).unwrap();
        prop_assert_eq!(String::from_utf8(first).unwrap(), String::from_utf8(second).unwrap());
    }

    #[test]
    fn resource_ids_are_never_reused(ops in prop::collection::vec(graph_op(), 1..40)) {
        let mut model = Model::new();
        let mut issued = HashSet::new();
        for op in ops {
            let ids = model.resource_ids();
            match op {
                GraphOp::AddColors => {
                    let mut group = ColorGroup::new();
                    group.add_color(Color::rgb(10, 20, 30));
                    let id = model.add_resource(group).unwrap();
                    prop_assert!(issued.insert(id));
                }
                GraphOp::AddMesh => {
                    let id = model.add_resource(Object::mesh(Mesh::new())).unwrap();
                    prop_assert!(issued.insert(id));
                }
                GraphOp::Remove(i) if !ids.is_empty() => {
                    let id = ids[i % ids.len()];
                    let before = model.resource_count();
                    match model.remove_resource(id) {
                        Ok(_) => prop_assert_eq!(model.resource_count(), before - 1),
                        Err(e) => {
                            prop_assert_eq!(e.code(), 3004);
                            prop_assert_eq!(model.resource_count(), before);
                        }
                    }
                }
                GraphOp::Nest(a, b) if !ids.is_empty() => {
                    let parent = ids[a % ids.len()];
                    let child = ids[b % ids.len()];
                    let parent_is_assembly = model
                        .object(parent)
                        .map(|o| o.as_mesh().is_none())
                        .unwrap_or(false);
                    if parent_is_assembly {
                        let _ = model.add_component(parent, Component::new(child));
                    } else if model.object(child).is_ok() {
                        let assembly = model.add_resource(Object::components()).unwrap();
                        prop_assert!(issued.insert(assembly));
                        model.add_component(assembly, Component::new(child)).unwrap();
                    }
                }
                _ => {}
            }
            model.check_acyclic().unwrap();
        }
        let live: HashSet<_> = model.resource_ids().into_iter().collect();
        prop_assert!(live.is_subset(&issued));
    }

    #[test]
    fn accepted_slices_strictly_rise(bottom in -4.0f64..4.0, tops in prop::collection::vec(-8.0f64..8.0, 0..30)) {
        let mut stack = SliceStack::new(bottom);
        for z in tops {
            let last = stack.slices().last().map(|s| s.ztop());
            let expected = z >= bottom && last.is_none_or(|l| z > l);
            let accepted = stack.add_slice(z).is_ok();
            prop_assert_eq!(accepted, expected);
        }
        let zs: Vec<f64> = stack.slices().iter().map(|s| s.ztop()).collect();
        prop_assert!(zs.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(zs.iter().all(|z| *z >= bottom));
    }

    #[test]
    fn composed_transform_matches_sequential_application(
        a in transform_strategy(),
        b in transform_strategy(),
        p in (coordinate(), coordinate(), coordinate()),
    ) {
        let p = [p.0, p.1, p.2];
        let direct = a.then(&b).apply(p);
        let stepwise = b.apply(a.apply(p));
        for axis in 0..3 {
            prop_assert!((direct[axis] - stepwise[axis]).abs() < 1e-6);
        }
    }

    #[test]
    fn truncated_packages_fail_cleanly(mesh in mesh_strategy(), cut in 0.0f64..1.0) {
        let model = single_mesh_model(mesh);
        let bytes = write_3mf(&model, Cursor::new(Vec::new()), &mut WriterConfig::new())
            .unwrap()
            .into_inner();
        let len = (bytes.len() as f64 * cut) as usize;
        prop_assert!(read_3mf(Cursor::new(&bytes[..len]), &mut ParserConfig::new()).is_err());
    }
}
