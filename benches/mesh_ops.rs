//! Benchmarks for mesh operations.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use surfmesh::algo::boolean::{union, BooleanOptions};
use surfmesh::algo::query::MeshBvh;
use surfmesh::algo::remesh::{isotropic_remeshing, split_edges, RemeshOptions};
use surfmesh::algo::smooth::{smooth_taubin, SmoothOptions};
use surfmesh::prelude::*;

fn grid_cube(n: usize) -> HalfEdgeMesh {
    make_cube(&Point3::origin(), &Point3::new(1.0, 1.0, 1.0), n).unwrap()
}

fn bench_mesh_construction(c: &mut Criterion) {
    c.bench_function("make_cube_20", |b| b.iter(|| grid_cube(black_box(20))));

    let (vertices, faces) = to_face_vertex(&grid_cube(20));
    c.bench_function("build_from_triangles_cube_20", |b| {
        b.iter(|| {
            let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
            mesh
        });
    });

    c.bench_function("make_sphere_24", |b| {
        b.iter(|| {
            let mesh: HalfEdgeMesh = make_sphere(&Point3::origin(), 1.0, black_box(24)).unwrap();
            mesh
        });
    });
}

fn bench_mesh_traversal(c: &mut Criterion) {
    let mesh = grid_cube(50);

    c.bench_function("vertex_neighbors_all", |b| {
        b.iter(|| {
            let mut count = 0;
            for v in mesh.vertex_ids() {
                count += mesh.vertex_neighbors(v).count();
            }
            count
        });
    });

    c.bench_function("face_normals_all", |b| {
        b.iter(|| {
            let mut sum = Vector3::zeros();
            for f in mesh.face_ids() {
                sum += mesh.face_normal(f);
            }
            sum
        });
    });

    let bvh = MeshBvh::new(&mesh);
    c.bench_function("closest_point_1000", |b| {
        b.iter(|| {
            (0..1000)
                .filter_map(|i| {
                    let t = i as f64 / 1000.0;
                    bvh.closest_point(&Point3::new(t, 2.0 * t - 0.5, 0.3))
                })
                .count()
        });
    });
}

fn bench_editing(c: &mut Criterion) {
    c.bench_function("split_edges_cube_0.1", |b| {
        b.iter_batched(
            || grid_cube(1),
            |mut mesh| split_edges(&mut mesh, 0.1).unwrap(),
            BatchSize::SmallInput,
        );
    });

    c.bench_function("isotropic_remeshing_cube_10", |b| {
        let options = RemeshOptions::with_target_length(0.08).with_iterations(3);
        b.iter_batched(
            || grid_cube(10),
            |mut mesh| isotropic_remeshing(&mut mesh, &options).unwrap(),
            BatchSize::SmallInput,
        );
    });

    c.bench_function("smooth_taubin_cube_30", |b| {
        b.iter_batched(
            || grid_cube(30),
            |mut mesh| smooth_taubin(&mut mesh, 5, &SmoothOptions::default()),
            BatchSize::LargeInput,
        );
    });
}

fn bench_boolean(c: &mut Criterion) {
    let a = grid_cube(4);
    let b: HalfEdgeMesh = make_cube(&Point3::new(0.5, 0.25, 0.3), &Point3::new(1.5, 1.25, 1.3), 4).unwrap();
    c.bench_function("union_cubes_4", |bench| {
        bench.iter(|| union(&a, &b, &BooleanOptions::default()).unwrap());
    });
}

criterion_group!(benches, bench_mesh_construction, bench_mesh_traversal, bench_editing, bench_boolean);
criterion_main!(benches);
