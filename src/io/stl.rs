//! STL (stereolithography) format support.
//!
//! STL stores every triangle with its own three corners, so loading welds
//! corners closer than [`WELD_TOLERANCE`] into shared vertices. Both binary
//! and ASCII files are read; [`save`] writes binary and [`save_ascii`] text.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use nalgebra::{Point3, Vector3};

use crate::algo::query::PointGrid;
use crate::error::{MeshError, Result};
use crate::mesh::{to_face_vertex, HalfEdgeMesh, MeshIndex};

/// Corners closer than this are merged on load.
pub const WELD_TOLERANCE: f64 = 1e-10;

/// Load a mesh from an STL file.
///
/// Automatically detects binary vs ASCII format. Triangles that collapse
/// after welding are dropped.
///
/// # Example
///
/// ```no_run
/// use surfmesh::io::stl;
/// use surfmesh::mesh::HalfEdgeMesh;
///
/// let mesh: HalfEdgeMesh = stl::load("model.stl").unwrap();
/// ```
pub fn load<P: AsRef<Path>, I: MeshIndex>(path: P) -> Result<HalfEdgeMesh<I>> {
    let path = path.as_ref();
    let mut file = File::open(path)?;

    let stl = stl_io::read_stl(&mut file).map_err(|e| MeshError::LoadError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let corners: Vec<Point3<f64>> = stl
        .vertices
        .iter()
        .map(|v| Point3::new(v[0] as f64, v[1] as f64, v[2] as f64))
        .collect();
    let (vertices, remap) = weld(corners, WELD_TOLERANCE);

    let mut polygons: Vec<Vec<usize>> = Vec::with_capacity(stl.faces.len());
    let mut dropped = 0;
    for tri in &stl.faces {
        let [i0, i1, i2] = tri.vertices.map(|i| remap[i]);
        if i0 != i1 && i1 != i2 && i0 != i2 {
            polygons.push(vec![i0, i1, i2]);
        } else {
            dropped += 1;
        }
    }
    if dropped > 0 {
        log::warn!("{}: dropped {} degenerate triangles", path.display(), dropped);
    }

    super::build_oriented(path, &vertices, polygons)
}

/// Merge points closer than `tolerance`, keeping the first of each cluster.
///
/// Returns the merged points and, for every input point, its merged index.
fn weld(points: Vec<Point3<f64>>, tolerance: f64) -> (Vec<Point3<f64>>, Vec<usize>) {
    let extent = points.iter().map(|p| p.coords.amax()).fold(0.0_f64, f64::max);
    // Cells large enough that the grid stays sparse for any tolerance.
    let cell = tolerance.max(1e-6 * extent);
    let grid = PointGrid::new(points, cell);

    let n = grid.len();
    let mut remap = vec![usize::MAX; n];
    let mut merged = Vec::new();
    for i in 0..n {
        if remap[i] != usize::MAX {
            continue;
        }
        let target = merged.len();
        merged.push(*grid.point(i));
        for j in grid.within(grid.point(i), tolerance) {
            if remap[j] == usize::MAX {
                remap[j] = target;
            }
        }
    }
    (merged, remap)
}

/// Save a mesh to a binary STL file.
///
/// # Example
///
/// ```no_run
/// use surfmesh::io::stl;
/// use surfmesh::mesh::HalfEdgeMesh;
///
/// let mesh: HalfEdgeMesh = HalfEdgeMesh::new();
/// stl::save(&mesh, "output.stl").unwrap();
/// ```
pub fn save<P: AsRef<Path>, I: MeshIndex>(mesh: &HalfEdgeMesh<I>, path: P) -> Result<()> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);

    let triangles: Vec<stl_io::Triangle> = triangles(mesh)
        .map(|(n, [p0, p1, p2])| stl_io::Triangle {
            normal: stl_io::Normal::new([n.x as f32, n.y as f32, n.z as f32]),
            vertices: [
                stl_io::Vertex::new([p0.x as f32, p0.y as f32, p0.z as f32]),
                stl_io::Vertex::new([p1.x as f32, p1.y as f32, p1.z as f32]),
                stl_io::Vertex::new([p2.x as f32, p2.y as f32, p2.z as f32]),
            ],
        })
        .collect();

    stl_io::write_stl(&mut writer, triangles.iter()).map_err(|e| MeshError::SaveError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    writer.flush()?;
    Ok(())
}

/// Save a mesh to an ASCII STL file.
pub fn save_ascii<P: AsRef<Path>, I: MeshIndex>(mesh: &HalfEdgeMesh<I>, path: P) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    write_ascii(mesh, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Write a mesh as ASCII STL text.
pub fn write_ascii<I: MeshIndex, W: Write>(mesh: &HalfEdgeMesh<I>, writer: &mut W) -> Result<()> {
    writeln!(writer, "solid surfmesh")?;
    for (n, corners) in triangles(mesh) {
        writeln!(writer, "  facet normal {:e} {:e} {:e}", n.x, n.y, n.z)?;
        writeln!(writer, "    outer loop")?;
        for p in corners {
            writeln!(writer, "      vertex {:e} {:e} {:e}", p.x, p.y, p.z)?;
        }
        writeln!(writer, "    endloop")?;
        writeln!(writer, "  endfacet")?;
    }
    writeln!(writer, "endsolid surfmesh")?;
    Ok(())
}

/// Unit normal and corners of every triangle. Polygons are fanned.
fn triangles<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
) -> impl Iterator<Item = (Vector3<f64>, [Point3<f64>; 3])> {
    let (vertices, faces) = to_face_vertex(mesh);
    faces.into_iter().map(move |f| {
        let [p0, p1, p2] = f.map(|i| vertices[i]);
        let n = (p1 - p0)
            .cross(&(p2 - p0))
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(Vector3::zeros);
        (n, [p0, p1, p2])
    })
}
