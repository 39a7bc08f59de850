//! Mesh file I/O.
//!
//! # Supported Formats
//!
//! | Format | Extension | Load | Save | Notes |
//! |--------|-----------|------|------|-------|
//! | Object File Format | `.off` | ✓ | ✓ | ASCII polygons |
//! | STL | `.stl` | ✓ | ✓ | Binary and ASCII |
//!
//! Loaders do more than parse: the polygon soup is oriented consistently
//! across shared edges before the half-edge mesh is built, and a closed
//! result whose normals point inward is reversed.
//!
//! ```no_run
//! use surfmesh::io::{load, save};
//! use surfmesh::mesh::HalfEdgeMesh;
//!
//! let mesh: HalfEdgeMesh = load("model.off").unwrap();
//! save(&mesh, "output.stl").unwrap();
//! ```

pub mod off;
pub mod stl;

use std::path::Path;

use nalgebra::Point3;

use crate::algo::repair::{orient_outward, orient_polygon_soup};
use crate::error::{MeshError, Result};
use crate::mesh::{build_from_polygons, HalfEdgeMesh, MeshIndex};

/// Supported mesh file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Object File Format (ASCII).
    Off,
    /// STL (stereolithography) format.
    Stl,
}

impl Format {
    /// Detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Format> {
        match ext.to_lowercase().as_str() {
            "off" => Some(Format::Off),
            "stl" => Some(Format::Stl),
            _ => None,
        }
    }

    /// Detect format from file path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Format> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Format::from_extension)
    }

    fn of(path: &Path) -> Result<Format> {
        Format::from_path(path).ok_or_else(|| MeshError::UnsupportedFormat {
            extension: path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("(none)")
                .to_string(),
        })
    }
}

/// Load a mesh from a file, choosing the format by extension.
///
/// # Errors
///
/// [`MeshError::UnsupportedFormat`] for an unknown extension, otherwise
/// whatever the format's loader reports.
pub fn load<P: AsRef<Path>, I: MeshIndex>(path: P) -> Result<HalfEdgeMesh<I>> {
    let path = path.as_ref();
    let mesh = match Format::of(path)? {
        Format::Off => off::load(path)?,
        Format::Stl => stl::load(path)?,
    };
    log::debug!(
        "loaded {}: {} vertices, {} faces",
        path.display(),
        mesh.num_vertices(),
        mesh.num_faces()
    );
    Ok(mesh)
}

/// Save a mesh to a file, choosing the format by extension.
///
/// STL files are written in binary; use [`stl::save_ascii`] for text.
pub fn save<P: AsRef<Path>, I: MeshIndex>(mesh: &HalfEdgeMesh<I>, path: P) -> Result<()> {
    let path = path.as_ref();
    match Format::of(path)? {
        Format::Off => off::save(mesh, path),
        Format::Stl => stl::save(mesh, path),
    }
}

/// Build a mesh from a loaded polygon soup, fixing its orientation.
fn build_oriented<I: MeshIndex>(
    path: &Path,
    vertices: &[Point3<f64>],
    mut polygons: Vec<Vec<usize>>,
) -> Result<HalfEdgeMesh<I>> {
    if polygons.is_empty() {
        return Err(MeshError::LoadError {
            path: path.to_path_buf(),
            message: "file contains no faces".to_string(),
        });
    }
    if !orient_polygon_soup(&mut polygons) {
        log::warn!("{}: surface is not orientable, winding left inconsistent", path.display());
    }
    let mut mesh = build_from_polygons(vertices, &polygons)?;
    if orient_outward(&mut mesh)? {
        log::debug!("{}: reversed inward-facing surface", path.display());
    }
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::primitives::make_cube;
    use tempfile::tempdir;

    #[test]
    fn test_format_detection() {
        assert_eq!(Format::from_path("a/b/mesh.OFF"), Some(Format::Off));
        assert_eq!(Format::from_path("mesh.stl"), Some(Format::Stl));
        assert_eq!(Format::from_path("mesh.obj"), None);
        assert_eq!(Format::from_path("mesh"), None);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = tempdir().unwrap();
        let cube: HalfEdgeMesh = make_cube(&Point3::origin(), &Point3::new(1.0, 1.0, 1.0), 1).unwrap();
        let path = dir.path().join("cube.ply");
        assert!(matches!(save(&cube, &path), Err(MeshError::UnsupportedFormat { .. })));
        let loaded: Result<HalfEdgeMesh> = load(&path);
        assert!(matches!(loaded, Err(MeshError::UnsupportedFormat { extension }) if extension == "ply"));
    }

    #[test]
    fn test_round_trip_by_extension() {
        let dir = tempdir().unwrap();
        let cube: HalfEdgeMesh = make_cube(&Point3::origin(), &Point3::new(1.0, 2.0, 3.0), 2).unwrap();
        for name in ["cube.off", "cube.stl"] {
            let path = dir.path().join(name);
            save(&cube, &path).unwrap();
            let back: HalfEdgeMesh = load(&path).unwrap();
            assert_eq!(back.num_vertices(), cube.num_vertices(), "{name}");
            assert_eq!(back.num_faces(), cube.num_faces(), "{name}");
            assert_eq!(back.num_edges(), cube.num_edges(), "{name}");
        }
    }

    #[test]
    fn test_inward_soup_is_reversed() {
        let vertices = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ];
        // Inward winding, with one face flipped relative to the rest.
        let polygons = vec![vec![0, 1, 2], vec![0, 3, 1], vec![1, 3, 2], vec![0, 3, 2]];
        let mesh: HalfEdgeMesh = build_oriented(Path::new("tet.off"), &vertices, polygons).unwrap();
        assert!(mesh.is_closed());
        assert!(mesh.volume() > 0.0);
    }
}
