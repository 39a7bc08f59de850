//! OFF (Object File Format) support.
//!
//! The ASCII variant only: an `OFF` header line, a `V F E` count line, `V`
//! vertex lines and `F` face lines of the form `n v0 ... vn-1`. Comments
//! starting with `#` and blank lines may appear anywhere.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::Point3;

use crate::error::{MeshError, Result};
use crate::mesh::{to_polygons, HalfEdgeMesh, MeshIndex};

/// Load a mesh from an OFF file.
///
/// Polygons of any degree are kept as they are.
///
/// # Example
///
/// ```no_run
/// use surfmesh::io::off;
/// use surfmesh::mesh::HalfEdgeMesh;
///
/// let mesh: HalfEdgeMesh = off::load("model.off").unwrap();
/// ```
pub fn load<P: AsRef<Path>, I: MeshIndex>(path: P) -> Result<HalfEdgeMesh<I>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let (vertices, polygons) = parse(reader).map_err(|e| match e {
        ParseError::Io(e) => MeshError::Io(e),
        ParseError::Syntax(message) => MeshError::LoadError {
            path: path.to_path_buf(),
            message,
        },
    })?;
    super::build_oriented(path, &vertices, polygons)
}

/// Save a mesh to an ASCII OFF file.
///
/// ```no_run
/// use surfmesh::io::off;
/// use surfmesh::mesh::HalfEdgeMesh;
///
/// let mesh: HalfEdgeMesh = HalfEdgeMesh::new();
/// off::save(&mesh, "output.off").unwrap();
/// ```
pub fn save<P: AsRef<Path>, I: MeshIndex>(mesh: &HalfEdgeMesh<I>, path: P) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    write(mesh, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Write a mesh as OFF text.
pub fn write<I: MeshIndex, W: Write>(mesh: &HalfEdgeMesh<I>, writer: &mut W) -> Result<()> {
    let (vertices, polygons) = to_polygons(mesh);

    writeln!(writer, "OFF")?;
    writeln!(writer, "{} {} {}", vertices.len(), polygons.len(), mesh.num_edges())?;
    for v in &vertices {
        writeln!(writer, "{} {} {}", v.x, v.y, v.z)?;
    }
    for polygon in &polygons {
        write!(writer, "{}", polygon.len())?;
        for i in polygon {
            write!(writer, " {i}")?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

enum ParseError {
    Io(std::io::Error),
    Syntax(String),
}

impl From<std::io::Error> for ParseError {
    fn from(e: std::io::Error) -> Self {
        ParseError::Io(e)
    }
}

fn syntax<T>(line: usize, message: impl std::fmt::Display) -> std::result::Result<T, ParseError> {
    Err(ParseError::Syntax(format!("line {line}: {message}")))
}

type Soup = (Vec<Point3<f64>>, Vec<Vec<usize>>);

fn parse<R: BufRead>(reader: R) -> std::result::Result<Soup, ParseError> {
    // Data lines with their 1-based line numbers, comments stripped.
    let mut lines = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        let content = line.split('#').next().unwrap_or("").trim().to_string();
        if !content.is_empty() {
            lines.push((n + 1, content));
        }
    }
    let mut lines = lines.into_iter();

    let Some((n, header)) = lines.next() else {
        return syntax(1, "empty file");
    };
    // Some writers put the counts on the header line itself.
    let counts = match header.strip_prefix("OFF") {
        Some(rest) if rest.trim().is_empty() => match lines.next() {
            Some(line) => line,
            None => return syntax(n, "missing counts"),
        },
        Some(rest) if rest.starts_with(char::is_whitespace) => (n, rest.trim().to_string()),
        _ => return syntax(n, format!("expected OFF header, found {header:?}")),
    };
    let (n, counts) = counts;
    let counts: Vec<usize> = numbers(n, &counts)?;
    let (num_vertices, num_faces) = match counts[..] {
        [v, f] | [v, f, _] => (v, f),
        _ => return syntax(n, "expected vertex, face and edge counts"),
    };

    let mut vertices = Vec::with_capacity(num_vertices);
    for _ in 0..num_vertices {
        let Some((n, line)) = lines.next() else {
            return syntax(n, format!("expected {num_vertices} vertices, found {}", vertices.len()));
        };
        let coords: Vec<f64> = numbers(n, &line)?;
        if coords.len() < 3 {
            return syntax(n, "vertex needs three coordinates");
        }
        vertices.push(Point3::new(coords[0], coords[1], coords[2]));
    }

    let mut polygons = Vec::with_capacity(num_faces);
    for _ in 0..num_faces {
        let Some((n, line)) = lines.next() else {
            return syntax(n, format!("expected {num_faces} faces, found {}", polygons.len()));
        };
        let mut fields = line.split_whitespace();
        let degree: usize = match fields.next().map(str::parse) {
            Some(Ok(d)) => d,
            _ => return syntax(n, "face must start with its vertex count"),
        };
        let mut polygon = Vec::with_capacity(degree);
        for field in fields.by_ref().take(degree) {
            match field.parse::<usize>() {
                Ok(i) if i < num_vertices => polygon.push(i),
                Ok(i) => return syntax(n, format!("vertex index {i} out of range")),
                Err(_) => return syntax(n, format!("bad vertex index {field:?}")),
            }
        }
        if polygon.len() != degree {
            return syntax(n, format!("face lists {} of {degree} vertices", polygon.len()));
        }
        // Trailing fields are per-face colours.
        polygons.push(polygon);
    }

    Ok((vertices, polygons))
}

fn numbers<T: std::str::FromStr>(line: usize, text: &str) -> std::result::Result<Vec<T>, ParseError> {
    text.split_whitespace()
        .map(|field| match field.parse() {
            Ok(x) => Ok(x),
            Err(_) => syntax(line, format!("bad number {field:?}")),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::primitives::{make_cone, make_cube};
    use std::io::Cursor;
    use tempfile::tempdir;

    const SQUARE: &str = "\
# a unit square made of two triangles
OFF
4 2 5

0 0 0
1 0 0
1 1 0  # corner
0 1 0
3 0 1 2
3 0 2 3 255 0 0
";

    #[test]
    fn test_parse_with_comments() {
        let Ok((vertices, polygons)) = parse(Cursor::new(SQUARE)) else {
            panic!("square should parse");
        };
        assert_eq!(vertices.len(), 4);
        assert_eq!(vertices[2], Point3::new(1.0, 1.0, 0.0));
        assert_eq!(polygons, vec![vec![0, 1, 2], vec![0, 2, 3]]);
    }

    #[test]
    fn test_parse_errors() {
        for text in ["", "PLY\n1 0 0\n", "OFF\n2 0 0\n0 0 0\n", "OFF\n3 1 0\n0 0 0\n1 0 0\n0 1 0\n3 0 1 7\n"] {
            assert!(matches!(parse(Cursor::new(text)), Err(ParseError::Syntax(_))), "{text:?}");
        }
    }

    #[test]
    fn test_write_header() {
        let cube: HalfEdgeMesh = make_cube(&Point3::origin(), &Point3::new(1.0, 1.0, 1.0), 1).unwrap();
        let mut out = Vec::new();
        write(&cube, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("OFF"));
        assert_eq!(lines.next(), Some("8 12 18"));
        assert_eq!(text.lines().count(), 2 + 8 + 12);
    }

    #[test]
    fn test_round_trip_keeps_counts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cone.off");
        let cone: HalfEdgeMesh =
            make_cone(&Point3::origin(), &Point3::new(0.0, 0.0, 2.0), 1.0, 0.5, 7, None).unwrap();
        save(&cone, &path).unwrap();
        let back: HalfEdgeMesh = load(&path).unwrap();

        assert_eq!(back.num_vertices(), cone.num_vertices());
        assert_eq!(back.num_faces(), cone.num_faces());
        assert_eq!(back.num_edges(), cone.num_edges());
        assert!((back.volume() - cone.volume()).abs() < 1e-9);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let loaded: Result<HalfEdgeMesh> = load(dir.path().join("absent.off"));
        assert!(matches!(loaded, Err(MeshError::Io(_))));
    }
}
