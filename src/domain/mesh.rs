//! Minimal Wavefront OBJ mesh.

use crate::core::errors::AdvisorError;
use std::path::Path;

/// Vertices and polygonal faces of a mesh.
///
/// Face indices are zero-based and always in range for `vertices`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjMesh {
    vertices: Vec<[f32; 3]>,
    faces: Vec<Vec<usize>>,
}

impl ObjMesh {
    /// Creates a mesh, dropping out-of-range indices and faces left with
    /// fewer than three vertices.
    pub fn new(vertices: Vec<[f32; 3]>, faces: Vec<Vec<usize>>) -> Self {
        let faces = faces
            .into_iter()
            .map(|face| {
                face.into_iter()
                    .filter(|&i| i < vertices.len())
                    .collect::<Vec<_>>()
            })
            .filter(|face| face.len() >= 3)
            .collect();
        Self { vertices, faces }
    }

    /// Reads and parses an OBJ file.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, `InvalidInput` if it is blank.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, AdvisorError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Err(AdvisorError::invalid_input(format!(
                "OBJ file is empty: {}",
                path.display()
            )));
        }
        Ok(Self::parse(&content))
    }

    /// Parses `v` and `f` statements; everything else is ignored.
    ///
    /// Malformed vertices and face indices are skipped. Negative indices count
    /// back from the vertices read so far. Only the position component of
    /// `v/vt/vn` tokens is used.
    pub fn parse(content: &str) -> Self {
        let mut vertices: Vec<[f32; 3]> = Vec::new();
        let mut faces = Vec::new();

        for line in content.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            match parts.next() {
                Some("v") => {
                    let coords: Vec<f32> = parts.take(3).map_while(|p| p.parse().ok()).collect();
                    if let [x, y, z] = coords[..] {
                        vertices.push([x, y, z]);
                    }
                }
                Some("f") => {
                    let face: Vec<usize> = parts
                        .filter_map(|token| token.split('/').next()?.parse::<i64>().ok())
                        .filter_map(|index| resolve_index(index, vertices.len()))
                        .collect();
                    if face.len() >= 3 {
                        faces.push(face);
                    }
                }
                _ => {}
            }
        }

        Self { vertices, faces }
    }

    pub fn vertices(&self) -> &[[f32; 3]] {
        &self.vertices
    }

    pub fn faces(&self) -> &[Vec<usize>] {
        &self.faces
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }
}

/// Maps a one-based (or negative, relative) OBJ index to a zero-based one.
fn resolve_index(index: i64, vertex_count: usize) -> Option<usize> {
    let count = i64::try_from(vertex_count).ok()?;
    let resolved = if index < 0 { count + index } else { index - 1 };
    (0..count).contains(&resolved).then_some(resolved as usize)
}
