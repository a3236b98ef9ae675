//! Geometric features of a mesh.

use super::mesh::ObjMesh;
use crate::core::errors::AdvisorError;
use serde::Serialize;
use std::collections::HashSet;
use std::f64::consts::PI;
use std::fmt;

const DENSITY_DIVISIONS: usize = 10;
const MIN_SPAN: f64 = 1e-6;

/// Axis-aligned bounds of a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoundingBox {
    fn from_vertices(vertices: &[[f32; 3]]) -> Self {
        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        for v in vertices {
            for axis in 0..3 {
                min[axis] = min[axis].min(f64::from(v[axis]));
                max[axis] = max[axis].max(f64::from(v[axis]));
            }
        }
        Self { min, max }
    }

    /// Extent along each axis.
    pub fn spans(&self) -> [f64; 3] {
        [0, 1, 2].map(|axis| self.max[axis] - self.min[axis])
    }

    fn largest_span(&self) -> f64 {
        self.spans().into_iter().fold(f64::NEG_INFINITY, f64::max)
    }

    fn smallest_span(&self) -> f64 {
        self.spans().into_iter().fold(f64::INFINITY, f64::min)
    }

    pub fn volume(&self) -> f64 {
        self.spans().iter().product()
    }
}

/// The ten shape descriptors fed to the recommender, in input-vector order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeometryFeatures {
    pub linearity: f64,
    pub planarity: f64,
    pub sphericity: f64,
    pub anisotropy: f64,
    pub curvature: f64,
    pub euler_number: f64,
    pub compactness: f64,
    pub aspect_ratio: f64,
    pub convexity: f64,
    pub local_density: f64,
}

impl GeometryFeatures {
    pub fn to_array(&self) -> [f64; 10] {
        [
            self.linearity,
            self.planarity,
            self.sphericity,
            self.anisotropy,
            self.curvature,
            self.euler_number,
            self.compactness,
            self.aspect_ratio,
            self.convexity,
            self.local_density,
        ]
    }
}

impl fmt::Display for GeometryFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Linearity: {:.4}", self.linearity)?;
        writeln!(f, "Planarity: {:.4}", self.planarity)?;
        writeln!(f, "Sphericity: {:.4}", self.sphericity)?;
        writeln!(f, "Anisotropy: {:.4}", self.anisotropy)?;
        writeln!(f, "Curvature: {:.4}", self.curvature)?;
        writeln!(f, "Euler: {:.2}", self.euler_number)?;
        writeln!(f, "Compactness: {:.4}", self.compactness)?;
        writeln!(f, "Aspect Ratio: {:.4}", self.aspect_ratio)?;
        writeln!(f, "Convexity: {:.4}", self.convexity)?;
        write!(f, "Local Density: {:.4}", self.local_density)
    }
}

/// Result of analysing a mesh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeshAnalysis {
    pub features: GeometryFeatures,
    pub vertex_count: usize,
    pub face_count: usize,
    pub edge_count: usize,
    pub surface_area: f64,
    /// Absolute value of the signed volume.
    pub volume: f64,
    pub bounds: BoundingBox,
}

impl MeshAnalysis {
    /// Computes the geometric features of `mesh`.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the mesh has no vertices or no faces.
    pub fn calculate(mesh: &ObjMesh) -> Result<Self, AdvisorError> {
        let vertices = mesh.vertices();
        let faces = mesh.faces();
        if vertices.is_empty() || faces.is_empty() {
            return Err(AdvisorError::invalid_input("mesh must contain vertices and faces"));
        }

        let bounds = BoundingBox::from_vertices(vertices);
        let stats = SurfaceStats::from_mesh(vertices, faces);

        let features = GeometryFeatures {
            linearity: linearity(&bounds),
            planarity: planarity(vertices),
            sphericity: sphericity(&stats),
            anisotropy: anisotropy(vertices, faces),
            curvature: curvature(vertices, faces),
            euler_number: vertices.len() as f64 - stats.edge_count as f64 + faces.len() as f64,
            compactness: stats.surface_area / faces.len() as f64,
            aspect_ratio: bounds.largest_span() / bounds.smallest_span().max(MIN_SPAN),
            convexity: convexity(stats.volume, &bounds),
            local_density: local_density(vertices, &bounds) as f64,
        };

        tracing::debug!(
            vertices = vertices.len(),
            faces = faces.len(),
            edges = stats.edge_count,
            "mesh analysed"
        );

        Ok(Self {
            features,
            vertex_count: vertices.len(),
            face_count: faces.len(),
            edge_count: stats.edge_count,
            surface_area: stats.surface_area,
            volume: stats.volume,
            bounds,
        })
    }

    /// Multi-line text report.
    pub fn describe(&self) -> String {
        format!(
            "Vertices: {}\nFaces: {}\nSurface area: {:.4}\nVolume: {:.4}\n\n{}",
            self.vertex_count, self.face_count, self.surface_area, self.volume, self.features
        )
    }
}

struct SurfaceStats {
    surface_area: f64,
    volume: f64,
    edge_count: usize,
}

impl SurfaceStats {
    /// Fan-triangulates each face; the volume sums signed tetrahedra against the origin.
    fn from_mesh(vertices: &[[f32; 3]], faces: &[Vec<usize>]) -> Self {
        let mut surface_area = 0.0;
        let mut signed_volume = 0.0;
        let mut edges = HashSet::new();

        for face in faces {
            for (v0, v1, v2) in fan(vertices, face) {
                surface_area += 0.5 * norm(cross(sub(v1, v0), sub(v2, v0)));
                signed_volume += dot(v0, cross(v1, v2)) / 6.0;
            }
            for (i, &a) in face.iter().enumerate() {
                let b = face[(i + 1) % face.len()];
                edges.insert((a.min(b), a.max(b)));
            }
        }

        Self {
            surface_area,
            volume: signed_volume.abs(),
            edge_count: edges.len(),
        }
    }
}

type Vec3 = [f64; 3];

fn point(vertices: &[[f32; 3]], index: usize) -> Vec3 {
    vertices[index].map(f64::from)
}

/// Triangles `(v0, vi, vi+1)` of a face fan.
fn fan<'a>(
    vertices: &'a [[f32; 3]],
    face: &'a [usize],
) -> impl Iterator<Item = (Vec3, Vec3, Vec3)> + 'a {
    let v0 = point(vertices, face[0]);
    face[1..]
        .windows(2)
        .map(move |pair| (v0, point(vertices, pair[0]), point(vertices, pair[1])))
}

fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn norm(a: Vec3) -> f64 {
    dot(a, a).sqrt()
}

fn linearity(bounds: &BoundingBox) -> f64 {
    let min = bounds.smallest_span();
    if min > MIN_SPAN {
        bounds.largest_span() / min
    } else {
        0.0
    }
}

/// Mean distance of the vertices to their centroid.
fn planarity(vertices: &[[f32; 3]]) -> f64 {
    let count = vertices.len() as f64;
    let mut centroid = [0.0; 3];
    for v in vertices {
        for axis in 0..3 {
            centroid[axis] += f64::from(v[axis]);
        }
    }
    let centroid = centroid.map(|c| c / count);
    vertices
        .iter()
        .map(|v| norm(sub(v.map(f64::from), centroid)))
        .sum::<f64>()
        / count
}

fn sphericity(stats: &SurfaceStats) -> f64 {
    if stats.surface_area <= 0.0 || stats.volume <= 0.0 {
        return 0.0;
    }
    PI.cbrt() * (6.0 * stats.volume).powf(2.0 / 3.0) / stats.surface_area
}

/// RMS deviation of fan-triangle corner angles at `v0` from a right angle.
fn anisotropy(vertices: &[[f32; 3]], faces: &[Vec<usize>]) -> f64 {
    let mut sum_squared = 0.0;
    let mut valid = 0usize;
    for face in faces {
        for (v0, v1, v2) in fan(vertices, face) {
            let e1 = sub(v1, v0);
            let e2 = sub(v2, v0);
            let (len1, len2) = (norm(e1), norm(e2));
            if len1 < MIN_SPAN || len2 < MIN_SPAN {
                continue;
            }
            let angle = (dot(e1, e2) / (len1 * len2)).clamp(-1.0, 1.0).acos();
            sum_squared += (angle - PI / 2.0).powi(2);
            valid += 1;
        }
    }
    if valid == 0 {
        0.0
    } else {
        (sum_squared / valid as f64).sqrt()
    }
}

/// Unit normal of a face's first triangle, or zero when degenerate.
fn face_normal(vertices: &[[f32; 3]], face: &[usize]) -> Vec3 {
    let v0 = point(vertices, face[0]);
    let n = cross(sub(point(vertices, face[1]), v0), sub(point(vertices, face[2]), v0));
    let length = norm(n);
    if length < MIN_SPAN {
        [0.0; 3]
    } else {
        n.map(|c| c / length)
    }
}

/// Mean angle between the normals of consecutive faces.
fn curvature(vertices: &[[f32; 3]], faces: &[Vec<usize>]) -> f64 {
    if faces.len() < 2 {
        return 0.0;
    }
    let normals: Vec<Vec3> = faces.iter().map(|face| face_normal(vertices, face)).collect();
    let total: f64 = normals
        .windows(2)
        .map(|pair| dot(pair[0], pair[1]).clamp(-1.0, 1.0).acos())
        .sum();
    total / (normals.len() - 1) as f64
}

fn convexity(volume: f64, bounds: &BoundingBox) -> f64 {
    if volume <= 0.0 {
        return 0.0;
    }
    volume / bounds.volume().max(MIN_SPAN)
}

/// Highest vertex count of any cell in a 10x10x10 grid over the bounds.
fn local_density(vertices: &[[f32; 3]], bounds: &BoundingBox) -> usize {
    let n = DENSITY_DIVISIONS;
    let cell = bounds.spans().map(|span| (span / n as f64).max(MIN_SPAN));
    let mut grid = vec![0usize; n * n * n];
    let mut max_count = 0;
    for v in vertices {
        let [i, j, k] = [0, 1, 2].map(|axis| {
            let offset = ((f64::from(v[axis]) - bounds.min[axis]) / cell[axis]).floor();
            (offset.max(0.0) as usize).min(n - 1)
        });
        let slot = &mut grid[(i * n + j) * n + k];
        *slot += 1;
        max_count = max_count.max(*slot);
    }
    max_count
}
