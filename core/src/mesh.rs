// Triangulates a height matrix into a flat vertex list with face and
// smoothed normals.
//
// Each grid quad `(row, col)` has corners
//
//  c1 (row+1, col) ---- c2 (row+1, col+1)
//   |                 /  |
//   |      top      /    |
//   |            /       |
//   |         /  bottom  |
//  c4 (row, col) ------ c3 (row, col+1)
//
// and is emitted as the triangles `(c4, c1, c2)` and `(c2, c3, c4)`, three
// independent vertices each, so flat and smooth normals can live side by side.

use glam::Vec3;

use crate::error::{Result, TerrainError};
use crate::height::HeightMatrix;
use crate::layer::grid_coord;

pub const VERTICES_PER_QUAD: usize = 6;

// Largest |height| that keeps every f32 product in the normal math finite
pub const MAX_MESH_HEIGHT: f64 = 1e9;

// (row, col) offsets of the corners inside a quad
const C1: (usize, usize) = (1, 0);
const C2: (usize, usize) = (1, 1);
const C3: (usize, usize) = (0, 1);
const C4: (usize, usize) = (0, 0);

const TRIANGLES: [[(usize, usize); 3]; 2] = [[C4, C1, C2], [C2, C3, C4]];

// GPU-ready vertex: position, flat normal, smoothed normal.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub pos: Vec3,
    pub face_norm: Vec3,
    pub smooth_norm: Vec3,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    vertices: Vec<Vertex>,
    min: Vec3,
    max: Vec3,
}

impl Mesh {
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    // Axis-aligned bounds of all positions, `None` for an empty mesh.
    pub fn bounding_box(&self) -> Option<(Vec3, Vec3)> {
        (!self.is_empty()).then_some((self.min, self.max))
    }
}

// Builds a `Mesh` from one height matrix.
pub struct MeshBuilder<'a> {
    heights: &'a HeightMatrix,
    layer: usize,
}

impl<'a> MeshBuilder<'a> {
    pub fn new(heights: &'a HeightMatrix) -> Self {
        Self { heights, layer: 0 }
    }

    // Layer index reported in errors
    pub fn for_layer(mut self, layer: usize) -> Self {
        self.layer = layer;
        self
    }

    // Number of vertices `build` will emit.
    pub fn vertex_count(&self) -> Option<usize> {
        let quads_w = self.heights.width().checked_sub(1)?;
        let quads_l = self.heights.length().checked_sub(1)?;
        quads_w
            .checked_mul(quads_l)?
            .checked_mul(VERTICES_PER_QUAD)
    }

    // Grid point to 3D: height goes up, grid y becomes negated depth
    fn position(&self, row: usize, col: usize) -> Vec3 {
        let x = grid_coord(row, self.heights.width());
        let y = grid_coord(col, self.heights.length());
        Vec3::new(x as f32, self.heights.get(row, col) as f32, -y as f32)
    }

    pub fn build(&self) -> Result<Mesh> {
        let (width, length) = (self.heights.width(), self.heights.length());
        if width < 2 || length < 2 {
            return Err(TerrainError::InvalidDimensions {
                width: width.try_into().unwrap_or(u32::MAX),
                length: length.try_into().unwrap_or(u32::MAX),
            });
        }
        let too_large = || TerrainError::GridTooLarge {
            width: width.try_into().unwrap_or(u32::MAX),
            length: length.try_into().unwrap_or(u32::MAX),
        };
        let count = self.vertex_count().ok_or_else(too_large)?;

        let data = self.heights.as_slice();
        if let Some(pos) = data.iter().position(|h| !(h.abs() <= MAX_MESH_HEIGHT)) {
            return Err(TerrainError::HeightOutOfRange {
                layer: self.layer,
                row: pos / length,
                col: pos % length,
                value: data[pos],
            });
        }

        let mut vertices: Vec<Vertex> = Vec::new();
        vertices.try_reserve_exact(count).map_err(|_| too_large())?;
        // One accumulator per grid point, shared by every vertex copy at that point
        let mut accum: Vec<Vec3> = Vec::new();
        accum
            .try_reserve_exact(width * length)
            .map_err(|_| too_large())?;
        accum.resize(width * length, Vec3::ZERO);

        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);

        for row in 0..width - 1 {
            for col in 0..length - 1 {
                for triangle in TRIANGLES {
                    let points = triangle.map(|(dr, dc)| (row + dr, col + dc));
                    let [p0, p1, p2] = points.map(|(r, c)| self.position(r, c));
                    let face_norm = (p1 - p0).cross(p2 - p0).try_normalize().unwrap_or(Vec3::Y);

                    // Interior angle at each corner weights its share of the face normal
                    let angles = [
                        (p1 - p0).angle_between(p2 - p0),
                        (p2 - p1).angle_between(p0 - p1),
                        (p0 - p2).angle_between(p1 - p2),
                    ];
                    for (((r, c), pos), angle) in points.into_iter().zip([p0, p1, p2]).zip(angles) {
                        accum[r * length + c] += face_norm * angle;
                        min = min.min(pos);
                        max = max.max(pos);
                        vertices.push(Vertex {
                            pos,
                            face_norm,
                            smooth_norm: Vec3::ZERO,
                        });
                    }
                }
            }
        }

        let smooth: Vec<Vec3> = accum
            .into_iter()
            .map(|n| n.try_normalize().unwrap_or(Vec3::Y))
            .collect();

        // Same traversal order as above, writing each grid point's normal back
        for (quad, chunk) in vertices.chunks_exact_mut(VERTICES_PER_QUAD).enumerate() {
            let (row, col) = (quad / (length - 1), quad % (length - 1));
            let corners = TRIANGLES.iter().flatten();
            for (vertex, &(dr, dc)) in chunk.iter_mut().zip(corners) {
                vertex.smooth_norm = smooth[(row + dr) * length + col + dc];
            }
        }

        Ok(Mesh {
            vertices,
            min,
            max,
        })
    }
}
