// core holds the expression language, primitives, layer evaluation and meshing
pub mod composite;
pub mod error;
pub mod expr;
pub mod height;
pub mod layer;
pub mod lexer;
pub mod mesh;
pub mod noise;
pub mod primitives;
pub mod terrain;
pub mod utils;

pub use composite::{Surface, composite};
pub use error::{ParseError, TerrainError};
pub use expr::{CompiledExpr, Evaluator, compile};
pub use height::HeightMatrix;
pub use layer::{Layer, PhongConfig, evaluate_layer};
pub use mesh::{Mesh, MeshBuilder, Vertex};
pub use noise::PerlinNoise;
pub use primitives::Primitive;
pub use terrain::{LayerMesh, Terrain, TerrainConfig};

// Coherent noise sampled at a 2D point.
// Implementations must be read-only while sampling so one generator can be
// shared by every thread evaluating a grid.
pub trait NoiseGenerator: Send + Sync {
    fn get2(&self, x: f64, y: f64) -> f64;
}
