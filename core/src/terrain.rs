use std::time::Instant;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::composite::{LayerHeights, composite};
use crate::error::{Result, TerrainError};
use crate::expr::{CompiledExpr, Evaluator};
use crate::height::HeightMatrix;
use crate::layer::{Layer, PhongConfig, evaluate_layer};
use crate::mesh::{Mesh, MeshBuilder};

// Everything needed to rebuild a terrain, as supplied by a UI or a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub seed: i64,
    pub width: u32,
    pub length: u32,
    #[serde(default)]
    pub layers: Vec<Layer>,
}

// Mesh of one surfaced layer together with its shading settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerMesh {
    pub layer: usize,
    pub appearance: PhongConfig,
    pub mesh: Mesh,
}

// A named, seeded grid with an ordered (bottom to top) stack of layers.
//
// The pipeline is `configure → evaluate → generate`, replayed in full on
// every change. Height matrices are only replaced after a successful
// evaluation, so a failed attempt leaves the last good result in place.
pub struct Terrain {
    seed: i64,
    name: String,
    width: u32,
    length: u32,
    layers: Vec<Layer>,
    // Result of the last successful evaluation, empty layers excluded
    evaluated: Option<Vec<EvaluatedLayer>>,
}

// Heights plus the appearance they were evaluated with, so later edits to
// the layer stack cannot desync a generate call from its matrices
struct EvaluatedLayer {
    index: usize,
    appearance: PhongConfig,
    heights: HeightMatrix,
}

impl Default for Terrain {
    fn default() -> Self {
        Self {
            seed: 0,
            name: String::new(),
            width: 100,
            length: 100,
            layers: Vec::new(),
            evaluated: None,
        }
    }
}

impl Terrain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    // Builds and validates a terrain; nothing is evaluated yet.
    pub fn from_config(config: TerrainConfig) -> Result<Self> {
        let terrain = Self {
            seed: config.seed,
            name: config.name,
            width: config.width,
            length: config.length,
            layers: config.layers,
            evaluated: None,
        };
        terrain.validate()?;
        Ok(terrain)
    }

    pub fn to_config(&self) -> TerrainConfig {
        TerrainConfig {
            name: self.name.clone(),
            seed: self.seed,
            width: self.width,
            length: self.length,
            layers: self.layers.clone(),
        }
    }

    pub fn seed(&self) -> i64 {
        self.seed
    }

    pub fn set_seed(&mut self, seed: i64) {
        self.seed = seed;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn set_size(&mut self, width: u32, length: u32) {
        self.width = width;
        self.length = length;
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer_mut(&mut self, index: usize) -> Result<&mut Layer> {
        let len = self.layers.len();
        self.layers
            .get_mut(index)
            .ok_or(TerrainError::LayerIndex { index, len })
    }

    pub fn push_layer(&mut self, layer: Layer) {
        self.layers.push(layer);
    }

    // Insert so the new layer ends up at `pos`; `pos == len` appends.
    pub fn insert_layer(&mut self, pos: usize, layer: Layer) -> Result<()> {
        if pos > self.layers.len() {
            return Err(TerrainError::LayerIndex {
                index: pos,
                len: self.layers.len(),
            });
        }
        self.layers.insert(pos, layer);
        Ok(())
    }

    pub fn erase_layer(&mut self, pos: usize) -> Result<Layer> {
        if pos >= self.layers.len() {
            return Err(TerrainError::LayerIndex {
                index: pos,
                len: self.layers.len(),
            });
        }
        Ok(self.layers.remove(pos))
    }

    // Check dimensions, appearances and every expression without evaluating.
    // Returns the compiled functions per layer, empty for empty layers.
    pub fn validate(&self) -> Result<Vec<Vec<CompiledExpr>>> {
        if self.width < 2 || self.length < 2 {
            return Err(TerrainError::InvalidDimensions {
                width: self.width,
                length: self.length,
            });
        }
        self.layers
            .iter()
            .enumerate()
            .map(|(index, layer)| {
                layer
                    .appearance
                    .validate()
                    .map_err(|reason| TerrainError::InvalidAppearance {
                        layer: index,
                        reason,
                    })?;
                layer.compile(index)
            })
            .collect()
    }

    // Evaluate every non-empty layer into a fresh height matrix.
    pub fn evaluate(&mut self) -> Result<()> {
        let compiled = self.validate()?;
        let evaluator = Evaluator::new(self.seed);
        let (width, length) = (self.width as usize, self.length as usize);

        let mut evaluated = Vec::with_capacity(self.layers.len());
        for (index, (functions, layer)) in compiled.iter().zip(&self.layers).enumerate() {
            if functions.is_empty() {
                warn!("layer {} of '{}' has no functions, skipped", index, self.name);
                continue;
            }
            let heights = evaluate_layer(&evaluator, functions, width, length, index)?;
            evaluated.push(EvaluatedLayer {
                index,
                appearance: layer.appearance.clone(),
                heights,
            });
        }

        self.evaluated = Some(evaluated);
        Ok(())
    }

    // Height matrix of `layer` from the last successful evaluation.
    pub fn height_matrix(&self, layer: usize) -> Option<&HeightMatrix> {
        self.evaluated
            .as_ref()?
            .iter()
            .find(|e| e.index == layer)
            .map(|e| &e.heights)
    }

    // Composite the evaluated layers and mesh every surfaced one.
    pub fn generate(&self) -> Result<Vec<LayerMesh>> {
        let evaluated = self.evaluated.as_ref().ok_or(TerrainError::NotEvaluated)?;

        let stack = evaluated.iter().map(|e| LayerHeights {
            index: e.index,
            appearance: &e.appearance,
            heights: &e.heights,
        });

        composite(stack)
            .into_iter()
            .map(|surface| {
                let mesh = MeshBuilder::new(&surface.heights)
                    .for_layer(surface.index)
                    .build()?;
                Ok(LayerMesh {
                    layer: surface.index,
                    appearance: surface.appearance,
                    mesh,
                })
            })
            .collect()
    }

    // Full recompute: evaluate then generate.
    pub fn regenerate(&mut self) -> Result<Vec<LayerMesh>> {
        let start = Instant::now();
        self.evaluate()?;
        let meshes = self.generate()?;
        info!(
            "regenerated '{}' (seed {}, {}x{}): {} surface(s), {} vertices in {:.2} ms",
            self.name,
            self.seed,
            self.width,
            self.length,
            meshes.len(),
            meshes.iter().map(|m| m.mesh.len()).sum::<usize>(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(meshes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_terrain() -> Terrain {
        let mut t = Terrain::new("flat");
        t.set_seed(1);
        t.set_size(4, 4);
        t.push_layer(Layer::new(["plane(x, y, 0, 0, 0)"]));
        t
    }

    #[test]
    fn setters_and_getters() {
        let mut t = Terrain::new("a");
        t.set_name("b");
        t.set_seed(-5);
        t.set_size(8, 3);
        assert_eq!((t.name(), t.seed(), t.width(), t.length()), ("b", -5, 8, 3));
    }

    #[test]
    fn layer_editing_preserves_order() {
        let mut t = Terrain::new("layers");
        t.push_layer(Layer::new(["1"]));
        t.push_layer(Layer::new(["3"]));
        t.insert_layer(1, Layer::new(["2"])).unwrap();
        let firsts: Vec<&str> = t.layers().iter().map(|l| l.functions[0].as_str()).collect();
        assert_eq!(firsts, ["1", "2", "3"]);

        let removed = t.erase_layer(0).unwrap();
        assert_eq!(removed.functions, ["1"]);
        assert!(matches!(
            t.insert_layer(5, Layer::default()),
            Err(TerrainError::LayerIndex { index: 5, len: 2 })
        ));
        assert!(t.erase_layer(2).is_err());
        t.layer_mut(0).unwrap().functions.push("0.5".into());
        assert_eq!(t.layers()[0].functions.len(), 2);
    }

    #[test]
    fn generate_requires_evaluation() {
        let t = flat_terrain();
        assert!(matches!(t.generate(), Err(TerrainError::NotEvaluated)));
    }

    #[test]
    fn flat_scenario() {
        let mut t = flat_terrain();
        let meshes = t.regenerate().unwrap();
        let m = t.height_matrix(0).unwrap();
        assert!(m.as_slice().iter().all(|&v| v == 0.0));
        assert_eq!(meshes.len(), 1);
        assert_eq!(meshes[0].mesh.len(), 54);
    }

    #[test]
    fn empty_layers_are_skipped() {
        let mut t = flat_terrain();
        t.insert_layer(0, Layer::default()).unwrap();
        let meshes = t.regenerate().unwrap();
        assert!(t.height_matrix(0).is_none());
        assert!(t.height_matrix(1).is_some());
        assert_eq!(meshes.len(), 1);
        assert_eq!(meshes[0].layer, 1);
    }

    #[test]
    fn failed_evaluation_keeps_previous_heights() {
        let mut t = flat_terrain();
        t.evaluate().unwrap();
        t.layer_mut(0).unwrap().functions[0] = "plane(x, y)".into();
        let err = t.evaluate().unwrap_err();
        assert!(matches!(err, TerrainError::Expression { layer: 0, function: 0, .. }));
        assert!(t.height_matrix(0).is_some());
    }

    #[test]
    fn dimensions_are_validated() {
        let mut t = flat_terrain();
        t.set_size(1, 10);
        assert!(matches!(
            t.evaluate(),
            Err(TerrainError::InvalidDimensions { width: 1, length: 10 })
        ));
    }

    #[test]
    fn invalid_appearance_is_reported() {
        let mut t = flat_terrain();
        t.layer_mut(0).unwrap().appearance.exponent = f32::NAN;
        assert!(matches!(
            t.validate(),
            Err(TerrainError::InvalidAppearance { layer: 0, .. })
        ));
    }

    #[test]
    fn meshes_keep_their_layer_appearance() {
        let mut t = flat_terrain();
        let red = PhongConfig {
            color: [255.0, 0.0, 0.0],
            ..Default::default()
        };
        t.push_layer(Layer::new(["0.5"]).with_appearance(red.clone()));
        let meshes = t.regenerate().unwrap();
        assert_eq!(meshes[0].appearance, PhongConfig::default());
        assert_eq!(meshes[1].appearance, red);
    }

    #[test]
    fn oversized_heights_fail_generation() {
        let mut t = flat_terrain();
        t.set_size(3, 3);
        t.layer_mut(0).unwrap().functions[0] = "1e39 * x".into();
        t.evaluate().unwrap();
        assert!(matches!(
            t.generate(),
            Err(TerrainError::HeightOutOfRange { layer: 0, row: 0, .. })
        ));
    }

    #[test]
    fn config_roundtrip() {
        let t = flat_terrain();
        let rebuilt = Terrain::from_config(t.to_config()).unwrap();
        assert_eq!(rebuilt.to_config(), t.to_config());
    }
}
