use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TerrainError};
use crate::expr::{CompiledExpr, Evaluator, compile};
use crate::height::HeightMatrix;

// Variables every layer function may reference, in binding order.
// `N` is the index of the function inside its layer.
pub const LAYER_VARIABLES: [&str; 3] = ["x", "y", "N"];

// Shading and visibility settings the renderer needs for one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhongConfig {
    pub ambient: f32,
    pub diffuse: f32,
    pub specular: f32,
    pub exponent: f32,
    pub color: [f32; 3], // 0–255, as edited in the UI
    pub enabled: bool,
    pub draw_surface: bool,
    pub cover_bottom: bool,
}

impl Default for PhongConfig {
    fn default() -> Self {
        Self {
            ambient: 0.1,
            diffuse: 0.9,
            specular: 0.4,
            exponent: 40.0,
            color: [255.0, 255.0, 255.0],
            enabled: true,
            draw_surface: true,
            cover_bottom: false,
        }
    }
}

impl PhongConfig {
    // Color scaled into 0–1 for shader uniforms.
    pub fn normalized_color(&self) -> [f32; 3] {
        self.color.map(|c| (c / 255.0).clamp(0.0, 1.0))
    }

    // Checks every scalar is finite and non-negative, and the color is within 0–255.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let scalars = [
            ("ambient", self.ambient),
            ("diffuse", self.diffuse),
            ("specular", self.specular),
            ("exponent", self.exponent),
        ];
        for (name, value) in scalars {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{} must be a non-negative number, got {}", name, value));
            }
        }
        if let Some(c) = self.color.iter().find(|c| !(0.0..=255.0).contains(*c)) {
            return Err(format!("color components must lie in 0..=255, got {}", c));
        }
        Ok(())
    }
}

// One set of height functions plus how to draw the result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub functions: Vec<String>,
    #[serde(default)]
    pub appearance: PhongConfig,
}

impl Layer {
    pub fn new<I, S>(functions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            functions: functions.into_iter().map(Into::into).collect(),
            appearance: PhongConfig::default(),
        }
    }

    pub fn with_appearance(mut self, appearance: PhongConfig) -> Self {
        self.appearance = appearance;
        self
    }

    // Layers without functions contribute nothing and are skipped.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    // Compile every function; `index` only labels errors.
    pub fn compile(&self, index: usize) -> Result<Vec<CompiledExpr>> {
        self.functions
            .iter()
            .enumerate()
            .map(|(function, src)| {
                compile(src, &LAYER_VARIABLES).map_err(|source| TerrainError::Expression {
                    layer: index,
                    function,
                    source,
                })
            })
            .collect()
    }
}

// Grid index to normalized coordinate: `2·i/n − 1`, covering `[-1, 1)`.
#[inline]
pub fn grid_coord(i: usize, n: usize) -> f64 {
    2.0 * (i as f64 / n as f64) - 1.0
}

// Sum every function of one layer over the grid.
//
// Function `N` is evaluated at each cell with `(x, y, N)` and added into the
// cell. Rows are filled in parallel; each row belongs to a single task and the
// evaluator is only read.
pub fn evaluate_layer(
    evaluator: &Evaluator,
    functions: &[CompiledExpr],
    width: usize,
    length: usize,
    layer: usize,
) -> Result<HeightMatrix> {
    if width < 2 || length < 2 {
        return Err(TerrainError::InvalidDimensions {
            width: width.try_into().unwrap_or(u32::MAX),
            length: length.try_into().unwrap_or(u32::MAX),
        });
    }
    let mut matrix = HeightMatrix::zeros(width, length)?;

    for (n, function) in functions.iter().enumerate() {
        let index = n as f64;
        matrix
            .as_mut_slice()
            .par_chunks_mut(length)
            .enumerate()
            .for_each(|(row, cells)| {
                let x = grid_coord(row, width);
                for (col, cell) in cells.iter_mut().enumerate() {
                    let y = grid_coord(col, length);
                    *cell += evaluator.evaluate(function, &[x, y, index]);
                }
            });

        if let Some(pos) = matrix.as_slice().iter().position(|v| !v.is_finite()) {
            return Err(TerrainError::NonFiniteHeight {
                layer,
                function: n,
                row: pos / length,
                col: pos % length,
            });
        }
    }

    debug!(
        "layer {}: {} function(s) over {}x{} grid",
        layer,
        functions.len(),
        width,
        length
    );
    Ok(matrix)
}
