// Stacks evaluated layers into the surfaces that get meshed.
//
// Layers are walked bottom to top. Disabled layers are ignored entirely.
// A running floor (pointwise max of every surface placed so far) is kept;
// a layer with `cover_bottom` is lifted onto that floor wherever it would
// dip beneath it, any other layer keeps its own heights and may be hidden by
// what lies below. Only layers with `draw_surface` are emitted, but hidden
// layers still raise the floor for the layers above them.

use crate::height::HeightMatrix;
use crate::layer::PhongConfig;

// One evaluated layer handed to the compositor.
pub struct LayerHeights<'a> {
    pub index: usize,
    pub appearance: &'a PhongConfig,
    pub heights: &'a HeightMatrix,
}

// A surface ready for meshing, tagged with the layer it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    pub index: usize,
    pub appearance: PhongConfig,
    pub heights: HeightMatrix,
}

pub fn composite<'a, I>(layers: I) -> Vec<Surface>
where
    I: IntoIterator<Item = LayerHeights<'a>>,
{
    let mut floor: Option<HeightMatrix> = None;
    let mut surfaces = Vec::new();

    for layer in layers {
        if !layer.appearance.enabled {
            continue;
        }

        let mut heights = layer.heights.clone();
        if layer.appearance.cover_bottom {
            if let Some(below) = &floor {
                heights.max_with(below);
            }
        }

        floor = Some(match floor.take() {
            Some(mut below) => {
                below.max_with(&heights);
                below
            }
            None => heights.clone(),
        });

        if layer.appearance.draw_surface {
            surfaces.push(Surface {
                index: layer.index,
                appearance: layer.appearance.clone(),
                heights,
            });
        }
    }

    surfaces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(v: f64) -> HeightMatrix {
        HeightMatrix::from_rows(&[vec![v, v], vec![v, v]]).unwrap()
    }

    fn ramp() -> HeightMatrix {
        HeightMatrix::from_rows(&[vec![-1.0, 0.0], vec![1.0, 2.0]]).unwrap()
    }

    fn config(cover_bottom: bool, draw_surface: bool, enabled: bool) -> PhongConfig {
        PhongConfig {
            cover_bottom,
            draw_surface,
            enabled,
            ..Default::default()
        }
    }

    #[test]
    fn independent_layers_pass_through() {
        let (base, water) = (ramp(), flat(0.5));
        let visible = config(false, true, true);
        let out = composite([
            LayerHeights { index: 0, appearance: &visible, heights: &base },
            LayerHeights { index: 1, appearance: &visible, heights: &water },
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].heights, base);
        assert_eq!(out[1].heights, water);
    }

    #[test]
    fn cover_bottom_never_dips_below_floor() {
        let (base, cover) = (ramp(), flat(0.5));
        let plain = config(false, true, true);
        let covering = config(true, true, true);
        let out = composite([
            LayerHeights { index: 0, appearance: &plain, heights: &base },
            LayerHeights { index: 1, appearance: &covering, heights: &cover },
        ]);
        assert_eq!(out[1].heights.as_slice(), &[0.5, 0.5, 1.0, 2.0]);
    }

    #[test]
    fn hidden_layers_still_raise_the_floor() {
        let (base, hidden, cover) = (flat(0.0), flat(3.0), flat(1.0));
        let out = composite([
            LayerHeights { index: 0, appearance: &config(false, true, true), heights: &base },
            LayerHeights { index: 1, appearance: &config(false, false, true), heights: &hidden },
            LayerHeights { index: 2, appearance: &config(true, true, true), heights: &cover },
        ]);
        let indices: Vec<usize> = out.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert!(out[1].appearance.cover_bottom);
        assert_eq!(out[1].heights, flat(3.0));
    }

    #[test]
    fn disabled_layers_are_ignored() {
        let (base, off, cover) = (flat(0.0), flat(9.0), flat(1.0));
        let out = composite([
            LayerHeights { index: 0, appearance: &config(false, true, true), heights: &base },
            LayerHeights { index: 1, appearance: &config(false, true, false), heights: &off },
            LayerHeights { index: 2, appearance: &config(true, true, true), heights: &cover },
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].heights, flat(1.0));
    }
}
