use image::{Rgb, RgbImage};
use palette::{Gradient, LinSrgb};

use crate::height::HeightMatrix;

const GAMMA_CORRECTION: f64 = 1.2;

// Heights rescaled to [0, 1] with a gamma curve for contrast, row-major.
// A perfectly flat matrix maps to 0.5 everywhere.
pub fn normalized(matrix: &HeightMatrix) -> Vec<f32> {
    let Some((min, max)) = matrix.min_max() else {
        return Vec::new();
    };
    let range = max - min;
    if range < f64::EPSILON {
        return vec![0.5; matrix.as_slice().len()];
    }
    matrix
        .as_slice()
        .iter()
        .map(|&h| ((h - min) / range).powf(GAMMA_CORRECTION) as f32)
        .collect()
}

// Color a height matrix for a quick top-down look:
// deep water, sand, grass, rock, snow. Rows become image columns so the
// picture matches the mesh seen from above.
pub fn to_terrain_image(matrix: &HeightMatrix) -> RgbImage {
    let gradient = Gradient::with_domain(vec![
        (0.00, LinSrgb::new(0.0, 0.0, 0.5)), // deep blue
        (0.30, LinSrgb::new(0.8, 0.8, 0.5)), // sand
        (0.50, LinSrgb::new(0.1, 0.6, 0.2)), // green
        (0.75, LinSrgb::new(0.5, 0.4, 0.3)), // rock
        (1.00, LinSrgb::new(1.0, 1.0, 1.0)), // snow
    ]);

    let (width, length) = (matrix.width(), matrix.length());
    let flat = normalized(matrix);
    let mut img = RgbImage::new(width as u32, length as u32);
    for row in 0..width {
        for col in 0..length {
            let col_rgb: LinSrgb = gradient.get(flat[row * length + col]);
            let rgb = col_rgb.into_format::<u8>();
            // grid y grows upwards, image y grows downwards
            let py = (length - 1 - col) as u32;
            img.put_pixel(row as u32, py, Rgb([rgb.red, rgb.green, rgb.blue]));
        }
    }
    img
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_spans_unit_range() {
        let m = HeightMatrix::from_rows(&[vec![-2.0, 0.0], vec![1.0, 2.0]]).unwrap();
        let n = normalized(&m);
        assert_eq!(n[0], 0.0);
        assert_eq!(n[3], 1.0);
        assert!(n.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn flat_matrix_is_mid_grey() {
        let m = HeightMatrix::zeros(3, 3).unwrap();
        assert!(normalized(&m).iter().all(|&v| v == 0.5));
    }

    #[test]
    fn image_matches_grid_shape() {
        let m = HeightMatrix::from_rows(&[vec![0.0, 1.0, 2.0], vec![3.0, 4.0, 5.0]]).unwrap();
        let img = to_terrain_image(&m);
        assert_eq!(img.dimensions(), (2, 3));
        // lowest point is deep water, highest is snow
        let [r, g, b] = img.get_pixel(0, 2).0;
        assert_eq!((r, g), (0, 0));
        assert!((127..=128).contains(&b));
        assert_eq!(img.get_pixel(1, 0).0, [255, 255, 255]);
    }
}
