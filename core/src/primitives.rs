// Closed-form shapes usable inside layer expressions.
//
// Every primitive takes the query position `(x, y)` in normalized `[-1, 1]`
// grid space as its first two arguments, followed by shape parameters.

use glam::{DVec2, DVec3};

use crate::NoiseGenerator;

// Fixed corners of the unit square, clockwise from top-left
const CORNERS: [DVec2; 4] = [
    DVec2::new(-1.0, 1.0),
    DVec2::new(1.0, 1.0),
    DVec2::new(1.0, -1.0),
    DVec2::new(-1.0, -1.0),
];

// The terrain primitives known to the expression compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Perlin,
    Plane,
    Pyramid,
    Normal,
}

impl Primitive {
    pub const ALL: [Primitive; 4] = [
        Primitive::Perlin,
        Primitive::Plane,
        Primitive::Pyramid,
        Primitive::Normal,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Primitive::Perlin => "perlin",
            Primitive::Plane => "plane",
            Primitive::Pyramid => "pyramid",
            Primitive::Normal => "normal",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Primitive::Perlin => 3,
            Primitive::Plane => 5,
            Primitive::Pyramid => 9,
            Primitive::Normal => 4,
        }
    }

    // Only `perlin` reads the noise generator; the others are pure geometry.
    pub fn uses_noise(self) -> bool {
        matches!(self, Primitive::Perlin)
    }

    // `args.len()` must equal `self.arity()`; the compiler guarantees it.
    pub fn apply(self, noise: &dyn NoiseGenerator, args: &[f64]) -> f64 {
        self.shape(args)
            .unwrap_or_else(|| perlin(noise, args[0], args[1], args[2]))
    }

    // Evaluates the noise-free primitives, `None` for `perlin`.
    pub fn shape(self, args: &[f64]) -> Option<f64> {
        match self {
            Primitive::Perlin => None,
            Primitive::Plane => Some(plane(args[0], args[1], args[2], args[3], args[4])),
            Primitive::Pyramid => Some(pyramid(
                args[0],
                args[1],
                [args[2], args[3], args[4], args[5]],
                DVec3::new(args[6], args[7], args[8]),
            )),
            Primitive::Normal => Some(normal(args[0], args[1], args[2], args[3])),
        }
    }
}

// Noise sampled at (x·f, y·f)
pub fn perlin(noise: &dyn NoiseGenerator, x: f64, y: f64, f: f64) -> f64 {
    noise.get2(x * f, y * f)
}

// Height at (x, y) on the plane through three corners:
//
//  c1 ----- c2
//  |         |
//  |         |
//     ----- c3
pub fn plane(x: f64, y: f64, c1: f64, c2: f64, c3: f64) -> f64 {
    let corner1 = CORNERS[0].extend(c1);
    let corner2 = CORNERS[1].extend(c2);
    let corner3 = CORNERS[2].extend(c3);
    // z component of this cross product is always 4, the plane is never vertical
    let normal = (corner1 - corner2).cross(corner3 - corner2);
    height_on_plane(normal, corner2, x, y)
}

// Height of a four-sided pyramid over the unit square:
//
//  c1 ----- c2
//  | \     / |
//  |  apex   |
//  | /     \ |
//  c4 ----- c3
//
// The face whose 2D projection contains (x, y) supplies the height.
// Points outside every face get 0.
pub fn pyramid(x: f64, y: f64, heights: [f64; 4], apex: DVec3) -> f64 {
    let point = DVec2::new(x, y);
    for i in 0..4 {
        let p1 = CORNERS[i].extend(heights[i]);
        let p2 = CORNERS[(i + 1) % 4].extend(heights[(i + 1) % 4]);

        if !in_triangle(point, p1.truncate(), p2.truncate(), apex.truncate()) {
            continue;
        }
        let normal = (p1 - p2).cross(apex - p2);
        // Face projects to a line, it cannot own any area
        if normal.z.abs() < f64::EPSILON {
            continue;
        }
        return height_on_plane(normal, p2, x, y);
    }
    0.0
}

// Separable Gaussian bump, each axis scaled so its peak is 1.
pub fn normal(x: f64, y: f64, sx: f64, sy: f64) -> f64 {
    unit_gaussian(x, sx) * unit_gaussian(y, sy)
}

// exp(−v²/2σ²). A zero σ collapses to an indicator of v == 0
// instead of dividing by zero.
fn unit_gaussian(v: f64, sigma: f64) -> f64 {
    if sigma == 0.0 {
        return if v == 0.0 { 1.0 } else { 0.0 };
    }
    (-(v * v) / (2.0 * sigma * sigma)).exp()
}

// Solve n·(p − origin) = 0 for z. Caller ensures n.z != 0.
#[inline]
fn height_on_plane(normal: DVec3, origin: DVec3, x: f64, y: f64) -> f64 {
    (-normal.x * (x - origin.x) - normal.y * (y - origin.y)) / normal.z + origin.z
}

// Same-sign half-plane test against all three edges; points on an edge count as inside.
fn in_triangle(p: DVec2, a: DVec2, b: DVec2, c: DVec2) -> bool {
    let d1 = (b - a).perp_dot(p - a);
    let d2 = (c - b).perp_dot(p - b);
    let d3 = (a - c).perp_dot(p - c);
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}
