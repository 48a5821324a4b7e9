use crate::NoiseGenerator;

// Seeded 2D gradient noise, single octave.
// Octaves are stacked by the caller through the expression language,
// e.g. `perlin(x, y, 2^(N/2)) * 0.5`.
#[derive(Clone)]
pub struct PerlinNoise {
    seed: i64,
    perm: [u8; 512], // permutation table (256 duplicated)
}

impl PerlinNoise {
    pub fn new(seed: i64) -> Self {
        let mut p: Vec<u8> = (0..=255u8).collect();
        // xorshift stream keyed on the seed, used only for the shuffle
        let mut x = (seed as u64) ^ 0xDEADBEEFCAFEBABE_u64;
        let mut rng = || {
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            x
        };
        // Fisher–Yates shuffle p[0..256]
        for i in (1..256).rev() {
            let j = (rng() % (i as u64 + 1)) as usize;
            p.swap(i, j);
        }
        // Duplicated so corner lookups never need a modulo
        let mut perm = [0u8; 512];
        for (i, slot) in perm.iter_mut().enumerate() {
            *slot = p[i & 255];
        }

        Self { seed, perm }
    }

    pub fn seed(&self) -> i64 {
        self.seed
    }

    // 6t^5 − 15t^4 + 10t^3, zero first and second derivative at both ends
    #[inline]
    fn fade(t: f64) -> f64 {
        t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
    }

    #[inline]
    fn lerp(a: f64, b: f64, t: f64) -> f64 {
        a + t * (b - a)
    }

    // Low 4 bits of the hash pick one of the diagonal/axis gradient directions
    #[inline]
    fn grad(hash: u8, x: f64, y: f64) -> f64 {
        let h = hash & 0xF;
        let u = if h < 8 { x } else { y };
        let v = if h < 8 { y } else { x };
        let sign_u = if (h & 1) == 0 { u } else { -u };
        let sign_v = if (h & 2) == 0 { v } else { -v };
        sign_u + sign_v
    }

    #[inline]
    fn hash(&self, xi: usize, yi: usize) -> u8 {
        self.perm[self.perm[xi] as usize + yi]
    }
}

impl NoiseGenerator for PerlinNoise {
    // Returns a value in [−1, +1]
    fn get2(&self, x: f64, y: f64) -> f64 {
        let (fx, fy) = (x.floor(), y.floor());
        // Lattice cell, wrapped into the table
        let xi = (fx as i64 & 255) as usize;
        let yi = (fy as i64 & 255) as usize;
        // Offset inside the cell
        let xf = x - fx;
        let yf = y - fy;
        let u = Self::fade(xf);
        let v = Self::fade(yf);

        let aa = self.hash(xi, yi);
        let ab = self.hash(xi, yi + 1);
        let ba = self.hash(xi + 1, yi);
        let bb = self.hash(xi + 1, yi + 1);

        let x1 = Self::lerp(Self::grad(aa, xf, yf), Self::grad(ba, xf - 1.0, yf), u);
        let x2 = Self::lerp(
            Self::grad(ab, xf, yf - 1.0),
            Self::grad(bb, xf - 1.0, yf - 1.0),
            u,
        );
        Self::lerp(x1, x2, v)
    }
}
