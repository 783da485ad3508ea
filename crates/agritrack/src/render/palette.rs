use std::collections::HashMap;

use image::Rgb;

/// Default seed; any fixed value gives reproducible colors across runs.
pub const DEFAULT_COLOR_SEED: u64 = 0x5eed_c0de;

/// Job-scoped identity → color cache.
///
/// A color is derived from a seeded hash of the identity on first use and
/// reused for every later frame of the same job.
#[derive(Debug, Clone)]
pub struct ColorTable {
    seed: u64,
    colors: HashMap<u64, Rgb<u8>>,
}

impl ColorTable {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            colors: HashMap::new(),
        }
    }

    pub fn color_for(&mut self, id: u64) -> Rgb<u8> {
        let seed = self.seed;
        *self.colors.entry(id).or_insert_with(|| derive_color(seed, id))
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

impl Default for ColorTable {
    fn default() -> Self {
        Self::new(DEFAULT_COLOR_SEED)
    }
}

/// splitmix64 finalizer.
fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Saturated, bright color. The hue is spread with the golden ratio so
/// consecutive identities land far apart on the color wheel.
fn derive_color(seed: u64, id: u64) -> Rgb<u8> {
    const GOLDEN_RATIO_CONJUGATE: f64 = 0.618_033_988_749_895;

    let h = mix(seed ^ mix(id));
    let base = (h >> 11) as f64 / (1u64 << 53) as f64;
    let hue = (base + id as f64 * GOLDEN_RATIO_CONJUGATE).fract();
    let saturation = 0.75 + ((h & 0xff) as f64 / 255.0) * 0.2;
    let value = 0.85 + (((h >> 8) & 0xff) as f64 / 255.0) * 0.15;
    hsv_to_rgb(hue, saturation, value)
}

fn hsv_to_rgb(h: f64, s: f64, v: f64) -> Rgb<u8> {
    let sector = (h * 6.0).floor();
    let f = h * 6.0 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);
    let (r, g, b) = match sector as i64 % 6 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    let to_u8 = |c: f64| (c * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgb([to_u8(r), to_u8(g), to_u8(b)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_identity_same_color() {
        let mut table = ColorTable::default();
        let first = table.color_for(7);
        for _ in 0..10 {
            assert_eq!(table.color_for(7), first);
        }
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_reproducible_across_tables() {
        let mut a = ColorTable::new(42);
        let mut b = ColorTable::new(42);
        for id in 1..50 {
            assert_eq!(a.color_for(id), b.color_for(id));
        }
    }

    #[test]
    fn test_neighbouring_identities_differ() {
        let mut table = ColorTable::default();
        for id in 1..20 {
            assert_ne!(table.color_for(id), table.color_for(id + 1));
        }
    }

    #[test]
    fn test_hsv_primaries() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), Rgb([255, 0, 0]));
        assert_eq!(hsv_to_rgb(0.5, 1.0, 1.0), Rgb([0, 255, 255]));
        assert_eq!(hsv_to_rgb(0.0, 0.0, 0.5), Rgb([128, 128, 128]));
    }
}
