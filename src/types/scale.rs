//! Linear conversion between raw hardware values and engineering units.
//!
//! `eng = raw*(hi-lo)/(H-L) + (H*lo - L*hi)/(H-L)` for raw bounds `[L,H]` and engineering
//! bounds `[lo,hi]`. Raw values arrive already widened from their storage type, so unsigned
//! raws near the type maximum never pass through a signed intermediate.
use super::catalog::RawBounds;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearScale {
    raw_low: f64,
    raw_high: f64,
    eng_low: f64,
    eng_high: f64,
}

impl LinearScale {
    /// `None` when the raw bounds coincide and no conversion is defined.
    pub fn new(raw: RawBounds, eng_low: f64, eng_high: f64) -> Option<Self> {
        if raw.low == raw.high {
            return None;
        }
        Some(Self {
            raw_low: raw.low as f64,
            raw_high: raw.high as f64,
            eng_low,
            eng_high,
        })
    }

    pub fn to_engineering(&self, raw: f64) -> f64 {
        let (l, h, lo, hi) = (self.raw_low, self.raw_high, self.eng_low, self.eng_high);
        raw * (hi - lo) / (h - l) + (h * lo - l * hi) / (h - l)
    }

    /// Inverse conversion, rounded and clamped to the raw bounds.
    pub fn to_raw(&self, eng: f64) -> f64 {
        let (l, h, lo, hi) = (self.raw_low, self.raw_high, self.eng_low, self.eng_high);
        if hi == lo {
            return l;
        }
        let raw = ((eng * (h - l) - h * lo + l * hi) / (hi - lo)).round();
        if raw.is_nan() {
            return l;
        }
        raw.clamp(l.min(h), l.max(h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scale(low: i128, high: i128, lo: f64, hi: f64) -> LinearScale {
        LinearScale::new(RawBounds::new(low, high), lo, hi).expect("distinct bounds")
    }

    #[test]
    fn endpoints_map_onto_engineering_range() {
        let s = scale(0, 4095, -10.0, 10.0);
        assert_eq!(s.to_engineering(0.0), -10.0);
        assert!((s.to_engineering(4095.0) - 10.0).abs() < 1e-9);
        assert_eq!(s.to_raw(-10.0), 0.0);
        assert_eq!(s.to_raw(10.0), 4095.0);
    }

    #[test]
    fn writes_clamp_to_raw_bounds() {
        let s = scale(0, 255, 0.0, 100.0);
        assert_eq!(s.to_raw(150.0), 255.0, "above range clamps to H");
        assert_eq!(s.to_raw(-5.0), 0.0, "below range clamps to L");
    }

    #[test]
    fn inverted_raw_bounds_clamp_the_other_way() {
        let s = scale(255, 0, 0.0, 100.0);
        assert_eq!(s.to_raw(0.0), 255.0);
        assert_eq!(s.to_raw(100.0), 0.0);
        assert_eq!(s.to_raw(200.0), 0.0, "clamped into [H,L]");
    }

    #[test]
    fn unsigned_bounds_near_type_maximum_stay_positive() {
        let s = scale(0, u32::MAX as i128, 0.0, 1.0);
        assert_eq!(s.to_raw(1.0), u32::MAX as f64);
        assert!((s.to_engineering(u32::MAX as f64) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn equal_bounds_have_no_conversion() {
        assert!(LinearScale::new(RawBounds::new(5, 5), 0.0, 1.0).is_none());
    }
}
