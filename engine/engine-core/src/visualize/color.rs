//! Score-to-colour mapping for node fills.

/// Fill colour of the root node.
pub const ROOT_COLOR: &str = "#AAAAAA";

/// Nine evenly spaced stops of the viridis colour map.
const VIRIDIS: [(u8, u8, u8); 9] = [
    (68, 1, 84),
    (72, 40, 120),
    (62, 73, 137),
    (49, 104, 142),
    (38, 130, 142),
    (31, 158, 137),
    (53, 183, 121),
    (110, 206, 88),
    (253, 231, 37),
];

/// Linear interpolation over `VIRIDIS`, stretched across a score range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorMap {
    min: f64,
    max: f64,
}

impl ColorMap {
    /// Colour map over the observed score bounds.
    ///
    /// With no scores the range is `[0, 1]`; a single distinct score is
    /// widened by 0.5 on both sides so it lands mid-scale.
    pub fn for_bounds(bounds: Option<(f64, f64)>) -> Self {
        let (min, max) = match bounds {
            None => (0.0, 1.0),
            Some((lo, hi)) if lo == hi => (lo - 0.5, hi + 0.5),
            Some((lo, hi)) => (lo, hi),
        };
        Self { min, max }
    }

    pub fn range(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    fn rgb(&self, score: f64) -> (u8, u8, u8) {
        let t = ((score - self.min) / (self.max - self.min)).clamp(0.0, 1.0);
        let last = VIRIDIS.len() - 1;
        let pos = t * last as f64;
        let i = (pos.floor() as usize).min(last - 1);
        let frac = pos - i as f64;
        let (a, b) = (VIRIDIS[i], VIRIDIS[i + 1]);
        let mix = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * frac) as u8;
        (mix(a.0, b.0), mix(a.1, b.1), mix(a.2, b.2))
    }

    /// `#rrggbb` fill for `score`; out-of-range scores take the end colours.
    pub fn hex(&self, score: f64) -> String {
        let (r, g, b) = self.rgb(score);
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    }

    /// Black or white, whichever reads better on the fill for `score`.
    pub fn font_color(&self, score: f64) -> &'static str {
        let (r, g, b) = self.rgb(score);
        let luminance = 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
        if luminance < 128.0 {
            "white"
        } else {
            "black"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_stops() {
        let map = ColorMap::for_bounds(Some((0.0, 1.0)));
        assert_eq!(map.hex(0.0), "#440154");
        assert_eq!(map.hex(1.0), "#fde725");
        assert_eq!(map.hex(-3.0), "#440154");
        assert_eq!(map.hex(7.0), "#fde725");
    }

    #[test]
    fn test_midpoint_is_middle_stop() {
        let map = ColorMap::for_bounds(Some((0.0, 8.0)));
        assert_eq!(map.hex(4.0), "#26828e");
    }

    #[test]
    fn test_degenerate_ranges() {
        assert_eq!(ColorMap::for_bounds(None).range(), (0.0, 1.0));
        let single = ColorMap::for_bounds(Some((0.5, 0.5)));
        assert_eq!(single.range(), (0.0, 1.0));
        assert_eq!(single.hex(0.5), "#26828e");
    }

    #[test]
    fn test_font_contrast() {
        let map = ColorMap::for_bounds(None);
        assert_eq!(map.font_color(0.0), "white");
        assert_eq!(map.font_color(1.0), "black");
    }
}
