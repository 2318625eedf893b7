use embedded_graphics::pixelcolor::Rgb888;

pub const YELLOW: Rgb888 = Rgb888::new(200, 200, 0);
pub const GREEN: Rgb888 = Rgb888::new(0, 200, 0);
pub const RED: Rgb888 = Rgb888::new(200, 0, 0);

/// A color ramp sampled by a `0.0..=1.0` fraction. Fractions outside that
/// range are valid input and extrapolate linearly; only the final channel
/// conversion saturates to `u8`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[cfg_attr(test, derive(serde::Serialize))]
#[serde(rename_all = "snake_case")]
pub enum Colormap {
    /// Pure green at the low end, pure red at the high end.
    #[default]
    GreenRed,
    /// Blue through cyan, yellow and red. Approximates the classic "jet" map.
    Jet,
    /// A full hue wheel.
    Rainbow,
}

impl Colormap {
    pub fn sample(&self, frac: f64) -> Rgb888 {
        match self {
            Colormap::GreenRed => Rgb888::new(channel(frac), channel(1.0 - frac), 0),
            Colormap::Jet => Rgb888::new(
                channel(1.5 - (4.0 * frac - 3.0).abs()),
                channel(1.5 - (4.0 * frac - 2.0).abs()),
                channel(1.5 - (4.0 * frac - 1.0).abs()),
            ),
            Colormap::Rainbow => hue_to_rgb(frac),
        }
    }
}

/// Color for `current` interpolated linearly between `low` and `high`.
///
/// `low == high` must be rejected at configuration time; see
/// [`crate::config::ConfigError::DegenerateBounds`].
pub fn interpolate(cmap: Colormap, current: f64, low: f64, high: f64) -> Rgb888 {
    cmap.sample((current - low) / (high - low))
}

fn channel(value: f64) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

fn hue_to_rgb(hue: f64) -> Rgb888 {
    let h = hue.rem_euclid(1.0);
    let x = 1.0 - ((h * 6.0) % 2.0 - 1.0).abs();

    let (r, g, b) = match (h * 6.0) as u32 {
        0 => (1.0, x, 0.0),
        1 => (x, 1.0, 0.0),
        2 => (0.0, 1.0, x),
        3 => (0.0, x, 1.0),
        4 => (x, 0.0, 1.0),
        5 => (1.0, 0.0, x),
        _ => (0.0, 0.0, 0.0),
    };

    Rgb888::new(channel(r), channel(g), channel(b))
}
