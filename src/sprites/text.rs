//! Text sprites: multi-colored segment text and the live-value gauges
//! built on top of it.

use embedded_graphics::pixelcolor::Rgb888;

use super::Motion;
use super::Palette;
use super::Ticker;
use crate::colors::Colormap;
use crate::colors::interpolate;
use crate::config::ConfigError;
use crate::config::FancyTextConfig;
use crate::config::Font;
use crate::config::GaugeConfig;
use crate::data::DataStore;
use crate::display::Display;

/// Moving text made of constant-color segments.
#[derive(Debug, Clone)]
pub struct FancyText {
    name: String,
    ticker: Ticker,
    motion: Motion,
    font: Font,
    segments: Vec<(String, Rgb888)>,
    width: i32,
}

impl FancyText {
    pub(crate) fn from_config(name: &str, config: &FancyTextConfig) -> Result<Self, ConfigError> {
        super::validate_periods(name, &[config.ticks_per_movement])?;
        super::validate_ceiling(name, config.tick_ceiling, config.ticks_per_movement)?;
        let palette = Palette::from_config(name, &config.palette)?;

        let mut text = Self::bare(name, config.x, config.y, config.dx, config.dy, config);
        text.push_segment(config.text.clone(), palette.text);
        Ok(text)
    }

    fn bare(name: &str, x: i32, y: i32, dx: i32, dy: i32, config: &FancyTextConfig) -> Self {
        Self {
            name: name.to_owned(),
            ticker: Ticker::new(config.tick_ceiling),
            motion: Motion::new(x, y, dx, dy, config.ticks_per_movement, config.can_flip),
            font: config.font,
            segments: Vec::new(),
            width: 0,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn motion_mut(&mut self) -> &mut Motion {
        &mut self.motion
    }

    pub(crate) fn set_position(&mut self, x: i32, y: i32) {
        self.motion.x = x;
        self.motion.y = y;
    }

    pub(crate) fn set_bounds(&mut self, max_x: i32, max_y: i32) {
        self.motion.set_bounds(max_x, max_y);
    }

    pub(crate) fn reinit(&mut self) {
        self.motion.reinit();
    }

    fn clear_segments(&mut self) {
        self.segments.clear();
    }

    fn push_segment(&mut self, text: String, color: Rgb888) {
        self.segments.push((text, color));
    }

    /// Draw every segment left to right and return the consumed width.
    pub fn render<D: Display>(&mut self, display: &mut D) -> i32 {
        self.tick();
        let font = embedded_graphics::mono_font::MonoFont::from(self.font);
        let mut x = 0;
        for (text, color) in &self.segments {
            x += display.draw_text(&font, self.motion.x + x, self.motion.y, *color, text);
        }
        self.width = x;
        x
    }

    fn tick(&mut self) {
        let mut rng = rand::thread_rng();
        self.ticker.advance();
        let font = embedded_graphics::mono_font::MonoFont::from(self.font);
        let height = font.character_size.height as i32;
        // Movement wraps against the width of the previous layout.
        let width = self.width;
        let _ = self.motion.step(&self.ticker, width, height, 0, &mut rng);
        self.ticker.wrap();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GaugeStyle {
    /// Integer reading, label rendered with a trailing colon.
    Duration,
    /// One-decimal reading, label rendered verbatim.
    Temperature,
}

/// A labelled live value whose color interpolates between two bounds.
///
/// The text layout is recomputed only when the underlying value changes;
/// unchanged values render the cached segments.
#[derive(Debug, Clone)]
pub struct Gauge {
    text: FancyText,
    label: String,
    label_color: Rgb888,
    data_key: String,
    low: f64,
    high: f64,
    colormap: Colormap,
    style: GaugeStyle,
    last_value: Option<f64>,
    data: DataStore,

    #[cfg(test)]
    pub(crate) layout_count: u32,
}

impl Gauge {
    pub(crate) fn duration_from_config(
        name: &str,
        config: &GaugeConfig,
        data: DataStore,
    ) -> Result<Self, ConfigError> {
        Self::from_config(name, config, data, GaugeStyle::Duration, Colormap::GreenRed)
    }

    pub(crate) fn temperature_from_config(
        name: &str,
        config: &GaugeConfig,
        data: DataStore,
    ) -> Result<Self, ConfigError> {
        Self::from_config(name, config, data, GaugeStyle::Temperature, Colormap::Jet)
    }

    fn from_config(
        name: &str,
        config: &GaugeConfig,
        data: DataStore,
        style: GaugeStyle,
        default_colormap: Colormap,
    ) -> Result<Self, ConfigError> {
        super::validate_periods(name, &[config.ticks_per_movement])?;
        super::validate_ceiling(name, config.tick_ceiling, config.ticks_per_movement)?;
        if config.low == config.high {
            return Err(ConfigError::DegenerateBounds {
                sprite: name.to_owned(),
                bound: config.low,
            });
        }
        let palette = Palette::from_config(name, &config.palette)?;

        let text = FancyText {
            name: name.to_owned(),
            ticker: Ticker::new(config.tick_ceiling),
            motion: Motion::new(
                config.x,
                config.y,
                config.dx,
                config.dy,
                config.ticks_per_movement,
                false,
            ),
            font: config.font,
            segments: Vec::new(),
            width: 0,
        };

        let mut gauge = Self {
            text,
            label: config.label.clone(),
            label_color: palette.label,
            data_key: config.data_key.clone(),
            low: config.low,
            high: config.high,
            colormap: config.colormap.unwrap_or(default_colormap),
            style,
            last_value: None,
            data,

            #[cfg(test)]
            layout_count: 0,
        };
        gauge.relayout();
        Ok(gauge)
    }

    pub(crate) fn name(&self) -> &str {
        self.text.name()
    }

    pub(crate) fn motion_mut(&mut self) -> &mut Motion {
        self.text.motion_mut()
    }

    pub(crate) fn set_position(&mut self, x: i32, y: i32) {
        self.text.set_position(x, y);
    }

    pub(crate) fn set_bounds(&mut self, max_x: i32, max_y: i32) {
        self.text.set_bounds(max_x, max_y);
    }

    pub(crate) fn reinit(&mut self) {
        self.text.reinit();
    }

    fn value(&self) -> Option<f64> {
        self.data.number(&self.data_key)
    }

    fn relayout(&mut self) {
        #[cfg(test)]
        {
            self.layout_count += 1;
        }

        self.text.clear_segments();
        let label = match self.style {
            GaugeStyle::Duration => format!("{}:", self.label),
            GaugeStyle::Temperature => self.label.clone(),
        };
        self.text.push_segment(label, self.label_color);

        let value = self.value();
        match value {
            None => {
                let color = interpolate(self.colormap, self.low, self.low, self.high);
                self.text.push_segment(String::from("N/A"), color);
            }
            Some(value) => {
                let color = interpolate(self.colormap, value, self.low, self.high);
                self.text.push_segment(self.format_value(value), color);
            }
        }
        self.last_value = value;
    }

    fn format_value(&self, value: f64) -> String {
        match self.style {
            GaugeStyle::Duration => format!("{}", value as i64),
            GaugeStyle::Temperature => format!("{value:.1}"),
        }
    }

    pub fn render<D: Display>(&mut self, display: &mut D) -> i32 {
        if self.value() != self.last_value {
            self.relayout();
        }
        self.text.render(display)
    }
}
