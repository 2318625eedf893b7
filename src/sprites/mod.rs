//! Sprite state machines. Every sprite advances one tick per render call;
//! scenes own independent copies of the templates built here.

pub mod image;
pub mod text;

use std::collections::BTreeMap;
use std::collections::HashMap;

use embedded_graphics::pixelcolor::Rgb888;
use rand::Rng;

use crate::config::Config;
use crate::config::ConfigError;
use crate::config::Font;
use crate::config::PhraseConfig;
use crate::config::PixelSpriteConfig;
use crate::config::PlacementConfig;
use crate::data::DataStore;
use crate::display::Display;

pub use self::image::GifSprite;
pub use self::image::ImageSprite;
pub use self::text::FancyText;
pub use self::text::Gauge;

/// Monotonic tick counter with a reset ceiling.
///
/// The ceiling bounds integer growth without perturbing animation phase;
/// config validation guarantees it exceeds every period that is ever
/// checked against the counter.
#[derive(Debug, Clone)]
pub(crate) struct Ticker {
    ticks: u32,
    ceiling: u32,
}

impl Ticker {
    pub(crate) fn new(ceiling: u32) -> Self {
        Self { ticks: 0, ceiling }
    }

    pub(crate) fn advance(&mut self) {
        self.ticks += 1;
    }

    /// True on every `period`-th tick. `period` must be non-zero, which
    /// config validation enforces.
    pub(crate) fn every(&self, period: u32) -> bool {
        self.ticks % period == 0
    }

    pub(crate) fn wrap(&mut self) {
        if self.ticks > self.ceiling {
            self.ticks = 0;
        }
    }

    #[cfg(test)]
    pub(crate) fn ticks(&self) -> u32 {
        self.ticks
    }
}

/// One pixel-value grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    rows: Vec<Vec<u8>>,
}

impl Frame {
    /// Parse whitespace-separated rows of digit characters.
    fn parse(input: &str) -> Result<Self, char> {
        let mut rows = Vec::new();
        for token in input.split_whitespace() {
            let mut row = Vec::with_capacity(token.len());
            for character in token.chars() {
                let value = character.to_digit(10).ok_or(character)?;
                row.push(value as u8);
            }
            rows.push(row);
        }
        Ok(Self { rows })
    }

    pub fn width(&self) -> i32 {
        self.rows.first().map(|row| row.len() as i32).unwrap_or(0)
    }

    pub fn height(&self) -> i32 {
        self.rows.len() as i32
    }

    /// Mirror left-right, so a flipped sprite faces its travel direction.
    fn mirror(&mut self) {
        for row in &mut self.rows {
            row.reverse();
        }
    }

    fn cells(&self) -> impl Iterator<Item = (i32, i32, u8)> + '_ {
        self.rows.iter().enumerate().flat_map(|(yi, row)| {
            row.iter()
                .enumerate()
                .map(move |(xi, value)| (xi as i32, yi as i32, *value))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FramePolicy {
    /// Oscillate forward and backward between the first and last frame.
    Bounce,
    /// Advance forward and wrap to the first frame.
    Loop,
}

/// Frame list plus the index/delta state machine driving it.
#[derive(Debug, Clone)]
pub(crate) struct FrameReel<F> {
    frames: Vec<F>,
    index: usize,
    delta: i8,
    ticks_per_frame: u32,
    policy: FramePolicy,
}

impl<F> FrameReel<F> {
    pub(crate) fn bounce(frames: Vec<F>, ticks_per_frame: u32) -> Self {
        Self {
            frames,
            index: 0,
            delta: 0,
            ticks_per_frame,
            policy: FramePolicy::Bounce,
        }
    }

    pub(crate) fn looping(frames: Vec<F>, ticks_per_frame: u32) -> Self {
        Self {
            frames,
            index: 0,
            delta: 1,
            ticks_per_frame,
            policy: FramePolicy::Loop,
        }
    }

    pub(crate) fn current(&self) -> &F {
        &self.frames[self.index]
    }

    #[cfg(test)]
    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn advance_on(&mut self, ticker: &Ticker) {
        if ticker.every(self.ticks_per_frame) {
            self.index = (self.index as i64 + self.delta as i64) as usize;
        }
    }

    /// Settle index/delta after an advance. Runs every tick, so a freshly
    /// constructed reel picks up its initial direction on the first tick.
    pub(crate) fn settle(&mut self) {
        match self.policy {
            FramePolicy::Bounce => {
                if self.frames.len() == 1 {
                    self.delta = 0;
                } else if self.index == self.frames.len() - 1 {
                    self.delta = -1;
                } else if self.index == 0 {
                    self.delta = 1;
                }
            }
            FramePolicy::Loop => {
                if self.index == self.frames.len() - 1 {
                    self.index = 0;
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn delta(&self) -> i8 {
        self.delta
    }
}

impl FrameReel<Frame> {
    fn mirror_all(&mut self) {
        for frame in &mut self.frames {
            frame.mirror();
        }
    }
}

/// Position, velocity and the wrap/bounce policy at the panel edges.
#[derive(Debug, Clone)]
pub(crate) struct Motion {
    pub(crate) x: i32,
    pub(crate) y: i32,
    home_x: i32,
    home_y: i32,
    pub(crate) dx: i32,
    pub(crate) dy: i32,
    pub(crate) max_x: i32,
    pub(crate) max_y: i32,
    pub(crate) ticks_per_movement: u32,
    can_flip: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wrap {
    Stayed,
    Teleported,
    Flipped,
}

impl Motion {
    fn new(x: i32, y: i32, dx: i32, dy: i32, ticks_per_movement: u32, can_flip: bool) -> Self {
        Self {
            x,
            y,
            home_x: x,
            home_y: y,
            dx,
            dy,
            max_x: 0,
            max_y: 0,
            ticks_per_movement,
            can_flip,
        }
    }

    /// One movement tick: move on the period, then wrap. Horizontal edge
    /// contact may coin-flip into a direction reversal instead of a
    /// teleport; vertical edges always teleport.
    fn step<R: Rng>(
        &mut self,
        ticker: &Ticker,
        width: i32,
        height: i32,
        trailing: i32,
        rng: &mut R,
    ) -> Wrap {
        if self.dx == 0 && self.dy == 0 {
            return Wrap::Stayed;
        }

        if ticker.every(self.ticks_per_movement) {
            self.x += self.dx;
            self.y += self.dy;
        }

        let mut outcome = Wrap::Stayed;
        if self.x > self.max_x && self.dx > 0 {
            outcome = if self.try_flip(rng) {
                Wrap::Flipped
            } else {
                self.x = -(width + trailing);
                Wrap::Teleported
            };
        } else if self.x + width + trailing < 0 && self.dx < 0 {
            outcome = if self.try_flip(rng) {
                Wrap::Flipped
            } else {
                self.x = self.max_x;
                Wrap::Teleported
            };
        }

        if self.y - height > self.max_y && self.dy > 0 {
            self.y = -height;
        } else if self.y + height < 0 && self.dy < 0 {
            self.y = self.max_y;
        }

        outcome
    }

    fn try_flip<R: Rng>(&mut self, rng: &mut R) -> bool {
        if !self.can_flip {
            return false;
        }
        if rng.gen_bool(0.5) {
            self.dx = -self.dx;
            true
        } else {
            false
        }
    }

    fn reinit(&mut self) {
        self.x = self.home_x;
        self.y = self.home_y;
    }

    fn set_bounds(&mut self, max_x: i32, max_y: i32) {
        self.max_x = max_x;
        self.max_y = max_y;
    }
}

/// Built-in dynamic text, the clock-style phrase payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[cfg_attr(test, derive(serde::Serialize))]
#[serde(rename_all = "snake_case")]
pub enum DynamicText {
    TimeNow,
    Date,
    DayOfWeek,
}

impl DynamicText {
    pub fn resolve(&self) -> String {
        let now = time::OffsetDateTime::now_local().unwrap_or_else(|_| {
            time::OffsetDateTime::now_utc()
        });

        match self {
            DynamicText::TimeNow => now
                .format(time::macros::format_description!("[hour]:[minute]"))
                .unwrap_or_default(),
            DynamicText::Date => now
                .format(time::macros::format_description!("[month repr:short] [day]"))
                .unwrap_or_default()
                .to_uppercase(),
            DynamicText::DayOfWeek => now.weekday().to_string().to_uppercase(),
        }
    }
}

/// A candidate phrase payload.
#[derive(Debug, Clone)]
pub enum TextSource {
    Literal(String),
    Dynamic(DynamicText),
    Nested(Box<SpriteInstance>),
}

/// What the sprite is currently saying.
#[derive(Debug, Clone)]
enum CurrentText {
    Literal(String),
    Nested(Box<SpriteInstance>),
}

/// The phrase pool plus the randomized-dwell rotation state.
#[derive(Debug, Clone)]
pub(crate) struct PhraseBox {
    phrases: Vec<TextSource>,
    current: CurrentText,
    ticks_per_phrase: u32,
    min_ticks: u32,
    max_ticks: u32,
}

impl PhraseBox {
    fn new(initial: String, ticks_per_phrase: u32, min_ticks: u32, max_ticks: u32) -> Self {
        Self {
            phrases: Vec::new(),
            current: CurrentText::Literal(initial),
            ticks_per_phrase,
            min_ticks,
            max_ticks,
        }
    }

    fn push(&mut self, source: TextSource) {
        self.phrases.push(source);
    }

    fn has_nested(&self) -> bool {
        self.phrases
            .iter()
            .any(|source| matches!(source, TextSource::Nested(_)))
    }

    /// On the dwell boundary, pick a new phrase and re-randomize the dwell.
    /// Dynamic and nested picks stay at least twice the minimum, since they
    /// carry freshness-sensitive content.
    fn rotate<R: Rng>(&mut self, ticker: &Ticker, rng: &mut R) {
        if self.phrases.is_empty() || !ticker.every(self.ticks_per_phrase) {
            return;
        }

        let pick = self.phrases[rng.gen_range(0..self.phrases.len())].clone();
        let mut min_ticks = self.min_ticks;
        self.current = match pick {
            TextSource::Literal(text) => CurrentText::Literal(text),
            TextSource::Dynamic(dynamic) => {
                min_ticks *= 2;
                CurrentText::Literal(dynamic.resolve())
            }
            TextSource::Nested(sprite) => {
                min_ticks *= 2;
                CurrentText::Nested(sprite)
            }
        };
        self.ticks_per_phrase = rng.gen_range(min_ticks..=self.max_ticks.max(min_ticks));
    }
}

/// Pixel-value → color mapping. Value 0 is always transparent and may not
/// be declared.
#[derive(Debug, Clone)]
pub struct Palette {
    colors: HashMap<u8, Rgb888>,
    pub text: Rgb888,
    pub label: Rgb888,
}

impl Default for Palette {
    fn default() -> Self {
        let mut colors = HashMap::new();
        colors.insert(1, Rgb888::new(255, 255, 255));
        Self {
            colors,
            text: Rgb888::new(0, 255, 0),
            label: Rgb888::new(255, 255, 0),
        }
    }
}

impl Palette {
    pub(crate) fn from_config(
        sprite: &str,
        config: &crate::config::PaletteConfig,
    ) -> Result<Self, ConfigError> {
        let mut palette = Self::default();
        for (key, [r, g, b]) in &config.0 {
            let color = Rgb888::new(*r, *g, *b);
            match key.as_str() {
                "text" => palette.text = color,
                "label" => palette.label = color,
                other => {
                    let index: u8 =
                        other.parse().map_err(|_| ConfigError::BadPaletteKey {
                            sprite: sprite.to_owned(),
                            key: key.clone(),
                        })?;
                    if index == 0 {
                        return Err(ConfigError::ReservedPaletteIndex {
                            sprite: sprite.to_owned(),
                        });
                    }
                    palette.colors.insert(index, color);
                }
            }
        }
        Ok(palette)
    }

    pub fn color(&self, index: u8) -> Option<Rgb888> {
        self.colors.get(&index).copied()
    }
}

/// The animated, optionally moving, optionally talking pixel sprite.
#[derive(Debug, Clone)]
pub struct Sprite {
    name: String,
    ticker: Ticker,
    motion: Motion,
    reel: FrameReel<Frame>,
    palette: Palette,
    font: Font,
    phrases: PhraseBox,
    phrase_width: i32,
}

impl Sprite {
    /// Build from config without nested phrase entries; the factory
    /// resolves those in a second pass and returns the referenced names.
    pub(crate) fn from_config(
        name: &str,
        config: &PixelSpriteConfig,
    ) -> Result<(Self, Vec<String>), ConfigError> {
        validate_periods(
            name,
            &[
                config.ticks_per_frame,
                config.ticks_per_movement,
                config.ticks_per_phrase,
                config.min_ticks_per_phrase,
                config.max_ticks_per_phrase,
            ],
        )?;
        if config.min_ticks_per_phrase > config.max_ticks_per_phrase {
            return Err(ConfigError::PhraseDwellBounds {
                sprite: name.to_owned(),
                min: config.min_ticks_per_phrase,
                max: config.max_ticks_per_phrase,
            });
        }
        let longest_period = config
            .ticks_per_frame
            .max(config.ticks_per_movement)
            .max(config.max_ticks_per_phrase)
            .max(config.min_ticks_per_phrase * 2);
        validate_ceiling(name, config.tick_ceiling, longest_period)?;

        let palette = Palette::from_config(name, &config.palette)?;

        if config.frames.is_empty() {
            return Err(ConfigError::EmptyFrames {
                sprite: name.to_owned(),
            });
        }
        let mut frames = Vec::with_capacity(config.frames.len());
        for input in &config.frames {
            let frame = Frame::parse(input).map_err(|character| ConfigError::BadFrameCell {
                sprite: name.to_owned(),
                character,
            })?;
            for (_, _, value) in frame.cells() {
                if value != 0 && palette.color(value).is_none() {
                    return Err(ConfigError::UndeclaredPaletteIndex {
                        sprite: name.to_owned(),
                        index: value,
                    });
                }
            }
            frames.push(frame);
        }

        let mut phrases = PhraseBox::new(
            config.text.clone().unwrap_or_default(),
            config.ticks_per_phrase,
            config.min_ticks_per_phrase,
            config.max_ticks_per_phrase,
        );
        let mut nested = Vec::new();
        for phrase in &config.phrases {
            match phrase {
                PhraseConfig::Literal(text) => phrases.push(TextSource::Literal(text.clone())),
                PhraseConfig::Dynamic { dynamic } => phrases.push(TextSource::Dynamic(*dynamic)),
                PhraseConfig::Nested { sprite } => nested.push(sprite.clone()),
            }
        }

        Ok((
            Self {
                name: name.to_owned(),
                ticker: Ticker::new(config.tick_ceiling),
                motion: Motion::new(
                    config.x,
                    config.y,
                    config.dx,
                    config.dy,
                    config.ticks_per_movement,
                    config.can_flip,
                ),
                reel: FrameReel::bounce(frames, config.ticks_per_frame),
                palette,
                font: config.font,
                phrases,
                phrase_width: 0,
            },
            nested,
        ))
    }

    pub fn width(&self) -> i32 {
        self.reel.current().width()
    }

    pub fn height(&self) -> i32 {
        self.reel.current().height()
    }

    pub fn render<D: Display>(&mut self, display: &mut D) -> i32 {
        self.render_frame(display);
        self.render_phrase(display);
        self.tick();
        0
    }

    fn render_frame<D: Display>(&mut self, display: &mut D) {
        let x = self.motion.x;
        let y = self.motion.y;
        for (xi, yi, value) in self.reel.current().cells() {
            if value == 0 {
                continue;
            }
            // Undeclared indices were rejected at construction.
            if let Some(color) = self.palette.color(value) {
                display.set_pixel(x + xi, y + yi, color);
            }
        }
    }

    fn render_phrase<D: Display>(&mut self, display: &mut D) {
        let x_text = self.motion.x + self.width() + 1;
        let y_text = self.motion.y;
        let font = embedded_graphics::mono_font::MonoFont::from(self.font);
        match &mut self.phrases.current {
            CurrentText::Literal(text) => {
                if !text.is_empty() {
                    self.phrase_width =
                        display.draw_text(&font, x_text, y_text, self.palette.text, text);
                }
            }
            CurrentText::Nested(sprite) => {
                sprite.set_position(x_text, y_text);
                self.phrase_width = sprite.render(display);
            }
        }
    }

    fn tick(&mut self) {
        let mut rng = rand::thread_rng();
        self.ticker.advance();
        self.reel.advance_on(&self.ticker);
        let width = self.width();
        let height = self.height();
        let wrap = self
            .motion
            .step(&self.ticker, width, height, self.phrase_width, &mut rng);
        if wrap == Wrap::Flipped {
            self.reel.mirror_all();
        }
        self.ticker.wrap();
        self.reel.settle();
        self.phrases.rotate(&self.ticker, &mut rng);
    }

    fn reinit(&mut self) {
        self.motion.reinit();
    }
}

/// A sprite of any kind, dispatching the operations scenes and the driver
/// need. Cloning yields a fully independent instance.
#[derive(Debug, Clone)]
pub enum SpriteInstance {
    Pixel(Sprite),
    Text(FancyText),
    Gauge(Gauge),
    Image(ImageSprite),
    Gif(GifSprite),
}

#[derive(Debug, thiserror::Error)]
pub enum PathChangeError {
    #[error("Sprite kind does not support path changes")]
    Unsupported,

    #[error("Failed to load image")]
    Load(#[source] ::image::ImageError),
}

impl SpriteInstance {
    /// Name of the template this instance was cloned from.
    pub fn template_name(&self) -> &str {
        match self {
            SpriteInstance::Pixel(sprite) => &sprite.name,
            SpriteInstance::Text(sprite) => sprite.name(),
            SpriteInstance::Gauge(sprite) => sprite.name(),
            SpriteInstance::Image(sprite) => sprite.name(),
            SpriteInstance::Gif(sprite) => sprite.name(),
        }
    }

    /// Render one frame and advance one tick. Returns the consumed width
    /// for text-emitting sprites, 0 otherwise.
    pub fn render<D: Display>(&mut self, display: &mut D) -> i32 {
        match self {
            SpriteInstance::Pixel(sprite) => sprite.render(display),
            SpriteInstance::Text(sprite) => sprite.render(display),
            SpriteInstance::Gauge(sprite) => sprite.render(display),
            SpriteInstance::Image(sprite) => sprite.render(display),
            SpriteInstance::Gif(sprite) => sprite.render(display),
        }
    }

    /// Re-entry hook, called when the owning scene becomes active again.
    pub fn reinit(&mut self) {
        match self {
            SpriteInstance::Pixel(sprite) => sprite.reinit(),
            SpriteInstance::Text(sprite) => sprite.reinit(),
            SpriteInstance::Gauge(sprite) => sprite.reinit(),
            SpriteInstance::Image(sprite) => sprite.reinit(),
            SpriteInstance::Gif(sprite) => sprite.reinit(),
        }
    }

    pub fn set_position(&mut self, x: i32, y: i32) {
        match self {
            SpriteInstance::Pixel(sprite) => {
                sprite.motion.x = x;
                sprite.motion.y = y;
            }
            SpriteInstance::Text(sprite) => sprite.set_position(x, y),
            SpriteInstance::Gauge(sprite) => sprite.set_position(x, y),
            SpriteInstance::Image(sprite) => sprite.set_position(x, y),
            SpriteInstance::Gif(sprite) => sprite.set_position(x, y),
        }
    }

    pub(crate) fn set_bounds(&mut self, max_x: i32, max_y: i32) {
        match self {
            SpriteInstance::Pixel(sprite) => sprite.motion.set_bounds(max_x, max_y),
            SpriteInstance::Text(sprite) => sprite.set_bounds(max_x, max_y),
            SpriteInstance::Gauge(sprite) => sprite.set_bounds(max_x, max_y),
            SpriteInstance::Image(sprite) => sprite.set_bounds(max_x, max_y),
            SpriteInstance::Gif(sprite) => sprite.set_bounds(max_x, max_y),
        }
    }

    /// Swap the image source of an image-backed sprite at runtime.
    pub fn set_source_path(&mut self, path: &camino::Utf8Path) -> Result<(), PathChangeError> {
        match self {
            SpriteInstance::Image(sprite) => sprite.set_source_path(path),
            SpriteInstance::Gif(sprite) => sprite.set_source_path(path),
            _ => Err(PathChangeError::Unsupported),
        }
    }

    pub(crate) fn apply_placement(&mut self, placement: &PlacementConfig) {
        let (x, y, dx, dy, ticks) = (
            placement.x,
            placement.y,
            placement.dx,
            placement.dy,
            placement.ticks_per_movement,
        );
        let motion = match self {
            SpriteInstance::Pixel(sprite) => &mut sprite.motion,
            SpriteInstance::Text(sprite) => sprite.motion_mut(),
            SpriteInstance::Gauge(sprite) => sprite.motion_mut(),
            SpriteInstance::Image(sprite) => sprite.motion_mut(),
            SpriteInstance::Gif(sprite) => sprite.motion_mut(),
        };
        if let Some(x) = x {
            motion.x = x;
            motion.home_x = x;
        }
        if let Some(y) = y {
            motion.y = y;
            motion.home_y = y;
        }
        if let Some(dx) = dx {
            motion.dx = dx;
        }
        if let Some(dy) = dy {
            motion.dy = dy;
        }
        if let Some(ticks) = ticks {
            motion.ticks_per_movement = ticks.max(1);
        }
    }

    fn has_nested_phrases(&self) -> bool {
        match self {
            SpriteInstance::Pixel(sprite) => sprite.phrases.has_nested(),
            _ => false,
        }
    }
}

/// Build the sprite template pool from config.
///
/// Nested phrase references are resolved in a second pass so templates can
/// reference each other regardless of declaration order; references may
/// only be one level deep.
pub fn build_templates(
    config: &Config,
    data: &DataStore,
) -> Result<BTreeMap<String, SpriteInstance>, ConfigError> {
    let width = config.display.width as i32;
    let height = config.display.height as i32;

    let mut templates = BTreeMap::new();
    let mut pending_nested: Vec<(String, String)> = Vec::new();

    for (name, sprite_config) in &config.sprites {
        let mut instance = match sprite_config {
            crate::config::SpriteConfig::Sprite(conf) => {
                let (sprite, nested) = Sprite::from_config(name, conf)?;
                for target in nested {
                    pending_nested.push((name.clone(), target));
                }
                SpriteInstance::Pixel(sprite)
            }
            crate::config::SpriteConfig::FancyText(conf) => {
                SpriteInstance::Text(FancyText::from_config(name, conf)?)
            }
            crate::config::SpriteConfig::Duration(conf) => SpriteInstance::Gauge(
                Gauge::duration_from_config(name, conf, data.clone())?,
            ),
            crate::config::SpriteConfig::Temperature(conf) => SpriteInstance::Gauge(
                Gauge::temperature_from_config(name, conf, data.clone())?,
            ),
            crate::config::SpriteConfig::Image(conf) => {
                SpriteInstance::Image(ImageSprite::from_config(name, conf, width, height)?)
            }
            crate::config::SpriteConfig::AnimatedGif(conf) => {
                SpriteInstance::Gif(GifSprite::from_config(name, conf, width, height)?)
            }
        };
        instance.set_bounds(width, height);
        templates.insert(name.clone(), instance);
        tracing::debug!(sprite = %name, "Built sprite template");
    }

    for (owner, target) in pending_nested {
        let nested = templates
            .get(&target)
            .ok_or_else(|| ConfigError::UnknownNestedSprite {
                sprite: owner.clone(),
                phrase: target.clone(),
            })?
            .clone();
        if nested.has_nested_phrases() {
            return Err(ConfigError::NestedSpriteTooDeep {
                sprite: owner,
                nested: target,
            });
        }
        let Some(SpriteInstance::Pixel(sprite)) = templates.get_mut(&owner) else {
            // Only pixel sprites collect nested entries during pass one.
            continue;
        };
        sprite.phrases.push(TextSource::Nested(Box::new(nested)));
    }

    Ok(templates)
}

pub(crate) fn validate_periods(sprite: &str, periods: &[u32]) -> Result<(), ConfigError> {
    if periods.iter().any(|period| *period == 0) {
        return Err(ConfigError::ZeroTickPeriod {
            sprite: sprite.to_owned(),
        });
    }
    Ok(())
}

pub(crate) fn validate_ceiling(
    sprite: &str,
    ceiling: u32,
    longest_period: u32,
) -> Result<(), ConfigError> {
    if ceiling <= longest_period {
        return Err(ConfigError::TickCeilingTooSmall {
            sprite: sprite.to_owned(),
            ceiling,
            period: longest_period,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::testing::RecordingDisplay;

    fn pixel_sprite(toml: &str) -> Sprite {
        let config: PixelSpriteConfig = toml::from_str(toml).unwrap();
        let (mut sprite, _) = Sprite::from_config("test", &config).unwrap();
        sprite.motion.set_bounds(64, 32);
        sprite
    }

    fn render_times(sprite: &mut Sprite, display: &mut RecordingDisplay, count: u32) {
        for _ in 0..count {
            sprite.render(display);
        }
    }

    #[test]
    fn test_frame_parse_rows_and_mirror() {
        let mut frame = Frame::parse("110 010").unwrap();
        assert_eq!(frame.width(), 3);
        assert_eq!(frame.height(), 2);
        frame.mirror();
        assert_eq!(frame.rows, vec![vec![0, 1, 1], vec![0, 1, 0]]);
    }

    #[test]
    fn test_frame_oscillation_full_cycle() {
        let mut display = RecordingDisplay::new(64, 32);
        let mut sprite = pixel_sprite(
            r#"
            ticks_per_frame = 2
            frames = ["1", "2", "3"]
            palette = { "1" = [255, 0, 0], "2" = [0, 255, 0], "3" = [0, 0, 255] }
            "#,
        );

        assert_eq!(sprite.reel.index(), 0);
        // ticks_per_frame * 2 * (len - 1) render calls complete one
        // forward/backward oscillation.
        render_times(&mut sprite, &mut display, 2 * 2 * (3 - 1));
        assert_eq!(sprite.reel.index(), 0);

        // Halfway through the cycle the reel sits on the last frame.
        render_times(&mut sprite, &mut display, 2 * (3 - 1));
        assert_eq!(sprite.reel.index(), 2);
    }

    #[test]
    fn test_single_frame_stays_frozen() {
        let mut display = RecordingDisplay::new(64, 32);
        let mut sprite = pixel_sprite(r#"frames = ["11 11"]"#);

        render_times(&mut sprite, &mut display, 50);
        assert_eq!(sprite.reel.index(), 0);
        assert_eq!(sprite.reel.delta(), 0);
    }

    #[test]
    fn test_wrap_teleports_without_flip() {
        let mut display = RecordingDisplay::new(64, 32);
        let mut sprite = pixel_sprite(
            r#"
            dx = 1
            can_flip = false
            frames = ["11 11"]
            "#,
        );
        sprite.motion.x = sprite.motion.max_x;

        sprite.render(&mut display);
        assert_eq!(sprite.motion.x, -sprite.width());
    }

    #[test]
    fn test_wrap_left_edge_teleports_to_max() {
        let mut display = RecordingDisplay::new(64, 32);
        let mut sprite = pixel_sprite(
            r#"
            dx = -1
            can_flip = false
            frames = ["11 11"]
            "#,
        );
        sprite.motion.x = -sprite.width();

        sprite.render(&mut display);
        assert_eq!(sprite.motion.x, sprite.motion.max_x);
    }

    #[test]
    fn test_flip_rate_is_roughly_even() {
        let mut display = RecordingDisplay::new(64, 32);
        let trials = 400;
        let mut flips = 0;
        for _ in 0..trials {
            let mut sprite = pixel_sprite(
                r#"
                dx = 1
                frames = ["11 11"]
                "#,
            );
            sprite.motion.x = sprite.motion.max_x;
            sprite.render(&mut display);
            if sprite.motion.dx < 0 {
                flips += 1;
            }
        }
        // Statistical: a fair coin lands far inside these bounds.
        assert!((100..=300).contains(&flips), "flips = {flips}");
    }

    #[test]
    fn test_flip_mirrors_frames() {
        let mut display = RecordingDisplay::new(64, 32);
        loop {
            let mut sprite = pixel_sprite(
                r#"
                dx = 1
                frames = ["110 010"]
                palette = { "1" = [255, 0, 0] }
                "#,
            );
            sprite.motion.x = sprite.motion.max_x;
            sprite.render(&mut display);
            if sprite.motion.dx < 0 {
                assert_eq!(
                    sprite.reel.current().rows,
                    vec![vec![0, 1, 1], vec![0, 1, 0]]
                );
                break;
            }
        }
    }

    #[test]
    fn test_vertical_wrap_teleports() {
        let mut display = RecordingDisplay::new(64, 32);
        let mut sprite = pixel_sprite(
            r#"
            dy = 1
            frames = ["11 11"]
            "#,
        );
        sprite.motion.y = sprite.motion.max_y + sprite.height() + 1;

        sprite.render(&mut display);
        assert_eq!(sprite.motion.y, -sprite.height());
    }

    #[test]
    fn test_tick_ceiling_resets_counter() {
        let mut ticker = Ticker::new(10);
        for _ in 0..11 {
            ticker.advance();
            ticker.wrap();
        }
        assert_eq!(ticker.ticks(), 0);
    }

    #[test]
    fn test_phrase_dwell_stays_in_bounds() {
        let mut display = RecordingDisplay::new(64, 32);
        let mut sprite = pixel_sprite(
            r#"
            ticks_per_phrase = 5
            min_ticks_per_phrase = 100
            max_ticks_per_phrase = 400
            frames = ["1"]
            phrases = ["YES"]
            "#,
        );

        render_times(&mut sprite, &mut display, 5);
        assert!(matches!(
            sprite.phrases.current,
            CurrentText::Literal(ref text) if text == "YES"
        ));
        assert!((100..=400).contains(&sprite.phrases.ticks_per_phrase));
    }

    #[test]
    fn test_dynamic_phrase_doubles_minimum_dwell() {
        let mut display = RecordingDisplay::new(64, 32);
        let mut sprite = pixel_sprite(
            r#"
            ticks_per_phrase = 5
            min_ticks_per_phrase = 190
            max_ticks_per_phrase = 400
            frames = ["1"]
            phrases = [{ dynamic = "day_of_week" }]
            "#,
        );

        render_times(&mut sprite, &mut display, 5);
        // The doubled minimum (380) leaves only 380..=400.
        assert!((380..=400).contains(&sprite.phrases.ticks_per_phrase));
        assert!(matches!(
            sprite.phrases.current,
            CurrentText::Literal(ref text) if !text.is_empty()
        ));
    }

    #[test]
    fn test_phrase_text_is_drawn_next_to_sprite() {
        let mut display = RecordingDisplay::new(64, 32);
        let mut sprite = pixel_sprite(
            r#"
            x = 10
            y = 4
            text = "HI"
            frames = ["11 11"]
            "#,
        );

        sprite.render(&mut display);
        assert_eq!(display.texts.len(), 1);
        let (x, y, ref text) = display.texts[0];
        assert_eq!(text, "HI");
        assert_eq!(x, 10 + sprite.width() + 1);
        assert_eq!(y, 4);
        assert!(sprite.phrase_width > 0);
    }

    #[test]
    fn test_undeclared_palette_index_fails_construction() {
        let config: PixelSpriteConfig = toml::from_str(r#"frames = ["12"]"#).unwrap();
        let result = Sprite::from_config("broken", &config);
        assert!(matches!(
            result,
            Err(ConfigError::UndeclaredPaletteIndex { index: 2, .. })
        ));
    }

    #[test]
    fn test_palette_index_zero_is_rejected() {
        let config: PixelSpriteConfig = toml::from_str(
            r#"
            frames = ["1"]
            palette = { "0" = [1, 2, 3] }
            "#,
        )
        .unwrap();
        let result = Sprite::from_config("broken", &config);
        assert!(matches!(
            result,
            Err(ConfigError::ReservedPaletteIndex { .. })
        ));
    }

    #[test]
    fn test_small_tick_ceiling_is_rejected() {
        let config: PixelSpriteConfig = toml::from_str(
            r#"
            frames = ["1"]
            tick_ceiling = 300
            "#,
        )
        .unwrap();
        let result = Sprite::from_config("broken", &config);
        assert!(matches!(
            result,
            Err(ConfigError::TickCeilingTooSmall { .. })
        ));
    }

    #[test]
    fn test_reinit_restores_home_position() {
        let mut display = RecordingDisplay::new(64, 32);
        let mut sprite = pixel_sprite(
            r#"
            x = 7
            y = 3
            dx = 1
            can_flip = false
            frames = ["1"]
            "#,
        );

        render_times(&mut sprite, &mut display, 10);
        assert_ne!(sprite.motion.x, 7);
        sprite.reinit();
        assert_eq!(sprite.motion.x, 7);
        assert_eq!(sprite.motion.y, 3);
    }

    #[test]
    fn test_dynamic_text_resolves_to_uppercase() {
        let day = DynamicText::DayOfWeek.resolve();
        assert!(!day.is_empty());
        assert_eq!(day, day.to_uppercase());
    }
}
