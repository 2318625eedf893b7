use std::collections::BTreeMap;

use crate::colors::Colormap;
use crate::sprites::DynamicText;

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub display: DisplayConfig,
    pub mqtt: MqttConfig,

    #[serde(default)]
    pub panel: PanelConfig,

    #[serde(default)]
    pub sprites: BTreeMap<String, SpriteConfig>,

    #[serde(default)]
    pub scenes: BTreeMap<String, SceneConfig>,

    #[serde(default)]
    pub modes: BTreeMap<String, Vec<ModeEntryConfig>>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DisplayConfig {
    pub host: std::net::IpAddr,
    pub port: u16,
    pub udp_port: u16,
    pub width: u32,
    pub height: u32,

    #[serde(default = "default_brightness")]
    pub initial_brightness: u8,
}

/// Scheduler-level defaults, the original's `global` section.
#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PanelConfig {
    /// Mode applied at startup. The synthesized catch-all is used when
    /// unset.
    pub default_mode: Option<String>,

    /// Pick scenes uniformly at random instead of cycling.
    #[serde(default)]
    pub random: bool,

    /// Scene duration in the catch-all mode and in single-scene modes.
    #[serde(with = "humantime_serde", default = "default_duration")]
    pub default_duration: std::time::Duration,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            default_mode: None,
            random: false,
            default_duration: default_duration(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MqttConfig {
    pub host: std::net::IpAddr,
    pub port: u16,
    pub qos: Qos,
    pub client_name: String,

    #[serde(with = "humantime_serde")]
    pub keep_alive: std::time::Duration,

    pub topic_prefix: String,
}

#[derive(Debug, Clone, Copy, serde::Deserialize)]
#[expect(clippy::enum_variant_names, reason = "That's the names")]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl From<Qos> for rumqttc::v5::mqttbytes::QoS {
    fn from(value: Qos) -> Self {
        match value {
            Qos::AtMostOnce => rumqttc::v5::mqttbytes::QoS::AtMostOnce,
            Qos::AtLeastOnce => rumqttc::v5::mqttbytes::QoS::AtLeastOnce,
            Qos::ExactlyOnce => rumqttc::v5::mqttbytes::QoS::ExactlyOnce,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, serde::Deserialize)]
#[cfg_attr(test, derive(serde::Serialize))]
pub enum Font {
    Font4x6,
    #[default]
    Font5x8,
    Font6x10,
    Font9x15Bold,
}

impl From<Font> for embedded_graphics::mono_font::MonoFont<'static> {
    fn from(value: Font) -> Self {
        match value {
            Font::Font4x6 => embedded_graphics::mono_font::ascii::FONT_4X6,
            Font::Font5x8 => embedded_graphics::mono_font::ascii::FONT_5X8,
            Font::Font6x10 => embedded_graphics::mono_font::ascii::FONT_6X10,
            Font::Font9x15Bold => embedded_graphics::mono_font::ascii::FONT_9X15_BOLD,
        }
    }
}

/// One sprite template. The `type` field selects the kind; every kind has
/// its own explicit field set and unknown fields are rejected outright.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpriteConfig {
    Sprite(PixelSpriteConfig),
    FancyText(FancyTextConfig),
    Duration(GaugeConfig),
    Temperature(GaugeConfig),
    Image(ImageSpriteConfig),
    AnimatedGif(ImageSpriteConfig),
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PixelSpriteConfig {
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    #[serde(default)]
    pub dx: i32,
    #[serde(default)]
    pub dy: i32,

    #[serde(default = "default_one")]
    pub ticks_per_frame: u32,
    #[serde(default = "default_one")]
    pub ticks_per_movement: u32,
    #[serde(default = "default_ticks_per_phrase")]
    pub ticks_per_phrase: u32,
    #[serde(default = "default_min_ticks_per_phrase")]
    pub min_ticks_per_phrase: u32,
    #[serde(default = "default_max_ticks_per_phrase")]
    pub max_ticks_per_phrase: u32,
    #[serde(default = "default_tick_ceiling")]
    pub tick_ceiling: u32,

    #[serde(default = "default_true")]
    pub can_flip: bool,

    #[serde(default)]
    pub font: Font,

    /// Frame rows as digit strings, rows separated by whitespace. Digit 0
    /// is transparent; every other digit must be declared in the palette.
    pub frames: Vec<String>,

    /// Initial text shown before the first phrase rotation.
    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub phrases: Vec<PhraseConfig>,

    #[serde(default)]
    pub palette: PaletteConfig,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FancyTextConfig {
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    #[serde(default)]
    pub dx: i32,
    #[serde(default)]
    pub dy: i32,

    #[serde(default = "default_one")]
    pub ticks_per_movement: u32,
    #[serde(default = "default_tick_ceiling")]
    pub tick_ceiling: u32,

    #[serde(default)]
    pub can_flip: bool,

    #[serde(default)]
    pub font: Font,

    pub text: String,

    #[serde(default)]
    pub palette: PaletteConfig,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GaugeConfig {
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    #[serde(default)]
    pub dx: i32,
    #[serde(default)]
    pub dy: i32,

    #[serde(default = "default_one")]
    pub ticks_per_movement: u32,
    #[serde(default = "default_tick_ceiling")]
    pub tick_ceiling: u32,

    #[serde(default)]
    pub font: Font,

    pub label: String,

    /// Data-store key holding the live value.
    pub data_key: String,

    pub low: f64,
    pub high: f64,

    /// Defaults to green→red for `duration`, jet for `temperature`.
    #[serde(default)]
    pub colormap: Option<Colormap>,

    #[serde(default)]
    pub palette: PaletteConfig,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageSpriteConfig {
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    #[serde(default)]
    pub dx: i32,
    #[serde(default)]
    pub dy: i32,

    #[serde(default = "default_one")]
    pub ticks_per_frame: u32,
    #[serde(default = "default_one")]
    pub ticks_per_movement: u32,
    #[serde(default = "default_tick_ceiling")]
    pub tick_ceiling: u32,

    pub path: camino::Utf8PathBuf,
}

/// A phrase pool entry: a literal, a built-in dynamic text, or a nested
/// sprite template by name.
#[derive(Debug, Clone, serde::Deserialize)]
#[cfg_attr(test, derive(serde::Serialize))]
#[serde(untagged)]
pub enum PhraseConfig {
    Literal(String),
    Dynamic { dynamic: DynamicText },
    Nested { sprite: String },
}

/// Palette overrides on top of the defaults (`1` = white, `text` = green,
/// `label` = yellow). Keys are frame digits or the reserved roles `text`
/// and `label`.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(transparent)]
pub struct PaletteConfig(pub BTreeMap<String, [u8; 3]>);

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SceneConfig {
    Sprites(SpriteSceneConfig),
    Image(SceneImageConfig),
    AnimatedGif(SceneImageConfig),
    Welcome(WelcomeConfig),
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpriteSceneConfig {
    pub sprites: Vec<PlacementConfig>,
}

/// A sprite instance in a scene: the template name plus optional placement
/// overrides applied to this scene's independent copy.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlacementConfig {
    pub sprite: String,
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub dx: Option<i32>,
    pub dy: Option<i32>,
    pub ticks_per_movement: Option<u32>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SceneImageConfig {
    pub path: camino::Utf8PathBuf,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WelcomeConfig {
    #[serde(default = "default_welcome_text")]
    pub text: String,

    #[serde(default = "default_welcome_font")]
    pub font: Font,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[cfg_attr(test, derive(serde::Serialize))]
#[serde(deny_unknown_fields)]
pub struct ModeEntryConfig {
    pub scene: String,

    #[serde(with = "humantime_serde")]
    pub duration: std::time::Duration,

    /// Pushed to the display when the scene becomes active; unset leaves
    /// brightness as-is.
    #[serde(default)]
    pub brightness: Option<u8>,
}

impl Config {
    pub async fn load(path: &camino::Utf8Path) -> Result<Self, ConfigError> {
        let config_str =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::ReadingFile {
                    path: path.to_path_buf(),
                    source,
                })?;

        toml::from_str(&config_str).map_err(ConfigError::ParsingConfig)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file from path '{}'", .path)]
    ReadingFile {
        path: camino::Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    ParsingConfig(#[from] toml::de::Error),

    #[error("No scenes are configured")]
    NoScenes,

    #[error("Scene name '{name}' is reserved")]
    ReservedSceneName { name: String },

    #[error("Mode name '{name}' is reserved")]
    ReservedModeName { name: String },

    #[error("Scene '{scene}' references unknown sprite '{sprite}'")]
    UnknownSpriteInScene { scene: String, sprite: String },

    #[error("Mode '{mode}' references unknown scene '{scene}'")]
    UnknownSceneInMode { mode: String, scene: String },

    #[error("Mode '{mode}' has an empty scene list")]
    EmptyModeSequence { mode: String },

    #[error("Default mode '{mode}' is not a configured mode or scene")]
    UnknownDefaultMode { mode: String },

    #[error("Sprite '{sprite}' references unknown phrase sprite '{phrase}'")]
    UnknownNestedSprite { sprite: String, phrase: String },

    #[error("Sprite '{sprite}' nests '{nested}', which nests sprites itself")]
    NestedSpriteTooDeep { sprite: String, nested: String },

    #[error("Sprite '{sprite}' has no frames")]
    EmptyFrames { sprite: String },

    #[error("Scene '{scene}' GIF has no frames")]
    EmptyGifScene { scene: String },

    #[error("Sprite '{sprite}' frame contains non-digit character '{character}'")]
    BadFrameCell { sprite: String, character: char },

    #[error("Sprite '{sprite}' uses palette index {index}, which is not declared")]
    UndeclaredPaletteIndex { sprite: String, index: u8 },

    #[error("Sprite '{sprite}' declares palette index 0, which is reserved for transparency")]
    ReservedPaletteIndex { sprite: String },

    #[error("Sprite '{sprite}' has invalid palette key '{key}'")]
    BadPaletteKey { sprite: String, key: String },

    #[error("Sprite '{sprite}' has equal low and high bounds ({bound})")]
    DegenerateBounds { sprite: String, bound: f64 },

    #[error("Sprite '{sprite}' has a zero tick period")]
    ZeroTickPeriod { sprite: String },

    #[error("Sprite '{sprite}' phrase dwell bounds are inverted (min {min} > max {max})")]
    PhraseDwellBounds { sprite: String, min: u32, max: u32 },

    #[error("Sprite '{sprite}' tick ceiling {ceiling} does not exceed its longest period {period}")]
    TickCeilingTooSmall {
        sprite: String,
        ceiling: u32,
        period: u32,
    },

    #[error("Failed to load image from '{path}'")]
    LoadingImage {
        path: camino::Utf8PathBuf,
        #[source]
        source: image::ImageError,
    },
}

fn default_brightness() -> u8 {
    100
}

fn default_duration() -> std::time::Duration {
    std::time::Duration::from_secs(5)
}

fn default_one() -> u32 {
    1
}

fn default_ticks_per_phrase() -> u32 {
    200
}

fn default_min_ticks_per_phrase() -> u32 {
    100
}

fn default_max_ticks_per_phrase() -> u32 {
    400
}

fn default_tick_ceiling() -> u32 {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_welcome_text() -> String {
    String::from("HELLO!")
}

fn default_welcome_font() -> Font {
    Font::Font9x15Bold
}

/// A parsed config with stock display/MQTT sections plus `tail`, for
/// tests that only care about sprites, scenes and modes.
#[cfg(test)]
pub(crate) fn test_config(tail: &str) -> Config {
    let base = r#"
        [display]
        host = "127.0.0.1"
        port = 4048
        udp_port = 4048
        width = 64
        height = 32

        [mqtt]
        host = "127.0.0.1"
        port = 1883
        qos = "AtMostOnce"
        client_name = "test"
        keep_alive = "5s"
        topic_prefix = "panel"
    "#;
    toml::from_str(&format!("{base}\n{tail}")).expect("test config parses")
}
