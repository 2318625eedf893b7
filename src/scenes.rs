//! Scenes: fixed groups of sprite instances rendered together. One scene
//! is active at a time; the driver decides which.

use std::collections::BTreeMap;

use crate::config::Config;
use crate::config::ConfigError;
use crate::config::Font;
use crate::config::SceneConfig;
use crate::display::Display;
use crate::sprites::SpriteInstance;

/// Reserved scene name used for suspend. Always present, never
/// user-configurable.
pub const BLANK_SCENE: &str = "blank";

#[derive(Debug, Clone)]
pub enum Scene {
    Sprites(SpriteScene),
    /// Draws nothing; the driver stretches the frame delay while this is
    /// active.
    Blank,
    Image(ImageScene),
    AnimatedGif(GifScene),
    Welcome(WelcomeScene),
}

#[derive(Debug, Clone)]
pub struct SpriteScene {
    sprites: Vec<SpriteInstance>,
}

#[derive(Debug, Clone)]
pub struct ImageScene {
    image: image::RgbaImage,
}

#[derive(Debug, Clone)]
pub struct GifScene {
    frames: Vec<image::RgbaImage>,
    index: usize,
}

#[derive(Debug, Clone)]
pub struct WelcomeScene {
    text: String,
    font: Font,
}

impl Scene {
    /// Render one frame. The caller clears the display; draw order is
    /// config order, later sprites draw on top.
    pub fn draw_frame<D: Display>(&mut self, display: &mut D) {
        match self {
            Scene::Sprites(scene) => {
                for sprite in &mut scene.sprites {
                    sprite.render(display);
                }
            }
            Scene::Blank => {}
            Scene::Image(scene) => display.set_image(&scene.image, 0, 0),
            Scene::AnimatedGif(scene) => {
                display.set_image(&scene.frames[scene.index], 0, 0);
                scene.index = (scene.index + 1) % scene.frames.len();
            }
            Scene::Welcome(scene) => {
                let font = embedded_graphics::mono_font::MonoFont::from(scene.font);
                display.rainbow_text(&font, 5, 5, &scene.text);
            }
        }
    }

    /// Called right before the scene becomes active again.
    pub fn reinit(&mut self) {
        if let Scene::Sprites(scene) = self {
            for sprite in &mut scene.sprites {
                sprite.reinit();
            }
        }
    }

    /// How long the driver sleeps between frames of this scene.
    pub fn frame_delay(&self) -> std::time::Duration {
        match self {
            Scene::Blank => std::time::Duration::from_secs(1),
            Scene::AnimatedGif(_) => std::time::Duration::from_millis(50),
            _ => crate::driver::FRAME_DELAY,
        }
    }

    /// The owned sprite instances, for runtime commands addressing sprites
    /// by template name.
    pub fn sprites_mut(&mut self) -> &mut [SpriteInstance] {
        match self {
            Scene::Sprites(scene) => &mut scene.sprites,
            _ => &mut [],
        }
    }
}

/// Build every configured scene, plus the reserved blank scene. Sprites
/// are independent clones of the templates with per-placement overrides
/// applied and their bounds pinned to the panel size.
pub fn build(
    config: &Config,
    templates: &BTreeMap<String, SpriteInstance>,
) -> Result<BTreeMap<String, Scene>, ConfigError> {
    let width = config.display.width as i32;
    let height = config.display.height as i32;
    let max_size = (config.display.width, config.display.height);

    let mut scenes = BTreeMap::new();
    for (name, scene_config) in &config.scenes {
        if name == BLANK_SCENE {
            return Err(ConfigError::ReservedSceneName { name: name.clone() });
        }

        let scene = match scene_config {
            SceneConfig::Sprites(conf) => {
                let mut sprites = Vec::with_capacity(conf.sprites.len());
                for placement in &conf.sprites {
                    let template = templates.get(&placement.sprite).ok_or_else(|| {
                        ConfigError::UnknownSpriteInScene {
                            scene: name.clone(),
                            sprite: placement.sprite.clone(),
                        }
                    })?;
                    let mut instance = template.clone();
                    instance.apply_placement(placement);
                    instance.set_bounds(width, height);
                    sprites.push(instance);
                }
                Scene::Sprites(SpriteScene { sprites })
            }
            SceneConfig::Image(conf) => {
                let image = crate::sprites::image::load_rgba(&conf.path, max_size).map_err(
                    |source| ConfigError::LoadingImage {
                        path: conf.path.clone(),
                        source,
                    },
                )?;
                Scene::Image(ImageScene { image })
            }
            SceneConfig::AnimatedGif(conf) => {
                let frames = crate::sprites::image::load_gif_frames(&conf.path, max_size)
                    .map_err(|source| ConfigError::LoadingImage {
                        path: conf.path.clone(),
                        source,
                    })?;
                if frames.is_empty() {
                    return Err(ConfigError::EmptyGifScene {
                        scene: name.clone(),
                    });
                }
                Scene::AnimatedGif(GifScene { frames, index: 0 })
            }
            SceneConfig::Welcome(conf) => Scene::Welcome(WelcomeScene {
                text: conf.text.clone(),
                font: conf.font,
            }),
        };

        scenes.insert(name.clone(), scene);
        tracing::debug!(scene = %name, "Built scene");
    }

    if scenes.is_empty() {
        return Err(ConfigError::NoScenes);
    }
    scenes.insert(BLANK_SCENE.to_owned(), Scene::Blank);

    Ok(scenes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::data::DataStore;
    use crate::display::testing::RecordingDisplay;
    use crate::display::Display as _;

    fn build_scenes(tail: &str) -> Result<BTreeMap<String, Scene>, ConfigError> {
        let config = test_config(tail);
        let templates =
            crate::sprites::build_templates(&config, &DataStore::default())?;
        build(&config, &templates)
    }

    const TRAFFIC: &str = r#"
        [sprites.i90]
        type = "duration"
        label = "I90"
        data_key = "travel_time_i90"
        low = 13.0
        high = 25.0

        [scenes.traffic]
        type = "sprites"
        sprites = [
            { sprite = "i90", x = 0, y = 8 },
            { sprite = "i90", x = 0, y = 16 },
        ]
    "#;

    #[test]
    fn test_factory_clones_templates_per_placement() {
        let mut scenes = build_scenes(TRAFFIC).unwrap();
        let scene = scenes.get_mut("traffic").unwrap();
        let sprites = scene.sprites_mut();
        assert_eq!(sprites.len(), 2);
        assert_eq!(sprites[0].template_name(), "i90");

        let mut display = RecordingDisplay::new(64, 32);
        scene.draw_frame(&mut display);
        // Both copies drew at their own placement.
        assert_eq!(display.texts.len(), 4);
        assert_eq!(display.texts[0].1, 8);
        assert_eq!(display.texts[2].1, 16);
    }

    #[test]
    fn test_blank_scene_is_always_present_and_draws_nothing() {
        let mut scenes = build_scenes(TRAFFIC).unwrap();
        let blank = scenes.get_mut(BLANK_SCENE).unwrap();
        let mut display = RecordingDisplay::new(64, 32);
        blank.draw_frame(&mut display);
        assert_eq!(display.lit_pixels(), 0);
        assert!(display.texts.is_empty());
        assert_eq!(blank.frame_delay(), std::time::Duration::from_secs(1));
    }

    #[test]
    fn test_unknown_sprite_reference_is_fatal() {
        let result = build_scenes(
            r#"
            [scenes.broken]
            type = "sprites"
            sprites = [{ sprite = "ghost" }]
            "#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::UnknownSpriteInScene { .. })
        ));
    }

    #[test]
    fn test_user_scene_named_blank_is_rejected() {
        let result = build_scenes(
            r#"
            [scenes.blank]
            type = "sprites"
            sprites = []
            "#,
        );
        assert!(matches!(result, Err(ConfigError::ReservedSceneName { .. })));
    }

    #[test]
    fn test_no_scenes_is_fatal() {
        let result = build_scenes("");
        assert!(matches!(result, Err(ConfigError::NoScenes)));
    }

    #[test]
    fn test_welcome_scene_draws_rainbow_text() {
        let mut scenes = build_scenes(
            r#"
            [scenes.hello]
            type = "welcome"
            "#,
        )
        .unwrap();
        let mut display = RecordingDisplay::new(64, 32);
        scenes.get_mut("hello").unwrap().draw_frame(&mut display);
        // One draw call per character of "HELLO!".
        assert_eq!(display.texts.len(), 6);
    }

    #[test]
    fn test_later_sprites_draw_on_top() {
        let mut scenes = build_scenes(
            r#"
            [sprites.red_dot]
            type = "sprite"
            frames = ["1"]
            palette = { "1" = [255, 0, 0] }

            [sprites.blue_dot]
            type = "sprite"
            frames = ["1"]
            palette = { "1" = [0, 0, 255] }

            [scenes.dots]
            type = "sprites"
            sprites = [
                { sprite = "red_dot", x = 3, y = 3 },
                { sprite = "blue_dot", x = 3, y = 3 },
            ]
            "#,
        )
        .unwrap();

        let mut display = RecordingDisplay::new(64, 32);
        scenes.get_mut("dots").unwrap().draw_frame(&mut display);
        assert_eq!(
            display.buffer.get(3, 3),
            Some(embedded_graphics::pixelcolor::Rgb888::new(0, 0, 255))
        );
    }

    #[test]
    fn test_reinit_restores_sprite_positions() {
        let mut scenes = build_scenes(
            r#"
            [sprites.walker]
            type = "sprite"
            x = 5
            dx = 1
            can_flip = false
            frames = ["1"]

            [scenes.walk]
            type = "sprites"
            sprites = [{ sprite = "walker" }]
            "#,
        )
        .unwrap();

        let scene = scenes.get_mut("walk").unwrap();
        let mut display = RecordingDisplay::new(64, 32);
        for _ in 0..5 {
            scene.draw_frame(&mut display);
        }
        scene.reinit();
        display.clear();
        scene.draw_frame(&mut display);
        assert_eq!(
            display.buffer.get(5, 0),
            Some(embedded_graphics::pixelcolor::Rgb888::new(255, 255, 255))
        );
    }
}
