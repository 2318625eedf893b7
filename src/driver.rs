//! The scheduler: applies modes, absorbs live-data commands, and paces
//! frames and scene switches against the wall clock.

use std::collections::BTreeMap;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::config::ConfigError;
use crate::data::DataStore;
use crate::display::Display;
use crate::scenes::Scene;
use crate::scenes::BLANK_SCENE;

/// Delay between frames of a regular scene.
pub const FRAME_DELAY: std::time::Duration = std::time::Duration::from_millis(5);

/// Reserved catch-all mode containing every scene.
pub const ALL_MODE: &str = "all";

/// Duration of the blank scene while suspended.
const BLANK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(2);

const FALLBACK_BRIGHTNESS: u8 = 100;

/// One step of a mode's rotation.
#[derive(Debug, Clone)]
pub struct ModeEntry {
    pub scene: String,
    pub duration: std::time::Duration,
    pub brightness: Option<u8>,
}

#[derive(Debug, thiserror::Error)]
#[error("'{0}' is not a mode or scene name")]
pub struct UnknownMode(String);

pub struct Driver<D> {
    display: D,
    data: DataStore,
    scenes: BTreeMap<String, Scene>,
    modes: BTreeMap<String, Vec<ModeEntry>>,
    sequence: Vec<ModeEntry>,
    cycle_pos: usize,
    active: String,
    mode: String,
    previous_mode: String,
    randomize: bool,
    default_duration: std::time::Duration,
    interval: std::time::Duration,
    last_brightness: u8,
    last_power: String,
}

impl<D: Display> Driver<D> {
    /// Build sprites, scenes and the mode table, apply the default mode,
    /// and force one scene change so a valid active scene exists before
    /// the first frame is drawn.
    pub fn build(config: &Config, display: D, data: DataStore) -> Result<Self, ConfigError> {
        let templates = crate::sprites::build_templates(config, &data)?;
        let scenes = crate::scenes::build(config, &templates)?;

        let mut modes: BTreeMap<String, Vec<ModeEntry>> = BTreeMap::new();
        for (mode_name, entries) in &config.modes {
            if mode_name == ALL_MODE || mode_name == BLANK_SCENE {
                return Err(ConfigError::ReservedModeName {
                    name: mode_name.clone(),
                });
            }
            if entries.is_empty() {
                return Err(ConfigError::EmptyModeSequence {
                    mode: mode_name.clone(),
                });
            }
            let mut sequence = Vec::with_capacity(entries.len());
            for entry in entries {
                if !scenes.contains_key(&entry.scene) {
                    return Err(ConfigError::UnknownSceneInMode {
                        mode: mode_name.clone(),
                        scene: entry.scene.clone(),
                    });
                }
                sequence.push(ModeEntry {
                    scene: entry.scene.clone(),
                    duration: entry.duration,
                    brightness: entry.brightness,
                });
            }
            modes.insert(mode_name.clone(), sequence);
        }

        let all = scenes
            .keys()
            .filter(|name| name.as_str() != BLANK_SCENE)
            .map(|name| ModeEntry {
                scene: name.clone(),
                duration: config.panel.default_duration,
                brightness: None,
            })
            .collect();
        modes.insert(ALL_MODE.to_owned(), all);
        modes.insert(
            BLANK_SCENE.to_owned(),
            vec![ModeEntry {
                scene: BLANK_SCENE.to_owned(),
                duration: BLANK_INTERVAL,
                brightness: None,
            }],
        );

        let default_mode = config
            .panel
            .default_mode
            .clone()
            .unwrap_or_else(|| ALL_MODE.to_owned());

        let mut driver = Self {
            display,
            data,
            scenes,
            modes,
            sequence: Vec::new(),
            cycle_pos: 0,
            active: String::new(),
            mode: String::new(),
            previous_mode: String::new(),
            randomize: config.panel.random,
            default_duration: config.panel.default_duration,
            interval: config.panel.default_duration,
            last_brightness: config.display.initial_brightness,
            last_power: String::from("1"),
        };

        driver
            .apply_mode(&default_mode)
            .map_err(|_| ConfigError::UnknownDefaultMode {
                mode: default_mode.clone(),
            })?;
        driver.previous_mode = driver.mode.clone();

        let entry = driver.select_next();
        driver.adopt(entry, true);

        Ok(driver)
    }

    pub fn active_scene(&self) -> &str {
        &self.active
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn suspended(&self) -> bool {
        self.mode == BLANK_SCENE
    }

    /// Draw frames until cancelled. Scene switches are paced by the wall
    /// clock, not by frame count, since scenes differ widely in per-frame
    /// cost.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), crate::error::Error> {
        tracing::info!(mode = %self.mode, scene = %self.active, "Starting render loop");
        let mut interval_start = tokio::time::Instant::now();
        loop {
            if cancel.is_cancelled() {
                tracing::info!("Cancelled, shutting down render loop");
                break;
            }

            self.draw_frame()?;
            tokio::time::sleep(self.frame_delay()).await;

            if interval_start.elapsed() >= self.interval {
                interval_start = tokio::time::Instant::now();
                self.next_scene();
            }
        }
        Ok(())
    }

    fn draw_frame(&mut self) -> Result<(), crate::error::Error> {
        self.display.clear();
        if let Some(scene) = self.scenes.get_mut(&self.active) {
            scene.draw_frame(&mut self.display);
        }
        self.display.swap()?;
        Ok(())
    }

    fn frame_delay(&self) -> std::time::Duration {
        self.scenes
            .get(&self.active)
            .map(Scene::frame_delay)
            .unwrap_or(FRAME_DELAY)
    }

    /// Rebuild the scene sequence for `name`. A scene name doubles as a
    /// single-scene mode. Unknown names leave every piece of state
    /// untouched.
    pub fn apply_mode(&mut self, name: &str) -> Result<(), UnknownMode> {
        let sequence = if let Some(entries) = self.modes.get(name) {
            entries.clone()
        } else if self.scenes.contains_key(name) {
            vec![ModeEntry {
                scene: name.to_owned(),
                duration: self.default_duration,
                brightness: None,
            }]
        } else {
            return Err(UnknownMode(name.to_owned()));
        };

        tracing::info!(mode = %name, scenes = sequence.len(), "Applying mode");
        if name != self.mode {
            self.previous_mode = std::mem::replace(&mut self.mode, name.to_owned());
        }
        self.sequence = sequence;
        self.cycle_pos = 0;
        Ok(())
    }

    /// Interval expiry: absorb external commands, then move to the next
    /// scene of the (possibly rebuilt) sequence.
    fn next_scene(&mut self) {
        self.absorb_commands();
        let entry = self.select_next();
        self.adopt(entry, false);
    }

    fn select_next(&mut self) -> ModeEntry {
        if self.randomize {
            let index = rand::thread_rng().gen_range(0..self.sequence.len());
            self.sequence[index].clone()
        } else {
            let entry = self.sequence[self.cycle_pos % self.sequence.len()].clone();
            self.cycle_pos = (self.cycle_pos + 1) % self.sequence.len();
            entry
        }
    }

    fn adopt(&mut self, entry: ModeEntry, force: bool) {
        if force || entry.scene != self.active {
            self.display.clear();
            if let Some(scene) = self.scenes.get_mut(&entry.scene) {
                scene.reinit();
            }
            if let Some(brightness) = entry.brightness {
                self.display.set_brightness(brightness);
            }
            tracing::debug!(scene = %entry.scene, "Switching scene");
            self.active = entry.scene;
        }
        self.interval = entry.duration;
    }

    /// Reconcile the live data store into scheduler state. Runs once per
    /// interval; stale reads are fine since everything is re-checked on
    /// the next one.
    fn absorb_commands(&mut self) {
        let power = self.data.get("power");
        if power != self.last_power {
            self.last_power = power.clone();
            match power.as_str() {
                "0" => self.suspend(),
                "1" => self.resume(),
                other => tracing::warn!(power = %other, "Ignoring unknown power value"),
            }
        }

        let mode = self.data.get("mode");
        if mode != self.mode {
            if let Err(error) = self.apply_mode(&mode) {
                tracing::warn!(%error, "Rejecting mode command");
                // Roll the key back so the bad name does not re-trigger
                // every interval.
                self.data.set("mode", self.mode.clone());
            }
        }

        let raw = self.data.get("brightness");
        let brightness = raw.trim().parse().unwrap_or(FALLBACK_BRIGHTNESS);
        if brightness != self.last_brightness {
            tracing::info!(brightness, "Applying brightness command");
            self.display.set_brightness(brightness);
            self.last_brightness = brightness;
        }

        let randomize = matches!(self.data.get("random").trim(), "1" | "true" | "on");
        if randomize != self.randomize {
            tracing::info!(randomize, "Switching scene selection policy");
            self.randomize = randomize;
        }

        let command = self.data.get("image_path");
        if !command.is_empty() {
            self.apply_image_path(&command);
            // One-shot command, not sticky.
            self.data.set("image_path", "");
        }
    }

    fn suspend(&mut self) {
        if self.suspended() {
            return;
        }
        tracing::info!("Suspending");
        if self.apply_mode(BLANK_SCENE).is_ok() {
            self.data.set("mode", BLANK_SCENE);
        }
    }

    fn resume(&mut self) {
        if !self.suspended() {
            return;
        }
        let previous = self.previous_mode.clone();
        tracing::info!(mode = %previous, "Resuming");
        if self.apply_mode(&previous).is_ok() {
            self.data.set("mode", previous);
        }
    }

    /// `sprite=path` command: swap the image source of every instance of
    /// the named sprite, in every scene.
    fn apply_image_path(&mut self, command: &str) {
        let Some((sprite_name, path)) = command.split_once('=') else {
            tracing::warn!(%command, "Ignoring malformed image path command");
            return;
        };
        let sprite_name = sprite_name.trim();
        let path = camino::Utf8Path::new(path.trim());

        let mut found = false;
        for scene in self.scenes.values_mut() {
            for sprite in scene.sprites_mut() {
                if sprite.template_name() != sprite_name {
                    continue;
                }
                found = true;
                if let Err(error) = sprite.set_source_path(path) {
                    tracing::warn!(sprite = %sprite_name, %error, "Image path change failed");
                }
            }
        }
        if !found {
            tracing::warn!(sprite = %sprite_name, "No sprite matches image path command");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::display::testing::RecordingDisplay;

    const TWO_SCENES: &str = r#"
        [sprites.dot]
        type = "sprite"
        frames = ["1"]

        [scenes.alpha]
        type = "sprites"
        sprites = [{ sprite = "dot" }]

        [scenes.beta]
        type = "sprites"
        sprites = [{ sprite = "dot" }]
    "#;

    const DAY_MODE: &str = r#"
        [panel]
        default_mode = "day"

        [[modes.day]]
        scene = "alpha"
        duration = "1s"

        [[modes.day]]
        scene = "beta"
        duration = "3s"
    "#;

    fn driver_from(tail: &str) -> Driver<RecordingDisplay> {
        let config = test_config(tail);
        let data = DataStore::seeded(
            config.panel.default_mode.as_deref().unwrap_or(ALL_MODE),
            config.display.initial_brightness,
            config.panel.random,
        );
        Driver::build(&config, RecordingDisplay::new(64, 32), data).unwrap()
    }

    #[test]
    fn test_startup_has_valid_active_scene() {
        let driver = driver_from(TWO_SCENES);
        assert_eq!(driver.mode(), ALL_MODE);
        assert!(driver
            .sequence
            .iter()
            .any(|entry| entry.scene == driver.active));
    }

    #[test]
    fn test_all_mode_contains_every_scene_except_blank() {
        let driver = driver_from(TWO_SCENES);
        let scenes: Vec<_> = driver.modes[ALL_MODE]
            .iter()
            .map(|entry| entry.scene.as_str())
            .collect();
        assert_eq!(scenes, vec!["alpha", "beta"]);
        assert!(driver.modes[ALL_MODE]
            .iter()
            .all(|entry| entry.duration == std::time::Duration::from_secs(5)));
    }

    #[test]
    fn test_apply_unknown_mode_leaves_state_untouched() {
        let mut driver = driver_from(TWO_SCENES);
        let active = driver.active.clone();
        let mode = driver.mode.clone();
        let sequence_len = driver.sequence.len();

        let result = driver.apply_mode("nonexistent");
        assert!(result.is_err());
        assert_eq!(driver.active, active);
        assert_eq!(driver.mode, mode);
        assert_eq!(driver.sequence.len(), sequence_len);
    }

    #[test]
    fn test_scene_name_acts_as_single_scene_mode() {
        let mut driver = driver_from(TWO_SCENES);
        driver.apply_mode("beta").unwrap();
        assert_eq!(driver.mode(), "beta");
        assert_eq!(driver.sequence.len(), 1);
        assert_eq!(driver.sequence[0].duration, std::time::Duration::from_secs(5));
        assert_eq!(driver.previous_mode, ALL_MODE);
    }

    #[test]
    fn test_round_robin_spends_time_proportionally() {
        let mut driver = driver_from(&format!("{TWO_SCENES}\n{DAY_MODE}"));
        assert_eq!(driver.active, "alpha");

        let mut spent: BTreeMap<String, u32> = BTreeMap::new();
        let mut order = vec![driver.active.clone()];
        let mut remaining = driver.interval.as_secs();
        for _ in 0..8 {
            *spent.entry(driver.active.clone()).or_default() += 1;
            remaining -= 1;
            if remaining == 0 {
                driver.next_scene();
                order.push(driver.active.clone());
                remaining = driver.interval.as_secs();
            }
        }

        assert_eq!(spent["alpha"], 2);
        assert_eq!(spent["beta"], 6);
        assert_eq!(order, vec!["alpha", "beta", "alpha", "beta", "alpha"]);
    }

    #[test]
    fn test_mode_command_is_applied_on_interval() {
        let mut driver = driver_from(&format!("{TWO_SCENES}\n{DAY_MODE}"));
        driver.data.set("mode", "beta");
        driver.next_scene();
        assert_eq!(driver.mode(), "beta");
        assert_eq!(driver.active_scene(), "beta");
    }

    #[test]
    fn test_invalid_mode_command_rolls_back_data_key() {
        let mut driver = driver_from(&format!("{TWO_SCENES}\n{DAY_MODE}"));
        driver.data.set("mode", "bogus");
        driver.next_scene();
        assert_eq!(driver.mode(), "day");
        assert_eq!(driver.data.get("mode"), "day");
    }

    #[test]
    fn test_brightness_command_with_fallback() {
        let mut driver = driver_from(TWO_SCENES);
        driver.data.set("brightness", "55");
        driver.next_scene();
        assert_eq!(driver.display.brightness_pushes, vec![55]);

        driver.data.set("brightness", "very bright");
        driver.next_scene();
        assert_eq!(driver.display.brightness_pushes, vec![55, 100]);
    }

    #[test]
    fn test_scene_brightness_override_is_pushed_on_switch() {
        let mut driver = driver_from(
            &format!(
                r#"{TWO_SCENES}
                [panel]
                default_mode = "day"

                [[modes.day]]
                scene = "alpha"
                duration = "1s"

                [[modes.day]]
                scene = "beta"
                duration = "1s"
                brightness = 40
                "#
            ),
        );
        driver.next_scene();
        assert_eq!(driver.active_scene(), "beta");
        assert_eq!(driver.display.brightness_pushes, vec![40]);
    }

    #[test]
    fn test_power_suspends_and_resumes_previous_mode() {
        let mut driver = driver_from(&format!("{TWO_SCENES}\n{DAY_MODE}"));
        driver.data.set("power", "0");
        driver.next_scene();
        assert!(driver.suspended());
        assert_eq!(driver.active_scene(), BLANK_SCENE);
        assert_eq!(driver.data.get("mode"), BLANK_SCENE);
        assert_eq!(driver.interval, std::time::Duration::from_secs(2));

        driver.data.set("power", "1");
        driver.next_scene();
        assert!(!driver.suspended());
        assert_eq!(driver.mode(), "day");
        assert_eq!(driver.data.get("mode"), "day");
    }

    #[test]
    fn test_mode_blank_command_suspends_without_power_fight() {
        let mut driver = driver_from(&format!("{TWO_SCENES}\n{DAY_MODE}"));
        driver.data.set("mode", BLANK_SCENE);
        driver.next_scene();
        assert!(driver.suspended());

        // Power stayed "1" the whole time; the edge-triggered handler must
        // not resume behind the command's back.
        driver.next_scene();
        assert!(driver.suspended());
        assert_eq!(driver.previous_mode, "day");

        driver.data.set("mode", "day");
        driver.next_scene();
        assert_eq!(driver.mode(), "day");
    }

    #[test]
    fn test_random_flag_switches_selection_policy() {
        let mut driver = driver_from(TWO_SCENES);
        assert!(!driver.randomize);
        driver.data.set("random", "1");
        driver.next_scene();
        assert!(driver.randomize);
        driver.data.set("random", "0");
        driver.next_scene();
        assert!(!driver.randomize);
    }

    #[test]
    fn test_image_path_command_is_one_shot() {
        let mut driver = driver_from(TWO_SCENES);
        driver.data.set("image_path", "dot=/tmp/nope.png");
        driver.next_scene();
        // The dot sprite does not support path changes; the command is
        // logged and cleared either way.
        assert_eq!(driver.data.get("image_path"), "");
    }

    #[test]
    fn test_reserved_mode_name_is_fatal() {
        let config = test_config(&format!(
            r#"{TWO_SCENES}
            [[modes.all]]
            scene = "alpha"
            duration = "1s"
            "#
        ));
        let data = DataStore::default();
        let result = Driver::build(&config, RecordingDisplay::new(64, 32), data);
        assert!(matches!(result, Err(ConfigError::ReservedModeName { .. })));
    }

    #[test]
    fn test_unknown_scene_in_mode_is_fatal() {
        let config = test_config(&format!(
            r#"{TWO_SCENES}
            [[modes.day]]
            scene = "ghost"
            duration = "1s"
            "#
        ));
        let data = DataStore::default();
        let result = Driver::build(&config, RecordingDisplay::new(64, 32), data);
        assert!(matches!(result, Err(ConfigError::UnknownSceneInMode { .. })));
    }

    #[test]
    fn test_unknown_default_mode_is_fatal() {
        let config = test_config(&format!(
            r#"{TWO_SCENES}
            [panel]
            default_mode = "ghost"
            "#
        ));
        let data = DataStore::default();
        let result = Driver::build(&config, RecordingDisplay::new(64, 32), data);
        assert!(matches!(result, Err(ConfigError::UnknownDefaultMode { .. })));
    }

    #[test]
    fn test_example_config_builds_end_to_end() {
        let config: Config = toml::from_str(include_str!("../test/config.toml")).unwrap();
        let data = DataStore::seeded("morning", 80, false);
        let driver = Driver::build(
            &config,
            crate::display::NullDisplay::new(64, 32),
            data,
        )
        .unwrap();
        assert_eq!(driver.mode(), "morning");
        assert_eq!(driver.active_scene(), "traffic");
        assert_eq!(driver.interval, std::time::Duration::from_secs(10));
    }

    #[test]
    fn test_draw_frame_clears_draws_and_swaps() {
        let mut driver = driver_from(TWO_SCENES);
        let clears = driver.display.clears;
        driver.draw_frame().unwrap();
        assert_eq!(driver.display.clears, clears + 1);
        assert_eq!(driver.display.swaps, 1);
        assert!(driver.display.lit_pixels() > 0);
    }
}
