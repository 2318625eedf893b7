//! Image-backed sprites: a static bitmap and an animated GIF. Both are
//! thumbnailed to the panel bounds and support runtime path changes.

use image::AnimationDecoder;

use super::FrameReel;
use super::Motion;
use super::PathChangeError;
use super::Ticker;
use crate::config::ConfigError;
use crate::config::ImageSpriteConfig;
use crate::display::Display;

/// A bitmap that may move but does not animate.
#[derive(Debug, Clone)]
pub struct ImageSprite {
    name: String,
    ticker: Ticker,
    motion: Motion,
    image: image::RgbaImage,
    max_size: (u32, u32),
}

impl ImageSprite {
    pub(crate) fn from_config(
        name: &str,
        config: &ImageSpriteConfig,
        width: i32,
        height: i32,
    ) -> Result<Self, ConfigError> {
        super::validate_periods(name, &[config.ticks_per_frame, config.ticks_per_movement])?;
        super::validate_ceiling(
            name,
            config.tick_ceiling,
            config.ticks_per_frame.max(config.ticks_per_movement),
        )?;

        let max_size = (width as u32, height as u32);
        let image = load_rgba(&config.path, max_size).map_err(|source| {
            ConfigError::LoadingImage {
                path: config.path.clone(),
                source,
            }
        })?;

        Ok(Self {
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
            image,
            max_size,
        })
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

    pub(crate) fn set_source_path(&mut self, path: &camino::Utf8Path) -> Result<(), PathChangeError> {
        self.image = load_rgba(path, self.max_size).map_err(PathChangeError::Load)?;
        Ok(())
    }

    pub fn width(&self) -> i32 {
        self.image.width() as i32
    }

    pub fn height(&self) -> i32 {
        self.image.height() as i32
    }

    pub fn render<D: Display>(&mut self, display: &mut D) -> i32 {
        display.set_image(&self.image, self.motion.x, self.motion.y);
        self.tick();
        0
    }

    fn tick(&mut self) {
        let mut rng = rand::thread_rng();
        self.ticker.advance();
        let width = self.width();
        let height = self.height();
        let _ = self.motion.step(&self.ticker, width, height, 0, &mut rng);
        self.ticker.wrap();
    }
}

/// A decoded GIF, playing its frames forward in a loop.
#[derive(Debug, Clone)]
pub struct GifSprite {
    name: String,
    ticker: Ticker,
    motion: Motion,
    reel: FrameReel<image::RgbaImage>,
    max_size: (u32, u32),
    ticks_per_frame: u32,
}

impl GifSprite {
    pub(crate) fn from_config(
        name: &str,
        config: &ImageSpriteConfig,
        width: i32,
        height: i32,
    ) -> Result<Self, ConfigError> {
        super::validate_periods(name, &[config.ticks_per_frame, config.ticks_per_movement])?;
        super::validate_ceiling(
            name,
            config.tick_ceiling,
            config.ticks_per_frame.max(config.ticks_per_movement),
        )?;

        let max_size = (width as u32, height as u32);
        let frames = load_gif_frames(&config.path, max_size).map_err(|source| {
            ConfigError::LoadingImage {
                path: config.path.clone(),
                source,
            }
        })?;
        if frames.is_empty() {
            return Err(ConfigError::EmptyFrames {
                sprite: name.to_owned(),
            });
        }

        Ok(Self {
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
            reel: FrameReel::looping(frames, config.ticks_per_frame),
            max_size,
            ticks_per_frame: config.ticks_per_frame,
        })
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

    pub(crate) fn set_source_path(&mut self, path: &camino::Utf8Path) -> Result<(), PathChangeError> {
        let frames = load_gif_frames(path, self.max_size).map_err(PathChangeError::Load)?;
        if frames.is_empty() {
            return Err(PathChangeError::Load(image::ImageError::IoError(
                std::io::Error::new(std::io::ErrorKind::InvalidData, "GIF has no frames"),
            )));
        }
        self.reel = FrameReel::looping(frames, self.ticks_per_frame);
        Ok(())
    }

    pub fn width(&self) -> i32 {
        self.reel.current().width() as i32
    }

    pub fn height(&self) -> i32 {
        self.reel.current().height() as i32
    }

    pub fn render<D: Display>(&mut self, display: &mut D) -> i32 {
        display.set_image(self.reel.current(), self.motion.x, self.motion.y);
        self.tick();
        0
    }

    fn tick(&mut self) {
        let mut rng = rand::thread_rng();
        self.ticker.advance();
        self.reel.advance_on(&self.ticker);
        let width = self.width();
        let height = self.height();
        let _ = self.motion.step(&self.ticker, width, height, 0, &mut rng);
        self.ticker.wrap();
        self.reel.settle();
    }
}

pub(crate) fn load_rgba(
    path: &camino::Utf8Path,
    (max_width, max_height): (u32, u32),
) -> Result<image::RgbaImage, image::ImageError> {
    let decoded = image::open(path.as_std_path())?;
    Ok(decoded.thumbnail(max_width, max_height).to_rgba8())
}

pub(crate) fn load_gif_frames(
    path: &camino::Utf8Path,
    (max_width, max_height): (u32, u32),
) -> Result<Vec<image::RgbaImage>, image::ImageError> {
    let file = std::fs::File::open(path.as_std_path()).map_err(image::ImageError::IoError)?;
    let decoder = image::codecs::gif::GifDecoder::new(std::io::BufReader::new(file))?;
    let frames = decoder.into_frames().collect_frames()?;
    Ok(frames
        .into_iter()
        .map(|frame| {
            image::DynamicImage::ImageRgba8(frame.into_buffer())
                .thumbnail(max_width, max_height)
                .to_rgba8()
        })
        .collect())
}
