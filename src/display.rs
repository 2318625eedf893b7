use embedded_graphics::draw_target::DrawTarget;
use embedded_graphics::geometry::OriginDimensions;
use embedded_graphics::geometry::Point;
use embedded_graphics::geometry::Size;
use embedded_graphics::mono_font::MonoFont;
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::RgbColor;
use embedded_graphics::text::Baseline;
use embedded_graphics::text::Text;
use embedded_graphics::Drawable;
use embedded_graphics::Pixel;
use rgb::RGB8;

use crate::colors::Colormap;
use crate::colors::GREEN;

/// The surface sprites and scenes draw onto.
///
/// Coordinates are top-left anchored and may fall outside the panel;
/// out-of-bounds pixels are silently dropped, since sprites legitimately
/// overhang the edges while wrapping.
pub trait Display {
    fn width(&self) -> i32;
    fn height(&self) -> i32;

    fn brightness(&self) -> u8;
    fn set_brightness(&mut self, value: u8);

    fn clear(&mut self);
    fn set_pixel(&mut self, x: i32, y: i32, color: Rgb888);

    /// Draw `text` with its top-left corner at `(x, y)` and return the
    /// consumed pixel width.
    fn draw_text(
        &mut self,
        font: &MonoFont<'static>,
        x: i32,
        y: i32,
        color: Rgb888,
        text: &str,
    ) -> i32;

    /// Push the drawn frame out to the device.
    fn swap(&mut self) -> Result<(), DisplayError>;

    /// Blit an RGBA image, skipping fully transparent pixels.
    fn set_image(&mut self, image: &image::RgbaImage, x: i32, y: i32) {
        for (px, py, pixel) in image.enumerate_pixels() {
            let image::Rgba([r, g, b, a]) = *pixel;
            if a == 0 {
                continue;
            }
            self.set_pixel(x + px as i32, y + py as i32, Rgb888::new(r, g, b));
        }
    }

    /// Per-character rainbow text with a box around it.
    fn rainbow_text(&mut self, font: &MonoFont<'static>, x: i32, y: i32, text: &str) {
        let count = text.chars().count().max(1);
        let mut x_end = x;
        for (i, ch) in text.chars().enumerate() {
            let color = Colormap::Rainbow.sample(i as f64 / count as f64);
            let mut buf = [0_u8; 4];
            x_end += self.draw_text(font, x_end, y, color, ch.encode_utf8(&mut buf));
        }
        let height = font.character_size.height as i32;
        self.draw_box(x - 2, y - 2, x_end, y + height + 1);
    }

    fn draw_box(&mut self, xmin: i32, ymin: i32, xmax: i32, ymax: i32) {
        for x in xmin..xmax {
            self.set_pixel(x, ymin, GREEN);
            self.set_pixel(x, ymax, GREEN);
        }
        for y in ymin..=ymax {
            self.set_pixel(xmin, y, GREEN);
            self.set_pixel(xmax, y, GREEN);
        }
    }
}

/// Pixel width a monospace font needs for `text`.
pub fn text_width(font: &MonoFont<'static>, text: &str) -> i32 {
    let per_char = font.character_size.width + font.character_spacing;
    (text.chars().count() as u32 * per_char) as i32
}

#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("Failed to bind UDP socket")]
    UdpBind(#[source] std::io::Error),

    #[error("DDP error")]
    Ddp(#[from] ddp_rs::error::DDPError),
}

/// In-memory RGB frame, drawable by `embedded_graphics` primitives.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    pixels: Vec<Rgb888>,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![Rgb888::BLACK; (width * height) as usize],
        }
    }

    pub fn fill(&mut self, color: Rgb888) {
        self.pixels.fill(color);
    }

    pub fn set(&mut self, x: i32, y: i32, color: Rgb888) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        self.pixels[(y as u32 * self.width + x as u32) as usize] = color;
    }

    pub fn get(&self, x: i32, y: i32) -> Option<Rgb888> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some(self.pixels[(y as u32 * self.width + x as u32) as usize])
    }

    pub fn pixels(&self) -> &[Rgb888] {
        &self.pixels
    }
}

impl OriginDimensions for FrameBuffer {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for FrameBuffer {
    type Color = Rgb888;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            self.set(point.x, point.y, color);
        }
        Ok(())
    }
}

/// DDP/UDP sink for a pixel stream, one panel's worth per flush.
struct DdpSink {
    connection: ddp_rs::connection::DDPConnection,
}

impl smart_leds_trait::SmartLedsWrite for DdpSink {
    type Error = ddp_rs::error::DDPError;
    type Color = RGB8;

    fn write<T, I>(&mut self, iterator: T) -> Result<(), Self::Error>
    where
        T: IntoIterator<Item = I>,
        I: Into<Self::Color>,
    {
        self.connection
            .write(
                &iterator
                    .into_iter()
                    .map(|c| c.into())
                    .flat_map(|rgb| [rgb.r, rgb.g, rgb.b].into_iter())
                    .collect::<Vec<u8>>(),
            )
            .map(drop)
    }
}

/// A panel reached over the Distributed Display Protocol.
///
/// Brightness is applied as a channel scale at flush time; the buffer
/// itself always holds full-intensity colors.
pub struct DdpDisplay {
    buffer: FrameBuffer,
    sink: DdpSink,
    brightness: u8,
}

impl DdpDisplay {
    pub fn connect(config: &crate::config::DisplayConfig) -> Result<Self, DisplayError> {
        let socket = std::net::UdpSocket::bind(format!("0.0.0.0:{}", config.udp_port))
            .map_err(DisplayError::UdpBind)?;
        let connection = ddp_rs::connection::DDPConnection::try_new(
            format!("{}:{}", config.host, config.port),
            ddp_rs::protocol::PixelConfig::default(),
            ddp_rs::protocol::ID::Default,
            socket,
        )?;

        Ok(Self {
            buffer: FrameBuffer::new(config.width, config.height),
            sink: DdpSink { connection },
            brightness: config.initial_brightness.min(100),
        })
    }
}

impl Display for DdpDisplay {
    fn width(&self) -> i32 {
        self.buffer.width as i32
    }

    fn height(&self) -> i32 {
        self.buffer.height as i32
    }

    fn brightness(&self) -> u8 {
        self.brightness
    }

    fn set_brightness(&mut self, value: u8) {
        self.brightness = value.min(100);
    }

    fn clear(&mut self) {
        self.buffer.fill(Rgb888::BLACK);
    }

    fn set_pixel(&mut self, x: i32, y: i32, color: Rgb888) {
        self.buffer.set(x, y, color);
    }

    fn draw_text(
        &mut self,
        font: &MonoFont<'static>,
        x: i32,
        y: i32,
        color: Rgb888,
        text: &str,
    ) -> i32 {
        let style = MonoTextStyle::new(font, color);
        let _ = Text::with_baseline(text, Point::new(x, y), style, Baseline::Top)
            .draw(&mut self.buffer);
        text_width(font, text)
    }

    fn swap(&mut self) -> Result<(), DisplayError> {
        let scale = self.brightness as u16;
        let scaled = self.buffer.pixels().iter().map(|color| RGB8 {
            r: (color.r() as u16 * scale / 100) as u8,
            g: (color.g() as u16 * scale / 100) as u8,
            b: (color.b() as u16 * scale / 100) as u8,
        });
        smart_leds_trait::SmartLedsWrite::write(&mut self.sink, scaled)?;
        Ok(())
    }
}

/// Discards every draw call. Used by `verify-config`, which needs the
/// whole driver built without touching a socket.
pub struct NullDisplay {
    width: i32,
    height: i32,
    brightness: u8,
}

impl NullDisplay {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width as i32,
            height: height as i32,
            brightness: 100,
        }
    }
}

impl Display for NullDisplay {
    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn brightness(&self) -> u8 {
        self.brightness
    }

    fn set_brightness(&mut self, value: u8) {
        self.brightness = value.min(100);
    }

    fn clear(&mut self) {}

    fn set_pixel(&mut self, _x: i32, _y: i32, _color: Rgb888) {}

    fn draw_text(
        &mut self,
        font: &MonoFont<'static>,
        _x: i32,
        _y: i32,
        _color: Rgb888,
        text: &str,
    ) -> i32 {
        text_width(font, text)
    }

    fn swap(&mut self) -> Result<(), DisplayError> {
        Ok(())
    }
}
