use rayon::prelude::*;

use crate::document::RenderImage;

pub type Rgb = [u8; 3];

/// antiquewhite2
pub const DEFAULT_TINT: Rgb = [238, 223, 204];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PostProcess {
    pub invert: bool,
    pub tint: Option<Rgb>,
}

impl PostProcess {
    pub fn is_identity(&self) -> bool {
        !self.invert && self.tint.is_none()
    }

    /// Tint is applied before inversion so inverted pages keep a dark tinted background.
    pub fn apply(&self, image: &mut RenderImage) {
        if let Some(color) = self.tint {
            tint_pixels(image, color);
        }
        if self.invert {
            invert_pixels(image);
        }
    }
}

pub fn invert_pixels(image: &mut RenderImage) {
    let channels = image.channels.max(3) as usize;
    image
        .pixels
        .par_chunks_exact_mut(channels)
        .for_each(|chunk| {
            chunk[0] = 255 - chunk[0];
            chunk[1] = 255 - chunk[1];
            chunk[2] = 255 - chunk[2];
        });
}

/// Multiply blend: white becomes the tint color, black stays black.
pub fn tint_pixels(image: &mut RenderImage, color: Rgb) {
    let channels = image.channels.max(3) as usize;
    image
        .pixels
        .par_chunks_exact_mut(channels)
        .for_each(|chunk| {
            for (value, tint) in chunk.iter_mut().take(3).zip(color) {
                *value = ((*value as u16 * tint as u16 + 127) / 255) as u8;
            }
        });
}

pub fn crop_render_image(
    image: &RenderImage,
    origin_x: u32,
    origin_y: u32,
    width: u32,
    height: u32,
) -> RenderImage {
    if image.width == 0 || image.height == 0 {
        return RenderImage {
            width: 0,
            height: 0,
            channels: image.channels,
            pixels: Vec::new(),
        };
    }

    let width = width.min(image.width).max(1);
    let height = height.min(image.height).max(1);
    let origin_x = origin_x.min(image.width.saturating_sub(width));
    let origin_y = origin_y.min(image.height.saturating_sub(height));

    let bpp = image.channels as usize;
    let stride = image.stride();
    let mut pixels = Vec::with_capacity(width as usize * height as usize * bpp);

    for row in 0..height {
        let start = (origin_y + row) as usize * stride + origin_x as usize * bpp;
        let end = start + width as usize * bpp;
        pixels.extend_from_slice(&image.pixels[start..end]);
    }

    RenderImage {
        width,
        height,
        channels: image.channels,
        pixels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(channels: u8, pixels: Vec<u8>, width: u32, height: u32) -> RenderImage {
        RenderImage {
            width,
            height,
            channels,
            pixels,
        }
    }

    #[test]
    fn invert_leaves_alpha_alone() {
        let mut img = image(4, vec![0, 10, 255, 128], 1, 1);
        invert_pixels(&mut img);
        assert_eq!(img.pixels, vec![255, 245, 0, 128]);
    }

    #[test]
    fn tint_maps_white_to_color_and_keeps_black() {
        let mut img = image(3, vec![255, 255, 255, 0, 0, 0], 2, 1);
        tint_pixels(&mut img, DEFAULT_TINT);
        assert_eq!(img.pixels, vec![238, 223, 204, 0, 0, 0]);
    }

    #[test]
    fn post_process_order_is_tint_then_invert() {
        let mut img = image(3, vec![255, 255, 255], 1, 1);
        PostProcess {
            invert: true,
            tint: Some(DEFAULT_TINT),
        }
        .apply(&mut img);
        assert_eq!(img.pixels, vec![17, 32, 51]);
    }

    #[test]
    fn crop_copies_requested_window() {
        let pixels: Vec<u8> = (0..12).collect();
        let img = image(3, pixels, 2, 2);
        let cropped = crop_render_image(&img, 1, 1, 1, 1);
        assert_eq!(cropped.width, 1);
        assert_eq!(cropped.pixels, vec![9, 10, 11]);
    }
}
