use image::{GrayImage, Luma, RgbImage};

pub const CONTRAST_FACTOR: f32 = 1.5;
pub const BRIGHTNESS_FACTOR: f32 = 1.2;

/// ITU-R 601-2 luma, rounded to nearest.
pub fn luma(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        let l = (r as u32 * 299 + g as u32 * 587 + b as u32 * 114 + 500) / 1000;
        Luma([l as u8])
    })
}

/// Blends every channel away from the image's mean luma by `factor`.
pub fn adjust_contrast(image: &RgbImage, factor: f32) -> RgbImage {
    let gray = luma(image);
    let count = gray.pixels().len().max(1) as f64;
    let total: f64 = gray.pixels().map(|p| p.0[0] as f64).sum();
    let mean = (total / count + 0.5).floor() as f32;

    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = clamp_channel(mean + factor * (*channel as f32 - mean));
        }
    }
    out
}

/// Scales every channel by `factor` (a blend against black).
pub fn adjust_brightness(image: &RgbImage, factor: f32) -> RgbImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = clamp_channel(*channel as f32 * factor);
        }
    }
    out
}

/// Contrast first, then brightness.
pub fn enhance(image: &RgbImage) -> RgbImage {
    adjust_brightness(&adjust_contrast(image, CONTRAST_FACTOR), BRIGHTNESS_FACTOR)
}

fn clamp_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn luma_uses_601_weights() {
        let image = RgbImage::from_fn(3, 1, |x, _| match x {
            0 => Rgb([255, 0, 0]),
            1 => Rgb([0, 255, 0]),
            _ => Rgb([0, 0, 255]),
        });
        let gray = luma(&image);
        assert_eq!(gray.get_pixel(0, 0).0[0], 76);
        assert_eq!(gray.get_pixel(1, 0).0[0], 150);
        assert_eq!(gray.get_pixel(2, 0).0[0], 29);
    }

    #[test]
    fn contrast_spreads_values_around_mean() {
        let image = RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 { Rgb([100, 100, 100]) } else { Rgb([200, 200, 200]) }
        });
        let out = adjust_contrast(&image, 1.5);
        assert_eq!(out.get_pixel(0, 0).0, [75, 75, 75]);
        assert_eq!(out.get_pixel(1, 0).0, [225, 225, 225]);
    }

    #[test]
    fn brightness_saturates_at_white() {
        let image = RgbImage::from_pixel(1, 1, Rgb([100, 220, 0]));
        let out = adjust_brightness(&image, 1.2);
        assert_eq!(out.get_pixel(0, 0).0, [120, 255, 0]);
    }

    #[test]
    fn enhancement_order_is_contrast_then_brightness() {
        let image = RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 { Rgb([100, 100, 100]) } else { Rgb([200, 200, 200]) }
        });
        let out = enhance(&image);
        // contrast: 75 / 225, then brightness: 90 / 255
        assert_eq!(out.get_pixel(0, 0).0, [90, 90, 90]);
        assert_eq!(out.get_pixel(1, 0).0, [255, 255, 255]);
    }
}
