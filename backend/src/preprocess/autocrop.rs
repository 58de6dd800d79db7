use image::{GrayImage, Luma, RgbImage, imageops};
use imageproc::contours::{BorderType, Contour, find_contours};

use super::enhance::luma;

pub const BLUR_KERNEL_SIZE: usize = 5;
pub const BINARY_THRESHOLD: u8 = 60;
pub const CROP_PADDING: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Normalised 1-D Gaussian taps. Sigma follows the usual derivation from kernel size.
pub fn gaussian_kernel(size: usize) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let center = (size / 2) as f32;
    let weights: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Separable Gaussian blur with reflect-101 borders.
pub fn gaussian_blur(image: &GrayImage, size: usize) -> GrayImage {
    let kernel = gaussian_kernel(size);
    let radius = (size / 2) as i64;
    let (width, height) = image.dimensions();

    let horizontal: Vec<f32> = (0..height)
        .flat_map(|y| {
            let kernel = &kernel;
            (0..width).map(move |x| {
                kernel
                    .iter()
                    .enumerate()
                    .map(|(k, w)| {
                        let sx = reflect_101(x as i64 + k as i64 - radius, width);
                        w * image.get_pixel(sx, y).0[0] as f32
                    })
                    .sum::<f32>()
            })
        })
        .collect();

    GrayImage::from_fn(width, height, |x, y| {
        let value: f32 = kernel
            .iter()
            .enumerate()
            .map(|(k, w)| {
                let sy = reflect_101(y as i64 + k as i64 - radius, height);
                w * horizontal[(sy * width + x) as usize]
            })
            .sum();
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

fn reflect_101(index: i64, len: u32) -> u32 {
    let len = len as i64;
    if len == 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let mut i = index.rem_euclid(period);
    if i >= len {
        i = period - i;
    }
    i as u32
}

/// Pixels strictly above `threshold` become foreground.
pub fn binarize(image: &GrayImage, threshold: u8) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        if image.get_pixel(x, y).0[0] > threshold {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Outer borders that are not nested inside any other region, in raster scan order.
///
/// The image is traced inside a one-pixel background frame so that regions
/// touching the edge still come back as outer borders.
pub fn external_contours(binary: &GrayImage) -> Vec<Contour<i32>> {
    let mut framed = GrayImage::new(binary.width() + 2, binary.height() + 2);
    imageops::replace(&mut framed, binary, 1, 1);

    find_contours::<i32>(&framed)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .map(|mut c| {
            for p in &mut c.points {
                p.x -= 1;
                p.y -= 1;
            }
            c
        })
        .collect()
}

/// Polygon area of the traced border (shoelace formula).
pub fn contour_area(contour: &Contour<i32>) -> f64 {
    let points = &contour.points;
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0i64;
    for i in 0..points.len() {
        let j = (i + 1) % points.len();
        twice_area += points[i].x as i64 * points[j].y as i64;
        twice_area -= points[j].x as i64 * points[i].y as i64;
    }
    twice_area.abs() as f64 / 2.0
}

/// Largest contour by area. On equal areas the first one found in scan order wins.
pub fn largest_contour(contours: &[Contour<i32>]) -> Option<&Contour<i32>> {
    let mut best: Option<(&Contour<i32>, f64)> = None;
    for contour in contours {
        let area = contour_area(contour);
        match best {
            Some((_, best_area)) if area <= best_area => {}
            _ => best = Some((contour, area)),
        }
    }
    best.map(|(contour, _)| contour)
}

/// Inclusive pixel bounds of a contour as a rectangle.
pub fn bounding_rect(contour: &Contour<i32>) -> Option<CropRect> {
    let first = contour.points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &contour.points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(CropRect {
        x: min_x.max(0) as u32,
        y: min_y.max(0) as u32,
        width: (max_x - min_x + 1).max(0) as u32,
        height: (max_y - min_y + 1).max(0) as u32,
    })
}

/// Grows `rect` by `padding` on every side, then clamps each side to the image.
pub fn pad_and_clamp(rect: CropRect, padding: u32, width: u32, height: u32) -> CropRect {
    let left = rect.x.saturating_sub(padding).min(width);
    let top = rect.y.saturating_sub(padding).min(height);
    let right = rect.right().saturating_add(padding).min(width);
    let bottom = rect.bottom().saturating_add(padding).min(height);
    CropRect {
        x: left,
        y: top,
        width: right.saturating_sub(left),
        height: bottom.saturating_sub(top),
    }
}

/// Locates the dominant foreground region (the leaf), padded and clamped to the image.
pub fn find_leaf(image: &RgbImage) -> Option<CropRect> {
    let blurred = gaussian_blur(&luma(image), BLUR_KERNEL_SIZE);
    let binary = binarize(&blurred, BINARY_THRESHOLD);
    let contours = external_contours(&binary);
    let leaf = largest_contour(&contours)?;
    let rect = bounding_rect(leaf)?;
    Some(pad_and_clamp(rect, CROP_PADDING, image.width(), image.height()))
}

/// Crops to the leaf region. Returns the image unchanged when no region is found.
pub fn auto_crop(image: &RgbImage) -> RgbImage {
    match find_leaf(image) {
        Some(rect) if !rect.is_empty() => {
            log::debug!(
                "Auto-crop {}x{} -> {}x{} at ({}, {})",
                image.width(),
                image.height(),
                rect.width,
                rect.height,
                rect.x,
                rect.y
            );
            imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image()
        }
        _ => {
            log::debug!("Auto-crop found no foreground contour; keeping full frame");
            image.clone()
        }
    }
}
