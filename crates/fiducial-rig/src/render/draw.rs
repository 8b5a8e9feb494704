//! Raster primitives on RGB frames. Everything clips to the frame.

use fiducial_rig_core::{Rgb, RgbImage};
use image::imageops::{self, FilterType};

pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
pub const GREEN: Rgb<u8> = Rgb([0, 255, 0]);

#[inline]
fn put(img: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

/// Pixels whose distance to `center` satisfies `keep`, within `reach`.
fn fill_where(
    img: &mut RgbImage,
    center: (i32, i32),
    reach: i32,
    color: Rgb<u8>,
    keep: impl Fn(f32) -> bool,
) {
    let (cx, cy) = center;
    for y in (cy - reach)..=(cy + reach) {
        for x in (cx - reach)..=(cx + reach) {
            let d = (((x - cx) * (x - cx) + (y - cy) * (y - cy)) as f32).sqrt();
            if keep(d) {
                put(img, x, y, color);
            }
        }
    }
}

/// Circle outline `thickness` pixels wide, centered on `radius`.
pub fn draw_circle(
    img: &mut RgbImage,
    center: (i32, i32),
    radius: i32,
    thickness: i32,
    color: Rgb<u8>,
) {
    let half = thickness.max(1) as f32 / 2.0;
    let r = radius as f32;
    fill_where(img, center, radius + thickness, color, |d| (d - r).abs() <= half);
}

pub fn fill_circle(img: &mut RgbImage, center: (i32, i32), radius: i32, color: Rgb<u8>) {
    let r = radius as f32;
    fill_where(img, center, radius, color, |d| d <= r);
}

/// Bresenham line, widened by stamping a square brush.
pub fn draw_line(
    img: &mut RgbImage,
    from: (i32, i32),
    to: (i32, i32),
    thickness: i32,
    color: Rgb<u8>,
) {
    let lo = -(thickness.max(1) - 1) / 2;
    let hi = lo + thickness.max(1) - 1;
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        for oy in lo..=hi {
            for ox in lo..=hi {
                put(img, x + ox, y + oy, color);
            }
        }
        if (x, y) == to {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Closed polygon through `points`.
pub fn draw_polygon(img: &mut RgbImage, points: &[(i32, i32)], thickness: i32, color: Rgb<u8>) {
    for (i, &a) in points.iter().enumerate() {
        let b = points[(i + 1) % points.len()];
        draw_line(img, a, b, thickness, color);
    }
}

/// Copy `src` into `dst` with its top-left at `(x, y)`.
pub fn blit(dst: &mut RgbImage, src: &RgbImage, x: i32, y: i32) {
    for (sx, sy, px) in src.enumerate_pixels() {
        put(dst, x + sx as i32, y + sy as i32, *px);
    }
}

/// Resize by a uniform factor. Non-positive or unit factors return a copy.
pub fn scaled(src: &RgbImage, scale: f32) -> RgbImage {
    if scale <= 0.0 || scale == 1.0 {
        return src.clone();
    }
    let w = ((src.width() as f32 * scale) as u32).max(1);
    let h = ((src.height() as f32 * scale) as u32).max(1);
    imageops::resize(src, w, h, FilterType::Nearest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn black(w: u32, h: u32) -> RgbImage {
        RgbImage::new(w, h)
    }

    #[test]
    fn ring_leaves_center_untouched() {
        let mut img = black(60, 60);
        draw_circle(&mut img, (30, 30), 20, 5, RED);
        assert_eq!(*img.get_pixel(30, 30), Rgb([0, 0, 0]));
        assert_eq!(*img.get_pixel(50, 30), RED);
        assert_eq!(*img.get_pixel(30, 10), RED);
        assert_eq!(*img.get_pixel(30, 3), Rgb([0, 0, 0]));
    }

    #[test]
    fn shapes_clip_at_the_border() {
        let mut img = black(10, 10);
        fill_circle(&mut img, (0, 0), 4, RED);
        draw_line(&mut img, (-5, 5), (20, 5), 2, GREEN);
        assert_eq!(*img.get_pixel(0, 0), RED);
        assert_eq!(*img.get_pixel(9, 5), GREEN);
    }

    #[test]
    fn line_covers_both_ends() {
        let mut img = black(20, 20);
        draw_line(&mut img, (2, 3), (15, 11), 1, GREEN);
        assert_eq!(*img.get_pixel(2, 3), GREEN);
        assert_eq!(*img.get_pixel(15, 11), GREEN);
    }

    #[test]
    fn blit_and_scale() {
        let src = RgbImage::from_pixel(8, 6, WHITE);
        let half = scaled(&src, 0.5);
        assert_eq!(half.dimensions(), (4, 3));

        let mut dst = black(10, 10);
        blit(&mut dst, &half, 8, 8);
        assert_eq!(*dst.get_pixel(9, 9), WHITE);
        assert_eq!(*dst.get_pixel(7, 7), Rgb([0, 0, 0]));
    }
}
