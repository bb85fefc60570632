use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut, draw_line_segment_mut,
};
use imageproc::rect::Rect;

use super::text_render::{draw_text, text_width, GLYPH_HEIGHT};

const TARGET_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const HISTORICAL_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const LEGEND_FG: Rgb<u8> = Rgb([255, 255, 255]);
const LEGEND_BG: Rgb<u8> = Rgb([0, 0, 0]);

/// Arrow-head arm length in canvas pixels
const ARROW_HEAD: f64 = 10.0;

/// Hollow circle at the as-observed position, filled circle at the target.
/// Positions are canvas pixels.
pub fn draw_markers(img: &mut RgbImage, historical: [f64; 2], target: [f64; 2], radius: f64) {
    let r = radius.round() as i32;
    draw_filled_circle_mut(img, to_point(target), r, TARGET_COLOR);
    draw_hollow_circle_mut(img, to_point(historical), r, HISTORICAL_COLOR);
}

/// Arrow from the historical marker edge to the target marker edge.
///
/// Nothing is drawn when the markers overlap. Returns whether the arrow was
/// drawn.
pub fn draw_motion_arrow(
    img: &mut RgbImage,
    historical: [f64; 2],
    target: [f64; 2],
    radius: f64,
) -> bool {
    let dx = target[0] - historical[0];
    let dy = target[1] - historical[1];
    let length = dx.hypot(dy);
    if length <= 2.0 * radius {
        return false;
    }
    let (ux, uy) = (dx / length, dy / length);

    let start = [historical[0] + radius * ux, historical[1] + radius * uy];
    let end = [target[0] - radius * ux, target[1] - radius * uy];
    draw_line_segment_mut(img, to_f32(start), to_f32(end), HISTORICAL_COLOR);

    // Two arms at 45 degrees either side of the shaft
    let arm = ARROW_HEAD * std::f64::consts::FRAC_1_SQRT_2;
    let left = [end[0] - arm * (ux - uy), end[1] - arm * (uy + ux)];
    let right = [end[0] - arm * (ux + uy), end[1] - arm * (uy - ux)];
    draw_line_segment_mut(img, to_f32(left), to_f32(end), HISTORICAL_COLOR);
    draw_line_segment_mut(img, to_f32(right), to_f32(end), HISTORICAL_COLOR);
    true
}

/// One arcminute bar in the bottom-right corner with a `1'` label.
///
/// `pixels_per_arcmin` is in canvas pixels. Bars that would not fit on the
/// canvas are skipped; returns whether the bar was drawn.
pub fn draw_scale_bar(img: &mut RgbImage, pixels_per_arcmin: f64) -> bool {
    let (width, height) = img.dimensions();
    let (w, h) = (width as f64, height as f64);
    if !pixels_per_arcmin.is_finite()
        || pixels_per_arcmin < 1.0
        || pixels_per_arcmin > w - 12.0
        || height < 24
    {
        return false;
    }

    let left = w - 10.0 - pixels_per_arcmin;
    let backdrop = Rect::at(left.floor() as i32, height as i32 - 20)
        .of_size((w - 2.0 - left.floor()) as u32, 18);
    draw_filled_rect_mut(img, backdrop, LEGEND_BG);

    let line_start = w - 5.0 - pixels_per_arcmin;
    let line_end = w - 5.0;
    draw_line_segment_mut(
        img,
        (line_start as f32, (h - 5.0) as f32),
        (line_end as f32, (h - 5.0) as f32),
        LEGEND_FG,
    );

    let label = "1'";
    let label_x = ((line_start + line_end) / 2.0) as i32 - text_width(label, 1) as i32 / 2;
    draw_text(img, label_x, height as i32 - 17, label, LEGEND_FG, 1);
    true
}

/// Text lines on a black backdrop in the top-left corner
pub fn draw_legend(img: &mut RgbImage, lines: &[String]) {
    if lines.is_empty() {
        return;
    }
    let line_height = GLYPH_HEIGHT + 8;
    let text_w = lines.iter().map(|l| text_width(l, 1)).max().unwrap_or(0);
    let backdrop = Rect::at(2, 2).of_size(text_w + 8, lines.len() as u32 * line_height + 3);
    draw_filled_rect_mut(img, backdrop, LEGEND_BG);

    for (i, line) in lines.iter().enumerate() {
        draw_text(img, 6, 7 + (i as u32 * line_height) as i32, line, LEGEND_FG, 1);
    }
}

fn to_point(position: [f64; 2]) -> (i32, i32) {
    (position[0].round() as i32, position[1].round() as i32)
}

fn to_f32(position: [f64; 2]) -> (f32, f32) {
    (position[0] as f32, position[1] as f32)
}
