//! Thresholded connected-component extraction with second moments.

use std::collections::VecDeque;

/// Smallest object kept, in pixels
pub const MIN_AREA: usize = 5;

/// Default detection kernel (3x3 pyramid), applied before thresholding
const FILTER_KERNEL: [[f64; 3]; 3] = [[1.0, 2.0, 1.0], [2.0, 4.0, 2.0], [1.0, 2.0, 1.0]];

/// One extracted object with its shape parameters
#[derive(Debug, Clone, Copy)]
pub struct DetectedSource {
    /// Flux-weighted centroid, 0-based pixel coordinates
    pub x: f64,
    pub y: f64,
    /// Semi-major and semi-minor axis from the second moments
    pub a: f64,
    pub b: f64,
    /// Position angle of the major axis, radians counter-clockwise from +x
    pub theta: f64,
    /// Pixels above threshold
    pub npix: usize,
    /// Sum of background-subtracted pixel values
    pub flux: f64,
    /// Brightest pixel value
    pub peak: f64,
    /// Aperture measurements, NaN until measured
    pub kron_radius: f64,
    pub aperture_flux: f64,
    pub half_flux_radius: f64,
}

/// Find all groups of 8-connected pixels whose filtered value exceeds
/// `threshold` in a background-subtracted image.
///
/// Moments are measured on the unfiltered pixel values. Non-finite pixels are
/// never part of an object.
pub fn extract_sources(
    data: &[f64],
    width: usize,
    height: usize,
    threshold: f64,
) -> Vec<DetectedSource> {
    let filtered = convolve(data, width, height);
    let above: Vec<bool> = filtered
        .iter()
        .zip(data)
        .map(|(&f, &v)| v.is_finite() && f > threshold)
        .collect();

    let mut visited = vec![false; width * height];
    let mut sources = Vec::new();
    let mut queue = VecDeque::new();
    let mut pixels = Vec::new();

    for start in 0..width * height {
        if !above[start] || visited[start] {
            continue;
        }

        // Breadth-first flood fill of this component
        pixels.clear();
        visited[start] = true;
        queue.push_back(start);
        while let Some(idx) = queue.pop_front() {
            pixels.push(idx);
            let x = (idx % width) as i64;
            let y = (idx / width) as i64;
            for dy in -1..=1 {
                for dx in -1..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = x + dx;
                    let ny = y + dy;
                    if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                        continue;
                    }
                    let nidx = ny as usize * width + nx as usize;
                    if above[nidx] && !visited[nidx] {
                        visited[nidx] = true;
                        queue.push_back(nidx);
                    }
                }
            }
        }

        if pixels.len() < MIN_AREA {
            continue;
        }
        if let Some(source) = measure(&pixels, data, width) {
            sources.push(source);
        }
    }

    sources
}

/// Centroid and shape of one component. Returns None when the component
/// carries no positive flux.
fn measure(pixels: &[usize], data: &[f64], width: usize) -> Option<DetectedSource> {
    let mut sum = 0.0;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut peak = f64::NEG_INFINITY;
    for &idx in pixels {
        let v = data[idx];
        let x = (idx % width) as f64;
        let y = (idx / width) as f64;
        sum += v;
        sum_x += v * x;
        sum_y += v * y;
        peak = peak.max(v);
    }
    if sum <= 0.0 {
        return None;
    }

    let cx = sum_x / sum;
    let cy = sum_y / sum;

    let mut x2 = 0.0;
    let mut y2 = 0.0;
    let mut xy = 0.0;
    for &idx in pixels {
        let v = data[idx];
        let dx = (idx % width) as f64 - cx;
        let dy = (idx / width) as f64 - cy;
        x2 += v * dx * dx;
        y2 += v * dy * dy;
        xy += v * dx * dy;
    }
    x2 /= sum;
    y2 /= sum;
    xy /= sum;

    // Single-row or single-column objects: add the variance of a uniform
    // pixel so the axes never collapse
    if x2 * y2 - xy * xy < 1.0 / 144.0 {
        x2 += 1.0 / 12.0;
        y2 += 1.0 / 12.0;
    }

    let half_sum = (x2 + y2) / 2.0;
    let half_diff = (x2 - y2) / 2.0;
    let root = (half_diff * half_diff + xy * xy).sqrt();
    let a = (half_sum + root).max(0.0).sqrt();
    let b = (half_sum - root).max(0.0).sqrt();
    let theta = 0.5 * (2.0 * xy).atan2(x2 - y2);

    Some(DetectedSource {
        x: cx,
        y: cy,
        a,
        b,
        theta,
        npix: pixels.len(),
        flux: sum,
        peak,
        kron_radius: f64::NAN,
        aperture_flux: f64::NAN,
        half_flux_radius: f64::NAN,
    })
}

/// Normalized 3x3 convolution; edge pixels use the part of the kernel that
/// lies inside the image and non-finite pixels are skipped
fn convolve(data: &[f64], width: usize, height: usize) -> Vec<f64> {
    let mut out = vec![0.0; data.len()];
    for y in 0..height {
        for x in 0..width {
            let mut sum = 0.0;
            let mut weight = 0.0;
            for (ky, kernel_row) in FILTER_KERNEL.iter().enumerate() {
                let ny = y as i64 + ky as i64 - 1;
                if ny < 0 || ny >= height as i64 {
                    continue;
                }
                for (kx, &k) in kernel_row.iter().enumerate() {
                    let nx = x as i64 + kx as i64 - 1;
                    if nx < 0 || nx >= width as i64 {
                        continue;
                    }
                    let v = data[ny as usize * width + nx as usize];
                    if v.is_finite() {
                        sum += k * v;
                        weight += k;
                    }
                }
            }
            out[y * width + x] = if weight > 0.0 { sum / weight } else { f64::NAN };
        }
    }
    out
}
