//! Smooth background map and global noise from sigma-clipped tile statistics.

/// Default tile edge in pixels
pub const DEFAULT_TILE_SIZE: usize = 64;

const CLIP_SIGMA: f64 = 3.0;
const CLIP_MAX_ITERATIONS: usize = 10;
/// Tiles with less than this fraction of usable pixels are filled from
/// their neighbours
const MIN_TILE_COVERAGE: f64 = 0.5;

#[derive(Debug, Clone, Copy, Default)]
struct TileStats {
    level: f64,
    sigma: f64,
    valid: bool,
}

/// Per-tile background level interpolated between tile centres, plus the
/// global noise
#[derive(Debug, Clone)]
pub struct BackgroundMap {
    width: usize,
    height: usize,
    tile_size: usize,
    tiles_x: usize,
    tiles_y: usize,
    level: Vec<f64>,
    /// Mean of the tile noise values
    pub global_rms: f64,
}

impl BackgroundMap {
    /// Estimate the background of a row-major image. Non-finite pixels are
    /// ignored.
    pub fn estimate(data: &[f64], width: usize, height: usize, tile_size: usize) -> Self {
        let tile_size = tile_size.max(1);
        let tiles_x = width.div_ceil(tile_size).max(1);
        let tiles_y = height.div_ceil(tile_size).max(1);

        let mut stats = vec![TileStats::default(); tiles_x * tiles_y];
        let mut values = Vec::with_capacity(tile_size * tile_size);
        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                let x_start = tx * tile_size;
                let y_start = ty * tile_size;
                let x_end = (x_start + tile_size).min(width);
                let y_end = (y_start + tile_size).min(height);

                values.clear();
                for y in y_start..y_end {
                    let row = &data[y * width + x_start..y * width + x_end];
                    values.extend(row.iter().copied().filter(|v| v.is_finite()));
                }

                let area = (x_end - x_start) * (y_end - y_start);
                if area > 0 && values.len() as f64 >= MIN_TILE_COVERAGE * area as f64 {
                    stats[ty * tiles_x + tx] = tile_statistics(&mut values);
                }
            }
        }

        fill_invalid_tiles(&mut stats, tiles_x, tiles_y);
        let stats = median_filter(&stats, tiles_x, tiles_y);

        let level: Vec<f64> = stats.iter().map(|s| s.level).collect();
        let global_rms = stats.iter().map(|s| s.sigma).sum::<f64>() / stats.len() as f64;

        Self {
            width,
            height,
            tile_size,
            tiles_x,
            tiles_y,
            level,
            global_rms,
        }
    }

    fn center(&self, tile: usize, extent: usize) -> f64 {
        let start = tile * self.tile_size;
        let end = (start + self.tile_size).min(extent);
        (start + end) as f64 * 0.5 - 0.5
    }

    /// Bilinear interpolation of a tile grid at pixel (x, y), clamped to the
    /// outermost tile centres
    fn interpolate(&self, grid: &[f64], x: f64, y: f64) -> f64 {
        let (tx0, tx1, fx) = self.bracket(x, self.tiles_x, self.width);
        let (ty0, ty1, fy) = self.bracket(y, self.tiles_y, self.height);

        let v00 = grid[ty0 * self.tiles_x + tx0];
        let v10 = grid[ty0 * self.tiles_x + tx1];
        let v01 = grid[ty1 * self.tiles_x + tx0];
        let v11 = grid[ty1 * self.tiles_x + tx1];

        let top = v00 + (v10 - v00) * fx;
        let bottom = v01 + (v11 - v01) * fx;
        top + (bottom - top) * fy
    }

    fn bracket(&self, pos: f64, tiles: usize, extent: usize) -> (usize, usize, f64) {
        if tiles == 1 || pos <= self.center(0, extent) {
            return (0, 0, 0.0);
        }
        let last = tiles - 1;
        if pos >= self.center(last, extent) {
            return (last, last, 0.0);
        }
        let mut lower = 0;
        while lower + 1 < last && self.center(lower + 1, extent) <= pos {
            lower += 1;
        }
        let c0 = self.center(lower, extent);
        let c1 = self.center(lower + 1, extent);
        (lower, lower + 1, (pos - c0) / (c1 - c0))
    }

    pub fn level_at(&self, x: usize, y: usize) -> f64 {
        self.interpolate(&self.level, x as f64, y as f64)
    }

    /// Image minus the interpolated background; non-finite pixels stay NaN
    pub fn subtract(&self, data: &[f64]) -> Vec<f64> {
        let mut out = Vec::with_capacity(data.len());
        for y in 0..self.height {
            for x in 0..self.width {
                let value = data[y * self.width + x];
                out.push(if value.is_finite() {
                    value - self.level_at(x, y)
                } else {
                    f64::NAN
                });
            }
        }
        out
    }
}

/// Sigma-clipped level and noise of one tile.
///
/// The level is the mode estimate `2.5 * median - 1.5 * mean` unless the
/// distribution is visibly skewed, in which case the median is used.
fn tile_statistics(values: &mut [f64]) -> TileStats {
    let mut lo = f64::NEG_INFINITY;
    let mut hi = f64::INFINITY;
    let mut mean = 0.0;
    let mut sigma = 0.0;
    let mut count = values.len();

    for _ in 0..CLIP_MAX_ITERATIONS {
        let (n, sum, sum_sq) = values
            .iter()
            .filter(|&&v| v >= lo && v <= hi)
            .fold((0usize, 0.0, 0.0), |(n, s, ss), &v| (n + 1, s + v, ss + v * v));
        if n == 0 {
            break;
        }
        mean = sum / n as f64;
        sigma = (sum_sq / n as f64 - mean * mean).max(0.0).sqrt();
        let converged = n == count;
        count = n;
        if converged || sigma == 0.0 {
            break;
        }
        lo = mean - CLIP_SIGMA * sigma;
        hi = mean + CLIP_SIGMA * sigma;
    }

    let mut kept: Vec<f64> = values
        .iter()
        .copied()
        .filter(|&v| v >= lo && v <= hi)
        .collect();
    let median = median_mut(&mut kept).unwrap_or(mean);

    let level = if sigma > 0.0 && ((mean - median) / sigma).abs() < 0.3 {
        2.5 * median - 1.5 * mean
    } else {
        median
    };

    TileStats {
        level,
        sigma,
        valid: true,
    }
}

/// Replace tiles without enough data by the mean of their valid neighbours,
/// widening the search until something is found
fn fill_invalid_tiles(stats: &mut [TileStats], tiles_x: usize, tiles_y: usize) {
    if stats.iter().all(|s| s.valid) {
        return;
    }
    if !stats.iter().any(|s| s.valid) {
        // Nothing usable at all: zero background, unit noise
        for s in stats.iter_mut() {
            *s = TileStats {
                level: 0.0,
                sigma: 1.0,
                valid: true,
            };
        }
        return;
    }

    let source = stats.to_vec();
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            if source[ty * tiles_x + tx].valid {
                continue;
            }
            for reach in 1..tiles_x.max(tiles_y) as i64 {
                let mut level = 0.0;
                let mut sigma = 0.0;
                let mut n = 0;
                for dy in -reach..=reach {
                    for dx in -reach..=reach {
                        let nx = tx as i64 + dx;
                        let ny = ty as i64 + dy;
                        if nx < 0 || ny < 0 || nx >= tiles_x as i64 || ny >= tiles_y as i64 {
                            continue;
                        }
                        let neighbour = source[ny as usize * tiles_x + nx as usize];
                        if neighbour.valid {
                            level += neighbour.level;
                            sigma += neighbour.sigma;
                            n += 1;
                        }
                    }
                }
                if n > 0 {
                    stats[ty * tiles_x + tx] = TileStats {
                        level: level / n as f64,
                        sigma: sigma / n as f64,
                        valid: true,
                    };
                    break;
                }
            }
        }
    }
}

/// 3x3 median filter over the tile grid
fn median_filter(stats: &[TileStats], tiles_x: usize, tiles_y: usize) -> Vec<TileStats> {
    if tiles_x < 3 && tiles_y < 3 {
        return stats.to_vec();
    }

    let mut out = Vec::with_capacity(stats.len());
    let mut levels = Vec::with_capacity(9);
    let mut sigmas = Vec::with_capacity(9);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            levels.clear();
            sigmas.clear();
            for ny in ty.saturating_sub(1)..=(ty + 1).min(tiles_y - 1) {
                for nx in tx.saturating_sub(1)..=(tx + 1).min(tiles_x - 1) {
                    let neighbour = stats[ny * tiles_x + nx];
                    levels.push(neighbour.level);
                    sigmas.push(neighbour.sigma);
                }
            }
            let centre = stats[ty * tiles_x + tx];
            out.push(TileStats {
                level: median_mut(&mut levels).unwrap_or(centre.level),
                sigma: median_mut(&mut sigmas).unwrap_or(centre.sigma),
                valid: true,
            });
        }
    }
    out
}

fn median_mut(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}
