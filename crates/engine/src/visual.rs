//! Pixel-level screenshot comparison

use image::{Pixel, Rgba, RgbaImage};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use sitegate_common::{DiffResult, DimensionMismatch, Error, ImageSize, Result};

/// Largest possible YIQ delta between two pixels
const MAX_YIQ_DELTA: f64 = 35215.0;

/// Comparison of two screenshot files, plus the diff image if one was written
#[derive(Debug, Clone)]
pub struct DiffOutcome {
    pub result: DiffResult,
    pub diff_image: Option<PathBuf>,
}

/// Compares baseline and candidate screenshots
#[derive(Debug, Clone, Copy)]
pub struct ImageDiffEngine {
    /// Per-pixel color distance threshold on a 0-1 scale
    pixel_threshold: f64,
    /// Diff images are written at or above this percentage
    pass_threshold: f64,
}

impl ImageDiffEngine {
    pub fn new(pixel_threshold: f64, pass_threshold: f64) -> Self {
        Self {
            pixel_threshold,
            pass_threshold,
        }
    }

    /// Compare two PNG files. A diff image is written to `diff_path` whenever
    /// the difference reaches the pass threshold; otherwise any diff image
    /// left there by an earlier run is removed.
    pub fn compare_files(&self, baseline: &Path, candidate: &Path, diff_path: &Path) -> Result<DiffOutcome> {
        let baseline_hash = hash_file(baseline)?;
        let candidate_hash = hash_file(candidate)?;

        // Quick hash comparison
        if baseline_hash == candidate_hash {
            let (width, height) = image::image_dimensions(baseline).map_err(|e| image_error(baseline, e))?;
            let size = ImageSize::new(width, height);
            if size.pixels() == 0 {
                return Err(Error::DiffCompute(format!("{} has no pixels", baseline.display())));
            }
            debug!("Screenshots match exactly (same hash)");
            remove_stale(diff_path)?;
            return Ok(DiffOutcome {
                result: DiffResult::identical(size.pixels()),
                diff_image: None,
            });
        }

        let baseline_img = image::open(baseline).map_err(|e| image_error(baseline, e))?.to_rgba8();
        let candidate_img = image::open(candidate).map_err(|e| image_error(candidate, e))?.to_rgba8();

        let (result, diff_img) = diff_images(&baseline_img, &candidate_img, self.pixel_threshold)?;

        let diff_image = if result.diff_percentage >= self.pass_threshold {
            if let Some(parent) = diff_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            diff_img.save(diff_path).map_err(|e| image_error(diff_path, e))?;
            Some(diff_path.to_path_buf())
        } else {
            remove_stale(diff_path)?;
            None
        };

        Ok(DiffOutcome { result, diff_image })
    }
}

/// Delete a diff image left by an earlier run, if any
pub(crate) fn remove_stale(diff_path: &Path) -> Result<()> {
    match std::fs::remove_file(diff_path) {
        Ok(()) => {
            debug!("Removed stale diff image {}", diff_path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Compare two images over their shared top-left region.
///
/// Returns the diff counts and a highlight image of the compared region:
/// differing pixels are red, the rest is the candidate dimmed.
pub fn diff_images(baseline: &RgbaImage, candidate: &RgbaImage, pixel_threshold: f64) -> Result<(DiffResult, RgbaImage)> {
    let baseline_size = ImageSize::new(baseline.width(), baseline.height());
    let candidate_size = ImageSize::new(candidate.width(), candidate.height());
    let compared = ImageSize::new(
        baseline_size.width.min(candidate_size.width),
        baseline_size.height.min(candidate_size.height),
    );

    if compared.pixels() == 0 {
        return Err(Error::DiffCompute(format!(
            "no overlapping region between {} and {}",
            baseline_size, candidate_size
        )));
    }

    let dimension_mismatch = if baseline_size != candidate_size {
        warn!(
            "Screenshot dimensions differ: baseline {} vs candidate {}",
            baseline_size, candidate_size
        );
        Some(DimensionMismatch {
            baseline: baseline_size,
            candidate: candidate_size,
            compared,
        })
    } else {
        None
    };

    let cutoff = MAX_YIQ_DELTA * pixel_threshold * pixel_threshold;
    let mut diff_img = RgbaImage::new(compared.width, compared.height);
    let mut diff_pixels = 0u64;

    for y in 0..compared.height {
        for x in 0..compared.width {
            let a = baseline.get_pixel(x, y);
            let b = candidate.get_pixel(x, y);

            if a != b && color_delta(a, b) > cutoff {
                diff_pixels += 1;
                // Mark diff pixels in red
                diff_img.put_pixel(x, y, Rgba([255, 0, 0, 255]));
            } else {
                let channels = b.channels();
                diff_img.put_pixel(x, y, Rgba([channels[0] / 2, channels[1] / 2, channels[2] / 2, 128]));
            }
        }
    }

    Ok((DiffResult::new(diff_pixels, compared.pixels(), dimension_mismatch), diff_img))
}

/// Perceptual distance between two pixels in YIQ space, alpha blended over white
fn color_delta(a: &Rgba<u8>, b: &Rgba<u8>) -> f64 {
    let (y1, i1, q1) = yiq(a);
    let (y2, i2, q2) = yiq(b);
    let (dy, di, dq) = (y1 - y2, i1 - i2, q1 - q2);
    0.5053 * dy * dy + 0.299 * di * di + 0.1957 * dq * dq
}

fn yiq(pixel: &Rgba<u8>) -> (f64, f64, f64) {
    let [r, g, b, a] = pixel.0;
    let alpha = a as f64 / 255.0;
    let blend = |c: u8| 255.0 + (c as f64 - 255.0) * alpha;
    let (r, g, b) = (blend(r), blend(g), blend(b));
    (
        r * 0.29889531 + g * 0.58662247 + b * 0.11448223,
        r * 0.59597799 - g * 0.27417610 - b * 0.32180189,
        r * 0.21147017 - g * 0.52261711 + b * 0.31114694,
    )
}

/// Hash a file using SHA256
fn hash_file(path: &Path) -> Result<String> {
    let data = std::fs::read(path)
        .map_err(|e| Error::DiffCompute(format!("cannot read {}: {}", path.display(), e)))?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

fn image_error(path: &Path, err: image::ImageError) -> Error {
    Error::DiffCompute(format!("{}: {}", path.display(), err))
}
