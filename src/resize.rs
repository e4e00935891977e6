//! Height-driven downscaling applied before an image is uploaded.

use image::{imageops::FilterType, DynamicImage, GenericImageView};

/// Images up to this height are sent as-is.
pub const FULL_SIZE_MAX_HEIGHT: u32 = 1000;
/// Images up to this height are halved; anything taller is quartered.
pub const HALF_SIZE_MAX_HEIGHT: u32 = 2000;

/// Scale factor and target dimensions chosen for one image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizePlan {
    pub factor: f64,
    pub width: u32,
    pub height: u32,
}

impl ResizePlan {
    /// Picks the factor from the height alone and scales both sides by it.
    ///
    /// Scaled sides are truncated toward zero, then clamped to one pixel so that
    /// extremely narrow images still yield a valid buffer.
    pub fn for_dimensions(width: u32, height: u32) -> Self {
        let factor = scale_factor(height);
        if factor == 1.0 {
            return Self {
                factor,
                width,
                height,
            };
        }

        Self {
            factor,
            width: scale(width, factor),
            height: scale(height, factor),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.factor == 1.0
    }
}

pub const fn scale_factor(height: u32) -> f64 {
    if height <= FULL_SIZE_MAX_HEIGHT {
        1.0
    } else if height <= HALF_SIZE_MAX_HEIGHT {
        0.5
    } else {
        0.25
    }
}

fn scale(side: u32, factor: f64) -> u32 {
    ((f64::from(side) * factor) as u32).max(1)
}

/// Applies the plan for `image`. An identity plan hands the buffer back untouched.
pub fn autoresize(image: DynamicImage) -> DynamicImage {
    let (width, height) = image.dimensions();
    let plan = ResizePlan::for_dimensions(width, height);
    if plan.is_identity() {
        return image;
    }

    image.resize_exact(plan.width, plan.height, FilterType::Triangle)
}
