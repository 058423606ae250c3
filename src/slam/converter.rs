//! Mapping from color image pixels onto the point image of a keyframe.
//!
//! The keyframes themselves are produced by an external conversion step,
//! the converter only describes how the color and point images of that sensor relate.

use std::sync::Arc;

use nalgebra::{Vector2, Vector3};

use crate::error::{Error, Result};
use crate::slam::frame::KeyFrame;

pub trait Converter: Send + Sync {
    fn name(&self) -> &'static str;

    /// 3D point observed at a color image pixel, `None` when the depth is missing.
    fn point_at(&self, keyframe: &KeyFrame, pixel: Vector2<f32>) -> Option<Vector3<f64>>;
}

/// Xtion style sensors deliver depth registered to the color camera at the same resolution.
#[derive(Debug, Default, Clone, Copy)]
pub struct XtionConverter;

impl Converter for XtionConverter {
    fn name(&self) -> &'static str {
        "Xtion"
    }

    fn point_at(&self, keyframe: &KeyFrame, pixel: Vector2<f32>) -> Option<Vector3<f64>> {
        if pixel.x < 0.0 || pixel.y < 0.0 {
            return None;
        }
        keyframe.point_at(pixel.x.round() as u32, pixel.y.round() as u32)
    }
}

/// AIST rigs store a point image whose grid differs from the color image,
/// color pixels are scaled onto the point grid before the lookup.
#[derive(Debug, Default, Clone, Copy)]
pub struct AistConverter;

impl Converter for AistConverter {
    fn name(&self) -> &'static str {
        "AIST"
    }

    fn point_at(&self, keyframe: &KeyFrame, pixel: Vector2<f32>) -> Option<Vector3<f64>> {
        let (color_width, color_height) = keyframe.color_image.dimensions();
        let (point_width, point_height) = keyframe.point_image.dimensions();
        if color_width == 0 || color_height == 0 || pixel.x < 0.0 || pixel.y < 0.0 {
            return None;
        }

        let x = pixel.x * point_width as f32 / color_width as f32;
        let y = pixel.y * point_height as f32 / color_height as f32;
        keyframe.point_at(x.floor() as u32, y.floor() as u32)
    }
}

/// Converter for a configuration index, `0` for Xtion and `1` for AIST.
pub fn converter_from_index(index: usize) -> Result<Arc<dyn Converter>> {
    match index {
        0 => Ok(Arc::new(XtionConverter)),
        1 => Ok(Arc::new(AistConverter)),
        other => Err(Error::Configuration(format!(
            "unrecognized converter index {other}"
        ))),
    }
}
