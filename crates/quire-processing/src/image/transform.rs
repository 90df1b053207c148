use image::RgbaImage;
use quire_core::{CropRegion, GeometryError, Rotation};

use crate::canvas::{Canvas, CanvasError, RasterCanvas, Rect};

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error(transparent)]
    InvalidCrop(#[from] GeometryError),

    #[error(transparent)]
    SurfaceAllocation(#[from] CanvasError),
}

/// Crops and rotates a source image into a buffer exactly the size of the crop.
pub struct TransformEngine;

impl TransformEngine {
    /// Allocate a `crop.width x crop.height` canvas and draw the selection into it.
    ///
    /// The canvas transform is left as set here; the watermark stage resets it.
    pub fn transform(
        source: &RgbaImage,
        crop: &CropRegion,
        rotation: Rotation,
    ) -> Result<RasterCanvas, TransformError> {
        crop.validate_within(source.width(), source.height())?;

        let mut canvas = RasterCanvas::new(crop.width, crop.height)?;
        Self::draw(&mut canvas, source, crop, rotation);

        tracing::debug!(
            crop = %crop,
            rotation_degrees = rotation.degrees(),
            "Crop region rendered"
        );

        Ok(canvas)
    }

    /// Draw the crop onto a canvas sized to the crop.
    ///
    /// Without rotation this is a direct region copy. With rotation the origin
    /// moves to the destination center, the context rotates, and the crop is
    /// drawn centered on the origin, so the output extent never changes.
    pub fn draw<C: Canvas + ?Sized>(
        canvas: &mut C,
        source: &RgbaImage,
        crop: &CropRegion,
        rotation: Rotation,
    ) {
        let w = f64::from(crop.width);
        let h = f64::from(crop.height);
        let src = Rect::new(f64::from(crop.x), f64::from(crop.y), w, h);

        if rotation.is_zero() {
            canvas.draw_image(source, src, Rect::new(0.0, 0.0, w, h));
            return;
        }

        canvas.translate(w / 2.0, h / 2.0);
        canvas.rotate(f64::from(rotation.degrees()).to_radians());
        canvas.draw_image(source, src, Rect::new(-w / 2.0, -h / 2.0, w, h));
    }
}
