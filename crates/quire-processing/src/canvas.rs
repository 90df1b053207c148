//! Drawing capability
//!
//! A pixel buffer plus a 2D drawing context with an affine transform stack.
//! The transform and watermark stages only talk to the [`Canvas`] trait, so
//! their call sequences can be recorded and asserted in tests while
//! [`RasterCanvas`] does the actual pixel work.

use image::{Rgba, RgbaImage};

/// Largest width or height a surface may have.
pub const MAX_SURFACE_DIMENSION: u32 = 16_384;

/// Largest pixel area a surface may have.
pub const MAX_SURFACE_PIXELS: u64 = 268_435_456;

#[derive(Debug, thiserror::Error)]
pub enum CanvasError {
    #[error("Surface must have non-zero dimensions, got {width}x{height}")]
    EmptySurface { width: u32, height: u32 },

    #[error("Surface of {width}x{height} exceeds 16384 px per side or 268435456 px total")]
    SurfaceTooLarge { width: u32, height: u32 },

    #[error("Allocating {bytes} bytes for a {width}x{height} surface failed")]
    AllocationFailed { width: u32, height: u32, bytes: usize },
}

/// Owned RGBA8 pixel storage for a canvas.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    image: RgbaImage,
}

impl PixelBuffer {
    /// Allocate a fully transparent buffer.
    ///
    /// The reservation is fallible: oversized requests are reported instead of
    /// aborting the process.
    pub fn new(width: u32, height: u32) -> Result<Self, CanvasError> {
        if width == 0 || height == 0 {
            return Err(CanvasError::EmptySurface { width, height });
        }

        let area = u64::from(width) * u64::from(height);
        if width > MAX_SURFACE_DIMENSION || height > MAX_SURFACE_DIMENSION || area > MAX_SURFACE_PIXELS
        {
            return Err(CanvasError::SurfaceTooLarge { width, height });
        }

        let bytes = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(4))
            .ok_or(CanvasError::SurfaceTooLarge { width, height })?;

        let mut data: Vec<u8> = Vec::new();
        data.try_reserve_exact(bytes)
            .map_err(|_| CanvasError::AllocationFailed {
                width,
                height,
                bytes,
            })?;
        data.resize(bytes, 0);

        let image = RgbaImage::from_raw(width, height, data).ok_or(CanvasError::AllocationFailed {
            width,
            height,
            bytes,
        })?;

        Ok(Self { image })
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }
}

/// Axis-aligned rectangle in user space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a whole image.
    pub fn of_image(image: &RgbaImage) -> Self {
        Self::new(0.0, 0.0, f64::from(image.width()), f64::from(image.height()))
    }
}

/// 2x3 affine matrix using the 2D-canvas convention:
/// `x' = a*x + c*y + e`, `y' = b*x + d*y + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn translation(tx: f64, ty: f64) -> Self {
        Affine {
            e: tx,
            f: ty,
            ..Self::IDENTITY
        }
    }

    /// Rotation by `radians`; positive angles turn clockwise on a y-down surface.
    pub fn rotation(radians: f64) -> Self {
        let (sin, cos) = radians.sin_cos();
        Affine {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            e: 0.0,
            f: 0.0,
        }
    }

    /// `self * other`: `other` is applied to points first.
    pub fn then(&self, other: &Affine) -> Affine {
        Affine {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            e: self.a * other.e + self.c * other.f + self.e,
            f: self.b * other.e + self.d * other.f + self.f,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    pub fn inverse(&self) -> Option<Affine> {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() < f64::EPSILON {
            return None;
        }
        let inv = 1.0 / det;
        Some(Affine {
            a: self.d * inv,
            b: -self.b * inv,
            c: -self.c * inv,
            d: self.a * inv,
            e: (self.c * self.f - self.d * self.e) * inv,
            f: (self.b * self.e - self.a * self.f) * inv,
        })
    }

    /// Pure integer translation, the case where drawing is a region copy.
    fn integer_offset(&self) -> Option<(i64, i64)> {
        let axis_aligned = self.a == 1.0 && self.b == 0.0 && self.c == 0.0 && self.d == 1.0;
        if axis_aligned && self.e.fract() == 0.0 && self.f.fract() == 0.0 {
            Some((self.e as i64, self.f as i64))
        } else {
            None
        }
    }
}

/// 2D drawing context over a pixel buffer.
pub trait Canvas {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Push the current transform.
    fn save(&mut self);
    /// Pop the last saved transform. Without a matching `save` this is a no-op.
    fn restore(&mut self);
    fn reset_transform(&mut self);
    fn translate(&mut self, tx: f64, ty: f64);
    fn rotate(&mut self, radians: f64);
    fn current_transform(&self) -> Affine;

    /// Draw the `src` region of `image` into `dst` (user space), through the
    /// current transform, compositing source-over.
    fn draw_image(&mut self, image: &RgbaImage, src: Rect, dst: Rect);
}

/// Software canvas backed by a [`PixelBuffer`].
pub struct RasterCanvas {
    buffer: PixelBuffer,
    transform: Affine,
    stack: Vec<Affine>,
}

impl RasterCanvas {
    /// Allocate a transparent canvas of the given size.
    pub fn new(width: u32, height: u32) -> Result<Self, CanvasError> {
        Ok(Self::from_buffer(PixelBuffer::new(width, height)?))
    }

    pub fn from_buffer(buffer: PixelBuffer) -> Self {
        Self {
            buffer,
            transform: Affine::IDENTITY,
            stack: Vec::new(),
        }
    }

    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    pub fn into_buffer(self) -> PixelBuffer {
        self.buffer
    }

    /// Exact pixel copy, used when the mapping is an integer translation with no scaling.
    fn copy_region(&mut self, image: &RgbaImage, src: Rect, dst: Rect, offset: (i64, i64)) {
        let target = &mut self.buffer.image;
        let (tw, th) = (i64::from(target.width()), i64::from(target.height()));
        let (iw, ih) = (i64::from(image.width()), i64::from(image.height()));

        for row in 0..src.height as i64 {
            for col in 0..src.width as i64 {
                let sx = src.x as i64 + col;
                let sy = src.y as i64 + row;
                let dx = dst.x as i64 + col + offset.0;
                let dy = dst.y as i64 + row + offset.1;
                if sx < 0 || sy < 0 || sx >= iw || sy >= ih {
                    continue;
                }
                if dx < 0 || dy < 0 || dx >= tw || dy >= th {
                    continue;
                }
                let top = *image.get_pixel(sx as u32, sy as u32);
                let bottom = target.get_pixel_mut(dx as u32, dy as u32);
                *bottom = blend_pixels(*bottom, top);
            }
        }
    }
}

impl Canvas for RasterCanvas {
    fn width(&self) -> u32 {
        self.buffer.width()
    }

    fn height(&self) -> u32 {
        self.buffer.height()
    }

    fn save(&mut self) {
        self.stack.push(self.transform);
    }

    fn restore(&mut self) {
        if let Some(previous) = self.stack.pop() {
            self.transform = previous;
        }
    }

    fn reset_transform(&mut self) {
        self.transform = Affine::IDENTITY;
    }

    fn translate(&mut self, tx: f64, ty: f64) {
        self.transform = self.transform.then(&Affine::translation(tx, ty));
    }

    fn rotate(&mut self, radians: f64) {
        self.transform = self.transform.then(&Affine::rotation(radians));
    }

    fn current_transform(&self) -> Affine {
        self.transform
    }

    fn draw_image(&mut self, image: &RgbaImage, src: Rect, dst: Rect) {
        if src.width <= 0.0 || src.height <= 0.0 || dst.width <= 0.0 || dst.height <= 0.0 {
            return;
        }

        let integral = |r: &Rect| {
            r.x.fract() == 0.0 && r.y.fract() == 0.0 && r.width.fract() == 0.0 && r.height.fract() == 0.0
        };
        if src.width == dst.width && src.height == dst.height && integral(&src) && integral(&dst) {
            if let Some(offset) = self.transform.integer_offset() {
                self.copy_region(image, src, dst, offset);
                return;
            }
        }

        let Some(inverse) = self.transform.inverse() else {
            return;
        };

        // Device-space bounding box of the destination quad
        let corners = [
            self.transform.apply(dst.x, dst.y),
            self.transform.apply(dst.x + dst.width, dst.y),
            self.transform.apply(dst.x, dst.y + dst.height),
            self.transform.apply(dst.x + dst.width, dst.y + dst.height),
        ];
        let min_x = corners.iter().map(|(x, _)| *x).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|(x, _)| *x).fold(f64::NEG_INFINITY, f64::max);
        let min_y = corners.iter().map(|(_, y)| *y).fold(f64::INFINITY, f64::min);
        let max_y = corners.iter().map(|(_, y)| *y).fold(f64::NEG_INFINITY, f64::max);

        let target_w = f64::from(self.buffer.width());
        let target_h = f64::from(self.buffer.height());
        if max_x <= 0.0 || max_y <= 0.0 || min_x >= target_w || min_y >= target_h {
            return;
        }

        let x_start = min_x.floor().max(0.0) as u32;
        let y_start = min_y.floor().max(0.0) as u32;
        let x_end = max_x.ceil().min(target_w) as u32;
        let y_end = max_y.ceil().min(target_h) as u32;

        let scale_x = src.width / dst.width;
        let scale_y = src.height / dst.height;

        for py in y_start..y_end {
            for px in x_start..x_end {
                let (ux, uy) = inverse.apply(f64::from(px) + 0.5, f64::from(py) + 0.5);
                if ux < dst.x || uy < dst.y || ux >= dst.x + dst.width || uy >= dst.y + dst.height {
                    continue;
                }
                let sx = src.x + (ux - dst.x) * scale_x;
                let sy = src.y + (uy - dst.y) * scale_y;
                let Some(top) = sample_bilinear(image, &src, sx, sy) else {
                    continue;
                };
                let bottom = self.buffer.image.get_pixel_mut(px, py);
                *bottom = blend_pixels(*bottom, top);
            }
        }
    }
}

/// Bilinear sample at a continuous source position, clamped to the `src` region.
fn sample_bilinear(image: &RgbaImage, src: &Rect, x: f64, y: f64) -> Option<Rgba<u8>> {
    let min_x = src.x.max(0.0);
    let min_y = src.y.max(0.0);
    let max_x = (src.x + src.width).min(f64::from(image.width())) - 1.0;
    let max_y = (src.y + src.height).min(f64::from(image.height())) - 1.0;
    if max_x < min_x || max_y < min_y {
        return None;
    }

    // Pixel centers sit at integer + 0.5
    let fx = (x - 0.5).clamp(min_x, max_x);
    let fy = (y - 0.5).clamp(min_y, max_y);

    let x0 = fx.floor();
    let y0 = fy.floor();
    let x1 = (x0 + 1.0).min(max_x);
    let y1 = (y0 + 1.0).min(max_y);
    let tx = fx - x0;
    let ty = fy - y0;

    let p00 = image.get_pixel(x0 as u32, y0 as u32);
    let p10 = image.get_pixel(x1 as u32, y0 as u32);
    let p01 = image.get_pixel(x0 as u32, y1 as u32);
    let p11 = image.get_pixel(x1 as u32, y1 as u32);

    let interpolate = |c: usize| -> u8 {
        let v = f64::from(p00[c]) * (1.0 - tx) * (1.0 - ty)
            + f64::from(p10[c]) * tx * (1.0 - ty)
            + f64::from(p01[c]) * (1.0 - tx) * ty
            + f64::from(p11[c]) * tx * ty;
        v.round().clamp(0.0, 255.0) as u8
    };

    Some(Rgba([
        interpolate(0),
        interpolate(1),
        interpolate(2),
        interpolate(3),
    ]))
}

/// Source-over compositing of `top` onto `bottom`.
pub(crate) fn blend_pixels(bottom: Rgba<u8>, top: Rgba<u8>) -> Rgba<u8> {
    if top[3] == 255 {
        return top;
    }
    if top[3] == 0 {
        return bottom;
    }

    let top_alpha = f32::from(top[3]) / 255.0;
    let bottom_alpha = f32::from(bottom[3]) / 255.0;
    let out_alpha = top_alpha + bottom_alpha * (1.0 - top_alpha);

    if out_alpha < 0.001 {
        return Rgba([0, 0, 0, 0]);
    }

    let blend = |t: u8, b: u8| -> u8 {
        let t = f32::from(t) / 255.0;
        let b = f32::from(b) / 255.0;
        let result = (t * top_alpha + b * bottom_alpha * (1.0 - top_alpha)) / out_alpha;
        (result * 255.0).round() as u8
    };

    Rgba([
        blend(top[0], bottom[0]),
        blend(top[1], bottom[1]),
        blend(top[2], bottom[2]),
        (out_alpha * 255.0).round() as u8,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 10) as u8, (y * 10) as u8, 128, 255])
        })
    }

    #[test]
    fn test_pixel_buffer_rejects_oversized_surfaces() {
        assert!(matches!(
            PixelBuffer::new(MAX_SURFACE_DIMENSION + 1, 1),
            Err(CanvasError::SurfaceTooLarge { .. })
        ));
        assert!(matches!(
            PixelBuffer::new(16_384, 16_385),
            Err(CanvasError::SurfaceTooLarge { .. })
        ));
        assert!(matches!(
            PixelBuffer::new(0, 10),
            Err(CanvasError::EmptySurface { .. })
        ));
    }

    #[test]
    fn test_pixel_buffer_starts_transparent() {
        let buffer = PixelBuffer::new(3, 2).unwrap();
        assert_eq!(buffer.dimensions(), (3, 2));
        assert!(buffer.as_image().pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn test_affine_inverse_round_trips_points() {
        let m = Affine::translation(40.0, 30.0).then(&Affine::rotation(0.7));
        let inv = m.inverse().unwrap();
        let (x, y) = m.apply(12.0, -5.0);
        let (bx, by) = inv.apply(x, y);
        assert!((bx - 12.0).abs() < 1e-9);
        assert!((by + 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_save_restore_stack() {
        let mut canvas = RasterCanvas::new(4, 4).unwrap();
        canvas.translate(2.0, 2.0);
        canvas.save();
        canvas.rotate(1.0);
        canvas.restore();
        assert_eq!(canvas.current_transform(), Affine::translation(2.0, 2.0));

        // Unbalanced restore leaves the transform alone
        canvas.restore();
        assert_eq!(canvas.current_transform(), Affine::translation(2.0, 2.0));
    }

    #[test]
    fn test_draw_image_identity_copies_exact_pixels() {
        let source = gradient(10, 10);
        let mut canvas = RasterCanvas::new(4, 3).unwrap();
        canvas.draw_image(&source, Rect::new(2.0, 5.0, 4.0, 3.0), Rect::new(0.0, 0.0, 4.0, 3.0));

        let out = canvas.buffer().as_image();
        for y in 0..3 {
            for x in 0..4 {
                assert_eq!(out.get_pixel(x, y), source.get_pixel(x + 2, y + 5));
            }
        }
    }

    #[test]
    fn test_draw_image_quarter_turn_about_center() {
        let mut source = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255]));
        source.put_pixel(0, 0, Rgba([255, 0, 0, 255]));

        let mut canvas = RasterCanvas::new(4, 4).unwrap();
        canvas.translate(2.0, 2.0);
        canvas.rotate(FRAC_PI_2);
        canvas.draw_image(&source, Rect::of_image(&source), Rect::new(-2.0, -2.0, 4.0, 4.0));

        // A clockwise quarter turn moves the top-left corner to the top-right
        let out = canvas.buffer().as_image();
        assert_eq!(out.get_pixel(3, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(out.get_pixel(0, 3), &Rgba([0, 0, 255, 255]));
        assert!(out.pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn test_blend_pixels_source_over() {
        let bottom = Rgba([0, 0, 0, 255]);
        let top = Rgba([255, 255, 255, 0]);
        assert_eq!(blend_pixels(bottom, top), bottom);

        let half = blend_pixels(bottom, Rgba([255, 255, 255, 128]));
        assert_eq!(half[3], 255);
        assert!(half[0] > 120 && half[0] < 135);
    }
}
