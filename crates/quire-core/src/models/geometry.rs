//! Crop rectangles and rotation angles in source pixel space.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Geometry contract violations detected at the boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error(
        "Invalid crop region: {width}x{height} at ({x}, {y}) is not inside the {source_width}x{source_height} source"
    )]
    CropOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        source_width: u32,
        source_height: u32,
    },

    #[error("Invalid crop region: width and height must be greater than zero (got {width}x{height})")]
    EmptyCrop { width: u32, height: u32 },

    #[error("Invalid crop region: expected \"x,y,width,height\", got \"{0}\"")]
    Unparseable(String),

    #[error("Invalid rotation: {0} degrees is outside [-180, 180]")]
    RotationOutOfRange(f32),
}

/// Rectangle selected for extraction, in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Crop covering an entire `width x height` image.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Check the region is non-empty and fully contained in a `source_width x source_height` image.
    pub fn validate_within(&self, source_width: u32, source_height: u32) -> Result<(), GeometryError> {
        if self.width == 0 || self.height == 0 {
            return Err(GeometryError::EmptyCrop {
                width: self.width,
                height: self.height,
            });
        }

        let right = self.x as u64 + self.width as u64;
        let bottom = self.y as u64 + self.height as u64;
        if right > source_width as u64 || bottom > source_height as u64 {
            return Err(GeometryError::CropOutOfBounds {
                x: self.x,
                y: self.y,
                width: self.width,
                height: self.height,
                source_width,
                source_height,
            });
        }

        Ok(())
    }
}

impl FromStr for CropRegion {
    type Err = GeometryError;

    /// Parse `"x,y,width,height"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<u32> = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<_, _>>()
            .map_err(|_| GeometryError::Unparseable(s.to_string()))?;

        match parts.as_slice() {
            [x, y, width, height] => Ok(CropRegion::new(*x, *y, *width, *height)),
            _ => Err(GeometryError::Unparseable(s.to_string())),
        }
    }
}

impl fmt::Display for CropRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}

/// Signed rotation in degrees, restricted to [-180, 180].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct Rotation(f32);

impl Rotation {
    pub const NONE: Rotation = Rotation(0.0);

    pub fn new(degrees: f32) -> Result<Self, GeometryError> {
        if !degrees.is_finite() || !(-180.0..=180.0).contains(&degrees) {
            return Err(GeometryError::RotationOutOfRange(degrees));
        }
        Ok(Rotation(degrees))
    }

    pub fn degrees(self) -> f32 {
        self.0
    }

    pub fn radians(self) -> f32 {
        self.0.to_radians()
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0.0
    }
}

impl TryFrom<f32> for Rotation {
    type Error = GeometryError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Rotation::new(value)
    }
}

impl From<Rotation> for f32 {
    fn from(value: Rotation) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_inside_source() {
        let crop = CropRegion::new(10, 10, 100, 50);
        assert!(crop.validate_within(110, 60).is_ok());
        assert_eq!(crop.pixel_count(), 5000);
    }

    #[test]
    fn test_crop_touching_edges_is_valid() {
        assert!(CropRegion::full(640, 480).validate_within(640, 480).is_ok());
    }

    #[test]
    fn test_crop_outside_source() {
        let crop = CropRegion::new(600, 0, 100, 100);
        let err = crop.validate_within(640, 480).unwrap_err();
        assert!(matches!(err, GeometryError::CropOutOfBounds { .. }));
        assert!(err.to_string().contains("640x480"));
    }

    #[test]
    fn test_crop_overflow_does_not_wrap() {
        let crop = CropRegion::new(u32::MAX, 0, 2, 2);
        assert!(crop.validate_within(100, 100).is_err());
    }

    #[test]
    fn test_empty_crop_rejected() {
        let crop = CropRegion::new(0, 0, 0, 10);
        assert_eq!(
            crop.validate_within(100, 100),
            Err(GeometryError::EmptyCrop {
                width: 0,
                height: 10
            })
        );
    }

    #[test]
    fn test_crop_parse() {
        let crop: CropRegion = "1, 2,300,400".parse().unwrap();
        assert_eq!(crop, CropRegion::new(1, 2, 300, 400));
        assert_eq!(crop.to_string(), "1,2,300,400");
        assert!("1,2,3".parse::<CropRegion>().is_err());
        assert!("a,b,c,d".parse::<CropRegion>().is_err());
    }

    #[test]
    fn test_rotation_domain() {
        assert!(Rotation::new(-180.0).is_ok());
        assert!(Rotation::new(180.0).is_ok());
        assert!(Rotation::new(180.5).is_err());
        assert!(Rotation::new(f32::NAN).is_err());
        assert!(Rotation::NONE.is_zero());
        assert!(!Rotation::new(15.0).unwrap().is_zero());
    }
}
