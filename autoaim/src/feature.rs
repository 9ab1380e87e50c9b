use nalgebra::{Point2, Vector2};

use crate::{Error, LightBlobParams, Result, geometry::centroid};

/// A raw rotated-rectangle primitive handed over by the contour extraction.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Blob {
    pub center: Point2<f32>,
    pub width: f32,
    pub height: f32,
    /// Rotation of the width axis from +x towards +y, in degrees.
    pub angle: f32,
    /// Area of the contour the rectangle was fitted to.
    pub area: f32,
}

impl Blob {
    pub fn new(center: Point2<f32>, width: f32, height: f32, angle: f32) -> Self {
        Self {
            center,
            width,
            height,
            angle,
            area: width * height,
        }
    }

    /// The long side, the short side and the unit long axis pointing down the image.
    fn long_axis(&self) -> Option<(f32, f32, Vector2<f32>)> {
        let finite = self.width.is_finite()
            && self.height.is_finite()
            && self.angle.is_finite()
            && self.center.coords.iter().all(|value| value.is_finite());
        if !finite {
            return None;
        }
        let radians = self.angle.to_radians();
        let width_axis = Vector2::new(radians.cos(), radians.sin());
        let height_axis = Vector2::new(-radians.sin(), radians.cos());
        let (long, short, axis) = if self.height >= self.width {
            (self.height, self.width, height_axis)
        } else {
            (self.width, self.height, width_axis)
        };
        if short <= 0.0 {
            return None;
        }
        let axis = if axis.y < 0.0 { -axis } else { axis };

        Some((long, short, axis))
    }
}

/// What a [`Feature`] was recognized as.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FeatureKind {
    /// An elongated light bar on the side of an armor plate.
    LightBlob,
    /// The active arm tip of a rune.
    RuneTarget,
    /// The fixed hub a rune rotates about.
    RuneCenter,
    /// A fiducial tag and its decoded id.
    Tag(u8),
}

/// A single geometric primitive observed in one frame.
///
/// Features are immutable once built. For a light blob, `height` is the long
/// side and `angle` the tilt of the long axis from vertical in degrees.
#[derive(Clone, PartialEq, Debug)]
pub struct Feature {
    center: Point2<f32>,
    width: f32,
    height: f32,
    angle: f32,
    corners: Vec<Point2<f32>>,
    kind: FeatureKind,
}

impl Feature {
    /// Builds a light blob from `blob`, `None` when its shape cannot be a light bar.
    pub fn light_blob(blob: &Blob, params: &LightBlobParams) -> Option<Feature> {
        let (long, short, axis) = blob.long_axis()?;
        let ratio = long / short;
        if ratio < params.min_ratio || ratio > params.max_ratio {
            return None;
        }
        let tilt = axis.x.atan2(axis.y).to_degrees();
        if tilt.abs() > params.max_tilt {
            return None;
        }

        let half = axis * long / 2.0;
        Some(Feature {
            center: blob.center,
            width: short,
            height: long,
            angle: tilt,
            corners: vec![blob.center - half, blob.center + half],
            kind: FeatureKind::LightBlob,
        })
    }

    /// Builds a rune part of `kind` from `blob`, keeping its four rectangle corners.
    pub fn rune_part(blob: &Blob, kind: FeatureKind) -> Result<Feature> {
        let (long, short, axis) = blob
            .long_axis()
            .ok_or(Error::Degenerate("rune blob has no finite area"))?;
        let along = axis * long / 2.0;
        let across = Vector2::new(-axis.y, axis.x) * short / 2.0;
        let center = blob.center;

        Ok(Feature {
            center,
            width: short,
            height: long,
            angle: axis.x.atan2(axis.y).to_degrees(),
            corners: vec![
                center - along - across,
                center + along - across,
                center + along + across,
                center - along + across,
            ],
            kind,
        })
    }

    /// Builds a tag from its four corners in detection order.
    pub fn tag(corners: &[Point2<f32>], id: u8) -> Result<Feature> {
        if corners.len() != 4 {
            return Err(Error::CornerCount {
                expected: 4,
                actual: corners.len(),
            });
        }
        if !corners
            .iter()
            .all(|corner| corner.coords.iter().all(|value| value.is_finite()))
        {
            return Err(Error::Degenerate("tag corner is not finite"));
        }

        let first = (corners[0] - corners[1]).norm();
        let second = (corners[1] - corners[2]).norm();
        let (width, height) = if first >= second {
            (first, second)
        } else {
            (second, first)
        };
        if height <= 0.0 || !height.is_finite() {
            return Err(Error::Degenerate("tag corners collapse"));
        }
        let top = corners[1] - corners[0];

        Ok(Feature {
            center: centroid(corners),
            width,
            height,
            angle: top.y.atan2(top.x).to_degrees(),
            corners: corners.to_vec(),
            kind: FeatureKind::Tag(id),
        })
    }

    #[inline]
    pub fn center(&self) -> Point2<f32> {
        self.center
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.height
    }

    #[inline]
    pub fn angle(&self) -> f32 {
        self.angle
    }

    #[inline]
    pub fn corners(&self) -> &[Point2<f32>] {
        &self.corners
    }

    #[inline]
    pub fn kind(&self) -> FeatureKind {
        self.kind
    }

    /// Unit vector along the long axis, pointing down the image.
    pub fn axis(&self) -> Vector2<f32> {
        let radians = self.angle.to_radians();
        Vector2::new(radians.sin(), radians.cos())
    }
}
