use nalgebra::{Point2, Vector3};
use strum::{Display, IntoStaticStr};

use crate::{
    ArmorParams, CameraParams, Error, GyroData, Result, RobotType,
    feature::{Feature, FeatureKind},
    geometry::{convex_contains, distance, wrap_degrees, wrap_pi},
};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum ArmorSize {
    Small,
    Big,
}

/// Pose of an armor plate estimated from a single image.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct PlatePose {
    /// Plate center in the camera frame, in metres.
    pub translation: Vector3<f32>,
    /// Yaw of the plate relative to the line of sight in radians, positive when
    /// the right light is closer to the camera.
    pub yaw: f32,
    /// Heading of the plate normal in the camera xz plane, in radians.
    pub normal: f32,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ArmorInfo {
    pub size: ArmorSize,
    /// Normalized geometric match error, lower is a better pairing.
    pub error: f32,
    pub pose: PlatePose,
    /// Inertial sample at capture time.
    pub gyro: GyroData,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct RuneInfo {
    pub rotation_center: Point2<f32>,
}

#[derive(Clone, Copy, PartialEq, Debug, IntoStaticStr)]
pub enum ComboKind {
    Single,
    Armor(ArmorInfo),
    Rune(RuneInfo),
}

/// A target assembled from one or more [`Feature`]s.
///
/// A combo owns its features, so cloning deep-copies them. Nothing but
/// [`Combo::clone_at`], [`Combo::predicted`], [`Combo::with_robot_type`] and
/// [`Combo::with_plate_pose`] produces a modified combo.
#[derive(Clone, PartialEq, Debug)]
pub struct Combo {
    features: Vec<Feature>,
    center: Point2<f32>,
    /// Degrees. Slope of the light centers line for armors, wrapped arm
    /// heading in `[0, 360)` for runes.
    angle: f32,
    width: f32,
    height: f32,
    corners: Vec<Point2<f32>>,
    robot: RobotType,
    kind: ComboKind,
    tick: f64,
}

impl Combo {
    /// Wraps a single feature, copying its pose.
    pub fn single(feature: Feature, tick: f64) -> Combo {
        Combo {
            center: feature.center(),
            angle: feature.angle(),
            width: feature.width(),
            height: feature.height(),
            corners: feature.corners().to_vec(),
            features: vec![feature],
            robot: RobotType::Unknown,
            kind: ComboKind::Single,
            tick,
        }
    }

    /// Pairs two light blobs into an armor plate.
    ///
    /// Returns `None` when the pair fails the geometric checks. The resulting
    /// features are ordered left to right by center x.
    pub fn armor(
        first: &Feature,
        second: &Feature,
        params: &ArmorParams,
        camera: &CameraParams,
        gyro: &GyroData,
        tick: f64,
    ) -> Option<Combo> {
        if first.kind() != FeatureKind::LightBlob
            || second.kind() != FeatureKind::LightBlob
            || first == second
        {
            return None;
        }
        let (left, right) = if first.center().x <= second.center().x {
            (first, second)
        } else {
            (second, first)
        };

        let mean_height = (left.height() + right.height()) / 2.0;
        let width = distance(&left.center(), &right.center());
        if mean_height <= 0.0 || width <= 0.0 {
            return None;
        }

        let angle_diff = (left.angle() - right.angle()).abs();
        let length_ratio = left.height().max(right.height()) / left.height().min(right.height());
        let width_ratio = width / mean_height;
        let center_offset = (left.center().y - right.center().y).abs() / mean_height;
        if angle_diff > params.max_angle_diff
            || length_ratio > params.max_length_ratio
            || width_ratio < params.min_width_ratio
            || width_ratio > params.max_width_ratio
            || center_offset > params.max_center_offset
        {
            return None;
        }

        let error = angle_diff / params.max_angle_diff
            + (length_ratio - 1.0) / (params.max_length_ratio - 1.0)
            + center_offset / params.max_center_offset;
        let size = if width_ratio > params.big_armor_ratio {
            ArmorSize::Big
        } else {
            ArmorSize::Small
        };

        let center = nalgebra::center(&left.center(), &right.center());
        let line = right.center() - left.center();
        let left_half = left.axis() * left.height() / 2.0;
        let right_half = right.axis() * right.height() / 2.0;
        let corners = vec![
            left.center() - left_half,
            left.center() + left_half,
            right.center() + right_half,
            right.center() - right_half,
        ];
        let pose = estimate_pose(left, right, center, width, mean_height, size, camera);

        Some(Combo {
            features: vec![left.clone(), right.clone()],
            center,
            angle: line.y.atan2(line.x).to_degrees(),
            width,
            height: mean_height,
            corners,
            robot: RobotType::Unknown,
            kind: ComboKind::Armor(ArmorInfo {
                size,
                error,
                pose,
                gyro: *gyro,
            }),
            tick,
        })
    }

    /// Builds a rune from its active arm `target` and rotation hub `center`.
    ///
    /// The angle is the heading of the arm around the hub, counter-clockwise on
    /// screen from +x, wrapped into `[0, 360)`.
    pub fn rune(target: &Feature, center: &Feature, tick: f64) -> Result<Combo> {
        if target.kind() != FeatureKind::RuneTarget {
            return Err(Error::FeatureKind("rune target"));
        }
        if center.kind() != FeatureKind::RuneCenter {
            return Err(Error::FeatureKind("rune center"));
        }
        let arm = target.center() - center.center();
        if arm.norm() <= f32::EPSILON {
            return Err(Error::Degenerate("rune target sits on its rotation center"));
        }

        Ok(Combo {
            features: vec![target.clone(), center.clone()],
            center: target.center(),
            angle: wrap_degrees((-arm.y).atan2(arm.x).to_degrees()),
            width: target.width(),
            height: target.height(),
            corners: target.corners().to_vec(),
            robot: RobotType::Unknown,
            kind: ComboKind::Rune(RuneInfo {
                rotation_center: center.center(),
            }),
            tick,
        })
    }

    /// Deep copy stamped with a new capture `tick`.
    pub fn clone_at(&self, tick: f64) -> Combo {
        Combo {
            tick,
            ..self.clone()
        }
    }

    /// Deep copy moved to a synthesized pose, used when the target was not observed.
    ///
    /// Corners follow the center shift while the features keep their observed geometry.
    pub fn predicted(&self, center: Point2<f32>, angle: f32, tick: f64) -> Combo {
        let shift = center - self.center;
        Combo {
            center,
            angle,
            corners: self.corners.iter().map(|corner| corner + shift).collect(),
            tick,
            ..self.clone()
        }
    }

    pub fn with_robot_type(self, robot: RobotType) -> Combo {
        Combo { robot, ..self }
    }

    /// Replaces the plate pose and the inertial sample of an armor, other kinds
    /// are returned unchanged.
    pub fn with_plate_pose(self, pose: PlatePose, gyro: GyroData) -> Combo {
        match self.kind {
            ComboKind::Armor(info) => Combo {
                kind: ComboKind::Armor(ArmorInfo { pose, gyro, ..info }),
                ..self
            },
            _ => self,
        }
    }

    /// Whether `feature`'s center falls inside this combo's corner polygon.
    #[inline]
    pub fn contains(&self, feature: &Feature) -> bool {
        convex_contains(&self.corners, &feature.center())
    }

    #[inline]
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    #[inline]
    pub fn center(&self) -> Point2<f32> {
        self.center
    }

    #[inline]
    pub fn angle(&self) -> f32 {
        self.angle
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
    pub fn corners(&self) -> &[Point2<f32>] {
        &self.corners
    }

    #[inline]
    pub fn robot_type(&self) -> RobotType {
        self.robot
    }

    #[inline]
    pub fn kind(&self) -> &ComboKind {
        &self.kind
    }

    #[inline]
    pub fn tick(&self) -> f64 {
        self.tick
    }

    pub fn kind_name(&self) -> &'static str {
        (&self.kind).into()
    }

    pub fn as_armor(&self) -> Option<&ArmorInfo> {
        match &self.kind {
            ComboKind::Armor(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_rune(&self) -> Option<&RuneInfo> {
        match &self.kind {
            ComboKind::Rune(info) => Some(info),
            _ => None,
        }
    }
}

/// Pinhole estimate of the plate pose: depth from the light length, yaw from
/// how much the plate is foreshortened compared to its nominal aspect ratio.
fn estimate_pose(
    left: &Feature,
    right: &Feature,
    center: Point2<f32>,
    width: f32,
    mean_height: f32,
    size: ArmorSize,
    camera: &CameraParams,
) -> PlatePose {
    let depth = camera.fy * camera.light_height / mean_height;
    let translation = camera.back_project(&center, depth);

    let plate_width = match size {
        ArmorSize::Small => camera.small_armor_width,
        ArmorSize::Big => camera.big_armor_width,
    };
    let nominal_ratio = plate_width / camera.light_height;
    let observed_ratio = width / mean_height;
    let magnitude = (observed_ratio / nominal_ratio).clamp(0.0, 1.0).acos();
    let yaw = if right.height() > left.height() {
        magnitude
    } else {
        -magnitude
    };
    let bearing = translation.x.atan2(translation.z);

    PlatePose {
        translation,
        yaw,
        normal: wrap_pi(bearing + yaw),
    }
}
