use std::collections::VecDeque;

use log::{info, warn};
use nalgebra::{Matrix2, Matrix3, Matrix4, Vector2, Vector3, Vector4, Vector6};

use super::{
    Tracker, TrackerCore, TypeVote, VanishState,
    kalman_filter::{KalmanFilter, observe_leading, split_diagonal},
    stamped,
};
use crate::{
    ArmorInfo, CameraParams, Combo, Error, GyroData, GyroTrackerParams, Params, PlatePose, Result,
    RobotType, geometry::wrap_pi,
};

/// Initial variance of every rate state, before any motion has been seen.
const INITIAL_RATE_VARIANCE: f32 = 16.0;

/// Tracks an armor plate on a spinning robot in the world frame.
///
/// Three filters run side by side: the plate normal `(sin φ, cos φ)` and its
/// rate, the plate center and its velocity, and the plate orientation relative
/// to the line of sight. The robot type is smoothed by a majority vote.
#[derive(Clone, Debug)]
pub struct GyroTracker {
    core: TrackerCore,
    params: GyroTrackerParams,
    camera: CameraParams,
    motion: KalmanFilter<4, 4>,
    center: KalmanFilter<6, 3>,
    orientation: KalmanFilter<4, 2>,
    types: TypeVote,
    /// Heading of the plate normal in the world frame at the latest sample, radians.
    world_normal: f32,
    /// Heading of the plate normal in the camera frame at the latest sample, radians.
    camera_normal: f32,
}

impl GyroTracker {
    pub fn new(combo: Combo, params: &Params) -> Result<Self> {
        let Some(info) = combo.as_armor().copied() else {
            return Err(Error::ComboKind {
                expected: "Armor",
                actual: combo.kind_name(),
            });
        };
        let gyro = params.gyro.clone();
        let world_normal = world_normal(&info);
        let (sin, cos) = world_normal.sin_cos();
        let position = info.gyro.camera_to_world(&info.pose.translation);

        let spin_variance = fused_variance(gyro.image_spin_variance, gyro.gyro_spin_variance);
        let motion = KalmanFilter::new(
            Vector4::new(sin, cos, 0.0, 0.0),
            split_diagonal(gyro.motion_measurement_noise, INITIAL_RATE_VARIANCE),
            Matrix4::identity(),
            Matrix4::from_diagonal(&Vector4::new(
                gyro.motion_measurement_noise,
                gyro.motion_measurement_noise,
                spin_variance,
                spin_variance,
            )),
        );
        let center = KalmanFilter::new(
            Vector6::new(position.x, position.y, position.z, 0.0, 0.0, 0.0),
            split_diagonal(gyro.center_measurement_noise, INITIAL_RATE_VARIANCE),
            observe_leading(),
            Matrix3::from_diagonal_element(gyro.center_measurement_noise),
        );
        let orientation = KalmanFilter::new(
            Vector4::new(info.pose.yaw, combo.angle().to_radians(), 0.0, 0.0),
            split_diagonal(gyro.pose_measurement_noise, INITIAL_RATE_VARIANCE),
            observe_leading(),
            Matrix2::from_diagonal_element(gyro.pose_measurement_noise),
        );
        let mut types = TypeVote::new(gyro.type_depth);
        types.push(combo.robot_type());
        info!(
            target: "tracker",
            "gyro tracker created for {} armor at ({:.2}, {:.2}, {:.2})",
            info.size, position.x, position.y, position.z
        );

        Ok(Self {
            core: TrackerCore::new(combo, &params.tracker),
            params: gyro,
            camera: params.camera.clone(),
            motion,
            center,
            orientation,
            types,
            world_normal,
            camera_normal: info.pose.normal,
        })
    }

    /// Filtered unit normal `(sin φ, cos φ)` of the plate in the world frame.
    pub fn pose(&self) -> Vector2<f32> {
        let mean = self.motion.mean();
        Vector2::new(mean[0], mean[1])
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(|| Vector2::new(self.world_normal.sin(), self.world_normal.cos()))
    }

    /// Filtered plate center in the world frame, in metres.
    pub fn center(&self) -> Vector3<f32> {
        self.center.mean().fixed_rows::<3>(0).into_owned()
    }

    /// Filtered plate velocity in the world frame, in metres per second.
    pub fn velocity(&self) -> Vector3<f32> {
        self.center.mean().fixed_rows::<3>(3).into_owned()
    }

    /// Filtered yaw relative to the line of sight and roll of the plate, in radians.
    pub fn orientation(&self) -> (f32, f32) {
        let mean = self.orientation.mean();
        (mean[0], mean[1])
    }

    /// Projects the motion state back onto the unit circle, keeping only the
    /// tangential part of the rate.
    fn constrain_motion(&mut self) {
        let mean = self.motion.mean_mut();
        let Some(normal) = Vector2::new(mean[0], mean[1]).try_normalize(f32::EPSILON) else {
            return;
        };
        // d(sin φ, cos φ)/dφ
        let tangent = Vector2::new(normal.y, -normal.x);
        let spin = tangent.dot(&Vector2::new(mean[2], mean[3]));
        *mean = Vector4::new(normal.x, normal.y, tangent.x * spin, tangent.y * spin);
    }

    fn observe(&mut self, combo: Combo, info: ArmorInfo, tick: f64, gyro: &GyroData) {
        let (dt, tick) = self.core.advance(tick);

        let world_normal = world_normal(&info);
        let camera_normal = info.pose.normal;
        let image_spin = wrap_pi(world_normal - self.world_normal) / dt;
        let relative_spin =
            wrap_pi(camera_normal - self.camera_normal) / dt + gyro.yaw_speed.to_radians();
        let spin = fuse_spin(
            image_spin,
            relative_spin,
            self.params.image_spin_variance,
            self.params.gyro_spin_variance,
        );
        let (sin, cos) = world_normal.sin_cos();
        self.motion.predict(dt, self.params.motion_process_noise);
        self.motion.update(Vector4::new(sin, cos, spin * cos, -spin * sin));
        self.constrain_motion();

        let center = info.gyro.camera_to_world(&info.pose.translation);
        self.center.predict(dt, self.params.center_process_noise);
        self.center.update(center);

        self.orientation.predict(dt, self.params.pose_process_noise);
        self.orientation.update(Vector2::new(info.pose.yaw, combo.angle().to_radians()));

        self.types.push(combo.robot_type());
        self.world_normal = world_normal;
        self.camera_normal = camera_normal;
        self.core.update_vanish_state(VanishState::Appear);
        self.core.push(stamped(combo, tick));
    }

    fn vanish(&mut self, tick: f64, gyro: &GyroData) {
        let (dt, tick) = self.core.advance(tick);

        self.motion.predict(dt, self.params.motion_process_noise);
        self.constrain_motion();
        self.center.predict(dt, self.params.center_process_noise);
        self.orientation.predict(dt, self.params.pose_process_noise);
        self.world_normal = wrap_pi(self.world_normal + self.rotated_speed() * dt);
        self.camera_normal = wrap_pi(self.world_normal - gyro.yaw.to_radians());

        let last = &self.core.front;
        let translation = gyro.world_to_camera(&self.center());
        let pixel = self
            .camera
            .project(&translation)
            .unwrap_or_else(|| last.center());
        let (yaw, roll) = self.orientation();
        let pose = PlatePose {
            translation,
            yaw,
            normal: self.camera_normal,
        };
        let combo = last
            .predicted(pixel, roll.to_degrees(), tick)
            .with_plate_pose(pose, *gyro)
            .with_robot_type(self.types.majority());

        self.core.update_vanish_state(VanishState::Vanish);
        self.core.push(combo);
    }
}

impl Tracker for GyroTracker {
    fn update(&mut self, combo: Option<Combo>, tick: f64, gyro: &GyroData) {
        match combo {
            Some(combo) => match combo.as_armor().copied() {
                Some(info) => self.observe(combo, info, tick, gyro),
                None => {
                    warn!(target: "tracker", "gyro tracker ignored a {} combo", combo.kind_name());
                    self.vanish(tick, gyro);
                }
            },
            None => self.vanish(tick, gyro),
        }
    }

    fn update_vanish_state(&mut self, state: VanishState) {
        self.core.update_vanish_state(state);
    }

    fn vanish_count(&self) -> u32 {
        self.core.vanish_count
    }

    /// Filtered spin rate of the plate normal in radians per second, positive
    /// when the normal turns from +z towards +x.
    fn rotated_speed(&self) -> f32 {
        let mean = self.motion.mean();
        let norm_squared = mean[0] * mean[0] + mean[1] * mean[1];
        if norm_squared <= f32::EPSILON {
            return 0.0;
        }
        (mean[1] * mean[2] - mean[0] * mean[3]) / norm_squared
    }

    fn front(&self) -> &Combo {
        &self.core.front
    }

    fn history(&self) -> &VecDeque<Combo> {
        &self.core.history
    }

    fn robot_type(&self) -> RobotType {
        self.types.majority()
    }

    fn sample_time(&self) -> f32 {
        self.core.sample_time
    }
}

#[inline]
fn world_normal(info: &ArmorInfo) -> f32 {
    wrap_pi(info.pose.normal + info.gyro.yaw.to_radians())
}

/// Inverse-variance weighted mean of two spin rate estimates.
fn fuse_spin(image: f32, inertial: f32, image_variance: f32, inertial_variance: f32) -> f32 {
    let image_weight = image_variance.recip();
    let inertial_weight = inertial_variance.recip();
    (image * image_weight + inertial * inertial_weight) / (image_weight + inertial_weight)
}

#[inline]
fn fused_variance(image_variance: f32, inertial_variance: f32) -> f32 {
    (image_variance.recip() + inertial_variance.recip()).recip()
}
