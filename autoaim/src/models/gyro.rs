use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// Inertial sample reported by the gimbal at the time a frame is captured.
///
/// Angles are in degrees and rates in degrees per second. The camera frame is
/// x right, y down, z forward; the world frame is the camera frame rotated by
/// `pitch` about x and then by `yaw` about y.
#[derive(Clone, Copy, PartialEq, Default, Debug, Serialize, Deserialize)]
pub struct GyroData {
    pub yaw: f32,
    pub pitch: f32,
    #[serde(default)]
    pub yaw_speed: f32,
    #[serde(default)]
    pub pitch_speed: f32,
}

impl GyroData {
    pub fn new(yaw: f32, pitch: f32) -> Self {
        Self {
            yaw,
            pitch,
            ..Default::default()
        }
    }

    fn rotation(&self) -> Rotation3<f32> {
        let yaw = Rotation3::from_axis_angle(&Vector3::y_axis(), self.yaw.to_radians());
        let pitch = Rotation3::from_axis_angle(&Vector3::x_axis(), self.pitch.to_radians());
        yaw * pitch
    }

    pub fn camera_to_world(&self, point: &Vector3<f32>) -> Vector3<f32> {
        self.rotation() * point
    }

    pub fn world_to_camera(&self, point: &Vector3<f32>) -> Vector3<f32> {
        self.rotation().inverse() * point
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_world_inverse() {
        let gyro = GyroData::new(30.0, -12.0);
        let point = Vector3::new(0.3, -0.1, 4.0);
        let back = gyro.world_to_camera(&gyro.camera_to_world(&point));

        assert!((back - point).norm() < 1e-5);
    }

    #[test]
    fn yaw_adds_to_bearing() {
        let gyro = GyroData::new(90.0, 0.0);
        let world = gyro.camera_to_world(&Vector3::new(0.0, 0.0, 1.0));

        assert!((world.x - 1.0).abs() < 1e-5);
        assert!(world.z.abs() < 1e-5);
    }
}
