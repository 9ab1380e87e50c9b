use anyhow::{Context, Result, ensure};
use nalgebra::{Point2, Vector3};
use serde::{Deserialize, Serialize};

/// Every tunable of the perception core.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Params {
    #[serde(default)]
    pub detector: DetectorParams,
    #[serde(default)]
    pub camera: CameraParams,
    #[serde(default)]
    pub tracker: TrackerParams,
    #[serde(default)]
    pub rune: RuneTrackerParams,
    #[serde(default)]
    pub gyro: GyroTrackerParams,
}

impl Params {
    /// Parses [`Params`] from JSON, filling missing fields with defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let params = serde_json::from_str::<Params>(json).context("malformed parameters")?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        let detector = &self.detector;
        ensure!(
            detector.min_contour_area >= 0.0,
            "min_contour_area must not be negative"
        );
        ensure!(
            detector.brightness_offsets > 0,
            "brightness_offsets must be positive"
        );
        ensure!(
            detector.light_blob.min_ratio >= 1.0
                && detector.light_blob.min_ratio < detector.light_blob.max_ratio,
            "light blob ratio range is empty"
        );

        let armor = &detector.armor;
        ensure!(armor.max_angle_diff > 0.0, "max_angle_diff must be positive");
        ensure!(
            armor.max_length_ratio > 1.0,
            "max_length_ratio must be greater than 1"
        );
        ensure!(
            armor.min_width_ratio < armor.max_width_ratio,
            "armor width ratio range is empty"
        );
        ensure!(
            armor.max_center_offset > 0.0,
            "max_center_offset must be positive"
        );

        let camera = &self.camera;
        ensure!(
            camera.fx > 0.0 && camera.fy > 0.0,
            "focal lengths must be positive"
        );
        ensure!(
            camera.light_height > 0.0
                && camera.small_armor_width > 0.0
                && camera.big_armor_width > 0.0,
            "armor dimensions must be positive"
        );

        let tracker = &self.tracker;
        ensure!(tracker.history_depth > 0, "history_depth must be positive");
        ensure!(
            tracker.min_sample_time > 0.0 && tracker.min_sample_time < tracker.max_sample_time,
            "sample time range is empty"
        );

        let rune = &self.rune;
        ensure!(
            rune.process_noise > 0.0 && rune.measurement_noise > 0.0,
            "rune noises must be positive"
        );

        let gyro = &self.gyro;
        ensure!(
            [
                gyro.motion_process_noise,
                gyro.motion_measurement_noise,
                gyro.center_process_noise,
                gyro.center_measurement_noise,
                gyro.pose_process_noise,
                gyro.pose_measurement_noise,
                gyro.image_spin_variance,
                gyro.gyro_spin_variance,
            ]
            .into_iter()
            .all(|noise| noise > 0.0),
            "gyro tracker noises must be positive"
        );
        ensure!(gyro.type_depth > 0, "type_depth must be positive");

        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectorParams {
    /// Contours with a smaller area are noise.
    #[serde(default = "min_contour_area_default")]
    pub min_contour_area: f32,
    /// Number of brightness samples taken on each side of a blob.
    #[serde(default = "brightness_offsets_default")]
    pub brightness_offsets: u32,
    /// Blobs whose summed sample brightness exceeds this are overexposed highlights.
    #[serde(default = "brightness_threshold_default")]
    pub brightness_threshold: u32,
    /// Drops armors a classifier could not label.
    #[serde(default)]
    pub erase_unknown: bool,
    #[serde(default)]
    pub light_blob: LightBlobParams,
    #[serde(default)]
    pub armor: ArmorParams,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            min_contour_area: min_contour_area_default(),
            brightness_offsets: brightness_offsets_default(),
            brightness_threshold: brightness_threshold_default(),
            erase_unknown: false,
            light_blob: LightBlobParams::default(),
            armor: ArmorParams::default(),
        }
    }
}

fn min_contour_area_default() -> f32 {
    20.0
}

fn brightness_offsets_default() -> u32 {
    5
}

fn brightness_threshold_default() -> u32 {
    1100
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LightBlobParams {
    #[serde(default = "light_min_ratio_default")]
    pub min_ratio: f32,
    #[serde(default = "light_max_ratio_default")]
    pub max_ratio: f32,
    /// Maximum tilt of the long axis from vertical, in degrees.
    #[serde(default = "light_max_tilt_default")]
    pub max_tilt: f32,
}

impl Default for LightBlobParams {
    fn default() -> Self {
        Self {
            min_ratio: light_min_ratio_default(),
            max_ratio: light_max_ratio_default(),
            max_tilt: light_max_tilt_default(),
        }
    }
}

fn light_min_ratio_default() -> f32 {
    1.5
}

fn light_max_ratio_default() -> f32 {
    20.0
}

fn light_max_tilt_default() -> f32 {
    40.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArmorParams {
    /// Maximum tilt difference between the two lights, in degrees.
    #[serde(default = "max_angle_diff_default")]
    pub max_angle_diff: f32,
    /// Maximum ratio between the longer and the shorter light.
    #[serde(default = "max_length_ratio_default")]
    pub max_length_ratio: f32,
    /// Range of center distance over mean light length.
    #[serde(default = "min_width_ratio_default")]
    pub min_width_ratio: f32,
    #[serde(default = "max_width_ratio_default")]
    pub max_width_ratio: f32,
    /// Maximum vertical offset of the light centers over mean light length.
    #[serde(default = "max_center_offset_default")]
    pub max_center_offset: f32,
    /// Width ratio above which the plate is a big armor.
    #[serde(default = "big_armor_ratio_default")]
    pub big_armor_ratio: f32,
}

impl Default for ArmorParams {
    fn default() -> Self {
        Self {
            max_angle_diff: max_angle_diff_default(),
            max_length_ratio: max_length_ratio_default(),
            min_width_ratio: min_width_ratio_default(),
            max_width_ratio: max_width_ratio_default(),
            max_center_offset: max_center_offset_default(),
            big_armor_ratio: big_armor_ratio_default(),
        }
    }
}

fn max_angle_diff_default() -> f32 {
    10.0
}

fn max_length_ratio_default() -> f32 {
    1.6
}

fn min_width_ratio_default() -> f32 {
    1.2
}

fn max_width_ratio_default() -> f32 {
    5.0
}

fn max_center_offset_default() -> f32 {
    0.8
}

fn big_armor_ratio_default() -> f32 {
    3.2
}

/// Pinhole intrinsics and the physical armor dimensions in metres.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraParams {
    #[serde(default = "focal_default")]
    pub fx: f32,
    #[serde(default = "focal_default")]
    pub fy: f32,
    #[serde(default = "cx_default")]
    pub cx: f32,
    #[serde(default = "cy_default")]
    pub cy: f32,
    #[serde(default = "small_armor_width_default")]
    pub small_armor_width: f32,
    #[serde(default = "big_armor_width_default")]
    pub big_armor_width: f32,
    #[serde(default = "light_height_default")]
    pub light_height: f32,
}

impl CameraParams {
    /// Projects a camera-frame point to pixels, `None` when behind the camera.
    pub fn project(&self, point: &Vector3<f32>) -> Option<Point2<f32>> {
        if point.z <= f32::EPSILON {
            return None;
        }
        Some(Point2::new(
            self.fx * point.x / point.z + self.cx,
            self.fy * point.y / point.z + self.cy,
        ))
    }

    /// Lifts `pixel` to the camera-frame point at `depth`.
    pub fn back_project(&self, pixel: &Point2<f32>, depth: f32) -> Vector3<f32> {
        Vector3::new(
            (pixel.x - self.cx) * depth / self.fx,
            (pixel.y - self.cy) * depth / self.fy,
            depth,
        )
    }
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            fx: focal_default(),
            fy: focal_default(),
            cx: cx_default(),
            cy: cy_default(),
            small_armor_width: small_armor_width_default(),
            big_armor_width: big_armor_width_default(),
            light_height: light_height_default(),
        }
    }
}

fn focal_default() -> f32 {
    1250.0
}

fn cx_default() -> f32 {
    640.0
}

fn cy_default() -> f32 {
    512.0
}

fn small_armor_width_default() -> f32 {
    0.135
}

fn big_armor_width_default() -> f32 {
    0.230
}

fn light_height_default() -> f32 {
    0.055
}

/// Parameters shared by every tracker kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackerParams {
    #[serde(default = "history_depth_default")]
    pub history_depth: usize,
    /// Smallest time step in seconds fed to a filter.
    #[serde(default = "min_sample_time_default")]
    pub min_sample_time: f32,
    /// Largest time step in seconds fed to a filter.
    #[serde(default = "max_sample_time_default")]
    pub max_sample_time: f32,
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self {
            history_depth: history_depth_default(),
            min_sample_time: min_sample_time_default(),
            max_sample_time: max_sample_time_default(),
        }
    }
}

fn history_depth_default() -> usize {
    32
}

fn min_sample_time_default() -> f32 {
    0.001
}

fn max_sample_time_default() -> f32 {
    0.5
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuneTrackerParams {
    /// Angular acceleration variance, (deg/s²)².
    #[serde(default = "rune_process_noise_default")]
    pub process_noise: f32,
    /// Angle measurement variance, deg².
    #[serde(default = "rune_measurement_noise_default")]
    pub measurement_noise: f32,
    /// Variance of the unknown initial angular velocity, (deg/s)².
    #[serde(default = "rune_initial_speed_variance_default")]
    pub initial_speed_variance: f32,
}

impl Default for RuneTrackerParams {
    fn default() -> Self {
        Self {
            process_noise: rune_process_noise_default(),
            measurement_noise: rune_measurement_noise_default(),
            initial_speed_variance: rune_initial_speed_variance_default(),
        }
    }
}

fn rune_process_noise_default() -> f32 {
    400.0
}

fn rune_measurement_noise_default() -> f32 {
    1.0
}

fn rune_initial_speed_variance_default() -> f32 {
    3600.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GyroTrackerParams {
    #[serde(default = "motion_process_noise_default")]
    pub motion_process_noise: f32,
    #[serde(default = "motion_measurement_noise_default")]
    pub motion_measurement_noise: f32,
    #[serde(default = "center_process_noise_default")]
    pub center_process_noise: f32,
    #[serde(default = "center_measurement_noise_default")]
    pub center_measurement_noise: f32,
    #[serde(default = "pose_process_noise_default")]
    pub pose_process_noise: f32,
    #[serde(default = "pose_measurement_noise_default")]
    pub pose_measurement_noise: f32,
    /// Variance of the spin rate differenced from world-frame normals, (rad/s)².
    #[serde(default = "image_spin_variance_default")]
    pub image_spin_variance: f32,
    /// Variance of the spin rate built from the inertial yaw rate, (rad/s)².
    #[serde(default = "gyro_spin_variance_default")]
    pub gyro_spin_variance: f32,
    /// Depth of the type majority vote.
    #[serde(default = "type_depth_default")]
    pub type_depth: usize,
}

impl Default for GyroTrackerParams {
    fn default() -> Self {
        Self {
            motion_process_noise: motion_process_noise_default(),
            motion_measurement_noise: motion_measurement_noise_default(),
            center_process_noise: center_process_noise_default(),
            center_measurement_noise: center_measurement_noise_default(),
            pose_process_noise: pose_process_noise_default(),
            pose_measurement_noise: pose_measurement_noise_default(),
            image_spin_variance: image_spin_variance_default(),
            gyro_spin_variance: gyro_spin_variance_default(),
            type_depth: type_depth_default(),
        }
    }
}

fn motion_process_noise_default() -> f32 {
    4.0
}

fn motion_measurement_noise_default() -> f32 {
    0.01
}

fn center_process_noise_default() -> f32 {
    1.0
}

fn center_measurement_noise_default() -> f32 {
    0.0025
}

fn pose_process_noise_default() -> f32 {
    2.0
}

fn pose_measurement_noise_default() -> f32 {
    0.01
}

fn image_spin_variance_default() -> f32 {
    0.04
}

fn gyro_spin_variance_default() -> f32 {
    0.01
}

fn type_depth_default() -> usize {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_json_fills_defaults() {
        let params = Params::from_json(r#"{ "detector": { "brightness_threshold": 900 } }"#)
            .unwrap();

        assert_eq!(params.detector.brightness_threshold, 900);
        assert_eq!(params.detector.min_contour_area, 20.0);
        assert_eq!(params.detector.armor, ArmorParams::default());
        assert_eq!(params.gyro, GyroTrackerParams::default());
    }

    #[test]
    fn from_json_empty_object_is_default() {
        assert_eq!(Params::from_json("{}").unwrap(), Params::default());
    }

    #[test]
    fn from_json_rejects_out_of_range() {
        assert!(Params::from_json(r#"{ "armor": 1 "#).is_err());
        assert!(
            Params::from_json(r#"{ "detector": { "armor": { "max_length_ratio": 1.0 } } }"#)
                .is_err()
        );
        assert!(
            Params::from_json(
                r#"{ "tracker": { "min_sample_time": 0.5, "max_sample_time": 0.1 } }"#
            )
            .is_err()
        );
        assert!(Params::from_json(r#"{ "gyro": { "type_depth": 0 } }"#).is_err());
    }

    #[test]
    fn default_params_are_valid() {
        assert!(Params::default().validate().is_ok());
    }

    #[test]
    fn project_back_project() {
        let camera = CameraParams::default();
        let pixel = Point2::new(700.0, 400.0);
        let point = camera.back_project(&pixel, 3.0);

        assert_eq!(point.z, 3.0);
        assert!((camera.project(&point).unwrap() - pixel).norm() < 1e-3);
        assert!(camera.project(&Vector3::new(0.0, 0.0, -1.0)).is_none());
    }
}
