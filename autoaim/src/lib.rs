//! Perception core of a vision-guided aiming pipeline.
//!
//! [`ArmorDetector`] assembles armor plates from the light blobs of one frame.
//! Trackers in [`tracker`] then follow each target across frames, fusing the
//! per-frame [`Combo`]s with inertial [`GyroData`] through Kalman filters and
//! predicting through frames where the target was not seen.

use thiserror::Error;

mod combo;
mod detect;
mod feature;
mod geometry;
mod models;
pub mod tracker;

pub use {
    combo::*,
    detect::{ArmorDetector, Classifier, DetectInfo},
    feature::*,
    models::*,
    tracker::{AnyTracker, GyroTracker, RuneTracker, Tracker, VanishState},
};

pub type Result<T> = core::result::Result<T, Error>;

/// Construction-time contract violation.
#[derive(Error, PartialEq, Clone, Debug)]
pub enum Error {
    #[error("the size of corners should be {expected}, but now it is {actual}")]
    CornerCount { expected: usize, actual: usize },
    #[error("expected a {0} feature")]
    FeatureKind(&'static str),
    #[error("expected a {expected} combo, but got a {actual} combo")]
    ComboKind {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("degenerate geometry: {0}")]
    Degenerate(&'static str),
}
