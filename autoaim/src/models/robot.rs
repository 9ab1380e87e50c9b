use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Discrete label a classifier assigns to an armor plate.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Debug,
    Serialize,
    Deserialize,
    EnumIter,
    Display,
    EnumString,
)]
pub enum RobotType {
    #[default]
    Unknown,
    Hero,
    Engineer,
    Infantry3,
    Infantry4,
    Infantry5,
    Outpost,
    Base,
    Sentry,
}
