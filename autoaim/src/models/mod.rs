mod gyro;
mod params;
mod robot;

pub use gyro::*;
pub use params::*;
pub use robot::*;
