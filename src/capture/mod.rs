pub mod frame;
pub mod sensor;
pub mod synthetic;
pub mod v4l2;

#[cfg(test)]
pub(crate) mod testing;

pub use frame::Frame;
pub use frame::PixelFormat;
pub use frame::ResolutionMode;
pub use sensor::Sensor;
pub use synthetic::SyntheticSensor;
pub use v4l2::V4l2Sensor;
