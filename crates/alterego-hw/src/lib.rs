//! alterego-hw: Webcam capture for the AlterEgo pipeline.
//!
//! Provides V4L2-based camera access and conversion of captured buffers
//! into packed RGB frames.

pub mod camera;
pub mod frame;
pub mod source;

pub use camera::{Camera, CameraError, CameraStream, DeviceInfo, PixelFormat};
pub use frame::Frame;
pub use source::FrameSource;
