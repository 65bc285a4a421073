//! alterego-core: Face location and capture gating.
//!
//! Uses YuNet for face detection and an optional 468-point face mesh for
//! landmarks, both running via ONNX Runtime on the CPU.

pub mod assets;
pub mod detector;
pub mod gate;
pub mod locator;
pub mod mesh;
pub mod types;

pub use detector::FaceDetector;
pub use gate::{CaptureGate, GatePolicy, GateState};
pub use locator::{FaceLocator, LocatorError, OnnxLocator};
pub use mesh::FaceMesh;
pub use types::{BoundingBox, Detection, Landmark, PixelBox};
