//! Frame source abstraction driven by the capture loop.

use crate::camera::CameraError;
use crate::frame::Frame;

/// Produces frames on demand, one per call.
///
/// An `Err` from [`read`](FrameSource::read) means the stream is over;
/// callers stop pulling frames rather than retrying.
pub trait FrameSource {
    fn read(&mut self) -> Result<Frame, CameraError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read(&mut self) -> Result<Frame, CameraError> {
        (**self).read()
    }
}
