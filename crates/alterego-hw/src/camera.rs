//! V4L2 webcam capture via the `v4l` crate.

use crate::frame::{self, Frame, FrameError};
use crate::source::FrameSource;
use std::io;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::capability::Flags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Resolution requested from the driver; it may negotiate something else.
const REQUESTED_WIDTH: u32 = 640;
const REQUESTED_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;
/// Highest `/dev/video<N>` index probed when listing devices.
const MAX_PROBED_INDEX: u32 = 16;
const EBUSY: i32 = 16;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("no camera at {0}")]
    NotFound(String),
    #[error("camera {0} is in use by another process")]
    Busy(String),
    #[error("cannot open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("{0} is not a video capture device")]
    NotCaptureDevice(String),
    #[error("format negotiation failed: {0}")]
    Format(#[source] io::Error),
    #[error("camera delivers {0:?}; only YUYV, MJPG and GREY are supported")]
    UnsupportedFormat(FourCC),
    #[error("cannot start streaming: {0}")]
    Stream(#[source] io::Error),
    #[error("frame read failed: {0}")]
    Read(#[source] io::Error),
    #[error("frame conversion failed: {0}")]
    Conversion(#[from] FrameError),
}

/// A capture device found by [`Camera::list_devices`].
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub index: u32,
    pub path: String,
    pub card: String,
    pub driver: String,
    pub bus_info: String,
}

/// Pixel layout of the buffers the driver hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// Motion-JPEG, one JPEG image per buffer.
    Mjpg,
    Grey,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(Self::Yuyv),
            b"MJPG" => Some(Self::Mjpg),
            b"GREY" => Some(Self::Grey),
            _ => None,
        }
    }
}

/// Path of the V4L2 node for a camera index (`0` → `/dev/video0`).
pub fn device_path(index: u32) -> String {
    format!("/dev/video{index}")
}

/// An open webcam with a negotiated capture format.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open `/dev/video<index>` and negotiate 640x480 YUYV.
    ///
    /// MJPG or GREY are accepted if the driver substitutes them.
    pub fn open(index: u32) -> Result<Self, CameraError> {
        let path = device_path(index);
        if !Path::new(&path).exists() {
            return Err(CameraError::NotFound(path));
        }

        let device = Device::with_path(&path).map_err(|source| {
            if source.raw_os_error() == Some(EBUSY) {
                CameraError::Busy(path.clone())
            } else {
                CameraError::Open {
                    path: path.clone(),
                    source,
                }
            }
        })?;

        let caps = device.query_caps().map_err(|source| CameraError::Open {
            path: path.clone(),
            source,
        })?;
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            return Err(CameraError::NotCaptureDevice(path));
        }

        let (width, height, fourcc) = negotiate(&device)?;
        let pixel_format =
            PixelFormat::from_fourcc(fourcc).ok_or(CameraError::UnsupportedFormat(fourcc))?;

        tracing::info!(
            device = %path,
            card = %caps.card,
            width,
            height,
            fourcc = %fourcc,
            "camera ready"
        );

        Ok(Self {
            device,
            width,
            height,
            device_path: path,
            fourcc,
            pixel_format,
        })
    }

    /// Map the capture buffers and start streaming. Streaming stops when
    /// the returned stream is dropped.
    pub fn stream(&self) -> Result<CameraStream<'_>, CameraError> {
        let stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(CameraError::Stream)?;
        Ok(CameraStream {
            camera: self,
            stream,
        })
    }

    fn to_frame(&self, buf: &[u8], sequence: u32) -> Result<Frame, CameraError> {
        let (rgb, width, height) = match self.pixel_format {
            PixelFormat::Yuyv => (
                frame::yuyv_to_rgb(buf, self.width, self.height)?,
                self.width,
                self.height,
            ),
            PixelFormat::Grey => (
                frame::grey_to_rgb(buf, self.width, self.height)?,
                self.width,
                self.height,
            ),
            PixelFormat::Mjpg => {
                // Decoded size wins over the negotiated size.
                let img = frame::mjpg_to_rgb(buf)?;
                let (width, height) = img.dimensions();
                (img.into_raw(), width, height)
            }
        };
        Ok(Frame::new(rgb, width, height, sequence))
    }

    /// Capture-capable devices among `/dev/video0..15`.
    ///
    /// Nodes that cannot be opened (busy, metadata-only) are skipped.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..MAX_PROBED_INDEX)
            .filter_map(|index| {
                let path = device_path(index);
                let caps = Device::with_path(&path).ok()?.query_caps().ok()?;
                caps.capabilities
                    .contains(Flags::VIDEO_CAPTURE)
                    .then(|| DeviceInfo {
                        index,
                        path,
                        card: caps.card,
                        driver: caps.driver,
                        bus_info: caps.bus,
                    })
            })
            .collect()
    }
}

/// Request the preferred format and report what the driver settled on.
fn negotiate(device: &Device) -> Result<(u32, u32, FourCC), CameraError> {
    let mut wanted = device.format().map_err(CameraError::Format)?;
    wanted.fourcc = FourCC::new(b"YUYV");
    wanted.width = REQUESTED_WIDTH;
    wanted.height = REQUESTED_HEIGHT;

    let got = device.set_format(&wanted).map_err(CameraError::Format)?;
    if (got.width, got.height) != (REQUESTED_WIDTH, REQUESTED_HEIGHT) {
        tracing::debug!(width = got.width, height = got.height, "driver chose another size");
    }
    Ok((got.width, got.height, got.fourcc))
}

/// A live capture stream borrowed from an open [`Camera`].
pub struct CameraStream<'a> {
    camera: &'a Camera,
    stream: MmapStream<'a>,
}

impl FrameSource for CameraStream<'_> {
    fn read(&mut self) -> Result<Frame, CameraError> {
        let (buf, meta) = self.stream.next().map_err(CameraError::Read)?;
        self.camera.to_frame(buf, meta.sequence)
    }
}
