//! Camera capture with startup retry.

use log::{info, warn};
use opencv::{
    core::{Mat, Size},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, CAP_PROP_BUFFERSIZE, CAP_PROP_FRAME_WIDTH},
};
use std::time::Duration;

use crate::config::CameraConfig;
use crate::{Error, Result};

const OPEN_ATTEMPTS: u32 = 3;
const OPEN_BACKOFF_BASE_MS: u64 = 250;

/// Video source: a live camera or a file
#[derive(Debug, Clone)]
pub enum VideoSource {
    Camera(i32),
    File(String),
}

/// One captured frame in BGR plus its grayscale projection
pub struct CapturedFrame {
    pub bgr: Mat,
    pub gray: Mat,
    pub width: u32,
    pub height: u32,
}

/// Webcam / video file wrapper
pub struct Camera {
    capture: VideoCapture,
    mirror: bool,
}

impl Camera {
    /// Open the source, retrying with exponential backoff.
    ///
    /// # Errors
    ///
    /// [`Error::CameraUnavailable`] after all attempts fail.
    pub fn open(source: &VideoSource, config: &CameraConfig) -> Result<Self> {
        let mut last_err = String::new();
        for attempt in 0..OPEN_ATTEMPTS {
            if attempt > 0 {
                let backoff = OPEN_BACKOFF_BASE_MS * (1u64 << (attempt - 1));
                warn!("camera open attempt {attempt} failed ({last_err}), retrying in {backoff} ms");
                std::thread::sleep(Duration::from_millis(backoff));
            }
            match Self::try_open(source, config) {
                Ok(camera) => return Ok(camera),
                Err(e) => last_err = e.to_string(),
            }
        }
        Err(Error::CameraUnavailable(format!(
            "{source:?} after {OPEN_ATTEMPTS} attempts: {last_err}"
        )))
    }

    fn try_open(source: &VideoSource, config: &CameraConfig) -> Result<Self> {
        let mut capture = match source {
            VideoSource::Camera(index) => {
                info!("Opening camera {index}");
                let mut cap = VideoCapture::new(*index, videoio::CAP_ANY)?;
                // buffer size 1 keeps latency low on webcams
                cap.set(CAP_PROP_BUFFERSIZE, 1.0)?;
                cap.set(CAP_PROP_FRAME_WIDTH, f64::from(config.frame_width))?;
                cap
            }
            VideoSource::File(path) => {
                info!("Opening video file: {path}");
                VideoCapture::from_file(path, videoio::CAP_ANY)?
            }
        };

        if !capture.is_opened()? {
            return Err(Error::CameraUnavailable(format!("{source:?} failed to open")));
        }

        // some backends only report a usable size after the first grab
        let mut probe = Mat::default();
        if !capture.read(&mut probe)? || probe.empty() {
            return Err(Error::CameraUnavailable(format!(
                "{source:?} opened but yields no frames"
            )));
        }

        Ok(Self {
            capture,
            mirror: config.mirror,
        })
    }

    /// Grab the next frame; `Ok(None)` marks end of a video file.
    pub fn read(&mut self) -> Result<Option<CapturedFrame>> {
        let mut bgr = Mat::default();
        if !self.capture.read(&mut bgr)? || bgr.empty() {
            return Ok(None);
        }

        if self.mirror {
            let mut flipped = Mat::default();
            opencv::core::flip(&bgr, &mut flipped, 1)?;
            bgr = flipped;
        }

        let mut gray = Mat::default();
        imgproc::cvt_color(&bgr, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;

        let size: Size = bgr.size()?;
        Ok(Some(CapturedFrame {
            width: size.width as u32,
            height: size.height as u32,
            bgr,
            gray,
        }))
    }
}
