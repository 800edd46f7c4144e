//! Camera frames.
//!
//! The console never reaches into a video device directly. It is handed a
//! [`FrameSource`] and asks it for one encoded frame whenever the periodic
//! camera pump or a snapshot request needs one.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use crate::core::session::ImageFrame;
use crate::errors::DeviceError;

/// Side length of the synthetic cue frame.
pub const CUE_FRAME_SIZE: u32 = 64;

const CUE_JPEG_QUALITY: u8 = 80;

/// Produces encoded still frames on demand.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn capture(&self) -> Result<ImageFrame, DeviceError>;
}

/// Serves the same image file for every capture.
///
/// JPEG files are passed through untouched; any other format the `image`
/// crate can decode is re-encoded as JPEG.
#[derive(Debug, Clone)]
pub struct StillImageSource {
    path: PathBuf,
}

impl StillImageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FrameSource for StillImageSource {
    async fn capture(&self) -> Result<ImageFrame, DeviceError> {
        let data = tokio::fs::read(&self.path).await?;
        match image::guess_format(&data) {
            Ok(ImageFormat::Jpeg) => Ok(ImageFrame::jpeg(data)),
            Ok(_) => {
                let decoded = image::load_from_memory(&data)
                    .map_err(|e| DeviceError::Format(e.to_string()))?;
                Ok(ImageFrame::jpeg(encode_jpeg(&decoded)?))
            }
            Err(e) => Err(DeviceError::Format(format!(
                "{}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

/// Frame sent to nudge the agent after a long silence.
///
/// A small diagonal gradient; its content only has to be a valid image the
/// endpoint reacts to.
pub fn silence_cue_frame() -> Result<ImageFrame, DeviceError> {
    let scale = 255 / (CUE_FRAME_SIZE - 1).max(1);
    let img = RgbImage::from_fn(CUE_FRAME_SIZE, CUE_FRAME_SIZE, |x, y| {
        let r = (x * scale) as u8;
        let g = (y * scale) as u8;
        Rgb([r, g, 160])
    });
    Ok(ImageFrame::jpeg(encode_jpeg(&DynamicImage::ImageRgb8(img))?))
}

fn encode_jpeg(image: &DynamicImage) -> Result<Bytes, DeviceError> {
    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, CUE_JPEG_QUALITY);
    image
        .to_rgb8()
        .write_with_encoder(encoder)
        .map_err(|e| DeviceError::Format(e.to_string()))?;
    Ok(Bytes::from(buf.into_inner()))
}
