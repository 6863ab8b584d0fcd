//! LDR and two-phase HDR screenshot capture.
//!
//! An LDR capture reads the presentable image once and writes PNG and/or
//! JPEG. An HDR capture needs two consecutive frames: the copy stage first
//! writes the low byte of every half-precision channel, then the high byte,
//! and the planes are recombined into floats. Accumulation is held between
//! the two frames, so both planes come from the same average.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::hdr::HdrEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};

use crate::accumulation::CaptureByte;

pub const JPEG_QUALITY: u8 = 70;

/// Pixel layout of a read-back presentable image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Bgra8,
    Rgba8,
    /// 2-bit alpha, red in the high bits.
    A2R10G10B10,
    /// 2-bit alpha, blue in the high bits.
    A2B10G10R10,
}

/// Host-visible copy of a presentable image. Rows are `row_pitch` bytes
/// apart; each pixel occupies four bytes.
#[derive(Debug, Clone)]
pub struct StagingImage {
    pub format: SourceFormat,
    pub width: u32,
    pub height: u32,
    pub row_pitch: usize,
    pub data: Vec<u8>,
}

/// Provides images for capture. Implemented by the presentation backend.
pub trait ImageSource {
    /// Blocks until all submitted GPU work has finished.
    fn wait_idle(&mut self) -> anyhow::Result<()>;
    fn read_image(&mut self, image_index: usize) -> anyhow::Result<StagingImage>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CaptureRejected {
    #[error("a screenshot is already pending")]
    Pending,
    #[error("Cannot mix LDR and HDR screenshots.")]
    MixedDynamicRange,
    #[error("no screenshot path given")]
    Empty,
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to read back the presentable image: {0:#}")]
    Readback(anyhow::Error),
    #[error("row pitch {pitch} is not a multiple of 4 or shorter than {width} pixels")]
    RowPitch { pitch: usize, width: u32 },
    #[error("staging image holds {actual} bytes, expected at least {expected}")]
    Truncated { expected: usize, actual: usize },
    #[error("HDR byte planes differ in size ({low} vs {high})")]
    PlaneMismatch { low: usize, high: usize },
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Low bytes of an HDR capture, kept until the high bytes arrive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LowBytePlane {
    width: u32,
    height: u32,
    rgb: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CapturePhase {
    #[default]
    Idle,
    Ldr {
        png: Option<PathBuf>,
        jpg: Option<PathBuf>,
    },
    HdrLow {
        path: PathBuf,
    },
    HdrHigh {
        path: PathBuf,
        low: LowBytePlane,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureProgress {
    Idle,
    /// The low plane is stored; the next frame must write the high plane.
    AwaitingHighBytes,
    Completed(Vec<PathBuf>),
    /// The capture was abandoned and the state returned to idle.
    Failed,
}

#[derive(Debug, Default)]
pub struct ScreenshotCapture {
    phase: CapturePhase,
}

impl ScreenshotCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> &CapturePhase {
        &self.phase
    }

    pub fn is_idle(&self) -> bool {
        self.phase == CapturePhase::Idle
    }

    /// Byte plane the copy stage must write for the next frame.
    pub fn capture_byte(&self) -> CaptureByte {
        match self.phase {
            CapturePhase::HdrLow { .. } => CaptureByte::Low,
            CapturePhase::HdrHigh { .. } => CaptureByte::High,
            CapturePhase::Idle | CapturePhase::Ldr { .. } => CaptureByte::None,
        }
    }

    /// Schedules a capture of the next rendered frame. Rejected requests
    /// leave the pending capture untouched.
    pub fn request(
        &mut self,
        png: Option<PathBuf>,
        jpg: Option<PathBuf>,
        hdr: Option<PathBuf>,
    ) -> Result<(), CaptureRejected> {
        let result = self.try_request(png, jpg, hdr);
        if let Err(rejected) = &result {
            tracing::warn!(reason = %rejected, "screenshot request ignored");
        }
        result
    }

    fn try_request(
        &mut self,
        png: Option<PathBuf>,
        jpg: Option<PathBuf>,
        hdr: Option<PathBuf>,
    ) -> Result<(), CaptureRejected> {
        if !self.is_idle() {
            return Err(CaptureRejected::Pending);
        }
        self.phase = match (png, jpg, hdr) {
            (None, None, None) => return Err(CaptureRejected::Empty),
            (None, None, Some(path)) => CapturePhase::HdrLow { path },
            (png, jpg, None) => CapturePhase::Ldr { png, jpg },
            _ => return Err(CaptureRejected::MixedDynamicRange),
        };
        Ok(())
    }

    /// Handles the frame just submitted into `image_index`. Errors are
    /// logged and abandon the capture; rendering continues.
    pub fn process_frame<S>(&mut self, source: &mut S, image_index: usize) -> CaptureProgress
    where
        S: ImageSource + ?Sized,
    {
        if self.is_idle() {
            return CaptureProgress::Idle;
        }
        match self.advance(source, image_index) {
            Ok(progress) => progress,
            Err(err) => {
                tracing::warn!(error = %err, "screenshot failed");
                self.phase = CapturePhase::Idle;
                CaptureProgress::Failed
            }
        }
    }

    fn advance<S>(&mut self, source: &mut S, image_index: usize) -> Result<CaptureProgress, CaptureError>
    where
        S: ImageSource + ?Sized,
    {
        source.wait_idle().map_err(CaptureError::Readback)?;
        let staged = source.read_image(image_index).map_err(CaptureError::Readback)?;
        let rgb = decode_rgb8(&staged)?;

        match std::mem::take(&mut self.phase) {
            CapturePhase::Idle => Ok(CaptureProgress::Idle),
            CapturePhase::Ldr { png, jpg } => {
                let mut written = Vec::new();
                if let Some(path) = png {
                    write_png(&path, &rgb, staged.width, staged.height)?;
                    written.push(path);
                }
                if let Some(path) = jpg {
                    write_jpeg(&path, &rgb, staged.width, staged.height)?;
                    written.push(path);
                }
                for path in &written {
                    tracing::info!(path = %path.display(), "screenshot saved");
                }
                Ok(CaptureProgress::Completed(written))
            }
            CapturePhase::HdrLow { path } => {
                self.phase = CapturePhase::HdrHigh {
                    path,
                    low: LowBytePlane {
                        width: staged.width,
                        height: staged.height,
                        rgb,
                    },
                };
                Ok(CaptureProgress::AwaitingHighBytes)
            }
            CapturePhase::HdrHigh { path, low } => {
                if low.rgb.len() != rgb.len() || (low.width, low.height) != (staged.width, staged.height) {
                    return Err(CaptureError::PlaneMismatch {
                        low: low.rgb.len(),
                        high: rgb.len(),
                    });
                }
                let values = combine_half_planes(&low.rgb, &rgb);
                write_hdr(&path, &values, staged.width, staged.height)?;
                tracing::info!(path = %path.display(), "HDR screenshot saved");
                Ok(CaptureProgress::Completed(vec![path]))
            }
        }
    }
}

/// Converts a staging image into tightly packed RGB8, swapping channels and
/// truncating 10-bit channels to their top 8 bits as the format requires.
pub fn decode_rgb8(image: &StagingImage) -> Result<Vec<u8>, CaptureError> {
    let width = image.width as usize;
    let height = image.height as usize;
    let row_bytes = width * 4;
    if image.row_pitch % 4 != 0 || image.row_pitch < row_bytes {
        return Err(CaptureError::RowPitch {
            pitch: image.row_pitch,
            width: image.width,
        });
    }
    let expected = if height == 0 {
        0
    } else {
        image.row_pitch * (height - 1) + row_bytes
    };
    if image.data.len() < expected {
        return Err(CaptureError::Truncated {
            expected,
            actual: image.data.len(),
        });
    }

    let mut rgb = Vec::with_capacity(width * height * 3);
    for row in 0..height {
        let start = row * image.row_pitch;
        for pixel in image.data[start..start + row_bytes].chunks_exact(4) {
            let word = u32::from_le_bytes([pixel[0], pixel[1], pixel[2], pixel[3]]);
            let ten = |shift: u32| ((word >> shift) & 0x3ff) >> 2;
            let out = match image.format {
                SourceFormat::Bgra8 => [pixel[2], pixel[1], pixel[0]],
                SourceFormat::Rgba8 => [pixel[0], pixel[1], pixel[2]],
                SourceFormat::A2R10G10B10 => [ten(20) as u8, ten(10) as u8, ten(0) as u8],
                SourceFormat::A2B10G10R10 => [ten(0) as u8, ten(10) as u8, ten(20) as u8],
            };
            rgb.extend_from_slice(&out);
        }
    }
    Ok(rgb)
}

/// Recombines byte planes into the half-precision bit pattern
/// `low | high << 8` of every channel and widens it to `f32`.
pub fn combine_half_planes(low: &[u8], high: &[u8]) -> Vec<f32> {
    low.iter()
        .zip(high)
        .map(|(&l, &h)| half::f16::from_bits(u16::from(l) | (u16::from(h) << 8)).to_f32())
        .collect()
}

fn create_output(path: &Path) -> Result<BufWriter<File>, CaptureError> {
    let io_error = |source| CaptureError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    File::create(path).map(BufWriter::new).map_err(io_error)
}

fn finish(path: &Path, mut writer: BufWriter<File>) -> Result<(), CaptureError> {
    writer.flush().map_err(|source| CaptureError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_png(path: &Path, rgb: &[u8], width: u32, height: u32) -> Result<(), CaptureError> {
    let mut writer = create_output(path)?;
    PngEncoder::new(&mut writer)
        .write_image(rgb, width, height, ExtendedColorType::Rgb8)
        .map_err(|source| CaptureError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
    finish(path, writer)
}

fn write_jpeg(path: &Path, rgb: &[u8], width: u32, height: u32) -> Result<(), CaptureError> {
    let mut writer = create_output(path)?;
    JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY)
        .write_image(rgb, width, height, ExtendedColorType::Rgb8)
        .map_err(|source| CaptureError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
    finish(path, writer)
}

fn write_hdr(path: &Path, values: &[f32], width: u32, height: u32) -> Result<(), CaptureError> {
    let mut writer = create_output(path)?;
    HdrEncoder::new(&mut writer)
        .write_image(
            bytemuck::cast_slice(values),
            width,
            height,
            ExtendedColorType::Rgb32F,
        )
        .map_err(|source| CaptureError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
    finish(path, writer)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource {
        image: StagingImage,
        reads: usize,
    }

    impl ImageSource for FixedSource {
        fn wait_idle(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        fn read_image(&mut self, _image_index: usize) -> anyhow::Result<StagingImage> {
            self.reads += 1;
            Ok(self.image.clone())
        }
    }

    fn solid(format: SourceFormat, pixel: [u8; 4]) -> StagingImage {
        let (width, height) = (2u32, 2u32);
        let row_pitch = 12;
        let mut data = vec![0u8; row_pitch * height as usize];
        for row in 0..height as usize {
            for column in 0..width as usize {
                let at = row * row_pitch + column * 4;
                data[at..at + 4].copy_from_slice(&pixel);
            }
        }
        StagingImage {
            format,
            width,
            height,
            row_pitch,
            data,
        }
    }

    #[test]
    fn half_planes_recombine() {
        assert_eq!(combine_half_planes(&[0x00], &[0x3c]), vec![1.0]);
        assert_eq!(combine_half_planes(&[0x00, 0x00], &[0xc0, 0x00]), vec![-2.0, 0.0]);
    }

    #[test]
    fn decodes_swizzled_and_packed_formats() {
        let bgra = solid(SourceFormat::Bgra8, [10, 20, 30, 255]);
        assert_eq!(&decode_rgb8(&bgra).expect("decode")[..3], &[30, 20, 10]);

        let rgba = solid(SourceFormat::Rgba8, [10, 20, 30, 255]);
        assert_eq!(&decode_rgb8(&rgba).expect("decode")[..3], &[10, 20, 30]);

        let word: u32 = (3 << 30) | (0x3ff << 20) | (0x200 << 10) | 0x004;
        let packed = solid(SourceFormat::A2R10G10B10, word.to_le_bytes());
        assert_eq!(&decode_rgb8(&packed).expect("decode")[..3], &[0xff, 0x80, 0x01]);
        let swapped = solid(SourceFormat::A2B10G10R10, word.to_le_bytes());
        assert_eq!(&decode_rgb8(&swapped).expect("decode")[..3], &[0x01, 0x80, 0xff]);
    }

    #[test]
    fn row_padding_is_skipped_and_pitch_checked() {
        let image = solid(SourceFormat::Rgba8, [1, 2, 3, 4]);
        assert_eq!(decode_rgb8(&image).expect("decode").len(), 2 * 2 * 3);

        let odd = StagingImage {
            row_pitch: 10,
            ..image
        };
        assert!(matches!(decode_rgb8(&odd), Err(CaptureError::RowPitch { .. })));
    }

    #[test]
    fn overlapping_and_mixed_requests_are_rejected() {
        let mut capture = ScreenshotCapture::new();
        assert_eq!(
            capture.request(Some("a.png".into()), None, Some("a.hdr".into())),
            Err(CaptureRejected::MixedDynamicRange)
        );
        assert!(capture.is_idle());
        assert_eq!(capture.request(None, None, None), Err(CaptureRejected::Empty));

        capture
            .request(None, None, Some("a.hdr".into()))
            .expect("first request");
        let before = capture.phase().clone();
        assert_eq!(
            capture.request(Some("b.png".into()), None, None),
            Err(CaptureRejected::Pending)
        );
        assert_eq!(capture.phase(), &before);
        assert_eq!(capture.capture_byte(), CaptureByte::Low);
    }

    #[test]
    fn ldr_capture_writes_png_and_jpeg() {
        let dir = tempfile::tempdir().expect("tempdir");
        let png = dir.path().join("shots/frame.png");
        let jpg = dir.path().join("shots/frame.jpg");
        let mut source = FixedSource {
            image: solid(SourceFormat::Bgra8, [0, 128, 255, 255]),
            reads: 0,
        };
        let mut capture = ScreenshotCapture::new();
        capture
            .request(Some(png.clone()), Some(jpg.clone()), None)
            .expect("request");
        assert_eq!(capture.capture_byte(), CaptureByte::None);

        let progress = capture.process_frame(&mut source, 0);
        assert_eq!(progress, CaptureProgress::Completed(vec![png.clone(), jpg.clone()]));
        assert!(capture.is_idle());

        let decoded = image::open(&png).expect("png readable").to_rgb8();
        assert_eq!(decoded.get_pixel(1, 1).0, [255, 128, 0]);
        assert!(jpg.metadata().expect("jpeg written").len() > 0);
    }

    #[test]
    fn hdr_capture_spans_two_frames() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("frame.hdr");
        let mut capture = ScreenshotCapture::new();
        capture.request(None, None, Some(path.clone())).expect("request");

        let mut low = FixedSource {
            image: solid(SourceFormat::Rgba8, [0x00, 0x00, 0x00, 0xff]),
            reads: 0,
        };
        assert_eq!(capture.process_frame(&mut low, 0), CaptureProgress::AwaitingHighBytes);
        assert_eq!(capture.capture_byte(), CaptureByte::High);

        let mut high = FixedSource {
            image: solid(SourceFormat::Rgba8, [0x3c, 0x40, 0x00, 0xff]),
            reads: 0,
        };
        assert_eq!(
            capture.process_frame(&mut high, 1),
            CaptureProgress::Completed(vec![path.clone()])
        );
        assert!(capture.is_idle());

        let decoded = image::open(&path).expect("hdr readable").to_rgb32f();
        let pixel = decoded.get_pixel(0, 0).0;
        assert!((pixel[0] - 1.0).abs() < 1e-2);
        assert!((pixel[1] - 2.0).abs() < 2e-2);
        assert_eq!(pixel[2], 0.0);
    }

    #[test]
    fn failed_write_returns_to_idle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").expect("write blocker");
        let mut capture = ScreenshotCapture::new();
        capture
            .request(Some(blocker.join("nested.png")), None, None)
            .expect("request");
        let mut source = FixedSource {
            image: solid(SourceFormat::Rgba8, [0, 0, 0, 0]),
            reads: 0,
        };
        assert_eq!(capture.process_frame(&mut source, 0), CaptureProgress::Failed);
        assert!(capture.is_idle());
        assert_eq!(source.reads, 1);
    }
}
