//! `SoftwareRenderer`: a CPU-only `Renderer` that copies each drawn frame
//! into an owned buffer rather than presenting to a window. Used by tests
//! and for headless frame export (`save_png`); an on-screen renderer is an
//! application concern and lives outside this crate.

use std::io::BufWriter;
use std::path::Path;

use vstream_core::external::Renderer;
use vstream_core::frame::{FramePayload, VideoFrame};
use vstream_core::{EngineError, EngineResult};

pub struct SoftwareRenderer {
    width: u32,
    height: u32,
    buffer: Vec<u8>,
}

impl SoftwareRenderer {
    pub fn new() -> Self {
        SoftwareRenderer { width: 0, height: 0, buffer: Vec::new() }
    }

    /// The most recently drawn frame, packed RGBA8, row-major.
    pub fn frame_buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Writes the current buffer out as an 8-bit RGB PNG, dropping the
    /// alpha channel. Intended for scrub/export tooling, not the live
    /// playback path.
    pub fn save_png(&self, path: impl AsRef<Path>) -> EngineResult<()> {
        if self.buffer.is_empty() {
            return Err(EngineError::InvalidArgument("no frame drawn yet".into()));
        }
        let file = std::fs::File::create(path.as_ref()).map_err(|e| EngineError::device_error_with_source(e.to_string(), e))?;
        let writer = &mut BufWriter::new(file);
        let mut encoder = png::Encoder::new(writer, self.width, self.height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut png_writer = encoder.write_header().map_err(|e| EngineError::device_error_with_source(e.to_string(), e))?;

        let rgb: Vec<u8> = self.buffer.chunks_exact(4).flat_map(|px| [px[0], px[1], px[2]]).collect();
        png_writer.write_image_data(&rgb).map_err(|e| EngineError::device_error_with_source(e.to_string(), e))?;
        Ok(())
    }
}

impl Default for SoftwareRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for SoftwareRenderer {
    fn init(&mut self, width: u32, height: u32, _title: &str) -> EngineResult<()> {
        self.width = width;
        self.height = height;
        self.buffer = vec![0u8; width as usize * height as usize * 4];
        Ok(())
    }

    fn draw(&mut self, frame: &VideoFrame) -> EngineResult<()> {
        let FramePayload::Software { planes, .. } = frame.kind.data().ok_or_else(|| EngineError::InvalidData("draw called with a non-data frame".into()))? else {
            return Err(EngineError::device_error("software renderer cannot consume a hardware frame"));
        };
        let Some(plane) = planes.first() else {
            return Err(EngineError::InvalidData("video frame has no planes".into()));
        };

        if frame.width != self.width || frame.height != self.height {
            self.resize(frame.width, frame.height)?;
        }
        self.buffer.copy_from_slice(&plane[..self.buffer.len().min(plane.len())]);
        Ok(())
    }

    fn present(&mut self) -> EngineResult<()> {
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> EngineResult<()> {
        self.width = width;
        self.height = height;
        self.buffer = vec![0u8; width as usize * height as usize * 4];
        Ok(())
    }

    fn shutdown(&mut self) {
        self.buffer.clear();
    }
}
