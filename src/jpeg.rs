//! One-shot encoding of a caller-supplied frame without a canvas.

use std::sync::Arc;

use crate::canvas::validate_size;
use crate::convert::PixelFormat;
use crate::encoder::{EncodeParams, Encoder};
use crate::error::{StackError, StackResult};
use crate::task::{EncodeTicket, TaskSpawner};

/// A single frame plus encode settings. The bytes are shared with any
/// background encode still reading them.
#[derive(Clone, Debug)]
pub struct Jpeg {
    data: Arc<Vec<u8>>,
    format: PixelFormat,
    width: usize,
    height: usize,
    params: EncodeParams,
}

impl Jpeg {
    /// Wrap a packed frame for encoding at `quality` in `[0, 100]`.
    pub fn new(
        data: Vec<u8>,
        width: i32,
        height: i32,
        quality: i32,
        format: PixelFormat,
    ) -> StackResult<Self> {
        let params = EncodeParams::new(quality, 0)?;
        let (width, height) = validate_size(width, height)?;
        // Length check only; the encoder is rebuilt for each call.
        Encoder::new(&data, width, height, format)?;
        Ok(Self {
            data: Arc::new(data),
            format,
            width,
            height,
            params,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn params(&self) -> EncodeParams {
        self.params
    }

    pub fn set_quality(&mut self, quality: i32) -> StackResult<()> {
        self.params.set_quality(quality)
    }

    pub fn set_smoothing(&mut self, smoothing: i32) -> StackResult<()> {
        self.params.set_smoothing(smoothing)
    }

    pub fn encode_sync(&self) -> StackResult<Vec<u8>> {
        encode_frame(&self.data, self.width, self.height, self.format, self.params)
    }

    pub fn encode_async<H>(&self, spawner: &TaskSpawner, handler: H) -> EncodeTicket
    where
        H: FnOnce(StackResult<Vec<u8>>) + Send + 'static,
    {
        let (width, height, format, params) = (self.width, self.height, self.format, self.params);
        spawner.spawn(
            Arc::clone(&self.data),
            move |data| encode_frame(data, width, height, format, params),
            handler,
        )
    }
}

fn encode_frame(
    data: &[u8],
    width: usize,
    height: usize,
    format: PixelFormat,
    params: EncodeParams,
) -> StackResult<Vec<u8>> {
    let mut encoder = Encoder::new(data, width, height, format)?.with_params(params);
    encoder.encode()?;
    encoder
        .into_jpeg()
        .ok_or_else(|| StackError::encode("encoder finished without output"))
}
