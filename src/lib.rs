pub mod buffer;
pub mod canvas;
pub mod convert;
mod encoder;
pub(crate) mod env_config;
pub mod error;
pub mod jpeg;
pub mod rect;
pub mod task;

use error::StackResult;

pub use buffer::PixelBuffer;
pub use canvas::{DynamicCanvas, DynamicEncoded, FixedCanvas};
pub use convert::PixelFormat;
pub use encoder::{DEFAULT_QUALITY, EncodeParams, Encoder, MAX_JPEG_DIMENSION};
pub use error::{StackError, StackErrorClass};
pub use jpeg::Jpeg;
pub use rect::{DirtyRectTracker, Rect};
pub use task::{
    EncodeExecutor, EncodeTicket, ExecutorConfig, ExecutorStats, ExecutorStatsSnapshot,
    TaskSpawner, TaskState,
};

/// Compress one packed frame at `quality` without keeping any state.
pub fn encode_once(
    data: &[u8],
    width: usize,
    height: usize,
    format: PixelFormat,
    quality: i32,
) -> StackResult<Vec<u8>> {
    let mut encoder =
        Encoder::new(data, width, height, format)?.with_params(EncodeParams::new(quality, 0)?);
    encoder.encode()?;
    encoder
        .into_jpeg()
        .ok_or_else(|| StackError::encode("encoder finished without output"))
}
