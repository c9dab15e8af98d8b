pub mod demux;
pub mod fanout;
pub mod frame;
pub mod pipe;
pub mod processor;
pub mod source;

pub use fanout::FanoutWriter;
pub use frame::{FrameReader, FrameWriter, MAX_FRAME_LEN};
pub use pipe::{PipeReader, PipeWriter, pipe};
pub use processor::{AudioProcessor, ConversionHandle, ConversionReport, Prepared};
pub use source::{AudioSource, FrameSource};
