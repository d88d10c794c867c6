pub mod compression;
pub mod glob;
pub mod input;

pub use compression::{
    CodecRegistry, Compression, CompressionCodec, FinishWrite, InputReader, OutputWriter,
};
pub use input::{InputFile, open_inputs};
