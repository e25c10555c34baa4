pub mod adts;
pub mod annexb;
pub mod codec_handler;
mod contract;
pub mod description;
pub mod id3;
pub mod sample_reader;
pub mod stream;

pub use adts::{AdtsHeader, AdtsReader, AdtsReaderOptions};
pub use annexb::{
    START_CODE, length_prefixed_to_annexb, parameter_sets_to_annexb, split_annexb, write_annexb,
};
pub use codec_handler::{
    AvcCodecHandler, CodecHandler, FRAME_RATE_SCALE, HevcCodecHandler, PassthroughCodecHandler,
    create_codec_handler,
};
pub use contract::{
    Codec, DemuxError, NaluLengthSize, Result, SampleFormat, StreamInfo, make_fourcc,
};
pub use description::{
    AvcSampleDescription, HevcSampleDescription, ParameterSetArray, SampleDescription,
};
pub use sample_reader::{AdtsSampleReader, ReadOutcome, Sample, SampleReader, rescale_90k};
pub use stream::ByteStream;
