mod ansi;
mod ring_bytes;

pub use ansi::strip_ansi;
pub use ring_bytes::RingBytes;
