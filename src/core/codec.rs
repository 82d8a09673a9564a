//! Tokio codec for framing fragments over byte streams.
//!
//! Wraps [`Fragment`] encode/decode in the `tokio_util` `Encoder`/`Decoder`
//! traits so a transport can drive the framing layer through `Framed`.
//! Decoding is zero-copy: a complete fragment is split off the input
//! buffer, a partial one leaves the buffer untouched until more bytes
//! arrive.

use crate::config::MAX_PAYLOAD_SIZE;
use crate::core::fragment::Fragment;
use crate::error::PsrpError;
use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

pub struct FragmentCodec {
    max_payload_size: usize,
}

impl FragmentCodec {
    pub fn new() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }

    pub fn with_limit(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }
}

impl Default for FragmentCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FragmentCodec {
    type Item = Fragment;
    type Error = PsrpError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Fragment>, PsrpError> {
        Fragment::decode(src, self.max_payload_size)
    }
}

impl Encoder<Fragment> for FragmentCodec {
    type Error = PsrpError;

    fn encode(&mut self, item: Fragment, dst: &mut BytesMut) -> Result<(), PsrpError> {
        if item.data.len() > self.max_payload_size {
            return Err(PsrpError::OversizedFragment(item.data.len()));
        }
        dst.reserve(item.encoded_len());
        item.encode_into(dst);
        Ok(())
    }
}
