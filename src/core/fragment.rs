//! Message fragmentation and reassembly.
//!
//! A packed [`crate::protocol::message::Message`] is cut into size-bounded
//! fragments for transport. Each fragment carries a 21-byte big-endian
//! header:
//!
//! ```text
//! [ObjectId(8)] [FragmentId(8)] [Flags(1)] [Length(4)] [Payload(N)]
//! ```
//!
//! Fragment ids are dense per object, starting at 0; the first fragment
//! sets the start flag, the last sets the end flag, and a single-fragment
//! message sets both.

use crate::config::{FRAGMENT_HEADER_SIZE, MAX_PAYLOAD_SIZE};
use crate::error::{PsrpError, Result};
use crate::protocol::message::Message;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, trace};

const FLAG_START: u8 = 0x1;
const FLAG_END: u8 = 0x2;

/// One bounded-size chunk of a packed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub object_id: u64,
    pub fragment_id: u64,
    pub start: bool,
    pub end: bool,
    pub data: Bytes,
}

impl Fragment {
    /// Total encoded size, header included.
    pub fn encoded_len(&self) -> usize {
        FRAGMENT_HEADER_SIZE + self.data.len()
    }

    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u64(self.object_id);
        buf.put_u64(self.fragment_id);
        let mut flags = 0u8;
        if self.start {
            flags |= FLAG_START;
        }
        if self.end {
            flags |= FLAG_END;
        }
        buf.put_u8(flags);
        buf.put_u32(self.data.len() as u32);
        buf.put_slice(&self.data);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Decode one fragment from the front of `src`, leaving the buffer
    /// untouched when it does not yet hold a complete fragment.
    pub fn decode(src: &mut BytesMut, max_payload: usize) -> Result<Option<Fragment>> {
        if src.len() < FRAGMENT_HEADER_SIZE {
            return Ok(None);
        }

        let length =
            u32::from_be_bytes([src[17], src[18], src[19], src[20]]) as usize;
        if length > max_payload {
            return Err(PsrpError::OversizedFragment(length));
        }
        if src.len() < FRAGMENT_HEADER_SIZE + length {
            src.reserve(FRAGMENT_HEADER_SIZE + length - src.len());
            return Ok(None);
        }

        let object_id = src.get_u64();
        let fragment_id = src.get_u64();
        let flags = src.get_u8();
        let _length = src.get_u32();
        let data = src.split_to(length).freeze();

        Ok(Some(Fragment {
            object_id,
            fragment_id,
            start: flags & FLAG_START != 0,
            end: flags & FLAG_END != 0,
            data,
        }))
    }
}

/// Splits packed messages into fragments, one object id per message.
#[derive(Debug)]
pub struct Fragmenter {
    max_fragment_size: usize,
    next_object_id: u64,
}

impl Fragmenter {
    /// Fails fast when `max_fragment_size` cannot fit even the fragment
    /// header.
    pub fn new(max_fragment_size: usize) -> Result<Self> {
        if max_fragment_size <= FRAGMENT_HEADER_SIZE {
            return Err(PsrpError::BufferTooSmall {
                needed: FRAGMENT_HEADER_SIZE + 1,
                actual: max_fragment_size,
            });
        }
        Ok(Self {
            max_fragment_size,
            next_object_id: 0,
        })
    }

    /// Build a fragmenter from a validated [`CodecConfig`].
    pub fn from_config(config: &crate::config::CodecConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.max_fragment_size)
    }

    /// Cut one packed payload into an ordered fragment sequence sharing a
    /// fresh object id.
    pub fn fragment(&mut self, payload: &[u8]) -> Vec<Fragment> {
        let object_id = self.next_object_id;
        self.next_object_id += 1;

        let budget = self.max_fragment_size - FRAGMENT_HEADER_SIZE;
        let chunks: Vec<&[u8]> = if payload.is_empty() {
            vec![&[]]
        } else {
            payload.chunks(budget).collect()
        };
        let last = chunks.len() - 1;

        debug!(
            object_id,
            payload_len = payload.len(),
            fragments = chunks.len(),
            "fragmenting payload"
        );

        chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| Fragment {
                object_id,
                fragment_id: i as u64,
                start: i == 0,
                end: i == last,
                data: Bytes::copy_from_slice(chunk),
            })
            .collect()
    }

    /// Pack and fragment a message in one step.
    pub fn fragment_message(&mut self, message: &Message) -> Vec<Fragment> {
        self.fragment(&message.pack())
    }
}

#[derive(Default)]
struct Reassembly {
    next_fragment_id: u64,
    data: BytesMut,
}

/// Reassembles interleaved fragment streams, one buffer per object id.
///
/// State is scoped to one logical peer connection and must persist across
/// transport reads until each object completes. A sequence violation
/// discards only the offending object's buffer; other in-flight objects
/// are unaffected.
pub struct Defragmenter {
    buffers: HashMap<u64, Reassembly>,
    max_payload_size: usize,
}

impl Default for Defragmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Defragmenter {
    pub fn new() -> Self {
        Self {
            buffers: HashMap::new(),
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }

    pub fn with_limit(max_payload_size: usize) -> Self {
        Self {
            buffers: HashMap::new(),
            max_payload_size,
        }
    }

    /// Build a defragmenter from a validated [`CodecConfig`].
    pub fn from_config(config: &crate::config::CodecConfig) -> Self {
        Self::with_limit(config.max_payload_size)
    }

    /// Consume one fragment; returns the completed payload once the end
    /// fragment of an object arrives.
    ///
    /// Fragments for a given object must arrive in dense order from 0; an
    /// out-of-order id is a fatal protocol error for that object and its
    /// partial state is dropped, so a replay from fragment 0 can succeed.
    pub fn receive(&mut self, fragment: Fragment) -> Result<Option<Bytes>> {
        let (expected, buffered) = {
            let entry = self.buffers.entry(fragment.object_id).or_default();
            (entry.next_fragment_id, entry.data.len())
        };

        if fragment.fragment_id != expected {
            self.buffers.remove(&fragment.object_id);
            return Err(PsrpError::FragmentSequence {
                object_id: fragment.object_id,
                expected,
                actual: fragment.fragment_id,
            });
        }

        if buffered + fragment.data.len() > self.max_payload_size {
            self.buffers.remove(&fragment.object_id);
            return Err(PsrpError::OversizedFragment(buffered + fragment.data.len()));
        }

        if fragment.end {
            let mut complete = self
                .buffers
                .remove(&fragment.object_id)
                .map(|r| r.data)
                .unwrap_or_default();
            complete.extend_from_slice(&fragment.data);
            debug!(
                object_id = fragment.object_id,
                payload_len = complete.len(),
                "object reassembled"
            );
            return Ok(Some(complete.freeze()));
        }

        if let Some(entry) = self.buffers.get_mut(&fragment.object_id) {
            entry.next_fragment_id += 1;
            entry.data.extend_from_slice(&fragment.data);
        }
        trace!(
            object_id = fragment.object_id,
            fragment_id = fragment.fragment_id,
            "buffered fragment"
        );
        Ok(None)
    }

    /// Consume one fragment and unpack the completed message, if any.
    pub fn receive_message(&mut self, fragment: Fragment) -> Result<Option<Message>> {
        match self.receive(fragment)? {
            Some(payload) => Ok(Some(Message::unpack(&payload)?)),
            None => Ok(None),
        }
    }

    /// Number of objects currently mid-reassembly.
    pub fn pending(&self) -> usize {
        self.buffers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_header_layout() {
        let fragment = Fragment {
            object_id: 1,
            fragment_id: 2,
            start: true,
            end: true,
            data: Bytes::from_static(b"abc"),
        };
        let bytes = fragment.to_bytes();

        assert_eq!(bytes.len(), FRAGMENT_HEADER_SIZE + 3);
        assert_eq!(&bytes[..8], &[0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(&bytes[8..16], &[0, 0, 0, 0, 0, 0, 0, 2]);
        assert_eq!(bytes[16], 0x3);
        assert_eq!(&bytes[17..21], &[0, 0, 0, 3]);
        assert_eq!(&bytes[21..], b"abc");
    }

    #[test]
    fn test_fragmenter_rejects_tiny_budget() {
        assert!(matches!(
            Fragmenter::new(FRAGMENT_HEADER_SIZE),
            Err(PsrpError::BufferTooSmall { .. })
        ));
        assert!(Fragmenter::new(FRAGMENT_HEADER_SIZE + 1).is_ok());
    }

    #[test]
    fn test_single_fragment_sets_both_flags() {
        let mut fragmenter = Fragmenter::new(1024).unwrap();
        let fragments = fragmenter.fragment(b"small");

        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].start && fragments[0].end);
        assert_eq!(fragments[0].fragment_id, 0);
    }

    #[test]
    fn test_empty_payload_still_produces_one_fragment() {
        let mut fragmenter = Fragmenter::new(64).unwrap();
        let fragments = fragmenter.fragment(b"");

        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].start && fragments[0].end);
        assert!(fragments[0].data.is_empty());
    }

    #[test]
    fn test_object_ids_increment_per_message() {
        let mut fragmenter = Fragmenter::new(64).unwrap();
        assert_eq!(fragmenter.fragment(b"a")[0].object_id, 0);
        assert_eq!(fragmenter.fragment(b"b")[0].object_id, 1);
    }
}
