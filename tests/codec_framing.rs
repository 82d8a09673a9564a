//! Integration tests for the tokio-util fragment codec
//!
//! Validates buffer handling under partial reads, back-to-back fragments,
//! and a full Framed round-trip over an in-memory duplex transport.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use psrp_protocol::core::codec::FragmentCodec;
use psrp_protocol::core::fragment::{Defragmenter, Fragment, Fragmenter};
use psrp_protocol::protocol::message::{Destination, Message, MessageType};
use tokio_util::codec::{Decoder, Encoder, Framed};
use uuid::Uuid;

fn fragment(id: u64, data: &'static [u8]) -> Fragment {
    Fragment {
        object_id: 1,
        fragment_id: id,
        start: id == 0,
        end: false,
        data: Bytes::from_static(data),
    }
}

#[test]
fn test_decode_consumes_exactly_one_fragment() {
    let mut codec = FragmentCodec::new();
    let mut buf = BytesMut::new();

    codec.encode(fragment(0, b"first"), &mut buf).unwrap();
    codec.encode(fragment(1, b"second"), &mut buf).unwrap();

    let first = codec.decode(&mut buf).unwrap().unwrap();
    assert_eq!(&first.data[..], b"first");
    assert!(!buf.is_empty());

    let second = codec.decode(&mut buf).unwrap().unwrap();
    assert_eq!(&second.data[..], b"second");
    assert!(buf.is_empty());

    assert!(codec.decode(&mut buf).unwrap().is_none());
}

#[test]
fn test_incremental_buffer_fill() {
    let mut codec = FragmentCodec::new();
    let full = fragment(0, b"incremental payload").to_bytes();

    let mut buf = BytesMut::new();
    for (i, byte) in full.iter().enumerate() {
        buf.extend_from_slice(&[*byte]);
        let result = codec.decode(&mut buf).unwrap();

        if i < full.len() - 1 {
            assert!(result.is_none(), "decoded early at byte {i}");
        } else {
            let decoded = result.expect("complete fragment decodes");
            assert_eq!(&decoded.data[..], b"incremental payload");
            assert!(buf.is_empty());
        }
    }
}

#[test]
fn test_decode_is_zero_copy_split() {
    let mut codec = FragmentCodec::new();
    let mut buf = BytesMut::new();
    codec.encode(fragment(0, b"zero copy"), &mut buf).unwrap();

    let capacity = buf.capacity();
    let decoded = codec.decode(&mut buf).unwrap().unwrap();

    assert_eq!(&decoded.data[..], b"zero copy");
    assert_eq!(buf.len(), 0);
    assert!(buf.capacity() <= capacity);
}

#[tokio::test]
async fn test_framed_duplex_roundtrip() {
    let (client, server) = tokio::io::duplex(256);
    let mut sender = Framed::new(client, FragmentCodec::new());
    let mut receiver = Framed::new(server, FragmentCodec::new());

    let message = Message::new(
        Destination::Server,
        MessageType::CreatePipeline,
        Uuid::from_u128(42),
        Some(Uuid::from_u128(43)),
        Bytes::from_static(b"<Obj RefId=\"0\"><S>Get-Date</S></Obj>"),
    );

    let mut fragmenter = Fragmenter::new(64).unwrap();
    let fragments = fragmenter.fragment_message(&message);
    assert!(fragments.len() > 1);

    let expected = fragments.len();
    let send = async {
        for fragment in fragments {
            sender.send(fragment).await.unwrap();
        }
        sender.close().await.unwrap();
    };

    let receive = async {
        let mut defragmenter = Defragmenter::new();
        let mut received = None;
        let mut count = 0;
        while let Some(fragment) = receiver.next().await {
            let fragment = fragment.unwrap();
            count += 1;
            if let Some(done) = defragmenter.receive_message(fragment).unwrap() {
                received = Some(done);
            }
        }
        (count, received)
    };

    let ((), (count, received)) = tokio::join!(send, receive);
    assert_eq!(count, expected);
    assert_eq!(received.unwrap(), message);
}
