use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use psrp_protocol::core::codec::FragmentCodec;
use psrp_protocol::core::fragment::{Defragmenter, Fragmenter};
use psrp_protocol::core::object::PsObject;
use psrp_protocol::core::property::PsProperty;
use psrp_protocol::core::value::PsValue;
use psrp_protocol::protocol::{from_clixml, to_clixml};
use tokio_util::codec::Encoder;

#[allow(clippy::unwrap_used)]
fn bench_fragment_defragment(c: &mut Criterion) {
    let mut group = c.benchmark_group("fragment_defragment");
    let payload_sizes = [512usize, 4096, 65_536, 1024 * 1024];

    for &size in &payload_sizes {
        let payload = vec![0xABu8; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("fragment_{size}b"), |b| {
            b.iter_batched(
                || Fragmenter::new(32_768).unwrap(),
                |mut fragmenter| fragmenter.fragment(&payload),
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("defragment_{size}b"), |b| {
            let mut fragmenter = Fragmenter::new(32_768).unwrap();
            let fragments = fragmenter.fragment(&payload);
            b.iter_batched(
                || (Defragmenter::new(), fragments.clone()),
                |(mut defragmenter, fragments)| {
                    let mut completed = None;
                    for fragment in fragments {
                        completed = defragmenter.receive(fragment).unwrap();
                    }
                    assert!(completed.is_some());
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("codec_encode_{size}b"), |b| {
            let mut fragmenter = Fragmenter::new(32_768).unwrap();
            let fragments = fragmenter.fragment(&payload);
            b.iter_batched(
                || (FragmentCodec::new(), fragments.clone()),
                |(mut codec, fragments)| {
                    let mut buf = BytesMut::with_capacity(size + 1024);
                    for fragment in fragments {
                        codec.encode(fragment, &mut buf).unwrap();
                    }
                    buf
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_clixml_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("clixml_codec");

    let obj = PsObject::custom();
    for i in 0..32 {
        obj.add_member(
            PsProperty::note(format!("Property{i}"), PsValue::from(i64::from(i))),
            false,
        )
        .unwrap();
    }
    let value = PsValue::Object(obj);
    let xml = to_clixml(&value).unwrap();

    group.bench_function("serialize_32_properties", |b| {
        b.iter(|| to_clixml(&value).unwrap())
    });
    group.bench_function("deserialize_32_properties", |b| {
        b.iter(|| from_clixml(&xml).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_fragment_defragment, bench_clixml_codec);
criterion_main!(benches);
