use bytes::{BufMut, Bytes, BytesMut};
use criterion::measurement::WallTime;
use criterion::{criterion_main, BenchmarkGroup, Criterion};
use webrtc_av1_rtp::av1::depayloader::{Depayloader, RtpMeta};
use webrtc_av1_rtp::av1::leb128;
use webrtc_av1_rtp::av1::payloader::Payloader;
use webrtc_av1_rtp::av1::obu::OBU_HAS_SIZE_BIT;
use webrtc_av1_rtp::config::{DepayloaderConfig, HeaderMode, PayloaderConfig};
use webrtc_av1_rtp::telemetry::Sink;

fn encode_obu(obu_type: u8, payload: &[u8]) -> Bytes {
    let mut out = BytesMut::new();
    out.put_u8((obu_type << 3) | OBU_HAS_SIZE_BIT);
    leb128::encode(payload.len() as u64, &mut out);
    out.put_slice(payload);
    out.freeze()
}

fn benchmark_leb128(g: &mut BenchmarkGroup<WallTime>) {
    let mut encoded = BytesMut::new();
    leb128::encode(123_456_789, &mut encoded);
    let encoded = encoded.freeze();

    g.bench_function("leb128_encode", |b| {
        b.iter(|| {
            let mut out = BytesMut::new();
            leb128::encode(123_456_789, &mut out);
        })
    });

    g.bench_function("leb128_decode", |b| {
        b.iter(|| {
            let _ = leb128::decode(&encoded).unwrap();
        })
    });
}

fn benchmark_payloader(g: &mut BenchmarkGroup<WallTime>) {
    let au = encode_obu(6, &[0x42u8; 4000]);
    let payloader = Payloader::new(PayloaderConfig::new(1200, 96, HeaderMode::Spec));

    g.bench_function("payloader_fragment_4k_obu", |b| {
        b.iter(|| {
            let mut sink: Sink<'_> = None;
            let _ = payloader.fragment(&au, &mut sink);
        })
    });
}

fn benchmark_depayloader(g: &mut BenchmarkGroup<WallTime>) {
    let au = encode_obu(6, &[0x42u8; 4000]);
    let payloader = Payloader::new(PayloaderConfig::new(1200, 96, HeaderMode::Spec));
    let mut sink: Sink<'_> = None;
    let packets = payloader.fragment(&au, &mut sink);

    g.bench_function("depayloader_reassemble_4k_obu", |b| {
        b.iter(|| {
            let mut dep = Depayloader::new(DepayloaderConfig::default());
            let mut sink: Sink<'_> = None;
            for (i, (bytes, marker)) in packets.iter().enumerate() {
                let meta = RtpMeta {
                    marker: *marker,
                    sequence_number: Some(i as u16 + 1),
                    timestamp: Some(1_000),
                    payload_type: 96,
                    ssrc: 1,
                };
                let _ = dep.handle_packet(bytes, meta, &mut sink);
            }
        })
    });
}

fn benches() {
    let mut c = Criterion::default().configure_from_args();
    let mut g = c.benchmark_group("AV1");

    benchmark_leb128(&mut g);
    benchmark_payloader(&mut g);
    benchmark_depayloader(&mut g);

    g.finish();
}

criterion_main!(benches);
