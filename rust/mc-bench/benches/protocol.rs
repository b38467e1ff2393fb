use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mc_features::F;
use mc_infer::codec::{
    decode_request_v1, decode_response_v1, encode_request_v1, encode_response_v1,
};
use mc_infer::protocol::{PredictRequestV1, PredictResponseV1, FEATURE_SCHEMA_ID_V1};

const BATCH: u32 = 50;
const N: u32 = 200;

fn make_request() -> PredictRequestV1 {
    PredictRequestV1 {
        request_id: 123,
        model_id: 0,
        feature_schema_id: FEATURE_SCHEMA_ID_V1,
        batch: BATCH,
        n_vertices: N,
        n_features: F as u32,
        observations: vec![0.1f32; (BATCH * N) as usize * F],
    }
}

fn make_response() -> PredictResponseV1 {
    PredictResponseV1 {
        request_id: 123,
        batch: BATCH,
        n_vertices: N,
        q_values: vec![0.0f32; (BATCH * N) as usize],
    }
}

fn bench_codec(c: &mut Criterion) {
    let req = make_request();
    let resp = make_response();

    c.bench_function("mc_infer_encode_request_v1", |b| {
        b.iter(|| black_box(encode_request_v1(black_box(&req))))
    });

    let req_bytes = encode_request_v1(&req);
    c.bench_function("mc_infer_decode_request_v1", |b| {
        b.iter(|| black_box(decode_request_v1(black_box(&req_bytes)).unwrap()))
    });

    c.bench_function("mc_infer_encode_response_v1", |b| {
        b.iter(|| black_box(encode_response_v1(black_box(&resp))))
    });

    let resp_bytes = encode_response_v1(&resp);
    c.bench_function("mc_infer_decode_response_v1", |b| {
        b.iter(|| black_box(decode_response_v1(black_box(&resp_bytes)).unwrap()))
    });
}

criterion_group!(benches, bench_codec);
criterion_main!(benches);
