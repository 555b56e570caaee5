#[macro_use]
extern crate criterion;
extern crate lidarzip;

use std::io::Cursor;

use criterion::Criterion;

use lidarzip::packers::Packable;
use lidarzip::point::{Point10, Point14};
use lidarzip::{compress_buffer, decompress_buffer, ItemKind, RecordSchema, SchemaBuilder};

/// A deterministic drifting scan, no test files needed.
fn synthetic_point10(count: usize) -> Vec<u8> {
    let mut raw = vec![0u8; count * Point10::SIZE];
    let mut point = Point10::default();
    let mut lcg = 0x2545_F491u32;
    for buf in raw.chunks_exact_mut(Point10::SIZE) {
        lcg = lcg.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        point.x = point.x.wrapping_add((lcg % 1000) as i32 - 500);
        point.y = point.y.wrapping_add((lcg >> 8) as i32 % 1000 - 500);
        point.z = point.z.wrapping_add((lcg >> 20) as i32 % 50);
        point.intensity = (lcg >> 16) as u16;
        point.pack_into(buf);
    }
    raw
}

fn synthetic_point14(count: usize) -> Vec<u8> {
    let mut raw = vec![0u8; count * Point14::SIZE];
    let mut point = Point14::default();
    let mut lcg = 0x9E37_79B9u32;
    let mut time = 100_000.0f64;
    for buf in raw.chunks_exact_mut(Point14::SIZE) {
        lcg = lcg.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        point.x = point.x.wrapping_add((lcg % 1000) as i32 - 500);
        point.y = point.y.wrapping_add((lcg >> 8) as i32 % 1000 - 500);
        point.z = point.z.wrapping_add((lcg >> 20) as i32 % 50);
        point.set_return_number(1);
        point.set_number_of_returns(1);
        time += 0.0002;
        point.gps_time = time;
        point.pack_into(buf);
    }
    raw
}

fn compressed(records: &[u8], schema: RecordSchema) -> Vec<u8> {
    let mut dst = Cursor::new(Vec::new());
    compress_buffer(&mut dst, records, schema).unwrap();
    dst.into_inner()
}

fn point10_v2_benchmark(c: &mut Criterion) {
    let schema = SchemaBuilder::new().item(ItemKind::Point10).build();
    let records = synthetic_point10(10_000);

    c.bench_function("point10_v2_compression", {
        let schema = schema.clone();
        let records = records.clone();
        move |b| b.iter(|| compressed(&records, schema.clone()))
    });

    let packed = compressed(&records, schema.clone());
    c.bench_function("point10_v2_decompression", move |b| {
        let mut out = vec![0u8; records.len()];
        b.iter(|| decompress_buffer(&packed, &mut out, schema.clone()).unwrap())
    });
}

fn point14_v3_benchmark(c: &mut Criterion) {
    let schema = SchemaBuilder::new().item(ItemKind::Point14).build();
    let records = synthetic_point14(10_000);

    let packed = compressed(&records, schema.clone());
    c.bench_function("point14_v3_decompression", move |b| {
        let mut out = vec![0u8; records.len()];
        b.iter(|| decompress_buffer(&packed, &mut out, schema.clone()).unwrap())
    });
}

criterion_group!(benches, point10_v2_benchmark, point14_v3_benchmark);
criterion_main!(benches);
