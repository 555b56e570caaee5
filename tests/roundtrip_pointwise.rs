//! Round trips for the pointwise (v1/v2) codecs.

use std::io::Cursor;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use lidarzip::packers::Packable;
use lidarzip::point::{GpsTime, Point10, Rgb, Wavepacket};
use lidarzip::{compress_buffer, decompress_buffer, ItemKind, RecordSchema, SchemaBuilder};

fn roundtrip(schema: RecordSchema, records: &[u8]) {
    let mut dst = Cursor::new(Vec::new());
    compress_buffer(&mut dst, records, schema.clone()).unwrap();
    let compressed = dst.into_inner();

    let mut decompressed = vec![0u8; records.len()];
    decompress_buffer(&compressed, &mut decompressed, schema).unwrap();
    assert_eq!(&decompressed[..], records);
}

fn point10_schema(version: u16) -> RecordSchema {
    SchemaBuilder::new()
        .item_with_version(ItemKind::Point10, version)
        .chunk_size(64)
        .build()
}

fn pack_points(points: &[Point10]) -> Vec<u8> {
    let mut raw = vec![0u8; points.len() * Point10::SIZE];
    for (point, buf) in points.iter().zip(raw.chunks_exact_mut(Point10::SIZE)) {
        point.pack_into(buf);
    }
    raw
}

fn random_walk_points(count: usize, seed: u64) -> Vec<Point10> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut point = Point10::default();
    let mut points = Vec::with_capacity(count);
    for _ in 0..count {
        point.x = point.x.wrapping_add(rng.gen_range(-500..500));
        point.y = point.y.wrapping_add(rng.gen_range(-500..500));
        point.z = point.z.wrapping_add(rng.gen_range(-50..50));
        if rng.gen_bool(0.3) {
            point.intensity = rng.gen();
        }
        if rng.gen_bool(0.2) {
            point.return_number = rng.gen_range(0..8);
            point.number_of_returns = rng.gen_range(0..8);
            point.scan_direction_flag = rng.gen();
            point.edge_of_flight_line = rng.gen();
        }
        if rng.gen_bool(0.1) {
            point.classification = rng.gen();
            point.user_data = rng.gen();
        }
        if rng.gen_bool(0.15) {
            point.scan_angle_rank = rng.gen();
            point.point_source_id = rng.gen();
        }
        points.push(point);
    }
    points
}

#[test]
fn point10_random_walk() {
    let raw = pack_points(&random_walk_points(300, 1));
    roundtrip(point10_schema(1), &raw);
    roundtrip(point10_schema(2), &raw);
}

#[test]
fn point10_duplicate_records() {
    let mut point = Point10::default();
    point.x = 1234;
    point.y = -42;
    point.intensity = 77;
    let raw = pack_points(&vec![point; 200]);
    roundtrip(point10_schema(1), &raw);
    roundtrip(point10_schema(2), &raw);
}

#[test]
fn point10_maximal_deltas() {
    let mut points = Vec::new();
    for i in 0..100 {
        let extreme = i % 2 == 0;
        let mut point = Point10::default();
        point.x = if extreme { i32::min_value() } else { i32::max_value() };
        point.y = if extreme { i32::max_value() } else { i32::min_value() };
        point.z = if extreme { 0 } else { i32::max_value() };
        point.intensity = if extreme { 0 } else { u16::max_value() };
        point.scan_angle_rank = if extreme { i8::min_value() } else { i8::max_value() };
        point.point_source_id = if extreme { 0 } else { u16::max_value() };
        points.push(point);
    }
    roundtrip(point10_schema(1), &pack_points(&points));
    roundtrip(point10_schema(2), &pack_points(&points));
}

#[test]
fn point10_alternating_signs() {
    let mut points = Vec::new();
    let mut point = Point10::default();
    for i in 0i32..200 {
        let delta = if i % 2 == 0 { 1000 } else { -1000 };
        point.x = point.x.wrapping_add(delta);
        point.y = point.y.wrapping_add(-delta);
        point.z = point.z.wrapping_add(delta / 2);
        points.push(point);
    }
    roundtrip(point10_schema(1), &pack_points(&points));
    roundtrip(point10_schema(2), &pack_points(&points));
}

fn format1_schema(version: u16) -> RecordSchema {
    SchemaBuilder::new()
        .item_with_version(ItemKind::Point10, version)
        .item_with_version(ItemKind::GpsTime, version)
        .chunk_size(128)
        .build()
}

fn pack_format1(points: &[Point10], times: &[f64]) -> Vec<u8> {
    let record_size = Point10::SIZE + 8;
    let mut raw = vec![0u8; points.len() * record_size];
    for ((point, time), buf) in points
        .iter()
        .zip(times)
        .zip(raw.chunks_exact_mut(record_size))
    {
        point.pack_into(&mut buf[..Point10::SIZE]);
        GpsTime::from_f64(*time).pack_into(&mut buf[Point10::SIZE..]);
    }
    raw
}

#[test]
fn gps_time_regular_pulses() {
    let points = random_walk_points(256, 2);
    let times: Vec<f64> = (0..256).map(|i| 100_000.0 + i as f64 * 0.000_5).collect();
    let raw = pack_format1(&points, &times);
    roundtrip(format1_schema(1), &raw);
    roundtrip(format1_schema(2), &raw);
}

#[test]
fn gps_time_interleaved_sequences_and_jumps() {
    let points = random_walk_points(300, 3);
    let times: Vec<f64> = (0..300)
        .map(|i| match i % 3 {
            // two interleaved time bases plus occasional huge jumps
            0 => 1_000.0 + i as f64 * 0.01,
            1 => 900_000.0 + i as f64 * 0.25,
            _ => {
                if i % 30 == 2 {
                    i as f64 * 1.0e12
                } else {
                    1_000.0 + i as f64 * 0.01
                }
            }
        })
        .collect();
    let raw = pack_format1(&points, &times);
    roundtrip(format1_schema(1), &raw);
    roundtrip(format1_schema(2), &raw);
}

#[test]
fn gps_time_constant() {
    let points = random_walk_points(100, 4);
    let times = vec![123.456f64; 100];
    let raw = pack_format1(&points, &times);
    roundtrip(format1_schema(1), &raw);
    roundtrip(format1_schema(2), &raw);
}

fn format3_schema(version: u16) -> RecordSchema {
    SchemaBuilder::new()
        .item_with_version(ItemKind::Point10, version)
        .item_with_version(ItemKind::GpsTime, version)
        .item_with_version(ItemKind::Rgb12, version)
        .chunk_size(100)
        .build()
}

#[test]
fn colors_random_and_grayscale() {
    let mut rng = StdRng::seed_from_u64(5);
    let points = random_walk_points(250, 6);
    let record_size = Point10::SIZE + 8 + Rgb::SIZE;
    let mut raw = vec![0u8; points.len() * record_size];
    for (i, (point, buf)) in points
        .iter()
        .zip(raw.chunks_exact_mut(record_size))
        .enumerate()
    {
        point.pack_into(&mut buf[..20]);
        GpsTime::from_f64(i as f64 * 0.01).pack_into(&mut buf[20..28]);
        let rgb = if i % 10 < 5 {
            // grayscale run
            let v = rng.gen::<u8>() as u16;
            Rgb {
                red: v,
                green: v,
                blue: v,
            }
        } else {
            Rgb {
                red: rng.gen(),
                green: rng.gen(),
                blue: rng.gen(),
            }
        };
        rgb.pack_into(&mut buf[28..34]);
    }
    roundtrip(format3_schema(1), &raw);
    roundtrip(format3_schema(2), &raw);
}

#[test]
fn extra_bytes_roundtrip() {
    let mut rng = StdRng::seed_from_u64(7);
    let points = random_walk_points(200, 8);
    let record_size = Point10::SIZE + 5;
    let mut raw = vec![0u8; points.len() * record_size];
    let mut extra = [0u8; 5];
    for (point, buf) in points.iter().zip(raw.chunks_exact_mut(record_size)) {
        point.pack_into(&mut buf[..20]);
        // slowly drifting extra payload
        for byte in extra.iter_mut() {
            if rng.gen_bool(0.4) {
                *byte = byte.wrapping_add(rng.gen_range(0..4));
            }
        }
        buf[20..].copy_from_slice(&extra);
    }
    for version in [1u16, 2u16].iter() {
        let schema = SchemaBuilder::new()
            .item_with_version(ItemKind::Point10, *version)
            .item_with_version(ItemKind::Byte(5), *version)
            .chunk_size(64)
            .build();
        roundtrip(schema, &raw);
    }
}

#[test]
fn wavepacket_roundtrip() {
    let mut rng = StdRng::seed_from_u64(9);
    let points = random_walk_points(150, 10);
    let record_size = Point10::SIZE + 8 + Wavepacket::SIZE;
    let mut raw = vec![0u8; points.len() * record_size];
    let mut offset = 0u64;
    let mut previous_size = 0u32;
    for (i, (point, buf)) in points
        .iter()
        .zip(raw.chunks_exact_mut(record_size))
        .enumerate()
    {
        point.pack_into(&mut buf[..20]);
        GpsTime::from_f64(i as f64 * 0.002).pack_into(&mut buf[20..28]);

        // most packets sit right after the previous one
        offset = match i % 7 {
            0 => offset,
            6 => rng.gen::<u64>() >> 8,
            _ => offset + u64::from(previous_size),
        };
        previous_size = 256 + (i as u32 % 3) * 128;
        let packet = Wavepacket {
            descriptor_index: (i % 4) as u8,
            offset,
            size: previous_size,
            return_point: i as f32 * 0.5,
            dx: 0.001,
            dy: -0.001,
            dz: 0.999 + (i % 2) as f32 * 0.001,
        };
        packet.pack_into(&mut buf[28..]);
    }
    let schema = SchemaBuilder::new()
        .item_with_version(ItemKind::Point10, 1)
        .item_with_version(ItemKind::GpsTime, 1)
        .item_with_version(ItemKind::Wavepacket13, 1)
        .chunk_size(50)
        .build();
    roundtrip(schema, &raw);

    let schema = SchemaBuilder::for_point_format(4, 0).unwrap().build();
    roundtrip(schema, &raw);
}

#[test]
fn single_point_stream() {
    let raw = pack_points(&random_walk_points(1, 11));
    roundtrip(point10_schema(2), &raw);
}
