//! Round trips and selective decompression for the layered (v3) codecs.

use std::io::Cursor;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use lidarzip::packers::Packable;
use lidarzip::point::{Nir, Point14, Rgb, Wavepacket};
use lidarzip::{
    compress_buffer, decompress_buffer, DecompressionSelection, ItemKind, PointReader,
    PointWriter, RecordSchema, SchemaBuilder,
};

fn roundtrip(schema: RecordSchema, records: &[u8]) {
    let mut dst = Cursor::new(Vec::new());
    compress_buffer(&mut dst, records, schema.clone()).unwrap();
    let compressed = dst.into_inner();

    let mut decompressed = vec![0u8; records.len()];
    decompress_buffer(&compressed, &mut decompressed, schema).unwrap();
    assert_eq!(&decompressed[..], records);
}

/// A plausible multi-channel scan: coordinates drift, the scanner channel
/// hops, GPS time advances in pulses shared by the returns of a shot.
fn scan_points(count: usize, channels: u8, seed: u64) -> Vec<Point14> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut points = Vec::with_capacity(count);
    let mut point = Point14::default();
    let mut time = 200_000.0f64;

    for i in 0..count {
        point.x = point.x.wrapping_add(rng.gen_range(-800..800));
        point.y = point.y.wrapping_add(rng.gen_range(-800..800));
        point.z = point.z.wrapping_add(rng.gen_range(-60..60));

        if rng.gen_bool(0.6) {
            time += 0.000_2;
        }
        point.gps_time = time;

        let n = rng.gen_range(1..=5u8);
        let r = rng.gen_range(1..=n);
        point.set_number_of_returns(n);
        point.set_return_number(r);
        point.set_scanner_channel((i % channels as usize) as u8);

        if rng.gen_bool(0.3) {
            point.intensity = rng.gen();
        }
        if rng.gen_bool(0.1) {
            point.classification = rng.gen_range(0..32);
        }
        if rng.gen_bool(0.1) {
            point.user_data = rng.gen();
        }
        if rng.gen_bool(0.1) {
            point.scan_angle = rng.gen();
        }
        if rng.gen_bool(0.05) {
            point.point_source_id = rng.gen();
        }
        if rng.gen_bool(0.08) {
            // flip classification flags / direction / edge bits, never
            // the channel bits
            let bit = rng.gen_range(0..8u8);
            point.flags ^= 0b1100_1111 & (1u8 << bit);
            point.set_scanner_channel((i % channels as usize) as u8);
        }
        points.push(point);
    }
    points
}

fn pack_point14(points: &[Point14]) -> Vec<u8> {
    let mut raw = vec![0u8; points.len() * Point14::SIZE];
    for (point, buf) in points.iter().zip(raw.chunks_exact_mut(Point14::SIZE)) {
        point.pack_into(buf);
    }
    raw
}

fn point14_schema() -> RecordSchema {
    SchemaBuilder::new()
        .item(ItemKind::Point14)
        .chunk_size(100)
        .build()
}

#[test]
fn point14_single_channel() {
    let raw = pack_point14(&scan_points(300, 1, 21));
    roundtrip(point14_schema(), &raw);
}

#[test]
fn point14_four_channels() {
    let raw = pack_point14(&scan_points(400, 4, 22));
    roundtrip(point14_schema(), &raw);
}

#[test]
fn point14_duplicate_records() {
    let mut point = Point14::default();
    point.x = 5;
    point.intensity = 9;
    point.gps_time = 42.0;
    point.set_number_of_returns(1);
    point.set_return_number(1);
    let raw = pack_point14(&vec![point; 150]);
    roundtrip(point14_schema(), &raw);
}

#[test]
fn point14_version_4_is_accepted() {
    let raw = pack_point14(&scan_points(120, 2, 23));
    let schema = SchemaBuilder::new()
        .item_with_version(ItemKind::Point14, 4)
        .chunk_size(64)
        .build();
    roundtrip(schema, &raw);
}

fn format7_records(count: usize, seed: u64) -> Vec<u8> {
    let points = scan_points(count, 3, seed);
    let mut rng = StdRng::seed_from_u64(seed ^ 0xFF);
    let record_size = Point14::SIZE + Rgb::SIZE;
    let mut raw = vec![0u8; count * record_size];
    let mut rgb = Rgb::default();
    for (point, buf) in points.iter().zip(raw.chunks_exact_mut(record_size)) {
        point.pack_into(&mut buf[..Point14::SIZE]);
        if rng.gen_bool(0.5) {
            rgb = Rgb {
                red: rng.gen(),
                green: rng.gen(),
                blue: rng.gen(),
            };
        }
        rgb.pack_into(&mut buf[Point14::SIZE..]);
    }
    raw
}

#[test]
fn point14_with_color() {
    let schema = SchemaBuilder::new()
        .item(ItemKind::Point14)
        .item(ItemKind::Rgb14)
        .chunk_size(80)
        .build();
    roundtrip(schema, &format7_records(240, 31));
}

#[test]
fn point14_with_color_and_nir() {
    let count = 260;
    let points = scan_points(count, 4, 32);
    let mut rng = StdRng::seed_from_u64(33);
    let record_size = Point14::SIZE + Rgb::SIZE + Nir::SIZE;
    let mut raw = vec![0u8; count * record_size];
    for (point, buf) in points.iter().zip(raw.chunks_exact_mut(record_size)) {
        point.pack_into(&mut buf[..30]);
        Rgb {
            red: rng.gen(),
            green: rng.gen(),
            blue: rng.gen(),
        }
        .pack_into(&mut buf[30..36]);
        Nir(rng.gen()).pack_into(&mut buf[36..38]);
    }
    let schema = SchemaBuilder::new()
        .item(ItemKind::Point14)
        .item(ItemKind::RgbNir14)
        .chunk_size(90)
        .build();
    roundtrip(schema, &raw);
}

#[test]
fn point14_with_wavepacket() {
    let count = 200;
    let points = scan_points(count, 2, 34);
    let record_size = Point14::SIZE + Wavepacket::SIZE;
    let mut raw = vec![0u8; count * record_size];
    let mut offset = 1024u64;
    for (i, (point, buf)) in points.iter().zip(raw.chunks_exact_mut(record_size)).enumerate() {
        point.pack_into(&mut buf[..30]);
        let size = 512u32;
        if i % 5 != 0 {
            offset += u64::from(size);
        }
        Wavepacket {
            descriptor_index: (i % 3) as u8,
            offset,
            size,
            return_point: 1.0,
            dx: 0.0,
            dy: 0.0,
            dz: 1.0,
        }
        .pack_into(&mut buf[30..]);
    }
    let schema = SchemaBuilder::new()
        .item(ItemKind::Point14)
        .item(ItemKind::Wavepacket14)
        .chunk_size(75)
        .build();
    roundtrip(schema, &raw);
}

#[test]
fn point14_with_extra_bytes() {
    let count = 180;
    let points = scan_points(count, 2, 35);
    let mut rng = StdRng::seed_from_u64(36);
    let record_size = Point14::SIZE + 3;
    let mut raw = vec![0u8; count * record_size];
    let mut extra = [0u8; 3];
    for (point, buf) in points.iter().zip(raw.chunks_exact_mut(record_size)) {
        point.pack_into(&mut buf[..30]);
        if rng.gen_bool(0.3) {
            extra[0] = extra[0].wrapping_add(1);
        }
        // extra[1] stays constant over the whole stream, its layers
        // must come out empty
        buf[30..].copy_from_slice(&extra);
    }
    let schema = SchemaBuilder::new()
        .item(ItemKind::Point14)
        .item(ItemKind::Byte14(3))
        .chunk_size(60)
        .build();
    roundtrip(schema, &raw);
}

#[test]
fn selective_decompression_skips_unrequested_layers() {
    let schema = SchemaBuilder::new()
        .item(ItemKind::Point14)
        .item(ItemKind::Rgb14)
        .chunk_size(64)
        .build();
    let records = format7_records(200, 40);

    let mut dst = Cursor::new(Vec::new());
    compress_buffer(&mut dst, &records, schema.clone()).unwrap();
    let compressed = dst.into_inner();

    // full decode as the reference
    let mut full = vec![0u8; records.len()];
    decompress_buffer(&compressed, &mut full, schema.clone()).unwrap();
    assert_eq!(&full[..], &records[..]);

    // decode with the color and intensity sub-streams deselected
    let selection = DecompressionSelection::all()
        .without(DecompressionSelection::RGB)
        .without(DecompressionSelection::INTENSITY);
    let mut reader =
        PointReader::selective(Cursor::new(compressed), schema, selection).unwrap();

    let record_size = Point14::SIZE + Rgb::SIZE;
    let mut partial = vec![0u8; records.len()];
    reader.read_many(&mut partial).unwrap();

    let mut last_rgb = [0u8; 6];
    let mut last_intensity = [0u8; 2];
    for (i, (got, want)) in partial
        .chunks_exact(record_size)
        .zip(full.chunks_exact(record_size))
        .enumerate()
    {
        if i % 64 == 0 {
            // chunk-leading records are stored raw, every field present
            assert_eq!(got, want, "first record of a chunk must be complete");
            last_rgb.copy_from_slice(&want[30..36]);
            last_intensity.copy_from_slice(&want[12..14]);
            continue;
        }
        // deselected fields hold their last-known value
        assert_eq!(&got[30..36], &last_rgb, "record {}", i);
        assert_eq!(&got[12..14], &last_intensity, "record {}", i);
        // everything else matches the full decode exactly
        assert_eq!(&got[..12], &want[..12], "record {}", i);
        assert_eq!(&got[14..30], &want[14..30], "record {}", i);
    }
}

#[test]
fn layered_chunk_embeds_point_count() {
    // variable-size chunks need no table when each chunk knows its count
    let schema = SchemaBuilder::new()
        .item(ItemKind::Point14)
        .variable_chunks()
        .build();
    let points = scan_points(90, 2, 50);
    let raw = pack_point14(&points);

    let mut dst = Cursor::new(Vec::new());
    let mut writer = PointWriter::new(&mut dst, schema.clone()).unwrap();
    for (i, record) in raw.chunks_exact(Point14::SIZE).enumerate() {
        writer.write_next(record).unwrap();
        if i == 29 || i == 59 {
            writer.finish_chunk().unwrap();
        }
    }
    writer.done().unwrap();
    drop(writer);
    let compressed = dst.into_inner();

    let mut decompressed = vec![0u8; raw.len()];
    decompress_buffer(&compressed, &mut decompressed, schema).unwrap();
    assert_eq!(decompressed, raw);
}
