//! Chunking, seeking, the chunk-table protocol and its failure paths.

use std::io::{Cursor, Seek, SeekFrom};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use lidarzip::packers::Packable;
use lidarzip::point::Point10;
use lidarzip::{
    compress_buffer, ItemKind, LazError, PointReader, PointWriter, RecordSchema, SchemaBuilder,
};

const CHUNK: u32 = 50;

fn schema_with_chunk(chunk_size: u32) -> RecordSchema {
    SchemaBuilder::new()
        .item(ItemKind::Point10)
        .chunk_size(chunk_size)
        .build()
}

fn sample_records(count: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut raw = vec![0u8; count * Point10::SIZE];
    let mut point = Point10::default();
    for buf in raw.chunks_exact_mut(Point10::SIZE) {
        point.x = point.x.wrapping_add(rng.gen_range(-1000..1000));
        point.y = point.y.wrapping_add(rng.gen_range(-1000..1000));
        point.z = point.z.wrapping_add(rng.gen_range(-100..100));
        point.intensity = rng.gen();
        point.classification = rng.gen();
        point.pack_into(buf);
    }
    raw
}

fn compress(records: &[u8], schema: RecordSchema) -> Vec<u8> {
    let mut dst = Cursor::new(Vec::new());
    compress_buffer(&mut dst, records, schema).unwrap();
    dst.into_inner()
}

fn table_pointer(compressed: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&compressed[..8]);
    i64::from_le_bytes(bytes) as u64
}

#[test]
fn chunk_count_and_byte_sums() {
    let count = 3 * CHUNK as usize + 17; // a partial trailing chunk
    let records = sample_records(count, 100);
    let compressed = compress(&records, schema_with_chunk(CHUNK));

    let reader =
        PointReader::new(Cursor::new(compressed.clone()), schema_with_chunk(CHUNK)).unwrap();
    let starts = reader.chunk_starts();

    // ceil(count / CHUNK) chunks plus the end marker
    assert_eq!(starts.len(), 4 + 1);
    assert!(starts.windows(2).all(|pair| pair[0] < pair[1]));
    // chunk 0 starts right after the table pointer
    assert_eq!(starts[0], 8);
    // the byte counts add up to the whole compressed payload: the last
    // boundary is exactly where the chunk table sits
    assert_eq!(*starts.last().unwrap(), table_pointer(&compressed));
}

#[test]
fn reread_boundaries_match_write_time_boundaries() {
    let records = sample_records(2 * CHUNK as usize, 101);
    let compressed = compress(&records, schema_with_chunk(CHUNK));

    let mut reader =
        PointReader::new(Cursor::new(compressed), schema_with_chunk(CHUNK)).unwrap();
    let starts = reader.chunk_starts().to_vec();

    // after decoding exactly one chunk the stream must sit on the second
    // chunk's recorded start
    let mut out = vec![0u8; Point10::SIZE];
    for _ in 0..CHUNK {
        reader.read_next(&mut out).unwrap();
    }
    let position = reader.get_mut().seek(SeekFrom::Current(0)).unwrap();
    assert_eq!(position, starts[1]);
}

#[test]
fn seek_matches_linear_decoding() {
    let count = 3 * CHUNK as usize + 11;
    let records = sample_records(count, 102);
    let compressed = compress(&records, schema_with_chunk(CHUNK));
    let schema = schema_with_chunk(CHUNK);

    // linear reference decode
    let mut linear = vec![0u8; records.len()];
    let mut reader = PointReader::new(Cursor::new(compressed.clone()), schema.clone()).unwrap();
    reader.read_many(&mut linear).unwrap();
    assert_eq!(linear, records);

    let record_at = |index: usize| &linear[index * Point10::SIZE..(index + 1) * Point10::SIZE];

    let targets = [
        7usize,                  // inside the first chunk
        CHUNK as usize,          // exactly on a chunk boundary
        2 * CHUNK as usize + 33, // deep inside a later chunk
        3,                       // backwards
        count - 1,               // the very last record
    ];
    let mut reader = PointReader::new(Cursor::new(compressed), schema).unwrap();
    let mut out = vec![0u8; Point10::SIZE];
    for target in targets.iter() {
        reader.seek(*target as u64).unwrap();
        reader.read_next(&mut out).unwrap();
        assert_eq!(&out[..], record_at(*target), "target {}", target);
    }

    // past the end: with fixed-size chunks the reader cannot know the
    // total count, so either the seek or the next read reports the end
    let seek_result = reader.seek(count as u64 + 40);
    assert!(seek_result.is_err() || reader.read_next(&mut out).is_err());
}

#[test]
fn variable_chunks_keep_their_boundaries() {
    let schema = SchemaBuilder::new()
        .item(ItemKind::Point10)
        .variable_chunks()
        .build();
    let records = sample_records(120, 103);

    let mut dst = Cursor::new(Vec::new());
    let mut writer = PointWriter::new(&mut dst, schema.clone()).unwrap();
    let boundaries = [20usize, 75]; // -> chunks of 21, 55, 44 points
    for (i, record) in records.chunks_exact(Point10::SIZE).enumerate() {
        writer.write_next(record).unwrap();
        if boundaries.contains(&i) {
            writer.finish_chunk().unwrap();
        }
    }
    writer.done().unwrap();
    drop(writer);
    let compressed = dst.into_inner();

    let mut decompressed = vec![0u8; records.len()];
    let mut reader = PointReader::new(Cursor::new(compressed.clone()), schema.clone()).unwrap();
    reader.read_many(&mut decompressed).unwrap();
    assert_eq!(decompressed, records);
    assert_eq!(reader.chunk_starts().len(), 3 + 1);

    // seeking into the middle chunk must honor the per-chunk point counts
    let mut reader = PointReader::new(Cursor::new(compressed), schema).unwrap();
    let mut out = vec![0u8; Point10::SIZE];
    reader.seek(60).unwrap();
    reader.read_next(&mut out).unwrap();
    assert_eq!(&out[..], &records[60 * Point10::SIZE..61 * Point10::SIZE]);
}

/// Splices a foreign-but-valid chunk over chunk 1, keeping every other
/// byte where it was. The splice is shorter, so decoding drifts and the
/// boundary check must fire when chunk 1 finishes.
#[test]
fn corrupt_chunk_is_detected_and_resynchronized() {
    let schema = schema_with_chunk(CHUNK);
    let records = sample_records(3 * CHUNK as usize, 104);
    let compressed = compress(&records, schema.clone());

    let reader = PointReader::new(Cursor::new(compressed.clone()), schema.clone()).unwrap();
    let starts = reader.chunk_starts().to_vec();
    let (start1, start2) = (starts[1] as usize, starts[2] as usize);

    // a highly compressible replacement chunk with the same point count
    let constant_records = {
        let mut point = Point10::default();
        point.x = 1;
        let mut raw = vec![0u8; CHUNK as usize * Point10::SIZE];
        for buf in raw.chunks_exact_mut(Point10::SIZE) {
            point.pack_into(buf);
        }
        raw
    };
    let foreign = compress(&constant_records, schema.clone());
    let foreign_reader = PointReader::new(Cursor::new(foreign.clone()), schema.clone()).unwrap();
    let foreign_chunk = {
        let foreign_starts = foreign_reader.chunk_starts();
        &foreign[foreign_starts[0] as usize..foreign_starts[1] as usize]
    };
    assert!(
        foreign_chunk.len() < start2 - start1,
        "the replacement chunk must be shorter for the positions to drift"
    );

    let mut tampered = compressed;
    tampered[start1..start1 + foreign_chunk.len()].copy_from_slice(foreign_chunk);

    let mut reader = PointReader::new(Cursor::new(tampered), schema).unwrap();
    let mut out = vec![0u8; Point10::SIZE];

    // chunk 0 is intact
    for i in 0..CHUNK as usize {
        reader.read_next(&mut out).unwrap();
        assert_eq!(&out[..], &records[i * 20..(i + 1) * 20], "chunk 0 record {}", i);
    }
    // chunk 1 decodes without error, but its content is the splice
    for _ in 0..CHUNK {
        reader.read_next(&mut out).unwrap();
    }
    // crossing into chunk 2 trips the boundary check
    match reader.read_next(&mut out) {
        Err(LazError::CorruptChunk { index: 1 }) => {}
        other => panic!("expected CorruptChunk for chunk 1, got {:?}", other.map(|_| ())),
    }
    // recovery left the stream at chunk 2's recorded start
    let position = reader.get_mut().seek(SeekFrom::Current(0)).unwrap();
    assert_eq!(position, start2 as u64);

    // and chunk 2 reads back intact
    for i in 0..CHUNK as usize {
        reader.read_next(&mut out).unwrap();
        let expected = &records[(2 * CHUNK as usize + i) * 20..(2 * CHUNK as usize + i + 1) * 20];
        assert_eq!(&out[..], expected, "chunk 2 record {}", i);
    }
}

#[test]
fn truncated_stream_reports_the_chunk() {
    let schema = schema_with_chunk(CHUNK);
    let records = sample_records(2 * CHUNK as usize, 105);
    let compressed = compress(&records, schema.clone());

    let reader = PointReader::new(Cursor::new(compressed.clone()), schema.clone()).unwrap();
    let start1 = reader.chunk_starts()[1] as usize;

    // cut the stream in the middle of chunk 1; the table goes with it
    let truncated = compressed[..start1 + 10].to_vec();

    let mut reader = PointReader::new(Cursor::new(truncated), schema).unwrap();
    let mut out = vec![0u8; Point10::SIZE];
    for i in 0..CHUNK as usize {
        reader.read_next(&mut out).unwrap();
        assert_eq!(&out[..], &records[i * 20..(i + 1) * 20]);
    }
    let mut saw_truncation = false;
    for _ in 0..CHUNK {
        match reader.read_next(&mut out) {
            Ok(()) => continue,
            Err(LazError::TruncatedChunk { index: 1, .. }) => {
                saw_truncation = true;
                break;
            }
            Err(other) => panic!("expected TruncatedChunk, got {:?}", other),
        }
    }
    assert!(saw_truncation);
}

#[test]
fn interrupted_writer_falls_back_to_linear_scan() {
    let schema = schema_with_chunk(CHUNK);
    let records = sample_records(2 * CHUNK as usize + 5, 106);
    let mut compressed = compress(&records, schema.clone());

    // make the pointer point at itself: the interrupted-writer signature
    compressed[..8].copy_from_slice(&0i64.to_le_bytes());

    let mut reader = PointReader::new(Cursor::new(compressed), schema).unwrap();
    let mut decompressed = vec![0u8; records.len()];
    reader.read_many(&mut decompressed).unwrap();
    assert_eq!(decompressed, records);
}

#[test]
fn table_position_recovered_from_stream_end() {
    let schema = schema_with_chunk(CHUNK);
    let records = sample_records(2 * CHUNK as usize, 107);
    let mut compressed = compress(&records, schema.clone());

    // move the pointer to the end of the stream, as a writer on a
    // non-seekable sink would have
    let table_position = table_pointer(&compressed);
    compressed[..8].copy_from_slice(&(-1i64).to_le_bytes());
    compressed.extend_from_slice(&(table_position as i64).to_le_bytes());

    let mut reader = PointReader::new(Cursor::new(compressed), schema).unwrap();
    assert_eq!(reader.chunk_starts().len(), 2 + 1);

    let mut decompressed = vec![0u8; records.len()];
    reader.read_many(&mut decompressed).unwrap();
    assert_eq!(decompressed, records);

    // the recovered table still supports seeking
    let mut out = vec![0u8; Point10::SIZE];
    reader.seek(CHUNK as u64 + 3).unwrap();
    reader.read_next(&mut out).unwrap();
    let target = (CHUNK as usize + 3) * 20;
    assert_eq!(&out[..], &records[target..target + 20]);
}

#[test]
fn uncompressed_stream_roundtrip_and_direct_seek() {
    let schema = SchemaBuilder::new()
        .item(ItemKind::Point10)
        .uncompressed()
        .build();
    let records = sample_records(40, 108);

    let mut dst = Cursor::new(Vec::new());
    let mut writer = PointWriter::new(&mut dst, schema.clone()).unwrap();
    writer.write_many(&records).unwrap();
    writer.done().unwrap();
    drop(writer);
    let stored = dst.into_inner();
    assert_eq!(stored, records);

    let mut reader = PointReader::new(Cursor::new(stored), schema).unwrap();
    let mut out = vec![0u8; Point10::SIZE];
    reader.seek(25).unwrap();
    reader.read_next(&mut out).unwrap();
    assert_eq!(&out[..], &records[25 * 20..26 * 20]);
}

#[test]
fn point_wise_stream_roundtrip() {
    let schema = SchemaBuilder::new()
        .item(ItemKind::Point10)
        .point_wise()
        .build();
    let records = sample_records(130, 109);

    let mut dst = Cursor::new(Vec::new());
    let mut writer = PointWriter::new(&mut dst, schema.clone()).unwrap();
    writer.write_many(&records).unwrap();
    writer.done().unwrap();
    drop(writer);
    let compressed = dst.into_inner();

    let mut reader = PointReader::new(Cursor::new(compressed), schema).unwrap();
    let mut decompressed = vec![0u8; records.len()];
    reader.read_many(&mut decompressed).unwrap();
    assert_eq!(decompressed, records);

    // seeking restarts from the front; forward and backward both land
    let mut out = vec![0u8; Point10::SIZE];
    reader.seek(12).unwrap();
    reader.read_next(&mut out).unwrap();
    assert_eq!(&out[..], &records[12 * 20..13 * 20]);
}

#[test]
fn corrupt_table_payload_falls_back_to_linear_scan() {
    let schema = schema_with_chunk(CHUNK);
    let records = sample_records(2 * CHUNK as usize, 110);
    let mut compressed = compress(&records, schema.clone());

    // wreck the table's format version
    let table_position = table_pointer(&compressed) as usize;
    compressed[table_position] = 0xAB;

    let mut reader = PointReader::new(Cursor::new(compressed), schema).unwrap();
    let mut decompressed = vec![0u8; records.len()];
    reader.read_many(&mut decompressed).unwrap();
    assert_eq!(decompressed, records);
}
