// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

mod common;

use std::fs;

use byteorder::LittleEndian;
use byteorder::WriteBytesExt;
use common::seeded_digest;
use common::test_data;
use googletest::assert_that;
use googletest::prelude::eq;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tdigest::digest::TDigest;
use tdigest::error::ErrorKind;

const HEADER_SIZE: usize = 32;

fn encode(compression: f64, centroids: &[(i64, f64)]) -> Vec<u8> {
    encode_with_count(compression, centroids.len() as i32, centroids)
}

fn encode_with_count(compression: f64, declared: i32, centroids: &[(i64, f64)]) -> Vec<u8> {
    let mut bytes = vec![];
    bytes.write_i32::<LittleEndian>(1).unwrap();
    bytes
        .write_f64::<LittleEndian>(centroids.first().map_or(0.0, |c| c.1))
        .unwrap();
    bytes
        .write_f64::<LittleEndian>(centroids.last().map_or(0.0, |c| c.1))
        .unwrap();
    bytes.write_f64::<LittleEndian>(compression).unwrap();
    bytes.write_i32::<LittleEndian>(declared).unwrap();
    for &(count, mean) in centroids {
        bytes.write_i64::<LittleEndian>(count).unwrap();
        bytes.write_f64::<LittleEndian>(mean).unwrap();
    }
    bytes
}

fn assert_invalid_data(bytes: &[u8], what: &str) {
    match TDigest::deserialize(bytes) {
        Ok(tdigest) => panic!("{what}: decoded {tdigest:?}"),
        Err(err) => assert_eq!(err.kind(), ErrorKind::InvalidData, "{what}: {err}"),
    }
}

// A successful decode re-encodes to the same bytes, except for min and max, up to the end of the
// last centroid.
fn assert_decode_is_stable(bytes: &[u8]) {
    let Ok(tdigest) = TDigest::deserialize(bytes) else {
        return;
    };
    let encoded = tdigest.serialize();
    assert!(encoded.len() <= bytes.len());
    assert_eq!(encoded[..4], bytes[..4]);
    assert_eq!(encoded[20..], bytes[20..encoded.len()]);
}

#[test]
fn test_serialize_empty() {
    let tdigest = TDigest::new(100.0);
    let bytes = tdigest.serialize();
    assert_eq!(bytes, encode(100.0, &[]));
    assert_eq!(bytes.len(), HEADER_SIZE);

    let decoded = TDigest::deserialize(&bytes).unwrap();
    assert!(decoded.is_empty());
    assert_eq!(decoded.compression(), 100.0);
    assert_eq!(decoded, tdigest);
}

#[test]
fn test_serialize_layout() {
    let mut tdigest = TDigest::new(100.0);
    tdigest.add(1.0, 1);
    tdigest.add(2.0, 3);

    let bytes = tdigest.serialize();
    assert_eq!(bytes, encode(100.0, &[(1, 1.0), (3, 2.0)]));
    assert_eq!(
        bytes[..HEADER_SIZE],
        [
            1, 0, 0, 0, // version
            0, 0, 0, 0, 0, 0, 0xf0, 0x3f, // min
            0, 0, 0, 0, 0, 0, 0, 0x40, // max
            0, 0, 0, 0, 0, 0, 0x59, 0x40, // compression
            2, 0, 0, 0, // number of centroids
        ]
    );
}

#[test]
fn test_round_trip() {
    for n in [1, 10, 1000, 100_000] {
        let mut rng = StdRng::seed_from_u64(n);
        let mut tdigest = seeded_digest(100.0, n);
        for _ in 0..n {
            tdigest.add(rng.random_range(-1e3..1e3), rng.random_range(1..3));
        }

        let bytes = tdigest.serialize();
        assert_eq!(bytes.len(), HEADER_SIZE + 16 * tdigest.num_centroids());
        let decoded = TDigest::deserialize(&bytes).unwrap();
        assert_eq!(decoded, tdigest, "n={n}");
        assert_eq!(decoded.serialize(), bytes, "n={n}");
        assert_eq!(decoded.quantile(0.3), tdigest.quantile(0.3), "n={n}");
    }
}

#[test]
fn test_round_trip_largest_weight() {
    let mut tdigest = seeded_digest(100.0, 2);
    tdigest.add(1.0, i64::MAX as u64 - 1);
    tdigest.add(2.0, 1);
    assert_eq!(tdigest.count(), i64::MAX as u64);

    let bytes = tdigest.serialize();
    let decoded = TDigest::deserialize(&bytes).unwrap();
    assert_eq!(decoded, tdigest);
    assert_eq!(decoded.serialize(), bytes);
}

#[test]
#[should_panic(expected = "weight overflow")]
fn test_weight_beyond_encodable_range() {
    let mut tdigest = seeded_digest(100.0, 3);
    tdigest.add(1.0, i64::MAX as u64);
    tdigest.add(1.0, 1);
}

#[test]
fn test_decoded_digest_accepts_more_data() {
    let mut tdigest = seeded_digest(100.0, 1);
    for i in 0..100 {
        tdigest.add(i as f64, 1);
    }
    let mut decoded = TDigest::deserialize(&tdigest.serialize()).unwrap();
    for i in 100..200 {
        decoded.add(i as f64, 1);
    }
    assert_that!(decoded.count(), eq(200));
    assert_eq!(decoded.max_value(), Some(199.0));
}

#[test]
fn test_unsupported_version() {
    let mut bytes = encode(100.0, &[(1, 1.0)]);
    for version in [0, 2, -1, i32::MAX] {
        bytes[..4].copy_from_slice(&version.to_le_bytes());
        let err = TDigest::deserialize(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert!(
            err.message().contains("unsupported encoding version"),
            "{err}"
        );
    }
}

#[test]
fn test_truncated_input() {
    let bytes = encode(100.0, &[(1, 1.0), (4, 2.0), (2, 8.0)]);
    for len in 0..bytes.len() {
        assert_invalid_data(&bytes[..len], &format!("prefix of {len} bytes"));
    }
    assert!(TDigest::deserialize(&bytes).is_ok());
}

#[test]
fn test_trailing_bytes_are_ignored() {
    let mut bytes = encode(100.0, &[(1, 1.0), (4, 2.0)]);
    let expected = TDigest::deserialize(&bytes).unwrap();
    bytes.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
    assert_eq!(TDigest::deserialize(&bytes).unwrap(), expected);
}

#[test]
fn test_min_and_max_are_advisory() {
    let mut bytes = encode(100.0, &[(1, 1.0), (4, 2.0)]);
    bytes[4..12].copy_from_slice(&f64::NAN.to_le_bytes());
    bytes[12..20].copy_from_slice(&(-7.0f64).to_le_bytes());

    let tdigest = TDigest::deserialize(&bytes).unwrap();
    assert_eq!(tdigest.min_value(), Some(1.0));
    assert_eq!(tdigest.max_value(), Some(2.0));
    assert_eq!(tdigest.serialize(), encode(100.0, &[(1, 1.0), (4, 2.0)]));
}

#[test]
fn test_invalid_centroid_count() {
    for declared in [-1, i32::MIN, 3, i32::MAX] {
        let bytes = encode_with_count(100.0, declared, &[(1, 1.0), (1, 2.0)]);
        let err = TDigest::deserialize(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert!(err.message().contains("invalid centroid count"), "{err}");
    }
}

#[test]
fn test_invalid_compression() {
    for compression in [0.0, 0.999, -100.0, f64::NAN, f64::INFINITY] {
        let bytes = encode(compression, &[(1, 1.0)]);
        assert_invalid_data(&bytes, &format!("compression {compression}"));
    }
    assert!(TDigest::deserialize(&encode(1.0, &[(1, 1.0)])).is_ok());
}

#[test]
fn test_invalid_centroids() {
    let cases: [(&str, &[(i64, f64)]); 8] = [
        ("zero count", &[(1, 1.0), (0, 2.0)]),
        ("negative count", &[(-3, 1.0)]),
        ("nan mean", &[(1, f64::NAN)]),
        ("infinite mean", &[(1, 1.0), (1, f64::INFINITY)]),
        ("negative infinite mean", &[(1, f64::NEG_INFINITY)]),
        ("unsorted means", &[(1, 2.0), (1, 1.0)]),
        (
            "total count overflow",
            &[(i64::MAX, 1.0), (i64::MAX, 2.0), (i64::MAX, 3.0)],
        ),
        ("total count beyond i64", &[(i64::MAX, 1.0), (1, 2.0)]),
    ];
    for (what, centroids) in cases {
        assert_invalid_data(&encode(100.0, centroids), what);
    }

    // equal means are fine
    let tdigest = TDigest::deserialize(&encode(100.0, &[(1, 2.0), (5, 2.0)])).unwrap();
    assert_eq!(tdigest.count(), 6);
}

#[test]
fn test_decode_regressions() {
    for i in 1..=5 {
        let path = test_data(&format!("decode_regressions/crash-{i}.bin"));
        let bytes = fs::read(&path).unwrap();
        assert_decode_is_stable(&bytes);
    }
}

#[test]
fn test_decode_mutated_input() {
    let mut rng = StdRng::seed_from_u64(0xf022);
    let mut source = seeded_digest(20.0, 7);
    for _ in 0..500 {
        source.add(rng.random_range(0.0..10.0), rng.random_range(1..4));
    }
    let valid = source.serialize();

    for _ in 0..2000 {
        let mut bytes = valid.clone();
        for _ in 0..rng.random_range(1..8) {
            let idx = rng.random_range(0..bytes.len());
            bytes[idx] = rng.random();
        }
        bytes.truncate(rng.random_range(0..=bytes.len()));
        assert_decode_is_stable(&bytes);
    }
}
