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

//! Streaming t-digest for estimating quantiles of weighted numeric data.
//!
//! A digest keeps a sorted list of centroids, each a running mean with an integer weight. New
//! values join the nearest centroid while it is below its weight limit and otherwise start a
//! centroid of their own. The limit for a centroid at quantile position `q` is
//! `floor(4 * compression * q * (1 - q) * n)`, where `n` is the current number of centroids, so
//! centroids near the tails stay small and extreme quantiles stay accurate.
//!
//! Quantiles are estimated by interpolating between the midpoints of adjacent centroids and by
//! extrapolating from the outermost pair beyond them. Results are approximate and depend on the
//! insertion order as well as on the random choices made when several centroids are equally
//! near. Use [`TDigest::with_rng`] with a seeded generator for reproducible digests.
//!
//! # Examples
//!
//! ```
//! # use tdigest::digest::TDigest;
//! let mut digest = TDigest::new(100.0);
//! for i in 1..=1000 {
//!     digest.add(i as f64, 1);
//! }
//! let p99 = digest.quantile(0.99);
//! assert!((p99 - 990.0).abs() < 20.0);
//!
//! let restored = TDigest::deserialize(&digest.serialize()).unwrap();
//! assert_eq!(restored, digest);
//! ```

mod centroid;
mod serialization;

mod sketch;
pub use self::centroid::Centroid;
pub use self::sketch::DEFAULT_COMPRESSION;
pub use self::sketch::TDigest;
