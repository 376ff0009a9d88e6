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

use std::fmt;
use std::ops::Range;

use log::debug;
use log::trace;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::codec::DigestBytes;
use crate::codec::DigestSlice;
use crate::digest::centroid::Centroid;
use crate::digest::serialization::*;
use crate::error::Error;

/// The default compression if one is not specified.
pub const DEFAULT_COMPRESSION: f64 = 100.0;
/// Number of ramp-up chunks (2, 4, ..., 18) used to hand a centroid over during merge.
const MERGE_RAMP_CHUNKS: u64 = 9;

/// Streaming quantile digest built from a sorted sequence of weighted centroids.
///
/// See the [module level documentation](super) for more.
///
/// The type parameter is the random source used to break ties between equidistant centroids
/// and to order centroids during a merge. It defaults to [`StdRng`] seeded from the operating
/// system; use [`TDigest::with_rng`] to inject a seeded one.
#[derive(Clone)]
pub struct TDigest<R = StdRng> {
    centroids: Vec<Centroid>,
    compression: f64,
    count_total: u64,
    rng: R,
}

impl Default for TDigest {
    fn default() -> Self {
        TDigest::new(DEFAULT_COMPRESSION)
    }
}

impl TDigest {
    /// Creates an empty digest with the given compression.
    ///
    /// Higher compression keeps more centroids: lower error, more memory. 100 is a good default.
    ///
    /// The fallible version of this method is [`TDigest::try_new`].
    ///
    /// # Panics
    ///
    /// Panics if compression is not finite or is less than 1.
    ///
    /// # Examples
    ///
    /// ```
    /// # use tdigest::digest::TDigest;
    /// let digest = TDigest::new(100.0);
    /// assert_eq!(digest.compression(), 100.0);
    /// assert!(digest.is_empty());
    /// ```
    pub fn new(compression: f64) -> Self {
        TDigest::with_rng(compression, StdRng::from_os_rng())
    }

    /// Creates an empty digest with the given compression.
    ///
    /// The panicking version of this method is [`TDigest::new`].
    ///
    /// # Errors
    ///
    /// If compression is not finite or is less than 1, returns [`ErrorKind::InvalidArgument`].
    ///
    /// [`ErrorKind::InvalidArgument`]: crate::error::ErrorKind::InvalidArgument
    ///
    /// # Examples
    ///
    /// ```
    /// # use tdigest::digest::TDigest;
    /// assert!(TDigest::try_new(20.0).is_ok());
    /// assert!(TDigest::try_new(0.5).is_err());
    /// ```
    pub fn try_new(compression: f64) -> Result<Self, Error> {
        if !is_valid_compression(compression) {
            return Err(Error::invalid_compression(compression));
        }
        Ok(TDigest::make(
            compression,
            StdRng::from_os_rng(),
            vec![],
            0,
        ))
    }

    /// Deserializes a digest from bytes produced by [`TDigest::serialize`].
    ///
    /// The random source is seeded from the operating system; see
    /// [`TDigest::deserialize_with_rng`] to supply one.
    ///
    /// # Examples
    ///
    /// ```
    /// # use tdigest::digest::TDigest;
    /// let mut digest = TDigest::new(100.0);
    /// digest.add(1.0, 1);
    /// digest.add(2.0, 3);
    /// let bytes = digest.serialize();
    /// let decoded = TDigest::deserialize(&bytes).unwrap();
    /// assert_eq!(decoded, digest);
    /// ```
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        TDigest::deserialize_with_rng(bytes, StdRng::from_os_rng())
    }
}

impl<R> TDigest<R> {
    // for construction and deserialization
    fn make(compression: f64, rng: R, centroids: Vec<Centroid>, count_total: u64) -> Self {
        assert!(
            is_valid_compression(compression),
            "compression must be finite and at least 1, got {compression}"
        );

        TDigest {
            centroids,
            compression,
            count_total,
            rng,
        }
    }

    /// Returns the compression this digest was configured with.
    pub fn compression(&self) -> f64 {
        self.compression
    }

    /// Returns the total weight added to this digest.
    pub fn count(&self) -> u64 {
        self.count_total
    }

    /// Returns the number of centroids currently kept.
    pub fn num_centroids(&self) -> usize {
        self.centroids.len()
    }

    /// Returns true if the digest has not seen any data.
    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }

    /// Returns the centroids in non-decreasing order of their means.
    pub fn centroids(&self) -> &[Centroid] {
        &self.centroids
    }

    /// Returns the mean of the lowest centroid; `None` if the digest is empty.
    pub fn min_value(&self) -> Option<f64> {
        self.centroids.first().map(Centroid::mean)
    }

    /// Returns the mean of the highest centroid; `None` if the digest is empty.
    pub fn max_value(&self) -> Option<f64> {
        self.centroids.last().map(Centroid::mean)
    }

    /// Returns the estimated value at quantile `q`.
    ///
    /// `q` is clamped into `[0.0, 1.0]`. Returns [`f64::NAN`] if the digest is empty and the
    /// sole mean if there is only one centroid. Outside the outermost centroid midpoints the
    /// value is extrapolated from the slope of the two centroids at that edge.
    ///
    /// # Examples
    ///
    /// ```
    /// # use tdigest::digest::TDigest;
    /// let mut digest = TDigest::new(100.0);
    /// assert!(digest.quantile(0.5).is_nan());
    /// digest.add(5.0, 1);
    /// assert_eq!(digest.quantile(0.0), 5.0);
    /// assert_eq!(digest.quantile(0.99), 5.0);
    /// ```
    pub fn quantile(&self, q: f64) -> f64 {
        let n = self.centroids.len();
        match n {
            0 => return f64::NAN,
            1 => return self.centroids[0].mean(),
            _ => {}
        }

        // rescale into count units
        let target = self.count_total as f64 * q.clamp(0.0, 1.0);

        // find the first centroid whose midpoint is at or past the target
        let mut weight_so_far = 0.;
        let mut i = 0;
        while i < n && self.centroids[i].half_count() + weight_so_far < target {
            weight_so_far += self.centroids[i].count() as f64;
            i += 1;
        }

        if i == 0 {
            // before the first midpoint: extrapolate leftwards from centroids 0 and 1
            let (c0, c1) = (&self.centroids[0], &self.centroids[1]);
            return c0.mean() + slope(c0, c1) * (target - c0.half_count());
        }
        if i == n {
            // past the last midpoint: extrapolate rightwards from the last two centroids
            let (c0, c1) = (&self.centroids[n - 2], &self.centroids[n - 1]);
            return c1.mean() + slope(c0, c1) * (target - (weight_so_far - c1.half_count()));
        }
        let (c0, c1) = (&self.centroids[i - 1], &self.centroids[i]);
        c1.mean() + slope(c0, c1) * (target - (c1.half_count() + weight_so_far))
    }

    /// Returns the estimated median. Shorthand for `quantile(0.5)`.
    pub fn median(&self) -> f64 {
        self.quantile(0.5)
    }

    /// Returns the estimated value at each of the given quantiles.
    ///
    /// # Examples
    ///
    /// ```
    /// # use tdigest::digest::TDigest;
    /// let mut digest = TDigest::new(100.0);
    /// for i in 0..100 {
    ///     digest.add(i as f64, 1);
    /// }
    /// let values = digest.quantiles(&[0.1, 0.5, 0.9]);
    /// assert_eq!(values.len(), 3);
    /// assert!(values[0] <= values[1] && values[1] <= values[2]);
    /// ```
    pub fn quantiles(&self, qs: &[f64]) -> Vec<f64> {
        qs.iter().map(|&q| self.quantile(q)).collect()
    }

    /// Adds all the weight of this digest into `other`, leaving this digest unchanged.
    ///
    /// Centroids are visited in a random order drawn from `other`'s random source and each one
    /// is handed over in growing chunks of 2, 4, ..., 18 before any remainder, so a single heavy
    /// centroid does not land on one target all at once. `other.count()` grows by exactly
    /// `self.count()`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use tdigest::digest::TDigest;
    /// let mut left = TDigest::new(100.0);
    /// let mut right = TDigest::new(100.0);
    /// left.add(1.0, 5);
    /// right.add(2.0, 1);
    /// left.merge_into(&mut right);
    /// assert_eq!(right.count(), 6);
    /// assert_eq!(left.count(), 5);
    /// ```
    pub fn merge_into<R2: Rng>(&self, other: &mut TDigest<R2>) {
        self.transfer_into(other, false);
    }

    /// Like [`TDigest::merge_into`], but after handing over each centroid adds its full count to
    /// `other` once more.
    ///
    /// Every transferred centroid is counted twice, so `other.count()` grows by
    /// `2 * self.count()`. Earlier releases also counted merged weight twice; use this when
    /// totals must stay comparable with digests merged by them. Chunk sizes are capped at the
    /// weight still to transfer, so individual centroids can differ from those releases.
    pub fn merge_into_compat<R2: Rng>(&self, other: &mut TDigest<R2>) {
        self.transfer_into(other, true);
    }

    fn transfer_into<R2: Rng>(&self, other: &mut TDigest<R2>, repeat_full_count: bool) {
        let mut order: Vec<usize> = (0..self.centroids.len()).collect();
        order.shuffle(&mut other.rng);

        for idx in order {
            let centroid = self.centroids[idx];
            let count = centroid.count();
            let mut added = 0;
            for step in 1..=MERGE_RAMP_CHUNKS {
                let chunk = (2 * step).min(count - added);
                other.add(centroid.mean(), chunk);
                added += chunk;
                if added >= count {
                    break;
                }
            }
            if added < count {
                other.add(centroid.mean(), count - added);
            }
            if repeat_full_count {
                other.add(centroid.mean(), count);
            }
        }
    }

    /// Serializes this digest to bytes.
    ///
    /// Layout (little-endian): version `i32` (always 1), min `f64`, max `f64`, compression
    /// `f64`, centroid count `i32`, then `(count: i64, mean: f64)` per centroid. Min and max are
    /// the outermost centroid means, or 0 for an empty digest.
    ///
    /// # Examples
    ///
    /// ```
    /// # use tdigest::digest::TDigest;
    /// let mut digest = TDigest::new(100.0);
    /// assert_eq!(digest.serialize().len(), 32);
    /// digest.add(1.0, 1);
    /// assert_eq!(digest.serialize().len(), 48);
    /// ```
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes =
            DigestBytes::with_capacity(HEADER_SIZE + self.centroids.len() * CENTROID_SIZE);
        bytes.write_i32_le(ENCODING_VERSION);
        bytes.write_f64_le(self.min_value().unwrap_or(0.));
        bytes.write_f64_le(self.max_value().unwrap_or(0.));
        bytes.write_f64_le(self.compression);
        // add() keeps both within their field widths
        bytes.write_i32_le(self.centroids.len() as i32);
        for centroid in &self.centroids {
            bytes.write_i64_le(centroid.count() as i64);
            bytes.write_f64_le(centroid.mean());
        }
        bytes.into_bytes()
    }

    // returns the approximate quantile position of the centroid at idx
    fn quantile_of(&self, idx: usize) -> f64 {
        let before: u64 = self.centroids[..idx].iter().map(Centroid::count).sum();
        ((self.centroids[idx].count() / 2) as f64 + before as f64) / self.count_total as f64
    }

    // maximum count the centroid at idx may hold
    fn weight_limit(&self, idx: usize) -> u64 {
        let q = self.quantile_of(idx);
        (4. * self.compression * q * (1. - q) * self.centroids.len() as f64) as u64
    }

    fn has_room(&self, idx: usize) -> bool {
        self.centroids[idx].count() < self.weight_limit(idx)
    }

    // Indexes of the centroids closest to value. Means are sorted, so the ties are contiguous.
    fn nearest(&self, value: f64) -> Range<usize> {
        let mut nearest_dist = f64::INFINITY;
        let mut nearest = 0..0;
        for (idx, centroid) in self.centroids.iter().enumerate() {
            let dist = (value - centroid.mean()).abs();
            if nearest.is_empty() || dist < nearest_dist {
                nearest_dist = dist;
                nearest = idx..idx + 1;
            } else if dist == nearest_dist {
                nearest.end = idx + 1;
            } else {
                // past the best spot
                break;
            }
        }
        nearest
    }

    fn insert_centroid(&mut self, centroid: Centroid) {
        assert!(self.centroids.len() < MAX_CENTROIDS, "centroid count overflow");
        let idx = self
            .centroids
            .partition_point(|c| c.mean() <= centroid.mean());
        self.centroids.insert(idx, centroid);
    }

    fn absorb(&mut self, idx: usize, value: f64, weight: u64) {
        self.centroids[idx].absorb(value, weight);

        // A target inside a run of equal means moves past its neighbours once absorbed;
        // slide it to the edge of the run.
        let mut idx = idx;
        while idx + 1 < self.centroids.len()
            && self.centroids[idx + 1].mean() < self.centroids[idx].mean()
        {
            self.centroids.swap(idx, idx + 1);
            idx += 1;
        }
        while idx > 0 && self.centroids[idx - 1].mean() > self.centroids[idx].mean() {
            self.centroids.swap(idx - 1, idx);
            idx -= 1;
        }
    }
}

impl<R: Rng> TDigest<R> {
    /// Creates an empty digest with the given compression and random source.
    ///
    /// # Panics
    ///
    /// Panics if compression is not finite or is less than 1.
    ///
    /// # Examples
    ///
    /// ```
    /// # use rand::SeedableRng;
    /// # use rand::rngs::StdRng;
    /// # use tdigest::digest::TDigest;
    /// let mut digest = TDigest::with_rng(100.0, StdRng::seed_from_u64(7));
    /// digest.add(1.0, 1);
    /// assert_eq!(digest.count(), 1);
    /// ```
    pub fn with_rng(compression: f64, rng: R) -> Self {
        TDigest::make(compression, rng, vec![], 0)
    }

    /// Deserializes a digest, using `rng` as its random source.
    ///
    /// Min and max in the header are not checked against the centroids. Bytes following the
    /// last centroid are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidData`] if the encoding version is not 1, the input is
    /// truncated, the declared centroid count is negative or larger than the remaining bytes
    /// can hold, the compression is not finite or less than 1, or any centroid has a count
    /// below 1, a non-finite mean, or a mean lower than its predecessor.
    ///
    /// [`ErrorKind::InvalidData`]: crate::error::ErrorKind::InvalidData
    pub fn deserialize_with_rng(bytes: &[u8], rng: R) -> Result<Self, Error> {
        fn make_error(tag: &'static str) -> impl FnOnce(std::io::Error) -> Error {
            move |_| Error::insufficient_data(tag)
        }

        let mut cursor = DigestSlice::new(bytes);

        let encoding_version = cursor
            .read_i32_le()
            .map_err(make_error("encoding_version"))?;
        if encoding_version != ENCODING_VERSION {
            return Err(Error::unsupported_encoding_version(
                ENCODING_VERSION,
                encoding_version,
            ));
        }
        // advisory only
        cursor.read_f64_le().map_err(make_error("min"))?;
        cursor.read_f64_le().map_err(make_error("max"))?;
        let compression = cursor.read_f64_le().map_err(make_error("compression"))?;
        if !is_valid_compression(compression) {
            return Err(Error::deserial(format!(
                "malformed data: compression must be finite and at least 1, got {compression}"
            )));
        }

        let declared = cursor
            .read_i32_le()
            .map_err(make_error("num_centroids"))?;
        let remaining = cursor.remaining();
        let num_centroids = match usize::try_from(declared) {
            Ok(n) if n <= remaining / CENTROID_SIZE => n,
            _ => {
                debug!("rejecting digest declaring {declared} centroids in {remaining} bytes");
                return Err(Error::invalid_centroid_count(declared, remaining));
            }
        };

        let mut centroids: Vec<Centroid> = Vec::with_capacity(num_centroids);
        let mut count_total = 0u64;
        for idx in 0..num_centroids {
            let count = cursor
                .read_i64_le()
                .map_err(make_error("centroid count"))?;
            let mean = cursor.read_f64_le().map_err(make_error("centroid mean"))?;
            let count = check_positive(count, idx)?;
            check_finite(mean, idx)?;
            if let Some(prev) = centroids.last() {
                if mean < prev.mean() {
                    return Err(Error::deserial(
                        "malformed data: centroid means must be non-decreasing",
                    )
                    .with_context("index", idx));
                }
            }
            count_total = count_total
                .checked_add(count)
                .filter(|&total| total <= MAX_TOTAL_COUNT)
                .ok_or_else(|| {
                    Error::deserial("malformed data: total count exceeds i64::MAX")
                        .with_context("index", idx)
                })?;
            centroids.push(Centroid::new(mean, count));
        }

        Ok(TDigest::make(compression, rng, centroids, count_total))
    }

    /// Adds `weight` units of mass at `value`.
    ///
    /// The value joins its nearest centroid if that centroid is below its weight limit, and
    /// otherwise starts a new centroid. The limit is largest near the median and shrinks towards
    /// the tails, which keeps the extreme quantiles accurate. Weight that does not fit under the
    /// limit of its target spills over to the next choice.
    ///
    /// A zero weight is a no-op. [`f64::NAN`], [`f64::INFINITY`] and [`f64::NEG_INFINITY`]
    /// values are ignored.
    ///
    /// # Panics
    ///
    /// Panics if the total count would exceed `i64::MAX`, the largest count the binary
    /// encoding can hold.
    ///
    /// # Examples
    ///
    /// ```
    /// # use tdigest::digest::TDigest;
    /// let mut digest = TDigest::new(100.0);
    /// digest.add(1.0, 1);
    /// digest.add(2.0, 10);
    /// digest.add(f64::NAN, 1);
    /// assert_eq!(digest.count(), 11);
    /// ```
    pub fn add(&mut self, value: f64, weight: u64) {
        if weight == 0 {
            return;
        }
        if !value.is_finite() {
            trace!("ignoring non-finite value {value}");
            return;
        }
        self.count_total = self
            .count_total
            .checked_add(weight)
            .filter(|&total| total <= MAX_TOTAL_COUNT)
            .expect("weight overflow");

        // each pass either places all of the remaining weight or fills one centroid to its limit
        let mut remaining = weight;
        loop {
            let Some(idx) = self.find_add_target(value) else {
                self.insert_centroid(Centroid::new(value, remaining));
                return;
            };

            let count = self.centroids[idx].count();
            let limit = self.weight_limit(idx);
            if count + remaining <= limit {
                self.absorb(idx, value, remaining);
                return;
            }

            let absorbed = limit.saturating_sub(count);
            trace!(
                "splitting value {value} weight={remaining}: centroid {idx} absorbs {absorbed}"
            );
            self.absorb(idx, value, absorbed);
            remaining -= absorbed;
        }
    }

    // index of the centroid value should be added to; None to start a new centroid
    fn find_add_target(&mut self, value: f64) -> Option<usize> {
        let eligible: Vec<usize> = self
            .nearest(value)
            .filter(|&idx| self.has_room(idx))
            .collect();

        match eligible.as_slice() {
            [] => None,
            [only] => Some(*only),
            [lowest, .., highest] => {
                // all below value: take the highest; all above: the lowest; otherwise any
                let any_lesser = eligible
                    .iter()
                    .any(|&idx| self.centroids[idx].mean() < value);
                let any_greater = eligible
                    .iter()
                    .any(|&idx| self.centroids[idx].mean() > value);
                match (any_lesser, any_greater) {
                    (true, false) => Some(*highest),
                    (false, true) => Some(*lowest),
                    _ => Some(eligible[self.rng.random_range(0..eligible.len())]),
                }
            }
        }
    }
}

impl<R, R2> PartialEq<TDigest<R2>> for TDigest<R> {
    fn eq(&self, other: &TDigest<R2>) -> bool {
        self.compression == other.compression
            && self.count_total == other.count_total
            && self.centroids == other.centroids
    }
}

impl<R> fmt::Debug for TDigest<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TDigest")
            .field("compression", &self.compression)
            .field("count_total", &self.count_total)
            .field("centroids", &self.centroids)
            .finish_non_exhaustive()
    }
}

/// One line per centroid with its weight limit and estimated quantile position.
impl<R> fmt::Display for TDigest<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TDigest compression={} count={}",
            self.compression, self.count_total
        )?;
        for (idx, centroid) in self.centroids.iter().enumerate() {
            write!(
                f,
                "\n{centroid} limit={} position={}",
                self.weight_limit(idx),
                self.quantile_of(idx)
            )?;
        }
        Ok(())
    }
}

fn is_valid_compression(compression: f64) -> bool {
    compression.is_finite() && compression >= 1.
}

fn slope(c0: &Centroid, c1: &Centroid) -> f64 {
    (c1.mean() - c0.mean()) / (c1.half_count() + c0.half_count())
}

fn check_positive(count: i64, idx: usize) -> Result<u64, Error> {
    if count < 1 {
        return Err(
            Error::deserial(format!("malformed data: centroid count must be positive, got {count}"))
                .with_context("index", idx),
        );
    }

    Ok(count as u64)
}

fn check_finite(mean: f64, idx: usize) -> Result<(), Error> {
    if !mean.is_finite() {
        return Err(
            Error::deserial(format!("malformed data: centroid mean must be finite, got {mean}"))
                .with_context("index", idx),
        );
    }

    Ok(())
}
