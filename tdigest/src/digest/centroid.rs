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

/// A weighted cluster centre: `count` observations summarized by their running mean.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Centroid {
    mean: f64,
    count: u64,
}

impl Centroid {
    pub(super) fn new(mean: f64, count: u64) -> Self {
        debug_assert!(count >= 1, "centroid count must be at least 1");
        Centroid { mean, count }
    }

    /// Returns the mean of the observations in this centroid.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Returns the total weight of the observations in this centroid.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub(super) fn half_count(&self) -> f64 {
        self.count as f64 / 2.
    }

    /// Folds `weight` units at `value` into the running mean.
    ///
    /// The count is bumped before the delta is divided by it.
    pub(super) fn absorb(&mut self, value: f64, weight: u64) {
        self.count = self.count.checked_add(weight).expect("weight overflow");
        self.mean += weight as f64 * (value - self.mean) / self.count as f64;
    }
}

impl fmt::Display for Centroid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{{{} x{}}}", self.mean, self.count)
    }
}
