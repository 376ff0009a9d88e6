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

/// the only encoding version ever written or accepted
pub(super) const ENCODING_VERSION: i32 = 1;
/// version (4) + min (8) + max (8) + compression (8) + centroid count (4)
pub(super) const HEADER_SIZE: usize = 32;
/// count (8) + mean (8)
pub(super) const CENTROID_SIZE: usize = 16;
/// largest total weight a count field can carry
pub(super) const MAX_TOTAL_COUNT: u64 = i64::MAX as u64;
/// largest number of centroids the header can declare
pub(super) const MAX_CENTROIDS: usize = i32::MAX as usize;
