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
//! Group-key hash table for hash aggregation.
//!
//! Responsibilities:
//! - Maps tuples of evaluated grouping values to dense group ids with a
//!   single probe-or-insert pass per input row.
//! - Stores grouping values columnar for re-projection into output chunks.
//!
//! Keys are never removed; the table and its key storage are released as a
//! whole when the owning operator is reset or closed.

pub mod hash;
pub mod key_builder;
pub mod key_column;
pub mod key_storage;
pub mod key_strategy;
pub mod key_table;
