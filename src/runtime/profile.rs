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
//! Runtime counters and info strings attached to operator instances.
//!
//! The profile is a pure side channel: operators update it when present and
//! behave identically when it is absent.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Unit tag for counters, mirroring the engine profile conventions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CounterUnit {
    Unit,
    TimeNs,
    Bytes,
    DoubleValue,
}

#[derive(Debug)]
struct Counter {
    unit: CounterUnit,
    value: AtomicI64,
}

/// Shared handle to a single named counter.
#[derive(Clone, Debug)]
pub struct CounterRef {
    inner: Arc<Counter>,
}

impl CounterRef {
    pub fn unit(&self) -> CounterUnit {
        self.inner.unit
    }

    pub fn set(&self, value: i64) {
        self.inner.value.store(value, Ordering::Relaxed);
    }

    pub fn add(&self, delta: i64) {
        self.inner.value.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn value(&self) -> i64 {
        self.inner.value.load(Ordering::Relaxed)
    }

    /// Store a fractional value (e.g. a load factor) as raw bits.
    pub fn set_f64(&self, value: f64) {
        self.inner
            .value
            .store(value.to_bits() as i64, Ordering::Relaxed);
    }

    pub fn value_f64(&self) -> f64 {
        f64::from_bits(self.inner.value.load(Ordering::Relaxed) as u64)
    }
}

#[derive(Clone, Debug)]
pub struct RuntimeProfile {
    inner: Arc<RuntimeProfileInner>,
}

#[derive(Debug)]
struct RuntimeProfileInner {
    name: RwLock<String>,
    counters: Mutex<HashMap<String, CounterRef>>,
    info_strings: Mutex<BTreeMap<String, String>>,
    children: Mutex<Vec<RuntimeProfile>>,
}

impl RuntimeProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RuntimeProfileInner {
                name: RwLock::new(name.into()),
                counters: Mutex::new(HashMap::new()),
                info_strings: Mutex::new(BTreeMap::new()),
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> String {
        self.inner
            .name
            .read()
            .map(|s| s.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    pub fn set_name(&self, name: impl Into<String>) {
        let mut guard = self.inner.name.write().unwrap_or_else(|e| e.into_inner());
        *guard = name.into();
    }

    pub fn children(&self) -> Vec<RuntimeProfile> {
        self.inner
            .children
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn add_child(&self, child: RuntimeProfile) {
        let mut children = self
            .inner
            .children
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        children.push(child);
    }

    pub fn add_info_string(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut guard = self
            .inner
            .info_strings
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        guard.insert(key.into(), value.into());
    }

    pub fn get_info_string(&self, key: &str) -> Option<String> {
        self.inner
            .info_strings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn add_counter(&self, name: impl Into<String>, unit: CounterUnit) -> CounterRef {
        let name = name.into();
        let mut guard = self.inner.counters.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .entry(name)
            .or_insert_with(|| CounterRef {
                inner: Arc::new(Counter {
                    unit,
                    value: AtomicI64::new(0),
                }),
            })
            .clone()
    }

    pub fn counter_add(&self, name: &str, unit: CounterUnit, delta: i64) {
        self.add_counter(name, unit).add(delta);
    }

    pub fn counter_set(&self, name: &str, unit: CounterUnit, value: i64) {
        self.add_counter(name, unit).set(value);
    }

    pub fn get_counter(&self, name: &str) -> Option<CounterRef> {
        self.inner
            .counters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let profile = RuntimeProfile::new("AGGREGATE (id=1)");
        profile.counter_add("InputRowCount", CounterUnit::Unit, 3);
        profile.counter_add("InputRowCount", CounterUnit::Unit, 4);
        let c = profile.get_counter("InputRowCount").expect("counter");
        assert_eq!(c.value(), 7);
    }

    #[test]
    fn double_counter_round_trips() {
        let profile = RuntimeProfile::new("p");
        let c = profile.add_counter("HashTableLoadFactor", CounterUnit::DoubleValue);
        c.set_f64(0.75);
        assert!((c.value_f64() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn info_strings_are_replaced() {
        let profile = RuntimeProfile::new("p");
        profile.add_info_string("GroupingKeys", "2");
        profile.add_info_string("GroupingKeys", "3");
        assert_eq!(profile.get_info_string("GroupingKeys").as_deref(), Some("3"));
    }
}
