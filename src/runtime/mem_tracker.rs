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
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Tracks logical memory usage for a component and its ancestors.
///
/// This is a lightweight accounting utility that only records bytes explicitly
/// reported by the caller. It does NOT reflect real process RSS or allocator
/// statistics. A tracker with a non-negative limit enforces it in
/// [`MemTracker::try_consume`]; every budgeted allocation in the aggregation
/// path goes through that call, and a breach is a hard error with no retry.
#[derive(Debug)]
pub struct MemTracker {
    label: String,
    limit: i64,
    parent: Option<Arc<MemTracker>>,
    current: AtomicI64,
    peak: AtomicI64,
    allocated: AtomicI64,
    deallocated: AtomicI64,
    children: Mutex<Vec<Weak<MemTracker>>>,
}

impl MemTracker {
    /// Create a root tracker with no parent and no limit.
    pub fn new_root(label: impl Into<String>) -> Arc<Self> {
        Self::new_root_with_limit(label, -1)
    }

    /// Create a root tracker with a byte limit; negative means unlimited.
    pub fn new_root_with_limit(label: impl Into<String>, limit: i64) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            limit,
            parent: None,
            current: AtomicI64::new(0),
            peak: AtomicI64::new(0),
            allocated: AtomicI64::new(0),
            deallocated: AtomicI64::new(0),
            children: Mutex::new(Vec::new()),
        })
    }

    /// Create a child tracker with the provided parent.
    pub fn new_child(label: impl Into<String>, parent: &Arc<MemTracker>) -> Arc<Self> {
        Self::new_child_with_limit(label, -1, parent)
    }

    /// Create a child tracker with its own limit in addition to the ancestors'.
    pub fn new_child_with_limit(
        label: impl Into<String>,
        limit: i64,
        parent: &Arc<MemTracker>,
    ) -> Arc<Self> {
        let child = Arc::new(Self {
            label: label.into(),
            limit,
            parent: Some(Arc::clone(parent)),
            current: AtomicI64::new(0),
            peak: AtomicI64::new(0),
            allocated: AtomicI64::new(0),
            deallocated: AtomicI64::new(0),
            children: Mutex::new(Vec::new()),
        });
        parent
            .children
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::downgrade(&child));
        child
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn current(&self) -> i64 {
        self.current.load(Ordering::Relaxed)
    }

    pub fn peak(&self) -> i64 {
        self.peak.load(Ordering::Relaxed)
    }

    pub fn allocated(&self) -> i64 {
        self.allocated.load(Ordering::Relaxed)
    }

    pub fn deallocated(&self) -> i64 {
        self.deallocated.load(Ordering::Relaxed)
    }

    pub fn children(&self) -> Vec<Arc<MemTracker>> {
        let mut out = Vec::new();
        let guard = self.children.lock().unwrap_or_else(|e| e.into_inner());
        for weak in guard.iter() {
            if let Some(child) = weak.upgrade() {
                out.push(child);
            }
        }
        out
    }

    /// Increase consumption for this tracker and all ancestors, ignoring limits.
    ///
    /// Used for transfers of bytes that are already accounted elsewhere.
    pub fn consume(&self, bytes: i64) {
        if bytes <= 0 {
            return;
        }
        let mut tracker: Option<&MemTracker> = Some(self);
        while let Some(current) = tracker {
            let new_value = current.current.fetch_add(bytes, Ordering::AcqRel) + bytes;
            current.allocated.fetch_add(bytes, Ordering::AcqRel);
            current.update_peak(new_value);
            tracker = current.parent.as_deref();
        }
    }

    /// Increase consumption, failing if it would push this tracker or any
    /// ancestor above its limit. On failure nothing is consumed.
    pub fn try_consume(&self, bytes: i64) -> Result<(), String> {
        if bytes <= 0 {
            return Ok(());
        }
        let mut applied: Vec<&MemTracker> = Vec::new();
        let mut tracker: Option<&MemTracker> = Some(self);
        while let Some(current) = tracker {
            let new_value = current.current.fetch_add(bytes, Ordering::AcqRel) + bytes;
            if current.limit >= 0 && new_value > current.limit {
                current.current.fetch_sub(bytes, Ordering::AcqRel);
                for undo in &applied {
                    undo.current.fetch_sub(bytes, Ordering::AcqRel);
                    undo.allocated.fetch_sub(bytes, Ordering::AcqRel);
                }
                return Err(format!(
                    "memory limit exceeded: tracker={} limit={} consumption={} requested={}",
                    current.label,
                    current.limit,
                    new_value - bytes,
                    bytes
                ));
            }
            current.allocated.fetch_add(bytes, Ordering::AcqRel);
            current.update_peak(new_value);
            applied.push(current);
            tracker = current.parent.as_deref();
        }
        Ok(())
    }

    /// Decrease consumption for this tracker and all ancestors.
    pub fn release(&self, bytes: i64) {
        if bytes <= 0 {
            return;
        }
        let mut tracker: Option<&MemTracker> = Some(self);
        while let Some(current) = tracker {
            current.current.fetch_sub(bytes, Ordering::AcqRel);
            current.deallocated.fetch_add(bytes, Ordering::AcqRel);
            tracker = current.parent.as_deref();
        }
    }

    fn update_peak(&self, value: i64) {
        let mut prev = self.peak.load(Ordering::Relaxed);
        while value > prev {
            match self
                .peak
                .compare_exchange(prev, value, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(actual) => prev = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_propagates_to_ancestors() {
        let root = MemTracker::new_root("root");
        let child = MemTracker::new_child("child", &root);
        child.consume(100);
        assert_eq!(child.current(), 100);
        assert_eq!(root.current(), 100);
        child.release(40);
        assert_eq!(child.current(), 60);
        assert_eq!(root.current(), 60);
        assert_eq!(root.peak(), 100);
    }

    #[test]
    fn try_consume_enforces_ancestor_limit() {
        let root = MemTracker::new_root_with_limit("query", 100);
        let child = MemTracker::new_child("operator", &root);
        child.try_consume(80).expect("within limit");
        let err = child.try_consume(30).expect_err("expected breach");
        assert!(err.contains("memory limit exceeded"), "err={}", err);
        assert!(err.contains("query"), "err={}", err);
        // Nothing leaked by the failed attempt.
        assert_eq!(child.current(), 80);
        assert_eq!(root.current(), 80);
        child.try_consume(20).expect("still within limit");
    }

    #[test]
    fn unlimited_tracker_never_fails() {
        let root = MemTracker::new_root("root");
        root.try_consume(i64::MAX / 2).expect("no limit");
    }
}
