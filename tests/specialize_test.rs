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

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Int64Array};
use arrow::datatypes::DataType;

use basalt::basalt_config::ExecConfig;
use basalt::exec::expr::{ExprArena, ExprNode};
use basalt::exec::node::aggregate::{AggFunction, AggregatePlan};
use basalt::exec::operators::aggregate::specialize::{
    BatchInput, BuildContext, BuiltinSpecializer, SpecializeSignature, SpecializedBatchFn,
    UpdateSpecializer,
};
use basalt::exec::operators::aggregate::AggregateOperatorFactory;
use basalt::SlotId;

use common::{chunk_of, TestSource};

/// Delegates to the builtin engine while counting routine invocations, so
/// tests can assert the specialized path actually ran.
struct CountingSpecializer {
    inner: BuiltinSpecializer,
    calls: Arc<AtomicUsize>,
}

impl UpdateSpecializer for CountingSpecializer {
    fn name(&self) -> &str {
        "counting"
    }

    fn specialize(&self, sig: &SpecializeSignature<'_>) -> Option<SpecializedBatchFn> {
        let inner = self.inner.specialize(sig)?;
        let calls = Arc::clone(&self.calls);
        Some(Box::new(
            move |ctx: &mut BuildContext<'_>, input: &BatchInput<'_>| {
                calls.fetch_add(1, Ordering::SeqCst);
                inner(ctx, input)
            },
        ))
    }
}

fn agg_func(name: &str, inputs: Vec<basalt::exec::expr::ExprId>) -> AggFunction {
    AggFunction {
        name: name.to_string(),
        inputs,
        input_is_intermediate: false,
        types: None,
    }
}

fn run_grouped(
    enable_specialization: bool,
    need_finalize: bool,
    calls: Option<Arc<AtomicUsize>>,
) -> HashMap<Option<i64>, Vec<Option<i64>>> {
    let mut arena = ExprArena::default();
    let k = arena.push_typed(ExprNode::SlotId(SlotId::new(1)), DataType::Int64);
    let v = arena.push_typed(ExprNode::SlotId(SlotId::new(2)), DataType::Int64);
    let plan = AggregatePlan {
        group_by: vec![k],
        functions: vec![
            agg_func("count", vec![]),
            agg_func("sum", vec![v]),
            agg_func("min", vec![v]),
            agg_func("max", vec![v]),
        ],
        need_finalize,
        output_slots: vec![
            SlotId::new(1),
            SlotId::new(3),
            SlotId::new(4),
            SlotId::new(5),
            SlotId::new(6),
        ],
    };
    let config = ExecConfig {
        enable_specialization,
        ..ExecConfig::default()
    };
    let factory =
        AggregateOperatorFactory::new(1, Arc::new(arena), Arc::new(plan), config).expect("factory");
    let mut op = factory.create();
    if let Some(calls) = calls {
        op.set_specializer(Arc::new(CountingSpecializer {
            inner: BuiltinSpecializer,
            calls,
        }));
    }
    op.prepare().expect("prepare");

    let chunks = vec![
        chunk_of(vec![
            (
                "k",
                1,
                DataType::Int64,
                Arc::new(Int64Array::from(vec![Some(1), Some(2), None, Some(1)])) as ArrayRef,
            ),
            (
                "v",
                2,
                DataType::Int64,
                Arc::new(Int64Array::from(vec![Some(10), None, Some(7), Some(-3)])) as ArrayRef,
            ),
        ]),
        chunk_of(vec![
            (
                "k",
                1,
                DataType::Int64,
                Arc::new(Int64Array::from(vec![Some(2), None, Some(3)])) as ArrayRef,
            ),
            (
                "v",
                2,
                DataType::Int64,
                Arc::new(Int64Array::from(vec![Some(5), Some(2), Some(0)])) as ArrayRef,
            ),
        ]),
    ];
    op.build_from(&mut TestSource::new(chunks)).expect("build");

    let mut out = HashMap::new();
    while let Some(chunk) = op.pull_chunk().expect("pull") {
        let keys = chunk.columns()[0]
            .as_any()
            .downcast_ref::<Int64Array>()
            .expect("keys");
        for row in 0..chunk.len() {
            let key = (!keys.is_null(row)).then(|| keys.value(row));
            let mut values = Vec::new();
            for col in &chunk.columns()[1..] {
                let arr = col
                    .as_any()
                    .downcast_ref::<Int64Array>()
                    .expect("int64 aggregate");
                values.push((!arr.is_null(row)).then(|| arr.value(row)));
            }
            out.insert(key, values);
        }
    }
    out
}

#[test]
fn specialized_and_interpreted_paths_agree() {
    let interpreted = run_grouped(false, true, None);
    let specialized = run_grouped(true, true, None);
    assert_eq!(interpreted, specialized);
    assert_eq!(
        interpreted.get(&Some(1)).cloned(),
        Some(vec![Some(2), Some(7), Some(-3), Some(10)])
    );
    assert_eq!(
        interpreted.get(&None).cloned(),
        Some(vec![Some(2), Some(9), Some(2), Some(7)])
    );
}

#[test]
fn specialized_and_interpreted_intermediates_are_identical() {
    // Serialize path: accumulator state is emitted as-is, so identical maps
    // mean bit-identical intermediate representations for these kernels.
    let interpreted = run_grouped(false, false, None);
    let specialized = run_grouped(true, false, None);
    assert_eq!(interpreted, specialized);
}

#[test]
fn specialized_routine_actually_runs() {
    let calls = Arc::new(AtomicUsize::new(0));
    let _ = run_grouped(true, true, Some(Arc::clone(&calls)));
    // One invocation per input chunk.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn unsupported_signature_falls_back_without_behavior_change() {
    // avg is outside the builtin fast path; with specialization enabled the
    // operator must silently use the interpreted routine and produce the
    // same results.
    for enable in [false, true] {
        let mut arena = ExprArena::default();
        let k = arena.push_typed(ExprNode::SlotId(SlotId::new(1)), DataType::Int64);
        let v = arena.push_typed(ExprNode::SlotId(SlotId::new(2)), DataType::Int64);
        let plan = AggregatePlan {
            group_by: vec![k],
            functions: vec![agg_func("avg", vec![v])],
            need_finalize: true,
            output_slots: vec![SlotId::new(1), SlotId::new(3)],
        };
        let config = ExecConfig {
            enable_specialization: enable,
            ..ExecConfig::default()
        };
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = AggregateOperatorFactory::new(1, Arc::new(arena), Arc::new(plan), config)
            .expect("factory");
        let mut op = factory.create();
        op.set_specializer(Arc::new(CountingSpecializer {
            inner: BuiltinSpecializer,
            calls: Arc::clone(&calls),
        }));
        op.prepare().expect("prepare");
        let chunk = chunk_of(vec![
            (
                "k",
                1,
                DataType::Int64,
                Arc::new(Int64Array::from(vec![1, 1])) as ArrayRef,
            ),
            (
                "v",
                2,
                DataType::Int64,
                Arc::new(Int64Array::from(vec![4, 6])) as ArrayRef,
            ),
        ]);
        op.build_from(&mut TestSource::new(vec![chunk]))
            .expect("build");
        let out = op.pull_chunk().expect("pull").expect("chunk");
        let avgs = out.columns()[1]
            .as_any()
            .downcast_ref::<arrow::array::Float64Array>()
            .expect("avg");
        assert_eq!(avgs.value(0), 5.0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
