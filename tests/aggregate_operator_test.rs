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
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, Float64Array, Int64Array, StringArray,
};
use arrow::datatypes::DataType;

use basalt::basalt_config::ExecConfig;
use basalt::exec::chunk::Chunk;
use basalt::exec::expr::{ExprArena, ExprNode, LiteralValue};
use basalt::exec::node::aggregate::{AggFunction, AggregatePlan};
use basalt::exec::operators::aggregate::{AggPhase, AggregateOperatorFactory, AggregationOperator};
use basalt::runtime::profile::RuntimeProfile;
use basalt::{MemTracker, SlotId};

use common::{chunk_of, FailingSource, TestSource};

fn agg_func(name: &str, inputs: Vec<basalt::exec::expr::ExprId>) -> AggFunction {
    AggFunction {
        name: name.to_string(),
        inputs,
        input_is_intermediate: false,
        types: None,
    }
}

fn make_operator(
    arena: ExprArena,
    plan: AggregatePlan,
    config: ExecConfig,
) -> AggregationOperator {
    let factory = AggregateOperatorFactory::new(1, Arc::new(arena), Arc::new(plan), config)
        .expect("factory");
    factory.create()
}

fn drain(op: &mut AggregationOperator) -> Vec<Chunk> {
    let mut out = Vec::new();
    while let Some(chunk) = op.pull_chunk().expect("pull chunk") {
        out.push(chunk);
    }
    out
}

fn utf8_key_i64_sums(chunks: &[Chunk]) -> HashMap<Option<String>, Option<i64>> {
    let mut out = HashMap::new();
    for chunk in chunks {
        let keys = chunk.columns()[0]
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("utf8 keys");
        let sums = chunk.columns()[1]
            .as_any()
            .downcast_ref::<Int64Array>()
            .expect("int64 sums");
        for row in 0..chunk.len() {
            let key = (!keys.is_null(row)).then(|| keys.value(row).to_string());
            let sum = (!sums.is_null(row)).then(|| sums.value(row));
            out.insert(key, sum);
        }
    }
    out
}

#[test]
fn grouped_sum_over_two_groups() {
    let mut arena = ExprArena::default();
    let k = arena.push_typed(ExprNode::SlotId(SlotId::new(1)), DataType::Utf8);
    let v = arena.push_typed(ExprNode::SlotId(SlotId::new(2)), DataType::Int64);
    let plan = AggregatePlan {
        group_by: vec![k],
        functions: vec![agg_func("sum", vec![v])],
        need_finalize: true,
        output_slots: vec![SlotId::new(1), SlotId::new(3)],
    };
    let mut op = make_operator(arena, plan, ExecConfig::default());
    op.prepare().expect("prepare");

    let chunk = chunk_of(vec![
        (
            "k",
            1,
            DataType::Utf8,
            Arc::new(StringArray::from(vec!["a", "a", "b"])) as ArrayRef,
        ),
        (
            "v",
            2,
            DataType::Int64,
            Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef,
        ),
    ]);
    op.build_from(&mut TestSource::new(vec![chunk]))
        .expect("build");

    let out = drain(&mut op);
    let sums = utf8_key_i64_sums(&out);
    assert_eq!(sums.len(), 2);
    assert_eq!(sums.get(&Some("a".to_string())).copied(), Some(Some(3)));
    assert_eq!(sums.get(&Some("b".to_string())).copied(), Some(Some(3)));
}

#[test]
fn output_rows_equal_distinct_keys_and_nulls_group_together() {
    let mut arena = ExprArena::default();
    let k = arena.push_typed(ExprNode::SlotId(SlotId::new(1)), DataType::Int64);
    let plan = AggregatePlan {
        group_by: vec![k],
        functions: vec![agg_func("count", vec![])],
        need_finalize: true,
        output_slots: vec![SlotId::new(1), SlotId::new(2)],
    };
    let mut op = make_operator(arena, plan, ExecConfig::default());
    op.prepare().expect("prepare");

    let chunk = chunk_of(vec![(
        "k",
        1,
        DataType::Int64,
        Arc::new(Int64Array::from(vec![
            Some(1),
            None,
            Some(1),
            Some(2),
            None,
            None,
        ])) as ArrayRef,
    )]);
    op.build_from(&mut TestSource::new(vec![chunk]))
        .expect("build");

    let out = drain(&mut op);
    let mut counts: HashMap<Option<i64>, i64> = HashMap::new();
    for chunk in &out {
        let keys = chunk.columns()[0]
            .as_any()
            .downcast_ref::<Int64Array>()
            .expect("keys");
        let cnts = chunk.columns()[1]
            .as_any()
            .downcast_ref::<Int64Array>()
            .expect("counts");
        for row in 0..chunk.len() {
            let key = (!keys.is_null(row)).then(|| keys.value(row));
            counts.insert(key, cnts.value(row));
        }
    }
    // Three distinct keys: 1, 2, and the NULL group.
    assert_eq!(counts.len(), 3);
    assert_eq!(counts.get(&Some(1)).copied(), Some(2));
    assert_eq!(counts.get(&Some(2)).copied(), Some(1));
    assert_eq!(counts.get(&None).copied(), Some(3));
}

#[test]
fn ungrouped_count_star_on_empty_input_returns_zero_row() {
    let mut arena = ExprArena::default();
    let _ = arena.push_typed(ExprNode::SlotId(SlotId::new(1)), DataType::Int64);
    let plan = AggregatePlan {
        group_by: vec![],
        functions: vec![agg_func("count", vec![])],
        need_finalize: true,
        output_slots: vec![SlotId::new(2)],
    };
    let mut op = make_operator(arena, plan, ExecConfig::default());
    op.prepare().expect("prepare");
    op.build_from(&mut TestSource::new(vec![])).expect("build");

    let out = drain(&mut op);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].len(), 1);
    let counts = out[0].columns()[0]
        .as_any()
        .downcast_ref::<Int64Array>()
        .expect("counts");
    assert_eq!(counts.value(0), 0);
}

#[test]
fn ungrouped_zero_width_output() {
    // Empty input: the singleton tuple is absent, so no output rows at all.
    let arena = ExprArena::default();
    let plan = AggregatePlan {
        group_by: vec![],
        functions: vec![],
        need_finalize: true,
        output_slots: vec![],
    };
    let mut op = make_operator(arena, plan, ExecConfig::default());
    op.prepare().expect("prepare");
    op.build_from(&mut TestSource::new(vec![])).expect("build");
    assert!(op.pull_chunk().expect("pull").is_none());

    // Non-empty input: exactly one row with no columns.
    let arena = ExprArena::default();
    let plan = AggregatePlan {
        group_by: vec![],
        functions: vec![],
        need_finalize: true,
        output_slots: vec![],
    };
    let mut op = make_operator(arena, plan, ExecConfig::default());
    op.prepare().expect("prepare");
    let chunk = chunk_of(vec![(
        "x",
        1,
        DataType::Int64,
        Arc::new(Int64Array::from(vec![10, 20])) as ArrayRef,
    )]);
    op.build_from(&mut TestSource::new(vec![chunk]))
        .expect("build");
    let out = op.pull_chunk().expect("pull").expect("one chunk");
    assert_eq!(out.len(), 1);
    assert_eq!(out.columns().len(), 0);
    assert!(op.pull_chunk().expect("pull").is_none());
}

#[test]
fn memory_budget_breach_fails_before_any_output() {
    let mut arena = ExprArena::default();
    let k = arena.push_typed(ExprNode::SlotId(SlotId::new(1)), DataType::Int64);
    let plan = AggregatePlan {
        group_by: vec![k],
        functions: vec![agg_func("count", vec![])],
        need_finalize: true,
        output_slots: vec![SlotId::new(1), SlotId::new(2)],
    };
    let mut op = make_operator(arena, plan, ExecConfig::default());
    let query_tracker = MemTracker::new_root_with_limit("query", 2 * 1024);
    op.set_mem_tracker(MemTracker::new_child("operator", &query_tracker));
    op.prepare().expect("prepare");

    let values: Vec<i64> = (0..100_000).collect();
    let chunk = chunk_of(vec![(
        "k",
        1,
        DataType::Int64,
        Arc::new(Int64Array::from(values)) as ArrayRef,
    )]);
    let err = op
        .build_from(&mut TestSource::new(vec![chunk]))
        .expect_err("expected out-of-memory");
    assert!(err.contains("memory limit exceeded"), "err={}", err);
    assert_eq!(op.phase(), AggPhase::Building);
    // The operator never reached the produce phase; pulling is a state error,
    // not partial output.
    assert!(op.pull_chunk().is_err());
}

#[test]
fn aggregate_results_are_order_independent() {
    let inputs = [
        vec![(1i64, 5i64), (1, 7), (2, 9), (2, 1), (3, 4)],
        vec![(3i64, 4i64), (2, 1), (1, 7), (2, 9), (1, 5)],
    ];
    let mut results = Vec::new();
    for rows in &inputs {
        let mut arena = ExprArena::default();
        let k = arena.push_typed(ExprNode::SlotId(SlotId::new(1)), DataType::Int64);
        let v = arena.push_typed(ExprNode::SlotId(SlotId::new(2)), DataType::Int64);
        let plan = AggregatePlan {
            group_by: vec![k],
            functions: vec![
                agg_func("sum", vec![v]),
                agg_func("count", vec![v]),
                agg_func("min", vec![v]),
                agg_func("max", vec![v]),
            ],
            need_finalize: true,
            output_slots: vec![
                SlotId::new(1),
                SlotId::new(3),
                SlotId::new(4),
                SlotId::new(5),
                SlotId::new(6),
            ],
        };
        let mut op = make_operator(arena, plan, ExecConfig::default());
        op.prepare().expect("prepare");
        let keys: Vec<i64> = rows.iter().map(|(k, _)| *k).collect();
        let vals: Vec<i64> = rows.iter().map(|(_, v)| *v).collect();
        let chunk = chunk_of(vec![
            (
                "k",
                1,
                DataType::Int64,
                Arc::new(Int64Array::from(keys)) as ArrayRef,
            ),
            (
                "v",
                2,
                DataType::Int64,
                Arc::new(Int64Array::from(vals)) as ArrayRef,
            ),
        ]);
        op.build_from(&mut TestSource::new(vec![chunk]))
            .expect("build");

        let mut by_key: HashMap<i64, (i64, i64, i64, i64)> = HashMap::new();
        for chunk in drain(&mut op) {
            let cols: Vec<&Int64Array> = (0..5)
                .map(|i| {
                    chunk.columns()[i]
                        .as_any()
                        .downcast_ref::<Int64Array>()
                        .expect("int64")
                })
                .collect();
            for row in 0..chunk.len() {
                by_key.insert(
                    cols[0].value(row),
                    (
                        cols[1].value(row),
                        cols[2].value(row),
                        cols[3].value(row),
                        cols[4].value(row),
                    ),
                );
            }
        }
        results.push(by_key);
    }
    assert_eq!(results[0], results[1]);
    assert_eq!(results[0].get(&1).copied(), Some((12, 2, 5, 7)));
    assert_eq!(results[0].get(&2).copied(), Some((10, 2, 1, 9)));
    assert_eq!(results[0].get(&3).copied(), Some((4, 1, 4, 4)));
}

#[test]
fn output_is_emitted_in_bounded_chunks() {
    let mut arena = ExprArena::default();
    let k = arena.push_typed(ExprNode::SlotId(SlotId::new(1)), DataType::Int64);
    let plan = AggregatePlan {
        group_by: vec![k],
        functions: vec![agg_func("count", vec![])],
        need_finalize: true,
        output_slots: vec![SlotId::new(1), SlotId::new(2)],
    };
    let config = ExecConfig {
        chunk_size: 2,
        ..ExecConfig::default()
    };
    let mut op = make_operator(arena, plan, config);
    op.prepare().expect("prepare");

    let chunk = chunk_of(vec![(
        "k",
        1,
        DataType::Int64,
        Arc::new(Int64Array::from(vec![1, 2, 3, 4, 5])) as ArrayRef,
    )]);
    op.build_from(&mut TestSource::new(vec![chunk]))
        .expect("build");

    let out = drain(&mut op);
    let sizes: Vec<usize> = out.iter().map(|c| c.len()).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
}

#[test]
fn reset_allows_a_second_build_cycle() {
    let mut arena = ExprArena::default();
    let k = arena.push_typed(ExprNode::SlotId(SlotId::new(1)), DataType::Int64);
    let v = arena.push_typed(ExprNode::SlotId(SlotId::new(2)), DataType::Int64);
    let plan = AggregatePlan {
        group_by: vec![k],
        functions: vec![agg_func("sum", vec![v])],
        need_finalize: true,
        output_slots: vec![SlotId::new(1), SlotId::new(3)],
    };
    let mut op = make_operator(arena, plan, ExecConfig::default());
    op.prepare().expect("prepare");

    let first = chunk_of(vec![
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
            Arc::new(Int64Array::from(vec![10, 20])) as ArrayRef,
        ),
    ]);
    op.build_from(&mut TestSource::new(vec![first]))
        .expect("build");
    let out = drain(&mut op);
    assert_eq!(out.iter().map(|c| c.len()).sum::<usize>(), 1);

    op.reset().expect("reset");
    assert_eq!(op.phase(), AggPhase::Prepared);

    let second = chunk_of(vec![
        (
            "k",
            1,
            DataType::Int64,
            Arc::new(Int64Array::from(vec![7, 8, 7])) as ArrayRef,
        ),
        (
            "v",
            2,
            DataType::Int64,
            Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef,
        ),
    ]);
    op.build_from(&mut TestSource::new(vec![second]))
        .expect("second build");
    let out = drain(&mut op);
    let mut sums: HashMap<i64, i64> = HashMap::new();
    for chunk in &out {
        let keys = chunk.columns()[0]
            .as_any()
            .downcast_ref::<Int64Array>()
            .expect("keys");
        let vals = chunk.columns()[1]
            .as_any()
            .downcast_ref::<Int64Array>()
            .expect("sums");
        for row in 0..chunk.len() {
            sums.insert(keys.value(row), vals.value(row));
        }
    }
    assert_eq!(sums.len(), 2);
    assert_eq!(sums.get(&7).copied(), Some(4));
    assert_eq!(sums.get(&8).copied(), Some(2));
}

#[test]
fn grouped_avg_finalizes_to_ratio() {
    let mut arena = ExprArena::default();
    let k = arena.push_typed(ExprNode::SlotId(SlotId::new(1)), DataType::Int64);
    let v = arena.push_typed(ExprNode::SlotId(SlotId::new(2)), DataType::Int64);
    let plan = AggregatePlan {
        group_by: vec![k],
        functions: vec![agg_func("avg", vec![v])],
        need_finalize: true,
        output_slots: vec![SlotId::new(1), SlotId::new(3)],
    };
    let mut op = make_operator(arena, plan, ExecConfig::default());
    op.prepare().expect("prepare");

    let chunk = chunk_of(vec![
        (
            "k",
            1,
            DataType::Int64,
            Arc::new(Int64Array::from(vec![1, 1, 2])) as ArrayRef,
        ),
        (
            "v",
            2,
            DataType::Int64,
            Arc::new(Int64Array::from(vec![Some(1), Some(2), None])) as ArrayRef,
        ),
    ]);
    op.build_from(&mut TestSource::new(vec![chunk]))
        .expect("build");

    let mut avgs: HashMap<i64, Option<f64>> = HashMap::new();
    for chunk in drain(&mut op) {
        let keys = chunk.columns()[0]
            .as_any()
            .downcast_ref::<Int64Array>()
            .expect("keys");
        let vals = chunk.columns()[1]
            .as_any()
            .downcast_ref::<Float64Array>()
            .expect("avg");
        for row in 0..chunk.len() {
            let v = (!vals.is_null(row)).then(|| vals.value(row));
            avgs.insert(keys.value(row), v);
        }
    }
    assert_eq!(avgs.get(&1).copied(), Some(Some(1.5)));
    // Every input value for key 2 was NULL, so its average is NULL.
    assert_eq!(avgs.get(&2).copied(), Some(None));
}

#[test]
fn expression_failure_aborts_the_build() {
    let mut arena = ExprArena::default();
    let k = arena.push_typed(ExprNode::SlotId(SlotId::new(1)), DataType::Int64);
    let v = arena.push_typed(ExprNode::SlotId(SlotId::new(2)), DataType::Int64);
    let max = arena.push_typed(
        ExprNode::Literal(LiteralValue::Int64(i64::MAX)),
        DataType::Int64,
    );
    let sum_expr = arena.push_typed(ExprNode::Add(v, max), DataType::Int64);
    let plan = AggregatePlan {
        group_by: vec![k],
        functions: vec![agg_func("sum", vec![sum_expr])],
        need_finalize: true,
        output_slots: vec![SlotId::new(1), SlotId::new(3)],
    };
    let mut op = make_operator(arena, plan, ExecConfig::default());
    op.prepare().expect("prepare");

    let chunk = chunk_of(vec![
        (
            "k",
            1,
            DataType::Int64,
            Arc::new(Int64Array::from(vec![1])) as ArrayRef,
        ),
        (
            "v",
            2,
            DataType::Int64,
            Arc::new(Int64Array::from(vec![1])) as ArrayRef,
        ),
    ]);
    let err = op
        .build_from(&mut TestSource::new(vec![chunk]))
        .expect_err("expected overflow");
    assert!(err.contains("overflow"), "err={}", err);
}

#[test]
fn upstream_failure_propagates() {
    let mut arena = ExprArena::default();
    let k = arena.push_typed(ExprNode::SlotId(SlotId::new(1)), DataType::Int64);
    let plan = AggregatePlan {
        group_by: vec![k],
        functions: vec![agg_func("count", vec![])],
        need_finalize: true,
        output_slots: vec![SlotId::new(1), SlotId::new(2)],
    };
    let mut op = make_operator(arena, plan, ExecConfig::default());
    op.prepare().expect("prepare");

    let chunk = chunk_of(vec![(
        "k",
        1,
        DataType::Int64,
        Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef,
    )]);
    let mut source = FailingSource::new(vec![chunk], "scan failed: disk error");
    let err = op.build_from(&mut source).expect_err("expected failure");
    assert!(err.contains("scan failed"), "err={}", err);
}

#[test]
fn serialized_multi_column_keys_group_correctly() {
    let mut arena = ExprArena::default();
    let k1 = arena.push_typed(ExprNode::SlotId(SlotId::new(1)), DataType::Int64);
    let k2 = arena.push_typed(ExprNode::SlotId(SlotId::new(2)), DataType::Utf8);
    let plan = AggregatePlan {
        group_by: vec![k1, k2],
        functions: vec![agg_func("count", vec![])],
        need_finalize: true,
        output_slots: vec![SlotId::new(1), SlotId::new(2), SlotId::new(3)],
    };
    let mut op = make_operator(arena, plan, ExecConfig::default());
    op.prepare().expect("prepare");

    let chunk = chunk_of(vec![
        (
            "k1",
            1,
            DataType::Int64,
            Arc::new(Int64Array::from(vec![Some(1), Some(1), Some(1), None])) as ArrayRef,
        ),
        (
            "k2",
            2,
            DataType::Utf8,
            Arc::new(StringArray::from(vec![Some("x"), Some("y"), Some("x"), None])) as ArrayRef,
        ),
    ]);
    op.build_from(&mut TestSource::new(vec![chunk]))
        .expect("build");

    let mut counts: HashMap<(Option<i64>, Option<String>), i64> = HashMap::new();
    for chunk in drain(&mut op) {
        let k1s = chunk.columns()[0]
            .as_any()
            .downcast_ref::<Int64Array>()
            .expect("k1");
        let k2s = chunk.columns()[1]
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("k2");
        let cnts = chunk.columns()[2]
            .as_any()
            .downcast_ref::<Int64Array>()
            .expect("counts");
        for row in 0..chunk.len() {
            let key = (
                (!k1s.is_null(row)).then(|| k1s.value(row)),
                (!k2s.is_null(row)).then(|| k2s.value(row).to_string()),
            );
            counts.insert(key, cnts.value(row));
        }
    }
    assert_eq!(counts.len(), 3);
    assert_eq!(
        counts.get(&(Some(1), Some("x".to_string()))).copied(),
        Some(2)
    );
    assert_eq!(
        counts.get(&(Some(1), Some("y".to_string()))).copied(),
        Some(1)
    );
    assert_eq!(counts.get(&(None, None)).copied(), Some(1));
}

#[test]
fn min_max_over_strings() {
    let mut arena = ExprArena::default();
    let k = arena.push_typed(ExprNode::SlotId(SlotId::new(1)), DataType::Int64);
    let v = arena.push_typed(ExprNode::SlotId(SlotId::new(2)), DataType::Utf8);
    let plan = AggregatePlan {
        group_by: vec![k],
        functions: vec![agg_func("min", vec![v]), agg_func("max", vec![v])],
        need_finalize: true,
        output_slots: vec![SlotId::new(1), SlotId::new(3), SlotId::new(4)],
    };
    let mut op = make_operator(arena, plan, ExecConfig::default());
    op.prepare().expect("prepare");

    let chunk = chunk_of(vec![
        (
            "k",
            1,
            DataType::Int64,
            Arc::new(Int64Array::from(vec![1, 1, 1, 2])) as ArrayRef,
        ),
        (
            "v",
            2,
            DataType::Utf8,
            Arc::new(StringArray::from(vec![
                Some("pear"),
                Some("apple"),
                None,
                None,
            ])) as ArrayRef,
        ),
    ]);
    op.build_from(&mut TestSource::new(vec![chunk]))
        .expect("build");

    let mut out: HashMap<i64, (Option<String>, Option<String>)> = HashMap::new();
    for chunk in drain(&mut op) {
        let keys = chunk.columns()[0]
            .as_any()
            .downcast_ref::<Int64Array>()
            .expect("keys");
        let mins = chunk.columns()[1]
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("mins");
        let maxs = chunk.columns()[2]
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("maxs");
        for row in 0..chunk.len() {
            out.insert(
                keys.value(row),
                (
                    (!mins.is_null(row)).then(|| mins.value(row).to_string()),
                    (!maxs.is_null(row)).then(|| maxs.value(row).to_string()),
                ),
            );
        }
    }
    assert_eq!(
        out.get(&1).cloned(),
        Some((Some("apple".to_string()), Some("pear".to_string())))
    );
    assert_eq!(out.get(&2).cloned(), Some((None, None)));
}

#[test]
fn phase_transitions_are_enforced() {
    let mut arena = ExprArena::default();
    let k = arena.push_typed(ExprNode::SlotId(SlotId::new(1)), DataType::Int64);
    let plan = AggregatePlan {
        group_by: vec![k],
        functions: vec![agg_func("count", vec![])],
        need_finalize: true,
        output_slots: vec![SlotId::new(1), SlotId::new(2)],
    };
    let mut op = make_operator(arena, plan, ExecConfig::default());
    assert_eq!(op.phase(), AggPhase::Uninitialized);
    assert!(op.pull_chunk().is_err());

    op.prepare().expect("prepare");
    assert_eq!(op.phase(), AggPhase::Prepared);
    assert!(op.prepare().is_err());
    assert!(op.pull_chunk().is_err());

    op.finish_build().expect("finish empty build");
    assert_eq!(op.phase(), AggPhase::Producing);
    let chunk = chunk_of(vec![(
        "k",
        1,
        DataType::Int64,
        Arc::new(Int64Array::from(vec![1])) as ArrayRef,
    )]);
    assert!(op.push_chunk(chunk).is_err());

    op.close();
    assert_eq!(op.phase(), AggPhase::Closed);
    assert!(op.reset().is_err());
    // close is idempotent and legal from any phase
    op.close();
}

#[test]
fn profile_counters_are_reported() {
    let mut arena = ExprArena::default();
    let k = arena.push_typed(ExprNode::SlotId(SlotId::new(1)), DataType::Int64);
    let plan = AggregatePlan {
        group_by: vec![k],
        functions: vec![agg_func("count", vec![])],
        need_finalize: true,
        output_slots: vec![SlotId::new(1), SlotId::new(2)],
    };
    let mut op = make_operator(arena, plan, ExecConfig::default());
    let profile = RuntimeProfile::new("AGGREGATE (id=1)");
    op.set_profile(profile.clone());
    op.prepare().expect("prepare");

    let chunk = chunk_of(vec![(
        "k",
        1,
        DataType::Int64,
        Arc::new(Int64Array::from(vec![1, 2, 2, 3])) as ArrayRef,
    )]);
    op.build_from(&mut TestSource::new(vec![chunk]))
        .expect("build");
    drain(&mut op);

    assert_eq!(
        profile
            .get_counter("InputRowCount")
            .map(|c| c.value()),
        Some(4)
    );
    assert_eq!(
        profile.get_counter("GroupCount").map(|c| c.value()),
        Some(3)
    );
    assert!(profile.get_counter("BuildTime").is_some());
    assert!(profile.get_counter("GetResultsTime").is_some());
    assert!(profile.get_counter("HashTableBuckets").is_some());
    assert_eq!(
        profile.get_info_string("GroupingKeys").as_deref(),
        Some("1")
    );
    assert_eq!(
        profile.get_info_string("AggregateFunctions").as_deref(),
        Some("count")
    );
}
