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
use arrow::array::ArrayRef;
use arrow::datatypes::DataType;

use crate::exec::node::aggregate::AggFunction;

use super::{AggInputView, AggSpec, AggStateArena, AggStateRef};

#[derive(Clone, Debug)]
pub(super) enum AggKind {
    Count,
    CountDistinct,
    SumInt,
    SumFloat,
    MinInt,
    MaxInt,
    MinFloat,
    MaxFloat,
    MinBool,
    MaxBool,
    MinUtf8,
    MaxUtf8,
    MinDate32,
    MaxDate32,
    MinTimestamp,
    MaxTimestamp,
    AvgInt,
    AvgFloat,
}

pub(super) mod common;

mod avg;
mod count;
mod count_distinct;
mod max;
mod min;
mod sum;

use avg::AvgAgg;
use count::CountAgg;
use count_distinct::CountDistinctAgg;
use max::MaxAgg;
use min::MinAgg;
use sum::SumAgg;

pub(super) trait AggregateFunction {
    fn build_spec_from_type(
        &self,
        func: &AggFunction,
        input_type: Option<&DataType>,
        input_is_intermediate: bool,
    ) -> Result<AggSpec, String>;

    fn state_layout_for(&self, kind: &AggKind) -> (usize, usize);

    fn build_input_view<'a>(
        &self,
        spec: &AggSpec,
        array: &'a Option<ArrayRef>,
    ) -> Result<AggInputView<'a>, String>;

    fn build_merge_view<'a>(
        &self,
        spec: &AggSpec,
        array: &'a Option<ArrayRef>,
    ) -> Result<AggInputView<'a>, String>;

    fn init_state(&self, spec: &AggSpec, ptr: *mut u8);
    fn drop_state(&self, spec: &AggSpec, ptr: *mut u8);

    fn update_batch(
        &self,
        spec: &AggSpec,
        offset: usize,
        arena: &mut AggStateArena,
        states: &[AggStateRef],
        input: &AggInputView,
    ) -> Result<(), String>;

    fn merge_batch(
        &self,
        spec: &AggSpec,
        offset: usize,
        arena: &mut AggStateArena,
        states: &[AggStateRef],
        input: &AggInputView,
    ) -> Result<(), String>;

    fn build_array(
        &self,
        spec: &AggSpec,
        offset: usize,
        arena: &AggStateArena,
        group_states: &[AggStateRef],
        output_intermediate: bool,
    ) -> Result<ArrayRef, String>;
}

static COUNT: CountAgg = CountAgg;
static COUNT_DISTINCT: CountDistinctAgg = CountDistinctAgg;
static SUM: SumAgg = SumAgg;
static MIN: MinAgg = MinAgg;
static MAX: MaxAgg = MaxAgg;
static AVG: AvgAgg = AvgAgg;

fn resolve_by_func(func: &AggFunction) -> Result<&'static dyn AggregateFunction, String> {
    match func.name.as_str() {
        "count" => Ok(&COUNT),
        "count_distinct" | "multi_distinct_count" => Ok(&COUNT_DISTINCT),
        "sum" => Ok(&SUM),
        "min" => Ok(&MIN),
        "max" => Ok(&MAX),
        "avg" => Ok(&AVG),
        other => Err(format!("unsupported agg function: {}", other)),
    }
}

fn resolve_by_kind(kind: &AggKind) -> &'static dyn AggregateFunction {
    match kind {
        AggKind::Count => &COUNT,
        AggKind::CountDistinct => &COUNT_DISTINCT,
        AggKind::SumInt | AggKind::SumFloat => &SUM,
        AggKind::MinInt
        | AggKind::MinFloat
        | AggKind::MinBool
        | AggKind::MinUtf8
        | AggKind::MinDate32
        | AggKind::MinTimestamp => &MIN,
        AggKind::MaxInt
        | AggKind::MaxFloat
        | AggKind::MaxBool
        | AggKind::MaxUtf8
        | AggKind::MaxDate32
        | AggKind::MaxTimestamp => &MAX,
        AggKind::AvgInt | AggKind::AvgFloat => &AVG,
    }
}

pub(super) fn build_spec_from_type(
    func: &AggFunction,
    input_type: Option<&DataType>,
    input_is_intermediate: bool,
) -> Result<AggSpec, String> {
    resolve_by_func(func)?.build_spec_from_type(func, input_type, input_is_intermediate)
}

pub(in crate::exec::expr::agg) fn state_layout_for_kind(kind: &AggKind) -> (usize, usize) {
    resolve_by_kind(kind).state_layout_for(kind)
}

pub(in crate::exec::expr::agg) fn build_input_view<'a>(
    spec: &AggSpec,
    array: &'a Option<ArrayRef>,
) -> Result<AggInputView<'a>, String> {
    resolve_by_kind(&spec.kind).build_input_view(spec, array)
}

pub(in crate::exec::expr::agg) fn build_merge_view<'a>(
    spec: &AggSpec,
    array: &'a Option<ArrayRef>,
) -> Result<AggInputView<'a>, String> {
    resolve_by_kind(&spec.kind).build_merge_view(spec, array)
}

pub(in crate::exec::expr::agg) fn init_state(spec: &AggSpec, ptr: *mut u8) {
    resolve_by_kind(&spec.kind).init_state(spec, ptr)
}

pub(in crate::exec::expr::agg) fn drop_state(spec: &AggSpec, ptr: *mut u8) {
    resolve_by_kind(&spec.kind).drop_state(spec, ptr)
}

pub(in crate::exec::expr::agg) fn update_batch(
    spec: &AggSpec,
    offset: usize,
    arena: &mut AggStateArena,
    states: &[AggStateRef],
    input: &AggInputView,
) -> Result<(), String> {
    resolve_by_kind(&spec.kind).update_batch(spec, offset, arena, states, input)
}

pub(in crate::exec::expr::agg) fn merge_batch(
    spec: &AggSpec,
    offset: usize,
    arena: &mut AggStateArena,
    states: &[AggStateRef],
    input: &AggInputView,
) -> Result<(), String> {
    resolve_by_kind(&spec.kind).merge_batch(spec, offset, arena, states, input)
}

pub(in crate::exec::expr::agg) fn build_array(
    spec: &AggSpec,
    offset: usize,
    arena: &AggStateArena,
    group_states: &[AggStateRef],
    output_intermediate: bool,
) -> Result<ArrayRef, String> {
    resolve_by_kind(&spec.kind).build_array(spec, offset, arena, group_states, output_intermediate)
}
