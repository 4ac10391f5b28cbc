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
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, Float64Array, Float64Builder, Int32Array, Int32Builder, Int64Array,
    Int64Builder,
};
use arrow::datatypes::DataType;

use super::{ExprArena, ExprId};
use crate::exec::chunk::Chunk;

#[derive(Clone, Copy, Debug)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Mod => "mod",
        }
    }
}

pub(super) fn eval_add(
    arena: &ExprArena,
    id: ExprId,
    a: ExprId,
    b: ExprId,
    chunk: &Chunk,
) -> Result<ArrayRef, String> {
    eval_binary(arena, id, a, b, chunk, BinaryOp::Add)
}

pub(super) fn eval_sub(
    arena: &ExprArena,
    id: ExprId,
    a: ExprId,
    b: ExprId,
    chunk: &Chunk,
) -> Result<ArrayRef, String> {
    eval_binary(arena, id, a, b, chunk, BinaryOp::Sub)
}

pub(super) fn eval_mul(
    arena: &ExprArena,
    id: ExprId,
    a: ExprId,
    b: ExprId,
    chunk: &Chunk,
) -> Result<ArrayRef, String> {
    eval_binary(arena, id, a, b, chunk, BinaryOp::Mul)
}

pub(super) fn eval_div(
    arena: &ExprArena,
    id: ExprId,
    a: ExprId,
    b: ExprId,
    chunk: &Chunk,
) -> Result<ArrayRef, String> {
    eval_binary(arena, id, a, b, chunk, BinaryOp::Div)
}

pub(super) fn eval_mod(
    arena: &ExprArena,
    id: ExprId,
    a: ExprId,
    b: ExprId,
    chunk: &Chunk,
) -> Result<ArrayRef, String> {
    eval_binary(arena, id, a, b, chunk, BinaryOp::Mod)
}

fn eval_binary(
    arena: &ExprArena,
    id: ExprId,
    a: ExprId,
    b: ExprId,
    chunk: &Chunk,
    op: BinaryOp,
) -> Result<ArrayRef, String> {
    let left = arena.eval(a, chunk)?;
    let right = arena.eval(b, chunk)?;
    if left.len() != right.len() {
        return Err(format!(
            "{} operand row count mismatch: {} vs {}",
            op.name(),
            left.len(),
            right.len()
        ));
    }
    if left.data_type() != right.data_type() {
        return Err(format!(
            "{} operand type mismatch: {:?} vs {:?}",
            op.name(),
            left.data_type(),
            right.data_type()
        ));
    }
    let result = match left.data_type() {
        DataType::Int32 => eval_int32(&left, &right, op)?,
        DataType::Int64 => eval_int64(&left, &right, op)?,
        DataType::Float64 => eval_float64(&left, &right, op)?,
        other => {
            return Err(format!(
                "{} unsupported operand type: {:?} (expr {})",
                op.name(),
                other,
                id.0
            ));
        }
    };
    Ok(result)
}

fn checked_i64(op: BinaryOp, x: i64, y: i64, row: usize) -> Result<Option<i64>, String> {
    let out = match op {
        BinaryOp::Add => x.checked_add(y),
        BinaryOp::Sub => x.checked_sub(y),
        BinaryOp::Mul => x.checked_mul(y),
        BinaryOp::Div => {
            if y == 0 {
                return Err(format!("division by zero at row {}", row));
            }
            x.checked_div(y)
        }
        BinaryOp::Mod => {
            if y == 0 {
                return Err(format!("division by zero at row {}", row));
            }
            x.checked_rem(y)
        }
    };
    match out {
        Some(v) => Ok(Some(v)),
        None => Err(format!(
            "integer overflow in {} expression at row {}",
            op.name(),
            row
        )),
    }
}

fn eval_int64(left: &ArrayRef, right: &ArrayRef, op: BinaryOp) -> Result<ArrayRef, String> {
    let left = left
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| "failed to downcast to Int64Array".to_string())?;
    let right = right
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| "failed to downcast to Int64Array".to_string())?;
    let mut builder = Int64Builder::with_capacity(left.len());
    for row in 0..left.len() {
        if left.is_null(row) || right.is_null(row) {
            builder.append_null();
            continue;
        }
        match checked_i64(op, left.value(row), right.value(row), row)? {
            Some(v) => builder.append_value(v),
            None => builder.append_null(),
        }
    }
    Ok(Arc::new(builder.finish()))
}

fn eval_int32(left: &ArrayRef, right: &ArrayRef, op: BinaryOp) -> Result<ArrayRef, String> {
    let left = left
        .as_any()
        .downcast_ref::<Int32Array>()
        .ok_or_else(|| "failed to downcast to Int32Array".to_string())?;
    let right = right
        .as_any()
        .downcast_ref::<Int32Array>()
        .ok_or_else(|| "failed to downcast to Int32Array".to_string())?;
    let mut builder = Int32Builder::with_capacity(left.len());
    for row in 0..left.len() {
        if left.is_null(row) || right.is_null(row) {
            builder.append_null();
            continue;
        }
        let v = checked_i64(op, left.value(row) as i64, right.value(row) as i64, row)?;
        match v {
            Some(v) => {
                let v = i32::try_from(v).map_err(|_| {
                    format!("integer overflow in {} expression at row {}", op.name(), row)
                })?;
                builder.append_value(v);
            }
            None => builder.append_null(),
        }
    }
    Ok(Arc::new(builder.finish()))
}

fn eval_float64(left: &ArrayRef, right: &ArrayRef, op: BinaryOp) -> Result<ArrayRef, String> {
    let left = left
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| "failed to downcast to Float64Array".to_string())?;
    let right = right
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| "failed to downcast to Float64Array".to_string())?;
    let mut builder = Float64Builder::with_capacity(left.len());
    for row in 0..left.len() {
        if left.is_null(row) || right.is_null(row) {
            builder.append_null();
            continue;
        }
        let x = left.value(row);
        let y = right.value(row);
        let v = match op {
            BinaryOp::Add => x + y,
            BinaryOp::Sub => x - y,
            BinaryOp::Mul => x * y,
            BinaryOp::Div => x / y,
            BinaryOp::Mod => x % y,
        };
        builder.append_value(v);
    }
    Ok(Arc::new(builder.finish()))
}
