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
//! Expression evaluation over chunks.
//!
//! Responsibilities:
//! - Stores immutable expression trees in an arena addressed by `ExprId`.
//! - Evaluates an expression against a chunk into one Arrow array.
//!
//! The aggregation core only requires slot references, literals and checked
//! arithmetic; evaluation failures (overflow, division by zero) abort the
//! current batch and propagate to the operator.

pub mod agg;
mod arithmetic;
mod literal;
mod slot;

use arrow::array::{new_null_array, ArrayRef};
use arrow::datatypes::DataType;

use crate::common::ids::SlotId;
use crate::exec::chunk::Chunk;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ExprId(pub usize);

#[derive(Clone, Debug)]
pub enum LiteralValue {
    Null,
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Bool(bool),
    Utf8(String),
    Date32(i32),
}

#[derive(Clone, Debug)]
pub enum ExprNode {
    Literal(LiteralValue),
    /// Slot id resolved against the input chunk's schema metadata.
    SlotId(SlotId),
    Add(ExprId, ExprId),
    Sub(ExprId, ExprId),
    Mul(ExprId, ExprId),
    Div(ExprId, ExprId),
    Mod(ExprId, ExprId),
}

#[derive(Clone, Debug, Default)]
pub struct ExprArena {
    nodes: Vec<ExprNode>,
    types: Vec<DataType>,
}

impl ExprArena {
    pub fn push(&mut self, node: ExprNode) -> ExprId {
        self.push_typed(node, DataType::Null)
    }

    pub fn push_typed(&mut self, node: ExprNode, data_type: DataType) -> ExprId {
        let id = ExprId(self.nodes.len());
        self.nodes.push(node);
        self.types.push(data_type);
        id
    }

    pub fn node(&self, id: ExprId) -> Option<&ExprNode> {
        self.nodes.get(id.0)
    }

    pub fn data_type(&self, id: ExprId) -> Option<&DataType> {
        self.types.get(id.0)
    }

    pub fn eval(&self, id: ExprId, chunk: &Chunk) -> Result<ArrayRef, String> {
        let node = self
            .nodes
            .get(id.0)
            .ok_or_else(|| "invalid ExprId".to_string())?;
        match node {
            ExprNode::Literal(v) => {
                if matches!(v, LiteralValue::Null) {
                    // Preserve the declared expression type for typed NULL slots.
                    let target_type = self.data_type(id).cloned().unwrap_or(DataType::Null);
                    if !matches!(target_type, DataType::Null) {
                        return Ok(new_null_array(&target_type, chunk.len()));
                    }
                }
                literal::eval(v, chunk.len())
            }
            ExprNode::SlotId(slot_id) => slot::eval_slot_id(*slot_id, chunk),
            ExprNode::Add(a, b) => arithmetic::eval_add(self, id, *a, *b, chunk),
            ExprNode::Sub(a, b) => arithmetic::eval_sub(self, id, *a, *b, chunk),
            ExprNode::Mul(a, b) => arithmetic::eval_mul(self, id, *a, *b, chunk),
            ExprNode::Div(a, b) => arithmetic::eval_div(self, id, *a, *b, chunk),
            ExprNode::Mod(a, b) => arithmetic::eval_mod(self, id, *a, *b, chunk),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ids::SlotId;
    use crate::exec::chunk::{field_with_slot_id, Chunk};
    use arrow::array::{Array, Int32Array, Int64Array};
    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;
    use std::sync::Arc;

    fn int_chunk(values: Vec<Option<i64>>) -> Chunk {
        let field = field_with_slot_id(Field::new("x", DataType::Int64, true), SlotId::new(1));
        let schema = Arc::new(Schema::new(vec![field]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values))]).unwrap();
        Chunk::new(batch)
    }

    #[test]
    fn typed_null_literal_uses_declared_type() {
        let mut arena = ExprArena::default();
        let expr = arena.push_typed(ExprNode::Literal(LiteralValue::Null), DataType::Utf8);

        let chunk = int_chunk(vec![Some(1), Some(2), Some(3)]);
        let arr = arena.eval(expr, &chunk).unwrap();
        assert_eq!(arr.data_type(), &DataType::Utf8);
        assert_eq!(arr.len(), 3);
        assert!(arr.is_null(0));
    }

    #[test]
    fn slot_plus_literal_evaluates() {
        let mut arena = ExprArena::default();
        let slot = arena.push_typed(ExprNode::SlotId(SlotId::new(1)), DataType::Int64);
        let one = arena.push_typed(ExprNode::Literal(LiteralValue::Int64(1)), DataType::Int64);
        let sum = arena.push_typed(ExprNode::Add(slot, one), DataType::Int64);

        let chunk = int_chunk(vec![Some(10), None, Some(-3)]);
        let arr = arena.eval(sum, &chunk).unwrap();
        let arr = arr.as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(arr.value(0), 11);
        assert!(arr.is_null(1));
        assert_eq!(arr.value(2), -2);
    }

    #[test]
    fn int64_add_overflow_is_an_error() {
        let mut arena = ExprArena::default();
        let slot = arena.push_typed(ExprNode::SlotId(SlotId::new(1)), DataType::Int64);
        let max = arena.push_typed(
            ExprNode::Literal(LiteralValue::Int64(i64::MAX)),
            DataType::Int64,
        );
        let sum = arena.push_typed(ExprNode::Add(slot, max), DataType::Int64);

        let chunk = int_chunk(vec![Some(1)]);
        let err = arena.eval(sum, &chunk).expect_err("expected overflow");
        assert!(err.contains("overflow"), "err={}", err);
    }

    #[test]
    fn int32_slot_eval_keeps_type() {
        let field = field_with_slot_id(Field::new("x", DataType::Int32, true), SlotId::new(7));
        let schema = Arc::new(Schema::new(vec![field]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int32Array::from(vec![5, 6]))]).unwrap();
        let chunk = Chunk::new(batch);

        let mut arena = ExprArena::default();
        let slot = arena.push_typed(ExprNode::SlotId(SlotId::new(7)), DataType::Int32);
        let arr = arena.eval(slot, &chunk).unwrap();
        assert_eq!(arr.data_type(), &DataType::Int32);
    }
}
