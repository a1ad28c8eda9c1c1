//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use flowbus::Value;

/// Integers as pipeline values
pub fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().copied().map(Value::Int).collect()
}

/// A list value of integers
pub fn int_list(values: &[i64]) -> Value {
    Value::List(ints(values))
}
