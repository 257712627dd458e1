//! Thin typed accessor over a `serde_json::Value` args object. Operation
//! handlers read their inputs through this rather than hand-rolling
//! `Value::get`/`as_str` chains everywhere.

use serde_json::Value;

use crate::error::{Error, Result};

pub struct Args<'a>(pub &'a Value);

impl<'a> Args<'a> {
    pub fn new(value: &'a Value) -> Self {
        Args(value)
    }

    pub fn str(&self, field: &str) -> Result<String> {
        self.0
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::validation(field, "must be a string"))
    }

    pub fn opt_str(&self, field: &str) -> Option<String> {
        self.0.get(field).and_then(Value::as_str).map(str::to_string)
    }

    pub fn i64(&self, field: &str) -> Result<i64> {
        self.0.get(field).and_then(Value::as_i64).ok_or_else(|| Error::validation(field, "must be an integer"))
    }

    pub fn opt_i64(&self, field: &str) -> Option<i64> {
        match self.0.get(field) {
            Some(Value::Null) | None => None,
            Some(v) => v.as_i64(),
        }
    }

    pub fn i32(&self, field: &str) -> Result<i32> {
        Ok(self.i64(field)? as i32)
    }

    pub fn opt_i32(&self, field: &str) -> Option<i32> {
        self.opt_i64(field).map(|v| v as i32)
    }

    pub fn bool_or(&self, field: &str, default: bool) -> bool {
        self.0.get(field).and_then(Value::as_bool).unwrap_or(default)
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.get(field).is_some()
    }

    pub fn array(&self, field: &str) -> Vec<Value> {
        self.0.get(field).and_then(Value::as_array).cloned().unwrap_or_default()
    }

    pub fn str_array(&self, field: &str) -> Vec<String> {
        self.array(field).iter().filter_map(|v| v.as_str().map(str::to_string)).collect()
    }
}
