//! The `find` predicate grammar:
//!
//! ```text
//! Where      := {AND: Where[]} | {OR: Where[]} | Condition
//! Condition  := {field: fieldName, op: Ops}
//! Ops        := {eq?, gt?, lt?, gte?, lte?, in?: list, nin?: list,
//!                contains?, overlap?: list, not?: Ops}
//! ```
//!
//! Modeled as a tagged sum (`Where`) and a struct-of-options (`Ops`);
//! evaluation is a plain recursive visitor over a decoded [`rmpv::Value`].

use rmpv::Value;

use crate::{err_at, protocol::map_get, Result};

#[derive(Debug, Clone)]
pub enum Where {
    And(Vec<Where>),
    Or(Vec<Where>),
    Condition { field: String, op: Ops },
}

#[derive(Debug, Clone, Default)]
pub struct Ops {
    pub eq: Option<Value>,
    pub gt: Option<Value>,
    pub lt: Option<Value>,
    pub gte: Option<Value>,
    pub lte: Option<Value>,
    pub in_: Option<Vec<Value>>,
    pub nin: Option<Vec<Value>>,
    pub contains: Option<Value>,
    pub overlap: Option<Vec<Value>>,
    pub not: Option<Box<Ops>>,
}

impl Where {
    pub fn parse(val: &Value) -> Result<Where> {
        if let Some(and) = map_get(val, "AND") {
            let clauses = match and.as_array() {
                Some(c) => c,
                None => return err_at!(CodecFail, msg: "AND expects an array"),
            };
            return Ok(Where::And(
                clauses.iter().map(Where::parse).collect::<Result<_>>()?,
            ));
        }
        if let Some(or) = map_get(val, "OR") {
            let clauses = match or.as_array() {
                Some(c) => c,
                None => return err_at!(CodecFail, msg: "OR expects an array"),
            };
            return Ok(Where::Or(
                clauses.iter().map(Where::parse).collect::<Result<_>>()?,
            ));
        }
        let field = match map_get(val, "field").and_then(Value::as_str) {
            Some(f) => f.to_string(),
            None => return err_at!(CodecFail, msg: "condition missing field"),
        };
        let op = match map_get(val, "op") {
            Some(op) => op,
            None => return err_at!(CodecFail, msg: "condition missing op"),
        };
        Ok(Where::Condition { field, op: Ops::parse(op)? })
    }

    /// `true` iff `doc` (a decoded document) satisfies this predicate.
    pub fn eval(&self, doc: &Value) -> bool {
        match self {
            Where::And(clauses) => clauses.iter().all(|c| c.eval(doc)),
            Where::Or(clauses) => clauses.iter().any(|c| c.eval(doc)),
            Where::Condition { field, op } => {
                let field_val = map_get(doc, field).cloned().unwrap_or(Value::Nil);
                op.eval(&field_val)
            }
        }
    }
}

impl Ops {
    pub fn parse(val: &Value) -> Result<Ops> {
        let list_of = |key: &str| -> Option<Vec<Value>> {
            map_get(val, key).and_then(Value::as_array).map(|a| a.to_vec())
        };
        let not = match map_get(val, "not") {
            Some(inner) => Some(Box::new(Ops::parse(inner)?)),
            None => None,
        };
        Ok(Ops {
            eq: map_get(val, "eq").cloned(),
            gt: map_get(val, "gt").cloned(),
            lt: map_get(val, "lt").cloned(),
            gte: map_get(val, "gte").cloned(),
            lte: map_get(val, "lte").cloned(),
            in_: list_of("in"),
            nin: list_of("nin"),
            contains: map_get(val, "contains").cloned(),
            overlap: list_of("overlap"),
            not,
        })
    }

    pub fn eval(&self, field_val: &Value) -> bool {
        if let Some(not) = &self.not {
            return !not.eval(field_val);
        }
        if let Some(rhs) = &self.eq {
            return values_equal(field_val, rhs);
        }
        if let Some(rhs) = &self.gt {
            return compare(field_val, rhs).map(|o| o.is_gt()).unwrap_or(false);
        }
        if let Some(rhs) = &self.lt {
            return compare(field_val, rhs).map(|o| o.is_lt()).unwrap_or(false);
        }
        if let Some(rhs) = &self.gte {
            return compare(field_val, rhs).map(|o| !o.is_lt()).unwrap_or(false);
        }
        if let Some(rhs) = &self.lte {
            return compare(field_val, rhs).map(|o| !o.is_gt()).unwrap_or(false);
        }
        if let Some(list) = &self.in_ {
            return list.iter().any(|v| values_equal(field_val, v));
        }
        if let Some(list) = &self.nin {
            return !list.iter().any(|v| values_equal(field_val, v));
        }
        if let Some(rhs) = &self.contains {
            return contains(field_val, rhs);
        }
        if let Some(list) = &self.overlap {
            return overlap(field_val, list);
        }
        false
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    a == b
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y);
    }
    if let (Some(x), Some(y)) = (a.as_str(), b.as_str()) {
        return Some(x.cmp(y));
    }
    None
}

/// Substring match for strings, element-membership for lists.
fn contains(field_val: &Value, needle: &Value) -> bool {
    if let Some(s) = field_val.as_str() {
        if let Some(n) = needle.as_str() {
            return s.contains(n);
        }
    }
    if let Some(items) = field_val.as_array() {
        return items.iter().any(|v| values_equal(v, needle));
    }
    false
}

/// Non-empty intersection over list-valued fields.
fn overlap(field_val: &Value, others: &[Value]) -> bool {
    match field_val.as_array() {
        Some(items) => items.iter().any(|v| others.iter().any(|o| values_equal(v, o))),
        None => false,
    }
}

#[cfg(test)]
#[path = "where_expr_test.rs"]
mod where_expr_test;
