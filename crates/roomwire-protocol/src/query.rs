//! Room search predicates.
//!
//! A [`Query`] is an OR of AND-groups of property conditions. The lobby
//! evaluates it against the encoded public properties of each room, so
//! operands are shipped in their codec encoding (which sorts byte-wise).
//!
//! ```rust
//! use roomwire_protocol::Query;
//!
//! // (a == 1 && b == 2 && c == 3) || (a == 1 && b == 2 && c == 4)
//! let q = Query::new()
//!     .equal("a", 1)
//!     .equal("b", 2)
//!     .or([Query::new().equal("c", 3), Query::new().equal("c", 4)]);
//! assert_eq!(q.groups().len(), 2);
//! ```

use roomwire_codec::{Dict, Registry, Value, encode_with};

use crate::ProtocolError;

/// Comparison operators understood by the lobby.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Equal = 0,
    Not = 1,
    LessThan = 2,
    LessEqual = 3,
    GreaterThan = 4,
    GreaterEqual = 5,
    /// The property (a list or string) contains the operand.
    Contain = 6,
    NotContain = 7,
}

/// One `key op value` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct PropQuery {
    pub key: String,
    pub op: Op,
    pub value: Value,
}

impl PropQuery {
    fn to_value(&self, registry: &Registry) -> Result<Value, ProtocolError> {
        let mut d = Dict::new();
        d.insert("key".into(), Value::from(self.key.as_str()));
        d.insert("op".into(), Value::Byte(self.op as u8));
        d.insert("val".into(), Value::Bytes(encode_with(&self.value, registry)?));
        Ok(Value::Dict(d))
    }
}

/// An OR of AND-groups.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    groups: Vec<Vec<PropQuery>>,
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

impl Query {
    /// A query with a single empty AND-group, which matches every room.
    pub fn new() -> Self {
        Self {
            groups: vec![Vec::new()],
        }
    }

    pub fn groups(&self) -> &[Vec<PropQuery>] {
        &self.groups
    }

    /// Adds a condition to every AND-group.
    pub fn with(mut self, key: impl Into<String>, op: Op, value: impl Into<Value>) -> Self {
        let cond = PropQuery {
            key: key.into(),
            op,
            value: value.into(),
        };
        for group in &mut self.groups {
            group.push(cond.clone());
        }
        self
    }

    pub fn equal(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(key, Op::Equal, value)
    }

    pub fn not(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(key, Op::Not, value)
    }

    pub fn less_than(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(key, Op::LessThan, value)
    }

    pub fn less_equal(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(key, Op::LessEqual, value)
    }

    pub fn greater_than(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(key, Op::GreaterThan, value)
    }

    pub fn greater_equal(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(key, Op::GreaterEqual, value)
    }

    pub fn contain(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(key, Op::Contain, value)
    }

    pub fn not_contain(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(key, Op::NotContain, value)
    }

    /// ANDs every argument into this query.
    ///
    /// Each argument is distributed over the current groups, so `k` groups
    /// ANDed with arguments of `n1, n2, ...` groups yield `k * n1 * n2 * ...`
    /// groups.
    pub fn and(self, queries: impl IntoIterator<Item = Query>) -> Self {
        let mut groups = self.groups;
        for q in queries {
            groups = cross(&groups, &q.groups);
        }
        Self { groups }
    }

    /// ORs the arguments together and ANDs the result into this query:
    /// `A.or([B, C]) == AB + AC`.
    ///
    /// `k` groups combined with arguments totalling `n` groups yield `k * n`
    /// groups. With no arguments the query is returned unchanged.
    pub fn or(self, queries: impl IntoIterator<Item = Query>) -> Self {
        let mut groups = Vec::new();
        let mut any = false;
        for q in queries {
            any = true;
            groups.extend(cross(&self.groups, &q.groups));
        }
        if !any {
            return self;
        }
        Self { groups }
    }

    /// Converts to the lobby representation: a list of AND-groups, each a
    /// list of `{key, op, val}` dicts with `val` holding the encoded operand.
    pub fn to_value(&self, registry: &Registry) -> Result<Value, ProtocolError> {
        let groups = self
            .groups
            .iter()
            .map(|group| {
                group
                    .iter()
                    .map(|c| c.to_value(registry))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::List)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::List(groups))
    }
}

/// Every `l ++ r` for `l` in `left`, `r` in `right`, ordered by `r` first.
fn cross(left: &[Vec<PropQuery>], right: &[Vec<PropQuery>]) -> Vec<Vec<PropQuery>> {
    let mut out = Vec::with_capacity(left.len() * right.len());
    for r in right {
        for l in left {
            let mut group = l.clone();
            group.extend(r.iter().cloned());
            out.push(group);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_query_has_one_empty_group() {
        let q = Query::new();
        assert_eq!(q.groups().len(), 1);
        assert!(q.groups()[0].is_empty());
    }

    #[test]
    fn test_leaf_appends_to_every_group() {
        let q = Query::new()
            .or([Query::new().equal("x", 1), Query::new().equal("x", 2)])
            .greater_than("lvl", 5);
        assert_eq!(q.groups().len(), 2);
        for group in q.groups() {
            assert_eq!(group.last().unwrap().key, "lvl");
            assert_eq!(group.last().unwrap().op, Op::GreaterThan);
        }
    }

    #[test]
    fn test_or_without_args_is_identity() {
        let q = Query::new().equal("a", 1);
        assert_eq!(q.clone().or([]), q);
    }

    #[test]
    fn test_to_value_encodes_operand() {
        let v = Query::new()
            .contain("tags", "pvp")
            .to_value(Registry::empty())
            .unwrap();
        let groups = v.as_list().unwrap();
        let cond = groups[0].as_list().unwrap()[0].as_dict().unwrap();
        assert_eq!(cond["key"], Value::from("tags"));
        assert_eq!(cond["op"], Value::Byte(6));
        assert_eq!(cond["val"], Value::Bytes(vec![14, 3, b'p', b'v', b'p']));
    }
}
