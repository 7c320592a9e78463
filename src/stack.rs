//! Script value stack.
//!
//! Indices follow the VM convention: positive indices are 1-based from the
//! bottom, negative indices count down from the top (`-1` is the top slot).
//! Index 0 never names a slot.

use crate::value::Value;

/// A stack of script values, used for call arguments and results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptStack {
    slots: Vec<Value>,
}

impl ScriptStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, value: Value) {
        self.slots.push(value);
    }

    pub fn pop(&mut self) -> Option<Value> {
        self.slots.pop()
    }

    /// Value at a VM index, or `None` if the index names no slot.
    pub fn get(&self, index: i32) -> Option<&Value> {
        self.absolute(index).map(|i| &self.slots[i])
    }

    /// Value at the top of the stack.
    pub fn top(&self) -> Option<&Value> {
        self.slots.last()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Drop everything above `len` slots.
    pub fn truncate(&mut self, len: usize) {
        self.slots.truncate(len);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.slots.iter()
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.slots
    }

    /// Convert a VM index to a 0-based position.
    fn absolute(&self, index: i32) -> Option<usize> {
        let len = self.slots.len();
        let pos = match index {
            0 => return None,
            i if i > 0 => (i - 1) as usize,
            i => len.checked_sub(i.unsigned_abs() as usize)?,
        };
        (pos < len).then_some(pos)
    }
}

impl From<Vec<Value>> for ScriptStack {
    fn from(slots: Vec<Value>) -> Self {
        Self { slots }
    }
}

impl FromIterator<Value> for ScriptStack {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self {
            slots: iter.into_iter().collect(),
        }
    }
}

impl Extend<Value> for ScriptStack {
    fn extend<I: IntoIterator<Item = Value>>(&mut self, iter: I) {
        self.slots.extend(iter);
    }
}
