//! Render context: variables, constants and the block tree

use std::{cell::RefCell, rc::Rc};

use indexmap::IndexMap;

use crate::{
    blocks::{Blocks, RowHandle},
    error::BlockError,
    value::{Binding, Value},
};

/// Everything a render reads besides the template itself
///
/// ```rust
/// use std::{cell::RefCell, rc::Rc};
/// use talus_tpl::{Context, Value};
///
/// let counter = Rc::new(RefCell::new(Value::Int(1)));
/// let mut context = Context::new();
/// context.set("TITLE", "Home").bind("COUNTER", counter.clone());
/// *counter.borrow_mut() = Value::Int(2);
/// assert_eq!(context.get("COUNTER"), Value::Int(2));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    vars: IndexMap<String, Binding>,
    constants: IndexMap<String, Value>,
    blocks: Blocks,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a copy of `value`
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.vars.insert(name.into(), Binding::Owned(value.into()));
        self
    }

    /// Binds caller-owned storage; the render reads it as it is at that time
    pub fn bind(&mut self, name: impl Into<String>, value: Rc<RefCell<Value>>) -> &mut Self {
        self.vars.insert(name.into(), Binding::Shared(value));
        self
    }

    /// Merges every entry of a map value into the variables
    pub fn extend(&mut self, values: IndexMap<String, Value>) -> &mut Self {
        self.vars
            .extend(values.into_iter().map(|(name, value)| (name, Binding::Owned(value))));
        self
    }

    /// Defines a constant printed by `{__NAME__}`
    pub fn constant(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.constants.insert(name.into(), value.into());
        self
    }

    /// Appends a row to the block at `path`
    pub fn block<K, V, I>(&mut self, path: &str, row: I) -> Result<RowHandle, BlockError>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.blocks.open_block(path, row)
    }

    /// Value of a variable; undefined variables are `Null`
    pub fn get(&self, name: &str) -> Value {
        self.vars.get(name).map(Binding::get).unwrap_or_default()
    }

    pub fn vars(&self) -> &IndexMap<String, Binding> {
        &self.vars
    }

    pub fn constants(&self) -> &IndexMap<String, Value> {
        &self.constants
    }

    pub fn blocks(&self) -> &Blocks {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut Blocks {
        &mut self.blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_variables_are_null() {
        assert_eq!(Context::new().get("MISSING"), Value::Null);
    }

    #[test]
    fn blocks_through_context() {
        let mut context = Context::new();
        context.block("items", [("N", 1)]).unwrap();
        context.block("items", [("N", 2)]).unwrap();
        assert_eq!(context.blocks().resolve("items", "N").unwrap(), Value::Int(2));
        assert!(context.block("missing.child", [("N", 1)]).is_err());
    }
}
