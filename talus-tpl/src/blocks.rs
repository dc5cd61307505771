//! Block context model
//!
//! Blocks are named, repeatable scopes filled by the host before rendering. A
//! block holds rows in append order; every row holds its own variables and may
//! host child blocks of its own. Blocks are addressed by dotted paths, each
//! segment below the root resolving inside the *last* row of its parent, so
//! `posts.comments` means "the comments of the current post".
//!
//! ```rust
//! use talus_tpl::Blocks;
//!
//! let mut blocks = Blocks::default();
//! blocks.open_block("posts", [("TITLE", "First")]).unwrap();
//! blocks.open_block("posts.comments", [("TEXT", "Nice")]).unwrap();
//! blocks.open_block("posts", [("TITLE", "Second")]).unwrap();
//! assert_eq!(blocks.resolve("posts", "TITLE").unwrap().to_string(), "Second");
//! assert!(blocks.resolve("posts.comments", "TEXT").is_err());
//! ```
//!
//! Each row exposes derived fields next to its variables: `FIRST` (`is_first`),
//! `LAST` (`is_last`), `CURRENT` (`current`, the 1-based position) and `SIZE_OF`
//! (`size`, the row count of the block). The row count is shared by every row
//! of a block, so earlier rows observe rows appended after them.

use std::{cell::Cell, rc::Rc};

use indexmap::IndexMap;
use tracing::trace;

use crate::{
    error::BlockError,
    value::{Binding, Value},
};

#[derive(Debug, Clone)]
pub struct Row {
    vars: IndexMap<String, Binding>,
    first: bool,
    last: bool,
    position: usize,
    count: Rc<Cell<usize>>,
    children: IndexMap<String, Block>,
}

impl Row {
    pub fn is_first(&self) -> bool {
        self.first
    }

    pub fn is_last(&self) -> bool {
        self.last
    }

    /// 1-based position in the block
    pub fn position(&self) -> usize {
        self.position
    }

    /// Rows in the block, as of now
    pub fn count(&self) -> usize {
        self.count.get()
    }

    /// A derived field or a variable of this row
    pub fn get(&self, field: &str) -> Option<Value> {
        match field {
            "FIRST" | "is_first" => Some(Value::Bool(self.first)),
            "LAST" | "is_last" => Some(Value::Bool(self.last)),
            "CURRENT" | "current" => Some(self.position.into()),
            "SIZE_OF" | "size" => Some(self.count().into()),
            _ => self.vars.get(field).map(Binding::get),
        }
    }

    pub fn child(&self, name: &str) -> Option<&Block> {
        self.children.get(name)
    }
}

/// The rows of one block
#[derive(Debug, Clone, Default)]
pub struct Block {
    rows: Vec<Row>,
    count: Rc<Cell<usize>>,
}

impl Block {
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The most recently appended row
    pub fn current(&self) -> Option<&Row> {
        self.rows.last()
    }

    /// Appends a row, returning its index
    pub fn append(&mut self, vars: IndexMap<String, Binding>) -> usize {
        if let Some(previous) = self.rows.last_mut() {
            previous.last = false;
        }
        let index = self.rows.len();
        self.count.set(index + 1);
        self.rows.push(Row {
            vars,
            first: index == 0,
            last: true,
            position: index + 1,
            count: self.count.clone(),
            children: IndexMap::new(),
        });
        index
    }

    /// One `{key, value}` row per item of a list or map; other values have no rows
    pub fn from_collection(collection: &Value) -> Self {
        let mut block = Block::default();
        let mut push = |key: Value, value: &Value| {
            let mut vars = IndexMap::with_capacity(2);
            vars.insert("key".to_string(), Binding::Owned(key));
            vars.insert("value".to_string(), Binding::Owned(value.clone()));
            block.append(vars);
        };
        match collection {
            Value::List(list) => list
                .iter()
                .enumerate()
                .for_each(|(index, item)| push(index.into(), item)),
            Value::Map(map) => map
                .iter()
                .for_each(|(key, item)| push(key.as_str().into(), item)),
            _ => (),
        }
        block
    }
}

/// Address of a row: the row index taken at each segment of its block path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowHandle {
    path: Vec<(String, usize)>,
}

impl RowHandle {
    pub fn path(&self) -> String {
        self.path
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// 0-based index of the row in its block
    pub fn index(&self) -> usize {
        self.path.last().map_or(0, |(_, index)| *index)
    }
}

/// The block tree of one render
#[derive(Debug, Clone, Default)]
pub struct Blocks {
    roots: IndexMap<String, Block>,
}

impl Blocks {
    /// Appends a row to the block at `path`, creating the block on its first row.
    /// Every ancestor must already have a row.
    pub fn open_block<K, V, I>(&mut self, path: &str, row: I) -> Result<RowHandle, BlockError>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let vars = row
            .into_iter()
            .map(|(name, value)| (name.into(), Binding::Owned(value.into())))
            .collect();
        self.open_block_with(path, vars)
    }

    /// Same as [`Blocks::open_block`] with bindings, which may be shared
    pub fn open_block_with(
        &mut self,
        path: &str,
        vars: IndexMap<String, Binding>,
    ) -> Result<RowHandle, BlockError> {
        let segments: Vec<&str> = path.split('.').collect();
        let (name, ancestors) = match segments.split_last() {
            Some((name, ancestors)) if !name.is_empty() => (*name, ancestors),
            _ => return Err(BlockError::UnknownParentBlock(path.to_string())),
        };
        let mut handle = Vec::with_capacity(segments.len());
        let mut level = &mut self.roots;
        for ancestor in ancestors {
            let row = level
                .get_mut(*ancestor)
                .and_then(|block| {
                    let index = block.rows.len().checked_sub(1)?;
                    Some((index, block.rows.last_mut()?))
                })
                .ok_or_else(|| BlockError::UnknownParentBlock(path.to_string()))?;
            handle.push((ancestor.to_string(), row.0));
            level = &mut row.1.children;
        }
        let index = level.entry(name.to_string()).or_default().append(vars);
        handle.push((name.to_string(), index));
        trace!(block = path, row = index, "opened block row");
        Ok(RowHandle { path: handle })
    }

    /// The block at `path`, descending through the current rows of its ancestors
    pub fn block(&self, path: &[String]) -> Option<&Block> {
        let (first, rest) = path.split_first()?;
        let mut block = self.roots.get(first)?;
        for segment in rest {
            block = block.current()?.child(segment)?;
        }
        Some(block)
    }

    /// Handle of the current row of the block at `path`
    pub fn current_row(&self, path: &str) -> Result<RowHandle, BlockError> {
        let undefined = || BlockError::UndefinedBlockVariable {
            path: path.to_string(),
            field: String::new(),
        };
        let mut handle = Vec::new();
        let mut level = &self.roots;
        for segment in path.split('.') {
            let block = level.get(segment).ok_or_else(undefined)?;
            let index = block.rows.len().checked_sub(1).ok_or_else(undefined)?;
            handle.push((segment.to_string(), index));
            level = &block.rows[index].children;
        }
        Ok(RowHandle { path: handle })
    }

    /// A field of the current row of the block at `path`
    pub fn resolve(&self, path: &str, field: &str) -> Result<Value, BlockError> {
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        self.block(&segments)
            .and_then(Block::current)
            .and_then(|row| row.get(field))
            .ok_or_else(|| BlockError::UndefinedBlockVariable {
                path: path.to_string(),
                field: field.to_string(),
            })
    }

    pub fn row(&self, handle: &RowHandle) -> Option<&Row> {
        let mut level = &self.roots;
        let mut found = None;
        for (name, index) in &handle.path {
            let row = level.get(name)?.rows.get(*index)?;
            level = &row.children;
            found = Some(row);
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_row_metadata() {
        let mut blocks = Blocks::default();
        let handles: Vec<RowHandle> = ["a", "b", "c"]
            .iter()
            .map(|name| blocks.open_block("items", [("NAME", *name)]).unwrap())
            .collect();
        let rows: Vec<&Row> = handles.iter().map(|handle| blocks.row(handle).unwrap()).collect();

        assert!(rows[0].is_first() && !rows[0].is_last());
        assert_eq!(rows[0].position(), 1);
        assert!(!rows[1].is_first() && !rows[1].is_last());
        assert_eq!(rows[1].position(), 2);
        assert!(!rows[2].is_first() && rows[2].is_last());
        assert_eq!(rows[2].position(), 3);
        for row in &rows {
            assert_eq!(row.count(), 3);
            assert_eq!(row.get("SIZE_OF"), Some(Value::Int(3)));
        }
        assert_eq!(rows[1].get("CURRENT"), Some(Value::Int(2)));
        assert_eq!(rows[2].get("is_last"), Some(Value::Bool(true)));
    }

    #[test]
    fn count_is_shared_while_appending() {
        let mut blocks = Blocks::default();
        let first = blocks.open_block("items", [("N", 1)]).unwrap();
        assert_eq!(blocks.row(&first).unwrap().count(), 1);
        blocks.open_block("items", [("N", 2)]).unwrap();
        assert_eq!(blocks.row(&first).unwrap().count(), 2);
        assert!(!blocks.row(&first).unwrap().is_last());
    }

    #[test]
    fn children_are_row_local() {
        let mut blocks = Blocks::default();
        blocks.open_block("posts", [("TITLE", "one")]).unwrap();
        blocks.open_block("posts.comments", [("TEXT", "a")]).unwrap();
        blocks.open_block("posts.comments", [("TEXT", "b")]).unwrap();
        blocks.open_block("posts", [("TITLE", "two")]).unwrap();
        let handle = blocks.open_block("posts.comments", [("TEXT", "c")]).unwrap();

        assert_eq!(handle.path(), "posts.comments");
        assert_eq!(handle.index(), 0);
        assert_eq!(blocks.resolve("posts.comments", "TEXT").unwrap(), Value::from("c"));
        assert_eq!(blocks.resolve("posts.comments", "SIZE_OF").unwrap(), Value::Int(1));
        let first_post = &blocks.roots["posts"].rows()[0];
        assert_eq!(first_post.child("comments").unwrap().len(), 2);
    }

    #[test]
    fn parents_must_exist() {
        let mut blocks = Blocks::default();
        assert_eq!(
            blocks.open_block("posts.comments", [("TEXT", "a")]),
            Err(BlockError::UnknownParentBlock("posts.comments".to_string()))
        );
        assert!(blocks.open_block("", [("A", 1)]).is_err());
    }

    #[test]
    fn undefined_fields_fail() {
        let mut blocks = Blocks::default();
        blocks.open_block("posts", [("TITLE", "one")]).unwrap();
        assert_eq!(
            blocks.resolve("posts", "BODY"),
            Err(BlockError::UndefinedBlockVariable {
                path: "posts".to_string(),
                field: "BODY".to_string()
            })
        );
        assert!(blocks.resolve("missing", "TITLE").is_err());
        assert!(blocks.current_row("missing").is_err());
    }

    #[test]
    fn current_row_handles() {
        let mut blocks = Blocks::default();
        blocks.open_block("posts", [("TITLE", "one")]).unwrap();
        let second = blocks.open_block("posts", [("TITLE", "two")]).unwrap();
        let comment = blocks.open_block("posts.comments", [("TEXT", "hi")]).unwrap();

        let current = blocks.current_row("posts").unwrap();
        assert_eq!(current, second);
        assert_eq!(current.index(), 1);
        assert_eq!(blocks.row(&current).unwrap().position(), 2);
        assert_eq!(blocks.current_row("posts.comments").unwrap(), comment);
        assert_eq!(comment.path(), "posts.comments");

        blocks.open_block("posts", [("TITLE", "three")]).unwrap();
        assert!(blocks.current_row("posts.comments").is_err());
    }

    #[test]
    fn builds_rows_from_collections() {
        let block = Block::from_collection(&Value::from(vec!["x", "y"]));
        assert_eq!(block.len(), 2);
        assert_eq!(block.rows()[1].get("key"), Some(Value::Int(1)));
        assert_eq!(block.rows()[1].get("value"), Some(Value::from("y")));
        assert!(Block::from_collection(&Value::Null).is_empty());
        let map: Value = [("k", 1)].into_iter().collect();
        assert_eq!(Block::from_collection(&map).rows()[0].get("key"), Some(Value::from("k")));
    }
}
