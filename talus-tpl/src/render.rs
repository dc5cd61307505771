//! Program execution
//!
//! A [`Render`] walks a program once, front to back, following the jump targets
//! baked into its structured instructions. Iterations push a frame holding a
//! snapshot of the rows they walk; frame references resolve against the frame
//! with the matching id, so two iterations sharing an alias never collide.

use std::{cell::RefCell, collections::HashSet, path::PathBuf};

use indexmap::IndexMap;
use percent_encoding::percent_decode_str;
use talus_tpl_parser::{Argument, Condition, Expr, IncludeKind, Instruction, Piece, Program, Reference, Source, Target};
use tracing::{debug, trace, warn};

use crate::{
    blocks::{Block, Blocks, Row},
    condition::Operand,
    environment::Environment,
    error::{BlockError, Error, Result},
    value::{Binding, Value},
};

/// Deepest chain of inclusions a render follows
pub const MAX_INCLUDE_DEPTH: usize = 32;

struct Frame {
    id: usize,
    block: Block,
    position: usize,
}

impl Frame {
    fn row(&self) -> Option<&Row> {
        self.block.rows().get(self.position)
    }
}

fn frame(frames: &[Frame], id: usize) -> Option<&Frame> {
    frames.iter().rev().find(|frame| frame.id == id)
}

/// Moves the innermost frame to its next row. `None` when the innermost frame
/// is not `id`, `Some(false)` when the frame ran out of rows and was popped.
fn advance(frames: &mut Vec<Frame>, id: usize) -> Option<bool> {
    let top = frames.last_mut().filter(|frame| frame.id == id)?;
    top.position += 1;
    if top.position < top.block.len() {
        return Some(true);
    }
    frames.pop();
    Some(false)
}

/// Decodes one query string component, `+` standing for a space
fn decode(component: &str) -> String {
    percent_decode_str(&component.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

fn parse_query(query: &str) -> Vec<(String, Value)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) => (decode(name), Value::from(decode(value))),
            None => (decode(pair), Value::from("")),
        })
        .collect()
}

pub(crate) struct Render<'a> {
    env: &'a Environment,
    constants: &'a IndexMap<String, Value>,
    blocks: &'a Blocks,
    vars: IndexMap<String, Binding>,
    included: &'a RefCell<HashSet<PathBuf>>,
    depth: usize,
}

impl<'a> Render<'a> {
    pub(crate) fn new(
        env: &'a Environment,
        constants: &'a IndexMap<String, Value>,
        blocks: &'a Blocks,
        vars: IndexMap<String, Binding>,
        included: &'a RefCell<HashSet<PathBuf>>,
    ) -> Self {
        Self {
            env,
            constants,
            blocks,
            vars,
            included,
            depth: 0,
        }
    }

    pub(crate) fn execute(&mut self, program: &Program) -> Result<String> {
        let mut out = String::new();
        let mut frames: Vec<Frame> = Vec::new();
        let mut testing = false;
        let mut pc = 0;
        while let Some(instruction) = program.instructions.get(pc) {
            // set when the previous instruction jumped to the next branch of a condition
            let jumped = std::mem::take(&mut testing);
            pc = match instruction {
                Instruction::Text(text) => {
                    out.push_str(text);
                    pc + 1
                }
                Instruction::Print(expr) => {
                    out.push_str(&self.eval(expr, &frames)?.to_string());
                    pc + 1
                }
                Instruction::Set {
                    name,
                    subscripts,
                    value,
                } => {
                    self.assign(name, subscripts, value, &frames)?;
                    pc + 1
                }
                Instruction::If { cond, next } => match self.test(cond, &frames)? {
                    true => pc + 1,
                    false => {
                        testing = true;
                        *next
                    }
                },
                Instruction::ElseIf { cond, next, end } => {
                    if !jumped {
                        *end
                    } else if self.test(cond, &frames)? {
                        pc + 1
                    } else {
                        testing = true;
                        *next
                    }
                }
                Instruction::Else { end } => match jumped {
                    true => pc + 1,
                    false => *end,
                },
                Instruction::EndIf => pc + 1,
                Instruction::BlockOpen {
                    id,
                    alias,
                    source,
                    skip,
                } => {
                    let block = self.rows(source, &frames)?;
                    trace!(id, alias = alias.as_str(), rows = block.len(), "opened block");
                    if block.is_empty() {
                        *skip
                    } else {
                        frames.push(Frame {
                            id: *id,
                            block,
                            position: 0,
                        });
                        pc + 1
                    }
                }
                Instruction::BlockElse { id, body, end } => match advance(&mut frames, *id) {
                    Some(true) => *body,
                    _ => *end,
                },
                Instruction::BlockClose { id, body } => match advance(&mut frames, *id) {
                    Some(true) => *body,
                    _ => pc + 1,
                },
                Instruction::Include { target, once, kind } => {
                    out.push_str(&self.include(target, *once, *kind, &frames)?);
                    pc + 1
                }
            };
        }
        Ok(out)
    }

    fn rows(&self, source: &Source, frames: &[Frame]) -> Result<Block> {
        Ok(match source {
            Source::Collection(expr) => Block::from_collection(&self.eval(expr, frames)?),
            Source::Nested { frame: id, name } => frame(frames, *id)
                .and_then(Frame::row)
                .and_then(|row| row.child(name))
                .cloned()
                .unwrap_or_default(),
            Source::Path(path) => self.blocks.block(path).cloned().unwrap_or_default(),
        })
    }

    fn eval(&self, expr: &Expr, frames: &[Frame]) -> Result<Value> {
        match expr {
            Expr::Access(access) => {
                let mut value = self.reference(&access.reference, frames)?;
                for subscript in &access.subscripts {
                    value = value.subscript(&self.argument(subscript, frames)?);
                }
                Ok(value)
            }
            Expr::Filter { name, input, args } => {
                let input = self.eval(input, frames)?;
                if !self.env.filters().exists(name) {
                    warn!(filter = name.as_str(), "unknown filter ignored");
                    return Ok(input);
                }
                let args = args
                    .iter()
                    .map(|arg| self.argument(arg, frames))
                    .collect::<Result<Vec<_>>>()?;
                self.env.filters().invoke(name, &input, &args)
            }
        }
    }

    fn reference(&self, reference: &Reference, frames: &[Frame]) -> Result<Value> {
        match reference {
            Reference::Var(name) => Ok(self.vars.get(name).map(Binding::get).unwrap_or_default()),
            Reference::Const(name) => self
                .constants
                .get(name)
                .cloned()
                .ok_or_else(|| Error::UndefinedConstant(name.clone())),
            Reference::Frame {
                frame: id,
                alias,
                path,
                field,
            } => {
                let mut row = frame(frames, *id).and_then(Frame::row);
                for segment in path {
                    row = row.and_then(|row| row.child(segment)).and_then(Block::current);
                }
                row.and_then(|row| row.get(field)).ok_or_else(|| {
                    let mut full = vec![alias.as_str()];
                    full.extend(path.iter().map(String::as_str));
                    BlockError::UndefinedBlockVariable {
                        path: full.join("."),
                        field: field.clone(),
                    }
                    .into()
                })
            }
            Reference::Block { path, field } => Ok(self.blocks.resolve(&path.join("."), field)?),
        }
    }

    fn argument(&self, argument: &Argument, frames: &[Frame]) -> Result<Value> {
        match argument {
            Argument::Int(value) => Ok(Value::Int(*value)),
            Argument::Str(value) => Ok(Value::String(value.clone())),
            Argument::Expr(expr) => self.eval(expr, frames),
        }
    }

    fn piece(&self, piece: &Piece, frames: &[Frame]) -> Result<Value> {
        match piece {
            Piece::Text(text) => Ok(Value::String(text.clone())),
            Piece::Expr(expr) => self.eval(expr, frames),
        }
    }

    fn test(&self, cond: &Condition, frames: &[Frame]) -> Result<bool> {
        let operands = cond
            .pieces
            .iter()
            .map(|piece| {
                Ok(match piece {
                    Piece::Text(text) => Operand::Text(text),
                    Piece::Expr(expr) => Operand::Value(self.eval(expr, frames)?),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.env
            .conditions()
            .evaluate(&operands)
            .map_err(|message| Error::Condition {
                condition: cond.to_string(),
                message,
            })
    }

    /// A single reference keeps its type; anything else is concatenated
    fn assign(&mut self, name: &str, subscripts: &[Argument], pieces: &[Piece], frames: &[Frame]) -> Result<()> {
        let value = match pieces {
            [Piece::Expr(expr)] => self.eval(expr, frames)?,
            pieces => {
                let mut text = String::new();
                for piece in pieces {
                    text.push_str(&self.piece(piece, frames)?.to_string());
                }
                Value::String(text)
            }
        };
        let keys = subscripts
            .iter()
            .map(|subscript| self.argument(subscript, frames))
            .collect::<Result<Vec<_>>>()?;
        self.vars
            .entry(name.to_string())
            .or_insert_with(|| Binding::Owned(Value::Null))
            .assign(&keys, value);
        Ok(())
    }

    fn destination(&self, target: &Target, frames: &[Frame]) -> Result<(String, Vec<(String, Value)>)> {
        match target {
            Target::Path { path, query } => {
                let params = query
                    .iter()
                    .map(|(name, piece)| {
                        let value = match piece {
                            Piece::Text(text) => Value::from(decode(text)),
                            Piece::Expr(expr) => self.eval(expr, frames)?,
                        };
                        Ok((decode(name), value))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok((path.clone(), params))
            }
            Target::Dynamic(expr) => {
                let target = self.eval(expr, frames)?.to_string();
                Ok(match target.split_once('?') {
                    Some((path, query)) => (path.to_string(), parse_query(query)),
                    None => (target, vec![]),
                })
            }
        }
    }

    fn include(&self, target: &Target, once: bool, kind: IncludeKind, frames: &[Frame]) -> Result<String> {
        let (name, params) = self.destination(target, frames)?;
        if self.depth >= MAX_INCLUDE_DEPTH {
            return Err(Error::IncludeDepth(MAX_INCLUDE_DEPTH));
        }
        if once && !self.included.borrow_mut().insert(self.env.loader().resolve_path(&name)) {
            debug!(template = name.as_str(), "skipped inclusion, already included once");
            return Ok(String::new());
        }
        match self.nested(&name, params) {
            Err(Error::MissingTemplate(missing)) => match kind {
                IncludeKind::Require => Err(Error::RequiredTemplate(missing)),
                IncludeKind::Include => {
                    let error = Error::MissingTemplate(missing);
                    warn!(%error, "inclusion failed");
                    Ok(error.to_string())
                }
            },
            rendered => rendered,
        }
    }

    /// Renders another template with the current variables overlaid by `params`.
    /// Open frames stay behind.
    fn nested(&self, name: &str, params: Vec<(String, Value)>) -> Result<String> {
        let program = self.env.program(name)?;
        let mut vars = self.vars.clone();
        vars.extend(params.into_iter().map(|(name, value)| (name, Binding::Owned(value))));
        Render {
            env: self.env,
            constants: self.constants,
            blocks: self.blocks,
            vars,
            included: self.included,
            depth: self.depth + 1,
        }
        .execute(&program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_query_strings() {
        assert_eq!(
            parse_query("a=1&b=&c&&d=x=y"),
            vec![
                ("a".to_string(), Value::from("1")),
                ("b".to_string(), Value::from("")),
                ("c".to_string(), Value::from("")),
                ("d".to_string(), Value::from("x=y")),
            ]
        );
    }

    #[test]
    fn decodes_query_components() {
        assert_eq!(decode("Hello%20World"), "Hello World");
        assert_eq!(decode("a+b%2Bc"), "a b+c");
        assert_eq!(decode("caf%C3%A9"), "café");
        assert_eq!(decode("100%"), "100%");
        assert_eq!(
            parse_query("my%5Fname=x%26y&flag"),
            vec![
                ("my_name".to_string(), Value::from("x&y")),
                ("flag".to_string(), Value::from("")),
            ]
        );
    }

    #[test]
    fn advances_matching_frames_only() {
        let mut block = Block::default();
        block.append(IndexMap::new());
        block.append(IndexMap::new());
        let mut frames = vec![Frame { id: 1, block, position: 0 }];
        assert_eq!(advance(&mut frames, 2), None);
        assert_eq!(advance(&mut frames, 1), Some(true));
        assert_eq!(advance(&mut frames, 1), Some(false));
        assert!(frames.is_empty());
    }
}
