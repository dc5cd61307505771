// MIT License
//
// Copyright (c) 2024 Jerome Johnson
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.


//! Recursive descent over the token stream
//!
//! The parser matches opening and closing tags into a tree of [`Node`]s and
//! resolves every reference while the scopes that give it meaning are open.
//! Each iteration is given a synthetic id, counting from 1 in source order. A
//! dotted reference whose first segment is the alias of an enclosing iteration
//! addresses that iteration's active row through its id; any other dotted
//! reference is a path into the block tree, resolved at execution time.

use regex::Regex;

use crate::{
    ast::Node,
    error::{Result, SyntaxError, SyntaxErrorKind, Warning, MAX_DEPTH},
    expression::{Arg, Part, Variable},
    filter::{self, FilterCatalog},
    lexer::{Destination, Tag, Token},
    program::{Access, Argument, Condition, Expr, Piece, Reference, Source, Target},
};

/// Tag that ends a sequence of nodes
enum Stop<'a> {
    ForeachElse(&'a str),
    EndForeach(&'a str),
    ElseIf(Vec<Part<'a>>, &'a str),
    Else(&'a str),
    EndIf(&'a str),
}

impl<'a> Stop<'a> {
    /// The error for this tag appearing where nothing expects it
    fn stray(self) -> SyntaxError {
        match self {
            Stop::ForeachElse(raw) => SyntaxError::new(SyntaxErrorKind::Misplaced("foreachelse"), raw),
            Stop::EndForeach(raw) => SyntaxError::new(SyntaxErrorKind::Unexpected("foreach"), raw),
            Stop::ElseIf(_, raw) => SyntaxError::new(SyntaxErrorKind::Misplaced("elseif"), raw),
            Stop::Else(raw) => SyntaxError::new(SyntaxErrorKind::Misplaced("else"), raw),
            Stop::EndIf(raw) => SyntaxError::new(SyntaxErrorKind::Unexpected("if"), raw),
        }
    }
}

/// An open iteration
struct Frame {
    id: usize,
    alias: String,
}

/// Foreach rows carry their value in `value`; `val` is accepted for it
fn field_name(field: &str) -> String {
    match field {
        "val" => "value".to_string(),
        field => field.to_string(),
    }
}

pub(crate) struct Parser<'a, 'c> {
    tokens: std::vec::IntoIter<Token<'a>>,
    catalog: &'c dyn FilterCatalog,
    integer: &'c Regex,
    frames: Vec<Frame>,
    next_id: usize,
    warnings: Vec<Warning>,
}

impl<'a, 'c> Parser<'a, 'c> {
    pub fn new(tokens: Vec<Token<'a>>, catalog: &'c dyn FilterCatalog, integer: &'c Regex) -> Self {
        Self {
            tokens: tokens.into_iter(),
            catalog,
            integer,
            frames: Vec::new(),
            next_id: 1,
            warnings: Vec::new(),
        }
    }

    pub fn parse(mut self) -> Result<(Vec<Node>, Vec<Warning>)> {
        let (nodes, stop) = self.sequence(0)?;
        if let Some(stop) = stop {
            return Err(stop.stray());
        }
        Ok((nodes, self.warnings))
    }

    /// Parses nodes up to the end of input or the next tag that closes a construct
    fn sequence(&mut self, depth: usize) -> Result<(Vec<Node>, Option<Stop<'a>>)> {
        let mut nodes = Vec::new();
        while let Some(token) = self.tokens.next() {
            let (tag, raw) = match token {
                Token::Text(text) => {
                    nodes.push(Node::Text(text.to_string()));
                    continue;
                }
                Token::Print(variable) => {
                    nodes.push(Node::Print(self.expression(&variable)?));
                    continue;
                }
                Token::Tag(tag, raw) => (tag, raw),
            };
            match tag {
                Tag::ForeachElse => return Ok((nodes, Some(Stop::ForeachElse(raw)))),
                Tag::EndForeach => return Ok((nodes, Some(Stop::EndForeach(raw)))),
                Tag::ElseIf(cond) => return Ok((nodes, Some(Stop::ElseIf(cond, raw)))),
                Tag::Else => return Ok((nodes, Some(Stop::Else(raw)))),
                Tag::EndIf => return Ok((nodes, Some(Stop::EndIf(raw)))),
                Tag::Foreach { collection, alias } => {
                    let source = Source::Collection(self.expression(&collection)?);
                    let alias = alias.unwrap_or(collection.path[0]);
                    nodes.push(self.each(depth + 1, "foreach", raw, alias, source)?);
                }
                Tag::Block { name, parent } => {
                    let source = self.block_source(name, parent);
                    nodes.push(self.each(depth + 1, "block", raw, name, source)?);
                }
                Tag::If(cond) => nodes.push(self.branches(depth + 1, raw, cond)?),
                Tag::Include { kind, target, once } => {
                    let target = match target {
                        Destination::Path { path, query } => {
                            let mut pairs = Vec::with_capacity(query.len());
                            for (name, value) in &query {
                                pairs.push((name.to_string(), self.piece(value)?));
                            }
                            Target::Path {
                                path: path.to_string(),
                                query: pairs,
                            }
                        }
                        Destination::Dynamic(variable) => Target::Dynamic(self.expression(&variable)?),
                    };
                    nodes.push(Node::Include { target, once, kind });
                }
                Tag::Set {
                    name,
                    subscripts,
                    body,
                } => nodes.push(Node::Set {
                    name: name.to_string(),
                    subscripts: self.arguments(&subscripts)?,
                    value: self.pieces(&body)?,
                }),
            }
        }
        Ok((nodes, None))
    }

    fn block_source(&self, name: &str, parent: Option<&str>) -> Source {
        match parent {
            Some(parent) => match self.frames.iter().rev().find(|frame| frame.alias == parent) {
                Some(frame) => Source::Nested {
                    frame: frame.id,
                    name: name.to_string(),
                },
                None => Source::Path(
                    parent
                        .split('.')
                        .chain(std::iter::once(name))
                        .map(str::to_string)
                        .collect(),
                ),
            },
            None => Source::Path(vec![name.to_string()]),
        }
    }

    fn each(&mut self, depth: usize, tag: &'static str, raw: &'a str, alias: &str, source: Source) -> Result<Node> {
        if depth > MAX_DEPTH {
            return Err(SyntaxError::too_deep(raw));
        }
        let id = self.next_id;
        self.next_id += 1;
        self.frames.push(Frame {
            id,
            alias: alias.to_string(),
        });
        let body = self.sequence(depth);
        self.frames.pop();
        let (body, stop) = body?;
        let empty = match stop {
            Some(Stop::EndForeach(_)) => None,
            Some(Stop::ForeachElse(_)) => match self.sequence(depth)? {
                (empty, Some(Stop::EndForeach(_))) => Some(empty),
                (_, Some(stop)) => return Err(stop.stray()),
                (_, None) => return Err(SyntaxError::new(SyntaxErrorKind::Unclosed(tag), raw)),
            },
            Some(stop) => return Err(stop.stray()),
            None => return Err(SyntaxError::new(SyntaxErrorKind::Unclosed(tag), raw)),
        };
        Ok(Node::Each {
            id,
            alias: alias.to_string(),
            source,
            body,
            empty,
        })
    }

    fn branches(&mut self, depth: usize, raw: &'a str, first: Vec<Part<'a>>) -> Result<Node> {
        if depth > MAX_DEPTH {
            return Err(SyntaxError::too_deep(raw));
        }
        let mut branches = Vec::new();
        let mut cond = self.condition(&first)?;
        loop {
            let (body, stop) = self.sequence(depth)?;
            branches.push((cond, body));
            match stop {
                Some(Stop::ElseIf(next, _)) => cond = self.condition(&next)?,
                Some(Stop::Else(_)) => {
                    return match self.sequence(depth)? {
                        (otherwise, Some(Stop::EndIf(_))) => Ok(Node::If {
                            branches,
                            otherwise: Some(otherwise),
                        }),
                        (_, Some(stop)) => Err(stop.stray()),
                        (_, None) => Err(SyntaxError::new(SyntaxErrorKind::Unclosed("if"), raw)),
                    };
                }
                Some(Stop::EndIf(_)) => {
                    return Ok(Node::If {
                        branches,
                        otherwise: None,
                    });
                }
                Some(stop) => return Err(stop.stray()),
                None => return Err(SyntaxError::new(SyntaxErrorKind::Unclosed("if"), raw)),
            }
        }
    }

    fn condition(&mut self, parts: &[Part<'a>]) -> Result<Condition> {
        Ok(Condition {
            pieces: self.pieces(parts)?,
        })
    }

    fn pieces(&mut self, parts: &[Part<'a>]) -> Result<Vec<Piece>> {
        let mut pieces = Vec::with_capacity(parts.len());
        for part in parts {
            pieces.push(self.piece(part)?);
        }
        Ok(pieces)
    }

    fn piece(&mut self, part: &Part<'a>) -> Result<Piece> {
        Ok(match part {
            Part::Text(text) => Piece::Text(text.to_string()),
            Part::Ref(variable) => Piece::Expr(self.expression(variable)?),
        })
    }

    fn arguments(&mut self, args: &[Arg<'a>]) -> Result<Vec<Argument>> {
        let mut arguments = Vec::with_capacity(args.len());
        for arg in args {
            arguments.push(match arg {
                Arg::Bare(raw) => filter::escape(raw, self.integer),
                Arg::Quoted(value) => Argument::Str(value.clone()),
                Arg::Ref(variable) => Argument::Expr(self.expression(variable)?),
            });
        }
        Ok(arguments)
    }

    fn reference(&self, variable: &Variable<'a>) -> Reference {
        let path = &variable.path;
        let first = path[0];
        if variable.constant {
            return Reference::Const(first[2..first.len() - 2].to_string());
        }
        if path.len() == 1 {
            return Reference::Var(first.to_string());
        }
        let field = field_name(path[path.len() - 1]);
        match self.frames.iter().rev().find(|frame| frame.alias == first) {
            Some(frame) => Reference::Frame {
                frame: frame.id,
                alias: frame.alias.clone(),
                path: path[1..path.len() - 1].iter().map(|segment| segment.to_string()).collect(),
                field,
            },
            None => Reference::Block {
                path: path[..path.len() - 1].iter().map(|segment| segment.to_string()).collect(),
                field,
            },
        }
    }

    /// Resolves a variable and composes its filter chain
    fn expression(&mut self, variable: &Variable<'a>) -> Result<Expr> {
        let access = Expr::Access(Access {
            reference: self.reference(variable),
            subscripts: self.arguments(&variable.subscripts)?,
        });
        if variable.filters.is_empty() {
            return Ok(access);
        }
        let mut chain = Vec::with_capacity(variable.filters.len());
        for call in &variable.filters {
            chain.push((call.name, self.arguments(&call.args)?));
        }
        Ok(filter::compose(access, chain, self.catalog, variable.raw, &mut self.warnings))
    }
}
