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


//! Value expressions
//!
//! This module scans the brace constructs of the template language. Each
//! construct becomes an unresolved [`Variable`]: the dotted path as written,
//! its subscripts and its filter chain. Whether a path names a context variable,
//! a field of an enclosing iteration or a block of the block tree is decided
//! later by the parser, which knows the open scopes.
//!
//! # Forms
//!
//! ```text
//! {NAME}                     print a variable
//! {$NAME}                    the variable as a value (attributes, subscripts, arguments)
//! {NAME[0]['key'][{$K}]}     subscripts: integer, quoted, bare word or a value
//! {item.value} {item.key}    fields of an iteration
//! {__VERSION__}              host constant
//! {NAME|cut:20:'...'|upper}  filter chain with arguments
//! ```
//!
//! No whitespace is allowed anywhere inside the braces. Anything that does not
//! scan is not an expression and stays literal text.

use crate::error::{Result, SyntaxError, MAX_DEPTH};

/// A brace construct as written in the template
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Variable<'a> {
    /// The complete construct including braces
    pub raw: &'a str,
    /// Written with the `$` sigil: a value, not something to print
    pub value: bool,
    pub constant: bool,
    pub path: Vec<&'a str>,
    pub subscripts: Vec<Arg<'a>>,
    pub filters: Vec<FilterCall<'a>>,
}

/// Subscript or filter argument as written
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Arg<'a> {
    /// Unquoted token, an integer or a string
    Bare(&'a str),
    /// Quoted string, quotes and escapes removed
    Quoted(String),
    /// Nested `{$…}` value
    Ref(Variable<'a>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FilterCall<'a> {
    pub name: &'a str,
    pub args: Vec<Arg<'a>>,
}

/// Piece of free text with embedded `{$…}` values
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Part<'a> {
    Text(&'a str),
    Ref(Variable<'a>),
}

/// Position in a source string
pub(crate) struct Cursor<'a> {
    pub src: &'a str,
    pub pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(src: &'a str, pos: usize) -> Self {
        Self { src, pos }
    }

    pub fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    pub fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            return true;
        }
        false
    }

    pub fn eat_str(&mut self, s: &str) -> bool {
        if self.rest().starts_with(s) {
            self.pos += s.len();
            return true;
        }
        false
    }

    /// Consumes characters up to the first one matching `stop`
    pub fn until(&mut self, stop: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let end = rest.find(stop).unwrap_or(rest.len());
        self.pos += end;
        &rest[..end]
    }

    /// Consumes whitespace, returning true if there was any
    pub fn skip_whitespace(&mut self) -> bool {
        !self.until(|c| !c.is_whitespace()).is_empty()
    }

    pub fn ident(&mut self) -> Option<&'a str> {
        let rest = self.rest();
        match rest.chars().next() {
            Some(c) if c.is_alphabetic() || c == '_' => (),
            _ => return None,
        }
        let end = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        self.pos += end;
        Some(&rest[..end])
    }

    /// Single or double quoted string; a backslash escapes the quote character
    pub fn quoted(&mut self) -> Option<String> {
        let quote = match self.peek() {
            Some(c) if c == '\'' || c == '"' => c,
            _ => return None,
        };
        let mut content = String::new();
        let mut escaped = false;
        for (i, c) in self.rest().char_indices().skip(1) {
            if escaped {
                if c != quote && c != '\\' {
                    content.push('\\');
                }
                content.push(c);
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                self.pos += i + 1;
                return Some(content);
            } else {
                content.push(c);
            }
        }
        None
    }
}

/// Returns true if `src` is a dotted chain of identifiers
pub(crate) fn is_path(src: &str) -> bool {
    !src.is_empty()
        && src.split('.').all(|segment| {
            let mut cursor = Cursor::new(segment, 0);
            cursor.ident().is_some() && cursor.at_end()
        })
}

/// Scanner for brace constructs, configured by the enabled features
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scanner {
    pub filters: bool,
    pub constants: bool,
}

impl Scanner {
    /// Scans a brace construct at the cursor. `Ok(None)` means the text is not an
    /// expression; the cursor position is then unspecified.
    pub fn variable<'a>(&self, cursor: &mut Cursor<'a>, depth: usize) -> Result<Option<Variable<'a>>> {
        if depth > MAX_DEPTH {
            return Err(SyntaxError::too_deep(cursor.rest()));
        }
        let start = cursor.pos;
        if !cursor.eat('{') {
            return Ok(None);
        }
        let value = cursor.eat('$');
        let mut path = match cursor.ident() {
            Some(first) => vec![first],
            None => return Ok(None),
        };
        while cursor.eat('.') {
            match cursor.ident() {
                Some(segment) => path.push(segment),
                None => return Ok(None),
            }
        }
        let first = path[0];
        let constant = self.constants
            && path.len() == 1
            && first.len() > 4
            && first.starts_with("__")
            && first.ends_with("__");

        let mut subscripts = Vec::new();
        while cursor.eat('[') {
            match self.subscript(cursor, depth)? {
                Some(arg) => subscripts.push(arg),
                None => return Ok(None),
            }
            if !cursor.eat(']') {
                return Ok(None);
            }
        }

        let mut filters = Vec::new();
        if self.filters {
            while cursor.eat('|') {
                let name = match cursor.ident() {
                    Some(name) => name,
                    None => return Ok(None),
                };
                let mut args = Vec::new();
                while cursor.eat(':') {
                    match self.argument(cursor, depth)? {
                        Some(arg) => args.push(arg),
                        None => return Ok(None),
                    }
                }
                filters.push(FilterCall { name, args });
            }
        }

        if !cursor.eat('}') {
            return Ok(None);
        }
        Ok(Some(Variable {
            raw: &cursor.src[start..cursor.pos],
            value,
            constant,
            path,
            subscripts,
            filters,
        }))
    }

    /// A nested `{$…}`; print forms are not values
    fn reference<'a>(&self, cursor: &mut Cursor<'a>, depth: usize) -> Result<Option<Arg<'a>>> {
        Ok(match self.variable(cursor, depth + 1)? {
            Some(variable) if variable.value => Some(Arg::Ref(variable)),
            _ => None,
        })
    }

    fn subscript<'a>(&self, cursor: &mut Cursor<'a>, depth: usize) -> Result<Option<Arg<'a>>> {
        match cursor.peek() {
            Some('{') => self.reference(cursor, depth),
            Some('\'') | Some('"') => Ok(cursor.quoted().map(Arg::Quoted)),
            _ => {
                let bare = cursor.until(|c| matches!(c, ']' | '[' | '{' | '}' | '\'' | '"') || c.is_whitespace());
                Ok(if bare.is_empty() { None } else { Some(Arg::Bare(bare)) })
            }
        }
    }

    fn argument<'a>(&self, cursor: &mut Cursor<'a>, depth: usize) -> Result<Option<Arg<'a>>> {
        match cursor.peek() {
            Some('{') => self.reference(cursor, depth),
            Some('\'') | Some('"') => Ok(cursor.quoted().map(Arg::Quoted)),
            _ => {
                let bare = cursor.until(|c| matches!(c, ':' | '|' | '{' | '}') || c.is_whitespace());
                Ok(if bare.is_empty() { None } else { Some(Arg::Bare(bare)) })
            }
        }
    }

    /// The whole of `src` is a single `{$…}` value
    pub fn exact<'a>(&self, src: &'a str) -> Result<Option<Variable<'a>>> {
        let mut cursor = Cursor::new(src, 0);
        Ok(match self.variable(&mut cursor, 1)? {
            Some(variable) if variable.value && cursor.at_end() => Some(variable),
            _ => None,
        })
    }

    /// Splits free text around its `{$…}` values
    pub fn parts<'a>(&self, src: &'a str) -> Result<Vec<Part<'a>>> {
        let mut parts = Vec::new();
        let mut text_start = 0;
        let mut pos = 0;
        while let Some(offset) = src[pos..].find('{') {
            let at = pos + offset;
            let mut cursor = Cursor::new(src, at);
            match self.variable(&mut cursor, 1)? {
                Some(variable) if variable.value => {
                    if at > text_start {
                        parts.push(Part::Text(&src[text_start..at]));
                    }
                    parts.push(Part::Ref(variable));
                    pos = cursor.pos;
                    text_start = pos;
                }
                _ => pos = at + 1,
            }
        }
        if text_start < src.len() {
            parts.push(Part::Text(&src[text_start..]));
        }
        Ok(parts)
    }

    /// Assignment target of a `set` tag: `NAME` followed by subscripts
    pub fn assignable<'a>(&self, src: &'a str) -> Result<Option<(&'a str, Vec<Arg<'a>>)>> {
        let mut cursor = Cursor::new(src, 0);
        let name = match cursor.ident() {
            Some(name) => name,
            None => return Ok(None),
        };
        let mut subscripts = Vec::new();
        while cursor.eat('[') {
            match self.subscript(&mut cursor, 1)? {
                Some(arg) => subscripts.push(arg),
                None => return Ok(None),
            }
            if !cursor.eat(']') {
                return Ok(None);
            }
        }
        Ok(if cursor.at_end() { Some((name, subscripts)) } else { None })
    }
}
