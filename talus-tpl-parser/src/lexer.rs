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


//! Single pass tokenizer
//!
//! The lexer walks the normalized source once, left to right. At every `{` it
//! first checks for the `{\` escape, then for a print construct; at every `<` it
//! checks for one of the recognized tags. Anything else accumulates as literal
//! text. Tags are matched with the namespace prefix on the tag name and on every
//! attribute name, and a tag carrying an attribute it does not expect is left as
//! literal text.
//!
//! ```text
//! <foreach ary="{$ITEMS}" as="item"> … <foreachelse /> … </foreach>
//! <block name="child" parent="parent"> … </foreach>
//! <if cond="{$A} > 1"> … <elseif cond="…" /> … <else /> … </if>
//! <include tpl="header.html?title=Home" once="true" />
//! <require tpl="{$PAGE}" />
//! <set var="TITLE[main]">Home of {$USER}</set>
//! ```

use regex::Regex;

use crate::{
    error::Result,
    expression::{is_path, Arg, Cursor, Part, Scanner, Variable},
    program::IncludeKind,
};

/// Where an inclusion tag points
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Destination<'a> {
    Path {
        path: &'a str,
        query: Vec<(&'a str, Part<'a>)>,
    },
    Dynamic(Variable<'a>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tag<'a> {
    Foreach {
        collection: Variable<'a>,
        alias: Option<&'a str>,
    },
    ForeachElse,
    EndForeach,
    Block {
        name: &'a str,
        parent: Option<&'a str>,
    },
    If(Vec<Part<'a>>),
    ElseIf(Vec<Part<'a>>),
    Else,
    EndIf,
    Include {
        kind: IncludeKind,
        target: Destination<'a>,
        once: bool,
    },
    Set {
        name: &'a str,
        subscripts: Vec<Arg<'a>>,
        body: Vec<Part<'a>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token<'a> {
    Text(&'a str),
    Print(Variable<'a>),
    /// A tag and its source text
    Tag(Tag<'a>, &'a str),
}

/// Tag features that can be switched off
#[derive(Debug, Clone, Copy)]
pub(crate) struct Features {
    pub conditions: bool,
    pub inclusion: bool,
    pub set_statements: bool,
}

/// Attribute list of a tag, consumed as the tag is interpreted
struct Attributes<'a> {
    list: Vec<(&'a str, &'a str)>,
}

impl<'a> Attributes<'a> {
    /// Removes the first attribute carrying one of `names`
    fn take(&mut self, names: &[&str]) -> Option<&'a str> {
        let at = self.list.iter().position(|(name, _)| names.contains(name))?;
        Some(self.list.remove(at).1)
    }

    fn done(&self) -> bool {
        self.list.is_empty()
    }
}

/// A tag's name, attributes and end offset
struct Head<'a> {
    name: &'a str,
    attributes: Attributes<'a>,
    self_closing: bool,
    end: usize,
}

pub(crate) struct Lexer<'c> {
    scanner: Scanner,
    features: Features,
    namespace: &'c str,
    include: &'c Regex,
}

impl<'c> Lexer<'c> {
    pub fn new(scanner: Scanner, features: Features, namespace: &'c str, include: &'c Regex) -> Self {
        Self {
            scanner,
            features,
            namespace,
            include,
        }
    }

    pub fn tokenize<'a>(&self, src: &'a str) -> Result<Vec<Token<'a>>> {
        let bytes = src.as_bytes();
        let mut tokens = Vec::new();
        let mut text_start = 0;
        let mut pos = 0;
        while pos < bytes.len() {
            let found = match bytes[pos] {
                b'{' if bytes.get(pos + 1) == Some(&b'\\') => {
                    Some((Token::Text(&src[pos..pos + 1]), pos + 2))
                }
                b'{' => {
                    let mut cursor = Cursor::new(src, pos);
                    match self.scanner.variable(&mut cursor, 0)? {
                        Some(variable) if !variable.value => Some((Token::Print(variable), cursor.pos)),
                        _ => None,
                    }
                }
                b'<' => self
                    .tag(src, pos)?
                    .map(|(tag, end)| (Token::Tag(tag, &src[pos..end]), end)),
                _ => None,
            };
            match found {
                Some((token, end)) => {
                    if pos > text_start {
                        tokens.push(Token::Text(&src[text_start..pos]));
                    }
                    tokens.push(token);
                    pos = end;
                    text_start = end;
                }
                None => pos += 1,
            }
        }
        if text_start < src.len() {
            tokens.push(Token::Text(&src[text_start..]));
        }
        Ok(tokens)
    }

    fn head<'a>(&self, src: &'a str, at: usize) -> Option<Head<'a>> {
        let mut cursor = Cursor::new(src, at + 1);
        if !cursor.eat_str(self.namespace) {
            return None;
        }
        let name = cursor.ident()?;
        let mut list = Vec::new();
        loop {
            let spaced = cursor.skip_whitespace();
            if cursor.eat_str("/>") {
                return Some(Head {
                    name,
                    attributes: Attributes { list },
                    self_closing: true,
                    end: cursor.pos,
                });
            }
            if cursor.eat('>') {
                return Some(Head {
                    name,
                    attributes: Attributes { list },
                    self_closing: false,
                    end: cursor.pos,
                });
            }
            if !spaced || !cursor.eat_str(self.namespace) {
                return None;
            }
            let attribute = cursor.ident()?;
            if !cursor.eat_str("=\"") {
                return None;
            }
            let value = cursor.until(|c| c == '"');
            if !cursor.eat('"') {
                return None;
            }
            list.push((attribute, value));
        }
    }

    fn closing(&self, src: &str, at: usize) -> Option<(Tag<'static>, usize)> {
        let mut cursor = Cursor::new(src, at);
        if !cursor.eat_str("</") || !cursor.eat_str(self.namespace) {
            return None;
        }
        if cursor.eat_str("foreach>") {
            return Some((Tag::EndForeach, cursor.pos));
        }
        if self.features.conditions && cursor.eat_str("if>") {
            return Some((Tag::EndIf, cursor.pos));
        }
        None
    }

    fn tag<'a>(&self, src: &'a str, at: usize) -> Result<Option<(Tag<'a>, usize)>> {
        if src[at..].starts_with("</") {
            return Ok(self.closing(src, at));
        }
        let Head {
            name,
            mut attributes,
            self_closing,
            end,
        } = match self.head(src, at) {
            Some(head) => head,
            None => return Ok(None),
        };
        let features = self.features;
        let tag = match (name, self_closing) {
            ("foreach", false) => self.foreach(&mut attributes)?,
            ("foreachelse", true) => Some(Tag::ForeachElse),
            ("block", false) => Self::block(&mut attributes),
            ("if", false) if features.conditions => self.condition(&mut attributes)?.map(Tag::If),
            ("elseif", true) | ("elif", true) if features.conditions => {
                self.condition(&mut attributes)?.map(Tag::ElseIf)
            }
            ("else", true) if features.conditions => Some(Tag::Else),
            ("include", true) if features.inclusion => self.include(IncludeKind::Include, &mut attributes)?,
            ("require", true) if features.inclusion => self.include(IncludeKind::Require, &mut attributes)?,
            ("set", false) if features.set_statements => return self.set(src, end, &mut attributes),
            _ => None,
        };
        Ok(match tag {
            Some(tag) if attributes.done() => Some((tag, end)),
            _ => None,
        })
    }

    fn foreach<'a>(&self, attributes: &mut Attributes<'a>) -> Result<Option<Tag<'a>>> {
        let collection = match attributes.take(&["ary", "array"]) {
            Some(value) => match self.scanner.exact(value)? {
                Some(collection) => collection,
                None => return Ok(None),
            },
            None => return Ok(None),
        };
        let alias = attributes.take(&["as", "name"]);
        if alias.is_some_and(|alias| !is_path(alias) || alias.contains('.')) {
            return Ok(None);
        }
        Ok(Some(Tag::Foreach { collection, alias }))
    }

    fn block<'a>(attributes: &mut Attributes<'a>) -> Option<Tag<'a>> {
        let name = attributes.take(&["name"])?;
        let parent = attributes.take(&["parent"]);
        if !is_path(name) || name.contains('.') || parent.is_some_and(|parent| !is_path(parent)) {
            return None;
        }
        Some(Tag::Block { name, parent })
    }

    fn condition<'a>(&self, attributes: &mut Attributes<'a>) -> Result<Option<Vec<Part<'a>>>> {
        match attributes.take(&["cond", "condition"]) {
            Some(cond) if !cond.trim().is_empty() => Ok(Some(self.scanner.parts(cond)?)),
            _ => Ok(None),
        }
    }

    fn include<'a>(&self, kind: IncludeKind, attributes: &mut Attributes<'a>) -> Result<Option<Tag<'a>>> {
        let tpl = match attributes.take(&["tpl"]) {
            Some(tpl) => tpl,
            None => return Ok(None),
        };
        let once = match attributes.take(&["once"]) {
            None | Some("false") => false,
            Some("true") => true,
            Some(_) => return Ok(None),
        };
        if let Some(variable) = self.scanner.exact(tpl)? {
            return Ok(Some(Tag::Include {
                kind,
                target: Destination::Dynamic(variable),
                once,
            }));
        }
        let captures = match self.include.captures(tpl) {
            Some(captures) => captures,
            None => return Ok(None),
        };
        let path = match captures.name("path") {
            Some(path) => path.as_str(),
            None => return Ok(None),
        };
        let mut query = Vec::new();
        if let Some(string) = captures.name("query") {
            for pair in string.as_str().split('&').filter(|pair| !pair.is_empty()) {
                let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
                if name.is_empty() {
                    return Ok(None);
                }
                let value = match self.scanner.exact(value)? {
                    Some(variable) => Part::Ref(variable),
                    None => Part::Text(value),
                };
                query.push((name, value));
            }
        }
        Ok(Some(Tag::Include {
            kind,
            target: Destination::Path { path, query },
            once,
        }))
    }

    /// A `set` tag spans up to its closing tag; its body must not be empty
    fn set<'a>(&self, src: &'a str, open_end: usize, attributes: &mut Attributes<'a>) -> Result<Option<(Tag<'a>, usize)>> {
        let var = match attributes.take(&["var"]) {
            Some(var) if attributes.done() => var,
            _ => return Ok(None),
        };
        let (name, subscripts) = match self.scanner.assignable(var)? {
            Some(target) => target,
            None => return Ok(None),
        };
        let close = format!("</{}set>", self.namespace);
        let length = match src[open_end..].find(&close) {
            Some(0) | None => return Ok(None),
            Some(length) => length,
        };
        let body = self.scanner.parts(&src[open_end..open_end + length])?;
        Ok(Some((
            Tag::Set {
                name,
                subscripts,
                body,
            },
            open_end + length + close.len(),
        )))
    }
}
