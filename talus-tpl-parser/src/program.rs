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


//! Compiled instruction stream
//!
//! A [`Program`] is a flat sequence of [`Instruction`]s: literal text segments
//! interleaved with directives. Structured directives (conditions, iterations)
//! carry the indices of the instructions they jump to, fixed when the program is
//! emitted, so executing a program never mutates it.
//!
//! Programs are plain data and serialize with serde; the runtime stores them as
//! JSON in its cache. The [`Display`] implementation renders a compact listing:
//!
//! ```text
//! text("Hello ");print(trim(upper(NAME)));each#1(ITEMS as item){print(item#1.value);}
//! ```

use std::fmt::{Display, Write};

use serde::{Deserialize, Serialize};

/// A compiled template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub instructions: Vec<Instruction>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Literal text segments, in order
    pub fn literals(&self) -> impl Iterator<Item = &str> {
        self.instructions.iter().filter_map(|instruction| match instruction {
            Instruction::Text(text) => Some(text.as_str()),
            _ => None,
        })
    }

    /// Returns true if any instruction is a directive rather than literal text
    pub fn has_directives(&self) -> bool {
        self.instructions
            .iter()
            .any(|instruction| !matches!(instruction, Instruction::Text(_)))
    }
}

/// One segment of the instruction stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    /// Literal output, emitted verbatim
    Text(String),
    /// Resolve, filter and print a value
    Print(Expr),
    /// Assign to a context variable
    Set {
        name: String,
        subscripts: Vec<Argument>,
        value: Vec<Piece>,
    },
    /// Enter the branch when true, otherwise jump to `next` (elseif, else or endif)
    If { cond: Condition, next: usize },
    /// Tested only when jumped to; reached after a taken branch it jumps to `end`
    ElseIf {
        cond: Condition,
        next: usize,
        end: usize,
    },
    /// Entered only when jumped to; reached after a taken branch it jumps to `end`
    Else { end: usize },
    EndIf,
    /// Push iteration frame `id` over `source`; jump to `skip` when there are no rows
    BlockOpen {
        id: usize,
        alias: String,
        source: Source,
        skip: usize,
    },
    /// End of the rows body when an else branch follows: loop back to `body` or
    /// leave through `end`
    BlockElse { id: usize, body: usize, end: usize },
    /// End of the iteration: loop back to `body` while frame `id` has rows left
    BlockClose { id: usize, body: usize },
    /// Render another template in place
    Include {
        target: Target,
        once: bool,
        kind: IncludeKind,
    },
}

impl Instruction {
    pub fn is_directive(&self) -> bool {
        !matches!(self, Instruction::Text(_))
    }

    /// Rewrites every jump target of this instruction
    pub(crate) fn retarget(&mut self, map: impl Fn(usize) -> usize) {
        match self {
            Instruction::If { next, .. } => *next = map(*next),
            Instruction::ElseIf { next, end, .. } => {
                *next = map(*next);
                *end = map(*end);
            }
            Instruction::Else { end } => *end = map(*end),
            Instruction::BlockOpen { skip, .. } => *skip = map(*skip),
            Instruction::BlockElse { body, end, .. } => {
                *body = map(*body);
                *end = map(*end);
            }
            Instruction::BlockClose { body, .. } => *body = map(*body),
            _ => (),
        }
    }
}

/// Rows an iteration walks over
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Source {
    /// `<foreach>` over a list or map value
    Collection(Expr),
    /// `<block>` rows hosted by the active row of an enclosing frame
    Nested { frame: usize, name: String },
    /// `<block>` rows at a dotted path of the block tree
    Path(Vec<String>),
}

/// A value expression: an access, possibly wrapped by filters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Access(Access),
    /// `name(input, args...)`; the first filter of a chain is the innermost
    Filter {
        name: String,
        input: Box<Expr>,
        args: Vec<Argument>,
    },
}

/// A reference followed by subscripts: `NAME['key'][{$OTHER}]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Access {
    pub reference: Reference,
    pub subscripts: Vec<Argument>,
}

/// What a reference points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reference {
    /// Context variable
    Var(String),
    /// Host constant: `{__NAME__}`
    Const(String),
    /// Field of the active row of enclosing frame `frame`, optionally through
    /// child blocks of that row
    Frame {
        frame: usize,
        alias: String,
        path: Vec<String>,
        field: String,
    },
    /// Field of the current row of the block at `path`
    Block { path: Vec<String>, field: String },
}

/// Subscript or filter argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Argument {
    Int(i64),
    Str(String),
    Expr(Expr),
}

/// Part of a condition, a `set` value or an inclusion parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Piece {
    /// Opaque text, handed over unmodified
    Text(String),
    /// A compiled `{$…}` reference
    Expr(Expr),
}

/// Opaque boolean expression with its references compiled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub pieces: Vec<Piece>,
}

/// Template an inclusion directive renders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Target {
    /// Literal path, its query string already split into parameters
    Path { path: String, query: Vec<(String, Piece)> },
    /// Path computed at execution time; its query string is split then
    Dynamic(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncludeKind {
    /// A missing template prints a diagnostic and rendering goes on
    Include,
    /// A missing template aborts the render
    Require,
}

fn write_quoted(f: &mut std::fmt::Formatter<'_>, value: &str) -> std::fmt::Result {
    f.write_char('\'')?;
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            f.write_char('\\')?;
        }
        f.write_char(c)?;
    }
    f.write_char('\'')
}

fn write_pieces(f: &mut std::fmt::Formatter<'_>, pieces: &[Piece]) -> std::fmt::Result {
    for piece in pieces {
        match piece {
            Piece::Text(text) => f.write_str(text)?,
            Piece::Expr(expr) => write!(f, "{{{}}}", expr)?,
        }
    }
    Ok(())
}

impl Display for Argument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Argument::Int(value) => write!(f, "{}", value),
            Argument::Str(value) => write_quoted(f, value),
            Argument::Expr(expr) => write!(f, "{{{}}}", expr),
        }
    }
}

impl Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reference::Var(name) => f.write_str(name),
            Reference::Const(name) => write!(f, "const({})", name),
            Reference::Frame {
                frame,
                alias,
                path,
                field,
            } => {
                write!(f, "{}#{}", alias, frame)?;
                for segment in path {
                    write!(f, ".{}", segment)?;
                }
                write!(f, ".{}", field)
            }
            Reference::Block { path, field } => write!(f, "{}.{}", path.join("."), field),
        }
    }
}

impl Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reference)?;
        for subscript in &self.subscripts {
            write!(f, "[{}]", subscript)?;
        }
        Ok(())
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Access(access) => write!(f, "{}", access),
            Expr::Filter { name, input, args } => {
                write!(f, "{}({}", name, input)?;
                for arg in args {
                    write!(f, ", {}", arg)?;
                }
                f.write_char(')')
            }
        }
    }
}

impl Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write_pieces(f, &self.pieces)
    }
}

impl Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Collection(expr) => write!(f, "{}", expr),
            Source::Nested { frame, name } => write!(f, "#{}.{}", frame, name),
            Source::Path(path) => f.write_str(&path.join(".")),
        }
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Path { path, query } => {
                f.write_str(path)?;
                let mut glue = '?';
                for (name, value) in query {
                    write!(f, "{}{}=", glue, name)?;
                    write_pieces(f, std::slice::from_ref(value))?;
                    glue = '&';
                }
                Ok(())
            }
            Target::Dynamic(expr) => write!(f, "{{{}}}", expr),
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::Text(text) => write!(f, "text({:?});", text),
            Instruction::Print(expr) => write!(f, "print({});", expr),
            Instruction::Set {
                name,
                subscripts,
                value,
            } => {
                f.write_str("set(")?;
                f.write_str(name)?;
                for subscript in subscripts {
                    write!(f, "[{}]", subscript)?;
                }
                f.write_str(" = ")?;
                let mut glue = "";
                for piece in value {
                    f.write_str(glue)?;
                    match piece {
                        Piece::Text(text) => write!(f, "{:?}", text)?,
                        Piece::Expr(expr) => write!(f, "{}", expr)?,
                    }
                    glue = " . ";
                }
                f.write_str(");")
            }
            Instruction::If { cond, .. } => write!(f, "if({}){{", cond),
            Instruction::ElseIf { cond, .. } => write!(f, "}}elseif({}){{", cond),
            Instruction::Else { .. } => f.write_str("}else{"),
            Instruction::EndIf => f.write_char('}'),
            Instruction::BlockOpen {
                id, alias, source, ..
            } => write!(f, "each#{}({} as {}){{", id, source, alias),
            Instruction::BlockElse { .. } => f.write_str("}empty{"),
            Instruction::BlockClose { .. } => f.write_char('}'),
            Instruction::Include { target, once, kind } => {
                let name = match kind {
                    IncludeKind::Include => "include",
                    IncludeKind::Require => "require",
                };
                write!(f, "{}({}", name, target)?;
                if *once {
                    f.write_str(", once")?;
                }
                f.write_str(");")
            }
        }
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for instruction in &self.instructions {
            write!(f, "{}", instruction)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Expr {
        Expr::Access(Access {
            reference: Reference::Var(name.to_string()),
            subscripts: vec![],
        })
    }

    #[test]
    fn quotes_string_arguments() {
        let expr = Expr::Filter {
            name: "cut".to_string(),
            input: Box::new(var("TITLE")),
            args: vec![Argument::Int(20), Argument::Str("it's".to_string())],
        };
        assert_eq!(expr.to_string(), "cut(TITLE, 20, 'it\\'s')");
    }

    #[test]
    fn survives_json() {
        let program = Program {
            instructions: vec![
                Instruction::Text("a".to_string()),
                Instruction::Print(var("B")),
            ],
        };
        let json = serde_json::to_string(&program).unwrap();
        assert_eq!(serde_json::from_str::<Program>(&json).unwrap(), program);
    }

    #[test]
    fn retargets_jumps() {
        let mut instruction = Instruction::BlockElse {
            id: 1,
            body: 2,
            end: 7,
        };
        instruction.retarget(|at| at - 1);
        assert_eq!(
            instruction,
            Instruction::BlockElse {
                id: 1,
                body: 1,
                end: 6
            }
        );
    }
}
