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


//! Syntax tree with every reference resolved against its enclosing scopes

use crate::program::{Argument, Condition, Expr, IncludeKind, Piece, Source, Target};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Print(Expr),
    Set {
        name: String,
        subscripts: Vec<Argument>,
        value: Vec<Piece>,
    },
    /// `if` and `elseif` branches in order, then the `else` branch
    If {
        branches: Vec<(Condition, Vec<Node>)>,
        otherwise: Option<Vec<Node>>,
    },
    /// An iteration; `empty` renders when there are no rows
    Each {
        id: usize,
        alias: String,
        source: Source,
        body: Vec<Node>,
        empty: Option<Vec<Node>>,
    },
    Include {
        target: Target,
        once: bool,
        kind: IncludeKind,
    },
}
