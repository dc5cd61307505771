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

//! Error handling for the template compiler
//!
//! Structural problems (unbalanced or misplaced tags, runaway nesting) abort the
//! compilation with a [`SyntaxError`]. Problems the compiler can route around,
//! such as a filter missing from the registry, are reported as [`Warning`]s
//! next to the compiled program.

use std::fmt::Display;

use thiserror::Error;

/// Maximum nesting of blocks, subscripts and filter arguments
pub const MAX_DEPTH: usize = 64;

/// Returns at most the first 32 characters of a string for error context
pub(crate) fn lcap(src: &str) -> &str {
    static CAP_AT: usize = 32;

    match src.char_indices().nth(CAP_AT) {
        Some((end, _)) => &src[..end],
        None => src,
    }
}

/// What went wrong structurally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    /// An opening tag without its closing tag
    Unclosed(&'static str),
    /// A closing tag with no matching opening tag
    Unexpected(&'static str),
    /// An else-like tag outside of the construct it belongs to
    Misplaced(&'static str),
    /// Blocks, subscripts or filter arguments nested beyond [`MAX_DEPTH`]
    TooDeep,
}

impl Display for SyntaxErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyntaxErrorKind::Unclosed(tag) => write!(f, "unclosed <{}> tag", tag),
            SyntaxErrorKind::Unexpected(tag) => write!(f, "unexpected </{}> tag", tag),
            SyntaxErrorKind::Misplaced(tag) => write!(f, "<{} /> not expected here", tag),
            SyntaxErrorKind::TooDeep => write!(f, "nesting deeper than {} levels", MAX_DEPTH),
        }
    }
}

/// Fatal compilation error, reported with the offending fragment
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} near \"{near}\"")]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    pub near: String,
}

impl SyntaxError {
    pub(crate) fn new(kind: SyntaxErrorKind, near: &str) -> Self {
        Self {
            kind,
            near: lcap(near).to_string(),
        }
    }

    pub(crate) fn too_deep(near: &str) -> Self {
        Self::new(SyntaxErrorKind::TooDeep, near)
    }
}

/// Non-fatal diagnostic produced while compiling
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Warning {
    #[error("the filter \"{name}\" does not exist, and thus shall be ignored (near \"{near}\")")]
    UnknownFilter { name: String, near: String },
}

/// Result type for compilation
pub type Result<T> = std::result::Result<T, SyntaxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_context_on_char_boundaries() {
        let long = "é".repeat(40);
        assert_eq!(lcap(&long).chars().count(), 32);
        assert_eq!(lcap("short"), "short");
    }

    #[test]
    fn displays_kind_and_fragment() {
        let err = SyntaxError::new(SyntaxErrorKind::Unclosed("foreach"), "<foreach ary=\"{$ITEMS}\">");
        assert_eq!(err.to_string(), "unclosed <foreach> tag near \"<foreach ary=\"{$ITEMS}\">\"");
    }
}
