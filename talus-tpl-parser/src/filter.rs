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


//! Filter pipeline composition
//!
//! A filter chain `{NAME|upper|cut:20:'…'}` desugars into nested
//! [`Expr::Filter`] nodes. The first filter listed wraps the raw expression and
//! every following filter wraps the previous result, so the chain above becomes
//! `cut(upper(NAME), 20, '…')`.
//!
//! Filters are looked up in a [`FilterCatalog`] while composing. A name the
//! catalog does not know is dropped with a [`Warning`]; the rest of the chain
//! still applies.

use regex::Regex;
use tracing::warn;

use crate::{
    error::{lcap, Warning},
    program::{Argument, Expr},
};

/// Names of the filters the runtime registers out of the box
pub const BUILTIN_FILTERS: &[&str] = &[
    "ceil",
    "floor",
    "protect",
    "safe",
    "ucfirst",
    "lcfirst",
    "invertCase",
    "maximize",
    "upper",
    "minimize",
    "lower",
    "trim",
    "nl2br",
    "slugify",
    "cut",
    "paragraphy",
    "void",
    "defaults",
];

/// Existence check for filters, consulted at compile time
pub trait FilterCatalog {
    fn exists(&self, name: &str) -> bool;
}

/// Catalog holding exactly [`BUILTIN_FILTERS`]
#[derive(Debug, Clone, Copy, Default)]
pub struct Builtins;

impl FilterCatalog for Builtins {
    fn exists(&self, name: &str) -> bool {
        BUILTIN_FILTERS.contains(&name)
    }
}

/// Catalog accepting every name, leaving the existence check to execution time.
/// Used when compiling ahead of time, before the runtime registry is known.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deferred;

impl FilterCatalog for Deferred {
    fn exists(&self, _name: &str) -> bool {
        true
    }
}

/// Turns a bare filter argument or subscript into a typed argument: integers pass
/// through, anything else becomes a string
pub(crate) fn escape(raw: &str, integer: &Regex) -> Argument {
    if integer.is_match(raw) {
        if let Ok(value) = raw.parse::<i64>() {
            return Argument::Int(value);
        }
    }
    Argument::Str(raw.to_string())
}

/// Wraps `input` in the filters of `chain`, leftmost innermost
pub(crate) fn compose(
    input: Expr,
    chain: Vec<(&str, Vec<Argument>)>,
    catalog: &dyn FilterCatalog,
    near: &str,
    warnings: &mut Vec<Warning>,
) -> Expr {
    chain.into_iter().fold(input, |composed, (name, args)| {
        if !catalog.exists(name) {
            warn!(filter = name, near = lcap(near), "unknown filter ignored");
            warnings.push(Warning::UnknownFilter {
                name: name.to_string(),
                near: lcap(near).to_string(),
            });
            return composed;
        }
        Expr::Filter {
            name: name.to_string(),
            input: Box::new(composed),
            args,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{Access, Reference};

    fn x() -> Expr {
        Expr::Access(Access {
            reference: Reference::Var("X".to_string()),
            subscripts: vec![],
        })
    }

    fn integer() -> Regex {
        Regex::new("^[+-]?(0|[1-9][0-9]*)$").unwrap()
    }

    #[test]
    fn left_filter_is_innermost() {
        let mut warnings = vec![];
        let composed = compose(
            x(),
            vec![("upper", vec![]), ("trim", vec![])],
            &Builtins,
            "{X|upper|trim}",
            &mut warnings,
        );
        assert_eq!(composed.to_string(), "trim(upper(X))");
        assert!(warnings.is_empty());
    }

    #[test]
    fn unknown_filter_is_skipped() {
        let mut warnings = vec![];
        let skipped = compose(
            x(),
            vec![("bogus", vec![]), ("upper", vec![])],
            &Builtins,
            "{X|bogus|upper}",
            &mut warnings,
        );
        let plain = compose(x(), vec![("upper", vec![])], &Builtins, "{X|upper}", &mut vec![]);
        assert_eq!(skipped, plain);
        assert_eq!(
            warnings,
            vec![Warning::UnknownFilter {
                name: "bogus".to_string(),
                near: "{X|bogus|upper}".to_string()
            }]
        );
    }

    #[test]
    fn deferred_keeps_every_filter() {
        let mut warnings = vec![];
        let composed = compose(x(), vec![("custom", vec![])], &Deferred, "{X|custom}", &mut warnings);
        assert_eq!(composed.to_string(), "custom(X)");
        assert!(warnings.is_empty());
    }

    #[test]
    fn escapes_arguments() {
        let integer = integer();
        assert_eq!(escape("20", &integer), Argument::Int(20));
        assert_eq!(escape("-3", &integer), Argument::Int(-3));
        assert_eq!(escape("007", &integer), Argument::Str("007".to_string()));
        assert_eq!(escape("it's", &integer), Argument::Str("it's".to_string()));
        assert_eq!(
            escape("99999999999999999999", &integer),
            Argument::Str("99999999999999999999".to_string())
        );
    }
}
