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


//! Template compiler
//!
//! The compiler runs the front end in a fixed order: comments and legacy tag
//! spellings are normalized, the lexer splits the source into text, print
//! constructs and tags, the parser builds a resolved tree, and code generation
//! flattens it into a [`Program`].
//!
//! ```rust
//! use talus_tpl_parser::{Builtins, Compiler, Options};
//!
//! let compiler = Compiler::new(Options::default());
//! let compiled = compiler.compile("Hello {NAME|ucfirst}!", &Builtins).unwrap();
//! assert_eq!(compiled.program.to_string(), "text(\"Hello \");print(ucfirst(NAME));text(\"!\");");
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    codegen,
    error::{Result, Warning},
    expression::Scanner,
    filter::FilterCatalog,
    lexer::{Features, Lexer},
    normalize::Normalizer,
    parser::Parser,
    program::Program,
};

/// Compiler options
///
/// Every feature is on by default. Disabled features leave their syntax in the
/// output as literal text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Filter chains: `{NAME|upper}`
    pub enable_filters: bool,
    /// `<include />` and `<require />` tags
    pub enable_inclusion: bool,
    /// `<if>`, `<elseif />`, `<else />`
    pub enable_conditions: bool,
    /// `{__NAME__}`
    pub enable_constants: bool,
    /// `<set>` tags
    pub enable_set_statements: bool,
    /// Prefix required on tag and attribute names, without the colon
    pub namespace_prefix: Option<String>,
    /// Drop whitespace-only text between two directives
    pub compact_whitespace: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            enable_filters: true,
            enable_inclusion: true,
            enable_conditions: true,
            enable_constants: true,
            enable_set_statements: true,
            namespace_prefix: None,
            compact_whitespace: false,
        }
    }
}

/// A compiled program with the diagnostics raised while compiling it
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    pub program: Program,
    pub warnings: Vec<Warning>,
}

pub struct Compiler {
    options: Options,
    namespace: String,
    normalizer: Normalizer,
    integer: Regex,
    include: Regex,
}

impl Compiler {
    pub fn new(options: Options) -> Self {
        let namespace = match options.namespace_prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => format!("{}:", prefix),
            _ => String::new(),
        };
        Self {
            normalizer: Normalizer::new(&namespace),
            integer: Regex::new("^[+-]?(0|[1-9][0-9]*)$").unwrap(),
            include: Regex::new(r#"^(?P<path>[^?{}"]+)(?:\?(?P<query>.*))?$"#).unwrap(),
            namespace,
            options,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Compiles a template. Either the whole program is produced or nothing is.
    pub fn compile(&self, src: &str, catalog: &dyn FilterCatalog) -> Result<Compiled> {
        let normalized = self.normalizer.apply(src);
        let lexer = Lexer::new(
            Scanner {
                filters: self.options.enable_filters,
                constants: self.options.enable_constants,
            },
            Features {
                conditions: self.options.enable_conditions,
                inclusion: self.options.enable_inclusion,
                set_statements: self.options.enable_set_statements,
            },
            &self.namespace,
            &self.include,
        );
        let tokens = lexer.tokenize(&normalized)?;
        let (nodes, warnings) = Parser::new(tokens, catalog, &self.integer).parse()?;
        let program = Program {
            instructions: codegen::compact(codegen::emit(nodes), self.options.compact_whitespace),
        };
        debug!(
            instructions = program.len(),
            warnings = warnings.len(),
            "compiled template"
        );
        Ok(Compiled { program, warnings })
    }
}
