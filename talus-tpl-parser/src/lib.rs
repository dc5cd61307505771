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


//! Talus TPL template compiler
//!
//! This crate turns Talus TPL template source into a [`Program`], a flat stream of
//! literal text and directives that the `talus-tpl` runtime executes against a
//! variable context. Compilation is a pure function of the source and the
//! [`Options`]; the only collaborator it consults is a [`FilterCatalog`], to
//! check that the filters named in filter chains exist.
//!
//! # Example
//!
//! ```rust
//! use talus_tpl_parser::{Builtins, Compiler, Options};
//!
//! let compiler = Compiler::new(Options::default());
//! let compiled = compiler
//!     .compile("<foreach ary=\"{$ITEMS}\" as=\"item\">{item.value|upper}</foreach>", &Builtins)
//!     .unwrap();
//! assert_eq!(
//!     compiled.program.to_string(),
//!     "each#1(ITEMS as item){print(upper(item#1.value));}"
//! );
//! ```
//!
//! # Module Structure
//!
//! - `compiler.rs`: Options and the compilation pipeline
//! - `normalize.rs`: Comment stripping and legacy tag rewriting
//! - `lexer.rs`: Tokenizing text, print constructs and tags
//! - `expression.rs`: Scanning brace constructs
//! - `parser.rs`: Tag matching and scope resolution
//! - `filter.rs`: Filter chain composition
//! - `codegen.rs`: Flattening into the instruction stream
//! - `program.rs`: The instruction stream
//! - `error.rs`: Syntax errors and warnings

mod ast;
mod codegen;
pub mod compiler;
pub mod error;
mod expression;
pub mod filter;
mod lexer;
mod normalize;
mod parser;
pub mod program;

pub use compiler::{Compiled, Compiler, Options};
pub use error::{Result, SyntaxError, SyntaxErrorKind, Warning, MAX_DEPTH};
pub use filter::{Builtins, Deferred, FilterCatalog, BUILTIN_FILTERS};
pub use program::{
    Access, Argument, Condition, Expr, IncludeKind, Instruction, Piece, Program, Reference, Source, Target,
};

#[cfg(test)]
mod tests {
    use crate::*;

    fn compile(src: &str) -> String {
        Compiler::new(Options::default())
            .compile(src, &Builtins)
            .unwrap()
            .program
            .to_string()
    }

    fn compile_with(options: Options, src: &str) -> String {
        Compiler::new(options).compile(src, &Builtins).unwrap().program.to_string()
    }

    fn fail(src: &str) -> SyntaxErrorKind {
        Compiler::new(Options::default())
            .compile(src, &Builtins)
            .unwrap_err()
            .kind
    }

    #[test]
    fn it_works() {
        assert_eq!(compile("Hello {NAME}!"), "text(\"Hello \");print(NAME);text(\"!\");");
    }

    #[test]
    fn test_filters() {
        assert_eq!(compile("{X|upper|trim}"), "print(trim(upper(X)));");
        assert_eq!(compile("{T|cut:20:...}"), "print(cut(T, 20, '...'));");
        assert_eq!(compile("{T|defaults:{$D}}"), "print(defaults(T, {D}));");
        assert_eq!(compile("{T|cut:5:'it\\'s'}"), "print(cut(T, 5, 'it\\'s'));");
    }

    #[test]
    fn test_unknown_filter() {
        let compiler = Compiler::new(Options::default());
        let skipped = compiler.compile("{X|bogus|upper}", &Builtins).unwrap();
        let plain = compiler.compile("{X|upper}", &Builtins).unwrap();
        assert_eq!(skipped.program, plain.program);
        assert_eq!(
            skipped.warnings,
            vec![Warning::UnknownFilter {
                name: "bogus".to_string(),
                near: "{X|bogus|upper}".to_string()
            }]
        );
        assert!(plain.warnings.is_empty());
    }

    #[test]
    fn test_foreach() {
        assert_eq!(
            compile("<foreach ary=\"{$ITEMS}\" as=\"item\">{item.value}:{item.key}</foreach>"),
            "each#1(ITEMS as item){print(item#1.value);text(\":\");print(item#1.key);}"
        );
    }

    #[test]
    fn test_foreachelse() {
        assert_eq!(
            compile("<foreach ary=\"{$ITEMS}\">{ITEMS.val}<foreachelse />none</foreach>"),
            "each#1(ITEMS as ITEMS){print(ITEMS#1.value);}empty{text(\"none\");}"
        );
    }

    #[test]
    fn test_value_subscript() {
        assert_eq!(
            compile("<foreach ary=\"{$ROWS}\" as=\"row\">{row.value['name']}</foreach>"),
            "each#1(ROWS as row){print(row#1.value['name']);}"
        );
    }

    #[test]
    fn test_legacy_block() {
        assert_eq!(
            compile("<block name=\"posts\">{posts.TITLE}<blockelse />none</block>"),
            "each#1(posts as posts){print(posts#1.TITLE);}empty{text(\"none\");}"
        );
    }

    #[test]
    fn test_nested_blocks() {
        assert_eq!(
            compile("<block name=\"posts\"><block name=\"comments\" parent=\"posts\">{comments.TEXT}{posts.TITLE}</block></block>"),
            "each#1(posts as posts){each#2(#1.comments as comments){print(comments#2.TEXT);print(posts#1.TITLE);}}"
        );
        assert_eq!(
            compile("<block name=\"comments\" parent=\"posts\">{comments.FIRST}</block>"),
            "each#1(posts.comments as comments){print(comments#1.FIRST);}"
        );
    }

    #[test]
    fn test_block_paths() {
        assert_eq!(compile("{posts.comments.TEXT}"), "print(posts.comments.TEXT);");
    }

    #[test]
    fn test_back_to_back() {
        assert_eq!(
            compile("<foreach ary=\"{$A}\" as=\"x\">{x.value}</foreach><foreach ary=\"{$A}\" as=\"x\">{x.key}</foreach>"),
            "each#1(A as x){print(x#1.value);}each#2(A as x){print(x#2.key);}"
        );
    }

    #[test]
    fn test_shadowing() {
        assert_eq!(
            compile("<foreach ary=\"{$A}\" as=\"x\"><foreach ary=\"{$x.value}\" as=\"x\">{x.value}</foreach>{x.key}</foreach>"),
            "each#1(A as x){each#2(x#1.value as x){print(x#2.value);}print(x#1.key);}"
        );
    }

    #[test]
    fn test_conditions() {
        assert_eq!(
            compile("<if cond=\"{$A} > 1\">a<elseif cond=\"{$B}\" />b<else />c</if>"),
            "if({A} > 1){text(\"a\");}elseif({B}){text(\"b\");}else{text(\"c\");}"
        );
        assert_eq!(
            compile("<if condition=\"{$A|trim} == 'x'\">a<elif condition=\"true\" />b</if>"),
            "if({trim(A)} == 'x'){text(\"a\");}elseif(true){text(\"b\");}"
        );
    }

    #[test]
    fn test_inclusion() {
        assert_eq!(
            compile("<include tpl=\"menu.html?active=home&user={$USER}\" once=\"true\" />"),
            "include(menu.html?active=home&user={USER}, once);"
        );
        assert_eq!(compile("<require tpl=\"{$PAGE}\" />"), "require({PAGE});");
        assert_eq!(
            compile("<include tpl=\"a.html\" once=\"maybe\" />"),
            "text(\"<include tpl=\\\"a.html\\\" once=\\\"maybe\\\" />\");"
        );
    }

    #[test]
    fn test_set() {
        assert_eq!(
            compile("<set var=\"TITLE[main]\">Home of {$USER}</set>"),
            "set(TITLE['main'] = \"Home of \" . USER);"
        );
    }

    #[test]
    fn test_constants() {
        assert_eq!(compile("{__VERSION__}"), "print(const(VERSION));");
        assert_eq!(compile("{A[{$__B__}]}"), "print(A[{const(B)}]);");
        let options = Options {
            enable_constants: false,
            ..Options::default()
        };
        assert_eq!(compile_with(options, "{__VERSION__}"), "print(__VERSION__);");
    }

    #[test]
    fn test_escaped() {
        assert_eq!(compile("{\\NAME} {NAME}"), "text(\"{NAME} \");print(NAME);");
    }

    #[test]
    fn test_comment() {
        assert_eq!(compile("a/* {X}\n<if cond=\"1\"> */b"), "text(\"ab\");");
    }

    #[test]
    fn test_literals() {
        assert_eq!(compile("{$A}"), "text(\"{$A}\");");
        assert_eq!(compile("{ A }"), "text(\"{ A }\");");
        assert_eq!(
            compile("<script>if (a) { b(); }</script>"),
            "text(\"<script>if (a) { b(); }</script>\");"
        );
        assert_eq!(compile("{{A}}"), "text(\"{\");print(A);text(\"}\");");
    }

    #[test]
    fn test_nested_subscripts() {
        assert_eq!(compile("{A[{$B[{$C[{$D}]}]}]}"), "print(A[{B[{C[{D}]}]}]);");
        assert_eq!(compile("{A[0][-1][\"k\"]}"), "print(A[0][-1]['k']);");
    }

    #[test]
    fn test_subscript_depth() {
        fn nested(levels: usize) -> String {
            let mut src = String::from("{A");
            for _ in 0..levels {
                src.push_str("[{$A");
            }
            for _ in 0..levels {
                src.push_str("}]");
            }
            src.push('}');
            src
        }
        let program = Compiler::new(Options::default())
            .compile(&nested(60), &Builtins)
            .unwrap()
            .program;
        assert_eq!(program.len(), 1);
        assert!(matches!(program.instructions[0], Instruction::Print(_)));
        assert_eq!(fail(&nested(70)), SyntaxErrorKind::TooDeep);
    }

    #[test]
    fn test_structure_errors() {
        assert_eq!(fail("<foreach ary=\"{$A}\">"), SyntaxErrorKind::Unclosed("foreach"));
        assert_eq!(fail("<block name=\"a\">x<blockelse />"), SyntaxErrorKind::Unclosed("block"));
        assert_eq!(fail("x</if>"), SyntaxErrorKind::Unexpected("if"));
        assert_eq!(fail("</foreach>"), SyntaxErrorKind::Unexpected("foreach"));
        assert_eq!(fail("<else />"), SyntaxErrorKind::Misplaced("else"));
        assert_eq!(fail("<foreachelse />"), SyntaxErrorKind::Misplaced("foreachelse"));
        assert_eq!(
            fail("<if cond=\"1\"><else /><elseif cond=\"2\" /></if>"),
            SyntaxErrorKind::Misplaced("elseif")
        );
        assert_eq!(fail("<foreach ary=\"{$A}\"></if>"), SyntaxErrorKind::Unexpected("if"));
        assert_eq!(fail("<if cond=\"1\">"), SyntaxErrorKind::Unclosed("if"));

        let err = Compiler::new(Options::default())
            .compile("text <foreach ary=\"{$ITEMS}\" as=\"item\">", &Builtins)
            .unwrap_err();
        assert_eq!(err.near, "<foreach ary=\"{$ITEMS}\" as=\"item");
    }

    #[test]
    fn test_block_depth() {
        let src = format!("{}{}", "<if cond=\"1\">".repeat(70), "</if>".repeat(70));
        assert_eq!(fail(&src), SyntaxErrorKind::TooDeep);
        let src = format!("{}{}", "<if cond=\"1\">".repeat(60), "</if>".repeat(60));
        assert!(Compiler::new(Options::default()).compile(&src, &Builtins).is_ok());
    }

    #[test]
    fn test_namespace() {
        let options = Options {
            namespace_prefix: Some("tpl".to_string()),
            ..Options::default()
        };
        assert_eq!(
            compile_with(options.clone(), "<if cond=\"1\">x</if><tpl:if tpl:cond=\"1\">y</tpl:if>"),
            "text(\"<if cond=\\\"1\\\">x</if>\");if(1){text(\"y\");}"
        );
        assert_eq!(
            compile_with(options, "<tpl:block tpl:name=\"a\">x<tpl:blockelse />y</tpl:block>"),
            "each#1(a as a){text(\"x\");}empty{text(\"y\");}"
        );
    }

    #[test]
    fn test_compact_whitespace() {
        let src = "<if cond=\"1\">\n  {A}\n</if>\n";
        assert_eq!(
            compile(src),
            "if(1){text(\"\\n  \");print(A);text(\"\\n\");}text(\"\\n\");"
        );
        let options = Options {
            compact_whitespace: true,
            ..Options::default()
        };
        assert_eq!(compile_with(options, src), "if(1){print(A);}text(\"\\n\");");
    }

    #[test]
    fn test_disabled_features() {
        let options = Options {
            enable_filters: false,
            enable_set_statements: false,
            ..Options::default()
        };
        assert_eq!(
            compile_with(options, "{X|upper}<set var=\"A\">b</set>"),
            "text(\"{X|upper}<set var=\\\"A\\\">b</set>\");"
        );
    }

    #[test]
    fn test_recompiling_literals() {
        let compiler = Compiler::new(Options::default());
        let src = "<p>{$A}</p><foreach ary=\"{$L}\" as=\"i\"><li>{i.value|upper}</li><foreachelse />{ none }</foreach><if cond=\"{$B}\">b</if>";
        let program = compiler.compile(src, &Builtins).unwrap().program;
        assert!(program.has_directives());
        for literal in program.literals() {
            let again = compiler.compile(literal, &Builtins).unwrap().program;
            assert_eq!(again.instructions, vec![Instruction::Text(literal.to_string())]);
        }
    }

    #[test]
    fn test_options_from_json() {
        let options: Options = serde_json::from_str("{\"namespace_prefix\": \"tpl\", \"enable_filters\": false}").unwrap();
        assert_eq!(options.namespace_prefix.as_deref(), Some("tpl"));
        assert!(!options.enable_filters);
        assert!(options.enable_conditions);
    }
}
