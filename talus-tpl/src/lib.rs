//! Talus TPL templates
//!
//! Templates are compiled into programs by [`talus_tpl_parser`], cached, and
//! executed against a [`Context`]: plain variables, constants and a tree of
//! repeatable blocks filled by the host.
//!
//! ```rust
//! use talus_tpl::{Context, Environment, MemoryLoader};
//!
//! let loader = MemoryLoader::new();
//! loader.insert(
//!     "posts.html",
//!     "<block name=\"posts\">{posts.CURRENT}. {posts.TITLE|upper}\n</block>",
//! );
//! let env = Environment::new(loader);
//!
//! let mut context = Context::new();
//! context.block("posts", [("TITLE", "first")]).unwrap();
//! context.block("posts", [("TITLE", "second")]).unwrap();
//! assert_eq!(env.render("posts.html", &context).unwrap(), "1. FIRST\n2. SECOND\n");
//! ```
//!
//! Templates can also be compiled with the crate, see [`str!`], [`file!`] and
//! [`directory!`].
//!
//! # Module Structure
//!
//! - `value.rs`: Values and variable bindings
//! - `blocks.rs`: The block context model
//! - `context.rs`: Everything a render reads
//! - `filters.rs`: The filter registry
//! - `condition.rs`: Condition evaluation
//! - `loader.rs`, `cache.rs`: Template sources and compiled program stores
//! - `environment.rs`: The staleness gate and the rendering entry points
//! - `render.rs`: Program execution and inclusion
//! - `error.rs`: Runtime errors

extern crate self as talus_tpl;

pub mod blocks;
pub mod cache;
pub mod condition;
pub mod context;
pub mod environment;
pub mod error;
pub mod filters;
pub mod loader;
mod render;
pub mod value;

pub use blocks::{Block, Blocks, Row, RowHandle};
pub use cache::{Cache, DirectoryCache, MemoryCache};
pub use condition::{ConditionEvaluator, DefaultConditions, Operand};
pub use context::Context;
pub use environment::Environment;
pub use error::{BlockError, Error, Result};
pub use filters::{FilterFn, Filters};
pub use loader::{FileLoader, Loader, MemoryLoader};
pub use render::MAX_INCLUDE_DEPTH;
pub use talus_tpl_parser as parser;
pub use talus_tpl_parser::{Compiled, Compiler, Options, Program, SyntaxError, Warning};
pub use value::{Binding, Value};

/// Compiles the template given inline and generates a function returning it
///
/// ```rust
/// mod templates {
///     talus_tpl::str!("greeting", "Hello {NAME}!");
/// }
/// let mut context = talus_tpl::Context::new();
/// context.set("NAME", "you");
/// assert_eq!(templates::greeting().render(&context).unwrap(), "Hello you!");
/// ```
pub use talus_tpl_macros::talus_tpl_str as str;

/// Compiles one template file, relative to the crate manifest, and generates a
/// function named after its stem
pub use talus_tpl_macros::talus_tpl_file as file;

/// Compiles every `.html` and `.tpl` file below a directory, relative to the
/// crate manifest. Each template is named by its path below the directory.
pub use talus_tpl_macros::talus_tpl_directory as directory;

/// A program compiled at build time by one of the macros
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precompiled {
    /// Name inclusions refer to the template by
    pub name: &'static str,
    /// The program, serialized as JSON
    pub json: &'static str,
}

impl Precompiled {
    pub fn program(&self) -> Result<Program> {
        Ok(serde_json::from_str(self.json)?)
    }

    /// Renders this template alone with a default environment. Use
    /// [`Environment::preload`] when templates include each other.
    pub fn render(&self, context: &Context) -> Result<String> {
        let mut env = Environment::new(MemoryLoader::new());
        env.preload(self)?;
        env.render(self.name, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_usage() {
        mod template {
            crate::str!("test", r#"<p>{FIRSTNAME} {LASTNAME|upper}</p>"#);
        }
        let mut context = Context::new();
        context.set("FIRSTNAME", "King").set("LASTNAME", "Tubby");
        assert_eq!(template::test().render(&context).unwrap(), "<p>King TUBBY</p>");
        assert_eq!(template::test().name, "test");
    }

    #[test]
    fn blocks_and_conditions() {
        mod template {
            crate::str!(
                "article_list",
                r#"<block name="articles"><if cond="{$articles.FIRST}"><ul></if><li>{articles.TITLE}</li><if cond="{$articles.LAST}"></ul></if><blockelse />none</block>"#
            );
        }
        let mut context = Context::new();
        assert_eq!(template::article_list().render(&context).unwrap(), "none");
        context.block("articles", [("TITLE", "a")]).unwrap();
        context.block("articles", [("TITLE", "b")]).unwrap();
        assert_eq!(
            template::article_list().render(&context).unwrap(),
            "<ul><li>a</li><li>b</li></ul>"
        );
    }

    #[test]
    fn custom_filters_survive_precompilation() {
        mod template {
            crate::str!("reverse", "{WORD|reverse}");
        }
        let mut env = Environment::new(MemoryLoader::new());
        env.preload(&template::reverse()).unwrap();
        env.filters_mut()
            .register("reverse", |value, _| Ok(Value::from(value.to_string().chars().rev().collect::<String>())));
        let mut context = Context::new();
        context.set("WORD", "abc");
        assert_eq!(env.render("reverse", &context).unwrap(), "cba");
    }

    #[test]
    fn includes_between_precompiled_templates() {
        mod template {
            crate::str!("layout", "<header><include tpl=\"nav\" /></header>");
            crate::str!("nav", "[{ACTIVE}]");
        }
        let mut env = Environment::new(MemoryLoader::new());
        env.preload(&template::layout()).unwrap();
        env.preload(&template::nav()).unwrap();
        let mut context = Context::new();
        context.set("ACTIVE", "home");
        assert_eq!(env.render("layout", &context).unwrap(), "<header>[home]</header>");
    }

    #[test]
    fn corrupt_artifacts() {
        let precompiled = Precompiled {
            name: "broken",
            json: "{",
        };
        assert!(matches!(precompiled.program(), Err(Error::Artifact(_))));
    }
}
