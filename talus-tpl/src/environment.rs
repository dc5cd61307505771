//! Rendering environment
//!
//! The environment ties the collaborators together: a [`Loader`] for template
//! sources, a [`Cache`] for compiled programs, the [`Compiler`], the filter
//! registry and the condition evaluator.
//!
//! ```rust
//! use talus_tpl::{Context, Environment, MemoryLoader};
//!
//! let loader = MemoryLoader::new();
//! loader.insert("hello.html", "Hello {NAME|ucfirst}!");
//! let env = Environment::new(loader);
//! let mut context = Context::new();
//! context.set("NAME", "world");
//! assert_eq!(env.render("hello.html", &context).unwrap(), "Hello World!");
//! ```

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
};

use indexmap::IndexMap;
use talus_tpl_parser::{Compiled, Compiler, Options, Program};
use tracing::debug;

use crate::{
    cache::{Cache, MemoryCache},
    condition::{ConditionEvaluator, DefaultConditions},
    context::Context,
    error::{Error, Result},
    filters::Filters,
    loader::Loader,
    render::Render,
    value::Binding,
    Precompiled,
};

pub struct Environment {
    loader: Box<dyn Loader>,
    cache: Box<dyn Cache>,
    compiler: Compiler,
    filters: Filters,
    conditions: Box<dyn ConditionEvaluator>,
    auto_filters: Vec<String>,
    precompiled: HashMap<String, Program>,
}

impl Environment {
    /// An environment with an in-memory cache, default options, the builtin
    /// filters and the default condition evaluator
    pub fn new(loader: impl Loader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            cache: Box::new(MemoryCache::new()),
            compiler: Compiler::new(Options::default()),
            filters: Filters::builtin(),
            conditions: Box::new(DefaultConditions),
            auto_filters: Vec::new(),
            precompiled: HashMap::new(),
        }
    }

    pub fn with_cache(mut self, cache: impl Cache + 'static) -> Self {
        self.cache = Box::new(cache);
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.compiler = Compiler::new(options);
        self
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_conditions(mut self, conditions: impl ConditionEvaluator + 'static) -> Self {
        self.conditions = Box::new(conditions);
        self
    }

    pub fn options(&self) -> &Options {
        self.compiler.options()
    }

    pub fn loader(&self) -> &dyn Loader {
        self.loader.as_ref()
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut Filters {
        &mut self.filters
    }

    pub fn conditions(&self) -> &dyn ConditionEvaluator {
        self.conditions.as_ref()
    }

    /// Applies filter `name` to every string variable owned by the context before
    /// each render. Shared bindings are left alone.
    pub fn auto_filter(&mut self, name: &str) -> Result<&mut Self> {
        if !self.filters.exists(name) {
            return Err(Error::UnknownFilter(name.to_string()));
        }
        self.auto_filters.push(name.to_string());
        Ok(self)
    }

    /// Registers a program compiled ahead of time. It takes precedence over the
    /// loader for its name.
    pub fn preload(&mut self, precompiled: &Precompiled) -> Result<&mut Self> {
        self.precompiled
            .insert(precompiled.name.to_string(), precompiled.program()?);
        Ok(self)
    }

    pub fn compile_str(&self, source: &str) -> Result<Compiled> {
        Ok(self.compiler.compile(source, &self.filters)?)
    }

    /// The program for a template: preloaded, cached when the cache is at least as
    /// recent as the source, compiled and stored otherwise
    pub fn program(&self, name: &str) -> Result<Program> {
        if let Some(program) = self.precompiled.get(name) {
            return Ok(program.clone());
        }
        let id = self.loader.resolve_path(name).display().to_string();
        let modified = self.loader.last_modified(name)?;
        if self.cache.is_fresh(&id, modified) {
            if let Some(program) = self.cache.load(&id)? {
                debug!(template = name, "cache hit");
                return Ok(program);
            }
        }
        debug!(template = name, "cache miss");
        let program = self.compile_str(&self.loader.read(name)?)?.program;
        self.cache.store(&id, &program)?;
        Ok(program)
    }

    pub fn render(&self, name: &str, context: &Context) -> Result<String> {
        let program = self.program(name)?;
        self.execute(&program, context)
    }

    /// Renders an inline template; nothing is cached
    pub fn render_str(&self, source: &str, context: &Context) -> Result<String> {
        let program = self.compile_str(source)?.program;
        self.execute(&program, context)
    }

    pub fn execute(&self, program: &Program, context: &Context) -> Result<String> {
        let included = RefCell::new(HashSet::new());
        Render::new(self, context.constants(), context.blocks(), self.filtered(context)?, &included).execute(program)
    }

    fn filtered(&self, context: &Context) -> Result<IndexMap<String, Binding>> {
        let mut vars = context.vars().clone();
        if self.auto_filters.is_empty() {
            return Ok(vars);
        }
        for binding in vars.values_mut() {
            if let Binding::Owned(value) = binding {
                let mut filtered = std::mem::take(value);
                for name in &self.auto_filters {
                    filtered = filtered.try_map_strings(&mut |s| self.filters.invoke(name, &s, &[]))?;
                }
                *value = filtered;
            }
        }
        Ok(vars)
    }
}
