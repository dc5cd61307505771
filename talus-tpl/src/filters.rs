//! Filter registry
//!
//! Filters are plain functions from a value and its arguments to a new value.
//! [`Filters::builtin`] registers the standard set; hosts add their own with
//! [`Filters::register`].
//!
//! | filter | effect |
//! |--------|--------|
//! | `ceil`, `floor` | round a number up or down |
//! | `protect` | escape `&`, `<`, `>` and `"` for HTML |
//! | `safe` | reverse `protect` |
//! | `ucfirst`, `lcfirst` | change the case of the first character |
//! | `invertCase` | swap the case of every character |
//! | `maximize` (`upper`), `minimize` (`lower`) | change the case of everything |
//! | `trim` | strip surrounding whitespace |
//! | `nl2br` | insert `<br />` before line breaks |
//! | `slugify` | lowercase, dash separated, ASCII only |
//! | `cut:max:finish` | shorten to `max` characters on a word boundary |
//! | `paragraphy` | wrap paragraphs in `<p>` |
//! | `void` | return the input unchanged |
//! | `defaults:value` | `value` when the input is empty |

use std::collections::HashMap;

use regex::Regex;
use talus_tpl_parser::FilterCatalog;

use crate::{
    error::{Error, Result},
    value::Value,
};

/// A filter: input value and arguments to output value, or an error message
pub type FilterFn = Box<dyn Fn(&Value, &[Value]) -> std::result::Result<Value, String> + Send + Sync>;

#[derive(Default)]
pub struct Filters {
    table: HashMap<String, FilterFn>,
}

impl std::fmt::Debug for Filters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.table.keys().collect();
        names.sort();
        f.debug_struct("Filters").field("names", &names).finish()
    }
}

type Outcome = std::result::Result<Value, String>;

fn text(
    f: impl Fn(&str) -> String + Send + Sync + 'static,
) -> impl Fn(&Value, &[Value]) -> Outcome + Send + Sync + 'static {
    move |value: &Value, _: &[Value]| Ok(Value::String(f(&value.to_string())))
}

fn rounded(value: &Value, round: fn(f64) -> f64) -> Outcome {
    let rounded = round(value.as_f64().unwrap_or(0.0));
    Ok(Value::String(rounded.to_string()))
}

fn change_first(s: &str, upper: bool) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) if upper => first.to_uppercase().chain(chars).collect(),
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn invert_case(s: &str) -> String {
    s.chars()
        .flat_map(|c| {
            let lower: Vec<char> = c.to_lowercase().collect();
            if lower.len() == 1 && lower[0] == c {
                c.to_uppercase().collect::<Vec<char>>()
            } else {
                lower
            }
        })
        .collect()
}

fn protect(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn safe(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn nl2br(s: &str) -> String {
    let mut converted = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' | '\n' => {
                converted.push_str("<br />");
                converted.push(c);
                let pair = if c == '\r' { '\n' } else { '\r' };
                if let Some(next) = chars.next_if_eq(&pair) {
                    converted.push(next);
                }
            }
            c => converted.push(c),
        }
    }
    converted
}

fn cut(value: &Value, args: &[Value]) -> Outcome {
    let s = value.to_string();
    let max = match args.first() {
        Some(max) => max
            .as_f64()
            .map(|max| max as usize)
            .ok_or_else(|| format!("expected a length, got \"{}\"", max))?,
        None => 50,
    };
    let finish = args.get(1).map_or_else(|| "...".to_string(), Value::to_string);
    if s.chars().count() <= max {
        return Ok(Value::String(s));
    }
    let keep = max.saturating_sub(finish.chars().count()) + 1;
    let head: String = s.chars().take(keep).collect();
    let cut = match head.rfind(char::is_whitespace) {
        Some(at) => head[..at].trim_end(),
        None => "",
    };
    Ok(Value::String(format!("{}{}", cut, finish)))
}

fn paragraphy(s: &str, breaks: &Regex) -> String {
    let normalized = s.replace("\r\n", "\n");
    let paragraphs: Vec<String> = breaks
        .split(&normalized)
        .map(|paragraph| paragraph.replace('\n', "<br />\n"))
        .collect();
    format!("<p>{}</p>", paragraphs.join("</p>\n\n<p>"))
}

fn slugify(s: &str, separators: &Regex) -> String {
    let dashed = separators.replace_all(s.trim(), "-");
    let slug: String = dashed
        .trim_matches('-')
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if slug.is_empty() { "n-a".to_string() } else { slug }
}

impl Filters {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard filter set
    pub fn builtin() -> Self {
        let mut filters = Self::new();
        let breaks = Regex::new("\n{2,}").unwrap();
        let separators = Regex::new(r"[^\p{L}\d]+").unwrap();
        filters
            .register("ceil", |value, _| rounded(value, f64::ceil))
            .register("floor", |value, _| rounded(value, f64::floor))
            .register("protect", text(|s| protect(s)))
            .register("safe", text(|s| safe(s)))
            .register("ucfirst", text(|s| change_first(s, true)))
            .register("lcfirst", text(|s| change_first(s, false)))
            .register("invertCase", text(|s| invert_case(s)))
            .register("maximize", text(|s| s.to_uppercase()))
            .register("upper", text(|s| s.to_uppercase()))
            .register("minimize", text(|s| s.to_lowercase()))
            .register("lower", text(|s| s.to_lowercase()))
            .register("trim", text(|s| s.trim().to_string()))
            .register("nl2br", text(|s| nl2br(s)))
            .register("slugify", text(move |s| slugify(s, &separators)))
            .register("cut", cut)
            .register("paragraphy", text(move |s| paragraphy(s, &breaks)))
            .register("void", |value, _| Ok(value.clone()))
            .register("defaults", |value, args| {
                Ok(match value.is_truthy() {
                    true => value.clone(),
                    false => args.first().cloned().unwrap_or_else(|| Value::from("")),
                })
            });
        filters
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        filter: impl Fn(&Value, &[Value]) -> Outcome + Send + Sync + 'static,
    ) -> &mut Self {
        self.table.insert(name.into(), Box::new(filter));
        self
    }

    pub fn exists(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    pub fn invoke(&self, name: &str, input: &Value, args: &[Value]) -> Result<Value> {
        let filter = self
            .table
            .get(name)
            .ok_or_else(|| Error::UnknownFilter(name.to_string()))?;
        filter(input, args).map_err(|message| Error::Filter {
            name: name.to_string(),
            message,
        })
    }
}

impl FilterCatalog for Filters {
    fn exists(&self, name: &str) -> bool {
        Filters::exists(self, name)
    }
}
