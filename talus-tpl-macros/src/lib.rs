//! Build-time template compilation
//!
//! Every macro compiles its templates with the default options and expands to
//! one function per template returning a `talus_tpl::Precompiled`. Filter names
//! are not checked here; the environment skips unknown filters when rendering.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::{format_ident, quote};
use syn::{LitStr, Token, parse::Parse, parse::ParseStream, parse_macro_input};
use talus_tpl_parser::{Compiler, Deferred, Options};
use walkdir::WalkDir;

const EXTENSIONS: &[&str] = &["html", "tpl"];

fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    let mut previous = '_';
    for c in s.chars() {
        if c.is_uppercase() {
            if previous != '_' && !previous.is_uppercase() {
                result.push('_');
            }
            result.extend(c.to_lowercase());
        } else if c.is_alphanumeric() || c == '_' {
            result.push(c);
        } else if !result.ends_with('_') {
            result.push('_');
        }
        previous = c;
    }
    let result = result.trim_matches('_').to_string();
    if result.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{}", result)
    } else {
        result
    }
}

/// Function name for a template name: its extension dropped, the rest snake cased
fn function_name(name: &str) -> String {
    let base = match name.rfind('.') {
        Some(dot) if !name[dot..].contains('/') && dot > 0 => &name[..dot],
        _ => name,
    };
    to_snake_case(base)
}

fn manifest_dir(span: Span) -> syn::Result<String> {
    std::env::var("CARGO_MANIFEST_DIR").map_err(|_| syn::Error::new(span, "CARGO_MANIFEST_DIR not set"))
}

fn generate_code_for_content(
    name: &str,
    content: &str,
    path_for_include: Option<&str>,
    span: Span,
) -> syn::Result<proc_macro2::TokenStream> {
    let compiled = Compiler::new(Options::default())
        .compile(content, &Deferred)
        .map_err(|error| syn::Error::new(span, format!("template \"{}\": {}", name, error)))?;
    let json = serde_json::to_string(&compiled.program)
        .map_err(|error| syn::Error::new(span, format!("template \"{}\": {}", name, error)))?;
    let fn_ident = format_ident!("{}", function_name(name));

    let include_bytes_stmt = if let Some(path_str) = path_for_include {
        quote! {
            // ties the expansion to the template file so that editing it triggers
            // a recompilation
            const _: &[u8] = include_bytes!(#path_str);
        }
    } else {
        quote! {}
    };

    Ok(quote! {
        #include_bytes_stmt

        pub fn #fn_ident() -> ::talus_tpl::Precompiled {
            ::talus_tpl::Precompiled {
                name: #name,
                json: #json,
            }
        }
    })
}

fn generate_code_for_file(name: &str, path: &Path, span: Span) -> syn::Result<proc_macro2::TokenStream> {
    let content = fs::read_to_string(path)
        .map_err(|error| syn::Error::new(span, format!("cannot read {:?}: {}", path, error)))?;
    generate_code_for_content(name, &content, Some(&path.to_string_lossy()), span)
}

fn has_template_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXTENSIONS.contains(&ext))
}

/// Fails when two template names map to the same function name
fn check_function_names<'a>(names: impl IntoIterator<Item = &'a str>, span: Span) -> syn::Result<()> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    for name in names {
        if let Some(previous) = seen.insert(function_name(name), name) {
            return Err(syn::Error::new(
                span,
                format!(
                    "templates \"{}\" and \"{}\" both expand to `fn {}`",
                    previous,
                    name,
                    function_name(name)
                ),
            ));
        }
    }
    Ok(())
}

fn expand_directory(dir_lit: &LitStr) -> syn::Result<proc_macro2::TokenStream> {
    let span = dir_lit.span();
    let root_path = Path::new(&manifest_dir(span)?).join(dir_lit.value());
    if !root_path.is_dir() {
        return Err(syn::Error::new(span, format!("Directory not found: {:?}", root_path)));
    }

    let mut templates = Vec::new();
    for entry in WalkDir::new(&root_path).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        let path = entry.path();
        if !path.is_file() || !has_template_extension(path) {
            continue;
        }
        let relative = path.strip_prefix(&root_path).unwrap_or(path);
        let name = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        templates.push((name, path.to_path_buf()));
    }
    check_function_names(templates.iter().map(|(name, _)| name.as_str()), span)?;

    let functions = templates
        .iter()
        .map(|(name, path)| generate_code_for_file(name, path, span))
        .collect::<syn::Result<Vec<_>>>()?;

    Ok(quote! {
        #(#functions)*
    })
}

fn expand_file(file_lit: &LitStr) -> syn::Result<proc_macro2::TokenStream> {
    let span = file_lit.span();
    let path = Path::new(&manifest_dir(span)?).join(file_lit.value());
    if !path.is_file() {
        return Err(syn::Error::new(span, format!("File not found: {:?}", path)));
    }
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| file_lit.value());
    generate_code_for_file(&name, &path, span)
}

struct StrInput {
    name: LitStr,
    content: LitStr,
}

impl Parse for StrInput {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let name: LitStr = input.parse()?;
        input.parse::<Token![,]>()?;
        let content: LitStr = input.parse()?;
        input.parse::<Option<Token![,]>>()?;
        Ok(StrInput { name, content })
    }
}

/// Compiles every template below a directory: `directory!("templates")`
#[proc_macro]
pub fn talus_tpl_directory(input: TokenStream) -> TokenStream {
    let dir_lit = parse_macro_input!(input as LitStr);
    expand_directory(&dir_lit)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Compiles one template file: `file!("templates/index.html")`
#[proc_macro]
pub fn talus_tpl_file(input: TokenStream) -> TokenStream {
    let file_lit = parse_macro_input!(input as LitStr);
    expand_file(&file_lit)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Compiles an inline template: `str!("name", "Hello {NAME}")`
#[proc_macro]
pub fn talus_tpl_str(input: TokenStream) -> TokenStream {
    let StrInput { name, content } = parse_macro_input!(input as StrInput);
    generate_code_for_content(&name.value(), &content.value(), None, content.span())
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_names() {
        assert_eq!(function_name("index.html"), "index");
        assert_eq!(function_name("partials/nav.html"), "partials_nav");
        assert_eq!(function_name("HomePage.tpl"), "home_page");
        assert_eq!(function_name("my-page"), "my_page");
        assert_eq!(function_name("404.html"), "_404");
        assert_eq!(function_name("v1.2/x"), "v1_2_x");
    }

    #[test]
    fn compiles_templates() {
        let tokens = generate_code_for_content("hello", "Hi {NAME|custom}", None, Span::call_site()).unwrap();
        let code = tokens.to_string();
        assert!(code.contains("pub fn hello"));
        assert!(code.contains("custom"));
        assert!(generate_code_for_content("bad", "<if cond=\"1\">", None, Span::call_site()).is_err());
    }

    #[test]
    fn function_name_collisions() {
        assert!(check_function_names(["index.html", "partials/nav.html", "nav.html"], Span::call_site()).is_ok());
        let error = check_function_names(["a.html", "a.tpl"], Span::call_site()).unwrap_err();
        assert_eq!(error.to_string(), "templates \"a.html\" and \"a.tpl\" both expand to `fn a`");
        assert!(check_function_names(["my-page.html", "my_page.html"], Span::call_site()).is_err());
    }

    #[test]
    fn template_extensions() {
        assert!(has_template_extension(Path::new("a/b.html")));
        assert!(has_template_extension(Path::new("b.tpl")));
        assert!(!has_template_extension(Path::new("b.hbs")));
    }
}
