//! # Template Rendering
//!
//! The engine orchestrates rendering but does not define a template
//! language. [`Renderer`] is the capability a compiler uses to turn template
//! text plus a [`Context`] into output text; [`TemplateRenderer`] is the
//! default implementation, backed by `minijinja` with the `<% %>` family of
//! delimiters: `<%= expr %>` for expressions, `<% stmt %>` for statements
//! and `<%# text %>` for comments:
//!
//! ```
//! use schematics::context;
//! use schematics::template::{Renderer, TemplateRenderer};
//!
//! let renderer = TemplateRenderer::default();
//! let out = renderer.render("number: <%= nb * 2 %>", &context! { "nb" => 4 }).unwrap();
//! assert_eq!(out, "number: 8");
//! ```
//!
//! Everything else is literal, including `{{ }}`, `{% %}` and `{# #}`.
//! Undefined variables render as the empty string.

use std::sync::Arc;

use minijinja::syntax::SyntaxConfig;
use minijinja::{Environment, Value};

use crate::context::Context;
use crate::error::{Error, Result};

const TEMPLATE_NAME: &str = "entry";

/// A template that has been parsed and can be rendered repeatedly.
pub trait CompiledTemplate: Send + Sync {
    fn render(&self, ctx: &Context) -> Result<String>;
}

/// Turns template text into rendered text.
pub trait Renderer: Send + Sync {
    /// Parse `text` once so it can be rendered with many contexts.
    fn compile(&self, text: &str) -> Result<Arc<dyn CompiledTemplate>>;

    /// Parse and render in one step.
    fn render(&self, text: &str, ctx: &Context) -> Result<String> {
        self.compile(text)?.render(ctx)
    }
}

/// Delimiters for the default renderer.
#[derive(Debug, Clone)]
pub struct Delimiters {
    pub variable_start: String,
    pub variable_end: String,
    pub block_start: String,
    pub block_end: String,
    pub comment_start: String,
    pub comment_end: String,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            variable_start: "<%=".to_string(),
            variable_end: "%>".to_string(),
            block_start: "<%".to_string(),
            block_end: "%>".to_string(),
            comment_start: "<%#".to_string(),
            comment_end: "%>".to_string(),
        }
    }
}

/// The default `minijinja`-backed renderer.
#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer {
    delimiters: Delimiters,
}

impl TemplateRenderer {
    pub fn with_delimiters(delimiters: Delimiters) -> Self {
        Self { delimiters }
    }

    fn environment(&self) -> Result<Environment<'static>> {
        let syntax = SyntaxConfig::builder()
            .variable_delimiters(
                self.delimiters.variable_start.clone(),
                self.delimiters.variable_end.clone(),
            )
            .block_delimiters(
                self.delimiters.block_start.clone(),
                self.delimiters.block_end.clone(),
            )
            .comment_delimiters(
                self.delimiters.comment_start.clone(),
                self.delimiters.comment_end.clone(),
            )
            .build()
            .map_err(template_error)?;
        let mut env = Environment::new();
        env.set_syntax(syntax);
        env.set_keep_trailing_newline(true);
        Ok(env)
    }
}

impl Renderer for TemplateRenderer {
    fn compile(&self, text: &str) -> Result<Arc<dyn CompiledTemplate>> {
        let mut env = self.environment()?;
        env.add_template_owned(TEMPLATE_NAME, text.to_string())
            .map_err(template_error)?;
        Ok(Arc::new(Template { env }))
    }
}

/// A parsed template owning its environment.
pub struct Template {
    env: Environment<'static>,
}

impl CompiledTemplate for Template {
    fn render(&self, ctx: &Context) -> Result<String> {
        let template = self.env.get_template(TEMPLATE_NAME).map_err(template_error)?;
        template
            .render(Value::from_serialize(ctx))
            .map_err(template_error)
    }
}

fn template_error(err: minijinja::Error) -> Error {
    let mut message = err.to_string();
    if let Some(detail) = err.detail() {
        if !message.contains(detail) {
            message = format!("{}: {}", message, detail);
        }
    }
    Error::Template {
        message,
        entry: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context;

    #[test]
    fn test_render_variable() {
        let renderer = TemplateRenderer::default();
        let out = renderer
            .render("hello <%= str %>", &context! { "str" => "world" })
            .unwrap();
        assert_eq!(out, "hello world");
    }

    #[test]
    fn test_render_expression() {
        let renderer = TemplateRenderer::default();
        let out = renderer
            .render("number: <%= nb * 2 %>", &context! { "nb" => 4 })
            .unwrap();
        assert_eq!(out, "number: 8");
    }

    #[test]
    fn test_compile_once_render_many() {
        let compiled = TemplateRenderer::default().compile("<%= a %>").unwrap();
        assert_eq!(compiled.render(&context! { "a" => 1 }).unwrap(), "1");
        assert_eq!(compiled.render(&context! { "a" => "x" }).unwrap(), "x");
    }

    #[test]
    fn test_jinja_delimiters_are_literal() {
        let renderer = TemplateRenderer::default();
        let out = renderer
            .render("{{ a }} {% if b %}x{% endif %} {# c #}", &Context::new())
            .unwrap();
        assert_eq!(out, "{{ a }} {% if b %}x{% endif %} {# c #}");
    }

    #[test]
    fn test_shell_and_liquid_content_survives() {
        let renderer = TemplateRenderer::default();
        let out = renderer
            .render(
                "echo \"${#ARGS[@]} args for <%= name %>\"\n<p>{% if user %}hi{% endif %}</p>",
                &context! { "name" => "run" },
            )
            .unwrap();
        assert_eq!(
            out,
            "echo \"${#ARGS[@]} args for run\"\n<p>{% if user %}hi{% endif %}</p>"
        );
    }

    #[test]
    fn test_statements_comments_and_trailing_newline() {
        let renderer = TemplateRenderer::default();
        let out = renderer
            .render(
                "<% if flag %>on<% else %>off<% endif %><%# note %> <%= n %>\n",
                &context! { "flag" => true, "n" => 3 },
            )
            .unwrap();
        assert_eq!(out, "on 3\n");
    }

    #[test]
    fn test_undefined_renders_empty() {
        let renderer = TemplateRenderer::default();
        let out = renderer.render("[<%= missing %>]", &Context::new()).unwrap();
        assert_eq!(out, "[]");
    }

    #[test]
    fn test_syntax_error() {
        let renderer = TemplateRenderer::default();
        let err = renderer.compile("<%= a + %>").err().unwrap();
        assert!(matches!(err, Error::Template { .. }));
    }

    #[test]
    fn test_custom_delimiters() {
        let renderer = TemplateRenderer::with_delimiters(Delimiters {
            variable_start: "[[".to_string(),
            variable_end: "]]".to_string(),
            block_start: "[%".to_string(),
            block_end: "%]".to_string(),
            comment_start: "[#".to_string(),
            comment_end: "#]".to_string(),
        });
        let out = renderer
            .render("v=[[ v ]][% if v %]![% endif %]", &context! { "v" => 3 })
            .unwrap();
        assert_eq!(out, "v=3!");
    }
}
