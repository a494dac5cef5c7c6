//! Evaluation: variables, expressions, selector resolution and flattening of
//! nested rules into a list of plain CSS statements.

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::ast::{
    AtRule, BinaryOp, Declaration, Expr, Interpolated, Literal, Node, Rule, Selector,
    SelectorComponent, Stylesheet, TextPart, UnaryOp, VariableDecl,
};
use crate::error::{CompileError, EvalErrorKind, Location, Result, Span};
use crate::functions;
use crate::loader::{self, SourceFile};
use crate::options::CompileOptions;
use crate::value::{Color, Format, ListSeparator, Value, ValueError};

/// At-rules that wrap the declarations of an enclosing style rule when nested
/// inside one.
const BUBBLING_AT_RULES: &[&str] = &["media", "supports", "container", "layer"];

#[derive(Debug, Clone, PartialEq)]
pub enum CssNode {
    Rule(FlatRule),
    AtRule(FlatAtRule),
    Comment(FlatComment),
    Import(FlatImport),
}

/// A style rule with fully resolved selectors.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatRule {
    pub selectors: Vec<String>,
    pub items: Vec<BlockItem>,
    /// Nesting depth of the source rule inside its container.
    pub depth: usize,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockItem {
    Declaration(FlatDeclaration),
    Comment(FlatComment),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatDeclaration {
    pub property: String,
    pub value: Value,
    pub important: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatAtRule {
    pub name: String,
    pub prelude: String,
    /// Declarations directly inside the block (`@font-face`, `@page`).
    pub items: Vec<BlockItem>,
    pub children: Vec<CssNode>,
    /// `false` for statements such as `@charset "UTF-8";`.
    pub has_block: bool,
    pub depth: usize,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatComment {
    pub text: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatImport {
    pub text: String,
    pub span: Span,
}

impl FlatRule {
    pub fn has_declarations(&self) -> bool {
        self.items
            .iter()
            .any(|item| matches!(item, BlockItem::Declaration(_)))
    }
}

/// Output being collected for one block.
#[derive(Default)]
struct Block {
    /// Whether the block belongs to a style rule.
    is_rule: bool,
    items: Vec<BlockItem>,
    children: Vec<CssNode>,
}

pub fn evaluate(
    sheet: &Stylesheet,
    files: &[SourceFile],
    options: &CompileOptions,
) -> Result<Vec<CssNode>> {
    Evaluator::new(files, options).run(sheet)
}

pub struct Evaluator<'a> {
    files: &'a [SourceFile],
    format: Format,
    /// Innermost scope last; index 0 is the global scope.
    scopes: Vec<IndexMap<String, Value>>,
    /// Resolved selector lists of the enclosing rules.
    selectors: Vec<Vec<String>>,
    media: Option<String>,
    depth: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(files: &'a [SourceFile], options: &CompileOptions) -> Self {
        Self {
            files,
            format: Format {
                precision: options.digits(),
                compressed: false,
            },
            scopes: vec![IndexMap::new()],
            selectors: Vec::new(),
            media: None,
            depth: 0,
        }
    }

    pub fn run(&mut self, sheet: &Stylesheet) -> Result<Vec<CssNode>> {
        let mut root = Block::default();
        self.eval_nodes(&sheet.children, &mut root)?;
        debug!(statements = root.children.len(), "evaluated stylesheet");
        Ok(root.children)
    }

    fn locate(&self, span: Span) -> Location {
        loader::locate(self.files, span)
    }

    fn value_error(&self, error: ValueError, span: Span) -> CompileError {
        CompileError::eval(error.kind, self.locate(span), error.message)
    }

    fn parent_selectors(&self) -> &[String] {
        self.selectors.last().map(Vec::as_slice).unwrap_or(&[])
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        let key = normalize_name(name);
        self.scopes.iter().rev().find_map(|scope| scope.get(&key))
    }

    fn eval_nodes(&mut self, nodes: &[Node], block: &mut Block) -> Result<()> {
        for node in nodes {
            match node {
                Node::Stylesheet(sheet) => self.eval_nodes(&sheet.children, block)?,
                Node::Rule(rule) => self.eval_rule(rule, block)?,
                Node::Declaration(decl) => {
                    if let Some(decl) = self.eval_declaration(decl)? {
                        block.items.push(BlockItem::Declaration(decl));
                    }
                }
                Node::Variable(decl) => self.assign(decl)?,
                Node::Import(import) => {
                    return Err(CompileError::import_not_found(
                        import.path.clone(),
                        Vec::new(),
                        Some(self.locate(import.span)),
                    ));
                }
                Node::CssImport(import) => {
                    trace!(import = %import.text, "passing through css import");
                    block.children.push(CssNode::Import(FlatImport {
                        text: import.text.clone(),
                        span: import.span,
                    }));
                }
                Node::AtRule(rule) => self.eval_at_rule(rule, block)?,
                Node::Comment(comment) => {
                    let comment = FlatComment {
                        text: comment.text.clone(),
                        span: comment.span,
                    };
                    if block.is_rule {
                        block.items.push(BlockItem::Comment(comment));
                    } else {
                        block.children.push(CssNode::Comment(comment));
                    }
                }
            }
        }
        Ok(())
    }

    fn eval_rule(&mut self, rule: &Rule, block: &mut Block) -> Result<()> {
        let selectors = self.resolve_selector(&rule.selector)?;

        self.scopes.push(IndexMap::new());
        self.selectors.push(selectors.clone());
        self.depth += 1;
        let mut body = Block {
            is_rule: true,
            ..Block::default()
        };
        let result = self.eval_nodes(&rule.body, &mut body);
        self.depth -= 1;
        self.selectors.pop();
        self.scopes.pop();
        result?;

        let flat = FlatRule {
            selectors,
            items: body.items,
            depth: self.depth,
            span: rule.span,
        };
        if flat.has_declarations() {
            block.children.push(CssNode::Rule(flat));
        }
        block.children.extend(body.children);
        Ok(())
    }

    fn eval_at_rule(&mut self, rule: &AtRule, block: &mut Block) -> Result<()> {
        let lower = rule.name.to_ascii_lowercase();
        let prelude = collapse_whitespace(&self.interpolate(&rule.prelude)?);

        let Some(body) = &rule.body else {
            block.children.push(CssNode::AtRule(FlatAtRule {
                name: rule.name.clone(),
                prelude,
                items: Vec::new(),
                children: Vec::new(),
                has_block: false,
                depth: self.depth,
                span: rule.span,
            }));
            return Ok(());
        };

        let is_media = lower == "media";
        let keyframes = lower.ends_with("keyframes");
        let prelude = match (&self.media, is_media) {
            (Some(outer), true) => format!("{outer} and {prelude}"),
            _ => prelude,
        };

        let saved_media = self.media.clone();
        if is_media {
            self.media = Some(prelude.clone());
        }
        let saved_depth = std::mem::replace(&mut self.depth, 0);
        self.scopes.push(IndexMap::new());
        if keyframes {
            self.selectors.push(Vec::new());
        }
        let mut inner = Block::default();
        let result = self.eval_nodes(body, &mut inner);
        if keyframes {
            self.selectors.pop();
        }
        self.scopes.pop();
        self.depth = saved_depth;
        self.media = saved_media;
        result?;

        let mut items = inner.items;
        let mut children = inner.children;
        let parent = self.parent_selectors().to_vec();
        if BUBBLING_AT_RULES.contains(&lower.as_str()) && !parent.is_empty() && !items.is_empty() {
            let wrapped = FlatRule {
                selectors: parent,
                items: std::mem::take(&mut items),
                depth: 0,
                span: rule.span,
            };
            if wrapped.has_declarations() {
                children.insert(0, CssNode::Rule(wrapped));
            }
        }

        // Nested media queries were merged with this one; they become siblings.
        let mut hoisted = Vec::new();
        if is_media {
            let (nested, kept): (Vec<_>, Vec<_>) = children.into_iter().partition(
                |node| matches!(node, CssNode::AtRule(at) if at.name.eq_ignore_ascii_case("media")),
            );
            children = kept;
            hoisted = nested;
        }

        if !items.is_empty() || !children.is_empty() {
            block.children.push(CssNode::AtRule(FlatAtRule {
                name: rule.name.clone(),
                prelude,
                items,
                children,
                has_block: true,
                depth: saved_depth,
                span: rule.span,
            }));
        }
        block.children.extend(hoisted);
        Ok(())
    }

    fn eval_declaration(&mut self, decl: &Declaration) -> Result<Option<FlatDeclaration>> {
        let property = collapse_whitespace(&self.interpolate(&decl.property)?);
        let value = self.eval_expr(&decl.value, false)?;
        if value.to_css(&self.format).is_empty() {
            return Ok(None);
        }
        Ok(Some(FlatDeclaration {
            property,
            value,
            important: decl.important,
            span: decl.span,
        }))
    }

    fn assign(&mut self, decl: &VariableDecl) -> Result<()> {
        let key = normalize_name(&decl.name);
        if decl.default {
            let bound = if decl.global {
                self.scopes.first().is_some_and(|scope| scope.contains_key(&key))
            } else {
                self.lookup(&key).is_some()
            };
            if bound {
                return Ok(());
            }
        }
        let value = self.eval_expr(&decl.value, false)?;
        let scope = if decl.global {
            self.scopes.first_mut()
        } else {
            self.scopes.last_mut()
        };
        if let Some(scope) = scope {
            scope.insert(key, value);
        }
        Ok(())
    }

    /// Resolve a selector against the enclosing rule's selectors: `&` is
    /// replaced by each parent, otherwise the parent is prefixed.
    fn resolve_selector(&mut self, selector: &Selector) -> Result<Vec<String>> {
        let mut text = String::new();
        for component in &selector.components {
            match component {
                SelectorComponent::Text(t) => text.push_str(t),
                SelectorComponent::Parent => text.push('&'),
                SelectorComponent::Interpolation(expr) => {
                    let value = self.eval_expr(expr, false)?;
                    text.push_str(&value.to_interpolation(&self.format));
                }
            }
        }

        let mut parts = Vec::new();
        for part in split_top_level(&text, ',') {
            let part = collapse_whitespace(part);
            if part.is_empty() {
                return Err(CompileError::eval(
                    EvalErrorKind::InvalidOperation,
                    self.locate(selector.span),
                    format!("invalid selector '{}'", text.trim()),
                ));
            }
            parts.push(part);
        }

        let parents = self.parent_selectors();
        if parents.is_empty() {
            if parts.iter().any(|part| replace_parent(part, "").is_some()) {
                return Err(CompileError::eval(
                    EvalErrorKind::InvalidParent,
                    self.locate(selector.span),
                    "Base-level rules cannot contain the parent-selector-referencing character '&'.",
                ));
            }
            return Ok(parts);
        }

        let mut resolved = Vec::with_capacity(parents.len() * parts.len());
        for parent in parents {
            for part in &parts {
                match replace_parent(part, parent) {
                    Some(replaced) => resolved.push(replaced),
                    None => resolved.push(format!("{parent} {part}")),
                }
            }
        }
        Ok(resolved)
    }

    fn interpolate(&mut self, text: &Interpolated) -> Result<String> {
        let mut out = String::new();
        for part in &text.parts {
            match part {
                TextPart::Literal(literal) => out.push_str(literal),
                TextPart::Interpolation(expr) => {
                    let value = self.eval_expr(expr, false)?;
                    out.push_str(&value.to_interpolation(&self.format));
                }
            }
        }
        Ok(out)
    }

    /// `arith` is set once the expression is an operand of arithmetic or sits
    /// in parentheses; only then does `/` divide two literals.
    fn eval_expr(&mut self, expr: &Expr, arith: bool) -> Result<Value> {
        match expr {
            Expr::Literal { value, span } => self.eval_literal(value, *span),
            Expr::Variable { name, span } => self
                .lookup(name)
                .cloned()
                .ok_or_else(|| CompileError::undefined_variable(name.clone(), self.locate(*span))),
            Expr::Binary { op, lhs, rhs, span } => {
                if *op == BinaryOp::Div && !arith && lhs.is_plain_literal() && rhs.is_plain_literal() {
                    let items = vec![self.eval_expr(lhs, false)?, self.eval_expr(rhs, false)?];
                    return Ok(Value::List {
                        items,
                        separator: ListSeparator::Slash,
                    });
                }
                let l = self.eval_expr(lhs, true)?;
                let r = self.eval_expr(rhs, true)?;
                l.apply(*op, &r, &self.format)
                    .map_err(|e| self.value_error(e, *span))
            }
            Expr::Unary { op, operand, .. } => {
                let value = self.eval_expr(operand, arith)?;
                Ok(match op {
                    UnaryOp::Minus => value.negate(&self.format),
                    UnaryOp::Plus if matches!(value, Value::Number(_)) => value,
                    UnaryOp::Plus => {
                        Value::unquoted(format!("+{}", value.to_interpolation(&self.format)))
                    }
                })
            }
            Expr::Call { name, args, span } => {
                let args = args
                    .iter()
                    .map(|arg| self.eval_expr(arg, false))
                    .collect::<Result<Vec<_>>>()?;
                match functions::call(name, &args) {
                    Some(Ok(value)) => Ok(value),
                    Some(Err(e)) => Err(self.value_error(e, *span)),
                    None => Ok(Value::Function {
                        name: name.clone(),
                        args,
                    }),
                }
            }
            Expr::Raw { text, .. } => Ok(Value::unquoted(self.interpolate(text)?)),
            Expr::List {
                items, separator, ..
            } => {
                let items = items
                    .iter()
                    .map(|item| self.eval_expr(item, false))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::List {
                    items,
                    separator: *separator,
                })
            }
            Expr::Paren { inner, .. } => self.eval_expr(inner, true),
        }
    }

    fn eval_literal(&mut self, literal: &Literal, span: Span) -> Result<Value> {
        match literal {
            Literal::Number { value, unit } => Ok(Value::number(*value, unit.clone())),
            Literal::Color(hex) => Color::from_hex(hex).map(Value::Color).ok_or_else(|| {
                CompileError::eval(
                    EvalErrorKind::InvalidOperation,
                    self.locate(span),
                    format!("invalid color '#{hex}'"),
                )
            }),
            Literal::Str { text, quote } => Ok(Value::Str {
                text: self.interpolate(text)?,
                quote: *quote,
            }),
        }
    }
}

/// `$foo-bar` and `$foo_bar` name the same variable.
fn normalize_name(name: &str) -> String {
    name.replace('_', "-")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split on `sep` outside parentheses, brackets and quotes.
/// Substitute every `&` outside quoted strings, or `None` if there is none.
fn replace_parent(selector: &str, parent: &str) -> Option<String> {
    let mut out = String::with_capacity(selector.len());
    let mut quote: Option<char> = None;
    let mut found = false;
    for ch in selector.chars() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (None, '"' | '\'') => quote = Some(ch),
            (None, '&') => {
                found = true;
                out.push_str(parent);
                continue;
            }
            _ => {}
        }
        out.push(ch);
    }
    found.then_some(out)
}

fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, ch) in text.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth = depth.saturating_sub(1),
            (None, c) if c == sep && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + ch.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}
