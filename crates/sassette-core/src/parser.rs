//! Recursive-descent parser from tokens to a [`Stylesheet`].
//!
//! Statements are recognised by their leading token: `@import`, `@media` and
//! other at-rules, `$name:` variable declarations, and otherwise either a
//! declaration or a nested rule. Inside a block the two are told apart by
//! looking ahead for the first `{`, `;` or `}` at bracket depth zero.
//!
//! There is no error recovery: the first structural error aborts.

use crate::ast::{
    AtRule, BinaryOp, Comment, CssImport, Declaration, Expr, Import, Interpolated, Literal, Node,
    Rule, Selector, SelectorComponent, Stylesheet, UnaryOp, VariableDecl,
};
use crate::error::{CompileError, FileId, Location, Result, Span};
use crate::lexer::{self, Lexer, Token, TokenKind};
use crate::value::ListSeparator;

/// Sass directives outside the supported subset.
const UNSUPPORTED_DIRECTIVES: &[&str] = &[
    "mixin", "include", "content", "function", "return", "if", "else", "each", "for", "while",
    "extend", "use", "forward", "debug", "warn", "error", "at-root",
];

/// Functions whose arguments are passed through as text.
const RAW_FUNCTIONS: &[&str] = &["calc", "var", "env", "expression", "element"];

pub fn parse(source: &str, file: FileId, file_name: &str) -> Result<Stylesheet> {
    let tokens = lexer::tokenize(source, file, file_name)?;
    Parser::new(tokens, file_name).parse_stylesheet()
}

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    file_name: &'a str,
}

impl<'a> Parser<'a> {
    pub fn new(mut tokens: Vec<Token>, file_name: &'a str) -> Self {
        if tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
            let span = tokens.last().map(|t| t.span).unwrap_or_else(Span::dummy);
            tokens.push(Token {
                kind: TokenKind::Eof,
                text: String::new(),
                span,
                spaced: false,
            });
        }
        Self {
            tokens,
            pos: 0,
            file_name,
        }
    }

    pub fn parse_stylesheet(&mut self) -> Result<Stylesheet> {
        let span = self.peek().span;
        let children = self.parse_block_contents(true)?;
        Ok(Stylesheet { children, span })
    }

    fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    fn peek_nth(&self, n: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + n).min(last)]
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn at_punct(&self, ch: char) -> bool {
        self.peek().is_punct(ch)
    }

    fn eat_punct(&mut self, ch: char) -> bool {
        if self.at_punct(ch) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, ch: char) -> Result<Token> {
        if self.at_punct(ch) {
            Ok(self.bump())
        } else {
            Err(self.error(format!("'{ch}'")))
        }
    }

    /// Skip comments in positions where they carry no meaning. The token
    /// after a comment inherits the comment's leading whitespace.
    fn skip_comments(&mut self) {
        while self.peek().kind == TokenKind::Comment {
            self.pos += 1;
            let idx = self.pos.min(self.tokens.len() - 1);
            self.tokens[idx].spaced = true;
        }
    }

    fn location(&self, span: Span) -> Location {
        Location::new(self.file_name, span)
    }

    fn error(&self, expected: impl Into<String>) -> CompileError {
        let token = self.peek();
        CompileError::parse(self.location(token.span), expected, describe(token))
    }

    fn parse_block_contents(&mut self, top_level: bool) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();
        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::Eof if top_level => break,
                TokenKind::Eof => return Err(self.error("'}'")),
                TokenKind::Punctuation if token.is_punct('}') => {
                    if top_level {
                        return Err(self.error("selector or at-rule"));
                    }
                    break;
                }
                TokenKind::Punctuation if token.is_punct(';') => {
                    self.bump();
                }
                TokenKind::Comment => {
                    let token = self.bump();
                    if token.is_loud_comment() {
                        nodes.push(Node::Comment(Comment {
                            text: token.text,
                            span: token.span,
                        }));
                    }
                }
                TokenKind::AtKeyword => nodes.extend(self.parse_at_rule()?),
                TokenKind::Variable => nodes.push(Node::Variable(self.parse_variable_decl()?)),
                _ if !top_level && self.declaration_ahead() => {
                    nodes.push(Node::Declaration(self.parse_declaration()?));
                }
                _ => nodes.push(Node::Rule(self.parse_rule()?)),
            }
        }
        Ok(nodes)
    }

    /// Whether the statement at the cursor ends before any `{` opens.
    fn declaration_ahead(&self) -> bool {
        let mut depth = 0usize;
        for token in &self.tokens[self.pos..] {
            match token.kind {
                TokenKind::Eof => return true,
                TokenKind::InterpolationStart => depth += 1,
                TokenKind::Punctuation => match token.text.as_str() {
                    "(" | "[" => depth += 1,
                    ")" | "]" => depth = depth.saturating_sub(1),
                    "}" if depth > 0 => depth -= 1,
                    "}" | ";" if depth == 0 => return true,
                    "{" if depth == 0 => return false,
                    _ => {}
                },
                _ => {}
            }
        }
        true
    }

    fn parse_rule(&mut self) -> Result<Rule> {
        let span = self.peek().span;
        let selector = self.parse_selector()?;
        self.expect_punct('{')?;
        let body = self.parse_block_contents(false)?;
        self.expect_punct('}')?;
        Ok(Rule {
            selector,
            body,
            span,
        })
    }

    fn parse_selector(&mut self) -> Result<Selector> {
        let span = self.peek().span;
        let mut components: Vec<SelectorComponent> = Vec::new();
        loop {
            self.skip_comments();
            let token = self.peek();
            if token.is_punct('{') {
                break;
            }
            if token.kind == TokenKind::Eof || token.is_punct(';') || token.is_punct('}') {
                return Err(self.error("'{'"));
            }
            if token.spaced && !components.is_empty() {
                push_selector_text(&mut components, " ");
            }
            let token = self.bump();
            match token.kind {
                TokenKind::InterpolationStart => {
                    let expr = self.parse_expression_list()?;
                    self.expect_punct('}')?;
                    components.push(SelectorComponent::Interpolation(expr));
                }
                TokenKind::Punctuation if token.is_punct('&') => {
                    components.push(SelectorComponent::Parent);
                }
                _ => push_selector_text(&mut components, &token.css_text()),
            }
        }
        if components.is_empty() {
            return Err(self.error("selector"));
        }
        self.validate_selector(&components, span)?;
        Ok(Selector { components, span })
    }

    fn validate_selector(&self, components: &[SelectorComponent], span: Span) -> Result<()> {
        let mut text = String::new();
        for component in components {
            match component {
                SelectorComponent::Text(t) => text.push_str(t),
                SelectorComponent::Parent => text.push('&'),
                SelectorComponent::Interpolation(_) => text.push('x'),
            }
        }
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let malformed = compact.starts_with(',')
            || compact.ends_with(',')
            || compact.contains(",,")
            || compact.ends_with(['>', '+', '~', ':']);
        if malformed {
            return Err(CompileError::parse(
                self.location(span),
                "selector",
                format!("'{}'", text.trim()),
            ));
        }
        Ok(())
    }

    fn parse_declaration(&mut self) -> Result<Declaration> {
        let span = self.peek().span;
        let property = self.parse_interpolated_until(&[':'])?;
        if property.is_empty() {
            return Err(self.error("property name"));
        }
        self.expect_punct(':')?;

        let custom = property
            .as_plain()
            .is_some_and(|name| name.trim_start().starts_with("--"));
        let value = if custom {
            let value_span = self.peek().span;
            let text = self.parse_interpolated_until(&[';', '}'])?;
            Expr::Raw {
                text,
                span: value_span,
            }
        } else {
            self.parse_expression_list()?
        };

        let mut important = false;
        while self.peek().kind == TokenKind::Bang {
            if self.peek().text == "important" {
                self.bump();
                important = true;
            } else {
                return Err(self.error("'!important'"));
            }
        }
        self.end_of_statement()?;
        Ok(Declaration {
            property,
            value,
            important,
            span,
        })
    }

    fn end_of_statement(&mut self) -> Result<()> {
        self.skip_comments();
        if self.eat_punct(';') || self.at_punct('}') {
            Ok(())
        } else {
            Err(self.error("';'"))
        }
    }

    fn parse_variable_decl(&mut self) -> Result<VariableDecl> {
        let token = self.bump();
        self.skip_comments();
        self.expect_punct(':')?;
        let value = self.parse_expression_list()?;

        let mut default = false;
        let mut global = false;
        while self.peek().kind == TokenKind::Bang {
            match self.peek().text.as_str() {
                "default" => default = true,
                "global" => global = true,
                _ => return Err(self.error("'!default' or '!global'")),
            }
            self.bump();
        }
        self.end_of_statement()?;
        Ok(VariableDecl {
            name: token.text,
            value,
            default,
            global,
            span: token.span,
        })
    }

    fn parse_at_rule(&mut self) -> Result<Vec<Node>> {
        let name = self.peek().text.to_ascii_lowercase();
        if name == "import" {
            return self.parse_import();
        }
        if UNSUPPORTED_DIRECTIVES.contains(&name.as_str()) {
            return Err(self.error("a supported at-rule"));
        }

        let token = self.bump();
        let prelude = self.parse_interpolated_until(&['{', ';', '}'])?;
        if name == "media" && prelude.is_empty() {
            return Err(self.error("media query"));
        }

        let body = if self.eat_punct('{') {
            let body = self.parse_block_contents(false)?;
            self.expect_punct('}')?;
            Some(body)
        } else {
            self.end_of_statement()?;
            None
        };

        Ok(vec![Node::AtRule(AtRule {
            name: token.text,
            prelude,
            body,
            span: token.span,
        })])
    }

    fn parse_import(&mut self) -> Result<Vec<Node>> {
        self.bump();
        let mut nodes = Vec::new();
        loop {
            self.skip_comments();
            let target = self.peek().clone();
            let (path, css_text) = match target.kind {
                TokenKind::Str(_) => {
                    self.bump();
                    (Some(target.text.clone()), target.css_text())
                }
                TokenKind::Url => {
                    self.bump();
                    (None, target.text.clone())
                }
                TokenKind::Ident
                    if target.text.eq_ignore_ascii_case("url") && self.peek_nth(1).is_punct('(') =>
                {
                    self.bump();
                    let text = self.parse_raw_call(&target.text)?;
                    let Some(text) = text.as_plain() else {
                        return Err(CompileError::parse(
                            self.location(target.span),
                            "plain url()",
                            "interpolation",
                        ));
                    };
                    (None, text)
                }
                _ => return Err(self.error("string or url()")),
            };

            let media = self.parse_interpolated_until(&[',', ';', '}'])?;
            let media = media.as_plain().unwrap_or_default();
            let media = media.trim();

            match path {
                Some(path) if media.is_empty() && !is_plain_css_import(&path) => {
                    nodes.push(Node::Import(Import {
                        path,
                        span: target.span,
                    }));
                }
                _ => {
                    let text = if media.is_empty() {
                        css_text
                    } else {
                        format!("{css_text} {media}")
                    };
                    nodes.push(Node::CssImport(CssImport {
                        text,
                        span: target.span,
                    }));
                }
            }

            if !self.eat_punct(',') {
                break;
            }
        }
        self.end_of_statement()?;
        Ok(nodes)
    }

    /// Collect tokens as text up to (not including) one of `stops` at
    /// bracket depth zero. `#{}` and `$variables` become interpolations.
    fn parse_interpolated_until(&mut self, stops: &[char]) -> Result<Interpolated> {
        let mut text = Interpolated::default();
        let mut depth = 0usize;
        loop {
            self.skip_comments();
            let token = self.peek();
            if token.kind == TokenKind::Eof {
                break;
            }
            if token.kind == TokenKind::Punctuation && depth == 0 {
                if let Some(ch) = token.text.chars().next() {
                    if stops.contains(&ch) {
                        break;
                    }
                }
            }
            if token.is_punct('{') || (token.is_punct('}') && depth == 0) {
                return Err(self.error(describe_stops(stops)));
            }
            if token.spaced && !text.parts.is_empty() {
                text.push_literal(" ");
            }
            let token = self.bump();
            match token.kind {
                TokenKind::InterpolationStart => {
                    let expr = self.parse_expression_list()?;
                    self.expect_punct('}')?;
                    text.push_interpolation(expr);
                }
                TokenKind::Variable => text.push_interpolation(Expr::Variable {
                    name: token.text,
                    span: token.span,
                }),
                _ => {
                    if token.is_punct('(') || token.is_punct('[') {
                        depth += 1;
                    } else if token.is_punct(')') || token.is_punct(']') {
                        depth = depth.saturating_sub(1);
                    }
                    text.push_literal(&token.css_text());
                }
            }
        }
        Ok(text)
    }

    /// Comma-separated list of space-separated lists.
    pub fn parse_expression_list(&mut self) -> Result<Expr> {
        let span = self.peek().span;
        let Some(first) = self.parse_space_list()? else {
            return Err(self.error("expression"));
        };
        if !self.at_punct(',') {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_punct(',') {
            match self.parse_space_list()? {
                Some(item) => items.push(item),
                None => break,
            }
        }
        Ok(Expr::List {
            items,
            separator: ListSeparator::Comma,
            span,
        })
    }

    fn at_list_end(&mut self) -> bool {
        self.skip_comments();
        let token = self.peek();
        match token.kind {
            TokenKind::Eof | TokenKind::Bang => true,
            TokenKind::Punctuation => matches!(
                token.text.as_str(),
                ";" | "}" | "," | ")" | "{" | "]" | ":"
            ),
            _ => false,
        }
    }

    fn parse_space_list(&mut self) -> Result<Option<Expr>> {
        let span = self.peek().span;
        let mut items = Vec::new();
        while !self.at_list_end() {
            items.push(self.parse_additive()?);
        }
        Ok(match items.len() {
            0 => None,
            1 => items.pop(),
            _ => Some(Expr::List {
                items,
                separator: ListSeparator::Space,
                span,
            }),
        })
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            self.skip_comments();
            let token = self.peek();
            let op = if token.is_operator('+') {
                BinaryOp::Add
            } else if token.is_operator('-') {
                BinaryOp::Sub
            } else {
                break;
            };
            // `a -b` is a list of `a` and `-b`, not a subtraction.
            if token.spaced && !self.peek_nth(1).spaced {
                break;
            }
            let span = token.span;
            self.bump();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            self.skip_comments();
            let token = self.peek();
            let op = if token.is_operator('*') {
                BinaryOp::Mul
            } else if token.is_operator('/') {
                BinaryOp::Div
            } else if token.is_operator('%') {
                BinaryOp::Rem
            } else {
                break;
            };
            let span = token.span;
            self.bump();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        self.skip_comments();
        let token = self.peek();
        let op = if token.is_operator('-') {
            UnaryOp::Minus
        } else if token.is_operator('+') {
            UnaryOp::Plus
        } else {
            return self.parse_primary();
        };
        let span = token.span;
        self.bump();
        let operand = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
            span,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        self.skip_comments();
        let token = self.peek().clone();
        let span = token.span;
        match token.kind {
            TokenKind::Number => {
                self.bump();
                let (value, unit) = split_number(&token.text)
                    .ok_or_else(|| self.error_at(span, "number", &token))?;
                Ok(Expr::Literal {
                    value: Literal::Number { value, unit },
                    span,
                })
            }
            TokenKind::Hash => {
                self.bump();
                let is_hex = matches!(token.text.len(), 3 | 4 | 6 | 8)
                    && token.text.chars().all(|c| c.is_ascii_hexdigit());
                let value = if is_hex {
                    Literal::Color(token.text)
                } else {
                    Literal::Str {
                        text: Interpolated::literal(format!("#{}", token.text)),
                        quote: None,
                    }
                };
                Ok(Expr::Literal { value, span })
            }
            TokenKind::Str(quote) => {
                self.bump();
                let text = self.split_interpolation(&token.text, span)?;
                Ok(Expr::Literal {
                    value: Literal::Str {
                        text,
                        quote: Some(quote),
                    },
                    span,
                })
            }
            TokenKind::Url => {
                self.bump();
                let text = self.split_interpolation(&token.text, span)?;
                Ok(Expr::Raw { text, span })
            }
            TokenKind::Variable => {
                self.bump();
                Ok(Expr::Variable {
                    name: token.text,
                    span,
                })
            }
            TokenKind::Ident | TokenKind::InterpolationStart => self.parse_identifier_like(),
            TokenKind::Punctuation if token.is_punct('(') => {
                self.bump();
                if self.at_punct(')') {
                    self.bump();
                    return Ok(Expr::List {
                        items: Vec::new(),
                        separator: ListSeparator::Space,
                        span,
                    });
                }
                let inner = self.parse_expression_list()?;
                self.expect_punct(')')?;
                Ok(Expr::Paren {
                    inner: Box::new(inner),
                    span,
                })
            }
            _ => Err(self.error("expression")),
        }
    }

    fn error_at(&self, span: Span, expected: &str, token: &Token) -> CompileError {
        CompileError::parse(self.location(span), expected, describe(token))
    }

    /// Identifiers, function calls and `#{}`-joined words like `foo-#{$x}`.
    fn parse_identifier_like(&mut self) -> Result<Expr> {
        let span = self.peek().span;
        let mut text = Interpolated::default();
        loop {
            let token = self.peek();
            if !text.parts.is_empty() && token.spaced {
                break;
            }
            match token.kind {
                TokenKind::Ident => {
                    let token = self.bump();
                    text.push_literal(&token.text);
                }
                TokenKind::InterpolationStart => {
                    self.bump();
                    let expr = self.parse_expression_list()?;
                    self.expect_punct('}')?;
                    text.push_interpolation(expr);
                }
                _ => break,
            }
        }

        let call_follows = self.at_punct('(') && !self.peek().spaced;
        match text.as_plain() {
            Some(name) if call_follows => {
                let lower = name.to_ascii_lowercase();
                if RAW_FUNCTIONS.iter().any(|raw| lower.ends_with(raw)) {
                    let text = self.parse_raw_call(&name)?;
                    return Ok(Expr::Raw { text, span });
                }
                self.bump();
                let args = self.parse_call_args()?;
                Ok(Expr::Call { name, args, span })
            }
            _ => Ok(Expr::Literal {
                value: Literal::Str { text, quote: None },
                span,
            }),
        }
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if self.eat_punct(')') {
            return Ok(args);
        }
        loop {
            match self.parse_space_list()? {
                Some(arg) => args.push(arg),
                None => return Err(self.error("argument")),
            }
            if self.eat_punct(',') {
                continue;
            }
            self.expect_punct(')')?;
            return Ok(args);
        }
    }

    /// `calc(...)` and friends: balanced text with `#{}` holes.
    fn parse_raw_call(&mut self, name: &str) -> Result<Interpolated> {
        let mut text = Interpolated::literal(name);
        text.push_literal("(");
        self.bump();
        let mut depth = 1usize;
        let mut first = true;
        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::Eof => return Err(self.error("')'")),
                TokenKind::Comment => {
                    self.skip_comments();
                    continue;
                }
                _ => {}
            }
            if token.spaced && !first {
                text.push_literal(" ");
            }
            first = false;
            let token = self.bump();
            match token.kind {
                TokenKind::InterpolationStart => {
                    let expr = self.parse_expression_list()?;
                    self.expect_punct('}')?;
                    text.push_interpolation(expr);
                }
                TokenKind::Url | TokenKind::Str(_) => {
                    let inner = self.split_interpolation(&token.css_text(), token.span)?;
                    text.parts.extend(inner.parts);
                }
                _ => {
                    if token.is_punct('(') {
                        depth += 1;
                    } else if token.is_punct(')') {
                        depth -= 1;
                        if depth == 0 {
                            text.push_literal(")");
                            return Ok(text);
                        }
                    }
                    text.push_literal(&token.css_text());
                }
            }
        }
    }

    /// Split raw string content on `#{...}` and parse each hole.
    fn split_interpolation(&self, raw: &str, span: Span) -> Result<Interpolated> {
        let mut text = Interpolated::default();
        let mut rest = raw;
        while let Some(start) = rest.find("#{") {
            text.push_literal(&rest[..start]);
            let inner_start = start + 2;
            let mut depth = 1usize;
            let mut end = None;
            for (i, ch) in rest[inner_start..].char_indices() {
                match ch {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            end = Some(inner_start + i);
                            break;
                        }
                    }
                    _ => {}
                }
            }
            let Some(end) = end else {
                return Err(CompileError::parse(
                    self.location(span),
                    "'}'",
                    "end of string",
                ));
            };
            let inner = &rest[inner_start..end];
            let origin = span.with_offset(raw.len() - rest.len() + inner_start + 1);
            let tokens: Vec<Token> =
                Lexer::starting_at(inner, self.file_name, origin).collect::<Result<_>>()?;
            let mut sub = Parser::new(tokens, self.file_name);
            let expr = sub.parse_expression_list()?;
            if sub.peek().kind != TokenKind::Eof {
                return Err(sub.error("'}'"));
            }
            text.push_interpolation(expr);
            rest = &rest[end + 1..];
        }
        if !rest.is_empty() || text.parts.is_empty() {
            text.push_literal(rest);
        }
        Ok(text)
    }
}

fn push_selector_text(components: &mut Vec<SelectorComponent>, text: &str) {
    if let Some(SelectorComponent::Text(last)) = components.last_mut() {
        last.push_str(text);
    } else {
        components.push(SelectorComponent::Text(text.to_string()));
    }
}

fn describe(token: &Token) -> String {
    match token.kind {
        TokenKind::Eof => "end of input".to_string(),
        _ => format!("'{}'", token.css_text()),
    }
}

fn describe_stops(stops: &[char]) -> String {
    stops
        .iter()
        .map(|c| format!("'{c}'"))
        .collect::<Vec<_>>()
        .join(" or ")
}

fn split_number(text: &str) -> Option<(f64, String)> {
    let bytes = text.as_bytes();
    let mut idx = text
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(text.len());
    if matches!(bytes.get(idx), Some(b'e' | b'E')) {
        let digits_at = match bytes.get(idx + 1) {
            Some(b'+' | b'-') => idx + 2,
            _ => idx + 1,
        };
        if bytes.get(digits_at).is_some_and(u8::is_ascii_digit) {
            idx = digits_at;
            while bytes.get(idx).is_some_and(u8::is_ascii_digit) {
                idx += 1;
            }
        }
    }
    let value = text[..idx].parse::<f64>().ok()?;
    Some((value, text[idx..].to_string()))
}

/// `@import` targets that stay as CSS `@import` rules.
fn is_plain_css_import(path: &str) -> bool {
    path.ends_with(".css")
        || path.starts_with("http://")
        || path.starts_with("https://")
        || path.starts_with("//")
        || path.contains("#{")
}
