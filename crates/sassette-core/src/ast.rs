use crate::error::Span;
use crate::value::ListSeparator;

#[derive(Debug, Clone, PartialEq)]
pub struct Stylesheet {
    pub children: Vec<Node>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A resolved `@import`: the imported file's tree, spliced in place.
    Stylesheet(Stylesheet),
    Rule(Rule),
    Declaration(Declaration),
    Variable(VariableDecl),
    Import(Import),
    /// `@import` of a plain CSS file, emitted verbatim.
    CssImport(CssImport),
    AtRule(AtRule),
    Comment(Comment),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub selector: Selector,
    pub body: Vec<Node>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    pub components: Vec<SelectorComponent>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectorComponent {
    Text(String),
    /// `&`
    Parent,
    Interpolation(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub property: Interpolated,
    pub value: Expr,
    pub important: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    pub name: String,
    pub value: Expr,
    pub default: bool,
    pub global: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub path: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CssImport {
    pub text: String,
    pub span: Span,
}

/// `@media`, `@font-face`, `@keyframes`, `@charset` and friends. `body` is
/// `None` for statement at-rules ending in `;`.
#[derive(Debug, Clone, PartialEq)]
pub struct AtRule {
    pub name: String,
    pub prelude: Interpolated,
    pub body: Option<Vec<Node>>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub text: String,
    pub span: Span,
}

/// Text with `#{}` holes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Interpolated {
    pub parts: Vec<TextPart>,
}

impl Interpolated {
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            parts: vec![TextPart::Literal(text.into())],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(|part| match part {
            TextPart::Literal(text) => text.trim().is_empty(),
            TextPart::Interpolation(_) => false,
        })
    }

    /// The literal text, or `None` once any interpolation is involved.
    pub fn as_plain(&self) -> Option<String> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                TextPart::Literal(text) => out.push_str(text),
                TextPart::Interpolation(_) => return None,
            }
        }
        Some(out)
    }

    pub fn push_literal(&mut self, text: &str) {
        if let Some(TextPart::Literal(last)) = self.parts.last_mut() {
            last.push_str(text);
        } else {
            self.parts.push(TextPart::Literal(text.to_string()));
        }
    }

    pub fn push_interpolation(&mut self, expr: Expr) {
        self.parts.push(TextPart::Interpolation(expr));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TextPart {
    Literal(String),
    Interpolation(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number { value: f64, unit: String },
    /// Hex digits as written, without the `#`.
    Color(String),
    /// Quoted string or bare identifier; may contain interpolation.
    Str {
        text: Interpolated,
        quote: Option<char>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub fn symbol(self) -> char {
        match self {
            Self::Add => '+',
            Self::Sub => '-',
            Self::Mul => '*',
            Self::Div => '/',
            Self::Rem => '%',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal {
        value: Literal,
        span: Span,
    },
    Variable {
        name: String,
        span: Span,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        span: Span,
    },
    Call {
        name: String,
        args: Vec<Expr>,
        span: Span,
    },
    /// Body of `url()`, `calc()` and similar, kept as text.
    Raw {
        text: Interpolated,
        span: Span,
    },
    List {
        items: Vec<Expr>,
        separator: ListSeparator,
        span: Span,
    },
    Paren {
        inner: Box<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Self::Literal { span, .. }
            | Self::Variable { span, .. }
            | Self::Binary { span, .. }
            | Self::Unary { span, .. }
            | Self::Call { span, .. }
            | Self::Raw { span, .. }
            | Self::List { span, .. }
            | Self::Paren { span, .. } => *span,
        }
    }

    /// Literals written directly in the source, where `a/b` stays a slash.
    pub fn is_plain_literal(&self) -> bool {
        match self {
            Self::Literal { .. } => true,
            Self::Unary { operand, .. } => operand.is_plain_literal(),
            _ => false,
        }
    }
}
