//! Serialises evaluated CSS in one of the four output styles, recording a
//! source mapping at every selector, declaration and at-rule it writes.

use crate::error::Span;
use crate::evaluator::{BlockItem, CssNode, FlatAtRule, FlatDeclaration, FlatRule};
use crate::loader::SourceFile;
use crate::options::{CompileOptions, OutputStyle};
use crate::sourcemap::Mapping;
use crate::value::Format;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Output {
    pub css: String,
    pub mappings: Vec<Mapping>,
}

pub fn emit_css(nodes: &[CssNode], files: &[SourceFile], options: &CompileOptions) -> Output {
    let mut emitter = Emitter {
        style: options.style,
        comments: options.emits_comments(),
        format: Format {
            precision: options.digits(),
            compressed: options.style == OutputStyle::Compressed,
        },
        files,
        writer: Writer::default(),
    };
    emitter.emit_block(nodes, 0, true);
    if !emitter.writer.out.is_empty() && options.style != OutputStyle::Compressed {
        emitter.writer.push("\n");
    }
    Output {
        css: emitter.writer.out,
        mappings: emitter.writer.mappings,
    }
}

/// Output buffer that knows its current 0-based line and column.
#[derive(Default)]
struct Writer {
    out: String,
    line: usize,
    column: usize,
    mappings: Vec<Mapping>,
}

impl Writer {
    fn push(&mut self, text: &str) {
        for ch in text.chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += ch.len_utf16();
            }
        }
        self.out.push_str(text);
    }

    fn mark(&mut self, span: Span) {
        if span.is_dummy() {
            return;
        }
        self.mappings.push(Mapping {
            generated_line: self.line,
            generated_column: self.column,
            source: span.file,
            source_line: span.line - 1,
            source_column: span.column - 1,
        });
    }
}

struct Emitter<'a> {
    style: OutputStyle,
    comments: bool,
    format: Format,
    files: &'a [SourceFile],
    writer: Writer,
}

impl Emitter<'_> {
    fn indent(&self, level: usize) -> String {
        match self.style {
            OutputStyle::Nested | OutputStyle::Expanded => "  ".repeat(level),
            OutputStyle::Compact | OutputStyle::Compressed => String::new(),
        }
    }

    fn renders(&self, node: &CssNode) -> bool {
        match node {
            CssNode::Comment(_) => self.comments,
            CssNode::Rule(rule) => rule.has_declarations(),
            CssNode::AtRule(_) | CssNode::Import(_) => true,
        }
    }

    fn separator(&self, top: bool, next: &CssNode) -> &'static str {
        let depth = match next {
            CssNode::Rule(rule) => rule.depth,
            CssNode::AtRule(at) => at.depth,
            CssNode::Comment(_) | CssNode::Import(_) => 0,
        };
        match self.style {
            OutputStyle::Nested if top && depth == 0 => "\n\n",
            OutputStyle::Nested => "\n",
            OutputStyle::Expanded if top => "\n\n",
            OutputStyle::Expanded => "\n",
            OutputStyle::Compact if top => "\n",
            OutputStyle::Compact => " ",
            OutputStyle::Compressed => "",
        }
    }

    fn emit_block(&mut self, nodes: &[CssNode], level: usize, top: bool) {
        let nodes: Vec<&CssNode> = nodes.iter().filter(|node| self.renders(node)).collect();
        for (i, node) in nodes.into_iter().enumerate() {
            if i > 0 {
                let separator = self.separator(top, node);
                self.writer.push(separator);
            }
            match node {
                CssNode::Rule(rule) => self.emit_rule(rule, level),
                CssNode::AtRule(at) => self.emit_at_rule(at, level),
                CssNode::Comment(comment) => {
                    let indent = self.indent(level);
                    self.writer.push(&indent);
                    self.writer.mark(comment.span);
                    self.writer.push(&comment.text);
                }
                CssNode::Import(import) => {
                    let indent = self.indent(level);
                    self.writer.push(&indent);
                    self.writer.mark(import.span);
                    self.writer.push(&format!("@import {};", import.text));
                }
            }
        }
    }

    fn emit_rule(&mut self, rule: &FlatRule, level: usize) {
        let level = match self.style {
            OutputStyle::Nested => level + rule.depth,
            _ => level,
        };
        let indent = self.indent(level);

        if self.comments {
            let file = self
                .files
                .get(rule.span.file.0)
                .map(|f| f.name.as_str())
                .unwrap_or("stdin");
            self.writer
                .push(&format!("{indent}/* line {}, {file} */\n", rule.span.line));
        }

        self.writer.push(&indent);
        self.writer.mark(rule.span);
        let joiner = match self.style {
            OutputStyle::Compressed => ",".to_string(),
            OutputStyle::Expanded => format!(",\n{indent}"),
            OutputStyle::Nested | OutputStyle::Compact => ", ".to_string(),
        };
        self.writer.push(&rule.selectors.join(&joiner));
        self.open_brace();
        self.emit_items(&rule.items, level);
        self.close_brace(&indent);
    }

    fn emit_at_rule(&mut self, at: &FlatAtRule, level: usize) {
        let level = match self.style {
            OutputStyle::Nested => level + at.depth,
            _ => level,
        };
        let indent = self.indent(level);
        self.writer.push(&indent);
        self.writer.mark(at.span);
        self.writer.push(&format!("@{}", at.name));
        if !at.prelude.is_empty() {
            self.writer.push(&format!(" {}", at.prelude));
        }
        if !at.has_block {
            self.writer.push(";");
            return;
        }

        self.open_brace();
        self.emit_items(&at.items, level);
        let children: Vec<&CssNode> = at.children.iter().filter(|n| self.renders(n)).collect();
        if !children.is_empty() {
            match self.style {
                OutputStyle::Nested | OutputStyle::Expanded => self.writer.push("\n"),
                OutputStyle::Compact => self.writer.push(" "),
                OutputStyle::Compressed => {}
            }
            self.emit_block(&at.children, level + 1, false);
        }
        self.close_brace(&indent);
    }

    fn open_brace(&mut self) {
        match self.style {
            OutputStyle::Compressed => self.writer.push("{"),
            _ => self.writer.push(" {"),
        }
    }

    fn close_brace(&mut self, indent: &str) {
        match self.style {
            OutputStyle::Nested | OutputStyle::Compact => self.writer.push(" }"),
            OutputStyle::Expanded => self.writer.push(&format!("\n{indent}}}")),
            OutputStyle::Compressed => self.writer.push("}"),
        }
    }

    fn emit_items(&mut self, items: &[BlockItem], level: usize) {
        let inner = self.indent(level + 1);
        let comments = self.comments;
        let items = items.iter().filter(|item| match item {
            BlockItem::Declaration(_) => true,
            BlockItem::Comment(_) => comments,
        });
        for (i, item) in items.enumerate() {
            match self.style {
                OutputStyle::Nested | OutputStyle::Expanded => {
                    self.writer.push("\n");
                    self.writer.push(&inner);
                }
                OutputStyle::Compact => self.writer.push(" "),
                OutputStyle::Compressed if i > 0 => self.writer.push(";"),
                OutputStyle::Compressed => {}
            }
            match item {
                BlockItem::Declaration(decl) => {
                    self.writer.mark(decl.span);
                    let text = self.declaration(decl);
                    self.writer.push(&text);
                    if self.style != OutputStyle::Compressed {
                        self.writer.push(";");
                    }
                }
                BlockItem::Comment(comment) => self.writer.push(&comment.text),
            }
        }
    }

    fn declaration(&self, decl: &FlatDeclaration) -> String {
        let value = decl.value.to_css(&self.format);
        match (self.style, decl.important) {
            (OutputStyle::Compressed, false) => format!("{}:{value}", decl.property),
            (OutputStyle::Compressed, true) => format!("{}:{value}!important", decl.property),
            (_, false) => format!("{}: {value}", decl.property),
            (_, true) => format!("{}: {value} !important", decl.property),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FileId;
    use crate::{evaluator, parser};

    fn render(src: &str, options: &CompileOptions) -> Output {
        let sheet = parser::parse(src, FileId(0), "stdin").expect("parse");
        let files = vec![SourceFile {
            name: "stdin".into(),
            path: None,
            contents: src.into(),
        }];
        let nodes = evaluator::evaluate(&sheet, &files, options).expect("evaluate");
        emit_css(&nodes, &files, options)
    }

    fn css(src: &str, style: OutputStyle) -> String {
        render(src, &CompileOptions::default().with_style(style)).css
    }

    const NESTED_SRC: &str = "a { color: red; b { width: 1px; } } c { d: e; }";

    #[test]
    fn nested_style_indents_by_source_depth() {
        assert_eq!(
            css(NESTED_SRC, OutputStyle::Nested),
            "a {\n  color: red; }\n  a b {\n    width: 1px; }\n\nc {\n  d: e; }\n"
        );
    }

    #[test]
    fn expanded_style() {
        assert_eq!(
            css(NESTED_SRC, OutputStyle::Expanded),
            "a {\n  color: red;\n}\n\na b {\n  width: 1px;\n}\n\nc {\n  d: e;\n}\n"
        );
    }

    #[test]
    fn compact_style() {
        assert_eq!(
            css(NESTED_SRC, OutputStyle::Compact),
            "a { color: red; }\na b { width: 1px; }\nc { d: e; }\n"
        );
    }

    #[test]
    fn compressed_style() {
        assert_eq!(
            css("a, b { color: red; margin: 0 auto !important; }", OutputStyle::Compressed),
            "a,b{color:red;margin:0 auto!important}"
        );
    }

    #[test]
    fn media_blocks_per_style() {
        let src = "@media print { a { color: black; } }";
        assert_eq!(
            css(src, OutputStyle::Nested),
            "@media print {\n  a {\n    color: black; } }\n"
        );
        assert_eq!(
            css(src, OutputStyle::Expanded),
            "@media print {\n  a {\n    color: black;\n  }\n}\n"
        );
        assert_eq!(css(src, OutputStyle::Compact), "@media print { a { color: black; } }\n");
        assert_eq!(css(src, OutputStyle::Compressed), "@media print{a{color:black}}");
    }

    #[test]
    fn statement_at_rules_and_css_imports() {
        let out = css(
            "@charset \"UTF-8\"; @import \"print.css\"; a { b: c; }",
            OutputStyle::Compact,
        );
        assert_eq!(out, "@charset \"UTF-8\";\n@import \"print.css\";\na { b: c; }\n");
    }

    #[test]
    fn comments_only_when_enabled() {
        let src = "/* head */\na {\n  /* inner */\n  b: c;\n}";
        let plain = css(src, OutputStyle::Expanded);
        assert!(!plain.contains("/*"));

        let options = CompileOptions::default()
            .with_style(OutputStyle::Expanded)
            .with_comments(true);
        let out = render(src, &options).css;
        assert!(out.contains("/* head */"));
        assert!(out.contains("/* line 2, stdin */\na {"));
        assert!(out.contains("  /* inner */\n  b: c;"));
    }

    #[test]
    fn compressed_never_emits_comments() {
        let options = CompileOptions::default()
            .with_style(OutputStyle::Compressed)
            .with_comments(true);
        let out = render("/* x */ a { /* y */ b: c; }", &options).css;
        assert_eq!(out, "a{b:c}");
    }

    #[test]
    fn mappings_point_at_selectors_and_declarations() {
        let out = render("a {\n  b: c;\n}", &CompileOptions::default());
        assert_eq!(
            out.mappings,
            vec![
                Mapping {
                    generated_line: 0,
                    generated_column: 0,
                    source: FileId(0),
                    source_line: 0,
                    source_column: 0,
                },
                Mapping {
                    generated_line: 1,
                    generated_column: 2,
                    source: FileId(0),
                    source_line: 1,
                    source_column: 2,
                },
            ]
        );
    }

    #[test]
    fn empty_input_renders_nothing() {
        let out = render("", &CompileOptions::default());
        assert!(out.css.is_empty());
        assert!(out.mappings.is_empty());
    }
}
