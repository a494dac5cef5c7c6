use crate::error::{CompileError, FileId, Location, Result, Span};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    /// `$name`; text holds the name without the sigil.
    Variable,
    /// `@name`; text holds the name without the sigil.
    AtKeyword,
    /// `#name` or `#fff`; text holds what follows `#`.
    Hash,
    /// Digits with an optional unit, e.g. `1.5em` or `50%`.
    Number,
    /// Quoted string; text is the raw content between the quotes.
    Str(char),
    /// Unquoted `url(...)`; text is the whole call.
    Url,
    /// `#{`
    InterpolationStart,
    Punctuation,
    Operator,
    /// `!important`, `!default`; text is the word after `!`.
    Bang,
    Comment,
    Eof,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
    /// Whitespace or a comment sits between this token and the previous one.
    pub spaced: bool,
}

impl Token {
    pub fn is_punct(&self, ch: char) -> bool {
        self.kind == TokenKind::Punctuation && self.text.starts_with(ch)
    }

    pub fn is_operator(&self, ch: char) -> bool {
        self.kind == TokenKind::Operator && self.text.starts_with(ch)
    }

    pub fn is_loud_comment(&self) -> bool {
        self.kind == TokenKind::Comment && self.text.starts_with("/*")
    }

    /// The token as it appeared in the source.
    pub fn css_text(&self) -> String {
        match self.kind {
            TokenKind::Variable => format!("${}", self.text),
            TokenKind::AtKeyword => format!("@{}", self.text),
            TokenKind::Hash => format!("#{}", self.text),
            TokenKind::Str(quote) => format!("{quote}{}{quote}", self.text),
            TokenKind::InterpolationStart => "#{".to_string(),
            TokenKind::Bang => format!("!{}", self.text),
            _ => self.text.clone(),
        }
    }
}

/// Streaming tokenizer over one source file. Yields `Eof` once, then stops;
/// the first error also ends the stream.
pub struct Lexer<'a> {
    source: &'a str,
    file: FileId,
    file_name: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    base_offset: usize,
    spaced: bool,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, file: FileId, file_name: &'a str) -> Self {
        Self::starting_at(source, file_name, Span::new(file, 1, 1, 0))
    }

    /// Lex a fragment (e.g. an interpolation inside a string) whose first
    /// character sits at `origin` in its file.
    pub fn starting_at(source: &'a str, file_name: &'a str, origin: Span) -> Self {
        Self {
            source,
            file: origin.file,
            file_name,
            pos: 0,
            line: origin.line.max(1),
            column: origin.column.max(1),
            base_offset: origin.offset,
            spaced: false,
            finished: false,
        }
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.source[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn span(&self) -> Span {
        Span::new(self.file, self.line, self.column, self.base_offset + self.pos)
    }

    fn error(&self, span: Span, message: impl Into<String>) -> CompileError {
        CompileError::lex(Location::new(self.file_name, span), message)
    }

    fn token(&self, kind: TokenKind, text: impl Into<String>, span: Span, spaced: bool) -> Token {
        Token {
            kind,
            text: text.into(),
            span,
            spaced,
        }
    }

    fn next_token(&mut self) -> Result<Token> {
        while let Some(ch) = self.peek() {
            if !ch.is_whitespace() {
                break;
            }
            self.bump();
            self.spaced = true;
        }

        let start = self.span();
        let spaced = std::mem::take(&mut self.spaced);
        let Some(ch) = self.peek() else {
            return Ok(self.token(TokenKind::Eof, "", start, spaced));
        };

        match ch {
            '/' if self.peek_at(1) == Some('*') => {
                let text = self.block_comment(start)?;
                self.spaced = true;
                Ok(self.token(TokenKind::Comment, text, start, spaced))
            }
            '/' if self.peek_at(1) == Some('/') => {
                let mut text = String::new();
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    text.push(c);
                    self.bump();
                }
                self.spaced = true;
                Ok(self.token(TokenKind::Comment, text, start, spaced))
            }
            '"' | '\'' => {
                let text = self.string(ch, start)?;
                Ok(self.token(TokenKind::Str(ch), text, start, spaced))
            }
            '$' if self.peek_at(1).is_some_and(is_name_start) => {
                self.bump();
                let name = self.name();
                Ok(self.token(TokenKind::Variable, name, start, spaced))
            }
            '@' => {
                self.bump();
                if !self.ident_starts_here() {
                    return Err(self.error(start, "expected an at-rule name after '@'"));
                }
                let name = self.name();
                Ok(self.token(TokenKind::AtKeyword, name, start, spaced))
            }
            '#' => {
                if self.peek_at(1) == Some('{') {
                    self.bump();
                    self.bump();
                    return Ok(self.token(TokenKind::InterpolationStart, "#{", start, spaced));
                }
                if !self.peek_at(1).is_some_and(is_name_char) {
                    return Err(self.error(start, "expected a name or '{' after '#'"));
                }
                self.bump();
                let name = self.name();
                Ok(self.token(TokenKind::Hash, name, start, spaced))
            }
            '!' => {
                self.bump();
                while self.peek().is_some_and(|c| c == ' ' || c == '\t') {
                    self.bump();
                }
                if !self.peek().is_some_and(is_name_start) {
                    return Err(self.error(start, "expected a flag name after '!'"));
                }
                let name = self.name();
                Ok(self.token(TokenKind::Bang, name.to_ascii_lowercase(), start, spaced))
            }
            c if c.is_ascii_digit()
                || (c == '.' && self.peek_at(1).is_some_and(|n| n.is_ascii_digit())) =>
            {
                let text = self.number();
                Ok(self.token(TokenKind::Number, text, start, spaced))
            }
            _ if self.ident_starts_here() => {
                let name = self.name();
                if name.eq_ignore_ascii_case("url") && self.peek() == Some('(') && !self.quoted_url()
                {
                    let text = self.raw_url(&name, start)?;
                    return Ok(self.token(TokenKind::Url, text, start, spaced));
                }
                Ok(self.token(TokenKind::Ident, name, start, spaced))
            }
            '+' | '-' | '*' | '/' | '%' => {
                self.bump();
                Ok(self.token(TokenKind::Operator, ch.to_string(), start, spaced))
            }
            '{' | '}' | '(' | ')' | '[' | ']' | ':' | ';' | ',' | '.' | '&' | '>' | '<' | '~'
            | '=' | '|' | '^' | '$' => {
                self.bump();
                Ok(self.token(TokenKind::Punctuation, ch.to_string(), start, spaced))
            }
            other => Err(self.error(start, format!("invalid character '{}'", other.escape_default()))),
        }
    }

    fn ident_starts_here(&self) -> bool {
        match self.peek() {
            Some('-') => match self.peek_at(1) {
                Some('-') => true,
                Some(c) => is_name_start(c),
                None => false,
            },
            Some(c) => is_name_start(c),
            None => false,
        }
    }

    fn name(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                out.push(c);
                self.bump();
                if let Some(escaped) = self.bump() {
                    out.push(escaped);
                }
                continue;
            }
            if !is_name_char(c) {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }

    fn number(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                out.push(c);
                self.bump();
            } else if c == '.' && self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) {
                out.push(c);
                self.bump();
            } else {
                break;
            }
        }
        // Exponent: `1e3`, `2.5E-2`. A bare `e` starts a unit such as `em`.
        if matches!(self.peek(), Some('e' | 'E')) {
            let digits_at = match self.peek_at(1) {
                Some('+' | '-') => 2,
                _ => 1,
            };
            if self.peek_at(digits_at).is_some_and(|c| c.is_ascii_digit()) {
                for _ in 0..digits_at {
                    if let Some(c) = self.bump() {
                        out.push(c);
                    }
                }
                while let Some(c) = self.peek().filter(char::is_ascii_digit) {
                    out.push(c);
                    self.bump();
                }
            }
        }
        if self.peek() == Some('%') {
            out.push('%');
            self.bump();
        } else {
            while let Some(c) = self.peek() {
                if !c.is_ascii_alphabetic() {
                    break;
                }
                out.push(c);
                self.bump();
            }
        }
        out
    }

    fn block_comment(&mut self, start: Span) -> Result<String> {
        let mut text = String::from("/*");
        self.bump();
        self.bump();
        loop {
            match self.bump() {
                Some('*') if self.peek() == Some('/') => {
                    self.bump();
                    text.push_str("*/");
                    return Ok(text);
                }
                Some(c) => text.push(c),
                None => return Err(self.error(start, "unterminated comment")),
            }
        }
    }

    fn string(&mut self, quote: char, start: Span) -> Result<String> {
        let mut text = String::new();
        self.bump();
        loop {
            match self.peek() {
                None | Some('\n') => return Err(self.error(start, "unterminated string")),
                Some('\\') => {
                    text.push('\\');
                    self.bump();
                    match self.bump() {
                        Some(escaped) => text.push(escaped),
                        None => return Err(self.error(start, "unterminated string")),
                    }
                }
                Some(c) if c == quote => {
                    self.bump();
                    return Ok(text);
                }
                Some('#') if self.peek_at(1) == Some('{') => {
                    let interpolation_start = self.span();
                    text.push_str(&self.braced(interpolation_start)?);
                }
                Some(c) => {
                    text.push(c);
                    self.bump();
                }
            }
        }
    }

    /// Consume `#{ ... }` verbatim, honouring nested braces.
    fn braced(&mut self, start: Span) -> Result<String> {
        let mut text = String::from("#{");
        self.bump();
        self.bump();
        let mut depth = 1usize;
        while depth > 0 {
            let Some(c) = self.bump() else {
                return Err(self.error(start, "unterminated interpolation"));
            };
            match c {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
            text.push(c);
        }
        Ok(text)
    }

    fn quoted_url(&self) -> bool {
        let mut n = 1;
        while let Some(c) = self.peek_at(n) {
            if !c.is_whitespace() {
                return c == '"' || c == '\'';
            }
            n += 1;
        }
        false
    }

    fn raw_url(&mut self, name: &str, start: Span) -> Result<String> {
        let mut inner = String::new();
        self.bump();
        loop {
            match self.peek() {
                None => return Err(self.error(start, "unterminated url()")),
                Some(')') => {
                    self.bump();
                    break;
                }
                Some('#') if self.peek_at(1) == Some('{') => {
                    let interpolation_start = self.span();
                    inner.push_str(&self.braced(interpolation_start)?);
                }
                Some(c) => {
                    inner.push(c);
                    self.bump();
                }
            }
        }
        Ok(format!("{name}({})", inner.trim()))
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let result = self.next_token();
        match &result {
            Ok(token) if token.kind != TokenKind::Eof => {}
            _ => self.finished = true,
        }
        Some(result)
    }
}

/// Lex a whole file. The returned vector always ends with an `Eof` token.
pub fn tokenize(source: &str, file: FileId, file_name: &str) -> Result<Vec<Token>> {
    Lexer::new(source, file, file_name).collect()
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '\\' || !c.is_ascii()
}

fn is_name_char(c: char) -> bool {
    is_name_start(c) || c.is_ascii_digit() || c == '-'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn kinds(src: &str) -> Vec<(TokenKind, String)> {
        tokenize(src, FileId(0), "test.scss")
            .expect("lex")
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn declaration_tokens() {
        let tokens = kinds("a { width: 10px; }");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Ident, "a".to_string()),
                (TokenKind::Punctuation, "{".to_string()),
                (TokenKind::Ident, "width".to_string()),
                (TokenKind::Punctuation, ":".to_string()),
                (TokenKind::Number, "10px".to_string()),
                (TokenKind::Punctuation, ";".to_string()),
                (TokenKind::Punctuation, "}".to_string()),
                (TokenKind::Eof, String::new()),
            ]
        );
    }

    #[test]
    fn numbers_with_exponents() {
        let tokens = kinds("1e3 2.5E-2px 3em 4ex");
        let numbers: Vec<&str> = tokens
            .iter()
            .filter(|(k, _)| *k == TokenKind::Number)
            .map(|(_, t)| t.as_str())
            .collect();
        assert_eq!(numbers, vec!["1e3", "2.5E-2px", "3em", "4ex"]);
    }

    #[test]
    fn sass_punctuation() {
        let tokens = kinds("&:hover $x @import #{$y} #fff !default");
        let k: Vec<TokenKind> = tokens.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            k,
            vec![
                TokenKind::Punctuation,
                TokenKind::Punctuation,
                TokenKind::Ident,
                TokenKind::Variable,
                TokenKind::AtKeyword,
                TokenKind::InterpolationStart,
                TokenKind::Variable,
                TokenKind::Punctuation,
                TokenKind::Hash,
                TokenKind::Bang,
                TokenKind::Eof,
            ]
        );
        assert_eq!(tokens[3].1, "x");
        assert_eq!(tokens[4].1, "import");
        assert_eq!(tokens[9].1, "default");
    }

    #[test]
    fn numbers_with_units() {
        let tokens = kinds("1.5em .5 50% 10px-5px");
        assert_eq!(tokens[0], (TokenKind::Number, "1.5em".to_string()));
        assert_eq!(tokens[1], (TokenKind::Number, ".5".to_string()));
        assert_eq!(tokens[2], (TokenKind::Number, "50%".to_string()));
        assert_eq!(tokens[3], (TokenKind::Number, "10px".to_string()));
        assert_eq!(tokens[4], (TokenKind::Operator, "-".to_string()));
        assert_eq!(tokens[5], (TokenKind::Number, "5px".to_string()));
    }

    #[test]
    fn hyphenated_identifiers_stay_whole() {
        let tokens = kinds("-webkit-box inline-flex --custom");
        assert_eq!(tokens[0].1, "-webkit-box");
        assert_eq!(tokens[1].1, "inline-flex");
        assert_eq!(tokens[2].1, "--custom");
    }

    #[test]
    fn strings_keep_escapes_and_interpolation() {
        let tokens = kinds(r#""a \"b\" #{$c}" 'd'"#);
        assert_eq!(tokens[0], (TokenKind::Str('"'), r#"a \"b\" #{$c}"#.to_string()));
        assert_eq!(tokens[1], (TokenKind::Str('\''), "d".to_string()));
    }

    #[test]
    fn comments_are_tokens_and_mark_spacing() {
        let tokens = tokenize("a/* x */b // tail\nc", FileId(0), "t").expect("lex");
        assert_eq!(tokens[1].kind, TokenKind::Comment);
        assert!(tokens[1].is_loud_comment());
        assert!(tokens[2].spaced);
        assert_eq!(tokens[3].text, "// tail");
        assert!(!tokens[3].is_loud_comment());
    }

    #[test]
    fn unquoted_url_is_raw() {
        let tokens = kinds("url(http://x.com/a.png) url(\"q.png\")");
        assert_eq!(tokens[0], (TokenKind::Url, "url(http://x.com/a.png)".to_string()));
        assert_eq!(tokens[1], (TokenKind::Ident, "url".to_string()));
    }

    #[test]
    fn positions_are_one_based() {
        let tokens = tokenize("a {\n  b: c;\n}", FileId(0), "t").expect("lex");
        let b = &tokens[2];
        assert_eq!((b.span.line, b.span.column, b.span.offset), (2, 3, 6));
    }

    #[test]
    fn unterminated_string_fails() {
        let err = tokenize("a { content: \"oops; }", FileId(0), "t.scss").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Lex);
        assert_eq!(err.location().map(|l| l.column), Some(14));
    }

    #[test]
    fn unterminated_comment_fails() {
        let err = tokenize("/* never closed", FileId(0), "t").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Lex);
        assert!(err.to_string().contains("unterminated comment"));
    }

    #[test]
    fn invalid_character_fails() {
        let err = tokenize("a { b: `c`; }", FileId(0), "t").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Lex);
    }

    #[test]
    fn lexing_stops_after_first_error() {
        let mut lexer = Lexer::new("a ` b", FileId(0), "t");
        assert!(matches!(lexer.next(), Some(Ok(_))));
        assert!(matches!(lexer.next(), Some(Err(_))));
        assert!(lexer.next().is_none());
    }
}
