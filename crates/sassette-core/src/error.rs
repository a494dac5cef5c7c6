use std::fmt;
use std::path::PathBuf;

/// Index of a loaded source file inside one compile invocation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FileId(pub usize);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Span {
    pub file: FileId,
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Span {
    pub const fn dummy() -> Self {
        Self {
            file: FileId(0),
            line: 0,
            column: 0,
            offset: 0,
        }
    }

    pub const fn new(file: FileId, line: usize, column: usize, offset: usize) -> Self {
        Self {
            file,
            line,
            column,
            offset,
        }
    }

    pub fn is_dummy(&self) -> bool {
        self.line == 0 && self.column == 0
    }

    pub fn with_offset(&self, offset: usize) -> Self {
        Self {
            file: self.file,
            line: self.line,
            column: self.column + offset,
            offset: self.offset + offset,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dummy() {
            write!(f, "<unknown>")
        } else {
            write!(f, "{}:{}", self.line, self.column)
        }
    }
}

/// A span resolved against the file registry, ready for display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(file: impl Into<String>, span: Span) -> Self {
        Self {
            file: file.into(),
            line: span.line,
            column: span.column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportErrorKind {
    NotFound,
    Cycle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvalErrorKind {
    UndefinedVariable,
    TypeMismatch,
    InvalidParent,
    InvalidOperation,
    BadArgument,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapErrorKind {
    NoSpans,
    Encode,
}

/// Flat discriminant of [`CompileError`], convenient for matching in callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Lex,
    Parse,
    Import(ImportErrorKind),
    Eval(EvalErrorKind),
    Map(MapErrorKind),
    Io,
}

pub type Result<T> = std::result::Result<T, CompileError>;

/// Every way a compile invocation can fail. Errors are terminal: no partial
/// CSS is produced once one is raised.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("invalid options: {message}")]
    Config { message: String },

    #[error("{location}: {message}")]
    Lex { location: Location, message: String },

    #[error("{location}: expected {expected}, found {found}")]
    Parse {
        location: Location,
        expected: String,
        found: String,
    },

    #[error("{message}")]
    Import {
        kind: ImportErrorKind,
        path: String,
        searched: Vec<PathBuf>,
        location: Option<Location>,
        message: String,
    },

    #[error("{location}: {message}")]
    Eval {
        kind: EvalErrorKind,
        name: Option<String>,
        location: Location,
        message: String,
    },

    #[error("source map error: {message}")]
    Map { kind: MapErrorKind, message: String },

    #[error("failed to read '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CompileError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn lex(location: Location, message: impl Into<String>) -> Self {
        Self::Lex {
            location,
            message: message.into(),
        }
    }

    pub fn parse(location: Location, expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::Parse {
            location,
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn import_not_found(
        path: impl Into<String>,
        searched: Vec<PathBuf>,
        location: Option<Location>,
    ) -> Self {
        let path = path.into();
        let dirs = if searched.is_empty() {
            "no directories".to_string()
        } else {
            searched
                .iter()
                .map(|dir| dir.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut message = format!("File to import not found or unreadable: {path} (searched {dirs})");
        if let Some(location) = &location {
            message = format!("{location}: {message}");
        }
        Self::Import {
            kind: ImportErrorKind::NotFound,
            path,
            searched,
            location,
            message,
        }
    }

    pub fn entry_not_found(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::Import {
            kind: ImportErrorKind::NotFound,
            message: format!("File {path} could not be found"),
            path,
            searched: Vec::new(),
            location: None,
        }
    }

    pub fn import_cycle(path: impl Into<String>, chain: &[String], location: Option<Location>) -> Self {
        let path = path.into();
        let mut message = format!("An @import loop has been found: {}", chain.join(" imports "));
        if let Some(location) = &location {
            message = format!("{location}: {message}");
        }
        Self::Import {
            kind: ImportErrorKind::Cycle,
            path,
            searched: Vec::new(),
            location,
            message,
        }
    }

    pub fn undefined_variable(name: impl Into<String>, location: Location) -> Self {
        let name = name.into();
        Self::Eval {
            kind: EvalErrorKind::UndefinedVariable,
            message: format!("Undefined variable: \"${name}\""),
            name: Some(name),
            location,
        }
    }

    pub fn eval(kind: EvalErrorKind, location: Location, message: impl Into<String>) -> Self {
        Self::Eval {
            kind,
            name: None,
            location,
            message: message.into(),
        }
    }

    pub fn no_spans() -> Self {
        Self::Map {
            kind: MapErrorKind::NoSpans,
            message: "no source positions were recorded for the generated CSS".to_string(),
        }
    }

    pub fn map_encode(source: sourcemap::Error) -> Self {
        Self::Map {
            kind: MapErrorKind::Encode,
            message: format!("failed to encode source map: {source}"),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } => ErrorKind::Config,
            Self::Lex { .. } => ErrorKind::Lex,
            Self::Parse { .. } => ErrorKind::Parse,
            Self::Import { kind, .. } => ErrorKind::Import(*kind),
            Self::Eval { kind, .. } => ErrorKind::Eval(*kind),
            Self::Map { kind, .. } => ErrorKind::Map(*kind),
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    /// Source position of the failure, when the failing stage knew one.
    pub fn location(&self) -> Option<&Location> {
        match self {
            Self::Lex { location, .. }
            | Self::Parse { location, .. }
            | Self::Eval { location, .. } => Some(location),
            Self::Import { location, .. } => location.as_ref(),
            Self::Config { .. } | Self::Map { .. } | Self::Io { .. } => None,
        }
    }
}
