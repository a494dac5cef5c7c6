//! Import resolution. Every `@import` of a Sass file is replaced by the
//! parsed tree of the file it names, recursively, before evaluation starts.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use tracing::{debug, trace};

use crate::ast::{AtRule, Node, Rule, Stylesheet};
use crate::error::{CompileError, FileId, Location, Result, Span};
use crate::parser;

/// Name given to source text that did not come from a file.
pub const STDIN: &str = "stdin";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFile {
    /// Display name: `stdin` or the path as it was resolved.
    pub name: String,
    pub path: Option<PathBuf>,
    pub contents: String,
}

/// Loads the entry stylesheet and everything it imports. One loader serves
/// exactly one compile invocation.
pub struct Loader {
    include_paths: Vec<PathBuf>,
    files: Vec<SourceFile>,
    /// Resolved trees by canonical path; a file imported twice is parsed once.
    parsed: HashMap<PathBuf, Stylesheet>,
    /// Files currently being resolved, outermost first.
    stack: IndexSet<PathBuf>,
}

impl Loader {
    pub fn new(include_paths: &[PathBuf]) -> Self {
        Self {
            include_paths: include_paths.to_vec(),
            files: Vec::new(),
            parsed: HashMap::new(),
            stack: IndexSet::new(),
        }
    }

    /// Source text without a file. Imports resolve against the include
    /// paths only.
    pub fn load_source(&mut self, source: &str) -> Result<Stylesheet> {
        let file = self.register(STDIN.to_string(), None, source.to_string());
        let sheet = parser::parse(source, file, STDIN)?;
        let children = self.resolve_nodes(sheet.children, None, STDIN)?;
        Ok(Stylesheet {
            children,
            span: sheet.span,
        })
    }

    pub fn load_entry(&mut self, path: &Path) -> Result<Stylesheet> {
        if !path.is_file() {
            return Err(CompileError::entry_not_found(path.display().to_string()));
        }
        let canonical = path
            .canonicalize()
            .map_err(|e| CompileError::io(path, e))?;
        self.load_canonical(&canonical, None)
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn into_files(self) -> Vec<SourceFile> {
        self.files
    }

    fn register(&mut self, name: String, path: Option<PathBuf>, contents: String) -> FileId {
        let id = FileId(self.files.len());
        self.files.push(SourceFile {
            name,
            path,
            contents,
        });
        id
    }

    fn load_canonical(&mut self, path: &Path, location: Option<Location>) -> Result<Stylesheet> {
        if let Some(start) = self.stack.get_index_of(path) {
            let chain: Vec<String> = self
                .stack
                .iter()
                .skip(start)
                .chain(std::iter::once(&path.to_path_buf()))
                .map(|p| p.display().to_string())
                .collect();
            return Err(CompileError::import_cycle(
                path.display().to_string(),
                &chain,
                location,
            ));
        }

        if let Some(sheet) = self.parsed.get(path) {
            trace!(path = %path.display(), "reusing parsed import");
            return Ok(sheet.clone());
        }

        let contents = fs::read_to_string(path).map_err(|e| CompileError::io(path, e))?;
        let name = path.display().to_string();
        debug!(path = %name, "loading stylesheet");
        let file = self.register(name.clone(), Some(path.to_path_buf()), contents.clone());
        let sheet = parser::parse(&contents, file, &name)?;

        self.stack.insert(path.to_path_buf());
        let resolved = self.resolve_nodes(sheet.children, path.parent(), &name);
        self.stack.pop();

        let sheet = Stylesheet {
            children: resolved?,
            span: sheet.span,
        };
        self.parsed.insert(path.to_path_buf(), sheet.clone());
        Ok(sheet)
    }

    fn resolve_nodes(
        &mut self,
        nodes: Vec<Node>,
        dir: Option<&Path>,
        file_name: &str,
    ) -> Result<Vec<Node>> {
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            let node = match node {
                Node::Import(import) => {
                    let location = Location::new(file_name, import.span);
                    let (found, searched) = self.find(&import.path, dir);
                    let Some(found) = found else {
                        return Err(CompileError::import_not_found(
                            import.path,
                            searched,
                            Some(location),
                        ));
                    };
                    debug!(import = %import.path, resolved = %found.display(), "resolved import");
                    Node::Stylesheet(self.load_canonical(&found, Some(location))?)
                }
                Node::Rule(rule) => Node::Rule(Rule {
                    body: self.resolve_nodes(rule.body, dir, file_name)?,
                    ..rule
                }),
                Node::AtRule(AtRule {
                    name,
                    prelude,
                    body: Some(body),
                    span,
                }) => Node::AtRule(AtRule {
                    name,
                    prelude,
                    body: Some(self.resolve_nodes(body, dir, file_name)?),
                    span,
                }),
                other => other,
            };
            out.push(node);
        }
        Ok(out)
    }

    /// Search the importing file's directory, then each include path.
    /// Returns the first match and every directory that was tried.
    fn find(&self, target: &str, dir: Option<&Path>) -> (Option<PathBuf>, Vec<PathBuf>) {
        let mut dirs: IndexSet<PathBuf> = IndexSet::new();
        if let Some(dir) = dir {
            dirs.insert(dir.to_path_buf());
        }
        dirs.extend(self.include_paths.iter().cloned());

        for dir in &dirs {
            for candidate in candidates(&dir.join(target)) {
                trace!(candidate = %candidate.display(), "trying import candidate");
                if candidate.is_file() {
                    let found = candidate.canonicalize().unwrap_or(candidate);
                    return (Some(found), dirs.into_iter().collect());
                }
            }
        }
        (None, dirs.into_iter().collect())
    }
}

/// Files an import of `base` may refer to, in preference order.
fn candidates(base: &Path) -> Vec<PathBuf> {
    let Some(file_name) = base.file_name().and_then(|n| n.to_str()) else {
        return Vec::new();
    };
    let parent = base.parent().unwrap_or_else(|| Path::new(""));
    if base.extension().is_some_and(|ext| ext == "scss") {
        return vec![base.to_path_buf(), parent.join(format!("_{file_name}"))];
    }
    vec![
        parent.join(format!("{file_name}.scss")),
        parent.join(format!("_{file_name}.scss")),
        base.join("index.scss"),
        base.join("_index.scss"),
    ]
}

/// Resolved location of `span` for error messages.
pub fn locate(files: &[SourceFile], span: Span) -> Location {
    let name = files
        .get(span.file.0)
        .map(|f| f.name.as_str())
        .unwrap_or(STDIN);
    Location::new(name, span)
}
