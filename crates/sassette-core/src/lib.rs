//! SCSS to CSS compiler core.
//!
//! Source text runs through the lexer and parser, the [`loader`] splices in
//! imported files, the [`evaluator`] resolves variables and flattens nesting,
//! and the [`emitter`] writes CSS in the requested [`OutputStyle`], optionally
//! with a [`sourcemap`].
//!
//! ```no_run
//! use sassette_core::{compile, CompileOptions, OutputStyle};
//!
//! let options = CompileOptions::new().with_style(OutputStyle::Compressed);
//! let result = compile("$w: 10px; a { width: $w * 2; }", &options)?;
//! assert_eq!(result.css, "a{width:20px}");
//! # Ok::<(), sassette_core::CompileError>(())
//! ```

pub mod ast;
pub mod emitter;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod lexer;
pub mod loader;
pub mod options;
pub mod parser;
pub mod sourcemap;
pub mod value;

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::ast::Stylesheet;
use crate::loader::{Loader, SourceFile, STDIN};

pub use error::{
    CompileError, ErrorKind, EvalErrorKind, ImportErrorKind, Location, MapErrorKind, Result, Span,
};
pub use options::{CompileOptions, OutputStyle};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompileResult {
    pub css: String,
    /// Source map JSON, present when `map_path` or `embed_map` was set.
    pub source_map: Option<String>,
}

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Compile SCSS source text. Imports resolve against the include paths only.
pub fn compile(source: &str, options: &CompileOptions) -> Result<CompileResult> {
    options.validate()?;
    let mut loader = Loader::new(&options.include_paths);
    let sheet = loader.load_source(source)?;
    render(&sheet, &loader.into_files(), options, &format!("{STDIN}.css"))
}

/// Compile the file at `path`. Its directory is searched before the include
/// paths.
pub fn compile_file(path: impl AsRef<Path>, options: &CompileOptions) -> Result<CompileResult> {
    options.validate()?;
    let path = path.as_ref();

    let mut include_paths = Vec::with_capacity(options.include_paths.len() + 1);
    include_paths.push(match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    });
    include_paths.extend(options.include_paths.iter().cloned());

    let mut loader = Loader::new(&include_paths);
    let sheet = loader.load_entry(path)?;
    let output_file = path
        .with_extension("css")
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{STDIN}.css"));
    render(&sheet, &loader.into_files(), options, &output_file)
}

fn render(
    sheet: &Stylesheet,
    files: &[SourceFile],
    options: &CompileOptions,
    output_file: &str,
) -> Result<CompileResult> {
    debug!(
        style = %options.style,
        precision = options.precision,
        files = files.len(),
        "compiling"
    );
    let nodes = evaluator::evaluate(sheet, files, options)?;
    let output = emitter::emit_css(&nodes, files, options);
    let mut css = output.css;

    let source_map = if options.wants_source_map() {
        let json = sourcemap::build(&output.mappings, files, options, output_file)?;
        if let Some(comment) = sourcemap::url_comment(&json, options) {
            if !css.is_empty() && !css.ends_with('\n') {
                css.push('\n');
            }
            css.push_str(&comment);
        }
        Some(json)
    } else {
        None
    };

    debug!(bytes = css.len(), "compiled");
    Ok(CompileResult { css, source_map })
}
