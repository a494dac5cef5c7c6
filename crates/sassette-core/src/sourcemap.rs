//! Source map v3 generation.

use std::path::{Component, Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sourcemap::SourceMapBuilder;
use tracing::debug;

use crate::error::{CompileError, FileId, Result};
use crate::loader::SourceFile;
use crate::options::CompileOptions;

/// One generated position and the source position it came from. All lines
/// and columns are 0-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mapping {
    pub generated_line: usize,
    pub generated_column: usize,
    pub source: FileId,
    pub source_line: usize,
    pub source_column: usize,
}

/// Build the JSON document for `mappings`. `output_file` names the CSS the
/// map describes.
pub fn build(
    mappings: &[Mapping],
    files: &[SourceFile],
    options: &CompileOptions,
    output_file: &str,
) -> Result<String> {
    if mappings.is_empty() {
        return Err(CompileError::no_spans());
    }

    let map_dir = options
        .map_path
        .as_deref()
        .and_then(Path::parent)
        .map(|dir| std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf()));

    let mut builder = SourceMapBuilder::new(Some(output_file));
    builder.set_source_root(options.map_root.as_deref());
    let source_ids: Vec<u32> = files
        .iter()
        .map(|file| {
            let name = source_name(file, map_dir.as_deref());
            let id = builder.add_source(name.as_str());
            if options.wants_sources_content() {
                builder.set_source_contents(id, Some(file.contents.as_str()));
            }
            id
        })
        .collect();

    let mut sorted = mappings.to_vec();
    sorted.sort_by_key(|m| (m.generated_line, m.generated_column));
    for mapping in &sorted {
        builder.add_raw(
            to_u32(mapping.generated_line),
            to_u32(mapping.generated_column),
            to_u32(mapping.source_line),
            to_u32(mapping.source_column),
            source_ids.get(mapping.source.0).copied(),
            None,
            false,
        );
    }

    let mut json = Vec::new();
    builder
        .into_sourcemap()
        .to_writer(&mut json)
        .map_err(CompileError::map_encode)?;
    let json = String::from_utf8_lossy(&json).into_owned();
    debug!(bytes = json.len(), mappings = sorted.len(), "built source map");
    Ok(json)
}

fn to_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// The trailing `sourceMappingURL` comment, if one belongs in the CSS.
pub fn url_comment(json: &str, options: &CompileOptions) -> Option<String> {
    if options.embed_map {
        let encoded = STANDARD.encode(json);
        return Some(format!(
            "/*# sourceMappingURL=data:application/json;base64,{encoded} */"
        ));
    }
    match &options.map_path {
        Some(path) if !options.omit_map_url => {
            Some(format!("/*# sourceMappingURL={} */", path.display()))
        }
        _ => None,
    }
}

fn source_name(file: &SourceFile, map_dir: Option<&Path>) -> String {
    match (&file.path, map_dir) {
        (Some(path), Some(dir)) => relative_to(path, dir).display().to_string(),
        _ => file.name.clone(),
    }
}

/// `path` expressed relative to `base`; unchanged when they share no root.
fn relative_to(path: &Path, base: &Path) -> PathBuf {
    let path_parts: Vec<Component> = path.components().collect();
    let base_parts: Vec<Component> = base.components().collect();
    let common = path_parts
        .iter()
        .zip(&base_parts)
        .take_while(|(a, b)| a == b)
        .count();
    if common == 0 {
        return path.to_path_buf();
    }
    let mut out = PathBuf::new();
    for _ in common..base_parts.len() {
        out.push("..");
    }
    for part in &path_parts[common..] {
        out.push(part.as_os_str());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, MapErrorKind};

    fn mapping(gl: usize, gc: usize, sl: usize, sc: usize) -> Mapping {
        Mapping {
            generated_line: gl,
            generated_column: gc,
            source: FileId(0),
            source_line: sl,
            source_column: sc,
        }
    }

    fn stdin_file() -> Vec<SourceFile> {
        vec![SourceFile {
            name: "stdin".into(),
            path: None,
            contents: "a {\n  b: c;\n}".into(),
        }]
    }

    fn mappings_of(json: &str) -> String {
        let doc: serde_json::Value = serde_json::from_str(json).expect("json");
        doc["mappings"].as_str().expect("mappings").to_string()
    }

    #[test]
    fn mappings_are_delta_encoded() {
        let options = CompileOptions::default();
        let files = stdin_file();
        let json = build(&[mapping(0, 0, 0, 0), mapping(1, 2, 1, 2)], &files, &options, "x.css")
            .expect("map");
        assert_eq!(mappings_of(&json), "AAAA;EACE");
        let json = build(&[mapping(0, 4, 0, 4), mapping(0, 0, 0, 0)], &files, &options, "x.css")
            .expect("map");
        assert_eq!(mappings_of(&json), "AAAA,IAAI");
    }

    #[test]
    fn document_fields() {
        let options = CompileOptions::default()
            .with_map_root("/assets")
            .with_map_contents(true);
        let json = build(&[mapping(0, 0, 0, 0)], &stdin_file(), &options, "stdin.css")
            .expect("map");
        let doc: serde_json::Value = serde_json::from_str(&json).expect("json");
        assert_eq!(doc["version"], 3);
        assert_eq!(doc["file"], "stdin.css");
        assert_eq!(doc["sourceRoot"], "/assets");
        assert_eq!(doc["sources"][0], "stdin");
        assert_eq!(doc["sourcesContent"][0], "a {\n  b: c;\n}");
        assert_eq!(doc["mappings"], "AAAA");
    }

    #[test]
    fn sources_content_is_optional() {
        let json = build(&[mapping(0, 0, 0, 0)], &stdin_file(), &CompileOptions::default(), "x.css")
            .expect("map");
        assert!(!json.contains("sourcesContent"));
        assert!(!json.contains("sourceRoot"));
    }

    #[test]
    fn no_mappings_is_an_error() {
        let err = build(&[], &stdin_file(), &CompileOptions::default(), "x.css").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Map(MapErrorKind::NoSpans));
    }

    #[test]
    fn url_comment_variants() {
        let embedded = url_comment("{}", &CompileOptions::default().with_embed_map(true))
            .expect("comment");
        assert_eq!(
            embedded,
            "/*# sourceMappingURL=data:application/json;base64,e30= */"
        );

        let linked = CompileOptions::default().with_map_path("out/site.css.map");
        assert_eq!(
            url_comment("{}", &linked).as_deref(),
            Some("/*# sourceMappingURL=out/site.css.map */")
        );
        assert_eq!(url_comment("{}", &linked.with_omit_map_url(true)), None);
        assert_eq!(url_comment("{}", &CompileOptions::default()), None);
    }

    #[test]
    fn relative_source_paths() {
        assert_eq!(
            relative_to(Path::new("/a/b/c.scss"), Path::new("/a/out")),
            PathBuf::from("../b/c.scss")
        );
        assert_eq!(
            relative_to(Path::new("/a/b/c.scss"), Path::new("/a/b")),
            PathBuf::from("c.scss")
        );
    }
}
