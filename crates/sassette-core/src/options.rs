use crate::error::{CompileError, Result};
use crate::value::MAX_PRECISION;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStyle {
    #[default]
    Nested,
    Expanded,
    Compact,
    Compressed,
}

impl OutputStyle {
    pub fn name(self) -> &'static str {
        match self {
            Self::Nested => "nested",
            Self::Expanded => "expanded",
            Self::Compact => "compact",
            Self::Compressed => "compressed",
        }
    }
}

impl fmt::Display for OutputStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Numeric style constants as exposed by libsass bindings.
impl TryFrom<i64> for OutputStyle {
    type Error = CompileError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Self::Nested),
            1 => Ok(Self::Expanded),
            2 => Ok(Self::Compact),
            3 => Ok(Self::Compressed),
            other => Err(CompileError::config(format!("unknown output style {other}"))),
        }
    }
}

impl FromStr for OutputStyle {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nested" => Ok(Self::Nested),
            "expanded" => Ok(Self::Expanded),
            "compact" => Ok(Self::Compact),
            "compressed" => Ok(Self::Compressed),
            other => Err(CompileError::config(format!("unknown output style '{other}'"))),
        }
    }
}

/// Settings for one compile call. Read-only once handed to
/// [`compile`](crate::compile), so a single value can be shared by
/// concurrent invocations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompileOptions {
    pub style: OutputStyle,
    /// Keep `/* */` comments and prefix each rule with a `/* line N, file */`
    /// marker. Ignored by the compressed style.
    pub comments: bool,
    pub map_path: Option<PathBuf>,
    pub include_paths: Vec<PathBuf>,
    pub precision: i32,
    pub embed_map: bool,
    /// Embed the original sources in `sourcesContent`.
    pub map_contents: bool,
    /// Emitted as `sourceRoot`.
    pub map_root: Option<String>,
    /// Leave out the trailing `sourceMappingURL` comment.
    pub omit_map_url: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            style: OutputStyle::Nested,
            comments: false,
            map_path: None,
            include_paths: Vec::new(),
            precision: 5,
            embed_map: false,
            map_contents: false,
            map_root: None,
            omit_map_url: false,
        }
    }
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load options from a JSON file. Missing keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|e| {
            CompileError::config(format!("could not read {}: {}", path.display(), e))
        })?;

        Self::from_json(&data)
            .map_err(|e| CompileError::config(format!("invalid options in {}: {}", path.display(), e)))
    }

    pub fn from_json(data: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }

    pub fn with_style(mut self, style: OutputStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_comments(mut self, comments: bool) -> Self {
        self.comments = comments;
        self
    }

    pub fn with_map_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.map_path = Some(path.into());
        self
    }

    pub fn with_include_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_paths.push(dir.into());
        self
    }

    /// Append every directory of a platform path list (`a:b` on Unix,
    /// `a;b` on Windows).
    pub fn with_include_path_list(mut self, list: &str) -> Self {
        self.include_paths.extend(
            std::env::split_paths(list).filter(|dir| !dir.as_os_str().is_empty()),
        );
        self
    }

    pub fn with_precision(mut self, precision: i32) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_embed_map(mut self, embed: bool) -> Self {
        self.embed_map = embed;
        self
    }

    pub fn with_map_contents(mut self, contents: bool) -> Self {
        self.map_contents = contents;
        self
    }

    pub fn with_map_root(mut self, root: impl Into<String>) -> Self {
        self.map_root = Some(root.into());
        self
    }

    pub fn with_omit_map_url(mut self, omit: bool) -> Self {
        self.omit_map_url = omit;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.precision < 0 {
            return Err(CompileError::config(format!(
                "precision must be zero or positive, got {}",
                self.precision
            )));
        }
        Ok(())
    }

    /// Precision as a digit count, capped at [`MAX_PRECISION`]. Only
    /// meaningful after [`validate`](Self::validate).
    pub fn digits(&self) -> usize {
        usize::try_from(self.precision)
            .unwrap_or(0)
            .min(MAX_PRECISION)
    }

    pub fn wants_source_map(&self) -> bool {
        self.map_path.is_some() || self.embed_map
    }

    /// A map written next to the CSS always carries its sources.
    pub fn wants_sources_content(&self) -> bool {
        self.map_contents || self.map_path.is_some()
    }

    pub fn emits_comments(&self) -> bool {
        self.comments && self.style != OutputStyle::Compressed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_binding() {
        let options = CompileOptions::default();
        assert_eq!(options.style, OutputStyle::Nested);
        assert!(!options.comments);
        assert_eq!(options.map_path, None);
        assert!(options.include_paths.is_empty());
        assert_eq!(options.precision, 5);
        assert!(!options.embed_map);
        assert!(!options.wants_source_map());
    }

    #[test]
    fn style_from_binding_constants() {
        assert_eq!(OutputStyle::try_from(0_i64).unwrap(), OutputStyle::Nested);
        assert_eq!(OutputStyle::try_from(3_i64).unwrap(), OutputStyle::Compressed);
        assert!(OutputStyle::try_from(4_i64).is_err());
        assert_eq!("Compact".parse::<OutputStyle>().unwrap(), OutputStyle::Compact);
    }

    #[test]
    fn negative_precision_is_rejected() {
        let err = CompileOptions::new().with_precision(-1).validate().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Config);
    }

    #[test]
    fn digits_are_capped() {
        assert_eq!(CompileOptions::new().with_precision(3).digits(), 3);
        assert_eq!(CompileOptions::new().with_precision(i32::MAX).digits(), MAX_PRECISION);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let options =
            CompileOptions::from_json(r#"{"style": "compressed", "includePaths": ["a", "b"]}"#)
                .expect("parse options");
        assert_eq!(options.style, OutputStyle::Compressed);
        assert_eq!(options.include_paths, vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert_eq!(options.precision, 5);
    }

    #[test]
    fn load_reads_json_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("options.json");
        fs::write(&path, r#"{"precision": 3, "embedMap": true}"#).expect("write options");
        let options = CompileOptions::load(&path).expect("load options");
        assert_eq!(options.precision, 3);
        assert!(options.embed_map);
        assert!(options.wants_source_map());
    }

    #[test]
    fn load_reports_missing_file_as_config_error() {
        let err = CompileOptions::load("/definitely/not/here.json").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Config);
    }

    #[test]
    fn include_path_list_is_split() {
        let list = std::env::join_paths(["one", "two"]).expect("join paths");
        let options = CompileOptions::new().with_include_path_list(&list.to_string_lossy());
        assert_eq!(options.include_paths, vec![PathBuf::from("one"), PathBuf::from("two")]);
    }

    #[test]
    fn map_path_implies_sources_content() {
        let options = CompileOptions::new().with_map_path("out.css.map");
        assert!(options.wants_sources_content());
        assert!(options.wants_source_map());
    }

    #[test]
    fn compressed_never_emits_comments() {
        let options = CompileOptions::new()
            .with_comments(true)
            .with_style(OutputStyle::Compressed);
        assert!(!options.emits_comments());
    }
}
