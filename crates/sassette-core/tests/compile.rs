use std::fs;
use std::path::{Path, PathBuf};

use sassette_core::{
    compile, compile_file, version, CompileError, CompileOptions, ErrorKind, EvalErrorKind,
    ImportErrorKind, MapErrorKind, OutputStyle,
};
use tempfile::TempDir;

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/imports")
}

fn css(source: &str, options: &CompileOptions) -> String {
    compile(source, options).expect("compile").css
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create dir");
    }
    fs::write(&path, contents).expect("write fixture");
    path
}

#[test]
fn precision_zero_rounds_once_at_render() {
    let options = CompileOptions::new()
        .with_precision(0)
        .with_style(OutputStyle::Compact);
    assert_eq!(css("$x: 1; a { width: $x + 1; }", &options), "a { width: 2; }\n");
}

#[test]
fn numbers_render_with_configured_precision() {
    let options = CompileOptions::new().with_style(OutputStyle::Compact);
    assert_eq!(css("a { b: (1/3); }", &options), "a { b: 0.33333; }\n");
    let options = options.with_precision(2);
    assert_eq!(css("a { b: (1/3); c: 1.50px; }", &options), "a { b: 0.33; c: 1.5px; }\n");
}

#[test]
fn string_concatenation_rounds_numbers_like_declarations() {
    let options = CompileOptions::new().with_style(OutputStyle::Compact);
    assert_eq!(
        css("a { content: \"x\" + (1/3); width: (1/3) + \"px\"; }", &options),
        "a { content: \"x0.33333\"; width: \"0.33333px\"; }\n"
    );
    let options = options.with_precision(2);
    assert_eq!(css("a { content: \"x\" + (2/3); }", &options), "a { content: \"x0.67\"; }\n");
}

#[test]
fn oversized_precision_is_capped() {
    let options = CompileOptions::new()
        .with_style(OutputStyle::Compact)
        .with_precision(i32::MAX);
    assert_eq!(css("a { b: (1/3); c: 0.1; }", &options), "a { b: 0.333333333333333; c: 0.1; }\n");
}

#[test]
fn scientific_notation_numbers() {
    let options = CompileOptions::new().with_style(OutputStyle::Compact);
    assert_eq!(css("a { b: 1e3; c: 2.5e-1px; d: 3em; }", &options), "a { b: 1000; c: 0.25px; d: 3em; }\n");
}

#[test]
fn flat_input_renders_alike_in_every_style() {
    let source = "a { color: red; margin: 0 auto; }\nb, i { font-weight: bold; }";
    let nested = css(source, &CompileOptions::new());
    let expanded = css(source, &CompileOptions::new().with_style(OutputStyle::Expanded));
    let compact = css(source, &CompileOptions::new().with_style(OutputStyle::Compact));
    let compressed = css(source, &CompileOptions::new().with_style(OutputStyle::Compressed));

    assert_eq!(strip_whitespace(&nested), strip_whitespace(&expanded));
    assert_eq!(strip_whitespace(&nested), strip_whitespace(&compact));
    assert_eq!(
        compressed,
        "a{color:red;margin:0 auto}b,i{font-weight:bold}"
    );
}

#[test]
fn nesting_flattens_selectors() {
    let out = css(
        "a { b { color: red; } }",
        &CompileOptions::new().with_style(OutputStyle::Compact),
    );
    assert_eq!(out, "a b { color: red; }\n");
}

#[test]
fn ampersand_is_replaced_by_parent() {
    let out = css(
        ".btn { &:hover { color: blue; } }",
        &CompileOptions::new().with_style(OutputStyle::Compact),
    );
    assert_eq!(out, ".btn:hover { color: blue; }\n");
}

#[test]
fn unresolved_import_names_path_and_empty_search_list() {
    let err = compile("@import \"missing\";", &CompileOptions::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Import(ImportErrorKind::NotFound));
    match &err {
        CompileError::Import { path, searched, .. } => {
            assert_eq!(path, "missing");
            assert!(searched.is_empty());
        }
        other => panic!("expected import error, got {other:?}"),
    }
    assert!(err.to_string().contains("missing"));
}

#[test]
fn compressed_drops_comments_even_when_requested() {
    let options = CompileOptions::new()
        .with_style(OutputStyle::Compressed)
        .with_comments(true);
    let out = css("/* banner */\na { /* inline */ color: red; // silent\n }", &options);
    assert_eq!(out, "a{color:red}");
    assert!(!out.contains("/*"));
}

#[test]
fn comments_are_kept_when_requested() {
    let options = CompileOptions::new()
        .with_style(OutputStyle::Expanded)
        .with_comments(true);
    let out = css("/* banner */\na { color: red; }", &options);
    assert_eq!(out, "/* banner */\n\n/* line 2, stdin */\na {\n  color: red;\n}\n");
}

#[test]
fn cyclic_imports_fail() {
    let dir = TempDir::new().expect("tempdir");
    let a = write(dir.path(), "a.scss", "@import \"b\";\n.a { x: 1; }\n");
    write(dir.path(), "b.scss", "@import \"a\";\n.b { x: 2; }\n");

    let err = compile_file(&a, &CompileOptions::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Import(ImportErrorKind::Cycle));
}

#[test]
fn compile_file_resolves_relative_and_include_path_imports() {
    let dir = TempDir::new().expect("tempdir");
    let vendor = dir.path().join("vendor");
    write(&vendor, "_grid.scss", "$columns: 12;\n");
    write(dir.path(), "partials/_base.scss", "body { margin: 0; }\n");
    let entry = write(
        dir.path(),
        "site.scss",
        "@import \"partials/base\", \"grid\";\n.col { width: percentage(1 / $columns); }\n",
    );

    let options = CompileOptions::new()
        .with_style(OutputStyle::Compact)
        .with_precision(3)
        .with_include_path(&vendor);
    let out = compile_file(&entry, &options).expect("compile");
    assert_eq!(out.css, "body { margin: 0; }\n.col { width: 8.333%; }\n");
    assert!(out.source_map.is_none());
}

#[test]
fn include_path_list_is_split() {
    let dir = TempDir::new().expect("tempdir");
    let first = dir.path().join("one");
    let second = dir.path().join("two");
    write(&second, "_theme.scss", "$brand: #c0ffee;\n");

    let list = std::env::join_paths([&first, &second]).expect("join paths");
    let options = CompileOptions::new()
        .with_style(OutputStyle::Compact)
        .with_include_path_list(&list.to_string_lossy());
    assert_eq!(options.include_paths, vec![first, second]);
    let out = css("@import \"theme\";\na { color: $brand; }", &options);
    assert_eq!(out, "a { color: #c0ffee; }\n");
}

#[test]
fn fixture_tree_compiles() {
    let options = CompileOptions::new().with_style(OutputStyle::Compact);
    let out = compile_file(fixture_dir().join("main.scss"), &options).expect("compile");
    assert_eq!(
        out.css,
        ".button { background: #0066cc; }\n.button:hover { background: #004d99; }\nbody { color: #333; }\n"
    );
}

#[test]
fn missing_entry_file_is_not_found() {
    let err = compile_file("/definitely/not/here.scss", &CompileOptions::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Import(ImportErrorKind::NotFound));
    assert_eq!(
        err.to_string(),
        "File /definitely/not/here.scss could not be found"
    );
}

#[test]
fn negative_precision_is_rejected_before_compiling() {
    let err = compile("a { b: c; }", &CompileOptions::new().with_precision(-1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn undefined_variable_reports_position() {
    let err = compile("a {\n  width: $missing;\n}", &CompileOptions::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Eval(EvalErrorKind::UndefinedVariable));
    assert_eq!(err.to_string(), "stdin:2:10: Undefined variable: \"$missing\"");
}

#[test]
fn lex_and_parse_errors_surface() {
    let err = compile("a { content: \"open; }", &CompileOptions::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Lex);
    let err = compile("a { color: red;", &CompileOptions::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
}

#[test]
fn embedded_map_is_appended_as_data_uri() {
    let options = CompileOptions::new().with_embed_map(true);
    let result = compile("a {\n  b: c;\n}", &options).expect("compile");
    let map: serde_json::Value =
        serde_json::from_str(&result.source_map.expect("source map")).expect("json");
    assert_eq!(map["mappings"], "AAAA;EACE");
    assert!(result
        .css
        .starts_with("a {\n  b: c; }\n/*# sourceMappingURL=data:application/json;base64,"));
    assert!(result.css.ends_with(" */"));
}

#[test]
fn map_path_links_the_map_and_embeds_sources() {
    let dir = TempDir::new().expect("tempdir");
    let entry = write(dir.path(), "src/app.scss", "a { b: c; }\n");
    let options = CompileOptions::new().with_map_path(dir.path().join("app.css.map"));

    let result = compile_file(&entry, &options).expect("compile");
    let map: serde_json::Value =
        serde_json::from_str(result.source_map.as_deref().expect("map")).expect("json");
    assert_eq!(map["file"], "app.css");
    assert_eq!(map["sources"][0], "src/app.scss");
    assert_eq!(map["sourcesContent"][0], "a { b: c; }\n");
    assert!(result.css.contains("/*# sourceMappingURL="));

    let quiet = compile_file(&entry, &options.clone().with_omit_map_url(true)).expect("compile");
    assert!(!quiet.css.contains("sourceMappingURL"));
    assert!(quiet.source_map.is_some());
}

#[test]
fn map_requested_for_empty_output_fails() {
    let err = compile("$only: variables;", &CompileOptions::new().with_embed_map(true)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Map(MapErrorKind::NoSpans));
}

#[test]
fn options_load_from_json() {
    let dir = TempDir::new().expect("tempdir");
    let path = write(
        dir.path(),
        "options.json",
        r#"{ "style": "compressed", "precision": 2, "includePaths": ["lib"] }"#,
    );
    let options = CompileOptions::load(&path).expect("load options");
    assert_eq!(options.style, OutputStyle::Compressed);
    assert_eq!(options.precision, 2);
    assert_eq!(options.include_paths, vec![PathBuf::from("lib")]);
    assert!(!options.comments);

    let bad = write(dir.path(), "bad.json", "{ style: }");
    assert_eq!(CompileOptions::load(&bad).unwrap_err().kind(), ErrorKind::Config);
}

#[test]
fn integer_style_constants() {
    assert_eq!(OutputStyle::try_from(3_i64).expect("style"), OutputStyle::Compressed);
    assert_eq!(OutputStyle::try_from(7_i64).unwrap_err().kind(), ErrorKind::Config);
}

#[test]
fn media_bubbles_and_plain_css_imports_pass_through() {
    let options = CompileOptions::new().with_style(OutputStyle::Compact);
    let out = css(
        "@import url(reset.css);\n.nav { display: flex; @media (max-width: 600px) { display: block; } }",
        &options,
    );
    assert_eq!(
        out,
        "@import url(reset.css);\n.nav { display: flex; }\n@media (max-width: 600px) { .nav { display: block; } }\n"
    );
}

#[test]
fn compiles_concurrently_with_shared_options() {
    let options = CompileOptions::new().with_style(OutputStyle::Compressed);
    let outputs: Vec<String> = std::thread::scope(|scope| {
        let handles: Vec<_> = (1..=8)
            .map(|n| {
                let options = &options;
                scope.spawn(move || {
                    let source = format!("$n: {n}; .c{n} {{ width: $n * 10px; }}");
                    compile(&source, options).expect("compile").css
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread"))
            .collect()
    });
    for (i, out) in outputs.iter().enumerate() {
        let n = i + 1;
        assert_eq!(out, &format!(".c{n}{{width:{}px}}", n * 10));
    }
}

#[test]
fn version_is_reported() {
    assert_eq!(version(), env!("CARGO_PKG_VERSION"));
}
