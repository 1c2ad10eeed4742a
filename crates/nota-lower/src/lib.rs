//! Lowering of Nota documents into component programs.
//!
//! A parsed document becomes a JavaScript module whose default export is a
//! component rendering the document with an element factory. Every lowered
//! node records where it came from, so positions in the program can be
//! mapped back to the document through a [`SourceMap`].

mod config;
mod diag;
mod js;
mod lower;
mod optimize;
mod print;
mod program;
mod script;
mod sourcemap;

pub use self::config::{LowerConfig, LowerOptions};
pub use self::diag::{LowerError, LowerResult, SourceDiagnostic};
pub use self::sourcemap::{Mapping, SourceMap};

use ecow::{EcoString, eco_format};
use nota_syntax::SyntaxNode;
use nota_syntax::ast::{AstNode, Markup};

use crate::lower::Lowerer;

/// A lowered document.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Lowered {
    /// The program text.
    pub program: String,
    /// Maps positions in the program to positions in the document.
    pub source_map: SourceMap,
    /// The modules imported by the document's scripts, in order of first
    /// import.
    pub imports: Vec<EcoString>,
}

/// Lower a parsed document into a program.
///
/// Fails with every problem in the tree if it contains syntax errors, since
/// a program lowered from a broken tree would be misleading.
#[tracing::instrument(skip_all, fields(len = text.len()))]
pub fn lower(text: &str, root: &SyntaxNode, options: &LowerOptions) -> LowerResult<Lowered> {
    let errors = root.errors();
    if !errors.is_empty() {
        tracing::debug!(count = errors.len(), "document has syntax errors");
        return Err(LowerError::new(text, errors.into_iter().map(SourceDiagnostic::from)));
    }

    let Some(markup) = Markup::from_untyped(root) else {
        let diag = SourceDiagnostic::error(root.range(), "expected a document")
            .with_hint(eco_format!("found {}", root.kind().name()));
        return Err(LowerError::new(text, [diag]));
    };

    let mut lowerer = Lowerer::new(text, &options.config);
    let (props, body) = lowerer.document(markup);
    if !lowerer.errors.is_empty() {
        return Err(LowerError::new(text, lowerer.errors));
    }

    let doc = program::document(props, body);
    let (program, mappings) = program::print(&lowerer, &doc);
    let imports = lowerer.modules.keys().cloned().collect();
    Ok(Lowered { program, source_map: SourceMap::new(mappings), imports })
}

/// Parse and lower a document.
pub fn compile(text: &str, options: &LowerOptions) -> LowerResult<Lowered> {
    let root = nota_syntax::parse(text)
        .map_err(|error| LowerError::new(text, [SourceDiagnostic::from(error)]))?;
    lower(text, &root, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_ok(text: &str) -> Lowered {
        match compile(text, &LowerOptions::default()) {
            Ok(lowered) => lowered,
            Err(err) => panic!("failed to lower {text:?}:\n{err}"),
        }
    }

    #[test]
    fn test_hello_world() {
        let lowered = compile_ok("@h1{Hello world!}");
        assert!(lowered.program.contains(r#"el("h1", {}, "Hello world!")"#), "{}", lowered.program);
        assert_eq!(lowered.source_map.mappings()[0], Mapping { generated: 0, original: 0 });
    }

    #[test]
    fn test_attribute_values_are_script() {
        let lowered = compile_ok("@Box: x\n  | count: 1 + 2\n");
        assert!(lowered.program.contains("count: 1 + 2"), "{}", lowered.program);
        assert!(!lowered.program.contains("\"1 + 2\""));
    }

    #[test]
    fn test_script_errors_abort() {
        let err = compile("% let = 1\n\nText", &LowerOptions::default()).unwrap_err();
        assert!(!err.diagnostics.is_empty());
        assert!(err.diagnostics.iter().all(|diag| diag.position.is_some()));
        assert_eq!(err.diagnostics[0].position.map(|(line, _)| line), Some(0));
    }

    #[test]
    fn test_lowering_errors_abort() {
        let err = compile("#0", &LowerOptions::default()).unwrap_err();
        assert_eq!(err.diagnostics[0].message, "positional arguments start at 1");
        assert_eq!(err.to_string().lines().next(), Some("error at 1:1: positional arguments start at 1"));
    }

    #[test]
    fn test_imports_are_reported() {
        let lowered = compile_ok("% import { x } from \"lib\"\n% import y from \"other\"\n\n#x #y\n");
        assert_eq!(lowered.imports, ["lib", "other"]);
        let import = lowered.program.find("import { x } from \"lib\";").unwrap();
        let default = lowered.program.find("export default").unwrap();
        assert!(import < default);
    }

    #[test]
    fn test_escaped_introducer() {
        let lowered = compile_ok(r"Mail \@x");
        assert!(lowered.program.contains(r#"el("p", {}, "Mail @x")"#), "{}", lowered.program);
    }

    #[test]
    fn test_mappings_point_into_the_document() {
        let text = "Intro\n\n@em{hi}";
        let lowered = compile_ok(text);
        let at = lowered.program.find("el(\"em\"").unwrap();
        assert_eq!(lowered.source_map.original(at), Some(7));

        let mappings = lowered.source_map.mappings();
        assert!(mappings.windows(2).all(|pair| pair[0].generated <= pair[1].generated));
        assert!(mappings.iter().all(|mapping| mapping.original <= text.len()));
    }

    #[test]
    fn test_mappings_follow_script() {
        let text = "% let answer = 42\n\n#answer";
        let lowered = compile_ok(text);
        let at = lowered.program.find("answer = 42").unwrap();
        assert_eq!(lowered.source_map.original(at), Some(6));
    }

    #[test]
    fn test_source_map_json() {
        let text = "Hello";
        let options = LowerOptions {
            file_name_hint: Some("hello.nota".into()),
            ..LowerOptions::default()
        };
        let lowered = compile(text, &options).unwrap();
        let json = lowered.source_map.to_json(&lowered.program, text, &options);
        assert_eq!(json["sources"][0], "hello.nota");
        assert!(json["mappings"].as_str().unwrap().starts_with("AAAA"));
    }

    #[test]
    fn test_config_from_toml() {
        let config = LowerConfig::from_toml("runtime = \"preact\"\nstylesheets = []\n").unwrap();
        let options = LowerOptions { config, ..LowerOptions::default() };
        let lowered = compile("Hi", &options).unwrap();
        assert!(lowered.program.starts_with(
            "import { createElement as el, Fragment } from \"preact\";\n"
        ));
        assert!(!lowered.program.contains(".css"));
    }

    #[test]
    fn test_literal_text_round_trips() {
        let text = "Plain words, spread over\ntwo lines.";
        let lowered = compile_ok(text);
        assert!(lowered.program.contains(r#""Plain words, spread over\ntwo lines.""#));
    }
}
