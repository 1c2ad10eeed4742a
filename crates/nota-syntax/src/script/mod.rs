//! The embedded script grammar, a subset of JavaScript.

mod lexer;
mod parser;

use std::ops::Range;

use crate::{Grammar, KindRegistry, Parsed, ScriptKind, SyntaxNode};

/// The grammar of script blocks, attribute values and attribute lists.
#[derive(Debug, Copy, Clone, Default)]
pub struct ScriptGrammar;

impl Grammar for ScriptGrammar {
    fn name(&self) -> &'static str {
        "script"
    }

    fn entry_points(&self) -> &'static [&'static str] {
        &["statements", "expression", "attributes"]
    }

    fn registry(&self) -> &'static KindRegistry {
        KindRegistry::script()
    }

    #[tracing::instrument(name = "script", skip(self, text))]
    fn parse(&self, text: &str, range: Range<usize>, entry: &str) -> Parsed {
        let output = match entry {
            "statements" => parser::statements(text, range),
            "expression" => parser::expression(text, range),
            "attributes" => parser::attributes(text, range),
            _ => {
                let message = ecow::eco_format!("unknown script entry point `{entry}`");
                let node = SyntaxNode::error(message, &text[range.clone()], range.start);
                let root = SyntaxNode::inner(ScriptKind::Statements, vec![node]);
                return Parsed { root, overflow: None };
            }
        };
        Parsed { root: output.node, overflow: output.overflow }
    }
}
