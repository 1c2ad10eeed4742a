use std::fmt::{self, Display, Formatter};
use std::ops::Range;

use ecow::{EcoString, eco_format};
use unicode_segmentation::UnicodeSegmentation;

use crate::block::{self, split_lines};
use crate::dispatch::Mounter;
use crate::inline::{self, InlineMode};
use crate::{Grammar, GrammarSet, KindRegistry, MarkupKind, Parsed, SyntaxNode};

/// Parse a Nota document with the standard grammars.
///
/// Malformed input never fails: unresolved delimiters degrade to text and
/// syntax errors of embedded scripts become error nodes in the tree. The only
/// error is nesting that is too deep to parse.
pub fn parse(text: &str) -> Result<SyntaxNode, ParseError> {
    parse_with(&GrammarSet::standard(), text)
}

/// Parse a Nota document, dispatching embedded regions to the given grammars.
///
/// Regions whose grammar is not part of the set stay unparsed leaves.
#[tracing::instrument(skip_all, fields(len = text.len()))]
pub fn parse_with(grammars: &GrammarSet, text: &str) -> Result<SyntaxNode, ParseError> {
    let Some(markup) = grammars.get("markup") else {
        return Err(ParseError::new(text, 0, "the document grammar is not registered"));
    };

    let parsed = markup.parse(text, 0..text.len(), "document");
    let mut mounter = Mounter::new(grammars, text);
    mounter.note(parsed.overflow);
    let root = mounter.visit(&parsed.root);

    if let Some(offset) = mounter.overflow() {
        tracing::debug!(offset, "nesting is too deep");
        return Err(ParseError::new(text, offset, "maximum nesting depth exceeded"));
    }

    Ok(root)
}

/// The grammar of Nota documents.
#[derive(Debug, Copy, Clone, Default)]
pub struct MarkupGrammar;

impl Grammar for MarkupGrammar {
    fn name(&self) -> &'static str {
        "markup"
    }

    fn entry_points(&self) -> &'static [&'static str] {
        &["document", "inline"]
    }

    fn registry(&self) -> &'static KindRegistry {
        KindRegistry::markup()
    }

    fn parse(&self, text: &str, range: Range<usize>, entry: &str) -> Parsed {
        match entry {
            "inline" => {
                let segments = split_lines(text, range.clone());
                let output = inline::inline(text, segments, InlineMode::Markup, 0);
                let root = if output.nodes.is_empty() {
                    SyntaxNode::empty(MarkupKind::Inline, range.start)
                } else {
                    SyntaxNode::inner(MarkupKind::Inline, output.nodes)
                };
                Parsed { root, overflow: output.overflow }
            }
            _ => {
                let output = block::document(text, range, 0);
                Parsed { root: output.node, overflow: output.overflow }
            }
        }
    }
}

/// The number of graphemes shown on each side of an error position.
const SNIPPET_GRAPHEMES: usize = 16;

/// A document that could not be parsed at all.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ParseError {
    /// The byte offset at which parsing failed.
    pub offset: usize,
    /// What went wrong.
    pub message: EcoString,
    /// The text right before the offset.
    pub prefix: EcoString,
    /// The text starting at the offset.
    pub suffix: EcoString,
}

impl ParseError {
    /// Create an error at `offset` of `text`, capturing the surrounding text.
    pub fn new(text: &str, offset: usize, message: impl Into<EcoString>) -> Self {
        let mut offset = offset.min(text.len());
        while !text.is_char_boundary(offset) {
            offset -= 1;
        }

        let before = &text[..offset];
        let start = before
            .grapheme_indices(true)
            .rev()
            .take(SNIPPET_GRAPHEMES)
            .last()
            .map_or(offset, |(i, _)| i);
        let after = &text[offset..];
        let end = after
            .grapheme_indices(true)
            .nth(SNIPPET_GRAPHEMES)
            .map_or(text.len(), |(i, _)| offset + i);

        Self {
            offset,
            message: message.into(),
            prefix: text[start..offset].into(),
            suffix: text[offset..end].into(),
        }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let mut graphemes = self.suffix.graphemes(true);
        let at = graphemes.next().unwrap_or_default();
        write!(
            f,
            "{} at byte {}: \"{}>>>{}<<<{}\"",
            self.message,
            self.offset,
            self.prefix.escape_debug(),
            at.escape_debug(),
            graphemes.as_str().escape_debug(),
        )
    }
}

impl std::error::Error for ParseError {}

impl From<ParseError> for EcoString {
    fn from(error: ParseError) -> Self {
        eco_format!("{error}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MAX_DEPTH, Mount, ScriptKind, SyntaxKind};

    fn leaves(node: &SyntaxNode) -> String {
        node.leaves().map(|leaf| leaf.text().as_str()).collect()
    }

    /// Find the first node of the given kind in pre-order.
    fn find(node: &SyntaxNode, kind: impl Into<SyntaxKind>) -> Option<SyntaxNode> {
        let kind = kind.into();
        if node.kind() == kind {
            return Some(node.clone());
        }
        node.children().find_map(|child| find(child, kind))
    }

    fn count(node: &SyntaxNode, kind: SyntaxKind) -> usize {
        usize::from(node.kind() == kind)
            + node.children().map(|child| count(child, kind)).sum::<usize>()
    }

    /// Check the containment invariant of the whole tree.
    fn check_ranges(node: &SyntaxNode) {
        let mut cursor = node.start();
        for child in node.children() {
            assert!(child.start() >= cursor, "overlap at {:?}", child.range());
            assert!(child.end() <= node.end(), "escapes parent at {:?}", child.range());
            cursor = child.end();
            check_ranges(child);
        }
    }

    #[test]
    fn test_literal_round_trip() {
        for text in [
            "",
            "Hello world!",
            "# Title\n\nSome *strong* and _em_ text.\n\n- a\n- [x] b\n",
            "> quoted\n> more\n\n1. one\n2. two\n",
            "| a | b |\n|---|:-:|\n| 1 | 2 |\n",
            "```rust\nfn main() {}\n```\n",
            "a | b\n\ntrailing   \n\n\n",
            "tabs\tand\r\nwindows\r\nlines",
        ] {
            let root = parse(text).unwrap();
            assert_eq!(leaves(&root), text);
            assert_eq!(root.range(), 0..text.len());
            check_ranges(&root);
        }
    }

    #[test]
    fn test_mixed_round_trip() {
        let text = "%%%\nconst x = @em{hi} + 1\n%%%\n\
                    | title: `${x}`\n\
                    @Box[w: 2]{\n  # Inner\n}\n\
                    see #x and @f[a: [1, 2]]{b}\n";
        let root = parse(text).unwrap();
        assert_eq!(leaves(&root), text);
        check_ranges(&root);
        assert!(!root.erroneous(), "{:?}", root.errors());
    }

    #[test]
    fn test_escape_neutralizes_introducers() {
        for c in ['@', '#', '%', '&'] {
            let text = format!("\\{c}x");
            let root = parse(&text).unwrap();
            assert_eq!(count(&root, MarkupKind::InlineComponent.into()), 0);
            assert_eq!(count(&root, MarkupKind::Interpolation.into()), 0);
            assert_eq!(count(&root, MarkupKind::Reference.into()), 0);
            assert_eq!(count(&root, MarkupKind::Script.into()), 0);
            assert_eq!(leaves(&root), text);
        }
    }

    #[test]
    fn test_unclosed_component_is_incomplete() {
        let root = parse("@foo{bar").unwrap();
        let component = find(&root, MarkupKind::InlineComponent).unwrap();
        assert_eq!(component.end(), 8);
        assert!(!root.erroneous());
    }

    #[test]
    fn test_multi_line_attribute() {
        let text = "| key:\n  line one\n  line two\n";
        let root = parse(text).unwrap();
        assert_eq!(count(&root, MarkupKind::Attribute.into()), 1);
        let value = find(&root, MarkupKind::AttributeValue).unwrap();
        assert_eq!(&text[value.range()], "line one\n  line two");
    }

    #[test]
    fn test_attribute_value_is_an_expression() {
        let root = parse("| count: 1 + 2").unwrap();
        let value = find(&root, MarkupKind::AttributeValue).unwrap();
        assert_eq!(value.mount(), Some(&Mount { grammar: "script", entry: "expression" }));
        let binary = find(&value, ScriptKind::Binary).unwrap();
        assert_eq!(binary.range(), 9..14);
    }

    #[test]
    fn test_single_pipe_is_not_a_table() {
        let root = parse("a | b").unwrap();
        assert_eq!(count(&root, MarkupKind::Table.into()), 0);
        assert_eq!(count(&root, MarkupKind::Paragraph.into()), 1);
    }

    #[test]
    fn test_document_in_script_in_document() {
        let text = "| x: f(@em{*hi*})";
        let root = parse(text).unwrap();
        let embed = find(&root, ScriptKind::Embed).unwrap();
        assert_eq!(embed.mount(), Some(&Mount { grammar: "markup", entry: "inline" }));
        assert_eq!(&text[embed.range()], "@em{*hi*}");
        let strong = find(&embed, MarkupKind::Emph).unwrap();
        assert_eq!(&text[strong.range()], "*hi*");
    }

    #[test]
    fn test_script_errors_are_embedded() {
        let root = parse("| x: 1 +").unwrap();
        let errors = root.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "expected expression");
        assert_eq!(errors[0].range, 8..8);
    }

    #[test]
    fn test_unregistered_grammar_leaves_text() {
        let mut grammars = GrammarSet::standard();
        grammars.unregister("script");
        let root = parse_with(&grammars, "| n: 1 + 2").unwrap();
        let value = find(&root, MarkupKind::AttributeValue).unwrap();
        assert_eq!(value.mount(), None);
        assert_eq!(value.text(), "1 + 2");
    }

    #[test]
    fn test_missing_document_grammar() {
        let error = parse_with(&GrammarSet::new(), "x").unwrap_err();
        assert_eq!(error.offset, 0);
    }

    #[test]
    fn test_deep_nesting_is_an_error() {
        let depth = MAX_DEPTH + 8;
        let text = format!("{}x{}", "@a{".repeat(depth), "}".repeat(depth));
        let error = parse(&text).unwrap_err();
        assert_eq!(error.message, "maximum nesting depth exceeded");
        assert!(error.offset < text.len());
    }

    #[test]
    fn test_deep_emphasis_and_links_are_errors() {
        let n = 20_000;
        for text in [
            format!("{}x{}", "*a ".repeat(n), " a*".repeat(n)),
            format!("{}x{}", "[".repeat(n), "](u)".repeat(n)),
        ] {
            let error = parse(&text).unwrap_err();
            assert_eq!(error.message, "maximum nesting depth exceeded");
        }

        let text = format!("{}x{}", "*a ".repeat(100), " a*".repeat(100));
        let root = parse(&text).unwrap();
        assert_eq!(count(&root, MarkupKind::Emph.into()), 100);
        assert_eq!(leaves(&root), text);
    }

    #[test]
    fn test_verbatim_body_across_lines() {
        let text = "a @x{|b\nc|} d";
        let root = parse(text).unwrap();
        assert_eq!(leaves(&root), text);
        check_ranges(&root);
        let verbatim = find(&root, MarkupKind::VerbatimText).unwrap();
        assert_eq!(verbatim.text(), "b\nc");
        assert_eq!(count(&root, MarkupKind::Newline.into()), 0);
    }

    #[test]
    fn test_parse_error_display() {
        let error = ParseError::new("let e\u{301} = 1", 4, "oops");
        assert_eq!(error.prefix, "let ");
        assert_eq!(error.to_string(), "oops at byte 4: \"let >>>e\u{301}<<< = 1\"");

        let error = ParseError::new("ab\ncd", 5, "end");
        assert_eq!(error.to_string(), "end at byte 5: \"ab\\ncd>>><<<\"");
    }
}
