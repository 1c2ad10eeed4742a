use std::fmt::{self, Debug, Formatter};
use std::ops::Range;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::{KindRegistry, MAX_DEPTH, MarkupKind, Mount, ScriptKind, SyntaxKind, SyntaxNode};

/// A grammar that can parse a range of a document from one of its entry
/// points.
pub trait Grammar: Send + Sync {
    /// The name under which the grammar is registered.
    fn name(&self) -> &'static str;

    /// The names of the restricted start rules the grammar can parse from.
    fn entry_points(&self) -> &'static [&'static str];

    /// The registry of the kinds the grammar produces.
    fn registry(&self) -> &'static KindRegistry;

    /// Parse `range` of `text` from the given entry point.
    ///
    /// The returned root spans exactly `range` and all its nodes carry
    /// offsets into the whole `text`.
    fn parse(&self, text: &str, range: Range<usize>, entry: &str) -> Parsed;
}

/// The result of a grammar's parse.
#[derive(Debug, Clone)]
pub struct Parsed {
    /// The root of the produced tree.
    pub root: SyntaxNode,
    /// Where the parse gave up because the nesting got too deep, if it did.
    pub overflow: Option<usize>,
}

/// The grammars available to a parse, by name.
#[derive(Clone, Default)]
pub struct GrammarSet {
    grammars: FxHashMap<&'static str, Arc<dyn Grammar>>,
}

impl GrammarSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// The document and script grammars.
    pub fn standard() -> Self {
        let mut set = Self::new();
        set.register(crate::parser::MarkupGrammar);
        set.register(crate::script::ScriptGrammar);
        set
    }

    /// Add a grammar, replacing any grammar of the same name.
    pub fn register(&mut self, grammar: impl Grammar + 'static) {
        self.grammars.insert(grammar.name(), Arc::new(grammar));
    }

    /// Remove the grammar of the given name.
    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn Grammar>> {
        self.grammars.remove(name)
    }

    /// The grammar of the given name.
    pub fn get(&self, name: &str) -> Option<&dyn Grammar> {
        self.grammars.get(name).map(|grammar| grammar.as_ref())
    }
}

impl Debug for GrammarSet {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let mut names: Vec<_> = self.grammars.keys().collect();
        names.sort();
        f.debug_set().entries(names).finish()
    }
}

/// Which grammar, and which entry point of it, reparses a node's range.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct SubgrammarChoice {
    /// The grammar's name.
    pub grammar: &'static str,
    /// The entry point.
    pub entry: &'static str,
}

impl From<SubgrammarChoice> for Mount {
    fn from(choice: SubgrammarChoice) -> Self {
        Mount { grammar: choice.grammar, entry: choice.entry }
    }
}

/// Decide which grammar should reparse nodes of the given kind in place of
/// the grammar that produced them.
pub fn dispatch(kind: SyntaxKind) -> Option<SubgrammarChoice> {
    let (grammar, entry) = match kind {
        SyntaxKind::Markup(MarkupKind::ScriptBody) => ("script", "statements"),
        SyntaxKind::Markup(MarkupKind::AttributeValue) => ("script", "expression"),
        SyntaxKind::Markup(MarkupKind::InlineAttributes) => ("script", "attributes"),
        SyntaxKind::Markup(MarkupKind::NameExpr) => ("script", "expression"),
        SyntaxKind::Markup(MarkupKind::MarkupHole) => ("markup", "document"),
        SyntaxKind::Script(ScriptKind::Embed) => ("markup", "inline"),
        _ => return None,
    };
    Some(SubgrammarChoice { grammar, entry })
}

/// Walks a tree top-down and splices in the trees of the grammars that
/// nodes are dispatched to.
pub(crate) struct Mounter<'a> {
    grammars: &'a GrammarSet,
    text: &'a str,
    /// The mounts leading to the node being visited.
    path: Vec<(SubgrammarChoice, Range<usize>)>,
    /// The first position at which nesting got too deep.
    overflow: Option<usize>,
}

impl<'a> Mounter<'a> {
    pub fn new(grammars: &'a GrammarSet, text: &'a str) -> Self {
        Self { grammars, text, path: vec![], overflow: None }
    }

    /// Where nesting got too deep, if it did.
    pub fn overflow(&self) -> Option<usize> {
        self.overflow
    }

    /// Record an overflow reported by a grammar.
    pub fn note(&mut self, overflow: Option<usize>) {
        if let Some(at) = overflow {
            self.overflow.get_or_insert(at);
        }
    }

    /// Rebuild the subtree with all dispatched nodes mounted.
    pub fn visit(&mut self, node: &SyntaxNode) -> SyntaxNode {
        if self.overflow.is_some() {
            return node.clone();
        }

        if let Some(choice) = dispatch(node.kind()) {
            return match self.mount(node, choice) {
                Some(mounted) => mounted,
                None => node.clone(),
            };
        }

        if node.children().len() == 0 {
            return node.clone();
        }

        let children = node.children().map(|child| self.visit(child)).collect();
        node.with_children(children)
    }

    fn mount(&mut self, node: &SyntaxNode, choice: SubgrammarChoice) -> Option<SyntaxNode> {
        let Some(grammar) = self.grammars.get(choice.grammar) else {
            tracing::trace!(grammar = choice.grammar, "grammar is not registered");
            return None;
        };
        if !grammar.entry_points().contains(&choice.entry) {
            tracing::trace!(grammar = choice.grammar, entry = choice.entry, "unknown entry point");
            return None;
        }

        let range = node.range();
        if self.path.iter().any(|(c, r)| *c == choice && *r == range) {
            tracing::debug!(?range, grammar = choice.grammar, "declined repeated dispatch");
            return None;
        }
        if self.path.len() >= MAX_DEPTH {
            self.overflow.get_or_insert(range.start);
            return None;
        }

        tracing::trace!(?range, grammar = choice.grammar, entry = choice.entry, "dispatch");
        let parsed = grammar.parse(self.text, range.clone(), choice.entry);
        self.note(parsed.overflow);

        self.path.push((choice, range.clone()));
        let root = self.visit(&parsed.root);
        self.path.pop();

        Some(SyntaxNode::mounted(node.kind(), range, choice.into(), root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_table() {
        let choice = |grammar, entry| Some(SubgrammarChoice { grammar, entry });
        assert_eq!(
            dispatch(MarkupKind::ScriptBody.into()),
            choice("script", "statements")
        );
        assert_eq!(
            dispatch(MarkupKind::AttributeValue.into()),
            choice("script", "expression")
        );
        assert_eq!(
            dispatch(MarkupKind::InlineAttributes.into()),
            choice("script", "attributes")
        );
        assert_eq!(dispatch(MarkupKind::MarkupHole.into()), choice("markup", "document"));
        assert_eq!(dispatch(ScriptKind::Embed.into()), choice("markup", "inline"));
        assert_eq!(dispatch(MarkupKind::Paragraph.into()), None);
        assert_eq!(dispatch(SyntaxKind::Error), None);
    }

    #[test]
    fn test_dispatch_is_pure() {
        for &kind in MarkupKind::ALL {
            assert_eq!(dispatch(kind.into()), dispatch(kind.into()));
        }
    }

    #[test]
    fn test_standard_set() {
        let set = GrammarSet::standard();
        assert_eq!(format!("{set:?}"), r#"{"markup", "script"}"#);
        let script = set.get("script").unwrap();
        assert!(script.entry_points().contains(&"attributes"));
        assert_eq!(script.registry().grammar(), "script");
        assert!(set.get("python").is_none());
    }

    #[test]
    fn test_mounts_keep_absolute_offsets() {
        let text = "| n: 1 + 2";
        let set = GrammarSet::standard();
        let value = SyntaxNode::leaf(MarkupKind::AttributeValue, "1 + 2", 5);
        let mut mounter = Mounter::new(&set, text);
        let mounted = mounter.visit(&value);
        assert_eq!(mounted.range(), 5..10);
        assert_eq!(
            mounted.mount(),
            Some(&Mount { grammar: "script", entry: "expression" })
        );
        let root = mounted.mounted_root().unwrap();
        assert!(root.is(ScriptKind::Expression));
        assert_eq!(root.range(), 5..10);
        let binary = root.find(ScriptKind::Binary).unwrap();
        assert_eq!(binary.range(), 5..10);
    }

    #[test]
    fn test_unregistered_grammar_stays_unmounted() {
        let text = "| n: 1 + 2";
        let mut set = GrammarSet::standard();
        set.unregister("script");
        let value = SyntaxNode::leaf(MarkupKind::AttributeValue, "1 + 2", 5);
        let mounted = Mounter::new(&set, text).visit(&value);
        assert_eq!(mounted, value);
    }
}
