use std::fmt::{self, Debug, Formatter};
use std::ops::Range;
use std::sync::Arc;

use ecow::{EcoString, EcoVec, eco_format};

use crate::SyntaxKind;

/// A node in the untyped syntax tree.
///
/// Every node knows its absolute byte range in the original source, also when
/// it was produced by a grammar that only parsed a slice of that source.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct SyntaxNode(Repr);

/// The three internal representations.
#[derive(Clone, Eq, PartialEq, Hash)]
enum Repr {
    /// A leaf node.
    Leaf(LeafNode),
    /// A reference-counted inner node.
    Inner(Arc<InnerNode>),
    /// An error node.
    Error(Arc<ErrorNode>),
}

impl SyntaxNode {
    /// Create a new leaf node starting at the byte offset `start`.
    pub fn leaf(kind: impl Into<SyntaxKind>, text: impl Into<EcoString>, start: usize) -> Self {
        Self(Repr::Leaf(LeafNode::new(kind.into(), text.into(), start)))
    }

    /// Create a new inner node with children.
    ///
    /// The node spans from the start of its first to the end of its last
    /// child. Use [`empty`](Self::empty) for nodes without children.
    #[track_caller]
    pub fn inner(kind: impl Into<SyntaxKind>, children: Vec<SyntaxNode>) -> Self {
        debug_assert!(!children.is_empty(), "inner node without children");
        let start = children.first().map_or(0, SyntaxNode::start);
        let end = children.last().map_or(start, SyntaxNode::end);
        Self::inner_in(kind.into(), start..end, children)
    }

    /// Create a new inner node without children at the byte offset `at`.
    pub fn empty(kind: impl Into<SyntaxKind>, at: usize) -> Self {
        Self::inner_in(kind.into(), at..at, vec![])
    }

    /// Create a new error node starting at the byte offset `start`.
    pub fn error(
        message: impl Into<EcoString>,
        text: impl Into<EcoString>,
        start: usize,
    ) -> Self {
        let text = text.into();
        let range = start..start + text.len();
        Self(Repr::Error(Arc::new(ErrorNode {
            error: SyntaxError::new(message, range),
            text,
        })))
    }

    /// Wrap the root of a foreign grammar's parse as the single child of a
    /// node of the given kind spanning `range`.
    pub fn mounted(
        kind: impl Into<SyntaxKind>,
        range: Range<usize>,
        mount: Mount,
        root: SyntaxNode,
    ) -> Self {
        let mut inner = InnerNode::new(kind.into(), range, vec![root]);
        inner.mount = Some(mount);
        Self(Repr::Inner(Arc::new(inner)))
    }

    fn inner_in(kind: SyntaxKind, range: Range<usize>, children: Vec<SyntaxNode>) -> Self {
        Self(Repr::Inner(Arc::new(InnerNode::new(kind, range, children))))
    }

    /// The type of the node.
    pub fn kind(&self) -> SyntaxKind {
        match &self.0 {
            Repr::Leaf(leaf) => leaf.kind,
            Repr::Inner(inner) => inner.kind,
            Repr::Error(_) => SyntaxKind::Error,
        }
    }

    /// Whether the node is of the given kind.
    pub fn is(&self, kind: impl Into<SyntaxKind>) -> bool {
        self.kind() == kind.into()
    }

    /// The absolute byte range of the node in the source text.
    pub fn range(&self) -> Range<usize> {
        match &self.0 {
            Repr::Leaf(leaf) => leaf.start..leaf.start + leaf.text.len(),
            Repr::Inner(inner) => inner.range.clone(),
            Repr::Error(node) => node.error.range.clone(),
        }
    }

    /// The byte offset at which the node starts.
    pub fn start(&self) -> usize {
        self.range().start
    }

    /// The byte offset at which the node ends.
    pub fn end(&self) -> usize {
        self.range().end
    }

    /// The byte length of the node in the source text.
    pub fn len(&self) -> usize {
        self.range().len()
    }

    /// Return `true` if the length is 0.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The text of the node if it is a leaf or error node.
    ///
    /// Returns the empty string if this is an inner node.
    pub fn text(&self) -> &EcoString {
        static EMPTY: EcoString = EcoString::new();
        match &self.0 {
            Repr::Leaf(leaf) => &leaf.text,
            Repr::Inner(_) => &EMPTY,
            Repr::Error(node) => &node.text,
        }
    }

    /// Extract the text from the node.
    ///
    /// Builds the string if this is an inner node.
    pub fn to_text(&self) -> EcoString {
        match &self.0 {
            Repr::Leaf(_) | Repr::Error(_) => self.text().clone(),
            Repr::Inner(_) => self.leaves().map(|leaf| leaf.text().clone()).collect(),
        }
    }

    /// The node's children.
    pub fn children(&self) -> std::slice::Iter<'_, SyntaxNode> {
        match &self.0 {
            Repr::Leaf(_) | Repr::Error(_) => [].iter(),
            Repr::Inner(inner) => inner.children.iter(),
        }
    }

    /// The first child of the given kind.
    pub fn find(&self, kind: impl Into<SyntaxKind>) -> Option<&SyntaxNode> {
        let kind = kind.into();
        self.children().find(|child| child.kind() == kind)
    }

    /// All leaf and error nodes of the subtree, in source order.
    pub fn leaves(&self) -> Leaves<'_> {
        Leaves { stack: vec![self] }
    }

    /// The foreign grammar that produced this node's single child, if any.
    pub fn mount(&self) -> Option<&Mount> {
        match &self.0 {
            Repr::Inner(inner) => inner.mount.as_ref(),
            _ => None,
        }
    }

    /// The root produced by a foreign grammar, if this node hosts one.
    pub fn mounted_root(&self) -> Option<&SyntaxNode> {
        self.mount().and_then(|_| self.children().next())
    }

    /// Whether the node or its children contain an error.
    pub fn erroneous(&self) -> bool {
        match &self.0 {
            Repr::Leaf(_) => false,
            Repr::Inner(inner) => inner.erroneous,
            Repr::Error(_) => true,
        }
    }

    /// The error messages for this node and its descendants.
    pub fn errors(&self) -> Vec<SyntaxError> {
        if !self.erroneous() {
            return vec![];
        }

        if let Repr::Error(node) = &self.0 {
            vec![node.error.clone()]
        } else {
            self.children()
                .filter(|node| node.erroneous())
                .flat_map(|node| node.errors())
                .collect()
        }
    }

    /// The number of descendants, including the node itself.
    pub fn descendants(&self) -> usize {
        match &self.0 {
            Repr::Leaf(_) | Repr::Error(_) => 1,
            Repr::Inner(inner) => inner.descendants,
        }
    }

    /// Add a user-presentable hint if this is an error node.
    pub fn hint(&mut self, hint: impl Into<EcoString>) {
        if let Repr::Error(node) = &mut self.0 {
            Arc::make_mut(node).error.hints.push(hint.into());
        }
    }
}

impl SyntaxNode {
    /// Rebuild an inner node with new children, keeping its kind and range.
    pub(crate) fn with_children(&self, children: Vec<SyntaxNode>) -> Self {
        match &self.0 {
            Repr::Inner(inner) => {
                let mut node = InnerNode::new(inner.kind, inner.range.clone(), children);
                node.mount = inner.mount.clone();
                Self(Repr::Inner(Arc::new(node)))
            }
            _ => self.clone(),
        }
    }

    /// Convert the node to another kind.
    ///
    /// Don't use this for converting to an error!
    #[track_caller]
    pub(crate) fn convert_to_kind(&mut self, kind: impl Into<SyntaxKind>) {
        let kind = kind.into();
        debug_assert!(!kind.is_error());
        match &mut self.0 {
            Repr::Leaf(leaf) => leaf.kind = kind,
            Repr::Inner(inner) => Arc::make_mut(inner).kind = kind,
            Repr::Error(_) => panic!("cannot convert error"),
        }
    }

    /// Convert the node to an error, if it isn't already one.
    pub(crate) fn convert_to_error(&mut self, message: impl Into<EcoString>) {
        if !self.kind().is_error() {
            let text = self.to_text();
            *self = SyntaxNode::error(message, text, self.start());
        }
    }

    /// Convert the node to an error stating that the given thing was
    /// expected, but the current kind was found.
    pub(crate) fn expected(&mut self, expected: &str) {
        let kind = self.kind();
        self.convert_to_error(eco_format!("expected {expected}, found {}", kind.name()));
        if kind.script().is_some_and(|kind| crate::set::KEYWORD.contains(kind))
            && expected == "identifier"
        {
            self.hint(eco_format!(
                "keyword `{text}` is not allowed as an identifier; try `{text}_` instead",
                text = self.text(),
            ));
        }
    }

    /// Convert the node to an error stating it was unexpected.
    pub(crate) fn unexpected(&mut self) {
        self.convert_to_error(eco_format!("unexpected {}", self.kind().name()));
    }
}

impl Debug for SyntaxNode {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match &self.0 {
            Repr::Leaf(leaf) => leaf.fmt(f),
            Repr::Inner(inner) => inner.fmt(f),
            Repr::Error(node) => node.fmt(f),
        }
    }
}

impl Default for SyntaxNode {
    fn default() -> Self {
        Self::leaf(crate::ScriptKind::End, EcoString::new(), 0)
    }
}

/// Records which grammar and entry point produced a mounted subtree.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Mount {
    /// The name of the grammar.
    pub grammar: &'static str,
    /// The entry point the grammar was invoked with.
    pub entry: &'static str,
}

/// A leaf node in the untyped syntax tree.
#[derive(Clone, Eq, PartialEq, Hash)]
struct LeafNode {
    /// What kind of node this is.
    kind: SyntaxKind,
    /// The source text of the node.
    text: EcoString,
    /// The absolute byte offset of the node.
    start: usize,
}

impl LeafNode {
    #[track_caller]
    fn new(kind: SyntaxKind, text: EcoString, start: usize) -> Self {
        debug_assert!(!kind.is_error());
        Self { kind, text, start }
    }
}

impl Debug for LeafNode {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:?}: {:?}", self.kind, self.text)
    }
}

/// An inner node in the untyped syntax tree.
#[derive(Clone, Eq, PartialEq, Hash)]
struct InnerNode {
    /// What kind of node this is.
    kind: SyntaxKind,
    /// The absolute byte range of the node.
    range: Range<usize>,
    /// The number of nodes in the whole subtree, including this node.
    descendants: usize,
    /// Whether this node or any of its children are erroneous.
    erroneous: bool,
    /// The foreign grammar that produced the single child.
    mount: Option<Mount>,
    /// This node's children, losslessly make up this node.
    children: Vec<SyntaxNode>,
}

impl InnerNode {
    #[track_caller]
    fn new(kind: SyntaxKind, range: Range<usize>, children: Vec<SyntaxNode>) -> Self {
        debug_assert!(!kind.is_error());

        let mut descendants = 1;
        let mut erroneous = false;
        let mut cursor = range.start;
        for child in &children {
            debug_assert!(child.start() >= cursor, "children out of order");
            cursor = child.end();
            descendants += child.descendants();
            erroneous |= child.erroneous();
        }
        debug_assert!(cursor <= range.end, "child exceeds parent");

        Self { kind, range, descendants, erroneous, mount: None, children }
    }
}

impl Debug for InnerNode {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:?}: {:?}", self.kind, self.range)?;
        if let Some(mount) = &self.mount {
            write!(f, " ({}:{})", mount.grammar, mount.entry)?;
        }
        if !self.children.is_empty() {
            f.write_str(" ")?;
            f.debug_list().entries(&self.children).finish()?;
        }
        Ok(())
    }
}

/// An error node in the untyped syntax tree.
#[derive(Clone, Eq, PartialEq, Hash)]
struct ErrorNode {
    /// The source text of the node.
    text: EcoString,
    /// The syntax error.
    error: SyntaxError,
}

impl Debug for ErrorNode {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "Error: {:?} ({})", self.text, self.error.message)
    }
}

/// A syntactical error.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct SyntaxError {
    /// The absolute byte range of the erroneous text.
    pub range: Range<usize>,
    /// The error message.
    pub message: EcoString,
    /// Additional hints to the user, indicating how this error could be avoided
    /// or worked around.
    pub hints: EcoVec<EcoString>,
}

impl SyntaxError {
    /// Create a new detached syntax error.
    pub fn new(message: impl Into<EcoString>, range: Range<usize>) -> Self {
        Self { range, message: message.into(), hints: EcoVec::new() }
    }
}

/// An iterator over the leaves of a subtree.
pub struct Leaves<'a> {
    stack: Vec<&'a SyntaxNode>,
}

impl<'a> Iterator for Leaves<'a> {
    type Item = &'a SyntaxNode;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            match &node.0 {
                Repr::Inner(inner) => self.stack.extend(inner.children.iter().rev()),
                _ => return Some(node),
            }
        }
        None
    }
}
