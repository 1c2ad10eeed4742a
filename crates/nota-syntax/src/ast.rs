//! A typed layer over the untyped syntax tree.
//!
//! The AST views borrow the nodes they wrap and never fail on malformed
//! trees: missing parts are reported as `None` or empty iterators.

use std::ops::Range;

use ecow::EcoString;

use crate::{MarkupKind, SyntaxKind, SyntaxNode};

/// A typed AST node.
pub trait AstNode<'a>: Sized {
    /// Convert a node into its typed variant.
    fn from_untyped(node: &'a SyntaxNode) -> Option<Self>;

    /// A reference to the underlying syntax node.
    fn to_untyped(self) -> &'a SyntaxNode;

    /// The byte range of the node in the source.
    fn range(self) -> Range<usize> {
        self.to_untyped().range()
    }
}

macro_rules! node {
    ($(#[$attr:meta])* $name:ident: $($variant:ident)|+) => {
        #[derive(Debug, Copy, Clone, PartialEq)]
        #[repr(transparent)]
        $(#[$attr])*
        pub struct $name<'a>(&'a SyntaxNode);

        impl<'a> AstNode<'a> for $name<'a> {
            fn from_untyped(node: &'a SyntaxNode) -> Option<Self> {
                match node.kind() {
                    $(SyntaxKind::Markup(MarkupKind::$variant))|+ => Some(Self(node)),
                    _ => None,
                }
            }

            fn to_untyped(self) -> &'a SyntaxNode {
                self.0
            }
        }
    };
}

/// The children of a node that carry meaning.
fn significant(node: &SyntaxNode) -> impl Iterator<Item = &SyntaxNode> {
    node.children().filter(|child| {
        !child.kind().is_trivia() && !child.is(MarkupKind::QuoteMarker)
    })
}

node! {
    /// A sequence of blocks: a document, an inline-only parse or the
    /// indented body of a component.
    Markup: Document | Inline | BlockBody
}

impl<'a> Markup<'a> {
    /// The blocks (or inline nodes) in source order, without whitespace and
    /// comments.
    pub fn nodes(self) -> impl Iterator<Item = &'a SyntaxNode> {
        significant(self.0)
    }

    /// The only paragraph of the sequence, ignoring attributes, if there is
    /// exactly one block besides them and it is a paragraph.
    pub fn sole_paragraph(self) -> Option<&'a SyntaxNode> {
        let mut blocks = self.nodes().filter(|node| !node.is(MarkupKind::Attribute));
        let first = blocks.next()?;
        (first.is(MarkupKind::Paragraph) && blocks.next().is_none()).then_some(first)
    }
}

node! {
    /// A command: a block or inline component, an interpolation or a
    /// reference.
    Command: BlockComponent | InlineComponent | Interpolation | Reference
}

/// How a command names its target.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum CommandName<'a> {
    /// An identifier: `@name`.
    Ident(&'a str),
    /// A positional index into the enclosing arguments: `#1`.
    Positional(usize),
    /// A computed name: `@(expr)`. Holds the name expression node, which is
    /// absent for empty parens.
    Dynamic(Option<&'a SyntaxNode>),
    /// No name at all: `@{...}`.
    Anonymous,
}

impl<'a> Command<'a> {
    /// Whether this is a component or an interpolation or reference.
    pub fn kind(self) -> MarkupKind {
        self.0.kind().markup().unwrap_or(MarkupKind::InlineComponent)
    }

    /// How the command is named.
    pub fn name(self) -> CommandName<'a> {
        if let Some(name) = self.0.find(MarkupKind::CommandName) {
            let text = name.text().as_str();
            return match text.parse::<usize>() {
                Ok(index) if text.starts_with(|c: char| c.is_ascii_digit()) => {
                    CommandName::Positional(index)
                }
                _ => CommandName::Ident(text),
            };
        }

        match self.0.find(MarkupKind::DynamicName) {
            Some(dynamic) => CommandName::Dynamic(dynamic.find(MarkupKind::NameExpr)),
            None => CommandName::Anonymous,
        }
    }

    /// The entries of the bracketed attribute list, if there are any.
    pub fn attributes(self) -> Option<&'a SyntaxNode> {
        self.0.find(MarkupKind::AttributeList)?.find(MarkupKind::InlineAttributes)
    }

    /// The braced content blocks: `{a}{b}`.
    pub fn content_blocks(self) -> impl Iterator<Item = ContentBlock<'a>> {
        self.0.children().filter_map(ContentBlock::from_untyped)
    }

    /// Inline content after a colon: `@name: content`.
    pub fn line_content(self) -> Option<&'a SyntaxNode> {
        self.0.find(MarkupKind::LineContent)
    }

    /// The uninterpreted text of a verbatim body: `{|text|}`.
    pub fn verbatim(self) -> Option<&'a str> {
        let verbatim = self.0.find(MarkupKind::Verbatim)?;
        Some(verbatim.find(MarkupKind::VerbatimText).map_or("", |text| text.text().as_str()))
    }

    /// The braced multi-line body of a block component, reparsed as a
    /// document.
    pub fn hole(self) -> Option<&'a SyntaxNode> {
        self.0.find(MarkupKind::MarkupHole)
    }

    /// The indented body of a block component.
    pub fn body(self) -> Option<Markup<'a>> {
        self.0.find(MarkupKind::BlockBody).and_then(Markup::from_untyped)
    }
}

node! {
    /// A braced content argument of a command.
    ContentBlock: ContentBlock
}

impl<'a> ContentBlock<'a> {
    /// The inline nodes between the braces.
    pub fn nodes(self) -> impl Iterator<Item = &'a SyntaxNode> {
        self.0.children().filter(|child| {
            !child.is(MarkupKind::LeftBrace) && !child.is(MarkupKind::RightBrace)
        })
    }

    /// Whether the closing brace is missing because the input ended first.
    pub fn is_incomplete(self) -> bool {
        self.0.find(MarkupKind::RightBrace).is_none()
    }
}

node! {
    /// An attribute line: `| key: value`.
    Attribute: Attribute
}

impl<'a> Attribute<'a> {
    /// The attribute's key.
    pub fn key(self) -> &'a str {
        self.0.find(MarkupKind::AttributeKey).map_or("", |key| key.text().as_str())
    }

    /// The attribute's value, absent for `| key:` without a value.
    pub fn value(self) -> Option<&'a SyntaxNode> {
        self.0.find(MarkupKind::AttributeValue)
    }
}

node! {
    /// An ATX heading: `## Title`.
    Heading: Heading
}

impl<'a> Heading<'a> {
    /// The heading's level, between 1 and 6.
    pub fn level(self) -> usize {
        self.0.find(MarkupKind::HeadingMarker).map_or(1, |marker| marker.len())
    }

    /// The inline content of the heading.
    pub fn nodes(self) -> impl Iterator<Item = &'a SyntaxNode> {
        self.0
            .children()
            .skip_while(|child| !child.is(MarkupKind::HeadingMarker))
            .skip(1)
            .filter(|child| !child.is(MarkupKind::Space))
    }
}

node! {
    /// A bullet or ordered list.
    List: BulletList | OrderedList
}

impl<'a> List<'a> {
    /// Whether the items are numbered.
    pub fn is_ordered(self) -> bool {
        self.0.is(MarkupKind::OrderedList)
    }

    /// The number of the first item, if this is an ordered list.
    pub fn start(self) -> Option<usize> {
        let item = self.items().next()?;
        let marker = item.0.find(MarkupKind::ListMarker)?;
        marker.text().trim_end_matches(['.', ')']).parse().ok()
    }

    /// The list's items.
    pub fn items(self) -> impl Iterator<Item = ListItem<'a>> {
        self.0.children().filter_map(ListItem::from_untyped)
    }
}

node! {
    /// An item of a bullet or ordered list.
    ListItem: ListItem
}

impl<'a> ListItem<'a> {
    /// Whether the task box is checked, if this is a task item.
    pub fn task(self) -> Option<bool> {
        let marker = self.0.find(MarkupKind::TaskMarker)?;
        Some(marker.text() != "[ ]")
    }

    /// The blocks of the item.
    pub fn blocks(self) -> impl Iterator<Item = &'a SyntaxNode> {
        significant(self.0).filter(|child| {
            !child.is(MarkupKind::ListMarker) && !child.is(MarkupKind::TaskMarker)
        })
    }
}

node! {
    /// A quotation: `> ...`.
    Blockquote: Blockquote
}

impl<'a> Blockquote<'a> {
    /// The quoted blocks, without the quote markers.
    pub fn blocks(self) -> impl Iterator<Item = &'a SyntaxNode> {
        significant(self.0)
    }
}

node! {
    /// A fenced code block.
    FencedCode: FencedCode
}

impl<'a> FencedCode<'a> {
    /// The language tag after the opening fence.
    pub fn lang(self) -> Option<&'a str> {
        self.0.find(MarkupKind::CodeInfo).map(|info| info.text().as_str())
    }

    /// The code between the fences.
    pub fn code(self) -> &'a str {
        self.0.find(MarkupKind::CodeText).map_or("", |text| text.text().as_str())
    }
}

node! {
    /// A link or image: `[text](url)`, `![alt](url)`.
    Link: Link | Image
}

impl<'a> Link<'a> {
    /// Whether this is an image.
    pub fn is_image(self) -> bool {
        self.0.is(MarkupKind::Image)
    }

    /// The link destination.
    pub fn url(self) -> &'a str {
        self.0.find(MarkupKind::Url).map_or("", |url| url.text().as_str())
    }

    /// The nodes of the link text or alt text.
    pub fn nodes(self) -> impl Iterator<Item = &'a SyntaxNode> {
        self.0
            .children()
            .skip(1)
            .take_while(|child| !child.is(MarkupKind::LinkMark))
    }

    /// The link text or alt text as written.
    pub fn label(self) -> EcoString {
        self.nodes().map(SyntaxNode::to_text).collect()
    }
}

node! {
    /// A table with a header row.
    Table: Table
}

/// The alignment of a table column.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Align {
    /// `:--`
    Left,
    /// `:-:`
    Center,
    /// `--:`
    Right,
}

impl Align {
    /// The name of the alignment as used by HTML's `align` attribute.
    pub fn name(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Center => "center",
            Self::Right => "right",
        }
    }
}

impl<'a> Table<'a> {
    /// The header row.
    pub fn header(self) -> Option<TableRow<'a>> {
        self.0.find(MarkupKind::TableHeader).and_then(TableRow::from_untyped)
    }

    /// The body rows.
    pub fn rows(self) -> impl Iterator<Item = TableRow<'a>> {
        self.0
            .children()
            .filter(|child| child.is(MarkupKind::TableRow))
            .filter_map(TableRow::from_untyped)
    }

    /// The alignment of each column, as given by the delimiter row.
    pub fn alignments(self) -> Vec<Option<Align>> {
        let Some(row) = self.0.find(MarkupKind::TableDelimiter) else {
            return vec![];
        };
        row.text()
            .split('|')
            .map(str::trim)
            .filter(|cell| !cell.is_empty())
            .map(|cell| match (cell.starts_with(':'), cell.ends_with(':')) {
                (true, true) => Some(Align::Center),
                (true, false) => Some(Align::Left),
                (false, true) => Some(Align::Right),
                (false, false) => None,
            })
            .collect()
    }
}

node! {
    /// A header or body row of a table.
    TableRow: TableHeader | TableRow
}

impl<'a> TableRow<'a> {
    /// The row's cells.
    pub fn cells(self) -> impl Iterator<Item = &'a SyntaxNode> {
        self.0.children().filter(|child| child.is(MarkupKind::TableCell))
    }
}

node! {
    /// Embedded script: `% stmt` or a `%%%` fenced block.
    Script: Script
}

impl<'a> Script<'a> {
    /// The statements, absent for an empty script.
    pub fn body(self) -> Option<&'a SyntaxNode> {
        self.0.find(MarkupKind::ScriptBody)
    }
}

node! {
    /// Inline or display math.
    Math: MathInline | MathBlock
}

impl<'a> Math<'a> {
    /// Whether this is display math.
    pub fn is_block(self) -> bool {
        self.0.is(MarkupKind::MathBlock)
    }

    /// The template nodes of the formula.
    pub fn nodes(self) -> impl Iterator<Item = &'a SyntaxNode> {
        self.0.find(MarkupKind::MathContent).into_iter().flat_map(|content| content.children())
    }
}

node! {
    /// Content between two marks: emphasis, strong emphasis,
    /// strikethrough or inline code.
    Delimited: Emph | Strong | Strikethrough | InlineCode
}

impl<'a> Delimited<'a> {
    /// The nodes between the marks.
    pub fn nodes(self) -> impl Iterator<Item = &'a SyntaxNode> {
        self.0.children().filter(|child| {
            !child.is(MarkupKind::EmphMark) && !child.is(MarkupKind::CodeMark)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    fn first<'a, T: AstNode<'a>>(node: &'a SyntaxNode) -> Option<T> {
        T::from_untyped(node).or_else(|| node.children().find_map(first))
    }

    #[test]
    fn test_command_names() {
        let root = parse("@Box[w: 1]{x} #2 @(f()){y} @{z}").unwrap();
        let commands: Vec<_> = root
            .children()
            .flat_map(|para| para.children())
            .filter_map(Command::from_untyped)
            .collect();
        assert_eq!(commands.len(), 4);
        assert_eq!(commands[0].name(), CommandName::Ident("Box"));
        assert!(commands[0].attributes().is_some());
        assert_eq!(commands[1].name(), CommandName::Positional(2));
        assert!(matches!(commands[2].name(), CommandName::Dynamic(Some(_))));
        assert_eq!(commands[3].name(), CommandName::Anonymous);
        assert_eq!(commands[3].content_blocks().count(), 1);
    }

    #[test]
    fn test_incomplete_content_block() {
        let root = parse("@foo{bar").unwrap();
        let command: Command = first(&root).unwrap();
        let block = command.content_blocks().next().unwrap();
        assert!(block.is_incomplete());
        assert_eq!(block.nodes().count(), 1);
    }

    #[test]
    fn test_block_component_parts() {
        let root = parse("@Note: Title\n  | kind: \"tip\"\n\n  Body text.\n").unwrap();
        let command: Command = first(&root).unwrap();
        assert_eq!(command.kind(), MarkupKind::BlockComponent);
        assert!(command.line_content().is_some());
        let body = command.body().unwrap();
        let attr = body.nodes().find_map(Attribute::from_untyped).unwrap();
        assert_eq!(attr.key(), "kind");
        assert!(body.sole_paragraph().is_some());
    }

    #[test]
    fn test_ordered_list_start() {
        let root = parse("3. three\n4. four\n").unwrap();
        let list: List = first(&root).unwrap();
        assert!(list.is_ordered());
        assert_eq!(list.start(), Some(3));
        assert_eq!(list.items().count(), 2);
    }

    #[test]
    fn test_table_alignments() {
        let root = parse("| a | b | c |\n|:--|:-:|---|\n| 1 | 2 | 3 |\n").unwrap();
        let table: Table = first(&root).unwrap();
        assert_eq!(table.alignments(), [Some(Align::Left), Some(Align::Center), None]);
        assert_eq!(table.header().unwrap().cells().count(), 3);
        assert_eq!(table.rows().count(), 1);
    }

    #[test]
    fn test_markdown_views() {
        let root = parse("## Hi\n\n- [x] done\n\n```rs\nlet x;\n```\n\n![alt *a*](img.png)").unwrap();
        let heading: Heading = first(&root).unwrap();
        assert_eq!(heading.level(), 2);
        let item: ListItem = first(&root).unwrap();
        assert_eq!(item.task(), Some(true));
        let list: List = first(&root).unwrap();
        assert!(!list.is_ordered());
        assert_eq!(list.start(), None);
        let code: FencedCode = first(&root).unwrap();
        assert_eq!(code.lang(), Some("rs"));
        assert_eq!(code.code(), "let x;");
        let image: Link = first(&root).unwrap();
        assert!(image.is_image());
        assert_eq!(image.url(), "img.png");
        assert_eq!(image.label(), "alt *a*");
    }
}
