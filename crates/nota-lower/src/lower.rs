//! Lowering of document trees into expressions.

use ecow::{EcoString, EcoVec, eco_format};
use indexmap::IndexMap;
use nota_syntax::ast::{
    self, AstNode, Attribute, Blockquote, Command, CommandName, Delimited, FencedCode, Heading,
    Link, List, Markup, Math, Table,
};
use nota_syntax::{INTRODUCERS, MarkupKind, SyntaxKind, SyntaxNode};
use rustc_hash::FxHashSet;

use crate::LowerConfig;
use crate::diag::{SourceDiagnostic, error};
use crate::js::{ARGS, Code, Elem, Expr, ExprKind, FRAGMENT, Prop};

/// Walks a document tree and collects what the program around it needs.
pub(crate) struct Lowerer<'a> {
    /// The document's text.
    pub text: &'a str,
    /// How the document is lowered.
    pub config: &'a LowerConfig,
    /// The identifiers the lowered expressions refer to.
    pub names: FxHashSet<EcoString>,
    /// The names bound by hoisted imports.
    pub bound: FxHashSet<EcoString>,
    /// Hoisted import statements.
    pub imports: Vec<Code>,
    /// Hoisted export statements.
    pub exports: Vec<Code>,
    /// The modules imported by hoisted imports, and whether any of the
    /// imports binds the module's default export.
    pub modules: IndexMap<EcoString, bool>,
    /// Problems found while lowering.
    pub errors: EcoVec<SourceDiagnostic>,
}

impl<'a> Lowerer<'a> {
    pub fn new(text: &'a str, config: &'a LowerConfig) -> Self {
        Self {
            text,
            config,
            names: FxHashSet::default(),
            bound: FxHashSet::default(),
            imports: vec![],
            exports: vec![],
            modules: IndexMap::new(),
            errors: EcoVec::new(),
        }
    }

    /// Lower a document, returning its attributes and the array of its
    /// blocks.
    pub fn document(&mut self, root: Markup) -> (Vec<Prop>, Expr) {
        let mut props = vec![];
        let body = self.sequence(root.nodes(), Some(&mut props));
        (props, body)
    }

    /// A reference to a variable that the program must provide.
    pub fn ident(&mut self, name: &str) -> Expr {
        self.names.insert(name.into());
        Expr::ident(name)
    }

    /// Lower a sequence of blocks to an array.
    ///
    /// Script blocks scope the blocks after them. Attributes are added to
    /// `attrs` if the sequence can be configured by them.
    pub fn sequence<'n>(
        &mut self,
        nodes: impl IntoIterator<Item = &'n SyntaxNode>,
        mut attrs: Option<&mut Vec<Prop>>,
    ) -> Expr {
        let mut head = vec![];
        let mut scopes: Vec<(Vec<Code>, Vec<Elem>, usize)> = vec![];
        for node in nodes {
            if let Some(attr) = Attribute::from_untyped(node) {
                match attrs.as_mut() {
                    Some(props) => props.push(self.attribute(attr)),
                    None => self.errors.push(error!(
                        node.range(),
                        "attribute `{}` has nothing to configure", attr.key();
                        hint: "attributes configure the enclosing component or the document"
                    )),
                }
                continue;
            }

            if let Some(script) = ast::Script::from_untyped(node) {
                let stmts = self.script(script);
                if !stmts.is_empty() {
                    scopes.push((stmts, vec![], node.start()));
                }
                continue;
            }

            let Some(expr) = self.block(node) else { continue };
            match scopes.last_mut() {
                Some((_, items, _)) => items.push(Elem::Item(expr)),
                None => head.push(Elem::Item(expr)),
            }
        }

        let mut tail = None;
        while let Some((stmts, mut items, origin)) = scopes.pop() {
            items.extend(tail.take());
            let array = Expr::new(ExprKind::Array(items));
            tail = Some(Elem::Spread(Expr::new(ExprKind::Scope(stmts, Box::new(array))).at(origin)));
        }
        head.extend(tail);
        Expr::new(ExprKind::Array(head))
    }

    /// Lower a block.
    fn block(&mut self, node: &SyntaxNode) -> Option<Expr> {
        let expr = match node.kind().markup()? {
            MarkupKind::Paragraph => Expr::tag("p", self.inline(node.children())),
            MarkupKind::Heading => {
                let heading = Heading::from_untyped(node)?;
                let tag = eco_format!("h{}", heading.level().clamp(1, 6));
                Expr::tag(&tag, self.inline(heading.nodes()))
            }
            MarkupKind::BulletList | MarkupKind::OrderedList => self.list(List::from_untyped(node)?),
            MarkupKind::Blockquote => {
                let quote = Blockquote::from_untyped(node)?;
                let blocks = self.sequence(quote.blocks(), None);
                Expr::tag("blockquote", vec![Elem::Spread(blocks)])
            }
            MarkupKind::Table => self.table(Table::from_untyped(node)?),
            MarkupKind::FencedCode => {
                let code = FencedCode::from_untyped(node)?;
                let mut props = vec![];
                if let Some(lang) = code.lang() {
                    props.push(Prop::Pair("language".into(), Expr::str(lang)));
                }
                let listing = self.ident("Listing");
                Expr::element(listing, Expr::object(props), vec![Elem::Item(Expr::str(code.code()))])
            }
            MarkupKind::MathBlock => self.math(Math::from_untyped(node)?),
            MarkupKind::BlockComponent => self.command(Command::from_untyped(node)?),
            MarkupKind::Text => Expr::str(node.text().as_str()),
            _ => return None,
        };
        Some(expr.at(node.start()))
    }

    fn list(&mut self, list: List) -> Expr {
        let mut props = vec![];
        if let Some(start) = list.start().filter(|&start| start != 1) {
            props.push(Prop::Pair("start".into(), Expr::new(ExprKind::Code(number(start)))));
        }

        let items = list
            .items()
            .map(|item| {
                let mut children = vec![];
                if let Some(checked) = item.task() {
                    let checkbox = Expr::element(
                        Expr::str("input"),
                        Expr::object(vec![
                            Prop::Pair("type".into(), Expr::str("checkbox")),
                            Prop::Pair("checked".into(), Expr::bool(checked)),
                            Prop::Pair("readOnly".into(), Expr::bool(true)),
                        ]),
                        vec![],
                    );
                    children.push(Elem::Item(checkbox));
                }
                children.push(Elem::Spread(self.sequence(item.blocks(), None)));
                Elem::Item(Expr::tag("li", children).at(item.to_untyped().start()))
            })
            .collect();

        let tag = if list.is_ordered() { "ol" } else { "ul" };
        Expr::element(Expr::str(tag), Expr::object(props), items)
    }

    fn table(&mut self, table: Table) -> Expr {
        let aligns = table.alignments();
        let row = |lowerer: &mut Self, row: ast::TableRow, tag: &str| {
            let cells = row
                .cells()
                .enumerate()
                .map(|(i, cell)| {
                    let mut props = vec![];
                    if let Some(align) = aligns.get(i).copied().flatten() {
                        props.push(Prop::Pair("align".into(), Expr::str(align.name())));
                    }
                    let children = lowerer.inline(cell.children());
                    Elem::Item(Expr::element(Expr::str(tag), Expr::object(props), children))
                })
                .collect();
            Elem::Item(Expr::tag("tr", cells).at(row.to_untyped().start()))
        };

        let header = table.header().map(|header| row(self, header, "th"));
        let rows = table.rows().map(|body| row(self, body, "td")).collect();
        let thead = Expr::tag("thead", header.into_iter().collect());
        let tbody = Expr::tag("tbody", rows);
        Expr::tag("table", vec![Elem::Item(thead), Elem::Item(tbody)])
    }

    fn math(&mut self, math: Math) -> Expr {
        let name = self.ident(if math.is_block() { "$$" } else { "$" });
        let children = self.inline(math.nodes());
        Expr::element(name, Expr::object(vec![]), children)
    }

    /// Lower a block attribute to an object member.
    fn attribute(&mut self, attr: Attribute) -> Prop {
        let value = match attr.value() {
            Some(value) => self.expression(value).unwrap_or_else(|| Expr::bool(true)),
            None => Expr::bool(true),
        };
        Prop::Pair(attr.key().into(), value.at(attr.to_untyped().start()))
    }

    /// Lower inline content to the children of an element.
    pub fn inline<'n>(&mut self, nodes: impl IntoIterator<Item = &'n SyntaxNode>) -> Vec<Elem> {
        nodes
            .into_iter()
            .filter_map(|node| self.inline_node(node))
            .map(Elem::Item)
            .collect()
    }

    fn inline_node(&mut self, node: &SyntaxNode) -> Option<Expr> {
        let expr = match node.kind() {
            SyntaxKind::Markup(kind) => match kind {
                MarkupKind::Text => Expr::str(unescape(node.text())),
                MarkupKind::Escape => Expr::str(node.text().chars().skip(1).collect::<EcoString>()),
                MarkupKind::Newline => Expr::str("\n"),
                MarkupKind::Special => Expr::str("\u{2014}"),
                MarkupKind::CodeText => Expr::str(node.text().as_str()),
                MarkupKind::Emph
                | MarkupKind::Strong
                | MarkupKind::Strikethrough
                | MarkupKind::InlineCode => {
                    let tag = match kind {
                        MarkupKind::Emph => "em",
                        MarkupKind::Strong => "strong",
                        MarkupKind::Strikethrough => "s",
                        _ => "code",
                    };
                    let delimited = Delimited::from_untyped(node)?;
                    Expr::tag(tag, self.inline(delimited.nodes()))
                }
                MarkupKind::Link | MarkupKind::Image => self.link(Link::from_untyped(node)?),
                MarkupKind::Autolink => {
                    let url = node.find(MarkupKind::Url).map_or("", |url| url.text().as_str());
                    Expr::element(
                        Expr::str("a"),
                        Expr::object(vec![Prop::Pair("href".into(), Expr::str(url))]),
                        vec![Elem::Item(Expr::str(url))],
                    )
                }
                MarkupKind::MathInline => self.math(Math::from_untyped(node)?),
                MarkupKind::InlineComponent | MarkupKind::Interpolation | MarkupKind::Reference => {
                    self.command(Command::from_untyped(node)?)
                }
                _ => return None,
            },
            _ => return None,
        };
        Some(expr.at(node.start()))
    }

    fn link(&mut self, link: Link) -> Expr {
        if link.is_image() {
            let props = vec![
                Prop::Pair("src".into(), Expr::str(link.url())),
                Prop::Pair("alt".into(), Expr::str(link.label())),
            ];
            return Expr::element(Expr::str("img"), Expr::object(props), vec![]);
        }

        let props = vec![Prop::Pair("href".into(), Expr::str(link.url()))];
        let children = self.inline(link.nodes());
        Expr::element(Expr::str("a"), Expr::object(props), children)
    }

    /// Lower a component, interpolation or reference.
    pub fn command(&mut self, command: Command) -> Expr {
        match command.kind() {
            MarkupKind::Reference => {
                let name = match command.name() {
                    CommandName::Ident(name) => Expr::str(name),
                    _ => self.callee(command),
                };
                let component = self.ident("Ref");
                let props = self.attribute_props(command);
                Expr::element(component, Expr::object(props), vec![Elem::Item(name)])
            }
            MarkupKind::Interpolation => {
                let callee = self.callee(command);
                let mut args = vec![];
                let props = self.attribute_props(command);
                if !props.is_empty() {
                    args.push(Elem::Item(Expr::object(props)));
                }
                for block in command.content_blocks() {
                    let items = self.inline(block.nodes());
                    args.push(Elem::Item(Expr::new(ExprKind::Array(items))));
                }
                if args.is_empty() { callee } else { Expr::call(callee, args) }
            }
            kind => self.component(command, kind == MarkupKind::BlockComponent),
        }
    }

    fn component(&mut self, command: Command, block: bool) -> Expr {
        let name = match command.name() {
            CommandName::Ident(name) if self.config.is_intrinsic(name) => Expr::str(name),
            CommandName::Anonymous => Expr::ident(FRAGMENT),
            _ => self.callee(command),
        };

        let mut props = vec![];
        if !matches!(name.kind, ExprKind::Str(_))
            && !matches!(command.name(), CommandName::Anonymous)
        {
            props.push(Prop::Pair("block".into(), Expr::bool(block)));
        }
        props.extend(self.attribute_props(command));

        let mut children = vec![];
        if let Some(content) = command.line_content() {
            children.extend(self.inline(content.children()));
        }
        for content in command.content_blocks() {
            children.extend(self.inline(content.nodes()));
        }
        if let Some(text) = command.verbatim() {
            children.push(Elem::Item(Expr::str(text)));
        }
        if let Some(hole) = command.hole() {
            match hole.mounted_root().and_then(Markup::from_untyped) {
                Some(markup) => children.extend(self.body(markup, &mut props)),
                None => children.push(Elem::Item(Expr::str(hole.text().as_str()))),
            }
        }
        if let Some(body) = command.body() {
            children.extend(self.body(body, &mut props));
        }

        Expr::element(name, Expr::object(props), children)
    }

    /// The properties given by a command's bracketed attribute list.
    fn attribute_props(&mut self, command: Command) -> Vec<Prop> {
        command
            .attributes()
            .and_then(|attrs| self.attribute_list(attrs))
            .map(Prop::Code)
            .into_iter()
            .collect()
    }

    /// Lower the body of a block component. A body that is just a paragraph
    /// contributes its inline content directly.
    fn body(&mut self, markup: Markup, props: &mut Vec<Prop>) -> Vec<Elem> {
        let Some(paragraph) = markup.sole_paragraph() else {
            return vec![Elem::Spread(self.sequence(markup.nodes(), Some(props)))];
        };
        for attr in markup.nodes().filter_map(Attribute::from_untyped) {
            props.push(self.attribute(attr));
        }
        self.inline(paragraph.children())
    }

    /// The expression a command's name refers to.
    fn callee(&mut self, command: Command) -> Expr {
        let range = command.to_untyped().range();
        match command.name() {
            CommandName::Ident(name) => self.ident(name),
            CommandName::Positional(0) => {
                self.errors.push(error!(
                    range,
                    "positional arguments start at 1";
                    hint: "use `#1` for the first argument"
                ));
                Expr::null()
            }
            CommandName::Positional(n) => {
                let args = self.ident(ARGS);
                Expr::new(ExprKind::Index(Box::new(args), n - 1))
            }
            CommandName::Dynamic(Some(expr)) => match self.expression(expr) {
                Some(expr) => expr,
                None => {
                    self.errors.push(error!(range, "command name is empty"));
                    Expr::null()
                }
            },
            CommandName::Dynamic(None) => {
                self.errors.push(error!(
                    range,
                    "command name is empty";
                    hint: "write an expression between the parentheses"
                ));
                Expr::null()
            }
            CommandName::Anonymous => Expr::ident(FRAGMENT),
        }
    }
}

/// Source text for a number literal.
fn number(value: usize) -> Code {
    let mut code = Code::default();
    code.push_text(&eco_format!("{value}"), None);
    code
}

/// Remove the backslashes of escaped command introducers.
fn unescape(text: &str) -> EcoString {
    let mut out = EcoString::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek().filter(|next| INTRODUCERS.contains(*next)) {
                out.push(next);
                chars.next();
                continue;
            }
        }
        out.push(c);
    }
    out
}
