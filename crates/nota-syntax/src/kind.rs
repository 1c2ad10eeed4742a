use std::fmt::{self, Debug, Formatter};
use std::sync::LazyLock;

use rustc_hash::FxHashMap;

/// A syntactical building block of a Nota document or of a script embedded in
/// one.
///
/// Every grammar owns its own kind enumeration. Kinds of different grammars
/// are never compared by their numeric id, only by their tag.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub enum SyntaxKind {
    /// A node of the document grammar.
    Markup(MarkupKind),
    /// A node of the script grammar.
    Script(ScriptKind),
    /// Invalid syntax in any grammar. Contains an error message.
    Error,
}

impl SyntaxKind {
    /// The name of the grammar this kind belongs to.
    pub const fn grammar(self) -> Option<&'static str> {
        match self {
            Self::Markup(_) => Some("markup"),
            Self::Script(_) => Some("script"),
            Self::Error => None,
        }
    }

    /// Whether this is an error.
    pub const fn is_error(self) -> bool {
        matches!(self, Self::Error)
    }

    /// Whether this kind carries no meaning for lowering.
    pub const fn is_trivia(self) -> bool {
        match self {
            Self::Markup(kind) => matches!(
                kind,
                MarkupKind::Space | MarkupKind::LineComment | MarkupKind::CommentBlock
            ),
            Self::Script(kind) => matches!(
                kind,
                ScriptKind::Space | ScriptKind::LineComment | ScriptKind::BlockComment
            ),
            Self::Error => false,
        }
    }

    /// The markup kind, if this is one.
    pub const fn markup(self) -> Option<MarkupKind> {
        match self {
            Self::Markup(kind) => Some(kind),
            _ => None,
        }
    }

    /// The script kind, if this is one.
    pub const fn script(self) -> Option<ScriptKind> {
        match self {
            Self::Script(kind) => Some(kind),
            _ => None,
        }
    }

    /// The numeric id of the kind within its grammar's registry.
    pub fn id(self) -> u16 {
        match self {
            Self::Markup(kind) => kind as u16,
            Self::Script(kind) => kind as u16,
            Self::Error => u16::MAX,
        }
    }

    /// A human-readable name for the kind.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Markup(kind) => kind.name(),
            Self::Script(kind) => kind.name(),
            Self::Error => "syntax error",
        }
    }
}

impl Debug for SyntaxKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Markup(kind) => kind.fmt(f),
            Self::Script(kind) => write!(f, "Script::{kind:?}"),
            Self::Error => f.pad("Error"),
        }
    }
}

impl From<MarkupKind> for SyntaxKind {
    fn from(kind: MarkupKind) -> Self {
        Self::Markup(kind)
    }
}

impl From<ScriptKind> for SyntaxKind {
    fn from(kind: ScriptKind) -> Self {
        Self::Script(kind)
    }
}

/// Defines a grammar's kind enumeration together with its human-readable
/// names.
macro_rules! kinds {
    (
        $(#[$attr:meta])*
        pub enum $name:ident {
            $( $(#[$vattr:meta])* $variant:ident => $text:literal, )*
        }
    ) => {
        $(#[$attr])*
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $( $(#[$vattr])* $variant, )*
        }

        impl $name {
            /// Every kind of the grammar, ordered by id.
            pub const ALL: &'static [Self] = &[$(Self::$variant,)*];

            /// A human-readable name for the kind.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)*
                }
            }
        }
    };
}

kinds! {
    /// The node types of the document grammar.
    pub enum MarkupKind {
        /// The root of a parsed document.
        Document => "document",
        /// The root of an inline-only parse.
        Inline => "inline content",

        /// Whitespace between blocks.
        Space => "space",
        /// A soft line break inside a block, including the next line's
        /// continuation prefix.
        Newline => "newline",
        /// Plain text.
        Text => "text",
        /// A backslash escape: `\*`.
        Escape => "escape sequence",
        /// A typographic shorthand: `---`.
        Special => "special",
        /// A line comment: `// ...`.
        LineComment => "line comment",
        /// A run of block-level comment lines.
        CommentBlock => "comment block",

        /// A paragraph of inline content.
        Paragraph => "paragraph",
        /// An ATX heading: `## Title`.
        Heading => "heading",
        /// The hashes of a heading.
        HeadingMarker => "heading marker",
        /// A list of bullet items.
        BulletList => "bullet list",
        /// A list of numbered items.
        OrderedList => "ordered list",
        /// An item of a list.
        ListItem => "list item",
        /// The marker of a list item: `-`, `1.`.
        ListMarker => "list marker",
        /// The checkbox of a task item: `[x]`.
        TaskMarker => "task marker",
        /// A quotation: `> ...`.
        Blockquote => "blockquote",
        /// The marker of a quote line.
        QuoteMarker => "quote marker",
        /// A table with a header row.
        Table => "table",
        /// The header row of a table.
        TableHeader => "table header",
        /// The alignment row of a table.
        TableDelimiter => "table delimiter row",
        /// A body row of a table.
        TableRow => "table row",
        /// A cell of a table row.
        TableCell => "table cell",
        /// A cell separator: `|`.
        TablePipe => "table pipe",
        /// A fenced code block.
        FencedCode => "fenced code",
        /// A code fence: ```` ``` ````.
        CodeFence => "code fence",
        /// The language tag of a code block.
        CodeInfo => "code info",
        /// The uninterpreted text of code.
        CodeText => "code text",

        /// Embedded script: `% stmt` or a `%%%` fenced block.
        Script => "script",
        /// The mark of a single-line script: `%`.
        ScriptMark => "script mark",
        /// The fence of a script block: `%%%`.
        ScriptFence => "script fence",
        /// The statements of a script, parsed by the script grammar.
        ScriptBody => "script body",

        /// An attribute line: `| key: value`.
        Attribute => "attribute",
        /// The pipe opening an attribute line.
        AttributeMark => "attribute mark",
        /// The key of an attribute.
        AttributeKey => "attribute key",
        /// The value of an attribute, parsed by the script grammar.
        AttributeValue => "attribute value",

        /// A component spanning one or more block lines: `@name: ...`.
        BlockComponent => "block component",
        /// A component inside inline content: `@name{...}`.
        InlineComponent => "inline component",
        /// An interpolation: `#name` or `#name{...}`.
        Interpolation => "interpolation",
        /// A reference: `&name`.
        Reference => "reference",
        /// The sigil introducing a command: `@`, `.@`, `#`, `&`.
        Sigil => "command sigil",
        /// The identifier or positional index naming a command.
        CommandName => "command name",
        /// A parenthesized, computed command name: `@(expr)`.
        DynamicName => "dynamic name",
        /// The expression inside a dynamic name, parsed by the script grammar.
        NameExpr => "name expression",
        /// A bracketed attribute list: `[key: value]`.
        AttributeList => "attribute list",
        /// The entries of an attribute list, parsed by the script grammar.
        InlineAttributes => "inline attributes",
        /// A braced content argument: `{...}`.
        ContentBlock => "content block",
        /// Inline content running to the end of the line: `: ...`.
        LineContent => "line content",
        /// The indented body of a block component.
        BlockBody => "block body",
        /// The balanced body of a braced block component, parsed as a
        /// document.
        MarkupHole => "markup hole",
        /// An uninterpreted body: `{|...|}`.
        Verbatim => "verbatim",
        /// The delimiters of a verbatim body.
        VerbatimDelim => "verbatim delimiter",
        /// The text of a verbatim body.
        VerbatimText => "verbatim text",

        /// Inline math: `$x$`.
        MathInline => "inline math",
        /// Display math: `$$ x $$`.
        MathBlock => "math block",
        /// A math delimiter: `$` or `$$`.
        MathDelim => "math delimiter",
        /// The contents of math, a template of text and interpolations.
        MathContent => "math content",

        /// Emphasized content: `*x*`.
        Emph => "emphasis",
        /// Strongly emphasized content: `**x**`.
        Strong => "strong emphasis",
        /// Struck-through content: `~~x~~`.
        Strikethrough => "strikethrough",
        /// The delimiter of emphasis or strikethrough.
        EmphMark => "emphasis mark",
        /// Inline code: `` `x` ``.
        InlineCode => "inline code",
        /// The backticks of inline code.
        CodeMark => "code mark",
        /// A link: `[text](url)`.
        Link => "link",
        /// An image: `![alt](url)`.
        Image => "image",
        /// An autolink: `<https://...>`.
        Autolink => "autolink",
        /// Punctuation of links, images and autolinks.
        LinkMark => "link mark",
        /// The destination of a link.
        Url => "url",

        /// A colon: `:`.
        Colon => "colon",
        /// An opening brace: `{`.
        LeftBrace => "opening brace",
        /// A closing brace: `}`.
        RightBrace => "closing brace",
        /// An opening bracket: `[`.
        LeftBracket => "opening bracket",
        /// A closing bracket: `]`.
        RightBracket => "closing bracket",
        /// An opening paren: `(`.
        LeftParen => "opening paren",
        /// A closing paren: `)`.
        RightParen => "closing paren",
    }
}

kinds! {
    /// The node types of the embedded script grammar.
    pub enum ScriptKind {
        /// The root of a statement list.
        Statements => "statements",
        /// The root of a single expression.
        Expression => "expression",
        /// The root of an attribute list's entries.
        Attributes => "attributes",

        /// Whitespace.
        Space => "space",
        /// A line comment: `// ...`.
        LineComment => "line comment",
        /// A block comment: `/* ... */`.
        BlockComment => "block comment",
        /// An embedded document command: `@name{...}`.
        Embed => "document command",

        /// An identifier: `it`.
        Ident => "identifier",
        /// A number: `1.5`.
        Number => "number",
        /// A quoted string: `"hi"`.
        Str => "string",
        /// A template string: `` `a${b}` ``.
        Template => "template string",

        /// The `let` keyword.
        Let => "keyword `let`",
        /// The `const` keyword.
        Const => "keyword `const`",
        /// The `var` keyword.
        Var => "keyword `var`",
        /// The `function` keyword.
        Function => "keyword `function`",
        /// The `async` keyword.
        Async => "keyword `async`",
        /// The `await` keyword.
        Await => "keyword `await`",
        /// The `return` keyword.
        Return => "keyword `return`",
        /// The `if` keyword.
        If => "keyword `if`",
        /// The `else` keyword.
        Else => "keyword `else`",
        /// The `for` keyword.
        For => "keyword `for`",
        /// The `while` keyword.
        While => "keyword `while`",
        /// The `of` keyword.
        Of => "keyword `of`",
        /// The `in` keyword.
        In => "keyword `in`",
        /// The `instanceof` keyword.
        Instanceof => "keyword `instanceof`",
        /// The `typeof` keyword.
        Typeof => "keyword `typeof`",
        /// The `new` keyword.
        New => "keyword `new`",
        /// The `break` keyword.
        Break => "keyword `break`",
        /// The `continue` keyword.
        Continue => "keyword `continue`",
        /// The `import` keyword.
        Import => "keyword `import`",
        /// The `export` keyword.
        Export => "keyword `export`",
        /// The `from` keyword.
        From => "keyword `from`",
        /// The `as` keyword.
        As => "keyword `as`",
        /// The `default` keyword.
        Default => "keyword `default`",
        /// The `true` or `false` literal.
        Bool => "boolean",
        /// The `null` literal.
        Null => "null",
        /// The `this` keyword.
        This => "keyword `this`",

        /// An opening brace: `{`.
        LeftBrace => "opening brace",
        /// A closing brace: `}`.
        RightBrace => "closing brace",
        /// An opening bracket: `[`.
        LeftBracket => "opening bracket",
        /// A closing bracket: `]`.
        RightBracket => "closing bracket",
        /// An opening paren: `(`.
        LeftParen => "opening paren",
        /// A closing paren: `)`.
        RightParen => "closing paren",
        /// A comma: `,`.
        Comma => "comma",
        /// A semicolon: `;`.
        Semicolon => "semicolon",
        /// A colon: `:`.
        Colon => "colon",
        /// A dot: `.`.
        Dot => "dot",
        /// An optional chain: `?.`.
        QuestionDot => "optional chain",
        /// A spread: `...`.
        Dots => "spread",
        /// A question mark: `?`.
        Question => "question mark",
        /// An arrow: `=>`.
        Arrow => "arrow",
        /// An assignment operator: `=`, `+=`, `??=`, ...
        Assign => "assignment operator",
        /// A binary operator: `+`, `===`, `&&`, ...
        BinOp => "binary operator",
        /// A prefix operator: `!`, `~`.
        Bang => "prefix operator",
        /// A plus: `+`.
        Plus => "plus",
        /// A minus: `-`.
        Minus => "minus",
        /// An increment or decrement: `++`, `--`.
        Step => "increment operator",
        /// A star: `*`.
        Star => "star",

        /// A variable declaration: `let x = 1`.
        VarDecl => "variable declaration",
        /// A function declaration: `function f() {}`.
        FuncDecl => "function declaration",
        /// An import declaration.
        ImportDecl => "import declaration",
        /// An export declaration.
        ExportDecl => "export declaration",
        /// A return statement.
        ReturnStmt => "return statement",
        /// An if statement.
        IfStmt => "if statement",
        /// A for loop.
        ForStmt => "for loop",
        /// A while loop.
        WhileStmt => "while loop",
        /// A break or continue statement.
        JumpStmt => "jump statement",
        /// An expression statement.
        ExprStmt => "expression statement",
        /// A block of statements: `{ ... }`.
        Block => "block",
        /// A parameter list: `(a, b = 1)`.
        Params => "parameters",
        /// An argument list: `(a, ...b)`.
        Args => "arguments",
        /// An array literal: `[1, 2]`.
        Array => "array",
        /// An object literal: `{a: 1}`.
        Object => "object",
        /// A property of an object literal or attribute list.
        Property => "property",
        /// A spread element: `...xs`.
        Spread => "spread element",
        /// A parenthesized expression: `(x)`.
        Paren => "parenthesized expression",
        /// A member access: `a.b`.
        Member => "member access",
        /// An index access: `a[b]`.
        Index => "index access",
        /// A call: `f(x)`.
        Call => "call",
        /// An instantiation: `new C(x)`.
        NewExpr => "new expression",
        /// A prefix operation: `!x`.
        Unary => "unary expression",
        /// A postfix operation: `x++`.
        Postfix => "postfix expression",
        /// A binary operation: `a + b`.
        Binary => "binary expression",
        /// A conditional: `a ? b : c`.
        Ternary => "conditional expression",
        /// An assignment: `a = b`.
        Assignment => "assignment",
        /// An arrow function: `(a) => b`.
        ArrowFunc => "arrow function",
        /// A function expression: `function () {}`.
        FuncExpr => "function expression",

        /// The end of the token stream.
        End => "end of tokens",
    }
}

/// Maps the node type names of one grammar to their kinds.
///
/// Each grammar has exactly one registry, created on first use and immutable
/// afterwards.
pub struct KindRegistry {
    grammar: &'static str,
    kinds: Vec<SyntaxKind>,
    by_name: FxHashMap<&'static str, SyntaxKind>,
}

impl KindRegistry {
    fn new(grammar: &'static str, kinds: impl IntoIterator<Item = SyntaxKind>) -> Self {
        let kinds: Vec<_> = kinds.into_iter().collect();
        let by_name = kinds.iter().map(|&kind| (kind.name(), kind)).collect();
        Self { grammar, kinds, by_name }
    }

    /// The registry of the document grammar.
    pub fn markup() -> &'static Self {
        static REGISTRY: LazyLock<KindRegistry> = LazyLock::new(|| {
            KindRegistry::new("markup", MarkupKind::ALL.iter().map(|&k| k.into()))
        });
        &REGISTRY
    }

    /// The registry of the script grammar.
    pub fn script() -> &'static Self {
        static REGISTRY: LazyLock<KindRegistry> = LazyLock::new(|| {
            KindRegistry::new("script", ScriptKind::ALL.iter().map(|&k| k.into()))
        });
        &REGISTRY
    }

    /// The name of the grammar owning this registry.
    pub fn grammar(&self) -> &'static str {
        self.grammar
    }

    /// The number of registered kinds.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Look up a kind by its numeric id.
    pub fn get(&self, id: u16) -> Option<SyntaxKind> {
        self.kinds.get(usize::from(id)).copied()
    }

    /// Look up a kind by its human-readable name.
    pub fn lookup(&self, name: &str) -> Option<SyntaxKind> {
        self.by_name.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_ids_round_trip() {
        for registry in [KindRegistry::markup(), KindRegistry::script()] {
            for id in 0..registry.len() as u16 {
                let kind = registry.get(id).unwrap();
                assert_eq!(kind.id(), id);
                assert_eq!(kind.grammar(), Some(registry.grammar()));
            }
        }
    }

    #[test]
    fn test_registry_lookup() {
        assert_eq!(
            KindRegistry::markup().lookup("attribute value"),
            Some(SyntaxKind::Markup(MarkupKind::AttributeValue))
        );
        assert_eq!(
            KindRegistry::script().lookup("document command"),
            Some(SyntaxKind::Script(ScriptKind::Embed))
        );
        assert_eq!(KindRegistry::script().lookup("paragraph"), None);
    }

    #[test]
    fn test_ids_are_grammar_local() {
        let text = SyntaxKind::Markup(MarkupKind::Document);
        let statements = SyntaxKind::Script(ScriptKind::Statements);
        assert_eq!(text.id(), statements.id());
        assert_ne!(text, statements);
    }
}
