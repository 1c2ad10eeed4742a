use std::ops::Range;

use ecow::{EcoString, eco_format};
use unscanny::Scanner;

use crate::context::Bracket;
use crate::lexer::{balanced_body, balanced_group, is_id_continue, is_id_start, is_newline};
use crate::{ScriptKind, SyntaxKind, SyntaxNode};

/// An iterator over a range of script source which returns tokens.
///
/// Token nodes carry absolute offsets into the whole text.
#[derive(Clone)]
pub(super) struct Lexer<'s> {
    /// The scanner over the text up to the end of the range.
    s: Scanner<'s>,
    /// An error for the last token.
    error: Option<EcoString>,
}

impl<'s> Lexer<'s> {
    /// Create a new lexer over `range` of `text`.
    pub fn new(text: &'s str, range: Range<usize>) -> Self {
        let mut s = Scanner::new(&text[..range.end]);
        s.jump(range.start);
        Self { s, error: None }
    }

    /// The index at which the last token ends and next token will start.
    pub fn cursor(&self) -> usize {
        self.s.cursor()
    }

    /// Return the next token along with its kind.
    pub fn next(&mut self) -> (SyntaxKind, SyntaxNode) {
        debug_assert!(self.error.is_none());
        let start = self.s.cursor();
        let kind = match self.s.eat() {
            Some(c) if c.is_whitespace() => {
                self.s.eat_while(char::is_whitespace);
                ScriptKind::Space
            }
            Some('/') if self.s.eat_if('/') => {
                self.s.eat_until(is_newline);
                ScriptKind::LineComment
            }
            Some('/') if self.s.eat_if('*') => self.block_comment(),
            Some(c) => self.token(start, c),
            None => ScriptKind::End,
        };

        let text = self.s.from(start);
        match self.error.take() {
            Some(message) => (SyntaxKind::Error, SyntaxNode::error(message, text, start)),
            None => (kind.into(), SyntaxNode::leaf(kind, text, start)),
        }
    }

    fn error(&mut self, message: impl Into<EcoString>) -> ScriptKind {
        self.error = Some(message.into());
        ScriptKind::End
    }

    fn block_comment(&mut self) -> ScriptKind {
        self.s.eat_until("*/");
        if self.s.eat_if("*/") {
            return ScriptKind::BlockComment;
        }
        self.error("unclosed block comment")
    }

    fn token(&mut self, start: usize, c: char) -> ScriptKind {
        match c {
            '@' | '#' => self.embed(start),
            '"' | '\'' => self.string(c),
            '`' => self.template(),
            '0'..='9' => self.number(c),
            '.' if self.s.at(|c: char| c.is_ascii_digit()) => self.number(c),
            '.' if self.s.eat_if("..") => ScriptKind::Dots,
            '.' => ScriptKind::Dot,

            '{' => ScriptKind::LeftBrace,
            '}' => ScriptKind::RightBrace,
            '[' => ScriptKind::LeftBracket,
            ']' => ScriptKind::RightBracket,
            '(' => ScriptKind::LeftParen,
            ')' => ScriptKind::RightParen,
            ',' => ScriptKind::Comma,
            ';' => ScriptKind::Semicolon,
            ':' => ScriptKind::Colon,

            '?' if self.s.at('.') && !self.s.scout(1).is_some_and(|c| c.is_ascii_digit()) => {
                self.s.eat();
                ScriptKind::QuestionDot
            }
            '?' if self.s.eat_if("?=") => ScriptKind::Assign,
            '?' if self.s.eat_if('?') => ScriptKind::BinOp,
            '?' => ScriptKind::Question,

            '=' if self.s.eat_if('>') => ScriptKind::Arrow,
            '=' if self.s.eat_if("==") || self.s.eat_if('=') => ScriptKind::BinOp,
            '=' => ScriptKind::Assign,
            '!' if self.s.eat_if("==") || self.s.eat_if('=') => ScriptKind::BinOp,
            '!' | '~' => ScriptKind::Bang,

            '+' if self.s.eat_if('+') => ScriptKind::Step,
            '-' if self.s.eat_if('-') => ScriptKind::Step,
            '+' | '-' if self.s.eat_if('=') => ScriptKind::Assign,
            '+' => ScriptKind::Plus,
            '-' => ScriptKind::Minus,

            '*' if self.s.eat_if("*=") => ScriptKind::Assign,
            '*' if self.s.eat_if('*') => ScriptKind::BinOp,
            '*' if self.s.eat_if('=') => ScriptKind::Assign,
            '*' => ScriptKind::Star,

            '&' | '|' if self.s.eat_if(c) => self.maybe_assign(),
            '<' if self.s.eat_if('<') => self.maybe_assign(),
            '>' if self.s.eat_if('>') => {
                self.s.eat_if('>');
                self.maybe_assign()
            }
            '<' | '>' => {
                self.s.eat_if('=');
                ScriptKind::BinOp
            }
            '/' | '%' | '&' | '|' | '^' => self.maybe_assign(),

            c if is_id_start(c) => self.ident(start),

            c => self.error(eco_format!("the character `{c}` is not valid in script")),
        }
    }

    /// Finish an operator that may be followed by `=`.
    fn maybe_assign(&mut self) -> ScriptKind {
        if self.s.eat_if('=') { ScriptKind::Assign } else { ScriptKind::BinOp }
    }

    /// Lex a document command embedded in script: a sigil, an optional name
    /// and any directly following bracketed groups.
    fn embed(&mut self, start: usize) -> ScriptKind {
        let text = self.s.string();
        if self.s.at(is_id_start) {
            self.s.eat_while(is_id_continue);
        } else if self.s.at(|c: char| c.is_ascii_digit()) {
            self.s.eat_while(|c: char| c.is_ascii_digit());
        } else if self.s.at('(') {
            let group = balanced_group(text, self.s.cursor() + 1, Bracket::Paren, text.len());
            if !group.closed {
                self.s.jump(group.end);
                return self.error("unclosed dynamic command name");
            }
            self.s.jump(group.end + 1);
        }

        loop {
            let pos = self.s.cursor();
            if self.s.at('[') {
                let group = balanced_group(text, pos + 1, Bracket::Square, text.len());
                if !group.closed {
                    self.s.jump(group.end);
                    return self.error("unclosed attribute list");
                }
                self.s.jump(group.end + 1);
            } else if self.s.at('{') {
                let body = balanced_body(text, pos + 1);
                if !body.closed {
                    self.s.jump(body.end);
                    return self.error("unclosed command body");
                }
                self.s.jump(body.end + 1);
            } else {
                break;
            }
        }

        if self.s.cursor() == start + 1 {
            return self.error("expected command name or body");
        }
        ScriptKind::Embed
    }

    fn string(&mut self, quote: char) -> ScriptKind {
        let mut escaped = false;
        self.s.eat_until(|c| {
            let stop = (c == quote && !escaped) || (is_newline(c) && !escaped);
            escaped = c == '\\' && !escaped;
            stop
        });

        if !self.s.eat_if(quote) {
            return self.error("unclosed string");
        }
        ScriptKind::Str
    }

    fn template(&mut self) -> ScriptKind {
        let mut depth = 0usize;
        while let Some(c) = self.s.eat() {
            match c {
                '\\' => {
                    self.s.eat();
                }
                '$' if depth == 0 && self.s.eat_if('{') => depth += 1,
                '{' if depth > 0 => depth += 1,
                '}' if depth > 0 => depth -= 1,
                '`' if depth == 0 => return ScriptKind::Template,
                _ => {}
            }
        }
        self.error("unclosed template string")
    }

    fn number(&mut self, c: char) -> ScriptKind {
        if c == '0' && self.s.eat_if(['x', 'X', 'o', 'O', 'b', 'B']) {
            self.s.eat_while(|c: char| c.is_ascii_hexdigit() || c == '_');
        } else {
            self.s.eat_while(|c: char| c.is_ascii_digit() || c == '_');
            if c != '.' && self.s.at('.') && self.s.scout(1).is_some_and(|c| c.is_ascii_digit()) {
                self.s.eat();
                self.s.eat_while(|c: char| c.is_ascii_digit() || c == '_');
            }
            if self.s.eat_if(['e', 'E']) {
                self.s.eat_if(['+', '-']);
                if self.s.eat_while(|c: char| c.is_ascii_digit()).is_empty() {
                    return self.error("invalid number exponent");
                }
            }
        }
        self.s.eat_if('n');

        if self.s.at(is_id_continue) {
            self.s.eat_while(is_id_continue);
            return self.error("invalid number suffix");
        }
        ScriptKind::Number
    }

    fn ident(&mut self, start: usize) -> ScriptKind {
        self.s.eat_while(is_id_continue);
        let ident = self.s.from(start);

        let prev = self.s.get(0..start).trim_end();
        if !prev.ends_with('.') || prev.ends_with("...") {
            if let Some(keyword) = keyword(ident) {
                return keyword;
            }
        }
        ScriptKind::Ident
    }
}

/// Try to parse an identifier into a keyword.
fn keyword(ident: &str) -> Option<ScriptKind> {
    Some(match ident {
        "let" => ScriptKind::Let,
        "const" => ScriptKind::Const,
        "var" => ScriptKind::Var,
        "function" => ScriptKind::Function,
        "async" => ScriptKind::Async,
        "await" => ScriptKind::Await,
        "return" => ScriptKind::Return,
        "if" => ScriptKind::If,
        "else" => ScriptKind::Else,
        "for" => ScriptKind::For,
        "while" => ScriptKind::While,
        "of" => ScriptKind::Of,
        "in" => ScriptKind::In,
        "instanceof" => ScriptKind::Instanceof,
        "typeof" => ScriptKind::Typeof,
        "new" => ScriptKind::New,
        "break" => ScriptKind::Break,
        "continue" => ScriptKind::Continue,
        "import" => ScriptKind::Import,
        "export" => ScriptKind::Export,
        "from" => ScriptKind::From,
        "as" => ScriptKind::As,
        "default" => ScriptKind::Default,
        "true" | "false" => ScriptKind::Bool,
        "null" | "undefined" => ScriptKind::Null,
        "this" => ScriptKind::This,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<(SyntaxKind, &str)> {
        let mut lexer = Lexer::new(text, 0..text.len());
        let mut tokens = vec![];
        loop {
            let (kind, node) = lexer.next();
            if kind == ScriptKind::End.into() {
                break;
            }
            let range = node.range();
            tokens.push((kind, &text[range]));
        }
        tokens
    }

    fn kinds(text: &str) -> Vec<SyntaxKind> {
        tokens(text)
            .into_iter()
            .map(|(kind, _)| kind)
            .filter(|&kind| kind != SyntaxKind::Script(ScriptKind::Space))
            .collect()
    }

    macro_rules! s {
        ($($kind:ident),*) => { vec![$(SyntaxKind::Script(ScriptKind::$kind)),*] };
    }

    #[test]
    fn test_operators() {
        assert_eq!(kinds("a ?? b?.c"), s![Ident, BinOp, Ident, QuestionDot, Ident]);
        assert_eq!(kinds("x ??= y === z"), s![Ident, Assign, Ident, BinOp, Ident]);
        assert_eq!(kinds("i++ + -j"), s![Ident, Step, Plus, Minus, Ident]);
        assert_eq!(kinds("a >>>= 2 ** 3"), s![Ident, Assign, Number, BinOp, Number]);
        assert_eq!(kinds("(x) => ...xs"), s![LeftParen, Ident, RightParen, Arrow, Dots, Ident]);
        assert_eq!(kinds("a ? .5 : b"), s![Ident, Question, Number, Colon, Ident]);
    }

    #[test]
    fn test_keywords_after_dot_are_idents() {
        assert_eq!(kinds("x.default"), s![Ident, Dot, Ident]);
        assert_eq!(kinds("...default"), s![Dots, Default]);
        assert_eq!(kinds("let of = new X"), s![Let, Of, Assign, New, Ident]);
    }

    #[test]
    fn test_literals() {
        assert_eq!(tokens(r#""a\"b""#), vec![(ScriptKind::Str.into(), r#""a\"b""#)]);
        assert_eq!(kinds("'x' 1_000 0xFF 1e9 10n"), s![Str, Number, Number, Number, Number]);
        assert_eq!(kinds("`a${ {b: 1}.b }c`"), s![Template]);
        assert_eq!(kinds("// c\n/* d */ x"), s![LineComment, BlockComment, Ident]);
    }

    #[test]
    fn test_embeds() {
        assert_eq!(
            tokens("f(@em{a}, #x)"),
            vec![
                (ScriptKind::Ident.into(), "f"),
                (ScriptKind::LeftParen.into(), "("),
                (ScriptKind::Embed.into(), "@em{a}"),
                (ScriptKind::Comma.into(), ","),
                (ScriptKind::Space.into(), " "),
                (ScriptKind::Embed.into(), "#x"),
                (ScriptKind::RightParen.into(), ")"),
            ],
        );
        assert_eq!(kinds("@Tip[a: [1]]{x}{y}"), s![Embed]);
        assert_eq!(kinds("@{anon}"), s![Embed]);
    }

    #[test]
    fn test_errors() {
        assert_eq!(kinds("\"abc"), vec![SyntaxKind::Error]);
        assert_eq!(kinds("@ x"), vec![SyntaxKind::Error, SyntaxKind::Script(ScriptKind::Ident)]);
        assert_eq!(kinds("@em{a"), vec![SyntaxKind::Error]);
        assert_eq!(kinds("1px"), vec![SyntaxKind::Error]);
    }

    #[test]
    fn test_range_offsets() {
        let text = "| v: a + 1";
        let mut lexer = Lexer::new(text, 5..text.len());
        let (_, node) = lexer.next();
        assert_eq!(node.range(), 5..6);
        assert_eq!(node.text(), "a");
    }
}
