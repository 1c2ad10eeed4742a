use std::ops::Range;

use ecow::eco_format;
use rustc_hash::FxHashMap;

use super::lexer::Lexer;
use crate::set::{self, ScriptSet, script_set};
use crate::{MAX_DEPTH, ScriptKind, SyntaxKind, SyntaxNode};

/// The result of parsing a range of script.
pub(crate) struct ScriptOutput {
    /// The root node, spanning exactly the parsed range.
    pub node: SyntaxNode,
    /// Where parsing gave up because the nesting got too deep.
    pub overflow: Option<usize>,
}

/// Parse a sequence of statements, like the body of a script block.
pub(crate) fn statements(text: &str, range: Range<usize>) -> ScriptOutput {
    let mut p = Parser::new(text, range);
    while !p.end() {
        if p.at_set(set::STMT.union(set::EXPR)) {
            statement(&mut p);
        } else {
            p.unexpected();
        }
    }
    p.finish(ScriptKind::Statements)
}

/// Parse a single expression, like an attribute value.
pub(crate) fn expression(text: &str, range: Range<usize>) -> ScriptOutput {
    let mut p = Parser::new(text, range);
    if p.at_set(set::EXPR) {
        expr(&mut p);
    } else if !p.end() {
        p.expected("expression");
    }
    while !p.end() {
        p.unexpected();
    }
    p.finish(ScriptKind::Expression)
}

/// Parse the comma-separated properties of an inline attribute list.
pub(crate) fn attributes(text: &str, range: Range<usize>) -> ScriptOutput {
    let mut p = Parser::new(text, range);
    while !p.end() {
        if !p.at_set(set::PROPERTY_KEY.add(ScriptKind::Dots)) {
            p.unexpected();
            continue;
        }
        property(&mut p);
        if !p.end() {
            p.expect(ScriptKind::Comma);
        }
    }
    p.finish(ScriptKind::Attributes)
}

/// Parses a statement.
fn statement(p: &mut Parser) {
    if !p.enter() {
        return;
    }
    let m = p.marker();
    match p.current_kind() {
        Some(ScriptKind::Let | ScriptKind::Const | ScriptKind::Var) => {
            var_decl(p);
            end_stmt(p);
            p.wrap(m, ScriptKind::VarDecl);
        }
        Some(ScriptKind::Function) => func_decl(p, m),
        Some(ScriptKind::Async) if p.peek_at(ScriptKind::Function) => {
            p.eat();
            func_decl(p, m);
        }
        Some(ScriptKind::Return) => {
            p.eat();
            if !p.newline() && p.at_set(set::EXPR) {
                expr(p);
            }
            end_stmt(p);
            p.wrap(m, ScriptKind::ReturnStmt);
        }
        Some(ScriptKind::If) => if_stmt(p, m),
        Some(ScriptKind::For) => for_stmt(p, m),
        Some(ScriptKind::While) => {
            p.eat();
            condition(p);
            body(p);
            p.wrap(m, ScriptKind::WhileStmt);
        }
        Some(ScriptKind::Break | ScriptKind::Continue) => {
            p.eat();
            if !p.newline() && p.at(ScriptKind::Ident) {
                p.eat();
            }
            end_stmt(p);
            p.wrap(m, ScriptKind::JumpStmt);
        }
        Some(ScriptKind::Import) => import_decl(p, m),
        Some(ScriptKind::Export) => export_decl(p, m),
        Some(ScriptKind::LeftBrace) => block(p),
        Some(ScriptKind::Semicolon) => p.eat(),
        _ => {
            expr(p);
            end_stmt(p);
            p.wrap(m, ScriptKind::ExprStmt);
        }
    }
    p.exit();
}

/// Finishes a statement with a semicolon or by automatic insertion at a line
/// break or before a closing brace.
fn end_stmt(p: &mut Parser) {
    if !p.eat_if(ScriptKind::Semicolon)
        && !p.newline()
        && !p.at_set(set::STMT_END)
    {
        p.expected("semicolon or line break");
    }
}

/// Parses the declarators of a variable declaration: `let a = 1, [b] = xs`.
fn var_decl(p: &mut Parser) {
    p.eat();
    loop {
        binding(p);
        if p.eat_if(ScriptKind::Assign) {
            expr_prec(p, ASSIGN_PREC);
        }
        if !p.eat_if(ScriptKind::Comma) {
            break;
        }
    }
}

/// Parses a binding target: an identifier or a destructuring pattern.
fn binding(p: &mut Parser) {
    match p.current_kind() {
        Some(ScriptKind::LeftBracket) => array(p),
        Some(ScriptKind::LeftBrace) => object(p),
        _ => {
            p.expect(ScriptKind::Ident);
        }
    }
}

/// Parses a function declaration: `function f(a) { ... }`.
fn func_decl(p: &mut Parser, m: Marker) {
    p.assert(ScriptKind::Function);
    p.eat_if(ScriptKind::Star);
    p.expect(ScriptKind::Ident);
    params(p);
    block(p);
    p.wrap(m, ScriptKind::FuncDecl);
}

fn if_stmt(p: &mut Parser, m: Marker) {
    p.assert(ScriptKind::If);
    condition(p);
    body(p);
    if p.eat_if(ScriptKind::Else) {
        body(p);
    }
    p.wrap(m, ScriptKind::IfStmt);
}

/// Parses both loop heads: `for (init; test; update)` and
/// `for (const x of xs)`.
fn for_stmt(p: &mut Parser, m: Marker) {
    p.assert(ScriptKind::For);
    p.eat_if(ScriptKind::Await);
    let open = p.marker();
    p.expect(ScriptKind::LeftParen);

    if p.at_set(script_set!(Let, Const, Var)) {
        p.eat();
        binding(p);
        if p.eat_if(ScriptKind::Assign) {
            expr(p);
        }
    } else if !p.at(ScriptKind::Semicolon) {
        expr(p);
    }

    if p.eat_if(ScriptKind::Of) || p.eat_if(ScriptKind::In) {
        expr(p);
    } else {
        for _ in 0..2 {
            p.expect(ScriptKind::Semicolon);
            if !p.at_set(script_set!(Semicolon, RightParen)) {
                expr(p);
            }
        }
    }

    p.expect_closing_delimiter(open, ScriptKind::RightParen);
    body(p);
    p.wrap(m, ScriptKind::ForStmt);
}

/// Parses a parenthesized loop or branch condition.
fn condition(p: &mut Parser) {
    let open = p.marker();
    if p.expect(ScriptKind::LeftParen) {
        expr(p);
        p.expect_closing_delimiter(open, ScriptKind::RightParen);
    }
}

/// Parses the body of a branch or loop.
fn body(p: &mut Parser) {
    if p.at_set(set::STMT.union(set::EXPR)) {
        statement(p);
    } else {
        p.expected("statement");
    }
}

/// Parses an import declaration: `import a, { b as c } from "d"`.
fn import_decl(p: &mut Parser, m: Marker) {
    p.assert(ScriptKind::Import);
    if !p.eat_if(ScriptKind::Str) {
        loop {
            match p.current_kind() {
                Some(ScriptKind::Ident) => p.eat(),
                Some(ScriptKind::Star) => {
                    p.eat();
                    p.expect(ScriptKind::As);
                    p.expect(ScriptKind::Ident);
                }
                Some(ScriptKind::LeftBrace) => specifiers(p),
                _ => {
                    p.expected("import specifier");
                    break;
                }
            }
            if !p.eat_if(ScriptKind::Comma) {
                break;
            }
        }
        p.expect(ScriptKind::From);
        p.expect(ScriptKind::Str);
    }
    end_stmt(p);
    p.wrap(m, ScriptKind::ImportDecl);
}

/// Parses an export declaration.
fn export_decl(p: &mut Parser, m: Marker) {
    p.assert(ScriptKind::Export);
    match p.current_kind() {
        Some(ScriptKind::Default) => {
            p.eat();
            expr(p);
            end_stmt(p);
        }
        Some(ScriptKind::Let | ScriptKind::Const | ScriptKind::Var) => {
            let inner = p.marker();
            var_decl(p);
            end_stmt(p);
            p.wrap(inner, ScriptKind::VarDecl);
        }
        Some(ScriptKind::Function) => {
            let inner = p.marker();
            func_decl(p, inner);
        }
        Some(ScriptKind::Async) if p.peek_at(ScriptKind::Function) => {
            let inner = p.marker();
            p.eat();
            func_decl(p, inner);
        }
        Some(ScriptKind::LeftBrace | ScriptKind::Star) => {
            if !p.eat_if(ScriptKind::Star) {
                specifiers(p);
            } else if p.eat_if(ScriptKind::As) {
                p.expect(ScriptKind::Ident);
            }
            if p.eat_if(ScriptKind::From) {
                p.expect(ScriptKind::Str);
            }
            end_stmt(p);
        }
        _ => p.expected("declaration or export list"),
    }
    p.wrap(m, ScriptKind::ExportDecl);
}

/// Parses a braced list of import or export specifiers: `{ a, b as c }`.
fn specifiers(p: &mut Parser) {
    let open = p.marker();
    p.assert(ScriptKind::LeftBrace);
    while !p.at_set(set::STMT_END) {
        if !p.at(ScriptKind::Ident) && !p.at_set(set::KEYWORD) {
            p.unexpected();
            continue;
        }
        p.convert_and_eat(ScriptKind::Ident);
        if p.eat_if(ScriptKind::As) {
            if p.at_set(set::KEYWORD) {
                p.convert_and_eat(ScriptKind::Ident);
            } else {
                p.expect(ScriptKind::Ident);
            }
        }
        if !p.at(ScriptKind::RightBrace) {
            p.expect(ScriptKind::Comma);
        }
    }
    p.expect_closing_delimiter(open, ScriptKind::RightBrace);
}

/// Parses a block of statements: `{ ... }`.
fn block(p: &mut Parser) {
    let m = p.marker();
    let open = p.marker();
    if !p.expect(ScriptKind::LeftBrace) {
        return;
    }
    while !p.at_set(set::STMT_END) {
        if p.at_set(set::STMT.union(set::EXPR)) {
            statement(p);
        } else {
            p.unexpected();
        }
    }
    p.expect_closing_delimiter(open, ScriptKind::RightBrace);
    p.wrap(m, ScriptKind::Block);
}

/// The binding power of assignments.
const ASSIGN_PREC: u8 = 2;
/// The binding power of conditionals.
const TERNARY_PREC: u8 = 3;
/// The binding power of prefix operators.
const UNARY_PREC: u8 = 15;

/// The binding power and associativity of a binary operator.
fn binary_prec(kind: ScriptKind, text: &str) -> Option<(u8, bool)> {
    let prec = match kind {
        ScriptKind::Plus | ScriptKind::Minus => 12,
        ScriptKind::Star => 13,
        ScriptKind::In | ScriptKind::Instanceof => 10,
        ScriptKind::BinOp => match text {
            "??" | "||" => 4,
            "&&" => 5,
            "|" => 6,
            "^" => 7,
            "&" => 8,
            "==" | "!=" | "===" | "!==" => 9,
            "<" | ">" | "<=" | ">=" => 10,
            "<<" | ">>" | ">>>" => 11,
            "/" | "%" => 13,
            "**" => return Some((14, true)),
            _ => return None,
        },
        _ => return None,
    };
    Some((prec, false))
}

/// Parses an expression, including assignments.
fn expr(p: &mut Parser) {
    expr_prec(p, ASSIGN_PREC)
}

/// Parses an expression whose operators bind at least as tightly as
/// `min_prec`.
fn expr_prec(p: &mut Parser, min_prec: u8) {
    if !p.enter() {
        return;
    }

    let m = p.marker();
    if p.at_set(set::UNARY_OP) {
        p.eat();
        expr_prec(p, UNARY_PREC);
        p.wrap(m, ScriptKind::Unary);
    } else {
        primary(p);
    }

    loop {
        if postfix(p, m, true) {
            continue;
        }

        let Some(kind) = p.current_kind() else { break };
        if kind == ScriptKind::Assign {
            if min_prec > ASSIGN_PREC {
                break;
            }
            p.eat();
            expr_prec(p, ASSIGN_PREC);
            p.wrap(m, ScriptKind::Assignment);
            continue;
        }

        if kind == ScriptKind::Question {
            if min_prec > TERNARY_PREC {
                break;
            }
            p.eat();
            expr_prec(p, ASSIGN_PREC);
            p.expect(ScriptKind::Colon);
            expr_prec(p, ASSIGN_PREC);
            p.wrap(m, ScriptKind::Ternary);
            continue;
        }

        let Some((prec, right)) = binary_prec(kind, p.current_text()) else { break };
        if prec < min_prec {
            break;
        }
        p.eat();
        expr_prec(p, if right { prec } else { prec + 1 });
        p.wrap(m, ScriptKind::Binary);
    }

    p.exit();
}

/// Parses one postfix operation on the expression starting at `m`. Returns
/// whether one was found.
///
/// Calls and index accesses only continue an expression on the same line.
fn postfix(p: &mut Parser, m: Marker, calls: bool) -> bool {
    match p.current_kind() {
        Some(ScriptKind::Dot) => {
            p.eat();
            p.expect(ScriptKind::Ident);
            p.wrap(m, ScriptKind::Member);
        }
        Some(ScriptKind::QuestionDot) => {
            p.eat();
            match p.current_kind() {
                Some(ScriptKind::LeftParen) if calls => {
                    args(p);
                    p.wrap(m, ScriptKind::Call);
                }
                Some(ScriptKind::LeftBracket) => {
                    index(p);
                    p.wrap(m, ScriptKind::Index);
                }
                _ => {
                    p.expect(ScriptKind::Ident);
                    p.wrap(m, ScriptKind::Member);
                }
            }
        }
        Some(ScriptKind::LeftParen) if calls && !p.newline() => {
            args(p);
            p.wrap(m, ScriptKind::Call);
        }
        Some(ScriptKind::LeftBracket) if !p.newline() => {
            index(p);
            p.wrap(m, ScriptKind::Index);
        }
        Some(ScriptKind::Template) if calls && !p.newline() => {
            p.eat();
            p.wrap(m, ScriptKind::Call);
        }
        Some(ScriptKind::Step) if calls && !p.newline() => {
            p.eat();
            p.wrap(m, ScriptKind::Postfix);
        }
        _ => return false,
    }
    true
}

/// Parses an index access: `[expr]`.
fn index(p: &mut Parser) {
    let open = p.marker();
    p.assert(ScriptKind::LeftBracket);
    expr(p);
    p.expect_closing_delimiter(open, ScriptKind::RightBracket);
}

/// Parses a primary expression.
fn primary(p: &mut Parser) {
    let m = p.marker();
    match p.current_kind() {
        Some(ScriptKind::Ident) => {
            p.eat();
            if p.at(ScriptKind::Arrow) && !p.newline() {
                p.wrap(m, ScriptKind::Params);
                p.eat();
                arrow_body(p);
                p.wrap(m, ScriptKind::ArrowFunc);
            }
        }
        Some(ScriptKind::Async) => {
            p.eat();
            if p.at_set(script_set!(Ident, LeftParen, Function)) && !p.newline() {
                let inner = p.marker();
                primary(p);
                let kind = match p.nodes.get(inner.0).and_then(|node| node.kind().script()) {
                    Some(ScriptKind::FuncExpr) => ScriptKind::FuncExpr,
                    _ => ScriptKind::ArrowFunc,
                };
                p.wrap(m, kind);
            }
        }
        Some(ScriptKind::LeftParen) => paren_or_arrow(p),
        Some(ScriptKind::LeftBracket) => array(p),
        Some(ScriptKind::LeftBrace) => object(p),
        Some(ScriptKind::Function) => {
            p.eat();
            p.eat_if(ScriptKind::Star);
            p.eat_if(ScriptKind::Ident);
            params(p);
            block(p);
            p.wrap(m, ScriptKind::FuncExpr);
        }
        Some(ScriptKind::New) => {
            p.eat();
            let callee = p.marker();
            if p.at(ScriptKind::New) {
                primary(p);
            } else {
                primary(p);
                while postfix(p, callee, false) {}
            }
            if p.at(ScriptKind::LeftParen) && !p.newline() {
                args(p);
            }
            p.wrap(m, ScriptKind::NewExpr);
        }
        Some(
            ScriptKind::Number
            | ScriptKind::Str
            | ScriptKind::Template
            | ScriptKind::Bool
            | ScriptKind::Null
            | ScriptKind::This
            | ScriptKind::Embed,
        ) => p.eat(),
        _ => p.expected("expression"),
    }
}

/// Parses a parenthesized expression or, if an arrow follows, reparses it as
/// the parameter list of an arrow function.
fn paren_or_arrow(p: &mut Parser) {
    // A parenthesized group is parsed at most twice: once speculatively and,
    // when an arrow follows, once more as parameters. The second result is
    // memoized so that nested arrow functions stay linear.
    let start = p.current_start();
    if let Some((range, end_point)) = p.memo.get(&start).cloned() {
        p.restore_memo(end_point);
        p.nodes.extend(p.memo_arena[range].iter().cloned());
        return;
    }

    let m = p.marker();
    let checkpoint = p.checkpoint();

    let open = p.marker();
    p.assert(ScriptKind::LeftParen);
    while !p.at_set(script_set!(RightParen, End)) {
        if p.at(ScriptKind::Dots) {
            spread(p);
        } else if p.at_set(set::EXPR) {
            expr(p);
        } else {
            p.unexpected();
            continue;
        }
        if !p.at(ScriptKind::RightParen) {
            p.expect(ScriptKind::Comma);
        }
    }
    p.expect_closing_delimiter(open, ScriptKind::RightParen);

    if !(p.at(ScriptKind::Arrow) && !p.newline()) {
        p.wrap(m, ScriptKind::Paren);
        return;
    }

    p.restore(checkpoint);
    params(p);
    p.expect(ScriptKind::Arrow);
    arrow_body(p);
    p.wrap(m, ScriptKind::ArrowFunc);

    let offset = p.memo_arena.len();
    p.memo_arena.extend(p.nodes[m.0..].iter().cloned());
    p.memo.insert(start, (offset..p.memo_arena.len(), p.checkpoint()));
}

/// Parses the body of an arrow function: a block or an expression.
fn arrow_body(p: &mut Parser) {
    if p.at(ScriptKind::LeftBrace) {
        block(p);
    } else {
        expr_prec(p, ASSIGN_PREC);
    }
}

/// Parses a parameter list: `(a, [b, c], d = 1, ...rest)`.
fn params(p: &mut Parser) {
    let m = p.marker();
    let open = p.marker();
    if !p.expect(ScriptKind::LeftParen) {
        return;
    }
    while !p.at_set(script_set!(RightParen, End)) {
        let param = p.marker();
        let spread = p.eat_if(ScriptKind::Dots);
        if !p.at_set(script_set!(Ident, LeftBracket, LeftBrace)) {
            p.unexpected();
            continue;
        }
        binding(p);
        if spread {
            p.wrap(param, ScriptKind::Spread);
        } else if p.eat_if(ScriptKind::Assign) {
            expr_prec(p, ASSIGN_PREC);
            p.wrap(param, ScriptKind::Assignment);
        }
        if !p.at(ScriptKind::RightParen) {
            p.expect(ScriptKind::Comma);
        }
    }
    p.expect_closing_delimiter(open, ScriptKind::RightParen);
    p.wrap(m, ScriptKind::Params);
}

/// Parses an argument list: `(a, ...b)`.
fn args(p: &mut Parser) {
    let m = p.marker();
    let open = p.marker();
    p.assert(ScriptKind::LeftParen);
    while !p.at_set(script_set!(RightParen, End)) {
        if p.at(ScriptKind::Dots) {
            spread(p);
        } else if p.at_set(set::EXPR) {
            expr(p);
        } else {
            p.unexpected();
            continue;
        }
        if !p.at(ScriptKind::RightParen) {
            p.expect(ScriptKind::Comma);
        }
    }
    p.expect_closing_delimiter(open, ScriptKind::RightParen);
    p.wrap(m, ScriptKind::Args);
}

/// Parses a spread element: `...xs`.
fn spread(p: &mut Parser) {
    let m = p.marker();
    p.assert(ScriptKind::Dots);
    expr_prec(p, ASSIGN_PREC);
    p.wrap(m, ScriptKind::Spread);
}

/// Parses an array literal or pattern: `[1, , ...xs]`.
fn array(p: &mut Parser) {
    let m = p.marker();
    let open = p.marker();
    p.assert(ScriptKind::LeftBracket);
    while !p.at_set(script_set!(RightBracket, End)) {
        if p.eat_if(ScriptKind::Comma) {
            continue;
        }
        if p.at(ScriptKind::Dots) {
            spread(p);
        } else if p.at_set(set::EXPR) {
            expr(p);
        } else {
            p.unexpected();
            continue;
        }
        if !p.at(ScriptKind::RightBracket) {
            p.expect(ScriptKind::Comma);
        }
    }
    p.expect_closing_delimiter(open, ScriptKind::RightBracket);
    p.wrap(m, ScriptKind::Array);
}

/// Parses an object literal or pattern: `{a: 1, b, ...c}`.
fn object(p: &mut Parser) {
    let m = p.marker();
    let open = p.marker();
    p.assert(ScriptKind::LeftBrace);
    while !p.at_set(script_set!(RightBrace, End)) {
        if !p.at_set(set::PROPERTY_KEY.add(ScriptKind::Dots)) {
            p.unexpected();
            continue;
        }
        property(p);
        if !p.at(ScriptKind::RightBrace) {
            p.expect(ScriptKind::Comma);
        }
    }
    p.expect_closing_delimiter(open, ScriptKind::RightBrace);
    p.wrap(m, ScriptKind::Object);
}

/// Parses a property: `key: value`, a shorthand `key`, a method
/// `key() { ... }` or a spread `...value`.
fn property(p: &mut Parser) {
    if p.at(ScriptKind::Dots) {
        spread(p);
        return;
    }

    let m = p.marker();
    let shorthand = p.at(ScriptKind::Ident);
    if p.at(ScriptKind::LeftBracket) {
        index(p);
    } else if p.at_set(set::KEYWORD) {
        p.convert_and_eat(ScriptKind::Ident);
    } else {
        p.eat();
    }

    if p.eat_if(ScriptKind::Colon) {
        if p.at_set(set::EXPR) {
            expr_prec(p, ASSIGN_PREC);
        } else {
            p.expected("expression");
        }
    } else if p.at(ScriptKind::LeftParen) {
        params(p);
        block(p);
    } else if shorthand && p.eat_if(ScriptKind::Assign) {
        expr_prec(p, ASSIGN_PREC);
    } else if !shorthand {
        p.expected("colon");
    }
    p.wrap(m, ScriptKind::Property);
}

/// A script parser over a range of the source text.
///
/// Works like a recursive descent parser with a single token of lookahead:
/// parsing functions eat tokens into `nodes` and wrap finished runs of them
/// into inner nodes.
struct Parser<'s> {
    /// The lexer over the parsed range.
    lexer: Lexer<'s>,
    /// The current token, not yet present in `nodes`.
    current: Token,
    /// Nodes of the previously parsed text, including trivia.
    nodes: Vec<SyntaxNode>,
    /// The start of the parsed range.
    start: usize,
    /// The current nesting depth of statements and expressions.
    depth: usize,
    /// Where the nesting got too deep, if it did.
    overflow: Option<usize>,
    /// Memoized reparses of parenthesized groups by their start offset.
    memo: FxHashMap<usize, (Range<usize>, Checkpoint<'s>)>,
    /// The stored parse results of the memo.
    memo_arena: Vec<SyntaxNode>,
}

/// A single token with a record of the trivia before it.
#[derive(Clone)]
struct Token {
    /// The token's node. Never trivia.
    node: SyntaxNode,
    /// The kind of `node`.
    kind: SyntaxKind,
    /// Number of trivia nodes before this token.
    n_trivia: usize,
    /// Whether the trivia before this token contained a line break.
    had_newline: bool,
    /// Offset of the previous token's end.
    prev_end: usize,
}

/// An index into the parser's nodes vector.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct Marker(usize);

/// A cheap snapshot of the parser state for backtracking.
#[derive(Clone)]
struct Checkpoint<'s> {
    lexer: Lexer<'s>,
    current: Token,
    node_len: usize,
}

impl<'s> Parser<'s> {
    fn new(text: &'s str, range: Range<usize>) -> Self {
        let start = range.start;
        let mut lexer = Lexer::new(text, range);
        let mut nodes = vec![];
        let current = Self::lex_past_trivia(&mut lexer, &mut nodes);
        Self {
            lexer,
            current,
            nodes,
            start,
            depth: 0,
            overflow: None,
            memo: FxHashMap::default(),
            memo_arena: vec![],
        }
    }

    /// Wrap all parsed nodes into the root node of the given kind.
    fn finish(self, kind: ScriptKind) -> ScriptOutput {
        let node = if self.nodes.is_empty() {
            SyntaxNode::empty(kind, self.start)
        } else {
            SyntaxNode::inner(kind, self.nodes)
        };
        ScriptOutput { node, overflow: self.overflow }
    }

    fn current_kind(&self) -> Option<ScriptKind> {
        self.current.kind.script()
    }

    fn current_start(&self) -> usize {
        self.current.node.start()
    }

    fn current_text(&self) -> &str {
        self.current.node.text()
    }

    fn at(&self, kind: ScriptKind) -> bool {
        self.current.kind == kind.into()
    }

    fn at_set(&self, set: ScriptSet) -> bool {
        self.current_kind().is_some_and(|kind| set.contains(kind))
    }

    fn end(&self) -> bool {
        self.at(ScriptKind::End)
    }

    /// Whether a line break precedes the current token.
    fn newline(&self) -> bool {
        self.current.had_newline
    }

    /// Whether the token after the current one is of the given kind.
    fn peek_at(&self, kind: ScriptKind) -> bool {
        let mut lexer = self.lexer.clone();
        loop {
            let (next, _) = lexer.next();
            if !next.is_trivia() {
                return next == kind.into();
            }
        }
    }

    fn marker(&self) -> Marker {
        Marker(self.nodes.len())
    }

    /// A marker before the trivia preceding the current token.
    fn before_trivia(&self) -> Marker {
        Marker(self.nodes.len() - self.current.n_trivia)
    }

    fn eat(&mut self) {
        self.nodes.push(std::mem::take(&mut self.current.node));
        self.current = Self::lex_past_trivia(&mut self.lexer, &mut self.nodes);
    }

    fn eat_if(&mut self, kind: ScriptKind) -> bool {
        let at = self.at(kind);
        if at {
            self.eat();
        }
        at
    }

    #[track_caller]
    fn assert(&mut self, kind: ScriptKind) {
        assert_eq!(self.current.kind, SyntaxKind::from(kind));
        self.eat();
    }

    /// Convert the current token's kind, then eat it.
    fn convert_and_eat(&mut self, kind: ScriptKind) {
        self.current.node.convert_to_kind(kind);
        self.eat();
    }

    /// Wrap the nodes from a marker up to the trivia before the current token
    /// into an inner node of the given kind.
    fn wrap(&mut self, from: Marker, kind: ScriptKind) {
        let to = self.before_trivia().0;
        let from = from.0.min(to);
        let children: Vec<_> = self.nodes.drain(from..to).collect();
        let node = if children.is_empty() {
            SyntaxNode::empty(kind, self.offset_at(Marker(from)))
        } else {
            SyntaxNode::inner(kind, children)
        };
        self.nodes.insert(from, node);
    }

    /// The source offset at which a node inserted at the marker would start.
    fn offset_at(&self, m: Marker) -> usize {
        match m.0.checked_sub(1).and_then(|i| self.nodes.get(i)) {
            Some(node) => node.end(),
            None => self.start,
        }
    }

    /// Register one level of nesting. Returns `false` and skips the rest of
    /// the input if the nesting got too deep.
    fn enter(&mut self) -> bool {
        if self.depth >= MAX_DEPTH {
            self.overflow.get_or_insert(self.current_start());
            while !self.end() {
                self.eat();
            }
            return false;
        }
        self.depth += 1;
        true
    }

    fn exit(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn lex_past_trivia(lexer: &mut Lexer, nodes: &mut Vec<SyntaxNode>) -> Token {
        let prev_end = lexer.cursor();
        let mut n_trivia = 0;
        let mut had_newline = false;
        let (kind, node) = loop {
            let (kind, node) = lexer.next();
            if !kind.is_trivia() {
                break (kind, node);
            }
            had_newline |= node.text().chars().any(crate::is_newline);
            n_trivia += 1;
            nodes.push(node);
        };
        Token { node, kind, n_trivia, had_newline, prev_end }
    }

    fn checkpoint(&self) -> Checkpoint<'s> {
        Checkpoint {
            lexer: self.lexer.clone(),
            current: self.current.clone(),
            node_len: self.nodes.len(),
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint<'s>) {
        self.lexer = checkpoint.lexer;
        self.current = checkpoint.current;
        self.nodes.truncate(checkpoint.node_len);
    }

    /// Continue after a memoized parse. The memoized nodes are appended by
    /// the caller.
    fn restore_memo(&mut self, checkpoint: Checkpoint<'s>) {
        self.lexer = checkpoint.lexer;
        self.current = checkpoint.current;
    }
}

impl Parser<'_> {
    /// Consume the given kind or produce an error.
    fn expect(&mut self, kind: ScriptKind) -> bool {
        let at = self.at(kind);
        if at {
            self.eat();
        } else if kind == ScriptKind::Ident && self.at_set(set::KEYWORD) {
            self.trim_errors();
            self.current.node.expected(kind.name());
            self.eat();
        } else {
            self.expected(kind.name());
        }
        at
    }

    /// Consume the given closing delimiter or mark the opening delimiter at
    /// `open` as unclosed.
    fn expect_closing_delimiter(&mut self, open: Marker, kind: ScriptKind) {
        if !self.eat_if(kind) {
            if let Some(node) = self.nodes.get_mut(open.0) {
                node.convert_to_error("unclosed delimiter");
            }
        }
    }

    /// Produce an error that the given `thing` was expected.
    fn expected(&mut self, thing: &str) {
        let m = self.before_trivia();
        let after_error = m.0 > 0 && self.nodes[m.0 - 1].kind().is_error();
        if !after_error {
            let at = self.current.prev_end;
            self.nodes.insert(m.0, SyntaxNode::error(eco_format!("expected {thing}"), "", at));
        }
    }

    /// Consume the current token and mark it as unexpected.
    fn unexpected(&mut self) {
        self.trim_errors();
        self.current.node.unexpected();
        self.eat();
    }

    /// Remove trailing errors with zero length.
    fn trim_errors(&mut self) {
        let Marker(end) = self.before_trivia();
        let mut start = end;
        while start > 0
            && self.nodes[start - 1].kind().is_error()
            && self.nodes[start - 1].is_empty()
        {
            start -= 1;
        }
        self.nodes.drain(start..end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Render a tree in a compact s-expression form, leaving out trivia.
    fn sexp(node: &SyntaxNode) -> String {
        if node.kind().is_error() {
            return format!("!{:?}", node.text().as_str());
        }
        if node.children().len() == 0 {
            return node.text().to_string();
        }
        let children: Vec<_> = node
            .children()
            .filter(|child| !child.kind().is_trivia())
            .map(sexp)
            .collect();
        let name = match node.kind() {
            SyntaxKind::Script(kind) => format!("{kind:?}"),
            kind => format!("{kind:?}"),
        };
        format!("({name} {})", children.join(" "))
    }

    fn expr_sexp(text: &str) -> String {
        let output = expression(text, 0..text.len());
        assert_eq!(output.node.range(), 0..text.len());
        let root = output.node;
        let mut children = root.children().filter(|child| !child.kind().is_trivia());
        let first = children.next().map(sexp).unwrap_or_default();
        assert!(children.next().is_none(), "trailing nodes in {text:?}");
        first
    }

    #[test]
    fn test_precedence() {
        assert_eq!(expr_sexp("1 + 2 * 3"), "(Binary 1 + (Binary 2 * 3))");
        assert_eq!(expr_sexp("a || b && c"), "(Binary a || (Binary b && c))");
        assert_eq!(expr_sexp("2 ** 3 ** 2"), "(Binary 2 ** (Binary 3 ** 2))");
        assert_eq!(expr_sexp("a - b - c"), "(Binary (Binary a - b) - c)");
        assert_eq!(expr_sexp("a = b = c"), "(Assignment a = (Assignment b = c))");
        assert_eq!(expr_sexp("a ? b : c ? d : e"), "(Ternary a ? b : (Ternary c ? d : e))");
        assert_eq!(expr_sexp("!a.b"), "(Unary ! (Member a . b))");
        assert_eq!(expr_sexp("x < y === z"), "(Binary (Binary x < y) === z)");
    }

    #[test]
    fn test_postfix() {
        assert_eq!(expr_sexp("f(x)[0]?.y"), "(Member (Index (Call f (Args ( x ))) [ 0 ]) ?. y)");
        assert_eq!(expr_sexp("new Foo.Bar(1)"), "(NewExpr new (Member Foo . Bar) (Args ( 1 )))");
        assert_eq!(expr_sexp("i++"), "(Postfix i ++)");
    }

    #[test]
    fn test_arrows() {
        assert_eq!(expr_sexp("x => x + 1"), "(ArrowFunc (Params x) => (Binary x + 1))");
        assert_eq!(
            expr_sexp("(a, b = 1) => { return a }"),
            "(ArrowFunc (Params ( a , (Assignment b = 1) )) => \
             (Block { (ReturnStmt return a) }))",
        );
        assert_eq!(expr_sexp("(a + b)"), "(Paren ( (Binary a + b) ))");
        assert_eq!(
            expr_sexp("((x) => x)"),
            "(Paren ( (ArrowFunc (Params ( x )) => x) ))",
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            expr_sexp("{a: 1, b, ...c, [d]: 2, default: 3}"),
            "(Object { (Property a : 1) , (Property b) , (Spread ... c) , \
             (Property [ d ] : 2) , (Property default : 3) })",
        );
        assert_eq!(expr_sexp("[1, , ...xs]"), "(Array [ 1 , , (Spread ... xs) ])");
        assert_eq!(expr_sexp("f(@em{x})"), "(Call f (Args ( @em{x} )))");
    }

    #[test]
    fn test_statements() {
        let text = "let x = 1\nconst f = () => x\nif (x) { f() } else f()\nfor (const y of ys) g(y)";
        let output = statements(text, 0..text.len());
        let kinds: Vec<_> = output
            .node
            .children()
            .filter(|child| !child.kind().is_trivia())
            .map(|child| child.kind())
            .collect();
        assert_eq!(
            kinds,
            [ScriptKind::VarDecl, ScriptKind::VarDecl, ScriptKind::IfStmt, ScriptKind::ForStmt]
                .map(SyntaxKind::from),
        );
        assert!(!output.node.erroneous());
    }

    #[test]
    fn test_newline_ends_statement() {
        let text = "a\n(b)";
        let output = statements(text, 0..text.len());
        let exprs = output
            .node
            .children()
            .filter(|child| child.is(ScriptKind::ExprStmt))
            .count();
        assert_eq!(exprs, 2);

        let text = "a b";
        let output = statements(text, 0..text.len());
        assert_eq!(output.node.errors()[0].message, "expected semicolon or line break");
    }

    #[test]
    fn test_imports_and_exports() {
        let text = "import {a as b, c} from \"m\"\nimport * as ns from 'n'\nexport default 1\nexport let y = 2";
        let output = statements(text, 0..text.len());
        assert!(!output.node.erroneous(), "{:?}", output.node.errors());
        let kinds: Vec<_> = output
            .node
            .children()
            .filter(|child| !child.kind().is_trivia())
            .map(|child| child.kind())
            .collect();
        assert_eq!(
            kinds,
            [
                ScriptKind::ImportDecl,
                ScriptKind::ImportDecl,
                ScriptKind::ExportDecl,
                ScriptKind::ExportDecl,
            ]
            .map(SyntaxKind::from),
        );
    }

    #[test]
    fn test_attributes() {
        let text = " x: 1, y , ...rest, ";
        let output = attributes(text, 1..text.len() - 1);
        assert_eq!(output.node.range(), 1..text.len() - 1);
        let props = output
            .node
            .children()
            .filter(|child| child.is(ScriptKind::Property) || child.is(ScriptKind::Spread))
            .count();
        assert_eq!(props, 3);
        assert!(!output.node.erroneous());
    }

    #[test]
    fn test_errors_are_embedded() {
        let text = "(1 + ";
        let output = expression(text, 0..text.len());
        assert_eq!(output.node.range(), 0..text.len());
        let errors = output.node.errors();
        assert!(!errors.is_empty());

        let text = "f(1 2)";
        let output = expression(text, 0..text.len());
        assert_eq!(output.node.errors()[0].message, "expected comma");
    }

    #[test]
    fn test_empty_range() {
        let output = statements("abc", 1..1);
        assert_eq!(output.node.range(), 1..1);
        assert!(output.node.is(ScriptKind::Statements));
    }

    #[test]
    fn test_deep_nesting_overflows() {
        let text = format!("{}1{}", "(".repeat(MAX_DEPTH + 10), ")".repeat(MAX_DEPTH + 10));
        let output = expression(&text, 0..text.len());
        assert!(output.overflow.is_some());
        assert_eq!(output.node.range(), 0..text.len());
    }

    #[test]
    fn test_nested_arrows_are_linear() {
        let mut text = String::from("y");
        for _ in 0..40 {
            text = format!("(x = {text}) => y");
        }
        let output = expression(&text, 0..text.len());
        assert!(!output.node.erroneous());
    }
}
