//! Mixed-grammar parser and syntax tree for Nota documents.

pub mod ast;

mod block;
mod context;
mod dispatch;
mod inline;
mod kind;
mod lexer;
mod lines;
mod node;
mod parser;
mod script;
mod set;

pub use self::context::{Bracket, Context, Reduce, Shift};
pub use self::dispatch::{Grammar, GrammarSet, Parsed, SubgrammarChoice, dispatch};
pub use self::kind::{KindRegistry, MarkupKind, ScriptKind, SyntaxKind};
pub use self::lexer::{
    INTRODUCERS, is_id_continue, is_id_start, is_ident, is_newline, split_newlines,
};
pub use self::lines::{Lines, Position};
pub use self::node::{Leaves, Mount, SyntaxError, SyntaxNode};
pub use self::parser::{MarkupGrammar, ParseError, parse, parse_with};
pub use self::script::ScriptGrammar;

/// The maximum nesting depth of blocks, inline content and mounted
/// grammars.
pub const MAX_DEPTH: usize = 256;
