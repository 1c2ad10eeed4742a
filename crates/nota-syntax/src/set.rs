// Acknowledgement:
// Based on rust-analyzer's `TokenSet`.
// https://github.com/rust-lang/rust-analyzer/blob/master/crates/parser/src/token_set.rs

use crate::ScriptKind;

/// A set of script kinds.
#[derive(Default, Copy, Clone)]
pub struct ScriptSet(u128);

impl ScriptSet {
    /// Create a new empty set.
    pub const fn new() -> Self {
        Self(0)
    }

    /// Insert a kind into the set.
    ///
    /// You can only add kinds with discriminator < 128.
    pub const fn add(self, kind: ScriptKind) -> Self {
        assert!((kind as u8) < BITS);
        Self(self.0 | bit(kind))
    }

    /// Combine two sets.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether the set contains the given kind.
    pub const fn contains(&self, kind: ScriptKind) -> bool {
        (kind as u8) < BITS && (self.0 & bit(kind)) != 0
    }
}

const BITS: u8 = 128;

const fn bit(kind: ScriptKind) -> u128 {
    1 << (kind as usize)
}

/// Generate an inline const set of the given script kinds.
macro_rules! script_set {
    ( $($kind:ident),* $(,)? ) => {
        {
            const SET: crate::set::ScriptSet = crate::set::ScriptSet::new()
                $(.add(crate::ScriptKind:: $kind))*;
            SET
        }
    }
}

pub(crate) use script_set;

/// Build a set of the given kinds. Only used in this file.
macro_rules! make_set {
    ( $($kind:ident),* $(,)? ) => {
        ScriptSet::new()
        $(.add(ScriptKind::$kind))*
    }
}

/// Kinds that start a declaration or control flow statement.
pub const STMT: ScriptSet = make_set!(
    Let, Const, Var, Function, Async, Return, If, For, While, Break, Continue,
    Import, Export, LeftBrace, Semicolon,
);

/// Kinds that are prefix operators.
pub const UNARY_OP: ScriptSet = make_set!(Bang, Plus, Minus, Step, Typeof, Await);

/// Kinds that can start an expression.
pub const EXPR: ScriptSet = make_set!(
    Ident, Number, Str, Template, Bool, Null, This, Embed, LeftBrace,
    LeftBracket, LeftParen, Function, Async, New,
)
.union(UNARY_OP);

/// Kinds that can name a property.
pub const PROPERTY_KEY: ScriptSet = make_set!(Ident, Str, Number, LeftBracket)
    .union(KEYWORD);

/// Kinds that are keywords, which may still name properties.
pub const KEYWORD: ScriptSet = make_set!(
    Let, Const, Var, Function, Async, Await, Return, If, Else, For, While, Of,
    In, Instanceof, Typeof, New, Break, Continue, Import, Export, From, As,
    Default, Bool, Null, This,
);

/// Kinds that close a statement list.
pub const STMT_END: ScriptSet = make_set!(RightBrace, End);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set() {
        let set = ScriptSet::new().add(ScriptKind::Comma).add(ScriptKind::End);
        assert!(set.contains(ScriptKind::Comma));
        assert!(set.contains(ScriptKind::End));
        assert!(!set.contains(ScriptKind::Colon));
        assert!(EXPR.contains(ScriptKind::Bang));
        assert!(PROPERTY_KEY.contains(ScriptKind::Default));
    }
}
