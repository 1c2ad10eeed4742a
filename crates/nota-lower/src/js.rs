//! The JavaScript that documents lower to.
//!
//! Only the constructs that lowering produces are modelled. Script written
//! by the author is never re-modelled: it is kept as [`Code`], the original
//! source with embedded document commands replaced by lowered expressions.

use ecow::EcoString;

/// The local name of the element factory.
pub const FACTORY: &str = "el";

/// The name of the fragment component.
pub const FRAGMENT: &str = "Fragment";

/// The parameter holding the arguments of a positional command.
pub const ARGS: &str = "args";

/// An expression, tagged with the document offset it was lowered from.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    /// What kind of expression this is.
    pub kind: ExprKind,
    /// The byte offset in the document, if the expression stems from a
    /// specific node.
    pub origin: Option<usize>,
}

/// The kinds of expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// `null`.
    Null,
    /// `true` or `false`.
    Bool(bool),
    /// A string literal.
    Str(EcoString),
    /// A variable reference.
    Ident(EcoString),
    /// A constant index into an expression: `args[0]`.
    Index(Box<Expr>, usize),
    /// An array literal.
    Array(Vec<Elem>),
    /// An object literal.
    Object(Vec<Prop>),
    /// A call.
    Call(Box<Expr>, Vec<Elem>),
    /// An arrow function with a single parameter and an expression body.
    Arrow(EcoString, Box<Expr>),
    /// Statements scoping an expression: `(() => { ...; return e; })()`.
    Scope(Vec<Code>, Box<Expr>),
    /// Spliced script source.
    Code(Code),
}

/// An element of an array literal or argument list.
#[derive(Debug, Clone, PartialEq)]
pub enum Elem {
    /// A plain element.
    Item(Expr),
    /// A spread element: `...e`.
    Spread(Expr),
}

/// A member of an object literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Prop {
    /// A key-value pair.
    Pair(EcoString, Expr),
    /// A spread member: `...e`.
    Spread(Expr),
    /// Properties written in script source: `a: 1, b`.
    Code(Code),
}

/// Script source with embedded expressions.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Code(pub Vec<Piece>);

/// A piece of spliced script source.
#[derive(Debug, Clone, PartialEq)]
pub enum Piece {
    /// Source text and the document offset it was copied from.
    Text(EcoString, Option<usize>),
    /// A lowered document command embedded in the source.
    Expr(Expr),
}

impl Expr {
    /// Create an expression without an origin.
    pub fn new(kind: ExprKind) -> Self {
        Self { kind, origin: None }
    }

    /// Attach the document offset the expression was lowered from.
    pub fn at(mut self, origin: usize) -> Self {
        self.origin = Some(origin);
        self
    }

    /// `null`.
    pub fn null() -> Self {
        Self::new(ExprKind::Null)
    }

    /// A boolean literal.
    pub fn bool(value: bool) -> Self {
        Self::new(ExprKind::Bool(value))
    }

    /// A string literal.
    pub fn str(text: impl Into<EcoString>) -> Self {
        Self::new(ExprKind::Str(text.into()))
    }

    /// A variable reference.
    pub fn ident(name: impl Into<EcoString>) -> Self {
        Self::new(ExprKind::Ident(name.into()))
    }

    /// An object literal.
    pub fn object(props: Vec<Prop>) -> Self {
        Self::new(ExprKind::Object(props))
    }

    /// A call.
    pub fn call(callee: Expr, args: Vec<Elem>) -> Self {
        Self::new(ExprKind::Call(Box::new(callee), args))
    }

    /// An element: `el(name, attrs, ...children)`.
    pub fn element(name: Expr, attrs: Expr, children: Vec<Elem>) -> Self {
        let mut args = vec![Elem::Item(name), Elem::Item(attrs)];
        args.extend(children);
        Self::call(Self::ident(FACTORY), args)
    }

    /// An intrinsic element without attributes.
    pub fn tag(name: &str, children: Vec<Elem>) -> Self {
        Self::element(Self::str(name), Self::object(vec![]), children)
    }

    /// The string, if this is a string literal.
    pub fn as_str(&self) -> Option<&EcoString> {
        match &self.kind {
            ExprKind::Str(text) => Some(text),
            _ => None,
        }
    }
}

impl Code {
    /// Whether the code contains nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.iter().all(|piece| match piece {
            Piece::Text(text, _) => text.trim().is_empty(),
            Piece::Expr(_) => false,
        })
    }

    /// Append source text, merging it into a preceding text piece.
    pub fn push_text(&mut self, text: &str, origin: Option<usize>) {
        if let (Some(Piece::Text(last, _)), None) = (self.0.last_mut(), origin) {
            last.push_str(text);
        } else {
            self.0.push(Piece::Text(text.into(), origin));
        }
    }

    /// Remove trailing whitespace.
    pub fn trim_end(&mut self) {
        while let Some(Piece::Text(text, _)) = self.0.last_mut() {
            let trimmed = text.trim_end();
            if !trimmed.is_empty() {
                *text = trimmed.into();
                break;
            }
            self.0.pop();
        }
    }
}

#[cfg(test)]
impl Expr {
    /// An array literal of plain elements.
    pub fn array(items: impl IntoIterator<Item = Expr>) -> Self {
        Self::new(ExprKind::Array(items.into_iter().map(Elem::Item).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_shape() {
        let expr = Expr::tag("h1", vec![Elem::Item(Expr::str("Hi"))]);
        let ExprKind::Call(callee, args) = &expr.kind else { panic!("expected a call") };
        assert_eq!(**callee, Expr::ident(FACTORY));
        assert_eq!(args.len(), 3);
        assert_eq!(args[0], Elem::Item(Expr::str("h1")));
    }

    #[test]
    fn test_code_text_merging() {
        let mut code = Code::default();
        code.push_text("a", Some(4));
        code.push_text(" ", None);
        code.push_text("+", Some(6));
        code.push_text(" \n", None);
        assert_eq!(code.0.len(), 2);
        code.trim_end();
        assert_eq!(code.0.last(), Some(&Piece::Text("+".into(), Some(6))));
        assert!(!code.is_blank());
        assert!(Code(vec![Piece::Text("  ".into(), None)]).is_blank());
    }
}
