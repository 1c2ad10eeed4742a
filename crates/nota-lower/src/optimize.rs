//! Simplification of lowered expressions.
//!
//! Lowering composes small pieces without looking at their neighbours and so
//! produces spreads of array literals, empty scopes and runs of string
//! literals. These passes remove them again.

use crate::js::{Code, Elem, Expr, ExprKind, Piece, Prop};

/// Simplify an expression bottom-up.
pub fn optimize(expr: Expr) -> Expr {
    let Expr { kind, origin } = expr;
    let kind = match kind {
        ExprKind::Index(object, index) => ExprKind::Index(Box::new(optimize(*object)), index),
        ExprKind::Array(elems) => ExprKind::Array(merge_strings(flatten(elems), 0)),
        ExprKind::Object(props) => {
            let mut props = flatten_props(props);
            if let [Prop::Spread(_)] = props.as_slice() {
                if let Some(Prop::Spread(inner)) = props.pop() {
                    return inherit(inner, origin);
                }
            }
            ExprKind::Object(props)
        }
        ExprKind::Call(callee, args) => {
            let callee = optimize(*callee);
            let args = flatten(args);
            let args = if is_factory(&callee) { merge_strings(args, 2) } else { args };
            ExprKind::Call(Box::new(callee), args)
        }
        ExprKind::Arrow(param, body) => ExprKind::Arrow(param, Box::new(optimize(*body))),
        ExprKind::Scope(stmts, body) => {
            let body = optimize(*body);
            if stmts.is_empty() {
                return inherit(body, origin);
            }
            ExprKind::Scope(stmts.into_iter().map(optimize_code).collect(), Box::new(body))
        }
        ExprKind::Code(code) => ExprKind::Code(optimize_code(code)),
        kind @ (ExprKind::Null | ExprKind::Bool(_) | ExprKind::Str(_) | ExprKind::Ident(_)) => {
            kind
        }
    };
    Expr { kind, origin }
}

/// Simplify the expressions embedded in script source.
fn optimize_code(code: Code) -> Code {
    Code(
        code.0
            .into_iter()
            .map(|piece| match piece {
                Piece::Expr(expr) => Piece::Expr(optimize(expr)),
                piece => piece,
            })
            .collect(),
    )
}

/// Give an expression that replaces another the other's origin, unless it
/// has its own.
fn inherit(mut expr: Expr, origin: Option<usize>) -> Expr {
    if expr.origin.is_none() {
        expr.origin = origin;
    }
    expr
}

/// Whether the expression is the element factory.
fn is_factory(callee: &Expr) -> bool {
    matches!(&callee.kind, ExprKind::Ident(name) if name == crate::js::FACTORY)
}

/// Simplify elements and splice spreads of array literals: `[a, ...[b, c]]`
/// becomes `[a, b, c]`.
fn flatten(elems: Vec<Elem>) -> Vec<Elem> {
    let mut out = Vec::with_capacity(elems.len());
    for elem in elems {
        match elem {
            Elem::Item(expr) => out.push(Elem::Item(optimize(expr))),
            Elem::Spread(expr) => match optimize(expr) {
                Expr { kind: ExprKind::Array(inner), .. } => out.extend(inner),
                expr => out.push(Elem::Spread(expr)),
            },
        }
    }
    out
}

/// Simplify members and splice spreads of object literals: `{a, ...{b}}`
/// becomes `{a, b}`.
fn flatten_props(props: Vec<Prop>) -> Vec<Prop> {
    let mut out = Vec::with_capacity(props.len());
    for prop in props {
        match prop {
            Prop::Pair(key, value) => out.push(Prop::Pair(key, optimize(value))),
            Prop::Spread(expr) => match optimize(expr) {
                Expr { kind: ExprKind::Object(inner), .. } => out.extend(inner),
                expr => out.push(Prop::Spread(expr)),
            },
            Prop::Code(code) => out.push(Prop::Code(optimize_code(code))),
        }
    }
    out
}

/// Merge adjacent string literals, starting at the element with index `from`.
fn merge_strings(elems: Vec<Elem>, from: usize) -> Vec<Elem> {
    let mut out: Vec<Elem> = Vec::with_capacity(elems.len());
    for (i, elem) in elems.into_iter().enumerate() {
        if i > from {
            if let (Some(Elem::Item(last)), Elem::Item(next)) = (out.last_mut(), &elem) {
                if let (ExprKind::Str(prev), Some(text)) = (&mut last.kind, next.as_str()) {
                    prev.push_str(text);
                    continue;
                }
            }
        }
        out.push(elem);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::print::Printer;

    fn optimized(expr: Expr) -> String {
        let mut p = Printer::default();
        p.expr(&optimize(expr));
        p.finish().0
    }

    fn code(text: &str) -> Code {
        Code(vec![Piece::Text(text.into(), None)])
    }

    #[test]
    fn test_flatten_spread_arrays() {
        let inner = Expr::array([Expr::ident("b"), Expr::ident("c")]);
        let array = Expr::new(ExprKind::Array(vec![
            Elem::Item(Expr::ident("a")),
            Elem::Spread(inner),
        ]));
        assert_eq!(optimized(array), "[a, b, c]");
    }

    #[test]
    fn test_collapse_empty_scope() {
        let body = Expr::array([Expr::ident("x")]);
        let scope = Expr::new(ExprKind::Scope(vec![], Box::new(body)));
        let array = Expr::new(ExprKind::Array(vec![Elem::Spread(scope)]));
        assert_eq!(optimized(array), "[x]");
    }

    #[test]
    fn test_keep_scope_with_statements() {
        let body = Expr::array([Expr::ident("x")]);
        let scope = Expr::new(ExprKind::Scope(vec![code("let x = 1")], Box::new(body)));
        let array = Expr::new(ExprKind::Array(vec![Elem::Spread(scope)]));
        assert_eq!(optimized(array), "[...(() => {\nlet x = 1;\nreturn [x];\n})()]");
    }

    #[test]
    fn test_collapse_spread_objects() {
        let object = Expr::object(vec![Prop::Spread(Expr::ident("props"))]);
        assert_eq!(optimized(object), "props");

        let nested = Expr::object(vec![
            Prop::Spread(Expr::object(vec![Prop::Pair("block".into(), Expr::bool(true))])),
            Prop::Code(code("a: 1")),
        ]);
        assert_eq!(optimized(nested), "{block: true, a: 1}");
    }

    #[test]
    fn test_merge_strings() {
        let array = Expr::array([Expr::str("a"), Expr::str("b"), Expr::ident("x"), Expr::str("c")]);
        assert_eq!(optimized(array), r#"["ab", x, "c"]"#);

        let element = Expr::element(
            Expr::str("p"),
            Expr::object(vec![]),
            vec![
                Elem::Item(Expr::str("Hello")),
                Elem::Spread(Expr::array([Expr::str(" "), Expr::str("world")])),
            ],
        );
        assert_eq!(optimized(element), r#"el("p", {}, "Hello world")"#);
    }

    #[test]
    fn test_no_merge_outside_children() {
        let call = Expr::call(Expr::ident("f"), vec![
            Elem::Item(Expr::str("a")),
            Elem::Item(Expr::str("b")),
        ]);
        assert_eq!(optimized(call), r#"f("a", "b")"#);

        let element = Expr::element(Expr::str("a"), Expr::object(vec![]), vec![]);
        assert_eq!(optimized(element), r#"el("a", {})"#);
    }

    #[test]
    fn test_embedded_expressions_are_optimized() {
        let inner = Expr::element(
            Expr::str("em"),
            Expr::object(vec![]),
            vec![Elem::Spread(Expr::array([Expr::str("a")]))],
        );
        let code = Code(vec![
            Piece::Text("let x = ".into(), None),
            Piece::Expr(inner),
        ]);
        assert_eq!(optimized(Expr::new(ExprKind::Code(code))), r#"let x = el("em", {}, "a")"#);
    }
}
