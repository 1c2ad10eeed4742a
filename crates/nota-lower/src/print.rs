use std::fmt::Write;

use nota_syntax::is_ident;

use crate::js::{Code, Elem, Expr, ExprKind, Piece, Prop};
use crate::sourcemap::Mapping;

/// Writes JavaScript source and records where each lowered node starts.
#[derive(Default)]
pub(crate) struct Printer {
    buf: String,
    /// The recorded mappings, ordered by generated position.
    map: Vec<Mapping>,
}

impl Printer {
    /// Finish printing, returning the text and the mappings.
    pub fn finish(self) -> (String, Vec<Mapping>) {
        (self.buf, self.map)
    }

    /// Record that the next byte stems from `origin` in the document.
    pub fn mark(&mut self, origin: Option<usize>) {
        let Some(original) = origin else { return };
        let mapping = Mapping { generated: self.buf.len(), original };
        if self.map.last() != Some(&mapping) {
            self.map.push(mapping);
        }
    }

    /// Write raw text.
    pub fn push_str(&mut self, text: &str) {
        self.buf.push_str(text);
    }

    /// Write a string literal.
    pub fn string(&mut self, text: &str) {
        self.buf.push('"');
        for c in text.chars() {
            match c {
                '"' => self.buf.push_str("\\\""),
                '\\' => self.buf.push_str("\\\\"),
                '\n' => self.buf.push_str("\\n"),
                '\r' => self.buf.push_str("\\r"),
                '\t' => self.buf.push_str("\\t"),
                '\u{2028}' | '\u{2029}' => write_escape(&mut self.buf, c),
                c if c.is_control() => write_escape(&mut self.buf, c),
                c => self.buf.push(c),
            }
        }
        self.buf.push('"');
    }

    /// Write an object key, quoting it if it is not an identifier.
    pub fn key(&mut self, key: &str) {
        if is_ident(key) {
            self.buf.push_str(key);
        } else {
            self.string(key);
        }
    }

    /// Write an expression.
    pub fn expr(&mut self, expr: &Expr) {
        self.mark(expr.origin);
        match &expr.kind {
            ExprKind::Null => self.push_str("null"),
            ExprKind::Bool(value) => self.push_str(if *value { "true" } else { "false" }),
            ExprKind::Str(text) => self.string(text),
            ExprKind::Ident(name) => self.push_str(name),
            ExprKind::Index(object, index) => {
                self.operand(object);
                let _ = write!(self.buf, "[{index}]");
            }
            ExprKind::Array(elems) => {
                self.buf.push('[');
                self.elems(elems);
                self.buf.push(']');
            }
            ExprKind::Object(props) => self.object(props),
            ExprKind::Call(callee, args) => {
                self.operand(callee);
                self.buf.push('(');
                self.elems(args);
                self.buf.push(')');
            }
            ExprKind::Arrow(param, body) => {
                self.push_str(param);
                self.push_str(" => ");
                if matches!(body.kind, ExprKind::Object(_)) {
                    self.buf.push('(');
                    self.expr(body);
                    self.buf.push(')');
                } else {
                    self.expr(body);
                }
            }
            ExprKind::Scope(stmts, body) => {
                self.push_str("(() => {\n");
                for stmt in stmts {
                    self.statement(stmt);
                }
                self.push_str("return ");
                self.expr(body);
                self.push_str(";\n})()");
            }
            ExprKind::Code(code) => self.code(code),
        }
    }

    /// Write an expression in a position where it must bind tightly, like
    /// a callee.
    fn operand(&mut self, expr: &Expr) {
        if matches!(expr.kind, ExprKind::Code(_) | ExprKind::Arrow(..)) {
            self.buf.push('(');
            self.expr(expr);
            self.buf.push(')');
        } else {
            self.expr(expr);
        }
    }

    /// Write comma-separated elements.
    fn elems(&mut self, elems: &[Elem]) {
        for (i, elem) in elems.iter().enumerate() {
            if i > 0 {
                self.push_str(", ");
            }
            match elem {
                Elem::Item(expr) => self.expr(expr),
                Elem::Spread(expr) => {
                    self.push_str("...");
                    self.operand(expr);
                }
            }
        }
    }

    fn object(&mut self, props: &[Prop]) {
        if props.is_empty() {
            self.push_str("{}");
            return;
        }

        self.buf.push('{');
        for (i, prop) in props.iter().enumerate() {
            if i > 0 {
                self.push_str(", ");
            }
            match prop {
                Prop::Pair(key, value) => {
                    self.key(key);
                    self.push_str(": ");
                    self.expr(value);
                }
                Prop::Spread(expr) => {
                    self.push_str("...");
                    self.operand(expr);
                }
                Prop::Code(code) => self.code(code),
            }
        }
        self.buf.push('}');
    }

    /// Write spliced script source.
    pub fn code(&mut self, code: &Code) {
        for piece in &code.0 {
            match piece {
                Piece::Text(text, origin) => {
                    self.mark(*origin);
                    self.push_str(text);
                }
                Piece::Expr(expr) => self.operand(expr),
            }
        }
    }

    /// Write a top-level statement on its own line.
    pub fn statement(&mut self, code: &Code) {
        self.code(code);
        if !self.buf.trim_end().ends_with(';') {
            self.buf.push(';');
        }
        self.buf.push('\n');
    }
}

/// Write a unicode escape for a character.
fn write_escape(buf: &mut String, c: char) {
    let mut units = [0; 2];
    for unit in c.encode_utf16(&mut units) {
        let _ = write!(buf, "\\u{unit:04x}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn print(expr: &Expr) -> String {
        let mut p = Printer::default();
        p.expr(expr);
        p.finish().0
    }

    #[test]
    fn test_print_element() {
        let attrs = Expr::object(vec![
            Prop::Pair("href".into(), Expr::str("a\"b")),
            Prop::Pair("data-x".into(), Expr::bool(true)),
        ]);
        let expr = Expr::element(Expr::str("a"), attrs, vec![Elem::Item(Expr::str("x\ny"))]);
        assert_eq!(print(&expr), r#"el("a", {href: "a\"b", "data-x": true}, "x\ny")"#);
    }

    #[test]
    fn test_print_escapes() {
        assert_eq!(print(&Expr::str("\u{0}\u{2028}")), r#""\u0000\u2028""#);
    }

    #[test]
    fn test_print_code_operands() {
        let code = Code(vec![Piece::Text("f || g".into(), Some(3))]);
        let call = Expr::call(Expr::new(ExprKind::Code(code)), vec![]);
        assert_eq!(print(&call), "(f || g)()");

        let index = Expr::new(ExprKind::Index(Box::new(Expr::ident("args")), 1));
        assert_eq!(print(&index), "args[1]");
    }

    #[test]
    fn test_print_scope() {
        let stmts = vec![Code(vec![Piece::Text("let x = 1".into(), Some(0))])];
        let scope = Expr::new(ExprKind::Scope(stmts, Box::new(Expr::ident("x"))));
        assert_eq!(print(&scope), "(() => {\nlet x = 1;\nreturn x;\n})()");
    }

    #[test]
    fn test_marks_are_ordered() {
        let expr = Expr::array([Expr::str("a").at(4), Expr::ident("b").at(1)]).at(0);
        let mut p = Printer::default();
        p.expr(&expr);
        let (text, map) = p.finish();
        assert_eq!(text, r#"["a", b]"#);
        let generated: Vec<_> = map.iter().map(|m| m.generated).collect();
        assert_eq!(generated, [0, 1, 6]);
        let original: Vec<_> = map.iter().map(|m| m.original).collect();
        assert_eq!(original, [0, 4, 1]);
    }
}
