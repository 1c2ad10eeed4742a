//! Splicing of embedded script into the lowered program.
//!
//! Script is copied through token by token. Only document commands embedded
//! in it are replaced, by the expressions they lower to.

use ecow::EcoString;
use nota_syntax::ast::{self, AstNode, Markup};
use nota_syntax::{ScriptKind, SyntaxKind, SyntaxNode};

use crate::diag::error;
use crate::js::{Code, Elem, Expr, ExprKind, FRAGMENT, Piece};
use crate::lower::Lowerer;

impl Lowerer<'_> {
    /// Lower a script block to its statements. Imports and exports are
    /// hoisted out of the document instead.
    pub(crate) fn script(&mut self, script: ast::Script) -> Vec<Code> {
        let Some(body) = script.body() else { return vec![] };
        let Some(root) = body.mounted_root() else {
            self.errors.push(error!(
                body.range(),
                "script could not be parsed";
                hint: "the script grammar is not registered"
            ));
            return vec![];
        };

        let mut stmts = vec![];
        for stmt in root.children() {
            if stmt.kind().is_trivia() || stmt.is(ScriptKind::Semicolon) {
                continue;
            }

            let mut code = Code::default();
            self.splice(stmt, &mut code);
            code.trim_end();
            match stmt.kind() {
                SyntaxKind::Script(ScriptKind::ImportDecl) => {
                    self.hoist_import(stmt);
                    self.imports.push(code);
                }
                SyntaxKind::Script(ScriptKind::ExportDecl) => {
                    tracing::debug!(range = ?stmt.range(), "hoisted export");
                    self.exports.push(code);
                }
                _ => stmts.push(code),
            }
        }
        stmts
    }

    /// Lower a script expression hosted by a markup node, like an attribute
    /// value or a computed command name.
    ///
    /// Returns `None` if the expression is blank.
    pub(crate) fn expression(&mut self, host: &SyntaxNode) -> Option<Expr> {
        let Some(root) = host.mounted_root() else {
            return Some(Expr::str(host.text().as_str()).at(host.start()));
        };

        let mut code = Code::default();
        self.splice(root, &mut code);
        trim(&mut code);
        if code.is_blank() {
            return None;
        }
        if let [Piece::Expr(_)] = code.0.as_slice() {
            if let Some(Piece::Expr(expr)) = code.0.pop() {
                return Some(expr);
            }
        }
        Some(Expr::new(ExprKind::Code(code)).at(host.start()))
    }

    /// Lower a bracketed attribute list to the members it contributes to a
    /// component's properties.
    pub(crate) fn attribute_list(&mut self, host: &SyntaxNode) -> Option<Code> {
        let Some(root) = host.mounted_root() else {
            self.errors.push(error!(
                host.range(),
                "attribute list could not be parsed";
                hint: "the script grammar is not registered"
            ));
            return None;
        };

        let mut code = Code::default();
        self.splice(root, &mut code);
        trim(&mut code);
        if let Some(Piece::Text(text, _)) = code.0.last_mut() {
            if let Some(rest) = text.strip_suffix(',') {
                *text = rest.into();
                trim(&mut code);
            }
        }
        (!code.is_blank()).then_some(code)
    }

    /// Copy the tokens of a script subtree, replacing embedded commands.
    fn splice(&mut self, node: &SyntaxNode, code: &mut Code) {
        if node.is(ScriptKind::Embed) {
            let expr = self.embed(node);
            code.0.push(Piece::Expr(expr));
            return;
        }

        if node.children().len() > 0 {
            for child in node.children() {
                self.splice(child, code);
            }
            return;
        }

        let text = node.text();
        match node.kind() {
            _ if text.is_empty() => {}
            SyntaxKind::Script(ScriptKind::Space) => code.push_text(text, None),
            SyntaxKind::Script(ScriptKind::LineComment) => {}
            SyntaxKind::Script(ScriptKind::BlockComment) => code.push_text(" ", None),
            SyntaxKind::Script(ScriptKind::Ident) => {
                if !is_member(code) {
                    self.names.insert(text.clone());
                }
                code.push_text(text, Some(node.start()));
            }
            _ => code.push_text(text, Some(node.start())),
        }
    }

    /// Lower a document command embedded in script.
    fn embed(&mut self, node: &SyntaxNode) -> Expr {
        let Some(markup) = node.mounted_root().and_then(Markup::from_untyped) else {
            return Expr::str(node.text().as_str()).at(node.start());
        };

        let mut items = self.inline(markup.nodes());
        match items.len() {
            0 => Expr::str("").at(node.start()),
            1 => match items.pop() {
                Some(Elem::Item(expr)) => expr,
                Some(Elem::Spread(expr)) => expr,
                None => Expr::str(""),
            },
            _ => Expr::element(Expr::ident(FRAGMENT), Expr::object(vec![]), items)
                .at(node.start()),
        }
    }

    /// Record what an import declaration binds and where it imports from.
    fn hoist_import(&mut self, decl: &SyntaxNode) {
        let tokens: Vec<_> = decl.children().filter(|child| !child.kind().is_trivia()).collect();
        let Some(module) = tokens.iter().rev().find(|token| token.is(ScriptKind::Str)) else {
            return;
        };
        let module = unquote(module.text());
        let default = tokens.get(1).is_some_and(|token| token.is(ScriptKind::Ident));

        for (i, token) in tokens.iter().enumerate() {
            let renamed = tokens.get(i + 1).is_some_and(|next| next.is(ScriptKind::As));
            if token.is(ScriptKind::Ident) && !renamed {
                self.bound.insert(token.text().clone());
            }
        }

        tracing::debug!(%module, default, "hoisted import");
        *self.modules.entry(module).or_default() |= default;
    }
}

/// Whether the next identifier would be a member name: `a.b` or `a?.b`.
fn is_member(code: &Code) -> bool {
    let Some(Piece::Text(text, _)) = code.0.last() else { return false };
    let text = text.trim_end();
    text.ends_with('.') && !text.ends_with("...")
}

/// Remove leading and trailing whitespace.
fn trim(code: &mut Code) {
    code.trim_end();
    while let Some(Piece::Text(text, _)) = code.0.first_mut() {
        let trimmed = text.trim_start();
        if !trimmed.is_empty() {
            *text = trimmed.into();
            break;
        }
        code.0.remove(0);
    }
}

/// The contents of a string literal.
fn unquote(literal: &str) -> EcoString {
    let mut chars = literal.chars();
    chars.next();
    chars.next_back();
    chars.as_str().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LowerConfig;
    use crate::print::Printer;

    fn lowerer<'a>(text: &'a str, config: &'a LowerConfig) -> (Lowerer<'a>, nota_syntax::SyntaxNode) {
        let root = nota_syntax::parse(text).unwrap();
        assert!(!root.erroneous(), "{:?}", root.errors());
        (Lowerer::new(text, config), root)
    }

    fn first_script(root: &SyntaxNode) -> ast::Script<'_> {
        root.children().find_map(ast::Script::from_untyped).unwrap()
    }

    fn print_code(code: &Code) -> String {
        let mut p = Printer::default();
        p.code(code);
        p.finish().0
    }

    #[test]
    fn test_statements() {
        let text = "% let x = f(1); g()";
        let config = LowerConfig::default();
        let (mut lowerer, root) = lowerer(text, &config);
        let stmts = lowerer.script(first_script(&root));
        let printed: Vec<_> = stmts.iter().map(print_code).collect();
        assert_eq!(printed, ["let x = f(1);", "g()"]);
        for name in ["x", "f", "g"] {
            assert!(lowerer.names.contains(name), "{name}");
        }
    }

    #[test]
    fn test_embedded_commands() {
        let text = "% let x = f(@em{a}, #y)";
        let config = LowerConfig::default();
        let (mut lowerer, root) = lowerer(text, &config);
        let stmts = lowerer.script(first_script(&root));
        assert_eq!(print_code(&stmts[0]), r#"let x = f(el("em", {}, "a"), y)"#);
    }

    #[test]
    fn test_member_names_are_not_collected() {
        let text = "% a.Section(...rest)";
        let config = LowerConfig::default();
        let (mut lowerer, root) = lowerer(text, &config);
        lowerer.script(first_script(&root));
        assert!(lowerer.names.contains("a"));
        assert!(lowerer.names.contains("rest"));
        assert!(!lowerer.names.contains("Section"));
    }

    #[test]
    fn test_comments_are_dropped() {
        let text = "%%%\nlet a = /* one */ 1 // two\n%%%";
        let config = LowerConfig::default();
        let (mut lowerer, root) = lowerer(text, &config);
        let stmts = lowerer.script(first_script(&root));
        assert_eq!(stmts.len(), 1);
        assert_eq!(print_code(&stmts[0]), "let a =   1");
    }

    #[test]
    fn test_imports_are_hoisted() {
        let text = "%%%\nimport Tex, {a as b, c} from \"m\"\nimport * as ns from 'n'\nexport let y = 2\nlet z = b\n%%%";
        let config = LowerConfig::default();
        let (mut lowerer, root) = lowerer(text, &config);
        let stmts = lowerer.script(first_script(&root));
        assert_eq!(stmts.len(), 1);
        assert_eq!(lowerer.imports.len(), 2);
        assert_eq!(lowerer.exports.len(), 1);
        assert_eq!(print_code(&lowerer.exports[0]), "export let y = 2");
        assert_eq!(lowerer.modules.get("m"), Some(&true));
        assert_eq!(lowerer.modules.get("n"), Some(&false));
        for name in ["Tex", "b", "c", "ns"] {
            assert!(lowerer.bound.contains(name), "{name}");
        }
        assert!(!lowerer.bound.contains("a"));
    }

    #[test]
    fn test_attribute_list() {
        let text = "@Box[width: 2, ...rest, ]{x}";
        let config = LowerConfig::default();
        let (mut lowerer, root) = lowerer(text, &config);
        let command = root
            .children()
            .flat_map(|node| std::iter::once(node).chain(node.children()))
            .find_map(ast::Command::from_untyped)
            .unwrap();
        let code = lowerer.attribute_list(command.attributes().unwrap()).unwrap();
        assert_eq!(print_code(&code), "width: 2, ...rest");
    }

    #[test]
    fn test_unescape_helpers() {
        assert_eq!(unquote("\"m\""), "m");
        assert_eq!(unquote("'@a/b'"), "@a/b");
    }
}
