//! Assembly of the lowered document into a module.

use ecow::EcoString;
use indexmap::IndexMap;

use crate::js::{Elem, Expr, ExprKind, FACTORY, FRAGMENT, Prop};
use crate::lower::Lowerer;
use crate::optimize::optimize;
use crate::print::Printer;
use crate::sourcemap::Mapping;

/// The parameter through which the document component receives its props.
const DOC_PROPS: &str = "docProps";

/// The prelude component that renders the document itself.
const DOCUMENT: &str = "Document";

/// The default export: an observed component rendering the document.
pub(crate) fn document(props: Vec<Prop>, body: Expr) -> Expr {
    let mut attrs = vec![Prop::Spread(Expr::ident(DOC_PROPS))];
    attrs.extend(props);
    let doc = Expr::element(Expr::ident(DOCUMENT), Expr::object(attrs), vec![Elem::Spread(body)]);
    let arrow = Expr::new(ExprKind::Arrow(DOC_PROPS.into(), Box::new(doc)));
    optimize(Expr::call(Expr::ident("observer"), vec![Elem::Item(arrow)]))
}

/// The prelude components the document uses, grouped by namespace.
pub(crate) fn prelude<'a>(lowerer: &'a Lowerer) -> IndexMap<&'a str, Vec<&'a str>> {
    let mut used: IndexMap<&str, Vec<&str>> = IndexMap::new();
    for (name, namespace) in &lowerer.config.prelude {
        let referenced = lowerer.names.contains(name) && !lowerer.bound.contains(name);
        if referenced || name == DOCUMENT {
            used.entry(namespace.as_str()).or_default().push(name.as_str());
        }
    }
    used
}

/// Print the module: imports, hoisted statements and the default export.
pub(crate) fn print(lowerer: &Lowerer, doc: &Expr) -> (String, Vec<Mapping>) {
    let config = lowerer.config;
    let mut p = Printer::default();
    p.mark(Some(0));

    p.push_str(&format!("import {{ {} as {FACTORY}, {FRAGMENT} }} from ", config.factory));
    p.string(&config.runtime);
    p.push_str(";\nimport { observer } from ");
    p.string(&config.observer);
    p.push_str(";\n");

    let prelude = prelude(lowerer);
    if !prelude.is_empty() {
        let namespaces: Vec<_> = prelude.keys().copied().collect();
        p.push_str(&format!("import {{ {} }} from ", namespaces.join(", ")));
        p.string(&config.components);
        p.push_str(";\n");
    }

    for stylesheet in &config.stylesheets {
        p.push_str("import ");
        p.string(stylesheet);
        p.push_str(";\n");
    }

    for (namespace, names) in &prelude {
        p.push_str(&format!("const {{ {} }} = {namespace};\n", names.join(", ")));
    }

    for import in &lowerer.imports {
        p.statement(import);
    }

    let modules: Vec<(&EcoString, bool)> =
        lowerer.modules.iter().map(|(module, &default)| (module, default)).collect();
    if config.debug_exports {
        for (i, (module, default)) in modules.iter().enumerate() {
            if *default {
                p.push_str(&format!("import import{i}_default, * as import{i} from "));
            } else {
                p.push_str(&format!("import * as import{i} from "));
            }
            p.string(module);
            p.push_str(";\n");
        }
    }

    for export in &lowerer.exports {
        p.statement(export);
    }

    if config.debug_exports {
        p.push_str("export let imports = {");
        for (i, (module, default)) in modules.iter().enumerate() {
            if i > 0 {
                p.push_str(", ");
            }
            p.string(module);
            p.push_str(&format!(": {{...import{i}, \"__esModule\": true"));
            if *default {
                p.push_str(&format!(", \"default\": import{i}_default"));
            }
            p.push_str("}");
        }
        p.push_str("};\nexport let source = ");
        p.string(lowerer.text);
        p.push_str(";\n");
    }

    p.push_str("export default ");
    p.expr(doc);
    p.push_str(";\n");
    p.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LowerConfig;
    use nota_syntax::ast::{AstNode, Markup};

    fn program(text: &str, config: &LowerConfig) -> String {
        let root = nota_syntax::parse(text).unwrap();
        let mut lowerer = Lowerer::new(text, config);
        let (props, body) = lowerer.document(Markup::from_untyped(&root).unwrap());
        assert!(lowerer.errors.is_empty(), "{:?}", lowerer.errors);
        let doc = document(props, body);
        print(&lowerer, &doc).0
    }

    #[test]
    fn test_minimal_program() {
        let out = program("Hi", &LowerConfig::default());
        assert_eq!(
            out,
            concat!(
                "import { createElement as el, Fragment } from \"react\";\n",
                "import { observer } from \"mobx-react\";\n",
                "import { document } from \"@nota-lang/nota-components\";\n",
                "import \"@nota-lang/nota-components/dist/index.css\";\n",
                "const { Document } = document;\n",
                "export default observer(docProps => el(Document, docProps, el(\"p\", {}, \"Hi\")));\n",
            ),
        );
    }

    #[test]
    fn test_document_attributes() {
        let out = program("| title: \"T\"\n\nHi", &LowerConfig::default());
        assert!(out.contains(r#"el(Document, {...docProps, title: "T"}, el("p", {}, "Hi"))"#), "{out}");
    }

    #[test]
    fn test_used_prelude_is_grouped() {
        let out = program("@Section: A\n\n$x$ and $y$\n", &LowerConfig::default());
        assert!(out.contains("import { document, math } from \"@nota-lang/nota-components\";\n"));
        assert!(out.contains("const { Document, Section } = document;\n"));
        assert!(out.contains("const { $ } = math;\n"));
    }

    #[test]
    fn test_imported_names_shadow_prelude() {
        let out = program("% import { Section } from \"./mine\"\n\n@Section: A\n", &LowerConfig::default());
        assert!(out.contains("const { Document } = document;\n"), "{out}");
        assert!(out.contains("import { Section } from \"./mine\";\n"));
    }

    #[test]
    fn test_debug_exports() {
        let config = LowerConfig { debug_exports: true, ..LowerConfig::default() };
        let out = program("%%%\nimport A from \"a\"\nimport { b } from \"b\"\nexport let c = 1\n%%%\n", &config);
        assert!(out.contains("import import0_default, * as import0 from \"a\";\n"), "{out}");
        assert!(out.contains("import * as import1 from \"b\";\n"));
        assert!(out.contains(concat!(
            "export let c = 1;\n",
            "export let imports = {\"a\": {...import0, \"__esModule\": true, \"default\": import0_default}, ",
            "\"b\": {...import1, \"__esModule\": true}};\n",
        )));
        assert!(out.contains("export let source = \"%%%\\nimport A"));
    }
}
