use ecow::EcoString;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// The HTML elements that components may name directly.
const INTRINSIC_ELEMENTS: &[&str] = &[
    "a", "abbr", "address", "article", "aside", "audio", "b", "bdi", "bdo",
    "blockquote", "br", "button", "canvas", "caption", "cite", "code", "col",
    "colgroup", "data", "dd", "del", "details", "dfn", "dialog", "div", "dl",
    "dt", "em", "embed", "fieldset", "figcaption", "figure", "footer", "form",
    "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "i", "iframe", "img",
    "input", "ins", "kbd", "label", "legend", "li", "main", "mark", "nav", "ol",
    "p", "picture", "pre", "q", "s", "samp", "section", "select", "small",
    "source", "span", "strong", "sub", "summary", "sup", "table", "tbody", "td",
    "textarea", "tfoot", "th", "thead", "time", "tr", "u", "ul", "var", "video",
];

/// The components every program can use without importing them, with the
/// namespace of the component library they live in.
const PRELUDE: &[(&str, &str)] = &[
    ("Document", "document"),
    ("Section", "document"),
    ("Ref", "definitions"),
    ("Definition", "definitions"),
    ("Footnote", "document"),
    ("Listing", "code"),
    ("$", "math"),
    ("$$", "math"),
];

/// How documents are turned into programs.
///
/// Every field has a default, so a configuration file only needs to list
/// what it changes.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LowerConfig {
    /// The module providing the element factory and `Fragment`.
    pub runtime: EcoString,
    /// The name of the element factory exported by the runtime.
    pub factory: EcoString,
    /// The module providing `observer`.
    pub observer: EcoString,
    /// The component library the prelude is imported from.
    pub components: EcoString,
    /// Component names that are emitted as element name strings.
    pub intrinsics: IndexSet<EcoString>,
    /// Stylesheets imported for their side effects.
    pub stylesheets: Vec<EcoString>,
    /// Whether to export the imported modules and the source text.
    pub debug_exports: bool,
    /// The prelude components, mapped to their namespace in the library.
    pub prelude: IndexMap<EcoString, EcoString>,
}

impl LowerConfig {
    /// Read a configuration from TOML.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Write the configuration as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }

    /// Whether the name refers to an element rather than a component.
    pub fn is_intrinsic(&self, name: &str) -> bool {
        self.intrinsics.contains(name)
    }

    /// The namespace of a prelude component.
    pub fn namespace(&self, name: &str) -> Option<&EcoString> {
        self.prelude.get(name)
    }
}

impl Default for LowerConfig {
    fn default() -> Self {
        let components: EcoString = "@nota-lang/nota-components".into();
        Self {
            runtime: "react".into(),
            factory: "createElement".into(),
            observer: "mobx-react".into(),
            stylesheets: vec![ecow::eco_format!("{components}/dist/index.css")],
            components,
            prelude: PRELUDE
                .iter()
                .map(|&(name, namespace)| (name.into(), namespace.into()))
                .collect(),
            intrinsics: INTRINSIC_ELEMENTS.iter().map(|&name| name.into()).collect(),
            debug_exports: false,
        }
    }
}

/// The per-call input of [`lower`](crate::lower).
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct LowerOptions {
    /// The `sourceRoot` of the emitted source map.
    pub source_root: Option<EcoString>,
    /// The name of the document, used as the source map's source.
    pub file_name_hint: Option<EcoString>,
    /// How the document is turned into a program.
    pub config: LowerConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LowerConfig::default();
        assert!(config.is_intrinsic("h1"));
        assert!(!config.is_intrinsic("Listing"));
        assert_eq!(config.namespace("Listing").map(EcoString::as_str), Some("code"));
        assert_eq!(config.stylesheets, ["@nota-lang/nota-components/dist/index.css"]);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = LowerConfig::from_toml(
            "runtime = \"preact\"\ndebug-exports = true\n\n[prelude]\nTheorem = \"math\"\n",
        )
        .unwrap();
        assert_eq!(config.runtime, "preact");
        assert!(config.debug_exports);
        assert_eq!(config.factory, "createElement");
        assert_eq!(config.prelude.len(), 1);
        assert_eq!(config.namespace("Theorem").map(EcoString::as_str), Some("math"));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = LowerConfig::default();
        let text = config.to_toml().unwrap();
        assert_eq!(LowerConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_toml_field_types_are_checked() {
        assert!(LowerConfig::from_toml("stylesheets = 3").is_err());
        assert!(LowerConfig::from_toml("unrelated = 3").is_ok());
    }
}
