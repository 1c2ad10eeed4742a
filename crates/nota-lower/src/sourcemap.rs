use ecow::EcoString;
use nota_syntax::Lines;
use serde_json::json;

use crate::LowerOptions;

/// The source name used when no file name is known.
const DEFAULT_SOURCE: &str = "document.nota";

/// The characters of the base64 alphabet, by value.
const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// A byte position in the program and the document position it stems from.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Mapping {
    /// The byte offset in the generated program.
    pub generated: usize,
    /// The byte offset in the document.
    pub original: usize,
}

/// Maps positions in a lowered program back to the document.
///
/// The mappings are ordered by generated position. Every position between two
/// mappings belongs to the earlier one.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
pub struct SourceMap {
    mappings: Vec<Mapping>,
}

impl SourceMap {
    /// Create a source map from mappings ordered by generated position.
    pub fn new(mut mappings: Vec<Mapping>) -> Self {
        mappings.sort_by_key(|mapping| mapping.generated);
        Self { mappings }
    }

    /// The raw mappings.
    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    /// The document offset that the program offset stems from.
    pub fn original(&self, generated: usize) -> Option<usize> {
        let i = self.mappings.partition_point(|mapping| mapping.generated <= generated);
        i.checked_sub(1).map(|i| self.mappings[i].original)
    }

    /// The first program offset lowered from the closest document offset at
    /// or before `original`.
    pub fn generated(&self, original: usize) -> Option<usize> {
        self.mappings
            .iter()
            .filter(|mapping| mapping.original <= original)
            .max_by_key(|mapping| (mapping.original, std::cmp::Reverse(mapping.generated)))
            .map(|mapping| mapping.generated)
    }

    /// Encode the mappings in the VLQ format of version 3 source maps.
    ///
    /// Columns are counted in UTF-16 code units.
    pub fn encode(&self, program: &str, source: &str) -> String {
        let generated = Lines::new(program);
        let original = Lines::new(source);

        let mut out = String::new();
        let mut line = 0;
        let mut first = true;
        let mut prev = (0, 0, 0);
        for mapping in &self.mappings {
            let (Some(to), Some(from)) =
                (generated.position(mapping.generated), original.position(mapping.original))
            else {
                continue;
            };
            let (gen_line, gen_col) = (to.line, to.utf16_column);
            let (src_line, src_col) = (from.line, from.utf16_column);

            while line < gen_line {
                out.push(';');
                line += 1;
                prev.0 = 0;
                first = true;
            }
            if !first {
                out.push(',');
            }
            first = false;

            let (gen_col, src_line, src_col) = (gen_col as i64, src_line as i64, src_col as i64);
            vlq(&mut out, gen_col - prev.0);
            vlq(&mut out, 0);
            vlq(&mut out, src_line - prev.1);
            vlq(&mut out, src_col - prev.2);
            prev = (gen_col, src_line, src_col);
        }
        out
    }

    /// Serialize as a version 3 source map.
    pub fn to_json(&self, program: &str, source: &str, options: &LowerOptions) -> serde_json::Value {
        let name: EcoString = options
            .file_name_hint
            .clone()
            .unwrap_or_else(|| DEFAULT_SOURCE.into());
        json!({
            "version": 3,
            "file": format!("{name}.js"),
            "sourceRoot": options.source_root.as_deref().unwrap_or(""),
            "sources": [name.as_str()],
            "sourcesContent": [source],
            "names": [],
            "mappings": self.encode(program, source),
        })
    }
}

/// Append a base64 VLQ encoded value.
fn vlq(out: &mut String, value: i64) {
    let mut rest = if value < 0 { ((-value) << 1) | 1 } else { value << 1 };
    loop {
        let mut digit = rest & 0b11111;
        rest >>= 5;
        if rest > 0 {
            digit |= 0b100000;
        }
        out.push(BASE64[digit as usize] as char);
        if rest == 0 {
            break;
        }
    }
}
