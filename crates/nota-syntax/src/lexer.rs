use unicode_ident::{is_xid_continue, is_xid_start};
use unicode_script::{Script, UnicodeScript};
use unscanny::Scanner;

use crate::context::{Bracket, Context};

/// Characters that introduce a command in markup.
pub const INTRODUCERS: [char; 4] = ['@', '#', '%', '&'];

/// The result of scanning a run of plain text.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TextRun {
    /// Where the run ends.
    pub end: usize,
    /// How many brackets of each kind the run opened without closing them.
    pub opened: [u32; 3],
}

/// Scan a maximal run of plain text starting at `start` and ending at the
/// latest at `end`.
///
/// The run stops at command introducers (unless escaped with a backslash),
/// at characters that may start an inline construct, and at line terminators
/// when `line_sensitive` is set. Inside a command head it also stops at the
/// structural characters of the head. Inside a bracketed body it consumes
/// balanced brace pairs and stops at a closing brace it did not open.
pub fn text_run(
    text: &str,
    start: usize,
    end: usize,
    ctx: &Context,
    line_sensitive: bool,
) -> TextRun {
    let mut s = Scanner::new(&text[..end]);
    s.jump(start);

    let mut opened = [0u32; 3];
    while let Some(c) = s.peek() {
        if c == '\\' && s.scout(1).is_some_and(|next| INTRODUCERS.contains(&next)) {
            s.eat();
            s.eat();
            continue;
        }

        if INTRODUCERS.contains(&c)
            || is_inline_trigger(c)
            || (line_sensitive && is_newline(c))
            || (ctx.ignores_delimiters() && matches!(c, '[' | '{' | ':' | '|' | '='))
        {
            break;
        }

        // Braces balance within a body. Other brackets may start links and
        // are left to the caller.
        if let Some(bracket) = Bracket::opened_by(c) {
            if !ctx.is_balancing() || bracket != Bracket::Brace {
                break;
            }
            opened[bracket as usize] += 1;
        } else if let Some(bracket) = Bracket::closed_by(c) {
            let count = &mut opened[bracket as usize];
            if !ctx.is_balancing() || *count == 0 {
                break;
            }
            *count -= 1;
        }

        s.eat();
    }

    TextRun { end: s.cursor(), opened }
}

/// Whether the character might start an inline construct other than a
/// command.
fn is_inline_trigger(c: char) -> bool {
    matches!(c, '\\' | '*' | '_' | '~' | '`' | '$' | '<' | '!' | '/' | '-' | '.')
}

/// The result of scanning a balanced region.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Balanced {
    /// The position of the closing delimiter, or the end of the scanned text
    /// if it was never closed.
    pub end: usize,
    /// Whether the closing delimiter was found.
    pub closed: bool,
}

/// Scan a balanced macro body.
///
/// `start` points just behind an opening brace. Tracks the nesting depth of
/// braces, also across newlines, and skips backslash-escaped characters.
/// An unclosed body extends to the end of the text.
pub fn balanced_body(text: &str, start: usize) -> Balanced {
    let mut s = Scanner::new(text);
    s.jump(start);
    let mut depth = 0usize;
    while let Some(c) = s.eat() {
        match c {
            '\\' => {
                s.eat();
            }
            '{' => depth += 1,
            '}' if depth == 0 => {
                return Balanced { end: s.cursor() - 1, closed: true };
            }
            '}' => depth -= 1,
            _ => {}
        }
    }
    Balanced { end: text.len(), closed: false }
}

/// Scan a bracketed group of script-like text, such as an attribute list.
///
/// `start` points just behind the opening bracket `open`. Nested brackets of
/// all kinds and quoted strings are skipped. Scanning stops at `limit`.
pub fn balanced_group(text: &str, start: usize, open: Bracket, limit: usize) -> Balanced {
    let mut s = Scanner::new(&text[..limit]);
    s.jump(start);
    let mut stack = vec![open];
    while let Some(c) = s.eat() {
        match c {
            '\\' => {
                s.eat();
            }
            '"' | '\'' | '`' => {
                let mut escaped = false;
                s.eat_until(|x| {
                    let stop = x == c && !escaped;
                    escaped = x == '\\' && !escaped;
                    stop
                });
                s.eat();
            }
            _ => {
                if let Some(bracket) = Bracket::opened_by(c) {
                    stack.push(bracket);
                } else if let Some(bracket) = Bracket::closed_by(c) {
                    if stack.last() == Some(&bracket) {
                        stack.pop();
                        if stack.is_empty() {
                            return Balanced { end: s.cursor() - 1, closed: true };
                        }
                    }
                }
            }
        }
    }
    Balanced { end: s.cursor(), closed: false }
}

/// Scan a verbatim body.
///
/// `start` points just behind the opening `{|`. Everything up to the
/// terminator `|}` is taken as is.
pub fn verbatim(text: &str, start: usize) -> Balanced {
    match text[start..].find("|}") {
        Some(offset) => Balanced { end: start + offset, closed: true },
        None => Balanced { end: text.len(), closed: false },
    }
}

/// The byte length of the identifier at the start of the text, if any.
pub fn ident_len(text: &str) -> Option<usize> {
    let mut chars = text.char_indices();
    let (_, first) = chars.next()?;
    if !is_id_start(first) {
        return None;
    }
    Some(
        chars
            .find(|&(_, c)| !is_id_continue(c))
            .map_or(text.len(), |(i, _)| i),
    )
}

/// Whether a string is a valid identifier.
#[inline]
pub fn is_ident(string: &str) -> bool {
    ident_len(string) == Some(string.len())
}

/// Whether a character can start an identifier.
#[inline]
pub fn is_id_start(c: char) -> bool {
    is_xid_start(c) || c == '_' || c == '$'
}

/// Whether a character can continue an identifier.
#[inline]
pub fn is_id_continue(c: char) -> bool {
    is_xid_continue(c) || c == '_' || c == '$'
}

/// Whether a character is interpreted as a newline.
#[inline]
pub fn is_newline(character: char) -> bool {
    matches!(
        character,
        // Line Feed, Vertical Tab, Form Feed, Carriage Return.
        '\n' | '\x0B' | '\x0C' | '\r' |
        // Next Line, Line Separator, Paragraph Separator.
        '\u{0085}' | '\u{2028}' | '\u{2029}'
    )
}

/// Whether a character is horizontal whitespace.
#[inline]
pub fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t')
}

/// Whether the characters are letters of a script that separates words with
/// spaces, such that a delimiter between them is inside a word.
pub fn is_wordy(c: Option<char>) -> bool {
    c.is_some_and(|c| {
        c.is_alphanumeric()
            && !matches!(
                c.script(),
                Script::Han | Script::Hiragana | Script::Katakana | Script::Hangul
            )
    })
}

/// Split text at newlines. These newline characters are not kept.
pub fn split_newlines(text: &str) -> Vec<&str> {
    let mut s = Scanner::new(text);
    let mut lines = Vec::new();
    let mut start = 0;
    let mut end = 0;

    while let Some(c) = s.eat() {
        if is_newline(c) {
            if c == '\r' {
                s.eat_if('\n');
            }

            lines.push(&text[start..end]);
            start = s.cursor();
        }
        end = s.cursor();
    }

    lines.push(&text[start..]);
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Shift;

    #[test]
    fn test_text_run_stops_at_introducers() {
        let ctx = Context::new();
        assert_eq!(text_run("ab @c", 0, 5, &ctx, true).end, 3);
        assert_eq!(text_run("ab #c", 0, 5, &ctx, true).end, 3);
        assert_eq!(text_run("ab\ncd", 0, 5, &ctx, true).end, 2);
        assert_eq!(text_run("ab\ncd", 0, 5, &ctx, false).end, 5);
    }

    #[test]
    fn test_text_run_escaped_introducer() {
        let ctx = Context::new();
        assert_eq!(text_run(r"\@x", 0, 3, &ctx, true).end, 3);
        assert_eq!(text_run(r"a\%b%c", 0, 6, &ctx, true).end, 4);
    }

    #[test]
    fn test_text_run_in_command_head() {
        let ctx = Context::new().shift(Shift::Introducer);
        assert_eq!(text_run("ab: c", 0, 5, &ctx, true).end, 2);
        assert_eq!(text_run("ab=c", 0, 4, &ctx, true).end, 2);
        assert_eq!(text_run("ab|c", 0, 4, &ctx, true).end, 2);
    }

    #[test]
    fn test_text_run_balances_brackets() {
        let ctx = Context::new()
            .shift(Shift::Introducer)
            .shift(Shift::Open(Bracket::Brace));
        let run = text_run("a{b}c}d", 0, 7, &ctx, true);
        assert_eq!(run.end, 5);
        assert_eq!(run.opened, [0; 3]);

        let run = text_run("a{b @", 0, 5, &ctx, true);
        assert_eq!(run.end, 4);
        assert_eq!(run.opened, [1, 0, 0]);
    }

    #[test]
    fn test_balanced_body() {
        assert_eq!(balanced_body("{a{b}c}d", 1), Balanced { end: 6, closed: true });
        assert_eq!(balanced_body("{a\n{b}\n}", 1), Balanced { end: 7, closed: true });
        assert_eq!(balanced_body(r"{a\}b}", 1), Balanced { end: 5, closed: true });
        assert_eq!(balanced_body("{a{b}", 1), Balanced { end: 5, closed: false });
    }

    #[test]
    fn test_balanced_group() {
        let text = r#"[a: "]", b: [1, 2]] x"#;
        let group = balanced_group(text, 1, Bracket::Square, text.len());
        assert_eq!(group, Balanced { end: 18, closed: true });
        assert!(!balanced_group("[a: (1]", 1, Bracket::Square, 7).closed);
    }

    #[test]
    fn test_verbatim() {
        assert_eq!(verbatim("{|a}|b|}", 2), Balanced { end: 6, closed: true });
        assert_eq!(verbatim("{|ab", 2), Balanced { end: 4, closed: false });
    }

    #[test]
    fn test_idents() {
        assert_eq!(ident_len("foo-bar"), Some(3));
        assert_eq!(ident_len("$x y"), Some(2));
        assert_eq!(ident_len("1x"), None);
        assert!(is_ident("h1"));
        assert!(!is_ident("h 1"));
    }

    #[test]
    fn test_split_newlines() {
        assert_eq!(split_newlines("a\r\nb\nc"), vec!["a", "b", "c"]);
    }
}
