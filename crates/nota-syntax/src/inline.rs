use std::ops::Range;

use crate::context::{Bracket, Context, Reduce, Shift};
use crate::lexer::{self, INTRODUCERS};
use crate::{MAX_DEPTH, MarkupKind, SyntaxNode};

/// Which inline rules are active.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum InlineMode {
    /// All inline rules.
    Markup,
    /// Only interpolations and escapes, as in math.
    Template,
}

/// The result of parsing an inline region.
pub(crate) struct InlineOutput {
    /// The parsed nodes, losslessly covering the region.
    pub nodes: Vec<SyntaxNode>,
    /// The offset at which the nesting limit was exceeded, if it was.
    pub overflow: Option<usize>,
}

/// Parse a region of inline content.
///
/// The region consists of `segments` of a single block, usually one per
/// line. The text between two segments becomes a [`MarkupKind::Newline`].
pub(crate) fn inline(
    text: &str,
    segments: Vec<Range<usize>>,
    mode: InlineMode,
    depth: usize,
) -> InlineOutput {
    let end = segments.last().map_or(0, |seg| seg.end);
    let at_input_end = text[end..].trim().is_empty();
    let pos = segments.first().map_or(0, |seg| seg.start);
    let mut p = InlineParser {
        text,
        segments,
        seg: 0,
        pos,
        ctx: Context::new(),
        parts: vec![],
        mode,
        at_input_end,
        depth,
        overflow: None,
    };
    p.run();
    p.finish()
}

/// Parses inline content with a stack of unresolved delimiters.
struct InlineParser<'s> {
    text: &'s str,
    segments: Vec<Range<usize>>,
    /// The index of the current segment.
    seg: usize,
    /// The current position.
    pos: usize,
    /// The lexical context after the last shifted token.
    ctx: Context,
    /// Finished nodes interleaved with unresolved delimiters.
    parts: Vec<Part>,
    mode: InlineMode,
    /// Whether nothing but whitespace follows the region.
    at_input_end: bool,
    depth: usize,
    overflow: Option<usize>,
}

/// A finished node or a delimiter waiting to be resolved.
enum Part {
    Node(SyntaxNode),
    Delim(Delim),
}

/// An unresolved delimiter.
struct Delim {
    kind: DelimKind,
    range: Range<usize>,
    /// How many delimiters were open when this one was pushed.
    level: usize,
}

enum DelimKind {
    /// A run of `*` or `_`.
    Emph { mark: char, len: usize },
    /// `~~`.
    Strike,
    /// `[` or `![`.
    Link { image: bool },
    /// The head of a command whose content is still open.
    Command { kind: MarkupKind, head: Vec<SyntaxNode> },
    /// The opening brace of a content block.
    BodyOpen,
}

impl DelimKind {
    /// Whether closers of other kinds may not look past this delimiter.
    fn is_barrier(&self) -> bool {
        matches!(self, Self::Command { .. } | Self::BodyOpen | Self::Link { .. })
    }
}

impl InlineParser<'_> {
    fn run(&mut self) {
        while self.seg < self.segments.len() {
            let seg_end = self.seg_end();
            if self.pos >= seg_end {
                self.seg += 1;
                if let Some(next) = self.segments.get(self.seg) {
                    let next = next.start;
                    if next > seg_end {
                        self.push_leaf(MarkupKind::Newline, seg_end..next);
                    }
                    self.ctx = self.ctx.shift(Shift::Newline);
                    self.pos = next;
                }
                continue;
            }

            // Past an overflow the rest of the region is text.
            if self.overflow.is_some() {
                self.push_leaf(MarkupKind::Text, self.pos..seg_end);
                continue;
            }

            let Some(c) = self.peek() else { break };
            let claimed = match self.mode {
                InlineMode::Markup => self.markup_rule(c),
                InlineMode::Template => self.template_rule(c),
            };
            if !claimed {
                self.plain(c);
            } else if !matches!(c, '}' | '{') {
                self.ctx = self.ctx.shift(Shift::Other);
            }
        }
    }

    /// Offer the position to the inline rules keyed by its first character.
    fn markup_rule(&mut self, c: char) -> bool {
        match c {
            '\\' => self.escape(),
            '@' => self.command(MarkupKind::InlineComponent, 1),
            '.' if self.scout(1) == Some('@') => self.command(MarkupKind::InlineComponent, 2),
            '#' => self.command(MarkupKind::Interpolation, 1),
            '&' => self.reference(),
            '$' => self.math(),
            '`' => self.code(),
            '*' | '_' => self.emphasis(c),
            '~' => self.strikethrough(),
            '[' => self.link_open(false),
            '!' if self.scout(1) == Some('[') => self.link_open(true),
            ']' => self.link_close(),
            '<' => self.autolink(),
            '-' => self.special(),
            '/' => self.comment(),
            '}' => self.close_body(),
            _ => false,
        }
    }

    /// Offer the position to the rules active in math.
    fn template_rule(&mut self, c: char) -> bool {
        match c {
            '\\' if matches!(self.scout(1), Some('$' | '#')) => {
                self.push_leaf(MarkupKind::Escape, self.pos..self.pos + 2);
                true
            }
            '#' => self.command(MarkupKind::Interpolation, 1),
            '}' => self.close_body(),
            _ => false,
        }
    }

    /// Consume plain text after all rules declined.
    fn plain(&mut self, c: char) {
        let start = self.pos;
        let run = lexer::text_run(self.text, start, self.seg_end(), &self.ctx, true);
        if run.end > start {
            for _ in 0..run.opened[Bracket::Brace as usize] {
                self.ctx = self.ctx.shift(Shift::Open(Bracket::Brace));
            }
            self.push_leaf(MarkupKind::Text, start..run.end);
            self.ctx = self.ctx.shift(Shift::Other);
            return;
        }

        let token = if let Some(bracket) = Bracket::opened_by(c) {
            Shift::Open(bracket)
        } else if let Some(bracket) = Bracket::closed_by(c) {
            Shift::Close(bracket)
        } else {
            Shift::Other
        };
        self.ctx = self.ctx.shift(token);
        self.push_leaf(MarkupKind::Text, start..start + c.len_utf8());
    }

    fn finish(mut self) -> InlineOutput {
        while let Some(open) = self.last_delim(|kind| matches!(kind, DelimKind::BodyOpen)) {
            if self.at_input_end {
                let content = self.drain_nodes(open + 1);
                let brace = self.pop_delim_leaf(MarkupKind::LeftBrace);
                let mut children = vec![brace];
                children.extend(content);
                self.parts.push(Part::Node(SyntaxNode::inner(MarkupKind::ContentBlock, children)));
                self.finish_command();
            } else {
                self.degrade_command(open);
            }
        }

        let nodes = self.drain_nodes(0);
        debug_assert!(self.ctx.is_root(), "unbalanced lexical context");
        InlineOutput { nodes, overflow: self.overflow }
    }
}

/// Inline rules.
impl InlineParser<'_> {
    fn escape(&mut self) -> bool {
        match self.scout(1) {
            Some(c) if c.is_ascii_punctuation() && !INTRODUCERS.contains(&c) => {
                self.push_leaf(MarkupKind::Escape, self.pos..self.pos + 2);
                true
            }
            _ => false,
        }
    }

    fn command(&mut self, kind: MarkupKind, sigil_len: usize) -> bool {
        if lexer::is_wordy(self.before()) {
            return false;
        }

        let start = self.pos;
        let limit = self.seg_end();
        let Some(head) = command_head(self.text, start, sigil_len, limit) else {
            return false;
        };
        if head.name.is_none() && kind != MarkupKind::InlineComponent {
            return false;
        }

        let rest = &self.text[head.end()..limit];
        if rest.starts_with('{') && self.ctx.depth() >= 2 * MAX_DEPTH {
            self.overflow.get_or_insert(start);
            return false;
        }

        if rest.starts_with("{|") {
            let body = lexer::verbatim(self.text, head.end() + 2);
            if body.closed && body.end + 2 <= self.region_end() {
                let mut children = head.nodes(self.text);
                children.push(verbatim_node(self.text, head.end(), body.end));
                self.parts.push(Part::Node(SyntaxNode::inner(kind, children)));
                self.jump_across(body.end + 2);
                return true;
            }
        }

        if rest.starts_with('{') {
            let end = head.end();
            self.ctx = self.ctx.shift(Shift::Introducer);
            self.parts.push(Part::Delim(Delim {
                kind: DelimKind::Command { kind, head: head.nodes(self.text) },
                range: start..end,
                level: self.level(),
            }));
            self.open_body(end);
            return true;
        }

        if head.name.is_none() {
            return false;
        }

        let mut children = head.nodes(self.text);
        if kind == MarkupKind::InlineComponent
            && rest.starts_with(':')
            && rest[1..].chars().next().is_none_or(char::is_whitespace)
        {
            let colon = head.end();
            children.push(SyntaxNode::leaf(MarkupKind::Colon, ":", colon));
            self.line_content(colon + 1, &mut children);
        } else {
            self.jump(head.end());
        }

        self.ctx = self.ctx.shift(Shift::Introducer).reduce(Reduce::Command);
        self.parts.push(Part::Node(SyntaxNode::inner(kind, children)));
        true
    }

    /// Parse the `: rest` form of an inline component.
    ///
    /// The content runs to the end of the line, or inside a body to the first
    /// unmatched closing brace.
    fn line_content(&mut self, from: usize, children: &mut Vec<SyntaxNode>) {
        let limit = self.seg_end();
        let inside_body = self.ctx.inside(Bracket::Brace);
        let mut end = limit;
        let mut depth = 0usize;
        let mut chars = self.text[from..limit].char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => {
                    chars.next();
                }
                '{' => depth += 1,
                '}' if depth > 0 => depth -= 1,
                '}' if inside_body => {
                    end = from + i;
                    break;
                }
                _ => {}
            }
        }

        let content = from + self.text[from..end].len()
            - self.text[from..end].trim_start().len();
        if content > from {
            children.push(SyntaxNode::leaf(
                MarkupKind::Space,
                &self.text[from..content],
                from,
            ));
        }

        if content < end {
            let nodes = self.nested(content..end, InlineMode::Markup);
            children.push(SyntaxNode::inner(MarkupKind::LineContent, nodes));
        }
        self.jump(end);
    }

    fn reference(&mut self) -> bool {
        let start = self.pos;
        let Some(head) = command_head(self.text, start, 1, self.seg_end()) else {
            return false;
        };
        if head.name.is_none() {
            return false;
        }
        let children = head.nodes(self.text);
        self.ctx = self.ctx.shift(Shift::Introducer).reduce(Reduce::Command);
        self.parts.push(Part::Node(SyntaxNode::inner(MarkupKind::Reference, children)));
        self.jump(head.end());
        true
    }

    fn math(&mut self) -> bool {
        let start = self.pos;
        let limit = self.seg_end();
        if self.at("$$") || self.scout(1).is_none_or(char::is_whitespace) {
            return false;
        }

        let mut escaped = false;
        let mut close = None;
        for (i, c) in self.text[start + 1..limit].char_indices() {
            if c == '$' && !escaped {
                close = Some(start + 1 + i);
                break;
            }
            escaped = c == '\\' && !escaped;
        }
        let Some(close) = close else { return false };
        if self.text[..close].ends_with(char::is_whitespace) {
            return false;
        }

        let mut children = vec![SyntaxNode::leaf(MarkupKind::MathDelim, "$", start)];
        let nodes = self.nested(start + 1..close, InlineMode::Template);
        children.push(SyntaxNode::inner(MarkupKind::MathContent, nodes));
        children.push(SyntaxNode::leaf(MarkupKind::MathDelim, "$", close));
        self.parts.push(Part::Node(SyntaxNode::inner(MarkupKind::MathInline, children)));
        self.jump(close + 1);
        true
    }

    fn code(&mut self) -> bool {
        let start = self.pos;
        let limit = self.seg_end();
        let len = self.run_len('`');
        let marks = &self.text[start..start + len];

        let mut s = unscanny::Scanner::new(&self.text[..limit]);
        s.jump(start + len);
        let close = loop {
            s.eat_until('`');
            if s.done() {
                break None;
            }
            let at = s.cursor();
            s.eat_while('`');
            if s.cursor() - at == len {
                break Some(at);
            }
        };

        let Some(close) = close else {
            self.push_leaf(MarkupKind::Text, start..start + len);
            return true;
        };

        let mut children = vec![SyntaxNode::leaf(MarkupKind::CodeMark, marks, start)];
        if close > start + len {
            children.push(SyntaxNode::leaf(
                MarkupKind::CodeText,
                &self.text[start + len..close],
                start + len,
            ));
        }
        children.push(SyntaxNode::leaf(MarkupKind::CodeMark, marks, close));
        self.parts.push(Part::Node(SyntaxNode::inner(MarkupKind::InlineCode, children)));
        self.jump(close + len);
        true
    }

    fn emphasis(&mut self, mark: char) -> bool {
        let start = self.pos;
        let len = self.run_len(mark);
        let range = start..start + len;
        if len > 2 {
            self.push_leaf(MarkupKind::Text, range);
            return true;
        }

        let (can_open, can_close) = self.flanking(mark, range.clone());
        let kind = if len == 2 { MarkupKind::Strong } else { MarkupKind::Emph };
        if can_close
            && self.resolve(
                |delim| matches!(delim, DelimKind::Emph { mark: m, len: l } if *m == mark && *l == len),
                kind,
                MarkupKind::EmphMark,
                range.clone(),
            )
        {
            return true;
        }

        if can_open {
            self.push_delim(DelimKind::Emph { mark, len }, range);
        } else {
            self.push_leaf(MarkupKind::Text, range);
        }
        true
    }

    fn strikethrough(&mut self) -> bool {
        let start = self.pos;
        if self.run_len('~') != 2 {
            return false;
        }

        let range = start..start + 2;
        let (can_open, can_close) = self.flanking('~', range.clone());
        if can_close
            && self.resolve(
                |delim| matches!(delim, DelimKind::Strike),
                MarkupKind::Strikethrough,
                MarkupKind::EmphMark,
                range.clone(),
            )
        {
            return true;
        }

        if !can_open {
            return false;
        }
        self.push_delim(DelimKind::Strike, range);
        true
    }

    fn link_open(&mut self, image: bool) -> bool {
        let start = self.pos;
        let len = if image { 2 } else { 1 };
        if self.push_delim(DelimKind::Link { image }, start..start + len) {
            self.ctx = self.ctx.shift(Shift::Open(Bracket::Square));
        }
        true
    }

    fn link_close(&mut self) -> bool {
        let close = self.pos;
        let limit = self.seg_end();
        if !self.text[close + 1..limit].starts_with('(') {
            return false;
        }
        let dest = lexer::balanced_group(self.text, close + 2, Bracket::Paren, limit);
        if !dest.closed {
            return false;
        }
        let Some(open) = self.rfind(|kind| matches!(kind, DelimKind::Link { .. })) else {
            return false;
        };

        let content = self.drain_nodes(open + 1);
        let Some(Part::Delim(delim)) = self.parts.pop() else { return false };
        let image = matches!(delim.kind, DelimKind::Link { image: true });

        let mut children = vec![self.leaf(MarkupKind::LinkMark, delim.range)];
        children.extend(content);
        children.push(SyntaxNode::leaf(MarkupKind::LinkMark, "]", close));
        children.push(SyntaxNode::leaf(MarkupKind::LinkMark, "(", close + 1));
        if dest.end > close + 2 {
            children.push(self.leaf(MarkupKind::Url, close + 2..dest.end));
        }
        children.push(SyntaxNode::leaf(MarkupKind::LinkMark, ")", dest.end));

        let kind = if image { MarkupKind::Image } else { MarkupKind::Link };
        self.ctx = self.ctx.shift(Shift::Close(Bracket::Square));
        self.parts.push(Part::Node(SyntaxNode::inner(kind, children)));
        self.jump(dest.end + 1);
        true
    }

    fn autolink(&mut self) -> bool {
        let start = self.pos;
        let rest = &self.text[start + 1..self.seg_end()];
        let Some(close) = rest.find(['>', '<', ' ', '\t']) else { return false };
        let url = &rest[..close];
        let scheme = url.split_once(':').map(|(scheme, _)| scheme);
        if !rest[close..].starts_with('>')
            || !scheme.is_some_and(|scheme| {
                scheme.len() >= 2
                    && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                    && scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+.-".contains(c))
            })
        {
            return false;
        }

        let end = start + 1 + close;
        let children = vec![
            SyntaxNode::leaf(MarkupKind::LinkMark, "<", start),
            SyntaxNode::leaf(MarkupKind::Url, url, start + 1),
            SyntaxNode::leaf(MarkupKind::LinkMark, ">", end),
        ];
        self.parts.push(Part::Node(SyntaxNode::inner(MarkupKind::Autolink, children)));
        self.jump(end + 1);
        true
    }

    fn special(&mut self) -> bool {
        if self.run_len('-') != 3 {
            return false;
        }
        self.push_leaf(MarkupKind::Special, self.pos..self.pos + 3);
        true
    }

    fn comment(&mut self) -> bool {
        let start = self.pos;
        let at_start = start == self.segments[self.seg].start;
        if !self.at("//") || !(at_start || self.before().is_some_and(char::is_whitespace)) {
            return false;
        }
        self.push_leaf(MarkupKind::LineComment, start..self.seg_end());
        true
    }

    /// Close the innermost content block if the context says this brace
    /// belongs to it.
    fn close_body(&mut self) -> bool {
        if !self.ctx.closes(Bracket::Brace) {
            return false;
        }
        let Some(open) = self.last_delim(|kind| matches!(kind, DelimKind::BodyOpen)) else {
            return false;
        };

        let close = self.pos;
        let content = self.drain_nodes(open + 1);
        let brace = self.pop_delim_leaf(MarkupKind::LeftBrace);
        let mut children = vec![brace];
        children.extend(content);
        children.push(SyntaxNode::leaf(MarkupKind::RightBrace, "}", close));
        self.parts.push(Part::Node(SyntaxNode::inner(MarkupKind::ContentBlock, children)));
        self.ctx = self.ctx.shift(Shift::Close(Bracket::Brace));
        self.jump(close + 1);

        if self.at("{") && !self.at("{|") {
            self.open_body(close + 1);
        } else {
            self.finish_command();
        }
        true
    }
}

/// Delimiter resolution.
impl InlineParser<'_> {
    /// Resolve the innermost open delimiter accepted by `matches` with a
    /// closer at `close`.
    ///
    /// Everything between opener and closer becomes the children of a node of
    /// the given kind, with unresolved delimiters degraded to text. Returns
    /// `false` without changes if no opener is found before a barrier.
    fn resolve(
        &mut self,
        matches: impl Fn(&DelimKind) -> bool,
        kind: MarkupKind,
        mark: MarkupKind,
        close: Range<usize>,
    ) -> bool {
        let Some(open) = self.rfind(matches) else { return false };
        let content = self.drain_nodes(open + 1);
        let opener = self.pop_delim_leaf(mark);
        let mut children = vec![opener];
        children.extend(content);
        children.push(self.leaf(mark, close.clone()));
        self.parts.push(Part::Node(SyntaxNode::inner(kind, children)));
        self.jump(close.end);
        true
    }

    /// Find the innermost open delimiter accepted by `matches`, not looking
    /// past barriers that are not accepted themselves.
    fn rfind(&self, matches: impl Fn(&DelimKind) -> bool) -> Option<usize> {
        for (i, part) in self.parts.iter().enumerate().rev() {
            if let Part::Delim(delim) = part {
                if matches(&delim.kind) {
                    return Some(i);
                }
                if delim.kind.is_barrier() {
                    return None;
                }
            }
        }
        None
    }

    /// Find the innermost open delimiter accepted by `matches`, looking past
    /// all barriers.
    fn last_delim(&self, matches: impl Fn(&DelimKind) -> bool) -> Option<usize> {
        self.parts
            .iter()
            .rposition(|part| matches!(part, Part::Delim(delim) if matches(&delim.kind)))
    }

    /// Open a content block with the brace at `at`.
    fn open_body(&mut self, at: usize) {
        self.ctx = self.ctx.shift(Shift::Open(Bracket::Brace));
        let level = self.level();
        self.parts.push(Part::Delim(Delim {
            kind: DelimKind::BodyOpen,
            range: at..at + 1,
            level,
        }));
        self.jump(at + 1);
    }

    /// The level of the next delimiter.
    fn level(&self) -> usize {
        self.parts
            .iter()
            .rev()
            .find_map(|part| match part {
                Part::Delim(delim) => Some(delim.level + 1),
                Part::Node(_) => None,
            })
            .unwrap_or(0)
    }

    /// Push an opening emphasis, strikethrough or link delimiter.
    ///
    /// Past the nesting limit the delimiter stays text and an overflow is
    /// recorded. Returns whether it was pushed as a delimiter.
    fn push_delim(&mut self, kind: DelimKind, range: Range<usize>) -> bool {
        let level = self.level();
        if level >= 2 * MAX_DEPTH {
            self.overflow.get_or_insert(range.start);
            self.push_leaf(MarkupKind::Text, range);
            return false;
        }
        self.jump(range.end);
        self.parts.push(Part::Delim(Delim { kind, range, level }));
        true
    }

    /// Wrap the innermost open command and its finished content blocks.
    fn finish_command(&mut self) {
        let Some(at) = self.last_delim(|kind| matches!(kind, DelimKind::Command { .. })) else {
            return;
        };
        let blocks = self.drain_nodes(at + 1);
        if let Some(Part::Delim(Delim { kind: DelimKind::Command { kind, head }, .. })) =
            self.parts.pop()
        {
            let mut children = head;
            children.extend(blocks);
            self.parts.push(Part::Node(SyntaxNode::inner(kind, children)));
        }
        self.ctx = self.ctx.reduce(Reduce::Command);
    }

    /// Turn the command owning the unclosed content block at `open` back into
    /// literal text.
    fn degrade_command(&mut self, open: usize) {
        let Some(at) = self.parts[..open].iter().rposition(|part| {
            matches!(part, Part::Delim(Delim { kind: DelimKind::Command { .. }, .. }))
        }) else {
            return;
        };
        tracing::debug!(at = self.parts_start(at), "degrading unclosed command to text");

        let mut replaced = vec![];
        for (i, part) in self.parts.drain(at..).enumerate() {
            match part {
                Part::Delim(delim) if i == 0 || i == open - at => {
                    let text = &self.text[delim.range.clone()];
                    replaced.push(Part::Node(SyntaxNode::leaf(
                        MarkupKind::Text,
                        text,
                        delim.range.start,
                    )));
                }
                Part::Node(node) if node.is(MarkupKind::ContentBlock) && i < open - at => {
                    replaced.extend(flatten_block(&node).into_iter().map(Part::Node));
                }
                part => replaced.push(part),
            }
        }
        self.parts.extend(replaced);
        self.ctx = self.ctx.reduce(Reduce::Command);
    }

    fn parts_start(&self, at: usize) -> usize {
        match &self.parts[at] {
            Part::Node(node) => node.start(),
            Part::Delim(delim) => delim.range.start,
        }
    }

    /// Remove the parts from `from` onward as nodes, degrading delimiters to
    /// text and merging adjacent text.
    fn drain_nodes(&mut self, from: usize) -> Vec<SyntaxNode> {
        let mut nodes: Vec<SyntaxNode> = vec![];
        for part in self.parts.drain(from..) {
            let node = match part {
                Part::Node(node) => node,
                Part::Delim(delim) => SyntaxNode::leaf(
                    MarkupKind::Text,
                    &self.text[delim.range.clone()],
                    delim.range.start,
                ),
            };
            match nodes.last_mut() {
                Some(last)
                    if last.is(MarkupKind::Text)
                        && node.is(MarkupKind::Text)
                        && last.end() == node.start() =>
                {
                    let start = last.start();
                    *last = SyntaxNode::leaf(
                        MarkupKind::Text,
                        &self.text[start..node.end()],
                        start,
                    );
                }
                _ => nodes.push(node),
            }
        }
        nodes
    }

    /// Pop the topmost part, which must be a delimiter, as a leaf.
    fn pop_delim_leaf(&mut self, kind: MarkupKind) -> SyntaxNode {
        match self.parts.pop() {
            Some(Part::Delim(delim)) => self.leaf(kind, delim.range),
            Some(Part::Node(node)) => node,
            None => SyntaxNode::leaf(kind, "", self.pos),
        }
    }

    /// Parse a sub-range as its own inline region.
    fn nested(&mut self, range: Range<usize>, mode: InlineMode) -> Vec<SyntaxNode> {
        if self.depth >= MAX_DEPTH {
            self.overflow.get_or_insert(range.start);
            return vec![self.leaf(MarkupKind::Text, range)];
        }
        let output = inline(self.text, vec![range], mode, self.depth + 1);
        if let Some(at) = output.overflow {
            self.overflow.get_or_insert(at);
        }
        output.nodes
    }
}

/// Scanning helpers.
impl InlineParser<'_> {
    fn seg_end(&self) -> usize {
        self.segments[self.seg].end
    }

    fn region_end(&self) -> usize {
        self.segments.last().map_or(self.pos, |seg| seg.end)
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..self.seg_end()].chars().next()
    }

    fn scout(&self, n: usize) -> Option<char> {
        self.text[self.pos..self.seg_end()].chars().nth(n)
    }

    fn at(&self, pat: &str) -> bool {
        self.text[self.pos..self.seg_end()].starts_with(pat)
    }

    /// The character before the current position within the segment.
    fn before(&self) -> Option<char> {
        self.text[self.segments[self.seg].start..self.pos].chars().next_back()
    }

    /// The length of the run of `c` at the current position.
    fn run_len(&self, c: char) -> usize {
        self.text[self.pos..self.seg_end()]
            .find(|x| x != c)
            .unwrap_or(self.seg_end() - self.pos)
    }

    /// Whether a delimiter run can open and close.
    fn flanking(&self, mark: char, range: Range<usize>) -> (bool, bool) {
        let prev = self.before();
        let next = self.text[range.end..self.seg_end()].chars().next();
        let mut can_open = next.is_some_and(|c| !c.is_whitespace());
        let mut can_close = prev.is_some_and(|c| !c.is_whitespace());
        if mark == '_' && lexer::is_wordy(prev) && lexer::is_wordy(next) {
            can_open = false;
            can_close = false;
        }
        (can_open, can_close)
    }

    fn jump(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Jump to a position in the current or a later segment. The lines in
    /// between belong to the node that was just pushed.
    fn jump_across(&mut self, pos: usize) {
        while pos > self.seg_end() && self.seg + 1 < self.segments.len() {
            self.seg += 1;
        }
        self.jump(pos);
    }

    fn leaf(&self, kind: MarkupKind, range: Range<usize>) -> SyntaxNode {
        SyntaxNode::leaf(kind, &self.text[range.clone()], range.start)
    }

    fn push_leaf(&mut self, kind: MarkupKind, range: Range<usize>) {
        let end = range.end;
        let node = self.leaf(kind, range);
        self.parts.push(Part::Node(node));
        self.jump(end);
    }
}

/// Replace the braces of a content block with text, keeping its content.
fn flatten_block(node: &SyntaxNode) -> Vec<SyntaxNode> {
    node.children()
        .map(|child| {
            if child.is(MarkupKind::LeftBrace) || child.is(MarkupKind::RightBrace) {
                SyntaxNode::leaf(MarkupKind::Text, child.text().clone(), child.start())
            } else {
                child.clone()
            }
        })
        .collect()
}

/// Build a verbatim body node from the opening `{|` at `open` and the closing
/// `|}` at `close`.
pub(crate) fn verbatim_node(text: &str, open: usize, close: usize) -> SyntaxNode {
    let mut children = vec![SyntaxNode::leaf(MarkupKind::VerbatimDelim, "{|", open)];
    if close > open + 2 {
        children.push(SyntaxNode::leaf(
            MarkupKind::VerbatimText,
            &text[open + 2..close],
            open + 2,
        ));
    }
    children.push(SyntaxNode::leaf(MarkupKind::VerbatimDelim, "|}", close));
    SyntaxNode::inner(MarkupKind::Verbatim, children)
}

/// The head of a command: sigil, name and attribute list.
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct Head {
    pub sigil: Range<usize>,
    pub name: Option<HeadName>,
    pub attrs: Option<Range<usize>>,
}

/// How a command is named.
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) enum HeadName {
    /// An identifier or positional index.
    Plain(Range<usize>),
    /// A parenthesized expression, including the parens.
    Dynamic(Range<usize>),
}

impl HeadName {
    fn range(&self) -> Range<usize> {
        match self {
            Self::Plain(range) | Self::Dynamic(range) => range.clone(),
        }
    }
}

impl Head {
    /// Where the head ends.
    pub fn end(&self) -> usize {
        self.attrs
            .as_ref()
            .map(|attrs| attrs.end)
            .or_else(|| self.name.as_ref().map(|name| name.range().end))
            .unwrap_or(self.sigil.end)
    }

    /// The nodes making up the head.
    pub fn nodes(&self, text: &str) -> Vec<SyntaxNode> {
        let leaf = |kind, range: Range<usize>| {
            SyntaxNode::leaf(kind, &text[range.clone()], range.start)
        };

        let mut nodes = vec![leaf(MarkupKind::Sigil, self.sigil.clone())];
        match &self.name {
            Some(HeadName::Plain(range)) => nodes.push(leaf(MarkupKind::CommandName, range.clone())),
            Some(HeadName::Dynamic(range)) => nodes.push(delimited(
                text,
                MarkupKind::DynamicName,
                (MarkupKind::LeftParen, MarkupKind::RightParen),
                MarkupKind::NameExpr,
                range.clone(),
            )),
            None => {}
        }
        if let Some(range) = &self.attrs {
            nodes.push(delimited(
                text,
                MarkupKind::AttributeList,
                (MarkupKind::LeftBracket, MarkupKind::RightBracket),
                MarkupKind::InlineAttributes,
                range.clone(),
            ));
        }
        nodes
    }
}

/// Build a node of `kind` from a one-byte opening delimiter, an optional
/// inner leaf and a one-byte closing delimiter.
fn delimited(
    text: &str,
    kind: MarkupKind,
    (left, right): (MarkupKind, MarkupKind),
    inner: MarkupKind,
    range: Range<usize>,
) -> SyntaxNode {
    let open = range.start;
    let close = range.end - 1;
    let mut children = vec![SyntaxNode::leaf(left, &text[open..open + 1], open)];
    if close > open + 1 {
        children.push(SyntaxNode::leaf(inner, &text[open + 1..close], open + 1));
    }
    children.push(SyntaxNode::leaf(right, &text[close..range.end], close));
    SyntaxNode::inner(kind, children)
}

/// Scan the head of a command starting with a sigil of `sigil_len` bytes at
/// `start`, staying before `limit`.
///
/// The name is an identifier, a single-digit positional index or a
/// parenthesized expression. A head without a name is only returned if a body or an
/// attribute list follows the sigil.
pub(crate) fn command_head(
    text: &str,
    start: usize,
    sigil_len: usize,
    limit: usize,
) -> Option<Head> {
    let sigil = start..start + sigil_len;
    let mut pos = sigil.end;
    let rest = &text[pos..limit];

    let name = if let Some(len) = lexer::ident_len(rest) {
        Some(HeadName::Plain(pos..pos + len))
    } else if rest.starts_with(|c: char| c.is_ascii_digit()) {
        Some(HeadName::Plain(pos..pos + 1))
    } else if rest.starts_with('(') {
        let group = lexer::balanced_group(text, pos + 1, Bracket::Paren, limit);
        if !group.closed {
            return None;
        }
        Some(HeadName::Dynamic(pos..group.end + 1))
    } else if rest.starts_with(['{', '[']) {
        None
    } else {
        return None;
    };

    if let Some(name) = &name {
        pos = name.range().end;
    }

    let mut attrs = None;
    if text[pos..limit].starts_with('[') {
        let group = lexer::balanced_group(text, pos + 1, Bracket::Square, limit);
        if group.closed {
            attrs = Some(pos..group.end + 1);
        }
    }

    if name.is_none() && attrs.is_none() && !text[pos..limit].starts_with('{') {
        return None;
    }

    Some(Head { sigil, name, attrs })
}
