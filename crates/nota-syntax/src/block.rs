use std::ops::Range;

use crate::inline::{self, Head, InlineMode};
use crate::lexer::{self, is_space};
use crate::{MAX_DEPTH, MarkupKind, SyntaxNode};

/// The indentation of a composite body relative to its header.
const INDENT: usize = 2;

/// The result of parsing a block region.
pub(crate) struct BlockOutput {
    /// The document node spanning the region.
    pub node: SyntaxNode,
    /// The offset at which the nesting limit was exceeded, if it was.
    pub overflow: Option<usize>,
}

/// Parse the lines in `range` as a document.
pub(crate) fn document(text: &str, range: Range<usize>, depth: usize) -> BlockOutput {
    let view = split_lines(text, range.clone());
    let mut p = BlockParser { text, overflow: None };
    let nodes = p.blocks(&view, depth);
    let children = p.fill(range.clone(), nodes);
    let node = if children.is_empty() {
        SyntaxNode::empty(MarkupKind::Document, range.start)
    } else {
        SyntaxNode::inner(MarkupKind::Document, children)
    };
    BlockOutput { node, overflow: p.overflow }
}

/// The lines of a region, without their terminators.
pub(crate) fn split_lines(text: &str, range: Range<usize>) -> Vec<Range<usize>> {
    let mut lines = vec![];
    let mut start = range.start;
    let mut chars = text[range.clone()].char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if lexer::is_newline(c) {
            lines.push(start..range.start + i);
            let mut next = range.start + i + c.len_utf8();
            if c == '\r' && chars.next_if(|&(_, c)| c == '\n').is_some() {
                next += 1;
            }
            start = next;
        }
    }
    lines.push(start..range.end);
    lines
}

/// Parses blocks over views of lines.
///
/// A view holds the content range of each line belonging to a container,
/// with the container's indentation and markers already stripped. Text
/// between two lines of a view becomes gap leaves of the enclosing node.
struct BlockParser<'s> {
    text: &'s str,
    overflow: Option<usize>,
}

/// How a block component header continues after its head.
enum Form {
    /// `{|...|}` with the closing delimiter at the given position.
    Verbatim(usize),
    /// `{...}` with the closing brace at the given position.
    Braced(usize),
    /// `:` followed by optional inline content and an indented body.
    Composite(usize),
    /// Nothing follows the head.
    Bare,
}

/// A list item marker.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct ListMarker {
    /// `-`, `*` or `+` for bullets, `.` or `)` for ordered items.
    delim: char,
    ordered: bool,
    len: usize,
}

impl ListMarker {
    fn same_list(self, other: Self) -> bool {
        self.delim == other.delim && self.ordered == other.ordered
    }

    fn kind(self) -> MarkupKind {
        if self.ordered { MarkupKind::OrderedList } else { MarkupKind::BulletList }
    }
}

impl<'s> BlockParser<'s> {
    /// Parse all blocks in a view.
    fn blocks(&mut self, view: &[Range<usize>], depth: usize) -> Vec<SyntaxNode> {
        if depth > MAX_DEPTH {
            self.overflow.get_or_insert(view.first().map_or(0, |line| line.start));
            let range = view.first().map_or(0, |l| l.start)..view.last().map_or(0, |l| l.end);
            return if range.is_empty() {
                vec![]
            } else {
                vec![self.leaf(MarkupKind::Text, range)]
            };
        }

        let mut nodes = vec![];
        let mut i = 0;
        while i < view.len() {
            if self.is_blank(&view[i]) {
                i += 1;
                continue;
            }
            let (node, next) = self.block(view, i, depth);
            nodes.push(node);
            i = next.max(i + 1);
        }
        nodes
    }

    /// Parse the block starting at line `i`, returning it and the index of
    /// the line after it.
    fn block(&mut self, view: &[Range<usize>], i: usize, depth: usize) -> (SyntaxNode, usize) {
        self.comment(view, i)
            .or_else(|| self.script(view, i))
            .or_else(|| self.attribute(view, i))
            .or_else(|| self.component(view, i, depth))
            .or_else(|| self.math(view, i, depth))
            .or_else(|| self.fenced_code(view, i))
            .or_else(|| self.heading(view, i, depth))
            .or_else(|| self.blockquote(view, i, depth))
            .or_else(|| self.list(view, i, depth))
            .or_else(|| self.table(view, i, depth))
            .unwrap_or_else(|| self.paragraph(view, i, depth))
    }

    /// Whether a rule other than paragraph and table would claim the line.
    fn starts_block(&self, line: &Range<usize>) -> bool {
        let t = self.trimmed(line);
        let start = self.content_start(line);
        t.starts_with("//")
            || t.starts_with('%')
            || attribute_key(t).is_some()
            || (t.starts_with('@') && self.component_header(start, line.end).is_some())
            || t.trim_end() == "$$"
            || fence(t).is_some()
            || heading_level(t).is_some()
            || t.starts_with('>')
            || list_marker(t).is_some()
    }

    fn comment(&mut self, view: &[Range<usize>], i: usize) -> Option<(SyntaxNode, usize)> {
        if !self.trimmed(&view[i]).starts_with("//") {
            return None;
        }

        let mut comments = vec![];
        let mut j = i;
        while j < view.len() && self.trimmed(&view[j]).starts_with("//") {
            let start = self.content_start(&view[j]);
            comments.push(self.leaf(MarkupKind::LineComment, start..view[j].end));
            j += 1;
        }

        let range = comments[0].start()..view[j - 1].end;
        let children = self.fill(range, comments);
        Some((SyntaxNode::inner(MarkupKind::CommentBlock, children), j))
    }

    fn script(&mut self, view: &[Range<usize>], i: usize) -> Option<(SyntaxNode, usize)> {
        let line = &view[i];
        let t = self.trimmed(line);
        if !t.starts_with('%') {
            return None;
        }

        let start = self.content_start(line);
        let mut children = vec![];
        let mut j = i + 1;
        if t.starts_with("%%%") {
            children.push(self.leaf(MarkupKind::ScriptFence, start..line.end));
            while j < view.len() && self.trimmed(&view[j]).trim_end() != "%%%" {
                j += 1;
            }
            if j > i + 1 {
                let body = view[i + 1].start..view[j - 1].end;
                children.push(self.leaf(MarkupKind::ScriptBody, body));
            }
            if let Some(close) = view.get(j) {
                let fence = self.content_start(close)..close.end;
                children.push(self.leaf(MarkupKind::ScriptFence, fence));
                j += 1;
            }
        } else {
            children.push(SyntaxNode::leaf(MarkupKind::ScriptMark, "%", start));
            if line.end > start + 1 {
                children.push(self.leaf(MarkupKind::ScriptBody, start + 1..line.end));
            }
        }

        let range = start..children.last().map_or(line.end, SyntaxNode::end);
        Some((SyntaxNode::inner(MarkupKind::Script, self.fill(range, children)), j))
    }

    fn attribute(&mut self, view: &[Range<usize>], i: usize) -> Option<(SyntaxNode, usize)> {
        let line = &view[i];
        let t = self.trimmed(line);
        let key_len = attribute_key(t)?;

        let start = self.content_start(line);
        let key = start + 2..start + 2 + key_len;
        let colon = key.end;
        let mut children = vec![
            SyntaxNode::leaf(MarkupKind::AttributeMark, "|", start),
            self.leaf(MarkupKind::AttributeKey, key),
            SyntaxNode::leaf(MarkupKind::Colon, ":", colon),
        ];

        let mut j = i + 1;
        if self.text[colon + 1..line.end].trim().is_empty() {
            // The value spans the following lines that are indented further.
            let threshold = self.indent(line) + INDENT;
            let mut last = None;
            while j < view.len() {
                if self.is_blank(&view[j]) {
                    j += 1;
                } else if self.indent(&view[j]) >= threshold {
                    last = Some(j);
                    j += 1;
                } else {
                    break;
                }
            }
            if let Some(last) = last {
                let first = i + 1 + (i + 1..last).take_while(|&k| self.is_blank(&view[k])).count();
                let from = view[first].start + threshold;
                children.push(self.leaf(MarkupKind::AttributeValue, from..view[last].end));
                j = last + 1;
            } else {
                j = i + 1;
            }
        } else {
            let from = colon + 1 + self.text[colon + 1..line.end].len()
                - self.text[colon + 1..line.end].trim_start().len();
            children.push(self.leaf(MarkupKind::AttributeValue, from..line.end));
        }

        let range = start..children.last().map_or(line.end, SyntaxNode::end);
        Some((SyntaxNode::inner(MarkupKind::Attribute, self.fill(range, children)), j))
    }

    fn component(
        &mut self,
        view: &[Range<usize>],
        i: usize,
        depth: usize,
    ) -> Option<(SyntaxNode, usize)> {
        let line = &view[i];
        if !self.trimmed(line).starts_with('@') {
            return None;
        }

        let start = self.content_start(line);
        let (head, form) = self.component_header(start, line.end)?;
        let mut children = head.nodes(self.text);
        let mut next = i + 1;

        match form {
            Form::Verbatim(close) => {
                next = self.line_containing(view, i, close + 2)? + 1;
                children.push(inline::verbatim_node(self.text, head.end(), close));
            }
            Form::Braced(close) => {
                next = self.line_containing(view, i, close + 1)? + 1;
                let open = head.end();
                children.push(SyntaxNode::leaf(MarkupKind::LeftBrace, "{", open));
                if close > open + 1 {
                    children.push(self.leaf(MarkupKind::MarkupHole, open + 1..close));
                }
                children.push(SyntaxNode::leaf(MarkupKind::RightBrace, "}", close));
            }
            Form::Composite(colon) => {
                children.push(SyntaxNode::leaf(MarkupKind::Colon, ":", colon));
                let rest = &self.text[colon + 1..line.end];
                let content = colon + 1 + rest.len() - rest.trim_start().len();
                let end = colon + 1 + rest.trim_end().len();
                if content < end {
                    let nodes = self.inline(vec![content..end], InlineMode::Markup, depth + 1);
                    children.push(SyntaxNode::inner(MarkupKind::LineContent, nodes));
                }

                let (body, after) = self.body(view, i, depth);
                if let Some(body) = body {
                    children.push(body);
                }
                next = after;
            }
            Form::Bare => {}
        }

        let range = start..children.last().map_or(line.end, SyntaxNode::end);
        let children = self.fill(range, children);
        Some((SyntaxNode::inner(MarkupKind::BlockComponent, children), next))
    }

    /// Analyze a block component header at `start`, staying before `end`.
    fn component_header(&self, start: usize, end: usize) -> Option<(Head, Form)> {
        let head = inline::command_head(self.text, start, 1, end)?;
        let after = head.end();
        let rest = &self.text[after..end];

        let form = if rest.starts_with("{|") {
            let body = lexer::verbatim(self.text, after + 2);
            if !body.closed || !self.rest_of_line_blank(body.end + 2) {
                return None;
            }
            Form::Verbatim(body.end)
        } else if rest.starts_with('{') {
            let body = lexer::balanced_body(self.text, after + 1);
            if !body.closed || !self.rest_of_line_blank(body.end + 1) {
                return None;
            }
            Form::Braced(body.end)
        } else if head.name.is_none() {
            return None;
        } else if let Some(tail) = rest.strip_prefix(':') {
            if !tail.is_empty() && !tail.starts_with(is_space) {
                return None;
            }
            Form::Composite(after)
        } else if rest.trim().is_empty() {
            Form::Bare
        } else {
            return None;
        };

        Some((head, form))
    }

    /// Collect the indented body of a composite block whose header is line
    /// `i`.
    fn body(
        &mut self,
        view: &[Range<usize>],
        i: usize,
        depth: usize,
    ) -> (Option<SyntaxNode>, usize) {
        let threshold = self.indent(&view[i]) + INDENT;
        let mut j = i + 1;
        let mut last = None;
        while j < view.len() {
            if self.is_blank(&view[j]) {
                j += 1;
                continue;
            }
            if self.indent(&view[j]) < threshold {
                break;
            }
            last = Some(j);
            j += 1;
        }

        let Some(last) = last else { return (None, i + 1) };
        let lines: Vec<_> = view[i + 1..=last]
            .iter()
            .map(|line| self.strip(line, threshold))
            .collect();
        let nodes = self.blocks(&lines, depth + 1);
        if nodes.is_empty() {
            return (None, last + 1);
        }
        let range = nodes[0].start()..lines[lines.len() - 1].end;
        let children = self.fill(range, nodes);
        (Some(SyntaxNode::inner(MarkupKind::BlockBody, children)), last + 1)
    }

    fn math(&mut self, view: &[Range<usize>], i: usize, depth: usize) -> Option<(SyntaxNode, usize)> {
        let line = &view[i];
        if self.trimmed(line).trim_end() != "$$" {
            return None;
        }

        let start = self.content_start(line);
        let mut children = vec![SyntaxNode::leaf(MarkupKind::MathDelim, "$$", start)];
        let mut j = i + 1;
        while j < view.len() && self.trimmed(&view[j]).trim_end() != "$$" {
            j += 1;
        }
        if j > i + 1 {
            let segments = view[i + 1..j].to_vec();
            let nodes = self.inline(segments, InlineMode::Template, depth + 1);
            if !nodes.is_empty() {
                children.push(SyntaxNode::inner(MarkupKind::MathContent, nodes));
            }
        }
        if let Some(close) = view.get(j) {
            children.push(SyntaxNode::leaf(MarkupKind::MathDelim, "$$", self.content_start(close)));
            j += 1;
        }

        let range = start..children.last().map_or(line.end, SyntaxNode::end);
        Some((SyntaxNode::inner(MarkupKind::MathBlock, self.fill(range, children)), j))
    }

    fn fenced_code(&mut self, view: &[Range<usize>], i: usize) -> Option<(SyntaxNode, usize)> {
        let line = &view[i];
        let (mark, len) = fence(self.trimmed(line))?;

        let start = self.content_start(line);
        let mut children = vec![self.leaf(MarkupKind::CodeFence, start..start + len)];
        let info = &self.text[start + len..line.end];
        if !info.trim().is_empty() {
            let from = start + len + info.len() - info.trim_start().len();
            children.push(self.leaf(MarkupKind::CodeInfo, from..start + len + info.trim_end().len()));
        }

        let closes = |t: &str| {
            let t = t.trim_end();
            t.len() >= len && t.chars().all(|c| c == mark)
        };
        let mut j = i + 1;
        while j < view.len() && !closes(self.trimmed(&view[j])) {
            j += 1;
        }
        if j > i + 1 {
            children.push(self.leaf(MarkupKind::CodeText, view[i + 1].start..view[j - 1].end));
        }
        if let Some(close) = view.get(j) {
            let from = self.content_start(close);
            let to = from + self.trimmed(close).trim_end().len();
            children.push(self.leaf(MarkupKind::CodeFence, from..to));
            j += 1;
        }

        let range = start..children.last().map_or(line.end, SyntaxNode::end);
        Some((SyntaxNode::inner(MarkupKind::FencedCode, self.fill(range, children)), j))
    }

    fn heading(&mut self, view: &[Range<usize>], i: usize, depth: usize) -> Option<(SyntaxNode, usize)> {
        let line = &view[i];
        let level = heading_level(self.trimmed(line))?;

        let start = self.content_start(line);
        let mut children = vec![self.leaf(MarkupKind::HeadingMarker, start..start + level)];
        let rest = &self.text[start + level..line.end];
        let content = start + level + rest.len() - rest.trim_start().len();
        let end = start + level + rest.trim_end().len();
        if content < end {
            children.extend(self.inline(vec![content..end], InlineMode::Markup, depth + 1));
        }

        let children = self.fill(start..line.end, children);
        Some((SyntaxNode::inner(MarkupKind::Heading, children), i + 1))
    }

    fn blockquote(
        &mut self,
        view: &[Range<usize>],
        i: usize,
        depth: usize,
    ) -> Option<(SyntaxNode, usize)> {
        if !self.trimmed(&view[i]).starts_with('>') {
            return None;
        }

        let mut lines = vec![];
        let mut j = i;
        while j < view.len() && self.trimmed(&view[j]).starts_with('>') {
            let mut from = self.content_start(&view[j]) + 1;
            if self.text[from..view[j].end].starts_with(is_space) {
                from += 1;
            }
            lines.push(from..view[j].end);
            j += 1;
        }

        let start = self.content_start(&view[i]);
        let nodes = self.blocks(&lines, depth + 1);
        let children = self.fill(start..view[j - 1].end, nodes);
        Some((SyntaxNode::inner(MarkupKind::Blockquote, children), j))
    }

    fn list(&mut self, view: &[Range<usize>], i: usize, depth: usize) -> Option<(SyntaxNode, usize)> {
        let first = list_marker(self.trimmed(&view[i]))?;
        let indent = self.indent(&view[i]);

        let mut items = vec![];
        let mut j = i;
        loop {
            let (item, next) = self.list_item(view, j, depth);
            items.push(item);
            j = next;

            let mut k = j;
            while k < view.len() && self.is_blank(&view[k]) {
                k += 1;
            }
            match view.get(k) {
                Some(line)
                    if self.indent(line) == indent
                        && list_marker(self.trimmed(line)).is_some_and(|m| m.same_list(first)) =>
                {
                    j = k;
                }
                _ => break,
            }
        }

        let range = items[0].start()..items[items.len() - 1].end();
        let children = self.fill(range, items);
        Some((SyntaxNode::inner(first.kind(), children), j))
    }

    fn list_item(&mut self, view: &[Range<usize>], i: usize, depth: usize) -> (SyntaxNode, usize) {
        let line = &view[i];
        let start = self.content_start(line);
        let t = self.trimmed(line);
        let marker = list_marker(t).unwrap_or(ListMarker { delim: '-', ordered: false, len: 1 });

        let after = start + marker.len;
        let spaces = self.text[after..line.end].chars().take_while(|&c| is_space(c)).count();
        let spaces = if spaces > 4 || after + spaces == line.end { spaces.min(1) } else { spaces };
        let column = self.indent(line) + marker.len + spaces.max(1);

        let mut children = vec![self.leaf(MarkupKind::ListMarker, start..after)];
        let mut content = (after + spaces).min(line.end);
        let rest = &self.text[content..line.end];
        if ["[ ]", "[x]", "[X]"].iter().any(|task| rest.starts_with(task))
            && rest[3..].chars().next().is_none_or(is_space)
        {
            children.push(self.leaf(MarkupKind::TaskMarker, content..content + 3));
            content = (content + 4).min(line.end);
        }

        let mut lines = vec![content..line.end];
        let mut j = i + 1;
        let mut last = i;
        while j < view.len() {
            let next = &view[j];
            if self.is_blank(next) {
                j += 1;
                continue;
            }
            if self.indent(next) >= column {
                lines.extend(view[last + 1..j].iter().map(|l| self.strip(l, column)));
                lines.push(self.strip(next, column));
            } else if last + 1 == j && !self.starts_block(next) {
                lines.push(self.content_start(next)..next.end);
            } else {
                break;
            }
            last = j;
            j += 1;
        }

        children.extend(self.blocks(&lines, depth + 1));
        let end = children.last().map_or(line.end, SyntaxNode::end).max(lines[lines.len() - 1].end);
        let children = self.fill(start..end, children);
        (SyntaxNode::inner(MarkupKind::ListItem, children), last + 1)
    }

    fn table(&mut self, view: &[Range<usize>], i: usize, depth: usize) -> Option<(SyntaxNode, usize)> {
        let header = &view[i];
        let delimiter = view.get(i + 1)?;
        if !self.trimmed(header).contains('|') {
            return None;
        }
        let cells = self.cells(header);
        let count = delimiter_row(self.trimmed(delimiter))?;
        if cells.len() != count {
            return None;
        }

        let mut rows = vec![self.row(MarkupKind::TableHeader, header, depth)];
        let from = self.content_start(delimiter);
        let to = from + self.trimmed(delimiter).trim_end().len();
        rows.push(self.leaf(MarkupKind::TableDelimiter, from..to));

        let mut j = i + 2;
        while j < view.len() {
            let line = &view[j];
            if self.is_blank(line) || !self.trimmed(line).contains('|') || self.starts_block(line) {
                break;
            }
            rows.push(self.row(MarkupKind::TableRow, line, depth));
            j += 1;
        }

        let start = self.content_start(header);
        let children = self.fill(start..view[j - 1].end, rows);
        Some((SyntaxNode::inner(MarkupKind::Table, children), j))
    }

    /// Build a table row from a line.
    fn row(&mut self, kind: MarkupKind, line: &Range<usize>, depth: usize) -> SyntaxNode {
        let mut children = vec![];
        for (i, c) in self.text[line.clone()].char_indices() {
            let at = line.start + i;
            if c == '|' && !self.text[..at].ends_with('\\') {
                children.push(SyntaxNode::leaf(MarkupKind::TablePipe, "|", at));
            }
        }

        let mut cells = vec![];
        for cell in self.cells(line) {
            let text = &self.text[cell.clone()];
            let from = cell.start + text.len() - text.trim_start().len();
            let to = cell.start + text.trim_end().len();
            if from < to {
                let nodes = self.inline(vec![from..to], InlineMode::Markup, depth + 1);
                cells.push(SyntaxNode::inner(MarkupKind::TableCell, nodes));
            } else {
                cells.push(SyntaxNode::empty(MarkupKind::TableCell, from.min(cell.end)));
            }
        }

        children.extend(cells);
        children.sort_by_key(|node| (node.start(), node.end()));
        let start = self.content_start(line);
        SyntaxNode::inner(kind, self.fill(start..line.end, children))
    }

    /// The ranges of a row's cells, between the pipes.
    fn cells(&self, line: &Range<usize>) -> Vec<Range<usize>> {
        let start = self.content_start(line);
        let end = start + self.trimmed(line).trim_end().len();
        let mut pipes = vec![];
        for (i, c) in self.text[start..end].char_indices() {
            let at = start + i;
            if c == '|' && !self.text[..at].ends_with('\\') {
                pipes.push(at);
            }
        }

        let mut cells = vec![];
        let mut from = start;
        for &pipe in &pipes {
            cells.push(from..pipe);
            from = pipe + 1;
        }
        cells.push(from..end);

        if pipes.first() == Some(&start) {
            cells.remove(0);
        }
        if pipes.last().is_some_and(|&pipe| pipe + 1 == end) {
            cells.pop();
        }
        cells
    }

    fn paragraph(&mut self, view: &[Range<usize>], i: usize, depth: usize) -> (SyntaxNode, usize) {
        let mut segments = vec![self.content_start(&view[i])..view[i].end];
        let mut j = i + 1;
        while j < view.len() && !self.is_blank(&view[j]) && !self.starts_block(&view[j]) {
            segments.push(self.content_start(&view[j])..view[j].end);
            j += 1;
        }

        let nodes = self.inline(segments, InlineMode::Markup, depth + 1);
        (SyntaxNode::inner(MarkupKind::Paragraph, nodes), j)
    }
}

/// Helpers.
impl<'s> BlockParser<'s> {
    /// Parse inline content, recording an overflow.
    fn inline(
        &mut self,
        segments: Vec<Range<usize>>,
        mode: InlineMode,
        depth: usize,
    ) -> Vec<SyntaxNode> {
        let output = inline::inline(self.text, segments, mode, depth);
        if let Some(at) = output.overflow {
            self.overflow.get_or_insert(at);
        }
        output.nodes
    }

    /// Insert gap leaves between the nodes so that they cover `range`.
    fn fill(&self, range: Range<usize>, nodes: Vec<SyntaxNode>) -> Vec<SyntaxNode> {
        let mut out = Vec::with_capacity(nodes.len());
        let mut cursor = range.start;
        for node in nodes {
            if node.start() > cursor {
                self.gap(cursor..node.start(), &mut out);
            }
            cursor = cursor.max(node.end());
            out.push(node);
        }
        if range.end > cursor {
            self.gap(cursor..range.end, &mut out);
        }
        out
    }

    /// Push leaves for text between blocks: whitespace and quote markers.
    fn gap(&self, range: Range<usize>, out: &mut Vec<SyntaxNode>) {
        let mut start = range.start;
        for (i, c) in self.text[range.clone()].char_indices() {
            if c == '>' {
                let at = range.start + i;
                if at > start {
                    out.push(self.leaf(MarkupKind::Space, start..at));
                }
                out.push(SyntaxNode::leaf(MarkupKind::QuoteMarker, ">", at));
                start = at + 1;
            }
        }
        if range.end > start {
            out.push(self.leaf(MarkupKind::Space, start..range.end));
        }
    }

    /// The index of the line at or after `i` on which `pos` lies, if the rest
    /// of the view contains it.
    fn line_containing(&self, view: &[Range<usize>], i: usize, pos: usize) -> Option<usize> {
        (i..view.len()).find(|&j| view[j].start <= pos && pos <= view[j].end)
    }

    fn rest_of_line_blank(&self, pos: usize) -> bool {
        let rest = &self.text[pos.min(self.text.len())..];
        let line = rest.find(lexer::is_newline).map_or(rest, |end| &rest[..end]);
        line.trim().is_empty()
    }

    fn leaf(&self, kind: MarkupKind, range: Range<usize>) -> SyntaxNode {
        SyntaxNode::leaf(kind, &self.text[range.clone()], range.start)
    }

    fn is_blank(&self, line: &Range<usize>) -> bool {
        self.text[line.clone()].trim().is_empty()
    }

    /// The number of leading whitespace columns.
    fn indent(&self, line: &Range<usize>) -> usize {
        self.text[line.clone()].chars().take_while(|&c| is_space(c)).count()
    }

    fn content_start(&self, line: &Range<usize>) -> usize {
        line.start + self.indent(line)
    }

    /// The line without its indentation.
    fn trimmed(&self, line: &Range<usize>) -> &'s str {
        let text = self.text;
        &text[self.content_start(line)..line.end]
    }

    /// The line with up to `columns` columns of indentation removed.
    fn strip(&self, line: &Range<usize>, columns: usize) -> Range<usize> {
        line.start + self.indent(line).min(columns)..line.end
    }
}

/// The byte length of the key of an attribute line `| key:`.
fn attribute_key(t: &str) -> Option<usize> {
    let rest = t.strip_prefix("| ")?;
    let len = lexer::ident_len(rest)?;
    let after = rest[len..].strip_prefix(':')?;
    (after.is_empty() || after.starts_with(is_space)).then_some(len)
}

/// The marker character and length of a code fence.
fn fence(t: &str) -> Option<(char, usize)> {
    let mark = t.chars().next().filter(|&c| c == '`' || c == '~')?;
    let len = t.chars().take_while(|&c| c == mark).count();
    (len >= 3 && !(mark == '`' && t[len..].contains('`'))).then_some((mark, len))
}

/// The level of an ATX heading.
fn heading_level(t: &str) -> Option<usize> {
    let level = t.chars().take_while(|&c| c == '#').count();
    let rest = &t[level..];
    ((1..=6).contains(&level) && (rest.is_empty() || rest.starts_with(is_space))).then_some(level)
}

/// The list marker at the start of the line.
fn list_marker(t: &str) -> Option<ListMarker> {
    let followed = |len: usize| t[len..].is_empty() || t[len..].starts_with(is_space);
    let first = t.chars().next()?;
    if matches!(first, '-' | '*' | '+') {
        return followed(1).then_some(ListMarker { delim: first, ordered: false, len: 1 });
    }

    let digits = t.chars().take_while(char::is_ascii_digit).count();
    if !(1..=9).contains(&digits) {
        return None;
    }
    let delim = t[digits..].chars().next().filter(|&c| c == '.' || c == ')')?;
    followed(digits + 1).then_some(ListMarker { delim, ordered: true, len: digits + 1 })
}

/// The number of cells in a table delimiter row like `| :-- | --: |`.
fn delimiter_row(t: &str) -> Option<usize> {
    let t = t.trim_end();
    let t = t.strip_prefix('|').unwrap_or(t);
    let t = t.strip_suffix('|').unwrap_or(t);
    let mut count = 0;
    for cell in t.split('|') {
        let cell = cell.trim();
        let inner = cell.strip_prefix(':').unwrap_or(cell);
        let inner = inner.strip_suffix(':').unwrap_or(inner);
        if inner.is_empty() || !inner.chars().all(|c| c == '-') {
            return None;
        }
        count += 1;
    }
    Some(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> SyntaxNode {
        document(text, 0..text.len(), 0).node
    }

    fn kinds(text: &str) -> Vec<MarkupKind> {
        parse(text)
            .children()
            .filter(|node| !node.is(MarkupKind::Space))
            .map(|node| node.kind().markup().unwrap())
            .collect()
    }

    #[test]
    fn test_blocks_are_lossless() {
        let text = "# Title\n\n> quoted\n> text\n\n- a\n- [x] b\n\n| k: v\n%x = 1\n";
        assert_eq!(parse(text).to_text(), text);
    }

    #[test]
    fn test_block_kinds() {
        assert_eq!(
            kinds("# Title\n\nSome text\nmore text\n\n1. one\n2. two\n"),
            vec![MarkupKind::Heading, MarkupKind::Paragraph, MarkupKind::OrderedList],
        );
        assert_eq!(
            kinds("// a\n// b\n%%%\nlet x = 1;\n%%%\n$$\nx^2\n$$\n"),
            vec![MarkupKind::CommentBlock, MarkupKind::Script, MarkupKind::MathBlock],
        );
    }

    #[test]
    fn test_script_lines() {
        let doc = parse("%let x = 1\n%%%\na\nb\n%%%");
        let scripts: Vec<_> = doc.children().filter(|n| n.is(MarkupKind::Script)).collect();
        assert_eq!(scripts.len(), 2);
        assert_eq!(scripts[0].find(MarkupKind::ScriptBody).unwrap().text(), "let x = 1");
        assert_eq!(scripts[1].find(MarkupKind::ScriptBody).unwrap().text(), "a\nb");
    }

    #[test]
    fn test_attribute_single_line() {
        let doc = parse("| count: 1 + 2\n");
        let attr = doc.find(MarkupKind::Attribute).unwrap();
        assert_eq!(attr.find(MarkupKind::AttributeKey).unwrap().text(), "count");
        assert_eq!(attr.find(MarkupKind::AttributeValue).unwrap().text(), "1 + 2");
    }

    #[test]
    fn test_attribute_multi_line() {
        let doc = parse("| key:\n  line one\n  line two\nafter");
        let attrs: Vec<_> = doc.children().filter(|n| n.is(MarkupKind::Attribute)).collect();
        assert_eq!(attrs.len(), 1);
        let value = attrs[0].find(MarkupKind::AttributeValue).unwrap();
        assert_eq!(value.text(), "line one\n  line two");
        assert!(doc.find(MarkupKind::Paragraph).is_some());
    }

    #[test]
    fn test_component_with_body() {
        let text = "@Section[id: \"intro\"]: Intro\n  | level: 2\n\n  Body text\nOutside";
        let doc = parse(text);
        let component = doc.find(MarkupKind::BlockComponent).unwrap();
        assert!(component.find(MarkupKind::LineContent).is_some());
        let body = component.find(MarkupKind::BlockBody).unwrap();
        let inner: Vec<_> = body.children().filter(|n| !n.kind().is_trivia()).collect();
        assert_eq!(inner.len(), 2);
        assert!(inner[0].is(MarkupKind::Attribute));
        assert!(inner[1].is(MarkupKind::Paragraph));
        assert_eq!(doc.to_text(), text);
        assert_eq!(kinds(text), vec![MarkupKind::BlockComponent, MarkupKind::Paragraph]);
    }

    #[test]
    fn test_component_body_skips_blank_lines() {
        let text = "@Box:\n\n  indented\n\n\n  more\nafter";
        let doc = parse(text);
        let component = doc.find(MarkupKind::BlockComponent).unwrap();
        let body = component.find(MarkupKind::BlockBody).unwrap();
        let inner: Vec<_> = body.children().filter(|n| !n.kind().is_trivia()).collect();
        assert_eq!(inner.len(), 2);
        assert_eq!(inner[1].to_text(), "more");
        assert_eq!(kinds(text), vec![MarkupKind::BlockComponent, MarkupKind::Paragraph]);
        assert_eq!(doc.to_text(), text);

        assert_eq!(kinds("@Box:\n\nafter"), vec![MarkupKind::BlockComponent, MarkupKind::Paragraph]);
    }

    #[test]
    fn test_component_brace_form() {
        let doc = parse("@h1{Hello world!}");
        let component = doc.find(MarkupKind::BlockComponent).unwrap();
        assert_eq!(component.find(MarkupKind::MarkupHole).unwrap().text(), "Hello world!");

        let doc = parse("@div{\n  a\n\n  b\n}\n");
        let hole = doc.find(MarkupKind::BlockComponent).unwrap().find(MarkupKind::MarkupHole);
        assert_eq!(hole.unwrap().text(), "\n  a\n\n  b\n");

        assert_eq!(kinds("@em{x} and more"), vec![MarkupKind::Paragraph]);
    }

    #[test]
    fn test_paragraph_interrupted_by_blocks() {
        assert_eq!(
            kinds("text\n# heading\nmore\n- item"),
            vec![
                MarkupKind::Paragraph,
                MarkupKind::Heading,
                MarkupKind::Paragraph,
                MarkupKind::BulletList,
            ],
        );
        assert_eq!(kinds("text\n@em{x} continues"), vec![MarkupKind::Paragraph]);
    }

    #[test]
    fn test_lists() {
        let doc = parse("- a\n  continued\n- [ ] b\n\n- c\n\n* d");
        let lists: Vec<_> = doc.children().filter(|n| n.is(MarkupKind::BulletList)).collect();
        assert_eq!(lists.len(), 2);
        let items: Vec<_> = lists[0].children().filter(|n| n.is(MarkupKind::ListItem)).collect();
        assert_eq!(items.len(), 3);
        assert!(items[1].find(MarkupKind::TaskMarker).is_some());
        let para = items[0].find(MarkupKind::Paragraph).unwrap();
        assert_eq!(para.to_text(), "a\n  continued");
    }

    #[test]
    fn test_nested_list() {
        let doc = parse("- a\n  - b\n- c");
        let list = doc.find(MarkupKind::BulletList).unwrap();
        let first = list.find(MarkupKind::ListItem).unwrap();
        assert!(first.find(MarkupKind::BulletList).is_some());
    }

    #[test]
    fn test_blockquote() {
        let doc = parse("> a\n> b\n>\n> c");
        let quote = doc.find(MarkupKind::Blockquote).unwrap();
        let paragraphs = quote.children().filter(|n| n.is(MarkupKind::Paragraph)).count();
        assert_eq!(paragraphs, 2);
        assert_eq!(quote.to_text(), "> a\n> b\n>\n> c");
    }

    #[test]
    fn test_tables() {
        let doc = parse("| a | b |\n|:--|--:|\n| 1 | 2 |\n");
        let table = doc.find(MarkupKind::Table).unwrap();
        let header = table.find(MarkupKind::TableHeader).unwrap();
        assert_eq!(header.children().filter(|n| n.is(MarkupKind::TableCell)).count(), 2);
        assert_eq!(table.children().filter(|n| n.is(MarkupKind::TableRow)).count(), 1);

        assert_eq!(kinds("a | b"), vec![MarkupKind::Paragraph]);
        assert_eq!(kinds("a | b\n---"), vec![MarkupKind::Paragraph]);
        assert_eq!(kinds("a | b\n--|--"), vec![MarkupKind::Table]);
    }

    #[test]
    fn test_fenced_code() {
        let doc = parse("```rust\nfn main() {}\n```\n");
        let code = doc.find(MarkupKind::FencedCode).unwrap();
        assert_eq!(code.find(MarkupKind::CodeInfo).unwrap().text(), "rust");
        assert_eq!(code.find(MarkupKind::CodeText).unwrap().text(), "fn main() {}");
    }

    #[test]
    fn test_cells() {
        let text = "| a | b |";
        let p = BlockParser { text, overflow: None };
        let cells = p.cells(&(0..text.len()));
        assert_eq!(cells, vec![1..4, 5..8]);
        let text = "a|b";
        let p = BlockParser { text, overflow: None };
        assert_eq!(p.cells(&(0..3)), vec![0..1, 2..3]);
    }

    #[test]
    fn test_split_lines() {
        assert_eq!(split_lines("a\r\nb\n", 0..5), vec![0..1, 3..4, 5..5]);
        assert_eq!(split_lines("xa\nb", 1..4), vec![1..2, 3..4]);
    }
}
