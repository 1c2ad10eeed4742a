use crate::block::split_lines;

/// Where a byte offset lies in a text.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Position {
    /// The zero-based line.
    pub line: usize,
    /// The number of characters before the offset on its line.
    pub column: usize,
    /// The number of UTF-16 code units before the offset on its line, which
    /// is how source maps count columns.
    pub utf16_column: usize,
}

/// The line starts of a text, for turning byte offsets into positions.
#[derive(Debug, Clone)]
pub struct Lines<'a> {
    text: &'a str,
    starts: Vec<usize>,
}

impl<'a> Lines<'a> {
    /// Index the lines of a text. `\n`, `\r\n` and the other Unicode line
    /// terminators all end a line.
    pub fn new(text: &'a str) -> Self {
        let starts = split_lines(text, 0..text.len()).into_iter().map(|line| line.start).collect();
        Self { text, starts }
    }

    /// Locate a byte offset.
    ///
    /// Returns `None` if the offset is past the end of the text or not on a
    /// character boundary.
    pub fn position(&self, offset: usize) -> Option<Position> {
        let line = self.starts.partition_point(|&start| start <= offset).checked_sub(1)?;
        let head = self.text.get(self.starts[line]..offset)?;
        Some(Position {
            line,
            column: head.chars().count(),
            utf16_column: head.encode_utf16().count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "ä\tcde\nf💛g\r\nhi\rjkl";

    fn at(offset: usize) -> Option<(usize, usize, usize)> {
        Lines::new(TEXT)
            .position(offset)
            .map(|pos| (pos.line, pos.column, pos.utf16_column))
    }

    #[test]
    fn test_line_starts() {
        assert_eq!(Lines::new(TEXT).starts, [0, 7, 15, 18]);
        assert_eq!(Lines::new("").starts, [0]);
        assert_eq!(Lines::new("a\n").starts, [0, 2]);
    }

    #[test]
    fn test_positions() {
        assert_eq!(at(0), Some((0, 0, 0)));
        assert_eq!(at(2), Some((0, 1, 1)));
        assert_eq!(at(6), Some((0, 5, 5)));
        assert_eq!(at(7), Some((1, 0, 0)));
        assert_eq!(at(12), Some((1, 2, 3)));
        assert_eq!(at(15), Some((2, 0, 0)));
        assert_eq!(at(21), Some((3, 3, 3)));
    }

    #[test]
    fn test_out_of_bounds() {
        assert_eq!(at(22), None);
        assert_eq!(at(1), None);
    }
}
