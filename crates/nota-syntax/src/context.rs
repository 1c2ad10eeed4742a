use std::sync::Arc;

/// A kind of bracket tracked by the lexical context.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Bracket {
    /// `{` and `}`.
    Brace,
    /// `[` and `]`.
    Square,
    /// `(` and `)`.
    Paren,
}

impl Bracket {
    /// The bracket opened by the character, if any.
    pub fn opened_by(c: char) -> Option<Self> {
        match c {
            '{' => Some(Self::Brace),
            '[' => Some(Self::Square),
            '(' => Some(Self::Paren),
            _ => None,
        }
    }

    /// The bracket closed by the character, if any.
    pub fn closed_by(c: char) -> Option<Self> {
        match c {
            '}' => Some(Self::Brace),
            ']' => Some(Self::Square),
            ')' => Some(Self::Paren),
            _ => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// A token the context tracker reacts to when it is shifted.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Shift {
    /// A command introducer: `@`, `#` or `&`.
    Introducer,
    /// An opening bracket.
    Open(Bracket),
    /// A closing bracket.
    Close(Bracket),
    /// A line terminator.
    Newline,
    /// Any other token.
    Other,
}

/// A node the context tracker reacts to when it is reduced.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Reduce {
    /// A completed command.
    Command,
    /// Any other node.
    Other,
}

/// The persistent lexical context consulted by the markup tokenizers.
///
/// Contexts are immutable: shifting and reducing produce new contexts that
/// share their parent frames with the old one, so earlier contexts stay valid
/// and can be compared by identity.
#[derive(Debug, Clone, Default)]
pub struct Context {
    top: Option<Arc<Frame>>,
    line_start: bool,
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    parent: Option<Arc<Frame>>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum FrameKind {
    /// Inside a command head, where structural characters are not text.
    IgnoreDelimiters,
    /// Inside a bracketed body opened by `opener`, counting unmatched
    /// literal brackets of each kind.
    Balance { opener: Bracket, counts: [u32; 3] },
}

impl Context {
    /// The root context.
    pub fn new() -> Self {
        Self { top: None, line_start: true }
    }

    /// The context after shifting a token.
    pub fn shift(&self, token: Shift) -> Self {
        let line_start = matches!(token, Shift::Newline);
        let top = match (token, self.kind()) {
            (Shift::Introducer, _) => self.push(FrameKind::IgnoreDelimiters),
            (Shift::Open(bracket), Some(FrameKind::IgnoreDelimiters)) => {
                self.push(FrameKind::Balance { opener: bracket, counts: [0; 3] })
            }
            (Shift::Open(bracket), Some(FrameKind::Balance { opener, mut counts })) => {
                counts[bracket.index()] += 1;
                self.replace(FrameKind::Balance { opener, counts })
            }
            (Shift::Close(bracket), Some(FrameKind::Balance { opener, mut counts })) => {
                let count = &mut counts[bracket.index()];
                if *count > 0 {
                    *count -= 1;
                    self.replace(FrameKind::Balance { opener, counts })
                } else if bracket == opener {
                    self.parent()
                } else {
                    self.top.clone()
                }
            }
            _ => self.top.clone(),
        };
        Self { top, line_start }
    }

    /// The context after reducing a node.
    ///
    /// Reducing a command pops every frame pushed since its introducer was
    /// shifted.
    pub fn reduce(&self, node: Reduce) -> Self {
        match node {
            Reduce::Command => {
                let mut frame = self.top.clone();
                while let Some(current) = frame {
                    if current.kind == FrameKind::IgnoreDelimiters {
                        return Self { top: current.parent.clone(), line_start: false };
                    }
                    frame = current.parent.clone();
                }
                Self { top: None, line_start: false }
            }
            Reduce::Other => self.clone(),
        }
    }

    /// Whether no frame is active.
    pub fn is_root(&self) -> bool {
        self.top.is_none()
    }

    /// The number of active frames.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut frame = self.top.as_deref();
        while let Some(current) = frame {
            depth += 1;
            frame = current.parent.as_deref();
        }
        depth
    }

    /// Whether the last shifted token was a line terminator.
    pub fn at_line_start(&self) -> bool {
        self.line_start
    }

    /// Whether the innermost frame is a command head.
    pub fn ignores_delimiters(&self) -> bool {
        self.kind() == Some(FrameKind::IgnoreDelimiters)
    }

    /// Whether the innermost frame is a bracketed body.
    pub fn is_balancing(&self) -> bool {
        matches!(self.kind(), Some(FrameKind::Balance { .. }))
    }

    /// Whether shifting this closing bracket would close the innermost body.
    pub fn closes(&self, bracket: Bracket) -> bool {
        matches!(
            self.kind(),
            Some(FrameKind::Balance { opener, counts })
                if opener == bracket && counts[bracket.index()] == 0
        )
    }

    /// Whether any active frame is a body opened by the given bracket.
    pub fn inside(&self, bracket: Bracket) -> bool {
        let mut frame = self.top.as_deref();
        while let Some(current) = frame {
            if matches!(current.kind, FrameKind::Balance { opener, .. } if opener == bracket)
            {
                return true;
            }
            frame = current.parent.as_deref();
        }
        false
    }

    /// Whether both contexts are the same persistent value.
    pub fn same(&self, other: &Self) -> bool {
        let frames = match (&self.top, &other.top) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        frames && self.line_start == other.line_start
    }

    fn kind(&self) -> Option<FrameKind> {
        self.top.as_ref().map(|frame| frame.kind)
    }

    fn parent(&self) -> Option<Arc<Frame>> {
        self.top.as_ref().and_then(|frame| frame.parent.clone())
    }

    fn push(&self, kind: FrameKind) -> Option<Arc<Frame>> {
        Some(Arc::new(Frame { kind, parent: self.top.clone() }))
    }

    fn replace(&self, kind: FrameKind) -> Option<Arc<Frame>> {
        Some(Arc::new(Frame { kind, parent: self.parent() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_round_trip() {
        let root = Context::new();
        let head = root.shift(Shift::Introducer);
        assert!(head.ignores_delimiters());
        let body = head.shift(Shift::Open(Bracket::Brace));
        assert!(body.closes(Bracket::Brace));
        let closed = body.shift(Shift::Close(Bracket::Brace));
        assert!(closed.ignores_delimiters());
        let done = closed.reduce(Reduce::Command);
        assert!(done.is_root());
    }

    #[test]
    fn test_literal_brackets_are_counted() {
        let body = Context::new()
            .shift(Shift::Introducer)
            .shift(Shift::Open(Bracket::Brace))
            .shift(Shift::Open(Bracket::Brace));
        assert!(!body.closes(Bracket::Brace));
        let inner = body.shift(Shift::Close(Bracket::Brace));
        assert!(inner.closes(Bracket::Brace));
        assert_eq!(inner.depth(), 2);
    }

    #[test]
    fn test_mismatched_close_is_literal() {
        let body = Context::new()
            .shift(Shift::Introducer)
            .shift(Shift::Open(Bracket::Brace));
        let after = body.shift(Shift::Close(Bracket::Paren));
        assert!(after.closes(Bracket::Brace));
        assert_eq!(after.depth(), 2);
    }

    #[test]
    fn test_contexts_are_persistent() {
        let head = Context::new().shift(Shift::Introducer);
        let body = head.shift(Shift::Open(Bracket::Brace));
        let nested = body.shift(Shift::Open(Bracket::Square));
        assert!(head.ignores_delimiters());
        assert!(body.closes(Bracket::Brace));
        assert!(!nested.closes(Bracket::Square));
        assert!(nested.closes(Bracket::Brace));
        assert!(head.same(&head.clone()));
        assert!(!head.same(&body));
    }

    #[test]
    fn test_reduce_pops_unclosed_bodies() {
        let ctx = Context::new()
            .shift(Shift::Introducer)
            .shift(Shift::Open(Bracket::Brace))
            .shift(Shift::Introducer)
            .shift(Shift::Open(Bracket::Square));
        assert_eq!(ctx.depth(), 4);
        let outer = ctx.reduce(Reduce::Command);
        assert_eq!(outer.depth(), 2);
        assert!(outer.inside(Bracket::Brace));
        assert!(outer.reduce(Reduce::Command).is_root());
    }

    #[test]
    fn test_line_start() {
        let ctx = Context::new();
        assert!(ctx.at_line_start());
        let ctx = ctx.shift(Shift::Other);
        assert!(!ctx.at_line_start());
        assert!(ctx.shift(Shift::Newline).at_line_start());
    }
}
