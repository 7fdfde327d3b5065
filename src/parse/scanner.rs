//! Character cursor over descriptor text.

pub(super) struct Scanner<'src> {
    src: &'src str,
    pos: usize,
}

impl<'src> Scanner<'src> {
    pub fn new(src: &'src str) -> Self {
        Self { src, pos: 0 }
    }

    /// Byte column of the next character, for error messages.
    #[inline(always)]
    pub fn column(&self) -> usize {
        self.pos
    }

    #[inline(always)]
    pub fn rest(&self) -> &'src str {
        &self.src[self.pos..]
    }

    pub fn is_done(&self) -> bool {
        self.pos >= self.src.len()
    }

    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Next character that is not whitespace, without consuming anything.
    pub fn peek_past_whitespace(&self) -> Option<char> {
        self.rest().chars().find(|c| !c.is_whitespace())
    }

    pub fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    pub fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    pub fn skip_whitespace(&mut self) {
        self.take_while(char::is_whitespace);
    }

    pub fn take_while(&mut self, mut pred: impl FnMut(char) -> bool) -> &'src str {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if !pred(ch) {
                break;
            }
            self.pos += ch.len_utf8();
        }
        &self.src[start..self.pos]
    }
}
