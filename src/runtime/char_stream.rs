//! Character input for the lexer
//!
//! [`CharStream`] is the cursor the simulator drives. [`InputStream`] is the
//! fully buffered implementation: the whole input is decoded to code points
//! up front, so `mark`/`release` have nothing to pin and `seek` is a plain
//! index assignment.
//!
//! # Example
//!
//! ```rust
//! use parsanol_atn::runtime::{CharStream, InputStream};
//!
//! let mut input = InputStream::new("ab");
//! assert_eq!(input.la(1), 'a' as i32);
//! input.consume().unwrap();
//! assert_eq!(input.la(1), 'b' as i32);
//! assert_eq!(input.text(0, 2), "ab");
//! ```

use super::error::{AtnError, AtnResult};
use super::token::{EOF, INVALID_TYPE};

/// A seekable cursor over code points
pub trait CharStream {
    /// Symbol at `offset` relative to the cursor (`1` is the next symbol,
    /// `-1` the previous one); `EOF` past either end
    fn la(&self, offset: isize) -> i32;

    /// Advance past the current symbol
    fn consume(&mut self) -> AtnResult<()>;

    /// Index of the current symbol
    fn index(&self) -> usize;

    /// Total number of symbols
    fn size(&self) -> usize;

    /// Pin the buffer from the current position; paired with [`release`](Self::release)
    fn mark(&mut self) -> isize;

    /// Release a marker returned by [`mark`](Self::mark)
    fn release(&mut self, marker: isize);

    /// Move the cursor to `index`
    fn seek(&mut self, index: usize);

    /// Text of the half-open code point range `[start, stop)`
    fn text(&self, start: usize, stop: usize) -> String;

    /// Name of the source, for diagnostics
    fn source_name(&self) -> &str {
        "<unknown>"
    }
}

/// A fully buffered character stream
#[derive(Debug, Clone)]
pub struct InputStream {
    name: String,
    data: Vec<char>,
    index: usize,
}

impl InputStream {
    /// Buffer `input` as code points
    pub fn new(input: &str) -> Self {
        Self {
            name: "<unknown>".to_string(),
            data: input.chars().collect(),
            index: 0,
        }
    }

    /// Set the source name reported in diagnostics
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Rewind to the start
    pub fn reset(&mut self) {
        self.index = 0;
    }
}

impl CharStream for InputStream {
    fn la(&self, offset: isize) -> i32 {
        if offset == 0 {
            return INVALID_TYPE;
        }
        // la(-1) is the symbol just consumed
        let adjusted = if offset < 0 { offset + 1 } else { offset };
        let pos = self.index as isize + adjusted - 1;
        if pos < 0 || pos as usize >= self.data.len() {
            return EOF;
        }
        self.data[pos as usize] as i32
    }

    fn consume(&mut self) -> AtnResult<()> {
        if self.index >= self.data.len() {
            return Err(AtnError::illegal_state("cannot consume EOF"));
        }
        self.index += 1;
        Ok(())
    }

    #[inline]
    fn index(&self) -> usize {
        self.index
    }

    #[inline]
    fn size(&self) -> usize {
        self.data.len()
    }

    #[inline]
    fn mark(&mut self) -> isize {
        -1
    }

    #[inline]
    fn release(&mut self, _marker: isize) {}

    fn seek(&mut self, index: usize) {
        if index <= self.index {
            self.index = index;
            return;
        }
        self.index = index.min(self.data.len());
    }

    fn text(&self, start: usize, stop: usize) -> String {
        let stop = stop.min(self.data.len());
        if start >= stop {
            return String::new();
        }
        self.data[start..stop].iter().collect()
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_la_bounds() {
        let mut input = InputStream::new("xy");
        assert_eq!(input.la(0), INVALID_TYPE);
        assert_eq!(input.la(-1), EOF);
        assert_eq!(input.la(2), 'y' as i32);
        assert_eq!(input.la(3), EOF);
        input.consume().unwrap();
        assert_eq!(input.la(-1), 'x' as i32);
    }

    #[test]
    fn test_consume_eof_fails() {
        let mut input = InputStream::new("");
        assert!(matches!(
            input.consume(),
            Err(AtnError::IllegalState { .. })
        ));
    }

    #[test]
    fn test_seek_clamps_forward() {
        let mut input = InputStream::new("abc");
        input.seek(10);
        assert_eq!(input.index(), 3);
        input.seek(1);
        assert_eq!(input.index(), 1);
    }

    #[test]
    fn test_supplementary_plane_is_one_symbol() {
        let input = InputStream::new("a\u{1F600}b");
        assert_eq!(input.size(), 3);
        assert_eq!(input.la(2), 0x1F600);
        assert_eq!(input.text(1, 3), "\u{1F600}b");
    }

    #[test]
    fn test_source_name() {
        let input = InputStream::new("").with_name("demo.txt");
        assert_eq!(input.source_name(), "demo.txt");
    }
}
