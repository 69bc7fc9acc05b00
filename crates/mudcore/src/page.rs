//! Word wrapping and output pagination.

use std::collections::VecDeque;

use crate::transport::TermSize;

pub const MORE_HINT: &str = "[Press enter to continue]";

/// Wrap one logical line to `width` columns, breaking on spaces. Words longer
/// than a whole line are split hard.
pub fn wrap_line(line: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut cur_len = 0usize;

    for word in line.split(' ') {
        let mut word = word;
        let mut wlen = word.chars().count();

        if cur_len > 0 && cur_len + 1 + wlen > width {
            out.push(std::mem::take(&mut cur));
            cur_len = 0;
        }

        while wlen > width {
            if cur_len > 0 {
                out.push(std::mem::take(&mut cur));
                cur_len = 0;
            }
            let split = word
                .char_indices()
                .nth(width)
                .map(|(i, _)| i)
                .unwrap_or(word.len());
            out.push(word[..split].to_string());
            word = &word[split..];
            wlen -= width;
        }

        if cur_len > 0 {
            cur.push(' ');
            cur_len += 1;
        }
        cur.push_str(word);
        cur_len += wlen;
    }

    out.push(cur);
    out
}

pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    text.lines().flat_map(|l| wrap_line(l, width)).collect()
}

/// Holds wrapped lines that didn't fit on the screen.
#[derive(Debug, Default)]
pub struct Pager {
    overflow: VecDeque<String>,
}

impl Pager {
    pub fn has_more(&self) -> bool {
        !self.overflow.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.overflow.len()
    }

    /// Lay out `text` for a terminal of `size`, returning the screenful to send
    /// now. Whatever doesn't fit replaces the previous overflow.
    pub fn page(&mut self, text: &str, size: TermSize) -> String {
        let lines = wrap_text(text, usize::from(size.cols));
        self.overflow = lines.into();
        self.next_screen(size)
    }

    /// The next screenful of overflow, if any.
    pub fn more(&mut self, size: TermSize) -> Option<String> {
        if self.overflow.is_empty() {
            return None;
        }
        Some(self.next_screen(size))
    }

    fn next_screen(&mut self, size: TermSize) -> String {
        let height = usize::from(size.rows).saturating_sub(2).max(1);
        let n = height.min(self.overflow.len());
        let mut shown = self.overflow.drain(..n).collect::<Vec<_>>();
        if !self.overflow.is_empty() {
            shown.push(MORE_HINT.to_string());
        }
        let mut s = shown.join("\r\n");
        s.push_str("\r\n");
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(cols: u16, rows: u16) -> TermSize {
        TermSize { cols, rows }
    }

    #[test]
    fn wraps_on_word_boundaries() {
        assert_eq!(
            wrap_line("the quick brown fox jumps", 10),
            vec!["the quick", "brown fox", "jumps"]
        );
    }

    #[test]
    fn splits_words_longer_than_width() {
        assert_eq!(wrap_line("abcdefghij xy", 4), vec!["abcd", "efgh", "ij", "xy"]);
    }

    #[test]
    fn keeps_blank_lines() {
        assert_eq!(wrap_text("a\n\nb", 80), vec!["a", "", "b"]);
    }

    #[test]
    fn short_message_is_sent_whole() {
        let mut p = Pager::default();
        assert_eq!(p.page("hello\nworld", size(80, 24)), "hello\r\nworld\r\n");
        assert!(!p.has_more());
        assert_eq!(p.more(size(80, 24)), None);
    }

    #[test]
    fn long_message_is_paged_to_height_minus_two() {
        let mut p = Pager::default();
        let text = (1..=7).map(|i| format!("line{i}")).collect::<Vec<_>>().join("\n");

        let first = p.page(&text, size(80, 5));
        assert_eq!(first, format!("line1\r\nline2\r\nline3\r\n{MORE_HINT}\r\n"));
        assert_eq!(p.pending(), 4);

        let second = p.more(size(80, 5)).unwrap();
        assert_eq!(second, format!("line4\r\nline5\r\nline6\r\n{MORE_HINT}\r\n"));

        assert_eq!(p.more(size(80, 5)).unwrap(), "line7\r\n");
        assert!(!p.has_more());
    }

    #[test]
    fn new_message_replaces_overflow() {
        let mut p = Pager::default();
        p.page("a\nb\nc\nd", size(80, 3));
        assert!(p.has_more());
        p.page("fresh", size(80, 3));
        assert!(!p.has_more());
    }
}
