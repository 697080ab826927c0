//! Rolling tail capture for child stderr.

/// Byte ring that keeps only the most recent `limit` bytes written to it.
///
/// The supervisor feeds child stderr through one of these so error reports
/// can carry the tail of the stream without buffering all of it.
#[derive(Debug)]
pub struct TailBuffer {
    limit: usize,
    data: Vec<u8>,
}

impl TailBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            data: Vec::with_capacity(limit.min(4096)),
        }
    }

    /// Append bytes, discarding from the front once past the limit.
    pub fn push(&mut self, bytes: &[u8]) {
        if self.limit == 0 {
            return;
        }

        if bytes.len() >= self.limit {
            self.data.clear();
            self.data.extend_from_slice(&bytes[bytes.len() - self.limit..]);
            return;
        }

        let total = self.data.len() + bytes.len();
        if total > self.limit {
            let overflow = total - self.limit;
            self.data.drain(..overflow);
        }
        self.data.extend_from_slice(bytes);
    }

    /// Current tail contents, lossily decoded.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// Truncate `s` to at most `max_len` bytes, appending `...` when cut.
///
/// Cuts land on a char boundary so multibyte text never produces invalid
/// UTF-8.
pub fn truncate_message(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }

    let mut end = max_len.saturating_sub(3);
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_writes_accumulate() {
        let mut tail = TailBuffer::new(16);
        tail.push(b"abc");
        tail.push(b"def");
        assert_eq!(tail.contents(), "abcdef");
    }

    #[test]
    fn test_overflow_discards_oldest() {
        let mut tail = TailBuffer::new(8);
        tail.push(b"12345678");
        tail.push(b"abcd");
        assert_eq!(tail.contents(), "5678abcd");
    }

    #[test]
    fn test_oversized_write_keeps_last_limit_bytes() {
        let mut tail = TailBuffer::new(4);
        tail.push(b"0123456789");
        assert_eq!(tail.contents(), "6789");
    }

    #[test]
    fn test_zero_limit_captures_nothing() {
        let mut tail = TailBuffer::new(0);
        tail.push(b"anything");
        assert_eq!(tail.contents(), "");
    }

    #[test]
    fn test_truncate_short_string_untouched() {
        assert_eq!(truncate_message("hello", 10), "hello");
        assert_eq!(truncate_message("hello", 5), "hello");
    }

    #[test]
    fn test_truncate_long_string_marks_cut() {
        assert_eq!(truncate_message("hello world", 8), "hello...");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        // Each é is two bytes; a blind byte cut at 6 would split one.
        let s = "ééééé";
        let out = truncate_message(s, 8);
        assert!(out.ends_with("..."));
        assert!(out.is_char_boundary(out.len() - 3));
    }
}
