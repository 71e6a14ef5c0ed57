//! Streaming text segmenter.
//!
//! Buffers generator deltas and cuts natural speakable chunks for the TTS
//! worker. All thresholds count Unicode characters, not bytes: replies mix
//! CJK and Latin text and the cut points must not depend on encoding width.

/// Below this many characters nothing is cut; short buffers keep growing.
pub const SOFT_MIN_CHARS: usize = 30;
/// Preferred minimum segment length.
pub const MIN_CHARS: usize = 70;
/// Hard upper bound; punctuation-free text is cut here unconditionally.
pub const MAX_CHARS: usize = 260;

/// End-of-sentence markers, Chinese and English.
pub const SENTENCE_ENDS: [char; 7] = ['。', '.', '!', '！', '?', '？', '\n'];

pub fn is_sentence_end(c: char) -> bool {
    SENTENCE_ENDS.contains(&c)
}

/// Incremental segmenter; one instance per turn.
#[derive(Default)]
pub struct Segmenter {
    buf: String,
}

impl Segmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one delta and pop every segment that became available.
    pub fn feed(&mut self, delta: &str) -> Vec<String> {
        self.buf.push_str(delta);
        let mut segments = Vec::new();
        while let Some(segment) = self.pop_segment() {
            segments.push(segment);
        }
        segments
    }

    /// End of stream: return the trimmed remainder, however short. Without
    /// this, replies below the soft minimum would never be voiced.
    pub fn finish(&mut self) -> Option<String> {
        let tail = std::mem::take(&mut self.buf);
        let tail = tail.trim();
        (!tail.is_empty()).then(|| tail.to_string())
    }

    /// Try to cut one segment off the front of the buffer:
    ///
    /// 1. Under `SOFT_MIN_CHARS`: nothing.
    /// 2. At `MIN_CHARS` or more with a sentence end at char index
    ///    `>= MIN_CHARS - 1`: cut at the earliest such end, inclusive.
    /// 3. Else, a sentence end in `[SOFT_MIN_CHARS - 1, MIN_CHARS - 1)`:
    ///    cut there (catches short complete sentences).
    /// 4. Else at `MAX_CHARS` or more: hard cut at `MAX_CHARS`.
    fn pop_segment(&mut self) -> Option<String> {
        let chars: Vec<(usize, char)> = self.buf.char_indices().collect();
        let len = chars.len();
        if len < SOFT_MIN_CHARS {
            return None;
        }

        if len >= MIN_CHARS {
            if let Some(&(byte_idx, c)) = chars[MIN_CHARS - 1..]
                .iter()
                .find(|(_, c)| is_sentence_end(*c))
            {
                return Some(self.cut_after(byte_idx, c));
            }
        }

        let early_end = (MIN_CHARS - 1).min(len);
        if let Some(&(byte_idx, c)) = chars[SOFT_MIN_CHARS - 1..early_end]
            .iter()
            .find(|(_, c)| is_sentence_end(*c))
        {
            return Some(self.cut_after(byte_idx, c));
        }

        if len >= MAX_CHARS {
            let (byte_idx, c) = chars[MAX_CHARS - 1];
            return Some(self.cut_after(byte_idx, c));
        }

        None
    }

    /// Split the buffer just past the character starting at `byte_idx`.
    fn cut_after(&mut self, byte_idx: usize, c: char) -> String {
        let end = byte_idx + c.len_utf8();
        let rest = self.buf.split_off(end);
        std::mem::replace(&mut self.buf, rest)
    }
}
