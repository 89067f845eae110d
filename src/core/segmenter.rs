//! Sentence segmentation for streamed model output
//!
//! The segmenter watches a growing turn text and cuts it into speakable
//! chunks. Each call only scans the part of the text that has not been
//! emitted yet, so the cost of a call is proportional to the unprocessed
//! suffix rather than to the whole turn.
//!
//! Split rules, applied to the unprocessed suffix:
//! 1. Cut after the right-most sentence terminator (`。 . ？ ? ！ ! ； ; ： :`).
//!    A period right after a digit is a decimal point when a digit follows it,
//!    and is undecided while it is the last character seen so far.
//! 2. Without a terminator, cut at exactly `threshold` characters once the
//!    suffix is longer than the threshold.
//! 3. On stream completion, whatever is left is emitted unconditionally.
//!
//! Segment text handed to synthesis is stripped of leading and trailing
//! decoration (punctuation, emoji, whitespace). A span that cleans down to
//! nothing is not emitted and stays in the unprocessed suffix.

/// Default forced-split length in characters
pub const DEFAULT_SEGMENT_THRESHOLD: usize = 10;

const TERMINATORS: [char; 10] = ['。', '.', '？', '?', '！', '!', '；', ';', '：', ':'];

/// A speakable unit of assistant text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Sequence index, monotonic per turn, starting at 1
    pub index: u32,
    /// Exact slice of the turn text this segment covers
    pub raw: String,
    /// Cleaned text handed to synthesis
    pub text: String,
    pub is_first: bool,
    pub is_last: bool,
}

/// Incremental splitter over a growing text buffer
#[derive(Debug, Clone)]
pub struct Segmenter {
    threshold: usize,
    processed_bytes: usize,
    processed_chars: usize,
    last_index: u32,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(DEFAULT_SEGMENT_THRESHOLD)
    }
}

enum Cut {
    /// Byte length of the segment within the suffix
    At(usize),
    None,
}

impl Segmenter {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            processed_bytes: 0,
            processed_chars: 0,
            last_index: 0,
        }
    }

    /// Number of characters already emitted from the current text
    pub fn processed_chars(&self) -> usize {
        self.processed_chars
    }

    /// Index of the last emitted segment (0 when nothing was emitted yet)
    pub fn last_index(&self) -> u32 {
        self.last_index
    }

    /// Start over on a fresh text while keeping the segment numbering.
    ///
    /// Used between tool round trips: each model round produces its own
    /// text, but indices stay monotonic for the whole turn.
    pub fn reset_text(&mut self) {
        self.processed_bytes = 0;
        self.processed_chars = 0;
    }

    /// Whether the unprocessed part of `full_text` holds anything speakable
    pub fn has_pending_speech(&self, full_text: &str) -> bool {
        full_text
            .get(self.processed_bytes..)
            .is_some_and(|suffix| !clean_segment_text(suffix).is_empty())
    }

    /// Try to cut one segment from the unprocessed part of `full_text`.
    ///
    /// Returns `None` when no segment is ready yet. Call repeatedly until it
    /// returns `None` to drain everything that is ready.
    pub fn next_segment(&mut self, full_text: &str) -> Option<Segment> {
        let suffix = full_text.get(self.processed_bytes..)?;
        if suffix.is_empty() {
            return None;
        }
        let prev_char = full_text[..self.processed_bytes].chars().next_back();

        match self.find_cut(suffix, prev_char) {
            Cut::At(len) => self.emit(&suffix[..len], false),
            Cut::None => None,
        }
    }

    /// Emit the remaining unprocessed text as the final segment.
    ///
    /// `is_last` marks the segment as the last one of the turn.
    pub fn finish(&mut self, full_text: &str, is_last: bool) -> Option<Segment> {
        let suffix = full_text.get(self.processed_bytes..)?;
        if suffix.is_empty() {
            return None;
        }
        let segment = self.emit(suffix, is_last);
        if segment.is_none() {
            // Decoration-only tail: nothing to speak, drop it.
            self.processed_chars += suffix.chars().count();
            self.processed_bytes = full_text.len();
        }
        segment
    }

    fn emit(&mut self, raw: &str, is_last: bool) -> Option<Segment> {
        let text = clean_segment_text(raw);
        if text.is_empty() {
            return None;
        }

        self.processed_bytes += raw.len();
        self.processed_chars += raw.chars().count();
        self.last_index += 1;

        Some(Segment {
            index: self.last_index,
            raw: raw.to_string(),
            text,
            is_first: self.last_index == 1,
            is_last,
        })
    }

    fn find_cut(&self, suffix: &str, prev_char: Option<char>) -> Cut {
        let mut last_terminator_end: Option<usize> = None;
        let mut trailing_undecided = false;
        let mut char_count = 0usize;
        let mut threshold_end: Option<usize> = None;

        let mut prev = prev_char;
        let mut iter = suffix.char_indices().peekable();
        while let Some((idx, ch)) = iter.next() {
            char_count += 1;
            if char_count == self.threshold {
                threshold_end = Some(idx + ch.len_utf8());
            }

            if TERMINATORS.contains(&ch) {
                let after_digit = ch == '.' && prev.is_some_and(|p| p.is_ascii_digit());
                if after_digit {
                    match iter.peek() {
                        Some((_, next)) if next.is_ascii_digit() => {}
                        Some(_) => last_terminator_end = Some(idx + ch.len_utf8()),
                        None => trailing_undecided = true,
                    }
                } else {
                    last_terminator_end = Some(idx + ch.len_utf8());
                }
            }
            prev = Some(ch);
        }

        if let Some(end) = last_terminator_end {
            return Cut::At(end);
        }
        if trailing_undecided {
            return Cut::None;
        }
        match threshold_end {
            Some(end) if char_count > self.threshold => Cut::At(end),
            _ => Cut::None,
        }
    }
}

/// Strip decorative punctuation, emoji and whitespace from both ends.
pub fn clean_segment_text(text: &str) -> String {
    text.trim_matches(|c: char| c.is_whitespace() || is_decorative(c))
        .to_string()
}

fn is_decorative(c: char) -> bool {
    if c.is_ascii_punctuation() {
        return true;
    }
    matches!(
        c,
        '，' | '。'
            | '！'
            | '？'
            | '；'
            | '：'
            | '、'
            | '（'
            | '）'
            | '【'
            | '】'
            | '《'
            | '》'
            | '「'
            | '」'
            | '“'
            | '”'
            | '‘'
            | '’'
            | '…'
            | '—'
            | '～'
            | '·'
    ) || is_emoji(c)
}

fn is_emoji(c: char) -> bool {
    matches!(
        c as u32,
        0x1F000..=0x1FAFF | 0x2600..=0x27BF | 0x2B00..=0x2BFF | 0xFE00..=0xFE0F | 0x200D
    )
}
