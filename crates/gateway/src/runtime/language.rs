//! Voice auto-selection.
//!
//! The reply's language is decided once per turn from a sampled prefix of
//! the generated text, then latched. Sampling is bounded so long replies do
//! not delay synthesis, and a sentence end inside the sample decides early
//! so short replies are not held back.

use crate::runtime::segment::{is_sentence_end, SOFT_MIN_CHARS};

/// The two configured voices. Defaults to Chinese.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    Zh,
    En,
}

/// Per-turn language decision state. Feed deltas until a decision falls
/// out; force one when the generator stream ends.
pub struct LanguageRouter {
    decide_chars: usize,
    sample: String,
    sample_len: usize,
    decided: Option<Lang>,
}

impl LanguageRouter {
    pub fn new(auto: bool, decide_chars: usize) -> Self {
        Self {
            decide_chars,
            sample: String::new(),
            sample_len: 0,
            // Auto-selection off: every turn speaks the default voice.
            decided: (!auto).then_some(Lang::Zh),
        }
    }

    pub fn decided(&self) -> Option<Lang> {
        self.decided
    }

    /// Accumulate one delta into the sample. Returns the decision if this
    /// delta triggered one: either the sample reached its configured length
    /// or a sentence ended late enough to be representative.
    pub fn observe(&mut self, delta: &str) -> Option<Lang> {
        if self.decided.is_some() {
            return None;
        }
        for c in delta.chars() {
            self.sample.push(c);
            self.sample_len += 1;
            if is_sentence_end(c) && self.sample_len >= SOFT_MIN_CHARS {
                return Some(self.decide());
            }
            if self.sample_len >= self.decide_chars {
                return Some(self.decide());
            }
        }
        None
    }

    /// End of stream: decide from whatever was sampled.
    pub fn force(&mut self) -> Lang {
        match self.decided {
            Some(lang) => lang,
            None => self.decide(),
        }
    }

    fn decide(&mut self) -> Lang {
        let cjk = self.sample.chars().filter(|c| is_cjk(*c)).count();
        let latin = self
            .sample
            .chars()
            .filter(char::is_ascii_alphabetic)
            .count();
        let lang = if cjk >= latin { Lang::Zh } else { Lang::En };
        tracing::debug!(cjk, latin, ?lang, "language decided");
        self.decided = Some(lang);
        lang
    }
}

/// CJK Unified Ideographs block.
fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chinese_majority_picks_chinese() {
        let mut router = LanguageRouter::new(true, 120);
        assert!(router.observe("今天天气很好").is_none());
        assert_eq!(router.force(), Lang::Zh);
    }

    #[test]
    fn latin_majority_picks_english() {
        let mut router = LanguageRouter::new(true, 120);
        router.observe("The weather is nice today");
        assert_eq!(router.force(), Lang::En);
    }

    #[test]
    fn tie_goes_to_chinese() {
        let mut router = LanguageRouter::new(true, 120);
        router.observe("好a");
        assert_eq!(router.force(), Lang::Zh);
    }

    #[test]
    fn sample_length_triggers_decision() {
        let mut router = LanguageRouter::new(true, 10);
        let decision = router.observe("0123456789extra");
        assert_eq!(decision, Some(Lang::En));
        // Latched: later deltas cannot flip it.
        assert!(router.observe("中文中文中文中文中文中文").is_none());
        assert_eq!(router.decided(), Some(Lang::En));
    }

    #[test]
    fn sentence_end_past_soft_min_decides_early() {
        let mut router = LanguageRouter::new(true, 120);
        let text = format!("{}。", "中".repeat(SOFT_MIN_CHARS - 1));
        assert_eq!(router.observe(&text), Some(Lang::Zh));
    }

    #[test]
    fn sentence_end_below_soft_min_does_not_decide() {
        let mut router = LanguageRouter::new(true, 120);
        assert!(router.observe("OK.").is_none());
        assert!(router.decided().is_none());
        assert_eq!(router.force(), Lang::En);
    }

    #[test]
    fn auto_disabled_latches_chinese_immediately() {
        let mut router = LanguageRouter::new(false, 120);
        assert_eq!(router.decided(), Some(Lang::Zh));
        assert!(router.observe("English only text here.").is_none());
        assert_eq!(router.force(), Lang::Zh);
    }

    #[test]
    fn digits_and_punctuation_count_for_neither() {
        let mut router = LanguageRouter::new(true, 120);
        router.observe("12345!@#，。");
        assert_eq!(router.force(), Lang::Zh);
    }
}
