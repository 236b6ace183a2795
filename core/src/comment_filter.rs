//! Decides whether a raw comment carries enough signal to be worth an
//! LLM call in Stage 2.

#[derive(Debug, Clone, Copy)]
pub struct CommentFilterConfig {
    pub min_char_count: usize,
    pub min_word_count: usize,
}

impl Default for CommentFilterConfig {
    fn default() -> Self {
        CommentFilterConfig {
            min_char_count: 9,
            min_word_count: 3,
        }
    }
}

pub fn is_meaningful(raw_comment: &str, config: &CommentFilterConfig) -> bool {
    raw_comment.chars().count() >= config.min_char_count
        || raw_comment.split(' ').count() >= config.min_word_count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_comment_with_enough_words_is_meaningful() {
        let config = CommentFilterConfig::default();
        assert!(is_meaningful("a b c", &config));
    }

    #[test]
    fn long_comment_with_few_words_is_meaningful() {
        let config = CommentFilterConfig::default();
        assert!(is_meaningful("supercalifragilistic", &config));
    }

    #[test]
    fn short_and_sparse_comment_is_not_meaningful() {
        let config = CommentFilterConfig::default();
        assert!(!is_meaningful("ok", &config));
    }
}
