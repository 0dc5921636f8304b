//! The FTS tokenizer capability: `tokenize(text) -> tokens` at write time,
//! `query_expand(user_query) -> fts_expression` at query time. Supports CJK
//! segmentation. The core pre-segments documents and queries in application
//! code rather than registering a custom SQLite tokenizer, so the FTS5 table
//! itself can use its default `unicode61` tokenizer over already-segmented,
//! space-joined text.

pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;
    fn query_expand(&self, user_query: &str) -> String;
}

/// Default tokenizer: splits on whitespace. `query_expand` conjoins tokens
/// with logical AND, matching FTS5 MATCH syntax (`"a" AND "b"`).
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_lowercase).collect()
    }

    fn query_expand(&self, user_query: &str) -> String {
        self.tokenize(user_query)
            .into_iter()
            .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

#[cfg(feature = "cjk-tokenizer")]
mod jieba_impl {
    use super::Tokenizer;
    use jieba_rs::Jieba;

    /// CJK-capable tokenizer backed by `jieba-rs`, matching the source
    /// system's `jieba_query` segmentation at write and query time.
    pub struct JiebaTokenizer {
        jieba: Jieba,
    }

    impl Default for JiebaTokenizer {
        fn default() -> Self {
            Self { jieba: Jieba::new() }
        }
    }

    impl Tokenizer for JiebaTokenizer {
        fn tokenize(&self, text: &str) -> Vec<String> {
            self.jieba
                .cut(text, false)
                .into_iter()
                .map(str::to_lowercase)
                .filter(|t| !t.trim().is_empty())
                .collect()
        }

        fn query_expand(&self, user_query: &str) -> String {
            self.tokenize(user_query)
                .into_iter()
                .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
                .collect::<Vec<_>>()
                .join(" AND ")
        }
    }
}

#[cfg(feature = "cjk-tokenizer")]
pub use jieba_impl::JiebaTokenizer;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_tokenizer_lowercases_and_splits() {
        let tokenizer = WhitespaceTokenizer;
        assert_eq!(tokenizer.tokenize("Invoice Total"), vec!["invoice", "total"]);
    }

    #[test]
    fn query_expand_conjoins_with_and() {
        let tokenizer = WhitespaceTokenizer;
        assert_eq!(tokenizer.query_expand("invoice total"), "\"invoice\" AND \"total\"");
    }

    #[test]
    fn empty_query_expands_to_empty_expression() {
        let tokenizer = WhitespaceTokenizer;
        assert_eq!(tokenizer.query_expand(""), "");
    }
}
