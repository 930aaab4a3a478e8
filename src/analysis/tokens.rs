//! Token counting with the `o200k_base` BPE.

use tiktoken_rs::CoreBPE;

use crate::models::TOKENIZER_SCHEME;

/// Counts tokens under the scheme recorded in `tiktoken_encoding`.
pub struct TokenCounter {
    bpe: CoreBPE,
}

impl TokenCounter {
    /// Load the BPE ranks. This is relatively expensive; build one counter and share it.
    pub fn new() -> Result<Self, String> {
        let bpe = tiktoken_rs::o200k_base()
            .map_err(|e| format!("failed to load {} tokenizer: {}", TOKENIZER_SCHEME, e))?;
        Ok(Self { bpe })
    }

    pub fn scheme(&self) -> &'static str {
        TOKENIZER_SCHEME
    }

    /// Number of tokens in `text`. Special-token text is counted as ordinary text.
    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("scheme", &TOKENIZER_SCHEME)
            .finish()
    }
}
