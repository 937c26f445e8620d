//! Text <-> token conversion.
//!
//! The codec is fixed per index: switching codecs requires a full rebuild,
//! since every stored `token_count` and chunk boundary is only meaningful
//! relative to the codec that produced it.

/// Encodes text to a token sequence and back, and counts tokens without
/// materializing the full sequence when only the count is needed.
pub trait TokenCodec: Send + Sync {
  fn encode(&self, text: &str) -> Vec<String>;
  fn decode(&self, tokens: &[String]) -> String;

  fn count(&self, text: &str) -> usize {
    self.encode(text).len()
  }
}

/// Default, dependency-free codec: each token is a maximal run of
/// non-whitespace characters plus the whitespace immediately following it.
/// `decode` is exact concatenation, so `decode(encode(text)) == text` for
/// any input.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceCodec;

impl TokenCodec for WhitespaceCodec {
  fn encode(&self, text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while chars.peek().is_some() {
      let mut token = String::new();

      while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
          break;
        }
        token.push(c);
        chars.next();
      }

      while let Some(&c) = chars.peek() {
        if !c.is_whitespace() {
          break;
        }
        token.push(c);
        chars.next();
      }

      tokens.push(token);
    }

    tokens
  }

  fn decode(&self, tokens: &[String]) -> String {
    tokens.concat()
  }
}
