//! logos-based lexer for the rule mini-language (`"required|min:3|in:a,b"`).
//!
//! Only the three separators are significant. Everything between them is text, so
//! parameters keep spaces and punctuation such as `@`, `/` or `.`.

use logos::Logos;

/// Token produced by the rule lexer.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// `|` between rules.
    #[token("|")]
    Pipe,

    /// `:` between a rule name and its parameters.
    #[token(":")]
    Colon,

    /// `,` between parameters.
    #[token(",")]
    Comma,

    /// A run of anything else.
    #[regex(r"[^|:,]+")]
    Text,
}

/// Tokenize a rule specification into `(Token, text)` pairs.
pub fn tokenize(input: &str) -> Vec<(Token, &str)> {
    Token::lexer(input)
        .spanned()
        .filter_map(|(result, span)| result.ok().map(|token| (token, &input[span])))
        .collect()
}
