//! Lexer for the query string syntax
//!
//! Splits a query string into tokens, each tagged with the character
//! offset it starts at so parse errors can point into the input.

use crate::error::{Result, SegdexError};

/// Token types of the query syntax
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Unquoted word, possibly holding `*` or `?` wildcards
    Word(String),
    /// Raw content of a `"..."` phrase
    Phrase(String),

    /// `AND` or `&&`
    And,
    /// `OR` or `||`
    Or,
    /// `NOT`, `!` or `-`
    Not,
    /// `REQ` or `+`
    Req,

    Colon,
    /// Separator of alternative fields, `f1|f2:term`
    Pipe,

    /// Tilde with optional similarity or slop
    Tilde(Option<f32>),
    /// Caret with its boost, `None` when no number follows
    Caret(Option<f32>),

    LeftParen,
    RightParen,
    /// `[` inclusive range bound
    LeftBracket,
    RightBracket,
    /// `{` exclusive range bound
    LeftBrace,
    RightBrace,
    Lt,
    LtEq,
    Gt,
    GtEq,

    Eof,
}

/// A token and the character offset it starts at
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

/// Characters that end a word
fn is_word_break(ch: char) -> bool {
    ch.is_whitespace()
        || matches!(
            ch,
            ':' | '(' | ')' | '[' | ']' | '{' | '}' | '<' | '>' | '"' | '^' | '~' | '|' | '&'
        )
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
        }
    }

    /// Tokenize the whole input; the last token is always `Eof`
    pub fn tokenize(mut self) -> Result<Vec<Spanned>> {
        let mut tokens = Vec::new();
        loop {
            let spanned = self.next_token()?;
            let done = spanned.token == Token::Eof;
            tokens.push(spanned);
            if done {
                return Ok(tokens);
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Spanned> {
        self.skip_whitespace();
        let start = self.position;
        let token = self.read_token()?;
        Ok(Spanned {
            token,
            position: start,
        })
    }

    fn read_token(&mut self) -> Result<Token> {
        let Some(ch) = self.current_char() else {
            return Ok(Token::Eof);
        };

        match ch {
            ':' => self.single(Token::Colon),
            '(' => self.single(Token::LeftParen),
            ')' => self.single(Token::RightParen),
            '[' => self.single(Token::LeftBracket),
            ']' => self.single(Token::RightBracket),
            '{' => self.single(Token::LeftBrace),
            '}' => self.single(Token::RightBrace),
            '+' => self.single(Token::Req),
            '-' | '!' => self.single(Token::Not),
            '<' => {
                self.advance();
                Ok(self.or_equal(Token::Lt, Token::LtEq))
            }
            '>' => {
                self.advance();
                Ok(self.or_equal(Token::Gt, Token::GtEq))
            }
            '|' => {
                self.advance();
                if self.current_char() == Some('|') {
                    self.advance();
                    Ok(Token::Or)
                } else {
                    Ok(Token::Pipe)
                }
            }
            '&' => {
                self.advance();
                if self.current_char() == Some('&') {
                    self.advance();
                    Ok(Token::And)
                } else {
                    Err(SegdexError::parse(self.position - 1, "expected '&&'"))
                }
            }
            '~' => {
                self.advance();
                Ok(Token::Tilde(self.read_float()))
            }
            '^' => {
                self.advance();
                Ok(Token::Caret(self.read_float()))
            }
            '"' => {
                self.advance();
                self.read_phrase()
            }
            _ => Ok(self.read_word()),
        }
    }

    fn single(&mut self, token: Token) -> Result<Token> {
        self.advance();
        Ok(token)
    }

    fn or_equal(&mut self, plain: Token, with_equal: Token) -> Token {
        if self.current_char() == Some('=') {
            self.advance();
            with_equal
        } else {
            plain
        }
    }

    fn read_word(&mut self) -> Token {
        let mut word = String::new();
        while let Some(ch) = self.current_char() {
            if ch == '\\' {
                self.advance();
                if let Some(escaped) = self.current_char() {
                    word.push(escaped);
                    self.advance();
                }
                continue;
            }
            if is_word_break(ch) {
                break;
            }
            word.push(ch);
            self.advance();
        }

        match word.as_str() {
            "AND" => Token::And,
            "OR" => Token::Or,
            "NOT" => Token::Not,
            "REQ" => Token::Req,
            _ => Token::Word(word),
        }
    }

    fn read_phrase(&mut self) -> Result<Token> {
        let start = self.position.saturating_sub(1);
        let mut content = String::new();
        while let Some(ch) = self.current_char() {
            self.advance();
            match ch {
                '"' => return Ok(Token::Phrase(content)),
                '\\' => {
                    if let Some(escaped) = self.current_char() {
                        content.push(escaped);
                        self.advance();
                    }
                }
                _ => content.push(ch),
            }
        }
        Err(SegdexError::parse(start, "unterminated phrase"))
    }

    fn read_float(&mut self) -> Option<f32> {
        let mut num_str = String::new();
        let mut has_dot = false;

        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() {
                num_str.push(ch);
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                num_str.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        num_str.parse().ok()
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        while self.current_char().map_or(false, char::is_whitespace) {
            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    fn word(s: &str) -> Token {
        Token::Word(s.to_string())
    }

    #[test]
    fn test_field_value() {
        assert_eq!(tokens("title:rust"), vec![word("title"), Token::Colon, word("rust"), Token::Eof]);
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            tokens("a AND b && c OR d || e NOT f !g -h REQ i +j"),
            vec![
                word("a"),
                Token::And,
                word("b"),
                Token::And,
                word("c"),
                Token::Or,
                word("d"),
                Token::Or,
                word("e"),
                Token::Not,
                word("f"),
                Token::Not,
                word("g"),
                Token::Not,
                word("h"),
                Token::Req,
                word("i"),
                Token::Req,
                word("j"),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_lowercase_keywords_are_words() {
        assert_eq!(tokens("cats and dogs"), vec![word("cats"), word("and"), word("dogs"), Token::Eof]);
    }

    #[test]
    fn test_field_list_and_wildcards() {
        assert_eq!(
            tokens("f1|f2:a?d*"),
            vec![word("f1"), Token::Pipe, word("f2"), Token::Colon, word("a?d*"), Token::Eof]
        );
        assert_eq!(tokens("*:x"), vec![word("*"), Token::Colon, word("x"), Token::Eof]);
    }

    #[test]
    fn test_modifiers() {
        assert_eq!(tokens("abc~"), vec![word("abc"), Token::Tilde(None), Token::Eof]);
        assert_eq!(tokens("abc~0.7"), vec![word("abc"), Token::Tilde(Some(0.7)), Token::Eof]);
        assert_eq!(tokens("abc^2.5"), vec![word("abc"), Token::Caret(Some(2.5)), Token::Eof]);
    }

    #[test]
    fn test_ranges() {
        assert_eq!(
            tokens("[a b} <=c >d"),
            vec![
                Token::LeftBracket,
                word("a"),
                word("b"),
                Token::RightBrace,
                Token::LtEq,
                word("c"),
                Token::Gt,
                word("d"),
                Token::Eof,
            ]
        );
        assert_eq!(tokens("[a>"), vec![Token::LeftBracket, word("a"), Token::Gt, Token::Eof]);
    }

    #[test]
    fn test_phrase_keeps_raw_content() {
        assert_eq!(
            tokens("\"one <> two|three\"~2"),
            vec![
                Token::Phrase("one <> two|three".to_string()),
                Token::Tilde(Some(2.0)),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_escapes() {
        assert_eq!(tokens("a\\:b"), vec![word("a:b"), Token::Eof]);
        assert_eq!(tokens("\"say \\\"hi\\\"\""), vec![Token::Phrase("say \"hi\"".to_string()), Token::Eof]);
    }

    #[test]
    fn test_hyphen_inside_word() {
        assert_eq!(tokens("e-mail"), vec![word("e-mail"), Token::Eof]);
    }

    #[test]
    fn test_positions() {
        let spanned = Lexer::new("ab  :cd").tokenize().unwrap();
        let positions: Vec<usize> = spanned.iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![0, 4, 5, 7]);
    }

    #[test]
    fn test_errors() {
        let err = Lexer::new("ab \"open").tokenize().unwrap_err();
        assert!(matches!(err, SegdexError::QueryParse { position: 3, .. }));
        assert!(Lexer::new("a & b").tokenize().is_err());
    }
}
