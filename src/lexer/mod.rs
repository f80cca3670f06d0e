use std::fmt;

use crate::lexer::cursor::Cursor;
use crate::symbol::{Span, SrcOffset};

pub mod cursor;

/// A token and its location in the source
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Token { kind, span }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TokenKind {
    /// Mnemonic, register, label or literal. Told apart by the parser.
    Word,
    /// Ends a label definition
    Colon,
    Comment,
    /// Also includes commas
    Whitespace,
    Newline,
    Unknown,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Word => "word",
            TokenKind::Colon => "colon",
            TokenKind::Comment => "comment",
            TokenKind::Whitespace => "whitespace",
            TokenKind::Newline => "end of line",
            TokenKind::Unknown => "unknown",
            TokenKind::Eof => "end of file",
        };
        f.write_str(name)
    }
}

/// Tokenize a whole source, ending with a single `Eof` token.
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut cursor = Cursor::new(input);
    let mut toks = Vec::new();
    loop {
        let token = cursor.advance_token();
        toks.push(token);
        if token.kind == TokenKind::Eof {
            break;
        }
    }
    toks
}

/// Test if a character is considered to be whitespace.
pub(crate) fn is_whitespace(c: char) -> bool {
    // Commas only separate operands
    matches!(c, ' ' | '\t' | '\r' | ',')
}

/// Test if a character can be part of a word.
pub(crate) fn is_word(c: char) -> bool {
    // `-` for negative literals
    matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-')
}

impl Cursor<'_> {
    pub fn advance_token(&mut self) -> Token {
        let start = self.token_start();
        let first_char = match self.bump() {
            Some(c) => c,
            None => return Token::new(TokenKind::Eof, Span::new(SrcOffset(start), 0)),
        };
        let token_kind = match first_char {
            ';' => {
                self.take_while(|c| c != '\n');
                TokenKind::Comment
            }
            '\n' => TokenKind::Newline,
            c if is_whitespace(c) => {
                self.take_while(is_whitespace);
                TokenKind::Whitespace
            }
            ':' => TokenKind::Colon,
            c if is_word(c) => {
                self.take_while(is_word);
                TokenKind::Word
            }
            _ => TokenKind::Unknown,
        };
        let res = Token::new(token_kind, Span::new(SrcOffset(start), self.pos_in_token()));
        self.reset_pos();
        res
    }
}
