use super::token::{Token, TokenKind};

/// Characters that never belong to bare text
const RESERVED: &[char] = &[
    '"', '(', ')', '.', ':', '=', '<', '>', '!', '~', ',', '*', '/', '+', '\\', '-',
];

/// Characters that may follow a backslash in bare text
const ESCAPABLE: &[char] = &[',', ':', '=', '<', '>', '+', '~', '"', '\\', '.', '*'];

pub(crate) fn is_escapable(c: char) -> bool {
    ESCAPABLE.contains(&c)
}

pub(crate) fn is_text_start(c: char) -> bool {
    !c.is_whitespace() && !c.is_control() && !RESERVED.contains(&c)
}

pub(crate) fn is_text_char(c: char) -> bool {
    c == '-' || is_text_start(c)
}

/// Splits filter text into tokens, one `next_token` at a time.
///
/// Never fails: input that cannot be classified comes out as a
/// [`TokenKind::Invalid`] token and the parser decides what to do with it.
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Lexer<'a> {
        Lexer {
            src,
            pos: 0,
            finished: false,
        }
    }

    /// Returns the next token; once the input is exhausted every call returns `Eof`.
    pub fn next_token(&mut self) -> Token<'a> {
        self.skip_whitespace();

        let start = self.pos;
        let Some(c) = self.peek() else {
            return Token::new(TokenKind::Eof, "", start);
        };

        let kind = match c {
            '(' => self.single(TokenKind::LParen),
            ')' => self.single(TokenKind::RParen),
            '.' => self.single(TokenKind::Dot),
            ':' => self.single(TokenKind::Colon),
            '-' => self.single(TokenKind::Minus),
            '=' => {
                self.pos += 1;
                if self.eat('~') {
                    TokenKind::Matches
                } else {
                    TokenKind::Equals
                }
            }
            '!' => {
                self.pos += 1;
                if self.eat('=') {
                    TokenKind::NotEquals
                } else if self.eat('~') {
                    TokenKind::NotMatches
                } else {
                    TokenKind::Invalid
                }
            }
            '<' => {
                self.pos += 1;
                if self.eat('=') {
                    TokenKind::LessOrEqual
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                self.pos += 1;
                if self.eat('=') {
                    TokenKind::GreaterOrEqual
                } else {
                    TokenKind::Greater
                }
            }
            '"' => self.scan_string(),
            c if c == '\\' || is_text_start(c) => self.scan_text(start),
            c => {
                self.pos += c.len_utf8();
                TokenKind::Invalid
            }
        };

        let token = Token::new(kind, &self.src[start..self.pos], start);
        log::trace!("token {:?} {:?} at {}", token.kind, token.literal, token.position);
        token
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 1;
        kind
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn scan_string(&mut self) -> TokenKind {
        self.pos += 1;
        loop {
            match self.peek() {
                None => return TokenKind::Invalid,
                Some('"') => {
                    self.pos += 1;
                    return TokenKind::String;
                }
                Some('\\') => {
                    self.pos += 1;
                    if let Some(escaped) = self.peek() {
                        self.pos += escaped.len_utf8();
                    }
                }
                Some(c) => self.pos += c.len_utf8(),
            }
        }
    }

    fn scan_text(&mut self, start: usize) -> TokenKind {
        while let Some(c) = self.peek() {
            if c == '\\' {
                match self.src[self.pos + 1..].chars().next() {
                    // dangling backslash at the end of the input
                    None => self.pos += 1,
                    Some(escaped) if is_escapable(escaped) => self.pos += 1 + escaped.len_utf8(),
                    Some(escaped) => {
                        self.pos += 1 + escaped.len_utf8();
                        return TokenKind::Invalid;
                    }
                }
            } else if is_text_char(c) {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }

        match &self.src[start..self.pos] {
            "AND" => TokenKind::And,
            "OR" => TokenKind::Or,
            "NOT" => TokenKind::Not,
            _ => TokenKind::Text,
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    /// Yields every token up to and including `Eof`.
    fn next(&mut self) -> Option<Token<'a>> {
        if self.finished {
            return None;
        }
        let token = self.next_token();
        if token.kind == TokenKind::Eof {
            self.finished = true;
        }
        Some(token)
    }
}

pub fn tokenize(src: &str) -> Vec<Token<'_>> {
    Lexer::new(src).collect()
}
