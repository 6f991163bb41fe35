use super::ast::Operator;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Text,
    String,
    And,
    Or,
    Not,
    Dot,
    Colon,
    LParen,
    RParen,
    Equals,
    NotEquals,
    Matches,
    NotMatches,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Minus,
    Eof,
    Invalid,
}

impl TokenKind {
    /// Comparator represented by this token, if any
    pub fn operator(self) -> Option<Operator> {
        match self {
            TokenKind::Colon => Some(Operator::Has),
            TokenKind::Equals => Some(Operator::Equals),
            TokenKind::NotEquals => Some(Operator::NotEquals),
            TokenKind::Matches => Some(Operator::Matches),
            TokenKind::NotMatches => Some(Operator::NotMatches),
            TokenKind::Less => Some(Operator::Less),
            TokenKind::LessOrEqual => Some(Operator::LessOrEqual),
            TokenKind::Greater => Some(Operator::Greater),
            TokenKind::GreaterOrEqual => Some(Operator::GreaterOrEqual),
            _ => None,
        }
    }

    pub fn is_keyword(self) -> bool {
        matches!(self, TokenKind::And | TokenKind::Or | TokenKind::Not)
    }

    /// Whether a token of this kind can begin a term of a sequence
    pub fn starts_term(self) -> bool {
        matches!(
            self,
            TokenKind::Text
                | TokenKind::String
                | TokenKind::Not
                | TokenKind::Minus
                | TokenKind::LParen
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub literal: &'a str,
    pub position: usize,
}

impl<'a> Token<'a> {
    pub(super) fn new(kind: TokenKind, literal: &'a str, position: usize) -> Token<'a> {
        Token {
            kind,
            literal,
            position,
        }
    }

    /// Position right after the last byte of this token
    pub fn end(&self) -> usize {
        self.position + self.literal.len()
    }
}
