//! Recursive-descent parser for filter expressions
//!
//! Precedence, loosest first: explicit `AND`, adjacency (also a conjunction),
//! `OR`, then prefix `NOT` / `-` on a single primitive.

use super::ast::{Expression, Member, Operator, Restriction, Value, append_conjunct, append_disjunct};
use super::error::FilterError;
use super::escape::{unescape_text, unquote};
use super::lexer::Lexer;
use super::token::{Token, TokenKind};

/// Parses filter text into a simplified expression.
pub fn parse(src: &str) -> Result<Expression, FilterError> {
    Parser::new(src)?.parse_filter()
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token<'a>,
}

/// Turns an INVALID token into the matching error.
fn check(token: Token<'_>) -> Result<Token<'_>, FilterError> {
    if token.kind != TokenKind::Invalid {
        return Ok(token);
    }
    if token.literal.starts_with('"') {
        Err(FilterError::syntax(
            format!("unterminated quoted string {}", token.literal),
            token.position,
        ))
    } else {
        Err(FilterError::Lex {
            token: token.literal.to_string(),
            position: token.position,
        })
    }
}

fn string_body<'a>(token: &Token<'a>) -> &'a str {
    &token.literal[1..token.literal.len() - 1]
}

/// Logical value of one member segment
fn segment(token: &Token<'_>) -> Result<String, FilterError> {
    match token.kind {
        TokenKind::String => unquote(string_body(token)),
        TokenKind::Text => unescape_text(token.literal),
        _ => Ok(token.literal.to_string()),
    }
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Result<Parser<'a>, FilterError> {
        let mut lexer = Lexer::new(src);
        let current = check(lexer.next_token())?;
        Ok(Parser { lexer, current })
    }

    /// Moves to the next token and returns the one just consumed.
    fn advance(&mut self) -> Result<Token<'a>, FilterError> {
        let next = check(self.lexer.next_token())?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn unexpected(&self, expected: &str) -> FilterError {
        let found = match self.current.kind {
            TokenKind::Eof => "end of filter".to_string(),
            _ => format!("'{}'", self.current.literal),
        };
        FilterError::syntax(format!("expected {expected}, found {found}"), self.current.position)
    }

    fn parse_filter(&mut self) -> Result<Expression, FilterError> {
        if self.current.kind == TokenKind::Eof {
            return Err(FilterError::syntax("empty filter", self.current.position));
        }
        let expr = self.parse_expression()?;
        if self.current.kind != TokenKind::Eof {
            return Err(self.unexpected("end of filter"));
        }
        Ok(expr.simplify())
    }

    fn parse_expression(&mut self) -> Result<Expression, FilterError> {
        let first = self.parse_sequence()?;
        if self.current.kind != TokenKind::And {
            return Ok(first);
        }

        let mut items = first.into_conjuncts();
        while self.current.kind == TokenKind::And {
            self.advance()?;
            let next = self.parse_sequence()?;
            append_conjunct(&mut items, next);
        }
        Ok(Expression::Conjunction(items))
    }

    fn parse_sequence(&mut self) -> Result<Expression, FilterError> {
        let first = self.parse_factor()?;
        if !self.current.kind.starts_term() {
            return Ok(first);
        }

        let mut items = first.into_conjuncts();
        while self.current.kind.starts_term() {
            let next = self.parse_factor()?;
            append_conjunct(&mut items, next);
        }
        Ok(Expression::Conjunction(items))
    }

    fn parse_factor(&mut self) -> Result<Expression, FilterError> {
        let first = self.parse_term()?;
        if self.current.kind != TokenKind::Or {
            return Ok(first);
        }

        let mut items = first.into_disjuncts();
        while self.current.kind == TokenKind::Or {
            self.advance()?;
            let next = self.parse_term()?;
            append_disjunct(&mut items, next);
        }
        Ok(Expression::Disjunction(items))
    }

    fn parse_term(&mut self) -> Result<Expression, FilterError> {
        match self.current.kind {
            TokenKind::Not | TokenKind::Minus => {
                self.advance()?;
                Ok(self.parse_primitive()?.negate())
            }
            _ => self.parse_primitive(),
        }
    }

    fn parse_primitive(&mut self) -> Result<Expression, FilterError> {
        match self.current.kind {
            TokenKind::LParen => {
                self.advance()?;
                let expr = self.parse_expression()?;
                if self.current.kind != TokenKind::RParen {
                    return Err(self.unexpected("')'"));
                }
                self.advance()?;
                Ok(expr.simplify())
            }
            TokenKind::Text | TokenKind::String => self.parse_restriction(),
            kind if kind.operator().is_some() => Err(FilterError::syntax(
                format!("operator '{}' without a field", self.current.literal),
                self.current.position,
            )),
            _ => Err(self.unexpected("a field or '('")),
        }
    }

    fn parse_restriction(&mut self) -> Result<Expression, FilterError> {
        let first = self.advance()?;
        let mut member = Member::single(segment(&first)?);
        let mut dotted = false;

        while self.current.kind == TokenKind::Dot {
            self.advance()?;
            match self.current.kind {
                TokenKind::Text | TokenKind::String => {}
                kind if kind.is_keyword() => {}
                _ => return Err(self.unexpected("a field name after '.'")),
            }
            let token = self.advance()?;
            member.push(segment(&token)?);
            dotted = true;
        }

        let Some(operator) = self.current.kind.operator() else {
            if first.kind == TokenKind::String && !dotted {
                return Err(FilterError::syntax(
                    format!("text search {} is not supported, expected a field", first.literal),
                    first.position,
                ));
            }
            return Ok(Restriction::exists(member).into());
        };

        let operator_token = self.advance()?;
        let value = self.parse_value(operator, &operator_token)?;
        Ok(Restriction::compare(member, operator, value).into())
    }

    fn parse_value(&mut self, operator: Operator, operator_token: &Token<'a>) -> Result<Value, FilterError> {
        let token = self.current;
        let value = match token.kind {
            TokenKind::String => {
                self.advance()?;
                Value::quoted(string_body(&token))
            }
            TokenKind::Text | TokenKind::And | TokenKind::Or | TokenKind::Not => {
                self.advance()?;
                Value::bare(token.literal)
            }
            TokenKind::Minus => {
                self.advance()?;
                let next = self.current;
                if next.kind != TokenKind::Text || next.position != token.end() {
                    return Err(FilterError::syntax("expected a value right after '-'", next.position));
                }
                self.advance()?;
                Value::bare(format!("-{}", next.literal))
            }
            _ => {
                return Err(self.unexpected(&format!("a value after '{}'", operator_token.literal)));
            }
        };

        if operator.is_regex() && !value.is_quoted() {
            return Err(FilterError::syntax(
                format!("regular expression after '{operator}' must be a quoted string"),
                token.position,
            ));
        }
        if !operator.is_regex() {
            value.literal()?;
        }
        if self.current.kind == TokenKind::Dot {
            return Err(self.unexpected("a comparator or the next term"));
        }

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exists(segments: &[&str]) -> Expression {
        Restriction::exists(Member::from_segments(segments.iter().copied()).unwrap()).into()
    }

    fn compare(field: &str, operator: Operator, value: Value) -> Expression {
        let member = Member::from_segments(field.split('.')).unwrap();
        Restriction::compare(member, operator, value).into()
    }

    #[test]
    fn test_parse_existence_check() {
        assert_eq!(parse("jsonPayload.foo").unwrap(), exists(&["jsonPayload", "foo"]));
        assert_eq!(parse("severity").unwrap(), exists(&["severity"]));
    }

    #[test]
    fn test_parse_comparison() {
        assert_eq!(
            parse(r#"severity = "hello""#).unwrap(),
            compare("severity", Operator::Equals, Value::quoted("hello"))
        );
        assert_eq!(
            parse("jsonPayload.b.c=~\"b.*c\"").unwrap(),
            compare("jsonPayload.b.c", Operator::Matches, Value::quoted("b.*c"))
        );
        assert_eq!(
            parse("jsonPayload.int_field:0").unwrap(),
            compare("jsonPayload.int_field", Operator::Has, Value::bare("0"))
        );
    }

    #[test]
    fn test_whitespace_is_insignificant() {
        assert_eq!(parse("foo=bar").unwrap(), parse("foo = bar").unwrap());
    }

    #[test]
    fn test_quoted_segments() {
        let expr = parse(r#""jsonPayload"."foo" = "bar""#).unwrap();
        assert_eq!(expr, compare("jsonPayload.foo", Operator::Equals, Value::quoted("bar")));

        let Expression::Restriction(r) = parse(r#"jsonPayload."bar.baz" = "hello""#).unwrap() else {
            panic!("expected a restriction");
        };
        assert_eq!(r.member.segments(), ["jsonPayload", "bar.baz"]);
    }

    #[test]
    fn test_keyword_after_dot_is_a_segment() {
        assert_eq!(parse("a.AND").unwrap(), exists(&["a", "AND"]));
    }

    #[test]
    fn test_keyword_values() {
        assert_eq!(
            parse("severity = AND").unwrap(),
            compare("severity", Operator::Equals, Value::bare("AND"))
        );
        assert_eq!(
            parse(r#"severity = "AND""#).unwrap(),
            compare("severity", Operator::Equals, Value::quoted("AND"))
        );
    }

    #[test]
    fn test_negative_value() {
        assert_eq!(
            parse("severity = -1").unwrap(),
            compare("severity", Operator::Equals, Value::bare("-1"))
        );
        assert!(matches!(parse("severity = - 1"), Err(FilterError::Syntax { .. })));
    }

    #[test]
    fn test_negation_forms() {
        let expected = compare("severity", Operator::Equals, Value::bare("1")).negate();
        assert_eq!(parse("-severity = 1").unwrap(), expected);
        assert_eq!(parse("NOT severity = 1").unwrap(), expected);
        assert_eq!(
            parse("NOT (NOT a)").unwrap(),
            exists(&["a"]).negate().negate()
        );
    }

    #[test]
    fn test_or_binds_tighter_than_adjacency() {
        let expr = parse("a OR b c").unwrap();
        assert_eq!(
            expr,
            Expression::Conjunction(vec![
                Expression::Disjunction(vec![exists(&["a"]), exists(&["b"])]),
                exists(&["c"]),
            ])
        );
    }

    #[test]
    fn test_and_and_adjacency_flatten() {
        let expr = parse("a = 1 b = 2 AND c = 3").unwrap();
        let Expression::Conjunction(items) = expr else {
            panic!("expected a conjunction");
        };
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn test_or_inside_and() {
        let expr = parse("a:0 OR b:0 AND c:0").unwrap();
        assert_eq!(
            expr,
            Expression::Conjunction(vec![
                Expression::Disjunction(vec![
                    compare("a", Operator::Has, Value::bare("0")),
                    compare("b", Operator::Has, Value::bare("0")),
                ]),
                compare("c", Operator::Has, Value::bare("0")),
            ])
        );
    }

    #[test]
    fn test_parenthesized_groups_splice() {
        let expr = parse("(a b) c").unwrap();
        assert_eq!(
            expr,
            Expression::Conjunction(vec![exists(&["a"]), exists(&["b"]), exists(&["c"])])
        );
        assert_eq!(parse("((a))").unwrap(), exists(&["a"]));
    }

    #[test]
    fn test_numeric_operators_parse() {
        assert_eq!(
            parse("a.b < 5").unwrap(),
            compare("a.b", Operator::Less, Value::bare("5"))
        );
        assert!(parse("a >= 5").is_ok());
    }

    #[test]
    fn test_rejects_text_search() {
        let err = parse(r#""missing operator""#).unwrap_err();
        assert!(matches!(err, FilterError::Syntax { position: 0, .. }));
    }

    #[test]
    fn test_rejects_invalid_characters() {
        let err = parse("invalid/characters*here").unwrap_err();
        match err {
            FilterError::Lex { token, position } => {
                assert_eq!(token, "/");
                assert_eq!(position, 7);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rejects_bare_regex() {
        assert!(matches!(
            parse("jsonPayload.foo =~ bareword"),
            Err(FilterError::Syntax { .. })
        ));
    }

    #[test]
    fn test_rejects_unicode_escape_in_text() {
        assert!(matches!(
            parse(r"json\u0050ayload.foo = bar"),
            Err(FilterError::Lex { .. })
        ));
        assert!(parse(r#""json\u0050ayload".foo = bar"#).is_ok());
    }

    #[test]
    fn test_rejects_unterminated_string() {
        let err = parse(r#"a = "open"#).unwrap_err();
        assert!(matches!(err, FilterError::Syntax { position: 4, .. }));
    }

    #[test]
    fn test_rejects_structural_errors() {
        for input in ["", "   ", "(a", "a)", "a =", "= foo", "a AND", "a OR", "NOT", "NOT NOT a", "a = b.c", "a.", "a..b"] {
            assert!(
                matches!(parse(input), Err(FilterError::Syntax { .. })),
                "expected a syntax error for {input:?}"
            );
        }
    }

    #[test]
    fn test_rejects_bad_escape_in_value() {
        assert!(matches!(
            parse(r#"a = "\d""#),
            Err(FilterError::InvalidEscape('d'))
        ));
        assert!(parse(r#"a =~ "\d""#).is_ok());
    }
}
