use super::error::FilterError;
use super::escape::{quote, unescape_text, unquote};
use super::lexer::{is_escapable, is_text_char, is_text_start};
use std::fmt;

/// A dotted field path, e.g. `jsonPayload.foo.bar`.
///
/// Segments hold logical (unescaped) values; how a segment was spelled in the
/// filter text is not kept.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Member {
    segments: Vec<String>,
}

impl Member {
    /// Builds a member from its segments, `None` when there are none.
    pub fn from_segments<I, S>(segments: I) -> Option<Member>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            None
        } else {
            Some(Member { segments })
        }
    }

    pub(crate) fn single(segment: String) -> Member {
        Member {
            segments: vec![segment],
        }
    }

    pub(crate) fn push(&mut self, segment: String) {
        self.segments.push(segment);
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn root(&self) -> &str {
        &self.segments[0]
    }
}

/// A segment renders bare when the lexer would read it back as one TEXT token.
fn is_plain_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if matches!(segment, "AND" | "OR" | "NOT") {
        return false;
    }
    (is_text_start(first) || is_escapable(first))
        && chars.all(|c| is_text_char(c) || is_escapable(c))
}

fn write_segment(f: &mut fmt::Formatter<'_>, segment: &str) -> fmt::Result {
    if !is_plain_segment(segment) {
        return f.write_str(&quote(segment));
    }
    for c in segment.chars() {
        if is_escapable(c) {
            write!(f, "\\{c}")?;
        } else {
            write!(f, "{c}")?;
        }
    }
    Ok(())
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write_segment(f, segment)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    Has,
    Equals,
    NotEquals,
    Matches,
    NotMatches,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Has => ":",
            Operator::Equals => "=",
            Operator::NotEquals => "!=",
            Operator::Matches => "=~",
            Operator::NotMatches => "!~",
            Operator::Less => "<",
            Operator::LessOrEqual => "<=",
            Operator::Greater => ">",
            Operator::GreaterOrEqual => ">=",
        }
    }

    /// Numeric comparisons parse but cannot be lowered.
    pub fn is_implemented(self) -> bool {
        !matches!(
            self,
            Operator::Less | Operator::LessOrEqual | Operator::Greater | Operator::GreaterOrEqual
        )
    }

    pub fn is_regex(self) -> bool {
        matches!(self, Operator::Matches | Operator::NotMatches)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Right-hand side of a comparison, as written (without surrounding quotes).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Value {
    raw: String,
    quoted: bool,
}

impl Value {
    /// A bare value. A backslash left dangling at the end of the input is
    /// stored escaped, so the value still lexes as one token when more text follows it.
    pub fn bare(raw: impl Into<String>) -> Value {
        let mut raw = raw.into();
        if ends_with_dangling_backslash(&raw) {
            raw.push('\\');
        }
        Value { raw, quoted: false }
    }

    pub fn quoted(raw: impl Into<String>) -> Value {
        Value {
            raw: raw.into(),
            quoted: true,
        }
    }

    pub fn is_quoted(&self) -> bool {
        self.quoted
    }

    /// The value with its escapes resolved
    pub fn literal(&self) -> Result<String, FilterError> {
        if self.quoted {
            unquote(&self.raw)
        } else {
            unescape_text(&self.raw)
        }
    }

    /// The value exactly as written, handed to the regex engine untouched
    pub fn pattern(&self) -> &str {
        &self.raw
    }
}

fn ends_with_dangling_backslash(raw: &str) -> bool {
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' && chars.next().is_none() {
            return true;
        }
    }
    false
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.quoted {
            write!(f, "\"{}\"", self.raw)
        } else {
            f.write_str(&self.raw)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Comparison {
    pub operator: Operator,
    pub value: Value,
}

/// A single `member op value` leaf. Without a comparison it checks that the field exists.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Restriction {
    pub member: Member,
    pub comparison: Option<Comparison>,
}

impl Restriction {
    pub fn exists(member: Member) -> Restriction {
        Restriction {
            member,
            comparison: None,
        }
    }

    pub fn compare(member: Member, operator: Operator, value: Value) -> Restriction {
        Restriction {
            member,
            comparison: Some(Comparison { operator, value }),
        }
    }

    pub fn is_existence_check(&self) -> bool {
        self.comparison.is_none()
    }
}

impl fmt::Display for Restriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.comparison {
            None => write!(f, "{}", self.member),
            Some(Comparison { operator, value }) => {
                write!(f, "{} {} {}", self.member, operator, value)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Expression {
    Restriction(Restriction),
    Conjunction(Vec<Expression>),
    Disjunction(Vec<Expression>),
    Negation(Box<Expression>),
}

impl Expression {
    /// Collapses single-item conjunctions and disjunctions, recursively.
    ///
    /// Purely structural: nested nodes of the same kind stay nested and
    /// double negation stays. Applying it twice changes nothing.
    pub fn simplify(self) -> Expression {
        match self {
            Expression::Restriction(_) => self,
            Expression::Conjunction(items) => simplify_list(items, Expression::Conjunction),
            Expression::Disjunction(items) => simplify_list(items, Expression::Disjunction),
            Expression::Negation(inner) => Expression::Negation(Box::new(inner.simplify())),
        }
    }

    /// Items to continue a conjunction with, as the grammar's append step sees them.
    pub(crate) fn into_conjuncts(self) -> Vec<Expression> {
        match self {
            Expression::Conjunction(items) => items,
            other => vec![other.simplify()],
        }
    }

    pub(crate) fn into_disjuncts(self) -> Vec<Expression> {
        match self {
            Expression::Disjunction(items) => items,
            other => vec![other.simplify()],
        }
    }

    pub fn negate(self) -> Expression {
        Expression::Negation(Box::new(self))
    }

    fn is_composite(&self) -> bool {
        matches!(self, Expression::Conjunction(_) | Expression::Disjunction(_))
    }

    /// Every restriction in the tree, left to right
    pub fn restrictions(&self) -> Vec<&Restriction> {
        let mut out = Vec::new();
        self.collect_restrictions(&mut out);
        out
    }

    fn collect_restrictions<'a>(&'a self, out: &mut Vec<&'a Restriction>) {
        match self {
            Expression::Restriction(r) => out.push(r),
            Expression::Conjunction(items) | Expression::Disjunction(items) => {
                for item in items {
                    item.collect_restrictions(out);
                }
            }
            Expression::Negation(inner) => inner.collect_restrictions(out),
        }
    }
}

fn simplify_list(items: Vec<Expression>, rebuild: fn(Vec<Expression>) -> Expression) -> Expression {
    let mut items: Vec<Expression> = items.into_iter().map(Expression::simplify).collect();
    if items.len() == 1 {
        items.remove(0)
    } else {
        rebuild(items)
    }
}

/// Appends to a conjunction, splicing in the items of a nested conjunction.
pub(crate) fn append_conjunct(items: &mut Vec<Expression>, expr: Expression) {
    match expr {
        Expression::Conjunction(inner) => items.extend(inner),
        other => items.push(other.simplify()),
    }
}

pub(crate) fn append_disjunct(items: &mut Vec<Expression>, expr: Expression) {
    match expr {
        Expression::Disjunction(inner) => items.extend(inner),
        other => items.push(other.simplify()),
    }
}

impl From<Restriction> for Expression {
    fn from(restriction: Restriction) -> Self {
        Expression::Restriction(restriction)
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Expression], separator: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        if item.is_composite() {
            write!(f, "({item})")?;
        } else {
            write!(f, "{item}")?;
        }
    }
    Ok(())
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Restriction(r) => write!(f, "{r}"),
            Expression::Conjunction(items) => write_joined(f, items, " AND "),
            Expression::Disjunction(items) => write_joined(f, items, " OR "),
            Expression::Negation(inner) => match inner.as_ref() {
                Expression::Restriction(r) => write!(f, "NOT {r}"),
                other => write!(f, "NOT ({other})"),
            },
        }
    }
}
