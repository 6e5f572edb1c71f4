//! Built-in expression provider.
//!
//! Covers the key and filter shapes that indexed dBASE tables use most:
//!
//! - a single numeric, float or date field (`AMOUNT`, `BORN`)
//! - character keys built from fields joined with `+`, optionally wrapped in
//!   `UPPER()`, with `DTOS()` turning a date field into `CCYYMMDD` text
//! - filters made of `FIELD op literal` comparisons, `DELETED()`, bare
//!   logical fields and `.T.`/`.F.`, each optionally prefixed by `.NOT.`,
//!   joined left to right by `.AND.` / `.OR.`

use super::{ExpressionProvider, FilterExpression, KeyExpression, KeyType, KeyValue, RecordView};
use crate::error::{XbError, XbResult};
use crate::schema::{field_no, FieldDesc, FieldType};
use std::cmp::Ordering;

/// Expression provider for field-based keys and simple filters.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleExpressions;

impl SimpleExpressions {
    /// Creates the provider.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ExpressionProvider for SimpleExpressions {
    fn compile_key(&self, source: &str, fields: &[FieldDesc]) -> XbResult<Box<dyn KeyExpression>> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            source,
            tokens: &tokens,
            pos: 0,
            fields,
        };
        let parts = parser.concat()?;
        parser.expect_end()?;

        let kind = match parts.as_slice() {
            [Part::Field(no)] if fields[*no].field_type.is_numeric() => KeyKind::Numeric(*no),
            [Part::Field(no)] if fields[*no].field_type == FieldType::Date => KeyKind::Date(*no),
            _ => {
                let len = char_len(source, &parts, fields)?;
                KeyKind::Char { parts, len }
            }
        };

        Ok(Box::new(SimpleKey {
            source: source.trim().to_string(),
            kind,
        }))
    }

    fn compile_filter(
        &self,
        source: &str,
        fields: &[FieldDesc],
    ) -> XbResult<Box<dyn FilterExpression>> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            source,
            tokens: &tokens,
            pos: 0,
            fields,
        };
        let first = parser.clause()?;
        let mut rest = Vec::new();
        while let Some(tok) = parser.peek() {
            let join = match tok {
                Token::And => Join::And,
                Token::Or => Join::Or,
                _ => return Err(XbError::parse(source, "expected .AND. or .OR.")),
            };
            parser.pos += 1;
            rest.push((join, parser.clause()?));
        }

        Ok(Box::new(SimpleFilter {
            source: source.trim().to_string(),
            first,
            rest,
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    LParen,
    RParen,
    Plus,
    Op(CmpOp),
    And,
    Or,
    Not,
    True,
    False,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn holds(self, ord: Ordering) -> bool {
        match self {
            Self::Eq => ord == Ordering::Equal,
            Self::Ne => ord != Ordering::Equal,
            Self::Lt => ord == Ordering::Less,
            Self::Le => ord != Ordering::Greater,
            Self::Gt => ord == Ordering::Greater,
            Self::Ge => ord != Ordering::Less,
        }
    }
}

fn tokenize(source: &str) -> XbResult<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '\'' | '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&q| q == c)
                    .ok_or_else(|| XbError::parse(source, "unbalanced quotes"))?;
                tokens.push(Token::Str(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            '=' => {
                i += if chars.get(i + 1) == Some(&'=') { 2 } else { 1 };
                tokens.push(Token::Op(CmpOp::Eq));
            }
            '#' => {
                tokens.push(Token::Op(CmpOp::Ne));
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(CmpOp::Ne));
                i += 2;
            }
            '<' => match chars.get(i + 1) {
                Some('=') => {
                    tokens.push(Token::Op(CmpOp::Le));
                    i += 2;
                }
                Some('>') => {
                    tokens.push(Token::Op(CmpOp::Ne));
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Op(CmpOp::Lt));
                    i += 1;
                }
            },
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(CmpOp::Ge));
                    i += 2;
                } else {
                    tokens.push(Token::Op(CmpOp::Gt));
                    i += 1;
                }
            }
            '.' if chars.get(i + 1).is_some_and(|n| n.is_ascii_alphabetic()) => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&d| d == '.')
                    .ok_or_else(|| XbError::parse(source, "unterminated dotted operator"))?;
                let word: String = chars[i + 1..i + 1 + end].iter().collect();
                tokens.push(match word.to_ascii_uppercase().as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    "T" | "Y" => Token::True,
                    "F" | "N" => Token::False,
                    other => {
                        return Err(XbError::parse(source, format!("unknown operator .{other}.")))
                    }
                });
                i += end + 2;
            }
            c if c.is_ascii_digit() || c == '.' || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit() || *n == '.')) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| XbError::parse(source, format!("bad number '{text}'")))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(XbError::parse(source, format!("unexpected '{other}'"))),
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone)]
enum Part {
    Field(usize),
    Dtos(usize),
    Upper(Vec<Part>),
}

#[derive(Debug)]
enum KeyKind {
    Numeric(usize),
    Date(usize),
    Char { parts: Vec<Part>, len: usize },
}

#[derive(Debug)]
struct SimpleKey {
    source: String,
    kind: KeyKind,
}

fn char_len(source: &str, parts: &[Part], fields: &[FieldDesc]) -> XbResult<usize> {
    let mut len = 0;
    for part in parts {
        len += match part {
            Part::Field(no) => {
                let f = &fields[*no];
                if f.field_type != FieldType::Char && f.field_type != FieldType::Logical {
                    return Err(XbError::invalid_expression(
                        source,
                        format!("field {} cannot be concatenated", f.name),
                    ));
                }
                f.len
            }
            Part::Dtos(_) => 8,
            Part::Upper(inner) => char_len(source, inner, fields)?,
        };
    }
    Ok(len)
}

fn render(parts: &[Part], record: &RecordView<'_>, out: &mut String) -> XbResult<()> {
    for part in parts {
        match part {
            Part::Field(no) => out.push_str(&record.text(*no)?),
            Part::Dtos(no) => out.push_str(&record.text(*no)?),
            Part::Upper(inner) => {
                let mut text = String::new();
                render(inner, record, &mut text)?;
                out.push_str(&text.to_uppercase());
            }
        }
    }
    Ok(())
}

impl KeyExpression for SimpleKey {
    fn source(&self) -> &str {
        &self.source
    }

    fn key_type(&self) -> KeyType {
        match self.kind {
            KeyKind::Numeric(_) => KeyType::Numeric,
            KeyKind::Date(_) => KeyType::Date,
            KeyKind::Char { .. } => KeyType::Char,
        }
    }

    fn key_len(&self) -> usize {
        match &self.kind {
            KeyKind::Numeric(_) | KeyKind::Date(_) => 8,
            KeyKind::Char { len, .. } => *len,
        }
    }

    fn evaluate(&self, record: &RecordView<'_>) -> XbResult<KeyValue> {
        match &self.kind {
            KeyKind::Numeric(no) => Ok(KeyValue::Numeric(record.number(*no)?)),
            KeyKind::Date(no) => Ok(KeyValue::Date(record.julian(*no)?)),
            KeyKind::Char { parts, .. } => {
                let mut text = String::new();
                render(parts, record, &mut text)?;
                Ok(KeyValue::Char(text))
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Join {
    And,
    Or,
}

#[derive(Debug)]
enum Literal {
    Text(String),
    Number(f64),
    Bool(bool),
}

#[derive(Debug)]
enum Atom {
    Deleted,
    Const(bool),
    Flag(usize),
    Compare { field: usize, op: CmpOp, value: Literal },
}

#[derive(Debug)]
struct Clause {
    negate: bool,
    atom: Atom,
}

#[derive(Debug)]
struct SimpleFilter {
    source: String,
    first: Clause,
    rest: Vec<(Join, Clause)>,
}

fn logical_value(raw: &[u8]) -> bool {
    matches!(raw.first(), Some(b'T' | b't' | b'Y' | b'y'))
}

impl Clause {
    fn eval(&self, record: &RecordView<'_>) -> XbResult<bool> {
        let value = match &self.atom {
            Atom::Deleted => record.is_deleted(),
            Atom::Const(b) => *b,
            Atom::Flag(no) => logical_value(record.raw(*no)?),
            Atom::Compare { field, op, value } => {
                let ord = match value {
                    Literal::Number(n) => {
                        let lhs = if record.fields()[*field].field_type == FieldType::Date {
                            record.julian(*field)?
                        } else {
                            record.number(*field)?
                        };
                        lhs.partial_cmp(n).unwrap_or(Ordering::Equal)
                    }
                    Literal::Text(s) => {
                        let text = record.text(*field)?;
                        text.trim_end().cmp(s.trim_end())
                    }
                    Literal::Bool(b) => logical_value(record.raw(*field)?).cmp(b),
                };
                op.holds(ord)
            }
        };
        Ok(value != self.negate)
    }
}

impl FilterExpression for SimpleFilter {
    fn source(&self) -> &str {
        &self.source
    }

    fn matches(&self, record: &RecordView<'_>) -> XbResult<bool> {
        let mut acc = self.first.eval(record)?;
        for (join, clause) in &self.rest {
            acc = match join {
                Join::And => acc && clause.eval(record)?,
                Join::Or => acc || clause.eval(record)?,
            };
        }
        Ok(acc)
    }
}

struct Parser<'a> {
    source: &'a str,
    tokens: &'a [Token],
    pos: usize,
    fields: &'a [FieldDesc],
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> XbResult<Token> {
        let tok = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| XbError::parse(self.source, "unexpected end of expression"))?;
        self.pos += 1;
        Ok(tok)
    }

    fn expect(&mut self, want: &Token) -> XbResult<()> {
        let got = self.next()?;
        if &got == want {
            Ok(())
        } else {
            Err(XbError::parse(self.source, format!("expected {want:?}, found {got:?}")))
        }
    }

    fn expect_end(&self) -> XbResult<()> {
        match self.peek() {
            None => Ok(()),
            Some(tok) => Err(XbError::parse(self.source, format!("unexpected {tok:?}"))),
        }
    }

    fn field(&self, name: &str) -> XbResult<usize> {
        field_no(self.fields, name).map_err(|_| {
            XbError::invalid_expression(self.source, format!("unknown field {name}"))
        })
    }

    fn concat(&mut self) -> XbResult<Vec<Part>> {
        let mut parts = vec![self.term()?];
        while self.peek() == Some(&Token::Plus) {
            self.pos += 1;
            parts.push(self.term()?);
        }
        Ok(parts)
    }

    fn term(&mut self) -> XbResult<Part> {
        match self.next()? {
            Token::Ident(name) if self.peek() == Some(&Token::LParen) => {
                self.pos += 1;
                let part = match name.to_ascii_uppercase().as_str() {
                    "UPPER" => Part::Upper(self.concat()?),
                    "DTOS" => match self.next()? {
                        Token::Ident(field) => {
                            let no = self.field(&field)?;
                            if self.fields[no].field_type != FieldType::Date {
                                return Err(XbError::invalid_expression(
                                    self.source,
                                    "DTOS() needs a date field",
                                ));
                            }
                            Part::Dtos(no)
                        }
                        other => {
                            return Err(XbError::parse(self.source, format!("unexpected {other:?}")))
                        }
                    },
                    other => {
                        return Err(XbError::invalid_expression(
                            self.source,
                            format!("unsupported function {other}()"),
                        ))
                    }
                };
                self.expect(&Token::RParen)?;
                Ok(part)
            }
            Token::Ident(name) => Ok(Part::Field(self.field(&name)?)),
            other => Err(XbError::parse(self.source, format!("unexpected {other:?}"))),
        }
    }

    fn clause(&mut self) -> XbResult<Clause> {
        let mut negate = false;
        while self.peek() == Some(&Token::Not) {
            self.pos += 1;
            negate = !negate;
        }
        let atom = match self.next()? {
            Token::True => Atom::Const(true),
            Token::False => Atom::Const(false),
            Token::Ident(name) if name.eq_ignore_ascii_case("DELETED") => {
                self.expect(&Token::LParen)?;
                self.expect(&Token::RParen)?;
                Atom::Deleted
            }
            Token::Ident(name) => {
                let field = self.field(&name)?;
                match self.peek() {
                    Some(Token::Op(op)) => {
                        let op = *op;
                        self.pos += 1;
                        let value = match self.next()? {
                            Token::Str(s) => Literal::Text(s),
                            Token::Num(n) => Literal::Number(n),
                            Token::True => Literal::Bool(true),
                            Token::False => Literal::Bool(false),
                            other => {
                                return Err(XbError::parse(
                                    self.source,
                                    format!("expected a literal, found {other:?}"),
                                ))
                            }
                        };
                        Atom::Compare { field, op, value }
                    }
                    _ if self.fields[field].field_type == FieldType::Logical => Atom::Flag(field),
                    _ => {
                        return Err(XbError::invalid_expression(
                            self.source,
                            format!("field {name} is not logical"),
                        ))
                    }
                }
            }
            other => return Err(XbError::parse(self.source, format!("unexpected {other:?}"))),
        };
        Ok(Clause { negate, atom })
    }
}
