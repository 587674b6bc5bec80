//! Filter expression grammar.
//!
//! ```text
//! expr       := or
//! or         := and ( "||" and )*
//! and        := unary ( "&&" unary )*
//! unary      := "!" unary | primary
//! primary    := "(" expr ")" | comparison
//! comparison := field op literal
//! op         := "==" | "!=" | "<" | "<=" | ">" | ">=" | "contains" | "~"
//! literal    := "double-quoted string" | integer | true | false
//! ```
//!
//! Expressions are parsed and type-checked once; evaluation is a tree walk
//! over a record and can never run anything else.

use crate::error::{ErrorKind, Result};
use crate::models::BookRecord;
use exn::ResultExt;
use regex::Regex;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Uid,
    Author,
    Title,
    Series,
    Genre,
    Lang,
    Del,
    Date,
    Librate,
    Ext,
    Folder,
    File,
    Serno,
    Size,
    Keywords,
}

impl Field {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "uid" => Self::Uid,
            "author" => Self::Author,
            "title" => Self::Title,
            "series" => Self::Series,
            "genre" => Self::Genre,
            "lang" => Self::Lang,
            "del" => Self::Del,
            "date" => Self::Date,
            "librate" => Self::Librate,
            "ext" => Self::Ext,
            "folder" => Self::Folder,
            "file" => Self::File,
            "serno" => Self::Serno,
            "size" => Self::Size,
            "keywords" => Self::Keywords,
            _ => return None,
        })
    }

    fn is_numeric(self) -> bool {
        matches!(self, Self::Del | Self::Librate | Self::Size)
    }

    fn text(self, book: &BookRecord) -> &str {
        match self {
            Self::Uid => &book.uid,
            Self::Author => &book.author,
            Self::Title => &book.title,
            Self::Series => &book.series,
            Self::Genre => &book.genre,
            Self::Lang => &book.lang,
            Self::Date => &book.date,
            Self::Ext => &book.ext,
            Self::Folder => &book.folder,
            Self::File => &book.file,
            Self::Serno => &book.serno,
            Self::Keywords => &book.keywords,
            Self::Del | Self::Librate | Self::Size => "",
        }
    }

    fn number(self, book: &BookRecord) -> i64 {
        match self {
            Self::Del => i64::from(book.del),
            Self::Librate => book.librate,
            Self::Size => i64::try_from(book.size).unwrap_or(i64::MAX),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    Matches,
}

impl Op {
    fn test(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering.is_eq(),
            Self::Ne => ordering.is_ne(),
            Self::Lt => ordering.is_lt(),
            Self::Le => ordering.is_le(),
            Self::Gt => ordering.is_gt(),
            Self::Ge => ordering.is_ge(),
            Self::Contains | Self::Matches => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Op(Op),
    And,
    Or,
    Not,
    Open,
    Close,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some((pos, c)) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '(' => Token::Open,
            ')' => Token::Close,
            '~' => Token::Op(Op::Matches),
            '&' if chars.next_if(|(_, n)| *n == '&').is_some() => Token::And,
            '|' if chars.next_if(|(_, n)| *n == '|').is_some() => Token::Or,
            '=' if chars.next_if(|(_, n)| *n == '=').is_some() => Token::Op(Op::Eq),
            '!' if chars.next_if(|(_, n)| *n == '=').is_some() => Token::Op(Op::Ne),
            '!' => Token::Not,
            '<' if chars.next_if(|(_, n)| *n == '=').is_some() => Token::Op(Op::Le),
            '<' => Token::Op(Op::Lt),
            '>' if chars.next_if(|(_, n)| *n == '=').is_some() => Token::Op(Op::Ge),
            '>' => Token::Op(Op::Gt),
            '"' => {
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some((_, '"')) => break,
                        Some((_, '\\')) => match chars.next() {
                            Some((_, escaped)) => value.push(escaped),
                            None => exn::bail!(ErrorKind::config("unterminated string in filter")),
                        },
                        Some((_, other)) => value.push(other),
                        None => exn::bail!(ErrorKind::config("unterminated string in filter")),
                    }
                }
                Token::Str(value)
            },
            c if c.is_ascii_digit() || c == '-' => {
                let mut digits = String::from(c);
                while let Some((_, d)) = chars.next_if(|(_, d)| d.is_ascii_digit()) {
                    digits.push(d);
                }
                let value = digits
                    .parse::<i64>()
                    .or_raise(|| ErrorKind::config(format!("invalid number in filter: {digits}")))?;
                Token::Int(value)
            },
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::from(c);
                while let Some((_, w)) = chars.next_if(|(_, w)| w.is_ascii_alphanumeric() || *w == '_') {
                    word.push(w);
                }
                match word.as_str() {
                    "contains" => Token::Op(Op::Contains),
                    _ => Token::Ident(word),
                }
            },
            other => exn::bail!(ErrorKind::config(format!("unexpected '{other}' at offset {pos} in filter"))),
        };
        tokens.push(token);
    }
    Ok(tokens)
}

#[derive(Debug, Clone)]
enum Literal {
    Text(String),
    Number(i64),
}

#[derive(Debug, Clone)]
enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Text { field: Field, op: Op, value: String },
    Number { field: Field, op: Op, value: i64 },
    Regex { field: Field, regex: Regex },
}

impl Expr {
    fn eval(&self, book: &BookRecord) -> bool {
        match self {
            Self::And(lhs, rhs) => lhs.eval(book) && rhs.eval(book),
            Self::Or(lhs, rhs) => lhs.eval(book) || rhs.eval(book),
            Self::Not(inner) => !inner.eval(book),
            Self::Text { field, op, value } => {
                let actual = field.text(book).to_lowercase();
                match op {
                    Op::Contains => actual.contains(value.as_str()),
                    _ => op.test(actual.as_str().cmp(value.as_str())),
                }
            },
            Self::Number { field, op, value } => op.test(field.number(book).cmp(value)),
            Self::Regex { field, regex } => regex.is_match(field.text(book)),
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn or(&mut self) -> Result<Expr> {
        let mut lhs = self.and()?;
        while self.eat(&Token::Or) {
            lhs = Expr::Or(Box::new(lhs), Box::new(self.and()?));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        while self.eat(&Token::And) {
            lhs = Expr::And(Box::new(lhs), Box::new(self.unary()?));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Not) {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        if self.eat(&Token::Open) {
            let inner = self.or()?;
            if !self.eat(&Token::Close) {
                exn::bail!(ErrorKind::config("missing ')' in filter"));
            }
            return Ok(inner);
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let field = match self.next() {
            Some(Token::Ident(name)) => {
                Field::parse(&name).ok_or_else(|| exn::Exn::from(ErrorKind::config(format!("unknown field: {name}"))))?
            },
            other => exn::bail!(ErrorKind::config(format!("expected a field name in filter, found {other:?}"))),
        };
        let Some(Token::Op(op)) = self.next() else {
            exn::bail!(ErrorKind::config(format!("expected an operator after {field:?}")));
        };
        let literal = match self.next() {
            Some(Token::Str(value)) => Literal::Text(value),
            Some(Token::Int(value)) => Literal::Number(value),
            Some(Token::Ident(word)) if word == "true" => Literal::Number(1),
            Some(Token::Ident(word)) if word == "false" => Literal::Number(0),
            other => exn::bail!(ErrorKind::config(format!("expected a literal in filter, found {other:?}"))),
        };
        match (field.is_numeric(), op, literal) {
            (false, Op::Matches, Literal::Text(pattern)) => {
                let regex = Regex::new(&pattern)
                    .or_raise(|| ErrorKind::config(format!("invalid regular expression: {pattern}")))?;
                Ok(Expr::Regex { field, regex })
            },
            (false, op, Literal::Text(value)) => Ok(Expr::Text {
                field,
                op,
                value: value.to_lowercase(),
            }),
            (true, Op::Contains | Op::Matches, _) => {
                exn::bail!(ErrorKind::config(format!("{op:?} cannot be applied to numeric field {field:?}")))
            },
            (true, op, Literal::Number(value)) => Ok(Expr::Number { field, op, value }),
            (_, _, literal) => exn::bail!(ErrorKind::config(format!("{field:?} cannot be compared with {literal:?}"))),
        }
    }
}

/// A compiled filter expression.
#[derive(Debug, Clone)]
pub struct Expression {
    root: Expr,
}

impl Expression {
    pub fn parse(input: &str) -> Result<Self> {
        let mut parser = Parser {
            tokens: tokenize(input)?,
            pos: 0,
        };
        let root = parser.or()?;
        if let Some(token) = parser.peek() {
            exn::bail!(ErrorKind::config(format!("unexpected {token:?} at end of filter")));
        }
        Ok(Self { root })
    }

    pub fn matches(&self, book: &BookRecord) -> bool {
        self.root.eval(book)
    }
}
