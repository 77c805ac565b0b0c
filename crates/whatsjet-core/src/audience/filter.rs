//! Contact filter expressions
//!
//! Grammar:
//!
//! ```text
//! expr    := and ("OR" and)*
//! and     := primary ("AND" primary)*
//! primary := "(" expr ")" | field op value
//! op      := "=" | "!=" | "~" | "^"
//! value   := bare-word | "quoted string"
//! ```
//!
//! Keywords and field names are case-insensitive; all comparisons ignore
//! case. For `tag`, `=` and `!=` test membership while `~` and `^` match
//! any tag.
//!
//! Parenthesis nesting is capped at [`MAX_DEPTH`] and the number of
//! clauses at [`MAX_CLAUSES`]; longer filters are rejected.

use whatsjet_common::{Error, Result};
use whatsjet_storage::models::Contact;

/// Deepest parenthesis nesting a filter may use
pub const MAX_DEPTH: usize = 32;

/// Most clauses a single filter may contain
pub const MAX_CLAUSES: usize = 256;

/// Contact field a clause tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    PhoneNumber,
    FirstName,
    LastName,
    Email,
    Company,
    Tag,
}

impl Field {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "phone_number" | "phone" => Some(Field::PhoneNumber),
            "first_name" => Some(Field::FirstName),
            "last_name" => Some(Field::LastName),
            "email" => Some(Field::Email),
            "company" => Some(Field::Company),
            "tag" | "tags" => Some(Field::Tag),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Contains,
    StartsWith,
}

/// Parsed filter expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterExpr {
    Clause { field: Field, op: Op, value: String },
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
}

impl FilterExpr {
    pub fn parse(input: &str) -> Result<Self> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(Error::AudienceResolution("Empty filter".to_string()));
        }

        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
            clauses: 0,
        };
        let expr = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(Error::AudienceResolution(format!(
                "Unexpected {} after end of expression",
                token.describe()
            )));
        }
        Ok(expr)
    }

    pub fn matches(&self, contact: &Contact) -> bool {
        match self {
            FilterExpr::And(a, b) => a.matches(contact) && b.matches(contact),
            FilterExpr::Or(a, b) => a.matches(contact) || b.matches(contact),
            FilterExpr::Clause { field, op, value } => clause_matches(contact, *field, *op, value),
        }
    }
}

fn clause_matches(contact: &Contact, field: Field, op: Op, value: &str) -> bool {
    let needle = value.to_lowercase();

    if field == Field::Tag {
        let mut tags = contact.tags.iter().map(|t| t.to_lowercase());
        return match op {
            Op::Eq => tags.any(|t| t == needle),
            Op::Ne => !tags.any(|t| t == needle),
            Op::Contains => tags.any(|t| t.contains(&needle)),
            Op::StartsWith => tags.any(|t| t.starts_with(&needle)),
        };
    }

    let actual = match field {
        Field::PhoneNumber => Some(contact.phone_number.as_str()),
        Field::FirstName => Some(contact.first_name.as_str()),
        Field::LastName => contact.last_name.as_deref(),
        Field::Email => contact.email.as_deref(),
        Field::Company => contact.company.as_deref(),
        Field::Tag => None,
    }
    .map(str::to_lowercase);

    match (op, actual) {
        (Op::Eq, Some(a)) => a == needle,
        (Op::Ne, Some(a)) => a != needle,
        (Op::Ne, None) => true,
        (Op::Contains, Some(a)) => a.contains(&needle),
        (Op::StartsWith, Some(a)) => a.starts_with(&needle),
        (_, None) => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Quoted(String),
    Op(Op),
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Word(w) => format!("'{}'", w),
            Token::Quoted(q) => format!("\"{}\"", q),
            Token::Op(op) => format!("operator {:?}", op),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(keyword))
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Op(Op::Eq));
            }
            '~' => {
                chars.next();
                tokens.push(Token::Op(Op::Contains));
            }
            '^' => {
                chars.next();
                tokens.push(Token::Op(Op::StartsWith));
            }
            '!' => {
                chars.next();
                if chars.next_if_eq(&'=').is_none() {
                    return Err(Error::AudienceResolution(
                        "Expected '=' after '!'".to_string(),
                    ));
                }
                tokens.push(Token::Op(Op::Ne));
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some(escaped) => value.push(escaped),
                            None => break,
                        },
                        Some('"') => {
                            tokens.push(Token::Quoted(value));
                            break;
                        }
                        Some(other) => value.push(other),
                        None => {
                            return Err(Error::AudienceResolution(
                                "Unterminated string".to_string(),
                            ))
                        }
                    }
                }
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || "()=~^!\"".contains(c) {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    clauses: usize,
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

    fn parse_or(&mut self) -> Result<FilterExpr> {
        let mut left = self.parse_and()?;
        while self.peek().map(|t| t.is_keyword("OR")).unwrap_or(false) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = FilterExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<FilterExpr> {
        let mut left = self.parse_primary()?;
        while self.peek().map(|t| t.is_keyword("AND")).unwrap_or(false) {
            self.pos += 1;
            let right = self.parse_primary()?;
            left = FilterExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<FilterExpr> {
        match self.next() {
            Some(Token::LParen) => {
                self.depth += 1;
                if self.depth > MAX_DEPTH {
                    return Err(Error::AudienceResolution(format!(
                        "Filter nests deeper than {} levels",
                        MAX_DEPTH
                    )));
                }
                let inner = self.parse_or()?;
                self.depth -= 1;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(Error::AudienceResolution("Missing ')'".to_string())),
                }
            }
            Some(Token::Word(name)) => {
                self.clauses += 1;
                if self.clauses > MAX_CLAUSES {
                    return Err(Error::AudienceResolution(format!(
                        "Filter has more than {} clauses",
                        MAX_CLAUSES
                    )));
                }
                let field = Field::parse(&name).ok_or_else(|| {
                    Error::AudienceResolution(format!("Unknown field '{}'", name))
                })?;
                let op = match self.next() {
                    Some(Token::Op(op)) => op,
                    other => {
                        return Err(Error::AudienceResolution(format!(
                            "Expected operator after '{}', found {}",
                            name,
                            other.map(|t| t.describe()).unwrap_or_else(|| "end".into())
                        )))
                    }
                };
                let value = match self.next() {
                    Some(Token::Word(v)) | Some(Token::Quoted(v)) => v,
                    other => {
                        return Err(Error::AudienceResolution(format!(
                            "Expected value for '{}', found {}",
                            name,
                            other.map(|t| t.describe()).unwrap_or_else(|| "end".into())
                        )))
                    }
                };
                Ok(FilterExpr::Clause { field, op, value })
            }
            Some(other) => Err(Error::AudienceResolution(format!(
                "Unexpected {}",
                other.describe()
            ))),
            None => Err(Error::AudienceResolution(
                "Unexpected end of filter".to_string(),
            )),
        }
    }
}
