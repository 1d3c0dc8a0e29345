//! Query Lexer
//!
//! Splits query text into tokens. The individual token shapes are small
//! `nom` parsers; the driver loop dispatches on the first character so that
//! failures can name exactly what went wrong.
//!
//! # Token Shapes
//!
//! ```text
//! keywords     SELECT FROM WHERE GROUP BY AND OR NOW AS LIMIT ORDER ASC DESC
//! identifiers  value  cpu_load  `cpu.load`
//! numbers      42  90.5
//! durations    30s  5m  1h  7d  2w
//! strings      'office'  "office"  'it''s'
//! operators    + - * / > >= < <= == = != <>
//! punctuation  ( ) , . ;
//! ```

use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace1, not_line_ending},
    combinator::{opt, recognize, value},
    multi::many0,
    sequence::pair,
    IResult,
};

use crate::query::ast::{DurationLiteral, DurationUnit};
use crate::query::error::{Position, QueryError, QueryResult};

/// Reserved words, matched case-insensitively
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Select,
    From,
    Where,
    Group,
    By,
    And,
    Or,
    Now,
    As,
    Limit,
    Order,
    Asc,
    Desc,
}

impl Keyword {
    /// Look up a bare word
    pub fn from_word(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "select" => Some(Self::Select),
            "from" => Some(Self::From),
            "where" => Some(Self::Where),
            "group" => Some(Self::Group),
            "by" => Some(Self::By),
            "and" => Some(Self::And),
            "or" => Some(Self::Or),
            "now" => Some(Self::Now),
            "as" => Some(Self::As),
            "limit" => Some(Self::Limit),
            "order" => Some(Self::Order),
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = match self {
            Self::Select => "SELECT",
            Self::From => "FROM",
            Self::Where => "WHERE",
            Self::Group => "GROUP",
            Self::By => "BY",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Now => "NOW",
            Self::As => "AS",
            Self::Limit => "LIMIT",
            Self::Order => "ORDER",
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        };
        f.write_str(word)
    }
}

/// Operator symbols
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Plus,
    Minus,
    Star,
    Slash,
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
}

/// Punctuation characters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
    LParen,
    RParen,
    Comma,
    Dot,
    Semicolon,
}

/// Token kinds, carrying decoded values where the raw text is not enough
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Keyword(Keyword),
    Identifier(String),
    QuotedIdentifier(String),
    Integer(i64),
    Float(f64),
    String(String),
    Duration(DurationLiteral),
    Operator(Symbol),
    Punctuation(Punct),
    /// End of input; always the last token
    Eof,
}

/// A lexed token
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw source text
    pub text: String,
    pub position: Position,
}

impl Token {
    /// How the token is named in error messages
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => "end of input".to_string(),
            _ => format!("'{}'", self.text),
        }
    }
}

/// Tracks line and column while the lexer moves forward
struct Cursor {
    offset: usize,
    line: usize,
    column: usize,
}

impl Cursor {
    fn new() -> Self {
        Self {
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    fn position(&self) -> Position {
        Position {
            offset: self.offset,
            line: self.line,
            column: self.column,
        }
    }

    fn advance(&mut self, consumed: &str) {
        for c in consumed.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.offset += consumed.len();
    }
}

/// Convert query text into a token stream terminated by [`TokenKind::Eof`]
pub fn tokenize(input: &str) -> QueryResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut cursor = Cursor::new();
    let mut rest = input;

    loop {
        let after_trivia = skip_trivia(rest);
        cursor.advance(&rest[..rest.len() - after_trivia.len()]);
        rest = after_trivia;

        if rest.is_empty() {
            tokens.push(Token {
                kind: TokenKind::Eof,
                text: String::new(),
                position: cursor.position(),
            });
            return Ok(tokens);
        }

        let position = cursor.position();
        let (remaining, kind) =
            lex_token(rest).map_err(|message| QueryError::lex(message, position))?;
        let text = &rest[..rest.len() - remaining.len()];
        tokens.push(Token {
            kind,
            text: text.to_string(),
            position,
        });
        cursor.advance(text);
        rest = remaining;
    }
}

/// Skip whitespace and `--` comments
fn skip_trivia(input: &str) -> &str {
    let trivia: IResult<&str, Vec<&str>> = many0(alt((
        multispace1,
        recognize(pair(tag("--"), not_line_ending)),
    )))(input);
    match trivia {
        Ok((rest, _)) => rest,
        Err(_) => input,
    }
}

/// Lex one token at the start of `input`
fn lex_token(input: &str) -> Result<(&str, TokenKind), String> {
    let first = match input.chars().next() {
        Some(c) => c,
        None => return Err("unexpected end of input".to_string()),
    };

    match first {
        '\'' | '"' => quoted(input, first)
            .map(|(rest, s)| (rest, TokenKind::String(s)))
            .ok_or_else(|| format!("unterminated string literal starting with {}", first)),
        '`' => quoted(input, '`')
            .map(|(rest, s)| (rest, TokenKind::QuotedIdentifier(s)))
            .ok_or_else(|| "unterminated quoted identifier".to_string()),
        c if c.is_ascii_digit() => lex_number(input),
        c if c.is_alphabetic() || c == '_' => {
            let (rest, word) = word(input).map_err(|_| format!("unexpected character '{}'", c))?;
            let kind = match Keyword::from_word(word) {
                Some(kw) => TokenKind::Keyword(kw),
                None => TokenKind::Identifier(word.to_string()),
            };
            Ok((rest, kind))
        }
        c => operator(input)
            .map(|(rest, op)| (rest, TokenKind::Operator(op)))
            .or_else(|_| punctuation(input).map(|(rest, p)| (rest, TokenKind::Punctuation(p))))
            .map_err(|_| format!("unexpected character '{}'", c)),
    }
}

/// Identifier or keyword
fn word(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))(input)
}

/// Integer, float, or duration literal
fn lex_number(input: &str) -> Result<(&str, TokenKind), String> {
    let number: IResult<&str, &str> = recognize(pair(digit1, opt(pair(char('.'), digit1))))(input);
    let (rest, text) = number.map_err(|_| "invalid numeric literal".to_string())?;

    if text.contains('.') {
        let value = text
            .parse::<f64>()
            .map_err(|e| format!("invalid float literal '{}': {}", text, e))?;
        return Ok((rest, TokenKind::Float(value)));
    }

    let magnitude = text
        .parse::<i64>()
        .map_err(|e| format!("invalid integer literal '{}': {}", text, e))?;

    // A duration unit must directly follow the digits and end the word
    match word(rest) {
        Ok((after, suffix)) => {
            let mut chars = suffix.chars();
            let unit = match (chars.next(), chars.next()) {
                (Some(c), None) => DurationUnit::from_suffix(c),
                _ => None,
            };
            match unit {
                Some(unit) => Ok((
                    after,
                    TokenKind::Duration(DurationLiteral::new(magnitude, unit)),
                )),
                None => Err(format!(
                    "invalid duration literal '{}{}', expected one of s, m, h, d, w",
                    text, suffix
                )),
            }
        }
        Err(_) => Ok((rest, TokenKind::Integer(magnitude))),
    }
}

fn operator(input: &str) -> IResult<&str, Symbol> {
    alt((
        value(Symbol::Gte, tag(">=")),
        value(Symbol::Lte, tag("<=")),
        value(Symbol::Ne, alt((tag("!="), tag("<>")))),
        value(Symbol::Eq, alt((tag("=="), tag("=")))),
        value(Symbol::Gt, tag(">")),
        value(Symbol::Lt, tag("<")),
        value(Symbol::Plus, tag("+")),
        value(Symbol::Minus, tag("-")),
        value(Symbol::Star, tag("*")),
        value(Symbol::Slash, tag("/")),
    ))(input)
}

fn punctuation(input: &str) -> IResult<&str, Punct> {
    alt((
        value(Punct::LParen, char('(')),
        value(Punct::RParen, char(')')),
        value(Punct::Comma, char(',')),
        value(Punct::Dot, char('.')),
        value(Punct::Semicolon, char(';')),
    ))(input)
}

/// Quoted text where a doubled quote stands for one quote character
fn quoted(input: &str, quote: char) -> Option<(&str, String)> {
    let mut rest = input.strip_prefix(quote)?;
    let mut content = String::new();
    loop {
        let end = rest.find(quote)?;
        content.push_str(&rest[..end]);
        rest = &rest[end + quote.len_utf8()..];
        match rest.strip_prefix(quote) {
            Some(after) => {
                content.push(quote);
                rest = after;
            }
            None => return Some((rest, content)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_tokenize_simple_select() {
        let kinds = kinds("SELECT value FROM cpu;");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Keyword(Keyword::Select),
                TokenKind::Identifier("value".to_string()),
                TokenKind::Keyword(Keyword::From),
                TokenKind::Identifier("cpu".to_string()),
                TokenKind::Punctuation(Punct::Semicolon),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_case_insensitive() {
        assert_eq!(
            kinds("select Where gRoUp")[..3],
            [
                TokenKind::Keyword(Keyword::Select),
                TokenKind::Keyword(Keyword::Where),
                TokenKind::Keyword(Keyword::Group),
            ]
        );
    }

    #[test]
    fn test_identifier_case_preserved() {
        assert_eq!(kinds("Value")[0], TokenKind::Identifier("Value".to_string()));
    }

    #[test]
    fn test_relative_time_expression() {
        let kinds = kinds("time > now() - 1d");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Identifier("time".to_string()),
                TokenKind::Operator(Symbol::Gt),
                TokenKind::Keyword(Keyword::Now),
                TokenKind::Punctuation(Punct::LParen),
                TokenKind::Punctuation(Punct::RParen),
                TokenKind::Operator(Symbol::Minus),
                TokenKind::Duration(DurationLiteral::new(1, DurationUnit::Day)),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_duration_units() {
        for (text, unit) in [
            ("30s", DurationUnit::Second),
            ("5m", DurationUnit::Minute),
            ("12h", DurationUnit::Hour),
            ("7d", DurationUnit::Day),
            ("2w", DurationUnit::Week),
        ] {
            match &kinds(text)[0] {
                TokenKind::Duration(d) => assert_eq!(d.unit, unit),
                other => panic!("expected duration for {}, got {:?}", text, other),
            }
        }
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("42")[0], TokenKind::Integer(42));
        assert_eq!(kinds("90.5")[0], TokenKind::Float(90.5));
        // Duration suffix must not be separated by whitespace
        assert_eq!(
            kinds("1 d")[..2],
            [
                TokenKind::Integer(1),
                TokenKind::Identifier("d".to_string())
            ]
        );
    }

    #[test]
    fn test_invalid_duration_suffix() {
        let err = tokenize("time > now() - 10days").unwrap_err();
        assert!(err.to_string().contains("10days"), "{}", err);

        let err = tokenize("5x").unwrap_err();
        assert!(err.to_string().contains("5x"), "{}", err);
    }

    #[test]
    fn test_strings() {
        assert_eq!(kinds("'office'")[0], TokenKind::String("office".to_string()));
        assert_eq!(kinds("\"office\"")[0], TokenKind::String("office".to_string()));
        assert_eq!(kinds("'it''s'")[0], TokenKind::String("it's".to_string()));
    }

    #[test]
    fn test_quoted_identifier() {
        assert_eq!(
            kinds("`cpu.load`")[0],
            TokenKind::QuotedIdentifier("cpu.load".to_string())
        );
    }

    #[test]
    fn test_operators() {
        let kinds = kinds(">= <= != <> == = > < + - * /");
        assert_eq!(
            kinds[..12],
            [
                TokenKind::Operator(Symbol::Gte),
                TokenKind::Operator(Symbol::Lte),
                TokenKind::Operator(Symbol::Ne),
                TokenKind::Operator(Symbol::Ne),
                TokenKind::Operator(Symbol::Eq),
                TokenKind::Operator(Symbol::Eq),
                TokenKind::Operator(Symbol::Gt),
                TokenKind::Operator(Symbol::Lt),
                TokenKind::Operator(Symbol::Plus),
                TokenKind::Operator(Symbol::Minus),
                TokenKind::Operator(Symbol::Star),
                TokenKind::Operator(Symbol::Slash),
            ]
        );
    }

    #[test]
    fn test_comments_skipped() {
        let kinds = kinds("select a -- trailing comment\nfrom t");
        assert_eq!(kinds.len(), 5);
        assert_eq!(kinds[2], TokenKind::Keyword(Keyword::From));
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("select a\n  from t").unwrap();
        assert_eq!(tokens[0].position.column, 1);
        assert_eq!(tokens[1].position.column, 8);
        assert_eq!(tokens[2].position.line, 2);
        assert_eq!(tokens[2].position.column, 3);
        assert_eq!(tokens[2].text, "from");
        assert_eq!(tokens[4].kind, TokenKind::Eof);
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("select a from t where b = 'open").unwrap_err();
        match err {
            QueryError::Lex { message, position } => {
                assert!(message.contains("unterminated string"));
                assert_eq!(position.column, 27);
            }
            other => panic!("expected lex error, got {:?}", other),
        }
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("select a # b").unwrap_err();
        assert!(err.to_string().contains("'#'"), "{}", err);
        assert_eq!(err.position().map(|p| p.column), Some(10));
    }

    #[test]
    fn test_integer_overflow() {
        let err = tokenize("99999999999999999999").unwrap_err();
        assert!(err.to_string().contains("99999999999999999999"));
    }
}
