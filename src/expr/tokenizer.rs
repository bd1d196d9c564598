//! Expression text → tokens.

use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    IntegerLiteral(String),
    RealLiteral(String),
    /// Unescaped contents of a quoted string.
    StringLiteral(String),
    /// `@N`
    Placeholder(usize),
    Exclamation,
    ExclamationEqual,
    Percent,
    DoubleAmp,
    Amp,
    LParen,
    RParen,
    Star,
    Plus,
    Comma,
    Minus,
    Dot,
    Slash,
    Colon,
    LessThan,
    LessEqual,
    LessGreater,
    Equal,
    DoubleEqual,
    GreaterThan,
    GreaterEqual,
    Question,
    DoubleBar,
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Character offset of the token's first character.
    pub pos: usize,
}

impl Token {
    /// Identifier text, if this token is an identifier.
    pub fn identifier(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Identifier(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this token is the given keyword, ignoring case.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.identifier()
            .is_some_and(|s| s.eq_ignore_ascii_case(keyword))
    }
}

/// Split expression text into tokens, ending with [`TokenKind::End`].
pub fn tokenize(text: &str) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let start = i;
        let two = |next: char| chars.get(start + 1) == Some(&next);
        let (kind, len) = match c {
            '!' if two('=') => (TokenKind::ExclamationEqual, 2),
            '!' => (TokenKind::Exclamation, 1),
            '%' => (TokenKind::Percent, 1),
            '&' if two('&') => (TokenKind::DoubleAmp, 2),
            '&' => (TokenKind::Amp, 1),
            '(' => (TokenKind::LParen, 1),
            ')' => (TokenKind::RParen, 1),
            '*' => (TokenKind::Star, 1),
            '+' => (TokenKind::Plus, 1),
            ',' => (TokenKind::Comma, 1),
            '-' => (TokenKind::Minus, 1),
            '.' => (TokenKind::Dot, 1),
            '/' => (TokenKind::Slash, 1),
            ':' => (TokenKind::Colon, 1),
            '<' if two('=') => (TokenKind::LessEqual, 2),
            '<' if two('>') => (TokenKind::LessGreater, 2),
            '<' => (TokenKind::LessThan, 1),
            '=' if two('=') => (TokenKind::DoubleEqual, 2),
            '=' => (TokenKind::Equal, 1),
            '>' if two('=') => (TokenKind::GreaterEqual, 2),
            '>' => (TokenKind::GreaterThan, 1),
            '?' => (TokenKind::Question, 1),
            '|' if two('|') => (TokenKind::DoubleBar, 2),
            '\'' | '"' => {
                let (value, end) = scan_string(&chars, i)?;
                tokens.push(Token {
                    kind: TokenKind::StringLiteral(value),
                    pos: start,
                });
                i = end;
                continue;
            }
            '@' => {
                let mut end = i + 1;
                while end < chars.len() && chars[end].is_ascii_digit() {
                    end += 1;
                }
                if end == i + 1 {
                    return Err(ParseError::new(start, "Placeholder index expected after '@'"));
                }
                let digits: String = chars[i + 1..end].iter().collect();
                let index = digits
                    .parse::<usize>()
                    .map_err(|_| ParseError::new(start, format!("Invalid placeholder '@{}'", digits)))?;
                tokens.push(Token {
                    kind: TokenKind::Placeholder(index),
                    pos: start,
                });
                i = end;
                continue;
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = i + 1;
                while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Identifier(chars[i..end].iter().collect()),
                    pos: start,
                });
                i = end;
                continue;
            }
            c if c.is_ascii_digit() => {
                let (kind, end) = scan_number(&chars, i);
                tokens.push(Token { kind, pos: start });
                i = end;
                continue;
            }
            other => {
                return Err(ParseError::new(
                    start,
                    format!("Syntax error '{}'", other),
                ))
            }
        };
        tokens.push(Token { kind, pos: start });
        i += len;
    }

    tokens.push(Token {
        kind: TokenKind::End,
        pos: chars.len(),
    });
    Ok(tokens)
}

/// Scan a quoted string starting at `start`. A doubled quote character
/// stands for one literal quote.
fn scan_string(chars: &[char], start: usize) -> Result<(String, usize), ParseError> {
    let quote = chars[start];
    let mut value = String::new();
    let mut i = start + 1;
    loop {
        match chars.get(i) {
            None => return Err(ParseError::new(start, "Unterminated string literal")),
            Some(&c) if c == quote => {
                if chars.get(i + 1) == Some(&quote) {
                    value.push(quote);
                    i += 2;
                } else {
                    return Ok((value, i + 1));
                }
            }
            Some(&c) => {
                value.push(c);
                i += 1;
            }
        }
    }
}

fn scan_number(chars: &[char], start: usize) -> (TokenKind, usize) {
    let digits_from = |mut i: usize| {
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut end = digits_from(start);
    let mut real = false;

    if chars.get(end) == Some(&'.') && chars.get(end + 1).is_some_and(|c| c.is_ascii_digit()) {
        real = true;
        end = digits_from(end + 1);
    }

    if matches!(chars.get(end), Some('e') | Some('E')) {
        let mut exp = end + 1;
        if matches!(chars.get(exp), Some('+') | Some('-')) {
            exp += 1;
        }
        if chars.get(exp).is_some_and(|c| c.is_ascii_digit()) {
            real = true;
            end = digits_from(exp);
        }
    }

    let text: String = chars[start..end].iter().collect();
    let kind = if real {
        TokenKind::RealLiteral(text)
    } else {
        TokenKind::IntegerLiteral(text)
    };
    (kind, end)
}
