//! Tokenizer for function files.

use std::fmt;

use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    /// Text of a `///` line, without the marker.
    DocComment(String),
    Fn,
    Let,
    If,
    Else,
    True,
    False,
    Null,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semicolon,
    Dot,
    Arrow,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    Assign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(name) => write!(f, "identifier '{name}'"),
            TokenKind::Int(i) => write!(f, "integer {i}"),
            TokenKind::Float(x) => write!(f, "float {x}"),
            TokenKind::Str(_) => f.write_str("string literal"),
            TokenKind::DocComment(_) => f.write_str("doc comment"),
            TokenKind::Fn => f.write_str("'fn'"),
            TokenKind::Let => f.write_str("'let'"),
            TokenKind::If => f.write_str("'if'"),
            TokenKind::Else => f.write_str("'else'"),
            TokenKind::True => f.write_str("'true'"),
            TokenKind::False => f.write_str("'false'"),
            TokenKind::Null => f.write_str("'null'"),
            TokenKind::LParen => f.write_str("'('"),
            TokenKind::RParen => f.write_str("')'"),
            TokenKind::LBrace => f.write_str("'{'"),
            TokenKind::RBrace => f.write_str("'}'"),
            TokenKind::LBracket => f.write_str("'['"),
            TokenKind::RBracket => f.write_str("']'"),
            TokenKind::Comma => f.write_str("','"),
            TokenKind::Colon => f.write_str("':'"),
            TokenKind::Semicolon => f.write_str("';'"),
            TokenKind::Dot => f.write_str("'.'"),
            TokenKind::Arrow => f.write_str("'->'"),
            TokenKind::Plus => f.write_str("'+'"),
            TokenKind::Minus => f.write_str("'-'"),
            TokenKind::Star => f.write_str("'*'"),
            TokenKind::StarStar => f.write_str("'**'"),
            TokenKind::Slash => f.write_str("'/'"),
            TokenKind::Percent => f.write_str("'%'"),
            TokenKind::Assign => f.write_str("'='"),
            TokenKind::EqEq => f.write_str("'=='"),
            TokenKind::NotEq => f.write_str("'!='"),
            TokenKind::Lt => f.write_str("'<'"),
            TokenKind::Le => f.write_str("'<='"),
            TokenKind::Gt => f.write_str("'>'"),
            TokenKind::Ge => f.write_str("'>='"),
            TokenKind::AndAnd => f.write_str("'&&'"),
            TokenKind::OrOr => f.write_str("'||'"),
            TokenKind::Bang => f.write_str("'!'"),
            TokenKind::Eof => f.write_str("end of file"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

/// Splits `source` into tokens, ending with a single [`TokenKind::Eof`].
///
/// Plain `//` comments are dropped; `///` comments are kept as doc tokens so
/// the parser can attach them to the following function.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;
    let mut line = 1;

    while pos < chars.len() {
        let ch = chars[pos];
        let next = chars.get(pos + 1).copied();

        if ch == '\n' {
            line += 1;
            pos += 1;
            continue;
        }
        if ch.is_whitespace() {
            pos += 1;
            continue;
        }

        if ch == '/' && next == Some('/') {
            let start = pos;
            while pos < chars.len() && chars[pos] != '\n' {
                pos += 1;
            }
            let text: String = chars[start..pos].iter().collect();
            if let Some(doc) = text.strip_prefix("///") {
                tokens.push(Token {
                    kind: TokenKind::DocComment(doc.trim().to_string()),
                    line,
                });
            }
            continue;
        }

        if ch == '"' || ch == '\'' {
            let (text, end, lines) = lex_string(&chars, pos, line)?;
            tokens.push(Token {
                kind: TokenKind::Str(text),
                line,
            });
            line += lines;
            pos = end;
            continue;
        }

        if ch.is_ascii_digit() {
            let start = pos;
            let mut is_float = false;
            while pos < chars.len() {
                let c = chars[pos];
                if c.is_ascii_digit() || c == '_' {
                    pos += 1;
                } else if c == '.'
                    && !is_float
                    && chars.get(pos + 1).is_some_and(|d| d.is_ascii_digit())
                {
                    is_float = true;
                    pos += 1;
                } else {
                    break;
                }
            }
            let text: String = chars[start..pos].iter().filter(|c| **c != '_').collect();
            let parsed = if is_float {
                text.parse::<f64>().ok().map(TokenKind::Float)
            } else {
                text.parse::<i64>().ok().map(TokenKind::Int)
            };
            let kind = parsed.ok_or_else(|| ParseError::InvalidNumber {
                line,
                text: text.clone(),
            })?;
            tokens.push(Token { kind, line });
            continue;
        }

        if ch.is_alphabetic() || ch == '_' {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                pos += 1;
            }
            let word: String = chars[start..pos].iter().collect();
            let kind = match word.as_str() {
                "fn" => TokenKind::Fn,
                "let" => TokenKind::Let,
                "if" => TokenKind::If,
                "else" => TokenKind::Else,
                "true" => TokenKind::True,
                "false" => TokenKind::False,
                "null" => TokenKind::Null,
                _ => TokenKind::Ident(word),
            };
            tokens.push(Token { kind, line });
            continue;
        }

        let (kind, width) = match (ch, next) {
            ('-', Some('>')) => (TokenKind::Arrow, 2),
            ('*', Some('*')) => (TokenKind::StarStar, 2),
            ('=', Some('=')) => (TokenKind::EqEq, 2),
            ('!', Some('=')) => (TokenKind::NotEq, 2),
            ('<', Some('=')) => (TokenKind::Le, 2),
            ('>', Some('=')) => (TokenKind::Ge, 2),
            ('&', Some('&')) => (TokenKind::AndAnd, 2),
            ('|', Some('|')) => (TokenKind::OrOr, 2),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            ('{', _) => (TokenKind::LBrace, 1),
            ('}', _) => (TokenKind::RBrace, 1),
            ('[', _) => (TokenKind::LBracket, 1),
            (']', _) => (TokenKind::RBracket, 1),
            (',', _) => (TokenKind::Comma, 1),
            (':', _) => (TokenKind::Colon, 1),
            (';', _) => (TokenKind::Semicolon, 1),
            ('.', _) => (TokenKind::Dot, 1),
            ('+', _) => (TokenKind::Plus, 1),
            ('-', _) => (TokenKind::Minus, 1),
            ('*', _) => (TokenKind::Star, 1),
            ('/', _) => (TokenKind::Slash, 1),
            ('%', _) => (TokenKind::Percent, 1),
            ('=', _) => (TokenKind::Assign, 1),
            ('<', _) => (TokenKind::Lt, 1),
            ('>', _) => (TokenKind::Gt, 1),
            ('!', _) => (TokenKind::Bang, 1),
            _ => return Err(ParseError::UnexpectedChar { line, ch }),
        };
        tokens.push(Token { kind, line });
        pos += width;
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        line,
    });
    Ok(tokens)
}

/// Lexes a quoted string starting at `start`.
///
/// Returns the unescaped text, the position after the closing quote, and the
/// number of newlines consumed.
fn lex_string(chars: &[char], start: usize, line: usize) -> Result<(String, usize, usize), ParseError> {
    let quote = chars[start];
    let mut out = String::new();
    let mut pos = start + 1;
    let mut lines = 0;

    while pos < chars.len() {
        let c = chars[pos];
        if c == quote {
            return Ok((out, pos + 1, lines));
        }
        if c == '\n' {
            lines += 1;
        }
        if c == '\\' {
            let escaped = *chars
                .get(pos + 1)
                .ok_or(ParseError::UnterminatedString { line })?;
            out.push(match escaped {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '0' => '\0',
                '\\' => '\\',
                '"' => '"',
                '\'' => '\'',
                other => {
                    return Err(ParseError::InvalidEscape {
                        line: line + lines,
                        ch: other,
                    })
                }
            });
            pos += 2;
            continue;
        }
        out.push(c);
        pos += 1;
    }

    Err(ParseError::UnterminatedString { line })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn tokenizes_signature() {
        assert_eq!(
            kinds("fn add(a: int) -> int"),
            vec![
                TokenKind::Fn,
                TokenKind::Ident("add".into()),
                TokenKind::LParen,
                TokenKind::Ident("a".into()),
                TokenKind::Colon,
                TokenKind::Ident("int".into()),
                TokenKind::RParen,
                TokenKind::Arrow,
                TokenKind::Ident("int".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keeps_doc_comments_and_drops_plain_ones() {
        assert_eq!(
            kinds("/// Adds.\n// ignored\n1"),
            vec![
                TokenKind::DocComment("Adds.".into()),
                TokenKind::Int(1),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn numbers_and_member_access_do_not_collide() {
        assert_eq!(
            kinds("1.5 x.y 2 ** 3"),
            vec![
                TokenKind::Float(1.5),
                TokenKind::Ident("x".into()),
                TokenKind::Dot,
                TokenKind::Ident("y".into()),
                TokenKind::Int(2),
                TokenKind::StarStar,
                TokenKind::Int(3),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_escapes_and_line_tracking() {
        let tokens = tokenize("'it\\'s'\n\"a\\nb\"").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Str("it's".into()));
        assert_eq!(tokens[1].kind, TokenKind::Str("a\nb".into()));
        assert_eq!(tokens[1].line, 2);
    }

    #[test]
    fn reports_unterminated_string() {
        assert_eq!(
            tokenize("\n\"open").unwrap_err(),
            ParseError::UnterminatedString { line: 2 }
        );
    }

    #[test]
    fn reports_unexpected_character() {
        assert_eq!(
            tokenize("a $ b").unwrap_err(),
            ParseError::UnexpectedChar { line: 1, ch: '$' }
        );
    }
}
