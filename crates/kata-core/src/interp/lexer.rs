//! Tokenizer for the snippet language.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    // Keywords
    Let,
    Fn,
    If,
    Else,
    While,
    True,
    False,
    Nil,
    And,
    Or,
    Not,
    // Punctuation
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Newline,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Int(n) => write!(f, "{}", n),
            Token::Float(x) => write!(f, "{}", x),
            Token::Str(s) => write!(f, "{:?}", s),
            Token::Ident(name) => write!(f, "{}", name),
            Token::Let => write!(f, "let"),
            Token::Fn => write!(f, "fn"),
            Token::If => write!(f, "if"),
            Token::Else => write!(f, "else"),
            Token::While => write!(f, "while"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Nil => write!(f, "nil"),
            Token::And => write!(f, "and"),
            Token::Or => write!(f, "or"),
            Token::Not => write!(f, "not"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Assign => write!(f, "="),
            Token::EqEq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Le => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::Ge => write!(f, ">="),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Comma => write!(f, ","),
            Token::Colon => write!(f, ":"),
            Token::Newline => write!(f, "newline"),
        }
    }
}

/// A token together with the 1-based source line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: u32,
}

/// Lexing failure, surfaced to users as a syntax error.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub line: u32,
}

pub fn tokenize(source: &str) -> Result<Vec<Spanned>, LexError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line: u32 = 1;

    while let Some(&ch) = chars.peek() {
        match ch {
            ' ' | '\t' | '\r' => {
                chars.next();
            }
            '\n' => {
                chars.next();
                // Collapse runs of blank lines into one separator.
                if !matches!(tokens.last(), Some(Spanned { token: Token::Newline, .. }) | None) {
                    tokens.push(Spanned { token: Token::Newline, line });
                }
                line += 1;
            }
            '#' => {
                while let Some(&c) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            ';' => {
                chars.next();
                if !matches!(tokens.last(), Some(Spanned { token: Token::Newline, .. }) | None) {
                    tokens.push(Spanned { token: Token::Newline, line });
                }
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                let start_line = line;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => text.push('\n'),
                            Some('t') => text.push('\t'),
                            Some('"') => text.push('"'),
                            Some('\\') => text.push('\\'),
                            Some(other) => {
                                return Err(LexError {
                                    message: format!("unknown escape sequence `\\{}`", other),
                                    line,
                                })
                            }
                            None => {
                                return Err(LexError {
                                    message: "unterminated string literal".to_string(),
                                    line: start_line,
                                })
                            }
                        },
                        Some('\n') => {
                            return Err(LexError {
                                message: "unterminated string literal".to_string(),
                                line: start_line,
                            })
                        }
                        Some(c) => text.push(c),
                        None => {
                            return Err(LexError {
                                message: "unterminated string literal".to_string(),
                                line: start_line,
                            })
                        }
                    }
                }
                tokens.push(Spanned { token: Token::Str(text), line: start_line });
            }
            c if c.is_ascii_digit() => {
                let mut literal = String::new();
                let mut is_float = false;
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() {
                        literal.push(c);
                        chars.next();
                    } else if c == '.' && !is_float {
                        // Only consume the dot when a digit follows.
                        let mut lookahead = chars.clone();
                        lookahead.next();
                        match lookahead.peek() {
                            Some(d) if d.is_ascii_digit() => {
                                is_float = true;
                                literal.push(c);
                                chars.next();
                            }
                            _ => break,
                        }
                    } else {
                        break;
                    }
                }
                let token = if is_float {
                    let value = literal.parse::<f64>().map_err(|_| LexError {
                        message: format!("invalid number literal `{}`", literal),
                        line,
                    })?;
                    Token::Float(value)
                } else {
                    let value = literal.parse::<i64>().map_err(|_| LexError {
                        message: format!("integer literal `{}` is out of range", literal),
                        line,
                    })?;
                    Token::Int(value)
                };
                tokens.push(Spanned { token, line });
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let token = match name.as_str() {
                    "let" => Token::Let,
                    "fn" => Token::Fn,
                    "if" => Token::If,
                    "else" => Token::Else,
                    "while" => Token::While,
                    "true" => Token::True,
                    "false" => Token::False,
                    "nil" => Token::Nil,
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Ident(name),
                };
                tokens.push(Spanned { token, line });
            }
            _ => {
                chars.next();
                let token = match ch {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    '{' => Token::LBrace,
                    '}' => Token::RBrace,
                    ',' => Token::Comma,
                    ':' => Token::Colon,
                    '=' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            Token::EqEq
                        } else {
                            Token::Assign
                        }
                    }
                    '!' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            Token::NotEq
                        } else {
                            return Err(LexError {
                                message: "unexpected character `!` (use `not` or `!=`)"
                                    .to_string(),
                                line,
                            });
                        }
                    }
                    '<' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            Token::Le
                        } else {
                            Token::Lt
                        }
                    }
                    '>' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            Token::Ge
                        } else {
                            Token::Gt
                        }
                    }
                    other => {
                        return Err(LexError {
                            message: format!("unexpected character `{}`", other),
                            line,
                        })
                    }
                };
                tokens.push(Spanned { token, line });
            }
        }
    }

    // Drop a trailing separator so the parser sees a clean end of input.
    while matches!(tokens.last(), Some(Spanned { token: Token::Newline, .. })) {
        tokens.pop();
    }
    Ok(tokens)
}
