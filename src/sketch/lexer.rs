use crate::error::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Sym(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

// Longest first so `+=` wins over `+`.
const SYMBOLS: [&str; 34] = [
    "++", "--", "+=", "-=", "*=", "/=", "%=", "==", "!=", "<=", ">=", "&&", "||", "(", ")",
    "{", "}", ";", ",", ".", "?", ":", "=", "+", "-", "*", "/", "%", "<", ">", "!", "&", "|",
    "^",
];

pub fn tokenize(source: &str) -> Result<Vec<Token>, ScriptError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\n' {
            line += 1;
            i += 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Comments survive in pass-through host scripts.
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                if chars[i] == '\n' {
                    line += 1;
                }
                i += 1;
            }
            i += 2;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) {
            let (kind, next) = number(&chars, i, line)?;
            tokens.push(Token { kind, line });
            i = next;
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            tokens.push(Token {
                kind: TokenKind::Ident(word),
                line,
            });
            continue;
        }

        if c == '"' {
            let (text, next) = quoted(&chars, i, '"', line)?;
            tokens.push(Token {
                kind: TokenKind::Str(text),
                line,
            });
            i = next;
            continue;
        }

        if c == '\'' {
            let (text, next) = quoted(&chars, i, '\'', line)?;
            let mut it = text.chars();
            let kind = match (it.next(), it.next()) {
                (Some(ch), None) => TokenKind::Int(ch as i64),
                _ => TokenKind::Str(text),
            };
            tokens.push(Token { kind, line });
            i = next;
            continue;
        }

        let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
        match SYMBOLS.iter().find(|sym| rest.starts_with(**sym)) {
            Some(sym) => {
                tokens.push(Token {
                    kind: TokenKind::Sym(sym),
                    line,
                });
                i += sym.len();
            }
            None => {
                return Err(ScriptError::Syntax {
                    line,
                    message: format!("unexpected character '{}'", c),
                })
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        line,
    });
    Ok(tokens)
}

/// Scan a numeric literal, accepting C forms: hex, binary, exponents and
/// `U`/`L`/`F` suffixes.
fn number(chars: &[char], start: usize, line: usize) -> Result<(TokenKind, usize), ScriptError> {
    let mut i = start;
    let bad = |text: &str| ScriptError::Syntax {
        line,
        message: format!("malformed number '{}'", text),
    };

    if chars[i] == '0' && matches!(chars.get(i + 1), Some('x') | Some('X') | Some('b') | Some('B')) {
        let radix = if matches!(chars[i + 1], 'x' | 'X') { 16 } else { 2 };
        i += 2;
        let digits_start = i;
        while i < chars.len() && chars[i].is_digit(radix) {
            i += 1;
        }
        let digits: String = chars[digits_start..i].iter().collect();
        i = skip_suffix(chars, i);
        let value = i64::from_str_radix(&digits, radix).map_err(|_| bad(&digits))?;
        return Ok((TokenKind::Int(value), i));
    }

    let mut is_float = false;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if chars.get(i) == Some(&'.') {
        is_float = true;
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }
    if matches!(chars.get(i), Some('e') | Some('E'))
        && (chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())
            || (matches!(chars.get(i + 1), Some('-') | Some('+'))
                && chars.get(i + 2).is_some_and(|d| d.is_ascii_digit())))
    {
        is_float = true;
        i += 2;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }
    let text: String = chars[start..i].iter().collect();
    if matches!(chars.get(i), Some('f') | Some('F')) {
        is_float = true;
    }
    i = skip_suffix(chars, i);

    let kind = if is_float {
        TokenKind::Float(text.parse().map_err(|_| bad(&text))?)
    } else {
        TokenKind::Int(text.parse().map_err(|_| bad(&text))?)
    };
    Ok((kind, i))
}

fn skip_suffix(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && matches!(chars[i], 'u' | 'U' | 'l' | 'L' | 'f' | 'F') {
        i += 1;
    }
    i
}

fn quoted(
    chars: &[char],
    start: usize,
    quote: char,
    line: usize,
) -> Result<(String, usize), ScriptError> {
    let mut text = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            c if c == quote => return Ok((text, i + 1)),
            '\\' => {
                let escaped = match chars.get(i + 1) {
                    Some('n') => '\n',
                    Some('t') => '\t',
                    Some('r') => '\r',
                    Some('0') => '\0',
                    Some(other) => *other,
                    None => break,
                };
                text.push(escaped);
                i += 2;
            }
            '\n' => break,
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    Err(ScriptError::Syntax {
        line,
        message: "unterminated literal".to_string(),
    })
}
