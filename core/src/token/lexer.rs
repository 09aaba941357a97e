use std::fmt;

use crate::token::{ParseError, Position};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    LParen,       // (
    RParen,       // )
    LBracket,     // [
    RBracket,     // ]
    LBrace,       // {
    RBrace,       // }
    Comma,        // ,
    Semicolon,    // ;
    Colon,        // :
    Dot,          // .
    Assign,       // =
    Plus,         // +
    Minus,        // -
    Star,         // *
    StarStar,     // **
    Slash,        // /
    SlashSlash,   // //
    Percent,      // %
    Amp,          // &
    Pipe,         // |
    Caret,        // ^
    Tilde,        // ~
    LtLt,         // <<
    GtGt,         // >>
    Eq,           // ==
    Ne,           // !=
    Lt,           // <
    Gt,           // >
    Le,           // <=
    Ge,           // >=
    PlusEq,       // +=
    MinusEq,      // -=
    StarEq,       // *=
    SlashEq,      // /=
    SlashSlashEq, // //=
    PercentEq,    // %=
    AmpEq,        // &=
    PipeEq,       // |=
    CaretEq,      // ^=
    LtLtEq,       // <<=
    GtGtEq,       // >>=
    // Keywords
    And,
    Break,
    Continue,
    Def,
    Elif,
    Else,
    For,
    If,
    In,
    Lambda,
    Load,
    Not,
    Or,
    Pass,
    Return,
    While,
    // Literals and names
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    // Layout
    Newline,
    Indent,
    Outdent,
    Eof,
}

impl Token {
    /// Whether this token is one of the augmented assignment operators.
    pub fn is_augmented_assign(&self) -> bool {
        matches!(
            self,
            Token::PlusEq
                | Token::MinusEq
                | Token::StarEq
                | Token::SlashEq
                | Token::SlashSlashEq
                | Token::PercentEq
                | Token::AmpEq
                | Token::PipeEq
                | Token::CaretEq
                | Token::LtLtEq
                | Token::GtGtEq
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Comma => ",",
            Token::Semicolon => ";",
            Token::Colon => ":",
            Token::Dot => ".",
            Token::Assign => "=",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::StarStar => "**",
            Token::Slash => "/",
            Token::SlashSlash => "//",
            Token::Percent => "%",
            Token::Amp => "&",
            Token::Pipe => "|",
            Token::Caret => "^",
            Token::Tilde => "~",
            Token::LtLt => "<<",
            Token::GtGt => ">>",
            Token::Eq => "==",
            Token::Ne => "!=",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::Le => "<=",
            Token::Ge => ">=",
            Token::PlusEq => "+=",
            Token::MinusEq => "-=",
            Token::StarEq => "*=",
            Token::SlashEq => "/=",
            Token::SlashSlashEq => "//=",
            Token::PercentEq => "%=",
            Token::AmpEq => "&=",
            Token::PipeEq => "|=",
            Token::CaretEq => "^=",
            Token::LtLtEq => "<<=",
            Token::GtGtEq => ">>=",
            Token::And => "and",
            Token::Break => "break",
            Token::Continue => "continue",
            Token::Def => "def",
            Token::Elif => "elif",
            Token::Else => "else",
            Token::For => "for",
            Token::If => "if",
            Token::In => "in",
            Token::Lambda => "lambda",
            Token::Load => "load",
            Token::Not => "not",
            Token::Or => "or",
            Token::Pass => "pass",
            Token::Return => "return",
            Token::While => "while",
            Token::Ident(name) => return write!(f, "{name}"),
            Token::Int(i) => return write!(f, "{i}"),
            Token::Float(x) => return write!(f, "{x}"),
            Token::Str(s) => return write!(f, "{s:?}"),
            Token::Bytes(b) => return write!(f, "b{:?}", String::from_utf8_lossy(b)),
            Token::Newline => "newline",
            Token::Indent => "indent",
            Token::Outdent => "outdent",
            Token::Eof => "end of file",
        };
        f.write_str(s)
    }
}

fn keyword(word: &str) -> Option<Token> {
    Some(match word {
        "and" => Token::And,
        "break" => Token::Break,
        "continue" => Token::Continue,
        "def" => Token::Def,
        "elif" => Token::Elif,
        "else" => Token::Else,
        "for" => Token::For,
        "if" => Token::If,
        "in" => Token::In,
        "lambda" => Token::Lambda,
        "load" => Token::Load,
        "not" => Token::Not,
        "or" => Token::Or,
        "pass" => Token::Pass,
        "return" => Token::Return,
        "while" => Token::While,
        _ => return None,
    })
}

const RESERVED: &[&str] = &[
    "as", "assert", "async", "await", "class", "del", "except", "finally", "from", "global", "import", "is",
    "nonlocal", "raise", "try", "with", "yield",
];

#[inline]
fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

#[inline]
fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

type LexResult<T> = Result<T, ParseError>;

/// Indentation-aware scanner.
///
/// Newlines inside brackets are insignificant; at bracket depth zero each
/// logical line ends with `Newline`, and changes in leading whitespace
/// produce `Indent`/`Outdent` tokens.
pub struct Tokenizer {
    chars: Vec<char>,
    idx: usize,
    line: u32,
    column: u32,
    tokens: Vec<Token>,
    spans: Vec<Position>,
    indents: Vec<u32>,
    depth: usize,
    at_line_start: bool,
}

impl Tokenizer {
    pub fn tokenize(s: &str) -> LexResult<Vec<Token>> {
        Self::tokenize_with_spans(s).map(|(tokens, _)| tokens)
    }

    /// Tokenize and return the start position of every token, aligned by index.
    pub fn tokenize_with_spans(s: &str) -> LexResult<(Vec<Token>, Vec<Position>)> {
        let mut t = Tokenizer {
            chars: s.chars().collect(),
            idx: 0,
            line: 1,
            column: 1,
            tokens: Vec::with_capacity(s.len() / 4),
            spans: Vec::with_capacity(s.len() / 4),
            indents: vec![0],
            depth: 0,
            at_line_start: true,
        };
        t.run()?;
        Ok((t.tokens, t.spans))
    }

    #[inline]
    fn pos(&self) -> Position {
        Position::new(self.line, self.column)
    }

    #[inline]
    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).copied()
    }

    #[inline]
    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.idx + n).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.get(self.idx).copied()?;
        self.idx += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn err<T>(&self, msg: impl Into<String>, pos: Position) -> LexResult<T> {
        Err(ParseError::new(msg, pos))
    }

    fn push(&mut self, token: Token, pos: Position) {
        self.tokens.push(token);
        self.spans.push(pos);
    }

    fn run(&mut self) -> LexResult<()> {
        loop {
            if self.at_line_start && self.depth == 0 {
                self.indentation()?;
            }
            self.skip_space_and_comment();
            let Some(c) = self.peek() else { break };
            let start = self.pos();
            match c {
                '\n' => {
                    self.advance();
                    if self.depth == 0 {
                        if !matches!(self.tokens.last(), None | Some(Token::Newline)) {
                            self.push(Token::Newline, start);
                        }
                        self.at_line_start = true;
                    }
                }
                '\\' => {
                    self.advance();
                    if self.peek() == Some('\r') {
                        self.advance();
                    }
                    if self.advance() != Some('\n') {
                        return self.err("stray backslash in program", start);
                    }
                }
                '"' | '\'' => self.string(start, false, false)?,
                c if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) => {
                    self.number(start)?
                }
                c if is_ident_start(c) => self.word(start)?,
                _ => self.punctuation(start)?,
            }
        }
        let end = self.pos();
        if !matches!(self.tokens.last(), None | Some(Token::Newline)) {
            self.push(Token::Newline, end);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(Token::Outdent, end);
        }
        self.push(Token::Eof, end);
        Ok(())
    }

    /// Measures leading whitespace of the next non-blank line and emits
    /// indentation tokens.
    fn indentation(&mut self) -> LexResult<()> {
        loop {
            let mut width = 0u32;
            while let Some(c) = self.peek() {
                match c {
                    ' ' => width += 1,
                    '\t' => width += 8 - width % 8,
                    '\r' | '\x0c' => {}
                    _ => break,
                }
                self.advance();
            }
            match self.peek() {
                None => {
                    self.at_line_start = false;
                    return Ok(());
                }
                Some('\n') => {
                    self.advance();
                    continue;
                }
                Some('#') => {
                    self.skip_comment();
                    continue;
                }
                _ => {}
            }
            self.at_line_start = false;
            let pos = self.pos();
            let current = self.indents.last().copied().unwrap_or(0);
            if width > current {
                self.indents.push(width);
                self.push(Token::Indent, pos);
            } else if width < current {
                while self.indents.last().is_some_and(|&w| width < w) {
                    self.indents.pop();
                    self.push(Token::Outdent, pos);
                }
                if self.indents.last().copied().unwrap_or(0) != width {
                    return self.err("unindent does not match any outer indentation level", pos);
                }
            }
            return Ok(());
        }
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn skip_space_and_comment(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' | '\x0c' => {
                    self.advance();
                }
                '\n' if self.depth > 0 => {
                    self.advance();
                }
                '#' => self.skip_comment(),
                _ => break,
            }
        }
    }

    fn word(&mut self, start: Position) -> LexResult<()> {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if !is_ident_continue(c) {
                break;
            }
            word.push(c);
            self.advance();
        }
        if matches!(self.peek(), Some('"' | '\'')) {
            match word.as_str() {
                "r" => return self.string(start, true, false),
                "b" => return self.string(start, false, true),
                "rb" | "br" => return self.string(start, true, true),
                _ => {}
            }
        }
        if let Some(kw) = keyword(&word) {
            self.push(kw, start);
        } else if RESERVED.contains(&word.as_str()) {
            return self.err(format!("keyword {word} is reserved"), start);
        } else {
            self.push(Token::Ident(word), start);
        }
        Ok(())
    }

    fn number(&mut self, start: Position) -> LexResult<()> {
        let mut text = String::new();
        if self.peek() == Some('0')
            && let Some(radix) = match self.peek_at(1) {
                Some('x' | 'X') => Some(16),
                Some('o' | 'O') => Some(8),
                Some('b' | 'B') => Some(2),
                _ => None,
            }
        {
            self.advance();
            self.advance();
            while let Some(c) = self.peek() {
                if !c.is_ascii_alphanumeric() {
                    break;
                }
                text.push(c);
                self.advance();
            }
            return match i64::from_str_radix(&text, radix) {
                Ok(v) => {
                    self.push(Token::Int(v), start);
                    Ok(())
                }
                Err(_) if text.is_empty() || !text.chars().all(|c| c.is_digit(radix)) => {
                    self.err(format!("invalid base-{radix} integer literal"), start)
                }
                Err(_) => self.err("int literal out of range", start),
            };
        }

        let mut is_float = false;
        while let Some(c) = self.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            text.push(c);
            self.advance();
        }
        if self.peek() == Some('.') {
            is_float = true;
            text.push('.');
            self.advance();
            while let Some(c) = self.peek() {
                if !c.is_ascii_digit() {
                    break;
                }
                text.push(c);
                self.advance();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            is_float = true;
            text.push('e');
            self.advance();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                text.push(sign);
                self.advance();
            }
            let mut digits = 0;
            while let Some(c) = self.peek() {
                if !c.is_ascii_digit() {
                    break;
                }
                text.push(c);
                self.advance();
                digits += 1;
            }
            if digits == 0 {
                return self.err("invalid float literal", start);
            }
        }
        if self.peek().is_some_and(is_ident_start) {
            return self.err("invalid character in number literal", self.pos());
        }

        if is_float {
            let v: f64 = text
                .parse()
                .map_err(|_| ParseError::new("invalid float literal", start))?;
            self.push(Token::Float(v), start);
        } else {
            if text.len() > 1 && text.starts_with('0') && text.chars().any(|c| c != '0') {
                return self.err("obsolete form of octal literal; use 0o...", start);
            }
            let v: i64 = text
                .parse()
                .map_err(|_| ParseError::new("int literal out of range", start))?;
            self.push(Token::Int(v), start);
        }
        Ok(())
    }

    fn string(&mut self, start: Position, raw: bool, bytes: bool) -> LexResult<()> {
        let quote = self.advance().unwrap_or('"');
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.advance();
            self.advance();
        }
        let mut buf: Vec<u8> = Vec::new();
        let mut utf8 = [0u8; 4];
        loop {
            let Some(c) = self.advance() else {
                return self.err("unexpected end of file in string literal", start);
            };
            if c == quote {
                if !triple {
                    break;
                }
                if self.peek() == Some(quote) && self.peek_at(1) == Some(quote) {
                    self.advance();
                    self.advance();
                    break;
                }
                buf.push(c as u8);
                continue;
            }
            if c == '\n' && !triple {
                return self.err("unexpected newline in string literal", start);
            }
            if c != '\\' {
                buf.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
                continue;
            }
            let escape_pos = self.pos();
            let Some(e) = self.advance() else {
                return self.err("unexpected end of file in string literal", start);
            };
            if raw {
                buf.push(b'\\');
                buf.extend_from_slice(e.encode_utf8(&mut utf8).as_bytes());
                continue;
            }
            match e {
                '\n' => {}
                'n' => buf.push(b'\n'),
                't' => buf.push(b'\t'),
                'r' => buf.push(b'\r'),
                'a' => buf.push(0x07),
                'b' => buf.push(0x08),
                'f' => buf.push(0x0c),
                'v' => buf.push(0x0b),
                '\\' | '\'' | '"' => buf.push(e as u8),
                '0'..='7' => {
                    let mut v = e.to_digit(8).unwrap_or(0);
                    for _ in 0..2 {
                        match self.peek().and_then(|d| d.to_digit(8)) {
                            Some(d) => {
                                v = v * 8 + d;
                                self.advance();
                            }
                            None => break,
                        }
                    }
                    if v > 0xff || (!bytes && v >= 0x80) {
                        return self.err("non-ASCII octal escape", escape_pos);
                    }
                    buf.push(v as u8);
                }
                'x' => {
                    let v = self.hex_digits(2, escape_pos)?;
                    if !bytes && v >= 0x80 {
                        return self.err("non-ASCII hex escape in string literal", escape_pos);
                    }
                    buf.push(v as u8);
                }
                'u' | 'U' => {
                    let n = if e == 'u' { 4 } else { 8 };
                    let v = self.hex_digits(n, escape_pos)?;
                    let Some(ch) = char::from_u32(v) else {
                        return self.err("invalid Unicode code point", escape_pos);
                    };
                    buf.extend_from_slice(ch.encode_utf8(&mut utf8).as_bytes());
                }
                other => return self.err(format!("invalid escape sequence \\{other}"), escape_pos),
            }
        }
        let token = if bytes {
            Token::Bytes(buf)
        } else {
            Token::Str(String::from_utf8(buf).map_err(|_| ParseError::new("invalid UTF-8 in string literal", start))?)
        };
        self.push(token, start);
        Ok(())
    }

    fn hex_digits(&mut self, n: usize, pos: Position) -> LexResult<u32> {
        let mut v = 0u32;
        for _ in 0..n {
            match self.peek().and_then(|d| d.to_digit(16)) {
                Some(d) => {
                    v = v * 16 + d;
                    self.advance();
                }
                None => return self.err(format!("truncated escape sequence, want {n} hex digits"), pos),
            }
        }
        Ok(v)
    }

    fn punctuation(&mut self, start: Position) -> LexResult<()> {
        let c = self.peek().unwrap_or('\0');
        let c1 = self.peek_at(1);
        let c2 = self.peek_at(2);
        let (token, len) = match (c, c1, c2) {
            ('/', Some('/'), Some('=')) => (Token::SlashSlashEq, 3),
            ('<', Some('<'), Some('=')) => (Token::LtLtEq, 3),
            ('>', Some('>'), Some('=')) => (Token::GtGtEq, 3),
            ('=', Some('='), _) => (Token::Eq, 2),
            ('!', Some('='), _) => (Token::Ne, 2),
            ('<', Some('='), _) => (Token::Le, 2),
            ('>', Some('='), _) => (Token::Ge, 2),
            ('+', Some('='), _) => (Token::PlusEq, 2),
            ('-', Some('='), _) => (Token::MinusEq, 2),
            ('*', Some('='), _) => (Token::StarEq, 2),
            ('/', Some('='), _) => (Token::SlashEq, 2),
            ('%', Some('='), _) => (Token::PercentEq, 2),
            ('&', Some('='), _) => (Token::AmpEq, 2),
            ('|', Some('='), _) => (Token::PipeEq, 2),
            ('^', Some('='), _) => (Token::CaretEq, 2),
            ('/', Some('/'), _) => (Token::SlashSlash, 2),
            ('<', Some('<'), _) => (Token::LtLt, 2),
            ('>', Some('>'), _) => (Token::GtGt, 2),
            ('*', Some('*'), _) => (Token::StarStar, 2),
            ('(', ..) => (Token::LParen, 1),
            (')', ..) => (Token::RParen, 1),
            ('[', ..) => (Token::LBracket, 1),
            (']', ..) => (Token::RBracket, 1),
            ('{', ..) => (Token::LBrace, 1),
            ('}', ..) => (Token::RBrace, 1),
            (',', ..) => (Token::Comma, 1),
            (';', ..) => (Token::Semicolon, 1),
            (':', ..) => (Token::Colon, 1),
            ('.', ..) => (Token::Dot, 1),
            ('=', ..) => (Token::Assign, 1),
            ('+', ..) => (Token::Plus, 1),
            ('-', ..) => (Token::Minus, 1),
            ('*', ..) => (Token::Star, 1),
            ('/', ..) => (Token::Slash, 1),
            ('%', ..) => (Token::Percent, 1),
            ('&', ..) => (Token::Amp, 1),
            ('|', ..) => (Token::Pipe, 1),
            ('^', ..) => (Token::Caret, 1),
            ('~', ..) => (Token::Tilde, 1),
            ('<', ..) => (Token::Lt, 1),
            ('>', ..) => (Token::Gt, 1),
            _ => return self.err(format!("unexpected input character {c:?}"), start),
        };
        for _ in 0..len {
            self.advance();
        }
        match token {
            Token::LParen | Token::LBracket | Token::LBrace => self.depth += 1,
            Token::RParen | Token::RBracket | Token::RBrace => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
        self.push(token, start);
        Ok(())
    }
}
