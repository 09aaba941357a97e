use crate::token::{Position, Token, Tokenizer};

fn idents(names: &[&str]) -> Vec<Token> {
    names.iter().map(|n| Token::Ident(n.to_string())).collect()
}

#[test]
fn basic() {
    let t = Tokenizer::tokenize(r#"x = 1.5 + 2 * "a" // 'b'"#).unwrap();
    assert_eq!(
        t,
        vec![
            Token::Ident("x".into()),
            Token::Assign,
            Token::Float(1.5),
            Token::Plus,
            Token::Int(2),
            Token::Star,
            Token::Str("a".into()),
            Token::SlashSlash,
            Token::Str("b".into()),
            Token::Newline,
            Token::Eof,
        ]
    );
}

#[test]
fn test_augmented_assignment_tokens() {
    let t = Tokenizer::tokenize("+= -= *= /= //= %= &= |= ^= <<= >>=").unwrap();
    let ops: Vec<_> = t.into_iter().take_while(|t| *t != Token::Newline).collect();
    assert_eq!(ops.len(), 11);
    assert!(ops.iter().all(Token::is_augmented_assign));
}

#[test]
fn test_indent_and_outdent() {
    let src = "def f():\n    if x:\n        pass\n    return\ny\n";
    let t = Tokenizer::tokenize(src).unwrap();
    assert_eq!(
        t,
        vec![
            Token::Def,
            Token::Ident("f".into()),
            Token::LParen,
            Token::RParen,
            Token::Colon,
            Token::Newline,
            Token::Indent,
            Token::If,
            Token::Ident("x".into()),
            Token::Colon,
            Token::Newline,
            Token::Indent,
            Token::Pass,
            Token::Newline,
            Token::Outdent,
            Token::Return,
            Token::Newline,
            Token::Outdent,
            Token::Ident("y".into()),
            Token::Newline,
            Token::Eof,
        ]
    );
}

#[test]
fn test_blank_lines_and_comments_are_ignored() {
    let src = "# leading comment\n\na  # trailing\n\n   # indented comment\nb\n";
    let t = Tokenizer::tokenize(src).unwrap();
    let mut expected = idents(&["a"]);
    expected.push(Token::Newline);
    expected.extend(idents(&["b"]));
    expected.push(Token::Newline);
    expected.push(Token::Eof);
    assert_eq!(t, expected);
}

#[test]
fn test_newlines_inside_brackets() {
    let t = Tokenizer::tokenize("f(a,\n  b)\n").unwrap();
    assert_eq!(
        t,
        vec![
            Token::Ident("f".into()),
            Token::LParen,
            Token::Ident("a".into()),
            Token::Comma,
            Token::Ident("b".into()),
            Token::RParen,
            Token::Newline,
            Token::Eof,
        ]
    );
}

#[test]
fn test_bad_dedent() {
    let err = Tokenizer::tokenize("if x:\n    a\n  b\n").unwrap_err();
    assert!(err.message.contains("unindent"), "{err}");
    assert_eq!(err.position.line, 3);
}

#[test]
fn test_numbers() {
    let t = Tokenizer::tokenize("0x1F 0o17 0b101 12 3.0 1e3 .5").unwrap();
    assert_eq!(
        &t[..7],
        &[
            Token::Int(31),
            Token::Int(15),
            Token::Int(5),
            Token::Int(12),
            Token::Float(3.0),
            Token::Float(1000.0),
            Token::Float(0.5),
        ]
    );
    assert!(Tokenizer::tokenize("012").is_err());
    assert!(Tokenizer::tokenize("99999999999999999999").is_err());
}

#[test]
fn test_strings_and_escapes() {
    let t = Tokenizer::tokenize(r#"'a\tb' r'a\tb' b'\x00\xff' "\u00e9" """x"y""""#).unwrap();
    assert_eq!(t[0], Token::Str("a\tb".into()));
    assert_eq!(t[1], Token::Str("a\\tb".into()));
    assert_eq!(t[2], Token::Bytes(vec![0, 0xff]));
    assert_eq!(t[3], Token::Str("é".into()));
    assert_eq!(t[4], Token::Str("x\"y".into()));
}

#[test]
fn test_unterminated_string() {
    let err = Tokenizer::tokenize("x = 'abc\n").unwrap_err();
    assert!(err.message.contains("newline"), "{err}");
}

#[test]
fn test_reserved_keyword() {
    let err = Tokenizer::tokenize("import x").unwrap_err();
    assert_eq!(err.message, "keyword import is reserved");
}

#[test]
fn test_spans_track_lines_and_columns() {
    let (tokens, spans) = Tokenizer::tokenize_with_spans("a = 1\n  \nbb + c\n").unwrap();
    assert_eq!(tokens.len(), spans.len());
    assert_eq!(spans[0], Position::new(1, 1));
    assert_eq!(spans[2], Position::new(1, 5));
    let bb = tokens.iter().position(|t| *t == Token::Ident("bb".into())).unwrap();
    assert_eq!(spans[bb], Position::new(3, 1));
    assert_eq!(spans[bb + 2], Position::new(3, 6));
}
