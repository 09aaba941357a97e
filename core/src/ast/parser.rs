use crate::ast::{
    Arg, BinaryOp, BranchKind, Clause, Comprehension, ComprehensionBody, Def, DictEntry, Expr, File, Ident, Lambda,
    Literal, Load, Param, Stmt, UnaryOp,
};
use crate::token::{ParseError, Position, Token, Tokenizer};

type PResult<T> = Result<T, ParseError>;

/// Highest binary-operator precedence; above it come unary operators.
const MAX_PREC: usize = 9;
/// Precedence level at which prefix `not` is accepted.
const NOT_PREC: usize = 2;

fn binary_precedence(tok: &Token) -> Option<(BinaryOp, usize)> {
    Some(match tok {
        Token::Or => (BinaryOp::Or, 0),
        Token::And => (BinaryOp::And, 1),
        Token::Eq => (BinaryOp::Eq, 3),
        Token::Ne => (BinaryOp::Ne, 3),
        Token::Lt => (BinaryOp::Lt, 3),
        Token::Gt => (BinaryOp::Gt, 3),
        Token::Le => (BinaryOp::Le, 3),
        Token::Ge => (BinaryOp::Ge, 3),
        Token::In => (BinaryOp::In, 3),
        Token::Pipe => (BinaryOp::Pipe, 4),
        Token::Caret => (BinaryOp::Caret, 5),
        Token::Amp => (BinaryOp::Amp, 6),
        Token::LtLt => (BinaryOp::LtLt, 7),
        Token::GtGt => (BinaryOp::GtGt, 7),
        Token::Plus => (BinaryOp::Plus, 8),
        Token::Minus => (BinaryOp::Minus, 8),
        Token::Star => (BinaryOp::Star, 9),
        Token::Slash => (BinaryOp::Slash, 9),
        Token::SlashSlash => (BinaryOp::SlashSlash, 9),
        Token::Percent => (BinaryOp::Percent, 9),
        _ => return None,
    })
}

fn augmented_op(tok: &Token) -> Option<BinaryOp> {
    Some(match tok {
        Token::PlusEq => BinaryOp::Plus,
        Token::MinusEq => BinaryOp::Minus,
        Token::StarEq => BinaryOp::Star,
        Token::SlashEq => BinaryOp::Slash,
        Token::SlashSlashEq => BinaryOp::SlashSlash,
        Token::PercentEq => BinaryOp::Percent,
        Token::AmpEq => BinaryOp::Amp,
        Token::PipeEq => BinaryOp::Pipe,
        Token::CaretEq => BinaryOp::Caret,
        Token::LtLtEq => BinaryOp::LtLt,
        Token::GtGtEq => BinaryOp::GtGt,
        _ => return None,
    })
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c == '_' || c.is_alphabetic()) && chars.all(|c| c == '_' || c.is_alphanumeric())
}

/// Parses a whole source file.
pub fn parse_file(name: &str, src: &str) -> PResult<File> {
    let (tokens, spans) = Tokenizer::tokenize_with_spans(src)?;
    let mut parser = Parser::new(&tokens, &spans);
    let stmts = parser.parse_stmts_until_eof()?;
    Ok(File {
        name: name.to_string(),
        stmts,
    })
}

/// Parses a single expression, as typed at a REPL prompt or passed to `eval`.
pub fn parse_expr(src: &str) -> PResult<Expr> {
    let (tokens, spans) = Tokenizer::tokenize_with_spans(src)?;
    let mut parser = Parser::new(&tokens, &spans);
    let expr = parser.parse_expr()?;
    parser.eat(&Token::Newline);
    if parser.peek() != &Token::Eof {
        return parser.unexpected("end of expression");
    }
    Ok(expr)
}

/// Recursive-descent parser over a token slice with aligned positions.
pub struct Parser<'a> {
    tokens: &'a [Token],
    spans: &'a [Position],
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token], spans: &'a [Position]) -> Self {
        Self { tokens, spans, pos: 0 }
    }

    #[inline]
    fn peek(&self) -> &'a Token {
        let tokens: &'a [Token] = self.tokens;
        tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    #[inline]
    fn peek_at(&self, n: usize) -> &'a Token {
        let tokens: &'a [Token] = self.tokens;
        tokens.get(self.pos + n).unwrap_or(&Token::Eof)
    }

    #[inline]
    fn peek_pos(&self) -> Position {
        self.spans
            .get(self.pos)
            .or_else(|| self.spans.last())
            .copied()
            .unwrap_or_default()
    }

    /// Consumes the current token and returns its position.
    fn bump(&mut self) -> Position {
        let pos = self.peek_pos();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        pos
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == tok {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Token) -> PResult<Position> {
        if self.peek() == tok {
            Ok(self.bump())
        } else {
            self.unexpected(&tok.to_string())
        }
    }

    fn unexpected<T>(&self, want: &str) -> PResult<T> {
        Err(ParseError::new(
            format!("got {}, want {}", self.peek(), want),
            self.peek_pos(),
        ))
    }

    fn parse_ident(&mut self) -> PResult<Ident> {
        match self.peek() {
            Token::Ident(name) => {
                let pos = self.bump();
                Ok(Ident::new(name.clone(), pos))
            }
            _ => self.unexpected("identifier"),
        }
    }

    fn parse_stmts_until_eof(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            while self.eat(&Token::Newline) {}
            if self.peek() == &Token::Eof {
                return Ok(stmts);
            }
            stmts.extend(self.parse_stmt()?);
        }
    }

    fn parse_stmt(&mut self) -> PResult<Vec<Stmt>> {
        match self.peek() {
            Token::Def => Ok(vec![self.parse_def()?]),
            Token::If => Ok(vec![self.parse_if()?]),
            Token::For => Ok(vec![self.parse_for()?]),
            Token::While => Ok(vec![self.parse_while()?]),
            Token::Indent => self.unexpected("statement (unexpected indent)"),
            _ => self.parse_simple_stmt(),
        }
    }

    fn parse_def(&mut self) -> PResult<Stmt> {
        let pos = self.bump();
        let name = self.parse_ident()?;
        self.expect(&Token::LParen)?;
        let params = self.parse_params(&Token::RParen)?;
        self.expect(&Token::RParen)?;
        self.expect(&Token::Colon)?;
        let body = self.parse_suite()?;
        Ok(Stmt::Def(Box::new(Def {
            name,
            params,
            body,
            pos,
            function: Default::default(),
        })))
    }

    /// Parses `if`/`elif` chains; each `elif` becomes a nested `If` in the else branch.
    fn parse_if(&mut self) -> PResult<Stmt> {
        let pos = self.bump();
        let cond = self.parse_test()?;
        self.expect(&Token::Colon)?;
        let then = self.parse_suite()?;
        let otherwise = match self.peek() {
            Token::Elif => vec![self.parse_if()?],
            Token::Else => {
                self.bump();
                self.expect(&Token::Colon)?;
                self.parse_suite()?
            }
            _ => Vec::new(),
        };
        Ok(Stmt::If {
            cond,
            then,
            otherwise,
            pos,
        })
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        let pos = self.bump();
        let vars = self.parse_loop_vars()?;
        self.expect(&Token::In)?;
        let iterable = self.parse_expr()?;
        self.expect(&Token::Colon)?;
        let body = self.parse_suite()?;
        Ok(Stmt::For {
            vars,
            iterable,
            body,
            pos,
        })
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        let pos = self.bump();
        let cond = self.parse_test()?;
        self.expect(&Token::Colon)?;
        let body = self.parse_suite()?;
        Ok(Stmt::While { cond, body, pos })
    }

    fn parse_suite(&mut self) -> PResult<Vec<Stmt>> {
        if !self.eat(&Token::Newline) {
            return self.parse_simple_stmt();
        }
        if self.peek() != &Token::Indent {
            return self.unexpected("indented block");
        }
        self.bump();
        let mut stmts = Vec::new();
        while !matches!(self.peek(), Token::Outdent | Token::Eof) {
            stmts.extend(self.parse_stmt()?);
        }
        self.eat(&Token::Outdent);
        Ok(stmts)
    }

    fn parse_simple_stmt(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = vec![self.parse_small_stmt()?];
        while self.eat(&Token::Semicolon) {
            if matches!(self.peek(), Token::Newline | Token::Eof) {
                break;
            }
            stmts.push(self.parse_small_stmt()?);
        }
        if !self.eat(&Token::Newline) && self.peek() != &Token::Eof {
            return self.unexpected("newline");
        }
        Ok(stmts)
    }

    fn parse_small_stmt(&mut self) -> PResult<Stmt> {
        let branch = match self.peek() {
            Token::Return => {
                let pos = self.bump();
                let result = if matches!(self.peek(), Token::Newline | Token::Eof | Token::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                return Ok(Stmt::Return { result, pos });
            }
            Token::Load => return self.parse_load(),
            Token::Break => BranchKind::Break,
            Token::Continue => BranchKind::Continue,
            Token::Pass => BranchKind::Pass,
            _ => {
                let lhs = self.parse_expr()?;
                let op = match self.peek() {
                    Token::Assign => None,
                    tok if tok.is_augmented_assign() => augmented_op(tok),
                    _ => return Ok(Stmt::Expr(lhs)),
                };
                let op_pos = self.bump();
                let rhs = self.parse_expr()?;
                return Ok(Stmt::Assign { op, lhs, rhs, op_pos });
            }
        };
        let pos = self.bump();
        Ok(Stmt::Branch { kind: branch, pos })
    }

    fn parse_string(&mut self, what: &str) -> PResult<(String, Position)> {
        match self.peek() {
            Token::Str(s) => {
                let pos = self.bump();
                Ok((s.clone(), pos))
            }
            _ => self.unexpected(what),
        }
    }

    // load("module", "a", b="c")
    fn parse_load(&mut self) -> PResult<Stmt> {
        let pos = self.bump();
        self.expect(&Token::LParen)?;
        let (module, module_pos) = self.parse_string("module name string")?;
        let mut from = Vec::new();
        let mut to = Vec::new();
        while self.eat(&Token::Comma) {
            match self.peek() {
                Token::RParen => break,
                Token::Ident(_) => {
                    let local = self.parse_ident()?;
                    self.expect(&Token::Assign)?;
                    let (name, name_pos) = self.parse_string("quoted name after '='")?;
                    from.push(Ident::new(name, name_pos));
                    to.push(local);
                }
                Token::Str(_) => {
                    let (name, name_pos) = self.parse_string("quoted name")?;
                    if !is_identifier(&name) {
                        return Err(ParseError::new(format!("load: invalid identifier {name:?}"), name_pos));
                    }
                    from.push(Ident::new(name.clone(), name_pos));
                    to.push(Ident::new(name, name_pos));
                }
                _ => return self.unexpected(r#""name" or localname="name""#),
            }
        }
        self.expect(&Token::RParen)?;
        if to.is_empty() {
            return Err(ParseError::new("load statement must import at least 1 symbol", pos));
        }
        Ok(Stmt::Load(Box::new(Load {
            module,
            module_pos,
            from,
            to,
            pos,
        })))
    }

    fn parse_params(&mut self, close: &Token) -> PResult<Vec<Param>> {
        let mut params = Vec::new();
        if self.peek() == close {
            return Ok(params);
        }
        loop {
            let param = match self.peek() {
                Token::Star => {
                    let pos = self.bump();
                    let name = match self.peek() {
                        Token::Ident(_) => Some(self.parse_ident()?),
                        _ => None,
                    };
                    Param::Star { pos, name }
                }
                Token::StarStar => {
                    let pos = self.bump();
                    Param::StarStar {
                        pos,
                        name: self.parse_ident()?,
                    }
                }
                _ => {
                    let name = self.parse_ident()?;
                    if self.eat(&Token::Assign) {
                        Param::Optional {
                            name,
                            default: self.parse_test()?,
                        }
                    } else {
                        Param::Required(name)
                    }
                }
            };
            params.push(param);
            if !self.eat(&Token::Comma) || self.peek() == close {
                return Ok(params);
            }
        }
    }

    fn parse_loop_vars(&mut self) -> PResult<Expr> {
        let first = self.parse_primary()?;
        if self.peek() != &Token::Comma {
            return Ok(first);
        }
        let pos = first.pos();
        let mut elems = vec![first];
        while self.eat(&Token::Comma) {
            if self.peek() == &Token::In {
                break;
            }
            elems.push(self.parse_primary()?);
        }
        Ok(Expr::Tuple { elems, pos })
    }

    /// `test {',' test} [',']`; a comma anywhere makes a tuple.
    pub fn parse_expr(&mut self) -> PResult<Expr> {
        let first = self.parse_test()?;
        if self.peek() != &Token::Comma {
            return Ok(first);
        }
        let pos = first.pos();
        let mut elems = vec![first];
        while self.eat(&Token::Comma) {
            if matches!(
                self.peek(),
                Token::Eof
                    | Token::Newline
                    | Token::Assign
                    | Token::RBrace
                    | Token::RBracket
                    | Token::RParen
                    | Token::Semicolon
                    | Token::Colon
            ) {
                break;
            }
            elems.push(self.parse_test()?);
        }
        Ok(Expr::Tuple { elems, pos })
    }

    fn parse_test(&mut self) -> PResult<Expr> {
        if self.peek() == &Token::Lambda {
            return self.parse_lambda();
        }
        let x = self.parse_test_prec(0)?;
        if self.peek() != &Token::If {
            return Ok(x);
        }
        let pos = self.bump();
        let cond = self.parse_test_prec(0)?;
        if self.peek() != &Token::Else {
            return Err(ParseError::new(
                "conditional expression without else clause",
                self.peek_pos(),
            ));
        }
        self.bump();
        let otherwise = self.parse_test()?;
        Ok(Expr::CondExpr {
            cond: Box::new(cond),
            then: Box::new(x),
            otherwise: Box::new(otherwise),
            pos,
        })
    }

    fn parse_test_no_cond(&mut self) -> PResult<Expr> {
        if self.peek() == &Token::Lambda {
            return self.parse_lambda();
        }
        self.parse_test_prec(0)
    }

    fn parse_lambda(&mut self) -> PResult<Expr> {
        let pos = self.bump();
        let params = self.parse_params(&Token::Colon)?;
        self.expect(&Token::Colon)?;
        let body = self.parse_test()?;
        Ok(Expr::Lambda(Box::new(Lambda {
            params,
            body,
            pos,
            function: Default::default(),
        })))
    }

    fn parse_test_prec(&mut self, prec: usize) -> PResult<Expr> {
        if prec > MAX_PREC {
            return self.parse_unary();
        }
        if prec == NOT_PREC && self.peek() == &Token::Not {
            let pos = self.bump();
            let x = self.parse_test_prec(prec)?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                x: Box::new(x),
                pos,
            });
        }
        self.parse_binary(prec)
    }

    fn parse_binary(&mut self, prec: usize) -> PResult<Expr> {
        let mut x = self.parse_test_prec(prec + 1)?;
        let mut first = true;
        loop {
            let (op, op_prec, width) = match self.peek() {
                Token::Not if self.peek_at(1) == &Token::In => (BinaryOp::NotIn, 3, 2),
                tok => match binary_precedence(tok) {
                    Some((op, p)) => (op, p, 1),
                    None => return Ok(x),
                },
            };
            if op_prec < prec {
                return Ok(x);
            }
            if !first && op.is_comparison() {
                let prev = match &x {
                    Expr::Binary { op, .. } => op.as_str(),
                    _ => "comparison",
                };
                return Err(ParseError::new(
                    format!("{} does not associate with {} (use parens)", prev, op.as_str()),
                    self.peek_pos(),
                ));
            }
            let op_pos = self.bump();
            if width == 2 {
                self.bump();
            }
            let y = self.parse_test_prec(op_prec + 1)?;
            x = Expr::Binary {
                op,
                x: Box::new(x),
                y: Box::new(y),
                op_pos,
            };
            first = false;
        }
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let op = match self.peek() {
            Token::Plus => UnaryOp::Plus,
            Token::Minus => UnaryOp::Minus,
            Token::Tilde => UnaryOp::Tilde,
            _ => return self.parse_primary(),
        };
        let pos = self.bump();
        let x = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            x: Box::new(x),
            pos,
        })
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let mut x = self.parse_operand()?;
        loop {
            x = match self.peek() {
                Token::Dot => {
                    let dot = self.bump();
                    let name = self.parse_ident()?.name;
                    Expr::Dot {
                        x: Box::new(x),
                        name,
                        dot,
                    }
                }
                Token::LBracket => self.parse_index_or_slice(x)?,
                Token::LParen => {
                    let lparen = self.bump();
                    let args = self.parse_args()?;
                    self.expect(&Token::RParen)?;
                    Expr::Call {
                        func: Box::new(x),
                        args,
                        lparen,
                    }
                }
                _ => return Ok(x),
            };
        }
    }

    fn parse_index_or_slice(&mut self, x: Expr) -> PResult<Expr> {
        let lbrack = self.bump();
        let mut lo = None;
        if self.peek() != &Token::Colon {
            let y = self.parse_expr()?;
            if self.eat(&Token::RBracket) {
                return Ok(Expr::Index {
                    x: Box::new(x),
                    y: Box::new(y),
                    lbrack,
                });
            }
            lo = Some(Box::new(y));
        }
        self.expect(&Token::Colon)?;
        let hi = if matches!(self.peek(), Token::Colon | Token::RBracket) {
            None
        } else {
            Some(Box::new(self.parse_test()?))
        };
        let step = if self.eat(&Token::Colon) && self.peek() != &Token::RBracket {
            Some(Box::new(self.parse_test()?))
        } else {
            None
        };
        self.expect(&Token::RBracket)?;
        Ok(Expr::Slice {
            x: Box::new(x),
            lo,
            hi,
            step,
            lbrack,
        })
    }

    fn parse_args(&mut self) -> PResult<Vec<Arg>> {
        let mut args = Vec::new();
        if self.peek() == &Token::RParen {
            return Ok(args);
        }
        loop {
            let pos = self.peek_pos();
            let arg = match self.peek() {
                Token::Star => {
                    self.bump();
                    Arg::Star {
                        pos,
                        value: self.parse_test()?,
                    }
                }
                Token::StarStar => {
                    self.bump();
                    Arg::StarStar {
                        pos,
                        value: self.parse_test()?,
                    }
                }
                Token::Ident(name) if self.peek_at(1) == &Token::Assign => {
                    self.bump();
                    self.bump();
                    Arg::Named {
                        name: name.clone(),
                        pos,
                        value: self.parse_test()?,
                    }
                }
                _ => Arg::Positional(self.parse_test()?),
            };
            args.push(arg);
            if !self.eat(&Token::Comma) || self.peek() == &Token::RParen {
                return Ok(args);
            }
        }
    }

    fn parse_operand(&mut self) -> PResult<Expr> {
        let pos = self.peek_pos();
        let literal = match self.peek() {
            Token::Ident(name) => {
                self.bump();
                return Ok(Expr::Ident(Ident::new(name.clone(), pos)));
            }
            Token::Int(i) => Literal::Int(*i),
            Token::Float(f) => Literal::Float(*f),
            Token::Str(s) => Literal::Str(s.clone()),
            Token::Bytes(b) => Literal::Bytes(b.clone()),
            Token::LParen => {
                self.bump();
                if self.eat(&Token::RParen) {
                    return Ok(Expr::Tuple {
                        elems: Vec::new(),
                        pos,
                    });
                }
                let x = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                return Ok(Expr::Paren { x: Box::new(x), pos });
            }
            Token::LBracket => return self.parse_list(),
            Token::LBrace => return self.parse_dict(),
            _ => return self.unexpected("primary expression"),
        };
        self.bump();
        Ok(Expr::Literal { value: literal, pos })
    }

    fn parse_list(&mut self) -> PResult<Expr> {
        let pos = self.bump();
        if self.eat(&Token::RBracket) {
            return Ok(Expr::List {
                elems: Vec::new(),
                pos,
            });
        }
        let first = self.parse_test()?;
        if self.peek() == &Token::For {
            let clauses = self.parse_clauses()?;
            self.expect(&Token::RBracket)?;
            return Ok(Expr::Comprehension(Box::new(Comprehension {
                body: ComprehensionBody::Elem(first),
                clauses,
                pos,
            })));
        }
        let mut elems = vec![first];
        while self.eat(&Token::Comma) {
            if self.peek() == &Token::RBracket {
                break;
            }
            elems.push(self.parse_test()?);
        }
        self.expect(&Token::RBracket)?;
        Ok(Expr::List { elems, pos })
    }

    fn parse_dict(&mut self) -> PResult<Expr> {
        let pos = self.bump();
        if self.eat(&Token::RBrace) {
            return Ok(Expr::Dict {
                entries: Vec::new(),
                pos,
            });
        }
        let first = self.parse_dict_entry()?;
        if self.peek() == &Token::For {
            let clauses = self.parse_clauses()?;
            self.expect(&Token::RBrace)?;
            return Ok(Expr::Comprehension(Box::new(Comprehension {
                body: ComprehensionBody::Entry(first),
                clauses,
                pos,
            })));
        }
        let mut entries = vec![first];
        while self.eat(&Token::Comma) {
            if self.peek() == &Token::RBrace {
                break;
            }
            entries.push(self.parse_dict_entry()?);
        }
        self.expect(&Token::RBrace)?;
        Ok(Expr::Dict { entries, pos })
    }

    fn parse_dict_entry(&mut self) -> PResult<DictEntry> {
        let key = self.parse_test()?;
        let colon = self.expect(&Token::Colon)?;
        let value = self.parse_test()?;
        Ok(DictEntry { key, value, colon })
    }

    fn parse_clauses(&mut self) -> PResult<Vec<Clause>> {
        let mut clauses = Vec::new();
        loop {
            match self.peek() {
                Token::For => {
                    let pos = self.bump();
                    let vars = self.parse_loop_vars()?;
                    self.expect(&Token::In)?;
                    let iterable = self.parse_test_prec(0)?;
                    clauses.push(Clause::For { vars, iterable, pos });
                }
                Token::If => {
                    let pos = self.bump();
                    let cond = self.parse_test_no_cond()?;
                    clauses.push(Clause::If { cond, pos });
                }
                _ => return Ok(clauses),
            }
        }
    }
}
