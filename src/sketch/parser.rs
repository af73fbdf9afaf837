use std::collections::HashMap;

use super::lexer::{tokenize, Token, TokenKind};
use crate::error::ScriptError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BitAnd,
    BitOr,
    BitXor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Var(String),
    Assign {
        target: String,
        op: Option<BinaryOp>,
        value: Box<Expr>,
    },
    Step {
        target: String,
        delta: i64,
        prefix: bool,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    /// `hw.name(args)`, possibly under `await`.
    Capability {
        name: String,
        args: Vec<Expr>,
        awaited: bool,
    },
    /// Any other call; only capabilities are callable.
    Call(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let(Vec<(String, Option<Expr>)>),
    Expr(Expr),
    If(Expr, Box<Stmt>, Option<Box<Stmt>>),
    While(Expr, Box<Stmt>),
    DoWhile(Box<Stmt>, Expr),
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    Block(Vec<Stmt>),
    Break,
    Continue,
    Return(Option<Expr>),
    Empty,
}

/// A compiled host script: global bindings in declaration order plus the
/// named procedures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub globals: Vec<Stmt>,
    pub functions: HashMap<String, Vec<Stmt>>,
}

impl Program {
    pub fn parse(source: &str) -> Result<Self, ScriptError> {
        Parser::new(tokenize(source)?).program()
    }

    pub fn function(&self, name: &str) -> Option<&[Stmt]> {
        self.functions.get(name).map(Vec::as_slice)
    }
}

const RESERVED: [&str; 12] = [
    "let", "fn", "if", "else", "while", "do", "for", "break", "continue", "return", "await", "hw",
];

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn program(mut self) -> Result<Program, ScriptError> {
        let mut program = Program::default();
        loop {
            if self.peek() == &TokenKind::Eof {
                return Ok(program);
            }
            if self.eat_word("fn") {
                let name = self.ident()?;
                self.expect("(")?;
                self.expect(")")?;
                let body = self.block()?;
                program.functions.insert(name, body);
            } else if self.is_word("let") {
                program.globals.push(self.statement()?);
            } else if self.eat_sym(";") {
                continue;
            } else {
                return Err(self.error("expected `let` or `fn` at top level"));
            }
        }
    }

    // --- statements ---

    fn block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.expect("{")?;
        let mut stmts = Vec::new();
        while !self.eat_sym("}") {
            if self.peek() == &TokenKind::Eof {
                return Err(self.error("unclosed block"));
            }
            stmts.push(self.statement()?);
        }
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        if self.is_sym("{") {
            return Ok(Stmt::Block(self.block()?));
        }
        if self.eat_sym(";") {
            return Ok(Stmt::Empty);
        }
        if self.is_word("let") {
            let stmt = self.let_declaration()?;
            self.expect(";")?;
            return Ok(stmt);
        }
        if self.eat_word("if") {
            let cond = self.condition()?;
            let then = Box::new(self.statement()?);
            let otherwise = if self.eat_word("else") {
                Some(Box::new(self.statement()?))
            } else {
                None
            };
            return Ok(Stmt::If(cond, then, otherwise));
        }
        if self.eat_word("while") {
            let cond = self.condition()?;
            return Ok(Stmt::While(cond, Box::new(self.statement()?)));
        }
        if self.eat_word("do") {
            let body = Box::new(self.statement()?);
            if !self.eat_word("while") {
                return Err(self.error("expected `while` after `do` body"));
            }
            let cond = self.condition()?;
            self.expect(";")?;
            return Ok(Stmt::DoWhile(body, cond));
        }
        if self.eat_word("for") {
            return self.for_statement();
        }
        if self.eat_word("break") {
            self.expect(";")?;
            return Ok(Stmt::Break);
        }
        if self.eat_word("continue") {
            self.expect(";")?;
            return Ok(Stmt::Continue);
        }
        if self.eat_word("return") {
            let value = if self.is_sym(";") {
                None
            } else {
                Some(self.expression()?)
            };
            self.expect(";")?;
            return Ok(Stmt::Return(value));
        }

        let expr = self.expression()?;
        self.expect(";")?;
        Ok(Stmt::Expr(expr))
    }

    fn let_declaration(&mut self) -> Result<Stmt, ScriptError> {
        self.eat_word("let");
        let mut bindings = Vec::new();
        loop {
            let name = self.ident()?;
            let init = if self.eat_sym("=") {
                Some(self.assignment()?)
            } else {
                None
            };
            bindings.push((name, init));
            if !self.eat_sym(",") {
                return Ok(Stmt::Let(bindings));
            }
        }
    }

    fn for_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.expect("(")?;
        let init = if self.eat_sym(";") {
            None
        } else {
            let init = if self.is_word("let") {
                self.let_declaration()?
            } else {
                Stmt::Expr(self.expression()?)
            };
            self.expect(";")?;
            Some(Box::new(init))
        };
        let cond = if self.is_sym(";") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(";")?;
        let step = if self.is_sym(")") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(")")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For {
            init,
            cond,
            step,
            body,
        })
    }

    fn condition(&mut self) -> Result<Expr, ScriptError> {
        self.expect("(")?;
        let cond = self.expression()?;
        self.expect(")")?;
        Ok(cond)
    }

    // --- expressions, lowest precedence first ---

    /// Comma-free expression; the comma operator is not part of the subset.
    fn expression(&mut self) -> Result<Expr, ScriptError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, ScriptError> {
        let lhs = self.ternary()?;
        let op = match self.peek() {
            TokenKind::Sym("=") => None,
            TokenKind::Sym("+=") => Some(BinaryOp::Add),
            TokenKind::Sym("-=") => Some(BinaryOp::Sub),
            TokenKind::Sym("*=") => Some(BinaryOp::Mul),
            TokenKind::Sym("/=") => Some(BinaryOp::Div),
            TokenKind::Sym("%=") => Some(BinaryOp::Rem),
            _ => return Ok(lhs),
        };
        let Expr::Var(target) = lhs else {
            return Err(self.error("invalid assignment target"));
        };
        self.advance();
        let value = Box::new(self.assignment()?);
        Ok(Expr::Assign { target, op, value })
    }

    fn ternary(&mut self) -> Result<Expr, ScriptError> {
        let cond = self.logical_or()?;
        if !self.eat_sym("?") {
            return Ok(cond);
        }
        let then = self.assignment()?;
        self.expect(":")?;
        let otherwise = self.assignment()?;
        Ok(Expr::Ternary(
            Box::new(cond),
            Box::new(then),
            Box::new(otherwise),
        ))
    }

    fn logical_or(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.logical_and()?;
        while self.eat_sym("||") {
            let rhs = self.logical_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn logical_and(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.bit_or()?;
        while self.eat_sym("&&") {
            let rhs = self.bit_or()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn bit_or(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(&[("|", BinaryOp::BitOr)], Self::bit_xor)
    }

    fn bit_xor(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(&[("^", BinaryOp::BitXor)], Self::bit_and)
    }

    fn bit_and(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(&[("&", BinaryOp::BitAnd)], Self::equality)
    }

    fn equality(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(&[("==", BinaryOp::Eq), ("!=", BinaryOp::Ne)], Self::relational)
    }

    fn relational(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(
            &[
                ("<", BinaryOp::Lt),
                ("<=", BinaryOp::Le),
                (">", BinaryOp::Gt),
                (">=", BinaryOp::Ge),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(&[("+", BinaryOp::Add), ("-", BinaryOp::Sub)], Self::multiplicative)
    }

    fn multiplicative(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(
            &[("*", BinaryOp::Mul), ("/", BinaryOp::Div), ("%", BinaryOp::Rem)],
            Self::unary,
        )
    }

    fn binary_level(
        &mut self,
        ops: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, ScriptError>,
    ) -> Result<Expr, ScriptError> {
        let mut lhs = next(self)?;
        loop {
            let found = match self.peek() {
                TokenKind::Sym(sym) => ops.iter().find(|(s, _)| s == sym).map(|(_, op)| *op),
                _ => None,
            };
            let Some(op) = found else {
                return Ok(lhs);
            };
            self.advance();
            let rhs = next(self)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        if self.eat_sym("!") {
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(self.unary()?)));
        }
        if self.eat_sym("-") {
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.unary()?)));
        }
        if self.eat_sym("+") {
            return Ok(Expr::Unary(UnaryOp::Plus, Box::new(self.unary()?)));
        }
        for (sym, delta) in [("++", 1), ("--", -1)] {
            if self.eat_sym(sym) {
                let target = self.ident()?;
                return Ok(Expr::Step {
                    target,
                    delta,
                    prefix: true,
                });
            }
        }
        if self.eat_word("await") {
            return match self.postfix()? {
                Expr::Capability { name, args, .. } => Ok(Expr::Capability {
                    name,
                    args,
                    awaited: true,
                }),
                _ => Err(self.error("`await` expects a hw capability call")),
            };
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let expr = self.primary()?;
        if let Expr::Var(target) = &expr {
            for (sym, delta) in [("++", 1), ("--", -1)] {
                if self.eat_sym(sym) {
                    return Ok(Expr::Step {
                        target: target.clone(),
                        delta,
                        prefix: false,
                    });
                }
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Int(n) => Ok(Expr::Int(n)),
            TokenKind::Float(f) => Ok(Expr::Float(f)),
            TokenKind::Str(s) => Ok(Expr::Str(s)),
            TokenKind::Sym("(") => {
                let inner = self.expression()?;
                self.expect(")")?;
                Ok(inner)
            }
            TokenKind::Ident(word) => match word.as_str() {
                "true" => Ok(Expr::Int(1)),
                "false" => Ok(Expr::Int(0)),
                "hw" => {
                    self.expect(".")?;
                    let name = self.ident()?;
                    let args = self.arguments()?;
                    Ok(Expr::Capability {
                        name,
                        args,
                        awaited: false,
                    })
                }
                w if RESERVED.contains(&w) => Err(ScriptError::Syntax {
                    line: token.line,
                    message: format!("unexpected `{}`", w),
                }),
                _ if self.is_sym("(") => {
                    self.arguments()?;
                    Ok(Expr::Call(word))
                }
                _ => Ok(Expr::Var(word)),
            },
            other => Err(ScriptError::Syntax {
                line: token.line,
                message: format!("unexpected {}", describe(&other)),
            }),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ScriptError> {
        self.expect("(")?;
        let mut args = Vec::new();
        if self.eat_sym(")") {
            return Ok(args);
        }
        loop {
            args.push(self.assignment()?);
            if self.eat_sym(")") {
                return Ok(args);
            }
            self.expect(",")?;
        }
    }

    // --- token helpers ---

    fn peek(&self) -> &TokenKind {
        match self.tokens.get(self.pos) {
            Some(token) => &token.kind,
            None => &TokenKind::Eof,
        }
    }

    fn advance(&mut self) -> Token {
        match self.tokens.get(self.pos) {
            Some(token) => {
                let token = token.clone();
                if token.kind != TokenKind::Eof {
                    self.pos += 1;
                }
                token
            }
            None => Token {
                kind: TokenKind::Eof,
                line: self.line(),
            },
        }
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn is_sym(&self, sym: &str) -> bool {
        matches!(self.peek(), TokenKind::Sym(s) if *s == sym)
    }

    fn is_word(&self, word: &str) -> bool {
        matches!(self.peek(), TokenKind::Ident(w) if w == word)
    }

    fn eat_sym(&mut self, sym: &str) -> bool {
        let found = self.is_sym(sym);
        if found {
            self.pos += 1;
        }
        found
    }

    fn eat_word(&mut self, word: &str) -> bool {
        let found = self.is_word(word);
        if found {
            self.pos += 1;
        }
        found
    }

    fn expect(&mut self, sym: &str) -> Result<(), ScriptError> {
        if self.eat_sym(sym) {
            Ok(())
        } else {
            Err(self.error(&format!("expected `{}`, found {}", sym, describe(self.peek()))))
        }
    }

    fn ident(&mut self) -> Result<String, ScriptError> {
        match self.peek() {
            TokenKind::Ident(word) if !RESERVED.contains(&word.as_str()) => {
                let word = word.clone();
                self.pos += 1;
                Ok(word)
            }
            other => Err(self.error(&format!("expected a name, found {}", describe(other)))),
        }
    }

    fn error(&self, message: &str) -> ScriptError {
        ScriptError::Syntax {
            line: self.line(),
            message: message.to_string(),
        }
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Int(n) => format!("`{}`", n),
        TokenKind::Float(f) => format!("`{}`", f),
        TokenKind::Str(_) => "a string".to_string(),
        TokenKind::Ident(w) => format!("`{}`", w),
        TokenKind::Sym(s) => format!("`{}`", s),
        TokenKind::Eof => "end of input".to_string(),
    }
}
