// Path: crates/lang/src/parser.rs
//! Recursive-descent parser for `axs` functions.

use crate::ast::{BinaryOp, Expr, Function, Param, Stmt, UnaryOp};
use crate::token::{tokenize, Token};
use crate::ParseError;
use artifex_types::record::ScalarType;

/// Parses one function declaration from `source`.
pub fn parse_function(source: &str) -> Result<Function, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let func = parser.function()?;
    parser.expect_eof()?;
    Ok(func)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Token, expected: &'static str) -> Result<(), ParseError> {
        match self.advance() {
            Some(found) if found == tok => Ok(()),
            Some(found) => Err(ParseError::UnexpectedToken {
                found: found.to_string(),
                expected,
            }),
            None => Err(ParseError::UnexpectedEof { expected }),
        }
    }

    fn expect_ident(&mut self, expected: &'static str) -> Result<String, ParseError> {
        match self.advance() {
            Some(Token::Ident(name)) => Ok(name),
            Some(found) => Err(ParseError::UnexpectedToken {
                found: found.to_string(),
                expected,
            }),
            None => Err(ParseError::UnexpectedEof { expected }),
        }
    }

    fn expect_eof(&mut self) -> Result<(), ParseError> {
        match self.peek() {
            None => Ok(()),
            Some(found) => Err(ParseError::UnexpectedToken {
                found: found.to_string(),
                expected: "end of source",
            }),
        }
    }

    fn scalar_type(&mut self) -> Result<ScalarType, ParseError> {
        let name = self.expect_ident("a scalar type")?;
        match name.as_str() {
            "i32" => Ok(ScalarType::I32),
            "i64" => Ok(ScalarType::I64),
            "f64" => Ok(ScalarType::F64),
            "bool" => Ok(ScalarType::Bool),
            other => Err(ParseError::UnexpectedToken {
                found: other.to_string(),
                expected: "one of i32, i64, f64, bool",
            }),
        }
    }

    fn function(&mut self) -> Result<Function, ParseError> {
        let exported = self.eat(&Token::Export);
        self.expect(Token::Function, "the `function` keyword")?;
        let name = self.expect_ident("a function name")?;
        self.expect(Token::LParen, "`(`")?;

        let mut params = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                let pname = self.expect_ident("a parameter name")?;
                let ty = if self.eat(&Token::Colon) {
                    Some(self.scalar_type()?)
                } else {
                    None
                };
                params.push(Param { name: pname, ty });
                if self.eat(&Token::Comma) {
                    continue;
                }
                self.expect(Token::RParen, "`,` or `)`")?;
                break;
            }
        }

        let ret = if self.eat(&Token::Arrow) {
            Some(self.scalar_type()?)
        } else {
            None
        };

        let body = self.block()?;
        Ok(Function {
            name,
            params,
            ret,
            body,
            exported,
        })
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(Token::LBrace, "`{`")?;
        let mut stmts = Vec::new();
        loop {
            if self.eat(&Token::RBrace) {
                return Ok(stmts);
            }
            if self.peek().is_none() {
                return Err(ParseError::UnexpectedEof { expected: "`}`" });
            }
            stmts.push(self.statement()?);
        }
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        let stmt = match self.peek() {
            Some(Token::Let) => {
                self.pos += 1;
                let name = self.expect_ident("a binding name")?;
                self.expect(Token::Assign, "`=`")?;
                let value = self.expression()?;
                Stmt::Let { name, value }
            }
            Some(Token::If) => {
                self.pos += 1;
                return self.if_statement();
            }
            Some(Token::While) => {
                self.pos += 1;
                let cond = self.expression()?;
                let body = self.block()?;
                return Ok(Stmt::While { cond, body });
            }
            Some(Token::Return) => {
                self.pos += 1;
                let value = match self.peek() {
                    Some(Token::RBrace) | Some(Token::Semicolon) | None => None,
                    _ => Some(self.expression()?),
                };
                Stmt::Return(value)
            }
            // `ident = expr` is an assignment; anything else starting an
            // expression falls through to the expression statement.
            Some(Token::Ident(_)) if self.tokens.get(self.pos + 1) == Some(&Token::Assign) => {
                let name = self.expect_ident("a binding name")?;
                self.pos += 1; // `=`
                let value = self.expression()?;
                Stmt::Assign { name, value }
            }
            _ => Stmt::Expr(self.expression()?),
        };
        // Semicolons are optional terminators.
        self.eat(&Token::Semicolon);
        Ok(stmt)
    }

    fn if_statement(&mut self) -> Result<Stmt, ParseError> {
        let cond = self.expression()?;
        let then = self.block()?;
        let otherwise = if self.eat(&Token::Else) {
            if self.eat(&Token::If) {
                Some(vec![self.if_statement()?])
            } else {
                Some(self.block()?)
            }
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then,
            otherwise,
        })
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.and_expr()?;
        while self.eat(&Token::OrOr) {
            let rhs = self.and_expr()?;
            lhs = Expr::Binary {
                op: BinaryOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.equality()?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.equality()?;
            lhs = Expr::Binary {
                op: BinaryOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::Ne,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.comparison()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.additive()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    expr: Box::new(self.unary()?),
                })
            }
            Some(Token::Bang) => {
                self.pos += 1;
                Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(self.unary()?),
                })
            }
            Some(Token::Await) => {
                self.pos += 1;
                Ok(Expr::Await(Box::new(self.unary()?)))
            }
            _ => self.call(),
        }
    }

    fn call(&mut self) -> Result<Expr, ParseError> {
        let primary = self.primary()?;
        if self.peek() == Some(&Token::LParen) {
            let callee = match primary {
                Expr::Ident(name) => name,
                other => {
                    return Err(ParseError::UnexpectedToken {
                        found: format!("{:?}", other),
                        expected: "a callable name",
                    })
                }
            };
            self.pos += 1; // `(`
            let mut args = Vec::new();
            if !self.eat(&Token::RParen) {
                loop {
                    args.push(self.expression()?);
                    if self.eat(&Token::Comma) {
                        continue;
                    }
                    self.expect(Token::RParen, "`,` or `)`")?;
                    break;
                }
            }
            return Ok(Expr::Call { callee, args });
        }
        Ok(primary)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        match self.advance() {
            Some(Token::Int(v)) => Ok(Expr::Int(v)),
            Some(Token::Float(v)) => Ok(Expr::Float(v)),
            Some(Token::True) => Ok(Expr::Bool(true)),
            Some(Token::False) => Ok(Expr::Bool(false)),
            Some(Token::Ident(name)) => {
                // Collapse `a.b.c` into one dotted name.
                let mut full = name;
                while self.peek() == Some(&Token::Dot) {
                    self.pos += 1;
                    let seg = self.expect_ident("a name segment after `.`")?;
                    full.push('.');
                    full.push_str(&seg);
                }
                Ok(Expr::Ident(full))
            }
            Some(Token::LParen) => {
                let inner = self.expression()?;
                self.expect(Token::RParen, "`)`")?;
                Ok(inner)
            }
            Some(found) => Err(ParseError::UnexpectedToken {
                found: found.to_string(),
                expected: "an expression",
            }),
            None => Err(ParseError::UnexpectedEof {
                expected: "an expression",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_canonical_add() {
        let f = parse_function("export function add(a,b){return a+b}").unwrap();
        assert_eq!(f.name, "add");
        assert!(f.exported);
        assert_eq!(f.params.len(), 2);
        assert!(f.params.iter().all(|p| p.ty.is_none()));
        assert_eq!(f.body.len(), 1);
        assert!(matches!(
            f.body[0],
            Stmt::Return(Some(Expr::Binary {
                op: BinaryOp::Add,
                ..
            }))
        ));
    }

    #[test]
    fn parses_annotations_and_control_flow() {
        let src = r#"
            function clamp01(x: f64) -> f64 {
                if x < 0.0 { return 0.0 }
                else if x > 1.0 { return 1.0 }
                return x
            }
        "#;
        let f = parse_function(src).unwrap();
        assert_eq!(f.params[0].ty, Some(ScalarType::F64));
        assert_eq!(f.ret, Some(ScalarType::F64));
        assert!(matches!(f.body[0], Stmt::If { .. }));
    }

    #[test]
    fn parses_loops_lets_and_calls() {
        let src = r#"
            function hyp(a: f64, b: f64) -> f64 {
                let s = a * a + b * b
                let i = 0
                while i < 1 { i = i + 1 }
                return sqrt(s)
            }
        "#;
        let f = parse_function(src).unwrap();
        assert_eq!(f.body.len(), 4);
        assert!(matches!(f.body[2], Stmt::While { .. }));
        assert!(
            matches!(&f.body[3], Stmt::Return(Some(Expr::Call { callee, .. })) if callee == "sqrt")
        );
    }

    #[test]
    fn precedence_binds_mul_over_add() {
        let f = parse_function("function m(a,b,c){return a+b*c}").unwrap();
        let Stmt::Return(Some(Expr::Binary { op, rhs, .. })) = &f.body[0] else {
            panic!("expected return of a binary expression");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            **rhs,
            Expr::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        assert!(parse_function("function f(){} extra").is_err());
    }
}
