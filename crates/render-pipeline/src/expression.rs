//! Band-math expression evaluation.
//!
//! An expression is a comma-separated list of arithmetic terms over band
//! tokens `b1..bN`, e.g. `(b4-b1)/(b4+b1)`. Each term produces one output
//! band, in the given order. Division by zero yields a non-finite value,
//! which the mask resolver later marks invalid.

use ndarray::{Array2, Array3, Axis};

use tiler_common::{TilerError, TilerResult};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Band(usize),
    Plus,
    Minus,
    Star,
    Slash,
    LeftParen,
    RightParen,
}

#[derive(Debug, Clone)]
enum Expr {
    Number(f64),
    Band(usize),
    Negate(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
}

fn tokenize(input: &str) -> TilerResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LeftParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RightParen);
                i += 1;
            }
            'b' | 'B' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end].is_ascii_digit() {
                    end += 1;
                }
                if end == start {
                    return Err(TilerError::InvalidExpression(format!(
                        "band token without index at position {}",
                        i
                    )));
                }
                let index: usize = chars[start..end]
                    .iter()
                    .collect::<String>()
                    .parse()
                    .map_err(|_| {
                        TilerError::InvalidExpression("band index out of range".into())
                    })?;
                tokens.push(Token::Band(index));
                i = end;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                let mut end = i;
                while end < chars.len() && (chars[end].is_ascii_digit() || chars[end] == '.') {
                    end += 1;
                }
                let number: f64 = chars[start..end]
                    .iter()
                    .collect::<String>()
                    .parse()
                    .map_err(|_| {
                        TilerError::InvalidExpression(format!(
                            "malformed number at position {}",
                            start
                        ))
                    })?;
                tokens.push(Token::Number(number));
                i = end;
            }
            other => {
                return Err(TilerError::InvalidExpression(format!(
                    "unexpected character '{}'",
                    other
                )))
            }
        }
    }
    Ok(tokens)
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
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> TilerResult<Expr> {
        let mut left = self.term()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Plus => {
                    self.advance();
                    left = Expr::Add(Box::new(left), Box::new(self.term()?));
                }
                Token::Minus => {
                    self.advance();
                    left = Expr::Sub(Box::new(left), Box::new(self.term()?));
                }
                _ => break,
            }
        }
        Ok(left)
    }

    // term := factor (('*' | '/') factor)*
    fn term(&mut self) -> TilerResult<Expr> {
        let mut left = self.factor()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Star => {
                    self.advance();
                    left = Expr::Mul(Box::new(left), Box::new(self.factor()?));
                }
                Token::Slash => {
                    self.advance();
                    left = Expr::Div(Box::new(left), Box::new(self.factor()?));
                }
                _ => break,
            }
        }
        Ok(left)
    }

    // factor := '-' factor | '(' expr ')' | number | band
    fn factor(&mut self) -> TilerResult<Expr> {
        match self.advance() {
            Some(Token::Minus) => Ok(Expr::Negate(Box::new(self.factor()?))),
            Some(Token::LeftParen) => {
                let inner = self.expr()?;
                match self.advance() {
                    Some(Token::RightParen) => Ok(inner),
                    _ => Err(TilerError::InvalidExpression(
                        "unbalanced parentheses".into(),
                    )),
                }
            }
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Band(i)) => Ok(Expr::Band(i)),
            Some(other) => Err(TilerError::InvalidExpression(format!(
                "unexpected token {:?}",
                other
            ))),
            None => Err(TilerError::InvalidExpression(
                "unexpected end of expression".into(),
            )),
        }
    }
}

fn parse_term(input: &str) -> TilerResult<Expr> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(TilerError::InvalidExpression("empty term".into()));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(TilerError::InvalidExpression(format!(
            "trailing input in '{}'",
            input
        )));
    }
    Ok(expr)
}

fn check_bands(expr: &Expr, band_count: usize) -> TilerResult<()> {
    match expr {
        Expr::Number(_) => Ok(()),
        Expr::Band(i) => {
            if *i == 0 || *i > band_count {
                Err(TilerError::InvalidExpression(format!(
                    "band b{} not in dataset ({} bands)",
                    i, band_count
                )))
            } else {
                Ok(())
            }
        }
        Expr::Negate(inner) => check_bands(inner, band_count),
        Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) | Expr::Div(a, b) => {
            check_bands(a, band_count)?;
            check_bands(b, band_count)
        }
    }
}

fn eval(expr: &Expr, data: &Array3<f64>, y: usize, x: usize) -> f64 {
    match expr {
        Expr::Number(n) => *n,
        Expr::Band(i) => data[[*i - 1, y, x]],
        Expr::Negate(inner) => -eval(inner, data, y, x),
        Expr::Add(a, b) => eval(a, data, y, x) + eval(b, data, y, x),
        Expr::Sub(a, b) => eval(a, data, y, x) - eval(b, data, y, x),
        Expr::Mul(a, b) => eval(a, data, y, x) * eval(b, data, y, x),
        Expr::Div(a, b) => eval(a, data, y, x) / eval(b, data, y, x),
    }
}

/// Evaluate a comma-separated expression over a `(bands, h, w)` array,
/// producing one output band per term.
pub fn evaluate_expression(input: &str, data: &Array3<f64>) -> TilerResult<Array3<f64>> {
    let (band_count, height, width) = data.dim();

    let terms: Vec<Expr> = input
        .split(',')
        .map(parse_term)
        .collect::<TilerResult<_>>()?;
    for term in &terms {
        check_bands(term, band_count)?;
    }

    let bands: Vec<Array2<f64>> = terms
        .iter()
        .map(|term| Array2::from_shape_fn((height, width), |(y, x)| eval(term, data, y, x)))
        .collect();
    let views: Vec<_> = bands.iter().map(|b| b.view()).collect();
    ndarray::stack(Axis(0), &views)
        .map_err(|e| TilerError::Internal(format!("expression stack: {}", e)))
}
