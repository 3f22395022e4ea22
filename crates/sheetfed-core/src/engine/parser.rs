//! 公式文法（`=` 之后的部分）：
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := '-' unary | primary
//! primary := number | '(' expr ')' | func '(' [expr (',' expr)*] ')' | reference
//! reference := range | '\'' domain '/' sheet '\'' '!' range
//! range   := cell [':' cell]
//! ```

use crate::cell::{CellId, CellRange};

use super::ImportRef;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Function {
    Sum,
    Avg,
    Min,
    Max,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "SUM" => Some(Function::Sum),
            "AVG" | "AVERAGE" => Some(Function::Avg),
            "MIN" => Some(Function::Min),
            "MAX" => Some(Function::Max),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Reference {
    Local(CellRange),
    Import(ImportRef),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Expr {
    Number(f64),
    Ref(Reference),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
}

impl Expr {
    /// 收集表达式中出现的全部跨表引用。
    pub(crate) fn collect_imports(&self, out: &mut Vec<ImportRef>) {
        match self {
            Expr::Number(_) | Expr::Ref(Reference::Local(_)) => {}
            Expr::Ref(Reference::Import(import)) => {
                if !out.contains(import) {
                    out.push(import.clone());
                }
            }
            Expr::Neg(inner) => inner.collect_imports(out),
            Expr::Binary(_, lhs, rhs) => {
                lhs.collect_imports(out);
                rhs.collect_imports(out);
            }
            Expr::Call(_, args) => args.iter().for_each(|arg| arg.collect_imports(out)),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Quoted(String),
    Bang,
    Colon,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '!' => {
                tokens.push(Token::Bang);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
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
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '\'' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&c| c == '\'')
                    .map(|offset| start + offset)
                    .ok_or_else(|| "unterminated quoted reference".to_owned())?;
                tokens.push(Token::Quoted(chars[start..end].iter().collect()));
                i = end + 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number `{text}`"))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character `{other}`")),
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

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(format!("expected {expected:?}, found {token:?}")),
            None => Err(format!("expected {expected:?}, found end of formula")),
        }
    }

    fn expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Expr, String> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Quoted(target)) => {
                let (domain, sheet_id) = target
                    .split_once('/')
                    .filter(|(d, s)| !d.is_empty() && !s.is_empty())
                    .ok_or_else(|| format!("import target `{target}` must be `domain/sheet`"))?;
                self.expect(Token::Bang)?;
                let first = self.cell()?;
                let range = self.range_from(first)?;
                Ok(Expr::Ref(Reference::Import(ImportRef {
                    domain: domain.to_owned(),
                    sheet_id: sheet_id.to_owned(),
                    range,
                })))
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    let function =
                        Function::lookup(&name).ok_or_else(|| format!("unknown function `{name}`"))?;
                    self.pos += 1;
                    let mut args = Vec::new();
                    if self.peek() != Some(&Token::RParen) {
                        loop {
                            args.push(self.expr()?);
                            if self.peek() == Some(&Token::Comma) {
                                self.pos += 1;
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(Token::RParen)?;
                    return Ok(Expr::Call(function, args));
                }
                let first: CellId = name.parse().map_err(|err| format!("{err}"))?;
                Ok(Expr::Ref(Reference::Local(self.range_from(first)?)))
            }
            Some(token) => Err(format!("unexpected token {token:?}")),
            None => Err("unexpected end of formula".to_owned()),
        }
    }

    fn cell(&mut self) -> Result<CellId, String> {
        match self.next() {
            Some(Token::Ident(name)) => name.parse().map_err(|err| format!("{err}")),
            Some(token) => Err(format!("expected a cell, found {token:?}")),
            None => Err("expected a cell, found end of formula".to_owned()),
        }
    }

    fn range_from(&mut self, first: CellId) -> Result<CellRange, String> {
        if self.peek() == Some(&Token::Colon) {
            self.pos += 1;
            let second = self.cell()?;
            Ok(CellRange::new(first, second))
        } else {
            Ok(CellRange::single(first))
        }
    }
}

/// 解析 `=` 之后的公式正文。
pub(crate) fn parse_formula(body: &str) -> Result<Expr, String> {
    let mut parser = Parser {
        tokens: tokenize(body)?,
        pos: 0,
    };
    let expr = parser.expr()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(format!("trailing token {token:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_binds_multiplication_tighter() {
        let expr = parse_formula("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::Number(1.0)),
                Box::new(Expr::Binary(
                    BinaryOp::Mul,
                    Box::new(Expr::Number(2.0)),
                    Box::new(Expr::Number(3.0)),
                )),
            )
        );
    }

    #[test]
    fn parses_imports_inside_functions() {
        let expr = parse_formula("sum('beta/s-1'!A1:B2, C3)").unwrap();
        let mut imports = Vec::new();
        expr.collect_imports(&mut imports);
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].domain, "beta");
        assert_eq!(imports[0].sheet_id, "s-1");
        assert_eq!(imports[0].range.to_string(), "A1:B2");
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "1 +", "(1", "FOO(1)", "'nodomain'!A1", "A1 B1", "#"] {
            assert!(parse_formula(bad).is_err(), "{bad:?} should not parse");
        }
    }
}
