use crate::error::{Error, Result};
use crate::lexer::{tokenize, Comparator, Token, TokenKind};
use engine_vars::{Value, VariableStore, Version};

/// Evaluates a condition expression against the given store, following
///
/// ```text
/// expr   := term { "OR" term }
/// term   := factor { "AND" factor }
/// factor := [ "NOT" ] atom
/// atom   := value | value cmp value | "(" expr ")"
/// ```
pub fn evaluate(expression: &str, store: &VariableStore) -> Result<bool> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser { tokens, pos: 0, store };
    let result = parser.parse_expr()?;
    parser.expect(&TokenKind::End)?;
    Ok(result)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    store: &'a VariableStore,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<()> {
        if &self.peek().kind == kind {
            self.advance();
            Ok(())
        } else {
            Err(Error::InvalidData {
                position: self.peek().position,
                reason: format!("expected {:?}, found {:?}", kind, self.peek().kind),
            })
        }
    }

    fn parse_expr(&mut self) -> Result<bool> {
        let mut value = self.parse_term()?;
        while matches!(self.peek().kind, TokenKind::Or) {
            self.advance();
            let rhs = self.parse_term()?;
            value = value || rhs;
        }
        Ok(value)
    }

    fn parse_term(&mut self) -> Result<bool> {
        let mut value = self.parse_factor()?;
        while matches!(self.peek().kind, TokenKind::And) {
            self.advance();
            let rhs = self.parse_factor()?;
            value = value && rhs;
        }
        Ok(value)
    }

    fn parse_factor(&mut self) -> Result<bool> {
        let negate = if matches!(self.peek().kind, TokenKind::Not) {
            self.advance();
            true
        } else {
            false
        };
        let value = self.parse_atom()?;
        Ok(if negate { !value } else { value })
    }

    fn parse_atom(&mut self) -> Result<bool> {
        if matches!(self.peek().kind, TokenKind::LParen) {
            self.advance();
            let value = self.parse_expr()?;
            self.expect(&TokenKind::RParen)?;
            return Ok(value);
        }

        let left = self.parse_value()?;
        if let TokenKind::Comparator(op, insensitive) = self.peek().kind.clone() {
            self.advance();
            let right = self.parse_value()?;
            compare(op, insensitive, left, right)
        } else {
            Ok(left.is_truthy())
        }
    }

    fn parse_value(&mut self) -> Result<Value> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(n) => Ok(Value::Numeric(n)),
            TokenKind::Literal(s) => Ok(Value::String(s)),
            TokenKind::Version(text) => Ok(Value::Version(Version::parse(&text))),
            TokenKind::Identifier(name) => self
                .store
                .resolve_for_condition(&name)
                .map_err(|source| Error::Variable { name, source }),
            other => Err(Error::InvalidData {
                position: token.position,
                reason: format!("expected a value, found {:?}", other),
            }),
        }
    }
}

fn compare(op: Comparator, insensitive: bool, left: Value, right: Value) -> Result<bool> {
    match (to_operand(left), to_operand(right)) {
        (Operand::Str(l), Operand::Str(r)) => Ok(compare_strings(op, insensitive, &l, &r)),
        (Operand::Num(l), Operand::Num(r)) => Ok(compare_integers(op, l, r)),
        (Operand::Ver(l), Operand::Ver(r)) => Ok(compare_versions(op, &l, &r)),

        (Operand::Str(l), Operand::Num(r)) => match Value::parse_numeric_str(&l) {
            Some(ln) => Ok(compare_integers(op, ln, r)),
            None => Ok(op == Comparator::Ne),
        },
        (Operand::Num(l), Operand::Str(r)) => match Value::parse_numeric_str(&r) {
            Some(rn) => Ok(compare_integers(op, l, rn)),
            None => Ok(op == Comparator::Ne),
        },

        (Operand::Str(l), Operand::Ver(r)) => {
            let lv = Version::parse(&l);
            if lv.invalid {
                Ok(op == Comparator::Ne)
            } else {
                Ok(compare_versions(op, &lv, &r))
            }
        }
        (Operand::Ver(l), Operand::Str(r)) => {
            let rv = Version::parse(&r);
            if rv.invalid {
                Ok(op == Comparator::Ne)
            } else {
                Ok(compare_versions(op, &l, &rv))
            }
        }

        (Operand::Num(_), Operand::Ver(_)) | (Operand::Ver(_), Operand::Num(_)) => {
            Ok(op == Comparator::Ne)
        }
    }
}

enum Operand {
    Str(String),
    Num(i64),
    Ver(Version),
}

/// `None` coerces to the empty string for binary comparisons; the grammar
/// gives it no other defined coercion, and an empty string is consistent
/// with its falsy/empty-length truthiness rule.
fn to_operand(value: Value) -> Operand {
    match value {
        Value::None => Operand::Str(String::new()),
        Value::Numeric(n) => Operand::Num(n),
        Value::String(s) | Value::Formatted(s) => Operand::Str(s),
        Value::Version(v) => Operand::Ver(v),
    }
}

fn compare_strings(op: Comparator, insensitive: bool, l: &str, r: &str) -> bool {
    let (a, b) = if insensitive {
        (l.to_lowercase(), r.to_lowercase())
    } else {
        (l.to_string(), r.to_string())
    };
    match op {
        Comparator::Lt => a < b,
        Comparator::Gt => a > b,
        Comparator::Le => a <= b,
        Comparator::Ge => a >= b,
        Comparator::Eq => a == b,
        Comparator::Ne => a != b,
        Comparator::Band => a.contains(&b),
        Comparator::HiEq => a.starts_with(&b),
        Comparator::LoEq => a.ends_with(&b),
    }
}

fn compare_integers(op: Comparator, l: i64, r: i64) -> bool {
    match op {
        Comparator::Lt => l < r,
        Comparator::Gt => l > r,
        Comparator::Le => l <= r,
        Comparator::Ge => l >= r,
        Comparator::Eq => l == r,
        Comparator::Ne => l != r,
        Comparator::Band => (l & r) != 0,
        Comparator::HiEq => high_word(l) == high_word(r),
        Comparator::LoEq => low_word(l) == low_word(r),
    }
}

fn high_word(n: i64) -> i64 {
    (n >> 16) & 0xffff
}

fn low_word(n: i64) -> i64 {
    n & 0xffff
}

fn compare_versions(op: Comparator, l: &Version, r: &Version) -> bool {
    use std::cmp::Ordering;
    match op {
        Comparator::Lt => l.cmp(r) == Ordering::Less,
        Comparator::Gt => l.cmp(r) == Ordering::Greater,
        Comparator::Le => l.cmp(r) != Ordering::Greater,
        Comparator::Ge => l.cmp(r) != Ordering::Less,
        Comparator::Eq => l == r,
        Comparator::Ne => l != r,
        Comparator::Band => l.normalized().contains(&r.normalized()),
        Comparator::HiEq => l.normalized().starts_with(&r.normalized()),
        Comparator::LoEq => l.normalized().ends_with(&r.normalized()),
    }
}
