//! # Calculated Fields
//!
//! A small expression evaluator for driver fields computed from other,
//! already-extracted fields. Supports `+`, `-`, `*`, `/`, parentheses,
//! `sqrt()`, numeric literals with an optional unit suffix (`100 kwh`) and
//! field references by their rendered name (`total_energy_consumption_kwh`).
//!
//! Arithmetic is unit checked through the SI exponent algebra: adding a
//! volume to an energy fails, multiplying kW by h yields something
//! assignable to a kWh field, and `sqrt` of an odd exponent vector fails.

use crate::units::{SiExp, SiUnit, Unit};

/// A value during evaluation: magnitude in the SI base of its exponent
/// vector.
#[derive(Debug, Clone, Copy)]
pub struct SiValue {
    pub value: f64,
    pub exp: SiExp,
}

impl SiValue {
    fn from_unit(v: f64, unit: Unit) -> Option<SiValue> {
        let si = unit.si_unit()?;
        Some(SiValue {
            value: v * si.scale,
            exp: si.exp,
        })
    }

    fn dimensionless(v: f64) -> SiValue {
        SiValue {
            value: v,
            exp: SiExp::none(),
        }
    }

    /// Express this value in `unit`, failing on a vector mismatch.
    pub fn to_unit(&self, unit: Unit) -> Option<f64> {
        let si = unit.si_unit()?;
        if si.exp != self.exp || si.exp.is_invalid() || self.exp.is_invalid() {
            return None;
        }
        Some(self.value / si.scale)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(formula: &str) -> Option<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = formula.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '0'..='9' | '.' => {
                let mut s = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        s.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(s.parse().ok()?));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut s = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        s.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(s));
            }
            _ => return None,
        }
    }
    Some(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    resolve: &'a dyn Fn(&str) -> Option<(f64, Unit)>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expr(&mut self) -> Option<SiValue> {
        let mut left = self.term()?;
        while let Some(op) = self.peek().cloned() {
            match op {
                Token::Plus | Token::Minus => {
                    self.next();
                    let right = self.term()?;
                    if left.exp != right.exp || left.exp.is_invalid() {
                        return None;
                    }
                    left.value = match op {
                        Token::Plus => left.value + right.value,
                        _ => left.value - right.value,
                    };
                }
                _ => break,
            }
        }
        Some(left)
    }

    fn term(&mut self) -> Option<SiValue> {
        let mut left = self.factor()?;
        while let Some(op) = self.peek().cloned() {
            match op {
                Token::Star | Token::Slash => {
                    self.next();
                    let right = self.factor()?;
                    let l = SiUnit::new(1.0, left.exp);
                    let r = SiUnit::new(1.0, right.exp);
                    let combined = match op {
                        Token::Star => {
                            left.value *= right.value;
                            l.mul(&r)
                        }
                        _ => {
                            left.value /= right.value;
                            l.div(&r)
                        }
                    };
                    if combined.exp.is_invalid() {
                        return None;
                    }
                    left.exp = combined.exp;
                }
                _ => break,
            }
        }
        Some(left)
    }

    fn factor(&mut self) -> Option<SiValue> {
        match self.next()? {
            Token::Number(n) => {
                // A unit suffix may follow a literal: `100 kwh`.
                if let Some(Token::Ident(s)) = self.peek() {
                    if let Some(unit) = Unit::from_suffix(s) {
                        self.next();
                        return SiValue::from_unit(n, unit);
                    }
                }
                Some(SiValue::dimensionless(n))
            }
            Token::Minus => {
                let v = self.factor()?;
                Some(SiValue {
                    value: -v.value,
                    exp: v.exp,
                })
            }
            Token::LParen => {
                let v = self.expr()?;
                match self.next()? {
                    Token::RParen => Some(v),
                    _ => None,
                }
            }
            Token::Ident(name) if name == "sqrt" => {
                match self.next()? {
                    Token::LParen => {}
                    _ => return None,
                }
                let v = self.expr()?;
                match self.next()? {
                    Token::RParen => {}
                    _ => return None,
                }
                let si = SiUnit::new(1.0, v.exp).sqrt()?;
                Some(SiValue {
                    value: v.value.sqrt(),
                    exp: si.exp,
                })
            }
            Token::Ident(name) => {
                let (value, unit) = (self.resolve)(&name)?;
                SiValue::from_unit(value, unit)
            }
            _ => None,
        }
    }
}

/// Evaluate `formula`, resolving field references through `resolve`.
pub fn evaluate(
    formula: &str,
    resolve: &dyn Fn(&str) -> Option<(f64, Unit)>,
) -> Option<SiValue> {
    let tokens = tokenize(formula)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        resolve,
    };
    let v = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return None;
    }
    Some(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_fields(_: &str) -> Option<(f64, Unit)> {
        None
    }

    #[test]
    fn test_literals_with_units() {
        let v = evaluate("100 kw * 22 h", &no_fields).unwrap();
        assert!((v.to_unit(Unit::Kwh).unwrap() - 2200.0).abs() < 1e-9);
    }

    #[test]
    fn test_division_builds_flow() {
        let v = evaluate("100 m3 / 5 h", &no_fields).unwrap();
        assert!((v.to_unit(Unit::M3h).unwrap() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_sqrt() {
        let v = evaluate("sqrt(9 m3 * 4 m3)", &no_fields).unwrap();
        assert!((v.to_unit(Unit::M3).unwrap() - 6.0).abs() < 1e-9);
        // Odd exponents do not take square roots.
        assert!(evaluate("sqrt(9 m3)", &no_fields).is_none());
    }

    #[test]
    fn test_unit_mismatch_fails() {
        assert!(evaluate("1 kwh + 1 m3", &no_fields).is_none());
        let v = evaluate("1 kwh + 1 mj", &no_fields).unwrap();
        assert!((v.to_unit(Unit::Mj).unwrap() - 4.6).abs() < 1e-9);
    }

    #[test]
    fn test_field_references() {
        let resolve = |name: &str| -> Option<(f64, Unit)> {
            match name {
                "flow_temperature_c" => Some((42.3, Unit::C)),
                "total_m3" => Some((6.0, Unit::M3)),
                _ => None,
            }
        };
        let v = evaluate("total_m3 * 2 + 1 m3", &resolve).unwrap();
        assert!((v.to_unit(Unit::M3).unwrap() - 13.0).abs() < 1e-9);
        assert!(evaluate("missing_field + 1 m3", &resolve).is_none());
    }

    #[test]
    fn test_parentheses_and_negation() {
        let v = evaluate("(2 + 3) * 4", &no_fields).unwrap();
        assert!((v.to_unit(Unit::Counter).unwrap() - 20.0).abs() < 1e-9);
        let v = evaluate("-2 * 3", &no_fields).unwrap();
        assert!((v.to_unit(Unit::Counter).unwrap() + 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        assert!(evaluate("1 + 2 )", &no_fields).is_none());
        assert!(evaluate("1 £ 2", &no_fields).is_none());
    }
}
