//! Arithmetic/boolean expression engine and entity wrappers (§3
//! "Expression", §4.8), grounded on the original's wrapper hierarchy
//! (`ExpressionWrapper` / `TreeWrapper` / `RUWrapper` / `SaplingWrapper` /
//! `DeadTreeWrapper`).

use crate::error::ExpressionError;
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{alpha1, alphanumeric1, char, multispace0};
use nom::combinator::{map, opt, recognize};
use nom::multi::{many0, many0_count};
use nom::number::complete::double;
use nom::sequence::{delimited, pair, preceded};
use nom::IResult;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    BinOp(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn number(input: &str) -> IResult<&str, Expr> {
    map(double, Expr::Number)(input)
}

fn variable(input: &str) -> IResult<&str, Expr> {
    map(identifier, |s: &str| Expr::Variable(s.to_string()))(input)
}

fn parens(input: &str) -> IResult<&str, Expr> {
    delimited(ws(char('(')), expr, ws(char(')')))(input)
}

fn atom(input: &str) -> IResult<&str, Expr> {
    ws(alt((parens, number, variable)))(input)
}

fn unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(char('-')), unary), |e| Expr::Neg(Box::new(e))),
        map(preceded(ws(char('!')), unary), |e| Expr::Not(Box::new(e))),
        atom,
    ))(input)
}

fn fold_binops(init: Expr, rest: Vec<(BinOp, Expr)>) -> Expr {
    rest.into_iter()
        .fold(init, |acc, (op, rhs)| Expr::BinOp(op, Box::new(acc), Box::new(rhs)))
}

fn term(input: &str) -> IResult<&str, Expr> {
    let (input, init) = unary(input)?;
    let (input, rest) = many0(pair(
        alt((
            map(ws(char('*')), |_| BinOp::Mul),
            map(ws(char('/')), |_| BinOp::Div),
        )),
        unary,
    ))(input)?;
    Ok((input, fold_binops(init, rest)))
}

fn arith_expr(input: &str) -> IResult<&str, Expr> {
    let (input, init) = term(input)?;
    let (input, rest) = many0(pair(
        alt((
            map(ws(char('+')), |_| BinOp::Add),
            map(ws(char('-')), |_| BinOp::Sub),
        )),
        term,
    ))(input)?;
    Ok((input, fold_binops(init, rest)))
}

fn comparison(input: &str) -> IResult<&str, Expr> {
    let (input, init) = arith_expr(input)?;
    let (input, rest) = many0(pair(
        alt((
            map(tag("<="), |_| BinOp::Le),
            map(tag(">="), |_| BinOp::Ge),
            map(tag("=="), |_| BinOp::Eq),
            map(tag("!="), |_| BinOp::Ne),
            map(ws(char('<')), |_| BinOp::Lt),
            map(ws(char('>')), |_| BinOp::Gt),
        )),
        arith_expr,
    ))(input)?;
    Ok((input, fold_binops(init, rest)))
}

fn conjunction(input: &str) -> IResult<&str, Expr> {
    let (input, init) = comparison(input)?;
    let (input, rest) = many0(pair(map(ws(tag("&&")), |_| BinOp::And), comparison))(input)?;
    Ok((input, fold_binops(init, rest)))
}

fn expr(input: &str) -> IResult<&str, Expr> {
    let (input, init) = conjunction(input)?;
    let (input, rest) = many0(pair(map(ws(tag("||")), |_| BinOp::Or), conjunction))(input)?;
    Ok((input, fold_binops(init, rest)))
}

/// Parse a complete expression, erroring if trailing unparsed input remains.
pub fn parse(input: &str) -> Result<Expr, ExpressionError> {
    let (rest, e) = opt(expr)(input).map_err(|e| ExpressionError::Parse(e.to_string()))?;
    let rest = rest.trim();
    if !rest.is_empty() {
        return Err(ExpressionError::Parse(format!("unparsed trailing input: '{rest}'")));
    }
    e.ok_or_else(|| ExpressionError::Parse("empty expression".to_string()))
}

/// Resolves named variables to dense indices and indexed values, the way
/// the original wrapper hierarchy abstracts over the entity being
/// iterated (§4.8, §3 "Expression").
pub trait ExpressionWrapper {
    fn variable_names(&self) -> &[&'static str];
    fn value(&self, index: usize) -> f64;

    fn variable_index(&self, name: &str) -> Option<usize> {
        self.variable_names().iter().position(|n| *n == name)
    }

    fn value_by_name(&self, name: &str) -> Option<f64> {
        self.variable_index(name).map(|i| self.value(i))
    }
}

/// Tree-entity wrapper (§3 "Expression" wrappers).
pub struct TreeWrapper<'a>(pub &'a crate::tree::Tree);

const TREE_VARS: &[&str] = &["dbh", "height", "age", "leafarea", "stress"];

impl ExpressionWrapper for TreeWrapper<'_> {
    fn variable_names(&self) -> &[&'static str] {
        TREE_VARS
    }

    fn value(&self, index: usize) -> f64 {
        match TREE_VARS[index] {
            "dbh" => self.0.dbh_cm,
            "height" => self.0.height_m,
            "age" => self.0.age as f64,
            "leafarea" => self.0.leaf_area_m2,
            "stress" => self.0.stress_index,
            _ => 0.0,
        }
    }
}

/// Resource-unit wrapper (§3 "Expression" wrappers).
pub struct RuWrapper<'a>(pub &'a crate::resource_unit::ResourceUnit);

const RU_VARS: &[&str] = &["stockedarea", "leafareaindex", "id"];

impl ExpressionWrapper for RuWrapper<'_> {
    fn variable_names(&self) -> &[&'static str] {
        RU_VARS
    }

    fn value(&self, index: usize) -> f64 {
        match RU_VARS[index] {
            "stockedarea" => self.0.stocked_area_m2,
            "leafareaindex" => self.0.leaf_area_index,
            "id" => self.0.id as f64,
            _ => 0.0,
        }
    }
}

/// Sapling-entity wrapper (§3 "Expression" wrappers).
pub struct SaplingWrapper<'a>(pub &'a crate::sapling::SaplingTree);

const SAPLING_VARS: &[&str] = &["height", "age", "stressyears"];

impl ExpressionWrapper for SaplingWrapper<'_> {
    fn variable_names(&self) -> &[&'static str] {
        SAPLING_VARS
    }

    fn value(&self, index: usize) -> f64 {
        match SAPLING_VARS[index] {
            "height" => self.0.height_m,
            "age" => self.0.age as f64,
            "stressyears" => self.0.stress_years as f64,
            _ => 0.0,
        }
    }
}

/// DeadTree-entity wrapper (§3 "Expression" wrappers).
pub struct DeadTreeWrapper<'a>(pub &'a crate::snag::DeadTree);

const DEAD_TREE_VARS: &[&str] = &["remainingbiomass", "yearsstanding", "yearsdowned"];

impl ExpressionWrapper for DeadTreeWrapper<'_> {
    fn variable_names(&self) -> &[&'static str] {
        DEAD_TREE_VARS
    }

    fn value(&self, index: usize) -> f64 {
        match DEAD_TREE_VARS[index] {
            "remainingbiomass" => self.0.remaining_biomass_kg,
            "yearsstanding" => self.0.years_standing as f64,
            "yearsdowned" => self.0.years_downed as f64,
            _ => 0.0,
        }
    }
}

/// Evaluates a parsed expression against a wrapper, with optional value
/// linearization: a bounded cache keyed by a quantized single free
/// variable (§4.8 "optional linearization").
pub struct Evaluator {
    pub linearize: bool,
    cache: HashMap<u64, f64>,
}

impl Evaluator {
    pub fn new(linearize: bool) -> Self {
        Self {
            linearize,
            cache: HashMap::new(),
        }
    }

    pub fn execute<W: ExpressionWrapper>(&mut self, e: &Expr, w: &W) -> Result<f64, ExpressionError> {
        self.eval(e, w)
    }

    pub fn execute_bool<W: ExpressionWrapper>(&mut self, e: &Expr, w: &W) -> Result<bool, ExpressionError> {
        Ok(self.eval(e, w)? != 0.0)
    }

    fn eval<W: ExpressionWrapper>(&mut self, e: &Expr, w: &W) -> Result<f64, ExpressionError> {
        Ok(match e {
            Expr::Number(n) => *n,
            Expr::Variable(name) => w
                .value_by_name(name)
                .ok_or_else(|| ExpressionError::UnknownVariable(name.clone()))?,
            Expr::Neg(inner) => -self.eval(inner, w)?,
            Expr::Not(inner) => {
                if self.eval(inner, w)? == 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Expr::BinOp(op, lhs, rhs) => {
                let a = self.eval(lhs, w)?;
                let b = self.eval(rhs, w)?;
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => {
                        if b == 0.0 {
                            return Err(ExpressionError::TypeMismatch("division by zero".to_string()));
                        }
                        a / b
                    }
                    BinOp::Lt => bool_f64(a < b),
                    BinOp::Le => bool_f64(a <= b),
                    BinOp::Gt => bool_f64(a > b),
                    BinOp::Ge => bool_f64(a >= b),
                    BinOp::Eq => bool_f64((a - b).abs() < 1e-12),
                    BinOp::Ne => bool_f64((a - b).abs() >= 1e-12),
                    BinOp::And => bool_f64(a != 0.0 && b != 0.0),
                    BinOp::Or => bool_f64(a != 0.0 || b != 0.0),
                }
            }
        })
    }

    /// "inc-sum" accumulator (§4.8): evaluates and adds to a running total,
    /// caching by quantized input when linearization is enabled.
    pub fn inc_sum<W: ExpressionWrapper>(&mut self, e: &Expr, w: &W, running_total: &mut f64, cache_key: Option<f64>) -> Result<(), ExpressionError> {
        let value = if self.linearize {
            if let Some(key) = cache_key {
                let quantized = (key * 100.0).round() as i64 as u64;
                if let Some(cached) = self.cache.get(&quantized) {
                    *cached
                } else {
                    let v = self.eval(e, w)?;
                    self.cache.insert(quantized, v);
                    v
                }
            } else {
                self.eval(e, w)?
            }
        } else {
            self.eval(e, w)?
        };
        *running_total += value;
        Ok(())
    }
}

fn bool_f64(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Tree;

    #[test]
    fn parses_and_evaluates_arithmetic_with_precedence() {
        let e = parse("2 + 3 * 4").unwrap();
        let tree = Tree::new(1, 0, 0, 10.0, 5.0);
        let mut eval = Evaluator::new(false);
        let result = eval.execute(&e, &TreeWrapper(&tree)).unwrap();
        assert_eq!(result, 14.0);
    }

    #[test]
    fn resolves_tree_variables() {
        let e = parse("dbh > 20 && height < 30").unwrap();
        let mut tree = Tree::new(1, 0, 0, 25.0, 10.0);
        tree.height_m = 10.0;
        let mut eval = Evaluator::new(false);
        assert!(eval.execute_bool(&e, &TreeWrapper(&tree)).unwrap());
    }

    #[test]
    fn unknown_variable_is_a_typed_error() {
        let e = parse("bogus + 1").unwrap();
        let tree = Tree::new(1, 0, 0, 10.0, 5.0);
        let mut eval = Evaluator::new(false);
        let err = eval.execute(&e, &TreeWrapper(&tree)).unwrap_err();
        assert!(matches!(err, ExpressionError::UnknownVariable(_)));
    }

    #[test]
    fn trailing_garbage_is_a_parse_error() {
        let err = parse("1 + 2 )").unwrap_err();
        assert!(matches!(err, ExpressionError::Parse(_)));
    }
}
