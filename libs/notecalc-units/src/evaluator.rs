//! Expression parsing and unit-aware evaluation
//!
//! Parsing is delegated to evalexpr's operator tree. Engineering notation
//! writes `5 kg` or `2 (a + b)`, which evalexpr does not accept, so the text
//! is first prepared by inserting the implied `*`. The tree is then walked
//! here, producing [`Value`]s instead of evalexpr values.
//!
//! Identifiers resolve against the caller's bindings first, then the
//! constants `pi` and `e`, then the unit registry.

use crate::builtin_functions;
use crate::error::{CalcError, Result};
use crate::quantity::{Quantity, Value};
use crate::units::{self, Unit};
use evalexpr::{Node, Operator};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::f64::consts::{E, PI};

/// Deeper trees are rejected instead of risking stack exhaustion
const MAX_DEPTH: usize = 256;

/// Upper bound on operator tokens; keeps every tree walk (and drop) shallow
const MAX_OPERATORS: usize = 4 * MAX_DEPTH;

/// Variable binding consulted during evaluation
pub trait Lookup {
    fn lookup(&self, name: &str) -> Option<&Value>;
}

impl Lookup for HashMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl Lookup for BTreeMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

/// No variables at all (unit expressions, standalone evaluation)
pub struct NoBindings;

impl Lookup for NoBindings {
    fn lookup(&self, _name: &str) -> Option<&Value> {
        None
    }
}

/// A parsed expression, ready to evaluate any number of times
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    tree: Node,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self> {
        let prepared = prepare(source)?;
        let tree = evalexpr::build_operator_tree(&prepared).map_err(|e| {
            CalcError::expression(format!("Failed to parse '{}': {}", source, e))
        })?;
        Ok(Self {
            source: source.to_string(),
            tree,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Every identifier read as a variable (function names excluded)
    pub fn free_variables(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        collect_identifiers(&self.tree, &mut names);
        names
    }

    pub fn evaluate(&self, bindings: &dyn Lookup) -> Result<Value> {
        eval_node(&self.tree, bindings, 0)
    }
}

/// Parse and evaluate in one step
pub fn evaluate(source: &str, bindings: &dyn Lookup) -> Result<Value> {
    Expression::parse(source)?.evaluate(bindings)
}

/// Free variable names of an expression
pub fn free_variables(source: &str) -> Result<BTreeSet<String>> {
    Ok(Expression::parse(source)?.free_variables())
}

/// Parse a unit expression like `ft^3/min` (registry symbols only)
pub(crate) fn parse_unit(text: &str) -> Result<Unit> {
    let value = evaluate(text, &NoBindings).map_err(|e| match e {
        CalcError::UndefinedSymbol(name) => CalcError::unknown_unit(name),
        other => other,
    })?;
    match value {
        Value::Quantity(q) if (q.magnitude - 1.0).abs() < 1e-12 => Ok(q.unit),
        _ => Err(CalcError::unknown_unit(text.trim())),
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Token {
    Start,
    Number,
    Ident,
    Open,
    Close,
    Other,
}

/// Insert implied multiplication and expand exponent literals
///
/// `15 gal/min` -> `15 *gal/min`, `2(a+b)` -> `2*(a+b)`, `1e-3` -> `0.001`.
/// An identifier directly followed by `(`, or any known function name, is
/// left as a call.
pub fn prepare(source: &str) -> Result<String> {
    let chars: Vec<char> = source.chars().collect();
    check_nesting(&chars)?;
    let mut out = String::with_capacity(source.len() + 8);
    let mut prev = Token::Start;
    let mut prev_ident = String::new();
    let mut spaced = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            out.push(c);
            spaced = true;
            i += 1;
            continue;
        }

        let starts_number =
            c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit));
        let kind = if starts_number {
            Token::Number
        } else if c.is_ascii_alphabetic() || c == '_' {
            Token::Ident
        } else if c == '(' {
            Token::Open
        } else if c == ')' {
            Token::Close
        } else {
            Token::Other
        };

        let implied = match (prev, kind) {
            (Token::Number | Token::Close, Token::Ident | Token::Open) => true,
            (Token::Close, Token::Number) => true,
            (Token::Ident, Token::Ident | Token::Number) => true,
            (Token::Ident, Token::Open) => {
                spaced && !builtin_functions::is_function(&prev_ident)
            }
            _ => false,
        };
        if implied {
            out.push('*');
        }

        match kind {
            Token::Number => {
                let start = i;
                i = scan_number(&chars, i);
                let literal: String = chars[start..i].iter().collect();
                out.push_str(&expand_literal(&literal)?);
            }
            Token::Ident => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                prev_ident = chars[start..i].iter().collect();
                out.push_str(&prev_ident);
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
        prev = kind;
        spaced = false;
    }
    Ok(out)
}

/// Reject text whose operator tree would nest past [`MAX_DEPTH`]
///
/// Runs before evalexpr sees the text, since building and dropping the tree
/// recurse as deeply as it nests. Counted: open parentheses, runs of unary
/// signs and `^` chains.
fn check_nesting(chars: &[char]) -> Result<()> {
    // (depth the group opened with, `^` chain inside it)
    let mut groups: Vec<(usize, usize)> = vec![(0, 0)];
    let mut depth = 0;
    let mut unary = 0;
    let mut operators = 0;
    let mut after_operand = false;

    for &c in chars {
        if c.is_whitespace() {
            continue;
        }
        if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
            after_operand = true;
            unary = 0;
            continue;
        }

        operators += 1;
        match c {
            '(' => {
                let opened = 1 + unary;
                depth += opened;
                groups.push((opened, 0));
                unary = 0;
                after_operand = false;
            }
            ')' => {
                if groups.len() > 1 {
                    if let Some((opened, chain)) = groups.pop() {
                        depth -= opened + chain;
                    }
                }
                after_operand = true;
            }
            '+' | '-' if !after_operand => unary += 1,
            '^' => {
                if let Some(group) = groups.last_mut() {
                    group.1 += 1;
                }
                depth += 1;
                after_operand = false;
            }
            _ => {
                if let Some(group) = groups.last_mut() {
                    depth -= group.1;
                    group.1 = 0;
                }
                after_operand = false;
            }
        }

        if depth + unary > MAX_DEPTH {
            return Err(CalcError::expression("Expression is nested too deeply"));
        }
        if operators > MAX_OPERATORS {
            return Err(CalcError::expression("Expression is too long"));
        }
    }
    Ok(())
}

fn scan_number(chars: &[char], mut i: usize) -> usize {
    let digits = |chars: &[char], mut i: usize| {
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        i
    };
    i = digits(chars, i);
    if chars.get(i) == Some(&'.') {
        i = digits(chars, i + 1);
    }
    if matches!(chars.get(i), Some('e' | 'E')) {
        let mut j = i + 1;
        if matches!(chars.get(j), Some('+' | '-')) {
            j += 1;
        }
        if chars.get(j).is_some_and(char::is_ascii_digit) {
            i = digits(chars, j);
        }
    }
    i
}

fn expand_literal(literal: &str) -> Result<String> {
    if !literal.contains(['e', 'E']) {
        return Ok(literal.to_string());
    }
    let value: f64 = literal
        .parse()
        .map_err(|_| CalcError::expression(format!("Invalid number '{}'", literal)))?;
    let text = value.to_string();
    Ok(if text.contains('.') {
        text
    } else {
        format!("{}.0", text)
    })
}

fn collect_identifiers(node: &Node, names: &mut BTreeSet<String>) {
    if let Operator::VariableIdentifierRead { identifier } = node.operator() {
        names.insert(identifier.clone());
    }
    for child in node.children() {
        collect_identifiers(child, names);
    }
}

fn resolve_identifier(name: &str, bindings: &dyn Lookup) -> Result<Value> {
    if let Some(value) = bindings.lookup(name) {
        return Ok(value.clone());
    }
    match name {
        "pi" => return Ok(Value::Number(PI)),
        "e" => return Ok(Value::Number(E)),
        _ => {}
    }
    units::lookup(name)
        .map(|def| Value::Quantity(Quantity::new(1.0, Unit::from_def(def))))
        .ok_or_else(|| CalcError::undefined_symbol(name))
}

fn const_value(value: &evalexpr::Value) -> Result<Value> {
    match value {
        evalexpr::Value::Int(i) => Ok(Value::Number(*i as f64)),
        evalexpr::Value::Float(f) => Ok(Value::Number(*f)),
        evalexpr::Value::Boolean(b) => Ok(Value::Number(if *b { 1.0 } else { 0.0 })),
        other => Err(CalcError::expression(format!(
            "Unsupported literal: {}",
            other
        ))),
    }
}

/// Arguments of a call: `f(a, b)` hangs a tuple below the function node
fn argument_nodes(node: &Node) -> Vec<&Node> {
    match (node.operator(), node.children()) {
        (Operator::RootNode, []) => Vec::new(),
        (Operator::RootNode, [inner]) => argument_nodes(inner),
        (Operator::Tuple, items) => items.iter().collect(),
        _ => vec![node],
    }
}

fn eval_node(node: &Node, bindings: &dyn Lookup, depth: usize) -> Result<Value> {
    if depth > MAX_DEPTH {
        return Err(CalcError::expression("Expression is nested too deeply"));
    }
    let eval = |child: &Node| eval_node(child, bindings, depth + 1);
    let binary = |op: fn(&Value, &Value) -> Result<Value>| match node.children() {
        [lhs, rhs] => op(&eval(lhs)?, &eval(rhs)?),
        _ => Err(CalcError::expression("Malformed binary operation")),
    };
    let comparison = |accept: fn(std::cmp::Ordering) -> bool| match node.children() {
        [lhs, rhs] => {
            let ordering = eval(lhs)?.compare(&eval(rhs)?)?;
            Ok(Value::Number(if accept(ordering) { 1.0 } else { 0.0 }))
        }
        _ => Err(CalcError::expression("Malformed comparison")),
    };

    match node.operator() {
        Operator::RootNode => match node.children() {
            [] => Err(CalcError::expression("Empty expression")),
            [only] => eval(only),
            _ => Err(CalcError::expression("Unexpected sequence of expressions")),
        },
        Operator::Add => binary(Value::add),
        Operator::Sub => binary(Value::sub),
        Operator::Mul => binary(Value::mul),
        Operator::Div => binary(Value::div),
        Operator::Mod => binary(Value::rem),
        Operator::Exp => binary(Value::pow),
        Operator::Neg => match node.children() {
            [operand] => Ok(eval(operand)?.neg()),
            _ => Err(CalcError::expression("Malformed negation")),
        },
        Operator::Eq => comparison(|o| o.is_eq()),
        Operator::Neq => comparison(|o| o.is_ne()),
        Operator::Gt => comparison(|o| o.is_gt()),
        Operator::Lt => comparison(|o| o.is_lt()),
        Operator::Geq => comparison(|o| o.is_ge()),
        Operator::Leq => comparison(|o| o.is_le()),
        Operator::Const { value } => const_value(value),
        Operator::VariableIdentifierRead { identifier } => {
            resolve_identifier(identifier, bindings)
        }
        Operator::FunctionIdentifier { identifier } => {
            let args = node
                .children()
                .iter()
                .flat_map(argument_nodes)
                .map(eval)
                .collect::<Result<Vec<_>>>()?;
            builtin_functions::call(identifier, &args)
        }
        Operator::Tuple => Err(CalcError::expression("Unexpected ','")),
        other => Err(CalcError::expression(format!(
            "Unsupported operator: {:?}",
            other
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    fn eval(expr: &str) -> Value {
        evaluate(expr, &NoBindings).unwrap()
    }

    #[test]
    fn test_basic_arithmetic() {
        let mut vars = HashMap::new();
        vars.insert("a".to_string(), Value::Number(10.0));
        vars.insert("b".to_string(), Value::Number(5.0));

        assert_eq!(evaluate("a + b", &vars).unwrap(), Value::Number(15.0));
        assert_eq!(evaluate("a * b", &vars).unwrap(), Value::Number(50.0));
        assert_eq!(evaluate("a - b", &vars).unwrap(), Value::Number(5.0));
        assert_eq!(evaluate("a / b", &vars).unwrap(), Value::Number(2.0));
    }

    #[test]
    fn test_operator_precedence() {
        // 2 + 3 * 4 = 2 + 12 = 14
        assert_eq!(eval("2 + 3 * 4"), Value::Number(14.0));
        // (2 + 3) * 4 = 20
        assert_eq!(eval("(2 + 3) * 4"), Value::Number(20.0));
        assert_eq!(eval("2 ^ 3"), Value::Number(8.0));
    }

    #[test]
    fn test_integer_division_is_real() {
        assert_eq!(eval("1 / 2"), Value::Number(0.5));
    }

    #[test]
    fn test_prepare_inserts_implied_multiplication() {
        assert_eq!(prepare("5 kg").unwrap(), "5 *kg");
        assert_eq!(prepare("15 gal/min").unwrap(), "15 *gal/min");
        assert_eq!(prepare("2(a+b)").unwrap(), "2*(a+b)");
        assert_eq!(prepare("sqrt(4)").unwrap(), "sqrt(4)");
        assert_eq!(prepare("sqrt (4)").unwrap(), "sqrt (4)");
        assert_eq!(prepare("a (b)").unwrap(), "a *(b)");
        assert_eq!(prepare("5kg").unwrap(), "5*kg");
    }

    #[test]
    fn test_prepare_expands_exponent_literals() {
        assert_eq!(prepare("1e-3").unwrap(), "0.001");
        assert_eq!(prepare("2e3 m").unwrap(), "2000.0 *m");
        // `e` without digits is Euler's number
        assert_eq!(prepare("2e").unwrap(), "2*e");
    }

    #[test]
    fn test_quantity_literal() {
        let value = eval("15 gal/min");
        assert_eq!(value.unit().unwrap().to_string(), "gal/min");
        assert_eq!(value.magnitude(), 15.0);
    }

    #[test]
    fn test_compound_unit_power() {
        let value = eval("0.001 m^3/s");
        assert_eq!(value.unit().unwrap().to_string(), "m^3/s");
    }

    #[test]
    fn test_speed_conversion() {
        let value = eval("72 km/h");
        let converted = value.to(&Unit::parse("m/s").unwrap()).unwrap();
        assert!((converted.magnitude() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_bindings_shadow_units() {
        let mut vars = BTreeMap::new();
        vars.insert("m".to_string(), Value::Number(3.0));
        assert_eq!(evaluate("2 m", &vars).unwrap(), Value::Number(6.0));
    }

    #[test]
    fn test_undefined_symbol() {
        let err = evaluate("a + undefinedVar", &NoBindings).unwrap_err();
        assert_eq!(err.to_string(), "Undefined symbol a");
    }

    #[test]
    fn test_free_variables_skip_functions() {
        let names = free_variables("sqrt(x^2 + y) * 2 kg").unwrap();
        let expected: BTreeSet<String> =
            ["kg", "x", "y"].iter().map(|s| s.to_string()).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_function_with_several_arguments() {
        assert_eq!(eval("max(1, 7, 3)"), Value::Number(7.0));
        assert_eq!(eval("clamp(150, 0, 100)"), Value::Number(100.0));
    }

    #[test]
    fn test_comparison_yields_number() {
        assert_eq!(eval("1 m > 50 cm"), Value::Number(1.0));
        assert!(evaluate("1 m > 1 kg", &NoBindings).is_err());
    }

    #[test]
    fn test_parse_unit() {
        assert_eq!(Unit::parse("ft^3/min").unwrap().to_string(), "ft^3/min");
        assert!(matches!(
            Unit::parse("furlong"),
            Err(CalcError::UnknownUnit(_))
        ));
        assert!(Unit::parse("2 m").is_err());
    }

    #[test]
    fn test_deep_nesting_is_rejected_before_parsing() {
        let too_deep = "Expression is nested too deeply";
        let signs = format!("{}1", "-".repeat(5000));
        assert_eq!(evaluate(&signs, &NoBindings).unwrap_err().to_string(), too_deep);

        let parens = format!("{}1{}", "(".repeat(50_000), ")".repeat(50_000));
        assert_eq!(evaluate(&parens, &NoBindings).unwrap_err().to_string(), too_deep);
        assert!(free_variables(&parens).is_err());

        let powers = format!("2{}", "^1".repeat(1000));
        assert_eq!(evaluate(&powers, &NoBindings).unwrap_err().to_string(), too_deep);

        let wrapped_signs = "-(".repeat(200) + "1" + &")".repeat(200);
        assert_eq!(evaluate(&wrapped_signs, &NoBindings).unwrap_err().to_string(), too_deep);
    }

    #[test]
    fn test_nesting_within_limit_evaluates() {
        let parens = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(eval(&parens), Value::Number(1.0));
        assert_eq!(eval("--3"), Value::Number(3.0));
        // sibling groups do not add up
        let siblings = vec!["(1)"; 100].join(" + ");
        assert_eq!(eval(&siblings), Value::Number(100.0));
    }

    #[test]
    fn test_long_operator_chain_is_rejected() {
        let chain = vec!["1"; 5000].join(" + ");
        assert!(evaluate(&chain, &NoBindings).is_err());
    }

    #[test]
    fn test_invalid_syntax() {
        assert!(evaluate("2 + + ", &NoBindings).is_err());
        assert!(evaluate("", &NoBindings).is_err());
    }
}
