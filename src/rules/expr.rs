//! A minimal `<metric> <op> <literal>` predicate grammar (spec.md §9:
//! "intentionally unspecified at the language level"). Regex-assisted
//! tokenizing, not a full parser — richer grammars are explicitly orthogonal.

use regex::Regex;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl CompareOp {
    /// NaN never satisfies any comparison (spec.md §4.6).
    fn apply(self, value: f64, literal: f64) -> bool {
        if value.is_nan() {
            return false;
        }
        match self {
            Self::Gt => value > literal,
            Self::Lt => value < literal,
            Self::Ge => value >= literal,
            Self::Le => value <= literal,
            Self::Eq => (value - literal).abs() < f64::EPSILON,
            Self::Ne => (value - literal).abs() >= f64::EPSILON,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParsedExpr {
    pub metric_name: String,
    op: CompareOp,
    literal: f64,
}

impl ParsedExpr {
    pub fn evaluate(&self, metric_name: &str, value: f64) -> bool {
        metric_name == self.metric_name && self.op.apply(value, self.literal)
    }
}

static EXPR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z0-9_.]+)\s*(>=|<=|==|!=|>|<)\s*(-?[0-9]+(?:\.[0-9]+)?)\s*$")
        .expect("expression pattern is valid")
});

#[derive(Debug, thiserror::Error)]
pub enum ExprParseError {
    #[error("expression `{0}` does not match `<metric> <op> <literal>`")]
    Malformed(String),
}

/// Parses `"cpu.usage > 80"`-style predicates.
pub fn parse(expression: &str) -> Result<ParsedExpr, ExprParseError> {
    let captures = EXPR_PATTERN
        .captures(expression)
        .ok_or_else(|| ExprParseError::Malformed(expression.to_string()))?;

    let metric_name = captures[1].to_string();
    let op = match &captures[2] {
        ">" => CompareOp::Gt,
        "<" => CompareOp::Lt,
        ">=" => CompareOp::Ge,
        "<=" => CompareOp::Le,
        "==" => CompareOp::Eq,
        "!=" => CompareOp::Ne,
        _ => unreachable!("regex only captures known operators"),
    };
    let literal: f64 = captures[3]
        .parse()
        .map_err(|_| ExprParseError::Malformed(expression.to_string()))?;

    Ok(ParsedExpr {
        metric_name,
        op,
        literal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_operators() {
        assert!(parse("cpu.usage > 80").is_ok());
        assert!(parse("cpu.usage < 80").is_ok());
        assert!(parse("cpu.usage >= 80").is_ok());
        assert!(parse("cpu.usage <= 80").is_ok());
        assert!(parse("cpu.usage == 80").is_ok());
        assert!(parse("cpu.usage != 80").is_ok());
    }

    #[test]
    fn rejects_malformed_expression() {
        assert!(parse("cpu.usage ~ 80").is_err());
        assert!(parse("not an expression").is_err());
    }

    #[test]
    fn evaluate_matches_metric_name_and_predicate() {
        let expr = parse("cpu.usage > 80").unwrap();
        assert!(expr.evaluate("cpu.usage", 90.0));
        assert!(!expr.evaluate("cpu.usage", 10.0));
        assert!(!expr.evaluate("mem.usage", 90.0));
    }

    #[test]
    fn nan_never_satisfies_a_predicate() {
        let expr = parse("cpu.usage > 80").unwrap();
        assert!(!expr.evaluate("cpu.usage", f64::NAN));

        let ne_expr = parse("cpu.usage != 0").unwrap();
        assert!(!ne_expr.evaluate("cpu.usage", f64::NAN));
    }
}
