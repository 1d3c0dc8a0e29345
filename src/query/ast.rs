//! Query Abstract Syntax Tree
//!
//! Defines the AST for Chronicle Query Language (CQL), a SQL-like query language
//! optimized for time-series data queries.
//!
//! Every node exclusively owns its children; the tree is built once by the
//! parser and only read afterwards.
//!
//! # Example Queries
//!
//! ```text
//! SELECT value FROM cpu WHERE time > now() - 7d
//! SELECT sum(value) FROM cpu GROUP BY host
//! SELECT * FROM cpu WHERE time > now() - 1d AND (value > 90 OR value < 10)
//! ```

use std::fmt;

use serde::Serialize;

/// Name of the reserved time column
pub const TIME_COLUMN: &str = "time";

/// A parsed query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    /// Expressions to select
    pub select: Vec<SelectItem>,
    /// Source tables, in FROM order
    pub from: Vec<String>,
    /// Root of the WHERE condition tree
    pub where_clause: Option<Condition>,
    /// GROUP BY expressions (empty when absent)
    pub group_by: Vec<Expression>,
    /// Optional result ordering
    pub order: Option<SortOrder>,
    /// Optional limit on results
    pub limit: Option<u64>,
}

/// An item in the SELECT clause
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectItem {
    /// Selected expression
    pub expr: Expression,
    /// Optional alias for the result column
    pub alias: Option<String>,
}

impl SelectItem {
    /// Create a new select item without alias
    pub fn new(expr: Expression) -> Self {
        Self { expr, alias: None }
    }

    /// Add an alias
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

/// Result ordering by time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Value expressions
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    /// Constant value
    Literal(Literal),
    /// Reference to a column, optionally qualified by table
    ColumnRef(ColumnRef),
    /// Function or aggregate call, including `now()`
    FunctionCall(FunctionCall),
    /// Arithmetic between two expressions
    BinaryArith {
        op: ArithOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// `*`, either as a select item or a function argument
    Wildcard,
}

impl Expression {
    /// Bare column reference
    pub fn column(name: impl Into<String>) -> Self {
        Self::ColumnRef(ColumnRef {
            table: None,
            name: name.into(),
        })
    }

    /// Function call expression
    pub fn call(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Self::FunctionCall(FunctionCall {
            name: name.into(),
            args,
        })
    }

    /// Arithmetic expression
    pub fn arith(op: ArithOp, left: Expression, right: Expression) -> Self {
        Self::BinaryArith {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Whether this expression is the reserved `time` column
    pub fn is_time(&self) -> bool {
        matches!(self, Self::ColumnRef(col) if col.is_time())
    }
}

/// Column reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnRef {
    /// Qualifying table, if written as `table.column`
    pub table: Option<String>,
    /// Column name
    pub name: String,
}

impl ColumnRef {
    pub fn is_time(&self) -> bool {
        self.name.eq_ignore_ascii_case(TIME_COLUMN)
    }
}

/// Function call with ordered arguments
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionCall {
    /// Function name as written
    pub name: String,
    /// Arguments in call order
    pub args: Vec<Expression>,
}

impl FunctionCall {
    /// Whether this is a call to `now()`
    pub fn is_now(&self) -> bool {
        self.name.eq_ignore_ascii_case("now") && self.args.is_empty()
    }
}

/// Literal values
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Integer(i64),
    Float(f64),
    String(String),
    Duration(DurationLiteral),
}

/// A duration such as `7d` or `30m`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DurationLiteral {
    /// Number of units
    pub magnitude: i64,
    /// Time unit
    pub unit: DurationUnit,
}

impl DurationLiteral {
    pub fn new(magnitude: i64, unit: DurationUnit) -> Self {
        Self { magnitude, unit }
    }

    /// Total length in seconds, `None` on overflow
    pub fn as_seconds(&self) -> Option<i64> {
        self.magnitude.checked_mul(self.unit.seconds())
    }
}

/// Units accepted as duration suffixes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
}

impl DurationUnit {
    /// Parse a unit suffix
    pub fn from_suffix(c: char) -> Option<Self> {
        match c {
            's' => Some(Self::Second),
            'm' => Some(Self::Minute),
            'h' => Some(Self::Hour),
            'd' => Some(Self::Day),
            'w' => Some(Self::Week),
            _ => None,
        }
    }

    /// Suffix character
    pub fn suffix(&self) -> char {
        match self {
            Self::Second => 's',
            Self::Minute => 'm',
            Self::Hour => 'h',
            Self::Day => 'd',
            Self::Week => 'w',
        }
    }

    /// Length of one unit in seconds
    pub fn seconds(&self) -> i64 {
        match self {
            Self::Second => 1,
            Self::Minute => 60,
            Self::Hour => 60 * 60,
            Self::Day => 24 * 60 * 60,
            Self::Week => 7 * 24 * 60 * 60,
        }
    }
}

/// Arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    fn precedence(&self) -> u8 {
        match self {
            Self::Add | Self::Sub => 1,
            Self::Mul | Self::Div => 2,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    /// Equal to
    Eq,
    /// Not equal to
    Ne,
    /// Greater than
    Gt,
    /// Greater than or equal to
    Gte,
    /// Less than
    Lt,
    /// Less than or equal to
    Lte,
}

impl Operator {
    /// Operator to use when the operands swap sides (`a < b` is `b > a`)
    pub fn flip(&self) -> Self {
        match self {
            Self::Eq => Self::Eq,
            Self::Ne => Self::Ne,
            Self::Gt => Self::Lt,
            Self::Gte => Self::Lte,
            Self::Lt => Self::Gt,
            Self::Lte => Self::Gte,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq => write!(f, "=="),
            Self::Ne => write!(f, "!="),
            Self::Gt => write!(f, ">"),
            Self::Gte => write!(f, ">="),
            Self::Lt => write!(f, "<"),
            Self::Lte => write!(f, "<="),
        }
    }
}

/// Boolean connectives in the WHERE tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Connective {
    And,
    Or,
}

/// WHERE clause condition tree
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Comparison {
        left: Expression,
        op: Operator,
        right: Expression,
    },
    Boolean {
        connective: Connective,
        left: Box<Condition>,
        right: Box<Condition>,
    },
}

impl Condition {
    pub fn compare(left: Expression, op: Operator, right: Expression) -> Self {
        Self::Comparison { left, op, right }
    }

    pub fn and(left: Condition, right: Condition) -> Self {
        Self::Boolean {
            connective: Connective::And,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn or(left: Condition, right: Condition) -> Self {
        Self::Boolean {
            connective: Connective::Or,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "select ")?;
        write_list(f, &self.select)?;
        write!(f, " from ")?;
        for (i, table) in self.from.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write_identifier(f, table)?;
        }
        if let Some(cond) = &self.where_clause {
            write!(f, " where {}", cond)?;
        }
        if !self.group_by.is_empty() {
            write!(f, " group by ")?;
            write_list(f, &self.group_by)?;
        }
        match self.order {
            Some(SortOrder::Ascending) => write!(f, " order asc")?,
            Some(SortOrder::Descending) => write!(f, " order desc")?,
            None => {}
        }
        if let Some(limit) = self.limit {
            write!(f, " limit {}", limit)?;
        }
        write!(f, ";")
    }
}

impl fmt::Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        if let Some(alias) = &self.alias {
            write!(f, " as ")?;
            write_identifier(f, alias)?;
        }
        Ok(())
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(lit) => write!(f, "{}", lit),
            Self::ColumnRef(col) => write!(f, "{}", col),
            Self::FunctionCall(call) => {
                write!(f, "{}(", call.name)?;
                write_list(f, &call.args)?;
                write!(f, ")")
            }
            Self::BinaryArith { op, left, right } => {
                write_operand(f, left, op.precedence(), false)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, right, op.precedence(), true)
            }
            Self::Wildcard => write!(f, "*"),
        }
    }
}

fn write_operand(
    f: &mut fmt::Formatter<'_>,
    expr: &Expression,
    parent: u8,
    right_side: bool,
) -> fmt::Result {
    let needs_parens = match expr {
        Expression::BinaryArith { op, .. } => {
            op.precedence() < parent || (right_side && op.precedence() == parent)
        }
        _ => false,
    };
    if needs_parens {
        write!(f, "({})", expr)
    } else {
        write!(f, "{}", expr)
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(table) = &self.table {
            write_identifier(f, table)?;
            write!(f, ".")?;
        }
        write_identifier(f, &self.name)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{}", v),
            // Debug formatting keeps the fractional part of whole floats
            Self::Float(v) => write!(f, "{:?}", v),
            Self::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Self::Duration(d) => write!(f, "{}", d),
        }
    }
}

impl fmt::Display for DurationLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.magnitude, self.unit.suffix())
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Comparison { left, op, right } => write!(f, "{} {} {}", left, op, right),
            Self::Boolean {
                connective,
                left,
                right,
            } => {
                let word = match connective {
                    Connective::And => "and",
                    Connective::Or => "or",
                };
                write_branch(f, left, *connective)?;
                write!(f, " {} ", word)?;
                write_branch(f, right, *connective)
            }
        }
    }
}

fn write_branch(f: &mut fmt::Formatter<'_>, cond: &Condition, parent: Connective) -> fmt::Result {
    match cond {
        Condition::Boolean { connective, .. } if *connective != parent => write!(f, "({})", cond),
        _ => write!(f, "{}", cond),
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

/// Names that do not lex back as a plain identifier get backticks
fn write_identifier(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    let plain = name
        .chars()
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && crate::query::lexer::Keyword::from_word(name).is_none();
    if plain {
        write!(f, "{}", name)
    } else {
        write!(f, "`{}`", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_flip() {
        assert_eq!(Operator::Gt.flip(), Operator::Lt);
        assert_eq!(Operator::Gte.flip(), Operator::Lte);
        assert_eq!(Operator::Lt.flip(), Operator::Gt);
        assert_eq!(Operator::Lte.flip(), Operator::Gte);
        assert_eq!(Operator::Eq.flip(), Operator::Eq);
        assert_eq!(Operator::Ne.flip(), Operator::Ne);
    }

    #[test]
    fn test_duration_seconds() {
        assert_eq!(DurationLiteral::new(7, DurationUnit::Day).as_seconds(), Some(604_800));
        assert_eq!(DurationLiteral::new(1, DurationUnit::Week).as_seconds(), Some(604_800));
        assert_eq!(DurationLiteral::new(i64::MAX, DurationUnit::Hour).as_seconds(), None);
    }

    #[test]
    fn test_is_time() {
        assert!(Expression::column("time").is_time());
        assert!(Expression::column("TIME").is_time());
        assert!(!Expression::column("timestamp").is_time());
        assert!(!Expression::call("time", vec![]).is_time());
    }

    #[test]
    fn test_display_expression_precedence() {
        let expr = Expression::arith(
            ArithOp::Mul,
            Expression::arith(
                ArithOp::Add,
                Expression::column("a"),
                Expression::Literal(Literal::Integer(1)),
            ),
            Expression::column("b"),
        );
        assert_eq!(expr.to_string(), "(a + 1) * b");

        let expr = Expression::arith(
            ArithOp::Sub,
            Expression::call("now", vec![]),
            Expression::Literal(Literal::Duration(DurationLiteral::new(1, DurationUnit::Day))),
        );
        assert_eq!(expr.to_string(), "now() - 1d");
    }

    #[test]
    fn test_display_condition_grouping() {
        let or = Condition::or(
            Condition::compare(
                Expression::column("value"),
                Operator::Gt,
                Expression::Literal(Literal::Integer(90)),
            ),
            Condition::compare(
                Expression::column("value"),
                Operator::Lt,
                Expression::Literal(Literal::Integer(10)),
            ),
        );
        let cond = Condition::and(
            Condition::compare(
                Expression::column("host"),
                Operator::Eq,
                Expression::Literal(Literal::String("a'b".to_string())),
            ),
            or,
        );
        assert_eq!(
            cond.to_string(),
            "host == 'a''b' and (value > 90 or value < 10)"
        );
    }

    #[test]
    fn test_display_float_literal() {
        assert_eq!(Literal::Float(90.0).to_string(), "90.0");
        assert_eq!(Literal::Float(0.5).to_string(), "0.5");
    }
}
