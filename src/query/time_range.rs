//! Time Range Extraction
//!
//! Splits a WHERE tree into the scan range implied by its `time` comparisons
//! and the residual predicate left for the executor.
//!
//! Only comparisons reachable from the root through `AND` contribute to the
//! range. An `OR` whose branches bound `time` cannot be expressed as one
//! interval and is rejected; an `OR` without time comparisons is residual.
//!
//! ```text
//! time > now() - 1d and time < now() - 1h     start = now - 1d, end = now - 1h
//! now() - 1d < time                           same as time > now() - 1d
//! time > now() - 1d and (v > 90 or v < 10)    residual = (v > 90 or v < 10)
//! time > now() - 1d or time > now() - 1h      error: invalid where clause
//! ```

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;

use crate::query::ast::*;
use crate::query::error::{QueryError, QueryResult};

/// Which end of the range a bound limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundSide {
    Lower,
    Upper,
}

/// A resolved bound on `time`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeBound {
    pub instant: DateTime<Utc>,
    /// `>=` / `<=` rather than `>` / `<`
    pub inclusive: bool,
    pub side: BoundSide,
}

impl TimeBound {
    /// Whether `self` restricts the range more than `other` on the same side
    fn is_tighter_than(&self, other: &TimeBound) -> bool {
        match self.side {
            BoundSide::Lower if self.instant != other.instant => self.instant > other.instant,
            BoundSide::Upper if self.instant != other.instant => self.instant < other.instant,
            _ => !self.inclusive && other.inclusive,
        }
    }
}

/// Bounds found in a WHERE clause, before defaults are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TimeBounds {
    pub lower: Option<TimeBound>,
    pub upper: Option<TimeBound>,
}

impl TimeBounds {
    fn is_empty(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }

    fn tighten(&mut self, bound: TimeBound) {
        let slot = match bound.side {
            BoundSide::Lower => &mut self.lower,
            BoundSide::Upper => &mut self.upper,
        };
        let replace = match slot {
            Some(current) => bound.is_tighter_than(current),
            None => true,
        };
        if replace {
            *slot = Some(bound);
        }
    }

    fn merge(mut self, other: TimeBounds) -> TimeBounds {
        if let Some(lower) = other.lower {
            self.tighten(lower);
        }
        if let Some(upper) = other.upper {
            self.tighten(upper);
        }
        self
    }
}

/// Absolute scan range of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueryTimeRange {
    /// Lower bound, or the earliest representable instant
    pub start: DateTime<Utc>,
    /// Upper bound, or the instant the range was resolved
    pub end: DateTime<Utc>,
}

impl Query {
    /// Start of the scan range, resolved against the current time
    pub fn start_time(&self) -> QueryResult<DateTime<Utc>> {
        self.time_range().map(|range| range.start)
    }

    /// End of the scan range, resolved against the current time
    pub fn end_time(&self) -> QueryResult<DateTime<Utc>> {
        self.time_range().map(|range| range.end)
    }

    /// Both ends of the scan range from a single clock reading
    pub fn time_range(&self) -> QueryResult<QueryTimeRange> {
        self.time_range_at(Utc::now())
    }

    /// Scan range with `now()` fixed to `now`
    pub fn time_range_at(&self, now: DateTime<Utc>) -> QueryResult<QueryTimeRange> {
        let bounds = self.time_bounds_at(now)?;
        let range = QueryTimeRange {
            start: bounds.lower.map_or(DateTime::<Utc>::MIN_UTC, |b| b.instant),
            end: bounds.upper.map_or(now, |b| b.instant),
        };
        tracing::debug!(start = %range.start, end = %range.end, "resolved time range");
        Ok(range)
    }

    /// Bounds written in the WHERE clause, without defaults
    pub fn time_bounds_at(&self, now: DateTime<Utc>) -> QueryResult<TimeBounds> {
        match &self.where_clause {
            Some(cond) => split_where(cond, now).map(|split| split.bounds),
            None => Ok(TimeBounds::default()),
        }
    }

    /// WHERE clause with the time comparisons used for the range removed
    ///
    /// Returns `None` when nothing is left to filter on.
    pub fn where_condition(&self) -> QueryResult<Option<Condition>> {
        match &self.where_clause {
            Some(cond) => split_where(cond, Utc::now()).map(|split| split.residual),
            None => Ok(None),
        }
    }
}

/// Result of walking one WHERE subtree
struct WhereSplit {
    bounds: TimeBounds,
    residual: Option<Condition>,
}

fn split_where(cond: &Condition, now: DateTime<Utc>) -> QueryResult<WhereSplit> {
    match cond {
        Condition::Comparison { left, op, right } => {
            match time_bound(left, *op, right, now)? {
                Some(bound) => {
                    let mut bounds = TimeBounds::default();
                    bounds.tighten(bound);
                    Ok(WhereSplit {
                        bounds,
                        residual: None,
                    })
                }
                None => Ok(WhereSplit {
                    bounds: TimeBounds::default(),
                    residual: Some(cond.clone()),
                }),
            }
        }
        Condition::Boolean {
            connective: Connective::And,
            left,
            right,
        } => {
            let left = split_where(left, now)?;
            let right = split_where(right, now)?;
            let residual = match (left.residual, right.residual) {
                (Some(l), Some(r)) => Some(Condition::and(l, r)),
                (Some(only), None) | (None, Some(only)) => Some(only),
                (None, None) => None,
            };
            Ok(WhereSplit {
                bounds: left.bounds.merge(right.bounds),
                residual,
            })
        }
        Condition::Boolean {
            connective: Connective::Or,
            left,
            right,
        } => {
            // Walk both branches first so errors inside them are reported as such
            let left = split_where(left, now)?;
            let right = split_where(right, now)?;
            if !left.bounds.is_empty() || !right.bounds.is_empty() {
                return Err(QueryError::semantic(format!(
                    "Invalid where clause: time conditions joined by OR do not form a single range in '{}'",
                    cond
                )));
            }
            Ok(WhereSplit {
                bounds: TimeBounds::default(),
                residual: Some(cond.clone()),
            })
        }
    }
}

/// Bound described by one comparison, `None` if it does not involve `time`
fn time_bound(
    left: &Expression,
    op: Operator,
    right: &Expression,
    now: DateTime<Utc>,
) -> QueryResult<Option<TimeBound>> {
    let (op, other) = if left.is_time() {
        (op, right)
    } else if right.is_time() {
        (op.flip(), left)
    } else {
        return Ok(None);
    };

    let (side, inclusive) = match op {
        Operator::Gt => (BoundSide::Lower, false),
        Operator::Gte => (BoundSide::Lower, true),
        Operator::Lt => (BoundSide::Upper, false),
        Operator::Lte => (BoundSide::Upper, true),
        Operator::Eq | Operator::Ne => {
            return Err(QueryError::semantic(format!(
                "Cannot use time with '{}', only <, <=, > and >= are supported",
                op
            )))
        }
    };

    let instant = match evaluate(other, now)? {
        TimeValue::Instant(instant) => instant,
        TimeValue::Duration(_) => {
            return Err(QueryError::semantic(format!(
                "Invalid time expression '{}': a duration is not a point in time",
                other
            )))
        }
    };

    Ok(Some(TimeBound {
        instant,
        inclusive,
        side,
    }))
}

/// Intermediate values while evaluating a time expression
enum TimeValue {
    Instant(DateTime<Utc>),
    Duration(Duration),
}

fn evaluate(expr: &Expression, now: DateTime<Utc>) -> QueryResult<TimeValue> {
    match expr {
        Expression::Literal(Literal::Integer(secs)) => Utc
            .timestamp_opt(*secs, 0)
            .single()
            .map(TimeValue::Instant)
            .ok_or_else(|| QueryError::semantic(format!("Timestamp {} is out of range", secs))),
        Expression::Literal(Literal::Float(v)) => Err(QueryError::semantic(format!(
            "Invalid timestamp {:?}: expected an integer number of seconds",
            v
        ))),
        Expression::Literal(Literal::String(s)) => parse_timestamp(s).map(TimeValue::Instant),
        Expression::Literal(Literal::Duration(d)) => d
            .as_seconds()
            .and_then(Duration::try_seconds)
            .map(TimeValue::Duration)
            .ok_or_else(|| QueryError::semantic(format!("Duration {} is out of range", d))),
        Expression::ColumnRef(col) => Err(QueryError::semantic(format!(
            "Invalid timestamp '{}': expected an integer, a date string or now()",
            col
        ))),
        Expression::FunctionCall(call) if call.is_now() => Ok(TimeValue::Instant(now)),
        Expression::FunctionCall(call) => Err(QueryError::semantic(format!(
            "Invalid use of function {} in time expression",
            call.name
        ))),
        Expression::Wildcard => Err(QueryError::semantic(
            "Cannot use '*' as a time expression",
        )),
        Expression::BinaryArith { op, left, right } => {
            let left = evaluate(left, now)?;
            let right = evaluate(right, now)?;
            combine(*op, left, right, expr)
        }
    }
}

fn combine(op: ArithOp, left: TimeValue, right: TimeValue, expr: &Expression) -> QueryResult<TimeValue> {
    let out_of_range = || QueryError::semantic(format!("Time expression '{}' is out of range", expr));
    match (op, left, right) {
        (ArithOp::Add, TimeValue::Instant(t), TimeValue::Duration(d))
        | (ArithOp::Add, TimeValue::Duration(d), TimeValue::Instant(t)) => t
            .checked_add_signed(d)
            .map(TimeValue::Instant)
            .ok_or_else(out_of_range),
        (ArithOp::Sub, TimeValue::Instant(t), TimeValue::Duration(d)) => t
            .checked_sub_signed(d)
            .map(TimeValue::Instant)
            .ok_or_else(out_of_range),
        (ArithOp::Add, TimeValue::Duration(a), TimeValue::Duration(b)) => {
            a.checked_add(&b).map(TimeValue::Duration).ok_or_else(out_of_range)
        }
        (ArithOp::Sub, TimeValue::Duration(a), TimeValue::Duration(b)) => {
            a.checked_sub(&b).map(TimeValue::Duration).ok_or_else(out_of_range)
        }
        (ArithOp::Add, _, _) | (ArithOp::Sub, _, _) => Err(QueryError::semantic(format!(
            "Invalid time expression '{}': only durations can be added to or subtracted from a time",
            expr
        ))),
        (ArithOp::Mul, _, _) | (ArithOp::Div, _, _) => Err(QueryError::semantic(format!(
            "Cannot use '{}' in a time expression, only '+' and '-' are supported",
            op.symbol()
        ))),
    }
}

/// Absolute timestamps: RFC 3339, or `YYYY-MM-DD[ HH:MM:SS[.fff]]` in UTC
fn parse_timestamp(s: &str) -> QueryResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Some(naive) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    Err(QueryError::semantic(format!(
        "Invalid timestamp '{}': expected RFC 3339 or YYYY-MM-DD [HH:MM:SS]",
        s
    )))
}
