//! Column reference extraction
//!
//! Collects, per table, the columns a query reads so the storage engine knows
//! what to project.

use std::collections::{BTreeMap, BTreeSet};

use crate::query::ast::*;

/// Column recorded for `*`
pub const ALL_COLUMNS: &str = "*";

/// Table name to referenced column names
pub type ColumnMap = BTreeMap<String, BTreeSet<String>>;

impl Query {
    /// Columns referenced anywhere in the select list, WHERE clause or GROUP BY
    ///
    /// Unqualified columns count against every FROM table. `time` is implied
    /// for every table and never listed; function names and literals are
    /// skipped. Every FROM table is present even when nothing is read from it.
    pub fn referenced_columns(&self) -> ColumnMap {
        let mut collector = ColumnCollector {
            from: &self.from,
            columns: self
                .from
                .iter()
                .map(|table| (table.clone(), BTreeSet::new()))
                .collect(),
        };

        for item in &self.select {
            collector.expression(&item.expr);
        }
        if let Some(cond) = &self.where_clause {
            collector.condition(cond);
        }
        for expr in &self.group_by {
            collector.expression(expr);
        }

        collector.columns
    }
}

struct ColumnCollector<'a> {
    from: &'a [String],
    columns: ColumnMap,
}

impl ColumnCollector<'_> {
    fn condition(&mut self, cond: &Condition) {
        match cond {
            Condition::Comparison { left, right, .. } => {
                self.expression(left);
                self.expression(right);
            }
            Condition::Boolean { left, right, .. } => {
                self.condition(left);
                self.condition(right);
            }
        }
    }

    fn expression(&mut self, expr: &Expression) {
        match expr {
            Expression::Literal(_) => {}
            Expression::ColumnRef(col) if col.is_time() => {}
            Expression::ColumnRef(col) => match &col.table {
                Some(table) => self.add(table, &col.name),
                None => self.add_unqualified(&col.name),
            },
            Expression::FunctionCall(call) => {
                for arg in &call.args {
                    self.expression(arg);
                }
            }
            Expression::BinaryArith { left, right, .. } => {
                self.expression(left);
                self.expression(right);
            }
            Expression::Wildcard => self.add_unqualified(ALL_COLUMNS),
        }
    }

    fn add(&mut self, table: &str, column: &str) {
        self.columns
            .entry(table.to_string())
            .or_default()
            .insert(column.to_string());
    }

    fn add_unqualified(&mut self, column: &str) {
        for table in self.from {
            self.add(table, column);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse_query;

    fn columns(query: &str) -> ColumnMap {
        parse_query(query).unwrap().referenced_columns()
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_select_where_group_by() {
        let columns = columns(
            "select value1, sum(value2) from t where value > 90.0 and value2 < 10.0 group by value3;",
        );
        let mut expected = ColumnMap::new();
        expected.insert("t".to_string(), set(&["value", "value1", "value2", "value3"]));
        assert_eq!(columns, expected);
    }

    #[test]
    fn test_time_and_functions_excluded() {
        let columns = columns(
            "select max(value) from cpu where time > now() - 1d and host == 'a' group by time(1h)",
        );
        assert_eq!(columns["cpu"], set(&["host", "value"]));
    }

    #[test]
    fn test_wildcard() {
        let columns = columns("select * from t where time > now() - 1d");
        assert_eq!(columns["t"], set(&["*"]));

        let columns = self::columns("select count(*) from t");
        assert_eq!(columns["t"], set(&["*"]));
    }

    #[test]
    fn test_qualified_columns() {
        let columns = columns("select cpu.value, mem.used from cpu, mem where host == 'a'");
        assert_eq!(columns["cpu"], set(&["host", "value"]));
        assert_eq!(columns["mem"], set(&["host", "used"]));
    }

    #[test]
    fn test_table_without_columns_listed() {
        let columns = columns("select cpu.value from cpu, mem");
        assert_eq!(columns["mem"], BTreeSet::new());
        assert_eq!(columns.len(), 2);
    }

    #[test]
    fn test_duplicates_collapse() {
        let columns = columns("select value, value * 2 from t where value > 1 or value < 0");
        assert_eq!(columns["t"], set(&["value"]));
    }

    #[test]
    fn test_case_preserved() {
        let columns = columns("select Value, value from t");
        assert_eq!(columns["t"], set(&["Value", "value"]));
    }
}
