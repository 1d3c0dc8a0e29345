//! Query Parser
//!
//! Parses Chronicle Query Language (CQL) strings into the [`Query`] AST with a
//! hand-written recursive-descent parser over the lexer's token stream.
//!
//! # Supported Syntax
//!
//! ```text
//! SELECT expr [AS alias] [, ...] FROM table [, ...]
//! [WHERE condition]
//! [GROUP BY expr [, ...]]
//! [ORDER [BY time] ASC|DESC]
//! [LIMIT n] [;]
//! ```
//!
//! Precedence, loosest first: `OR`, `AND`, comparison, `+ -`, `* /`.
//!
//! # Examples
//!
//! ```text
//! SELECT value FROM cpu
//! SELECT * FROM cpu WHERE time > now() - 7d
//! SELECT sum(value) AS total FROM cpu GROUP BY host
//! SELECT value FROM cpu WHERE time > now() - 1d AND (value > 90 OR value < 10)
//! ```

use crate::query::ast::*;
use crate::query::error::{QueryError, QueryResult};
use crate::query::lexer::{tokenize, Keyword, Punct, Symbol, Token, TokenKind};

/// Default limit on the size of query text
pub const DEFAULT_MAX_QUERY_BYTES: usize = 64 * 1024;

/// Tallest condition or expression tree the parser builds
///
/// Chains of `AND`, `OR` and arithmetic count one level per operator, so this
/// also caps the length of a single chain.
pub const MAX_EXPRESSION_DEPTH: usize = 512;

/// Most parentheses and argument lists that may be open at once
pub const MAX_NESTING_DEPTH: usize = 100;

/// Options applied before parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserOptions {
    /// Reject query text longer than this many bytes
    pub max_query_bytes: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            max_query_bytes: DEFAULT_MAX_QUERY_BYTES,
        }
    }
}

/// Parse a query string into a Query AST
pub fn parse_query(input: &str) -> QueryResult<Query> {
    parse_query_with(input, &ParserOptions::default())
}

/// Parse a query string with explicit options
pub fn parse_query_with(input: &str, options: &ParserOptions) -> QueryResult<Query> {
    if input.len() > options.max_query_bytes {
        return Err(QueryError::TooLarge {
            size: input.len(),
            limit: options.max_query_bytes,
        });
    }

    let tokens = tokenize(input)?;
    tracing::trace!(tokens = tokens.len(), "tokenized query");

    let query = parse(tokens)?;
    tracing::debug!(
        select = query.select.len(),
        tables = query.from.len(),
        has_where = query.where_clause.is_some(),
        "parsed query"
    );
    Ok(query)
}

/// Build a query from a token stream
pub fn parse(tokens: Vec<Token>) -> QueryResult<Query> {
    Parser::new(tokens).parse_query()
}

/// A parsed subtree and its height
type Measured<T> = (T, usize);

/// What a parenthesised group turned out to hold
enum Operand {
    Expression(Measured<Expression>),
    Condition(Measured<Condition>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Open parentheses and argument lists
    nesting: usize,
    #[cfg(test)]
    advances: usize,
}

impl Parser {
    fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map_or(true, |t| t.kind != TokenKind::Eof) {
            let position = tokens.last().map(|t| t.position).unwrap_or_default();
            tokens.push(Token {
                kind: TokenKind::Eof,
                text: String::new(),
                position,
            });
        }
        Self {
            tokens,
            pos: 0,
            nesting: 0,
            #[cfg(test)]
            advances: 0,
        }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_next(&self) -> &Token {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
            #[cfg(test)]
            {
                self.advances += 1;
            }
        }
        token
    }

    fn check_keyword(&self, keyword: Keyword) -> bool {
        self.peek().kind == TokenKind::Keyword(keyword)
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        if self.check_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> QueryResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(&keyword.to_string()))
        }
    }

    fn check_punct(&self, punct: Punct) -> bool {
        self.peek().kind == TokenKind::Punctuation(punct)
    }

    fn eat_punct(&mut self, punct: Punct) -> bool {
        if self.check_punct(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: Punct, expected: &str) -> QueryResult<()> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn check_symbol(&self, symbol: Symbol) -> bool {
        self.peek().kind == TokenKind::Operator(symbol)
    }

    fn unexpected(&self, expected: &str) -> QueryError {
        let token = self.peek();
        QueryError::syntax(
            format!("unexpected {}, expected {}", token.describe(), expected),
            token.position,
        )
    }

    /// Run `parse` one level of parentheses deeper
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> QueryResult<T>) -> QueryResult<T> {
        if self.nesting >= MAX_NESTING_DEPTH {
            let token = self.peek();
            return Err(QueryError::syntax(
                format!(
                    "query nested too deeply at {}, at most {} levels of parentheses are allowed",
                    token.describe(),
                    MAX_NESTING_DEPTH
                ),
                token.position,
            ));
        }
        self.nesting += 1;
        let result = parse(self);
        self.nesting -= 1;
        result
    }

    /// Height of a new node above children no taller than `children`
    fn grow(&self, children: usize) -> QueryResult<usize> {
        let height = children + 1;
        if height > MAX_EXPRESSION_DEPTH {
            let token = self.peek();
            return Err(QueryError::syntax(
                format!(
                    "expression nested too deeply before {}, at most {} levels are allowed",
                    token.describe(),
                    MAX_EXPRESSION_DEPTH
                ),
                token.position,
            ));
        }
        Ok(height)
    }

    fn parse_query(&mut self) -> QueryResult<Query> {
        self.expect_keyword(Keyword::Select)?;
        let select = self.parse_select_list()?;

        self.expect_keyword(Keyword::From)?;
        let from = self.parse_table_list()?;

        let where_clause = if self.eat_keyword(Keyword::Where) {
            Some(self.parse_condition()?.0)
        } else {
            None
        };

        let group_by = if self.eat_keyword(Keyword::Group) {
            self.expect_keyword(Keyword::By)?;
            self.parse_expression_list()?
        } else {
            Vec::new()
        };

        let order = if self.eat_keyword(Keyword::Order) {
            Some(self.parse_order()?)
        } else {
            None
        };

        let limit = if self.eat_keyword(Keyword::Limit) {
            Some(self.parse_limit()?)
        } else {
            None
        };

        self.eat_punct(Punct::Semicolon);
        if self.peek().kind != TokenKind::Eof {
            return Err(self.unexpected("end of query"));
        }

        Ok(Query {
            select,
            from,
            where_clause,
            group_by,
            order,
            limit,
        })
    }

    fn parse_select_list(&mut self) -> QueryResult<Vec<SelectItem>> {
        let mut items = vec![self.parse_select_item()?];
        while self.eat_punct(Punct::Comma) {
            items.push(self.parse_select_item()?);
        }
        Ok(items)
    }

    fn parse_select_item(&mut self) -> QueryResult<SelectItem> {
        let expr = if self.check_symbol(Symbol::Star) {
            self.advance();
            Expression::Wildcard
        } else {
            self.parse_expression()?.0
        };

        let mut item = SelectItem::new(expr);
        if self.eat_keyword(Keyword::As) {
            item = item.with_alias(self.parse_identifier("alias")?);
        }
        Ok(item)
    }

    fn parse_table_list(&mut self) -> QueryResult<Vec<String>> {
        let mut tables = vec![self.parse_table_name()?];
        while self.eat_punct(Punct::Comma) {
            tables.push(self.parse_table_name()?);
        }
        Ok(tables)
    }

    /// Table names may be dotted, e.g. `db.cpu`
    fn parse_table_name(&mut self) -> QueryResult<String> {
        let mut name = self.parse_identifier("table name")?;
        while self.eat_punct(Punct::Dot) {
            name.push('.');
            name.push_str(&self.parse_identifier("table name")?);
        }
        Ok(name)
    }

    fn parse_identifier(&mut self, expected: &str) -> QueryResult<String> {
        match &self.peek().kind {
            TokenKind::Identifier(name) | TokenKind::QuotedIdentifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn parse_order(&mut self) -> QueryResult<SortOrder> {
        if self.eat_keyword(Keyword::By) {
            let token = self.peek().clone();
            let column = self.parse_identifier("time")?;
            if !column.eq_ignore_ascii_case(TIME_COLUMN) {
                return Err(QueryError::syntax(
                    format!("cannot order by '{}', only time ordering is supported", column),
                    token.position,
                ));
            }
        }

        if self.eat_keyword(Keyword::Asc) {
            Ok(SortOrder::Ascending)
        } else if self.eat_keyword(Keyword::Desc) {
            Ok(SortOrder::Descending)
        } else {
            Err(self.unexpected("ASC or DESC"))
        }
    }

    fn parse_limit(&mut self) -> QueryResult<u64> {
        match self.peek().kind {
            TokenKind::Integer(n) => {
                self.advance();
                // Integer tokens never carry a sign
                Ok(n as u64)
            }
            _ => Err(self.unexpected("integer limit")),
        }
    }

    fn parse_expression_list(&mut self) -> QueryResult<Vec<Expression>> {
        let mut exprs = vec![self.parse_expression()?.0];
        while self.eat_punct(Punct::Comma) {
            exprs.push(self.parse_expression()?.0);
        }
        Ok(exprs)
    }

    fn parse_condition(&mut self) -> QueryResult<Measured<Condition>> {
        let first = self.parse_predicate()?;
        self.continue_condition(first)
    }

    /// Finish an OR chain whose first predicate has been read
    fn continue_condition(&mut self, first: Measured<Condition>) -> QueryResult<Measured<Condition>> {
        let (mut left, mut height) = self.continue_and(first)?;
        while self.eat_keyword(Keyword::Or) {
            let (right, right_height) = self.parse_and()?;
            height = self.grow(height.max(right_height))?;
            left = Condition::or(left, right);
        }
        Ok((left, height))
    }

    fn parse_and(&mut self) -> QueryResult<Measured<Condition>> {
        let first = self.parse_predicate()?;
        self.continue_and(first)
    }

    fn continue_and(&mut self, first: Measured<Condition>) -> QueryResult<Measured<Condition>> {
        let (mut left, mut height) = first;
        while self.eat_keyword(Keyword::And) {
            let (right, right_height) = self.parse_predicate()?;
            height = self.grow(height.max(right_height))?;
            left = Condition::and(left, right);
        }
        Ok((left, height))
    }

    /// A leading `(` opens either a grouped condition or an arithmetic
    /// operand. The group is read once and its contents decide which.
    fn parse_predicate(&mut self) -> QueryResult<Measured<Condition>> {
        match self.parse_operand()? {
            Operand::Condition(cond) => Ok(cond),
            Operand::Expression(left) => self.finish_comparison(left),
        }
    }

    fn parse_operand(&mut self) -> QueryResult<Operand> {
        if !self.check_punct(Punct::LParen) {
            return self.parse_expression().map(Operand::Expression);
        }

        match self.parse_group()? {
            Operand::Condition(cond) => Ok(Operand::Condition(cond)),
            Operand::Expression(inner) => {
                let term = self.continue_term(inner)?;
                self.continue_expression(term).map(Operand::Expression)
            }
        }
    }

    fn parse_group(&mut self) -> QueryResult<Operand> {
        self.nested(|parser| {
            parser.expect_punct(Punct::LParen, "'('")?;
            let operand = match parser.parse_operand()? {
                Operand::Expression(expr) if parser.check_punct(Punct::RParen) => {
                    Operand::Expression(expr)
                }
                Operand::Expression(left) => {
                    let first = parser.finish_comparison(left)?;
                    Operand::Condition(parser.continue_condition(first)?)
                }
                Operand::Condition(first) => Operand::Condition(parser.continue_condition(first)?),
            };
            parser.expect_punct(Punct::RParen, "')'")?;
            Ok(operand)
        })
    }

    /// `left` has been read; expect a comparison operator and its right side
    fn finish_comparison(&mut self, left: Measured<Expression>) -> QueryResult<Measured<Condition>> {
        let (left, left_height) = left;
        let op = match self.peek().kind {
            TokenKind::Operator(Symbol::Gt) => Operator::Gt,
            TokenKind::Operator(Symbol::Gte) => Operator::Gte,
            TokenKind::Operator(Symbol::Lt) => Operator::Lt,
            TokenKind::Operator(Symbol::Lte) => Operator::Lte,
            TokenKind::Operator(Symbol::Eq) => Operator::Eq,
            TokenKind::Operator(Symbol::Ne) => Operator::Ne,
            _ => return Err(self.unexpected("comparison operator")),
        };
        self.advance();
        let (right, right_height) = self.parse_expression()?;
        let height = self.grow(left_height.max(right_height))?;
        Ok((Condition::compare(left, op, right), height))
    }

    fn parse_expression(&mut self) -> QueryResult<Measured<Expression>> {
        let left = self.parse_term()?;
        self.continue_expression(left)
    }

    fn continue_expression(&mut self, left: Measured<Expression>) -> QueryResult<Measured<Expression>> {
        let (mut left, mut height) = left;
        loop {
            let op = match self.peek().kind {
                TokenKind::Operator(Symbol::Plus) => ArithOp::Add,
                TokenKind::Operator(Symbol::Minus) => ArithOp::Sub,
                _ => return Ok((left, height)),
            };
            self.advance();
            let (right, right_height) = self.parse_term()?;
            height = self.grow(height.max(right_height))?;
            left = Expression::arith(op, left, right);
        }
    }

    fn parse_term(&mut self) -> QueryResult<Measured<Expression>> {
        let left = self.parse_unary()?;
        self.continue_term(left)
    }

    fn continue_term(&mut self, left: Measured<Expression>) -> QueryResult<Measured<Expression>> {
        let (mut left, mut height) = left;
        loop {
            let op = match self.peek().kind {
                TokenKind::Operator(Symbol::Star) => ArithOp::Mul,
                TokenKind::Operator(Symbol::Slash) => ArithOp::Div,
                _ => return Ok((left, height)),
            };
            self.advance();
            let (right, right_height) = self.parse_unary()?;
            height = self.grow(height.max(right_height))?;
            left = Expression::arith(op, left, right);
        }
    }

    /// Unary minus is only allowed on numeric and duration literals
    fn parse_unary(&mut self) -> QueryResult<Measured<Expression>> {
        if !self.check_symbol(Symbol::Minus) {
            return self.parse_primary();
        }
        self.advance();

        let literal = match self.peek().kind {
            TokenKind::Integer(n) => Literal::Integer(-n),
            TokenKind::Float(v) => Literal::Float(-v),
            TokenKind::Duration(d) => {
                Literal::Duration(DurationLiteral::new(-d.magnitude, d.unit))
            }
            _ => return Err(self.unexpected("number after '-'")),
        };
        self.advance();
        Ok((Expression::Literal(literal), 1))
    }

    fn parse_primary(&mut self) -> QueryResult<Measured<Expression>> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Integer(n) => {
                self.advance();
                Ok((Expression::Literal(Literal::Integer(n)), 1))
            }
            TokenKind::Float(v) => {
                self.advance();
                Ok((Expression::Literal(Literal::Float(v)), 1))
            }
            TokenKind::String(s) => {
                self.advance();
                Ok((Expression::Literal(Literal::String(s)), 1))
            }
            TokenKind::Duration(d) => {
                self.advance();
                Ok((Expression::Literal(Literal::Duration(d)), 1))
            }
            TokenKind::Keyword(Keyword::Now) => {
                self.advance();
                self.expect_punct(Punct::LParen, "'(' after now")?;
                self.expect_punct(Punct::RParen, "')' (now takes no arguments)")?;
                Ok((Expression::call("now", Vec::new()), 1))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                if self.check_punct(Punct::LParen) {
                    let (args, height) = self.parse_arguments()?;
                    Ok((Expression::call(name, args), self.grow(height)?))
                } else {
                    self.parse_column_ref(name).map(|expr| (expr, 1))
                }
            }
            TokenKind::QuotedIdentifier(name) => {
                self.advance();
                self.parse_column_ref(name).map(|expr| (expr, 1))
            }
            TokenKind::Punctuation(Punct::LParen) => self.nested(|parser| {
                parser.advance();
                let expr = parser.parse_expression()?;
                parser.expect_punct(Punct::RParen, "')'")?;
                Ok(expr)
            }),
            _ => Err(self.unexpected("expression")),
        }
    }

    /// `name` has been consumed; a following `.column` makes it a table
    fn parse_column_ref(&mut self, name: String) -> QueryResult<Expression> {
        if self.eat_punct(Punct::Dot) {
            let column = self.parse_identifier("column name")?;
            Ok(Expression::ColumnRef(ColumnRef {
                table: Some(name),
                name: column,
            }))
        } else {
            Ok(Expression::ColumnRef(ColumnRef { table: None, name }))
        }
    }

    /// Arguments with the height of the tallest one
    fn parse_arguments(&mut self) -> QueryResult<Measured<Vec<Expression>>> {
        self.nested(|parser| {
            parser.expect_punct(Punct::LParen, "'('")?;
            let mut args = Vec::new();
            let mut height = 0;
            if parser.eat_punct(Punct::RParen) {
                return Ok((args, height));
            }

            loop {
                if parser.check_symbol(Symbol::Star)
                    && matches!(
                        parser.peek_next().kind,
                        TokenKind::Punctuation(Punct::Comma) | TokenKind::Punctuation(Punct::RParen)
                    )
                {
                    parser.advance();
                    args.push(Expression::Wildcard);
                    height = height.max(1);
                } else {
                    let (arg, arg_height) = parser.parse_expression()?;
                    args.push(arg);
                    height = height.max(arg_height);
                }

                if parser.eat_punct(Punct::RParen) {
                    return Ok((args, height));
                }
                parser.expect_punct(Punct::Comma, "',' or ')'")?;
            }
        })
    }
}
