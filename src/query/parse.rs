//! # Surface-Syntax Parser
//!
//! Reads the S-expression query syntax into [`Query`] values. The reader
//! handles the full literal grammar: strings with standard escapes, integers
//! with ignored `M`/`N` suffixes, floats with exponents, booleans, `nil`,
//! keywords, symbols, tagged values (`#inst`, `#id`, `#bytes`), character
//! literals, sets, the `#_` discard form, and `;` line comments. Commas are
//! whitespace.
//!
//! Errors carry the line and column where reading failed.

use crate::error::{QueryError, Result};
use crate::query::ast::{
    AggregateFn, BindForm, Clause, CompareOp, Direction, Expression, FindElem, InputSpec,
    OrderSpec, Pattern, PatternElem, Predicate, Query, Subquery, Symbol, Term,
};
use crate::value::{Identity, Value, HASH_LEN};
use chrono::{DateTime, Utc};
use std::iter::Peekable;
use std::str::Chars;

/// A read form with its source position.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Form {
    pub kind: FormKind,
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FormKind {
    List(Vec<Form>),
    Vector(Vec<Form>),
    Set(Vec<Form>),
    Symbol(String),
    Keyword(String),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
    Char(char),
    Tagged(String, Box<Form>),
}

struct Reader<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    col: usize,
}

impl<'a> Reader<'a> {
    fn new(source: &'a str) -> Self {
        Reader {
            chars: source.chars().peekable(),
            line: 1,
            col: 1,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn error(&self, message: impl Into<String>) -> QueryError {
        QueryError::Parse {
            line: self.line,
            column: self.col,
            message: message.into(),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == ',' {
                self.bump();
            } else if c == ';' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn is_delimiter(c: char) -> bool {
        c.is_whitespace() || matches!(c, ',' | '(' | ')' | '[' | ']' | '{' | '}' | '"' | ';')
    }

    /// Read the next form, transparently dropping `#_` discards.
    fn read(&mut self) -> Result<Form> {
        loop {
            self.skip_whitespace();
            let line = self.line;
            let col = self.col;
            let c = self
                .peek()
                .ok_or_else(|| self.error("unexpected end of input"))?;

            let kind = match c {
                '(' => {
                    self.bump();
                    FormKind::List(self.read_until(')')?)
                }
                '[' => {
                    self.bump();
                    FormKind::Vector(self.read_until(']')?)
                }
                ')' | ']' | '}' => return Err(self.error(format!("unexpected '{c}'"))),
                '"' => FormKind::Str(self.read_string()?),
                '\\' => FormKind::Char(self.read_char()?),
                '#' => {
                    self.bump();
                    match self.peek() {
                        Some('{') => {
                            self.bump();
                            FormKind::Set(self.read_until('}')?)
                        }
                        Some('_') => {
                            self.bump();
                            self.read()?; // discard the next form
                            continue;
                        }
                        Some(_) => {
                            let tag = self.read_token()?;
                            if tag.is_empty() {
                                return Err(self.error("expected tag name after '#'"));
                            }
                            let value = self.read()?;
                            FormKind::Tagged(tag, Box::new(value))
                        }
                        None => return Err(self.error("unexpected end of input after '#'")),
                    }
                }
                _ => {
                    let token = self.read_token()?;
                    self.classify_token(token)?
                }
            };

            return Ok(Form { kind, line, col });
        }
    }

    fn read_until(&mut self, closer: char) -> Result<Vec<Form>> {
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(c) if c == closer => {
                    self.bump();
                    return Ok(items);
                }
                Some(_) => items.push(self.read()?),
                None => return Err(self.error(format!("expected '{closer}' before end of input"))),
            }
        }
    }

    fn read_string(&mut self) -> Result<String> {
        self.bump(); // opening quote
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    Some(c) => return Err(self.error(format!("unknown escape '\\{c}'"))),
                    None => return Err(self.error("unterminated string")),
                },
                Some(c) => out.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn read_char(&mut self) -> Result<char> {
        self.bump(); // backslash
        let mut token = String::new();
        while let Some(c) = self.peek() {
            if Self::is_delimiter(c) && !token.is_empty() {
                break;
            }
            token.push(c);
            self.bump();
        }
        match token.as_str() {
            "newline" => Ok('\n'),
            "return" => Ok('\r'),
            "space" => Ok(' '),
            "tab" => Ok('\t'),
            t if t.chars().count() == 1 => Ok(t.chars().next().expect("one char")),
            _ => Err(self.error(format!("invalid character literal '\\{token}'"))),
        }
    }

    fn read_token(&mut self) -> Result<String> {
        let mut token = String::new();
        while let Some(c) = self.peek() {
            if Self::is_delimiter(c) {
                break;
            }
            token.push(c);
            self.bump();
        }
        Ok(token)
    }

    fn classify_token(&self, token: String) -> Result<FormKind> {
        match token.as_str() {
            "true" => return Ok(FormKind::Bool(true)),
            "false" => return Ok(FormKind::Bool(false)),
            "nil" => return Ok(FormKind::Nil),
            _ => {}
        }
        if let Some(rest) = token.strip_prefix(':') {
            if rest.is_empty() {
                return Err(self.error("empty keyword"));
            }
            return Ok(FormKind::Keyword(token));
        }
        if token
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '+' | '-'))
        {
            if let Some(kind) = self.classify_number(&token)? {
                return Ok(kind);
            }
        }
        Ok(FormKind::Symbol(token))
    }

    /// `Ok(None)` when the token is not numeric (e.g. the symbols `+`, `-`).
    fn classify_number(&self, token: &str) -> Result<Option<FormKind>> {
        let body = token.strip_prefix(['+', '-']).unwrap_or(token);
        if body.is_empty() || !body.starts_with(|c: char| c.is_ascii_digit()) {
            return Ok(None);
        }

        // M (arbitrary-precision float) and N (arbitrary-precision int)
        // suffixes are accepted and ignored by the present engine.
        let (digits, suffix) = match token.as_bytes().last() {
            Some(b'M') => (&token[..token.len() - 1], Some('M')),
            Some(b'N') => (&token[..token.len() - 1], Some('N')),
            _ => (token, None),
        };

        let is_float = digits.contains(['.', 'e', 'E']);
        if is_float {
            if suffix == Some('N') {
                return Err(self.error(format!("'N' suffix is not valid on floats: {token}")));
            }
            let f: f64 = digits
                .parse()
                .map_err(|_| self.error(format!("invalid number '{token}'")))?;
            Ok(Some(FormKind::Float(f)))
        } else {
            let i: i64 = digits
                .parse()
                .map_err(|_| self.error(format!("invalid number '{token}'")))?;
            Ok(Some(FormKind::Int(i)))
        }
    }
}

fn form_error(form: &Form, message: impl Into<String>) -> QueryError {
    QueryError::Parse {
        line: form.line,
        column: form.col,
        message: message.into(),
    }
}

/// Convert a literal form into a value. Bare symbols mint identities, so
/// entity literals like `alice` denote the identity hashed from that name.
fn form_to_value(form: &Form) -> Result<Value> {
    match &form.kind {
        FormKind::Str(s) => Ok(Value::String(s.clone())),
        FormKind::Int(i) => Ok(Value::Int64(*i)),
        FormKind::Float(f) => Ok(Value::Float64(*f)),
        FormKind::Bool(b) => Ok(Value::Bool(*b)),
        FormKind::Keyword(text) => {
            Value::keyword(text).ok_or_else(|| form_error(form, format!("invalid keyword {text}")))
        }
        FormKind::Symbol(name) => Ok(Value::identity(name)),
        FormKind::Tagged(tag, inner) => tagged_to_value(form, tag, inner),
        FormKind::Nil => Err(form_error(form, "nil is not a storable value")),
        FormKind::Char(_) => Err(form_error(form, "character literals are not storable values")),
        FormKind::Set(_) => Err(form_error(form, "set literals are not storable values")),
        FormKind::List(_) | FormKind::Vector(_) => {
            Err(form_error(form, "expected a literal value"))
        }
    }
}

fn tagged_to_value(form: &Form, tag: &str, inner: &Form) -> Result<Value> {
    let text = match &inner.kind {
        FormKind::Str(s) => s.as_str(),
        _ => return Err(form_error(form, format!("#{tag} expects a string"))),
    };
    match tag {
        "inst" => {
            let t = DateTime::parse_from_rfc3339(text)
                .map_err(|e| form_error(form, format!("invalid #inst literal: {e}")))?;
            Ok(Value::Time(t.with_timezone(&Utc)))
        }
        "id" => {
            let raw = hex::decode(text)
                .map_err(|_| form_error(form, "invalid #id literal: expected hex"))?;
            let hash: [u8; HASH_LEN] = raw
                .try_into()
                .map_err(|_| form_error(form, "invalid #id literal: expected 20 bytes"))?;
            Ok(Value::Identity(Identity::from_hash(hash)))
        }
        "bytes" => {
            let raw = hex::decode(text)
                .map_err(|_| form_error(form, "invalid #bytes literal: expected hex"))?;
            Ok(Value::Bytes(raw))
        }
        other => Err(form_error(form, format!("unknown tag #{other}"))),
    }
}

/// Parse a single value literal.
pub fn parse_value(source: &str) -> Result<Value> {
    let mut reader = Reader::new(source);
    let form = reader.read()?;
    form_to_value(&form)
}

/// Parse a query from its surface syntax.
pub fn parse_query(source: &str) -> Result<Query> {
    let mut reader = Reader::new(source);
    let form = reader.read()?;
    build_query(&form)
}

fn build_query(form: &Form) -> Result<Query> {
    let items = match &form.kind {
        FormKind::Vector(items) => items,
        _ => return Err(form_error(form, "a query is a bracketed form")),
    };

    let mut query = Query::default();
    let mut section: Option<&str> = None;
    let mut seen_find = false;
    let mut seen_where = false;

    let mut iter = items.iter();
    while let Some(item) = iter.next() {
        if let FormKind::Keyword(kw) = &item.kind {
            match kw.as_str() {
                ":find" => {
                    section = Some("find");
                    seen_find = true;
                }
                ":in" => section = Some("in"),
                ":where" => {
                    section = Some("where");
                    seen_where = true;
                }
                ":order-by" => {
                    let specs = iter
                        .next()
                        .ok_or_else(|| form_error(item, ":order-by expects a vector of specs"))?;
                    query.order_by = build_order_by(specs)?;
                    section = None;
                }
                other => return Err(form_error(item, format!("unknown query section {other}"))),
            }
            continue;
        }

        match section {
            Some("find") => query.find.push(build_find_elem(item)?),
            Some("in") => query.inputs.push(build_input_spec(item)?),
            Some("where") => query.where_clauses.push(build_clause(item)?),
            _ => return Err(form_error(item, "form outside of a query section")),
        }
    }

    if !seen_find || query.find.is_empty() {
        return Err(form_error(form, "query has no :find section"));
    }
    if !seen_where || query.where_clauses.is_empty() {
        return Err(form_error(form, "query has no :where section"));
    }
    Ok(query)
}

fn build_find_elem(form: &Form) -> Result<FindElem> {
    match &form.kind {
        FormKind::Symbol(name) => {
            let sym = Symbol::new(name.clone());
            if !sym.is_variable() {
                return Err(form_error(form, format!("find element '{name}' is not a variable")));
            }
            Ok(FindElem::Var(sym))
        }
        FormKind::List(items) => {
            let [head, arg] = items.as_slice() else {
                return Err(form_error(form, "aggregate form is (<agg> ?var)"));
            };
            let agg = match &head.kind {
                FormKind::Symbol(name) => AggregateFn::parse(name)
                    .ok_or_else(|| form_error(head, format!("unknown aggregate '{name}'")))?,
                _ => return Err(form_error(head, "aggregate form is (<agg> ?var)")),
            };
            let sym = expect_variable(arg)?;
            Ok(FindElem::Aggregate(agg, sym))
        }
        _ => Err(form_error(form, "find element must be ?var or (<agg> ?var)")),
    }
}

fn expect_variable(form: &Form) -> Result<Symbol> {
    match &form.kind {
        FormKind::Symbol(name) => {
            let sym = Symbol::new(name.clone());
            if sym.is_variable() {
                Ok(sym)
            } else {
                Err(form_error(form, format!("expected a ?variable, got '{name}'")))
            }
        }
        _ => Err(form_error(form, "expected a ?variable")),
    }
}

fn is_ellipsis(form: &Form) -> bool {
    matches!(&form.kind, FormKind::Symbol(s) if s == "...")
}

fn build_input_spec(form: &Form) -> Result<InputSpec> {
    match &form.kind {
        FormKind::Symbol(name) if name == "$" => Ok(InputSpec::Database),
        FormKind::Symbol(_) => Ok(InputSpec::Scalar(expect_variable(form)?)),
        FormKind::Vector(items) => match items.as_slice() {
            [v, ellipsis] if is_ellipsis(ellipsis) => match &v.kind {
                FormKind::Symbol(_) => Ok(InputSpec::Collection(expect_variable(v)?)),
                FormKind::Vector(syms) => Ok(InputSpec::Relation(
                    syms.iter().map(expect_variable).collect::<Result<_>>()?,
                )),
                _ => Err(form_error(v, "malformed :in spec")),
            },
            [v] => match &v.kind {
                FormKind::Vector(syms) => Ok(InputSpec::Tuple(
                    syms.iter().map(expect_variable).collect::<Result<_>>()?,
                )),
                _ => Err(form_error(v, "malformed :in spec")),
            },
            _ => Err(form_error(form, "malformed :in spec")),
        },
        _ => Err(form_error(form, "malformed :in spec")),
    }
}

fn build_bind_form(form: &Form) -> Result<BindForm> {
    match &form.kind {
        FormKind::Symbol(_) => Ok(BindForm::Scalar(expect_variable(form)?)),
        FormKind::Vector(items) => match items.as_slice() {
            [v, ellipsis] if is_ellipsis(ellipsis) => match &v.kind {
                FormKind::Vector(syms) => Ok(BindForm::Relation(
                    syms.iter().map(expect_variable).collect::<Result<_>>()?,
                )),
                _ => Err(form_error(v, "malformed binding form")),
            },
            [v] => match &v.kind {
                FormKind::Vector(syms) => Ok(BindForm::Tuple(
                    syms.iter().map(expect_variable).collect::<Result<_>>()?,
                )),
                _ => Err(form_error(v, "malformed binding form")),
            },
            _ => Err(form_error(form, "malformed binding form")),
        },
        _ => Err(form_error(form, "malformed binding form")),
    }
}

fn build_term(form: &Form) -> Result<Term> {
    match &form.kind {
        FormKind::Symbol(name) if name == "$" => Ok(Term::Database),
        FormKind::Symbol(name) => {
            let sym = Symbol::new(name.clone());
            if sym.is_variable() {
                Ok(Term::Variable(sym))
            } else {
                // bare symbol literal: an identity constant
                Ok(Term::Constant(Value::identity(name)))
            }
        }
        FormKind::List(items) => {
            let (head, args) = items
                .split_first()
                .ok_or_else(|| form_error(form, "empty call form"))?;
            let name = match &head.kind {
                FormKind::Symbol(name) => name.clone(),
                _ => return Err(form_error(head, "call head must be a function name")),
            };
            Ok(Term::Call {
                name,
                args: args.iter().map(build_term).collect::<Result<_>>()?,
            })
        }
        _ => Ok(Term::Constant(form_to_value(form)?)),
    }
}

fn build_clause(form: &Form) -> Result<Clause> {
    let items = match &form.kind {
        FormKind::Vector(items) if !items.is_empty() => items,
        _ => return Err(form_error(form, "where clause must be a non-empty vector")),
    };

    if let FormKind::List(call) = &items[0].kind {
        let (head, rest) = call
            .split_first()
            .ok_or_else(|| form_error(&items[0], "empty call form"))?;
        let head_name = match &head.kind {
            FormKind::Symbol(name) => name.as_str(),
            _ => return Err(form_error(head, "call head must be a function name")),
        };

        if head_name == "q" {
            return build_subquery(form, items, rest);
        }

        return match items.len() {
            1 => build_predicate(&items[0], head_name, rest),
            2 => {
                let binding = expect_variable(&items[1])?;
                Ok(Clause::Expression(Expression {
                    name: head_name.to_string(),
                    args: rest.iter().map(build_term).collect::<Result<_>>()?,
                    binding,
                }))
            }
            _ => Err(form_error(form, "expression clause is [(<fn> <term>*) ?binding]")),
        };
    }

    build_pattern(form, items)
}

fn build_subquery(clause: &Form, items: &[Form], call_rest: &[Form]) -> Result<Clause> {
    let (query_form, input_forms) = call_rest
        .split_first()
        .ok_or_else(|| form_error(clause, "subquery form is [(q <query> <inputs>*) <binding>]"))?;
    let query = build_query(query_form)?;
    let inputs = input_forms.iter().map(build_term).collect::<Result<_>>()?;
    let [_, binding_form] = items else {
        return Err(form_error(clause, "subquery requires a binding form"));
    };
    Ok(Clause::Subquery(Subquery {
        query: Box::new(query),
        inputs,
        binding: build_bind_form(binding_form)?,
    }))
}

fn build_predicate(form: &Form, head: &str, rest: &[Form]) -> Result<Clause> {
    if let Some(op) = CompareOp::parse(head) {
        if rest.len() < 2 {
            return Err(form_error(form, "comparison requires at least two terms"));
        }
        return Ok(Clause::Predicate(Predicate::Compare {
            op,
            terms: rest.iter().map(build_term).collect::<Result<_>>()?,
        }));
    }
    match head {
        "ground" => Ok(Clause::Predicate(Predicate::Ground(
            rest.iter().map(expect_variable).collect::<Result<_>>()?,
        ))),
        "missing" => Ok(Clause::Predicate(Predicate::Missing(
            rest.iter().map(expect_variable).collect::<Result<_>>()?,
        ))),
        name => Ok(Clause::Predicate(Predicate::Call {
            name: name.to_string(),
            args: rest.iter().map(build_term).collect::<Result<_>>()?,
        })),
    }
}

fn build_pattern(form: &Form, items: &[Form]) -> Result<Clause> {
    if items.len() != 3 && items.len() != 4 {
        return Err(form_error(
            form,
            format!("data pattern has 3 or 4 positions, got {}", items.len()),
        ));
    }
    let elems = items
        .iter()
        .map(|item| match &item.kind {
            FormKind::Symbol(name) if name == "_" => Ok(PatternElem::Blank),
            FormKind::Symbol(name) if name.starts_with('?') => {
                Ok(PatternElem::Variable(Symbol::new(name.clone())))
            }
            _ => Ok(PatternElem::Constant(form_to_value(item)?)),
        })
        .collect::<Result<_>>()?;
    Ok(Clause::Pattern(Pattern::new(elems)))
}

fn build_order_by(form: &Form) -> Result<Vec<OrderSpec>> {
    let items = match &form.kind {
        FormKind::Vector(items) if !items.is_empty() => items,
        _ => return Err(form_error(form, ":order-by expects a non-empty vector")),
    };
    items
        .iter()
        .map(|item| match &item.kind {
            FormKind::Symbol(_) => Ok(OrderSpec {
                symbol: expect_variable(item)?,
                direction: Direction::Asc,
            }),
            FormKind::List(inner) => {
                let [dir, var] = inner.as_slice() else {
                    return Err(form_error(item, "order spec is ?var, (asc ?var), or (desc ?var)"));
                };
                let direction = match &dir.kind {
                    FormKind::Symbol(s) if s == "asc" => Direction::Asc,
                    FormKind::Symbol(s) if s == "desc" => Direction::Desc,
                    _ => return Err(form_error(dir, "order direction is asc or desc")),
                };
                Ok(OrderSpec {
                    symbol: expect_variable(var)?,
                    direction,
                })
            }
            _ => Err(form_error(item, "order spec is ?var, (asc ?var), or (desc ?var)")),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_query() {
        let q = parse_query("[:find ?n :where [?e :user/name ?n]]").expect("parse");
        assert_eq!(q.find, vec![FindElem::Var(Symbol::new("?n"))]);
        assert_eq!(q.where_clauses.len(), 1);
        match &q.where_clauses[0] {
            Clause::Pattern(p) => {
                assert_eq!(p.elems.len(), 3);
                assert_eq!(
                    p.elems[1],
                    PatternElem::Constant(Value::keyword(":user/name").expect("keyword"))
                );
            }
            other => panic!("expected pattern, got {other:?}"),
        }
    }

    #[test]
    fn test_aggregate_and_predicate() {
        let q = parse_query(
            "[:find (max ?h) :where [?s :symbol/ticker \"AAPL\"] [?p :price/high ?h] [(> ?h 100)]]",
        )
        .expect("parse");
        assert!(q.has_aggregates());
        assert!(matches!(
            q.where_clauses[2],
            Clause::Predicate(Predicate::Compare { op: CompareOp::Gt, .. })
        ));
    }

    #[test]
    fn test_nested_call_in_comparison() {
        let q = parse_query("[:find ?e :where [?e :t ?t] [(= (day ?t) 2)]]").expect("parse");
        match &q.where_clauses[1] {
            Clause::Predicate(Predicate::Compare { op: CompareOp::Eq, terms }) => {
                assert!(matches!(&terms[0], Term::Call { name, .. } if name == "day"));
                assert_eq!(terms[1], Term::Constant(Value::Int64(2)));
            }
            other => panic!("expected comparison, got {other:?}"),
        }
    }

    #[test]
    fn test_in_specs() {
        let q = parse_query(
            "[:find ?a :in $ ?x [?c ...] [[?t1 ?t2]] [[?r1 ?r2] ...] :where [?a :k ?x]]",
        )
        .expect("parse");
        assert_eq!(q.inputs.len(), 5);
        assert!(matches!(q.inputs[0], InputSpec::Database));
        assert!(matches!(q.inputs[1], InputSpec::Scalar(_)));
        assert!(matches!(q.inputs[2], InputSpec::Collection(_)));
        assert!(matches!(q.inputs[3], InputSpec::Tuple(_)));
        assert!(matches!(q.inputs[4], InputSpec::Relation(_)));
    }

    #[test]
    fn test_subquery_clause() {
        let q = parse_query(
            "[:find ?s :where [?s :sym/t ?t] [(q [:find (max ?h) :in $ ?p :where [?p :price/high ?h]] $ ?s) [[?mh]]]]",
        )
        .expect("parse");
        match &q.where_clauses[1] {
            Clause::Subquery(sq) => {
                assert_eq!(sq.inputs.len(), 2);
                assert!(matches!(sq.binding, BindForm::Tuple(_)));
            }
            other => panic!("expected subquery, got {other:?}"),
        }
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse_value("42").expect("int"), Value::Int64(42));
        assert_eq!(parse_value("42N").expect("int"), Value::Int64(42));
        assert_eq!(parse_value("-7M").expect("int"), Value::Int64(-7));
        assert_eq!(parse_value("1.5e3").expect("float"), Value::Float64(1500.0));
        assert_eq!(parse_value("2.5M").expect("float"), Value::Float64(2.5));
        assert_eq!(parse_value("true").expect("bool"), Value::Bool(true));
        assert_eq!(
            parse_value("\"a\\nb\"").expect("string"),
            Value::from("a\nb")
        );
        assert_eq!(
            parse_value(":user/name").expect("keyword"),
            Value::keyword(":user/name").expect("keyword")
        );
    }

    #[test]
    fn test_inst_literal() {
        let v = parse_value("#inst \"2025-06-02T11:00:00Z\"").expect("inst");
        match v {
            Value::Time(t) => assert_eq!(t.to_rfc3339(), "2025-06-02T11:00:00+00:00"),
            other => panic!("expected time, got {other:?}"),
        }
    }

    #[test]
    fn test_comments_commas_and_discard() {
        let q = parse_query(
            "[:find ?n, ; the name\n :where #_ [?skipped :a ?b] [?e :user/name ?n]]",
        )
        .expect("parse");
        assert_eq!(q.where_clauses.len(), 1);
    }

    #[test]
    fn test_parse_error_position() {
        let err = parse_query("[:find ?n\n:where [?e :user/name ?n]").unwrap_err();
        match err {
            QueryError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_display_round_trip() {
        let sources = [
            "[:find ?n :where [?e :user/name ?n]]",
            "[:find ?n (max ?h) :in $ ?x :where [?e :user/name ?n] [?e :p/h ?h] [(> ?h ?x)] :order-by [?n (desc ?h)]]",
            "[:find ?e :where [?e :t ?t] [(= (day ?t) 2)]]",
            "[:find ?a :where [?e :k ?v] [(+ ?v 1) ?a]]",
        ];
        for src in sources {
            let q = parse_query(src).expect("parse");
            let reparsed = parse_query(&q.to_string()).expect("reparse");
            assert_eq!(q, reparsed, "round trip failed for {src}");
        }
    }

    #[test]
    fn test_missing_sections_rejected() {
        assert!(parse_query("[:find ?n]").is_err());
        assert!(parse_query("[:where [?e :a ?v]]").is_err());
    }
}
