//! Aggregation expressions and query filters.

use serde_json::Value;

use super::{array, integer, known_keys, literal, object, required, single_entry, string, truthy_flag, Object};
use crate::ast::{
    AccumulatorOp, ArithmeticOp, ArrayOp, ComparisonOp, DateOp, Expression, FieldPath, Literal,
    LogicalOp, ObjectOp, StringOp, TypeConversionOp,
};
use crate::error::{TranslateError, TranslateResult};
use crate::validation;

/// Parse an aggregation expression.
///
/// - `"$a.b"` is a field path, `"$$name"` a variable, other scalars are
///   literals
/// - `{$op: args}` is an operator application
/// - any other document is an inline document whose values are expressions
pub fn parse_expression(value: &Value) -> TranslateResult<Expression> {
    match value {
        Value::String(s) if s.starts_with("$$") => Expression::variable(s),
        Value::String(s) if s.starts_with('$') => Expression::field(s),
        Value::Array(items) => array_literal(items),
        Value::Object(doc) => match doc.keys().next() {
            Some(key) if key.starts_with('$') => {
                let (op, arg) = single_entry(doc, "expression operator document")?;
                operator(op, arg)
            }
            _ => document(doc),
        },
        scalar => literal(scalar, "expression").map(Expression::Literal),
    }
}

/// Parse a query filter document (`$match` syntax). An empty filter
/// matches every document.
pub fn parse_filter(value: &Value) -> TranslateResult<Expression> {
    let doc = object(value, "$match filter")?;
    let mut conditions = Vec::with_capacity(doc.len());
    for (key, value) in doc {
        match key.as_str() {
            "$and" | "$or" | "$nor" => {
                let op = LogicalOp::from_mongo(key)?;
                let operands = array(value, key)?
                    .iter()
                    .map(parse_filter)
                    .collect::<TranslateResult<Vec<_>>>()?;
                conditions.push(Expression::logical(op, operands)?);
            }
            "$expr" => conditions.push(parse_expression(value)?),
            "$comment" => {}
            op if op.starts_with('$') => {
                return Err(TranslateError::UnknownOperator(op.to_string()))
            }
            path => conditions.push(field_condition(path, value)?),
        }
    }
    combine(conditions)
}

/// One `$group` / `$bucket` output: `{$sum: "$qty"}`.
pub(super) fn parse_accumulator(name: &str, value: &Value) -> TranslateResult<Expression> {
    let doc = object(value, &format!("accumulator '{}'", name))?;
    let (op, arg) = single_entry(doc, &format!("accumulator '{}'", name))?;
    let op = AccumulatorOp::from_mongo(op)?;
    if op == AccumulatorOp::Count {
        return match arg {
            Value::Object(empty) if empty.is_empty() => Expression::accumulator(op, None),
            _ => Err(TranslateError::structural("$count accumulator takes '{}'")),
        };
    }
    Expression::accumulator(op, Some(parse_expression(arg)?))
}

fn combine(mut conditions: Vec<Expression>) -> TranslateResult<Expression> {
    match conditions.len() {
        0 => Ok(Expression::literal(true)),
        1 => Ok(conditions.remove(0)),
        _ => Expression::and(conditions),
    }
}

/// Array literals only; element expressions have no array-valued node.
fn array_literal(items: &[Value]) -> TranslateResult<Expression> {
    fn computed(value: &Value) -> bool {
        match value {
            Value::String(s) => s.starts_with('$'),
            Value::Array(items) => items.iter().any(computed),
            Value::Object(_) => true,
            _ => false,
        }
    }
    if items.iter().any(computed) {
        return Err(TranslateError::unsupported(
            "array expression",
            "array elements must be literal values",
        ));
    }
    literal(&Value::Array(items.to_vec()), "array").map(Expression::Literal)
}

fn document(doc: &Object) -> TranslateResult<Expression> {
    let mut fields = Vec::with_capacity(doc.len());
    for (name, value) in doc {
        if name.starts_with('$') {
            return Err(TranslateError::structural(format!(
                "operator '{}' cannot be mixed with document fields",
                name
            )));
        }
        validation::validate_field_name(name)?;
        fields.push((name.clone(), parse_expression(value)?));
    }
    Ok(Expression::document(fields))
}

/// Positional arguments: an array is the argument list, anything else is
/// the single argument.
fn operands(arg: &Value) -> TranslateResult<Vec<Expression>> {
    match arg {
        Value::Array(items) => items.iter().map(parse_expression).collect(),
        other => Ok(vec![parse_expression(other)?]),
    }
}

fn exactly<const N: usize>(op: &str, arg: &Value) -> TranslateResult<[Expression; N]> {
    let args = operands(arg)?;
    let got = args.len();
    args.try_into().map_err(|_| {
        TranslateError::structural(format!(
            "{} requires exactly {} argument(s), got {}",
            op, N, got
        ))
    })
}

fn optional(doc: &Object, key: &str) -> TranslateResult<Option<Expression>> {
    doc.get(key).map(parse_expression).transpose()
}

// ============================================================================
// Operator dispatch
// ============================================================================

fn operator(op: &str, arg: &Value) -> TranslateResult<Expression> {
    match op {
        "$literal" => return literal(arg, "$literal").map(Expression::Literal),
        "$cond" => return cond(arg),
        "$ifNull" => return Expression::if_null(operands(arg)?),
        "$switch" => return switch(arg),
        "$convert" => return convert(arg),
        // Expression `$in` is array membership; the query form lives in
        // `field_operators`.
        "$in" => return Expression::array(ArrayOp::In, operands(arg)?),
        _ => {}
    }
    if let Ok(cmp) = ComparisonOp::from_mongo(op) {
        let [left, right] = exactly::<2>(op, arg)?;
        return Expression::comparison(cmp, left, right);
    }
    if let Ok(logical) = LogicalOp::from_mongo(op) {
        return Expression::logical(logical, operands(arg)?);
    }
    if let Ok(arith) = ArithmeticOp::from_mongo(op) {
        return Expression::arithmetic(arith, operands(arg)?);
    }
    if let Ok(string_op) = StringOp::from_mongo(op) {
        return string_expr(string_op, arg);
    }
    if let Ok(date_op) = DateOp::from_mongo(op) {
        return date(date_op, arg);
    }
    if let Ok(array_op) = ArrayOp::from_mongo(op) {
        return array_expr(array_op, arg);
    }
    if let Ok(conversion) = TypeConversionOp::from_mongo(op) {
        let [input] = exactly::<1>(op, arg)?;
        return Expression::type_conversion(conversion, input);
    }
    if let Ok(object_op) = ObjectOp::from_mongo(op) {
        return Expression::object(object_op, operands(arg)?);
    }
    Err(TranslateError::UnknownOperator(op.to_string()))
}

/// `{$cond: [if, then, else]}` or `{$cond: {if, then, else}}`.
fn cond(arg: &Value) -> TranslateResult<Expression> {
    if let Value::Object(doc) = arg {
        known_keys(doc, &["if", "then", "else"], "$cond")?;
        return Ok(Expression::cond(
            parse_expression(required(doc, "if", "$cond")?)?,
            parse_expression(required(doc, "then", "$cond")?)?,
            parse_expression(required(doc, "else", "$cond")?)?,
        ));
    }
    let [condition, then, otherwise] = exactly::<3>("$cond", arg)?;
    Ok(Expression::cond(condition, then, otherwise))
}

fn switch(arg: &Value) -> TranslateResult<Expression> {
    let doc = object(arg, "$switch")?;
    known_keys(doc, &["branches", "default"], "$switch")?;
    let branches = array(required(doc, "branches", "$switch")?, "$switch branches")?
        .iter()
        .map(|branch| {
            let branch = object(branch, "$switch branch")?;
            known_keys(branch, &["case", "then"], "$switch branch")?;
            Ok((
                parse_expression(required(branch, "case", "$switch branch")?)?,
                parse_expression(required(branch, "then", "$switch branch")?)?,
            ))
        })
        .collect::<TranslateResult<Vec<_>>>()?;
    Expression::switch(branches, optional(doc, "default")?)
}

fn convert(arg: &Value) -> TranslateResult<Expression> {
    let doc = object(arg, "$convert")?;
    known_keys(doc, &["input", "to", "onError", "onNull"], "$convert")?;
    let to = string(required(doc, "to", "$convert")?, "$convert 'to'")?;
    Expression::convert(
        parse_expression(required(doc, "input", "$convert")?)?,
        to,
        optional(doc, "onError")?,
        optional(doc, "onNull")?,
    )
}

/// String operators with named arguments are flattened into the
/// positional order the AST uses.
fn string_expr(op: StringOp, arg: &Value) -> TranslateResult<Expression> {
    let name = op.mongo_name();
    let named: Option<&[&str]> = match op {
        StringOp::Trim | StringOp::Ltrim | StringOp::Rtrim => Some(&["input", "chars"][..]),
        StringOp::RegexMatch | StringOp::RegexFind => Some(&["input", "regex", "options"][..]),
        StringOp::ReplaceOne | StringOp::ReplaceAll => Some(&["input", "find", "replacement"][..]),
        _ => None,
    };
    let Some(keys) = named else {
        return Expression::string(op, operands(arg)?);
    };
    let doc = object(arg, name)?;
    known_keys(doc, keys, name)?;
    let mut args = Vec::with_capacity(keys.len());
    for key in keys {
        match doc.get(*key) {
            Some(value) => args.push(parse_expression(value)?),
            // Trailing options may be omitted; a gap before a present key may not.
            None if keys[args.len()..].iter().all(|k| !doc.contains_key(*k)) => break,
            None => {
                return Err(TranslateError::structural(format!(
                    "{} requires '{}'",
                    name, key
                )))
            }
        }
    }
    Expression::string(op, args)
}

/// `{$year: expr}`, `{$year: [expr]}` or `{$year: {date: expr}}`.
fn date(op: DateOp, arg: &Value) -> TranslateResult<Expression> {
    if let Value::Object(doc) = arg {
        if doc.contains_key("date") {
            if doc.contains_key("timezone") {
                return Err(TranslateError::unsupported(
                    op.mongo_name(),
                    "the timezone option is not supported",
                ));
            }
            known_keys(doc, &["date"], op.mongo_name())?;
            return Ok(Expression::date(op, parse_expression(&doc["date"])?));
        }
    }
    let [input] = exactly::<1>(op.mongo_name(), arg)?;
    Ok(Expression::date(op, input))
}

fn array_expr(op: ArrayOp, arg: &Value) -> TranslateResult<Expression> {
    let name = op.mongo_name();
    match op {
        ArrayOp::Filter => {
            let doc = object(arg, name)?;
            known_keys(doc, &["input", "as", "cond", "limit"], name)?;
            Expression::filter(
                parse_expression(required(doc, "input", name)?)?,
                variable_name(doc, name)?,
                parse_expression(required(doc, "cond", name)?)?,
                optional(doc, "limit")?,
            )
        }
        ArrayOp::Map => {
            let doc = object(arg, name)?;
            known_keys(doc, &["input", "as", "in"], name)?;
            Expression::map(
                parse_expression(required(doc, "input", name)?)?,
                variable_name(doc, name)?,
                parse_expression(required(doc, "in", name)?)?,
            )
        }
        ArrayOp::Reduce => {
            let doc = object(arg, name)?;
            known_keys(doc, &["input", "initialValue", "in"], name)?;
            Ok(Expression::reduce(
                parse_expression(required(doc, "input", name)?)?,
                parse_expression(required(doc, "initialValue", name)?)?,
                parse_expression(required(doc, "in", name)?)?,
            ))
        }
        ArrayOp::SortArray => {
            let doc = object(arg, name)?;
            known_keys(doc, &["input", "sortBy"], name)?;
            Ok(Expression::sort_array(
                parse_expression(required(doc, "input", name)?)?,
                parse_expression(required(doc, "sortBy", name)?)?,
            ))
        }
        _ => Expression::array(op, operands(arg)?),
    }
}

fn variable_name(doc: &Object, op: &str) -> TranslateResult<Option<String>> {
    doc.get("as")
        .map(|v| string(v, &format!("{} 'as'", op)).map(str::to_string))
        .transpose()
}

// ============================================================================
// Query filters
// ============================================================================

fn field_condition(path: &str, value: &Value) -> TranslateResult<Expression> {
    match value {
        Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => field_operators(path, ops),
        Value::Object(_) => Err(TranslateError::unsupported(
            "embedded document equality",
            format!("'{}' is compared against a whole document", path),
        )),
        _ => Expression::comparison(
            ComparisonOp::Eq,
            Expression::field(path)?,
            Expression::Literal(literal(value, path)?),
        ),
    }
}

/// `{path: {$gt: 1, $lt: 9}}`; several operators are ANDed.
fn field_operators(path: &str, ops: &Object) -> TranslateResult<Expression> {
    if let Some(key) = ops.keys().find(|k| !k.starts_with('$')) {
        return Err(TranslateError::structural(format!(
            "'{}': field '{}' cannot be mixed with query operators",
            path, key
        )));
    }
    if ops.contains_key("$options") && !ops.contains_key("$regex") {
        return Err(TranslateError::structural("$options requires $regex"));
    }

    let mut conditions = Vec::with_capacity(ops.len());
    for (op, value) in ops {
        let condition = match op.as_str() {
            "$options" => continue,
            "$regex" => regex(path, value, ops.get("$options"))?,
            "$exists" => {
                let exists = truthy_flag(value)
                    .ok_or_else(|| TranslateError::structural("$exists requires a boolean"))?;
                Expression::exists(FieldPath::new(path)?, exists)
            }
            "$not" => {
                let inner = object(value, "$not")?;
                Expression::logical(LogicalOp::Not, vec![field_operators(path, inner)?])?
            }
            "$size" => Expression::comparison(
                ComparisonOp::Eq,
                Expression::array(ArrayOp::Size, vec![Expression::field(path)?])?,
                Expression::literal(integer(value, "$size")?),
            )?,
            other => {
                let cmp = ComparisonOp::from_mongo(other)?;
                Expression::comparison(
                    cmp,
                    Expression::field(path)?,
                    Expression::Literal(literal(value, other)?),
                )?
            }
        };
        conditions.push(condition);
    }
    combine(conditions)
}

fn regex(path: &str, pattern: &Value, options: Option<&Value>) -> TranslateResult<Expression> {
    let mut args = vec![
        Expression::field(path)?,
        Expression::literal(string(pattern, "$regex")?),
    ];
    if let Some(options) = options {
        args.push(Expression::Literal(Literal::String(
            string(options, "$options")?.to_string(),
        )));
    }
    Expression::string(StringOp::RegexMatch, args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(p: &str) -> Expression {
        Expression::field(p).unwrap()
    }

    #[test]
    fn test_scalars_fields_and_variables() {
        assert_eq!(parse_expression(&json!("$a.b")).unwrap(), field("a.b"));
        assert_eq!(parse_expression(&json!(3)).unwrap(), Expression::literal(3));
        assert_eq!(parse_expression(&json!("plain")).unwrap(), Expression::literal("plain"));
        assert_eq!(parse_expression(&json!(null)).unwrap(), Expression::null());
        assert_eq!(
            parse_expression(&json!("$$ROOT")).unwrap(),
            Expression::Variable {
                name: "ROOT".into(),
                path: None
            }
        );
    }

    #[test]
    fn test_unknown_operator_fails_at_construction() {
        let err = parse_expression(&json!({"$frobnicate": "$x"})).unwrap_err();
        assert_eq!(err, TranslateError::UnknownOperator("$frobnicate".into()));
    }

    #[test]
    fn test_arithmetic_and_nesting() {
        let expr = parse_expression(&json!({"$multiply": ["$price", {"$add": ["$qty", 1]}]})).unwrap();
        let Expression::Arithmetic { op, operands } = expr else {
            panic!("expected arithmetic");
        };
        assert_eq!(op, ArithmeticOp::Multiply);
        assert!(matches!(
            &operands[1],
            Expression::Arithmetic { op: ArithmeticOp::Add, .. }
        ));
    }

    #[test]
    fn test_cond_array_and_document_forms_agree() {
        let a = parse_expression(&json!({"$cond": [{"$gt": ["$x", 1]}, "hi", "lo"]})).unwrap();
        let b = parse_expression(&json!({"$cond": {"if": {"$gt": ["$x", 1]}, "then": "hi", "else": "lo"}}))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_expression_in_is_array_membership() {
        let expr = parse_expression(&json!({"$in": ["$tag", ["a", "b"]]})).unwrap();
        assert!(matches!(expr, Expression::Array(ref a) if a.op == ArrayOp::In));
    }

    #[test]
    fn test_named_string_arguments() {
        let expr = parse_expression(&json!({"$trim": {"input": "$name"}})).unwrap();
        assert_eq!(
            expr,
            Expression::string(StringOp::Trim, vec![field("name")]).unwrap()
        );

        let expr = parse_expression(&json!({"$replaceAll": {"input": "$s", "find": "a", "replacement": "b"}}))
            .unwrap();
        assert!(matches!(expr, Expression::String { ref args, .. } if args.len() == 3));

        let err = parse_expression(&json!({"$regexMatch": {"input": "$s", "options": "i"}})).unwrap_err();
        assert!(matches!(err, TranslateError::Structural(_)));
    }

    #[test]
    fn test_date_with_timezone_is_unsupported() {
        assert_eq!(
            parse_expression(&json!({"$year": {"date": "$ts"}})).unwrap(),
            Expression::date(DateOp::Year, field("ts"))
        );
        let err = parse_expression(&json!({"$year": {"date": "$ts", "timezone": "UTC"}})).unwrap_err();
        assert!(matches!(err, TranslateError::UnsupportedFeature { .. }));
    }

    #[test]
    fn test_filter_and_map() {
        let expr = parse_expression(&json!({
            "$filter": {"input": "$items", "as": "it", "cond": {"$gt": ["$$it.qty", 0]}}
        }))
        .unwrap();
        let Expression::Array(a) = expr else {
            panic!("expected array expression");
        };
        assert_eq!(a.op, ArrayOp::Filter);
        assert_eq!(a.var.as_deref(), Some("it"));

        let expr = parse_expression(&json!({"$map": {"input": "$items", "in": "$$this.sku"}})).unwrap();
        assert!(matches!(expr, Expression::Array(ref a) if a.var.as_deref() == Some("this")));
    }

    #[test]
    fn test_convert_requires_known_target() {
        assert!(parse_expression(&json!({"$convert": {"input": "$x", "to": "int"}})).is_ok());
        assert!(parse_expression(&json!({"$convert": {"input": "$x"}})).is_err());
    }

    #[test]
    fn test_inline_document_and_array_literals() {
        let expr = parse_expression(&json!({"total": "$amount", "tags": ["a", "b"]})).unwrap();
        assert_eq!(
            expr,
            Expression::document(vec![
                ("total".into(), field("amount")),
                ("tags".into(), Expression::literal(Literal::Array(vec!["a".into(), "b".into()]))),
            ])
        );
        let err = parse_expression(&json!(["$a", 1])).unwrap_err();
        assert!(matches!(err, TranslateError::UnsupportedFeature { .. }));
    }

    #[test]
    fn test_operator_document_with_two_keys_is_structural() {
        let err = parse_expression(&json!({"$add": [1, 2], "$subtract": [3, 1]})).unwrap_err();
        assert!(matches!(err, TranslateError::Structural(_)));
    }

    #[test]
    fn test_filter_equality_null_and_implicit_and() {
        assert_eq!(
            parse_filter(&json!({"f": null})).unwrap(),
            Expression::comparison(ComparisonOp::Eq, field("f"), Expression::null()).unwrap()
        );
        let expr = parse_filter(&json!({"status": "A", "qty": {"$gte": 5, "$lt": 10}})).unwrap();
        let Expression::Logical { op, operands } = expr else {
            panic!("expected conjunction");
        };
        assert_eq!(op, LogicalOp::And);
        assert!(matches!(&operands[1], Expression::Logical { op: LogicalOp::And, operands } if operands.len() == 2));
    }

    #[test]
    fn test_filter_in_requires_values() {
        let err = parse_filter(&json!({"tag": {"$in": []}})).unwrap_err();
        assert!(matches!(err, TranslateError::Structural(_)));
        assert!(parse_filter(&json!({"tag": {"$nin": ["x"]}})).is_ok());
    }

    #[test]
    fn test_filter_logical_exists_and_regex() {
        let expr = parse_filter(&json!({"$or": [{"a": 1}, {"b": {"$exists": false}}]})).unwrap();
        let Expression::Logical { op, operands } = expr else {
            panic!("expected $or");
        };
        assert_eq!(op, LogicalOp::Or);
        assert_eq!(operands[1], Expression::exists(FieldPath::new("b").unwrap(), false));

        let expr = parse_filter(&json!({"name": {"$regex": "^A", "$options": "i"}})).unwrap();
        assert_eq!(
            expr,
            Expression::string(
                StringOp::RegexMatch,
                vec![field("name"), Expression::literal("^A"), Expression::literal("i")]
            )
            .unwrap()
        );
    }

    #[test]
    fn test_filter_expr_and_unknown_query_operator() {
        let expr = parse_filter(&json!({"$expr": {"$gt": ["$spent", "$budget"]}})).unwrap();
        assert!(matches!(expr, Expression::Comparison { op: ComparisonOp::Gt, .. }));

        let err = parse_filter(&json!({"tags": {"$elemMatch": {"x": 1}}})).unwrap_err();
        assert_eq!(err, TranslateError::UnknownOperator("$elemMatch".into()));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert_eq!(parse_filter(&json!({})).unwrap(), Expression::literal(true));
    }

    #[test]
    fn test_accumulators() {
        assert_eq!(
            parse_accumulator("n", &json!({"$count": {}})).unwrap(),
            Expression::accumulator(AccumulatorOp::Count, None).unwrap()
        );
        assert_eq!(
            parse_accumulator("t", &json!({"$sum": 1})).unwrap(),
            Expression::accumulator(AccumulatorOp::Sum, Some(Expression::literal(1))).unwrap()
        );
        let err = parse_accumulator("x", &json!({"$median": "$v"})).unwrap_err();
        assert_eq!(err, TranslateError::UnknownOperator("$median".into()));
    }
}
