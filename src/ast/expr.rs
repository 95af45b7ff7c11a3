//! Expression AST.
//!
//! One closed sum type covers every computed value a stage can reference.
//! Constructors validate shape (arity, non-empty lists) so a rendered
//! expression is always structurally sound.

use super::literal::{FieldPath, Literal};
use super::ops::{
    AccumulatorOp, ArithmeticOp, ArrayOp, ComparisonOp, DateOp, LogicalOp, ObjectOp, StringOp,
    TypeConversionOp,
};
use crate::error::{TranslateError, TranslateResult};
use crate::validation;

/// A computed value inside a stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// `$field.path`
    FieldPath(FieldPath),
    /// `$$name.rest`: `$$ROOT`, `$$CURRENT`, `$$this`, `$filter`/`$map` names,
    /// and the `$redact` markers.
    Variable { name: String, path: Option<String> },
    Literal(Literal),
    Comparison {
        op: ComparisonOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Logical {
        op: LogicalOp,
        operands: Vec<Expression>,
    },
    Arithmetic {
        op: ArithmeticOp,
        operands: Vec<Expression>,
    },
    Array(ArrayExpr),
    String {
        op: StringOp,
        args: Vec<Expression>,
    },
    Date {
        op: DateOp,
        arg: Box<Expression>,
    },
    Conditional(Conditional),
    Switch {
        branches: Vec<(Expression, Expression)>,
        default: Option<Box<Expression>>,
    },
    Accumulator {
        op: AccumulatorOp,
        arg: Option<Box<Expression>>,
    },
    /// Group key made of named sub-expressions: `_id: {a: "$x", b: "$y"}`.
    CompoundId(Vec<(String, Expression)>),
    TypeConversion(TypeConversion),
    /// Element count of a `$lookup` result, computed against the foreign table.
    LookupSize {
        from: String,
        local_field: String,
        foreign_field: String,
    },
    /// `{field: {$exists: bool}}`
    Exists { field: FieldPath, exists: bool },
    Object {
        op: ObjectOp,
        args: Vec<Expression>,
    },
    /// Inline document `{k: expr, ...}`.
    Document(Vec<(String, Expression)>),
}

/// Array operator application.
///
/// `array` is the primary input, `index` the positional argument where the
/// operator has one (`$arrayElemAt` index, `$slice` count or skip). `var` is
/// the element variable name for `$filter` and `$map`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayExpr {
    pub op: ArrayOp,
    pub array: Option<Box<Expression>>,
    pub index: Option<Box<Expression>>,
    pub args: Vec<Expression>,
    pub var: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Conditional {
    Cond {
        condition: Box<Expression>,
        then: Box<Expression>,
        otherwise: Box<Expression>,
    },
    /// First non-null argument.
    IfNull(Vec<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeConversion {
    pub op: TypeConversionOp,
    pub arg: Box<Expression>,
    /// Resolved target for `$convert`.
    pub to: Option<TypeConversionOp>,
    pub on_error: Option<Box<Expression>>,
    pub on_null: Option<Box<Expression>>,
}

fn check_arity(name: &str, got: usize, min: usize, max: usize) -> TranslateResult<()> {
    if got < min || got > max {
        let expected = if min == max {
            format!("exactly {}", min)
        } else if max == usize::MAX {
            format!("at least {}", min)
        } else {
            format!("{} to {}", min, max)
        };
        return Err(TranslateError::structural(format!(
            "{} requires {} argument(s), got {}",
            name, expected, got
        )));
    }
    Ok(())
}

fn arithmetic_arity(op: ArithmeticOp) -> (usize, usize) {
    match op {
        _ if op.is_unary_capable() => (1, 2),
        ArithmeticOp::Subtract | ArithmeticOp::Divide | ArithmeticOp::Mod | ArithmeticOp::Pow => (2, 2),
        _ => (1, usize::MAX),
    }
}

/// Bounds on `ArrayExpr::args`, not counting the input array and index.
fn array_arity(op: ArrayOp) -> (usize, usize) {
    match op {
        ArrayOp::Slice => (0, 1),
        ArrayOp::In | ArrayOp::Filter | ArrayOp::Map | ArrayOp::SortArray => (1, 1),
        ArrayOp::IndexOfArray => (1, 3),
        ArrayOp::SetDifference | ArrayOp::SetIsSubset | ArrayOp::Reduce => (2, 2),
        ArrayOp::SetEquals => (2, usize::MAX),
        ArrayOp::ConcatArrays | ArrayOp::SetUnion | ArrayOp::SetIntersection => (1, usize::MAX),
        _ => (0, 0),
    }
}

impl Expression {
    // ========================================================================
    // Constructors
    // ========================================================================

    pub fn field(path: impl AsRef<str>) -> TranslateResult<Self> {
        Ok(Expression::FieldPath(FieldPath::new(path)?))
    }

    pub fn literal(value: impl Into<Literal>) -> Self {
        Expression::Literal(value.into())
    }

    pub fn null() -> Self {
        Expression::Literal(Literal::Null)
    }

    /// Parse `$$name` or `$$name.rest`.
    pub fn variable(reference: &str) -> TranslateResult<Self> {
        let body = reference.strip_prefix("$$").ok_or_else(|| {
            TranslateError::structural(format!("'{}' is not a variable reference", reference))
        })?;
        let (name, path) = match body.split_once('.') {
            Some((name, rest)) => {
                validation::validate_field_name(rest)?;
                (name, Some(rest.to_string()))
            }
            None => (body, None),
        };
        validation::validate_field_name(name)?;
        Ok(Expression::Variable {
            name: name.to_string(),
            path,
        })
    }

    pub fn comparison(op: ComparisonOp, left: Expression, right: Expression) -> TranslateResult<Self> {
        if op.is_membership() {
            match &right {
                Expression::Literal(Literal::Array(items)) if !items.is_empty() => {}
                Expression::Literal(Literal::Array(_)) => {
                    return Err(TranslateError::structural(format!(
                        "{} requires a non-empty array of values",
                        op.mongo_name()
                    )))
                }
                _ => {
                    return Err(TranslateError::structural(format!(
                        "{} requires an array of literal values",
                        op.mongo_name()
                    )))
                }
            }
        }
        Ok(Expression::Comparison {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn logical(op: LogicalOp, operands: Vec<Expression>) -> TranslateResult<Self> {
        match op {
            LogicalOp::Not => check_arity("$not", operands.len(), 1, 1)?,
            _ => check_arity(op.mongo_name(), operands.len(), 1, usize::MAX)?,
        }
        Ok(Expression::Logical { op, operands })
    }

    pub fn and(operands: Vec<Expression>) -> TranslateResult<Self> {
        Self::logical(LogicalOp::And, operands)
    }

    pub fn arithmetic(op: ArithmeticOp, operands: Vec<Expression>) -> TranslateResult<Self> {
        let (min, max) = arithmetic_arity(op);
        check_arity(op.mongo_name(), operands.len(), min, max)?;
        Ok(Expression::Arithmetic { op, operands })
    }

    pub fn string(op: StringOp, args: Vec<Expression>) -> TranslateResult<Self> {
        let (min, max) = op.arity();
        check_arity(op.mongo_name(), args.len(), min, max)?;
        Ok(Expression::String { op, args })
    }

    pub fn date(op: DateOp, arg: Expression) -> Self {
        Expression::Date {
            op,
            arg: Box::new(arg),
        }
    }

    pub fn cond(condition: Expression, then: Expression, otherwise: Expression) -> Self {
        Expression::Conditional(Conditional::Cond {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    pub fn if_null(args: Vec<Expression>) -> TranslateResult<Self> {
        check_arity("$ifNull", args.len(), 2, usize::MAX)?;
        Ok(Expression::Conditional(Conditional::IfNull(args)))
    }

    pub fn switch(
        branches: Vec<(Expression, Expression)>,
        default: Option<Expression>,
    ) -> TranslateResult<Self> {
        if branches.is_empty() {
            return Err(TranslateError::structural(
                "$switch requires at least one branch",
            ));
        }
        Ok(Expression::Switch {
            branches,
            default: default.map(Box::new),
        })
    }

    pub fn accumulator(op: AccumulatorOp, arg: Option<Expression>) -> TranslateResult<Self> {
        if arg.is_none() && op != AccumulatorOp::Count {
            return Err(TranslateError::structural(format!(
                "{} requires an argument",
                op.mongo_name()
            )));
        }
        Ok(Expression::Accumulator {
            op,
            arg: arg.map(Box::new),
        })
    }

    pub fn compound_id(fields: Vec<(String, Expression)>) -> TranslateResult<Self> {
        if fields.is_empty() {
            return Err(TranslateError::structural(
                "compound _id requires at least one field",
            ));
        }
        for (name, _) in &fields {
            validation::validate_field_name(name)?;
        }
        Ok(Expression::CompoundId(fields))
    }

    pub fn type_conversion(op: TypeConversionOp, arg: Expression) -> TranslateResult<Self> {
        if op == TypeConversionOp::Convert {
            return Err(TranslateError::structural(
                "$convert requires a 'to' target; use Expression::convert",
            ));
        }
        Ok(Expression::TypeConversion(TypeConversion {
            op,
            arg: Box::new(arg),
            to: None,
            on_error: None,
            on_null: None,
        }))
    }

    pub fn convert(
        arg: Expression,
        to: &str,
        on_error: Option<Expression>,
        on_null: Option<Expression>,
    ) -> TranslateResult<Self> {
        let target = TypeConversionOp::from_convert_target(to)?;
        Ok(Expression::TypeConversion(TypeConversion {
            op: TypeConversionOp::Convert,
            arg: Box::new(arg),
            to: Some(target),
            on_error: on_error.map(Box::new),
            on_null: on_null.map(Box::new),
        }))
    }

    pub fn lookup_size(from: &str, local_field: &str, foreign_field: &str) -> TranslateResult<Self> {
        validation::validate_table_name(from)?;
        validation::validate_field_name(local_field)?;
        validation::validate_field_name(foreign_field)?;
        Ok(Expression::LookupSize {
            from: from.to_string(),
            local_field: local_field.to_string(),
            foreign_field: foreign_field.to_string(),
        })
    }

    pub fn exists(field: FieldPath, exists: bool) -> Self {
        Expression::Exists { field, exists }
    }

    pub fn object(op: ObjectOp, args: Vec<Expression>) -> TranslateResult<Self> {
        match op {
            ObjectOp::MergeObjects => check_arity(op.mongo_name(), args.len(), 1, usize::MAX)?,
            _ => check_arity(op.mongo_name(), args.len(), 1, 1)?,
        }
        Ok(Expression::Object { op, args })
    }

    pub fn document(fields: Vec<(String, Expression)>) -> Self {
        Expression::Document(fields)
    }

    /// Positional array operators: everything except `$filter`, `$map`,
    /// `$reduce` and `$sortArray`, which take named arguments.
    pub fn array(op: ArrayOp, args: Vec<Expression>) -> TranslateResult<Self> {
        let name = op.mongo_name();
        let mut args = args;
        let expr = match op {
            ArrayOp::ArrayElemAt => {
                check_arity(name, args.len(), 2, 2)?;
                let index = args.pop();
                let array = args.pop();
                ArrayExpr::new(op, array, index, vec![])
            }
            ArrayOp::Size
            | ArrayOp::First
            | ArrayOp::Last
            | ArrayOp::ReverseArray
            | ArrayOp::IsArray
            | ArrayOp::AnyElementTrue
            | ArrayOp::AllElementsTrue => {
                check_arity(name, args.len(), 1, 1)?;
                ArrayExpr::new(op, args.pop(), None, vec![])
            }
            ArrayOp::Slice => {
                check_arity(name, args.len(), 2, 3)?;
                let mut it = args.into_iter();
                let array = it.next();
                let index = it.next();
                ArrayExpr::new(op, array, index, it.collect())
            }
            ArrayOp::In => {
                check_arity(name, args.len(), 2, 2)?;
                let array = args.pop();
                ArrayExpr::new(op, array, None, args)
            }
            ArrayOp::IndexOfArray => {
                check_arity(name, args.len(), 2, 4)?;
                let mut it = args.into_iter();
                let array = it.next();
                ArrayExpr::new(op, array, None, it.collect())
            }
            ArrayOp::SetDifference | ArrayOp::SetIsSubset => {
                check_arity(name, args.len(), 2, 2)?;
                ArrayExpr::new(op, None, None, args)
            }
            ArrayOp::SetEquals => {
                check_arity(name, args.len(), 2, usize::MAX)?;
                ArrayExpr::new(op, None, None, args)
            }
            ArrayOp::ConcatArrays | ArrayOp::SetUnion | ArrayOp::SetIntersection => {
                check_arity(name, args.len(), 1, usize::MAX)?;
                ArrayExpr::new(op, None, None, args)
            }
            ArrayOp::Filter | ArrayOp::Map | ArrayOp::Reduce | ArrayOp::SortArray => {
                return Err(TranslateError::structural(format!(
                    "{} takes named arguments",
                    name
                )))
            }
        };
        Ok(Expression::Array(expr))
    }

    /// `$filter: {input, as, cond, limit}`
    pub fn filter(
        input: Expression,
        var: Option<String>,
        cond: Expression,
        limit: Option<Expression>,
    ) -> TranslateResult<Self> {
        let var = Self::element_var(var)?;
        Ok(Expression::Array(ArrayExpr {
            op: ArrayOp::Filter,
            array: Some(Box::new(input)),
            index: limit.map(Box::new),
            args: vec![cond],
            var: Some(var),
        }))
    }

    /// `$map: {input, as, in}`
    pub fn map(input: Expression, var: Option<String>, body: Expression) -> TranslateResult<Self> {
        let var = Self::element_var(var)?;
        Ok(Expression::Array(ArrayExpr {
            op: ArrayOp::Map,
            array: Some(Box::new(input)),
            index: None,
            args: vec![body],
            var: Some(var),
        }))
    }

    /// `$reduce: {input, initialValue, in}`
    pub fn reduce(input: Expression, initial: Expression, body: Expression) -> Self {
        Expression::Array(ArrayExpr {
            op: ArrayOp::Reduce,
            array: Some(Box::new(input)),
            index: None,
            args: vec![initial, body],
            var: Some("this".to_string()),
        })
    }

    /// `$sortArray: {input, sortBy}`; `sort_by` is a literal direction or a
    /// document of field directions.
    pub fn sort_array(input: Expression, sort_by: Expression) -> Self {
        Expression::Array(ArrayExpr {
            op: ArrayOp::SortArray,
            array: Some(Box::new(input)),
            index: None,
            args: vec![sort_by],
            var: None,
        })
    }

    fn element_var(var: Option<String>) -> TranslateResult<String> {
        let var = var.unwrap_or_else(|| "this".to_string());
        validation::validate_field_name(&var)?;
        Ok(var)
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Check the argument counts of this node.
    ///
    /// The constructors enforce the same bounds; this covers nodes built
    /// from the variants directly.
    pub fn check_shape(&self) -> TranslateResult<()> {
        match self {
            Expression::Logical { op, operands } => match op {
                LogicalOp::Not => check_arity("$not", operands.len(), 1, 1),
                _ => check_arity(op.mongo_name(), operands.len(), 1, usize::MAX),
            },
            Expression::Arithmetic { op, operands } => {
                let (min, max) = arithmetic_arity(*op);
                check_arity(op.mongo_name(), operands.len(), min, max)
            }
            Expression::String { op, args } => {
                let (min, max) = op.arity();
                check_arity(op.mongo_name(), args.len(), min, max)
            }
            Expression::Object { op, args } => match op {
                ObjectOp::MergeObjects => check_arity(op.mongo_name(), args.len(), 1, usize::MAX),
                _ => check_arity(op.mongo_name(), args.len(), 1, 1),
            },
            Expression::Array(a) => {
                let (min, max) = array_arity(a.op);
                check_arity(a.op.mongo_name(), a.args.len(), min, max)
            }
            Expression::Conditional(Conditional::IfNull(args)) => {
                check_arity("$ifNull", args.len(), 2, usize::MAX)
            }
            Expression::Switch { branches, .. } if branches.is_empty() => Err(
                TranslateError::structural("$switch requires at least one branch"),
            ),
            _ => Ok(()),
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Expression::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    pub fn as_field_path(&self) -> Option<&FieldPath> {
        match self {
            Expression::FieldPath(fp) => Some(fp),
            _ => None,
        }
    }

    pub fn is_null_literal(&self) -> bool {
        matches!(self, Expression::Literal(Literal::Null))
    }

    /// Whether this expression renders as an SQL condition rather than a value.
    pub fn is_condition(&self) -> bool {
        match self {
            Expression::Comparison { .. } | Expression::Logical { .. } | Expression::Exists { .. } => {
                true
            }
            Expression::String { op, .. } => *op == StringOp::RegexMatch,
            Expression::Array(a) => matches!(
                a.op,
                ArrayOp::In
                    | ArrayOp::IsArray
                    | ArrayOp::SetEquals
                    | ArrayOp::SetIsSubset
                    | ArrayOp::AnyElementTrue
                    | ArrayOp::AllElementsTrue
            ),
            Expression::TypeConversion(tc) => tc.op == TypeConversionOp::IsNumber,
            _ => false,
        }
    }

    pub fn contains_accumulator(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| {
            if matches!(e, Expression::Accumulator { .. }) {
                found = true;
            }
        });
        found
    }

    /// Collect every document path this expression reads.
    ///
    /// `$$ROOT` and `$$CURRENT` without a sub-path read the whole document and
    /// are reported as `"$$ROOT"`.
    pub fn referenced_fields(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.walk(&mut |e| match e {
            Expression::FieldPath(fp) => out.push(fp.path().to_string()),
            Expression::Exists { field, .. } => out.push(field.path().to_string()),
            Expression::Variable { name, path } if name == "ROOT" || name == "CURRENT" => {
                match path {
                    Some(p) => out.push(p.clone()),
                    None => out.push("$$ROOT".to_string()),
                }
            }
            Expression::LookupSize { local_field, .. } => out.push(local_field.clone()),
            _ => {}
        });
        out
    }

    /// Pre-order traversal over this expression and all sub-expressions.
    pub fn walk(&self, f: &mut dyn FnMut(&Expression)) {
        f(self);
        match self {
            Expression::FieldPath(_)
            | Expression::Variable { .. }
            | Expression::Literal(_)
            | Expression::LookupSize { .. }
            | Expression::Exists { .. } => {}
            Expression::Comparison { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            Expression::Logical { operands, .. } | Expression::Arithmetic { operands, .. } => {
                operands.iter().for_each(|e| e.walk(f));
            }
            Expression::Array(a) => {
                if let Some(array) = &a.array {
                    array.walk(f);
                }
                if let Some(index) = &a.index {
                    index.walk(f);
                }
                a.args.iter().for_each(|e| e.walk(f));
            }
            Expression::String { args, .. } | Expression::Object { args, .. } => {
                args.iter().for_each(|e| e.walk(f));
            }
            Expression::Date { arg, .. } => arg.walk(f),
            Expression::Conditional(Conditional::Cond {
                condition,
                then,
                otherwise,
            }) => {
                condition.walk(f);
                then.walk(f);
                otherwise.walk(f);
            }
            Expression::Conditional(Conditional::IfNull(args)) => {
                args.iter().for_each(|e| e.walk(f));
            }
            Expression::Switch { branches, default } => {
                for (case, then) in branches {
                    case.walk(f);
                    then.walk(f);
                }
                if let Some(d) = default {
                    d.walk(f);
                }
            }
            Expression::Accumulator { arg, .. } => {
                if let Some(a) = arg {
                    a.walk(f);
                }
            }
            Expression::CompoundId(fields) | Expression::Document(fields) => {
                fields.iter().for_each(|(_, e)| e.walk(f));
            }
            Expression::TypeConversion(tc) => {
                tc.arg.walk(f);
                if let Some(e) = &tc.on_error {
                    e.walk(f);
                }
                if let Some(e) = &tc.on_null {
                    e.walk(f);
                }
            }
        }
    }
}

impl ArrayExpr {
    fn new(
        op: ArrayOp,
        array: Option<Expression>,
        index: Option<Expression>,
        args: Vec<Expression>,
    ) -> Self {
        Self {
            op,
            array: array.map(Box::new),
            index: index.map(Box::new),
            args,
            var: None,
        }
    }
}

impl From<Literal> for Expression {
    fn from(lit: Literal) -> Self {
        Expression::Literal(lit)
    }
}

impl From<FieldPath> for Expression {
    fn from(fp: FieldPath) -> Self {
        Expression::FieldPath(fp)
    }
}
