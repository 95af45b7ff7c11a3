//! Operator tables.
//!
//! Every MongoDB operator string maps to exactly one variant. Matching is
//! exact and case-sensitive; an unrecognized string is an
//! `UnknownOperator` error at construction time.

use crate::error::{TranslateError, TranslateResult};

fn unknown<T>(op: &str) -> TranslateResult<T> {
    Err(TranslateError::UnknownOperator(op.to_string()))
}

// ============================================================================
// Comparison
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
}

impl ComparisonOp {
    pub fn from_mongo(op: &str) -> TranslateResult<Self> {
        match op {
            "$eq" => Ok(ComparisonOp::Eq),
            "$ne" => Ok(ComparisonOp::Ne),
            "$gt" => Ok(ComparisonOp::Gt),
            "$gte" => Ok(ComparisonOp::Gte),
            "$lt" => Ok(ComparisonOp::Lt),
            "$lte" => Ok(ComparisonOp::Lte),
            "$in" => Ok(ComparisonOp::In),
            "$nin" => Ok(ComparisonOp::Nin),
            _ => unknown(op),
        }
    }

    pub fn mongo_name(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "$eq",
            ComparisonOp::Ne => "$ne",
            ComparisonOp::Gt => "$gt",
            ComparisonOp::Gte => "$gte",
            ComparisonOp::Lt => "$lt",
            ComparisonOp::Lte => "$lte",
            ComparisonOp::In => "$in",
            ComparisonOp::Nin => "$nin",
        }
    }

    /// Infix SQL operator. `In`/`Nin` render as list membership instead.
    pub fn sql_operator(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Ne => "<>",
            ComparisonOp::Gt => ">",
            ComparisonOp::Gte => ">=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Lte => "<=",
            ComparisonOp::In => "IN",
            ComparisonOp::Nin => "NOT IN",
        }
    }

    pub fn is_membership(&self) -> bool {
        matches!(self, ComparisonOp::In | ComparisonOp::Nin)
    }
}

// ============================================================================
// Logical
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    And,
    Or,
    Not,
    Nor,
}

impl LogicalOp {
    pub fn from_mongo(op: &str) -> TranslateResult<Self> {
        match op {
            "$and" => Ok(LogicalOp::And),
            "$or" => Ok(LogicalOp::Or),
            "$not" => Ok(LogicalOp::Not),
            "$nor" => Ok(LogicalOp::Nor),
            _ => unknown(op),
        }
    }

    pub fn mongo_name(&self) -> &'static str {
        match self {
            LogicalOp::And => "$and",
            LogicalOp::Or => "$or",
            LogicalOp::Not => "$not",
            LogicalOp::Nor => "$nor",
        }
    }
}

// ============================================================================
// Arithmetic
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Mod,
    Round,
    Abs,
    Ceil,
    Floor,
    Trunc,
    Sqrt,
    Pow,
    Exp,
    Ln,
    Log10,
    Max,
    Min,
}

impl ArithmeticOp {
    pub fn from_mongo(op: &str) -> TranslateResult<Self> {
        match op {
            "$add" => Ok(ArithmeticOp::Add),
            "$subtract" => Ok(ArithmeticOp::Subtract),
            "$multiply" => Ok(ArithmeticOp::Multiply),
            "$divide" => Ok(ArithmeticOp::Divide),
            "$mod" => Ok(ArithmeticOp::Mod),
            "$round" => Ok(ArithmeticOp::Round),
            "$abs" => Ok(ArithmeticOp::Abs),
            "$ceil" => Ok(ArithmeticOp::Ceil),
            "$floor" => Ok(ArithmeticOp::Floor),
            "$trunc" => Ok(ArithmeticOp::Trunc),
            "$sqrt" => Ok(ArithmeticOp::Sqrt),
            "$pow" => Ok(ArithmeticOp::Pow),
            "$exp" => Ok(ArithmeticOp::Exp),
            "$ln" => Ok(ArithmeticOp::Ln),
            "$log10" => Ok(ArithmeticOp::Log10),
            "$max" => Ok(ArithmeticOp::Max),
            "$min" => Ok(ArithmeticOp::Min),
            _ => unknown(op),
        }
    }

    pub fn mongo_name(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "$add",
            ArithmeticOp::Subtract => "$subtract",
            ArithmeticOp::Multiply => "$multiply",
            ArithmeticOp::Divide => "$divide",
            ArithmeticOp::Mod => "$mod",
            ArithmeticOp::Round => "$round",
            ArithmeticOp::Abs => "$abs",
            ArithmeticOp::Ceil => "$ceil",
            ArithmeticOp::Floor => "$floor",
            ArithmeticOp::Trunc => "$trunc",
            ArithmeticOp::Sqrt => "$sqrt",
            ArithmeticOp::Pow => "$pow",
            ArithmeticOp::Exp => "$exp",
            ArithmeticOp::Ln => "$ln",
            ArithmeticOp::Log10 => "$log10",
            ArithmeticOp::Max => "$max",
            ArithmeticOp::Min => "$min",
        }
    }

    /// Operators that accept either one or two operands.
    pub fn is_unary_capable(&self) -> bool {
        matches!(
            self,
            ArithmeticOp::Abs
                | ArithmeticOp::Ceil
                | ArithmeticOp::Floor
                | ArithmeticOp::Sqrt
                | ArithmeticOp::Exp
                | ArithmeticOp::Ln
                | ArithmeticOp::Log10
                | ArithmeticOp::Trunc
                | ArithmeticOp::Round
        )
    }

    /// Whether the SQL function takes a second argument (`ROUND(x, n)`).
    pub fn accepts_second_operand(&self) -> bool {
        matches!(
            self,
            ArithmeticOp::Round | ArithmeticOp::Trunc | ArithmeticOp::Mod | ArithmeticOp::Pow
        )
    }

    /// Infix operator for the four basic operations.
    pub fn infix(&self) -> Option<&'static str> {
        match self {
            ArithmeticOp::Add => Some("+"),
            ArithmeticOp::Subtract => Some("-"),
            ArithmeticOp::Multiply => Some("*"),
            ArithmeticOp::Divide => Some("/"),
            _ => None,
        }
    }

    /// SQL function name for non-infix operators.
    pub fn sql_function(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Subtract => "-",
            ArithmeticOp::Multiply => "*",
            ArithmeticOp::Divide => "/",
            ArithmeticOp::Mod => "MOD",
            ArithmeticOp::Round => "ROUND",
            ArithmeticOp::Abs => "ABS",
            ArithmeticOp::Ceil => "CEIL",
            ArithmeticOp::Floor => "FLOOR",
            ArithmeticOp::Trunc => "TRUNC",
            ArithmeticOp::Sqrt => "SQRT",
            ArithmeticOp::Pow => "POWER",
            ArithmeticOp::Exp => "EXP",
            ArithmeticOp::Ln => "LN",
            ArithmeticOp::Log10 => "LOG",
            ArithmeticOp::Max => "GREATEST",
            ArithmeticOp::Min => "LEAST",
        }
    }
}

// ============================================================================
// String
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringOp {
    Concat,
    ToLower,
    ToUpper,
    Substr,
    Trim,
    Ltrim,
    Rtrim,
    StrLenCp,
    Split,
    IndexOfCp,
    RegexMatch,
    RegexFind,
    ReplaceOne,
    ReplaceAll,
}

impl StringOp {
    pub fn from_mongo(op: &str) -> TranslateResult<Self> {
        match op {
            "$concat" => Ok(StringOp::Concat),
            "$toLower" => Ok(StringOp::ToLower),
            "$toUpper" => Ok(StringOp::ToUpper),
            "$substr" | "$substrCP" | "$substrBytes" => Ok(StringOp::Substr),
            "$trim" => Ok(StringOp::Trim),
            "$ltrim" => Ok(StringOp::Ltrim),
            "$rtrim" => Ok(StringOp::Rtrim),
            "$strLenCP" => Ok(StringOp::StrLenCp),
            "$split" => Ok(StringOp::Split),
            "$indexOfCP" => Ok(StringOp::IndexOfCp),
            "$regexMatch" => Ok(StringOp::RegexMatch),
            "$regexFind" => Ok(StringOp::RegexFind),
            "$replaceOne" => Ok(StringOp::ReplaceOne),
            "$replaceAll" => Ok(StringOp::ReplaceAll),
            _ => unknown(op),
        }
    }

    pub fn mongo_name(&self) -> &'static str {
        match self {
            StringOp::Concat => "$concat",
            StringOp::ToLower => "$toLower",
            StringOp::ToUpper => "$toUpper",
            StringOp::Substr => "$substr",
            StringOp::Trim => "$trim",
            StringOp::Ltrim => "$ltrim",
            StringOp::Rtrim => "$rtrim",
            StringOp::StrLenCp => "$strLenCP",
            StringOp::Split => "$split",
            StringOp::IndexOfCp => "$indexOfCP",
            StringOp::RegexMatch => "$regexMatch",
            StringOp::RegexFind => "$regexFind",
            StringOp::ReplaceOne => "$replaceOne",
            StringOp::ReplaceAll => "$replaceAll",
        }
    }

    /// Inclusive bounds on the number of arguments.
    pub fn arity(&self) -> (usize, usize) {
        match self {
            StringOp::Concat => (1, usize::MAX),
            StringOp::ToLower | StringOp::ToUpper | StringOp::StrLenCp => (1, 1),
            StringOp::Trim | StringOp::Ltrim | StringOp::Rtrim => (1, 2),
            StringOp::Substr => (2, 3),
            StringOp::Split => (2, 2),
            StringOp::IndexOfCp => (2, 4),
            StringOp::RegexMatch | StringOp::RegexFind => (2, 3),
            StringOp::ReplaceOne | StringOp::ReplaceAll => (3, 3),
        }
    }
}

// ============================================================================
// Date
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateOp {
    Year,
    Month,
    DayOfMonth,
    Hour,
    Minute,
    Second,
    Millisecond,
    DayOfWeek,
    DayOfYear,
}

impl DateOp {
    pub fn from_mongo(op: &str) -> TranslateResult<Self> {
        match op {
            "$year" => Ok(DateOp::Year),
            "$month" => Ok(DateOp::Month),
            "$dayOfMonth" => Ok(DateOp::DayOfMonth),
            "$hour" => Ok(DateOp::Hour),
            "$minute" => Ok(DateOp::Minute),
            "$second" => Ok(DateOp::Second),
            "$millisecond" => Ok(DateOp::Millisecond),
            "$dayOfWeek" => Ok(DateOp::DayOfWeek),
            "$dayOfYear" => Ok(DateOp::DayOfYear),
            _ => unknown(op),
        }
    }

    pub fn mongo_name(&self) -> &'static str {
        match self {
            DateOp::Year => "$year",
            DateOp::Month => "$month",
            DateOp::DayOfMonth => "$dayOfMonth",
            DateOp::Hour => "$hour",
            DateOp::Minute => "$minute",
            DateOp::Second => "$second",
            DateOp::Millisecond => "$millisecond",
            DateOp::DayOfWeek => "$dayOfWeek",
            DateOp::DayOfYear => "$dayOfYear",
        }
    }

    /// `EXTRACT` field for the parts Oracle extracts directly.
    pub fn extract_field(&self) -> Option<&'static str> {
        match self {
            DateOp::Year => Some("YEAR"),
            DateOp::Month => Some("MONTH"),
            DateOp::DayOfMonth => Some("DAY"),
            DateOp::Hour => Some("HOUR"),
            DateOp::Minute => Some("MINUTE"),
            _ => None,
        }
    }
}

// ============================================================================
// Array
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayOp {
    ArrayElemAt,
    Size,
    First,
    Last,
    Filter,
    Map,
    Reduce,
    ConcatArrays,
    Slice,
    ReverseArray,
    SortArray,
    In,
    IsArray,
    IndexOfArray,
    SetUnion,
    SetIntersection,
    SetDifference,
    SetEquals,
    SetIsSubset,
    AnyElementTrue,
    AllElementsTrue,
}

impl ArrayOp {
    pub fn from_mongo(op: &str) -> TranslateResult<Self> {
        match op {
            "$arrayElemAt" => Ok(ArrayOp::ArrayElemAt),
            "$size" => Ok(ArrayOp::Size),
            "$first" => Ok(ArrayOp::First),
            "$last" => Ok(ArrayOp::Last),
            "$filter" => Ok(ArrayOp::Filter),
            "$map" => Ok(ArrayOp::Map),
            "$reduce" => Ok(ArrayOp::Reduce),
            "$concatArrays" => Ok(ArrayOp::ConcatArrays),
            "$slice" => Ok(ArrayOp::Slice),
            "$reverseArray" => Ok(ArrayOp::ReverseArray),
            "$sortArray" => Ok(ArrayOp::SortArray),
            "$in" => Ok(ArrayOp::In),
            "$isArray" => Ok(ArrayOp::IsArray),
            "$indexOfArray" => Ok(ArrayOp::IndexOfArray),
            "$setUnion" => Ok(ArrayOp::SetUnion),
            "$setIntersection" => Ok(ArrayOp::SetIntersection),
            "$setDifference" => Ok(ArrayOp::SetDifference),
            "$setEquals" => Ok(ArrayOp::SetEquals),
            "$setIsSubset" => Ok(ArrayOp::SetIsSubset),
            "$anyElementTrue" => Ok(ArrayOp::AnyElementTrue),
            "$allElementsTrue" => Ok(ArrayOp::AllElementsTrue),
            _ => unknown(op),
        }
    }

    pub fn mongo_name(&self) -> &'static str {
        match self {
            ArrayOp::ArrayElemAt => "$arrayElemAt",
            ArrayOp::Size => "$size",
            ArrayOp::First => "$first",
            ArrayOp::Last => "$last",
            ArrayOp::Filter => "$filter",
            ArrayOp::Map => "$map",
            ArrayOp::Reduce => "$reduce",
            ArrayOp::ConcatArrays => "$concatArrays",
            ArrayOp::Slice => "$slice",
            ArrayOp::ReverseArray => "$reverseArray",
            ArrayOp::SortArray => "$sortArray",
            ArrayOp::In => "$in",
            ArrayOp::IsArray => "$isArray",
            ArrayOp::IndexOfArray => "$indexOfArray",
            ArrayOp::SetUnion => "$setUnion",
            ArrayOp::SetIntersection => "$setIntersection",
            ArrayOp::SetDifference => "$setDifference",
            ArrayOp::SetEquals => "$setEquals",
            ArrayOp::SetIsSubset => "$setIsSubset",
            ArrayOp::AnyElementTrue => "$anyElementTrue",
            ArrayOp::AllElementsTrue => "$allElementsTrue",
        }
    }
}

// ============================================================================
// Accumulators
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccumulatorOp {
    Sum,
    Avg,
    Count,
    Min,
    Max,
    First,
    Last,
    Push,
    AddToSet,
    StdDevPop,
    StdDevSamp,
}

impl AccumulatorOp {
    pub fn from_mongo(op: &str) -> TranslateResult<Self> {
        match op {
            "$sum" => Ok(AccumulatorOp::Sum),
            "$avg" => Ok(AccumulatorOp::Avg),
            "$count" => Ok(AccumulatorOp::Count),
            "$min" => Ok(AccumulatorOp::Min),
            "$max" => Ok(AccumulatorOp::Max),
            "$first" => Ok(AccumulatorOp::First),
            "$last" => Ok(AccumulatorOp::Last),
            "$push" => Ok(AccumulatorOp::Push),
            "$addToSet" => Ok(AccumulatorOp::AddToSet),
            "$stdDevPop" => Ok(AccumulatorOp::StdDevPop),
            "$stdDevSamp" => Ok(AccumulatorOp::StdDevSamp),
            _ => unknown(op),
        }
    }

    pub fn mongo_name(&self) -> &'static str {
        match self {
            AccumulatorOp::Sum => "$sum",
            AccumulatorOp::Avg => "$avg",
            AccumulatorOp::Count => "$count",
            AccumulatorOp::Min => "$min",
            AccumulatorOp::Max => "$max",
            AccumulatorOp::First => "$first",
            AccumulatorOp::Last => "$last",
            AccumulatorOp::Push => "$push",
            AccumulatorOp::AddToSet => "$addToSet",
            AccumulatorOp::StdDevPop => "$stdDevPop",
            AccumulatorOp::StdDevSamp => "$stdDevSamp",
        }
    }

    /// Accumulators whose input must be numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            AccumulatorOp::Sum
                | AccumulatorOp::Avg
                | AccumulatorOp::StdDevPop
                | AccumulatorOp::StdDevSamp
        )
    }
}

// ============================================================================
// Type conversion
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeConversionOp {
    Type,
    ToInt,
    ToLong,
    ToDouble,
    ToDecimal,
    ToString,
    ToBool,
    ToDate,
    ToObjectId,
    Convert,
    IsNumber,
}

impl TypeConversionOp {
    pub fn from_mongo(op: &str) -> TranslateResult<Self> {
        match op {
            "$type" => Ok(TypeConversionOp::Type),
            "$toInt" => Ok(TypeConversionOp::ToInt),
            "$toLong" => Ok(TypeConversionOp::ToLong),
            "$toDouble" => Ok(TypeConversionOp::ToDouble),
            "$toDecimal" => Ok(TypeConversionOp::ToDecimal),
            "$toString" => Ok(TypeConversionOp::ToString),
            "$toBool" => Ok(TypeConversionOp::ToBool),
            "$toDate" => Ok(TypeConversionOp::ToDate),
            "$toObjectId" => Ok(TypeConversionOp::ToObjectId),
            "$convert" => Ok(TypeConversionOp::Convert),
            "$isNumber" => Ok(TypeConversionOp::IsNumber),
            _ => unknown(op),
        }
    }

    pub fn mongo_name(&self) -> &'static str {
        match self {
            TypeConversionOp::Type => "$type",
            TypeConversionOp::ToInt => "$toInt",
            TypeConversionOp::ToLong => "$toLong",
            TypeConversionOp::ToDouble => "$toDouble",
            TypeConversionOp::ToDecimal => "$toDecimal",
            TypeConversionOp::ToString => "$toString",
            TypeConversionOp::ToBool => "$toBool",
            TypeConversionOp::ToDate => "$toDate",
            TypeConversionOp::ToObjectId => "$toObjectId",
            TypeConversionOp::Convert => "$convert",
            TypeConversionOp::IsNumber => "$isNumber",
        }
    }

    /// Target of a `$convert` `to` argument, e.g. `"int"` or `"double"`.
    pub fn from_convert_target(to: &str) -> TranslateResult<Self> {
        match to {
            "int" => Ok(TypeConversionOp::ToInt),
            "long" => Ok(TypeConversionOp::ToLong),
            "double" => Ok(TypeConversionOp::ToDouble),
            "decimal" => Ok(TypeConversionOp::ToDecimal),
            "string" => Ok(TypeConversionOp::ToString),
            "bool" => Ok(TypeConversionOp::ToBool),
            "date" => Ok(TypeConversionOp::ToDate),
            "objectId" => Ok(TypeConversionOp::ToObjectId),
            other => Err(TranslateError::structural(format!(
                "$convert: unsupported target type '{}'",
                other
            ))),
        }
    }
}

// ============================================================================
// Object
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectOp {
    MergeObjects,
    ObjectToArray,
    ArrayToObject,
}

impl ObjectOp {
    pub fn from_mongo(op: &str) -> TranslateResult<Self> {
        match op {
            "$mergeObjects" => Ok(ObjectOp::MergeObjects),
            "$objectToArray" => Ok(ObjectOp::ObjectToArray),
            "$arrayToObject" => Ok(ObjectOp::ArrayToObject),
            _ => unknown(op),
        }
    }

    pub fn mongo_name(&self) -> &'static str {
        match self {
            ObjectOp::MergeObjects => "$mergeObjects",
            ObjectOp::ObjectToArray => "$objectToArray",
            ObjectOp::ArrayToObject => "$arrayToObject",
        }
    }
}

// ============================================================================
// Window functions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowOp {
    Sum,
    Avg,
    Min,
    Max,
    Count,
    Rank,
    DenseRank,
    DocumentNumber,
    First,
    Last,
    Shift,
    StdDevPop,
    StdDevSamp,
    Push,
}

impl WindowOp {
    pub fn from_mongo(op: &str) -> TranslateResult<Self> {
        match op {
            "$sum" => Ok(WindowOp::Sum),
            "$avg" => Ok(WindowOp::Avg),
            "$min" => Ok(WindowOp::Min),
            "$max" => Ok(WindowOp::Max),
            "$count" => Ok(WindowOp::Count),
            "$rank" => Ok(WindowOp::Rank),
            "$denseRank" => Ok(WindowOp::DenseRank),
            "$documentNumber" => Ok(WindowOp::DocumentNumber),
            "$first" => Ok(WindowOp::First),
            "$last" => Ok(WindowOp::Last),
            "$shift" => Ok(WindowOp::Shift),
            "$stdDevPop" => Ok(WindowOp::StdDevPop),
            "$stdDevSamp" => Ok(WindowOp::StdDevSamp),
            "$push" => Ok(WindowOp::Push),
            _ => unknown(op),
        }
    }

    pub fn mongo_name(&self) -> &'static str {
        match self {
            WindowOp::Sum => "$sum",
            WindowOp::Avg => "$avg",
            WindowOp::Min => "$min",
            WindowOp::Max => "$max",
            WindowOp::Count => "$count",
            WindowOp::Rank => "$rank",
            WindowOp::DenseRank => "$denseRank",
            WindowOp::DocumentNumber => "$documentNumber",
            WindowOp::First => "$first",
            WindowOp::Last => "$last",
            WindowOp::Shift => "$shift",
            WindowOp::StdDevPop => "$stdDevPop",
            WindowOp::StdDevSamp => "$stdDevSamp",
            WindowOp::Push => "$push",
        }
    }

    /// Ranking functions take no argument and ignore any frame.
    pub fn is_ranking(&self) -> bool {
        matches!(
            self,
            WindowOp::Rank | WindowOp::DenseRank | WindowOp::DocumentNumber
        )
    }
}
