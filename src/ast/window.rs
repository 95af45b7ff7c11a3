//! Window outputs and frame specifications for `$setWindowFields`.

use super::expr::Expression;
use super::literal::Literal;
use super::ops::WindowOp;
use crate::error::{TranslateError, TranslateResult};
use crate::sql::token::{Token, TokenStream};

/// One named output of `$setWindowFields`.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowOutput {
    pub op: WindowOp,
    pub arg: Option<Expression>,
    pub frame: Option<WindowFrame>,
    /// `$shift` offset and default value.
    pub shift: Option<Shift>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Shift {
    pub by: i64,
    pub default: Literal,
}

impl WindowOutput {
    pub fn new(op: WindowOp, arg: Option<Expression>) -> TranslateResult<Self> {
        if arg.is_none() && !op.is_ranking() && op != WindowOp::Count {
            return Err(TranslateError::structural(format!(
                "window operator {} requires an argument",
                op.mongo_name()
            )));
        }
        Ok(Self {
            op,
            arg,
            frame: None,
            shift: None,
        })
    }

    pub fn with_frame(mut self, frame: WindowFrame) -> Self {
        self.frame = Some(frame);
        self
    }

    pub fn with_shift(mut self, by: i64, default: Literal) -> Self {
        self.shift = Some(Shift { by, default });
        self
    }
}

/// Window frame specification.
///
/// Examples:
/// - `ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW`
/// - `RANGE BETWEEN 1 PRECEDING AND 1 FOLLOWING`
#[derive(Debug, Clone, PartialEq)]
pub struct WindowFrame {
    pub kind: WindowFrameKind,
    pub start: WindowFrameBound,
    pub end: Option<WindowFrameBound>,
}

impl WindowFrame {
    /// Create a frame with just a start bound.
    pub fn new(kind: WindowFrameKind, start: WindowFrameBound) -> Self {
        Self {
            kind,
            start,
            end: None,
        }
    }

    /// Create a frame with BETWEEN start AND end.
    pub fn between(kind: WindowFrameKind, start: WindowFrameBound, end: WindowFrameBound) -> Self {
        Self {
            kind,
            start,
            end: Some(end),
        }
    }

    /// ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW
    pub fn rows_to_current() -> Self {
        Self::between(
            WindowFrameKind::Rows,
            WindowFrameBound::UnboundedPreceding,
            WindowFrameBound::CurrentRow,
        )
    }

    /// Build from a MongoDB `documents: [lower, upper]` or `range: [lower, upper]`
    /// window.
    ///
    /// `"unbounded"` as the upper bound means UNBOUNDED FOLLOWING; as the
    /// lower bound it means UNBOUNDED PRECEDING.
    pub fn from_mongo(kind: WindowFrameKind, lower: &Literal, upper: &Literal) -> TranslateResult<Self> {
        let start = WindowFrameBound::from_mongo(lower, false)?;
        let end = WindowFrameBound::from_mongo(upper, true)?;
        if start.position() > end.position() {
            return Err(TranslateError::structural(
                "window lower bound must not be after the upper bound",
            ));
        }
        Ok(Self::between(kind, start, end))
    }

    pub fn to_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(match self.kind {
            WindowFrameKind::Rows => Token::Rows,
            WindowFrameKind::Range => Token::Range,
        })
        .space();
        match &self.end {
            Some(end) => {
                ts.push(Token::Between).space();
                emit_frame_bound(&mut ts, &self.start);
                ts.space().push(Token::And).space();
                emit_frame_bound(&mut ts, end);
            }
            None => emit_frame_bound(&mut ts, &self.start),
        }
        ts
    }
}

/// Frame type: ROWS or RANGE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowFrameKind {
    /// `documents` windows - physical row offsets
    Rows,
    /// `range` windows - logical value ranges
    Range,
}

/// Frame boundary specification.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowFrameBound {
    UnboundedPreceding,
    Preceding(u64),
    CurrentRow,
    Following(u64),
    UnboundedFollowing,
}

impl WindowFrameBound {
    fn from_mongo(bound: &Literal, is_end: bool) -> TranslateResult<Self> {
        match bound {
            Literal::String(s) if s == "unbounded" => Ok(if is_end {
                WindowFrameBound::UnboundedFollowing
            } else {
                WindowFrameBound::UnboundedPreceding
            }),
            Literal::String(s) if s == "current" => Ok(WindowFrameBound::CurrentRow),
            other => match other.as_i64() {
                Some(0) => Ok(WindowFrameBound::CurrentRow),
                Some(n) if n < 0 => Ok(WindowFrameBound::Preceding(n.unsigned_abs())),
                Some(n) => Ok(WindowFrameBound::Following(n as u64)),
                None => Err(TranslateError::structural(format!(
                    "invalid window bound {}",
                    other
                ))),
            },
        }
    }

    /// Signed offset used to order bounds.
    fn position(&self) -> i128 {
        match self {
            WindowFrameBound::UnboundedPreceding => i128::MIN,
            WindowFrameBound::Preceding(n) => -(*n as i128),
            WindowFrameBound::CurrentRow => 0,
            WindowFrameBound::Following(n) => *n as i128,
            WindowFrameBound::UnboundedFollowing => i128::MAX,
        }
    }
}

fn emit_frame_bound(ts: &mut TokenStream, bound: &WindowFrameBound) {
    match bound {
        WindowFrameBound::UnboundedPreceding => {
            ts.push(Token::Unbounded).space().push(Token::Preceding);
        }
        WindowFrameBound::Preceding(n) => {
            ts.push(Token::LitInt(*n as i64))
                .space()
                .push(Token::Preceding);
        }
        WindowFrameBound::CurrentRow => {
            ts.push(Token::CurrentRow);
        }
        WindowFrameBound::Following(n) => {
            ts.push(Token::LitInt(*n as i64))
                .space()
                .push(Token::Following);
        }
        WindowFrameBound::UnboundedFollowing => {
            ts.push(Token::Unbounded).space().push(Token::Following);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::dialect::Dialect;

    fn render(frame: &WindowFrame) -> String {
        frame.to_tokens().serialize(Dialect::Oracle26ai)
    }

    #[test]
    fn test_running_total_frame() {
        let frame = WindowFrame::from_mongo(
            WindowFrameKind::Rows,
            &Literal::from("unbounded"),
            &Literal::from("current"),
        )
        .unwrap();
        assert_eq!(frame, WindowFrame::rows_to_current());
        assert_eq!(
            render(&frame),
            "ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW"
        );
    }

    #[test]
    fn test_unbounded_upper_is_following() {
        let frame = WindowFrame::from_mongo(
            WindowFrameKind::Rows,
            &Literal::Int(-2),
            &Literal::from("unbounded"),
        )
        .unwrap();
        assert_eq!(
            render(&frame),
            "ROWS BETWEEN 2 PRECEDING AND UNBOUNDED FOLLOWING"
        );
    }

    #[test]
    fn test_range_offsets() {
        let frame =
            WindowFrame::from_mongo(WindowFrameKind::Range, &Literal::Int(-1), &Literal::Int(1))
                .unwrap();
        assert_eq!(render(&frame), "RANGE BETWEEN 1 PRECEDING AND 1 FOLLOWING");
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        assert!(
            WindowFrame::from_mongo(WindowFrameKind::Rows, &Literal::Int(1), &Literal::Int(-1))
                .is_err()
        );
    }

    #[test]
    fn test_rank_needs_no_argument() {
        assert!(WindowOutput::new(WindowOp::Rank, None).is_ok());
        assert!(WindowOutput::new(WindowOp::Sum, None).is_err());
    }
}
