// Parser for index expressions, subsets and map ranges.
//
// Parses a token stream (from the lexer) into `Expr`, `Subset` and `Range`
// values. Uses chumsky combinators.
//
// Grammar:
//   expr    := product (('+' | '-') product)*
//   product := unary (('*' | '/' | '%') unary)*
//   unary   := '-'* atom
//   atom    := INT | IDENT | '(' expr ')'
//   dim     := expr (':' expr (':' expr)?)?
//   subset  := dim (',' dim)*
//   range   := expr ':' expr (':' expr)?
//
// Preconditions: none.
// Postconditions: returns the parsed value (unsimplified) plus any errors.
// Failure modes: syntax errors produce `Rich` diagnostics.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::lexer::{LexResult, Token};
use crate::subset::{Range, Subset};
use crate::symbolic::Expr;

/// Result of parsing: value plus any errors.
#[derive(Debug)]
pub struct ParseResult<T> {
    pub value: Option<T>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

impl<T> ParseResult<T> {
    /// The parsed value, or all error messages joined by `; `.
    pub fn into_result(self) -> Result<T, String> {
        match self.value {
            Some(value) if self.errors.is_empty() => Ok(value),
            _ => {
                let messages: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
                if messages.is_empty() {
                    Err("empty input".to_string())
                } else {
                    Err(messages.join("; "))
                }
            }
        }
    }
}

type Spanned = (Token, SimpleSpan);

/// Lex `source` and convert to chumsky spans.
fn tokens(source: &str) -> (Vec<Spanned>, Vec<Rich<'static, Token, SimpleSpan>>, SimpleSpan) {
    let LexResult { tokens, errors } = crate::lexer::lex(source);
    let len = source.len();
    let tokens = tokens
        .into_iter()
        .map(|(tok, span)| {
            let cspan: SimpleSpan = (span.start..span.end).into();
            (tok, cspan)
        })
        .collect();
    let errors = errors
        .into_iter()
        .map(|e| {
            let span: SimpleSpan = (e.span.start..e.span.end).into();
            Rich::custom(span, e.message)
        })
        .collect();
    let eoi: SimpleSpan = (len..len).into();
    (tokens, errors, eoi)
}

/// Parse a single index expression such as `i - 1` or `2*j + k`.
pub fn parse_expr(source: &str) -> ParseResult<Expr> {
    let (toks, mut errors, eoi) = tokens(source);
    let stream = Stream::from_iter(toks).map(eoi, |(t, s): (_, _)| (t, s));
    let (value, parse_errors) = expr_parser(source)
        .then_ignore(end())
        .parse(stream)
        .into_output_errors();
    errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));
    ParseResult { value, errors }
}

/// Parse a subset such as `i - 1, j` (point) or `0:N-1, 0:M-1` (range).
pub fn parse_subset(source: &str) -> ParseResult<Subset> {
    let (toks, mut errors, eoi) = tokens(source);
    let stream = Stream::from_iter(toks).map(eoi, |(t, s): (_, _)| (t, s));
    let (value, parse_errors) = subset_parser(source)
        .then_ignore(end())
        .parse(stream)
        .into_output_errors();
    errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));
    ParseResult { value, errors }
}

/// Parse a single map range `lower:upper[:step]` (inclusive bounds).
pub fn parse_range(source: &str) -> ParseResult<Range> {
    let (toks, mut errors, eoi) = tokens(source);
    let stream = Stream::from_iter(toks).map(eoi, |(t, s): (_, _)| (t, s));
    let (value, parse_errors) = range_parser(source)
        .then_ignore(end())
        .parse(stream)
        .into_output_errors();
    errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));
    ParseResult { value, errors }
}

// ── Parser builders ──
//
// The `source` reference is captured once so identifier tokens can be
// resolved to text by span.

#[derive(Debug, Clone, Copy)]
enum ProductOp {
    Mul,
    Div,
    Mod,
}

fn expr_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, Expr, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + Clone + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    recursive(move |expr| {
        let ident = just(Token::Ident).map_with(move |_, e| {
            let span: SimpleSpan = e.span();
            Expr::Sym(source[span.start()..span.end()].to_string())
        });

        let int = select! { Token::Int(n) => Expr::Int(n) };

        let atom = int
            .or(ident)
            .or(expr.delimited_by(just(Token::LParen), just(Token::RParen)));

        let unary = just(Token::Minus)
            .repeated()
            .foldr(atom, |_, operand| Expr::Neg(Box::new(operand)));

        let product_op = choice((
            just(Token::Star).to(ProductOp::Mul),
            just(Token::Slash).to(ProductOp::Div),
            just(Token::Percent).to(ProductOp::Mod),
        ));

        let product = unary.clone().foldl(
            product_op.then(unary).repeated(),
            |lhs, (op, rhs)| match op {
                ProductOp::Mul => Expr::Mul(vec![lhs, rhs]),
                ProductOp::Div => Expr::FloorDiv(Box::new(lhs), Box::new(rhs)),
                ProductOp::Mod => Expr::Mod(Box::new(lhs), Box::new(rhs)),
            },
        );

        let sum_op = just(Token::Plus).to(false).or(just(Token::Minus).to(true));

        product
            .clone()
            .foldl(sum_op.then(product).repeated(), |lhs, (negate, rhs)| {
                let rhs = if negate {
                    Expr::Neg(Box::new(rhs))
                } else {
                    rhs
                };
                Expr::Add(vec![lhs, rhs])
            })
    })
}

fn range_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, Range, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + Clone + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    let expr = expr_parser(source);
    expr.clone()
        .then_ignore(just(Token::Colon))
        .then(expr.clone())
        .then(just(Token::Colon).ignore_then(expr).or_not())
        .map(|((start, end), step)| Range {
            start,
            end,
            step: step.unwrap_or(Expr::Int(1)),
        })
}

/// One subset dimension before the point/range decision is made.
enum Dim {
    Index(Expr),
    Range(Range),
}

fn subset_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, Subset, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + Clone + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    let expr = expr_parser(source);

    let dim = expr
        .clone()
        .then(
            just(Token::Colon)
                .ignore_then(expr.clone())
                .then(just(Token::Colon).ignore_then(expr).or_not())
                .or_not(),
        )
        .map(|(start, rest)| match rest {
            None => Dim::Index(start),
            Some((end, step)) => Dim::Range(Range {
                start,
                end,
                step: step.unwrap_or(Expr::Int(1)),
            }),
        });

    dim.separated_by(just(Token::Comma))
        .at_least(1)
        .collect::<Vec<_>>()
        .map(|dims| {
            if dims.iter().all(|d| matches!(d, Dim::Index(_))) {
                Subset::Indices(
                    dims.into_iter()
                        .filter_map(|d| match d {
                            Dim::Index(e) => Some(e),
                            Dim::Range(_) => None,
                        })
                        .collect(),
                )
            } else {
                Subset::Range(
                    dims.into_iter()
                        .map(|d| match d {
                            Dim::Index(e) => Range::point(e),
                            Dim::Range(r) => r,
                        })
                        .collect(),
                )
            }
        })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn expr_ok(source: &str) -> Expr {
        let result = parse_expr(source);
        assert!(
            result.errors.is_empty(),
            "unexpected errors: {:#?}",
            result.errors
        );
        result.value.expect("expected expression")
    }

    fn sym(name: &str) -> Expr {
        Expr::Sym(name.to_string())
    }

    #[test]
    fn integer_and_symbol() {
        assert_eq!(expr_ok("42"), Expr::Int(42));
        assert_eq!(expr_ok("i"), sym("i"));
    }

    #[test]
    fn subtraction_is_negated_addend() {
        assert_eq!(
            expr_ok("i - 1"),
            Expr::Add(vec![sym("i"), Expr::Neg(Box::new(Expr::Int(1)))])
        );
    }

    #[test]
    fn product_binds_tighter_than_sum() {
        assert_eq!(
            expr_ok("1 + 2*i"),
            Expr::Add(vec![Expr::Int(1), Expr::Mul(vec![Expr::Int(2), sym("i")])])
        );
    }

    #[test]
    fn sums_are_left_associative() {
        assert_eq!(
            expr_ok("i + 1 + j"),
            Expr::Add(vec![Expr::Add(vec![sym("i"), Expr::Int(1)]), sym("j")])
        );
    }

    #[test]
    fn parentheses_and_unary_minus() {
        assert_eq!(
            expr_ok("-(i + 1)"),
            Expr::Neg(Box::new(Expr::Add(vec![sym("i"), Expr::Int(1)])))
        );
        assert_eq!(
            expr_ok("--i"),
            Expr::Neg(Box::new(Expr::Neg(Box::new(sym("i")))))
        );
    }

    #[test]
    fn floor_division_and_modulo() {
        assert_eq!(
            expr_ok("i / 2 % 3"),
            Expr::Mod(
                Box::new(Expr::FloorDiv(Box::new(sym("i")), Box::new(Expr::Int(2)))),
                Box::new(Expr::Int(3))
            )
        );
    }

    #[test]
    fn point_subset() {
        let subset = parse_subset("i - 1, j").into_result().unwrap();
        match subset {
            Subset::Indices(dims) => assert_eq!(dims.len(), 2),
            other => panic!("expected indices, got {other:?}"),
        }
    }

    #[test]
    fn range_subset_promotes_point_dims() {
        let subset = parse_subset("0:N-1, j").into_result().unwrap();
        match subset {
            Subset::Range(dims) => {
                assert_eq!(dims.len(), 2);
                assert_eq!(dims[0].start, Expr::Int(0));
                assert_eq!(dims[1], Range::point(sym("j")));
            }
            other => panic!("expected range, got {other:?}"),
        }
    }

    #[test]
    fn map_range_with_step() {
        let range = parse_range("1:N-2:2").into_result().unwrap();
        assert_eq!(range.start, Expr::Int(1));
        assert_eq!(range.step, Expr::Int(2));
    }

    #[test]
    fn map_range_requires_upper_bound() {
        assert!(parse_range("0").into_result().is_err());
    }

    #[test]
    fn error_trailing_operator() {
        let result = parse_expr("i +");
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn error_empty_subset() {
        assert!(parse_subset("").into_result().is_err());
    }

    #[test]
    fn lex_errors_are_merged() {
        let result = parse_expr("i @ 1");
        assert!(result
            .errors
            .iter()
            .any(|e| e.to_string().contains("unexpected character")));
    }
}
