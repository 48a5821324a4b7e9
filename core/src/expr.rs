// Compiles formula strings such as `perlin(x, y, 2^(N/2)) * 0.5` once into a
// flat postfix program and runs it for many variable bindings.
//
// Grammar, loosest binding first:
//
//   sum     := product (('+' | '-') product)*
//   product := unary (('*' | '/') unary)*
//   unary   := ('-' | '+') unary | power
//   power   := primary ('^' unary)?
//   primary := number | '(' sum ')' | ident | ident '(' [sum (',' sum)*] ')'
//
// `^` is right-associative and binds tighter than unary minus, so
// `-2^2 == -4` and `2^-1 == 0.5`.

use std::ops::Range;

use crate::NoiseGenerator;
use crate::error::ParseError;
use crate::lexer::{Token, TokenKind, tokenize};
use crate::noise::PerlinNoise;
use crate::primitives::Primitive;

// Deepest chain of parentheses, signs, powers and calls the parser descends into
const MAX_NESTING: usize = 64;
// Size of the evaluation value stack; programs needing more are refused
const MAX_STACK: usize = 64;


// Plain math builtins available next to the terrain primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFn {
    Abs,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Exp,
    Log,
    Floor,
    Ceil,
    Min,
    Max,
}

impl MathFn {
    const ALL: [MathFn; 11] = [
        MathFn::Abs,
        MathFn::Sqrt,
        MathFn::Sin,
        MathFn::Cos,
        MathFn::Tan,
        MathFn::Exp,
        MathFn::Log,
        MathFn::Floor,
        MathFn::Ceil,
        MathFn::Min,
        MathFn::Max,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            MathFn::Abs => "abs",
            MathFn::Sqrt => "sqrt",
            MathFn::Sin => "sin",
            MathFn::Cos => "cos",
            MathFn::Tan => "tan",
            MathFn::Exp => "exp",
            MathFn::Log => "log",
            MathFn::Floor => "floor",
            MathFn::Ceil => "ceil",
            MathFn::Min => "min",
            MathFn::Max => "max",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            MathFn::Min | MathFn::Max => 2,
            _ => 1,
        }
    }

    fn apply(self, args: &[f64]) -> f64 {
        match self {
            MathFn::Abs => args[0].abs(),
            MathFn::Sqrt => args[0].sqrt(),
            MathFn::Sin => args[0].sin(),
            MathFn::Cos => args[0].cos(),
            MathFn::Tan => args[0].tan(),
            MathFn::Exp => args[0].exp(),
            MathFn::Log => args[0].ln(),
            MathFn::Floor => args[0].floor(),
            MathFn::Ceil => args[0].ceil(),
            MathFn::Min => args[0].min(args[1]),
            MathFn::Max => args[0].max(args[1]),
        }
    }
}

// Every name callable from an expression, resolved at compile time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Primitive(Primitive),
    Math(MathFn),
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        Primitive::from_name(name)
            .map(Function::Primitive)
            .or_else(|| MathFn::from_name(name).map(Function::Math))
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::Primitive(p) => p.name(),
            Function::Math(m) => m.name(),
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Function::Primitive(p) => p.arity(),
            Function::Math(m) => m.arity(),
        }
    }

    fn uses_noise(self) -> bool {
        matches!(self, Function::Primitive(p) if p.uses_noise())
    }

    // Value without touching the noise generator, None when noise is needed
    fn fold(self, args: &[f64]) -> Option<f64> {
        match self {
            Function::Primitive(p) => p.shape(args),
            Function::Math(m) => Some(m.apply(args)),
        }
    }

    fn call(self, noise: &dyn NoiseGenerator, args: &[f64]) -> f64 {
        match self {
            Function::Primitive(p) => p.apply(noise, args),
            Function::Math(m) => m.apply(args),
        }
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinOp {
    #[inline]
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => a / b,
            BinOp::Pow => a.powf(b),
        }
    }
}

// One postfix instruction. Operands are popped from the value stack,
// the result is pushed back.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Const(f64),
    Var(usize),
    Neg,
    Binary(BinOp),
    Call(Function),
}

// A parsed, validated and constant-folded expression
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpr {
    source: String,
    variables: usize,
    code: Vec<Op>,
}

impl CompiledExpr {
    pub fn source(&self) -> &str {
        &self.source
    }

    // Number of values `Evaluator::evaluate` expects
    pub fn variable_count(&self) -> usize {
        self.variables
    }

    pub fn instruction_count(&self) -> usize {
        self.code.len()
    }

    // Folded value when the expression depends on no variable and no noise
    pub fn constant(&self) -> Option<f64> {
        match self.code.as_slice() {
            [Op::Const(v)] => Some(*v),
            _ => None,
        }
    }

    pub fn uses_noise(&self) -> bool {
        self.code
            .iter()
            .any(|op| matches!(op, Op::Call(f) if f.uses_noise()))
    }
}

// Compile `src`, binding identifiers in `variables` by position
pub fn compile(src: &str, variables: &[&str]) -> Result<CompiledExpr, ParseError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens: &tokens,
        idx: 0,
        variables,
        code: Vec::new(),
        height: 0,
        nesting: 0,
    };
    parser.parse_sum()?;
    parser.expect(TokenKind::Eof, "end of input")?;

    Ok(CompiledExpr {
        source: src.to_string(),
        variables: variables.len(),
        code: parser.code,
    })
}

// Recursive descent that emits postfix code as it goes. Constant operands are
// folded at emission time, so a fully constant subexpression always ends up
// as a single `Op::Const`.
struct Parser<'a> {
    tokens: &'a [Token],
    idx: usize,
    variables: &'a [&'a str],
    code: Vec<Op>,
    // values on the stack after running `code`
    height: usize,
    nesting: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &'a Token {
        // tokenize always terminates the stream with Eof
        &self.tokens[self.idx.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> &'a Token {
        let tok = self.peek();
        if tok.kind != TokenKind::Eof {
            self.idx += 1;
        }
        tok
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> Result<&'a Token, ParseError> {
        let tok = self.peek();
        if tok.kind == kind {
            Ok(self.advance())
        } else {
            Err(ParseError::UnexpectedToken {
                expected,
                found: tok.kind.describe(),
                pos: tok.pos,
            })
        }
    }

    fn constant_in(&self, range: Range<usize>) -> Option<f64> {
        match &self.code[range] {
            [Op::Const(v)] => Some(*v),
            _ => None,
        }
    }

    fn push_value(&mut self, op: Op, pos: usize) -> Result<(), ParseError> {
        if self.height == MAX_STACK {
            return Err(ParseError::TooDeep {
                limit: MAX_STACK,
                pos,
            });
        }
        self.height += 1;
        self.code.push(op);
        Ok(())
    }

    // Operand is `code[start..]`
    fn emit_neg(&mut self, start: usize) {
        match self.constant_in(start..self.code.len()) {
            Some(v) => self.code[start] = Op::Const(-v),
            None => self.code.push(Op::Neg),
        }
    }

    // Left operand is `code[left..right]`, right operand `code[right..]`
    fn emit_binary(&mut self, op: BinOp, left: usize, right: usize) {
        self.height -= 1;
        let lhs = self.constant_in(left..right);
        let rhs = self.constant_in(right..self.code.len());
        match (lhs, rhs) {
            (Some(a), Some(b)) => {
                self.code.truncate(left);
                self.code.push(Op::Const(op.apply(a, b)));
            }
            _ => self.code.push(Op::Binary(op)),
        }
    }

    // `starts` holds the first instruction of every argument; arity is checked
    fn emit_call(&mut self, func: Function, starts: &[usize], args: &[Option<f64>]) {
        self.height -= func.arity() - 1;
        let folded = args
            .iter()
            .copied()
            .collect::<Option<Vec<f64>>>()
            .and_then(|values| func.fold(&values));
        match (folded, starts.first()) {
            (Some(v), Some(&start)) => {
                self.code.truncate(start);
                self.code.push(Op::Const(v));
            }
            _ => self.code.push(Op::Call(func)),
        }
    }

    fn parse_sum(&mut self) -> Result<(), ParseError> {
        let start = self.code.len();
        self.parse_product()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => return Ok(()),
            };
            self.advance();
            let right = self.code.len();
            self.parse_product()?;
            self.emit_binary(op, start, right);
        }
    }

    fn parse_product(&mut self) -> Result<(), ParseError> {
        let start = self.code.len();
        self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                _ => return Ok(()),
            };
            self.advance();
            let right = self.code.len();
            self.parse_unary()?;
            self.emit_binary(op, start, right);
        }
    }

    // Every recursive path of the grammar passes through here
    fn parse_unary(&mut self) -> Result<(), ParseError> {
        if self.nesting == MAX_NESTING {
            return Err(ParseError::TooDeep {
                limit: MAX_NESTING,
                pos: self.peek().pos,
            });
        }
        self.nesting += 1;
        let result = match self.peek().kind {
            TokenKind::Minus => {
                self.advance();
                let start = self.code.len();
                self.parse_unary().map(|()| self.emit_neg(start))
            }
            TokenKind::Plus => {
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_power(),
        };
        self.nesting -= 1;
        result
    }

    fn parse_power(&mut self) -> Result<(), ParseError> {
        let start = self.code.len();
        self.parse_primary()?;
        if self.peek().kind == TokenKind::Caret {
            self.advance();
            let right = self.code.len();
            self.parse_unary()?;
            self.emit_binary(BinOp::Pow, start, right);
        }
        Ok(())
    }

    fn parse_primary(&mut self) -> Result<(), ParseError> {
        let tok = self.advance();
        match &tok.kind {
            TokenKind::Number(v) => self.push_value(Op::Const(*v), tok.pos),
            TokenKind::LParen => {
                self.parse_sum()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(())
            }
            TokenKind::Ident(name) if self.peek().kind == TokenKind::LParen => {
                self.parse_call(name, tok.pos)
            }
            TokenKind::Ident(name) => {
                let index = self
                    .variables
                    .iter()
                    .position(|v| *v == name.as_str())
                    .ok_or_else(|| ParseError::UnknownIdentifier {
                        name: name.clone(),
                        pos: tok.pos,
                    })?;
                self.push_value(Op::Var(index), tok.pos)
            }
            other => Err(ParseError::UnexpectedToken {
                expected: "number, variable, function or '('",
                found: other.describe(),
                pos: tok.pos,
            }),
        }
    }

    fn parse_call(&mut self, name: &str, pos: usize) -> Result<(), ParseError> {
        let func = Function::from_name(name).ok_or_else(|| ParseError::UnknownIdentifier {
            name: name.to_string(),
            pos,
        })?;
        self.expect(TokenKind::LParen, "'('")?;

        let mut starts = Vec::new();
        if self.peek().kind != TokenKind::RParen {
            loop {
                starts.push(self.code.len());
                self.parse_sum()?;
                if self.peek().kind == TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "',' or ')'")?;

        if starts.len() != func.arity() {
            return Err(ParseError::Arity {
                name: func.name(),
                expected: func.arity(),
                found: starts.len(),
                pos,
            });
        }
        let ends = starts.iter().skip(1).copied().chain([self.code.len()]);
        let args: Vec<Option<f64>> = starts
            .iter()
            .zip(ends)
            .map(|(&start, end)| self.constant_in(start..end))
            .collect();
        check_arguments(func, &args, pos)?;
        self.emit_call(func, &starts, &args);
        Ok(())
    }
}

// Literal parameters that would make a primitive undefined are rejected here,
// so evaluation never has to report them.
fn check_arguments(func: Function, args: &[Option<f64>], pos: usize) -> Result<(), ParseError> {
    if let Function::Primitive(Primitive::Normal) = func {
        for arg in [2, 3] {
            if let Some(value) = args[arg] {
                if !(value > 0.0 && value.is_finite()) {
                    return Err(ParseError::InvalidArgument {
                        name: func.name(),
                        arg: arg + 1,
                        value,
                        pos,
                    });
                }
            }
        }
    }
    Ok(())
}

// Per-terrain evaluation state. Immutable once built, so one instance can be
// shared by every thread evaluating grid cells.
#[derive(Clone)]
pub struct Evaluator {
    noise: PerlinNoise,
}

impl Evaluator {
    pub fn new(seed: i64) -> Self {
        Self {
            noise: PerlinNoise::new(seed),
        }
    }

    pub fn seed(&self) -> i64 {
        self.noise.seed()
    }

    // `values` are bound in the order the variables were given to `compile`.
    // Panics if `values` is shorter than `expr.variable_count()`.
    pub fn evaluate(&self, expr: &CompiledExpr, values: &[f64]) -> f64 {
        // compile keeps every program within MAX_STACK values
        let mut stack = [0.0f64; MAX_STACK];
        let mut sp = 0;
        for op in &expr.code {
            match *op {
                Op::Const(v) => {
                    stack[sp] = v;
                    sp += 1;
                }
                Op::Var(i) => {
                    stack[sp] = values[i];
                    sp += 1;
                }
                Op::Neg => stack[sp - 1] = -stack[sp - 1],
                Op::Binary(op) => {
                    sp -= 1;
                    stack[sp - 1] = op.apply(stack[sp - 1], stack[sp]);
                }
                Op::Call(func) => {
                    let base = sp - func.arity();
                    let v = func.call(&self.noise, &stack[base..sp]);
                    stack[base] = v;
                    sp = base + 1;
                }
            }
        }
        stack[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XYN: [&str; 3] = ["x", "y", "N"];

    fn eval(src: &str, values: [f64; 3]) -> f64 {
        let expr = compile(src, &XYN).unwrap();
        Evaluator::new(1).evaluate(&expr, &values)
    }

    #[test]
    fn arithmetic_precedence() {
        assert_eq!(eval("1 + 2 * 3", [0.0; 3]), 7.0);
        assert_eq!(eval("(1 + 2) * 3", [0.0; 3]), 9.0);
        assert_eq!(eval("8 / 4 / 2", [0.0; 3]), 1.0);
        assert_eq!(eval("10 - 4 - 3", [0.0; 3]), 3.0);
    }

    #[test]
    fn power_is_right_associative_and_tighter_than_minus() {
        assert_eq!(eval("2^3^2", [0.0; 3]), 512.0);
        assert_eq!(eval("-2^2", [0.0; 3]), -4.0);
        assert_eq!(eval("2^-1", [0.0; 3]), 0.5);
    }

    #[test]
    fn variables_bind_by_position() {
        assert_eq!(eval("x * 100 + y * 10 + N", [1.0, 2.0, 3.0]), 123.0);
        assert_eq!(eval("2^(N/2)", [0.0, 0.0, 4.0]), 4.0);
    }

    #[test]
    fn primitives_and_math_calls() {
        assert_eq!(eval("plane(x, y, 0.5, 0.5, 0.5)", [0.3, -0.7, 0.0]), 0.5);
        assert_eq!(eval("max(x, y) + abs(-2)", [1.0, 4.0, 0.0]), 6.0);
        let p = eval("pyramid(x, y, 0, 0, 0, 0, 0.5, -0.3, 1)", [0.5, -0.3, 0.0]);
        assert!((p - 1.0).abs() < 1e-9);
    }

    #[test]
    fn constant_subtrees_are_folded() {
        let expr = compile("plane(0, 0, 1, 1, 1) * 2^3 - normal(0, 0, 1, 1)", &XYN).unwrap();
        assert_eq!(expr.constant(), Some(7.0));
        assert!(!expr.uses_noise());

        let noisy = compile("perlin(0.1, 0.2, 3)", &XYN).unwrap();
        assert_eq!(noisy.constant(), None);
        assert!(noisy.uses_noise());
    }

    #[test]
    fn folding_shrinks_the_program() {
        let expr = compile("x * (2 + 3) - -(1)", &XYN).unwrap();
        // x 5 * -1 -
        assert_eq!(expr.instruction_count(), 5);
        assert_eq!(expr.source(), "x * (2 + 3) - -(1)");
        assert_eq!(Evaluator::new(0).evaluate(&expr, &[2.0, 0.0, 0.0]), 11.0);
    }

    #[test]
    fn long_flat_sum_evaluates() {
        let src = format!("x{}", "+x".repeat(10_000));
        let expr = compile(&src, &XYN).unwrap();
        assert_eq!(Evaluator::new(0).evaluate(&expr, &[0.5, 0.0, 0.0]), 5000.5);
    }

    #[test]
    fn deep_nesting_is_refused() {
        let src = format!("{}x{}", "(".repeat(10_000), ")".repeat(10_000));
        assert_eq!(
            compile(&src, &XYN),
            Err(ParseError::TooDeep { limit: 64, pos: 64 })
        );
        let signs = format!("{}1", "-".repeat(10_000));
        assert!(matches!(
            compile(&signs, &XYN),
            Err(ParseError::TooDeep { .. })
        ));
        // just under the limit
        let ok = format!("{}x{}", "(".repeat(60), ")".repeat(60));
        assert!(compile(&ok, &XYN).is_ok());
    }

    #[test]
    fn value_stack_limit_is_reported() {
        let mut src = String::from("x");
        for _ in 0..10 {
            src = format!("pyramid(x, y, 0, 0, 0, 0, 0, 0, {src})");
        }
        assert!(matches!(
            compile(&src, &XYN),
            Err(ParseError::TooDeep { limit: 64, .. })
        ));
    }

    #[test]
    fn perlin_depends_on_seed_only() {
        let expr = compile("perlin(x, y, 4)", &XYN).unwrap();
        let a = Evaluator::new(7).evaluate(&expr, &[0.13, -0.41, 0.0]);
        let b = Evaluator::new(7).evaluate(&expr, &[0.13, -0.41, 0.0]);
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert_eq!(
            compile("z + 1", &XYN),
            Err(ParseError::UnknownIdentifier {
                name: "z".into(),
                pos: 0
            })
        );
        assert!(matches!(
            compile("x + ridge(x, y)", &XYN),
            Err(ParseError::UnknownIdentifier { pos: 4, .. })
        ));
    }

    #[test]
    fn arity_is_checked() {
        assert_eq!(
            compile("plane(x, y, 1)", &XYN),
            Err(ParseError::Arity {
                name: "plane",
                expected: 5,
                found: 3,
                pos: 0
            })
        );
        assert!(matches!(
            compile("perlin()", &XYN),
            Err(ParseError::Arity { found: 0, .. })
        ));
    }

    #[test]
    fn literal_zero_sigma_is_rejected() {
        assert!(matches!(
            compile("normal(x, y, 0, 1)", &XYN),
            Err(ParseError::InvalidArgument { arg: 3, .. })
        ));
        assert!(matches!(
            compile("normal(x, y, 1, -0.5)", &XYN),
            Err(ParseError::InvalidArgument { arg: 4, .. })
        ));
        // sigma computed from a variable is allowed; the primitive stays total
        assert!(compile("normal(x, y, N, 1)", &XYN).is_ok());
    }

    #[test]
    fn syntax_errors() {
        assert!(matches!(
            compile("1 +", &XYN),
            Err(ParseError::UnexpectedToken { pos: 3, .. })
        ));
        assert!(matches!(
            compile("(x + 1", &XYN),
            Err(ParseError::UnexpectedToken { pos: 6, .. })
        ));
        assert!(matches!(
            compile("x y", &XYN),
            Err(ParseError::UnexpectedToken { pos: 2, .. })
        ));
        assert!(matches!(
            compile("max(x,)", &XYN),
            Err(ParseError::UnexpectedToken { pos: 6, .. })
        ));
    }
}
