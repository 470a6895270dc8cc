use serde::{Deserialize, Serialize};
use std::fmt;

/// Synthesized template program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Top-level statements in the program
    pub statements: Vec<Statement>,
}

/// Statements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    /// Expression statement
    Expression(Expression),

    /// Variable declaration: `int i = 0;`
    Declaration {
        /// Name of the declared variable
        name: String,
        /// Optional initializer
        value: Option<Expression>,
    },

    /// Braced block with its own scope
    Block(Vec<Statement>),

    /// If statement
    If {
        /// Condition expression to evaluate
        condition: Expression,
        /// Statement to execute if condition is true
        then_branch: Box<Statement>,
        /// Optional statement to execute if condition is false
        else_branch: Option<Box<Statement>>,
    },

    /// While loop
    While {
        /// Loop condition expression
        condition: Expression,
        /// Loop body
        body: Box<Statement>,
    },

    /// C-style for loop: `for (init; cond; step) body`
    For {
        /// Initializer, run once in the loop scope
        init: Option<Box<Statement>>,
        /// Loop condition; absent means always true
        condition: Option<Expression>,
        /// Step expression run after each iteration
        step: Option<Expression>,
        /// Loop body
        body: Box<Statement>,
    },

    /// Break statement
    Break,

    /// Continue statement
    Continue,

    /// Lone `;`
    Empty,
}

/// Expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    // Literals
    /// Integer literal expression
    IntLiteral(i64),
    /// Floating-point literal expression
    FloatLiteral(f64),
    /// String literal expression
    StringLiteral(String),
    /// Boolean literal expression
    BoolLiteral(bool),

    /// Variable reference
    Variable(String),

    /// Binary operation
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expression>,
        /// Right operand
        right: Box<Expression>,
    },

    /// Unary operation
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<Expression>,
    },

    /// Assignment, plain or compound
    Assign {
        /// Target variable
        name: String,
        /// `None` for `=`, otherwise the operator of `op=`
        op: Option<BinaryOp>,
        /// Assigned value
        value: Box<Expression>,
    },

    /// `++x`, `x++`, `--x`, `x--`
    Increment {
        /// Target variable
        name: String,
        /// +1 or -1
        delta: i64,
        /// Prefix form yields the updated value
        prefix: bool,
    },

    /// `cond ? a : b`
    Ternary {
        /// Condition
        condition: Box<Expression>,
        /// Value when true
        then_expr: Box<Expression>,
        /// Value when false
        else_expr: Box<Expression>,
    },

    /// Builtin call
    Call {
        /// Function name
        name: String,
        /// Arguments
        args: Vec<Expression>,
    },
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `&&`
    And,
    /// `||`
    Or,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// `-`
    Neg,
    /// `!`
    Not,
    /// `~`
    BitNot,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        };
        write!(f, "{}", s)
    }
}
