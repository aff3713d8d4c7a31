// File: src/ast.rs
//
// Syntax tree produced by the parser and consumed by the compiler.
// Node variants are the interface contract
// between the two out-of-scope/in-scope halves of the pipeline.

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Let { name: String, value: Expr },
    Return(Option<Expr>),
    Expr(Expr),
}

pub type Block = Vec<Statement>;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ident(String),
    IntegerLiteral(i64),
    StringLiteral(String),
    Boolean(bool),
    Prefix {
        op: String,
        right: Box<Expr>,
    },
    Infix {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    If {
        cond: Box<Expr>,
        cons: Block,
        alt: Option<Block>,
    },
    FunctionLiteral {
        params: Vec<String>,
        body: Block,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    ArrayLiteral(Vec<Expr>),
    HashLiteral(Vec<(Expr, Expr)>),
    Index {
        left: Box<Expr>,
        index: Box<Expr>,
    },
}

/// A deterministic textual rendering used only to sort hash-literal keys
/// before compilation; not a general pretty-printer.
pub fn sort_key(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => format!("ident:{name}"),
        Expr::IntegerLiteral(i) => format!("int:{i}"),
        Expr::StringLiteral(s) => format!("str:{s}"),
        Expr::Boolean(b) => format!("bool:{b}"),
        Expr::Prefix { op, right } => format!("prefix:{op}{}", sort_key(right)),
        Expr::Infix { op, left, right } => {
            format!("infix:{}{op}{}", sort_key(left), sort_key(right))
        }
        Expr::If { .. } => "if".to_string(),
        Expr::FunctionLiteral { .. } => "fn".to_string(),
        Expr::Call { func, args } => {
            format!("call:{}({})", sort_key(func), args.iter().map(sort_key).collect::<Vec<_>>().join(","))
        }
        Expr::ArrayLiteral(elems) => {
            format!("[{}]", elems.iter().map(sort_key).collect::<Vec<_>>().join(","))
        }
        Expr::HashLiteral(pairs) => {
            format!(
                "{{{}}}",
                pairs.iter().map(|(k, v)| format!("{}:{}", sort_key(k), sort_key(v))).collect::<Vec<_>>().join(",")
            )
        }
        Expr::Index { left, index } => format!("{}[{}]", sort_key(left), sort_key(index)),
    }
}
