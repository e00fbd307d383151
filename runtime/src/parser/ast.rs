//! AST produced by the recursive-descent parser. Every statement node
//! carries the source line that introduced it; the compiler turns those
//! into LINE markers.

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub declarations: Vec<TypeDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeDecl {
    Class(ClassDecl),
    Interface(InterfaceDecl),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<MethodDecl>,
    pub is_abstract: bool,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDecl {
    pub name: String,
    pub extends: Vec<String>,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<MethodDecl>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeNode,
    pub init: Option<Expr>,
    pub is_static: bool,
    pub is_final: bool,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: TypeNode,
    pub body: Option<Vec<Stmt>>,
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_default: bool,
    pub is_constructor: bool,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeNode,
}

/// A source-level type reference. Generic arguments are kept only so the
/// display name can be reconstructed; a wildcard is a `TypeNode` named `?`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeNode {
    pub name: String,
    pub args: Vec<TypeNode>,
    pub dims: u8,
}

impl TypeNode {
    pub fn simple(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            dims: 0,
        }
    }

    pub fn display_name(&self) -> String {
        let mut out = self.name.clone();
        if !self.args.is_empty() {
            let inner: Vec<String> = self.args.iter().map(|a| a.display_name()).collect();
            out.push('<');
            out.push_str(&inner.join(", "));
            out.push('>');
        }
        for _ in 0..self.dims {
            out.push_str("[]");
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub ty: TypeNode,
    pub name: String,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Block(Vec<Stmt>),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        line: u32,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
        line: u32,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
        line: u32,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
        line: u32,
    },
    ForEach {
        var_ty: TypeNode,
        var_name: String,
        iterable: Expr,
        body: Box<Stmt>,
        line: u32,
    },
    Return {
        value: Option<Expr>,
        line: u32,
    },
    Break {
        line: u32,
    },
    Continue {
        line: u32,
    },
    Throw {
        value: Expr,
        line: u32,
    },
    Try {
        body: Vec<Stmt>,
        catches: Vec<CatchClause>,
        finally: Option<Vec<Stmt>>,
        line: u32,
    },
    // the lock expression is consumed and discarded at parse time
    Synchronized {
        body: Vec<Stmt>,
        line: u32,
    },
    VarDecl {
        ty: TypeNode,
        name: String,
        init: Option<Expr>,
        line: u32,
    },
    Expr {
        expr: Expr,
        line: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LambdaBody {
    Expr(Box<Expr>),
    Block(Vec<Stmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntLit(i64),
    FloatLit(f64),
    StringLit(String),
    CharLit(char),
    BoolLit(bool),
    NullLit,
    Name(String),
    This,
    Super,
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    PreIncDec {
        inc: bool,
        target: Box<Expr>,
    },
    PostIncDec {
        inc: bool,
        target: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then_value: Box<Expr>,
        else_value: Box<Expr>,
    },
    Call {
        receiver: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
    },
    New {
        class: String,
        args: Vec<Expr>,
    },
    NewArray {
        elem: TypeNode,
        dims: Vec<Expr>,
        init: Option<Vec<Expr>>,
    },
    // bare `{a, b}` initialiser in a variable declaration
    ArrayLiteral(Vec<Expr>),
    FieldAccess {
        object: Box<Expr>,
        name: String,
    },
    Index {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    Cast {
        ty: TypeNode,
        expr: Box<Expr>,
    },
    InstanceOf {
        expr: Box<Expr>,
        ty: TypeNode,
    },
    Lambda {
        params: Vec<String>,
        body: LambdaBody,
    },
    MethodRef {
        target: String,
        name: String,
    },
}
