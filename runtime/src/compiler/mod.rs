use crate::compiler::code::{Instruction, Op};
use crate::parser::ast::*;
use crate::vm::Value;
use std::collections::HashMap;

pub mod code;

/// The classes whose member calls compile to `INVOKE_STATIC` with an
/// explicit class operand. Thread rides along for its static surface
/// (sleep, currentThread, interrupted, yield).
const STATIC_UTILITY_CLASSES: &[&str] = &[
    "Math",
    "Integer",
    "Long",
    "Double",
    "Float",
    "Character",
    "String",
    "Collections",
    "Arrays",
    "System",
    "Objects",
    "Boolean",
    "Byte",
    "Short",
    "Thread",
];

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledProgram {
    pub classes: Vec<CompiledClass>,
    pub main_class: String,
    pub main_method: String,
    pub instructions: Vec<Instruction>,
    pub method_offsets: HashMap<String, usize>,
}

impl CompiledProgram {
    pub fn find_class(&self, name: &str) -> Option<&CompiledClass> {
        self.classes.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledClass {
    pub name: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub is_interface: bool,
    pub is_abstract: bool,
    pub fields: Vec<CompiledField>,
    pub methods: Vec<CompiledMethod>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledField {
    pub name: String,
    pub ty: String,
    pub is_static: bool,
    pub is_final: bool,
    /// Literal initialiser, evaluated at load time for statics.
    pub initial: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledMethod {
    pub name: String,
    pub signature: String,
    pub params: Vec<CompiledParam>,
    pub return_type: String,
    pub is_static: bool,
    pub is_abstract: bool,
    /// Global index of the first instruction; None for bodiless methods.
    pub offset: Option<usize>,
    pub locals: Vec<LocalSlot>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledParam {
    pub name: String,
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalSlot {
    pub name: String,
    pub ty: String,
    pub slot: usize,
}

/// AST to bytecode. The compiler is total: every parse-accepted program
/// compiles; unresolved names degrade to null pushes and no-op calls.
pub struct Compiler;

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self
    }

    pub fn compile(&self, program: &Program) -> CompiledProgram {
        let ctx = ProgramContext::new(program);
        let mut instructions = Vec::new();
        let mut method_offsets = HashMap::new();
        let mut classes = Vec::new();

        for decl in &program.declarations {
            let compiled = match decl {
                TypeDecl::Class(class) => {
                    self.compile_class(&ctx, class, &mut instructions, &mut method_offsets)
                }
                TypeDecl::Interface(interface) => self.compile_interface(
                    &ctx,
                    interface,
                    &mut instructions,
                    &mut method_offsets,
                ),
            };
            classes.push(compiled);
        }

        let main_class = classes
            .iter()
            .find(|c| c.methods.iter().any(|m| m.name == "main" && m.is_static))
            .map(|c| c.name.clone())
            .unwrap_or_else(|| classes.first().map(|c| c.name.clone()).unwrap_or_default());

        CompiledProgram {
            classes,
            main_class,
            main_method: "main".to_string(),
            instructions,
            method_offsets,
        }
    }

    fn compile_class(
        &self,
        ctx: &ProgramContext<'_>,
        class: &ClassDecl,
        instructions: &mut Vec<Instruction>,
        method_offsets: &mut HashMap<String, usize>,
    ) -> CompiledClass {
        let fields: Vec<CompiledField> = class.fields.iter().map(compile_field).collect();
        let mut methods = Vec::new();

        let instance_inits: Vec<&FieldDecl> = class
            .fields
            .iter()
            .filter(|f| !f.is_static && f.init.is_some())
            .collect();
        let has_constructor = class.methods.iter().any(|m| m.is_constructor);

        for method in &class.methods {
            let preamble: &[&FieldDecl] = if method.is_constructor {
                &instance_inits
            } else {
                &[]
            };
            methods.push(self.compile_method(
                ctx,
                &class.name,
                class.super_class.as_deref(),
                method,
                preamble,
                instructions,
                method_offsets,
            ));
        }

        // field initialisers need a constructor to live in
        if !has_constructor && !instance_inits.is_empty() {
            let synthetic = MethodDecl {
                name: class.name.clone(),
                params: Vec::new(),
                return_type: TypeNode::simple("void"),
                body: Some(Vec::new()),
                is_static: false,
                is_abstract: false,
                is_default: false,
                is_constructor: true,
                line: class.line,
            };
            methods.push(self.compile_method(
                ctx,
                &class.name,
                class.super_class.as_deref(),
                &synthetic,
                &instance_inits,
                instructions,
                method_offsets,
            ));
        }

        CompiledClass {
            name: class.name.clone(),
            super_class: class.super_class.clone(),
            interfaces: class.interfaces.clone(),
            is_interface: false,
            is_abstract: class.is_abstract,
            fields,
            methods,
            line: class.line,
        }
    }

    fn compile_interface(
        &self,
        ctx: &ProgramContext<'_>,
        interface: &InterfaceDecl,
        instructions: &mut Vec<Instruction>,
        method_offsets: &mut HashMap<String, usize>,
    ) -> CompiledClass {
        let fields: Vec<CompiledField> = interface
            .fields
            .iter()
            .map(|f| {
                let mut compiled = compile_field(f);
                // interface constants are implicitly static
                compiled.is_static = true;
                compiled
            })
            .collect();

        let mut methods = Vec::new();
        for method in &interface.methods {
            methods.push(self.compile_method(
                ctx,
                &interface.name,
                None,
                method,
                &[],
                instructions,
                method_offsets,
            ));
        }

        CompiledClass {
            name: interface.name.clone(),
            super_class: None,
            interfaces: interface.extends.clone(),
            is_interface: true,
            is_abstract: true,
            fields,
            methods,
            line: interface.line,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn compile_method(
        &self,
        ctx: &ProgramContext<'_>,
        class_name: &str,
        super_class: Option<&str>,
        method: &MethodDecl,
        field_inits: &[&FieldDecl],
        instructions: &mut Vec<Instruction>,
        method_offsets: &mut HashMap<String, usize>,
    ) -> CompiledMethod {
        let name = if method.is_constructor {
            "<init>".to_string()
        } else {
            method.name.clone()
        };
        let signature = format!(
            "{}({})",
            name,
            method
                .params
                .iter()
                .map(|p| p.ty.display_name())
                .collect::<Vec<_>>()
                .join(",")
        );

        let Some(body) = &method.body else {
            return CompiledMethod {
                name,
                signature,
                params: compile_params(&method.params),
                return_type: method.return_type.display_name(),
                is_static: method.is_static,
                is_abstract: true,
                offset: None,
                locals: Vec::new(),
                line: method.line,
            };
        };

        let mut mc = MethodCompiler::new(ctx, class_name, super_class, method);
        mc.emit(Op::Line(method.line));
        for field in field_inits {
            mc.line = field.line;
            mc.emit(Op::Line(field.line));
            mc.emit(Op::LoadLocal {
                slot: 0,
                name: "this".to_string(),
            });
            mc.compile_initialiser(field.init.as_ref().expect("filtered"), &field.ty);
            mc.emit(Op::PutField {
                name: field.name.clone(),
            });
        }
        for stmt in body {
            mc.compile_stmt(stmt);
        }
        // every method body falls off its end into a RETURN
        if !matches!(
            mc.code.last().map(|i| &i.op),
            Some(Op::Return) | Some(Op::ReturnValue)
        ) {
            mc.emit(Op::Return);
        }

        let start = instructions.len();
        let MethodCompiler { code, labels, locals, .. } = mc;
        for mut instruction in code {
            instruction
                .op
                .retarget(|label| labels[label].unwrap_or(0) + start);
            instructions.push(instruction);
        }

        method_offsets.insert(format!("{}.{}", class_name, signature), start);

        CompiledMethod {
            name,
            signature,
            params: compile_params(&method.params),
            return_type: method.return_type.display_name(),
            is_static: method.is_static,
            is_abstract: false,
            offset: Some(start),
            locals,
            line: method.line,
        }
    }
}

fn compile_params(params: &[Param]) -> Vec<CompiledParam> {
    params
        .iter()
        .map(|p| CompiledParam {
            name: p.name.clone(),
            ty: p.ty.display_name(),
        })
        .collect()
}

fn compile_field(field: &FieldDecl) -> CompiledField {
    CompiledField {
        name: field.name.clone(),
        ty: field.ty.display_name(),
        is_static: field.is_static,
        is_final: field.is_final,
        initial: field.init.as_ref().and_then(literal_value),
    }
}

/// Literal initialisers that can be evaluated at load time.
fn literal_value(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::IntLit(n) => Some(Value::Int(*n)),
        Expr::FloatLit(x) => Some(Value::Double(*x)),
        Expr::StringLit(s) => Some(Value::Str(s.clone())),
        Expr::CharLit(c) => Some(Value::Char(*c)),
        Expr::BoolLit(b) => Some(Value::Bool(*b)),
        Expr::NullLit => Some(Value::Null),
        Expr::Unary {
            op: UnaryOp::Neg,
            operand,
        } => match literal_value(operand)? {
            Value::Int(n) => Some(Value::Int(-n)),
            Value::Double(x) => Some(Value::Double(-x)),
            _ => None,
        },
        _ => None,
    }
}

struct ProgramContext<'a> {
    classes: HashMap<&'a str, &'a ClassDecl>,
    interfaces: HashMap<&'a str, &'a InterfaceDecl>,
}

struct FieldSite {
    owner: String,
    is_static: bool,
}

impl<'a> ProgramContext<'a> {
    fn new(program: &'a Program) -> Self {
        let mut classes = HashMap::new();
        let mut interfaces = HashMap::new();
        for decl in &program.declarations {
            match decl {
                TypeDecl::Class(c) => {
                    classes.insert(c.name.as_str(), c);
                }
                TypeDecl::Interface(i) => {
                    interfaces.insert(i.name.as_str(), i);
                }
            }
        }
        Self {
            classes,
            interfaces,
        }
    }

    fn has_type(&self, name: &str) -> bool {
        self.classes.contains_key(name) || self.interfaces.contains_key(name)
    }

    /// Walks the superclass chain looking for a declared field.
    fn resolve_field(&self, class: &str, field: &str) -> Option<FieldSite> {
        let mut cursor = Some(class);
        while let Some(name) = cursor {
            if let Some(decl) = self.classes.get(name) {
                if let Some(f) = decl.fields.iter().find(|f| f.name == field) {
                    return Some(FieldSite {
                        owner: name.to_string(),
                        is_static: f.is_static,
                    });
                }
                cursor = decl.super_class.as_deref();
            } else {
                break;
            }
        }
        // interface constants
        if let Some(decl) = self.interfaces.get(class) {
            if decl.fields.iter().any(|f| f.name == field) {
                return Some(FieldSite {
                    owner: class.to_string(),
                    is_static: true,
                });
            }
        }
        None
    }

    /// Walks the superclass chain looking for a method's staticness.
    fn resolve_method(&self, class: &str, method: &str) -> Option<(String, bool)> {
        let mut cursor = Some(class);
        while let Some(name) = cursor {
            if let Some(decl) = self.classes.get(name) {
                if let Some(m) = decl
                    .methods
                    .iter()
                    .find(|m| m.name == method && !m.is_constructor)
                {
                    return Some((name.to_string(), m.is_static));
                }
                cursor = decl.super_class.as_deref();
            } else {
                break;
            }
        }
        None
    }
}

struct LoopLabels {
    brk: usize,
    cont: usize,
}

struct MethodCompiler<'a> {
    ctx: &'a ProgramContext<'a>,
    class_name: &'a str,
    super_class: Option<&'a str>,
    is_static: bool,
    code: Vec<Instruction>,
    labels: Vec<Option<usize>>,
    locals: Vec<LocalSlot>,
    bindings: HashMap<String, usize>,
    loops: Vec<LoopLabels>,
    line: u32,
}

impl<'a> MethodCompiler<'a> {
    fn new(
        ctx: &'a ProgramContext<'a>,
        class_name: &'a str,
        super_class: Option<&'a str>,
        method: &MethodDecl,
    ) -> Self {
        let mut mc = Self {
            ctx,
            class_name,
            super_class,
            is_static: method.is_static,
            code: Vec::new(),
            labels: Vec::new(),
            locals: Vec::new(),
            bindings: HashMap::new(),
            loops: Vec::new(),
            line: method.line,
        };
        if !method.is_static {
            mc.alloc_local("this", class_name);
        }
        for param in &method.params {
            mc.alloc_local(&param.name, &param.ty.display_name());
        }
        mc
    }

    // ---- emission helpers ----

    fn emit(&mut self, op: Op) {
        self.code.push(Instruction::new(op, self.line));
    }

    fn new_label(&mut self) -> usize {
        self.labels.push(None);
        self.labels.len() - 1
    }

    fn mark_label(&mut self, label: usize) {
        self.labels[label] = Some(self.code.len());
    }

    /// Slots are dense and never reclaimed; shadowing rebinds the name to
    /// a fresh slot.
    fn alloc_local(&mut self, name: &str, ty: &str) -> usize {
        let slot = self.locals.len();
        self.locals.push(LocalSlot {
            name: name.to_string(),
            ty: ty.to_string(),
            slot,
        });
        self.bindings.insert(name.to_string(), slot);
        slot
    }

    /// One synthetic slot per method, shared by every array-element
    /// assignment in it.
    fn scratch_local(&mut self) -> usize {
        match self.bindings.get("$store") {
            Some(&slot) => slot,
            None => self.alloc_local("$store", "Object"),
        }
    }

    fn load_local(&mut self, slot: usize) {
        let name = self.locals[slot].name.clone();
        self.emit(Op::LoadLocal { slot, name });
    }

    fn store_local(&mut self, slot: usize) {
        let name = self.locals[slot].name.clone();
        self.emit(Op::StoreLocal { slot, name });
    }

    fn load_this(&mut self) {
        if self.is_static {
            self.emit(Op::PushNull);
        } else {
            self.load_local(0);
        }
    }

    // ---- statements ----

    fn compile_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(stmts) => {
                for s in stmts {
                    self.compile_stmt(s);
                }
            }
            Stmt::VarDecl {
                ty, name, init, line,
            } => {
                self.line = *line;
                self.emit(Op::Line(*line));
                let slot = self.alloc_local(name, &ty.display_name());
                if let Some(init) = init {
                    self.compile_initialiser(init, ty);
                    self.store_local(slot);
                }
            }
            Stmt::Expr { expr, line } => {
                self.line = *line;
                self.emit(Op::Line(*line));
                self.compile_expr(expr);
                // statement boundary: drop the leftover value, if any
                self.emit(Op::Pop);
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                line,
            } => {
                self.line = *line;
                self.emit(Op::Line(*line));
                let else_label = self.new_label();
                let end_label = self.new_label();
                self.compile_expr(cond);
                self.emit(Op::IfFalse(else_label));
                self.compile_stmt(then_branch);
                self.emit(Op::Goto(end_label));
                self.mark_label(else_label);
                if let Some(else_branch) = else_branch {
                    self.compile_stmt(else_branch);
                }
                self.mark_label(end_label);
            }
            Stmt::While { cond, body, line } => {
                self.line = *line;
                let head = self.new_label();
                let end = self.new_label();
                self.mark_label(head);
                self.emit(Op::Line(*line));
                self.compile_expr(cond);
                self.emit(Op::IfFalse(end));
                self.loops.push(LoopLabels {
                    brk: end,
                    cont: head,
                });
                self.compile_stmt(body);
                self.loops.pop();
                self.emit(Op::Goto(head));
                self.mark_label(end);
            }
            // body first, then the check; continue lands on the check
            Stmt::DoWhile { body, cond, line } => {
                self.line = *line;
                let head = self.new_label();
                let check = self.new_label();
                let end = self.new_label();
                self.mark_label(head);
                self.loops.push(LoopLabels {
                    brk: end,
                    cont: check,
                });
                self.compile_stmt(body);
                self.loops.pop();
                self.mark_label(check);
                self.emit(Op::Line(*line));
                self.compile_expr(cond);
                self.emit(Op::IfTrue(head));
                self.mark_label(end);
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
                line,
            } => {
                self.line = *line;
                if let Some(init) = init {
                    self.compile_stmt(init);
                }
                let head = self.new_label();
                let cont = self.new_label();
                let end = self.new_label();
                self.mark_label(head);
                if let Some(cond) = cond {
                    self.emit(Op::Line(*line));
                    self.compile_expr(cond);
                    self.emit(Op::IfFalse(end));
                }
                self.loops.push(LoopLabels {
                    brk: end,
                    cont,
                });
                self.compile_stmt(body);
                self.loops.pop();
                self.mark_label(cont);
                if let Some(update) = update {
                    self.compile_expr(update);
                    self.emit(Op::Pop);
                }
                self.emit(Op::Goto(head));
                self.mark_label(end);
            }
            Stmt::ForEach {
                var_ty,
                var_name,
                iterable,
                body,
                line,
            } => {
                self.line = *line;
                self.emit(Op::Line(*line));
                self.compile_expr(iterable);
                self.emit(Op::InvokeInterface {
                    method: "iterator".to_string(),
                    argc: 0,
                });
                let iter_slot = self.alloc_local("$iterator", "Iterator");
                self.store_local(iter_slot);

                let head = self.new_label();
                let end = self.new_label();
                self.mark_label(head);
                self.emit(Op::Line(*line));
                self.load_local(iter_slot);
                self.emit(Op::InvokeInterface {
                    method: "hasNext".to_string(),
                    argc: 0,
                });
                self.emit(Op::IfFalse(end));
                self.load_local(iter_slot);
                self.emit(Op::InvokeInterface {
                    method: "next".to_string(),
                    argc: 0,
                });
                let var_slot = self.alloc_local(var_name, &var_ty.display_name());
                self.store_local(var_slot);

                self.loops.push(LoopLabels {
                    brk: end,
                    cont: head,
                });
                self.compile_stmt(body);
                self.loops.pop();
                self.emit(Op::Goto(head));
                self.mark_label(end);
            }
            Stmt::Return { value, line } => {
                self.line = *line;
                self.emit(Op::Line(*line));
                match value {
                    Some(value) => {
                        self.compile_expr(value);
                        self.emit(Op::ReturnValue);
                    }
                    None => self.emit(Op::Return),
                }
            }
            Stmt::Break { line } => {
                self.line = *line;
                self.emit(Op::Line(*line));
                match self.loops.last() {
                    Some(labels) => {
                        let target = labels.brk;
                        self.emit(Op::Goto(target));
                    }
                    None => self.emit(Op::Nop),
                }
            }
            Stmt::Continue { line } => {
                self.line = *line;
                self.emit(Op::Line(*line));
                match self.loops.last() {
                    Some(labels) => {
                        let target = labels.cont;
                        self.emit(Op::Goto(target));
                    }
                    None => self.emit(Op::Nop),
                }
            }
            Stmt::Throw { value, line } => {
                self.line = *line;
                self.emit(Op::Line(*line));
                self.compile_expr(value);
                self.emit(Op::Throw);
            }
            Stmt::Try {
                body,
                catches,
                finally,
                line,
            } => {
                self.line = *line;
                self.emit(Op::Line(*line));
                let after_catches = self.new_label();
                for stmt in body {
                    self.compile_stmt(stmt);
                }
                self.emit(Op::Goto(after_catches));
                // catch bodies are compiled but never entered; the jump
                // above skips straight past them
                for catch in catches {
                    self.alloc_local(&catch.name, &catch.ty.display_name());
                    for stmt in &catch.body {
                        self.compile_stmt(stmt);
                    }
                }
                self.mark_label(after_catches);
                if let Some(finally) = finally {
                    for stmt in finally {
                        self.compile_stmt(stmt);
                    }
                }
            }
            Stmt::Synchronized { body, line } => {
                // no monitor instructions for the block form
                self.line = *line;
                self.emit(Op::Line(*line));
                for stmt in body {
                    self.compile_stmt(stmt);
                }
            }
        }
    }

    fn compile_initialiser(&mut self, init: &Expr, ty: &TypeNode) {
        if let Expr::ArrayLiteral(elements) = init {
            let elem = element_type_name(ty);
            self.compile_array_with_init(&elem, elements);
        } else {
            self.compile_expr(init);
        }
    }

    // ---- expressions ----

    fn compile_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::IntLit(n) => self.emit(Op::LoadConst(Value::Int(*n))),
            Expr::FloatLit(x) => self.emit(Op::LoadConst(Value::Double(*x))),
            Expr::StringLit(s) => self.emit(Op::LoadConst(Value::Str(s.clone()))),
            Expr::CharLit(c) => self.emit(Op::LoadConst(Value::Char(*c))),
            Expr::BoolLit(b) => self.emit(Op::LoadConst(Value::Bool(*b))),
            Expr::NullLit => self.emit(Op::PushNull),
            Expr::This | Expr::Super => self.load_this(),
            Expr::Name(name) => self.compile_name_load(name),
            Expr::Unary { op, operand } => {
                self.compile_expr(operand);
                match op {
                    UnaryOp::Not => self.emit(Op::Not),
                    UnaryOp::Neg => self.emit(Op::Neg),
                }
            }
            Expr::PreIncDec { inc, target } => self.compile_inc_dec(target, *inc, true),
            Expr::PostIncDec { inc, target } => self.compile_inc_dec(target, *inc, false),
            Expr::Binary { op, left, right } => {
                self.compile_expr(left);
                self.compile_expr(right);
                self.emit(binary_op(*op));
            }
            Expr::Assign { op, target, value } => self.compile_assign(target, *op, value),
            Expr::Ternary {
                cond,
                then_value,
                else_value,
            } => {
                let else_label = self.new_label();
                let end_label = self.new_label();
                self.compile_expr(cond);
                self.emit(Op::IfFalse(else_label));
                self.compile_expr(then_value);
                self.emit(Op::Goto(end_label));
                self.mark_label(else_label);
                self.compile_expr(else_value);
                self.mark_label(end_label);
            }
            Expr::Call {
                receiver,
                name,
                args,
            } => self.compile_call(receiver.as_deref(), name, args),
            Expr::New { class, args } => {
                self.emit(Op::New {
                    class: class.clone(),
                });
                self.emit(Op::Dup);
                for arg in args {
                    self.compile_expr(arg);
                }
                self.emit(Op::InvokeSpecial {
                    method: "<init>".to_string(),
                    argc: args.len(),
                });
            }
            Expr::NewArray { elem, dims, init } => {
                let elem_name = elem.display_name();
                if let Some(elements) = init {
                    self.compile_array_with_init(&elem_name, elements);
                } else {
                    for dim in dims {
                        self.compile_expr(dim);
                    }
                    self.emit(Op::NewArray {
                        elem: elem_name,
                        dims: dims.len().max(1),
                    });
                }
            }
            Expr::ArrayLiteral(elements) => {
                // no declared type reaches here; elements default to Object
                self.compile_array_with_init("Object", elements);
            }
            Expr::FieldAccess { object, name } => {
                if let Some(class) = self.static_class_of(object) {
                    self.emit(Op::GetStatic { class, name: name.clone() });
                    return;
                }
                self.compile_expr(object);
                self.emit(Op::GetField { name: name.clone() });
            }
            Expr::Index { array, index } => {
                self.compile_expr(array);
                self.compile_expr(index);
                self.emit(Op::ArrayLoad);
            }
            Expr::Cast { ty, expr } => {
                self.compile_expr(expr);
                self.emit(Op::CheckCast {
                    ty: ty.display_name(),
                });
            }
            Expr::InstanceOf { expr, ty } => {
                self.compile_expr(expr);
                self.emit(Op::InstanceOf {
                    ty: ty.display_name(),
                });
            }
            Expr::Lambda { params, body } => {
                let marker = match body {
                    LambdaBody::Expr(_) => "expr",
                    LambdaBody::Block(_) => "block",
                };
                self.emit(Op::LambdaCreate {
                    info: format!("({}) -> {}@L{}", params.join(", "), marker, self.line),
                });
            }
            Expr::MethodRef { target, name } => {
                self.emit(Op::LambdaCreate {
                    info: format!("{}::{}", target, name),
                });
            }
        }
    }

    fn compile_array_with_init(&mut self, elem: &str, elements: &[Expr]) {
        self.emit(Op::LoadConst(Value::Int(elements.len() as i64)));
        self.emit(Op::NewArray {
            elem: elem.to_string(),
            dims: 1,
        });
        for (index, element) in elements.iter().enumerate() {
            self.emit(Op::Dup);
            self.emit(Op::LoadConst(Value::Int(index as i64)));
            if let Expr::ArrayLiteral(nested) = element {
                let nested_elem = elem.strip_suffix("[]").unwrap_or(elem);
                self.compile_array_with_init(nested_elem, nested);
            } else {
                self.compile_expr(element);
            }
            self.emit(Op::ArrayStore);
        }
    }

    fn compile_name_load(&mut self, name: &str) {
        if let Some(&slot) = self.bindings.get(name) {
            self.load_local(slot);
            return;
        }
        if let Some(site) = self.ctx.resolve_field(self.class_name, name) {
            if site.is_static {
                self.emit(Op::GetStatic {
                    class: site.owner,
                    name: name.to_string(),
                });
            } else {
                self.load_this();
                self.emit(Op::GetField {
                    name: name.to_string(),
                });
            }
            return;
        }
        // unresolved names degrade to null
        self.emit(Op::PushNull);
    }

    /// True when `expr` denotes a class usable as a static receiver.
    fn static_class_of(&self, expr: &Expr) -> Option<String> {
        let Expr::Name(name) = expr else {
            return None;
        };
        if self.bindings.contains_key(name)
            || self.ctx.resolve_field(self.class_name, name).is_some()
        {
            return None;
        }
        if STATIC_UTILITY_CLASSES.contains(&name.as_str()) || self.ctx.has_type(name) {
            return Some(name.clone());
        }
        None
    }

    fn compile_inc_dec(&mut self, target: &Expr, inc: bool, prefix: bool) {
        let arith = if inc { Op::Add } else { Op::Sub };
        if let Expr::Name(name) = target {
            if let Some(&slot) = self.bindings.get(name) {
                if prefix {
                    // load, const 1, add, dup, store: the new value remains
                    self.load_local(slot);
                    self.emit(Op::LoadConst(Value::Int(1)));
                    self.emit(arith);
                    self.emit(Op::Dup);
                    self.store_local(slot);
                } else {
                    // load, dup, const 1, add, store: the old value remains
                    self.load_local(slot);
                    self.emit(Op::Dup);
                    self.emit(Op::LoadConst(Value::Int(1)));
                    self.emit(arith);
                    self.store_local(slot);
                }
                return;
            }
        }
        // field and array targets lower onto compound assignment
        let op = if inc { AssignOp::Add } else { AssignOp::Sub };
        self.compile_assign(target, op, &Expr::IntLit(1));
    }

    fn compile_assign(&mut self, target: &Expr, op: AssignOp, value: &Expr) {
        match target {
            Expr::Name(name) => {
                if let Some(&slot) = self.bindings.get(name) {
                    if op == AssignOp::Assign {
                        self.compile_expr(value);
                    } else {
                        self.load_local(slot);
                        self.compile_expr(value);
                        self.emit(assign_arith(op));
                    }
                    self.emit(Op::Dup);
                    self.store_local(slot);
                    return;
                }
                if let Some(site) = self.ctx.resolve_field(self.class_name, name) {
                    if site.is_static {
                        if op == AssignOp::Assign {
                            self.compile_expr(value);
                        } else {
                            self.emit(Op::GetStatic {
                                class: site.owner.clone(),
                                name: name.clone(),
                            });
                            self.compile_expr(value);
                            self.emit(assign_arith(op));
                        }
                        self.emit(Op::Dup);
                        self.emit(Op::PutStatic {
                            class: site.owner,
                            name: name.clone(),
                        });
                    } else {
                        self.load_this();
                        if op == AssignOp::Assign {
                            self.compile_expr(value);
                        } else {
                            self.emit(Op::Dup);
                            self.emit(Op::GetField { name: name.clone() });
                            self.compile_expr(value);
                            self.emit(assign_arith(op));
                        }
                        self.emit(Op::DupX1);
                        self.emit(Op::PutField { name: name.clone() });
                    }
                    return;
                }
                // assignment to an unknown name evaluates and discards
                self.compile_expr(value);
            }
            Expr::FieldAccess { object, name } => {
                if let Some(class) = self.static_class_of(object) {
                    if op == AssignOp::Assign {
                        self.compile_expr(value);
                    } else {
                        self.emit(Op::GetStatic {
                            class: class.clone(),
                            name: name.clone(),
                        });
                        self.compile_expr(value);
                        self.emit(assign_arith(op));
                    }
                    self.emit(Op::Dup);
                    self.emit(Op::PutStatic {
                        class,
                        name: name.clone(),
                    });
                    return;
                }
                self.compile_expr(object);
                if op == AssignOp::Assign {
                    self.compile_expr(value);
                } else {
                    self.emit(Op::Dup);
                    self.emit(Op::GetField { name: name.clone() });
                    self.compile_expr(value);
                    self.emit(assign_arith(op));
                }
                self.emit(Op::DupX1);
                self.emit(Op::PutField { name: name.clone() });
            }
            Expr::Index { array, index } => {
                self.compile_expr(array);
                self.compile_expr(index);
                if op == AssignOp::Assign {
                    self.compile_expr(value);
                } else {
                    // re-evaluate the target for the read side
                    self.compile_expr(array);
                    self.compile_expr(index);
                    self.emit(Op::ArrayLoad);
                    self.compile_expr(value);
                    self.emit(assign_arith(op));
                }
                // ARRAYSTORE consumes its operands; park a copy so the
                // assignment expression still yields the stored value
                let scratch = self.scratch_local();
                self.emit(Op::Dup);
                self.store_local(scratch);
                self.emit(Op::ArrayStore);
                self.load_local(scratch);
            }
            _ => {
                // not an lvalue; evaluate for effect
                self.compile_expr(value);
            }
        }
    }

    fn compile_call(&mut self, receiver: Option<&Expr>, name: &str, args: &[Expr]) {
        // System.out.print / println lower to PRINT
        if let Some(Expr::FieldAccess { object, name: field }) = receiver {
            if field == "out"
                && matches!(object.as_ref(), Expr::Name(n) if n == "System")
                && (name == "println" || name == "print")
            {
                if args.is_empty() {
                    self.emit(Op::LoadConst(Value::Str(String::new())));
                } else {
                    self.compile_expr(&args[0]);
                }
                self.emit(Op::Print {
                    newline: name == "println",
                });
                return;
            }
        }

        match receiver {
            None => {
                match self.ctx.resolve_method(self.class_name, name) {
                    Some((owner, true)) => {
                        for arg in args {
                            self.compile_expr(arg);
                        }
                        self.emit(Op::InvokeStatic {
                            class: owner,
                            method: name.to_string(),
                            argc: args.len(),
                        });
                    }
                    Some((_, false)) => {
                        self.load_this();
                        for arg in args {
                            self.compile_expr(arg);
                        }
                        self.emit(Op::InvokeVirtual {
                            method: name.to_string(),
                            argc: args.len(),
                        });
                    }
                    None if self.is_static => {
                        for arg in args {
                            self.compile_expr(arg);
                        }
                        self.emit(Op::InvokeStatic {
                            class: self.class_name.to_string(),
                            method: name.to_string(),
                            argc: args.len(),
                        });
                    }
                    None => {
                        self.load_this();
                        for arg in args {
                            self.compile_expr(arg);
                        }
                        self.emit(Op::InvokeVirtual {
                            method: name.to_string(),
                            argc: args.len(),
                        });
                    }
                }
            }
            Some(Expr::This) if name == "<init>" => {
                self.load_this();
                for arg in args {
                    self.compile_expr(arg);
                }
                self.emit(Op::InvokeSpecial {
                    method: "<init>".to_string(),
                    argc: args.len(),
                });
            }
            Some(Expr::Super) => {
                // owner-qualified so dispatch starts above this class
                let owner = self.super_class.unwrap_or("Object");
                self.load_this();
                for arg in args {
                    self.compile_expr(arg);
                }
                self.emit(Op::InvokeSpecial {
                    method: format!("{}.{}", owner, name),
                    argc: args.len(),
                });
            }
            Some(receiver) => {
                if let Some(class) = self.static_class_of(receiver) {
                    for arg in args {
                        self.compile_expr(arg);
                    }
                    self.emit(Op::InvokeStatic {
                        class,
                        method: name.to_string(),
                        argc: args.len(),
                    });
                    return;
                }
                self.compile_expr(receiver);
                for arg in args {
                    self.compile_expr(arg);
                }
                self.emit(Op::InvokeVirtual {
                    method: name.to_string(),
                    argc: args.len(),
                });
            }
        }
    }
}

fn element_type_name(ty: &TypeNode) -> String {
    let mut elem = ty.clone();
    if elem.dims > 0 {
        elem.dims -= 1;
    }
    elem.display_name()
}

fn binary_op(op: BinaryOp) -> Op {
    match op {
        BinaryOp::Add => Op::Add,
        BinaryOp::Sub => Op::Sub,
        BinaryOp::Mul => Op::Mul,
        BinaryOp::Div => Op::Div,
        BinaryOp::Mod => Op::Mod,
        BinaryOp::Eq => Op::CmpEq,
        BinaryOp::Ne => Op::CmpNe,
        BinaryOp::Lt => Op::CmpLt,
        BinaryOp::Le => Op::CmpLe,
        BinaryOp::Gt => Op::CmpGt,
        BinaryOp::Ge => Op::CmpGe,
        BinaryOp::And | BinaryOp::BitAnd => Op::And,
        BinaryOp::Or | BinaryOp::BitOr => Op::Or,
    }
}

fn assign_arith(op: AssignOp) -> Op {
    match op {
        AssignOp::Add => Op::Add,
        AssignOp::Sub => Op::Sub,
        AssignOp::Mul => Op::Mul,
        AssignOp::Div => Op::Div,
        AssignOp::Assign => Op::Nop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;

    fn program(source: &str) -> CompiledProgram {
        compile(source).unwrap()
    }

    fn ops_of(program: &CompiledProgram, key: &str) -> Vec<Op> {
        let start = program.method_offsets[key];
        let mut ops = Vec::new();
        for instruction in &program.instructions[start..] {
            ops.push(instruction.op.clone());
            if matches!(instruction.op, Op::Return | Op::ReturnValue) && ops.len() > 1 {
                break;
            }
        }
        ops
    }

    #[test]
    fn main_class_is_first_with_main() {
        let p = program(
            "class A { void f() {} } class B { public static void main(String[] args) {} }",
        );
        assert_eq!(p.main_class, "B");
        assert_eq!(p.main_method, "main");
    }

    #[test]
    fn println_lowers_to_print() {
        let p = program(
            r#"class A { public static void main(String[] args) { System.out.println("hi"); } }"#,
        );
        let ops = ops_of(&p, "A.main(String[])");
        assert!(ops.contains(&Op::Print { newline: true }));
        assert!(
            !ops.iter()
                .any(|op| matches!(op, Op::InvokeVirtual { .. } | Op::InvokeStatic { .. }))
        );
    }

    #[test]
    fn empty_println_pushes_empty_string() {
        let p = program("class A { static void f() { System.out.println(); } }");
        let ops = ops_of(&p, "A.f()");
        let at = ops
            .iter()
            .position(|op| matches!(op, Op::Print { .. }))
            .unwrap();
        assert_eq!(ops[at - 1], Op::LoadConst(Value::Str(String::new())));
    }

    #[test]
    fn line_markers_precede_statements() {
        let p = program("class A {\n  static void f() {\n    int x = 1;\n    x = 2;\n  }\n}");
        let ops = ops_of(&p, "A.f()");
        assert!(ops.contains(&Op::Line(3)));
        assert!(ops.contains(&Op::Line(4)));
    }

    #[test]
    fn this_occupies_slot_zero() {
        let p = program("class A { int x; void set(int v) { this.x = v; } }");
        let class = p.find_class("A").unwrap();
        let method = class.methods.iter().find(|m| m.name == "set").unwrap();
        assert_eq!(method.locals[0].name, "this");
        assert_eq!(method.locals[0].slot, 0);
        assert_eq!(method.locals[1].name, "v");
    }

    #[test]
    fn shadowing_allocates_a_new_slot() {
        let p = program(
            "class A { static void f() { int x = 1; { int x = 2; } } }",
        );
        let class = p.find_class("A").unwrap();
        let method = class.methods.iter().find(|m| m.name == "f").unwrap();
        let slots: Vec<&LocalSlot> =
            method.locals.iter().filter(|l| l.name == "x").collect();
        assert_eq!(slots.len(), 2);
        assert_ne!(slots[0].slot, slots[1].slot);
    }

    #[test]
    fn postfix_increment_leaves_original_value() {
        let p = program("class A { static int f(int x) { return x++; } }");
        let ops = ops_of(&p, "A.f(int)");
        let load = ops
            .iter()
            .position(|op| matches!(op, Op::LoadLocal { name, .. } if name == "x"))
            .unwrap();
        assert_eq!(ops[load + 1], Op::Dup);
        assert_eq!(ops[load + 2], Op::LoadConst(Value::Int(1)));
        assert_eq!(ops[load + 3], Op::Add);
        assert!(matches!(&ops[load + 4], Op::StoreLocal { name, .. } if name == "x"));
    }

    #[test]
    fn static_utility_calls_compile_to_invoke_static() {
        let p = program("class A { static int f() { return Math.max(1, 2); } }");
        let ops = ops_of(&p, "A.f()");
        assert!(ops.iter().any(|op| matches!(
            op,
            Op::InvokeStatic { class, method, argc: 2 }
                if class == "Math" && method == "max"
        )));
    }

    #[test]
    fn constructors_compile_as_init_with_field_preamble() {
        let p = program("class P { int x = 7; P() {} }");
        let key = "P.<init>()";
        assert!(p.method_offsets.contains_key(key));
        let ops = ops_of(&p, key);
        assert!(ops.iter().any(|op| matches!(op, Op::PutField { name } if name == "x")));
    }

    #[test]
    fn default_constructor_synthesised_for_field_inits() {
        let p = program("class P { int x = 7; }");
        assert!(p.method_offsets.contains_key("P.<init>()"));
    }

    #[test]
    fn branch_targets_are_globalised() {
        let p = program(
            "class A { static void f() { if (true) { f(); } } static void g() { if (false) { g(); } } }",
        );
        let g_start = p.method_offsets["A.g()"];
        for instruction in &p.instructions[g_start..] {
            if let Op::IfFalse(target) | Op::Goto(target) = &instruction.op {
                assert!(*target >= g_start, "label escaped its method");
                assert!(*target <= p.instructions.len());
            }
        }
    }

    #[test]
    fn foreach_lowers_to_iterator_protocol() {
        let p = program("class A { static void f(int[] xs) { for (int x : xs) { } } }");
        let ops = ops_of(&p, "A.f(int[])");
        let names: Vec<&str> = ops
            .iter()
            .filter_map(|op| match op {
                Op::InvokeInterface { method, .. } => Some(method.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["iterator", "hasNext", "next"]);
        let class = p.find_class("A").unwrap();
        let method = class.methods.iter().find(|m| m.name == "f").unwrap();
        assert!(method.locals.iter().any(|l| l.name == "$iterator"));
    }

    #[test]
    fn break_inside_do_while_branches_to_the_loop_end() {
        let p = program(
            "class A { static void f() { int i = 0; do { break; } while (i < 5); } }",
        );
        let ops = ops_of(&p, "A.f()");
        // break compiles to a real jump, and the loop closes with a
        // conditional back-branch
        assert!(!ops.contains(&Op::Nop));
        assert!(ops.iter().any(|op| matches!(op, Op::Goto(_))));
        assert!(ops.iter().any(|op| matches!(op, Op::IfTrue(_))));
    }

    #[test]
    fn do_while_emits_body_before_the_check() {
        let p = program("class A { static void f() { int i = 0; do { i = i + 1; } while (i < 3); } }");
        let ops = ops_of(&p, "A.f()");
        let store_at = ops
            .iter()
            .rposition(|op| matches!(op, Op::StoreLocal { name, .. } if name == "i"))
            .unwrap();
        let check_at = ops
            .iter()
            .position(|op| matches!(op, Op::CmpLt))
            .unwrap();
        assert!(store_at < check_at, "body must precede the condition");
    }

    #[test]
    fn array_assignment_leaves_the_stored_value() {
        let p = program("class A { static int f(int[] a) { return a[0] = 7; } }");
        let ops = ops_of(&p, "A.f(int[])");
        let store_at = ops
            .iter()
            .position(|op| matches!(op, Op::ArrayStore))
            .unwrap();
        // the value is duplicated into the scratch slot around the store
        assert_eq!(ops[store_at - 2], Op::Dup);
        assert!(matches!(
            &ops[store_at - 1],
            Op::StoreLocal { name, .. } if name == "$store"
        ));
        assert!(matches!(
            &ops[store_at + 1],
            Op::LoadLocal { name, .. } if name == "$store"
        ));
        let class = p.find_class("A").unwrap();
        let method = class.methods.iter().find(|m| m.name == "f").unwrap();
        assert!(method.locals.iter().any(|l| l.name == "$store"));
    }

    #[test]
    fn array_literal_initialises_every_slot() {
        let p = program("class A { static void f() { int[] xs = {4, 5}; } }");
        let ops = ops_of(&p, "A.f()");
        assert_eq!(
            ops.iter().filter(|op| matches!(op, Op::ArrayStore)).count(),
            2
        );
        assert!(ops.contains(&Op::NewArray {
            elem: "int".to_string(),
            dims: 1
        }));
    }

    #[test]
    fn try_body_jumps_over_catch_into_finally() {
        let p = program(
            "class A { static void f() { try { f(); } catch (Exception e) { g(); } finally { h(); } } static void g() {} static void h() {} }",
        );
        let ops = ops_of(&p, "A.f()");
        let goto_at = ops.iter().position(|op| matches!(op, Op::Goto(_))).unwrap();
        let target = match &ops[goto_at] {
            Op::Goto(t) => *t - p.method_offsets["A.f()"],
            _ => unreachable!(),
        };
        // the skipped region contains the catch body's call to g
        let skipped = &ops[goto_at + 1..target];
        assert!(skipped.iter().any(|op| matches!(
            op,
            Op::InvokeStatic { method, .. } if method == "g"
        )));
    }

    #[test]
    fn static_literal_field_is_recorded() {
        let p = program("class A { static int LIMIT = 10; }");
        let class = p.find_class("A").unwrap();
        assert_eq!(class.fields[0].initial, Some(Value::Int(10)));
    }

    #[test]
    fn interface_constants_are_static() {
        let p = program("interface I { int MAX = 5; }");
        let class = p.find_class("I").unwrap();
        assert!(class.is_interface);
        assert!(class.fields[0].is_static);
    }
}
