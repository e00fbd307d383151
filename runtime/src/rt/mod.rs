//! Runtime class model: what the method area stores for each loaded
//! class. Mirrors the compiler's output, stamped with the load step.

use crate::compiler::{CompiledClass, CompiledField, CompiledMethod, LocalSlot};
use crate::vm::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct ClassInfo {
    pub name: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub is_interface: bool,
    pub is_abstract: bool,
    pub loaded_at_step: u64,
}

impl ClassInfo {
    pub fn from_compiled(class: &CompiledClass, step: u64) -> Self {
        Self {
            name: class.name.clone(),
            super_class: class.super_class.clone(),
            interfaces: class.interfaces.clone(),
            fields: class.fields.iter().map(FieldInfo::from_compiled).collect(),
            methods: class
                .methods
                .iter()
                .map(MethodInfo::from_compiled)
                .collect(),
            is_interface: class.is_interface,
            is_abstract: class.is_abstract,
            loaded_at_step: step,
        }
    }

    pub fn find_method(&self, name: &str, argc: usize) -> Option<&MethodInfo> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.params.len() == argc && !m.is_abstract)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub name: String,
    pub ty: String,
    pub is_static: bool,
    pub is_final: bool,
    pub initial: Option<Value>,
}

impl FieldInfo {
    fn from_compiled(field: &CompiledField) -> Self {
        Self {
            name: field.name.clone(),
            ty: field.ty.clone(),
            is_static: field.is_static,
            is_final: field.is_final,
            initial: field.initial.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamInfo {
    pub name: String,
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodInfo {
    pub name: String,
    pub signature: String,
    pub params: Vec<ParamInfo>,
    pub return_type: String,
    pub is_static: bool,
    pub is_abstract: bool,
    pub offset: Option<usize>,
    pub locals: Vec<LocalSlot>,
    pub line: u32,
}

impl MethodInfo {
    fn from_compiled(method: &CompiledMethod) -> Self {
        Self {
            name: method.name.clone(),
            signature: method.signature.clone(),
            params: method
                .params
                .iter()
                .map(|p| ParamInfo {
                    name: p.name.clone(),
                    ty: p.ty.clone(),
                })
                .collect(),
            return_type: method.return_type.clone(),
            is_static: method.is_static,
            is_abstract: method.is_abstract,
            offset: method.offset,
            locals: method.locals.clone(),
            line: method.line,
        }
    }

    pub fn returns_value(&self) -> bool {
        self.return_type != "void"
    }
}
