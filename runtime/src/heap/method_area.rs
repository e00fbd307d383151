use crate::compiler::CompiledProgram;
use crate::heap::Field;
use crate::rt::{ClassInfo, MethodInfo};
use crate::vm::Value;
use std::collections::HashMap;
use tracing_log::log::debug;

/// Loaded classes plus their static field storage. Owned by `VmState`
/// and cloned wholesale into every snapshot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MethodArea {
    pub loaded_classes: HashMap<String, ClassInfo>,
    pub static_fields: HashMap<String, HashMap<String, Value>>,
    pub constant_pool: Vec<Value>,
}

impl MethodArea {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every compiled class and seeds its static fields:
    /// literal initialisers take their value, everything else the type
    /// default.
    pub fn load_program(&mut self, program: &CompiledProgram, step: u64) {
        for class in &program.classes {
            debug!("loading class {}", class.name);
            let info = ClassInfo::from_compiled(class, step);
            let statics: HashMap<String, Value> = info
                .fields
                .iter()
                .filter(|f| f.is_static)
                .map(|f| {
                    let value = f
                        .initial
                        .clone()
                        .unwrap_or_else(|| Value::default_for_type(&f.ty));
                    (f.name.clone(), value)
                })
                .collect();
            self.static_fields.insert(class.name.clone(), statics);
            self.loaded_classes.insert(class.name.clone(), info);
        }
    }

    pub fn class(&self, name: &str) -> Option<&ClassInfo> {
        self.loaded_classes.get(name)
    }

    /// Resolves `(name, argc)` by walking the superclass chain until the
    /// chain runs out (the implicit root plays the part of Object).
    pub fn lookup_method(
        &self,
        class: &str,
        method: &str,
        argc: usize,
    ) -> Option<(String, MethodInfo)> {
        let mut cursor = Some(class.to_string());
        while let Some(name) = cursor {
            let Some(info) = self.loaded_classes.get(&name) else {
                return None;
            };
            if let Some(found) = info.find_method(method, argc) {
                return Some((name, found.clone()));
            }
            // default methods on declared interfaces
            for interface in &info.interfaces {
                if let Some(iface) = self.loaded_classes.get(interface) {
                    if let Some(found) = iface.find_method(method, argc) {
                        return Some((interface.clone(), found.clone()));
                    }
                }
            }
            cursor = info.super_class.clone();
        }
        None
    }

    /// Walks supers and interfaces; a class is its own subclass.
    pub fn is_subclass_of(&self, sub: &str, sup: &str) -> bool {
        if sub == sup {
            return true;
        }
        let mut cursor = Some(sub.to_string());
        while let Some(name) = cursor {
            if name == sup {
                return true;
            }
            let Some(info) = self.loaded_classes.get(&name) else {
                return false;
            };
            if info.interfaces.iter().any(|i| self.is_subclass_of(i, sup)) {
                return true;
            }
            cursor = info.super_class.clone();
        }
        false
    }

    pub fn get_static(&self, class: &str, field: &str) -> Option<Value> {
        self.static_fields.get(class)?.get(field).cloned()
    }

    /// Creates the slot on first write, mirroring duck-typed PUTFIELD.
    pub fn set_static(&mut self, class: &str, field: &str, value: Value) {
        self.static_fields
            .entry(class.to_string())
            .or_default()
            .insert(field.to_string(), value);
    }

    /// Instance field template for NEW: root-most super fields first,
    /// each with its declared default.
    pub fn instance_fields_of(&self, class: &str) -> Vec<Field> {
        let mut chain = Vec::new();
        let mut cursor = Some(class.to_string());
        while let Some(name) = cursor {
            let Some(info) = self.loaded_classes.get(&name) else {
                break;
            };
            chain.push(name.clone());
            cursor = info.super_class.clone();
        }
        let mut fields = Vec::new();
        for name in chain.iter().rev() {
            if let Some(info) = self.loaded_classes.get(name) {
                for field in info.fields.iter().filter(|f| !f.is_static) {
                    fields.push(Field::new(
                        field.name.clone(),
                        Value::default_for_type(&field.ty),
                    ));
                }
            }
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;

    fn area(source: &str) -> MethodArea {
        let program = compile(source).unwrap();
        let mut area = MethodArea::new();
        area.load_program(&program, 0);
        area
    }

    #[test]
    fn statics_seed_literals_and_defaults() {
        let area = area("class A { static int N = 3; static String s; static double d; }");
        assert_eq!(area.get_static("A", "N"), Some(Value::Int(3)));
        assert_eq!(area.get_static("A", "s"), Some(Value::Null));
        assert_eq!(area.get_static("A", "d"), Some(Value::Double(0.0)));
    }

    #[test]
    fn method_lookup_walks_super_chain() {
        let area = area("class A { void f() {} } class B extends A { }");
        let (owner, method) = area.lookup_method("B", "f", 0).unwrap();
        assert_eq!(owner, "A");
        assert_eq!(method.name, "f");
        assert!(area.lookup_method("B", "missing", 0).is_none());
    }

    #[test]
    fn subclass_check_covers_interfaces() {
        let area = area("interface I {} class A implements I {} class B extends A {}");
        assert!(area.is_subclass_of("B", "A"));
        assert!(area.is_subclass_of("B", "I"));
        assert!(area.is_subclass_of("A", "A"));
        assert!(!area.is_subclass_of("A", "B"));
    }

    #[test]
    fn instance_template_lists_super_fields_first() {
        let area = area("class A { int a; } class B extends A { int b; }");
        let fields = area.instance_fields_of("B");
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
