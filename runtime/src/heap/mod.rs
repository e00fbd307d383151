use crate::vm::Value;
use std::fmt::{self, Display};

pub mod method_area;

/// Stable handle into the heap arena. Callers hold ids, never pointers;
/// cycles in object graphs are therefore safe by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub usize);

impl Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapKind {
    Object,
    Array,
    Lambda,
    Str,
}

/// Named slot on a heap object. Map emulation repurposes the field list
/// as its entry storage (field name = stringified key).
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: Value,
}

impl Field {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeapObject {
    pub id: ObjectId,
    pub kind: HeapKind,
    pub class_name: String,
    pub fields: Vec<Field>,
    pub array_elements: Option<Vec<Value>>,
    pub element_type: Option<String>,
    pub string_value: Option<String>,
    pub reachable: bool,
    pub gc_root: bool,
    pub created_at_step: u64,
}

impl HeapObject {
    pub fn array_length(&self) -> usize {
        self.array_elements.as_ref().map_or(0, |e| e.len())
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// Creates the field when absent (duck-typed field addition).
    pub fn set_field(&mut self, name: &str, value: Value) {
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(field) => field.value = value,
            None => self.fields.push(Field::new(name, value)),
        }
    }

    pub fn remove_field(&mut self, name: &str) -> Option<Value> {
        let at = self.fields.iter().position(|f| f.name == name)?;
        Some(self.fields.remove(at).value)
    }

    /// Outgoing references, for graph visualisation. Computed on demand.
    pub fn references(&self) -> Vec<ObjectId> {
        let mut out = Vec::new();
        let mut push = |value: &Value| match value {
            Value::Ref(id) | Value::LambdaRef(id) => out.push(*id),
            Value::ArrayRef { id, .. } => out.push(*id),
            _ => {}
        };
        for field in &self.fields {
            push(&field.value);
        }
        if let Some(elements) = &self.array_elements {
            for element in elements {
                push(element);
            }
        }
        out
    }
}

/// Flat arena of session-lived objects. Ids are indices; nothing is ever
/// reclaimed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Heap {
    pub objects: Vec<HeapObject>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, mut object: HeapObject) -> ObjectId {
        let id = ObjectId(self.objects.len());
        object.id = id;
        self.objects.push(object);
        id
    }

    pub fn get(&self, id: ObjectId) -> Option<&HeapObject> {
        self.objects.get(id.0)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut HeapObject> {
        self.objects.get_mut(id.0)
    }

    pub fn class_name_of(&self, id: ObjectId) -> Option<&str> {
        self.get(id).map(|o| o.class_name.as_str())
    }

    pub fn alloc_object(
        &mut self,
        class_name: impl Into<String>,
        fields: Vec<Field>,
        step: u64,
    ) -> ObjectId {
        self.push(HeapObject {
            id: ObjectId(0),
            kind: HeapKind::Object,
            class_name: class_name.into(),
            fields,
            array_elements: None,
            element_type: None,
            string_value: None,
            reachable: true,
            gc_root: false,
            created_at_step: step,
        })
    }

    pub fn alloc_array(
        &mut self,
        element_type: impl Into<String>,
        length: usize,
        fill: Value,
        step: u64,
    ) -> ObjectId {
        let element_type = element_type.into();
        self.push(HeapObject {
            id: ObjectId(0),
            kind: HeapKind::Array,
            class_name: format!("{}[]", element_type),
            fields: Vec::new(),
            array_elements: Some(vec![fill; length]),
            element_type: Some(element_type),
            string_value: None,
            reachable: true,
            gc_root: false,
            created_at_step: step,
        })
    }

    pub fn alloc_array_from(
        &mut self,
        element_type: impl Into<String>,
        elements: Vec<Value>,
        step: u64,
    ) -> ObjectId {
        let element_type = element_type.into();
        self.push(HeapObject {
            id: ObjectId(0),
            kind: HeapKind::Array,
            class_name: format!("{}[]", element_type),
            fields: Vec::new(),
            array_elements: Some(elements),
            element_type: Some(element_type),
            string_value: None,
            reachable: true,
            gc_root: false,
            created_at_step: step,
        })
    }

    pub fn alloc_string(&mut self, value: impl Into<String>, step: u64) -> ObjectId {
        self.push(HeapObject {
            id: ObjectId(0),
            kind: HeapKind::Str,
            class_name: "String".to_string(),
            fields: Vec::new(),
            array_elements: None,
            element_type: None,
            string_value: Some(value.into()),
            reachable: true,
            gc_root: false,
            created_at_step: step,
        })
    }

    pub fn alloc_lambda(&mut self, info: impl Into<String>, step: u64) -> ObjectId {
        self.push(HeapObject {
            id: ObjectId(0),
            kind: HeapKind::Lambda,
            class_name: "Lambda".to_string(),
            fields: vec![Field::new("info", Value::Str(info.into()))],
            array_elements: None,
            element_type: None,
            string_value: None,
            reachable: true,
            gc_root: false,
            created_at_step: step,
        })
    }

    /// Bounds-tolerant array read; out-of-range indices yield null.
    pub fn array_get(&self, id: ObjectId, index: i64) -> Value {
        self.get(id)
            .and_then(|o| o.array_elements.as_ref())
            .and_then(|e| usize::try_from(index).ok().and_then(|i| e.get(i)))
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Bounds-tolerant array write; out-of-range indices are ignored.
    pub fn array_set(&mut self, id: ObjectId, index: i64, value: Value) {
        if let Some(elements) = self.get_mut(id).and_then(|o| o.array_elements.as_mut()) {
            if let Ok(i) = usize::try_from(index) {
                if i < elements.len() {
                    elements[i] = value;
                }
            }
        }
    }

    pub fn string_value(&self, id: ObjectId) -> Option<&str> {
        self.get(id).and_then(|o| o.string_value.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_indices() {
        let mut heap = Heap::new();
        let a = heap.alloc_object("A", Vec::new(), 0);
        let b = heap.alloc_string("hi", 1);
        assert_eq!(a, ObjectId(0));
        assert_eq!(b, ObjectId(1));
        assert_eq!(heap.get(b).unwrap().string_value.as_deref(), Some("hi"));
    }

    #[test]
    fn duck_typed_field_addition() {
        let mut heap = Heap::new();
        let id = heap.alloc_object("A", Vec::new(), 0);
        let object = heap.get_mut(id).unwrap();
        assert!(object.field("x").is_none());
        object.set_field("x", Value::Int(3));
        assert_eq!(object.field("x"), Some(&Value::Int(3)));
        object.set_field("x", Value::Int(4));
        assert_eq!(object.fields.len(), 1);
    }

    #[test]
    fn out_of_range_array_access_soft_fails() {
        let mut heap = Heap::new();
        let id = heap.alloc_array("int", 2, Value::Int(0), 0);
        assert_eq!(heap.array_get(id, 5), Value::Null);
        assert_eq!(heap.array_get(id, -1), Value::Null);
        heap.array_set(id, 9, Value::Int(1));
        assert_eq!(heap.get(id).unwrap().array_length(), 2);
    }

    #[test]
    fn references_walk_fields_and_elements() {
        let mut heap = Heap::new();
        let target = heap.alloc_object("B", Vec::new(), 0);
        let array = heap.alloc_array_from("B", vec![Value::Ref(target)], 0);
        let holder = heap.alloc_object("A", vec![Field::new("b", Value::Ref(target))], 0);
        assert_eq!(heap.get(holder).unwrap().references(), vec![target]);
        assert_eq!(heap.get(array).unwrap().references(), vec![target]);
    }
}
