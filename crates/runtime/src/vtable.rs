//! Per-type vtables and dynamic method dispatch (§3, §9 "Dynamic
//! dispatch").
//!
//! Each heap type carries a pointer to a function table plus, per the
//! design note, the methods it supports: `typename`, `->string`,
//! `->display-string`, `value-index`, `set-value-index!`, `members`.
//! Installing a method (`%%add-as-string`) bumps the vtable's generation
//! counter so memoized call sites can detect staleness.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::condition::Condition;
use crate::value::{Heap, HeapRef};
use idio_core::Value;

/// A native method: takes the heap (for field access), the receiver, and
/// any extra arguments, returns a guest value or a condition.
pub type NativeMethod = Rc<dyn Fn(&Heap, HeapRef, &[Value]) -> Result<Value, Condition>>;

/// The fixed slots every vtable may fill, per the design note's method
/// list. `None` means "fall through to the parent vtable", and falling
/// through an empty chain is the type's own responsibility to report as
/// unsupported.
#[derive(Default, Clone)]
pub struct Methods {
    pub to_string: Option<NativeMethod>,
    pub to_display_string: Option<NativeMethod>,
    pub value_index: Option<NativeMethod>,
    pub set_value_index: Option<NativeMethod>,
    pub members: Option<NativeMethod>,
}

impl fmt::Debug for Methods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Methods")
            .field("to_string", &self.to_string.is_some())
            .field("to_display_string", &self.to_display_string.is_some())
            .field("value_index", &self.value_index.is_some())
            .field("set_value_index", &self.set_value_index.is_some())
            .field("members", &self.members.is_some())
            .finish()
    }
}

/// A type's vtable: its name, optional parent (for inheritance), its
/// fixed method slots, arbitrary named extra methods, and a generation
/// counter bumped on every mutation.
#[derive(Debug)]
pub struct Vtable {
    pub type_name: &'static str,
    parent: Option<Rc<Vtable>>,
    methods: RefCell<Methods>,
    extra: HashMap<String, NativeMethod>,
    generation: Cell<u64>,
}

impl Vtable {
    pub fn new(type_name: &'static str, parent: Option<Rc<Vtable>>) -> Self {
        Vtable {
            type_name,
            parent,
            methods: RefCell::new(Methods::default()),
            extra: HashMap::new(),
            generation: Cell::new(0),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    fn bump_generation(&self) {
        self.generation.set(self.generation.get() + 1);
    }

    pub fn parent(&self) -> Option<&Rc<Vtable>> {
        self.parent.as_ref()
    }

    /// Walk the type chain from this vtable up through its parents,
    /// innermost first — the order dispatch must search in.
    pub fn typename_chain(&self) -> Vec<&'static str> {
        let mut names = vec![self.type_name];
        let mut cur = self.parent.as_deref();
        while let Some(v) = cur {
            names.push(v.type_name);
            cur = v.parent.as_deref();
        }
        names
    }

    /// Install or replace the `->string` method, bumping the generation.
    pub fn set_to_string(&mut self, f: NativeMethod) {
        self.methods.get_mut().to_string = Some(f);
        self.bump_generation();
    }

    pub fn set_to_display_string(&mut self, f: NativeMethod) {
        self.methods.get_mut().to_display_string = Some(f);
        self.bump_generation();
    }

    pub fn set_value_index(&mut self, f: NativeMethod) {
        self.methods.get_mut().value_index = Some(f);
        self.bump_generation();
    }

    pub fn set_set_value_index(&mut self, f: NativeMethod) {
        self.methods.get_mut().set_value_index = Some(f);
        self.bump_generation();
    }

    pub fn set_members(&mut self, f: NativeMethod) {
        self.methods.get_mut().members = Some(f);
        self.bump_generation();
    }

    /// Install an arbitrary named extra method (`%%add-as-string` and
    /// friends generalize to this).
    pub fn set_method(&mut self, name: impl Into<String>, f: NativeMethod) {
        self.extra.insert(name.into(), f);
        self.bump_generation();
    }

    /// Resolve a fixed-slot method, falling through the parent chain.
    pub fn resolve_to_string(&self) -> Option<NativeMethod> {
        self.methods
            .borrow()
            .to_string
            .clone()
            .or_else(|| self.parent.as_ref().and_then(|p| p.resolve_to_string()))
    }

    /// Resolve `->display-string`, falling through the parent chain for a
    /// display-specific method first; if none exists anywhere, falls back
    /// to `->string` and caches the result on this vtable as its own
    /// `->display-string`, so the next lookup hits directly (§4.4: "the
    /// `->display-string` entry point falls back to `->string`... a good
    /// returned string is then cached as the display method").
    pub fn resolve_to_display_string(&self) -> Option<NativeMethod> {
        if let Some(f) = self.lookup_to_display_string() {
            return Some(f);
        }
        let fallback = self.resolve_to_string()?;
        self.methods.borrow_mut().to_display_string = Some(fallback.clone());
        self.bump_generation();
        Some(fallback)
    }

    fn lookup_to_display_string(&self) -> Option<NativeMethod> {
        self.methods.borrow().to_display_string.clone().or_else(|| {
            self.parent
                .as_ref()
                .and_then(|p| p.lookup_to_display_string())
        })
    }

    pub fn resolve_value_index(&self) -> Option<NativeMethod> {
        self.methods
            .borrow()
            .value_index
            .clone()
            .or_else(|| self.parent.as_ref().and_then(|p| p.resolve_value_index()))
    }

    pub fn resolve_set_value_index(&self) -> Option<NativeMethod> {
        self.methods.borrow().set_value_index.clone().or_else(|| {
            self.parent
                .as_ref()
                .and_then(|p| p.resolve_set_value_index())
        })
    }

    pub fn resolve_members(&self) -> Option<NativeMethod> {
        self.methods
            .borrow()
            .members
            .clone()
            .or_else(|| self.parent.as_ref().and_then(|p| p.resolve_members()))
    }

    /// Resolve a named extra method, falling through the parent chain.
    pub fn resolve_method(&self, name: &str) -> Option<NativeMethod> {
        self.extra
            .get(name)
            .cloned()
            .or_else(|| self.parent.as_ref().and_then(|p| p.resolve_method(name)))
    }

    /// Resolve a named extra method, raising `method-unbound` if no
    /// vtable in the chain provides it (§4.4/§9: "Looking up a mandatory
    /// method that is not present raises *method-unbound*").
    pub fn require_method(&self, name: &str) -> Result<NativeMethod, Condition> {
        self.resolve_method(name).ok_or_else(|| Condition::MethodUnbound {
            type_name: self.type_name.to_string(),
            method: name.to_string(),
        })
    }

    /// Mandatory `value-index` lookup: `array-ref`/`hash-ref`-style
    /// indexing on a type without one is a coding error, not a silent
    /// no-op, so this raises `method-unbound` rather than returning
    /// `None`.
    pub fn require_value_index(&self) -> Result<NativeMethod, Condition> {
        self.resolve_value_index().ok_or_else(|| Condition::MethodUnbound {
            type_name: self.type_name.to_string(),
            method: "value-index".to_string(),
        })
    }

    pub fn require_set_value_index(&self) -> Result<NativeMethod, Condition> {
        self.resolve_set_value_index().ok_or_else(|| Condition::MethodUnbound {
            type_name: self.type_name.to_string(),
            method: "set-value-index!".to_string(),
        })
    }

    pub fn require_members(&self) -> Result<NativeMethod, Condition> {
        self.resolve_members().ok_or_else(|| Condition::MethodUnbound {
            type_name: self.type_name.to_string(),
            method: "members".to_string(),
        })
    }
}

/// A memoized dispatch-site cache entry: a resolved method plus the
/// generation it was resolved at. Callers should re-resolve when
/// `vtable.generation() != cached_generation`.
#[derive(Debug, Clone, Copy)]
pub struct CacheToken {
    pub generation: u64,
}

impl CacheToken {
    pub fn capture(vtable: &Vtable) -> Self {
        CacheToken {
            generation: vtable.generation(),
        }
    }

    pub fn is_stale(&self, vtable: &Vtable) -> bool {
        self.generation != vtable.generation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installing_method_bumps_generation() {
        let mut vt = Vtable::new("string", None);
        let gen0 = vt.generation();
        vt.set_to_string(Rc::new(|_heap, _r, _args| Ok(Value::from(idio_core::Immediate::NIL))));
        assert_eq!(vt.generation(), gen0 + 1);
    }

    #[test]
    fn inheritance_falls_through_to_parent() {
        let mut parent = Vtable::new("object", None);
        parent.set_to_string(Rc::new(|_h, _r, _a| Ok(Value::from(idio_core::Immediate::NIL))));
        let child = Vtable::new("pair", Some(Rc::new(parent)));
        assert!(child.resolve_to_string().is_some());
        assert!(child.methods.borrow().to_string.is_none());
    }

    #[test]
    fn display_string_falls_back_to_to_string_and_caches() {
        let mut vt = Vtable::new("widget", None);
        vt.set_to_string(Rc::new(|_h, _r, _a| Ok(Value::from(idio_core::Immediate::NIL))));
        let gen_before = vt.generation();
        assert!(vt.methods.borrow().to_display_string.is_none());

        let resolved = vt.resolve_to_display_string();
        assert!(resolved.is_some());
        assert!(
            vt.methods.borrow().to_display_string.is_some(),
            "fallback result must be cached as the display method"
        );
        assert!(vt.generation() > gen_before);
    }

    #[test]
    fn require_method_raises_method_unbound_when_missing() {
        let vt = Vtable::new("widget", None);
        let err = vt.require_method("members").unwrap_err();
        assert!(matches!(err, Condition::MethodUnbound { .. }));
    }

    #[test]
    fn require_value_index_succeeds_once_installed() {
        let mut vt = Vtable::new("array", None);
        vt.set_value_index(Rc::new(|_h, _r, _a| Ok(Value::from(idio_core::Immediate::NIL))));
        assert!(vt.require_value_index().is_ok());
    }

    #[test]
    fn typename_chain_innermost_first() {
        let parent = Vtable::new("object", None);
        let child = Vtable::new("pair", Some(Rc::new(parent)));
        assert_eq!(child.typename_chain(), vec!["pair", "object"]);
    }

    #[test]
    fn cache_token_detects_staleness() {
        let mut vt = Vtable::new("string", None);
        let tok = CacheToken::capture(&vt);
        assert!(!tok.is_stale(&vt));
        vt.set_members(Rc::new(|_h, _r, _a| Ok(Value::from(idio_core::Immediate::NIL))));
        assert!(tok.is_stale(&vt));
    }
}
