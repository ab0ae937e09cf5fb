//! Type-erased stack entries
//!
//! Every active context is stored as an `AnyContext`: a shared handle to the
//! value plus the concrete type it was entered as. The same entry sits on the
//! per-type stack and on the cross-type stack.

use std::any::{Any, TypeId};
use std::fmt;
use std::rc::Rc;

/// A handle to an active context of some concrete type
#[derive(Clone)]
pub struct AnyContext {
    value: Rc<dyn Any>,
    type_id: TypeId,
    type_name: &'static str,
}

impl AnyContext {
    /// Erase a typed handle
    pub(crate) fn new<T: Any>(value: Rc<T>) -> Self {
        Self {
            value,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// The concrete type the context was entered as
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Name of the concrete type, for diagnostics
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Check the concrete type
    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Recover the typed handle
    pub fn downcast<T: Any>(&self) -> Option<Rc<T>> {
        Rc::clone(&self.value).downcast::<T>().ok()
    }

    /// Borrow the context as its concrete type
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Identity comparison, never value equality
    pub fn ptr_eq(&self, other: &AnyContext) -> bool {
        Rc::ptr_eq(&self.value, &other.value)
    }

    /// Whether this entry is exactly `context`
    pub fn is_instance<T: Any>(&self, context: &Rc<T>) -> bool {
        self.is::<T>() && self.address() == Rc::as_ptr(context) as *const ()
    }

    fn address(&self) -> *const () {
        Rc::as_ptr(&self.value) as *const ()
    }
}

impl fmt::Debug for AnyContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnyContext({} @ {:p})", self.type_name, self.address())
    }
}
