//! Per-thread context registry
//!
//! Each thread owns one [`Registry`]: a stack per concrete context type and a
//! single cross-type stack holding every active context in push order. The
//! two views are only ever mutated together, so projecting the cross-type
//! stack onto any type `T` yields exactly the stack for `T`.

mod entry;

use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;

pub use entry::AnyContext;

use crate::error::{ContextError, Result};
use crate::filter::TypeFilter;

thread_local! {
    static REGISTRY: RefCell<Registry> = RefCell::new(Registry::default());
}

/// The dual stack of one thread
#[derive(Debug, Default)]
pub(crate) struct Registry {
    /// Created lazily on the first push of each type
    per_type: HashMap<TypeId, Vec<AnyContext>>,
    crosstype: Vec<AnyContext>,
}

impl Registry {
    fn push(&mut self, entry: AnyContext) {
        self.per_type
            .entry(entry.type_id())
            .or_default()
            .push(entry.clone());
        self.crosstype.push(entry);
        debug_assert!(self.projection_holds());
    }

    /// Pop `entry` off both stacks.
    ///
    /// Nothing is mutated unless `entry` is the top of its type stack and of
    /// the cross-type stack. The popped handles are handed back so the caller
    /// can drop them after releasing the registry borrow.
    fn pop(&mut self, entry: &AnyContext) -> Result<(AnyContext, AnyContext)> {
        let type_name = entry.type_name();
        let typed_top = self
            .per_type
            .get(&entry.type_id())
            .and_then(|stack| stack.last());

        let (typed_top, cross_top) = match (typed_top, self.crosstype.last()) {
            (Some(typed_top), Some(cross_top)) => (typed_top, cross_top),
            _ => return Err(ContextError::StackUnderflow { type_name }),
        };
        if !typed_top.ptr_eq(entry) || !cross_top.ptr_eq(entry) {
            return Err(ContextError::OutOfOrder {
                type_name,
                top: cross_top.type_name(),
            });
        }

        let typed = self
            .per_type
            .get_mut(&entry.type_id())
            .and_then(Vec::pop);
        let cross = self.crosstype.pop();
        debug_assert!(self.projection_holds());

        match (typed, cross) {
            (Some(typed), Some(cross)) => Ok((typed, cross)),
            _ => Err(ContextError::StackUnderflow { type_name }),
        }
    }

    /// Take `entry` out of both stacks wherever it sits.
    ///
    /// Used when an exit is rejected while the thread unwinds: the entry must
    /// still leave the stacks, and removing it from both keeps every other
    /// type's projection intact.
    fn remove(&mut self, entry: &AnyContext) -> Vec<AnyContext> {
        let mut removed = Vec::new();
        if let Some(stack) = self.per_type.get_mut(&entry.type_id()) {
            if let Some(index) = stack.iter().rposition(|active| active.ptr_eq(entry)) {
                removed.push(stack.remove(index));
            }
        }
        if let Some(index) = self
            .crosstype
            .iter()
            .rposition(|active| active.ptr_eq(entry))
        {
            removed.push(self.crosstype.remove(index));
        }
        debug_assert!(self.projection_holds());
        removed
    }

    fn stack(&self, type_id: TypeId) -> &[AnyContext] {
        self.per_type
            .get(&type_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn crosstype_top(&self, filter: &TypeFilter) -> Option<&AnyContext> {
        self.crosstype
            .iter()
            .rev()
            .find(|entry| filter.matches_context(entry))
    }

    fn crosstype_stack(&self, filter: &TypeFilter) -> Vec<AnyContext> {
        self.crosstype
            .iter()
            .filter(|entry| filter.matches_context(entry))
            .cloned()
            .collect()
    }

    fn projection_holds(&self) -> bool {
        let typed_len: usize = self.per_type.values().map(Vec::len).sum();
        if typed_len != self.crosstype.len() {
            return false;
        }

        self.per_type.iter().all(|(type_id, stack)| {
            let projected: Vec<&AnyContext> = self
                .crosstype
                .iter()
                .filter(|entry| entry.type_id() == *type_id)
                .collect();
            projected.len() == stack.len()
                && projected
                    .iter()
                    .zip(stack)
                    .all(|(cross, typed)| cross.ptr_eq(typed))
        })
    }
}

/// Read the current thread's registry; after teardown it reads as empty
fn with_registry<R: Default>(f: impl FnOnce(&Registry) -> R) -> R {
    REGISTRY
        .try_with(|registry| f(&registry.borrow()))
        .unwrap_or_default()
}

/// Push `entry` onto the current thread's stacks
pub(crate) fn push(entry: AnyContext) -> Result<()> {
    let type_name = entry.type_name();
    let depth = REGISTRY
        .try_with(|registry| {
            let mut registry = registry.borrow_mut();
            registry.push(entry);
            registry.crosstype.len()
        })
        .map_err(|_| ContextError::RegistryUnavailable { type_name })?;
    tracing::trace!(context = type_name, depth, "entered context");
    Ok(())
}

/// Pop `entry` off the current thread's stacks
pub(crate) fn pop(entry: &AnyContext) -> Result<()> {
    let type_name = entry.type_name();
    let popped = REGISTRY.try_with(|registry| {
        let mut registry = registry.borrow_mut();
        registry
            .pop(entry)
            .map(|popped| (popped, registry.crosstype.len()))
    });

    match popped {
        Ok(Ok((popped, depth))) => {
            drop(popped);
            tracing::trace!(context = type_name, depth, "exited context");
            Ok(())
        }
        Ok(Err(err)) => Err(err),
        Err(_) => {
            // The stacks are already gone with the thread.
            tracing::error!(context = type_name, "context exited after thread-local teardown");
            Ok(())
        }
    }
}

/// Force `entry` off both stacks, returning whether it was there
pub(crate) fn remove(entry: &AnyContext) -> bool {
    let removed = REGISTRY
        .try_with(|registry| registry.borrow_mut().remove(entry))
        .unwrap_or_default();
    let found = !removed.is_empty();
    drop(removed);
    if found {
        tracing::warn!(context = entry.type_name(), "context removed out of order");
    }
    found
}

pub(crate) fn top(type_id: TypeId) -> Option<AnyContext> {
    with_registry(|registry| registry.stack(type_id).last().cloned())
}

pub(crate) fn stack(type_id: TypeId) -> Vec<AnyContext> {
    with_registry(|registry| registry.stack(type_id).to_vec())
}

pub(crate) fn depth(type_id: TypeId) -> usize {
    with_registry(|registry| registry.stack(type_id).len())
}

pub(crate) fn contains(entry: &AnyContext) -> bool {
    with_registry(|registry| {
        registry
            .stack(entry.type_id())
            .iter()
            .any(|active| active.ptr_eq(entry))
    })
}

pub(crate) fn crosstype_top(filter: &TypeFilter) -> Option<AnyContext> {
    with_registry(|registry| registry.crosstype_top(filter).cloned())
}

pub(crate) fn crosstype_stack(filter: &TypeFilter) -> Vec<AnyContext> {
    with_registry(|registry| registry.crosstype_stack(filter))
}

pub(crate) fn crosstype_depth(filter: &TypeFilter) -> usize {
    with_registry(|registry| {
        if filter.is_any() {
            registry.crosstype.len()
        } else {
            registry
                .crosstype
                .iter()
                .filter(|entry| filter.matches_context(entry))
                .count()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    struct A;
    struct B;

    fn entry_a() -> AnyContext {
        AnyContext::new(Rc::new(A))
    }

    fn entry_b() -> AnyContext {
        AnyContext::new(Rc::new(B))
    }

    #[test]
    fn test_push_updates_both_stacks() {
        let mut registry = Registry::default();
        let a = entry_a();
        let b = entry_b();
        registry.push(a.clone());
        registry.push(b.clone());

        assert!(registry.stack(TypeId::of::<A>())[0].ptr_eq(&a));
        assert!(registry.stack(TypeId::of::<B>())[0].ptr_eq(&b));
        assert_eq!(registry.crosstype.len(), 2);
        assert!(registry.projection_holds());
    }

    #[test]
    fn test_pop_empty_is_underflow() {
        let mut registry = Registry::default();
        let err = registry.pop(&entry_a()).unwrap_err();
        assert_eq!(
            err,
            ContextError::StackUnderflow {
                type_name: std::any::type_name::<A>()
            }
        );
    }

    #[test]
    fn test_pop_after_type_stack_drained_is_underflow() {
        let mut registry = Registry::default();
        let a = entry_a();
        registry.push(a.clone());
        registry.pop(&a).unwrap();

        let err = registry.pop(&a).unwrap_err();
        assert!(matches!(err, ContextError::StackUnderflow { .. }));
    }

    #[test]
    fn test_pop_out_of_order_leaves_stacks_intact() {
        let mut registry = Registry::default();
        let a = entry_a();
        let b = entry_b();
        registry.push(a.clone());
        registry.push(b.clone());

        let err = registry.pop(&a).unwrap_err();
        assert_eq!(
            err,
            ContextError::OutOfOrder {
                type_name: std::any::type_name::<A>(),
                top: std::any::type_name::<B>(),
            }
        );
        assert_eq!(registry.crosstype.len(), 2);
        assert!(registry.projection_holds());

        registry.pop(&b).unwrap();
        registry.pop(&a).unwrap();
        assert!(registry.crosstype.is_empty());
    }

    #[test]
    fn test_pop_checks_identity() {
        let mut registry = Registry::default();
        let first = entry_a();
        let second = entry_a();
        registry.push(first.clone());

        let err = registry.pop(&second).unwrap_err();
        assert!(matches!(err, ContextError::OutOfOrder { .. }));
    }

    #[test]
    fn test_remove_from_middle_keeps_projection() {
        let mut registry = Registry::default();
        let a1 = entry_a();
        let b = entry_b();
        let a2 = entry_a();
        registry.push(a1.clone());
        registry.push(b.clone());
        registry.push(a2.clone());

        assert_eq!(registry.remove(&a1).len(), 2);
        assert!(registry.projection_holds());
        assert_eq!(registry.stack(TypeId::of::<A>()).len(), 1);
        assert!(registry.stack(TypeId::of::<A>())[0].ptr_eq(&a2));
        assert_eq!(registry.crosstype.len(), 2);

        // Removing something that is not active is a no-op.
        assert!(registry.remove(&a1).is_empty());
        assert_eq!(registry.crosstype.len(), 2);
    }

    #[test]
    fn test_crosstype_top_scans_from_top() {
        let mut registry = Registry::default();
        let a = entry_a();
        let b = entry_b();
        registry.push(a.clone());
        registry.push(b.clone());

        assert!(registry.crosstype_top(&TypeFilter::any()).unwrap().ptr_eq(&b));
        assert!(registry.crosstype_top(&TypeFilter::of::<A>()).unwrap().ptr_eq(&a));
        assert!(registry.crosstype_top(&TypeFilter::of::<String>()).is_none());
    }

    #[test]
    fn test_thread_local_functions() {
        let a = entry_a();
        push(a.clone()).unwrap();
        assert_eq!(depth(TypeId::of::<A>()), 1);
        assert_eq!(crosstype_depth(&TypeFilter::any()), 1);
        assert!(contains(&a));
        assert!(top(TypeId::of::<A>()).unwrap().ptr_eq(&a));

        pop(&a).unwrap();
        assert!(!contains(&a));
        assert!(top(TypeId::of::<A>()).is_none());
        assert!(stack(TypeId::of::<A>()).is_empty());
    }

    #[test]
    fn test_thread_local_remove() {
        let a = entry_a();
        let b = entry_b();
        push(a.clone()).unwrap();
        push(b.clone()).unwrap();

        assert!(remove(&a));
        assert!(!remove(&a));
        assert!(top(TypeId::of::<A>()).is_none());
        assert_eq!(crosstype_depth(&TypeFilter::any()), 1);

        pop(&b).unwrap();
        assert!(crosstype_stack(&TypeFilter::any()).is_empty());
    }

    #[test]
    fn test_thread_local_pop_underflow() {
        let err = pop(&entry_b()).unwrap_err();
        assert!(err.is_fatal());
        assert!(crosstype_stack(&TypeFilter::any()).is_empty());
    }
}
