//! Lookups across every context type
//!
//! These work without naming a concrete context type: the cross-type stack of
//! the current thread holds every active context in the order it was entered,
//! and a [`TypeFilter`] narrows it down to a set of types.

use std::any::Any;
use std::rc::Rc;

use crate::error::{ContextError, Result};
use crate::filter::TypeFilter;
use crate::registry::{self, AnyContext};

/// The most recently entered context matching `filter`
pub fn current_context(filter: &TypeFilter) -> Option<AnyContext> {
    registry::crosstype_top(filter)
}

pub fn try_current_context(filter: &TypeFilter) -> Result<AnyContext> {
    current_context(filter).ok_or(ContextError::NoCrossTypeContext)
}

/// The most recently entered context of exactly type `T`
pub fn current_context_of<T: Any>() -> Option<Rc<T>> {
    current_context(&TypeFilter::of::<T>()).and_then(|entry| entry.downcast::<T>())
}

/// Active contexts matching `filter`, oldest first
///
/// The last item is the current context for that filter.
pub fn context_stack(filter: &TypeFilter) -> Vec<AnyContext> {
    registry::crosstype_stack(filter)
}

/// Number of active contexts matching `filter`
pub fn depth(filter: &TypeFilter) -> usize {
    registry::crosstype_depth(filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ScopedContext;
    use crate::type_filter;

    struct A(&'static str);
    struct B(&'static str);
    struct C(&'static str);

    impl ScopedContext for A {}
    impl ScopedContext for B {}
    impl ScopedContext for C {}

    #[test]
    fn test_empty_stack() {
        assert!(current_context(&TypeFilter::any()).is_none());
        assert_eq!(
            try_current_context(&TypeFilter::any()).unwrap_err(),
            ContextError::NoCrossTypeContext
        );
        assert!(context_stack(&TypeFilter::any()).is_empty());
        assert_eq!(depth(&TypeFilter::any()), 0);
    }

    #[test]
    fn test_filter_picks_most_recent_match() {
        let x = Rc::new(A("x"));
        let y = Rc::new(C("y"));
        let z = Rc::new(B("z"));

        let _x = x.enter();
        let _y = y.enter();
        {
            let _z = z.enter();
            let found = current_context(&type_filter!(A, B)).unwrap();
            assert!(found.is_instance(&z));
        }

        let found = current_context(&type_filter!(A, B)).unwrap();
        assert!(found.is_instance(&x));
        assert_eq!(found.downcast_ref::<A>().unwrap().0, "x");
    }

    #[test]
    fn test_unfiltered_is_absolute_top() {
        let a = Rc::new(A("a"));
        let c = Rc::new(C("c"));

        let _a = a.enter();
        let _c = c.enter();

        assert!(current_context(&TypeFilter::any()).unwrap().is::<C>());
        assert!(try_current_context(&TypeFilter::of::<B>()).is_err());
    }

    #[test]
    fn test_current_context_of() {
        let a = Rc::new(A("a"));
        let _a = a.enter();

        assert!(Rc::ptr_eq(&current_context_of::<A>().unwrap(), &a));
        assert!(current_context_of::<B>().is_none());
    }

    #[test]
    fn test_context_stack_filtered_order() {
        let a1 = Rc::new(A("a1"));
        let b = Rc::new(B("b"));
        let c = Rc::new(C("c"));
        let a2 = Rc::new(A("a2"));

        let _a1 = a1.enter();
        let _b = b.enter();
        let _c = c.enter();
        let _a2 = a2.enter();

        let all = context_stack(&TypeFilter::any());
        assert_eq!(all.len(), 4);
        assert!(all[0].is_instance(&a1));
        assert!(all[3].is_instance(&a2));

        let filtered = context_stack(&type_filter!(A, C));
        assert_eq!(filtered.len(), 3);
        assert!(filtered[0].is_instance(&a1));
        assert!(filtered[1].is_instance(&c));
        assert!(filtered[2].is_instance(&a2));
        assert_eq!(depth(&type_filter!(A, C)), 3);
    }
}
