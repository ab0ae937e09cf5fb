//! The scoped context capability
//!
//! Any `'static` type becomes a context with an empty impl:
//!
//! ```
//! use std::rc::Rc;
//! use scoped_context::ScopedContext;
//!
//! struct Request {
//!     id: u64,
//! }
//!
//! impl ScopedContext for Request {}
//!
//! let request = Rc::new(Request { id: 7 });
//! {
//!     let _guard = request.enter();
//!     assert_eq!(Request::current().unwrap().id, 7);
//! }
//! assert!(Request::current().is_none());
//! ```
//!
//! Entering pushes the context onto its type's stack and onto the cross-type
//! stack of the current thread; dropping the returned [`ContextGuard`] pops it
//! from both, including when the scope is left by a panic.

use std::any::{Any, TypeId};
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use crate::crosstype;
use crate::error::{ContextError, Result};
use crate::filter::TypeFilter;
use crate::registry::{self, AnyContext};

/// A value that can be the active context of a scope on the current thread
pub trait ScopedContext: Any + Sized {
    /// Enter a scope for this context.
    ///
    /// # Panics
    ///
    /// Panics if this same instance is already active on the current thread.
    /// Use [`try_enter`](ScopedContext::try_enter) to handle that case.
    fn enter(self: &Rc<Self>) -> ContextGuard<Self> {
        match self.try_enter() {
            Ok(guard) => guard,
            Err(err) => panic!("{err}"),
        }
    }

    /// Enter a scope, refusing an instance that is already active
    fn try_enter(self: &Rc<Self>) -> Result<ContextGuard<Self>> {
        let entry = AnyContext::new(Rc::clone(self));
        if registry::contains(&entry) {
            return Err(ContextError::AlreadyActive {
                type_name: entry.type_name(),
            });
        }

        registry::push(entry.clone())?;
        Ok(ContextGuard {
            context: Rc::clone(self),
            entry,
        })
    }

    /// Run `f` with this context active
    fn scope<R>(self: &Rc<Self>, f: impl FnOnce(&Rc<Self>) -> R) -> R {
        let guard = self.enter();
        f(guard.context())
    }

    /// The most recently entered context of this type, if any
    fn current() -> Option<Rc<Self>> {
        registry::top(TypeId::of::<Self>()).and_then(|entry| entry.downcast::<Self>())
    }

    fn try_current() -> Result<Rc<Self>> {
        Self::current().ok_or(ContextError::NoContext {
            type_name: std::any::type_name::<Self>(),
        })
    }

    /// All active contexts of this type, oldest first.
    ///
    /// The last item is the current context. The returned vector is a copy.
    fn context_stack() -> Vec<Rc<Self>> {
        registry::stack(TypeId::of::<Self>())
            .iter()
            .filter_map(|entry| entry.downcast::<Self>())
            .collect()
    }

    fn depth() -> usize {
        registry::depth(TypeId::of::<Self>())
    }

    /// Whether this instance is active on the current thread
    fn is_active(self: &Rc<Self>) -> bool {
        registry::contains(&AnyContext::new(Rc::clone(self)))
    }

    /// See [`current_context`](crate::current_context)
    fn current_crosstype(filter: &TypeFilter) -> Option<AnyContext> {
        crosstype::current_context(filter)
    }

    /// See [`context_stack`](crate::context_stack)
    fn crosstype_stack(filter: &TypeFilter) -> Vec<AnyContext> {
        crosstype::context_stack(filter)
    }
}

/// Keeps a context active until dropped
///
/// Dropping the guard exits the context exactly once. Exiting a context that
/// is not on top of both stacks breaks the nesting of every later lookup on
/// the thread, so it panics instead of returning an error. While the thread
/// is already unwinding the context is removed from wherever it sits instead.
#[must_use = "the context is exited as soon as the guard is dropped"]
pub struct ContextGuard<T: ScopedContext> {
    context: Rc<T>,
    entry: AnyContext,
}

impl<T: ScopedContext> ContextGuard<T> {
    /// The entered context
    pub fn context(&self) -> &Rc<T> {
        &self.context
    }

    /// Exit the context now instead of at the end of the scope
    ///
    /// # Panics
    ///
    /// Panics if the context is not the innermost active context, or if the
    /// stacks are already empty.
    pub fn exit(self) {
        drop(self);
    }
}

impl<T: ScopedContext> Deref for ContextGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.context
    }
}

impl<T: ScopedContext> Drop for ContextGuard<T> {
    fn drop(&mut self) {
        if let Err(err) = registry::pop(&self.entry) {
            if std::thread::panicking() {
                // A second panic here would abort the process, so take the
                // entry out by identity instead of leaving it stale.
                tracing::error!(
                    context = self.entry.type_name(),
                    error = %err,
                    "context exit failed while unwinding"
                );
                registry::remove(&self.entry);
            } else {
                panic!("{err}");
            }
        }
    }
}

impl<T: ScopedContext> fmt::Debug for ContextGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContextGuard")
            .field(&self.entry.type_name())
            .finish()
    }
}
