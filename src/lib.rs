//! Scoped Context - stack-discipline context objects for any type
//!
//! A type becomes a context by implementing [`ScopedContext`]. Entering a
//! context pushes it onto two thread-local stacks: one for its concrete type
//! and one shared by every context type. Dropping the returned guard pops it
//! from both.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use scoped_context::{current_context, type_filter, ScopedContext, TypeFilter};
//!
//! struct Request(u64);
//! struct Span(&'static str);
//!
//! impl ScopedContext for Request {}
//! impl ScopedContext for Span {}
//!
//! let request = Rc::new(Request(1));
//! let span = Rc::new(Span("parse"));
//!
//! let _request = request.enter();
//! let _span = span.enter();
//!
//! assert_eq!(Request::current().unwrap().0, 1);
//! assert!(current_context(&TypeFilter::any()).unwrap().is::<Span>());
//! assert!(current_context(&type_filter!(Request)).unwrap().is::<Request>());
//! ```
//!
//! Stacks are never shared between threads: a context entered on one thread
//! is invisible to every other thread.

pub mod context;
pub mod crosstype;
pub mod error;
pub mod filter;
mod registry;

pub use context::{ContextGuard, ScopedContext};
pub use crosstype::{
    context_stack, current_context, current_context_of, depth, try_current_context,
};
pub use error::{ContextError, Result};
pub use filter::TypeFilter;
pub use registry::AnyContext;
