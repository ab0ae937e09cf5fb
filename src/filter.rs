//! Concrete-type filters for cross-type lookups

use std::any::{Any, TypeId};

use crate::registry::AnyContext;

/// Selects which concrete context types a cross-type lookup considers
///
/// Membership is an exact `TypeId` test; there is no notion of subtypes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeFilter {
    /// `None` matches every type
    types: Option<Vec<TypeId>>,
}

impl TypeFilter {
    /// Match every context type
    pub fn any() -> Self {
        Self { types: None }
    }

    /// Match a single concrete type
    pub fn of<T: Any>() -> Self {
        Self {
            types: Some(vec![TypeId::of::<T>()]),
        }
    }

    /// Also match `T`
    pub fn or<T: Any>(mut self) -> Self {
        if let Some(types) = self.types.as_mut() {
            let id = TypeId::of::<T>();
            if !types.contains(&id) {
                types.push(id);
            }
        }
        self
    }

    /// Whether this filter lets every type through
    pub fn is_any(&self) -> bool {
        self.types.is_none()
    }

    pub fn matches(&self, type_id: TypeId) -> bool {
        match &self.types {
            None => true,
            Some(types) => types.contains(&type_id),
        }
    }

    pub fn matches_context(&self, context: &AnyContext) -> bool {
        self.matches(context.type_id())
    }
}

/// Build a [`TypeFilter`] from a list of types
///
/// ```
/// use scoped_context::{type_filter, TypeFilter};
///
/// struct Request;
/// struct Span;
///
/// assert!(type_filter!().is_any());
/// assert_eq!(type_filter!(Request, Span), TypeFilter::of::<Request>().or::<Span>());
/// ```
#[macro_export]
macro_rules! type_filter {
    () => {
        $crate::TypeFilter::any()
    };
    ($first:ty $(, $rest:ty)* $(,)?) => {
        $crate::TypeFilter::of::<$first>()$(.or::<$rest>())*
    };
}
