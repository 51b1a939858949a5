//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity; two instances with the same attribute values are
/// the same value. The relation domain leans on this for change detection: an input
/// stage only counts as changed when its [`ValueObject`] projection differs.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
