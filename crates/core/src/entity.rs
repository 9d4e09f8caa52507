//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Storage adapters key records by `Entity::id`, so anything persisted through a
/// repository implements this.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}
