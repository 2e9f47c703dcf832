//! In-memory relationship links between entities.
//!
//! A relationship pair always has one strong side and one weak side: the
//! side that was assigned owns the related entities, the other side only
//! points back. Entity graphs therefore never keep themselves alive.

use super::{Entity, EntityState};
use crate::model::Model;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

/// A non-owning handle to an entity.
#[derive(Clone)]
pub(crate) struct WeakEntity {
    pub(crate) state: Weak<RwLock<EntityState>>,
    pub(crate) model: Model,
}

impl WeakEntity {
    pub(crate) fn upgrade(&self) -> Option<Entity> {
        self.state.upgrade().map(|state| Entity {
            state,
            model: self.model.clone(),
        })
    }

    fn points_to(&self, other: &Entity) -> bool {
        std::ptr::eq(self.state.as_ptr(), Arc::as_ptr(&other.state))
    }
}

/// The target of a to-one property.
#[derive(Clone)]
pub(crate) enum OneLink {
    /// Assigned on this side; this entity keeps the target alive.
    Owned(Entity),
    /// Back-reference written when the target's list was assigned.
    Inverse(WeakEntity),
    /// Foreign id read from storage, not fetched yet.
    Reference(u64),
}

impl OneLink {
    pub(crate) fn entity(&self) -> Option<Entity> {
        match self {
            Self::Owned(entity) => Some(entity.clone()),
            Self::Inverse(weak) => weak.upgrade(),
            Self::Reference(_) => None,
        }
    }

    pub(crate) fn points_to(&self, other: &Entity) -> bool {
        match self {
            Self::Owned(entity) => entity.ptr_eq(other),
            Self::Inverse(weak) => weak.points_to(other),
            Self::Reference(_) => false,
        }
    }
}

/// One element of a to-many list.
#[derive(Clone)]
pub(crate) enum ManyLink {
    /// Assigned on this side (or loaded by sync); kept alive by the list.
    Owned(Entity),
    /// Added because the element's to-one side was assigned.
    Inverse(WeakEntity),
}

impl ManyLink {
    pub(crate) fn entity(&self) -> Option<Entity> {
        match self {
            Self::Owned(entity) => Some(entity.clone()),
            Self::Inverse(weak) => weak.upgrade(),
        }
    }

    pub(crate) fn points_to(&self, other: &Entity) -> bool {
        match self {
            Self::Owned(entity) => entity.ptr_eq(other),
            Self::Inverse(weak) => weak.points_to(other),
        }
    }

    pub(crate) fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }
}
