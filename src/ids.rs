// src/ids.rs

//! Dense integer ids and the registries that hand them out.
//!
//! Every id is a thin `u32` newtype so that data-, pipeline- and task-indexed
//! tables cannot be mixed up. [`IdRegistry`] always returns the lowest free id,
//! which keeps [`KeyedVec`] tables dense.

use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

use crate::errors::{Result, StageflowError};

/// Common behaviour of the id newtypes.
pub trait Id: Copy + Eq + Ord + std::hash::Hash + fmt::Debug {
    /// Human readable kind, used in diagnostics.
    const KIND: &'static str;

    fn from_index(index: usize) -> Self;
    fn index(self) -> usize;
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl Id for $name {
            const KIND: &'static str = $kind;

            fn from_index(index: usize) -> Self {
                $name(index as u32)
            }

            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        }
    };
}

define_id!(
    /// Handle to one slot in the data arena.
    DataId, "data", "DATA"
);
define_id!(
    /// Handle to one pipeline.
    PipelineId, "pipeline", "PL"
);
define_id!(
    /// Handle to one committed task.
    TaskId, "task", "TASK"
);

define_id!(
    /// Handle to one feature context: a namespace sessions publish
    /// interfaces into.
    ContextId, "context", "CTX"
);

/// Index of a stage within its pipeline's stage set.
pub type StageId = u8;

/// Allocator for dense, reusable ids with a hard upper limit.
#[derive(Debug, Clone)]
pub struct IdRegistry<I: Id> {
    /// One past the highest id ever handed out.
    capacity: usize,
    free: BTreeSet<usize>,
    limit: usize,
    _id: PhantomData<I>,
}

impl<I: Id> IdRegistry<I> {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            capacity: 0,
            free: BTreeSet::new(),
            limit,
            _id: PhantomData,
        }
    }

    /// Allocate the lowest free id.
    ///
    /// Running past the limit means sessions were composed wrongly; callers
    /// are expected to abort startup on this error.
    pub fn create(&mut self) -> Result<I> {
        if let Some(index) = self.free.pop_first() {
            return Ok(I::from_index(index));
        }
        if self.capacity >= self.limit {
            return Err(StageflowError::IdCapacityExceeded {
                kind: I::KIND,
                limit: self.limit,
            });
        }
        let index = self.capacity;
        self.capacity += 1;
        Ok(I::from_index(index))
    }

    /// Release an id for later reuse. Returns `false` if it was not allocated.
    pub fn remove(&mut self, id: I) -> bool {
        if !self.contains(id) {
            return false;
        }
        let index = id.index();
        if index + 1 == self.capacity {
            // Shrink instead of leaving a trailing hole.
            self.capacity -= 1;
            while self.capacity > 0 && self.free.remove(&(self.capacity - 1)) {
                self.capacity -= 1;
            }
        } else {
            self.free.insert(index);
        }
        true
    }

    pub fn contains(&self, id: I) -> bool {
        id.index() < self.capacity && !self.free.contains(&id.index())
    }

    pub fn len(&self) -> usize {
        self.capacity - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size needed for a [`KeyedVec`] to be indexable by every live id.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Live ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = I> + '_ {
        (0..self.capacity)
            .filter(|index| !self.free.contains(index))
            .map(I::from_index)
    }
}

/// `Vec` indexed by an id type.
#[derive(Debug, Clone)]
pub struct KeyedVec<I: Id, T> {
    items: Vec<T>,
    _id: PhantomData<I>,
}

impl<I: Id, T> Default for KeyedVec<I, T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            _id: PhantomData,
        }
    }
}

impl<I: Id, T> KeyedVec<I, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: I) -> Option<&T> {
        self.items.get(id.index())
    }

    pub fn get_mut(&mut self, id: I) -> Option<&mut T> {
        self.items.get_mut(id.index())
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.items
    }

    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(index, item)| (I::from_index(index), item))
    }
}

impl<I: Id, T: Default> KeyedVec<I, T> {
    pub fn resize(&mut self, len: usize) {
        self.items.resize_with(len, T::default);
    }

    /// Grow (never shrink) so that `id` is a valid index.
    pub fn ensure(&mut self, id: I) {
        if id.index() >= self.items.len() {
            self.resize(id.index() + 1);
        }
    }
}

impl<I: Id, T> Index<I> for KeyedVec<I, T> {
    type Output = T;

    fn index(&self, id: I) -> &T {
        &self.items[id.index()]
    }
}

impl<I: Id, T> IndexMut<I> for KeyedVec<I, T> {
    fn index_mut(&mut self, id: I) -> &mut T {
        &mut self.items[id.index()]
    }
}
