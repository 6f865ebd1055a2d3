// src/framework/data.rs

//! Type-erased data arena and the per-invocation argument view handed to
//! task callbacks.

use std::any::{Any, type_name};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;

use crate::errors::{Result, StageflowError};
use crate::ids::{DataId, Id, IdRegistry, KeyedVec};

/// How a task accesses one of its declared data slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Access {
    Read,
    Write,
}

/// One declared task argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arg {
    pub id: DataId,
    pub access: Access,
}

impl Arg {
    pub fn read(id: DataId) -> Self {
        Self {
            id,
            access: Access::Read,
        }
    }

    pub fn write(id: DataId) -> Self {
        Self {
            id,
            access: Access::Write,
        }
    }
}

impl From<DataId> for Arg {
    fn from(id: DataId) -> Self {
        Arg::write(id)
    }
}

#[derive(Default)]
pub(crate) struct Slot {
    value: Option<Box<dyn Any + Send>>,
    type_name: &'static str,
}

impl Slot {
    fn downcast_ref<T: 'static>(&self, id: DataId) -> Result<&T> {
        let value = self.value.as_ref().ok_or(StageflowError::DataEmpty(id))?;
        value
            .downcast_ref::<T>()
            .ok_or_else(|| StageflowError::DataTypeMismatch {
                id,
                expected: type_name::<T>(),
                found: self.type_name,
            })
    }

    fn downcast_mut<T: 'static>(&mut self, id: DataId) -> Result<&mut T> {
        let found = self.type_name;
        let value = self.value.as_mut().ok_or(StageflowError::DataEmpty(id))?;
        value
            .downcast_mut::<T>()
            .ok_or_else(|| StageflowError::DataTypeMismatch {
                id,
                expected: type_name::<T>(),
                found,
            })
    }
}

/// Arena of opaque data slots addressed by [`DataId`].
pub struct DataArena {
    ids: IdRegistry<DataId>,
    slots: KeyedVec<DataId, Slot>,
}

impl fmt::Debug for DataArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataArena")
            .field("len", &self.ids.len())
            .field("capacity", &self.ids.capacity())
            .finish_non_exhaustive()
    }
}

impl DataArena {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            ids: IdRegistry::with_limit(limit),
            slots: KeyedVec::new(),
        }
    }

    /// Reserve an empty slot.
    pub fn create(&mut self) -> Result<DataId> {
        let id = self.ids.create()?;
        self.slots.ensure(id);
        self.slots[id] = Slot::default();
        Ok(id)
    }

    /// Store `value` in an existing slot, replacing whatever was there.
    pub fn insert<T: Any + Send>(&mut self, id: DataId, value: T) -> Result<()> {
        let slot = self.slot_mut(id)?;
        slot.value = Some(Box::new(value));
        slot.type_name = type_name::<T>();
        Ok(())
    }

    pub fn get<T: 'static>(&self, id: DataId) -> Result<&T> {
        self.slot(id)?.downcast_ref(id)
    }

    pub fn get_mut<T: 'static>(&mut self, id: DataId) -> Result<&mut T> {
        self.slot_mut(id)?.downcast_mut(id)
    }

    pub fn is_filled(&self, id: DataId) -> bool {
        self.slot(id).map(|s| s.value.is_some()).unwrap_or(false)
    }

    pub fn contains(&self, id: DataId) -> bool {
        self.ids.contains(id)
    }

    /// Drop the slot's value and release its id.
    pub fn remove(&mut self, id: DataId) -> bool {
        if !self.ids.remove(id) {
            return false;
        }
        self.slots[id] = Slot::default();
        true
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Type name of the value in a slot, for diagnostics.
    pub fn type_name_of(&self, id: DataId) -> Option<&'static str> {
        self.slot(id)
            .ok()
            .filter(|s| s.value.is_some())
            .map(|s| s.type_name)
    }

    /// Borrow the declared slots of one task invocation.
    ///
    /// `args` must not contain the same id twice; the task graph rejects such
    /// tasks before anything runs.
    pub(crate) fn args<'a>(&'a mut self, args: &[Arg]) -> Result<TaskArgs<'a>> {
        for arg in args {
            if !self.ids.contains(arg.id) {
                return Err(StageflowError::UnknownData {
                    id: arg.id,
                    context: "task argument".to_string(),
                });
            }
        }

        let mut order: Vec<usize> = (0..args.len()).collect();
        order.sort_by_key(|&pos| args[pos].id);

        let mut picked: Vec<Option<&'a mut Slot>> = args.iter().map(|_| None).collect();
        let mut rest: &'a mut [Slot] = self.slots.as_mut_slice();
        let mut offset = 0usize;

        for pos in order {
            let index = args[pos].id.index();
            if index < offset {
                return Err(StageflowError::BorrowConflict(args[pos].id));
            }
            let tail = std::mem::take(&mut rest);
            let (_, tail) = tail.split_at_mut(index - offset);
            let (slot, tail) = tail
                .split_first_mut()
                .ok_or(StageflowError::UnknownData {
                    id: args[pos].id,
                    context: "task argument".to_string(),
                })?;
            picked[pos] = Some(slot);
            rest = tail;
            offset = index + 1;
        }

        let entries = args
            .iter()
            .zip(picked)
            .filter_map(|(arg, slot)| {
                slot.map(|slot| ArgEntry {
                    arg: *arg,
                    slot: RefCell::new(slot),
                })
            })
            .collect();

        Ok(TaskArgs { entries })
    }

    fn slot(&self, id: DataId) -> Result<&Slot> {
        if !self.ids.contains(id) {
            return Err(StageflowError::UnknownData {
                id,
                context: "data access".to_string(),
            });
        }
        Ok(&self.slots[id])
    }

    fn slot_mut(&mut self, id: DataId) -> Result<&mut Slot> {
        if !self.ids.contains(id) {
            return Err(StageflowError::UnknownData {
                id,
                context: "data access".to_string(),
            });
        }
        Ok(&mut self.slots[id])
    }
}

struct ArgEntry<'a> {
    arg: Arg,
    slot: RefCell<&'a mut Slot>,
}

/// The data slots a task declared, resolved for one invocation.
///
/// Arguments are addressed by their position in the task's `.args(...)` list.
pub struct TaskArgs<'a> {
    entries: Vec<ArgEntry<'a>>,
}

impl<'a> TaskArgs<'a> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn id(&self, index: usize) -> Result<DataId> {
        Ok(self.entry(index)?.arg.id)
    }

    /// Shared access to argument `index`.
    pub fn read<T: 'static>(&self, index: usize) -> Result<Ref<'_, T>> {
        let entry = self.entry(index)?;
        let id = entry.arg.id;
        let guard = entry
            .slot
            .try_borrow()
            .map_err(|_| StageflowError::BorrowConflict(id))?;
        // Check first so the error carries the real cause.
        guard.downcast_ref::<T>(id)?;
        Ref::filter_map(guard, |slot| {
            slot.value.as_ref().and_then(|v| v.downcast_ref::<T>())
        })
        .map_err(|_| StageflowError::DataEmpty(id))
    }

    /// Exclusive access to argument `index`; it must be declared as a write.
    pub fn write<T: 'static>(&self, index: usize) -> Result<RefMut<'_, T>> {
        let entry = self.entry(index)?;
        let id = entry.arg.id;
        if entry.arg.access != Access::Write {
            return Err(StageflowError::AccessViolation { index, id });
        }
        let mut guard = entry
            .slot
            .try_borrow_mut()
            .map_err(|_| StageflowError::BorrowConflict(id))?;
        guard.downcast_mut::<T>(id)?;
        RefMut::filter_map(guard, |slot| {
            slot.value.as_mut().and_then(|v| v.downcast_mut::<T>())
        })
        .map_err(|_| StageflowError::DataEmpty(id))
    }

    fn entry(&self, index: usize) -> Result<&ArgEntry<'a>> {
        self.entries
            .get(index)
            .ok_or(StageflowError::ArgOutOfRange {
                index,
                count: self.entries.len(),
            })
    }
}
