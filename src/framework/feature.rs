// src/framework/feature.rs

//! Feature interfaces: named bundles of ids one session publishes and other
//! sessions look up, scoped by a [`ContextId`].
//!
//! A setup function that only needs "the entities of this scene" asks the
//! context for the interface instead of taking every id struct as a
//! parameter. Each context holds at most one instance per interface type.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::errors::{Result, StageflowError};
use crate::ids::{ContextId, IdRegistry, KeyedVec};

/// Maximum number of live contexts.
pub const MAX_CONTEXTS: usize = 1024;

/// A plain struct of ids published into a context.
pub trait FeatureInterface: Copy + fmt::Debug + Send + 'static {
    /// Diagnostic name.
    const NAME: &'static str;
}

/// One interface slot of one context, as recorded by sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceKey {
    pub context: ContextId,
    pub type_id: TypeId,
    pub name: &'static str,
}

impl InterfaceKey {
    pub fn of<I: FeatureInterface>(context: ContextId) -> Self {
        Self {
            context,
            type_id: TypeId::of::<I>(),
            name: I::NAME,
        }
    }
}

#[derive(Default)]
struct FeatureContext {
    interfaces: HashMap<TypeId, (&'static str, Box<dyn Any + Send>)>,
}

/// Every context and the interfaces published into it.
pub(crate) struct Contexts {
    ids: IdRegistry<ContextId>,
    slots: KeyedVec<ContextId, Option<FeatureContext>>,
}

impl Default for Contexts {
    fn default() -> Self {
        Self {
            ids: IdRegistry::with_limit(MAX_CONTEXTS),
            slots: KeyedVec::new(),
        }
    }
}

impl fmt::Debug for Contexts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (id, slot) in self.slots.iter() {
            if let Some(ctx) = slot {
                let names: Vec<&str> = ctx.interfaces.values().map(|(n, _)| *n).collect();
                map.entry(&id, &names);
            }
        }
        map.finish()
    }
}

impl Contexts {
    pub(crate) fn create(&mut self) -> Result<ContextId> {
        let id = self.ids.create()?;
        self.slots.ensure(id);
        self.slots[id] = Some(FeatureContext::default());
        Ok(id)
    }

    pub(crate) fn remove(&mut self, id: ContextId) -> bool {
        if !self.ids.remove(id) {
            return false;
        }
        if let Some(ctx) = self.slots[id].take()
            && !ctx.interfaces.is_empty()
        {
            debug!(context = %id, interfaces = ctx.interfaces.len(), "context removed with live interfaces");
        }
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }

    fn context(&self, id: ContextId) -> Result<&FeatureContext> {
        self.slots
            .get(id)
            .and_then(Option::as_ref)
            .ok_or(StageflowError::UnknownContext(id))
    }

    pub(crate) fn publish<I: FeatureInterface>(
        &mut self,
        context: ContextId,
        value: I,
    ) -> Result<InterfaceKey> {
        let ctx = self
            .slots
            .get_mut(context)
            .and_then(Option::as_mut)
            .ok_or(StageflowError::UnknownContext(context))?;
        let key = InterfaceKey::of::<I>(context);
        if ctx.interfaces.contains_key(&key.type_id) {
            return Err(StageflowError::DuplicateInterface {
                interface: I::NAME,
                context,
            });
        }
        ctx.interfaces.insert(key.type_id, (I::NAME, Box::new(value)));
        debug!(context = %context, interface = I::NAME, "interface published");
        Ok(key)
    }

    pub(crate) fn withdraw(&mut self, key: InterfaceKey) -> bool {
        self.slots
            .get_mut(key.context)
            .and_then(Option::as_mut)
            .is_some_and(|ctx| ctx.interfaces.remove(&key.type_id).is_some())
    }

    pub(crate) fn get<I: FeatureInterface>(&self, context: ContextId) -> Result<I> {
        self.context(context)?
            .interfaces
            .get(&TypeId::of::<I>())
            .and_then(|(_, value)| value.downcast_ref::<I>())
            .copied()
            .ok_or(StageflowError::MissingInterface {
                interface: I::NAME,
                context,
            })
    }
}
