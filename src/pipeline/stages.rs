// src/pipeline/stages.rs

//! Stage sets: the closed, ordered list of stages a pipeline cycles through.
//!
//! Typed stage sets implement [`StageSet`] (usually a fieldless enum); the
//! executor only ever sees the type-erased [`StageSetInfo`].

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::errors::{Result, StageflowError};
use crate::ids::StageId;

/// What a stage means to the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageRole {
    /// Must fully complete before dependents proceed.
    #[default]
    Gate,
    /// Best effort: tasks syncing with this stage proceed immediately when the
    /// pipeline is not running this frame.
    UseOrRun,
    /// Drains transient state; still runs when the pipeline was canceled.
    Clear,
}

/// A closed, ordered set of stages.
pub trait StageSet: Copy + Eq + fmt::Debug + 'static {
    const NAME: &'static str;
    const STAGES: &'static [Self];

    fn name(self) -> &'static str;

    fn role(self) -> StageRole {
        StageRole::Gate
    }

    fn id(self) -> StageId {
        Self::STAGES
            .iter()
            .position(|s| *s == self)
            .map(|i| i as StageId)
            .unwrap_or(StageId::MAX)
    }

    /// Erased form, validated like a runtime set.
    fn info() -> Result<Arc<StageSetInfo>> {
        let stages = Self::STAGES.iter().map(|s| (s.name(), s.role()));
        StageSetInfo::new(Self::NAME, stages).map(Arc::new)
    }
}

/// Type-erased stage set, shared by every pipeline that uses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSetInfo {
    name: String,
    stages: Vec<String>,
    roles: Vec<StageRole>,
}

impl StageSetInfo {
    /// Build a stage set at runtime.
    pub fn new<'a>(
        name: impl Into<String>,
        stages: impl IntoIterator<Item = (&'a str, StageRole)>,
    ) -> Result<Self> {
        let name = name.into();
        let mut seen = HashSet::new();
        let mut names = Vec::new();
        let mut roles = Vec::new();

        for (stage, role) in stages {
            if !seen.insert(stage) {
                return Err(StageflowError::DuplicateStage {
                    set: name,
                    stage: stage.to_string(),
                });
            }
            names.push(stage.to_string());
            roles.push(role);
        }

        if names.is_empty() {
            return Err(StageflowError::Config(format!(
                "stage set '{name}' has no stages"
            )));
        }
        if names.len() > StageId::MAX as usize {
            return Err(StageflowError::Config(format!(
                "stage set '{name}' has {} stages (max {})",
                names.len(),
                StageId::MAX
            )));
        }

        Ok(Self {
            name,
            stages: names,
            roles,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_name(&self, stage: StageId) -> &str {
        self.stages
            .get(stage as usize)
            .map(String::as_str)
            .unwrap_or("?")
    }

    pub fn role(&self, stage: StageId) -> StageRole {
        self.roles.get(stage as usize).copied().unwrap_or_default()
    }

    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(String::as_str)
    }

    pub fn last(&self) -> StageId {
        (self.stages.len() - 1) as StageId
    }
}

/// One-shot activity: decide, do, signal completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Schedule,
    Run,
    Done,
}

impl StageSet for Event {
    const NAME: &'static str = "Event";
    const STAGES: &'static [Self] = &[Event::Schedule, Event::Run, Event::Done];

    fn name(self) -> &'static str {
        match self {
            Event::Schedule => "Schedule",
            Event::Run => "Run",
            Event::Done => "Done",
        }
    }
}

/// Lifecycle of a container of items (entities, meshes, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    New,
    Modify,
    Ready,
    Delete,
    Clear,
}

impl StageSet for Container {
    const NAME: &'static str = "Container";
    const STAGES: &'static [Self] = &[
        Container::New,
        Container::Modify,
        Container::Ready,
        Container::Delete,
        Container::Clear,
    ];

    fn name(self) -> &'static str {
        match self {
            Container::New => "New",
            Container::Modify => "Modify",
            Container::Ready => "Ready",
            Container::Delete => "Delete",
            Container::Clear => "Clear",
        }
    }

    fn role(self) -> StageRole {
        match self {
            Container::Clear => StageRole::Clear,
            _ => StageRole::Gate,
        }
    }
}

/// Transient per-frame request queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Queue {
    Modify,
    Schedule,
    Read,
    Clear,
}

impl StageSet for Queue {
    const NAME: &'static str = "Queue";
    const STAGES: &'static [Self] = &[Queue::Modify, Queue::Schedule, Queue::Read, Queue::Clear];

    fn name(self) -> &'static str {
        match self {
            Queue::Modify => "Modify",
            Queue::Schedule => "Schedule",
            Queue::Read => "Read",
            Queue::Clear => "Clear",
        }
    }

    fn role(self) -> StageRole {
        match self {
            Queue::Clear => StageRole::Clear,
            _ => StageRole::Gate,
        }
    }
}

/// Derived data that is recomputed only when something dirtied it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intermediate {
    Resize,
    Modify,
    Schedule,
    UseOrRun,
    Clear,
}

impl StageSet for Intermediate {
    const NAME: &'static str = "Intermediate";
    const STAGES: &'static [Self] = &[
        Intermediate::Resize,
        Intermediate::Modify,
        Intermediate::Schedule,
        Intermediate::UseOrRun,
        Intermediate::Clear,
    ];

    fn name(self) -> &'static str {
        match self {
            Intermediate::Resize => "Resize",
            Intermediate::Modify => "Modify",
            Intermediate::Schedule => "Schedule",
            Intermediate::UseOrRun => "UseOrRun",
            Intermediate::Clear => "Clear",
        }
    }

    fn role(self) -> StageRole {
        match self {
            Intermediate::UseOrRun => StageRole::UseOrRun,
            Intermediate::Clear => StageRole::Clear,
            _ => StageRole::Gate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_sets_erase_names_and_roles() {
        let info = Intermediate::info().unwrap();
        assert_eq!(info.name(), "Intermediate");
        assert_eq!(info.len(), 5);
        assert_eq!(info.stage_name(Intermediate::UseOrRun.id()), "UseOrRun");
        assert_eq!(info.role(Intermediate::UseOrRun.id()), StageRole::UseOrRun);
        assert_eq!(info.role(Intermediate::Clear.id()), StageRole::Clear);
        assert_eq!(info.role(Intermediate::Resize.id()), StageRole::Gate);
        assert_eq!(info.last(), 4);
    }

    #[test]
    fn stage_ids_follow_declaration_order() {
        assert_eq!(Container::New.id(), 0);
        assert_eq!(Container::Clear.id(), 4);
        assert_eq!(Queue::Schedule.id(), 1);
    }

    #[test]
    fn runtime_set_rejects_duplicate_stage() {
        let err = StageSetInfo::new("Bad", [("New", StageRole::Gate), ("New", StageRole::Clear)])
            .unwrap_err();
        match err {
            StageflowError::DuplicateStage { set, stage } => {
                assert_eq!(set, "Bad");
                assert_eq!(stage, "New");
            }
            other => panic!("expected DuplicateStage, got {other:?}"),
        }
    }

    #[test]
    fn runtime_set_holds_at_most_255_stages() {
        let names: Vec<String> = (0..=255).map(|i| format!("s{i}")).collect();
        let stages = |n: usize| names[..n].iter().map(|s| (s.as_str(), StageRole::Gate));

        let full = StageSetInfo::new("Full", stages(255)).unwrap();
        assert_eq!(full.len(), 255);
        assert_eq!(full.last(), 254);
        assert!(matches!(
            StageSetInfo::new("Over", stages(256)),
            Err(StageflowError::Config(_))
        ));
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Twice {
        First,
        Second,
    }

    impl StageSet for Twice {
        const NAME: &'static str = "Twice";
        const STAGES: &'static [Self] = &[Twice::First, Twice::Second];

        fn name(self) -> &'static str {
            "Same"
        }
    }

    #[test]
    fn typed_set_with_duplicate_names_is_rejected() {
        assert!(matches!(
            Twice::info(),
            Err(StageflowError::DuplicateStage { stage, .. }) if stage == "Same"
        ));
        let mut fw = crate::framework::Framework::new();
        assert!(fw.create_pipeline::<Twice>("twice").is_err());
        assert_eq!(fw.pipeline_ids().count(), 0);
    }

    #[test]
    fn runtime_set_rejects_empty() {
        assert!(StageSetInfo::new("Empty", []).is_err());
    }
}
