//! Resumable step-sequences and the handle that tracks one in flight.
//!
//! A `Routine` is an explicit state machine exposing a single
//! resume-one-step operation. Each resumption either yields the next wait
//! condition or reports completion; an error terminates that routine only
//! (logged, never propagated into the tick).

use std::cell::Cell;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::wait::Wait;

/// Snapshot of the host clock handed to every step.
#[derive(Debug, Clone, Copy)]
pub struct TickContext {
    /// Monotonic frame index, incremented once per host tick.
    pub frame: u64,
    /// Duration of the last completed tick, milliseconds.
    pub delta_ms: f64,
}

/// Result of resuming a routine one step.
pub enum Step {
    /// Suspended; resume once the condition is satisfied.
    Yield(Wait),
    /// The sequence is exhausted and must not be resumed again.
    Done,
}

/// A lazily-resumable step-sequence. Finite, not restartable once exhausted.
pub trait Routine {
    fn resume(&mut self, ctx: &TickContext) -> anyhow::Result<Step>;
}

/// Process-unique coroutine identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoId(u64);

impl CoId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        CoId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for CoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "co-{}", self.0)
    }
}

/// Cheap identity token for a started coroutine. Stays valid as a name even
/// after the coroutine finishes (it simply stops matching anything).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoHandle {
    id: CoId,
}

impl CoHandle {
    pub fn id(&self) -> CoId {
        self.id
    }
}

impl std::fmt::Display for CoHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.id.fmt(f)
    }
}

/// Liveness gate for everything scheduled on behalf of one object.
///
/// Hold an `Owner` alongside the object; hand its token to `start`. Once the
/// `Owner` is dropped (or explicitly invalidated), every handle carrying its
/// token is discarded the next time it comes due — lazily, with no
/// unregistration call required.
#[derive(Debug)]
pub struct Owner {
    alive: Rc<Cell<bool>>,
}

impl Owner {
    pub fn new() -> Self {
        Self {
            alive: Rc::new(Cell::new(true)),
        }
    }

    /// Token to attach to started coroutines.
    pub fn token(&self) -> OwnerRef {
        OwnerRef {
            alive: Rc::downgrade(&self.alive),
        }
    }

    /// Mark dead without dropping. Scheduled work is discarded as it comes due.
    pub fn invalidate(&self) {
        self.alive.set(false);
    }

    pub(crate) fn owns(&self, token: &OwnerRef) -> bool {
        std::ptr::eq(Rc::as_ptr(&self.alive), token.alive.as_ptr())
    }
}

impl Default for Owner {
    fn default() -> Self {
        Self::new()
    }
}

/// Weak side of an [`Owner`].
#[derive(Debug, Clone)]
pub struct OwnerRef {
    alive: Weak<Cell<bool>>,
}

impl OwnerRef {
    pub fn is_alive(&self) -> bool {
        self.alive.upgrade().is_some_and(|flag| flag.get())
    }
}

/// Outcome of one resumption, as seen by the registry.
pub(crate) enum StepOutcome {
    Yielded,
    Completed,
    Faulted,
}

/// One in-flight coroutine: the routine, an optional owner token, and the
/// last yielded wait condition ("current").
pub struct Coroutine {
    id: CoId,
    routine: Box<dyn Routine>,
    owner: Option<OwnerRef>,
    current: Option<Wait>,
}

impl Coroutine {
    pub fn new(routine: Box<dyn Routine>, owner: Option<OwnerRef>) -> Self {
        Self {
            id: CoId::next(),
            routine,
            owner,
            current: None,
        }
    }

    pub fn handle(&self) -> CoHandle {
        CoHandle { id: self.id }
    }

    /// The last yielded wait condition, if any.
    pub fn current_wait(&self) -> Option<&Wait> {
        self.current.as_ref()
    }

    pub(crate) fn current_wait_mut(&mut self) -> Option<&mut Wait> {
        self.current.as_mut()
    }

    /// True when an owner token was attached and that owner is gone.
    pub(crate) fn owner_dead(&self) -> bool {
        matches!(&self.owner, Some(token) if !token.is_alive())
    }

    pub(crate) fn owned_by(&self, owner: &Owner) -> bool {
        matches!(&self.owner, Some(token) if owner.owns(token))
    }

    /// Resume the underlying routine one step. A fault is logged and treated
    /// as completion; it never escapes to the tick.
    pub(crate) fn resume_step(&mut self, ctx: &TickContext) -> StepOutcome {
        match self.routine.resume(ctx) {
            Ok(Step::Yield(wait)) => {
                self.current = Some(wait);
                StepOutcome::Yielded
            }
            Ok(Step::Done) => {
                self.current = None;
                StepOutcome::Completed
            }
            Err(e) => {
                tracing::error!("💥 Coroutine {} step failed, dropping it: {e:#}", self.id);
                self.current = None;
                StepOutcome::Faulted
            }
        }
    }
}

impl std::fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coroutine")
            .field("id", &self.id)
            .field("current", &self.current)
            .field("has_owner", &self.owner.is_some())
            .finish()
    }
}
