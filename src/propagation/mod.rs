// Filter propagation: Chart -> Panel -> Operator -> Stage
//
// Every tier holds its children in a Broadcaster. A change is fanned out to
// every child except the one it came from, identified by handle.

pub mod chart;
pub mod operator;
pub mod panel;
pub mod stage;

pub use chart::{BinView, Chart, HeatmapChart, HistogramChart, HistogramView};
pub use operator::Operator;
pub use panel::Panel;
pub use stage::{Origin, Stage};

use crate::error::{EngineError, Result};
use crate::index::IdSet;
use serde::Serialize;
use tracing::trace;

/// Handle of a subscriber, unique within its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct WidgetId(usize);

struct Subscription<L> {
    id: WidgetId,
    name: String,
    listener: L,
}

/// Ordered list of named subscribers
pub struct Broadcaster<L> {
    subscriptions: Vec<Subscription<L>>,
    next: usize,
}

impl<L> Default for Broadcaster<L> {
    fn default() -> Self {
        Self { subscriptions: Vec::new(), next: 0 }
    }
}

impl<L> Broadcaster<L> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, name: &str, listener: L) -> WidgetId {
        let id = WidgetId(self.next);
        self.next += 1;
        self.subscriptions.push(Subscription { id, name: name.to_string(), listener });
        id
    }

    pub fn unsubscribe(&mut self, id: WidgetId) -> Option<L> {
        let pos = self.subscriptions.iter().position(|s| s.id == id)?;
        Some(self.subscriptions.remove(pos).listener)
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// First subscriber registered under `name`
    pub fn find(&self, name: &str) -> Option<WidgetId> {
        self.subscriptions.iter().find(|s| s.name == name).map(|s| s.id)
    }

    pub fn name_of(&self, id: WidgetId) -> Option<&str> {
        self.subscriptions.iter().find(|s| s.id == id).map(|s| s.name.as_str())
    }

    pub fn get(&self, id: WidgetId) -> Option<&L> {
        self.subscriptions.iter().find(|s| s.id == id).map(|s| &s.listener)
    }

    pub fn get_mut(&mut self, id: WidgetId) -> Option<&mut L> {
        self.subscriptions.iter_mut().find(|s| s.id == id).map(|s| &mut s.listener)
    }

    pub fn lookup(&self, id: WidgetId) -> Result<&L> {
        self.get(id).ok_or_else(|| EngineError::UnknownWidget(format!("#{}", id.0)))
    }

    pub fn lookup_mut(&mut self, id: WidgetId) -> Result<&mut L> {
        self.get_mut(id).ok_or_else(|| EngineError::UnknownWidget(format!("#{}", id.0)))
    }

    pub fn ids(&self) -> Vec<WidgetId> {
        self.subscriptions.iter().map(|s| s.id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (WidgetId, &str, &L)> {
        self.subscriptions.iter().map(|s| (s.id, s.name.as_str(), &s.listener))
    }

    /// Call `f` once on every subscriber except `source`, in registration
    /// order. Stops at the first error. Returns how many were called.
    pub fn broadcast<F>(&mut self, source: Option<WidgetId>, mut f: F) -> Result<usize>
    where
        F: FnMut(&mut L) -> Result<()>,
    {
        self.broadcast_with(source, |_, listener| f(listener))
    }

    /// `broadcast`, also passing each subscriber's handle
    pub fn broadcast_with<F>(&mut self, source: Option<WidgetId>, mut f: F) -> Result<usize>
    where
        F: FnMut(WidgetId, &mut L) -> Result<()>,
    {
        let mut notified = 0;
        for sub in self.subscriptions.iter_mut().filter(|s| Some(s.id) != source) {
            trace!(target_widget = %sub.name, "notify");
            f(sub.id, &mut sub.listener)?;
            notified += 1;
        }
        Ok(notified)
    }
}

/// Where a widget is in handling its own interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum FilterState {
    #[default]
    Idle,
    Filtering,
    Propagating,
}

/// Per-widget interaction state plus the last selection it broadcast
#[derive(Debug, Clone, Default)]
pub struct SelectionTracker {
    state: FilterState,
    last: Option<IdSet>,
}

impl SelectionTracker {
    pub fn state(&self) -> FilterState {
        self.state
    }

    pub fn last_broadcast(&self) -> Option<&IdSet> {
        self.last.as_ref()
    }

    pub fn begin(&mut self) {
        self.state = FilterState::Filtering;
    }

    /// Move to `Propagating` if `ids` differs from the last broadcast set,
    /// back to `Idle` otherwise.
    pub fn offer(&mut self, ids: &IdSet) -> bool {
        if self.last.as_ref() == Some(ids) {
            self.state = FilterState::Idle;
            return false;
        }
        self.last = Some(ids.clone());
        self.state = FilterState::Propagating;
        true
    }

    pub fn finish(&mut self) {
        self.state = FilterState::Idle;
    }
}
