use crate::state::{FilterState, FilterStateStore, GroupRecord};
use graphsift_api::{ApiError, CypherResponse};
use graphsift_core::{
    CollapseConfig, Edge, EdgeId, EntityKind, Node, NodeId, Predicate, SessionMode,
    TimeRangeConfig,
};
use graphsift_events::{Event, EventBus};
use graphsift_graph::{
    CollapseEngine, CollapsedView, DEFAULT_TIME_FIELDS, Fallback, GraphSnapshot, LoadReport,
    PredicateReport, PropertyPredicateFilter, PropertySummary, SessionSummary,
    SessionTimeSelector, Visibility, VisibilityResolver, available_properties, discover_sessions,
    discover_time_range,
};
use graphsift_store::{StateStore, StorageError};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("No graph loaded. Call load_graph first.")]
    NoGraph,
    #[error("No {kind} predicate at index {index}")]
    PredicateIndex { kind: &'static str, index: usize },
    #[error("Invalid time window: start {start} is after end {end}")]
    InvalidTimeWindow { start: i64, end: i64 },
    #[error("Backend error: {0}")]
    Api(#[from] ApiError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result of one pass of the filter pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleSet {
    /// Visible ids, synthetic representatives and reroutes included.
    pub view: CollapsedView,
    pub visibility: Visibility,
    pub fallback: Option<Fallback>,
    pub report: PredicateReport,
}

/// What a renderer or file export needs: the visible subgraph and the
/// configuration that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct FilteredViewExport {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub filters: FilterState,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub visible_nodes: usize,
    pub visible_edges: usize,
    pub hidden_nodes: usize,
    pub hidden_edges: usize,
    pub node_groups: usize,
    pub edge_groups: usize,
}

#[derive(Debug, Clone, Default)]
struct Discovery {
    node_properties: Vec<PropertySummary>,
    edge_properties: Vec<PropertySummary>,
    sessions: Vec<SessionSummary>,
    time_range: Option<TimeRangeConfig>,
}

type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

struct ControllerState {
    snapshot: Option<GraphSnapshot>,
    filters: FilterState,
    engine: CollapseEngine,
    discovery: Discovery,
    last: Option<VisibleSet>,
    store: Option<Box<dyn StateStore>>,
    time_fields: Vec<String>,
    clock: Clock,
}

impl ControllerState {
    fn require_snapshot(&self) -> Result<&GraphSnapshot, ControllerError> {
        self.snapshot.as_ref().ok_or(ControllerError::NoGraph)
    }

    fn record_groups(&mut self) {
        for kind in [EntityKind::Node, EntityKind::Edge] {
            self.filters.collapse.get_mut(kind).collapsed = self
                .engine
                .groups(kind)
                .iter()
                .map(|(key, group)| (key.clone(), GroupRecord::from(group)))
                .collect();
        }
    }

    /// Recompute hidden sets after the engine's view changed outside a full apply.
    fn refresh_visibility(&mut self) {
        let Some(snapshot) = self.snapshot.as_ref() else {
            return;
        };
        let view = self.engine.view().clone();
        let visibility = VisibilityResolver::resolve(snapshot, &view.nodes, &view.edges);
        if let Some(last) = self.last.as_mut() {
            last.view = view;
            last.visibility = visibility;
        }
    }
}

/// Headless owner of the filter pipeline.
///
/// Every mutator persists the filter state afterwards. Save failures are
/// logged and published as `FilterStateSaveFailed`; they never undo the change.
#[derive(Clone)]
pub struct FilterController {
    state: Arc<Mutex<ControllerState>>,
    events: EventBus,
}

impl Default for FilterController {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterController {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ControllerState {
                snapshot: None,
                filters: FilterState::default(),
                engine: CollapseEngine::new(),
                discovery: Discovery::default(),
                last: None,
                store: None,
                time_fields: DEFAULT_TIME_FIELDS.iter().map(|f| f.to_string()).collect(),
                clock: Arc::new(|| chrono::Utc::now().timestamp_millis()),
            })),
            events: EventBus::new(),
        }
    }

    /// Attach a store and restore whatever filter state it holds.
    pub fn with_store(self, store: Box<dyn StateStore>) -> Result<Self, ControllerError> {
        let restored = FilterStateStore::load(store.as_ref())?;
        {
            let mut s = self.state.lock();
            if let Some(filters) = restored {
                tracing::info!("Restored filter state from store");
                s.filters = filters;
                self.events.publish(Event::FilterStateRestored);
            }
            s.store = Some(store);
        }
        Ok(self)
    }

    /// Node properties scanned, in order, for the time-range bounds.
    pub fn with_time_fields<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.lock().time_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the wall clock (epoch ms) used by `session-recent` and exports.
    pub fn with_clock(self, clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.state.lock().clock = Arc::new(clock);
        self
    }

    /// Receiver for pipeline events. The channel is unbounded and every apply
    /// publishes several events, so long-lived hosts must drain it (or call
    /// `event_bus().drain()`) regularly.
    pub fn events(&self) -> Receiver<Event> {
        self.events.receiver()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    fn persist(&self, s: &mut ControllerState) {
        let Some(store) = s.store.as_mut() else {
            return;
        };
        match FilterStateStore::save(store.as_mut(), &s.filters) {
            Ok(()) => {
                tracing::debug!("Saved filter state");
                self.events.publish(Event::FilterStateSaved);
            }
            Err(e) => {
                tracing::warn!("Failed to save filter state: {}", e);
                self.events.publish(Event::FilterStateSaveFailed {
                    error: e.to_string(),
                });
            }
        }
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut FilterState) -> R) -> R {
        let mut s = self.state.lock();
        let result = f(&mut s.filters);
        self.persist(&mut s);
        result
    }

    // ------------------------------------------------------------------
    // Graph lifecycle
    // ------------------------------------------------------------------

    /// Install a new snapshot. Discovery is re-run and every collapse group
    /// from the previous graph is dropped.
    pub fn load_graph(&self, snapshot: GraphSnapshot) {
        self.install_graph(snapshot, 0);
    }

    fn install_graph(&self, snapshot: GraphSnapshot, dropped_edges: usize) {
        let mut s = self.state.lock();

        let fields: Vec<&str> = s.time_fields.iter().map(String::as_str).collect();
        let discovery = Discovery {
            node_properties: available_properties(&snapshot, EntityKind::Node),
            edge_properties: available_properties(&snapshot, EntityKind::Edge),
            sessions: discover_sessions(&snapshot),
            time_range: discover_time_range(&snapshot, &fields),
        };

        match &discovery.time_range {
            Some(found) => {
                let window = &mut s.filters.time_range;
                if window.property_name == found.property_name {
                    window.min_time = found.min_time;
                    window.max_time = found.max_time;
                    window.clamp_window();
                } else {
                    *window = found.clone();
                }
                self.events.publish(Event::TimeRangeDiscovered {
                    property: found.property_name.clone().unwrap_or_default(),
                    min_time: found.min_time,
                    max_time: found.max_time,
                });
            }
            None => s.filters.time_range = TimeRangeConfig::default(),
        }

        let dissolved = s.engine.cleanup();
        if dissolved > 0 {
            self.events.publish(Event::CollapseGroupsCleared { dissolved });
        }

        tracing::info!(
            "Loaded graph with {} nodes and {} edges",
            snapshot.node_count(),
            snapshot.edge_count()
        );
        self.events.publish(Event::GraphLoaded {
            node_count: snapshot.node_count(),
            edge_count: snapshot.edge_count(),
            dropped_edges,
        });
        self.events.publish(Event::SessionsDiscovered {
            count: discovery.sessions.len(),
        });

        s.discovery = discovery;
        s.snapshot = Some(snapshot);
        s.last = None;
    }

    /// Ingest a backend query response and load it.
    pub fn load_response(&self, response: CypherResponse) -> Result<LoadReport, ControllerError> {
        let (snapshot, report) = response.into_snapshot()?;
        let dropped = report.dropped_edges.len();
        self.install_graph(snapshot, dropped);
        if dropped > 0 {
            self.events.publish(Event::ShowWarning {
                message: format!(
                    "{dropped} edges referenced nodes outside the result and were dropped"
                ),
            });
        }
        Ok(report)
    }

    pub fn has_graph(&self) -> bool {
        self.state.lock().snapshot.is_some()
    }

    // ------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------

    pub fn sessions(&self) -> Vec<SessionSummary> {
        self.state.lock().discovery.sessions.clone()
    }

    pub fn available_properties(&self, kind: EntityKind) -> Vec<PropertySummary> {
        let s = self.state.lock();
        match kind {
            EntityKind::Node => s.discovery.node_properties.clone(),
            EntityKind::Edge => s.discovery.edge_properties.clone(),
        }
    }

    /// Bounds discovered on the current graph, before any user window.
    pub fn discovered_time_range(&self) -> Option<TimeRangeConfig> {
        self.state.lock().discovery.time_range.clone()
    }

    pub fn filters(&self) -> FilterState {
        self.state.lock().filters.clone()
    }

    // ------------------------------------------------------------------
    // Mutators
    // ------------------------------------------------------------------

    pub fn set_session_mode(&self, mode: SessionMode) {
        self.mutate(|f| f.session.mode = mode);
    }

    pub fn select_session(&self, session_id: Option<String>) {
        self.mutate(|f| f.session.selected_session_id = session_id);
    }

    /// Set the selected window; it is clamped to the discovered bounds when
    /// a time property is known.
    pub fn set_time_window(&self, start: i64, end: i64) -> Result<(), ControllerError> {
        if start > end {
            return Err(ControllerError::InvalidTimeWindow { start, end });
        }
        self.mutate(|f| {
            f.time_range.start_time = start;
            f.time_range.end_time = end;
            if f.time_range.property_name.is_some() {
                f.time_range.clamp_window();
            }
        });
        Ok(())
    }

    /// Append a predicate and return its index.
    pub fn add_predicate(&self, kind: EntityKind, predicate: Predicate) -> usize {
        self.mutate(|f| {
            let list = f.predicates_mut(kind);
            list.push(predicate);
            list.len() - 1
        })
    }

    pub fn set_predicate_enabled(
        &self,
        kind: EntityKind,
        index: usize,
        enabled: bool,
    ) -> Result<(), ControllerError> {
        self.mutate(|f| {
            let predicate = f
                .predicates_mut(kind)
                .get_mut(index)
                .ok_or(ControllerError::PredicateIndex {
                    kind: kind.as_str(),
                    index,
                })?;
            predicate.enabled = enabled;
            Ok(())
        })
    }

    pub fn remove_predicate(
        &self,
        kind: EntityKind,
        index: usize,
    ) -> Result<Predicate, ControllerError> {
        self.mutate(|f| {
            let list = f.predicates_mut(kind);
            if index >= list.len() {
                return Err(ControllerError::PredicateIndex {
                    kind: kind.as_str(),
                    index,
                });
            }
            Ok(list.remove(index))
        })
    }

    pub fn set_collapse(&self, kind: EntityKind, config: CollapseConfig) {
        self.mutate(|f| {
            let state = f.collapse.get_mut(kind);
            state.config = config;
            state.collapsed.clear();
        });
    }

    /// Back to defaults, keeping the time bounds discovered on the current graph.
    pub fn reset_filters(&self) {
        let mut s = self.state.lock();
        s.filters = FilterState::default();
        if let Some(range) = s.discovery.time_range.clone() {
            s.filters.time_range = range;
        }
        s.engine.cleanup();
        s.last = None;
        self.persist(&mut s);
        tracing::info!("Filters reset");
    }

    // ------------------------------------------------------------------
    // Pipeline
    // ------------------------------------------------------------------

    /// Run session/time selection, predicates, collapse and visibility.
    /// Re-running with unchanged inputs yields the same result.
    pub fn apply_all_filters(&self) -> Result<VisibleSet, ControllerError> {
        let mut guard = self.state.lock();
        let s = &mut *guard;
        let snapshot = s.snapshot.as_ref().ok_or(ControllerError::NoGraph)?;
        let now = (s.clock)();

        let selected =
            SessionTimeSelector::resolve(snapshot, &s.filters.session, &s.filters.time_range, now);
        if let Some(fallback) = selected.fallback {
            self.events.publish(Event::SessionFallback {
                mode: s.filters.session.mode,
                message: fallback.message().to_string(),
            });
            self.events.publish(Event::StatusUpdate {
                message: fallback.message().to_string(),
            });
        }

        let (filtered, report) = PropertyPredicateFilter::apply(
            snapshot,
            &selected.selection,
            &s.filters.node_properties,
            &s.filters.edge_properties,
        );
        for invalid in &report.invalid_patterns {
            self.events.publish(Event::InvalidPattern {
                kind: invalid.kind,
                property: invalid.property.clone(),
                pattern: invalid.pattern.clone(),
                error: invalid.error.clone(),
            });
        }

        let view = s
            .engine
            .collapse(
                snapshot,
                &filtered,
                &s.filters.collapse.nodes.config,
                &s.filters.collapse.edges.config,
            )
            .clone();
        if s.engine.is_collapsed() {
            self.events.publish(Event::GroupsCollapsed {
                node_groups: s.engine.groups(EntityKind::Node).len(),
                edge_groups: s.engine.groups(EntityKind::Edge).len(),
            });
        }

        let visibility = VisibilityResolver::resolve(snapshot, &view.nodes, &view.edges);
        tracing::debug!(
            selected = selected.selection.nodes.len(),
            filtered = filtered.nodes.len(),
            visible = view.nodes.len(),
            hidden = visibility.hidden_nodes.len(),
            "filters applied"
        );
        self.events.publish(Event::FiltersApplied {
            visible_nodes: view.nodes.len(),
            visible_edges: view.edges.len(),
            hidden_nodes: visibility.hidden_nodes.len(),
            hidden_edges: visibility.hidden_edges.len(),
        });

        let result = VisibleSet {
            view,
            visibility,
            fallback: selected.fallback,
            report,
        };
        s.last = Some(result.clone());

        let before = (
            s.filters.collapse.nodes.collapsed.clone(),
            s.filters.collapse.edges.collapsed.clone(),
        );
        s.record_groups();
        if before.0 != s.filters.collapse.nodes.collapsed
            || before.1 != s.filters.collapse.edges.collapsed
        {
            self.persist(s);
        }
        Ok(result)
    }

    /// Expand one collapsed node or edge group by its representative id.
    /// Returns the restored member ids, or `None` for an unknown id.
    pub fn expand_group(
        &self,
        representative_id: &str,
    ) -> Result<Option<Vec<String>>, ControllerError> {
        let mut guard = self.state.lock();
        let s = &mut *guard;
        let snapshot = s.snapshot.as_ref().ok_or(ControllerError::NoGraph)?;

        let node_id = NodeId::new(representative_id);
        let edge_id = EdgeId::new(representative_id);
        let restored: Vec<String> = if s.engine.representative(&node_id).is_some() {
            s.engine
                .expand(snapshot, &node_id)
                .unwrap_or_default()
                .into_iter()
                .map(|id| id.0)
                .collect()
        } else if s.engine.representative_edge(&edge_id).is_some() {
            s.engine
                .expand_edge(&edge_id)
                .unwrap_or_default()
                .into_iter()
                .map(|id| id.0)
                .collect()
        } else {
            tracing::warn!("Ignoring expand of unknown group {}", representative_id);
            return Ok(None);
        };

        s.refresh_visibility();
        s.record_groups();
        self.persist(s);
        self.events.publish(Event::CollapseGroupExpanded {
            representative_id: representative_id.to_string(),
            restored: restored.len(),
        });
        Ok(Some(restored))
    }

    /// Expand every active group and switch collapsing off for both kinds.
    pub fn expand_all_collapsed(&self) {
        let mut guard = self.state.lock();
        let s = &mut *guard;
        let groups =
            s.engine.groups(EntityKind::Node).len() + s.engine.groups(EntityKind::Edge).len();
        if let Some(snapshot) = s.snapshot.as_ref() {
            s.engine.expand_all(snapshot);
        }
        for kind in [EntityKind::Node, EntityKind::Edge] {
            let state = s.filters.collapse.get_mut(kind);
            state.config.enabled = false;
            state.collapsed.clear();
        }
        s.refresh_visibility();
        self.persist(s);
        self.events.publish(Event::CollapseGroupsCleared { dissolved: groups });
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    pub fn last_applied(&self) -> Option<VisibleSet> {
        self.state.lock().last.clone()
    }

    pub fn visibility(&self) -> Option<Visibility> {
        self.state.lock().last.as_ref().map(|v| v.visibility.clone())
    }

    /// The visible subgraph with synthetic entities resolved, plus the
    /// filters that produced it. Applies the filters first if needed.
    pub fn export_filtered_view(&self) -> Result<FilteredViewExport, ControllerError> {
        if self.state.lock().last.is_none() {
            self.apply_all_filters()?;
        }
        let s = self.state.lock();
        let snapshot = s.require_snapshot()?;
        let view = s
            .last
            .as_ref()
            .map(|last| last.view.clone())
            .unwrap_or_default();

        let nodes = view
            .nodes
            .iter()
            .filter_map(|id| snapshot.node(id).or_else(|| s.engine.synthetic_node(id)))
            .cloned()
            .collect();
        let edges = view
            .edges
            .iter()
            .filter_map(|id| snapshot.edge(id).or_else(|| s.engine.synthetic_edge(id)))
            .cloned()
            .collect();

        let now = (s.clock)();
        let timestamp = chrono::DateTime::from_timestamp_millis(now)
            .unwrap_or_default()
            .to_rfc3339();
        Ok(FilteredViewExport {
            nodes,
            edges,
            filters: s.filters.clone(),
            timestamp,
        })
    }

    pub fn stats(&self) -> FilterStats {
        let s = self.state.lock();
        let Some(snapshot) = s.snapshot.as_ref() else {
            return FilterStats::default();
        };
        let mut stats = FilterStats {
            total_nodes: snapshot.node_count(),
            total_edges: snapshot.edge_count(),
            node_groups: s.engine.groups(EntityKind::Node).len(),
            edge_groups: s.engine.groups(EntityKind::Edge).len(),
            ..Default::default()
        };
        if let Some(last) = &s.last {
            stats.visible_nodes = last.view.nodes.len();
            stats.visible_edges = last.view.edges.len();
            stats.hidden_nodes = last.visibility.hidden_nodes.len();
            stats.hidden_edges = last.visibility.hidden_edges.len();
        }
        stats
    }
}
