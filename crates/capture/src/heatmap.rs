//! Heatmap aggregation.
//!
//! Interactions are bucketed into grid cells per page. A repeat hit on the
//! same cell, element and interaction type bumps the existing point. Query
//! filters never touch the stored points.

use engine_core::limits::{HEATMAP_GRID_SIZE, MAX_HEATMAP_POINTS_PER_PAGE};
use engine_core::{intensity_for, EventTarget, HeatmapPoint, InteractionType, Result, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use storage::export::{self, ExportFormat};
use storage::{keys, PersistenceGateway};
use tracing::{debug, warn};

/// Heatmap configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatmapConfig {
    /// Grid cell size in pixels
    #[serde(default = "default_grid_size")]
    pub grid_size: f64,
    /// Points kept per page; least recently seen evicted first
    #[serde(default = "default_max_points_per_page")]
    pub max_points_per_page: usize,
}

fn default_grid_size() -> f64 {
    HEATMAP_GRID_SIZE
}

fn default_max_points_per_page() -> usize {
    MAX_HEATMAP_POINTS_PER_PAGE
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            grid_size: default_grid_size(),
            max_points_per_page: default_max_points_per_page(),
        }
    }
}

/// Query-time filters. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeatmapQuery {
    /// One page, or every page when `None`
    pub page: Option<String>,
    pub interaction: Option<InteractionType>,
    /// Only points seen at or after this time
    pub since: Option<Timestamp>,
    /// Only points first seen at or before this time
    pub until: Option<Timestamp>,
}

impl HeatmapQuery {
    pub fn page(page: impl Into<String>) -> Self {
        Self {
            page: Some(page.into()),
            ..Self::default()
        }
    }

    pub fn with_interaction(mut self, interaction: InteractionType) -> Self {
        self.interaction = Some(interaction);
        self
    }

    pub fn between(mut self, since: Timestamp, until: Timestamp) -> Self {
        self.since = Some(since);
        self.until = Some(until);
        self
    }

    fn matches(&self, point: &HeatmapPoint) -> bool {
        self.interaction.map_or(true, |i| point.interaction == i)
            && self.since.map_or(true, |t| point.last_seen >= t)
            && self.until.map_or(true, |t| point.first_seen <= t)
    }
}

/// Per-page point lists with write-behind persistence.
pub struct HeatmapAggregator {
    config: HeatmapConfig,
    gateway: PersistenceGateway,
    pages: BTreeMap<String, Vec<HeatmapPoint>>,
    dirty: BTreeSet<String>,
}

impl HeatmapAggregator {
    pub fn new(config: HeatmapConfig, gateway: PersistenceGateway) -> Self {
        Self {
            config,
            gateway,
            pages: BTreeMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    /// Loads every stored page.
    pub fn load(&mut self) {
        for name in self.gateway.names_with_prefix(keys::HEATMAP_PREFIX) {
            let page = name[keys::HEATMAP_PREFIX.len()..].to_string();
            let points: Vec<HeatmapPoint> = self.gateway.load(&name);
            if !points.is_empty() {
                self.pages.insert(page, points);
            }
        }
        debug!(pages = self.pages.len(), "Loaded heatmap data");
    }

    fn cell(&self, coordinate: f64) -> i64 {
        (coordinate / self.config.grid_size).floor() as i64
    }

    /// Records one interaction and returns the resulting point.
    pub fn record(
        &mut self,
        page: &str,
        x: f64,
        y: f64,
        target: &EventTarget,
        interaction: InteractionType,
        now: Timestamp,
    ) -> HeatmapPoint {
        let (cell_x, cell_y) = (self.cell(x), self.cell(y));
        let cap = self.config.max_points_per_page;
        let points = self.pages.entry(page.to_string()).or_default();

        let index = match points
            .iter()
            .position(|p| p.same_key(cell_x, cell_y, &target.element, interaction))
        {
            Some(index) => {
                let point = &mut points[index];
                point.count += 1;
                point.intensity = intensity_for(point.count);
                point.last_seen = point.last_seen.max(now);
                index
            }
            None => {
                points.push(HeatmapPoint {
                    page: page.to_string(),
                    cell_x,
                    cell_y,
                    element: target.element.clone(),
                    element_type: target.element_type.clone(),
                    interaction,
                    count: 1,
                    intensity: intensity_for(1),
                    first_seen: now,
                    last_seen: now,
                });
                points.len() - 1
            }
        };

        let recorded = points[index].clone();
        evict_least_recent(points, cap);
        self.dirty.insert(page.to_string());
        recorded
    }

    /// Points matching `query`, ordered by page then cell.
    pub fn query(&self, query: &HeatmapQuery) -> Vec<HeatmapPoint> {
        let pages: Box<dyn Iterator<Item = &Vec<HeatmapPoint>>> = match &query.page {
            Some(page) => Box::new(self.pages.get(page).into_iter()),
            None => Box::new(self.pages.values()),
        };

        let mut points: Vec<HeatmapPoint> = pages
            .flatten()
            .filter(|p| query.matches(p))
            .cloned()
            .collect();
        points.sort_by(|a, b| {
            (&a.page, a.cell_y, a.cell_x, &a.element).cmp(&(&b.page, b.cell_y, b.cell_x, &b.element))
        });
        points
    }

    pub fn pages(&self) -> Vec<String> {
        self.pages.keys().cloned().collect()
    }

    pub fn point_count(&self, page: &str) -> usize {
        self.pages.get(page).map_or(0, Vec::len)
    }

    /// Writes every page changed since the last flush.
    pub fn flush(&mut self) -> Result<usize> {
        let dirty = std::mem::take(&mut self.dirty);
        let mut written = 0;
        for page in dirty {
            let Some(points) = self.pages.get(&page) else {
                continue;
            };
            if let Err(e) = self.gateway.save(&keys::heatmap(&page), points) {
                warn!(page = %page, error = %e, "Failed to persist heatmap");
                self.dirty.insert(page);
                return Err(e);
            }
            written += 1;
        }
        Ok(written)
    }

    /// Drops one page's points from memory and the store.
    pub fn clear(&mut self, page: &str) -> Result<()> {
        self.pages.remove(page);
        self.dirty.remove(page);
        self.gateway.remove(&keys::heatmap(page))
    }

    pub fn export(&self, query: &HeatmapQuery, format: ExportFormat) -> Result<String> {
        export::export(&self.query(query), format)
    }
}

/// Evicts least recently seen points until at most `cap` remain.
fn evict_least_recent(points: &mut Vec<HeatmapPoint>, cap: usize) {
    while points.len() > cap {
        let Some(oldest) = points
            .iter()
            .enumerate()
            .min_by_key(|(_, p)| p.last_seen)
            .map(|(i, _)| i)
        else {
            return;
        };
        let evicted = points.remove(oldest);
        debug!(page = %evicted.page, element = %evicted.element, "Evicted heatmap point");
    }
}
