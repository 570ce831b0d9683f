use log::warn;
use std::sync::{PoisonError, RwLock};

use super::types::{FilterKind, LocationFilter};
use crate::sample::Sample;
use crate::store::{Preferences, StorageResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterDecision {
    Accept,
    Reject(FilterKind),
}

impl FilterDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, FilterDecision::Accept)
    }
}

/// Runs `filters` in order and reports the first one that rejects.
pub fn evaluate(
    filters: &[LocationFilter],
    candidate: &Sample,
    reference: Option<&Sample>,
) -> FilterDecision {
    filters
        .iter()
        .find(|f| !f.should_upload(candidate, reference))
        .map(|f| FilterDecision::Reject(f.kind()))
        .unwrap_or(FilterDecision::Accept)
}

/// Configured upload policies, at most one per kind, plus their
/// persisted enabled flags.
pub struct FilterChain {
    filters: RwLock<Vec<LocationFilter>>,
    preferences: Preferences,
}

impl FilterChain {
    pub fn new(filters: Vec<LocationFilter>, preferences: Preferences) -> Self {
        let mut merged: Vec<LocationFilter> = Vec::with_capacity(filters.len());
        for filter in filters {
            merge(&mut merged, filter);
        }
        Self {
            filters: RwLock::new(merged),
            preferences,
        }
    }

    /// Configured filters in evaluation order, enabled or not.
    pub fn filters(&self) -> Vec<LocationFilter> {
        self.filters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, kind: FilterKind) -> Option<LocationFilter> {
        self.filters().into_iter().find(|f| f.kind() == kind)
    }

    /// Flag read failures count as disabled.
    pub fn is_enabled(&self, kind: FilterKind) -> bool {
        match self.preferences.filter_enabled(kind) {
            Ok(enabled) => enabled,
            Err(e) => {
                warn!("Failed to read {} filter flag, treating as disabled: {}", kind, e);
                false
            }
        }
    }

    /// Configured filters whose flag is currently set.
    pub fn active_filters(&self) -> Vec<LocationFilter> {
        self.filters()
            .into_iter()
            .filter(|f| self.is_enabled(f.kind()))
            .collect()
    }

    pub fn evaluate(&self, candidate: &Sample, reference: Option<&Sample>) -> FilterDecision {
        evaluate(&self.active_filters(), candidate, reference)
    }

    pub fn should_upload(&self, candidate: &Sample, reference: Option<&Sample>) -> bool {
        self.evaluate(candidate, reference).is_accepted()
    }

    /// Sets the flag for `kind`. A kind with no configured policy gets its
    /// default parameters. Returns whether the policy list changed.
    pub fn enable(&self, kind: FilterKind) -> StorageResult<bool> {
        self.preferences.set_filter_enabled(kind, true)?;

        let mut filters = self.filters.write().unwrap_or_else(PoisonError::into_inner);
        if filters.iter().any(|f| f.kind() == kind) {
            return Ok(false);
        }
        filters.push(kind.default_filter());
        Ok(true)
    }

    pub fn disable(&self, kind: FilterKind) -> StorageResult<()> {
        self.preferences.set_filter_enabled(kind, false)
    }

    /// Replaces the parameters of the same-kind policy, or appends the
    /// policy if none is configured. Returns true when an existing policy
    /// was updated.
    pub fn upsert(&self, filter: LocationFilter) -> bool {
        let mut filters = self.filters.write().unwrap_or_else(PoisonError::into_inner);
        merge(&mut filters, filter)
    }
}

fn merge(filters: &mut Vec<LocationFilter>, filter: LocationFilter) -> bool {
    match filters.iter_mut().find(|f| f.kind() == filter.kind()) {
        Some(existing) => {
            *existing = filter;
            true
        }
        None => {
            filters.push(filter);
            false
        }
    }
}
