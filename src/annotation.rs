//! # Annotation Tracking Module
//!
//! Tracks operator edits to per-sample anomaly labels against the last-saved
//! baseline and computes exactly what changed.
//!
//! ## Lifecycle
//! 1. `EditState::new` copies the loaded samples into a working copy and a baseline
//! 2. `toggle` / `set` / `apply_reset_all` mutate only the working copy
//! 3. `compute_diff` compares working copy and baseline, fresh every call
//! 4. `begin_save` snapshots the diff; `finish_save` commits that snapshot
//!    only when the store reported success
//!
//! A failed save leaves everything untouched so the operator can retry.
//! Toggles made while a save is in flight stay dirty after it commits.

use crate::error::StoreError;
use crate::sample::Sample;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One label change between baseline and working copy
#[derive(Debug, Clone, PartialEq)]
pub struct LabelChange {
    pub sequence_index: usize,
    /// Raw timestamp identifying the sample in the store
    pub timestamp: Value,
    pub from: u8,
    pub to: u8,
}

/// Label update handed to the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyUpdate {
    pub timestamp: Value,
    pub anomaly: u8,
}

impl From<&LabelChange> for AnomalyUpdate {
    fn from(change: &LabelChange) -> Self {
        Self {
            timestamp: change.timestamp.clone(),
            anomaly: change.to,
        }
    }
}

/// A bulk reset that has been requested but not yet confirmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetAllRequest {
    affected: Vec<usize>,
}

impl ResetAllRequest {
    /// Number of labels the reset would clear
    pub fn affected(&self) -> usize {
        self.affected.len()
    }
}

/// Diff captured when a save is issued
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSave {
    changes: Vec<LabelChange>,
}

impl PendingSave {
    pub fn changes(&self) -> &[LabelChange] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn updates(&self) -> Vec<AnomalyUpdate> {
        self.changes.iter().map(AnomalyUpdate::from).collect()
    }
}

/// Working copy and last-saved baseline of a session's samples
#[derive(Debug, Clone, PartialEq)]
pub struct EditState {
    working: Vec<Sample>,
    baseline: Vec<Sample>,
}

impl EditState {
    pub fn new(samples: &[Sample]) -> Self {
        Self {
            working: samples.to_vec(),
            baseline: samples.to_vec(),
        }
    }

    pub fn working(&self) -> &[Sample] {
        &self.working
    }

    pub fn baseline(&self) -> &[Sample] {
        &self.baseline
    }

    pub fn len(&self) -> usize {
        self.working.len()
    }

    pub fn is_empty(&self) -> bool {
        self.working.is_empty()
    }

    /// Flip a label between 0 and 1. Out-of-range indices are ignored.
    pub fn toggle(&mut self, index: usize) -> Option<u8> {
        let sample = self.working.get_mut(index)?;
        sample.anomaly = 1 - sample.anomaly;
        Some(sample.anomaly)
    }

    /// Set a label explicitly. Out-of-range indices are ignored.
    pub fn set(&mut self, index: usize, anomalous: bool) -> Option<u8> {
        let sample = self.working.get_mut(index)?;
        sample.anomaly = anomalous as u8;
        Some(sample.anomaly)
    }

    /// First step of a bulk reset: describe what would be cleared
    pub fn request_reset_all(&self) -> ResetAllRequest {
        let affected = self
            .working
            .iter()
            .enumerate()
            .filter(|(_, s)| s.anomaly == 1)
            .map(|(i, _)| i)
            .collect::<Vec<_>>();
        log::info!("Reset of all labels requested ({} labelled samples)", affected.len());
        ResetAllRequest { affected }
    }

    /// Second step of a bulk reset: clear every label in the working copy
    pub fn apply_reset_all(&mut self, request: ResetAllRequest) -> usize {
        for sample in &mut self.working {
            sample.anomaly = 0;
        }
        log::info!("Cleared all labels ({} were set when requested)", request.affected());
        request.affected()
    }

    /// Revert the working copy to the baseline
    pub fn discard_changes(&mut self) {
        self.working = self.baseline.clone();
    }

    pub fn compute_diff(&self) -> Vec<LabelChange> {
        self.working
            .iter()
            .zip(&self.baseline)
            .enumerate()
            .filter(|(_, (working, baseline))| working.anomaly != baseline.anomaly)
            .map(|(index, (working, baseline))| LabelChange {
                sequence_index: index,
                timestamp: working.timestamp().cloned().unwrap_or(Value::Null),
                from: baseline.anomaly,
                to: working.anomaly,
            })
            .collect()
    }

    pub fn dirty_count(&self) -> usize {
        self.working
            .iter()
            .zip(&self.baseline)
            .filter(|(w, b)| w.anomaly != b.anomaly)
            .count()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty_count() > 0
    }

    pub fn anomaly_count(&self) -> usize {
        self.working.iter().filter(|s| s.anomaly == 1).count()
    }

    /// Make the whole working copy the new baseline
    pub fn commit(&mut self) {
        self.baseline = self.working.clone();
    }

    /// Snapshot the diff before handing it to the store
    pub fn begin_save(&self) -> PendingSave {
        PendingSave {
            changes: self.compute_diff(),
        }
    }

    /// Commit exactly the snapshot that was saved
    ///
    /// The store labels by timestamp, so every baseline sample sharing a
    /// changed timestamp takes the saved label.
    pub fn commit_snapshot(&mut self, pending: &PendingSave) {
        for change in &pending.changes {
            if change.timestamp.is_null() {
                if let Some(sample) = self.baseline.get_mut(change.sequence_index) {
                    sample.anomaly = change.to;
                }
                continue;
            }
            for sample in self
                .baseline
                .iter_mut()
                .filter(|sample| sample.timestamp() == Some(&change.timestamp))
            {
                sample.anomaly = change.to;
            }
        }
    }

    /// Settle a save: commit on success, keep all pending edits on failure
    pub fn finish_save(
        &mut self,
        pending: PendingSave,
        result: Result<(), StoreError>,
    ) -> Result<usize, StoreError> {
        match result {
            Ok(()) => {
                self.commit_snapshot(&pending);
                Ok(pending.changes.len())
            }
            Err(e) => Err(e),
        }
    }
}
