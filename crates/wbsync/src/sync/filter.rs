//! Filter chain over catalog ids and the ledger of what it excluded.

use std::collections::BTreeMap;
use std::fmt;

use super::progress::{ProgressCallback, SyncProgress, emit};
use super::types::SyncOptions;
use crate::catalog::{Attributes, IdSet};
use crate::marketplace::InternalId;
use crate::text::{DESCRIPTION_MAX_CHARS, TITLE_MAX_CHARS, normalise};

/// Filter stages, in the order they are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterStage {
    Ids,
    Brands,
    Titles,
    Descriptions,
    Barcodes,
}

impl FilterStage {
    pub const ALL: [FilterStage; 5] = [
        FilterStage::Ids,
        FilterStage::Brands,
        FilterStage::Titles,
        FilterStage::Descriptions,
        FilterStage::Barcodes,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            FilterStage::Ids => "Global ID filtering",
            FilterStage::Brands => "Brand filtering",
            FilterStage::Titles => "Appellation filtering",
            FilterStage::Descriptions => "Description filtering",
            FilterStage::Barcodes => "Barcodes filtering",
        }
    }
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which stage excluded each id. An id is recorded at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionLedger {
    entries: BTreeMap<InternalId, FilterStage>,
}

impl ExclusionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an exclusion. Returns `false` if `id` was already recorded.
    pub fn record(&mut self, id: InternalId, stage: FilterStage) -> bool {
        match self.entries.entry(id) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(stage);
                true
            }
        }
    }

    pub fn reason(&self, id: InternalId) -> Option<FilterStage> {
        self.entries.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (InternalId, FilterStage)> + '_ {
        self.entries.iter().map(|(id, stage)| (*id, *stage))
    }

    /// Exclusion count per stage, in stage order. Stages with no exclusions
    /// are omitted.
    pub fn counts_by_stage(&self) -> Vec<(FilterStage, usize)> {
        FilterStage::ALL
            .into_iter()
            .map(|stage| (stage, self.entries.values().filter(|s| **s == stage).count()))
            .filter(|(_, count)| *count > 0)
            .collect()
    }

    /// Log a per-stage summary, with one debug line per excluded id.
    pub fn log(&self) {
        for (stage, count) in self.counts_by_stage() {
            tracing::warn!(stage = stage.name(), count, "Ids excluded");
        }
        for (id, stage) in self.iter() {
            tracing::debug!(internal_id = id, reason = stage.name(), "Excluded id");
        }
    }
}

/// Restricts a candidate id set by presence in each attribute map.
pub struct FilterChain<'a> {
    attributes: &'a Attributes,
    options: &'a SyncOptions,
}

impl<'a> FilterChain<'a> {
    pub fn new(attributes: &'a Attributes, options: &'a SyncOptions) -> Self {
        Self {
            attributes,
            options,
        }
    }

    fn keeps(&self, stage: FilterStage, id: InternalId) -> bool {
        let attrs = self.attributes;
        match stage {
            FilterStage::Ids => attrs.ids.contains(&id),
            FilterStage::Brands => attrs
                .brand(id)
                .is_some_and(|b| !b.trim().is_empty() && !self.options.is_banned_brand(b)),
            FilterStage::Titles => attrs
                .title(id)
                .is_some_and(|t| !normalise(t, TITLE_MAX_CHARS).is_empty()),
            FilterStage::Descriptions => attrs
                .description(id)
                .is_some_and(|d| !normalise(d, DESCRIPTION_MAX_CHARS).is_empty()),
            FilterStage::Barcodes => attrs.barcodes(id).is_some_and(|b| !b.is_empty()),
        }
    }

    /// Whether the stage's source map was loaded. Unloaded stages pass
    /// every id through.
    fn is_loaded(&self, stage: FilterStage) -> bool {
        let attrs = self.attributes;
        match stage {
            FilterStage::Ids => true,
            FilterStage::Brands => attrs.brands.is_some(),
            FilterStage::Titles => attrs.titles.is_some(),
            FilterStage::Descriptions => attrs.descriptions.is_some(),
            FilterStage::Barcodes => attrs.barcodes.is_some(),
        }
    }

    /// Apply every stage in order.
    ///
    /// Returns the surviving ids and the ledger of excluded ones.
    pub fn run(
        &self,
        candidates: impl IntoIterator<Item = InternalId>,
        on_progress: Option<&ProgressCallback>,
    ) -> (IdSet, ExclusionLedger) {
        let mut survivors: IdSet = candidates.into_iter().collect();
        let mut ledger = ExclusionLedger::new();

        for stage in FilterStage::ALL {
            if survivors.is_empty() {
                break;
            }
            if !self.is_loaded(stage) {
                continue;
            }

            let before = survivors.len();
            survivors.retain(|&id| {
                if self.keeps(stage, id) {
                    return true;
                }
                ledger.record(id, stage);
                emit(
                    on_progress,
                    SyncProgress::Excluded {
                        internal_id: id,
                        stage: stage.name(),
                    },
                );
                false
            });
            tracing::debug!(
                stage = stage.name(),
                before,
                after = survivors.len(),
                "Applied filter stage"
            );
        }

        (survivors, ledger)
    }
}
