use crate::types::errors::Error;
use crate::types::models::{CoverageMap, FileCoverage};
use std::collections::btree_map::Entry;

impl CoverageMap {
    /// Add one file's coverage to the map.
    ///
    /// Location metadata is recorded once per id; counters are summed.
    pub fn merge_file(&mut self, report: FileCoverage) -> Result<(), Error> {
        match self.files.entry(report.path.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(report);
                Ok(())
            }
            Entry::Occupied(mut slot) => merge_file_data(slot.get_mut(), report),
        }
    }

    /// Add every file of `other` to the map
    pub fn merge(&mut self, other: CoverageMap) -> Result<(), Error> {
        for report in other.files.into_values() {
            self.merge_file(report)?;
        }
        Ok(())
    }
}

/// Merge `reports` into `target` and return it
pub fn merge_map(
    mut target: CoverageMap,
    reports: impl IntoIterator<Item = FileCoverage>,
) -> Result<CoverageMap, Error> {
    for report in reports {
        target.merge_file(report)?;
    }
    Ok(target)
}

fn merge_file_data(target: &mut FileCoverage, report: FileCoverage) -> Result<(), Error> {
    for (id, loc) in report.statement_map {
        target.statement_map.entry(id).or_insert(loc);
    }
    for (id, mapping) in report.fn_map {
        target.fn_map.entry(id).or_insert(mapping);
    }
    for (id, mapping) in report.branch_map {
        target.branch_map.entry(id).or_insert(mapping);
    }

    for (id, hits) in report.s {
        *target.s.entry(id).or_insert(0) += hits;
    }
    for (id, hits) in report.f {
        *target.f.entry(id).or_insert(0) += hits;
    }

    for (id, arms) in report.b {
        match target.b.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(arms);
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                if existing.len() != arms.len() {
                    return Err(Error::BranchArity {
                        file: target.path.clone(),
                        id,
                        expected: existing.len(),
                        found: arms.len(),
                    });
                }
                for (total, hits) in existing.iter_mut().zip(arms) {
                    *total += hits;
                }
            }
        }
    }
    Ok(())
}
