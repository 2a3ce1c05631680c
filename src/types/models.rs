use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A byte range reported by the instrumentation together with its hit count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRange {
    pub start_offset: u64,
    pub end_offset: u64,
    pub count: u64,
}

impl RawRange {
    pub fn new(start_offset: u64, end_offset: u64, count: u64) -> Self {
        RawRange {
            start_offset,
            end_offset,
            count,
        }
    }

    /// Identity of a range when reconciling: its span, never its count
    pub fn span(&self) -> (u64, u64) {
        (self.start_offset, self.end_offset)
    }
}

/// Coverage of one function; the nameless entry is the file's top-level code
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFunctionCoverage {
    pub function_name: String,
    pub ranges: Vec<RawRange>,
    #[serde(default)]
    pub is_block_coverage: bool,
}

impl RawFunctionCoverage {
    pub fn is_top_level(&self) -> bool {
        self.function_name.is_empty()
    }
}

/// Raw per-file output of an instrumentation session, keyed by `url`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFileCoverage {
    pub url: String,
    pub functions: Vec<RawFunctionCoverage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Location {
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FunctionMapping {
    pub name: String,
    pub decl: Location,
    pub loc: Location,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BranchMapping {
    pub loc: Location,
    #[serde(rename = "type")]
    pub kind: String,
    pub locations: Vec<Location>,
    pub line: u32,
}

/// Structured (istanbul-compatible) coverage of a single file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCoverage {
    pub path: String,
    pub statement_map: BTreeMap<u32, Location>,
    pub fn_map: BTreeMap<u32, FunctionMapping>,
    pub branch_map: BTreeMap<u32, BranchMapping>,
    pub s: BTreeMap<u32, u64>,
    pub f: BTreeMap<u32, u64>,
    pub b: BTreeMap<u32, Vec<u64>>,
}

/// Hit statistics for one coverage dimension
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub total: usize,
    pub covered: usize,
}

impl Totals {
    fn add(&mut self, hits: u64) {
        self.total += 1;
        if hits > 0 {
            self.covered += 1;
        }
    }

    pub fn merge(&mut self, other: Totals) {
        self.total += other.total;
        self.covered += other.covered;
    }

    /// Percentage covered; an empty dimension counts as fully covered
    pub fn pct(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.covered as f64 / self.total as f64 * 10000.0).round() / 100.0
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CoverageSummary {
    pub lines: Totals,
    pub statements: Totals,
    pub functions: Totals,
    pub branches: Totals,
}

impl CoverageSummary {
    pub fn merge(&mut self, other: &CoverageSummary) {
        self.lines.merge(other.lines);
        self.statements.merge(other.statements);
        self.functions.merge(other.functions);
        self.branches.merge(other.branches);
    }
}

impl FileCoverage {
    pub fn new(path: impl Into<String>) -> Self {
        FileCoverage {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Hit count per source line: the highest statement count starting on it
    pub fn line_hits(&self) -> BTreeMap<u32, u64> {
        let mut lines = BTreeMap::new();
        for (id, loc) in &self.statement_map {
            let hits = self.s.get(id).copied().unwrap_or(0);
            let entry = lines.entry(loc.start.line).or_insert(0);
            *entry = (*entry).max(hits);
        }
        lines
    }

    pub fn summary(&self) -> CoverageSummary {
        let mut summary = CoverageSummary::default();
        for hits in self.line_hits().values() {
            summary.lines.add(*hits);
        }
        for id in self.statement_map.keys() {
            summary.statements.add(self.s.get(id).copied().unwrap_or(0));
        }
        for id in self.fn_map.keys() {
            summary.functions.add(self.f.get(id).copied().unwrap_or(0));
        }
        for arms in self.b.values() {
            for hits in arms {
                summary.branches.add(*hits);
            }
        }
        summary
    }

    /// Lines with no recorded hits, in ascending order
    pub fn uncovered_lines(&self) -> Vec<u32> {
        self.line_hits()
            .into_iter()
            .filter(|(_, hits)| *hits == 0)
            .map(|(line, _)| line)
            .collect()
    }
}

/// Aggregate coverage keyed by file path, one entry per file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct CoverageMap {
    pub files: BTreeMap<String, FileCoverage>,
}

impl CoverageMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&FileCoverage> {
        self.files.get(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn summary(&self) -> CoverageSummary {
        let mut summary = CoverageSummary::default();
        for file in self.files.values() {
            summary.merge(&file.summary());
        }
        summary
    }
}
