use crate::types::errors::Error;
use crate::types::models::{
    BranchMapping, FileCoverage, FunctionMapping, Location, Position, RawFunctionCoverage,
    RawRange,
};
use std::path::Path;

/// Turns raw range coverage of one file into structured coverage
pub trait Converter {
    fn convert(
        &self,
        path: &Path,
        functions: &[RawFunctionCoverage],
    ) -> Result<FileCoverage, Error>;
}

/// Maps byte ranges onto the lines of the file.
///
/// Every non-blank line becomes a statement whose count is taken from the
/// innermost range spanning the whole line. Lines no range spans keep a
/// count of 1: the instrumentation only reports what it measured.
/// Each block range becomes a single-arm branch and the first range of every
/// named function its function entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineConverter;

#[derive(Debug)]
struct LineSpan {
    start: u64,
    end: u64,
    blank: bool,
}

#[derive(Debug)]
struct SourceLines {
    lines: Vec<LineSpan>,
    len: u64,
}

impl SourceLines {
    fn new(source: &str) -> Self {
        let mut lines = Vec::new();
        let mut start = 0u64;
        for text in source.split('\n') {
            let trimmed = text.strip_suffix('\r').unwrap_or(text);
            lines.push(LineSpan {
                start,
                end: start + trimmed.len() as u64,
                blank: trimmed.trim().is_empty(),
            });
            start += text.len() as u64 + 1;
        }
        SourceLines {
            lines,
            len: source.len() as u64,
        }
    }

    fn position(&self, offset: u64) -> Position {
        let offset = offset.min(self.len);
        let index = self
            .lines
            .partition_point(|line| line.start <= offset)
            .saturating_sub(1);
        Position {
            line: index as u32 + 1,
            column: (offset - self.lines[index].start) as u32,
        }
    }

    fn location(&self, range: &RawRange) -> Location {
        Location {
            start: self.position(range.start_offset),
            end: self.position(range.end_offset),
        }
    }
}

impl Converter for LineConverter {
    fn convert(
        &self,
        path: &Path,
        functions: &[RawFunctionCoverage],
    ) -> Result<FileCoverage, Error> {
        let source = std::fs::read_to_string(path).map_err(|e| Error::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let source = SourceLines::new(&source);
        let mut coverage = FileCoverage::new(path.to_string_lossy());

        // Outer ranges first so nested ranges override them
        let mut ranges: Vec<&RawRange> = functions.iter().flat_map(|f| &f.ranges).collect();
        ranges.sort_by_key(|r| std::cmp::Reverse(r.end_offset.saturating_sub(r.start_offset)));

        let mut line_counts: Vec<Option<u64>> = vec![None; source.lines.len()];
        for range in ranges {
            for (line, count) in source.lines.iter().zip(line_counts.iter_mut()) {
                if range.start_offset <= line.start && range.end_offset >= line.end {
                    *count = Some(range.count);
                }
            }
        }

        let mut id = 0;
        for (index, (line, count)) in source.lines.iter().zip(&line_counts).enumerate() {
            if line.blank {
                continue;
            }
            let number = index as u32 + 1;
            coverage.statement_map.insert(
                id,
                Location {
                    start: Position {
                        line: number,
                        column: 0,
                    },
                    end: Position {
                        line: number,
                        column: (line.end - line.start) as u32,
                    },
                },
            );
            coverage.s.insert(id, count.unwrap_or(1));
            id += 1;
        }

        let mut fn_id = 0;
        let mut branch_id = 0;
        for function in functions {
            if let Some(first) = function.ranges.first().filter(|_| !function.is_top_level()) {
                let loc = source.location(first);
                coverage.fn_map.insert(
                    fn_id,
                    FunctionMapping {
                        name: function.function_name.clone(),
                        decl: loc,
                        loc,
                        line: loc.start.line,
                    },
                );
                coverage.f.insert(fn_id, first.count);
                fn_id += 1;
            }

            if !function.is_block_coverage {
                continue;
            }
            for range in &function.ranges {
                let loc = source.location(range);
                coverage.branch_map.insert(
                    branch_id,
                    BranchMapping {
                        loc,
                        kind: "branch".to_string(),
                        locations: vec![loc],
                        line: loc.start.line,
                    },
                );
                coverage.b.insert(branch_id, vec![range.count]);
                branch_id += 1;
            }
        }

        Ok(coverage)
    }
}
