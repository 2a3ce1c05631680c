use crate::types::models::{RawFileCoverage, RawFunctionCoverage, RawRange};
use std::path::Path;
use tracing::{debug, warn};

/// Collapse entries that share a `url` into one, as happens when several
/// processes dumped the same script.
///
/// Functions are matched by name and declaration span. Ranges with the same
/// span have their counts summed, other ranges are appended. Order of first
/// appearance is kept.
pub fn combine(files: Vec<RawFileCoverage>) -> Vec<RawFileCoverage> {
    let mut combined: Vec<RawFileCoverage> = Vec::with_capacity(files.len());
    for file in files {
        match combined.iter_mut().find(|f| f.url == file.url) {
            Some(existing) => {
                debug!("Combining repeated coverage for {}", file.url);
                for function in file.functions {
                    add_function(existing, function);
                }
            }
            None => combined.push(file),
        }
    }
    combined
}

fn add_function(file: &mut RawFileCoverage, other: RawFunctionCoverage) {
    let declared = other.ranges.first().map(RawRange::span);
    let position = file.functions.iter().position(|f| {
        f.function_name == other.function_name && f.ranges.first().map(RawRange::span) == declared
    });
    let Some(index) = position else {
        if other.is_top_level() && !file.functions.iter().any(RawFunctionCoverage::is_top_level) {
            file.functions.insert(0, other);
        } else {
            file.functions.push(other);
        }
        return;
    };

    let function = &mut file.functions[index];
    function.is_block_coverage |= other.is_block_coverage;
    for range in other.ranges {
        match function.ranges.iter_mut().find(|r| r.span() == range.span()) {
            Some(existing) => existing.count += range.count,
            None => function.ranges.push(range),
        }
    }
}

/// Fill the gaps of `observed` with the never-executed code found in `baseline`.
///
/// Files are matched by `url`, functions by name and ranges by span. Nothing
/// already observed is removed or recounted.
pub fn reconcile(observed: &mut [RawFileCoverage], baseline: Vec<RawFileCoverage>) {
    for base_file in baseline {
        let Some(file) = observed.iter_mut().find(|f| f.url == base_file.url) else {
            warn!(
                "Baseline has coverage for {} which was not observed, skipping",
                base_file.url
            );
            continue;
        };
        debug!("Reconciling {}", file.url);
        merge_functions(file, base_file.functions);
    }
}

fn merge_functions(file: &mut RawFileCoverage, baseline: Vec<RawFunctionCoverage>) {
    for base_fn in baseline {
        match file
            .functions
            .iter_mut()
            .find(|f| f.function_name == base_fn.function_name)
        {
            Some(function) => {
                for range in base_fn.ranges {
                    if !function.ranges.iter().any(|r| r.span() == range.span()) {
                        function.ranges.push(range);
                    }
                }
            }
            // The top-level entry must come before every named function
            None if base_fn.is_top_level() => file.functions.insert(0, base_fn),
            None => file.functions.push(base_fn),
        }
    }
}

/// A zero-count top-level block spanning the whole file
pub fn empty_block(file_size: u64) -> RawFunctionCoverage {
    RawFunctionCoverage {
        function_name: String::new(),
        ranges: vec![RawRange::new(0, file_size, 0)],
        is_block_coverage: true,
    }
}

/// Make every line of `file` reportable by giving it a top-level block if it
/// has none. Returns whether a block was inserted.
pub fn force_line_mode(file: &mut RawFileCoverage, file_size: u64) -> bool {
    if file.functions.iter().any(RawFunctionCoverage::is_top_level) {
        return false;
    }
    file.functions.insert(0, empty_block(file_size));
    true
}

/// On-disk size of a covered file, used as the end of its empty block
pub fn file_size(path: &Path) -> std::io::Result<u64> {
    Ok(std::fs::symlink_metadata(path)?.len())
}
