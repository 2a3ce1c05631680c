use crate::types::errors::Error;
use std::path::Path;

pub const COMPUTED_MARKER: &str = "<computed>";
const COMPUTED_ESCAPED: &str = "&lt;computed&gt;";

/// Escape the unescaped `<computed>` marker some cobertura writers emit for
/// computed method names, rewriting the file in place.
/// Returns whether anything was replaced.
pub fn fix_cobertura_report(path: &Path) -> Result<bool, Error> {
    let content = std::fs::read_to_string(path)?;
    if !content.contains(COMPUTED_MARKER) {
        return Ok(false);
    }
    std::fs::write(path, content.replace(COMPUTED_MARKER, COMPUTED_ESCAPED))?;
    Ok(true)
}
