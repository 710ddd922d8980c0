//! CalVer tag computation.

use chrono::Local;

/// Compute the default fleet tag from the current date, e.g. `2026.08.02`.
pub fn compute_calver() -> String {
    Local::now().format("%Y.%m.%d").to_string()
}
