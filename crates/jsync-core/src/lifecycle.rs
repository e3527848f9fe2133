// # Interface Lifecycle
//
// An interface that the device knows about can be in one of three states,
// decided from its normalized relative dump alone:
//
// - **Empty**: nothing configured. The interface may still exist in the
//   hardware inventory.
// - **NotConfigured**: parked after a delete, either `disable` plus
//   `description NC` or a single `apply-groups <deletion group>`.
// - **Present**: anything else.
//
// Parking and un-parking statements live here too so the engine never spells
// the markers itself.

use serde::{Deserialize, Serialize};

use crate::statement::{ConfigLine, ConfigStatement, StatementPrefix, quote_value};

/// Description written on a parked interface
pub const PARKED_DESCRIPTION: &str = "NC";

/// Lifecycle state of an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceLifecycleState {
    /// Parked by a previous delete
    NotConfigured,
    /// No configuration at all
    Empty,
    /// Configured
    Present,
}

/// Classify the normalized relative dump of `interfaces <name>`
pub fn classify(lines: &[ConfigLine], deletion_group: Option<&str>) -> InterfaceLifecycleState {
    if lines.is_empty() {
        return InterfaceLifecycleState::Empty;
    }

    if is_parked(lines, deletion_group) {
        InterfaceLifecycleState::NotConfigured
    } else {
        InterfaceLifecycleState::Present
    }
}

fn is_parked(lines: &[ConfigLine], deletion_group: Option<&str>) -> bool {
    let bodies: Option<Vec<&str>> = lines.iter().map(ConfigLine::set_body).collect();
    let Some(bodies) = bodies else {
        return false;
    };

    match bodies.as_slice() {
        [one] => deletion_group
            .filter(|g| !g.is_empty())
            .is_some_and(|group| one.strip_prefix("apply-groups ").map(str::trim) == Some(group)),
        [a, b] => {
            let parked_description = format!("description {}", PARKED_DESCRIPTION);
            (*a == "disable" && *b == parked_description)
                || (*b == "disable" && *a == parked_description)
        }
        _ => false,
    }
}

/// Statements parking `name` after its configuration has been removed
pub fn park_statements(name: &str, deletion_group: Option<&str>) -> Vec<ConfigStatement> {
    let prefix = StatementPrefix::new(format!("interfaces {}", name));
    match deletion_group.filter(|g| !g.is_empty()) {
        Some(group) => vec![prefix.set_value("apply-groups", group)],
        None => vec![
            prefix.set_flag("disable"),
            prefix.set_value("description", PARKED_DESCRIPTION),
        ],
    }
}

/// Statements removing the parking markers from `name`
pub fn unpark_statements(name: &str, deletion_group: Option<&str>) -> Vec<ConfigStatement> {
    let prefix = StatementPrefix::new(format!("interfaces {}", name));
    let mut out = Vec::with_capacity(3);
    if let Some(group) = deletion_group.filter(|g| !g.is_empty()) {
        out.push(prefix.delete(&format!("apply-groups {}", quote_value(group))));
    }
    out.push(prefix.delete("description"));
    out.push(prefix.delete("disable"));
    out
}

/// Whether an inventory reply says the interface does not exist
pub fn inventory_reports_missing(reply: &str) -> bool {
    reply.contains(" not found")
}
