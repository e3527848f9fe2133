//! Aggregated-interface allocator
//!
//! Keeps `chassis aggregated-devices ethernet device-count` consistent with
//! every `ae<N>` referenced in the configuration. The device only accepts an
//! `ae<N>` when the count is at least `N + 1`, so every structural change to
//! an aggregated parent or one of its member links recomputes the count from
//! a fresh scan of the whole interface configuration.
//!
//! ## What counts as a reference
//!
//! Scanning `show configuration interfaces | display set relative`:
//!
//! - **parents**: statements whose path starts with `ae<N>`
//! - **children**: `<ifd> ... ether-options 802.3ad ae<N>` (and the
//!   `gigether-options` twin)

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::warn;

use crate::statement::{ConfigLine, ConfigStatement, Normalizer, show_configuration_query};

static PARENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ae(\d+)(\s|$)").expect("Invalid regex pattern"));

static CHILD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\S+)\s.*ether-options 802\.3ad ae(\d+)$").expect("Invalid regex pattern")
});

/// Path of the device-count leaf
pub const DEVICE_COUNT_PATH: &str = "chassis aggregated-devices ethernet device-count";

/// Query returning every interface statement, relative to `interfaces`
pub fn interfaces_query() -> String {
    show_configuration_query("interfaces", true)
}

/// An aggregated interface name, `ae<N>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AeName(pub u32);

impl AeName {
    /// Parse `ae<N>`; anything else (including units like `ae1.0`) is `None`
    pub fn parse(name: &str) -> Option<Self> {
        let digits = name.strip_prefix("ae")?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().and_then(Self::from_index)
    }

    /// `ae<index>`, `None` when no device count can cover it
    pub fn from_index(index: u32) -> Option<Self> {
        index.checked_add(1).map(|_| AeName(index))
    }

    /// Device count needed for this interface to exist
    pub fn required_count(&self) -> Option<u32> {
        self.0.checked_add(1)
    }

    /// The numeric index
    pub fn index(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for AeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ae{}", self.0)
    }
}

/// Inputs of one device-count computation
#[derive(Debug, Clone, Copy)]
pub struct AllocationRequest<'a> {
    /// Interface whose change triggers the allocation
    pub acting: &'a str,
    /// Aggregated interface that must be allocatable afterwards
    pub requested: Option<AeName>,
    /// Aggregated interface `acting` stops referencing
    pub previous: Option<AeName>,
}

/// Parents and children found in one full configuration scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedGroupIndex {
    parents: BTreeSet<AeName>,
    children: BTreeMap<String, BTreeSet<AeName>>,
}

impl AggregatedGroupIndex {
    /// Scan the raw output of [`interfaces_query`]
    pub fn scan(dump: &str) -> Self {
        Self::from_lines(&Normalizer::new().normalize(dump))
    }

    /// Scan already-normalized lines
    pub fn from_lines(lines: &[ConfigLine]) -> Self {
        let mut index = Self::default();
        for body in lines.iter().filter_map(ConfigLine::set_body) {
            if let Some(caps) = PARENT_RE.captures(body) {
                match parse_index(&caps[1]) {
                    Some(ae) => {
                        index.parents.insert(ae);
                    }
                    None => warn!("Ignoring out-of-range aggregated interface in '{}'", body),
                }
            } else if let Some(caps) = CHILD_RE.captures(body) {
                match parse_index(&caps[2]) {
                    Some(ae) => {
                        index
                            .children
                            .entry(caps[1].to_string())
                            .or_default()
                            .insert(ae);
                    }
                    None => warn!("Ignoring out-of-range 802.3ad binding in '{}'", body),
                }
            }
        }
        index
    }

    /// Declared parents
    pub fn parents(&self) -> impl Iterator<Item = AeName> + '_ {
        self.parents.iter().copied()
    }

    /// Member links bound to `ae`
    pub fn children_of(&self, ae: AeName) -> Vec<&str> {
        self.children
            .iter()
            .filter(|(_, bound)| bound.contains(&ae))
            .map(|(child, _)| child.as_str())
            .collect()
    }

    /// Whether no interface other than `acting` binds to `ae`
    pub fn is_last_child(&self, ae: AeName, acting: &str) -> bool {
        self.children_of(ae).iter().all(|child| *child == acting)
    }

    /// Device count satisfying `request`, `None` when no `ae` remains
    pub fn device_count(&self, request: &AllocationRequest<'_>) -> Option<u32> {
        let acting_is_previous = request
            .previous
            .is_some_and(|p| p.to_string() == request.acting);

        let mut found: BTreeSet<AeName> = BTreeSet::new();
        for bound in self.children.values() {
            for ae in bound {
                if Some(*ae) == request.previous && !acting_is_previous {
                    continue;
                }
                found.insert(*ae);
            }
        }
        for ae in &self.parents {
            if Some(*ae) == request.previous && acting_is_previous {
                continue;
            }
            found.insert(*ae);
        }
        if let Some(previous) = request.previous {
            if !self.is_last_child(previous, request.acting) {
                found.insert(previous);
            }
        }
        found.extend(request.requested);

        found.iter().next_back().and_then(AeName::required_count)
    }
}

fn parse_index(digits: &str) -> Option<AeName> {
    digits.parse().ok().and_then(AeName::from_index)
}

/// Structural change to an interface, as seen by the allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceChange {
    /// Create or update, with the binding the interface will carry
    Upsert { binding: Option<AeName> },
    /// Delete
    Delete,
}

/// `set` or `delete` of the device-count leaf
pub fn device_count_statement(count: Option<u32>) -> ConfigStatement {
    match count {
        Some(n) => ConfigStatement::set(format!("{} {}", DEVICE_COUNT_PATH, n)),
        None => ConfigStatement::delete(DEVICE_COUNT_PATH),
    }
}

/// Device-count statement required by `change` on interface `name`
///
/// `current_binding` is the parent `name` is bound to on the device before
/// the change. `None` means the count does not need to move.
pub fn plan_device_count(
    index: &AggregatedGroupIndex,
    name: &str,
    current_binding: Option<AeName>,
    change: InterfaceChange,
) -> Option<ConfigStatement> {
    let request = if let Some(own) = AeName::parse(name) {
        match change {
            InterfaceChange::Upsert { .. } => AllocationRequest {
                acting: name,
                requested: Some(own),
                previous: None,
            },
            InterfaceChange::Delete => AllocationRequest {
                acting: name,
                requested: None,
                previous: Some(own),
            },
        }
    } else {
        let desired = match change {
            InterfaceChange::Upsert { binding } => binding,
            InterfaceChange::Delete => None,
        };
        match desired {
            Some(binding) => AllocationRequest {
                acting: name,
                requested: Some(binding),
                previous: current_binding.filter(|p| *p != binding),
            },
            None => {
                let previous = current_binding?;
                if !index.is_last_child(previous, name) {
                    return None;
                }
                AllocationRequest {
                    acting: name,
                    requested: None,
                    previous: Some(previous),
                }
            }
        }
    };

    Some(device_count_statement(index.device_count(&request)))
}
