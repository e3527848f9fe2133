//! Structured resource options and their statement codecs
//!
//! Each managed entity implements [`ResourceOptions`]: a structured record
//! that can be encoded into an ordered list of `set` statements and decoded
//! back from the relative dump of its configuration path.
//!
//! - [`UtmPolicyOptions`]: `security utm utm-policy <name>`
//! - [`InterfacePhysicalOptions`]: `interfaces <name>`

pub mod interface_physical;
pub mod utm_policy;

pub use interface_physical::{EsiMode, EsiOptions, InterfacePhysicalOptions, LacpMode};
pub use utm_policy::{ProtocolProfiles, SessionsPerClient, UtmPolicyOptions};

use crate::error::Result;
use crate::statement::{ConfigLine, ConfigStatement, Normalizer};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// A structured resource that round-trips through configuration statements
///
/// # Round-trip law
///
/// For every value `o` accepted by [`encode`](ResourceOptions::encode):
///
/// ```text
/// decode(name, normalize(relative(encode(o)))) == o.normalized()
/// ```
pub trait ResourceOptions:
    Sized + Clone + PartialEq + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync
{
    /// Resource kind used in commit descriptions and events
    const KIND: &'static str;

    /// Resource name
    fn name(&self) -> &str;

    /// Configuration path of the resource named `name`
    fn config_path(name: &str) -> String;

    /// Normalizer applied to the relative dump before decoding
    fn normalizer() -> Normalizer {
        Normalizer::new()
    }

    /// Encode into ordered `set` statements
    fn encode(&self) -> Result<Vec<ConfigStatement>>;

    /// Decode from the normalized relative dump of the resource path
    fn decode(name: &str, lines: &[ConfigLine]) -> Result<Self>;

    /// Statements clearing everything [`encode`](ResourceOptions::encode)
    /// may have written, issued before re-encoding on update
    fn removal_statements(name: &str) -> Vec<ConfigStatement>;

    /// Canonical form: unset and empty values collapse to the same absence
    fn normalized(&self) -> Self;
}

/// Statement diff turning `current` into `desired`
///
/// Empty when both already match; otherwise the removal statements followed
/// by the full encoding of `desired`.
pub fn plan_update<R: ResourceOptions>(current: &R, desired: &R) -> Result<Vec<ConfigStatement>> {
    if current.normalized() == desired.normalized() {
        return Ok(Vec::new());
    }

    let mut statements = R::removal_statements(desired.name());
    statements.extend(desired.encode()?);
    Ok(statements)
}

/// Empty strings count as unset
pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// [`non_empty`], owned
pub(crate) fn normalize_string(value: &Option<String>) -> Option<String> {
    non_empty(value).map(str::to_string)
}

/// Parse an integer field, naming the statement on failure
pub(crate) fn parse_number<T: std::str::FromStr<Err = std::num::ParseIntError>>(
    value: &str,
    statement: &str,
) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|e| crate::Error::invalid_number(format!("set {}", statement), e))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::statement::{ConfigLine, ConfigStatement, Normalizer};

    /// Render statements the way the device shows them relative to `path`
    pub fn relative_dump(path: &str, statements: &[ConfigStatement]) -> String {
        let mut out = String::from("<configuration-output>\n");
        for statement in statements {
            if let Some(rest) = statement.path.strip_prefix(path) {
                let rest = rest.trim();
                if !rest.is_empty() {
                    out.push_str("set ");
                    out.push_str(rest);
                    out.push('\n');
                }
            }
        }
        out.push_str("</configuration-output>\n");
        out
    }

    pub fn relative_lines(
        normalizer: &Normalizer,
        path: &str,
        statements: &[ConfigStatement],
    ) -> Vec<ConfigLine> {
        normalizer.normalize(&relative_dump(path, statements))
    }
}
