// # Physical Interface Options
//
// Structured form of `interfaces <name>` for physical and aggregated
// (`ae<N>`) interfaces. Unit-level configuration is out of scope except for
// the `unit 0 family ethernet-switching` lines that carry VLAN membership.
//
// ## Statement layout
//
// ```text
// set interfaces <name>
// set interfaces <name> aggregated-ether-options lacp active
// set interfaces <name> aggregated-ether-options link-speed 10g
// set interfaces <name> aggregated-ether-options minimum-links 2
// set interfaces <name> description "uplink"
// set interfaces <name> esi all-active
// set interfaces <name> esi 00:11:22:33:44:55:66:77:88:99
// set interfaces <name> ether-options 802.3ad ae1
// set interfaces <name> gigether-options 802.3ad ae1
// set interfaces <name> unit 0 family ethernet-switching interface-mode trunk
// set interfaces <name> unit 0 family ethernet-switching vlan members 10
// set interfaces <name> native-vlan-id 10
// set interfaces <name> vlan-tagging
// ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{ResourceOptions, non_empty, normalize_string, parse_number};
use crate::aggregate::AeName;
use crate::error::{Error, Result};
use crate::statement::{ConfigLine, ConfigStatement, Normalizer, StatementPrefix, unquote};

/// ESI identifier: ten colon-separated octets
static ESI_IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([\d\w]{2}:){9}[\d\w]{2}").expect("Invalid regex pattern"));

const TRUNK_STATEMENT: &str = "unit 0 family ethernet-switching interface-mode trunk";
const VLAN_MEMBERS: &str = "unit 0 family ethernet-switching vlan members";

/// LACP mode of an aggregated interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LacpMode {
    Active,
    Passive,
}

impl LacpMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LacpMode::Active => "active",
            LacpMode::Passive => "passive",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(LacpMode::Active),
            "passive" => Some(LacpMode::Passive),
            _ => None,
        }
    }
}

/// EVPN multihoming mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EsiMode {
    AllActive,
    SingleActive,
}

impl EsiMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EsiMode::AllActive => "all-active",
            EsiMode::SingleActive => "single-active",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "all-active" => Some(EsiMode::AllActive),
            "single-active" => Some(EsiMode::SingleActive),
            _ => None,
        }
    }
}

/// Ethernet segment identifier block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EsiOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<EsiMode>,
    #[serde(default)]
    pub auto_derive_lacp: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub df_election_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_bmac: Option<String>,
}

impl EsiOptions {
    /// Whether nothing in the block is set
    pub fn is_empty(&self) -> bool {
        self.mode.is_none()
            && !self.auto_derive_lacp
            && non_empty(&self.df_election_type).is_none()
            && non_empty(&self.identifier).is_none()
            && non_empty(&self.source_bmac).is_none()
    }

    fn encode(&self, prefix: &StatementPrefix, out: &mut Vec<ConfigStatement>) -> Result<()> {
        if self.is_empty() {
            return Err(Error::validation("esi block is empty"));
        }
        let esi = prefix.extend("esi");
        if let Some(mode) = self.mode {
            out.push(esi.set_flag(mode.as_str()));
        }
        if self.auto_derive_lacp {
            out.push(esi.set_flag("auto-derive lacp"));
        }
        if let Some(v) = non_empty(&self.df_election_type) {
            out.push(esi.set_value("df-election-type", v));
        }
        if let Some(v) = non_empty(&self.identifier) {
            out.push(prefix.set_value("esi", v));
        }
        if let Some(v) = non_empty(&self.source_bmac) {
            out.push(esi.set_value("source-bmac", v));
        }
        Ok(())
    }

    fn read(&mut self, rest: &str) {
        if ESI_IDENTIFIER_RE.is_match(rest) {
            self.identifier = Some(rest.to_string());
        } else if let Some(mode) = EsiMode::parse(rest) {
            self.mode = Some(mode);
        } else if let Some(v) = rest.strip_prefix("df-election-type ") {
            self.df_election_type = Some(unquote(v));
        } else if let Some(v) = rest.strip_prefix("source-bmac ") {
            self.source_bmac = Some(unquote(v));
        } else if rest == "auto-derive lacp" {
            self.auto_derive_lacp = true;
        }
    }

    fn normalized(&self) -> Option<Self> {
        let out = Self {
            mode: self.mode,
            auto_derive_lacp: self.auto_derive_lacp,
            df_election_type: normalize_string(&self.df_election_type),
            identifier: normalize_string(&self.identifier),
            source_bmac: normalize_string(&self.source_bmac),
        };
        (!out.is_empty()).then_some(out)
    }
}

/// Attributes of a physical or aggregated interface
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfacePhysicalOptions {
    /// Interface name (no unit, so no dot)
    pub name: String,

    /// LACP mode (aggregated interfaces only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ae_lacp: Option<LacpMode>,

    /// Link speed (aggregated interfaces only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ae_link_speed: Option<String>,

    /// Minimum member links (aggregated interfaces only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ae_minimum_links: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub esi: Option<EsiOptions>,

    /// Parent aggregated interface (`ae<N>`) of a member link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ether802_3ad: Option<String>,

    #[serde(default)]
    pub trunk: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vlan_members: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan_native: Option<u16>,

    #[serde(default)]
    pub vlan_tagging: bool,
}

/// Reject unit names and empty names
pub fn validate_interface_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::validation("interface name cannot be empty"));
    }
    if name.contains('.') {
        return Err(Error::validation(format!(
            "name of interface {} cannot have a dot",
            name
        )));
    }
    Ok(())
}

impl InterfacePhysicalOptions {
    /// Create options for an interface with nothing configured
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Whether this is an aggregated (`ae<N>`) interface
    pub fn is_aggregated(&self) -> bool {
        AeName::parse(&self.name).is_some()
    }

    /// The parent aggregated interface this link is bound to
    pub fn aggregated_parent(&self) -> Result<Option<AeName>> {
        match non_empty(&self.ether802_3ad) {
            None => Ok(None),
            Some(v) => AeName::parse(v).map(Some).ok_or_else(|| {
                Error::validation(format!("{} in ether802_3ad isn't an ae interface", v))
            }),
        }
    }

    /// Whether the unfiltered relative dump carries unit configuration that
    /// this resource does not own
    pub fn has_foreign_units(lines: &[ConfigLine]) -> bool {
        lines
            .iter()
            .filter_map(ConfigLine::set_body)
            .any(|body| body.starts_with("unit ") && !body.contains("ethernet-switching"))
    }

    fn require_aggregated(&self, field: &str) -> Result<()> {
        if self.is_aggregated() {
            Ok(())
        } else {
            Err(Error::validation(format!(
                "{} invalid for interface {}",
                field, self.name
            )))
        }
    }
}

impl ResourceOptions for InterfacePhysicalOptions {
    const KIND: &'static str = "interface_physical";

    fn name(&self) -> &str {
        &self.name
    }

    fn config_path(name: &str) -> String {
        format!("interfaces {}", name)
    }

    fn normalizer() -> Normalizer {
        Normalizer::new().drop_prefix_unless("unit ", "ethernet-switching")
    }

    fn encode(&self) -> Result<Vec<ConfigStatement>> {
        validate_interface_name(&self.name)?;

        let prefix = StatementPrefix::new(Self::config_path(&self.name));
        let mut out = vec![prefix.set_bare()];

        if let Some(lacp) = self.ae_lacp {
            self.require_aggregated("ae_lacp")?;
            out.push(prefix.set_value("aggregated-ether-options lacp", lacp.as_str()));
        }
        if let Some(speed) = non_empty(&self.ae_link_speed) {
            self.require_aggregated("ae_link_speed")?;
            out.push(prefix.set_value("aggregated-ether-options link-speed", speed));
        }
        if let Some(links) = self.ae_minimum_links {
            self.require_aggregated("ae_minimum_links")?;
            out.push(prefix.set_value("aggregated-ether-options minimum-links", links));
        }
        if let Some(description) = non_empty(&self.description) {
            out.push(prefix.set_value("description", description));
        }
        if let Some(esi) = &self.esi {
            esi.encode(&prefix, &mut out)?;
        }
        if let Some(parent) = self.aggregated_parent()? {
            if self.is_aggregated() {
                return Err(Error::validation(format!(
                    "ether802_3ad invalid for aggregated interface {}",
                    self.name
                )));
            }
            out.push(prefix.set_value("ether-options 802.3ad", &parent));
            out.push(prefix.set_value("gigether-options 802.3ad", &parent));
        }
        if self.trunk {
            out.push(prefix.set_flag(TRUNK_STATEMENT));
        }
        for member in self.vlan_members.iter().filter(|m| !m.is_empty()) {
            out.push(prefix.set_value(VLAN_MEMBERS, member));
        }
        if let Some(native) = self.vlan_native {
            out.push(prefix.set_value("native-vlan-id", native));
        }
        if self.vlan_tagging {
            out.push(prefix.set_flag("vlan-tagging"));
        }

        Ok(out)
    }

    fn decode(name: &str, lines: &[ConfigLine]) -> Result<Self> {
        let mut conf = Self::new(name);

        for body in lines.iter().filter_map(ConfigLine::set_body) {
            if let Some(v) = body.strip_prefix("aggregated-ether-options lacp ") {
                conf.ae_lacp = LacpMode::parse(v.trim());
            } else if let Some(v) = body.strip_prefix("aggregated-ether-options link-speed ") {
                conf.ae_link_speed = Some(unquote(v));
            } else if let Some(v) = body.strip_prefix("aggregated-ether-options minimum-links ") {
                conf.ae_minimum_links = Some(parse_number(v, body)?);
            } else if let Some(v) = body.strip_prefix("description ") {
                conf.description = Some(unquote(v));
            } else if let Some(rest) = body.strip_prefix("esi ") {
                conf.esi.get_or_insert_with(Default::default).read(rest.trim());
            } else if let Some(v) = body.strip_prefix("ether-options 802.3ad ") {
                conf.ether802_3ad = Some(unquote(v));
            } else if let Some(v) = body.strip_prefix("gigether-options 802.3ad ") {
                conf.ether802_3ad = Some(unquote(v));
            } else if let Some(v) = body.strip_prefix("native-vlan-id ") {
                conf.vlan_native = Some(parse_number(v, body)?);
            } else if body == TRUNK_STATEMENT {
                conf.trunk = true;
            } else if let Some(v) = body
                .strip_prefix(VLAN_MEMBERS)
                .and_then(|v| v.strip_prefix(' '))
            {
                conf.vlan_members.push(unquote(v));
            } else if body == "vlan-tagging" {
                conf.vlan_tagging = true;
            }
        }

        Ok(conf)
    }

    fn removal_statements(name: &str) -> Vec<ConfigStatement> {
        let prefix = StatementPrefix::new(Self::config_path(name));
        [
            "aggregated-ether-options",
            "description",
            "esi",
            "ether-options 802.3ad",
            "gigether-options 802.3ad",
            "native-vlan-id",
            "unit 0 family ethernet-switching interface-mode",
            "unit 0 family ethernet-switching vlan members",
            "vlan-tagging",
        ]
        .iter()
        .map(|field| prefix.delete(field))
        .collect()
    }

    fn normalized(&self) -> Self {
        Self {
            name: self.name.clone(),
            ae_lacp: self.ae_lacp,
            ae_link_speed: normalize_string(&self.ae_link_speed),
            ae_minimum_links: self.ae_minimum_links,
            description: normalize_string(&self.description),
            esi: self.esi.as_ref().and_then(EsiOptions::normalized),
            ether802_3ad: normalize_string(&self.ether802_3ad),
            trunk: self.trunk,
            vlan_members: self
                .vlan_members
                .iter()
                .filter(|m| !m.is_empty())
                .cloned()
                .collect(),
            vlan_native: self.vlan_native,
            vlan_tagging: self.vlan_tagging,
        }
    }
}
