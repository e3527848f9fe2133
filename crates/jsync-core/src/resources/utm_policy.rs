// # UTM Policy Options
//
// Structured form of `security utm utm-policy <name>`.
//
// ## Statement layout
//
// ```text
// set security utm utm-policy <name> anti-spam smtp-profile <profile>
// set security utm utm-policy <name> anti-virus http-profile <profile>
// set security utm utm-policy <name> content-filtering ftp upload-profile <profile>
// set security utm utm-policy <name> traffic-options sessions-per-client limit 100
// set security utm utm-policy <name> traffic-options sessions-per-client over-limit block
// set security utm utm-policy <name> web-filtering http-profile <profile>
// ```

use serde::{Deserialize, Serialize};

use super::{ResourceOptions, non_empty, normalize_string, parse_number};
use crate::error::{Error, Result};
use crate::statement::{ConfigLine, ConfigStatement, StatementPrefix, quote_value, unquote};

/// Per-protocol profile keywords, in encoding priority order
const PROFILE_KEYWORDS: [&str; 6] = [
    "ftp download-profile",
    "ftp upload-profile",
    "http-profile",
    "imap-profile",
    "pop3-profile",
    "smtp-profile",
];

/// UTM policy assignments
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtmPolicyOptions {
    /// Policy name
    pub name: String,

    /// Anti-spam SMTP profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anti_spam_smtp_profile: Option<String>,

    /// Anti-virus profiles per protocol
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anti_virus: Option<ProtocolProfiles>,

    /// Content-filtering profiles per protocol
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_filtering: Option<ProtocolProfiles>,

    /// Session limits per client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_sessions_per_client: Option<SessionsPerClient>,

    /// Web-filtering HTTP profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_filtering_profile: Option<String>,
}

/// Profile names per application protocol (anti-virus, content-filtering)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolProfiles {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ftp_download_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ftp_upload_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imap_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pop3_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_profile: Option<String>,
}

impl ProtocolProfiles {
    fn fields(&self) -> [&Option<String>; 6] {
        [
            &self.ftp_download_profile,
            &self.ftp_upload_profile,
            &self.http_profile,
            &self.imap_profile,
            &self.pop3_profile,
            &self.smtp_profile,
        ]
    }

    fn fields_mut(&mut self) -> [&mut Option<String>; 6] {
        [
            &mut self.ftp_download_profile,
            &mut self.ftp_upload_profile,
            &mut self.http_profile,
            &mut self.imap_profile,
            &mut self.pop3_profile,
            &mut self.smtp_profile,
        ]
    }

    /// Whether no profile is set
    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(|f| non_empty(f).is_none())
    }

    fn encode(&self, prefix: &StatementPrefix, block: &str, out: &mut Vec<ConfigStatement>) -> Result<()> {
        if self.is_empty() {
            return Err(Error::validation(format!("{} block is empty", block)));
        }
        for (keyword, field) in PROFILE_KEYWORDS.iter().zip(self.fields()) {
            if let Some(value) = non_empty(field) {
                out.push(prefix.set_value(keyword, value));
            }
        }
        Ok(())
    }

    fn read(&mut self, rest: &str) {
        for (keyword, field) in PROFILE_KEYWORDS.iter().zip(self.fields_mut()) {
            if let Some(value) = rest
                .strip_prefix(keyword)
                .and_then(|v| v.strip_prefix(' '))
            {
                *field = Some(unquote(value));
                return;
            }
        }
    }

    fn normalized(&self) -> Option<Self> {
        let out = Self {
            ftp_download_profile: normalize_string(&self.ftp_download_profile),
            ftp_upload_profile: normalize_string(&self.ftp_upload_profile),
            http_profile: normalize_string(&self.http_profile),
            imap_profile: normalize_string(&self.imap_profile),
            pop3_profile: normalize_string(&self.pop3_profile),
            smtp_profile: normalize_string(&self.smtp_profile),
        };
        (!out.is_empty()).then_some(out)
    }
}

/// `traffic-options sessions-per-client`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionsPerClient {
    /// Session limit (device range 0..=2000)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    /// Action over the limit (`block`, `log-and-permit`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub over_limit: Option<String>,
}

impl SessionsPerClient {
    /// Whether neither field is set
    pub fn is_empty(&self) -> bool {
        self.limit.is_none() && non_empty(&self.over_limit).is_none()
    }
}

impl UtmPolicyOptions {
    /// Create options for a policy with nothing assigned
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl ResourceOptions for UtmPolicyOptions {
    const KIND: &'static str = "security_utm_policy";

    fn name(&self) -> &str {
        &self.name
    }

    fn config_path(name: &str) -> String {
        format!("security utm utm-policy {}", quote_value(name))
    }

    fn encode(&self) -> Result<Vec<ConfigStatement>> {
        if self.name.is_empty() {
            return Err(Error::validation("utm-policy name cannot be empty"));
        }

        let prefix = StatementPrefix::new(Self::config_path(&self.name));
        let mut out = Vec::new();

        if let Some(v) = non_empty(&self.anti_spam_smtp_profile) {
            out.push(prefix.set_value("anti-spam smtp-profile", v));
        }
        if let Some(anti_virus) = &self.anti_virus {
            anti_virus.encode(&prefix.extend("anti-virus"), "anti_virus", &mut out)?;
        }
        if let Some(content_filtering) = &self.content_filtering {
            content_filtering.encode(
                &prefix.extend("content-filtering"),
                "content_filtering",
                &mut out,
            )?;
        }
        if let Some(sessions) = &self.traffic_sessions_per_client {
            if sessions.is_empty() {
                return Err(Error::validation(
                    "traffic_sessions_per_client block is empty",
                ));
            }
            let sessions_prefix = prefix.extend("traffic-options sessions-per-client");
            if let Some(limit) = sessions.limit {
                out.push(sessions_prefix.set_value("limit", limit));
            }
            if let Some(over_limit) = non_empty(&sessions.over_limit) {
                out.push(sessions_prefix.set_value("over-limit", over_limit));
            }
        }
        if let Some(v) = non_empty(&self.web_filtering_profile) {
            out.push(prefix.set_value("web-filtering http-profile", v));
        }

        Ok(out)
    }

    fn decode(name: &str, lines: &[ConfigLine]) -> Result<Self> {
        let mut conf = Self::new(name);

        for body in lines.iter().filter_map(ConfigLine::set_body) {
            if let Some(v) = body.strip_prefix("anti-spam smtp-profile ") {
                conf.anti_spam_smtp_profile = Some(unquote(v));
            } else if let Some(rest) = body.strip_prefix("anti-virus ") {
                conf.anti_virus.get_or_insert_with(Default::default).read(rest);
            } else if let Some(rest) = body.strip_prefix("content-filtering ") {
                conf.content_filtering
                    .get_or_insert_with(Default::default)
                    .read(rest);
            } else if let Some(rest) = body.strip_prefix("traffic-options sessions-per-client ") {
                let sessions = conf
                    .traffic_sessions_per_client
                    .get_or_insert_with(Default::default);
                if let Some(v) = rest.strip_prefix("limit ") {
                    sessions.limit = Some(parse_number(v, body)?);
                } else if let Some(v) = rest.strip_prefix("over-limit ") {
                    sessions.over_limit = Some(unquote(v));
                }
            } else if let Some(v) = body.strip_prefix("web-filtering http-profile ") {
                conf.web_filtering_profile = Some(unquote(v));
            }
        }

        Ok(conf)
    }

    fn removal_statements(name: &str) -> Vec<ConfigStatement> {
        vec![StatementPrefix::new(Self::config_path(name)).delete_all()]
    }

    fn normalized(&self) -> Self {
        Self {
            name: self.name.clone(),
            anti_spam_smtp_profile: normalize_string(&self.anti_spam_smtp_profile),
            anti_virus: self.anti_virus.as_ref().and_then(ProtocolProfiles::normalized),
            content_filtering: self
                .content_filtering
                .as_ref()
                .and_then(ProtocolProfiles::normalized),
            traffic_sessions_per_client: self
                .traffic_sessions_per_client
                .as_ref()
                .map(|s| SessionsPerClient {
                    limit: s.limit,
                    over_limit: normalize_string(&s.over_limit),
                })
                .filter(|s| !s.is_empty()),
            web_filtering_profile: normalize_string(&self.web_filtering_profile),
        }
    }
}
