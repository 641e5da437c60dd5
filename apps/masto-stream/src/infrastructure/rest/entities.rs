//! REST entities.
//!
//! Only the fields this crate reads; unknown fields are ignored.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server information from `/api/v1/instance`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Domain of the server.
    pub uri: String,
    /// Display title.
    pub title: String,
    /// Short description.
    #[serde(default)]
    pub short_description: String,
    /// Server software version, e.g. `4.2.1`.
    pub version: String,
    /// Contact email.
    #[serde(default)]
    pub email: String,
    /// Streaming API URL.
    #[serde(default)]
    pub urls: InstanceUrls,
    /// ISO 639 codes of the primary languages.
    #[serde(default)]
    pub languages: Vec<String>,
    /// Whether registrations are open.
    #[serde(default)]
    pub registrations: bool,
}

/// URLs advertised by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceUrls {
    /// WebSocket endpoint of the streaming API.
    #[serde(default)]
    pub streaming_api: Option<String>,
}

/// Weekly activity bucket from `/api/v1/instance/activity`.
///
/// The server sends the counters as strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// UNIX timestamp of the start of the week.
    pub week: String,
    /// Statuses created during the week.
    pub statuses: String,
    /// User logins during the week.
    pub logins: String,
    /// User registrations during the week.
    pub registrations: String,
}

/// Language supported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    /// ISO 639 code.
    pub code: String,
    /// Name in English.
    pub name: String,
}

/// Source language code to target language codes.
pub type TranslationLanguages = HashMap<String, Vec<String>>;

/// Account summary embedded in statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account id.
    pub id: String,
    /// Local username.
    pub username: String,
    /// `username` for local accounts, `username@domain` for remote ones.
    pub acct: String,
    /// Display name.
    #[serde(default)]
    pub display_name: String,
    /// Profile URL.
    #[serde(default)]
    pub url: Option<String>,
}

/// Status visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Visible to everyone, shown in public timelines.
    Public,
    /// Visible to everyone, hidden from public timelines.
    Unlisted,
    /// Followers only.
    Private,
    /// Mentioned users only.
    Direct,
}

/// A status as returned by timelines and the `update` stream event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Status id.
    pub id: String,
    /// ActivityPub URI.
    pub uri: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Author.
    pub account: Account,
    /// HTML content.
    pub content: String,
    /// Visibility.
    pub visibility: Visibility,
    /// Web URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Whether the content is behind a warning.
    #[serde(default)]
    pub sensitive: bool,
    /// Content warning.
    #[serde(default)]
    pub spoiler_text: String,
}
