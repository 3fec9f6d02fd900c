//! Per-action option and result types.
//!
//! # Design
//! Option structs only serialize the fields the caller set
//! (`skip_serializing_if = "Option::is_none"`), so a request never carries a
//! default the remote API did not ask for. Result structs validate loosely:
//! fields the service may omit are defaulted, and anything not modelled is
//! kept in `extra` rather than rejected.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{ApiError, ErrorCode};

/// Free-form nested fields (merge variables, campaign type options).
pub type Fields = Map<String, Value>;

/// Timestamp format the API expects for schedule times and `since` filters.
pub const API_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_api_time(time: &NaiveDateTime) -> String {
    time.format(API_TIME_FORMAT).to_string()
}

fn serialize_opt_time<S: Serializer>(
    time: &Option<NaiveDateTime>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match time {
        Some(time) => serializer.serialize_str(&format_api_time(time)),
        None => serializer.serialize_none(),
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailType {
    Html,
    Text,
    Mobile,
    /// A value this client does not model, kept as sent.
    #[serde(untagged)]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Subscribed,
    /// Awaiting double opt-in confirmation.
    Pending,
    Unsubscribed,
    Cleaned,
    Updated,
    /// A value this client does not model, kept as sent.
    #[serde(untagged)]
    Other(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubscribeOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_type: Option<EmailType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub double_optin: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_existing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replace_interests: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_welcome: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnsubscribeOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_member: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_goodbye: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_notify: Option<bool>,
}

impl UnsubscribeOptions {
    /// Remove the member outright and send no emails.
    pub fn delete_quietly() -> Self {
        Self {
            delete_member: Some(true),
            send_goodbye: Some(false),
            send_notify: Some(false),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateMemberOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_type: Option<EmailType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replace_interests: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSubscribeOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub double_optin: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_existing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replace_interests: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemberQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<MemberStatus>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_opt_time"
    )]
    pub since: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// Options for `listMergeVarAdd` / `listMergeVarUpdate`, sent nested under
/// `options`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeVarOptions {
    /// Only honoured by updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub req: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupingType {
    Checkboxes,
    Hidden,
    Dropdown,
    Radio,
    /// A value this client does not model, kept as sent.
    #[serde(untagged)]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignType {
    Regular,
    Plaintext,
    Absplit,
    Rss,
    Auto,
    /// A value this client does not model, kept as sent.
    #[serde(untagged)]
    Other(String),
}

impl CampaignType {
    pub fn as_str(&self) -> &str {
        match self {
            CampaignType::Regular => "regular",
            CampaignType::Plaintext => "plaintext",
            CampaignType::Absplit => "absplit",
            CampaignType::Rss => "rss",
            CampaignType::Auto => "auto",
            CampaignType::Other(other) => other.as_str(),
        }
    }
}

/// Required and common campaign settings for `campaignCreate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignOptions {
    pub list_id: String,
    pub subject: String,
    pub from_email: String,
    pub from_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generate_text: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_footer: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_css: Option<bool>,
    /// Any other `options` field the API accepts.
    #[serde(flatten)]
    pub extra: Fields,
}

impl CampaignOptions {
    pub fn new(
        list_id: impl Into<String>,
        subject: impl Into<String>,
        from_email: impl Into<String>,
        from_name: impl Into<String>,
    ) -> Self {
        Self {
            list_id: list_id.into(),
            subject: subject.into(),
            from_email: from_email.into(),
            from_name: from_name.into(),
            to_name: None,
            title: None,
            template_id: None,
            folder_id: None,
            generate_text: None,
            auto_footer: None,
            inline_css: None,
            extra: Fields::new(),
        }
    }
}

/// Campaign body. Used both as `campaignCreate` input and as the
/// `campaignContent` result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive: Option<String>,
}

impl CampaignContent {
    pub fn html(html: impl Into<String>) -> Self {
        Self {
            html: Some(html.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentMatch {
    Any,
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentCondition {
    pub field: String,
    pub op: String,
    pub value: Value,
}

impl SegmentCondition {
    pub fn new(field: impl Into<String>, op: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op: op.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentOptions {
    #[serde(rename = "match")]
    pub match_: SegmentMatch,
    pub conditions: Vec<SegmentCondition>,
}

/// Filters for `campaigns`, sent nested under `filters`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CampaignFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub campaign_type: Option<CampaignType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_opt_time"
    )]
    pub sendtime_start: Option<NaiveDateTime>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_opt_time"
    )]
    pub sendtime_end: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact: Option<bool>,
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// A page of results with the server-side total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub total: u64,
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailingList {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub web_id: Option<u64>,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(flatten)]
    pub extra: Fields,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSummary {
    pub email: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// One entry of a member lookup. Entries for unknown addresses carry an
/// `error` marker instead of member data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberInfo {
    pub id: Option<String>,
    #[serde(alias = "email_address")]
    pub email: Option<String>,
    pub email_type: Option<EmailType>,
    pub merges: Fields,
    pub status: Option<MemberStatus>,
    pub timestamp: Option<String>,
    pub error: Option<String>,
    pub code: Option<ErrorCode>,
    #[serde(flatten)]
    pub extra: Fields,
}

impl MemberInfo {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// The in-band error for this entry, if any.
    pub fn api_error(&self) -> Option<ApiError> {
        self.error.as_ref().map(|message| ApiError {
            code: self.code.clone(),
            message: message.clone(),
        })
    }
}

/// Result of a multi-address member lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberInfoBatch {
    pub success: u64,
    pub errors: u64,
    pub data: Vec<MemberInfo>,
}

impl MemberInfoBatch {
    pub fn found(&self) -> impl Iterator<Item = &MemberInfo> {
        self.data.iter().filter(|m| !m.is_error())
    }

    pub fn missing(&self) -> impl Iterator<Item = &MemberInfo> {
        self.data.iter().filter(|m| m.is_error())
    }
}

/// A per-item failure inside a batch result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchError {
    pub code: Option<ErrorCode>,
    pub message: String,
    #[serde(alias = "email_address")]
    pub email: Option<String>,
    pub row: Option<Value>,
}

impl BatchError {
    pub fn to_api_error(&self) -> ApiError {
        ApiError {
            code: self.code.clone(),
            message: self.message.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSubscribeResult {
    pub add_count: u64,
    pub update_count: u64,
    pub error_count: u64,
    pub errors: Vec<BatchError>,
}

impl BatchSubscribeResult {
    pub fn success_count(&self) -> u64 {
        self.add_count + self.update_count
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchUnsubscribeResult {
    pub success_count: u64,
    pub error_count: u64,
    pub errors: Vec<BatchError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeVar {
    pub tag: String,
    pub name: String,
    #[serde(default)]
    pub req: bool,
    #[serde(default)]
    pub field_type: Option<String>,
    #[serde(default)]
    pub public: Option<bool>,
    #[serde(default)]
    pub show: Option<bool>,
    #[serde(flatten)]
    pub extra: Fields,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestGroup {
    pub name: String,
    #[serde(default)]
    pub subscribers: Option<u64>,
    #[serde(flatten)]
    pub extra: Fields,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestGrouping {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub form_field: Option<GroupingType>,
    #[serde(default = "Vec::new")]
    pub groups: Vec<InterestGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    #[serde(default)]
    pub list_id: Option<String>,
    #[serde(rename = "type", default)]
    pub campaign_type: Option<CampaignType>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub send_time: Option<String>,
    #[serde(default)]
    pub from_name: Option<String>,
    #[serde(default)]
    pub from_email: Option<String>,
    #[serde(flatten)]
    pub extra: Fields,
}
