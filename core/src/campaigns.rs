//! Campaign actions.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::connection::Connection;
use crate::error::Result;
use crate::http::Transport;
use crate::params::Params;
use crate::types::{
    format_api_time, Campaign, CampaignContent, CampaignFilters, CampaignOptions, CampaignType,
    EmailType, Fields, Page, SegmentOptions,
};

impl<T: Transport> Connection<T> {
    pub fn campaigns(
        &self,
        filters: &CampaignFilters,
        start: Option<u32>,
        limit: Option<u32>,
    ) -> Result<Page<Campaign>> {
        let params = Params::new()
            .set_serialized("filters", filters)?
            .set_opt("start", start)
            .set_opt("limit", limit);
        self.call("campaigns", &params)
    }

    /// Create a draft campaign and return its id.
    ///
    /// `type_opts` carries the type-specific settings, e.g. `url` for RSS
    /// campaigns.
    pub fn campaign_create(
        &self,
        campaign_type: CampaignType,
        options: &CampaignOptions,
        content: &CampaignContent,
        segment_opts: Option<&SegmentOptions>,
        type_opts: Option<&Fields>,
    ) -> Result<String> {
        let mut params = Params::new()
            .set("type", campaign_type.as_str())
            .set_serialized("options", options)?
            .set_serialized("content", content)?;
        if let Some(segment_opts) = segment_opts {
            params = params.set_serialized("segment_opts", segment_opts)?;
        }
        if let Some(type_opts) = type_opts {
            params = params.set("type_opts", type_opts.clone());
        }
        self.call("campaignCreate", &params)
    }

    pub fn campaign_content(&self, cid: &str) -> Result<CampaignContent> {
        self.call("campaignContent", &Params::new().set("cid", cid))
    }

    /// Copy a campaign, returning the id of the copy.
    pub fn campaign_replicate(&self, cid: &str) -> Result<String> {
        self.call("campaignReplicate", &Params::new().set("cid", cid))
    }

    /// Change a single setting (`subject`, `title`, `content`, ...).
    pub fn campaign_update<V: Serialize + ?Sized>(
        &self,
        cid: &str,
        name: &str,
        value: &V,
    ) -> Result<bool> {
        let params = Params::new()
            .set("cid", cid)
            .set("name", name)
            .set_serialized("value", value)?;
        self.call("campaignUpdate", &params)
    }

    pub fn campaign_delete(&self, cid: &str) -> Result<bool> {
        self.call("campaignDelete", &Params::new().set("cid", cid))
    }

    /// Schedule delivery at `time` (UTC). `time_b` is the second send time
    /// for A/B split campaigns.
    pub fn campaign_schedule(
        &self,
        cid: &str,
        time: NaiveDateTime,
        time_b: Option<NaiveDateTime>,
    ) -> Result<bool> {
        let params = Params::new()
            .set("cid", cid)
            .set("schedule_time", format_api_time(&time))
            .set_opt("schedule_time_b", time_b.as_ref().map(format_api_time));
        self.call("campaignSchedule", &params)
    }

    pub fn campaign_unschedule(&self, cid: &str) -> Result<bool> {
        self.call("campaignUnschedule", &Params::new().set("cid", cid))
    }

    pub fn campaign_pause(&self, cid: &str) -> Result<bool> {
        self.call("campaignPause", &Params::new().set("cid", cid))
    }

    pub fn campaign_resume(&self, cid: &str) -> Result<bool> {
        self.call("campaignResume", &Params::new().set("cid", cid))
    }

    pub fn campaign_send_now(&self, cid: &str) -> Result<bool> {
        self.call("campaignSendNow", &Params::new().set("cid", cid))
    }

    pub fn campaign_send_test(
        &self,
        cid: &str,
        emails: &[&str],
        send_type: Option<EmailType>,
    ) -> Result<bool> {
        let mut params = Params::new()
            .set("cid", cid)
            .set_serialized("test_emails", emails)?;
        if let Some(send_type) = send_type {
            params = params.set_serialized("send_type", &send_type)?;
        }
        self.call("campaignSendTest", &params)
    }

    /// Count the list members a segment would match.
    pub fn campaign_segment_test(&self, list_id: &str, segment: &SegmentOptions) -> Result<u64> {
        let params = Params::new()
            .set("list_id", list_id)
            .set_serialized("options", segment)?;
        self.call("campaignSegmentTest", &params)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use crate::config::ClientConfig;
    use crate::connection::testing::Canned;
    use crate::connection::Connection;
    use crate::error::ErrorCode;
    use crate::types::*;

    fn connection(canned: &Canned) -> Connection<&Canned> {
        Connection::with_transport(ClientConfig::new("key-us1"), canned).unwrap()
    }

    fn options() -> CampaignOptions {
        let mut opts = CampaignOptions::new("l1", "chimpy campaign test", "a@x.com", "chimpy");
        opts.generate_text = Some(true);
        opts
    }

    #[test]
    fn create_flattens_options_content_and_segment() {
        let canned = Canned::with(&[r#""c0ffee""#]);
        let segment = SegmentOptions {
            match_: SegmentMatch::Any,
            conditions: vec![
                SegmentCondition::new("date", "gt", "2000-01-01"),
                SegmentCondition::new("email", "like", "@"),
            ],
        };
        let cid = connection(&canned)
            .campaign_create(
                CampaignType::Regular,
                &options(),
                &CampaignContent::html("<h1>hi</h1>"),
                Some(&segment),
                None,
            )
            .unwrap();
        assert_eq!(cid, "c0ffee");
        assert_eq!(canned.field(0, "type").as_deref(), Some("regular"));
        assert_eq!(canned.field(0, "options[list_id]").as_deref(), Some("l1"));
        assert_eq!(canned.field(0, "options[generate_text]").as_deref(), Some("true"));
        assert_eq!(canned.field(0, "content[html]").as_deref(), Some("<h1>hi</h1>"));
        assert_eq!(canned.field(0, "content[text]"), None);
        assert_eq!(canned.field(0, "segment_opts[match]").as_deref(), Some("any"));
        assert_eq!(
            canned.field(0, "segment_opts[conditions][1][field]").as_deref(),
            Some("email")
        );
        assert_eq!(canned.field(0, "type_opts[url]"), None);
    }

    #[test]
    fn create_rss_sends_type_opts() {
        let canned = Canned::with(&[r#""rss1""#]);
        let mut type_opts = Fields::new();
        type_opts.insert("url".into(), json!("http://mailchimp.com/blog/rss"));
        connection(&canned)
            .campaign_create(
                CampaignType::Rss,
                &options(),
                &CampaignContent::html("<p>rss</p>"),
                None,
                Some(&type_opts),
            )
            .unwrap();
        assert_eq!(
            canned.field(0, "type_opts[url]").as_deref(),
            Some("http://mailchimp.com/blog/rss")
        );
    }

    #[test]
    fn schedule_formats_times() {
        let canned = Canned::with(&["true"]);
        let when = NaiveDate::from_ymd_opt(2112, 12, 20)
            .unwrap()
            .and_hms_opt(19, 0, 0)
            .unwrap();
        assert!(connection(&canned)
            .campaign_schedule("c1", when, None)
            .unwrap());
        assert_eq!(
            canned.field(0, "schedule_time").as_deref(),
            Some("2112-12-20 19:00:00")
        );
        assert_eq!(canned.field(0, "schedule_time_b"), None);
    }

    #[test]
    fn update_sends_name_and_value() {
        let canned = Canned::with(&["true"]);
        assert!(connection(&canned)
            .campaign_update("c1", "subject", "Fresh subject")
            .unwrap());
        assert_eq!(canned.field(0, "name").as_deref(), Some("subject"));
        assert_eq!(canned.field(0, "value").as_deref(), Some("Fresh subject"));
    }

    #[test]
    fn campaigns_sends_only_set_filters() {
        let canned = Canned::with(&[r#"{"total":1,"data":[{"id":"c1","subject":"s","status":"save","type":"regular"}]}"#]);
        let filters = CampaignFilters {
            subject: Some("s".to_string()),
            ..Default::default()
        };
        let page = connection(&canned).campaigns(&filters, None, Some(50)).unwrap();
        assert_eq!(page.data[0].campaign_type, Some(CampaignType::Regular));
        assert_eq!(canned.field(0, "filters[subject]").as_deref(), Some("s"));
        assert_eq!(canned.field(0, "filters[title]"), None);
        assert_eq!(canned.field(0, "limit").as_deref(), Some("50"));
    }

    #[test]
    fn content_decodes_html_and_text() {
        let canned = Canned::with(&[r#"{"html":"<h1>My test newsletter</h1>","text":"My test newsletter"}"#]);
        let content = connection(&canned).campaign_content("c1").unwrap();
        assert!(content.html.unwrap().contains("<h1>My test newsletter</h1>"));
        assert_eq!(content.text.as_deref(), Some("My test newsletter"));
    }

    #[test]
    fn pause_on_regular_campaign_surfaces_error() {
        let canned = Canned::with(&[r#"{"error":"Cannot pause this campaign","code":313}"#]);
        let err = connection(&canned).campaign_pause("c1").unwrap_err();
        assert_eq!(err.as_api().unwrap().code, Some(ErrorCode::from(313)));
    }

    #[test]
    fn send_test_lists_addresses() {
        let canned = Canned::with(&["true"]);
        connection(&canned)
            .campaign_send_test("c1", &["a@x.com", "b@x.com"], Some(EmailType::Text))
            .unwrap();
        assert_eq!(canned.field(0, "test_emails[1]").as_deref(), Some("b@x.com"));
        assert_eq!(canned.field(0, "send_type").as_deref(), Some("text"));
    }

    #[test]
    fn segment_test_returns_count() {
        let canned = Canned::with(&["3"]);
        let segment = SegmentOptions {
            match_: SegmentMatch::All,
            conditions: vec![SegmentCondition::new("email", "like", "@")],
        };
        assert_eq!(
            connection(&canned).campaign_segment_test("l1", &segment).unwrap(),
            3
        );
        assert_eq!(canned.field(0, "options[match]").as_deref(), Some("all"));
    }
}
