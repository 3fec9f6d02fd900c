//! List, subscriber, merge variable and interest group actions.
//!
//! Batch actions report per-item failures as data. Only a batch in which
//! nothing succeeded is raised, using the first itemized error. Multi-address
//! member lookups likewise report unknown addresses in-band, while the
//! single-address lookup raises.

use log::debug;
use serde::Serialize;

use crate::connection::Connection;
use crate::error::{ApiError, ChimpError, Result};
use crate::http::Transport;
use crate::params::Params;
use crate::types::{
    BatchError, BatchSubscribeOptions, BatchSubscribeResult, BatchUnsubscribeResult, GroupingType,
    InterestGroup, InterestGrouping, MailingList, MemberInfo, MemberInfoBatch, MemberQuery,
    MemberSummary, MergeVar, MergeVarOptions, Page, SubscribeOptions, UnsubscribeOptions,
    UpdateMemberOptions,
};

impl<T: Transport> Connection<T> {
    // --- lists ---

    pub fn lists(&self, start: Option<u32>, limit: Option<u32>) -> Result<Page<MailingList>> {
        let params = Params::new()
            .set_opt("start", start)
            .set_opt("limit", limit);
        self.call("lists", &params)
    }

    pub fn list_members(&self, list_id: &str, query: &MemberQuery) -> Result<Page<MemberSummary>> {
        let params = Params::new().set("id", list_id).merge(query)?;
        self.call("listMembers", &params)
    }

    // --- subscribers ---

    pub fn list_subscribe<M: Serialize + ?Sized>(
        &self,
        list_id: &str,
        email: &str,
        merge_vars: &M,
        options: &SubscribeOptions,
    ) -> Result<bool> {
        let params = Params::new()
            .set("id", list_id)
            .set("email_address", email)
            .set_serialized("merge_vars", merge_vars)?
            .merge(options)?;
        self.call("listSubscribe", &params)
    }

    pub fn list_unsubscribe(
        &self,
        list_id: &str,
        email: &str,
        options: &UnsubscribeOptions,
    ) -> Result<bool> {
        let params = Params::new()
            .set("id", list_id)
            .set("email_address", email)
            .merge(options)?;
        self.call("listUnsubscribe", &params)
    }

    pub fn list_update_member<M: Serialize + ?Sized>(
        &self,
        list_id: &str,
        email: &str,
        merge_vars: &M,
        options: &UpdateMemberOptions,
    ) -> Result<bool> {
        let params = Params::new()
            .set("id", list_id)
            .set("email_address", email)
            .set_serialized("merge_vars", merge_vars)?
            .merge(options)?;
        self.call("listUpdateMember", &params)
    }

    /// Subscribe many records in one request. Each record is a mapping of
    /// merge fields including `EMAIL` (and optionally `EMAIL_TYPE`).
    pub fn list_batch_subscribe<R: Serialize>(
        &self,
        list_id: &str,
        batch: &[R],
        options: &BatchSubscribeOptions,
    ) -> Result<BatchSubscribeResult> {
        let params = Params::new()
            .set("id", list_id)
            .set_serialized("batch", batch)?
            .merge(options)?;
        let result: BatchSubscribeResult = self.call("listBatchSubscribe", &params)?;
        debug!(
            "listBatchSubscribe: {} added, {} updated, {} failed",
            result.add_count, result.update_count, result.error_count
        );
        reject_total_failure(result.success_count(), result.error_count, &result.errors)?;
        Ok(result)
    }

    pub fn list_batch_unsubscribe(
        &self,
        list_id: &str,
        emails: &[&str],
        options: &UnsubscribeOptions,
    ) -> Result<BatchUnsubscribeResult> {
        let params = Params::new()
            .set("id", list_id)
            .set_serialized("emails", emails)?
            .merge(options)?;
        let result: BatchUnsubscribeResult = self.call("listBatchUnsubscribe", &params)?;
        debug!(
            "listBatchUnsubscribe: {} removed, {} failed",
            result.success_count, result.error_count
        );
        reject_total_failure(result.success_count, result.error_count, &result.errors)?;
        Ok(result)
    }

    /// Look up several addresses at once. Unknown addresses come back as
    /// entries carrying an `error` marker; the call itself does not fail.
    pub fn list_member_info(&self, list_id: &str, emails: &[&str]) -> Result<MemberInfoBatch> {
        let params = Params::new()
            .set("id", list_id)
            .set_serialized("email_address", emails)?;
        self.call("listMemberInfo", &params)
    }

    /// Look up a single address, failing if it is not on the list.
    pub fn list_member(&self, list_id: &str, email: &str) -> Result<MemberInfo> {
        let batch = self.list_member_info(list_id, &[email])?;
        let info = batch.data.into_iter().next().ok_or_else(|| ApiError {
            code: None,
            message: format!("no member data returned for {email}"),
        })?;
        match info.api_error() {
            Some(err) => Err(err.into()),
            None => Ok(info),
        }
    }

    // --- merge variables ---

    pub fn list_merge_vars(&self, list_id: &str) -> Result<Vec<MergeVar>> {
        self.call("listMergeVars", &Params::new().set("id", list_id))
    }

    pub fn list_merge_var_add(
        &self,
        list_id: &str,
        tag: &str,
        name: &str,
        options: &MergeVarOptions,
    ) -> Result<bool> {
        let params = Params::new()
            .set("id", list_id)
            .set("tag", tag)
            .set("name", name)
            .set_serialized("options", options)?;
        self.call("listMergeVarAdd", &params)
    }

    pub fn list_merge_var_update(
        &self,
        list_id: &str,
        tag: &str,
        options: &MergeVarOptions,
    ) -> Result<bool> {
        let params = Params::new()
            .set("id", list_id)
            .set("tag", tag)
            .set_serialized("options", options)?;
        self.call("listMergeVarUpdate", &params)
    }

    pub fn list_merge_var_del(&self, list_id: &str, tag: &str) -> Result<bool> {
        let params = Params::new().set("id", list_id).set("tag", tag);
        self.call("listMergeVarDel", &params)
    }

    // --- interest groupings and groups ---

    pub fn list_interest_groupings(&self, list_id: &str) -> Result<Vec<InterestGrouping>> {
        self.call("listInterestGroupings", &Params::new().set("id", list_id))
    }

    /// The groups of one grouping, selected out of `listInterestGroupings`.
    pub fn list_interest_groups(
        &self,
        list_id: &str,
        grouping_id: u64,
    ) -> Result<Vec<InterestGroup>> {
        self.list_interest_groupings(list_id)?
            .into_iter()
            .find(|grouping| grouping.id == grouping_id)
            .map(|grouping| grouping.groups)
            .ok_or(ChimpError::UnknownGrouping(grouping_id))
    }

    /// Create a grouping with its initial groups, returning the new id.
    pub fn list_interest_groupings_add(
        &self,
        list_id: &str,
        name: &str,
        grouping_type: GroupingType,
        groups: &[&str],
    ) -> Result<u64> {
        let params = Params::new()
            .set("id", list_id)
            .set("name", name)
            .set_serialized("type", &grouping_type)?
            .set_serialized("groups", groups)?;
        self.call("listInterestGroupingAdd", &params)
    }

    pub fn list_interest_groupings_del(&self, grouping_id: u64) -> Result<bool> {
        let params = Params::new().set("grouping_id", grouping_id);
        self.call("listInterestGroupingDel", &params)
    }

    /// Add a group. Without `grouping_id` the list's first grouping is used.
    pub fn list_interest_group_add(
        &self,
        list_id: &str,
        group_name: &str,
        grouping_id: Option<u64>,
    ) -> Result<bool> {
        let params = Params::new()
            .set("id", list_id)
            .set("group_name", group_name)
            .set_opt("grouping_id", grouping_id);
        self.call("listInterestGroupAdd", &params)
    }

    pub fn list_interest_group_update(
        &self,
        list_id: &str,
        old_name: &str,
        new_name: &str,
        grouping_id: Option<u64>,
    ) -> Result<bool> {
        let params = Params::new()
            .set("id", list_id)
            .set("old_name", old_name)
            .set("new_name", new_name)
            .set_opt("grouping_id", grouping_id);
        self.call("listInterestGroupUpdate", &params)
    }

    pub fn list_interest_group_del(
        &self,
        list_id: &str,
        group_name: &str,
        grouping_id: Option<u64>,
    ) -> Result<bool> {
        let params = Params::new()
            .set("id", list_id)
            .set("group_name", group_name)
            .set_opt("grouping_id", grouping_id);
        self.call("listInterestGroupDel", &params)
    }
}

/// A batch where every item failed is a request-level failure.
fn reject_total_failure(successes: u64, failures: u64, errors: &[BatchError]) -> Result<()> {
    if successes > 0 || failures == 0 {
        return Ok(());
    }
    let err = match errors.first() {
        Some(first) => first.to_api_error(),
        None => ApiError {
            code: None,
            message: format!("all {failures} batch items failed"),
        },
    };
    Err(err.into())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::config::ClientConfig;
    use crate::connection::testing::Canned;
    use crate::connection::Connection;
    use crate::error::{ChimpError, ErrorCode};
    use crate::types::*;

    fn connection(canned: &Canned) -> Connection<&Canned> {
        Connection::with_transport(ClientConfig::new("key-us1"), canned).unwrap()
    }

    #[test]
    fn subscribe_sends_only_the_options_that_were_set() {
        let canned = Canned::with(&["true"]);
        let merges = json!({"FIRST": "unit", "LAST": "tests"});
        let opts = SubscribeOptions {
            double_optin: Some(false),
            ..Default::default()
        };
        assert!(connection(&canned)
            .list_subscribe("l1", "a@x.com", &merges, &opts)
            .unwrap());

        let fields = canned.fields(0);
        let names: Vec<&str> = fields.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "method",
                "apikey",
                "output",
                "double_optin",
                "email_address",
                "id",
                "merge_vars[FIRST]",
                "merge_vars[LAST]",
            ]
        );
        assert_eq!(canned.field(0, "double_optin").as_deref(), Some("false"));
    }

    #[test]
    fn batch_subscribe_indexes_records() {
        let canned = Canned::with(&[r#"{"add_count":2,"update_count":0,"error_count":0,"errors":[]}"#]);
        let batch = vec![
            json!({"EMAIL": "a@x.com", "EMAIL_TYPE": "html"}),
            json!({"EMAIL": "b@x.com", "EMAIL_TYPE": "text"}),
        ];
        let result = connection(&canned)
            .list_batch_subscribe("l1", &batch, &BatchSubscribeOptions::default())
            .unwrap();
        assert_eq!(result.add_count, 2);
        assert_eq!(canned.field(0, "batch[1][EMAIL]").as_deref(), Some("b@x.com"));
        assert_eq!(canned.field(0, "batch[0][EMAIL_TYPE]").as_deref(), Some("html"));
    }

    #[test]
    fn partial_batch_unsubscribe_is_data() {
        let canned = Canned::with(&[r#"{
            "success_count": 1,
            "error_count": 1,
            "errors": [{"email": "nosuch@example.com", "code": 232, "message": "not a member"}]
        }"#]);
        let result = connection(&canned)
            .list_batch_unsubscribe(
                "l1",
                &["nosuch@example.com", "a@x.com"],
                &UnsubscribeOptions::delete_quietly(),
            )
            .unwrap();
        assert_eq!(result.success_count, 1);
        assert_eq!(result.error_count, 1);
        assert_eq!(result.errors[0].email.as_deref(), Some("nosuch@example.com"));
        assert_eq!(canned.field(0, "emails[1]").as_deref(), Some("a@x.com"));
        assert_eq!(canned.field(0, "delete_member").as_deref(), Some("true"));
    }

    #[test]
    fn total_batch_unsubscribe_failure_raises_first_item_error() {
        let canned = Canned::with(&[r#"{
            "success_count": 0,
            "error_count": 1,
            "errors": [{"email": "nosuch@example.com", "code": 232, "message": "not a member"}]
        }"#]);
        let err = connection(&canned)
            .list_batch_unsubscribe("l1", &["nosuch@example.com"], &UnsubscribeOptions::default())
            .unwrap_err();
        let api = err.as_api().unwrap();
        assert_eq!(api.code, Some(ErrorCode::from(232)));
        assert_eq!(api.message, "not a member");
    }

    #[test]
    fn total_failure_without_itemized_errors_still_raises() {
        let canned = Canned::with(&[r#"{"add_count":0,"update_count":0,"error_count":3}"#]);
        let err = connection(&canned)
            .list_batch_subscribe("l1", &[json!({"EMAIL": "bad"})], &BatchSubscribeOptions::default())
            .unwrap_err();
        assert_eq!(err.as_api().unwrap().message, "all 3 batch items failed");
    }

    #[test]
    fn empty_batch_is_not_a_failure() {
        let canned = Canned::with(&[r#"{"success_count":0,"error_count":0,"errors":[]}"#]);
        let result = connection(&canned)
            .list_batch_unsubscribe("l1", &[], &UnsubscribeOptions::default())
            .unwrap();
        assert_eq!(result.success_count, 0);
    }

    #[test]
    fn multi_member_lookup_reports_missing_in_band() {
        let canned = Canned::with(&[r#"{
            "success": 1,
            "errors": 1,
            "data": [
                {"email_address": "nosuch@example.com", "error": "no record", "code": 232},
                {"id": "m1", "email": "a@x.com", "merges": {"FIRST": "unit"}, "status": "subscribed"}
            ]
        }"#]);
        let batch = connection(&canned)
            .list_member_info("l1", &["nosuch@example.com", "a@x.com"])
            .unwrap();
        assert_eq!(batch.missing().count(), 1);
        assert_eq!(batch.found().next().unwrap().email.as_deref(), Some("a@x.com"));
        assert_eq!(
            canned.field(0, "email_address[0]").as_deref(),
            Some("nosuch@example.com")
        );
    }

    #[test]
    fn single_member_lookup_raises_when_missing() {
        let canned = Canned::with(&[r#"{
            "success": 0,
            "errors": 1,
            "data": [{"email_address": "nosuch@example.com", "error": "no record", "code": 232}]
        }"#]);
        let err = connection(&canned)
            .list_member("l1", "nosuch@example.com")
            .unwrap_err();
        let api = err.as_api().unwrap();
        assert_eq!(api.code, Some(ErrorCode::from(232)));
        assert_eq!(api.message, "no record");
    }

    #[test]
    fn single_member_lookup_returns_member() {
        let canned = Canned::with(&[r#"{
            "success": 1,
            "errors": 0,
            "data": [{"id": "m1", "email": "a@x.com", "merges": {"TEST": "abc"}}]
        }"#]);
        let info = connection(&canned).list_member("l1", "a@x.com").unwrap();
        assert_eq!(info.merges["TEST"], "abc");
    }

    #[test]
    fn interest_groups_are_selected_by_grouping_id() {
        let body = r#"[
            {"id": 7, "name": "g7", "form_field": "hidden", "groups": [{"name": "first group", "subscribers": 0}]},
            {"id": 9, "name": "g9", "form_field": "checkboxes", "groups": []}
        ]"#;
        let canned = Canned::with(&[body, body]);
        let conn = connection(&canned);

        let groups = conn.list_interest_groups("l1", 7).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "first group");

        let err = conn.list_interest_groups("l1", 8).unwrap_err();
        assert!(matches!(err, ChimpError::UnknownGrouping(8)));
    }

    #[test]
    fn grouping_add_returns_new_id() {
        let canned = Canned::with(&["42"]);
        let id = connection(&canned)
            .list_interest_groupings_add("l1", "test grouping", GroupingType::Hidden, &["first group"])
            .unwrap();
        assert_eq!(id, 42);
        assert_eq!(canned.field(0, "type").as_deref(), Some("hidden"));
        assert_eq!(canned.field(0, "groups[0]").as_deref(), Some("first group"));
    }

    #[test]
    fn group_add_omits_grouping_when_unset() {
        let canned = Canned::with(&["true"]);
        connection(&canned)
            .list_interest_group_add("l1", "test", None)
            .unwrap();
        assert_eq!(canned.field(0, "grouping_id"), None);
    }

    #[test]
    fn merge_var_options_are_nested() {
        let canned = Canned::with(&["true"]);
        let opts = MergeVarOptions {
            req: Some(false),
            field_type: Some("text".to_string()),
            ..Default::default()
        };
        connection(&canned)
            .list_merge_var_add("l1", "TEST", "test merge var", &opts)
            .unwrap();
        assert_eq!(canned.field(0, "options[req]").as_deref(), Some("false"));
        assert_eq!(canned.field(0, "options[field_type]").as_deref(), Some("text"));
        assert_eq!(canned.field(0, "name").as_deref(), Some("test merge var"));
    }

    #[test]
    fn duplicate_merge_var_surfaces_remote_error() {
        let canned = Canned::with(&[r#"{"error":"A Merge Field with the tag \"TEST\" already exists","code":254}"#]);
        let err = connection(&canned)
            .list_merge_var_add("l1", "TEST", "again", &MergeVarOptions::default())
            .unwrap_err();
        assert_eq!(err.as_api().unwrap().code, Some(ErrorCode::from(254)));
    }

    #[test]
    fn list_members_forwards_query() {
        let canned = Canned::with(&[r#"{"total":1,"data":[{"email":"a@x.com","timestamp":"2024-01-01 00:00:00"}]}"#]);
        let query = MemberQuery {
            status: Some(MemberStatus::Subscribed),
            limit: Some(10),
            ..Default::default()
        };
        let page = connection(&canned).list_members("l1", &query).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].email, "a@x.com");
        assert_eq!(canned.field(0, "status").as_deref(), Some("subscribed"));
        assert_eq!(canned.field(0, "limit").as_deref(), Some("10"));
        assert_eq!(canned.field(0, "start"), None);
    }
}
