//! In-memory stand-in for the remote account: lists, members, merge
//! variables, interest groupings and campaigns.
//!
//! Behaviour follows the 1.3 API closely enough for client tests: failures
//! are reported as `{"error": .., "code": ..}` objects, batch actions report
//! per-item failures as data, and duplicate merge tags or group names are
//! rejected rather than silently accepted.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use log::debug;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::form::Args;

pub const DEFAULT_LIST_ID: &str = "1a2b3c4d5e";
pub const DEFAULT_LIST_NAME: &str = "unittests";
pub const PING_REPLY: &str = "Everything's Chimpy!";

const API_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const TIMESTAMP: &str = "2024-01-01 00:00:00";
const SENT_TIME: &str = "2024-01-02 12:00:00";

/// Remote error codes used by the mock.
pub mod codes {
    pub const INVALID_PARAMETERS: i64 = -32602;
    pub const METHOD_UNKNOWN: i64 = -32601;
    pub const INVALID_API_KEY: i64 = 104;
    pub const LIST_DOES_NOT_EXIST: i64 = 200;
    pub const INVALID_INTEREST_FIELD_TYPE: i64 = 211;
    pub const ALREADY_SUBSCRIBED: i64 = 214;
    pub const NOT_SUBSCRIBED: i64 = 215;
    pub const EMAIL_NOT_EXISTS: i64 = 232;
    pub const MERGE_FIELD_REQUIRED: i64 = 250;
    pub const CANNOT_REMOVE_EMAIL_MERGE: i64 = 251;
    pub const INVALID_MERGE_FIELD: i64 = 254;
    pub const INVALID_INTEREST_GROUP: i64 = 270;
    pub const CAMPAIGN_DOES_NOT_EXIST: i64 = 300;
    pub const CAMPAIGN_INVALID_CONTENT: i64 = 311;
    pub const CAMPAIGN_INVALID_OPTION: i64 = 312;
    pub const CAMPAIGN_INVALID_STATUS: i64 = 313;
    pub const CAMPAIGN_INVALID_SEGMENT: i64 = 315;
    pub const CAMPAIGN_INVALID_RSS: i64 = 316;
    pub const INVALID_EMAIL: i64 = 502;
}

/// A remote-reported failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: i64,
    pub message: String,
}

impl Fault {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn missing(key: &str) -> Self {
        Self::new(codes::INVALID_PARAMETERS, format!("{key} must be provided"))
    }

    pub fn invalid(key: &str) -> Self {
        Self::new(codes::INVALID_PARAMETERS, format!("invalid value for {key}"))
    }

    pub fn to_json(&self) -> Value {
        json!({"error": self.message, "code": self.code})
    }

    /// The per-item shape used inside batch results.
    fn item(&self, email: &str) -> Value {
        json!({"email": email, "code": self.code, "message": self.message})
    }
}

type Outcome = Result<Value, Fault>;

#[derive(Debug, Clone)]
struct Member {
    id: String,
    email_type: String,
    merges: Map<String, Value>,
    status: &'static str,
}

#[derive(Debug, Clone)]
struct MergeVar {
    tag: String,
    name: String,
    req: bool,
    field_type: String,
    public: bool,
    show: bool,
}

#[derive(Debug, Clone)]
struct Grouping {
    id: u64,
    name: String,
    form_field: String,
    groups: Vec<String>,
}

#[derive(Debug, Clone)]
struct MailList {
    id: String,
    name: String,
    web_id: u64,
    members: BTreeMap<String, Member>,
    merge_vars: Vec<MergeVar>,
    groupings: Vec<Grouping>,
}

#[derive(Debug, Clone)]
struct Campaign {
    id: String,
    web_id: u64,
    list_id: String,
    kind: String,
    title: String,
    subject: String,
    from_name: String,
    from_email: String,
    to_name: String,
    status: &'static str,
    send_time: Option<String>,
    html: String,
    text: String,
    type_opts: Map<String, Value>,
}

#[derive(Debug, Default)]
pub struct Store {
    lists: Vec<MailList>,
    campaigns: Vec<Campaign>,
    next_id: u64,
}

impl Store {
    /// A store holding one empty list with the `EMAIL`, `FIRST` and `LAST`
    /// merge variables.
    pub fn seeded() -> Self {
        let mut store = Store::default();
        store.add_list(DEFAULT_LIST_ID, DEFAULT_LIST_NAME);
        store
    }

    pub fn add_list(&mut self, id: &str, name: &str) {
        let web_id = self.next();
        let field = |tag: &str, name: &str, req: bool| MergeVar {
            tag: tag.to_string(),
            name: name.to_string(),
            req,
            field_type: if tag == "EMAIL" { "email" } else { "text" }.to_string(),
            public: true,
            show: true,
        };
        self.lists.push(MailList {
            id: id.to_string(),
            name: name.to_string(),
            web_id,
            members: BTreeMap::new(),
            merge_vars: vec![
                field("EMAIL", "Email Address", true),
                field("FIRST", "First Name", false),
                field("LAST", "Last Name", false),
            ],
            groupings: Vec::new(),
        });
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Dispatch one action.
    pub fn handle(&mut self, method: &str, args: &Args) -> Outcome {
        debug!("mock handling {method}");
        match method {
            "ping" => Ok(json!(PING_REPLY)),
            "lists" => self.lists(args),
            "listMembers" => self.list_members(args),
            "listSubscribe" => self.list_subscribe(args),
            "listUnsubscribe" => self.list_unsubscribe(args),
            "listUpdateMember" => self.list_update_member(args),
            "listBatchSubscribe" => self.list_batch_subscribe(args),
            "listBatchUnsubscribe" => self.list_batch_unsubscribe(args),
            "listMemberInfo" => self.list_member_info(args),
            "listMergeVars" => self.list_merge_vars(args),
            "listMergeVarAdd" => self.list_merge_var_add(args),
            "listMergeVarUpdate" => self.list_merge_var_update(args),
            "listMergeVarDel" => self.list_merge_var_del(args),
            "listInterestGroupings" => self.list_interest_groupings(args),
            "listInterestGroupingAdd" => self.list_interest_grouping_add(args),
            "listInterestGroupingDel" => self.list_interest_grouping_del(args),
            "listInterestGroupAdd" => self.list_interest_group_add(args),
            "listInterestGroupUpdate" => self.list_interest_group_update(args),
            "listInterestGroupDel" => self.list_interest_group_del(args),
            "campaigns" => self.campaigns(args),
            "campaignCreate" => self.campaign_create(args),
            "campaignContent" => self.campaign_content(args),
            "campaignReplicate" => self.campaign_replicate(args),
            "campaignUpdate" => self.campaign_update(args),
            "campaignDelete" => self.campaign_delete(args),
            "campaignSchedule" => self.campaign_schedule(args),
            "campaignUnschedule" => self.campaign_transition(args, &["schedule"], "save"),
            "campaignPause" => self.campaign_transition(args, &["sending"], "paused"),
            "campaignResume" => self.campaign_transition(args, &["paused"], "sending"),
            "campaignSendNow" => self.campaign_send_now(args),
            "campaignSendTest" => self.campaign_send_test(args),
            "campaignSegmentTest" => self.campaign_segment_test(args),
            other => Err(Fault::new(
                codes::METHOD_UNKNOWN,
                format!("Unknown method \"{other}\""),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    fn list(&self, id: &str) -> Result<&MailList, Fault> {
        self.lists
            .iter()
            .find(|l| l.id == id)
            .ok_or_else(|| no_such_list(id))
    }

    fn list_mut(&mut self, id: &str) -> Result<&mut MailList, Fault> {
        self.lists
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| no_such_list(id))
    }

    fn campaign_mut(&mut self, cid: &str) -> Result<&mut Campaign, Fault> {
        self.campaigns
            .iter_mut()
            .find(|c| c.id == cid)
            .ok_or_else(|| no_such_campaign(cid))
    }

    // ------------------------------------------------------------------
    // Lists and members
    // ------------------------------------------------------------------

    fn lists(&self, args: &Args) -> Outcome {
        let data: Vec<Value> = self
            .lists
            .iter()
            .map(|l| {
                let subscribed = l
                    .members
                    .values()
                    .filter(|m| m.status == "subscribed")
                    .count();
                json!({
                    "id": l.id,
                    "web_id": l.web_id,
                    "name": l.name,
                    "date_created": TIMESTAMP,
                    "stats": {"member_count": subscribed},
                })
            })
            .collect();
        page(data, args, 25)
    }

    fn list_members(&self, args: &Args) -> Outcome {
        let list = self.list(args.str("id")?)?;
        let status = args.opt_str("status").unwrap_or("subscribed");
        let data: Vec<Value> = list
            .members
            .iter()
            .filter(|(_, m)| m.status == status)
            .map(|(email, _)| json!({"email": email, "timestamp": TIMESTAMP}))
            .collect();
        page(data, args, 100)
    }

    fn list_subscribe(&mut self, args: &Args) -> Outcome {
        let email = args.str("email_address")?.to_string();
        let merges = args.map("merge_vars");
        let double_optin = args.flag("double_optin", true);
        let update_existing = args.flag("update_existing", false);
        let replace_interests = args.flag("replace_interests", true);
        let email_type = args.opt_str("email_type").unwrap_or("html").to_string();
        let list = self.list_mut(args.str("id")?)?;

        subscribe_one(
            list,
            &email,
            &email_type,
            &merges,
            double_optin,
            update_existing,
            replace_interests,
        )?;
        Ok(json!(true))
    }

    fn list_unsubscribe(&mut self, args: &Args) -> Outcome {
        let email = args.str("email_address")?;
        let delete = args.flag("delete_member", false);
        let list = self.list_mut(args.str("id")?)?;
        unsubscribe_one(list, email, delete)?;
        Ok(json!(true))
    }

    fn list_update_member(&mut self, args: &Args) -> Outcome {
        let email = args.str("email_address")?;
        let incoming = args.map("merge_vars");
        let replace_interests = args.flag("replace_interests", true);
        let email_type = args.opt_str("email_type").map(str::to_string);
        let list = self.list_mut(args.str("id")?)?;

        let mut merges = list
            .members
            .get(email)
            .map(|m| m.merges.clone())
            .ok_or_else(|| no_such_member(email))?;
        apply_merges(list, &mut merges, &incoming, replace_interests)?;
        if let Some(member) = list.members.get_mut(email) {
            member.merges = merges;
            if let Some(email_type) = email_type {
                member.email_type = email_type;
            }
        }
        Ok(json!(true))
    }

    fn list_batch_subscribe(&mut self, args: &Args) -> Outcome {
        let batch = args.list("batch");
        let double_optin = args.flag("double_optin", true);
        let update_existing = args.flag("update_existing", false);
        let replace_interests = args.flag("replace_interests", true);
        let list = self.list_mut(args.str("id")?)?;

        let (mut added, mut updated) = (0, 0);
        let mut errors = Vec::new();
        for (row, record) in batch.iter().enumerate() {
            let merges = record.as_object().cloned().unwrap_or_default();
            let email = merges
                .get("EMAIL")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let email_type = merges
                .get("EMAIL_TYPE")
                .and_then(Value::as_str)
                .unwrap_or("html")
                .to_string();
            match subscribe_one(
                list,
                &email,
                &email_type,
                &merges,
                double_optin,
                update_existing,
                replace_interests,
            ) {
                Ok(true) => updated += 1,
                Ok(false) => added += 1,
                Err(fault) => {
                    let mut item = fault.item(&email);
                    item["row"] = json!(row);
                    errors.push(item);
                }
            }
        }
        Ok(json!({
            "add_count": added,
            "update_count": updated,
            "error_count": errors.len(),
            "errors": errors,
        }))
    }

    fn list_batch_unsubscribe(&mut self, args: &Args) -> Outcome {
        let emails = args.strings("emails");
        let delete = args.flag("delete_member", false);
        let list = self.list_mut(args.str("id")?)?;

        let mut success = 0;
        let mut errors = Vec::new();
        for email in &emails {
            match unsubscribe_one(list, email, delete) {
                Ok(()) => success += 1,
                Err(fault) => errors.push(fault.item(email)),
            }
        }
        Ok(json!({
            "success_count": success,
            "error_count": errors.len(),
            "errors": errors,
        }))
    }

    fn list_member_info(&self, args: &Args) -> Outcome {
        let list = self.list(args.str("id")?)?;
        let emails = args.strings("email_address");
        if emails.is_empty() {
            return Err(Fault::missing("email_address"));
        }

        let mut found = 0;
        let data: Vec<Value> = emails
            .iter()
            .map(|email| match list.members.get(email) {
                Some(m) => {
                    found += 1;
                    let mut merges = m.merges.clone();
                    merges.insert("EMAIL".to_string(), json!(email));
                    json!({
                        "id": m.id,
                        "email": email,
                        "email_type": m.email_type,
                        "merges": merges,
                        "status": m.status,
                        "timestamp": TIMESTAMP,
                        "member_rating": 2,
                    })
                }
                None => {
                    let fault = no_such_member(email);
                    json!({"email_address": email, "error": fault.message, "code": fault.code})
                }
            })
            .collect();
        Ok(json!({
            "success": found,
            "errors": emails.len() - found,
            "data": data,
        }))
    }

    // ------------------------------------------------------------------
    // Merge variables
    // ------------------------------------------------------------------

    fn list_merge_vars(&self, args: &Args) -> Outcome {
        let list = self.list(args.str("id")?)?;
        let vars: Vec<Value> = list
            .merge_vars
            .iter()
            .enumerate()
            .map(|(order, v)| {
                json!({
                    "tag": v.tag,
                    "name": v.name,
                    "req": v.req,
                    "field_type": v.field_type,
                    "public": v.public,
                    "show": v.show,
                    "order": order.to_string(),
                    "default": "",
                    "size": "25",
                })
            })
            .collect();
        Ok(Value::Array(vars))
    }

    fn list_merge_var_add(&mut self, args: &Args) -> Outcome {
        let tag = args.str("tag")?.to_uppercase();
        let name = args.str("name")?.to_string();
        let options = args.map("options");
        let list = self.list_mut(args.str("id")?)?;

        if tag.is_empty()
            || tag.len() > 10
            || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(Fault::new(
                codes::INVALID_MERGE_FIELD,
                format!("\"{tag}\" is not a valid merge tag"),
            ));
        }
        if list.merge_vars.iter().any(|v| v.tag == tag) {
            return Err(Fault::new(
                codes::INVALID_MERGE_FIELD,
                format!("A Merge Field with the tag \"{tag}\" already exists"),
            ));
        }
        let opts = Args::new(&options);
        list.merge_vars.push(MergeVar {
            tag,
            name,
            req: opts.flag("req", false),
            field_type: opts.opt_str("field_type").unwrap_or("text").to_string(),
            public: opts.flag("public", true),
            show: opts.flag("show", true),
        });
        Ok(json!(true))
    }

    fn list_merge_var_update(&mut self, args: &Args) -> Outcome {
        let tag = args.str("tag")?.to_uppercase();
        let options = args.map("options");
        let list = self.list_mut(args.str("id")?)?;
        let var = list
            .merge_vars
            .iter_mut()
            .find(|v| v.tag == tag)
            .ok_or_else(|| no_such_merge_var(&tag))?;

        let opts = Args::new(&options);
        if let Some(name) = opts.opt_str("name") {
            var.name = name.to_string();
        }
        if let Some(field_type) = opts.opt_str("field_type") {
            var.field_type = field_type.to_string();
        }
        var.req = opts.flag("req", var.req);
        var.public = opts.flag("public", var.public);
        var.show = opts.flag("show", var.show);
        Ok(json!(true))
    }

    fn list_merge_var_del(&mut self, args: &Args) -> Outcome {
        let tag = args.str("tag")?.to_uppercase();
        let list = self.list_mut(args.str("id")?)?;
        if tag == "EMAIL" {
            return Err(Fault::new(
                codes::CANNOT_REMOVE_EMAIL_MERGE,
                "The EMAIL merge field can not be removed",
            ));
        }
        let before = list.merge_vars.len();
        list.merge_vars.retain(|v| v.tag != tag);
        if list.merge_vars.len() == before {
            return Err(no_such_merge_var(&tag));
        }
        for member in list.members.values_mut() {
            member.merges.remove(&tag);
        }
        Ok(json!(true))
    }

    // ------------------------------------------------------------------
    // Interest groupings
    // ------------------------------------------------------------------

    fn list_interest_groupings(&self, args: &Args) -> Outcome {
        let list = self.list(args.str("id")?)?;
        let groupings: Vec<Value> = list
            .groupings
            .iter()
            .map(|g| {
                let groups: Vec<Value> = g
                    .groups
                    .iter()
                    .enumerate()
                    .map(|(i, name)| {
                        let subscribers = list
                            .members
                            .values()
                            .filter(|m| interests(&m.merges).iter().any(|n| n == name))
                            .count();
                        json!({
                            "bit": (1u64 << i).to_string(),
                            "name": name,
                            "display_order": (i + 1).to_string(),
                            "subscribers": subscribers,
                        })
                    })
                    .collect();
                json!({
                    "id": g.id,
                    "name": g.name,
                    "form_field": g.form_field,
                    "display_order": "0",
                    "groups": groups,
                })
            })
            .collect();
        Ok(Value::Array(groupings))
    }

    fn list_interest_grouping_add(&mut self, args: &Args) -> Outcome {
        let name = args.str("name")?.to_string();
        let form_field = args.str("type")?.to_string();
        let groups = args.strings("groups");
        let id = self.next();
        let list = self.list_mut(args.str("id")?)?;

        if !matches!(
            form_field.as_str(),
            "checkboxes" | "hidden" | "dropdown" | "radio"
        ) {
            return Err(Fault::new(
                codes::INVALID_INTEREST_FIELD_TYPE,
                format!("Invalid interest grouping type \"{form_field}\""),
            ));
        }
        if groups.is_empty() {
            return Err(Fault::missing("groups"));
        }
        if list.groupings.iter().any(|g| g.name == name) {
            return Err(Fault::new(
                codes::INVALID_INTEREST_GROUP,
                format!("A grouping named \"{name}\" already exists"),
            ));
        }
        list.groupings.push(Grouping {
            id,
            name,
            form_field,
            groups,
        });
        Ok(json!(id))
    }

    fn list_interest_grouping_del(&mut self, args: &Args) -> Outcome {
        let grouping_id = args.u64("grouping_id")?;
        for list in &mut self.lists {
            if let Some(pos) = list.groupings.iter().position(|g| g.id == grouping_id) {
                let removed = list.groupings.remove(pos);
                for member in list.members.values_mut() {
                    let kept: Vec<String> = interests(&member.merges)
                        .into_iter()
                        .filter(|n| !removed.groups.contains(n))
                        .collect();
                    set_interests(&mut member.merges, &kept);
                }
                return Ok(json!(true));
            }
        }
        Err(no_such_grouping(grouping_id))
    }

    fn list_interest_group_add(&mut self, args: &Args) -> Outcome {
        let group = args.str("group_name")?.to_string();
        let grouping_id = args.opt_u64("grouping_id")?;
        let list = self.list_mut(args.str("id")?)?;
        let grouping = grouping_mut(list, grouping_id)?;
        if grouping.groups.contains(&group) {
            return Err(Fault::new(
                codes::INVALID_INTEREST_GROUP,
                format!("Cannot add \"{group}\" because it already exists on the list"),
            ));
        }
        grouping.groups.push(group);
        Ok(json!(true))
    }

    fn list_interest_group_update(&mut self, args: &Args) -> Outcome {
        let old_name = args.str("old_name")?.to_string();
        let new_name = args.str("new_name")?.to_string();
        let grouping_id = args.opt_u64("grouping_id")?;
        let list = self.list_mut(args.str("id")?)?;
        let grouping = grouping_mut(list, grouping_id)?;
        if grouping.groups.contains(&new_name) {
            return Err(Fault::new(
                codes::INVALID_INTEREST_GROUP,
                format!("Cannot rename to \"{new_name}\" because it already exists on the list"),
            ));
        }
        let slot = grouping
            .groups
            .iter_mut()
            .find(|g| **g == old_name)
            .ok_or_else(|| no_such_group(&old_name))?;
        *slot = new_name.clone();
        for member in list.members.values_mut() {
            let renamed: Vec<String> = interests(&member.merges)
                .into_iter()
                .map(|n| if n == old_name { new_name.clone() } else { n })
                .collect();
            set_interests(&mut member.merges, &renamed);
        }
        Ok(json!(true))
    }

    fn list_interest_group_del(&mut self, args: &Args) -> Outcome {
        let group = args.str("group_name")?.to_string();
        let grouping_id = args.opt_u64("grouping_id")?;
        let list = self.list_mut(args.str("id")?)?;
        let grouping = grouping_mut(list, grouping_id)?;
        let before = grouping.groups.len();
        grouping.groups.retain(|g| *g != group);
        if grouping.groups.len() == before {
            return Err(no_such_group(&group));
        }
        for member in list.members.values_mut() {
            let kept: Vec<String> = interests(&member.merges)
                .into_iter()
                .filter(|n| *n != group)
                .collect();
            set_interests(&mut member.merges, &kept);
        }
        Ok(json!(true))
    }

    // ------------------------------------------------------------------
    // Campaigns
    // ------------------------------------------------------------------

    fn campaigns(&self, args: &Args) -> Outcome {
        let filters = args.map("filters");
        let filters = Args::new(&filters);
        let exact = filters.flag("exact", true);
        let matches_text = |wanted: Option<&str>, actual: &str| match wanted {
            None => true,
            Some(w) if exact => w == actual,
            Some(w) => actual.contains(w),
        };
        let equals = |wanted: Option<&str>, actual: &str| wanted.map_or(true, |w| w == actual);

        let data: Vec<Value> = self
            .campaigns
            .iter()
            .rev()
            .filter(|c| {
                equals(filters.opt_str("campaign_id"), &c.id)
                    && equals(filters.opt_str("list_id"), &c.list_id)
                    && equals(filters.opt_str("status"), c.status)
                    && equals(filters.opt_str("type"), &c.kind)
                    && equals(filters.opt_str("from_name"), &c.from_name)
                    && equals(filters.opt_str("from_email"), &c.from_email)
                    && matches_text(filters.opt_str("title"), &c.title)
                    && matches_text(filters.opt_str("subject"), &c.subject)
            })
            .map(campaign_json)
            .collect();
        page(data, args, 25)
    }

    fn campaign_create(&mut self, args: &Args) -> Outcome {
        let kind = args.str("type")?.to_string();
        let options = args.map("options");
        let content = args.map("content");
        let segment = args.map("segment_opts");
        let type_opts = args.map("type_opts");

        if !matches!(
            kind.as_str(),
            "regular" | "plaintext" | "absplit" | "rss" | "auto"
        ) {
            return Err(Fault::new(
                codes::CAMPAIGN_INVALID_OPTION,
                format!("\"{kind}\" is not a valid campaign type"),
            ));
        }
        let opts = Args::new(&options);
        let required = |key: &str| {
            opts.opt_str(key).map(str::to_string).ok_or_else(|| {
                Fault::new(
                    codes::CAMPAIGN_INVALID_OPTION,
                    format!("options[{key}] must be provided"),
                )
            })
        };
        let list_id = required("list_id")?;
        let subject = required("subject")?;
        let from_email = required("from_email")?;
        let from_name = required("from_name")?;
        let list = self.list(&list_id)?;
        if !segment.is_empty() {
            segment_count(list, &segment)?;
        }

        if kind == "rss" && !type_opts.contains_key("url") {
            return Err(Fault::new(
                codes::CAMPAIGN_INVALID_RSS,
                "RSS campaigns require type_opts[url]",
            ));
        }

        let content = Args::new(&content);
        let html = content.opt_str("html").unwrap_or_default().to_string();
        let mut text = content.opt_str("text").unwrap_or_default().to_string();
        if text.is_empty() && opts.flag("generate_text", false) {
            text = html_to_text(&html);
        }
        if html.is_empty() && text.is_empty() && content.opt_str("url").is_none() {
            return Err(Fault::new(
                codes::CAMPAIGN_INVALID_CONTENT,
                "Campaign content must include html, text or url",
            ));
        }

        let web_id = self.next();
        let campaign = Campaign {
            id: short_id(),
            web_id,
            list_id,
            kind,
            title: opts.opt_str("title").unwrap_or(&subject).to_string(),
            subject,
            from_name,
            from_email,
            to_name: opts.opt_str("to_name").unwrap_or_default().to_string(),
            status: "save",
            send_time: None,
            html,
            text,
            type_opts,
        };
        let id = campaign.id.clone();
        self.campaigns.push(campaign);
        Ok(json!(id))
    }

    fn campaign_content(&mut self, args: &Args) -> Outcome {
        let campaign = self.campaign_mut(args.str("cid")?)?;
        Ok(json!({"html": campaign.html, "text": campaign.text}))
    }

    fn campaign_replicate(&mut self, args: &Args) -> Outcome {
        let cid = args.str("cid")?;
        let mut copy = self.campaign_mut(cid)?.clone();
        copy.id = short_id();
        copy.web_id = self.next();
        copy.title = format!("{} (copy)", copy.title);
        copy.status = "save";
        copy.send_time = None;
        let id = copy.id.clone();
        self.campaigns.push(copy);
        Ok(json!(id))
    }

    fn campaign_update(&mut self, args: &Args) -> Outcome {
        let name = args.str("name")?.to_string();
        let value = args.map("value");
        let scalar = args.opt_str("value").map(str::to_string);
        let campaign = self.campaign_mut(args.str("cid")?)?;
        if campaign.status == "sent" || campaign.status == "sending" {
            return Err(Fault::new(
                codes::CAMPAIGN_INVALID_STATUS,
                "Sent campaigns can not be updated",
            ));
        }

        let scalar = || scalar.clone().ok_or_else(|| Fault::missing("value"));
        match name.as_str() {
            "subject" => campaign.subject = scalar()?,
            "title" => campaign.title = scalar()?,
            "from_name" => campaign.from_name = scalar()?,
            "from_email" => campaign.from_email = scalar()?,
            "to_name" => campaign.to_name = scalar()?,
            "content" => {
                let content = Args::new(&value);
                if let Some(html) = content.opt_str("html") {
                    campaign.html = html.to_string();
                }
                if let Some(text) = content.opt_str("text") {
                    campaign.text = text.to_string();
                }
            }
            other => {
                return Err(Fault::new(
                    codes::CAMPAIGN_INVALID_OPTION,
                    format!("\"{other}\" is not a campaign option that can be updated"),
                ))
            }
        }
        Ok(json!(true))
    }

    fn campaign_delete(&mut self, args: &Args) -> Outcome {
        let cid = args.str("cid")?;
        let before = self.campaigns.len();
        self.campaigns.retain(|c| c.id != cid);
        if self.campaigns.len() == before {
            return Err(no_such_campaign(cid));
        }
        Ok(json!(true))
    }

    fn campaign_schedule(&mut self, args: &Args) -> Outcome {
        let time = args.str("schedule_time")?.to_string();
        if !is_api_time(&time) {
            return Err(Fault::invalid("schedule_time"));
        }
        let campaign = self.campaign_mut(args.str("cid")?)?;
        if campaign.status != "save" || matches!(campaign.kind.as_str(), "rss" | "auto") {
            return Err(invalid_status(campaign, "schedule"));
        }
        campaign.status = "schedule";
        campaign.send_time = Some(time);
        Ok(json!(true))
    }

    /// Move a campaign between two statuses (unschedule, pause, resume).
    fn campaign_transition(&mut self, args: &Args, from: &[&str], to: &'static str) -> Outcome {
        let campaign = self.campaign_mut(args.str("cid")?)?;
        let pausable = matches!(campaign.kind.as_str(), "rss" | "auto");
        let allowed = from.contains(&campaign.status) && (to == "save" || pausable);
        if !allowed {
            return Err(invalid_status(campaign, to));
        }
        campaign.status = to;
        if to == "save" {
            campaign.send_time = None;
        }
        Ok(json!(true))
    }

    fn campaign_send_now(&mut self, args: &Args) -> Outcome {
        let campaign = self.campaign_mut(args.str("cid")?)?;
        if !matches!(campaign.status, "save" | "schedule") {
            return Err(invalid_status(campaign, "send"));
        }
        if matches!(campaign.kind.as_str(), "rss" | "auto") {
            campaign.status = "sending";
        } else {
            campaign.status = "sent";
            campaign.send_time = Some(SENT_TIME.to_string());
        }
        Ok(json!(true))
    }

    fn campaign_send_test(&mut self, args: &Args) -> Outcome {
        let emails = args.strings("test_emails");
        self.campaign_mut(args.str("cid")?)?;
        if emails.is_empty() {
            return Err(Fault::missing("test_emails"));
        }
        if let Some(bad) = emails.iter().find(|e| !valid_email(e)) {
            return Err(invalid_email(bad));
        }
        Ok(json!(true))
    }

    fn campaign_segment_test(&self, args: &Args) -> Outcome {
        let list = self.list(args.str("list_id")?)?;
        let count = segment_count(list, &args.map("options"))?;
        Ok(json!(count))
    }
}

// ----------------------------------------------------------------------
// Member helpers
// ----------------------------------------------------------------------

/// Add or update one member. Returns whether an existing member was updated.
fn subscribe_one(
    list: &mut MailList,
    email: &str,
    email_type: &str,
    incoming: &Map<String, Value>,
    double_optin: bool,
    update_existing: bool,
    replace_interests: bool,
) -> Result<bool, Fault> {
    if !valid_email(email) {
        return Err(invalid_email(email));
    }
    let existing = list.members.get(email).cloned();
    if let Some(member) = &existing {
        if matches!(member.status, "subscribed" | "pending") && !update_existing {
            return Err(Fault::new(
                codes::ALREADY_SUBSCRIBED,
                format!("{email} is already subscribed to list {}", list.name),
            ));
        }
    }

    let mut merges = existing
        .as_ref()
        .map(|m| m.merges.clone())
        .unwrap_or_default();
    apply_merges(list, &mut merges, incoming, replace_interests)?;

    let status = if double_optin && existing.is_none() {
        "pending"
    } else {
        "subscribed"
    };
    let id = existing
        .as_ref()
        .map(|m| m.id.clone())
        .unwrap_or_else(short_id);
    list.members.insert(
        email.to_string(),
        Member {
            id,
            email_type: email_type.to_string(),
            merges,
            status,
        },
    );
    Ok(existing.is_some_and(|m| m.status != "unsubscribed"))
}

fn unsubscribe_one(list: &mut MailList, email: &str, delete: bool) -> Result<(), Fault> {
    let member = list
        .members
        .get_mut(email)
        .ok_or_else(|| no_such_member(email))?;
    if member.status == "unsubscribed" && !delete {
        return Err(Fault::new(
            codes::NOT_SUBSCRIBED,
            format!("{email} is not subscribed to list {}", list.name),
        ));
    }
    if delete {
        list.members.remove(email);
    } else {
        member.status = "unsubscribed";
    }
    Ok(())
}

/// Copy known merge tags from `incoming` into `merges`, handle `INTERESTS`
/// and enforce required fields. Unknown tags are ignored.
fn apply_merges(
    list: &MailList,
    merges: &mut Map<String, Value>,
    incoming: &Map<String, Value>,
    replace_interests: bool,
) -> Result<(), Fault> {
    for (key, value) in incoming {
        let tag = key.to_uppercase();
        if tag == "INTERESTS" {
            let wanted = split_interests(value.as_str().unwrap_or_default());
            if !wanted.is_empty() && list.groupings.is_empty() {
                return Err(Fault::new(
                    codes::INVALID_INTEREST_FIELD_TYPE,
                    "This list does not have interest groups enabled",
                ));
            }
            if let Some(bad) = wanted
                .iter()
                .find(|w| !list.groupings.iter().any(|g| g.groups.contains(w)))
            {
                return Err(Fault::new(
                    codes::INVALID_INTEREST_GROUP,
                    format!("\"{bad}\" is not a valid Interest Group for the list"),
                ));
            }
            let mut next = if replace_interests {
                Vec::new()
            } else {
                interests(merges)
            };
            for w in wanted {
                if !next.contains(&w) {
                    next.push(w);
                }
            }
            set_interests(merges, &next);
        } else if tag != "EMAIL" && list.merge_vars.iter().any(|v| v.tag == tag) {
            let value = match value {
                Value::String(s) => Value::String(s.clone()),
                other => Value::String(other.to_string()),
            };
            merges.insert(tag, value);
        }
    }

    for var in list.merge_vars.iter().filter(|v| v.req && v.tag != "EMAIL") {
        let present = merges
            .get(&var.tag)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty());
        if !present {
            return Err(Fault::new(
                codes::MERGE_FIELD_REQUIRED,
                format!("{} must be provided - Please enter a value", var.tag),
            ));
        }
    }
    Ok(())
}

fn split_interests(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn interests(merges: &Map<String, Value>) -> Vec<String> {
    split_interests(
        merges
            .get("INTERESTS")
            .and_then(Value::as_str)
            .unwrap_or_default(),
    )
}

fn set_interests(merges: &mut Map<String, Value>, names: &[String]) {
    if names.is_empty() {
        merges.remove("INTERESTS");
    } else {
        merges.insert("INTERESTS".to_string(), json!(names.join(",")));
    }
}

fn grouping_mut(list: &mut MailList, grouping_id: Option<u64>) -> Result<&mut Grouping, Fault> {
    if list.groupings.is_empty() {
        return Err(Fault::new(
            codes::INVALID_INTEREST_FIELD_TYPE,
            "This list does not have interest groups enabled",
        ));
    }
    match grouping_id {
        Some(id) => list
            .groupings
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or_else(|| no_such_grouping(id)),
        None => list
            .groupings
            .first_mut()
            .ok_or_else(|| Fault::missing("grouping_id")),
    }
}

// ----------------------------------------------------------------------
// Campaign helpers
// ----------------------------------------------------------------------

fn campaign_json(c: &Campaign) -> Value {
    json!({
        "id": c.id,
        "web_id": c.web_id,
        "list_id": c.list_id,
        "type": c.kind,
        "title": c.title,
        "subject": c.subject,
        "from_name": c.from_name,
        "from_email": c.from_email,
        "to_name": c.to_name,
        "status": c.status,
        "create_time": TIMESTAMP,
        "send_time": c.send_time,
        "emails_sent": 0,
        "type_opts": c.type_opts,
    })
}

/// Count subscribed members matching `segment` (`match` + `conditions`).
fn segment_count(list: &MailList, segment: &Map<String, Value>) -> Result<usize, Fault> {
    let opts = Args::new(segment);
    let match_all = match opts.opt_str("match") {
        Some("all") => true,
        Some("any") => false,
        _ => return Err(invalid_segment("match must be \"any\" or \"all\"")),
    };
    let conditions = opts.list("conditions");
    if conditions.is_empty() {
        return Err(invalid_segment("at least one condition is required"));
    }

    let mut parsed = Vec::with_capacity(conditions.len());
    for condition in &conditions {
        let field = condition.get("field").and_then(Value::as_str);
        let op = condition.get("op").and_then(Value::as_str);
        let value = condition.get("value").and_then(Value::as_str);
        match (field, op, value) {
            (Some(f), Some(o), Some(v)) => parsed.push((f, o, v)),
            _ => return Err(invalid_segment("conditions need field, op and value")),
        }
    }

    let mut count = 0;
    for (email, member) in list.members.iter().filter(|(_, m)| m.status == "subscribed") {
        let mut results = Vec::with_capacity(parsed.len());
        for (field, op, value) in &parsed {
            let actual = match *field {
                "email" => email.as_str(),
                "date" => TIMESTAMP,
                tag => member
                    .merges
                    .get(&tag.to_uppercase())
                    .and_then(Value::as_str)
                    .unwrap_or_default(),
            };
            results.push(compare(actual, op, value)?);
        }
        let hit = if match_all {
            results.iter().all(|r| *r)
        } else {
            results.iter().any(|r| *r)
        };
        if hit {
            count += 1;
        }
    }
    Ok(count)
}

fn compare(actual: &str, op: &str, value: &str) -> Result<bool, Fault> {
    Ok(match op {
        "eq" => actual == value,
        "ne" => actual != value,
        "gt" => actual > value,
        "lt" => actual < value,
        "like" => actual.contains(value),
        "nlike" => !actual.contains(value),
        other => return Err(invalid_segment(&format!("unknown operator \"{other}\""))),
    })
}

fn html_to_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                text.push(' ');
            }
            '>' => in_tag = false,
            c if !in_tag => text.push(c),
            _ => {}
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_api_time(s: &str) -> bool {
    NaiveDateTime::parse_from_str(s, API_TIME_FORMAT).is_ok()
}

// ----------------------------------------------------------------------
// Shared
// ----------------------------------------------------------------------

fn page(data: Vec<Value>, args: &Args, default_limit: u64) -> Outcome {
    let start = args.opt_u64("start")?.unwrap_or(0);
    let limit = args.opt_u64("limit")?.unwrap_or(default_limit).max(1);
    let total = data.len();
    let data: Vec<Value> = data
        .into_iter()
        .skip(usize::try_from(start.saturating_mul(limit)).unwrap_or(usize::MAX))
        .take(usize::try_from(limit).unwrap_or(usize::MAX))
        .collect();
    Ok(json!({"total": total, "data": data}))
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..10].to_string()
}

fn valid_email(email: &str) -> bool {
    email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'))
}

fn invalid_email(email: &str) -> Fault {
    Fault::new(codes::INVALID_EMAIL, format!("Invalid Email Address: {email}"))
}

fn no_such_list(id: &str) -> Fault {
    Fault::new(
        codes::LIST_DOES_NOT_EXIST,
        format!("Invalid MailChimp List ID: {id}"),
    )
}

fn no_such_member(email: &str) -> Fault {
    Fault::new(
        codes::EMAIL_NOT_EXISTS,
        format!("There is no record of \"{email}\" in the database"),
    )
}

fn no_such_merge_var(tag: &str) -> Fault {
    Fault::new(
        codes::INVALID_MERGE_FIELD,
        format!("There is no Merge Var with the tag \"{tag}\""),
    )
}

fn no_such_grouping(id: u64) -> Fault {
    Fault::new(
        codes::INVALID_INTEREST_GROUP,
        format!("Invalid interest grouping id: {id}"),
    )
}

fn no_such_group(name: &str) -> Fault {
    Fault::new(
        codes::INVALID_INTEREST_GROUP,
        format!("\"{name}\" is not a valid Interest Group for the list"),
    )
}

fn no_such_campaign(cid: &str) -> Fault {
    Fault::new(
        codes::CAMPAIGN_DOES_NOT_EXIST,
        format!("Invalid Campaign ID: {cid}"),
    )
}

fn invalid_status(campaign: &Campaign, action: &str) -> Fault {
    Fault::new(
        codes::CAMPAIGN_INVALID_STATUS,
        format!(
            "Cannot {action} campaign {} in status \"{}\"",
            campaign.id, campaign.status
        ),
    )
}

fn invalid_segment(reason: &str) -> Fault {
    Fault::new(
        codes::CAMPAIGN_INVALID_SEGMENT,
        format!("Invalid segment: {reason}"),
    )
}
