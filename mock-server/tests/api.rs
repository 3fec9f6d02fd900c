use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, app_with_key, DEFAULT_API_KEY, DEFAULT_LIST_ID, PING_REPLY};
use serde_json::Value;
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn form_request(body: &str) -> Request<String> {
    Request::builder()
        .method("POST")
        .uri("/1.3/")
        .header(
            http::header::CONTENT_TYPE,
            "application/x-www-form-urlencoded",
        )
        .body(body.to_string())
        .unwrap()
}

fn call(method: &str, rest: &str) -> Request<String> {
    let mut body = format!("method={method}&apikey={DEFAULT_API_KEY}&output=json");
    if !rest.is_empty() {
        body.push('&');
        body.push_str(rest);
    }
    form_request(&body)
}

// --- basics ---

#[tokio::test]
async fn ping_answers_chimpy() {
    let resp = app().oneshot(call("ping", "")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, Value::from(PING_REPLY));
}

#[tokio::test]
async fn wrong_key_is_reported_in_band() {
    let resp = app_with_key("other-us1")
        .oneshot(call("ping", ""))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["code"], 104);
    assert!(json["error"].as_str().unwrap().contains("API Key"));
}

#[tokio::test]
async fn unknown_method_is_reported_in_band() {
    let resp = app().oneshot(call("listFrobnicate", "")).await.unwrap();

    let json = body_json(resp).await;
    assert_eq!(json["code"], -32601);
}

#[tokio::test]
async fn missing_method_is_reported_in_band() {
    let resp = app()
        .oneshot(form_request(&format!("apikey={DEFAULT_API_KEY}")))
        .await
        .unwrap();

    let json = body_json(resp).await;
    assert_eq!(json["code"], -32602);
}

#[tokio::test]
async fn get_is_not_routed() {
    let resp = app()
        .oneshot(Request::builder().uri("/1.3/").body(String::new()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn lists_include_seeded_list() {
    let resp = app().oneshot(call("lists", "")).await.unwrap();

    let json = body_json(resp).await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["data"][0]["id"], DEFAULT_LIST_ID);
    assert_eq!(json["data"][0]["name"], "unittests");
}

#[tokio::test]
async fn unknown_list_is_an_error() {
    let resp = app()
        .oneshot(call("listMembers", "id=nosuchlist"))
        .await
        .unwrap();

    let json = body_json(resp).await;
    assert_eq!(json["code"], 200);
}

// --- subscriber lifecycle ---

#[tokio::test]
async fn subscribe_lifecycle() {
    use tower::Service;

    let mut app = app().into_service();

    let subscribe = format!(
        "id={DEFAULT_LIST_ID}&email_address=unit%40example.com\
         &merge_vars%5BFIRST%5D=unit&merge_vars%5BLAST%5D=tests&double_optin=false"
    );
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(call("listSubscribe", &subscribe))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await, Value::Bool(true));

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(call("listMembers", &format!("id={DEFAULT_LIST_ID}")))
        .await
        .unwrap();
    let members = body_json(resp).await;
    assert_eq!(members["total"], 1);
    assert_eq!(members["data"][0]["email"], "unit@example.com");

    let info = format!(
        "id={DEFAULT_LIST_ID}&email_address%5B0%5D=unit%40example.com\
         &email_address%5B1%5D=nosuch%40example.com"
    );
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(call("listMemberInfo", &info))
        .await
        .unwrap();
    let info = body_json(resp).await;
    assert_eq!(info["success"], 1);
    assert_eq!(info["errors"], 1);
    assert_eq!(info["data"][0]["merges"]["FIRST"], "unit");
    assert_eq!(info["data"][1]["code"], 232);

    let unsubscribe = format!(
        "id={DEFAULT_LIST_ID}&email_address=unit%40example.com&delete_member=true"
    );
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(call("listUnsubscribe", &unsubscribe))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await, Value::Bool(true));

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(call("listMembers", &format!("id={DEFAULT_LIST_ID}")))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["total"], 0);
}

#[tokio::test]
async fn batch_subscribe_reports_bad_rows() {
    let batch = format!(
        "id={DEFAULT_LIST_ID}&double_optin=false\
         &batch%5B0%5D%5BEMAIL%5D=a%40example.com\
         &batch%5B1%5D%5BEMAIL%5D=not-an-address"
    );
    let resp = app()
        .oneshot(call("listBatchSubscribe", &batch))
        .await
        .unwrap();

    let json = body_json(resp).await;
    assert_eq!(json["add_count"], 1);
    assert_eq!(json["error_count"], 1);
    assert_eq!(json["errors"][0]["code"], 502);
    assert_eq!(json["errors"][0]["row"], 1);
}
