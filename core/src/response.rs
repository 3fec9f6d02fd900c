//! Response validation and error translation.
//!
//! Every action's response passes through `validate` right after the round
//! trip, so all `Connection` operations share one error policy:
//!
//! 1. A non-2xx status is a transport failure, unless its body is an API
//!    error object, in which case the remote error wins.
//! 2. A JSON object carrying an `error` key becomes `ChimpError::Api` with the
//!    remote `code` and message copied verbatim.
//! 3. Anything else is returned unchanged for the action to decode.

use log::debug;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ApiError, ChimpError, ErrorCode, Result, TransportError};
use crate::http::HttpResponse;

pub const ERROR_KEY: &str = "error";
pub const CODE_KEY: &str = "code";

/// Classify a transported response as success or failure.
pub fn validate(method: &str, response: HttpResponse) -> Result<Value> {
    let success = (200..300).contains(&response.status);

    let value: Value = match serde_json::from_str(&response.body) {
        Ok(value) => value,
        Err(source) if success => {
            return Err(ChimpError::Decode {
                method: method.to_string(),
                source,
            })
        }
        Err(_) => {
            return Err(TransportError::Status {
                status: response.status,
                body: response.body,
            }
            .into())
        }
    };

    if let Some(err) = api_error(&value) {
        debug!("{method} rejected by API: {err}");
        return Err(err.into());
    }

    if !success {
        return Err(TransportError::Status {
            status: response.status,
            body: response.body,
        }
        .into());
    }

    Ok(value)
}

/// Extract the remote error from a mapping that carries an error marker.
///
/// Also used on in-band per-item entries (batch errors, member lookups).
pub fn api_error(value: &Value) -> Option<ApiError> {
    let map = value.as_object()?;
    let error = map.get(ERROR_KEY)?;
    let message = match error {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let code = map.get(CODE_KEY).and_then(ErrorCode::from_json);
    Some(ApiError { code, message })
}

/// Decode a validated value into the action's result type.
pub fn decode<R: DeserializeOwned>(method: &str, value: Value) -> Result<R> {
    serde_json::from_value(value).map_err(|source| ChimpError::Decode {
        method: method.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok(body: &str) -> HttpResponse {
        HttpResponse {
            status: 200,
            body: body.to_string(),
        }
    }

    #[test]
    fn scalar_success_passes_through() {
        let value = validate("ping", ok(r#""Everything's Chimpy!""#)).unwrap();
        assert_eq!(value, json!("Everything's Chimpy!"));
    }

    #[test]
    fn boolean_success_passes_through() {
        assert_eq!(validate("listSubscribe", ok("true")).unwrap(), json!(true));
    }

    #[test]
    fn error_object_becomes_api_error() {
        let err = validate(
            "listMemberInfo",
            ok(r#"{"error":"The email address \"x@y.com\" does not belong to this list","code":232}"#),
        )
        .unwrap_err();
        let api = err.as_api().unwrap();
        assert_eq!(api.code, Some(ErrorCode::from(232)));
        assert_eq!(
            api.message,
            "The email address \"x@y.com\" does not belong to this list"
        );
    }

    #[test]
    fn oversized_code_is_kept_verbatim() {
        let err = validate("ping", ok(r#"{"error":"boom","code":18446744073709551615}"#)).unwrap_err();
        let code = err.as_api().unwrap().code.clone().unwrap();
        assert_eq!(code.to_string(), "18446744073709551615");
    }

    #[test]
    fn error_object_without_code() {
        let err = validate("ping", ok(r#"{"error":"bad"}"#)).unwrap_err();
        assert_eq!(err.as_api().unwrap().code, None);
    }

    #[test]
    fn mapping_without_error_key_is_success() {
        let value = validate("lists", ok(r#"{"total":0,"data":[]}"#)).unwrap();
        assert_eq!(value["total"], 0);
    }

    #[test]
    fn error_key_inside_sequence_is_not_translated() {
        let value = validate("x", ok(r#"[{"error":"in-band"}]"#)).unwrap();
        assert!(value.is_array());
    }

    #[test]
    fn non_2xx_with_error_body_is_api_error() {
        let response = HttpResponse {
            status: 500,
            body: r#"{"error":"Invalid Mailchimp API Key","code":104}"#.to_string(),
        };
        let err = validate("ping", response).unwrap_err();
        assert_eq!(err.as_api().unwrap().code, Some(ErrorCode::from(104)));
    }

    #[test]
    fn non_2xx_without_error_body_is_transport_error() {
        let response = HttpResponse {
            status: 503,
            body: "<html>maintenance</html>".to_string(),
        };
        let err = validate("ping", response).unwrap_err();
        assert!(matches!(
            err,
            ChimpError::Transport(TransportError::Status { status: 503, .. })
        ));
    }

    #[test]
    fn non_2xx_with_json_success_shape_is_transport_error() {
        let response = HttpResponse {
            status: 404,
            body: r#"{"data":[]}"#.to_string(),
        };
        let err = validate("lists", response).unwrap_err();
        assert!(matches!(err, ChimpError::Transport(_)));
    }

    #[test]
    fn invalid_json_on_success_is_decode_error() {
        let err = validate("ping", ok("not json")).unwrap_err();
        assert!(matches!(err, ChimpError::Decode { ref method, .. } if method == "ping"));
    }

    #[test]
    fn decode_reports_shape_mismatch() {
        let err = decode::<bool>("listSubscribe", json!("yes")).unwrap_err();
        assert!(matches!(err, ChimpError::Decode { .. }));
    }
}
