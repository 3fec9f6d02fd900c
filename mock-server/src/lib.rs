//! A local stand-in for the Mailchimp 1.3 endpoint.
//!
//! Accepts the same form-encoded POSTs as the real service at `/1.3/` and
//! answers from an in-memory store, so the client can be exercised end to
//! end without network access or an account.

pub mod form;
pub mod store;

use std::sync::Arc;

use axum::{extract::State, routing::post, Form, Json, Router};
use log::{debug, info};
use serde_json::Value;
use tokio::{net::TcpListener, sync::RwLock};

use crate::form::{unflatten, Args};
use crate::store::{codes, Fault, Store};

pub use store::{DEFAULT_LIST_ID, DEFAULT_LIST_NAME, PING_REPLY};

/// Key accepted by [`app`].
pub const DEFAULT_API_KEY: &str = "0123456789abcdef0123456789abcdef-us1";

pub type Db = Arc<RwLock<Store>>;

#[derive(Clone)]
struct AppState {
    api_key: Arc<str>,
    db: Db,
}

pub fn app() -> Router {
    app_with_key(DEFAULT_API_KEY)
}

/// Router accepting only `api_key`, backed by a freshly seeded store.
pub fn app_with_key(api_key: &str) -> Router {
    let state = AppState {
        api_key: Arc::from(api_key),
        db: Arc::new(RwLock::new(Store::seeded())),
    };
    Router::new()
        .route("/1.3/", post(dispatch))
        .route("/1.3", post(dispatch))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!("mock endpoint at http://{addr}/1.3/");
    }
    axum::serve(listener, app()).await
}

async fn dispatch(
    State(state): State<AppState>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Json<Value> {
    let params = unflatten(&fields);
    let args = Args::new(&params);

    let outcome = match (args.str("method"), args.opt_str("apikey")) {
        (Err(fault), _) => Err(fault),
        (Ok(_), key) if key != Some(&*state.api_key) => Err(Fault::new(
            codes::INVALID_API_KEY,
            format!("Invalid Mailchimp API Key: {}", key.unwrap_or_default()),
        )),
        (Ok(method), _) => state.db.write().await.handle(method, &args),
    };

    match outcome {
        Ok(value) => Json(value),
        Err(fault) => {
            debug!("fault {}: {}", fault.code, fault.message);
            Json(fault.to_json())
        }
    }
}
