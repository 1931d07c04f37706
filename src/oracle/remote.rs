// A padding oracle served over HTTP, and a client that lets the attack query
// it as if it were local.
//
// The server answers `GET /padding?ciphertext=<hex>` with 200 if the
// ciphertext decrypts to a conforming block, and 422 if it does not. This is
// the shape of the real-world leak: an error page or status code that differs
// between "bad padding" and everything else.

use super::{PaddingOracle, Pkcs1PaddingOracle};
use crate::{i2osp, Error, PublicKey, Result};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use log::{error, warn};
use num_bigint::BigUint;
use tokio::net::{TcpListener, ToSocketAddrs};

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
};

/// Failed queries in a row after which the server is treated as gone.
const MAX_CONSECUTIVE_FAILURES: u32 = 5;

pub fn padding_oracle_router(oracle: Pkcs1PaddingOracle) -> Router {
    Router::new()
        .route("/padding", get(handle_padding_query))
        .with_state(Arc::new(oracle))
}

/// Bind `address` and serve the oracle in a background task, returning the
/// base URL it is reachable at.
pub async fn spawn_padding_oracle_server(
    address: impl ToSocketAddrs,
    oracle: Pkcs1PaddingOracle,
) -> std::io::Result<String> {
    let listener = TcpListener::bind(address).await?;
    let addr = listener.local_addr()?;
    let app = padding_oracle_router(oracle);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("padding oracle server stopped: {e}");
        }
    });
    Ok(format!("http://{}", addr))
}

async fn handle_padding_query(
    State(oracle): State<Arc<Pkcs1PaddingOracle>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let ciphertext = match params.get("ciphertext") {
        Some(c) => match hex::decode(c) {
            Ok(bytes) => BigUint::from_bytes_be(&bytes),
            Err(e) => {
                return (StatusCode::BAD_REQUEST, format!("Illegal ciphertext: {}", e))
                    .into_response()
            }
        },
        None => {
            return (StatusCode::BAD_REQUEST, "Missing 'ciphertext' parameter").into_response()
        }
    };

    let valid = tokio::task::spawn_blocking(move || oracle.is_valid_padding(&ciphertext)).await;
    match valid {
        Ok(true) => (StatusCode::OK, "Padding is valid").into_response(),
        Ok(false) => (StatusCode::UNPROCESSABLE_ENTITY, "Invalid padding").into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Queries a padding oracle server.
///
/// A failed query (no connection, or a status other than 200 and 422) is
/// logged and answered as invalid padding. After `MAX_CONSECUTIVE_FAILURES`
/// of them in a row `check_available` reports the server as unavailable.
#[derive(Debug)]
pub struct RemotePaddingOracle {
    client: reqwest::blocking::Client,
    address: String,
    byte_len: usize,
    consecutive_failures: AtomicU32,
    last_failure: Mutex<String>,
}

impl RemotePaddingOracle {
    pub fn new(address: &str, public: &PublicKey) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            address: address.trim_end_matches('/').to_string(),
            byte_len: public.byte_len(),
            consecutive_failures: AtomicU32::new(0),
            last_failure: Mutex::new(String::new()),
        }
    }

    /// Failed queries since the last one the server answered.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    fn record_failure(&self, reason: String) {
        warn!("remote padding oracle query failed: {reason}");
        if let Ok(mut last) = self.last_failure.lock() {
            *last = reason;
        }
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
    }
}

impl PaddingOracle for RemotePaddingOracle {
    fn is_valid_padding(&self, ciphertext: &BigUint) -> bool {
        let bytes = match i2osp(ciphertext, self.byte_len) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("not sending ciphertext to remote oracle: {e}");
                return false;
            }
        };
        let uri = format!("{}/padding?ciphertext={}", self.address, hex::encode(bytes));
        let status = match self.client.get(uri).send() {
            Ok(response) => response.status(),
            Err(e) => {
                self.record_failure(e.to_string());
                return false;
            }
        };
        let valid = status == reqwest::StatusCode::OK;
        if valid || status == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            self.consecutive_failures.store(0, Ordering::Relaxed);
            valid
        } else {
            self.record_failure(format!("unexpected status {status}"));
            false
        }
    }

    fn check_available(&self) -> Result<()> {
        let failures = self.consecutive_failures();
        if failures < MAX_CONSECUTIVE_FAILURES {
            return Ok(());
        }
        let reason = self
            .last_failure
            .lock()
            .map(|last| last.clone())
            .unwrap_or_default();
        Err(Error::OracleUnavailable { failures, reason })
    }
}
