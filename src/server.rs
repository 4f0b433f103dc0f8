// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! REST API for the ledger.
//!
//! ## Endpoints
//!
//! - `POST /v1/accounts` - Create an account
//! - `GET /v1/accounts` - List all accounts
//! - `GET /v1/accounts/{id}` - Get an account by id
//! - `POST /v1/accounts/transferMoney` - Transfer funds between two accounts
//!
//! ## Example Usage
//!
//! ```bash
//! curl -X POST http://localhost:3000/v1/accounts \
//!   -H "Content-Type: application/json" \
//!   -d '{"accountId": "Id-101", "balance": "525.45"}'
//!
//! curl -X POST http://localhost:3000/v1/accounts/transferMoney \
//!   -H "Content-Type: application/json" \
//!   -d '{"accountFromId": "Id-101", "accountToId": "Id-102", "amount": "125.45"}'
//!
//! curl http://localhost:3000/v1/accounts/Id-101
//! ```

use crate::{
    Account, AccountId, AccountSnapshot, Ledger, LedgerError, TransferReceipt, TransferRequest,
};
use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

// === Request/Response DTOs ===

/// Request body for creating accounts.
///
/// The balance may be a JSON string or a JSON number. Numbers are read from
/// their literal digits, never through `f64`.
///
/// ```json
/// {"accountId": "Id-123", "balance": 1000}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    pub account_id: AccountId,
    #[serde(deserialize_with = "rust_decimal::serde::arbitrary_precision::deserialize")]
    pub balance: Decimal,
}

/// Response body for errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the ledger.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
}

// === Error Handling ===

/// Everything a handler can fail with, mapped onto HTTP responses.
#[derive(Debug)]
pub enum AppError {
    Ledger(LedgerError),
    Validation(String),
    NotFound(AccountId),
    Body(JsonRejection),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        AppError::Ledger(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Body(rejection)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Ledger(err) => {
                let (status, code) = ledger_status(&err);
                (status, code, err.to_string())
            }
            AppError::Validation(message) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message)
            }
            AppError::NotFound(id) => (
                StatusCode::NOT_FOUND,
                "ACCOUNT_NOT_FOUND",
                format!("{id} account does not exist"),
            ),
            AppError::Body(rejection) => {
                (StatusCode::BAD_REQUEST, "MALFORMED_BODY", rejection.body_text())
            }
        };

        if status.is_server_error() {
            error!(%status, code, error = %message, "request failed");
        }

        (
            status,
            Json(ErrorResponse {
                error: message,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

fn ledger_status(err: &LedgerError) -> (StatusCode, &'static str) {
    match err {
        LedgerError::DuplicateAccount(_) => (StatusCode::BAD_REQUEST, "DUPLICATE_ACCOUNT"),
        LedgerError::InvalidAccount(_) => (StatusCode::BAD_REQUEST, "INVALID_ACCOUNT"),
        LedgerError::InvalidAmount(_) => (StatusCode::BAD_REQUEST, "INVALID_AMOUNT"),
        LedgerError::InsufficientFunds(_) => (StatusCode::BAD_REQUEST, "INSUFFICIENT_FUNDS"),
        LedgerError::NegativeBalance(_) => (StatusCode::BAD_REQUEST, "NEGATIVE_BALANCE"),
        LedgerError::PrecisionLoss(_) => (StatusCode::BAD_REQUEST, "PRECISION_LOSS"),
        LedgerError::BalanceOverflow(_) => (StatusCode::INTERNAL_SERVER_ERROR, "BALANCE_OVERFLOW"),
        LedgerError::LockTimeout(_) => (StatusCode::SERVICE_UNAVAILABLE, "LOCK_TIMEOUT"),
    }
}

// === Handlers ===

/// POST /v1/accounts - Create a new account.
async fn create_account(
    State(state): State<AppState>,
    payload: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let Json(request) = payload?;
    if request.account_id.is_empty() {
        return Err(AppError::Validation("accountId must not be empty".to_string()));
    }
    if request.balance < Decimal::ZERO {
        return Err(AppError::Validation("balance must not be negative".to_string()));
    }

    state
        .ledger
        .create_account(Account::new(request.account_id, request.balance)?)?;
    Ok(StatusCode::CREATED)
}

/// GET /v1/accounts/{id} - Get account by id.
async fn get_account(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AccountSnapshot>, AppError> {
    state
        .ledger
        .get_account(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(AccountId::new(id)))
}

/// GET /v1/accounts - List all accounts.
async fn list_accounts(State(state): State<AppState>) -> Json<Vec<AccountSnapshot>> {
    Json(state.ledger.accounts())
}

/// POST /v1/accounts/transferMoney - Transfer funds.
async fn transfer_money(
    State(state): State<AppState>,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TransferReceipt>), AppError> {
    let Json(request) = payload?;
    if request.account_from_id.is_empty() || request.account_to_id.is_empty() {
        return Err(AppError::Validation(
            "accountFromId and accountToId must not be empty".to_string(),
        ));
    }

    let receipt = state.ledger.transfer(&request)?;
    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

// === Router ===

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/accounts", post(create_account).get(list_accounts))
        .route("/v1/accounts/transferMoney", post(transfer_money))
        .route("/v1/accounts/{id}", get(get_account))
        .with_state(state)
}

/// Serves the API on `listener` until the process is stopped.
pub async fn serve(listener: TcpListener, ledger: Arc<Ledger>) -> std::io::Result<()> {
    let app = create_router(AppState { ledger });
    info!(address = %listener.local_addr()?, "ledger API listening");
    axum::serve(listener, app).await
}
