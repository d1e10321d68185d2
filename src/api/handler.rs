use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use super::models::*;
use crate::{
    error::{AppError, AppResult},
    ledger::models::{Network, TransactionId},
    reconcile::{Notices, ProposalDraft, RefreshReport, TransactionBoard, View, ViewPartition},
};

#[derive(Clone)]
pub struct AppState {
    pub board: Arc<TransactionBoard>,
    pub network: Network,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    let snapshot = state.board.snapshot();
    let partition = ViewPartition::of(&snapshot);
    let degraded = state.board.notices().batch_error.is_some();

    Ok(Json(HealthResponse {
        status: if degraded {
            "degraded".to_string()
        } else {
            "healthy".to_string()
        },
        timestamp: Utc::now(),
        last_fetch: snapshot.fetched_at(),
        transactions: snapshot.len(),
        pending: partition.pending.len(),
        ready: partition.ready.len(),
    }))
}

/// GET /transactions - history view
pub async fn list_history(State(state): State<AppState>) -> AppResult<Json<Vec<HistoryRow>>> {
    let snapshot = state.board.snapshot();
    let rows = View::History
        .select(&snapshot)
        .into_iter()
        .map(HistoryRow::from_transaction)
        .collect();
    Ok(Json(rows))
}

/// GET /transactions/pending - pending-approval view
pub async fn list_pending(State(state): State<AppState>) -> AppResult<Json<Vec<PendingRow>>> {
    let snapshot = state.board.snapshot();
    let identity = state.board.identity();
    let phases = state.board.approval_phases();

    let rows = View::PendingApproval
        .select(&snapshot)
        .into_iter()
        .map(|tx| PendingRow::from_transaction(tx, identity.as_ref(), phases.get(&tx.id).copied()))
        .collect();
    Ok(Json(rows))
}

/// GET /transactions/ready - ready-to-execute view
pub async fn list_ready(State(state): State<AppState>) -> AppResult<Json<Vec<ReadyRow>>> {
    let snapshot = state.board.snapshot();
    let rows = View::ReadyToExecute
        .select(&snapshot)
        .into_iter()
        .map(|tx| ReadyRow::from_transaction(tx, state.board.is_executing(tx.id)))
        .collect();
    Ok(Json(rows))
}

/// POST /transactions/refresh - manual refresh / retry
pub async fn refresh_transactions(State(state): State<AppState>) -> AppResult<Json<RefreshReport>> {
    info!("🔄 Manual refresh requested");
    let report = state.board.refresh().await;

    if report.is_unavailable() {
        return Err(AppError::BatchUnavailable {
            failed: report.failed,
        });
    }
    Ok(Json(report))
}

/// POST /transactions/propose
pub async fn propose_transaction(
    State(state): State<AppState>,
    Json(draft): Json<ProposalDraft>,
) -> AppResult<Json<SubmissionResponse>> {
    let txid = state.board.propose(&draft).await?;
    let id = TransactionId::parse_input(&draft.id)?;

    Ok(Json(SubmissionResponse {
        id,
        txid,
        message: state.board.notices().success,
    }))
}

/// POST /transactions/:id/approve
pub async fn approve_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<SubmissionResponse>> {
    let id = TransactionId::parse_input(&id)?;
    let txid = state.board.approve(id).await?;

    Ok(Json(SubmissionResponse {
        id,
        txid,
        message: state.board.notices().success,
    }))
}

/// POST /transactions/:id/execute
pub async fn execute_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<SubmissionResponse>> {
    let id = TransactionId::parse_input(&id)?;
    let txid = state.board.execute(id).await?;

    Ok(Json(SubmissionResponse {
        id,
        txid,
        message: state.board.notices().success,
    }))
}

/// GET /board - current notices
pub async fn get_board(State(state): State<AppState>) -> AppResult<Json<Notices>> {
    Ok(Json(state.board.notices()))
}

fn session(state: &AppState) -> SessionResponse {
    let identity = state.board.identity();
    SessionResponse {
        signed_in: identity.is_some(),
        identity,
        network: state.network,
    }
}

/// GET /session
pub async fn get_session(State(state): State<AppState>) -> AppResult<Json<SessionResponse>> {
    Ok(Json(session(&state)))
}

/// POST /session - connect a wallet address
pub async fn sign_in(
    State(state): State<AppState>,
    Json(request): Json<SignInRequest>,
) -> AppResult<Json<SessionResponse>> {
    state.board.sign_in(&request.address)?;
    Ok(Json(session(&state)))
}

/// DELETE /session
pub async fn sign_out(State(state): State<AppState>) -> AppResult<Json<SessionResponse>> {
    state.board.sign_out();
    Ok(Json(session(&state)))
}

/// POST /clipboard
pub async fn copy_to_clipboard(
    State(state): State<AppState>,
    Json(request): Json<ClipboardRequest>,
) -> AppResult<Json<ClipboardResponse>> {
    let copied = state.board.copy_address(&request.text).await;
    Ok(Json(ClipboardResponse { copied }))
}
