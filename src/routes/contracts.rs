use std::time::Duration;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use diesel::{prelude::*, result::DatabaseErrorKind, PgConnection};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::templates::{is_valid_contract_type, CONTRACT_TYPES};
use crate::archive;
use crate::audit;
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{Contract, NewContract, NewNotification};
use crate::schema::{contracts, notifications};
use crate::state::AppState;

const PRESIGNED_URL_EXPIRY_SECONDS: u64 = 300;
const MAX_GUARANTEES: usize = 4;
const REFERENCE_ATTEMPTS: usize = 3;

pub const CONTRACT_STATUSES: &[&str] = &[
    "draft",
    "in_progress",
    "awaiting_signature",
    "signed",
    "validated",
    "active",
    "missing_documents",
    "under_review",
    "client_refusal",
    "rejected",
    "archived",
];

pub const GUARANTEE_TYPES: &[&str] = &["hypotheque", "caution", "nantissement", "gage", "aucune"];

const INITIAL_STATUS: &str = "in_progress";

pub fn is_valid_status(value: &str) -> bool {
    CONTRACT_STATUSES.iter().any(|allowed| *allowed == value)
}

fn is_valid_guarantee_type(value: &str) -> bool {
    GUARANTEE_TYPES.iter().any(|allowed| *allowed == value)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuaranteeInput {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hypotheque_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
}

/// A contract carries between one and four guarantee entries. A mortgage
/// entry is incomplete without its subtype and a description of the
/// secured asset.
pub fn validate_guarantees(guarantees: &[GuaranteeInput]) -> AppResult<()> {
    if guarantees.is_empty() {
        return Err(AppError::bad_request(
            "at least one guarantee entry is required",
        ));
    }
    if guarantees.len() > MAX_GUARANTEES {
        return Err(AppError::bad_request(format!(
            "at most {MAX_GUARANTEES} guarantee entries are allowed"
        )));
    }

    for entry in guarantees {
        if !is_valid_guarantee_type(&entry.kind) {
            return Err(AppError::bad_request(format!(
                "invalid guarantee type '{}'. Allowed types: {}",
                entry.kind,
                GUARANTEE_TYPES.join(", ")
            )));
        }

        if entry.kind == "hypotheque" {
            let has_subtype = entry
                .hypotheque_type
                .as_deref()
                .map(|s| !s.trim().is_empty())
                .unwrap_or(false);
            let has_details = entry
                .details
                .as_deref()
                .map(|s| !s.trim().is_empty())
                .unwrap_or(false);

            if !has_subtype || !has_details {
                return Err(AppError::bad_request(
                    "a hypotheque guarantee requires both hypotheque_type and details",
                ));
            }
        }
    }

    Ok(())
}

/// Decision references look like `DEC-20250610-4F2A` and are unique per
/// bank; the random suffix keeps collisions rare, the unique index makes
/// them impossible.
fn generate_reference(today: NaiveDate) -> String {
    let mut bytes = [0u8; 2];
    OsRng.fill_bytes(&mut bytes);
    format!("DEC-{}-{}", today.format("%Y%m%d"), hex::encode_upper(bytes))
}

#[derive(Deserialize)]
pub struct CreateContractRequest {
    pub client_name: String,
    pub contract_type: String,
    pub amount: f64,
    pub guarantee_type: String,
    pub guarantees: Vec<GuaranteeInput>,
    pub agency: String,
    pub decision_date: Option<NaiveDate>,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct ContractListQuery {
    pub status: Option<String>,
    pub contract_type: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ContractChanges {
    pub client_name: Option<String>,
    pub contract_type: Option<String>,
    pub amount: Option<f64>,
    pub guarantee_type: Option<String>,
    pub guarantees: Option<Vec<GuaranteeInput>>,
    pub decision_date: Option<NaiveDate>,
    pub signature_date: Option<NaiveDate>,
    pub agency: Option<String>,
    pub status: Option<String>,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct SetStatusRequest {
    pub status: String,
}

#[derive(Serialize)]
pub struct ContractResponse {
    pub id: Uuid,
    pub client_name: String,
    pub contract_type: String,
    pub amount: f64,
    pub guarantee_type: String,
    pub guarantees: Value,
    pub reference_decision: String,
    pub decision_date: NaiveDate,
    pub signature_date: Option<NaiveDate>,
    pub agency: String,
    pub status: String,
    pub file_key: Option<String>,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct ContractDetailResponse {
    pub contract: ContractResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
}

#[derive(Serialize)]
pub struct AttachmentDownloadResponse {
    pub url: String,
    pub expires_in: u64,
    pub file_key: String,
}

pub(crate) fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}

fn to_contract_response(contract: Contract) -> ContractResponse {
    ContractResponse {
        id: contract.id,
        client_name: contract.client_name,
        contract_type: contract.contract_type,
        amount: contract.amount,
        guarantee_type: contract.guarantee_type,
        guarantees: contract.guarantees,
        reference_decision: contract.reference_decision,
        decision_date: contract.decision_date,
        signature_date: contract.signature_date,
        agency: contract.agency,
        status: contract.status,
        file_key: contract.file_key,
        description: contract.description,
        created_by: contract.created_by,
        created_at: to_iso(contract.created_at),
        updated_at: to_iso(contract.updated_at),
    }
}

fn load_owned_contract(
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    contract_id: Uuid,
) -> AppResult<Contract> {
    let bank_id = user.require_bank()?;
    let contract: Contract = contracts::table
        .find(contract_id)
        .first(conn)
        .optional()?
        .ok_or_else(AppError::not_found)?;

    if contract.bank_id != bank_id {
        return Err(AppError::not_found());
    }

    Ok(contract)
}

fn attachment_content_disposition(file_key: &str) -> Option<String> {
    let name = file_key.rsplit('/').next().unwrap_or(file_key);
    if name.is_empty() {
        return None;
    }

    let sanitized: String = name
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            _ => ch,
        })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(&sanitized, percent_encoding::NON_ALPHANUMERIC);
    Some(format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        sanitized, encoded
    ))
}

pub async fn list_contracts(
    State(state): State<AppState>,
    Query(params): Query<ContractListQuery>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<ContractResponse>>> {
    let bank_id = user.require_bank()?;
    let mut conn = state.conn()?;

    let mut query = contracts::table
        .filter(contracts::bank_id.eq(bank_id))
        .into_boxed();

    if let Some(status) = params.status.as_deref().filter(|s| !s.is_empty()) {
        query = query.filter(contracts::status.eq(status.to_string()));
    }
    if let Some(contract_type) = params.contract_type.as_deref().filter(|s| !s.is_empty()) {
        query = query.filter(contracts::contract_type.eq(contract_type.to_string()));
    }

    let rows: Vec<Contract> = query.order(contracts::created_at.desc()).load(&mut conn)?;
    Ok(Json(rows.into_iter().map(to_contract_response).collect()))
}

pub async fn create_contract(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateContractRequest>,
) -> AppResult<(StatusCode, Json<ContractResponse>)> {
    let bank_id = user.require_bank()?;

    if payload.client_name.trim().is_empty() {
        return Err(AppError::bad_request("client_name must not be empty"));
    }
    if !is_valid_contract_type(&payload.contract_type) {
        return Err(AppError::bad_request(format!(
            "invalid contract type '{}'. Allowed types: {}",
            payload.contract_type,
            CONTRACT_TYPES.join(", ")
        )));
    }
    if !payload.amount.is_finite() || payload.amount <= 0.0 {
        return Err(AppError::bad_request("amount must be a positive number"));
    }
    if !is_valid_guarantee_type(&payload.guarantee_type) {
        return Err(AppError::bad_request(format!(
            "invalid guarantee type '{}'",
            payload.guarantee_type
        )));
    }
    if payload.agency.trim().is_empty() {
        return Err(AppError::bad_request("agency must not be empty"));
    }
    validate_guarantees(&payload.guarantees)?;

    let mut conn = state.conn()?;
    let decision_date = payload
        .decision_date
        .unwrap_or_else(|| Utc::now().date_naive());

    // The random suffix can collide within a tenant; retry with a fresh
    // one, bounded so a broken index cannot loop forever.
    let mut created: Option<Contract> = None;
    for attempt in 0..REFERENCE_ATTEMPTS {
        let new_contract = NewContract {
            id: Uuid::new_v4(),
            bank_id,
            client_name: payload.client_name.trim().to_string(),
            contract_type: payload.contract_type.clone(),
            amount: payload.amount,
            guarantee_type: payload.guarantee_type.clone(),
            guarantees: json!(payload.guarantees),
            reference_decision: generate_reference(decision_date),
            decision_date,
            signature_date: None,
            agency: payload.agency.trim().to_string(),
            status: INITIAL_STATUS.to_string(),
            description: payload
                .description
                .as_deref()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            created_by: user.user_id,
        };

        match diesel::insert_into(contracts::table)
            .values(&new_contract)
            .execute(&mut conn)
        {
            Ok(_) => {
                created = Some(contracts::table.find(new_contract.id).first(&mut conn)?);
                break;
            }
            Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                warn!(attempt, "decision reference collided, regenerating");
                continue;
            }
            Err(err) => return Err(AppError::from(err)),
        }
    }

    let contract = created.ok_or_else(|| {
        AppError::internal("failed to allocate a unique decision reference")
    })?;

    audit::record(
        &mut conn,
        &user,
        "contract.created",
        json!({
            "contract_id": contract.id,
            "reference_decision": contract.reference_decision,
            "client_name": contract.client_name,
        }),
    );

    info!(
        contract_id = %contract.id,
        reference = %contract.reference_decision,
        "contract created"
    );

    Ok((StatusCode::CREATED, Json(to_contract_response(contract))))
}

pub async fn get_contract(
    State(state): State<AppState>,
    Path(contract_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<ContractDetailResponse>> {
    let mut conn = state.conn()?;
    let contract = load_owned_contract(&mut conn, &user, contract_id)?;
    drop(conn);

    let attachment_url = match contract.file_key.as_deref() {
        Some(key) => Some(
            state
                .storage
                .download_url(key, Duration::from_secs(PRESIGNED_URL_EXPIRY_SECONDS))
                .await
                .map_err(|err| {
                    AppError::internal(format!("failed to generate attachment URL: {err}"))
                })?,
        ),
        None => None,
    };

    Ok(Json(ContractDetailResponse {
        contract: to_contract_response(contract),
        attachment_url,
    }))
}

/// Applies a partial update from the detail dialog. The request is
/// multipart: an optional `changes` JSON part and an optional `file`
/// part. A supplied file is archived and uploaded before any field is
/// written, so an upload failure leaves the row untouched. When nothing
/// differs from the stored snapshot and no file was sent, the handler
/// performs no write at all.
pub async fn update_contract(
    State(state): State<AppState>,
    Path(contract_id): Path<Uuid>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<Json<ContractDetailResponse>> {
    let mut changes = ContractChanges::default();
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("changes") => {
                let text = field.text().await.map_err(|err| {
                    AppError::bad_request(format!("invalid changes payload: {err}"))
                })?;
                changes = serde_json::from_str(&text).map_err(|err| {
                    AppError::bad_request(format!("changes must be valid JSON: {err}"))
                })?;
            }
            Some("file") => {
                file_name = field.file_name().map(|n| n.to_string());
                let data = field.bytes().await.map_err(|err| {
                    AppError::bad_request(format!("failed to read file bytes: {err}"))
                })?;
                file_bytes = Some(data.to_vec());
            }
            _ => {}
        }
    }

    if let Some(ref bytes) = file_bytes {
        if bytes.is_empty() {
            return Err(AppError::bad_request("file field must not be empty"));
        }
    }

    validate_changes(&changes)?;

    let mut conn = state.conn()?;
    let contract = load_owned_contract(&mut conn, &user, contract_id)?;
    drop(conn);

    // Archive and upload first; a failed upload must abort the save
    // before any field reaches the database.
    let new_file_key = match (file_bytes, file_name) {
        (Some(bytes), name) => {
            let original_name = name.unwrap_or_else(|| "attachment".to_string());
            let archived = archive::pack_single_entry(&original_name, &bytes)
                .map_err(|err| AppError::bad_request(format!("failed to archive file: {err}")))?;

            let key = format!(
                "contracts/{}/{}-{}.tar.gz",
                contract.id,
                Utc::now().format("%Y%m%d%H%M%S"),
                original_name.replace('/', "_"),
            );

            state
                .storage
                .store(
                    &key,
                    archived,
                    Some("application/gzip".to_string()),
                    attachment_content_disposition(&key),
                )
                .await
                .map_err(|err| {
                    error!(contract_id = %contract.id, error = %err, "attachment upload failed");
                    AppError::internal(format!("attachment upload failed: {err}"))
                })?;

            Some(key)
        }
        (None, _) => None,
    };

    let diff = build_contract_diff(&contract, &changes);

    if !diff.dirty && new_file_key.is_none() {
        // No-op save: nothing differs and no replacement file, so the
        // row is returned untouched.
        let attachment_url = match contract.file_key.as_deref() {
            Some(key) => Some(
                state
                    .storage
                    .download_url(key, Duration::from_secs(PRESIGNED_URL_EXPIRY_SECONDS))
                    .await
                    .map_err(|err| {
                        AppError::internal(format!("failed to generate attachment URL: {err}"))
                    })?,
            ),
            None => None,
        };
        return Ok(Json(ContractDetailResponse {
            contract: to_contract_response(contract),
            attachment_url,
        }));
    }

    let mut conn = state.conn()?;
    let now = Utc::now().naive_utc();
    diesel::update(contracts::table.find(contract.id))
        .set((
            diff.client_name
                .map(|v| contracts::client_name.eq(v)),
            diff.contract_type
                .map(|v| contracts::contract_type.eq(v)),
            diff.amount.map(|v| contracts::amount.eq(v)),
            diff.guarantee_type
                .map(|v| contracts::guarantee_type.eq(v)),
            diff.guarantees.map(|v| contracts::guarantees.eq(v)),
            diff.decision_date
                .map(|v| contracts::decision_date.eq(v)),
            diff.signature_date
                .map(|v| contracts::signature_date.eq(Some(v))),
            diff.agency.map(|v| contracts::agency.eq(v)),
            diff.status.map(|v| contracts::status.eq(v)),
            diff.description
                .map(|v| contracts::description.eq(Some(v))),
            new_file_key
                .as_deref()
                .map(|key| contracts::file_key.eq(Some(key.to_string()))),
            contracts::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    let updated: Contract = contracts::table.find(contract.id).first(&mut conn)?;

    audit::record(
        &mut conn,
        &user,
        "contract.updated",
        json!({
            "contract_id": updated.id,
            "file_replaced": new_file_key.is_some(),
        }),
    );
    drop(conn);

    let attachment_url = match updated.file_key.as_deref() {
        Some(key) => Some(
            state
                .storage
                .download_url(key, Duration::from_secs(PRESIGNED_URL_EXPIRY_SECONDS))
                .await
                .map_err(|err| {
                    AppError::internal(format!("failed to generate attachment URL: {err}"))
                })?,
        ),
        None => None,
    };

    Ok(Json(ContractDetailResponse {
        contract: to_contract_response(updated),
        attachment_url,
    }))
}

fn validate_changes(changes: &ContractChanges) -> AppResult<()> {
    if let Some(client_name) = changes.client_name.as_deref() {
        if client_name.trim().is_empty() {
            return Err(AppError::bad_request("client_name must not be empty"));
        }
    }
    if let Some(contract_type) = changes.contract_type.as_deref() {
        if !is_valid_contract_type(contract_type) {
            return Err(AppError::bad_request(format!(
                "invalid contract type '{contract_type}'"
            )));
        }
    }
    if let Some(amount) = changes.amount {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(AppError::bad_request("amount must be a positive number"));
        }
    }
    if let Some(guarantee_type) = changes.guarantee_type.as_deref() {
        if !is_valid_guarantee_type(guarantee_type) {
            return Err(AppError::bad_request(format!(
                "invalid guarantee type '{guarantee_type}'"
            )));
        }
    }
    if let Some(ref guarantees) = changes.guarantees {
        validate_guarantees(guarantees)?;
    }
    if let Some(agency) = changes.agency.as_deref() {
        if agency.trim().is_empty() {
            return Err(AppError::bad_request("agency must not be empty"));
        }
    }
    if let Some(status) = changes.status.as_deref() {
        if !is_valid_status(status) {
            return Err(AppError::bad_request(format!(
                "invalid status '{status}'. Allowed statuses: {}",
                CONTRACT_STATUSES.join(", ")
            )));
        }
    }

    Ok(())
}

#[derive(Default)]
struct ContractDiff {
    client_name: Option<String>,
    contract_type: Option<String>,
    amount: Option<f64>,
    guarantee_type: Option<String>,
    guarantees: Option<Value>,
    decision_date: Option<NaiveDate>,
    signature_date: Option<NaiveDate>,
    agency: Option<String>,
    status: Option<String>,
    description: Option<String>,
    dirty: bool,
}

/// Keeps only the fields whose supplied value differs from the stored
/// snapshot.
fn build_contract_diff(contract: &Contract, changes: &ContractChanges) -> ContractDiff {
    let mut diff = ContractDiff::default();

    if let Some(ref value) = changes.client_name {
        let trimmed = value.trim();
        if trimmed != contract.client_name {
            diff.client_name = Some(trimmed.to_string());
            diff.dirty = true;
        }
    }
    if let Some(ref value) = changes.contract_type {
        if *value != contract.contract_type {
            diff.contract_type = Some(value.clone());
            diff.dirty = true;
        }
    }
    if let Some(value) = changes.amount {
        if value != contract.amount {
            diff.amount = Some(value);
            diff.dirty = true;
        }
    }
    if let Some(ref value) = changes.guarantee_type {
        if *value != contract.guarantee_type {
            diff.guarantee_type = Some(value.clone());
            diff.dirty = true;
        }
    }
    if let Some(ref value) = changes.guarantees {
        let as_json = json!(value);
        if as_json != contract.guarantees {
            diff.guarantees = Some(as_json);
            diff.dirty = true;
        }
    }
    if let Some(value) = changes.decision_date {
        if value != contract.decision_date {
            diff.decision_date = Some(value);
            diff.dirty = true;
        }
    }
    if let Some(value) = changes.signature_date {
        if Some(value) != contract.signature_date {
            diff.signature_date = Some(value);
            diff.dirty = true;
        }
    }
    if let Some(ref value) = changes.agency {
        let trimmed = value.trim();
        if trimmed != contract.agency {
            diff.agency = Some(trimmed.to_string());
            diff.dirty = true;
        }
    }
    if let Some(ref value) = changes.status {
        if *value != contract.status {
            diff.status = Some(value.clone());
            diff.dirty = true;
        }
    }
    if let Some(ref value) = changes.description {
        let trimmed = value.trim();
        if Some(trimmed) != contract.description.as_deref() {
            diff.description = Some(trimmed.to_string());
            diff.dirty = true;
        }
    }

    diff
}

/// Sets any status from the closed set; there is deliberately no
/// transition table, so a validated contract may drop back to draft.
pub async fn set_status(
    State(state): State<AppState>,
    Path(contract_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<SetStatusRequest>,
) -> AppResult<Json<ContractResponse>> {
    if !is_valid_status(&payload.status) {
        return Err(AppError::bad_request(format!(
            "invalid status '{}'. Allowed statuses: {}",
            payload.status,
            CONTRACT_STATUSES.join(", ")
        )));
    }

    let mut conn = state.conn()?;
    let contract = load_owned_contract(&mut conn, &user, contract_id)?;

    let now = Utc::now().naive_utc();
    diesel::update(contracts::table.find(contract.id))
        .set((
            contracts::status.eq(&payload.status),
            contracts::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    let updated: Contract = contracts::table.find(contract.id).first(&mut conn)?;

    audit::record(
        &mut conn,
        &user,
        "contract.status_changed",
        json!({
            "contract_id": updated.id,
            "from": contract.status,
            "to": updated.status,
        }),
    );

    if updated.created_by != user.user_id {
        let notification = NewNotification {
            id: Uuid::new_v4(),
            user_id: updated.created_by,
            title: "Contract status updated".to_string(),
            message: format!(
                "Contract {} moved to status '{}'",
                updated.reference_decision, updated.status
            ),
            severity: "info".to_string(),
            contract_id: Some(updated.id),
        };
        if let Err(err) = diesel::insert_into(notifications::table)
            .values(&notification)
            .execute(&mut conn)
        {
            warn!(contract_id = %updated.id, error = %err, "failed to insert status notification");
        }
    }

    Ok(Json(to_contract_response(updated)))
}

pub async fn download_attachment(
    State(state): State<AppState>,
    Path(contract_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<AttachmentDownloadResponse>> {
    let mut conn = state.conn()?;
    let contract = load_owned_contract(&mut conn, &user, contract_id)?;
    drop(conn);

    let file_key = contract.file_key.ok_or_else(AppError::not_found)?;

    let url = state
        .storage
        .download_url(&file_key, Duration::from_secs(PRESIGNED_URL_EXPIRY_SECONDS))
        .await
        .map_err(|err| AppError::internal(format!("failed to generate download URL: {err}")))?;

    Ok(Json(AttachmentDownloadResponse {
        url,
        expires_in: PRESIGNED_URL_EXPIRY_SECONDS,
        file_key,
    }))
}

pub async fn delete_contract(
    State(state): State<AppState>,
    Path(contract_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<StatusCode> {
    let mut conn = state.conn()?;
    let contract = load_owned_contract(&mut conn, &user, contract_id)?;

    diesel::delete(contracts::table.find(contract.id)).execute(&mut conn)?;

    audit::record(
        &mut conn,
        &user,
        "contract.deleted",
        json!({
            "contract_id": contract.id,
            "reference_decision": contract.reference_decision,
        }),
    );
    drop(conn);

    // The stored archive is cleaned up opportunistically; a leftover
    // object is preferable to failing the delete.
    if let Some(key) = contract.file_key.as_deref() {
        if let Err(err) = state.storage.remove(key).await {
            warn!(contract_id = %contract.id, error = %err, "failed to delete attachment object");
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guarantee(kind: &str) -> GuaranteeInput {
        GuaranteeInput {
            kind: kind.to_string(),
            hypotheque_type: None,
            details: None,
            amount: None,
        }
    }

    #[test]
    fn rejects_empty_guarantee_list() {
        assert!(validate_guarantees(&[]).is_err());
    }

    #[test]
    fn rejects_fifth_guarantee() {
        let entries = vec![
            guarantee("caution"),
            guarantee("gage"),
            guarantee("nantissement"),
            guarantee("caution"),
            guarantee("gage"),
        ];
        assert!(validate_guarantees(&entries).is_err());
    }

    #[test]
    fn accepts_four_guarantees() {
        let entries = vec![
            guarantee("caution"),
            guarantee("gage"),
            guarantee("nantissement"),
            guarantee("aucune"),
        ];
        assert!(validate_guarantees(&entries).is_ok());
    }

    #[test]
    fn hypotheque_requires_subtype_and_details() {
        let mut entry = guarantee("hypotheque");
        assert!(validate_guarantees(std::slice::from_ref(&entry)).is_err());

        entry.hypotheque_type = Some("first_rank".to_string());
        assert!(validate_guarantees(std::slice::from_ref(&entry)).is_err());

        entry.details = Some("   ".to_string());
        assert!(validate_guarantees(std::slice::from_ref(&entry)).is_err());

        entry.details = Some("Apartment, 12 rue des Lilas".to_string());
        assert!(validate_guarantees(std::slice::from_ref(&entry)).is_ok());
    }

    #[test]
    fn rejects_unknown_guarantee_type() {
        assert!(validate_guarantees(&[guarantee("pledge")]).is_err());
    }

    #[test]
    fn reference_embeds_decision_date() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let reference = generate_reference(date);
        assert!(reference.starts_with("DEC-20250610-"));
        assert_eq!(reference.len(), "DEC-20250610-".len() + 4);
    }

    #[test]
    fn status_set_is_closed_and_covers_lifecycle() {
        assert!(CONTRACT_STATUSES.len() >= 10);
        assert!(is_valid_status("validated"));
        assert!(is_valid_status("client_refusal"));
        assert!(!is_valid_status("approved"));
    }

    #[test]
    fn no_op_changes_produce_clean_diff() {
        let contract = Contract {
            id: Uuid::new_v4(),
            bank_id: Uuid::new_v4(),
            client_name: "Acme SARL".into(),
            contract_type: "business_loan".into(),
            amount: 250_000.0,
            guarantee_type: "caution".into(),
            guarantees: json!([{ "type": "caution" }]),
            reference_decision: "DEC-20250610-AB12".into(),
            decision_date: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
            signature_date: None,
            agency: "Paris 9".into(),
            status: "in_progress".into(),
            file_key: None,
            description: None,
            created_by: Uuid::new_v4(),
            created_at: NaiveDate::from_ymd_opt(2025, 6, 10)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            updated_at: NaiveDate::from_ymd_opt(2025, 6, 10)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        };

        let changes = ContractChanges {
            client_name: Some("Acme SARL".into()),
            amount: Some(250_000.0),
            agency: Some("Paris 9".into()),
            ..Default::default()
        };

        let diff = build_contract_diff(&contract, &changes);
        assert!(!diff.dirty);

        let changes = ContractChanges {
            amount: Some(300_000.0),
            ..Default::default()
        };
        let diff = build_contract_diff(&contract, &changes);
        assert!(diff.dirty);
        assert_eq!(diff.amount, Some(300_000.0));
        assert!(diff.client_name.is_none());
    }
}
