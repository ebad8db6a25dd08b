use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use diesel::dsl::max;
use diesel::{prelude::*, result::DatabaseErrorKind, PgConnection};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::audit;
use crate::auth::{is_valid_role, AuthenticatedUser};
use crate::error::{AppError, AppResult};
use crate::models::{
    ContractTemplate, NewContractTemplate, NewTemplateField, NewWorkflowStep, TemplateField,
    WorkflowStep,
};
use crate::schema::{contract_templates, template_fields, workflow_steps};
use crate::state::AppState;

pub const CONTRACT_TYPES: &[&str] = &[
    "mortgage_loan",
    "consumer_loan",
    "auto_loan",
    "business_loan",
    "credit_line",
    "other",
];

pub const FIELD_TYPES: &[&str] = &[
    "short_text",
    "long_text",
    "number",
    "date",
    "select",
    "boolean",
];

pub fn is_valid_contract_type(value: &str) -> bool {
    CONTRACT_TYPES.iter().any(|allowed| *allowed == value)
}

fn is_valid_field_type(value: &str) -> bool {
    FIELD_TYPES.iter().any(|allowed| *allowed == value)
}

/// Splits the newline-delimited option text of a select field into an
/// ordered list, dropping blank lines.
fn parse_options(raw: &str) -> Vec<String> {
    raw.lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
        .collect()
}

#[derive(Deserialize)]
pub struct CreateTemplateRequest {
    pub name: String,
    pub contract_type: String,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateTemplateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub active: Option<bool>,
}

#[derive(Deserialize)]
pub struct FieldRequest {
    pub field_key: String,
    pub label: String,
    pub field_type: String,
    pub options_text: Option<String>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Deserialize)]
pub struct StepRequest {
    pub name: String,
    pub description: Option<String>,
    pub required_role: Option<String>,
    #[serde(default = "default_true")]
    pub required: bool,
}

const fn default_true() -> bool {
    true
}

#[derive(Serialize)]
pub struct TemplateResponse {
    pub id: Uuid,
    pub name: String,
    pub contract_type: String,
    pub description: Option<String>,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct FieldResponse {
    pub id: Uuid,
    pub field_key: String,
    pub label: String,
    pub field_type: String,
    pub options: Vec<String>,
    pub required: bool,
    pub display_order: i32,
}

#[derive(Serialize)]
pub struct StepResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub required_role: Option<String>,
    pub required: bool,
    pub step_order: i32,
}

#[derive(Serialize)]
pub struct TemplateDetailResponse {
    pub template: TemplateResponse,
    pub fields: Vec<FieldResponse>,
    pub steps: Vec<StepResponse>,
}

fn to_template_response(template: ContractTemplate) -> TemplateResponse {
    TemplateResponse {
        id: template.id,
        name: template.name,
        contract_type: template.contract_type,
        description: template.description,
        active: template.active,
        created_at: super::contracts::to_iso(template.created_at),
        updated_at: super::contracts::to_iso(template.updated_at),
    }
}

fn to_field_response(field: TemplateField) -> FieldResponse {
    let options = field
        .options
        .as_array()
        .map(|values| {
            values
                .iter()
                .filter_map(|value| value.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    FieldResponse {
        id: field.id,
        field_key: field.field_key,
        label: field.label,
        field_type: field.field_type,
        options,
        required: field.required,
        display_order: field.display_order,
    }
}

fn to_step_response(step: WorkflowStep) -> StepResponse {
    StepResponse {
        id: step.id,
        name: step.name,
        description: step.description,
        required_role: step.required_role,
        required: step.required,
        step_order: step.step_order,
    }
}

/// Loads a template and verifies it belongs to the caller's bank. A
/// template of another tenant is indistinguishable from a missing one.
fn load_owned_template(
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    template_id: Uuid,
) -> AppResult<ContractTemplate> {
    let bank_id = user.require_bank()?;
    let template: ContractTemplate = contract_templates::table
        .find(template_id)
        .first(conn)
        .optional()?
        .ok_or_else(AppError::not_found)?;

    if template.bank_id != bank_id {
        return Err(AppError::not_found());
    }

    Ok(template)
}

fn validate_field_request(payload: &FieldRequest) -> AppResult<serde_json::Value> {
    if payload.field_key.trim().is_empty() {
        return Err(AppError::bad_request("field_key must not be empty"));
    }
    if payload.label.trim().is_empty() {
        return Err(AppError::bad_request("label must not be empty"));
    }
    if !is_valid_field_type(&payload.field_type) {
        return Err(AppError::bad_request(format!(
            "invalid field type '{}'. Allowed types: {}",
            payload.field_type,
            FIELD_TYPES.join(", ")
        )));
    }

    let options = payload
        .options_text
        .as_deref()
        .map(parse_options)
        .unwrap_or_default();

    if payload.field_type == "select" {
        if options.is_empty() {
            return Err(AppError::bad_request(
                "select fields need at least one option",
            ));
        }
    } else if !options.is_empty() {
        return Err(AppError::bad_request(
            "options are only valid for select fields",
        ));
    }

    Ok(json!(options))
}

fn validate_step_request(payload: &StepRequest) -> AppResult<()> {
    if payload.name.trim().is_empty() {
        return Err(AppError::bad_request("step name must not be empty"));
    }

    if let Some(role) = payload.required_role.as_deref() {
        if !is_valid_role(role) {
            return Err(AppError::bad_request(format!(
                "invalid required role '{role}'"
            )));
        }
    }

    Ok(())
}

pub async fn list_templates(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<TemplateResponse>>> {
    let bank_id = user.require_bank()?;
    let mut conn = state.conn()?;

    let rows: Vec<ContractTemplate> = contract_templates::table
        .filter(contract_templates::bank_id.eq(bank_id))
        .order(contract_templates::created_at.desc())
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(to_template_response).collect()))
}

pub async fn create_template(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateTemplateRequest>,
) -> AppResult<(StatusCode, Json<TemplateResponse>)> {
    let bank_id = user.require_bank()?;

    if payload.name.trim().is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    if !is_valid_contract_type(&payload.contract_type) {
        return Err(AppError::bad_request(format!(
            "invalid contract type '{}'. Allowed types: {}",
            payload.contract_type,
            CONTRACT_TYPES.join(", ")
        )));
    }

    let mut conn = state.conn()?;
    let new_template = NewContractTemplate {
        id: Uuid::new_v4(),
        bank_id,
        name: payload.name.trim().to_string(),
        contract_type: payload.contract_type,
        description: payload
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty()),
    };

    diesel::insert_into(contract_templates::table)
        .values(&new_template)
        .execute(&mut conn)?;

    let template: ContractTemplate = contract_templates::table
        .find(new_template.id)
        .first(&mut conn)?;

    audit::record(
        &mut conn,
        &user,
        "template.created",
        json!({ "template_id": template.id, "name": template.name }),
    );

    Ok((StatusCode::CREATED, Json(to_template_response(template))))
}

pub async fn get_template(
    State(state): State<AppState>,
    Path(template_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<TemplateDetailResponse>> {
    let mut conn = state.conn()?;
    let template = load_owned_template(&mut conn, &user, template_id)?;

    // Deletions leave gaps in the order sequence; ties on order are
    // broken by id for a stable rendering sequence.
    let fields: Vec<TemplateField> = template_fields::table
        .filter(template_fields::template_id.eq(template.id))
        .order((
            template_fields::display_order.asc(),
            template_fields::id.asc(),
        ))
        .load(&mut conn)?;

    let steps: Vec<WorkflowStep> = workflow_steps::table
        .filter(workflow_steps::template_id.eq(template.id))
        .order((workflow_steps::step_order.asc(), workflow_steps::id.asc()))
        .load(&mut conn)?;

    Ok(Json(TemplateDetailResponse {
        template: to_template_response(template),
        fields: fields.into_iter().map(to_field_response).collect(),
        steps: steps.into_iter().map(to_step_response).collect(),
    }))
}

pub async fn update_template(
    State(state): State<AppState>,
    Path(template_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<UpdateTemplateRequest>,
) -> AppResult<Json<TemplateResponse>> {
    let mut conn = state.conn()?;
    let template = load_owned_template(&mut conn, &user, template_id)?;

    let new_name = match payload.name {
        Some(ref name) => {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                return Err(AppError::bad_request("name must not be empty"));
            }
            Some(trimmed.to_string())
        }
        None => None,
    };

    let now = chrono::Utc::now().naive_utc();
    diesel::update(contract_templates::table.find(template.id))
        .set((
            new_name
                .as_deref()
                .map(|name| contract_templates::name.eq(name.to_string())),
            payload
                .description
                .as_deref()
                .map(|d| contract_templates::description.eq(Some(d.trim().to_string()))),
            payload.active.map(|a| contract_templates::active.eq(a)),
            contract_templates::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    let updated: ContractTemplate = contract_templates::table.find(template.id).first(&mut conn)?;

    audit::record(
        &mut conn,
        &user,
        "template.updated",
        json!({ "template_id": updated.id }),
    );

    Ok(Json(to_template_response(updated)))
}

pub async fn delete_template(
    State(state): State<AppState>,
    Path(template_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<StatusCode> {
    let mut conn = state.conn()?;
    let template = load_owned_template(&mut conn, &user, template_id)?;

    // Fields and steps go with the template through the FK cascade.
    diesel::delete(contract_templates::table.find(template.id)).execute(&mut conn)?;

    audit::record(
        &mut conn,
        &user,
        "template.deleted",
        json!({ "template_id": template.id, "name": template.name }),
    );

    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_field(
    State(state): State<AppState>,
    Path(template_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<FieldRequest>,
) -> AppResult<(StatusCode, Json<FieldResponse>)> {
    let options = validate_field_request(&payload)?;

    let mut conn = state.conn()?;
    let template = load_owned_template(&mut conn, &user, template_id)?;

    // Append-at-end allocation: one past the current maximum, never
    // reusing a value freed by deletion.
    let current_max: Option<i32> = template_fields::table
        .filter(template_fields::template_id.eq(template.id))
        .select(max(template_fields::display_order))
        .first(&mut conn)?;

    let new_field = NewTemplateField {
        id: Uuid::new_v4(),
        template_id: template.id,
        field_key: payload.field_key.trim().to_string(),
        label: payload.label.trim().to_string(),
        field_type: payload.field_type,
        options,
        required: payload.required,
        display_order: current_max.unwrap_or(0) + 1,
    };

    match diesel::insert_into(template_fields::table)
        .values(&new_field)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(AppError::bad_request(
                "field key already exists for this template",
            ));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let field: TemplateField = template_fields::table.find(new_field.id).first(&mut conn)?;

    audit::record(
        &mut conn,
        &user,
        "template.field_added",
        json!({ "template_id": template.id, "field_key": field.field_key }),
    );

    Ok((StatusCode::CREATED, Json(to_field_response(field))))
}

pub async fn update_field(
    State(state): State<AppState>,
    Path((template_id, field_id)): Path<(Uuid, Uuid)>,
    user: AuthenticatedUser,
    Json(payload): Json<FieldRequest>,
) -> AppResult<Json<FieldResponse>> {
    let options = validate_field_request(&payload)?;

    let mut conn = state.conn()?;
    let template = load_owned_template(&mut conn, &user, template_id)?;

    let existing: TemplateField = template_fields::table
        .find(field_id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(AppError::not_found)?;
    if existing.template_id != template.id {
        return Err(AppError::not_found());
    }

    // display_order is deliberately left untouched by edits.
    let update_result = diesel::update(template_fields::table.find(field_id))
        .set((
            template_fields::field_key.eq(payload.field_key.trim().to_string()),
            template_fields::label.eq(payload.label.trim().to_string()),
            template_fields::field_type.eq(&payload.field_type),
            template_fields::options.eq(&options),
            template_fields::required.eq(payload.required),
        ))
        .execute(&mut conn);

    match update_result {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(AppError::bad_request(
                "field key already exists for this template",
            ));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let field: TemplateField = template_fields::table.find(field_id).first(&mut conn)?;

    audit::record(
        &mut conn,
        &user,
        "template.field_updated",
        json!({ "template_id": template.id, "field_id": field_id }),
    );

    Ok(Json(to_field_response(field)))
}

pub async fn delete_field(
    State(state): State<AppState>,
    Path((template_id, field_id)): Path<(Uuid, Uuid)>,
    user: AuthenticatedUser,
) -> AppResult<StatusCode> {
    let mut conn = state.conn()?;
    let template = load_owned_template(&mut conn, &user, template_id)?;

    // Siblings keep their order values; the sequence may become
    // non-contiguous.
    let deleted = diesel::delete(
        template_fields::table
            .find(field_id)
            .filter(template_fields::template_id.eq(template.id)),
    )
    .execute(&mut conn)?;

    if deleted == 0 {
        return Err(AppError::not_found());
    }

    audit::record(
        &mut conn,
        &user,
        "template.field_deleted",
        json!({ "template_id": template.id, "field_id": field_id }),
    );

    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_step(
    State(state): State<AppState>,
    Path(template_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<StepRequest>,
) -> AppResult<(StatusCode, Json<StepResponse>)> {
    validate_step_request(&payload)?;

    let mut conn = state.conn()?;
    let template = load_owned_template(&mut conn, &user, template_id)?;

    let current_max: Option<i32> = workflow_steps::table
        .filter(workflow_steps::template_id.eq(template.id))
        .select(max(workflow_steps::step_order))
        .first(&mut conn)?;

    let new_step = NewWorkflowStep {
        id: Uuid::new_v4(),
        template_id: template.id,
        name: payload.name.trim().to_string(),
        description: payload
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty()),
        required_role: payload.required_role,
        required: payload.required,
        step_order: current_max.unwrap_or(0) + 1,
    };

    diesel::insert_into(workflow_steps::table)
        .values(&new_step)
        .execute(&mut conn)?;

    let step: WorkflowStep = workflow_steps::table.find(new_step.id).first(&mut conn)?;

    audit::record(
        &mut conn,
        &user,
        "template.step_added",
        json!({ "template_id": template.id, "step_name": step.name }),
    );

    Ok((StatusCode::CREATED, Json(to_step_response(step))))
}

pub async fn update_step(
    State(state): State<AppState>,
    Path((template_id, step_id)): Path<(Uuid, Uuid)>,
    user: AuthenticatedUser,
    Json(payload): Json<StepRequest>,
) -> AppResult<Json<StepResponse>> {
    validate_step_request(&payload)?;

    let mut conn = state.conn()?;
    let template = load_owned_template(&mut conn, &user, template_id)?;

    let existing: WorkflowStep = workflow_steps::table
        .find(step_id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(AppError::not_found)?;
    if existing.template_id != template.id {
        return Err(AppError::not_found());
    }

    diesel::update(workflow_steps::table.find(step_id))
        .set((
            workflow_steps::name.eq(payload.name.trim().to_string()),
            workflow_steps::description.eq(payload
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())),
            workflow_steps::required_role.eq(payload.required_role),
            workflow_steps::required.eq(payload.required),
        ))
        .execute(&mut conn)?;

    let step: WorkflowStep = workflow_steps::table.find(step_id).first(&mut conn)?;

    audit::record(
        &mut conn,
        &user,
        "template.step_updated",
        json!({ "template_id": template.id, "step_id": step_id }),
    );

    Ok(Json(to_step_response(step)))
}

pub async fn delete_step(
    State(state): State<AppState>,
    Path((template_id, step_id)): Path<(Uuid, Uuid)>,
    user: AuthenticatedUser,
) -> AppResult<StatusCode> {
    let mut conn = state.conn()?;
    let template = load_owned_template(&mut conn, &user, template_id)?;

    let deleted = diesel::delete(
        workflow_steps::table
            .find(step_id)
            .filter(workflow_steps::template_id.eq(template.id)),
    )
    .execute(&mut conn)?;

    if deleted == 0 {
        return Err(AppError::not_found());
    }

    audit::record(
        &mut conn,
        &user,
        "template.step_deleted",
        json!({ "template_id": template.id, "step_id": step_id }),
    );

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_newline_delimited_options_in_order() {
        let options = parse_options("Fixed rate\nVariable rate\n\n  Mixed  \n");
        assert_eq!(options, vec!["Fixed rate", "Variable rate", "Mixed"]);
    }

    #[test]
    fn select_field_requires_options() {
        let payload = FieldRequest {
            field_key: "rate_kind".into(),
            label: "Rate kind".into(),
            field_type: "select".into(),
            options_text: None,
            required: true,
        };
        assert!(validate_field_request(&payload).is_err());
    }

    #[test]
    fn non_select_field_rejects_options() {
        let payload = FieldRequest {
            field_key: "amount".into(),
            label: "Amount".into(),
            field_type: "number".into(),
            options_text: Some("1\n2".into()),
            required: false,
        };
        assert!(validate_field_request(&payload).is_err());
    }

    #[test]
    fn unknown_field_type_is_rejected() {
        let payload = FieldRequest {
            field_key: "x".into(),
            label: "X".into(),
            field_type: "dropdown".into(),
            options_text: None,
            required: false,
        };
        assert!(validate_field_request(&payload).is_err());
    }

    #[test]
    fn step_role_must_be_in_role_set() {
        let payload = StepRequest {
            name: "Risk review".into(),
            description: None,
            required_role: Some("auditor".into()),
            required: true,
        };
        assert!(validate_step_request(&payload).is_err());
    }
}
