use axum::{extract::State, Json};
use diesel::{prelude::*, result::DatabaseErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::ai::{ChatMessage, CompletionRequest};
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{NewAiExtraction, NewAiGeneration, PromptTemplate};
use crate::schema::{ai_extractions, ai_generations, prompt_templates};
use crate::state::AppState;

const CHAT_MAX_TOKENS: u32 = 1000;
const CHAT_TEMPERATURE: f32 = 0.7;
const GENERATION_MAX_TOKENS: u32 = 2000;
const GENERATION_TEMPERATURE: f32 = 0.7;
const EXTRACTION_MAX_TOKENS: u32 = 1500;
const EXTRACTION_TEMPERATURE: f32 = 0.2;

/// Every persisted generation carries the same nominal quality score; the
/// value is not computed from the content.
const GENERATION_QUALITY_SCORE: f64 = 0.85;

const BASE_CONFIDENCE: f64 = 0.5;
const PER_FIELD_CONFIDENCE: f64 = 0.1;
const RAW_FALLBACK_CONFIDENCE: f64 = 0.1;

pub const GENERATION_TYPES: &[&str] = &["draft", "improvement", "analysis", "summary"];
pub const EXTRACTION_TYPES: &[&str] = &["dates", "penalties", "payments", "parties", "terms"];

const CHAT_SYSTEM_PROMPT: &str = "You are a contract-management assistant for bank staff. \
    Answer questions about contracts, guarantees, approval workflows and document handling. \
    Be concise and factual; say so when you do not know.";

const DEFAULT_GENERATION_SYSTEM_PROMPT: &str = "You are a legal drafting assistant specialised \
    in banking contracts. Produce clear, professionally structured French banking contract \
    prose. Never invent monetary figures that were not provided.";

#[derive(Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub answer: String,
}

#[derive(Deserialize)]
pub struct GenerateRequest {
    pub generation_type: String,
    pub category: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    pub contract_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub generated_content: String,
    pub generation_type: String,
    pub template_used: bool,
}

#[derive(Deserialize)]
pub struct ExtractRequest {
    #[serde(rename = "contractText")]
    pub contract_text: String,
    #[serde(rename = "extractionType")]
    pub extraction_type: String,
    #[serde(rename = "contractId")]
    pub contract_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct ExtractResponse {
    pub success: bool,
    pub extracted_data: Value,
    pub confidence_score: f64,
    pub extraction_type: String,
}

pub async fn chat(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Json(payload): Json<ChatRequest>,
) -> AppResult<Json<ChatResponse>> {
    if payload.messages.is_empty() {
        return Err(AppError::bad_request("messages must not be empty"));
    }
    for message in &payload.messages {
        if !matches!(message.role.as_str(), "user" | "assistant") {
            return Err(AppError::bad_request(format!(
                "invalid message role '{}'",
                message.role
            )));
        }
    }

    // The conversation is forwarded verbatim behind one fixed system
    // prompt; no retry on failure, the error goes straight back.
    let mut messages = Vec::with_capacity(payload.messages.len() + 1);
    messages.push(ChatMessage {
        role: "system".to_string(),
        content: CHAT_SYSTEM_PROMPT.to_string(),
    });
    messages.extend(payload.messages);

    let answer = state
        .completions
        .complete(CompletionRequest {
            messages,
            max_tokens: CHAT_MAX_TOKENS,
            temperature: CHAT_TEMPERATURE,
        })
        .await?;

    Ok(Json(ChatResponse { answer }))
}

pub async fn generate(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Json(payload): Json<GenerateRequest>,
) -> AppResult<Json<GenerateResponse>> {
    if !GENERATION_TYPES.contains(&payload.generation_type.as_str()) {
        return Err(AppError::bad_request(format!(
            "invalid generation type '{}'. Allowed types: {}",
            payload.generation_type,
            GENERATION_TYPES.join(", ")
        )));
    }
    if payload.category.trim().is_empty() {
        return Err(AppError::bad_request("category must not be empty"));
    }
    validate_generation_parameters(&payload.generation_type, &payload.parameters)?;

    let mut conn = state.conn()?;
    let stored_template: Option<PromptTemplate> = prompt_templates::table
        .filter(prompt_templates::category.eq(&payload.category))
        .first(&mut conn)
        .optional()?;
    drop(conn);

    let template_used = stored_template.is_some();
    let system_prompt = stored_template
        .map(|template| template.system_prompt)
        .unwrap_or_else(|| DEFAULT_GENERATION_SYSTEM_PROMPT.to_string());

    let user_prompt = build_generation_prompt(
        &payload.generation_type,
        &payload.category,
        &payload.parameters,
    );

    let generated_content = state
        .completions
        .complete(CompletionRequest {
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt,
                },
            ],
            max_tokens: GENERATION_MAX_TOKENS,
            temperature: GENERATION_TEMPERATURE,
        })
        .await?;

    let mut conn = state.conn()?;
    let record = NewAiGeneration {
        id: Uuid::new_v4(),
        contract_id: payload.contract_id,
        generation_type: payload.generation_type.clone(),
        category: payload.category.clone(),
        parameters: Value::Object(payload.parameters),
        generated_content: generated_content.clone(),
        quality_score: GENERATION_QUALITY_SCORE,
    };

    match diesel::insert_into(ai_generations::table)
        .values(&record)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _)) => {
            return Err(AppError::bad_request("unknown contract_id"));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    info!(
        generation_type = %payload.generation_type,
        category = %payload.category,
        template_used,
        "contract generation stored"
    );

    Ok(Json(GenerateResponse {
        success: true,
        generated_content,
        generation_type: payload.generation_type,
        template_used,
    }))
}

pub async fn extract(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Json(payload): Json<ExtractRequest>,
) -> AppResult<Json<ExtractResponse>> {
    if payload.contract_text.trim().is_empty() {
        return Err(AppError::bad_request("contractText must not be empty"));
    }
    if !EXTRACTION_TYPES.contains(&payload.extraction_type.as_str()) {
        return Err(AppError::bad_request(format!(
            "invalid extraction type '{}'. Allowed types: {}",
            payload.extraction_type,
            EXTRACTION_TYPES.join(", ")
        )));
    }

    let instruction = extraction_instruction(&payload.extraction_type);
    let completion = state
        .completions
        .complete(CompletionRequest {
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: instruction.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: payload.contract_text.clone(),
                },
            ],
            max_tokens: EXTRACTION_MAX_TOKENS,
            temperature: EXTRACTION_TEMPERATURE,
        })
        .await?;

    // A completion that is not valid JSON degrades to a raw-text wrapper
    // instead of failing the request.
    let (extracted_data, confidence_score) = match serde_json::from_str::<Value>(&completion) {
        Ok(parsed) => {
            let confidence = confidence_score(&payload.extraction_type, &parsed);
            (parsed, confidence)
        }
        Err(err) => {
            warn!(
                extraction_type = %payload.extraction_type,
                error = %err,
                "completion was not valid JSON, wrapping raw text"
            );
            (
                json!({ "raw_extraction": completion }),
                RAW_FALLBACK_CONFIDENCE,
            )
        }
    };

    if let Some(contract_id) = payload.contract_id {
        let mut conn = state.conn()?;
        let record = NewAiExtraction {
            id: Uuid::new_v4(),
            contract_id: Some(contract_id),
            extraction_type: payload.extraction_type.clone(),
            extracted_data: extracted_data.clone(),
            confidence_score,
        };

        match diesel::insert_into(ai_extractions::table)
            .values(&record)
            .execute(&mut conn)
        {
            Ok(_) => {}
            Err(diesel::result::Error::DatabaseError(
                DatabaseErrorKind::ForeignKeyViolation,
                _,
            )) => {
                return Err(AppError::bad_request("unknown contractId"));
            }
            Err(err) => return Err(AppError::from(err)),
        }
    }

    Ok(Json(ExtractResponse {
        success: true,
        extracted_data,
        confidence_score,
        extraction_type: payload.extraction_type,
    }))
}

/// The client form validates these too; re-checking here keeps a direct
/// API caller from persisting half-specified generations.
fn validate_generation_parameters(
    generation_type: &str,
    parameters: &Map<String, Value>,
) -> AppResult<()> {
    let required: &[&str] = match generation_type {
        "draft" => &["client_name", "contract_type"],
        "improvement" => &["existing_content"],
        "analysis" | "summary" => &["contract_text"],
        _ => &[],
    };

    for key in required {
        let present = parameters
            .get(*key)
            .map(value_is_populated)
            .unwrap_or(false);
        if !present {
            return Err(AppError::bad_request(format!(
                "parameter '{key}' is required for {generation_type} generation"
            )));
        }
    }

    Ok(())
}

fn build_generation_prompt(
    generation_type: &str,
    category: &str,
    parameters: &Map<String, Value>,
) -> String {
    let rendered_parameters = render_parameters(parameters);

    match generation_type {
        "draft" => format!(
            "Draft a complete {category} banking contract using these parameters:\n\
             {rendered_parameters}\n\
             Include the standard clauses for this contract category, a guarantees \
             section and a signature block."
        ),
        "improvement" => format!(
            "Improve the following {category} contract. Tighten the wording, fix \
             inconsistencies and flag missing standard clauses.\n\n\
             {rendered_parameters}"
        ),
        "analysis" => format!(
            "Analyse the following {category} contract. List obligations of each \
             party, unusual clauses and risks for the bank.\n\n\
             {rendered_parameters}"
        ),
        _ => format!(
            "Summarise the following {category} contract in a short paragraph \
             followed by bullet points of the key commitments.\n\n\
             {rendered_parameters}"
        ),
    }
}

fn render_parameters(parameters: &Map<String, Value>) -> String {
    parameters
        .iter()
        .map(|(key, value)| match value {
            Value::String(s) => format!("- {key}: {s}"),
            other => format!("- {key}: {other}"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn extraction_instruction(extraction_type: &str) -> &'static str {
    match extraction_type {
        "dates" => {
            "Extract every date from the contract. Respond with only a JSON object \
             with keys: start_date, end_date, signature_date, renewal_date (ISO 8601 \
             strings, null when absent) and other_dates (array)."
        }
        "penalties" => {
            "Extract the penalty clauses from the contract. Respond with only a JSON \
             object with keys: penalty_amount, penalty_conditions, late_payment_penalty, \
             early_termination_penalty (null when absent)."
        }
        "payments" => {
            "Extract the payment terms from the contract. Respond with only a JSON \
             object with keys: payment_amount, payment_schedule, payment_method, \
             currency (null when absent)."
        }
        "parties" => {
            "Extract the contracting parties. Respond with only a JSON object with \
             keys: parties (array of {name, role}), lender, borrower (null when \
             absent)."
        }
        _ => {
            "Extract the key terms of the contract. Respond with only a JSON object \
             with keys: duration, renewal_terms, termination_conditions, \
             governing_law (null when absent)."
        }
    }
}

fn value_is_populated(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Heuristic confidence: a base score, a fixed increment per populated
/// top-level field, and a category bonus when the fields that matter most
/// for that category came back filled. Capped at 1.0.
fn confidence_score(extraction_type: &str, data: &Value) -> f64 {
    let Some(map) = data.as_object() else {
        return BASE_CONFIDENCE;
    };

    let populated = map.values().filter(|value| value_is_populated(value)).count();
    let mut score = BASE_CONFIDENCE + PER_FIELD_CONFIDENCE * populated as f64;

    score += match extraction_type {
        "dates" => {
            if field_populated(map, "start_date") && field_populated(map, "end_date") {
                0.2
            } else {
                0.0
            }
        }
        "payments" => {
            if field_populated(map, "payment_amount") && field_populated(map, "payment_schedule") {
                0.2
            } else {
                0.0
            }
        }
        "parties" => {
            let party_count = map
                .get("parties")
                .and_then(|value| value.as_array())
                .map(|items| items.len())
                .unwrap_or(0);
            if party_count >= 2 {
                0.2
            } else {
                0.0
            }
        }
        "penalties" => {
            if field_populated(map, "penalty_amount") {
                0.15
            } else {
                0.0
            }
        }
        _ => {
            if field_populated(map, "duration") {
                0.1
            } else {
                0.0
            }
        }
    };

    score.min(1.0)
}

fn field_populated(map: &Map<String, Value>, key: &str) -> bool {
    map.get(key).map(value_is_populated).unwrap_or(false)
}
