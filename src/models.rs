use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = banks)]
pub struct Bank {
    pub id: Uuid,
    pub name: String,
    pub display_name: Option<String>,
    pub logo_url: Option<String>,
    pub primary_color: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = banks)]
pub struct NewBank {
    pub id: Uuid,
    pub name: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = users)]
#[diesel(belongs_to(Bank, foreign_key = bank_id))]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role: String,
    pub bank_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role: String,
    pub bank_id: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = refresh_tokens)]
#[diesel(belongs_to(User))]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub revoked_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = contract_templates)]
#[diesel(belongs_to(Bank, foreign_key = bank_id))]
pub struct ContractTemplate {
    pub id: Uuid,
    pub bank_id: Uuid,
    pub name: String,
    pub contract_type: String,
    pub description: Option<String>,
    pub active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = contract_templates)]
pub struct NewContractTemplate {
    pub id: Uuid,
    pub bank_id: Uuid,
    pub name: String,
    pub contract_type: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = template_fields)]
#[diesel(belongs_to(ContractTemplate, foreign_key = template_id))]
pub struct TemplateField {
    pub id: Uuid,
    pub template_id: Uuid,
    pub field_key: String,
    pub label: String,
    pub field_type: String,
    pub options: serde_json::Value,
    pub required: bool,
    pub display_order: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = template_fields)]
pub struct NewTemplateField {
    pub id: Uuid,
    pub template_id: Uuid,
    pub field_key: String,
    pub label: String,
    pub field_type: String,
    pub options: serde_json::Value,
    pub required: bool,
    pub display_order: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = workflow_steps)]
#[diesel(belongs_to(ContractTemplate, foreign_key = template_id))]
pub struct WorkflowStep {
    pub id: Uuid,
    pub template_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub required_role: Option<String>,
    pub required: bool,
    pub step_order: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = workflow_steps)]
pub struct NewWorkflowStep {
    pub id: Uuid,
    pub template_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub required_role: Option<String>,
    pub required: bool,
    pub step_order: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = contracts)]
#[diesel(belongs_to(Bank, foreign_key = bank_id))]
pub struct Contract {
    pub id: Uuid,
    pub bank_id: Uuid,
    pub client_name: String,
    pub contract_type: String,
    pub amount: f64,
    pub guarantee_type: String,
    pub guarantees: serde_json::Value,
    pub reference_decision: String,
    pub decision_date: NaiveDate,
    pub signature_date: Option<NaiveDate>,
    pub agency: String,
    pub status: String,
    pub file_key: Option<String>,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = contracts)]
pub struct NewContract {
    pub id: Uuid,
    pub bank_id: Uuid,
    pub client_name: String,
    pub contract_type: String,
    pub amount: f64,
    pub guarantee_type: String,
    pub guarantees: serde_json::Value,
    pub reference_decision: String,
    pub decision_date: NaiveDate,
    pub signature_date: Option<NaiveDate>,
    pub agency: String,
    pub status: String,
    pub description: Option<String>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = audit_logs)]
pub struct AuditLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub user_email: Option<String>,
    pub bank_id: Option<Uuid>,
    pub action: String,
    pub details: serde_json::Value,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = audit_logs)]
pub struct NewAuditLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub user_email: Option<String>,
    pub bank_id: Option<Uuid>,
    pub action: String,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = notifications)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub severity: String,
    pub read: bool,
    pub contract_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub severity: String,
    pub contract_id: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = prompt_templates)]
pub struct PromptTemplate {
    pub id: Uuid,
    pub category: String,
    pub system_prompt: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = prompt_templates)]
pub struct NewPromptTemplate {
    pub id: Uuid,
    pub category: String,
    pub system_prompt: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = ai_generations)]
pub struct AiGeneration {
    pub id: Uuid,
    pub contract_id: Option<Uuid>,
    pub generation_type: String,
    pub category: String,
    pub parameters: serde_json::Value,
    pub generated_content: String,
    pub quality_score: f64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = ai_generations)]
pub struct NewAiGeneration {
    pub id: Uuid,
    pub contract_id: Option<Uuid>,
    pub generation_type: String,
    pub category: String,
    pub parameters: serde_json::Value,
    pub generated_content: String,
    pub quality_score: f64,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = ai_extractions)]
pub struct AiExtraction {
    pub id: Uuid,
    pub contract_id: Option<Uuid>,
    pub extraction_type: String,
    pub extracted_data: serde_json::Value,
    pub confidence_score: f64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = ai_extractions)]
pub struct NewAiExtraction {
    pub id: Uuid,
    pub contract_id: Option<Uuid>,
    pub extraction_type: String,
    pub extracted_data: serde_json::Value,
    pub confidence_score: f64,
}
