use std::collections::{HashMap, VecDeque};
use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use covenant::ai::{CompletionClient, CompletionError, CompletionRequest};
use covenant::auth::jwt::JwtService;
use covenant::auth::password;
use covenant::config::AppConfig;
use covenant::db::{self, PgPool};
use covenant::models::{NewBank, NewPromptTemplate, NewUser};
use covenant::routes;
use covenant::state::AppState;
use covenant::storage::ObjectStorage;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::Serialize;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[allow(dead_code)]
#[derive(Clone)]
pub struct StoredObject {
    pub key: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
}

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, StoredObject>>,
    fail_uploads: std::sync::atomic::AtomicBool,
}

impl FakeStorage {
    #[allow(dead_code)]
    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        let guard = self.objects.lock().await;
        guard.get(key).cloned()
    }

    #[allow(dead_code)]
    pub async fn object_count(&self) -> usize {
        let guard = self.objects.lock().await;
        guard.len()
    }

    #[allow(dead_code)]
    pub async fn keys(&self) -> Vec<String> {
        let guard = self.objects.lock().await;
        guard.keys().cloned().collect()
    }

    #[allow(dead_code)]
    pub fn fail_next_uploads(&self, fail: bool) {
        self.fail_uploads
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn store(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
        content_disposition: Option<String>,
    ) -> Result<()> {
        if self.fail_uploads.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(anyhow!("simulated upload failure"));
        }

        let stored = StoredObject {
            key: key.to_string(),
            bytes,
            content_type,
            content_disposition,
        };
        let mut guard = self.objects.lock().await;
        guard.insert(stored.key.clone(), stored);
        Ok(())
    }

    async fn download_url(&self, key: &str, expires_in: Duration) -> Result<String> {
        let guard = self.objects.lock().await;
        ensure!(guard.contains_key(key), "no stored object under {key}");
        Ok(format!(
            "https://storage.test/{key}?ttl={}",
            expires_in.as_secs()
        ))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut guard = self.objects.lock().await;
        guard.remove(key);
        Ok(())
    }
}

/// Scripted stand-in for the completion API. Tests queue responses; the
/// client also records every request for assertions on forwarded prompts.
#[derive(Default)]
pub struct FakeCompletion {
    responses: Mutex<VecDeque<Result<String, (u16, String)>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl FakeCompletion {
    #[allow(dead_code)]
    pub async fn push_answer(&self, answer: &str) {
        let mut guard = self.responses.lock().await;
        guard.push_back(Ok(answer.to_string()));
    }

    #[allow(dead_code)]
    pub async fn push_failure(&self, status: u16, body: &str) {
        let mut guard = self.responses.lock().await;
        guard.push_back(Err((status, body.to_string())));
    }

    #[allow(dead_code)]
    pub async fn requests(&self) -> Vec<CompletionRequest> {
        let guard = self.requests.lock().await;
        guard.clone()
    }
}

#[async_trait]
impl CompletionClient for FakeCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        {
            let mut guard = self.requests.lock().await;
            guard.push(request);
        }

        let mut guard = self.responses.lock().await;
        match guard.pop_front() {
            Some(Ok(answer)) => Ok(answer),
            Some(Err((status, body))) => Err(CompletionError::Upstream { status, body }),
            None => Err(CompletionError::MissingContent),
        }
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    storage: Arc<FakeStorage>,
    completions: Arc<FakeCompletion>,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            refresh_token_expiry_days: 30,
            refresh_cookie_secure: false,
            refresh_cookie_domain: None,
            cors_allowed_origin: None,
            aws_endpoint_url: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_region: "us-east-1".to_string(),
            s3_bucket: "test-bucket".to_string(),
            completion_endpoint: "http://completion.invalid/v1".to_string(),
            completion_api_key: "test-key".to_string(),
            completion_model: "test-model".to_string(),
        };

        let pool = db::build_pool(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let storage = Arc::new(FakeStorage::default());
        let storage_for_state: Arc<dyn ObjectStorage> = storage.clone();
        let completions = Arc::new(FakeCompletion::default());
        let completions_for_state: Arc<dyn CompletionClient> = completions.clone();
        let jwt = JwtService::from_config(&config)?;
        let state = AppState {
            pool: pool.clone(),
            config: Arc::new(config),
            storage: storage_for_state,
            completions: completions_for_state,
            jwt,
        };
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            storage,
            completions,
        })
    }

    pub async fn cleanup(&self) -> Result<()> {
        self.run_db(truncate_all).await
    }

    #[allow(dead_code)]
    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone()
    }

    #[allow(dead_code)]
    pub fn completions(&self) -> Arc<FakeCompletion> {
        self.completions.clone()
    }

    pub async fn insert_bank(&self, name: &str) -> Result<Uuid> {
        let name = name.to_string();
        self.run_db(move |conn| {
            let bank = NewBank {
                id: Uuid::new_v4(),
                name,
                display_name: None,
            };
            diesel::insert_into(covenant::schema::banks::table)
                .values(&bank)
                .execute(conn)
                .context("failed to insert bank")?;
            Ok(bank.id)
        })
        .await
    }

    pub async fn insert_user(
        &self,
        email: &str,
        password: &str,
        role: &str,
        bank_id: Option<Uuid>,
    ) -> Result<Uuid> {
        let email = email.to_string();
        let password = password.to_string();
        let role = role.to_string();
        self.run_db(move |conn| {
            let password_hash = password::hash_password(&password)?;
            let user = NewUser {
                id: Uuid::new_v4(),
                email,
                password_hash,
                full_name: "Test User".to_string(),
                role,
                bank_id,
            };
            diesel::insert_into(covenant::schema::users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;
            Ok(user.id)
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn insert_prompt_template(&self, category: &str, system_prompt: &str) -> Result<()> {
        let category = category.to_string();
        let system_prompt = system_prompt.to_string();
        self.run_db(move |conn| {
            let template = NewPromptTemplate {
                id: Uuid::new_v4(),
                category,
                system_prompt,
            };
            diesel::insert_into(covenant::schema::prompt_templates::table)
                .values(&template)
                .execute(conn)
                .context("failed to insert prompt template")?;
            Ok(())
        })
        .await
    }

    pub async fn login_token(&self, email: &str, password: &str) -> Result<String> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            email: &'a str,
            password: &'a str,
        }

        let response = self
            .post_json("/api/auth/login", &LoginPayload { email, password }, None)
            .await?;

        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        let body = body_to_vec(response.into_body()).await?;
        #[derive(serde::Deserialize)]
        struct LoginResponse {
            access_token: String,
        }
        let parsed: LoginResponse = serde_json::from_slice(&body)?;
        Ok(parsed.access_token)
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload, token).await
    }

    #[allow(dead_code)]
    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PATCH, path, payload, token).await
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let builder = Request::builder().method(Method::DELETE).uri(path);
        let builder = if let Some(token) = token {
            builder.header("authorization", format!("Bearer {token}"))
        } else {
            builder
        };
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    /// PATCHes a contract as the detail dialog does: multipart with an
    /// optional `changes` JSON part and an optional `file` part.
    #[allow(dead_code)]
    pub async fn patch_contract_multipart(
        &self,
        path: &str,
        changes: Option<&serde_json::Value>,
        file: Option<(&str, &str, &[u8])>,
        token: &str,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();

        if let Some(changes) = changes {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(b"Content-Disposition: form-data; name=\"changes\"\r\n");
            body.extend(b"Content-Type: application/json\r\n\r\n");
            body.extend(serde_json::to_vec(changes)?);
            body.extend(b"\r\n");
        }

        if let Some((filename, content_type, data)) = file {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(
                format!(
                    "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                    filename
                )
                .as_bytes(),
            );
            body.extend(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
            body.extend(data);
            body.extend(b"\r\n");
        }

        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::PATCH)
            .uri(path)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header("authorization", format!("Bearer {token}"))
            .body(Body::from(body))?;

        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    /// Runs a blocking diesel closure on a pooled connection.
    async fn run_db<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("could not check out a test connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("database task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("could not read the response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

/// Applies pending migrations and starts from empty tables.
async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("could not check out a test connection: {err}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("migrations failed: {err}"))?;
        truncate_all(&mut conn)
    })
    .await
    .context("database task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE ai_extractions, ai_generations, prompt_templates, notifications, \
         audit_logs, contracts, workflow_steps, template_fields, contract_templates, \
         refresh_tokens, users, banks RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
