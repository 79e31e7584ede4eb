use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header, request::Parts},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;

use crate::session::{Session, SessionStore};
use recipebox_core::models::{NewRecipe, Recipe, SearchPage, ValidationError};
use recipebox_core::service::CatalogService;

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB

#[derive(Clone)]
struct AppState {
    catalog: Arc<Mutex<CatalogService>>,
    sessions: Arc<Mutex<SessionStore>>,
}

impl AppState {
    fn new(catalog: CatalogService, session_ttl: chrono::Duration) -> Self {
        Self {
            catalog: Arc::new(Mutex::new(catalog)),
            sessions: Arc::new(Mutex::new(SessionStore::new(session_ttl))),
        }
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct SearchParams {
    query: Option<String>,
    page: Option<String>,
}

#[derive(Deserialize)]
struct Credentials {
    name: String,
    password: String,
}

#[derive(Serialize)]
struct SessionResponse {
    token: String,
    user_id: i64,
    name: String,
}

#[derive(Serialize)]
struct CurrentUserResponse {
    user_id: i64,
    name: String,
    expires_at: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::Internal(err) => {
                tracing::error!("internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(invalid) = err.downcast_ref::<ValidationError>() {
            return Self::BadRequest(invalid.to_string());
        }
        Self::Internal(err)
    }
}

// --- Authentication ---

/// Extractor for handlers that need a logged-in user.
struct RequireSession {
    token: String,
    session: Session,
}

impl FromRequestParts<AppState> for RequireSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?
            .to_string();

        let session = {
            let sessions = state.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            sessions.get(&token).cloned()
        };
        let session = session
            .ok_or_else(|| ApiError::Unauthorized("Invalid or expired session".to_string()))?;

        Ok(Self { token, session })
    }
}

// --- Middleware ---

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        "{} {} {} {}ms",
        method,
        path,
        response.status().as_u16(),
        start.elapsed().as_millis()
    );
    response
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Recipe handlers ---

async fn search_recipes(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchPage>, ApiError> {
    let catalog = state.catalog.lock().unwrap_or_else(PoisonError::into_inner);
    let page = catalog
        .search(params.query.as_deref(), params.page.as_deref())
        .context("search failed")?;
    Ok(Json(page))
}

async fn get_recipe(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Recipe>, ApiError> {
    let catalog = state.catalog.lock().unwrap_or_else(PoisonError::into_inner);
    let recipe = catalog
        .read(id)
        .context("database error")?
        .ok_or_else(|| ApiError::NotFound(format!("Recipe {id} not found")))?;
    Ok(Json(recipe))
}

async fn create_recipe(
    State(state): State<AppState>,
    auth: RequireSession,
    Json(req): Json<NewRecipe>,
) -> Result<(StatusCode, Json<Recipe>), ApiError> {
    let mut catalog = state.catalog.lock().unwrap_or_else(PoisonError::into_inner);
    let id = catalog.create(&req).context("failed to create recipe")?;
    let recipe = catalog
        .read(id)
        .context("database error")?
        .context("created recipe is missing")?;

    tracing::info!(id, user_id = auth.session.user_id, "recipe created");
    Ok((StatusCode::CREATED, Json(recipe)))
}

async fn update_recipe(
    State(state): State<AppState>,
    auth: RequireSession,
    Path(id): Path<i64>,
    Json(req): Json<NewRecipe>,
) -> Result<Json<Recipe>, ApiError> {
    let mut catalog = state.catalog.lock().unwrap_or_else(PoisonError::into_inner);
    if !catalog.update(id, &req).context("failed to update recipe")? {
        return Err(ApiError::NotFound(format!("Recipe {id} not found")));
    }
    let recipe = catalog
        .read(id)
        .context("database error")?
        .context("updated recipe is missing")?;

    tracing::info!(id, user_id = auth.session.user_id, "recipe updated");
    Ok(Json(recipe))
}

async fn delete_recipe(
    State(state): State<AppState>,
    auth: RequireSession,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let mut catalog = state.catalog.lock().unwrap_or_else(PoisonError::into_inner);
    let deleted = catalog.delete(id).context("failed to delete recipe")?;

    tracing::info!(id, deleted, user_id = auth.session.user_id, "recipe deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- User handlers ---

async fn login(
    State(state): State<AppState>,
    Json(req): Json<Credentials>,
) -> Result<Json<SessionResponse>, ApiError> {
    let user_id = {
        let catalog = state.catalog.lock().unwrap_or_else(PoisonError::into_inner);
        catalog
            .login(&req.name, &req.password)
            .context("database error")?
    };

    let Some(user_id) = user_id else {
        tracing::warn!(name = %req.name, "failed login attempt");
        return Err(ApiError::Unauthorized(
            "Invalid name or password".to_string(),
        ));
    };

    let name = req.name.trim().to_string();
    let token = state
        .sessions
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .create(user_id);
    Ok(Json(SessionResponse {
        token,
        user_id,
        name,
    }))
}

async fn logout(State(state): State<AppState>, auth: RequireSession) -> StatusCode {
    state
        .sessions
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .revoke(&auth.token);
    StatusCode::NO_CONTENT
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<Credentials>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let user_id = {
        let catalog = state.catalog.lock().unwrap_or_else(PoisonError::into_inner);
        catalog
            .register_user(&req.name, &req.password)
            .context("failed to register user")?
    };

    let name = req.name.trim().to_string();
    let token = state
        .sessions
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .create(user_id);
    tracing::info!(user_id, name = %name, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            token,
            user_id,
            name,
        }),
    ))
}

async fn current_session(
    State(state): State<AppState>,
    auth: RequireSession,
) -> Result<Json<CurrentUserResponse>, ApiError> {
    let user_id = auth.session.user_id;
    let name = {
        let catalog = state.catalog.lock().unwrap_or_else(PoisonError::into_inner);
        catalog.get_user_name(user_id).context("database error")?
    };

    // The catalog may have been rebuilt since login
    let Some(name) = name else {
        state
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .revoke(&auth.token);
        return Err(ApiError::Unauthorized(
            "Invalid or expired session".to_string(),
        ));
    };

    Ok(Json(CurrentUserResponse {
        user_id,
        name,
        expires_at: auth.session.expires_at.to_rfc3339(),
    }))
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/recipes", get(search_recipes).post(create_recipe))
        .route(
            "/api/recipes/{id}",
            get(get_recipe).put(update_recipe).delete(delete_recipe),
        )
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .route("/api/users", post(register))
        .route("/api/session", get(current_session))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    catalog: CatalogService,
    port: u16,
    bind: &str,
    session_ttl: chrono::Duration,
) -> anyhow::Result<()> {
    let app = build_router(AppState::new(catalog, session_ttl));

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    tracing::info!("listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use recipebox_core::models::{BootstrapUser, NewIngredient, NewStage};
    use tower::ServiceExt;

    fn sample_recipe(title: &str) -> NewRecipe {
        NewRecipe {
            title: title.to_string(),
            description: "A classic".to_string(),
            image: "https://example.org/img.jpg".to_string(),
            duration: "1h".to_string(),
            ingredients: vec![
                NewIngredient {
                    name: "apples".to_string(),
                },
                NewIngredient {
                    name: "pastry".to_string(),
                },
            ],
            stages: vec![NewStage {
                description: "bake".to_string(),
            }],
        }
    }

    fn test_state() -> AppState {
        let mut catalog = CatalogService::new_in_memory().unwrap();
        catalog.register_user("chef", "secret").unwrap();
        catalog.create(&sample_recipe("Tarte aux pommes")).unwrap();
        AppState::new(catalog, chrono::Duration::hours(1))
    }

    fn test_app() -> Router {
        build_router(test_state())
    }

    async fn send(
        app: &Router,
        request: axum::http::Request<Body>,
    ) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    fn json_request(
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: &serde_json::Value,
    ) -> axum::http::Request<Body> {
        let mut builder = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, token: Option<&str>) -> axum::http::Request<Body> {
        let mut builder = axum::http::Request::get(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn login_token(app: &Router) -> String {
        let (status, json) = send(
            app,
            json_request(
                "POST",
                "/api/login",
                None,
                &serde_json::json!({ "name": "chef", "password": "secret" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        json["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn search_returns_page() {
        let app = test_app();
        let (status, json) = send(&app, get_request("/api/recipes?query=POMMES", None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["num_found"], 1);
        assert_eq!(json["query"], "POMMES");
        assert_eq!(json["page"], 1);
        assert_eq!(json["next_page"], 2);
        assert_eq!(json["num_pages"], 1);
        assert_eq!(json["results"][0]["title"], "Tarte aux pommes");
        assert_eq!(json["results"][0]["image"], "https://example.org/img.jpg");
        assert!(json["results"][0].get("description").is_none());
    }

    #[tokio::test]
    async fn search_coerces_invalid_page() {
        let app = test_app();
        let (status, json) = send(&app, get_request("/api/recipes?page=abc", None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["page"], 1);
        assert_eq!(json["query"], "");
        assert_eq!(json["results"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_recipe_found_and_missing() {
        let app = test_app();

        let (status, json) = send(&app, get_request("/api/recipes/1", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["title"], "Tarte aux pommes");
        assert_eq!(json["ingredients"][1]["name"], "pastry");
        assert_eq!(json["stages"][0]["description"], "bake");

        let (status, json) = send(&app, get_request("/api/recipes/999", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "Recipe 999 not found");
    }

    #[tokio::test]
    async fn writes_require_session() {
        let app = test_app();
        let body = serde_json::to_value(sample_recipe("Crumble")).unwrap();

        let (status, json) = send(&app, json_request("POST", "/api/recipes", None, &body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Authentication required");

        let (status, json) = send(
            &app,
            json_request("PUT", "/api/recipes/1", Some("bogus"), &body),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Invalid or expired session");

        let (status, _) = send(
            &app,
            json_request("DELETE", "/api/recipes/1", None, &serde_json::Value::Null),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_with_wrong_password_is_rejected() {
        let app = test_app();
        let (status, json) = send(
            &app,
            json_request(
                "POST",
                "/api/login",
                None,
                &serde_json::json!({ "name": "chef", "password": "wrong" }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Invalid name or password");
    }

    #[tokio::test]
    async fn create_update_delete_flow() {
        let app = test_app();
        let token = login_token(&app).await;

        let body = serde_json::to_value(sample_recipe("Crumble")).unwrap();
        let (status, created) =
            send(&app, json_request("POST", "/api/recipes", Some(&token), &body)).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_i64().unwrap();
        assert_eq!(created["ingredients"][0]["rank"], 0);

        let update = serde_json::json!({
            "title": "Pear crumble",
            "description": "With pears",
            "image": "pear.jpg",
            "duration": "2h",
            "ingredients": [{ "name": "pears" }],
            "stages": [{ "description": "chop" }, { "description": "bake" }]
        });
        let (status, updated) = send(
            &app,
            json_request("PUT", &format!("/api/recipes/{id}"), Some(&token), &update),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["title"], "Pear crumble");
        assert_eq!(updated["duration"], "1h");
        assert_eq!(updated["ingredients"].as_array().unwrap().len(), 1);
        assert_eq!(updated["stages"][1]["description"], "bake");

        let (status, _) = send(
            &app,
            json_request(
                "DELETE",
                &format!("/api/recipes/{id}"),
                Some(&token),
                &serde_json::Value::Null,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, get_request(&format!("/api/recipes/{id}"), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // Deleting again is still fine
        let (status, _) = send(
            &app,
            json_request(
                "DELETE",
                &format!("/api/recipes/{id}"),
                Some(&token),
                &serde_json::Value::Null,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn update_missing_recipe_returns_404() {
        let app = test_app();
        let token = login_token(&app).await;
        let body = serde_json::to_value(sample_recipe("Nothing")).unwrap();

        let (status, json) = send(
            &app,
            json_request("PUT", "/api/recipes/404", Some(&token), &body),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "Recipe 404 not found");
    }

    #[tokio::test]
    async fn create_with_blank_title_returns_400() {
        let app = test_app();
        let token = login_token(&app).await;
        let body = serde_json::to_value(sample_recipe("   ")).unwrap();

        let (status, json) =
            send(&app, json_request("POST", "/api/recipes", Some(&token), &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Recipe title cannot be empty");
    }

    #[tokio::test]
    async fn register_logs_user_in() {
        let app = test_app();
        let (status, json) = send(
            &app,
            json_request(
                "POST",
                "/api/users",
                None,
                &serde_json::json!({ "name": " newbie ", "password": "pw" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["name"], "newbie");
        let token = json["token"].as_str().unwrap().to_string();

        let (status, me) = send(&app, get_request("/api/session", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["name"], "newbie");
        assert_eq!(me["user_id"], json["user_id"]);
    }

    #[tokio::test]
    async fn register_rejects_blank_fields() {
        let app = test_app();
        let (status, json) = send(
            &app,
            json_request(
                "POST",
                "/api/users",
                None,
                &serde_json::json!({ "name": "  ", "password": "pw" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "User name cannot be empty");

        let (status, json) = send(
            &app,
            json_request(
                "POST",
                "/api/users",
                None,
                &serde_json::json!({ "name": "someone", "password": "" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Password cannot be empty");
    }

    #[tokio::test]
    async fn session_reads_name_from_catalog() {
        let state = test_state();
        let app = build_router(state.clone());
        let (status, json) = send(
            &app,
            json_request(
                "POST",
                "/api/users",
                None,
                &serde_json::json!({ "name": "newcomer", "password": "pw" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["user_id"], 2);
        let token = json["token"].as_str().unwrap().to_string();

        let (status, me) = send(&app, get_request("/api/session", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["name"], "newcomer");

        // The rebuilt catalog only holds the bootstrap user, with id 1
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "[]").unwrap();
        state
            .catalog
            .lock()
            .unwrap()
            .initialize(&path, &BootstrapUser::default())
            .unwrap();

        let (status, json) = send(&app, get_request("/api/session", Some(&token))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Invalid or expired session");
        assert!(state.sessions.lock().unwrap().get(&token).is_none());
    }

    #[tokio::test]
    async fn logout_revokes_session() {
        let app = test_app();
        let token = login_token(&app).await;

        let (status, _) = send(
            &app,
            json_request("POST", "/api/logout", Some(&token), &serde_json::Value::Null),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, get_request("/api/session", Some(&token))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn security_headers_present() {
        let app = test_app();
        let response = app
            .oneshot(get_request("/api/recipes", None))
            .await
            .unwrap();

        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
        assert_eq!(
            response.headers().get("content-security-policy").unwrap(),
            "default-src 'none'"
        );
    }

    #[tokio::test]
    async fn body_size_limit_rejects_oversized() {
        let app = test_app();
        let token = login_token(&app).await;

        let big_body = vec![b'a'; BODY_LIMIT + 1];
        let response = app
            .oneshot(
                axum::http::Request::post("/api/recipes")
                    .header("content-type", "application/json")
                    .header("Authorization", format!("Bearer {token}"))
                    .body(Body::from(big_body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn internal_error_does_not_leak_details() {
        let error =
            ApiError::Internal(anyhow::anyhow!("secret database path /home/user/recipes.db"));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal server error");
        assert!(!json["error"].as_str().unwrap().contains("secret"));
    }
}
