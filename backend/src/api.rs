use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::context::AppContext;
use crate::guide::RenderRequest;
use crate::pdf_export;

type SharedContext = Arc<AppContext>;

/// An error reply, `{"erro": message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> ApiError {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> ApiError {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    erro: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { erro: self.message })).into_response()
    }
}

pub fn router(ctx: SharedContext) -> Router {
    let mut app = Router::new()
        .route("/api/status", get(get_status))
        .route("/api/layouts", get(list_layouts))
        .route("/gerar-pdf", post(fill_guide));
    if let Some(dir) = &ctx.config.static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }
    app.layer(DefaultBodyLimit::max(ctx.config.body_limit))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

#[derive(Serialize)]
struct Status {
    status: String,
    default_layout: String,
    layouts: Vec<String>,
}

async fn get_status(State(ctx): State<SharedContext>) -> Json<Status> {
    Json(Status {
        status: "ok".to_string(),
        default_layout: ctx.layouts.default_version().to_owned(),
        layouts: ctx.layouts.versions(),
    })
}

#[derive(Serialize)]
struct LayoutSummary {
    version: String,
    description: String,
    fields: Vec<String>,
}

async fn list_layouts(State(ctx): State<SharedContext>) -> Json<Vec<LayoutSummary>> {
    let layouts = ctx
        .layouts
        .layouts()
        .iter()
        .map(|layout| LayoutSummary {
            version: layout.version.clone(),
            description: layout.description.clone(),
            fields: layout.field_names().into_iter().map(String::from).collect(),
        })
        .collect();
    Json(layouts)
}

#[derive(Deserialize)]
struct FillParams {
    layout: Option<String>,
}

fn parse_request(body: &[u8]) -> Result<RenderRequest, ApiError> {
    const NO_DATA: &str = "Nenhum dado recebido";
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::bad_request(NO_DATA));
    }
    let json: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("JSON inválido: {e}")))?;
    RenderRequest::from_json(&json).ok_or_else(|| ApiError::bad_request(NO_DATA))
}

async fn fill_guide(
    State(ctx): State<SharedContext>,
    Query(params): Query<FillParams>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request = parse_request(&body)?;
    let layout = ctx.layouts.resolve(params.layout.as_deref()).ok_or_else(|| {
        ApiError::bad_request(format!(
            "Layout desconhecido: {}",
            params.layout.as_deref().unwrap_or_default()
        ))
    })?;
    log::info!(
        "Filling guide with layout {} ({} values)",
        layout.version,
        request.len()
    );

    let template = Arc::clone(&ctx.template);
    let pdf = tokio::task::spawn_blocking(move || {
        pdf_export::fill_guide(&template, &request, &layout)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))?
    .map_err(|e| {
        log::error!("PDF composition failed: {e:#}");
        ApiError::internal(format!("{e:#}"))
    })?;

    let disposition = format!("attachment; filename=\"{}\"", ctx.config.download_name);
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_owned()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        pdf,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::guide::LayoutRegistry;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app_with(config: Config, template: Vec<u8>) -> Router {
        let layouts = LayoutRegistry::builtin().unwrap();
        router(Arc::new(AppContext::new(config, layouts, template)))
    }

    fn app() -> Router {
        app_with(Config::default(), crate::pdf_tests::base_template())
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn empty_object_is_rejected() {
        let response = app().oneshot(post_json("/gerar-pdf", "{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["erro"], "Nenhum dado recebido");
    }

    #[tokio::test]
    async fn missing_body_is_rejected() {
        let response = app().oneshot(post_json("/gerar-pdf", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_json_is_rejected() {
        let response = app()
            .oneshot(post_json("/gerar-pdf", "{\"cbo\": "))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["erro"].as_str().unwrap().starts_with("JSON"));
    }

    #[tokio::test]
    async fn fills_guide_as_download() {
        let response = app()
            .oneshot(post_json(
                "/gerar-pdf",
                r#"{"numero_carteira": "1234567890123", "data_atendimento": "2024-03-07"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"GUIA_CONSULTA_PREENCHIDA.pdf\""
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn layout_can_be_chosen() {
        let response = app()
            .oneshot(post_json("/gerar-pdf?layout=petrobras-v2", r#"{"cbo": "225125"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app()
            .oneshot(post_json("/gerar-pdf?layout=nope", r#"{"cbo": "225125"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["erro"], "Layout desconhecido: nope");
    }

    #[tokio::test]
    async fn broken_template_is_a_server_error() {
        let app = app_with(Config::default(), b"%PDF-1.4 garbage".to_vec());
        let response = app
            .oneshot(post_json("/gerar-pdf", r#"{"cbo": "225125"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let message = body_json(response).await["erro"].as_str().unwrap().to_owned();
        assert!(message.contains("base template"));
    }

    #[tokio::test]
    async fn status_lists_layouts() {
        let response = app()
            .oneshot(Request::builder().uri("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["default_layout"], "petrobras-v1");
        assert_eq!(json["layouts"][1], "petrobras-v2");
    }

    #[tokio::test]
    async fn layouts_endpoint_lists_fields() {
        let response = app()
            .oneshot(Request::builder().uri("/api/layouts").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        let fields = json[0]["fields"].as_array().unwrap();
        assert_eq!(fields.len(), 14);
        assert_eq!(fields[13], "observacao");
    }

    #[tokio::test]
    async fn serves_front_end_from_static_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>Guia</h1>").unwrap();
        let config = Config {
            static_dir: Some(dir.path().to_owned()),
            ..Config::default()
        };
        let response = app_with(config, crate::pdf_tests::base_template())
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
