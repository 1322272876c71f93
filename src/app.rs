#![cfg(not(tarpaulin_include))]

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::{AppConfig, ColumnMapping, MappingStore, mapping_key};
use crate::error::{HierarchyError, LoadError};
use crate::hierarchy::{AssignOptions, FanOut, LayoutMode, NodeId};
use crate::loader::{self, Workbook};
use crate::session::Session;

pub struct AppState {
    config: AppConfig,
    workbook: Mutex<Option<Workbook>>,
    session: Mutex<Option<Session>>,
    mappings: Mutex<MappingStore>,
}

type SharedState = Arc<AppState>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Serialize)]
struct StatusResponse {
    status: String,
    message: Option<String>,
}

fn ok_response(message: Option<String>) -> Response {
    Json(StatusResponse {
        status: "ok".to_string(),
        message,
    })
    .into_response()
}

fn error_response(code: StatusCode, message: impl ToString) -> Response {
    (
        code,
        Json(StatusResponse {
            status: "error".to_string(),
            message: Some(message.to_string()),
        }),
    )
        .into_response()
}

fn hierarchy_error(e: HierarchyError) -> Response {
    let message = e.to_string();
    match e {
        HierarchyError::ConfirmationRequired(impact) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "status": "confirm",
                "message": message,
                "impact": impact,
            })),
        )
            .into_response(),
        HierarchyError::UnknownNode(_) => error_response(StatusCode::NOT_FOUND, message),
        HierarchyError::DuplicateReadOnly(_) | HierarchyError::RootNotEditable => {
            error_response(StatusCode::FORBIDDEN, message)
        }
    }
}

fn no_session() -> Response {
    error_response(StatusCode::BAD_REQUEST, "No sheet selected")
}

#[derive(Deserialize)]
struct NodeRequest {
    node: u64,
}

#[derive(Deserialize)]
struct AssignRequest {
    node: u64,
    column: usize,
    #[serde(default)]
    fan_out: FanOut,
}

#[derive(Deserialize)]
struct DeleteRequest {
    node: u64,
    #[serde(default)]
    confirmed: bool,
}

#[derive(Deserialize)]
struct LayoutRequest {
    node: u64,
    layout: LayoutMode,
}

#[derive(Deserialize)]
struct PreviewQuery {
    node: Option<u64>,
    #[serde(default)]
    show_empty: bool,
}

/// Start the web server
///
/// # Arguments
/// * `config` - Listen address, data directory and page geometry
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Returns when the server stops
pub async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mappings = MappingStore::load(config.mappings_path()).unwrap_or_else(|e| {
        warn!("starting with an empty mapping store: {}", e);
        MappingStore::in_memory()
    });
    let addr = config.addr.clone();

    let app_state = Arc::new(AppState {
        config,
        workbook: Mutex::new(None),
        session: Mutex::new(None),
        mappings: Mutex::new(mappings),
    });

    let app = router(app_state);

    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .route("/api/upload", post(upload_workbook))
        .route("/api/sheet/:sheet", get(select_sheet))
        .route("/api/hierarchy", get(get_hierarchy))
        .route("/api/hierarchy/assign", post(assign_column))
        .route("/api/hierarchy/child", post(add_child))
        .route("/api/hierarchy/sibling", post(add_sibling))
        .route("/api/hierarchy/delete", post(delete_node))
        .route("/api/hierarchy/layout", post(set_layout))
        .route("/api/mapping", get(get_mapping).put(put_mapping))
        .route("/api/save", post(save_hierarchy))
        .route("/preview", get(preview))
        .route("/export/csv", get(export_csv))
        .route("/export/xlsx", get(export_xlsx))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn serve_index() -> Html<&'static str> {
    Html(include_str!("./static/index.html"))
}

async fn upload_workbook(State(state): State<SharedState>, mut multipart: Multipart) -> Response {
    let mut file_data = Vec::new();
    let mut file_name = String::new();

    while let Some(field) = multipart.next_field().await.unwrap_or(None) {
        if field.name() == Some("workbook") {
            file_name = field.file_name().unwrap_or_default().to_lowercase();
            file_data = field.bytes().await.unwrap_or_default().to_vec();
        }
    }

    if file_data.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No file data received");
    }

    let file_id = Uuid::new_v4().to_string();
    let loaded = if file_name.ends_with(".csv") {
        loader::parse_csv(Cursor::new(file_data)).map(|sheet| Workbook {
            file_id: file_id.clone(),
            sheets: vec![("Sheet1".to_string(), sheet)],
        })
    } else {
        loader::from_bytes(file_data, &file_id)
    };

    match loaded {
        Ok(workbook) => {
            info!(
                "cached workbook {} ({}) with {} sheet(s)",
                file_id,
                file_name,
                workbook.sheets.len()
            );
            let sheets: Vec<String> = workbook.sheet_names().into_iter().map(str::to_string).collect();
            *lock(&state.workbook) = Some(workbook);
            *lock(&state.session) = None;
            Json(serde_json::json!({
                "status": "ok",
                "fileId": file_id,
                "sheets": sheets,
            }))
            .into_response()
        }
        Err(e) => error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Failed to read workbook: {}", e),
        ),
    }
}

async fn select_sheet(Path(sheet_id): Path<String>, State(state): State<SharedState>) -> Response {
    let workbook = lock(&state.workbook);
    let Some(book) = workbook.as_ref() else {
        return error_response(StatusCode::BAD_REQUEST, "No workbook uploaded");
    };
    let sheet = match book.sheet_by_id(&sheet_id) {
        Ok(sheet) => sheet.clone(),
        Err(e @ LoadError::SheetNotFound(_)) => return error_response(StatusCode::NOT_FOUND, e),
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    };

    let mut session = Session::new(&book.file_id, &sheet_id, sheet);
    let mapping = lock(&state.mappings)
        .get(&mapping_key(&book.file_id, &sheet_id))
        .cloned();
    let warning = session.resume(&state.config.data_dir, mapping.as_ref());

    let body = serde_json::json!({
        "status": "ok",
        "warning": warning,
        "headers": session.sheet().headers,
        "rows": session.sheet().rows,
        "hierarchy": session.tree().view(session.tree().root()),
    });
    *lock(&state.session) = Some(session);
    Json(body).into_response()
}

async fn get_hierarchy(State(state): State<SharedState>) -> Response {
    let session = lock(&state.session);
    match session.as_ref() {
        Some(s) => Json(s.tree().view(s.tree().root())).into_response(),
        None => no_session(),
    }
}

/// Runs `action` on the current session and answers with the updated tree.
fn with_session<T: Serialize>(
    state: &AppState,
    action: impl FnOnce(&mut Session) -> Result<T, HierarchyError>,
) -> Response {
    let mut guard = lock(&state.session);
    let Some(session) = guard.as_mut() else {
        return no_session();
    };
    match action(session) {
        Ok(result) => Json(serde_json::json!({
            "status": "ok",
            "result": result,
            "hierarchy": session.tree().view(session.tree().root()),
        }))
        .into_response(),
        Err(e) => hierarchy_error(e),
    }
}

async fn assign_column(State(state): State<SharedState>, Json(req): Json<AssignRequest>) -> Response {
    let options = AssignOptions {
        fan_out: req.fan_out,
        ..AssignOptions::default()
    };
    with_session(&state, |s| {
        s.assign_column(NodeId::from_raw(req.node), req.column, options)
    })
}

async fn add_child(State(state): State<SharedState>, Json(req): Json<NodeRequest>) -> Response {
    with_session(&state, |s| s.add_child(NodeId::from_raw(req.node)))
}

async fn add_sibling(State(state): State<SharedState>, Json(req): Json<NodeRequest>) -> Response {
    with_session(&state, |s| s.add_sibling(NodeId::from_raw(req.node)))
}

async fn delete_node(State(state): State<SharedState>, Json(req): Json<DeleteRequest>) -> Response {
    with_session(&state, |s| {
        s.delete_node(NodeId::from_raw(req.node), req.confirmed)
    })
}

async fn set_layout(State(state): State<SharedState>, Json(req): Json<LayoutRequest>) -> Response {
    with_session(&state, |s| s.set_layout(NodeId::from_raw(req.node), req.layout))
}

async fn get_mapping(State(state): State<SharedState>) -> Response {
    let session = lock(&state.session);
    match session.as_ref() {
        Some(s) => Json(s.mapping()).into_response(),
        None => no_session(),
    }
}

async fn put_mapping(State(state): State<SharedState>, Json(mapping): Json<ColumnMapping>) -> Response {
    let mut guard = lock(&state.session);
    let Some(session) = guard.as_mut() else {
        return no_session();
    };
    if let Err(e) = session.apply_mapping(&mapping) {
        return hierarchy_error(e);
    }

    let key = mapping_key(&session.file_id, &session.sheet_id);
    match lock(&state.mappings).put(&key, mapping) {
        Ok(()) => Json(serde_json::json!({
            "status": "ok",
            "hierarchy": session.tree().view(session.tree().root()),
        }))
        .into_response(),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Mapping applied but not saved: {}", e),
        ),
    }
}

async fn save_hierarchy(State(state): State<SharedState>) -> Response {
    let session = lock(&state.session);
    let Some(session) = session.as_ref() else {
        return no_session();
    };
    match session.save(&state.config.data_dir) {
        Ok(path) => ok_response(Some(path.display().to_string())),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn preview(Query(params): Query<PreviewQuery>, State(state): State<SharedState>) -> Response {
    let session = lock(&state.session);
    let Some(session) = session.as_ref() else {
        return no_session();
    };
    let config = &state.config;
    match session.render_preview(
        params.node.map(NodeId::from_raw),
        params.show_empty,
        &config.title,
        &config.layout,
        config.page_height_px,
    ) {
        Ok(html) => Html(html).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

fn download(content_type: &'static str, filename: &str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        Bytes::from(body),
    )
        .into_response()
}

async fn export_csv(State(state): State<SharedState>) -> Response {
    let session = lock(&state.session);
    let Some(session) = session.as_ref() else {
        return no_session();
    };
    match session.export_csv() {
        Ok(csv) => download("text/csv", "materialenlijst.csv", csv.into_bytes()),
        Err(e) => hierarchy_error(e),
    }
}

async fn export_xlsx(State(state): State<SharedState>) -> Response {
    let session = lock(&state.session);
    let Some(session) = session.as_ref() else {
        return no_session();
    };
    match session.export_xlsx() {
        Ok(bytes) => download(
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "materialenlijst.xlsx",
            bytes,
        ),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}
