use crate::classifier::{CnnClassifier, QualityModel, ALLOWED_EXTENSIONS};
use crate::entity::{self, alert, inspection, prediction, product, sale};
use crate::rand::rand_i32;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use serde_json::json;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

pub const LOW_STOCK_THRESHOLD: i32 = 10;

const INDEX_HTML: &str = include_str!("../templates/index.html");
const UPLOAD_HTML: &str = include_str!("../templates/quality_upload.html");

/// Everything a handler needs, built once in `execute` and injected
/// through axum state.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub model: Arc<dyn QualityModel>,
    pub upload_dir: PathBuf,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Internal(err) => {
                tracing::error!("request failed: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        ApiError::Internal(err.into())
    }
}

pub async fn execute(
    db: DatabaseConnection,
    bind: &str,
    model_path: &Path,
    upload_dir: PathBuf,
) -> Result<()> {
    entity::schema_setup(&db)
        .await
        .context("Failed to setup schema")?;
    tokio::fs::create_dir_all(&upload_dir)
        .await
        .context("Failed to create upload directory")?;
    let model = CnnClassifier::load(model_path)?;
    let state = AppState {
        db,
        model: Arc::new(model),
        upload_dir,
    };
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    tracing::info!("listening on {bind}");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/products", get(list_products))
        .route("/inspections", get(list_inspections))
        .route("/alerts", get(refresh_alerts))
        .route("/predictions", get(refresh_predictions))
        .route("/sales", get(refresh_sales))
        .route("/quality_upload", get(upload_page))
        .route("/upload_quality", post(upload_quality))
        .with_state(state)
}

async fn shutdown_signal() {
    let (exit_tx, exit_rx) = flume::bounded(1);
    ctrlc::set_handler(move || {
        let _ = exit_tx.send(());
    })
    .expect("Error setting Ctrl-C handler");
    let _ = exit_rx.recv_async().await;
    tracing::info!("receive the exit signal, exit...");
}

async fn index_page() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn upload_page() -> Html<&'static str> {
    Html(UPLOAD_HTML)
}

#[derive(Serialize)]
struct ProductRow {
    id: i32,
    name: String,
    category: String,
    manufacturer: String,
    expiry_date: String,
    current_stock: i32,
}

async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<ProductRow>>, ApiError> {
    let products = product::Entity::find().all(&state.db).await?;
    Ok(Json(
        products
            .into_iter()
            .map(|p| ProductRow {
                id: p.id,
                name: p.name,
                category: p.category,
                manufacturer: p.manufacturer,
                expiry_date: p.expiry_date.to_string(),
                current_stock: p.current_stock,
            })
            .collect(),
    ))
}

#[derive(Serialize)]
struct InspectionRow {
    product_id: i32,
    product_name: String,
    quality_status: String,
    confidence_score: f64,
    image_path: String,
    inspection_time: String,
}

async fn list_inspections(
    State(state): State<AppState>,
) -> Result<Json<Vec<InspectionRow>>, ApiError> {
    let rows = inspection::Entity::find()
        .find_also_related(product::Entity)
        .all(&state.db)
        .await?;
    Ok(Json(
        rows.into_iter()
            .map(|(i, p)| InspectionRow {
                product_id: i.product_id,
                product_name: p.map(|p| p.name).unwrap_or_default(),
                quality_status: i.quality_status,
                confidence_score: i.confidence_score,
                image_path: i.image_path,
                inspection_time: i.inspection_time.to_string(),
            })
            .collect(),
    ))
}

#[derive(Serialize)]
struct AlertRow {
    alert_type: String,
    message: String,
    timestamp: String,
}

/// Inserts a low-stock alert for any product under the threshold that
/// does not already carry one. Returns how many were created.
pub async fn generate_low_stock_alerts<C: ConnectionTrait>(db: &C) -> Result<u32, DbErr> {
    let low_stock = product::Entity::find()
        .filter(product::Column::CurrentStock.lt(LOW_STOCK_THRESHOLD))
        .all(db)
        .await?;
    let mut created = 0;
    for p in low_stock {
        let exists = alert::Entity::find()
            .filter(alert::Column::ProductId.eq(p.id))
            .filter(alert::Column::AlertType.eq(alert::TYPE_LOW_STOCK))
            .one(db)
            .await?;
        if exists.is_none() {
            alert::ActiveModel::new(
                p.id,
                alert::TYPE_LOW_STOCK,
                format!("Stock for {} dropped below safe level.", p.name),
            )
            .insert(db)
            .await?;
            created += 1;
        }
    }
    Ok(created)
}

async fn refresh_alerts(State(state): State<AppState>) -> Result<Json<Vec<AlertRow>>, ApiError> {
    let txn = state.db.begin().await?;
    let created = generate_low_stock_alerts(&txn).await?;
    txn.commit().await?;
    if created > 0 {
        tracing::info!("created {created} low stock alerts");
    }
    let alerts = alert::Entity::find()
        .order_by_desc(alert::Column::Timestamp)
        .all(&state.db)
        .await?;
    Ok(Json(
        alerts
            .into_iter()
            .map(|a| AlertRow {
                alert_type: a.alert_type,
                message: a.message,
                timestamp: a.timestamp.to_string(),
            })
            .collect(),
    ))
}

#[derive(Serialize)]
struct PredictionRow {
    predicted_date: String,
    predicted_demand: i32,
    model_used: String,
    prediction_time: String,
}

/// One synthetic demand figure per product per day, drawn uniformly.
pub async fn generate_daily_predictions<C: ConnectionTrait>(
    db: &C,
    today: NaiveDate,
) -> Result<u32, DbErr> {
    let products = product::Entity::find().all(db).await?;
    let mut created = 0;
    for p in products {
        let exists = prediction::Entity::find()
            .filter(prediction::Column::ProductId.eq(p.id))
            .filter(prediction::Column::PredictedDate.eq(today))
            .one(db)
            .await?;
        if exists.is_none() {
            prediction::ActiveModel::new(p.id, today, rand_i32(5, 49))
                .insert(db)
                .await?;
            created += 1;
        }
    }
    Ok(created)
}

async fn refresh_predictions(
    State(state): State<AppState>,
) -> Result<Json<Vec<PredictionRow>>, ApiError> {
    let txn = state.db.begin().await?;
    generate_daily_predictions(&txn, Utc::now().date_naive()).await?;
    txn.commit().await?;
    let predictions = prediction::Entity::find()
        .order_by_asc(prediction::Column::PredictedDate)
        .all(&state.db)
        .await?;
    Ok(Json(
        predictions
            .into_iter()
            .map(|p| PredictionRow {
                predicted_date: p.predicted_date.to_string(),
                predicted_demand: p.predicted_demand,
                model_used: p.model_used,
                prediction_time: p.prediction_time.to_string(),
            })
            .collect(),
    ))
}

#[derive(Serialize)]
struct SaleRow {
    product_id: i32,
    quantity_sold: i32,
    sale_date: String,
}

/// One synthetic sale per product per day; stock decreases by the sold
/// quantity but never below zero.
pub async fn generate_daily_sales<C: ConnectionTrait>(db: &C, today: NaiveDate) -> Result<u32, DbErr> {
    let products = product::Entity::find().all(db).await?;
    let mut created = 0;
    for p in products {
        let exists = sale::Entity::find()
            .filter(sale::Column::ProductId.eq(p.id))
            .filter(sale::Column::SaleDate.eq(today))
            .one(db)
            .await?;
        if exists.is_some() {
            continue;
        }
        let quantity = rand_i32(1, 9);
        let product_id = p.id;
        let remaining = (p.current_stock - quantity).max(0);
        let mut product_active: product::ActiveModel = p.into();
        product_active.current_stock = Set(remaining);
        product_active.update(db).await?;
        sale::ActiveModel::new(product_id, quantity, today)
            .insert(db)
            .await?;
        created += 1;
    }
    Ok(created)
}

async fn refresh_sales(State(state): State<AppState>) -> Result<Json<Vec<SaleRow>>, ApiError> {
    let txn = state.db.begin().await?;
    generate_daily_sales(&txn, Utc::now().date_naive()).await?;
    txn.commit().await?;
    let sales = sale::Entity::find()
        .order_by_desc(sale::Column::SaleDate)
        .all(&state.db)
        .await?;
    Ok(Json(
        sales
            .into_iter()
            .map(|s| SaleRow {
                product_id: s.product_id,
                quantity_sold: s.quantity_sold,
                sale_date: s.sale_date.to_string(),
            })
            .collect(),
    ))
}

/// Raw multipart fields before validation.
#[derive(Debug, Default)]
pub struct UploadFields {
    pub file_name: Option<String>,
    pub data: Option<Bytes>,
    pub name: Option<String>,
    pub category: Option<String>,
    pub manufacturer: Option<String>,
    pub expiry_date: Option<String>,
    pub stock: Option<String>,
}

#[derive(Debug)]
pub struct UploadRequest {
    pub file_name: String,
    pub data: Bytes,
    pub name: String,
    pub category: String,
    pub manufacturer: String,
    pub expiry_date: NaiveDate,
    pub stock: i32,
}

#[derive(Debug)]
pub struct UploadOutcome {
    pub product_id: i32,
    pub quality_status: &'static str,
    pub confidence: f64,
}

fn allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Keeps only characters safe inside a single path segment.
fn sanitize_filename(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned.trim_start_matches('.').to_owned()
}

pub fn validate_upload(fields: UploadFields) -> Result<UploadRequest, ApiError> {
    let (file_name, data) = match (fields.file_name, fields.data) {
        (Some(file_name), Some(data)) => (file_name, data),
        _ => return Err(ApiError::BadRequest("No image part".to_owned())),
    };
    let details = [
        &fields.name,
        &fields.category,
        &fields.manufacturer,
        &fields.expiry_date,
        &fields.stock,
    ];
    if details.iter().any(|d| d.as_deref().unwrap_or("").is_empty()) {
        return Err(ApiError::BadRequest("Missing product details".to_owned()));
    }
    if file_name.is_empty() {
        return Err(ApiError::BadRequest("No selected file".to_owned()));
    }
    if !allowed_file(&file_name) {
        return Err(ApiError::BadRequest("Invalid file type".to_owned()));
    }
    let expiry_date = fields
        .expiry_date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .ok_or_else(|| ApiError::BadRequest("Invalid expiry date".to_owned()))?;
    let stock = fields
        .stock
        .as_deref()
        .and_then(|s| s.trim().parse::<i32>().ok())
        .filter(|s| *s >= 0)
        .ok_or_else(|| ApiError::BadRequest("Invalid stock quantity".to_owned()))?;
    Ok(UploadRequest {
        file_name,
        data,
        name: fields.name.unwrap_or_default(),
        category: fields.category.unwrap_or_default(),
        manufacturer: fields.manufacturer.unwrap_or_default(),
        expiry_date,
        stock,
    })
}

pub fn classify_outcome(probability: f32) -> (&'static str, f64) {
    let (status, raw) = if probability >= 0.5 {
        (inspection::STATUS_PASS, f64::from(probability))
    } else {
        (inspection::STATUS_FAIL, f64::from(1.0 - probability))
    };
    (status, (raw * 100.0).round() / 100.0)
}

/// Stores the image, classifies it, and records product, inspection and
/// any quality alert in a single transaction.
pub async fn process_upload(
    db: &DatabaseConnection,
    model: &dyn QualityModel,
    upload_dir: &Path,
    request: UploadRequest,
) -> Result<UploadOutcome, ApiError> {
    let file_name = sanitize_filename(&request.file_name);
    tokio::fs::write(upload_dir.join(&file_name), &request.data).await?;

    let image = image::load_from_memory(&request.data)
        .map_err(|_| ApiError::BadRequest("Invalid image data".to_owned()))?;
    let probability = model.pass_probability(&image)?;
    let (quality_status, confidence) = classify_outcome(probability);

    let txn = db.begin().await?;
    let existing = product::Entity::find()
        .filter(product::Column::Name.eq(&request.name))
        .filter(product::Column::Category.eq(&request.category))
        .filter(product::Column::Manufacturer.eq(&request.manufacturer))
        .filter(product::Column::ExpiryDate.eq(request.expiry_date))
        .one(&txn)
        .await?;
    let product = match existing {
        Some(found) => {
            let stock = found.current_stock + request.stock;
            let mut active: product::ActiveModel = found.into();
            active.current_stock = Set(stock);
            active.update(&txn).await?
        }
        None => product::ActiveModel::new(
            request.name,
            request.category,
            request.manufacturer,
            request.expiry_date,
            request.stock,
        )
        .insert(&txn)
        .await?,
    };
    inspection::ActiveModel::new(
        product.id,
        quality_status,
        confidence,
        format!("uploads/{file_name}"),
    )
    .insert(&txn)
    .await?;
    if quality_status == inspection::STATUS_FAIL {
        alert::ActiveModel::new(
            product.id,
            alert::TYPE_QUALITY_FAIL,
            format!(
                "{} failed quality inspection with {:.1}% confidence.",
                product.name,
                confidence * 100.0
            ),
        )
        .insert(&txn)
        .await?;
    }
    txn.commit().await?;
    tracing::info!(
        product_id = product.id,
        quality_status,
        confidence,
        "inspection recorded"
    );
    Ok(UploadOutcome {
        product_id: product.id,
        quality_status,
        confidence,
    })
}

async fn upload_quality(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Html<&'static str>, ApiError> {
    let mut fields = UploadFields::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(format!("Malformed multipart request: {err}")))?
    {
        let read_err =
            |err| ApiError::BadRequest(format!("Malformed multipart request: {err}"));
        let field_name = field.name().map(str::to_owned);
        match field_name.as_deref() {
            Some("image") => {
                fields.file_name = Some(field.file_name().unwrap_or_default().to_owned());
                fields.data = Some(field.bytes().await.map_err(read_err)?);
            }
            Some("name") => fields.name = Some(field.text().await.map_err(read_err)?),
            Some("category") => fields.category = Some(field.text().await.map_err(read_err)?),
            Some("manufacturer") => {
                fields.manufacturer = Some(field.text().await.map_err(read_err)?)
            }
            Some("expiry_date") => fields.expiry_date = Some(field.text().await.map_err(read_err)?),
            Some("stock") => fields.stock = Some(field.text().await.map_err(read_err)?),
            _ => {}
        }
    }
    let request = validate_upload(fields)?;
    process_upload(&state.db, state.model.as_ref(), &state.upload_dir, request).await?;
    Ok(Html(INDEX_HTML))
}
