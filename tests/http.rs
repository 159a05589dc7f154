use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use image::DynamicImage;
use quality_monitor::classifier::QualityModel;
use quality_monitor::entity::{inspection, product, schema_setup};
use quality_monitor::serve::{router, AppState};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, EntityTrait};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

struct StubModel(f32);

impl QualityModel for StubModel {
    fn pass_probability(&self, _image: &DynamicImage) -> anyhow::Result<f32> {
        Ok(self.0)
    }
}

async fn test_state(probability: f32) -> (AppState, TempDir) {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1);
    let db = Database::connect(options)
        .await
        .expect("connect to in-memory sqlite");
    schema_setup(&db).await.expect("create schema");
    let upload_dir = tempfile::tempdir().expect("tempdir");
    let state = AppState {
        db,
        model: Arc::new(StubModel(probability)),
        upload_dir: upload_dir.path().to_path_buf(),
    };
    (state, upload_dir)
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("parse json")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

const BOUNDARY: &str = "quality-monitor-test";

fn multipart_request(file: Option<(&str, &[u8])>, fields: &[(&str, &str)]) -> Request<Body> {
    let mut body = Vec::new();
    for (key, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{key}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, data)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    Request::builder()
        .method("POST")
        .uri("/upload_quality")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn product_details() -> Vec<(&'static str, &'static str)> {
    vec![
        ("name", "Paracetamol"),
        ("category", "Tablet"),
        ("manufacturer", "Acme Labs"),
        ("expiry_date", "2027-01-01"),
        ("stock", "25"),
    ]
}

fn png_bytes() -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
        4,
        4,
        image::Rgb([120, 200, 90]),
    ));
    let mut out = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

#[tokio::test]
async fn landing_pages_render() {
    let (state, _dir) = test_state(0.9).await;
    for uri in ["/", "/quality_upload"] {
        let response = router(state.clone()).oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn product_listing_mirrors_the_table() {
    let (state, _dir) = test_state(0.9).await;
    for name in ["Aspirin", "Ibuprofen"] {
        product::ActiveModel::new(
            name.to_owned(),
            "Tablet".to_owned(),
            "Acme Labs".to_owned(),
            chrono::NaiveDate::from_ymd_opt(2027, 1, 1).unwrap(),
            30,
        )
        .insert(&state.db)
        .await
        .unwrap();
    }

    let response = router(state.clone()).oneshot(get("/products")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let rows = body.as_array().expect("array body");
    assert_eq!(rows.len(), 2);
    assert!(rows[0]["expiry_date"].is_string());
    assert_eq!(rows[0]["current_stock"], 30);
}

#[tokio::test]
async fn alerts_endpoint_upserts_then_lists_without_duplicates() {
    let (state, _dir) = test_state(0.9).await;
    product::ActiveModel::new(
        "Ibuprofen".to_owned(),
        "Tablet".to_owned(),
        "Acme Labs".to_owned(),
        chrono::NaiveDate::from_ymd_opt(2027, 1, 1).unwrap(),
        3,
    )
    .insert(&state.db)
    .await
    .unwrap();

    for _ in 0..2 {
        let response = router(state.clone()).oneshot(get("/alerts")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body.as_array().expect("array body").len(), 1);
    }
}

#[tokio::test]
async fn upload_with_disallowed_extension_is_rejected_without_rows() {
    let (state, _dir) = test_state(0.9).await;
    let response = router(state.clone())
        .oneshot(multipart_request(
            Some(("x.gif", b"GIF89a")),
            &product_details(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Invalid file type");

    assert!(product::Entity::find().all(&state.db).await.unwrap().is_empty());
    assert!(inspection::Entity::find()
        .all(&state.db)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn upload_without_image_part_is_rejected() {
    let (state, _dir) = test_state(0.9).await;
    let response = router(state.clone())
        .oneshot(multipart_request(None, &product_details()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "No image part");
}

#[tokio::test]
async fn successful_upload_returns_the_landing_page_and_records_rows() {
    let (state, _dir) = test_state(0.9).await;
    let png = png_bytes();
    let response = router(state.clone())
        .oneshot(multipart_request(
            Some(("sample.png", &png)),
            &product_details(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let products = product::Entity::find().all(&state.db).await.unwrap();
    assert_eq!(products.len(), 1);
    let inspections = inspection::Entity::find().all(&state.db).await.unwrap();
    assert_eq!(inspections.len(), 1);
    assert_eq!(inspections[0].quality_status, inspection::STATUS_PASS);
}
