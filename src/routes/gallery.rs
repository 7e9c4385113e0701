/**
 * Gallery Routes
 * Image gallery upload, listing, and deletion
 */
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::models::GalleryImage;
use crate::routes::auth::{require_db, require_session};
use crate::routes::blog::{clamp_pagination, upload_error_response};
use crate::routes::{ErrorResponse, SuccessResponse};
use crate::state::AppState;
use crate::uploads::{is_safe_filename, ImageKind};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for GET /api/gallery
#[derive(Debug, Deserialize)]
pub struct GalleryListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    pub category: Option<String>,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

/// Response for GET /api/gallery
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryListResponse {
    pub images: Vec<GalleryImage>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}

/// Fields accepted by the upload form.
#[derive(Debug, Default)]
struct GalleryForm {
    alt: Option<String>,
    category: Option<String>,
    image: Option<(String, Vec<u8>)>,
}

async fn read_gallery_form(
    multipart: &mut Multipart,
) -> Result<GalleryForm, (StatusCode, Json<ErrorResponse>)> {
    let mut form = GalleryForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Multipart error: {}", e);
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse::new("Invalid multipart data")),
                ));
            }
        };

        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "image" => {
                let original_name = field.file_name().unwrap_or("unknown").to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    tracing::error!("Failed to read upload bytes: {}", e);
                    (
                        StatusCode::BAD_REQUEST,
                        Json(ErrorResponse::new("Failed to read file data")),
                    )
                })?;
                form.image = Some((original_name, bytes.to_vec()));
            }
            "alt" => {
                form.alt = Some(read_text(field, "alt").await?);
            }
            "category" => {
                form.category = Some(read_text(field, "category").await?);
            }
            _ => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse::with_message("Unknown form field", name)),
                ));
            }
        }
    }

    Ok(form)
}

async fn read_text(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> Result<String, (StatusCode, Json<ErrorResponse>)> {
    field.text().await.map_err(|e| {
        tracing::error!("Failed to read form field {}: {}", name, e);
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Invalid multipart data")),
        )
    })
}

const IMAGE_COLUMNS: &str = "id, filename, url, alt, category, size, mime_type, created_at";

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/gallery/upload - Upload an image (multipart, session required)
pub async fn upload_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    if let Err(e) = require_session(&state, &headers) {
        return e.into_response();
    }

    let form = match read_gallery_form(&mut multipart).await {
        Ok(form) => form,
        Err(e) => return e.into_response(),
    };

    let (alt, category) = match (&form.alt, &form.category) {
        (Some(alt), Some(category))
            if !alt.trim().is_empty() && !category.trim().is_empty() =>
        {
            (alt.clone(), category.clone())
        }
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Alt text and category are required")),
            )
                .into_response();
        }
    };

    let (original_name, bytes) = match &form.image {
        Some(image) => image,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Image file is required")),
            )
                .into_response();
        }
    };

    let pool = match require_db(&state) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let stored = match state
        .uploads
        .save(ImageKind::Gallery, original_name, bytes)
        .await
    {
        Ok(stored) => stored,
        Err(e) => return upload_error_response(&e),
    };

    match sqlx::query_as::<_, GalleryImage>(&format!(
        r#"
        INSERT INTO gallery_images (filename, url, alt, category, size, mime_type)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {}
        "#,
        IMAGE_COLUMNS
    ))
    .bind(&stored.filename)
    .bind(&stored.url)
    .bind(&alt)
    .bind(&category)
    .bind(stored.size as i64)
    .bind(&stored.mime_type)
    .fetch_one(pool)
    .await
    {
        Ok(image) => {
            tracing::info!("Gallery image uploaded: {}", image.filename);
            (StatusCode::CREATED, Json(image)).into_response()
        }
        Err(e) => {
            // Record failed; the stored file would be unreachable, drop it.
            state
                .uploads
                .remove(ImageKind::Gallery, &stored.filename)
                .await;
            tracing::error!("Database error saving gallery image: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to save image")),
            )
                .into_response()
        }
    }
}

/// GET /api/gallery - Paginated list, newest first, optional category filter
pub async fn list_images(
    State(state): State<AppState>,
    Query(query): Query<GalleryListQuery>,
) -> Response {
    let pool = match require_db(&state) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let (page, limit, offset) = clamp_pagination(query.page, query.limit);
    let category = query.category.filter(|c| !c.trim().is_empty());

    let result = match &category {
        Some(category) => {
            sqlx::query_as::<_, GalleryImage>(&format!(
                r#"
                SELECT {} FROM gallery_images
                WHERE category = $1
                ORDER BY created_at DESC
                LIMIT $2 OFFSET $3
                "#,
                IMAGE_COLUMNS
            ))
            .bind(category)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, GalleryImage>(&format!(
                "SELECT {} FROM gallery_images ORDER BY created_at DESC LIMIT $1 OFFSET $2",
                IMAGE_COLUMNS
            ))
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
        }
    };

    let images = match result {
        Ok(images) => images,
        Err(e) => {
            tracing::error!("Database error listing gallery images: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error")),
            )
                .into_response();
        }
    };

    let total_result = match &category {
        Some(category) => {
            sqlx::query_as("SELECT COUNT(*) FROM gallery_images WHERE category = $1")
                .bind(category)
                .fetch_one(pool)
                .await
        }
        None => {
            sqlx::query_as("SELECT COUNT(*) FROM gallery_images")
                .fetch_one(pool)
                .await
        }
    };
    let total: (i64,) = match total_result {
        Ok(total) => total,
        Err(e) => {
            tracing::error!("Database error counting gallery images: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error")),
            )
                .into_response();
        }
    };

    (
        StatusCode::OK,
        Json(GalleryListResponse {
            images,
            page,
            limit,
            total: total.0,
        }),
    )
        .into_response()
}

/// DELETE /api/gallery/{filename} - Delete an image (session required)
///
/// The record goes first; the file removal is best-effort, so a crash in
/// between leaves an orphaned file rather than a dangling record.
pub async fn delete_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(filename): Path<String>,
) -> Response {
    if let Err(e) = require_session(&state, &headers) {
        return e.into_response();
    }

    if !is_safe_filename(&filename) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Invalid filename")),
        )
            .into_response();
    }

    let pool = match require_db(&state) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let deleted = match sqlx::query("DELETE FROM gallery_images WHERE filename = $1")
        .bind(&filename)
        .execute(pool)
        .await
    {
        Ok(result) => result.rows_affected(),
        Err(e) => {
            tracing::error!("Database error deleting gallery image: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to delete image")),
            )
                .into_response();
        }
    };

    if deleted == 0 {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("Not found")),
        )
            .into_response();
    }

    state.uploads.remove(ImageKind::Gallery, &filename).await;
    tracing::info!("Gallery image deleted: {}", filename);

    (
        StatusCode::OK,
        Json(SuccessResponse::with_message("Image deleted")),
    )
        .into_response()
}
