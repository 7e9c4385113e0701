/**
 * Blog Routes
 * CRUD API endpoints for blog posts
 */
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::{is_valid_status, BlogPost, STATUS_DRAFT, STATUS_PUBLISHED};
use crate::routes::auth::{require_db, require_session};
use crate::routes::ErrorResponse;
use crate::slug::{slugify, unique_slug};
use crate::state::AppState;
use crate::uploads::{ImageKind, UploadError, UploadStore, PLACEHOLDER_FILENAME};

const MAX_EXCERPT_LEN: usize = 500;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for GET /api/blogs (list)
#[derive(Debug, Deserialize)]
pub struct BlogListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

/// Query parameters for GET /api/blogs/recommended
#[derive(Debug, Deserialize)]
pub struct RecommendedQuery {
    pub exclude: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

/// Query parameters for GET /api/blogs/latest
#[derive(Debug, Deserialize)]
pub struct LatestQuery {
    #[serde(default = "default_latest_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    10
}

fn default_latest_limit() -> i64 {
    3
}

/// Response for GET /api/blogs (list)
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogListResponse {
    pub posts: Vec<BlogPost>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}

/// Response for the published-only list endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct PostsResponse {
    pub posts: Vec<BlogPost>,
}

/// Response for DELETE /api/blogs/{id}; echoes the title for
/// confirmation messaging.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeletePostResponse {
    pub success: bool,
    pub title: String,
}

// ============================================================================
// Validation
// ============================================================================

lazy_static::lazy_static! {
    /// Valid slug pattern: lowercase letters, numbers, and hyphens
    static ref SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap();
}

fn is_valid_slug(slug: &str) -> bool {
    SLUG_REGEX.is_match(slug)
}

/// Sanitize HTML content using ammonia
fn sanitize_html(html: &str) -> String {
    ammonia::clean(html)
}

/// Clamp pagination to sane bounds; returns (page, limit, offset).
/// The page cap keeps `(page - 1) * limit` inside i64 for any input.
pub(crate) fn clamp_pagination(page: i64, limit: i64) -> (i64, i64, i64) {
    let limit = limit.clamp(1, 100);
    let page = page.clamp(1, i64::MAX / limit);
    (page, limit, (page - 1) * limit)
}

fn invalid_slug_response() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::with_message(
            "Invalid slug",
            "Slug must contain only lowercase letters, numbers, and hyphens",
        )),
    )
        .into_response()
}

/// Map upload pipeline failures to the API taxonomy.
pub(crate) fn upload_error_response(e: &UploadError) -> Response {
    let (status, message) = match e {
        UploadError::TooLarge { .. } => (
            StatusCode::PAYLOAD_TOO_LARGE,
            "File too large. Maximum size is 5MB.",
        ),
        UploadError::UnsupportedType => (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Unsupported file type. Allowed: JPEG, PNG, WebP, GIF.",
        ),
        UploadError::Empty => (StatusCode::BAD_REQUEST, "Empty file"),
        UploadError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Failed to save file"),
    };
    if let UploadError::Io(io) = e {
        tracing::error!("Upload I/O failure: {}", io);
    }
    (status, Json(ErrorResponse::new(message))).into_response()
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    let msg = e.to_string();
    msg.contains("duplicate key") || msg.contains("unique constraint")
}

// ============================================================================
// Multipart form
// ============================================================================

/// Fields accepted by create/update. Text fields absent from the form stay
/// `None`; the image file is carried with its client-side name (used only
/// for extension validation, never as the storage key).
#[derive(Debug, Default)]
struct BlogForm {
    title: Option<String>,
    excerpt: Option<String>,
    content: Option<String>,
    author: Option<String>,
    category: Option<String>,
    tags: Option<Vec<String>>,
    slug: Option<String>,
    status: Option<String>,
    remove_image: bool,
    image: Option<(String, Vec<u8>)>,
}

async fn read_blog_form(
    multipart: &mut Multipart,
) -> Result<BlogForm, (StatusCode, Json<ErrorResponse>)> {
    let mut form = BlogForm::default();

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
            _ => {
                let value = field.text().await.map_err(|e| {
                    tracing::error!("Failed to read form field {}: {}", name, e);
                    (
                        StatusCode::BAD_REQUEST,
                        Json(ErrorResponse::new("Invalid multipart data")),
                    )
                })?;
                match name.as_str() {
                    "title" => form.title = Some(value),
                    "excerpt" => form.excerpt = Some(value),
                    "content" => form.content = Some(value),
                    "author" => form.author = Some(value),
                    "category" => form.category = Some(value),
                    "slug" => form.slug = Some(value),
                    "status" => form.status = Some(value),
                    "removeImage" => form.remove_image = value == "true",
                    "tags" => {
                        form.tags = Some(
                            value
                                .split(',')
                                .map(|t| t.trim().to_string())
                                .filter(|t| !t.is_empty())
                                .collect(),
                        )
                    }
                    _ => {
                        // Unknown fields are rejected at the boundary.
                        return Err((
                            StatusCode::BAD_REQUEST,
                            Json(ErrorResponse::with_message(
                                "Unknown form field",
                                name,
                            )),
                        ));
                    }
                }
            }
        }
    }

    Ok(form)
}

/// Validate the optional status/excerpt fields shared by create and update.
fn validate_form(form: &BlogForm) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    if let Some(status) = &form.status {
        if !is_valid_status(status) {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::with_message(
                    "Invalid status",
                    format!("Status must be {} or {}", STATUS_DRAFT, STATUS_PUBLISHED),
                )),
            ));
        }
    }
    if let Some(excerpt) = &form.excerpt {
        if excerpt.chars().count() > MAX_EXCERPT_LEN {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Excerpt must be 500 characters or less")),
            ));
        }
    }
    Ok(())
}

const POST_COLUMNS: &str = "id, slug, title, excerpt, content, author, category, tags, \
     status, main_image_url, created_at, updated_at";

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/blogs/create - Create a post (multipart, session required)
pub async fn create_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    if let Err(e) = require_session(&state, &headers) {
        return e.into_response();
    }

    let form = match read_blog_form(&mut multipart).await {
        Ok(form) => form,
        Err(e) => return e.into_response(),
    };

    let (title, content, author) = match (&form.title, &form.content, &form.author) {
        (Some(t), Some(c), Some(a))
            if !t.trim().is_empty() && !c.trim().is_empty() && !a.trim().is_empty() =>
        {
            (t.clone(), c.clone(), a.clone())
        }
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Title, content, and author are required")),
            )
                .into_response();
        }
    };

    if let Err(e) = validate_form(&form) {
        return e.into_response();
    }

    let pool = match require_db(&state) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    // Explicit slug wins over the title-derived one; both go through the
    // uniqueness loop.
    let candidate = form.slug.as_deref().unwrap_or(&title);
    let slug = match unique_slug(pool, candidate).await {
        Ok(slug) => slug,
        Err(e) => {
            tracing::error!("Database error generating slug: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error")),
            )
                .into_response();
        }
    };

    // Store the image before the record so the record never references a
    // missing file. Posts without an upload reference the shared
    // placeholder.
    let stored_image = match &form.image {
        Some((original_name, bytes)) => {
            match state.uploads.save(ImageKind::Blog, original_name, bytes).await {
                Ok(stored) => Some(stored),
                Err(e) => return upload_error_response(&e),
            }
        }
        None => None,
    };
    let main_image_url = stored_image
        .as_ref()
        .map(|s| s.url.clone())
        .unwrap_or_else(|| UploadStore::public_url(ImageKind::Blog, PLACEHOLDER_FILENAME));

    let status = form.status.unwrap_or_else(|| STATUS_DRAFT.to_string());
    let content = sanitize_html(&content);
    let tags = form.tags.unwrap_or_default();

    match sqlx::query_as::<_, BlogPost>(&format!(
        r#"
        INSERT INTO blog_posts
            (slug, title, excerpt, content, author, category, tags, status, main_image_url)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {}
        "#,
        POST_COLUMNS
    ))
    .bind(&slug)
    .bind(&title)
    .bind(&form.excerpt)
    .bind(&content)
    .bind(&author)
    .bind(&form.category)
    .bind(&tags)
    .bind(&status)
    .bind(&main_image_url)
    .fetch_one(pool)
    .await
    {
        Ok(post) => (StatusCode::CREATED, Json(post)).into_response(),
        Err(e) => {
            // Lost the slug race or other failure: don't leave the file
            // we just wrote behind.
            if let Some(stored) = &stored_image {
                state.uploads.remove(ImageKind::Blog, &stored.filename).await;
            }
            if is_unique_violation(&e) {
                return (
                    StatusCode::CONFLICT,
                    Json(ErrorResponse::new("Slug already exists")),
                )
                    .into_response();
            }
            tracing::error!("Database error creating blog post: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to create post")),
            )
                .into_response()
        }
    }
}

/// GET /api/blogs - Paginated list, newest first, any status
pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<BlogListQuery>,
) -> Response {
    let pool = match require_db(&state) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let (page, limit, offset) = clamp_pagination(query.page, query.limit);

    let posts = match sqlx::query_as::<_, BlogPost>(&format!(
        "SELECT {} FROM blog_posts ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        POST_COLUMNS
    ))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    {
        Ok(posts) => posts,
        Err(e) => {
            tracing::error!("Database error listing blog posts: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error")),
            )
                .into_response();
        }
    };

    let total: (i64,) = match sqlx::query_as("SELECT COUNT(*) FROM blog_posts")
        .fetch_one(pool)
        .await
    {
        Ok(total) => total,
        Err(e) => {
            tracing::error!("Database error counting blog posts: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error")),
            )
                .into_response();
        }
    };

    (
        StatusCode::OK,
        Json(BlogListResponse {
            posts,
            page,
            limit,
            total: total.0,
        }),
    )
        .into_response()
}

/// GET /api/blogs/{slug} - Single post by slug
pub async fn get_post(State(state): State<AppState>, Path(slug): Path<String>) -> Response {
    if !is_valid_slug(&slug) {
        return invalid_slug_response();
    }

    let pool = match require_db(&state) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match sqlx::query_as::<_, BlogPost>(&format!(
        "SELECT {} FROM blog_posts WHERE slug = $1",
        POST_COLUMNS
    ))
    .bind(&slug)
    .fetch_optional(pool)
    .await
    {
        Ok(Some(post)) => (StatusCode::OK, Json(post)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("Not found")),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error fetching blog post: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error")),
            )
                .into_response()
        }
    }
}

/// GET /api/blogs/recommended - Published posts excluding one slug
pub async fn recommended_posts(
    State(state): State<AppState>,
    Query(query): Query<RecommendedQuery>,
) -> Response {
    let pool = match require_db(&state) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let limit = query.limit.clamp(1, 100);
    let exclude = query.exclude.unwrap_or_default();

    match sqlx::query_as::<_, BlogPost>(&format!(
        r#"
        SELECT {} FROM blog_posts
        WHERE status = $1 AND slug <> $2
        ORDER BY created_at DESC
        LIMIT $3
        "#,
        POST_COLUMNS
    ))
    .bind(STATUS_PUBLISHED)
    .bind(&exclude)
    .bind(limit)
    .fetch_all(pool)
    .await
    {
        Ok(posts) => (StatusCode::OK, Json(PostsResponse { posts })).into_response(),
        Err(e) => {
            tracing::error!("Database error listing recommended posts: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error")),
            )
                .into_response()
        }
    }
}

/// GET /api/blogs/latest - Most recent published posts
pub async fn latest_posts(
    State(state): State<AppState>,
    Query(query): Query<LatestQuery>,
) -> Response {
    let pool = match require_db(&state) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let limit = query.limit.clamp(1, 100);

    match sqlx::query_as::<_, BlogPost>(&format!(
        r#"
        SELECT {} FROM blog_posts
        WHERE status = $1
        ORDER BY created_at DESC
        LIMIT $2
        "#,
        POST_COLUMNS
    ))
    .bind(STATUS_PUBLISHED)
    .bind(limit)
    .fetch_all(pool)
    .await
    {
        Ok(posts) => (StatusCode::OK, Json(PostsResponse { posts })).into_response(),
        Err(e) => {
            tracing::error!("Database error listing latest posts: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error")),
            )
                .into_response()
        }
    }
}

/// PATCH /api/blogs/{slug} - Partial update (multipart, session required)
///
/// Image semantics: a new file replaces the old one (old file deleted after
/// the record is updated); `removeImage=true` clears the field and deletes
/// the old file; omitting both leaves the image untouched. The shared
/// placeholder is never deleted.
pub async fn update_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
    mut multipart: Multipart,
) -> Response {
    if let Err(e) = require_session(&state, &headers) {
        return e.into_response();
    }

    if !is_valid_slug(&slug) {
        return invalid_slug_response();
    }

    let form = match read_blog_form(&mut multipart).await {
        Ok(form) => form,
        Err(e) => return e.into_response(),
    };

    if let Err(e) = validate_form(&form) {
        return e.into_response();
    }

    let pool = match require_db(&state) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let existing = match sqlx::query_as::<_, BlogPost>(&format!(
        "SELECT {} FROM blog_posts WHERE slug = $1",
        POST_COLUMNS
    ))
    .bind(&slug)
    .fetch_optional(pool)
    .await
    {
        Ok(Some(post)) => post,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new("Not found")),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("Database error fetching blog post: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error")),
            )
                .into_response();
        }
    };

    // Slug only changes when explicitly supplied with a different value.
    let new_slug = match &form.slug {
        Some(requested) if slugify(requested) != existing.slug => {
            match unique_slug(pool, requested).await {
                Ok(slug) => slug,
                Err(e) => {
                    tracing::error!("Database error generating slug: {}", e);
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(ErrorResponse::new("Database error")),
                    )
                        .into_response();
                }
            }
        }
        _ => existing.slug.clone(),
    };

    // Store the replacement image before touching the record; the old file
    // is only removed after the record points at the new one.
    let new_image = match &form.image {
        Some((original_name, bytes)) => {
            match state.uploads.save(ImageKind::Blog, original_name, bytes).await {
                Ok(stored) => Some(stored),
                Err(e) => return upload_error_response(&e),
            }
        }
        None => None,
    };

    let main_image_url: Option<String> = if let Some(stored) = &new_image {
        Some(stored.url.clone())
    } else if form.remove_image {
        None
    } else {
        existing.main_image_url.clone()
    };

    let title = form.title.unwrap_or(existing.title);
    let excerpt = form.excerpt.or(existing.excerpt);
    let content = form
        .content
        .map(|c| sanitize_html(&c))
        .unwrap_or(existing.content);
    let author = form.author.unwrap_or(existing.author);
    let category = form.category.or(existing.category);
    let tags = form.tags.unwrap_or(existing.tags);
    let status = form.status.unwrap_or(existing.status);

    match sqlx::query_as::<_, BlogPost>(&format!(
        r#"
        UPDATE blog_posts
        SET slug = $1, title = $2, excerpt = $3, content = $4, author = $5,
            category = $6, tags = $7, status = $8, main_image_url = $9,
            updated_at = now()
        WHERE id = $10
        RETURNING {}
        "#,
        POST_COLUMNS
    ))
    .bind(&new_slug)
    .bind(&title)
    .bind(&excerpt)
    .bind(&content)
    .bind(&author)
    .bind(&category)
    .bind(&tags)
    .bind(&status)
    .bind(&main_image_url)
    .bind(existing.id)
    .fetch_one(pool)
    .await
    {
        Ok(post) => {
            // Record committed; clean up the superseded file (placeholder
            // is guarded inside the store).
            let image_changed = new_image.is_some() || form.remove_image;
            if image_changed {
                if let Some(old_url) = &existing.main_image_url {
                    if Some(old_url) != main_image_url.as_ref() {
                        state.uploads.remove_by_url(old_url).await;
                    }
                }
            }
            (StatusCode::OK, Json(post)).into_response()
        }
        Err(e) => {
            if let Some(stored) = &new_image {
                state.uploads.remove(ImageKind::Blog, &stored.filename).await;
            }
            if is_unique_violation(&e) {
                return (
                    StatusCode::CONFLICT,
                    Json(ErrorResponse::new("Slug already exists")),
                )
                    .into_response();
            }
            tracing::error!("Database error updating blog post: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to update post")),
            )
                .into_response()
        }
    }
}

/// DELETE /api/blogs/{id} - Delete a post and its image (session required)
pub async fn delete_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(e) = require_session(&state, &headers) {
        return e.into_response();
    }

    let post_id = match Uuid::parse_str(&id) {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Invalid post id")),
            )
                .into_response();
        }
    };

    let pool = match require_db(&state) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let post = match sqlx::query_as::<_, (String, Option<String>)>(
        "SELECT title, main_image_url FROM blog_posts WHERE id = $1",
    )
    .bind(post_id)
    .fetch_optional(pool)
    .await
    {
        Ok(Some(row)) => row,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new("Not found")),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("Database error fetching blog post: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error")),
            )
                .into_response();
        }
    };
    let (title, main_image_url) = post;

    // Cascade to the stored file first (best-effort, placeholder guarded).
    if let Some(url) = &main_image_url {
        state.uploads.remove_by_url(url).await;
    }

    match sqlx::query("DELETE FROM blog_posts WHERE id = $1")
        .bind(post_id)
        .execute(pool)
        .await
    {
        Ok(_) => {
            tracing::info!("Blog post deleted: {}", title);
            (
                StatusCode::OK,
                Json(DeletePostResponse {
                    success: true,
                    title,
                }),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("Database error deleting blog post: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to delete post")),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::ROLE_ADMIN;
    use crate::routes::auth::{create_session_token, SESSION_COOKIE};
    use axum::body::Body;
    use axum::http::{header, Request};
    use axum::routing::{get, post};
    use axum::Router;
    use tower::ServiceExt;

    const BOUNDARY: &str = "test-boundary";

    fn blog_router(state: AppState) -> Router {
        Router::new()
            .route("/api/blogs/create", post(create_post))
            .route("/api/blogs", get(list_posts))
            .route("/api/blogs/recommended", get(recommended_posts))
            .route("/api/blogs/latest", get(latest_posts))
            .route(
                "/api/blogs/{slug}",
                get(get_post).patch(update_post).delete(delete_post),
            )
            .with_state(state)
    }

    fn session_cookie_for(state: &AppState) -> String {
        let token =
            create_session_token(&state.session_secret, &Uuid::new_v4(), ROLE_ADMIN).unwrap();
        format!("{}={}", SESSION_COOKIE, token)
    }

    fn multipart_body(fields: &[(&str, &str)]) -> String {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            ));
        }
        body.push_str(&format!("--{}--\r\n", BOUNDARY));
        body
    }

    fn multipart_request(
        method: &str,
        uri: &str,
        cookie: Option<&str>,
        fields: &[(&str, &str)],
    ) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri).header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(multipart_body(fields))).unwrap()
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, axum::body::Bytes) {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes)
    }

    #[test]
    fn test_slug_pattern() {
        assert!(is_valid_slug("harvest-season-2026"));
        assert!(is_valid_slug("a"));
        assert!(!is_valid_slug("Has-Caps"));
        assert!(!is_valid_slug("-leading"));
        assert!(!is_valid_slug("trailing-"));
        assert!(!is_valid_slug("double--hyphen"));
        assert!(!is_valid_slug(""));
    }

    #[test]
    fn test_clamp_pagination() {
        assert_eq!(clamp_pagination(1, 10), (1, 10, 0));
        assert_eq!(clamp_pagination(3, 10), (3, 10, 20));
        assert_eq!(clamp_pagination(0, 0), (1, 1, 0));
        assert_eq!(clamp_pagination(-5, 500), (1, 100, 0));
    }

    #[test]
    fn test_clamp_pagination_extreme_page_does_not_overflow() {
        let (page, limit, offset) = clamp_pagination(i64::MAX, 10);
        assert_eq!(limit, 10);
        assert_eq!(page, i64::MAX / 10);
        assert_eq!(offset, (page - 1) * limit);
        assert!(offset > 0);

        let (_, _, offset) = clamp_pagination(i64::MAX, i64::MAX);
        assert_eq!(offset, (i64::MAX / 100 - 1) * 100);
    }

    #[test]
    fn test_sanitize_html_strips_scripts() {
        let dirty = "<p>fine</p><script>alert(1)</script>";
        let clean = sanitize_html(dirty);
        assert!(clean.contains("<p>fine</p>"));
        assert!(!clean.contains("script"));
    }

    #[tokio::test]
    async fn test_create_without_session_returns_unauthorized() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::for_tests(dir.path());
        let req = multipart_request(
            "POST",
            "/api/blogs/create",
            None,
            &[("title", "A"), ("content", "B"), ("author", "C")],
        );
        let (status, _) = send(blog_router(state), req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_create_missing_required_fields_returns_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::for_tests(dir.path());
        let cookie = session_cookie_for(&state);
        let req = multipart_request(
            "POST",
            "/api/blogs/create",
            Some(&cookie),
            &[("title", "Only a title")],
        );
        let (status, _) = send(blog_router(state), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_status() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::for_tests(dir.path());
        let cookie = session_cookie_for(&state);
        let req = multipart_request(
            "POST",
            "/api/blogs/create",
            Some(&cookie),
            &[
                ("title", "A"),
                ("content", "B"),
                ("author", "C"),
                ("status", "archived"),
            ],
        );
        let (status, _) = send(blog_router(state), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_rejects_oversized_excerpt() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::for_tests(dir.path());
        let cookie = session_cookie_for(&state);
        let long_excerpt = "x".repeat(501);
        let req = multipart_request(
            "POST",
            "/api/blogs/create",
            Some(&cookie),
            &[
                ("title", "A"),
                ("content", "B"),
                ("author", "C"),
                ("excerpt", &long_excerpt),
            ],
        );
        let (status, _) = send(blog_router(state), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_form_field() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::for_tests(dir.path());
        let cookie = session_cookie_for(&state);
        let req = multipart_request(
            "POST",
            "/api/blogs/create",
            Some(&cookie),
            &[("title", "A"), ("surprise", "field")],
        );
        let (status, _) = send(blog_router(state), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_valid_without_database_returns_service_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::for_tests(dir.path());
        let cookie = session_cookie_for(&state);
        let req = multipart_request(
            "POST",
            "/api/blogs/create",
            Some(&cookie),
            &[("title", "A"), ("content", "B"), ("author", "C")],
        );
        let (status, _) = send(blog_router(state), req).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_get_post_invalid_slug_returns_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::for_tests(dir.path());
        let req = Request::get("/api/blogs/Not%20A%20Slug")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(blog_router(state), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_without_database_returns_service_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::for_tests(dir.path());
        let req = Request::get("/api/blogs?page=1&limit=10")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(blog_router(state), req).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_update_without_session_returns_unauthorized() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::for_tests(dir.path());
        let req = multipart_request(
            "PATCH",
            "/api/blogs/some-post",
            None,
            &[("title", "New title")],
        );
        let (status, _) = send(blog_router(state), req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    async fn latest_contains(state: &AppState, slug: &str) -> bool {
        let req = Request::get("/api/blogs/latest?limit=100")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(blog_router(state.clone()), req).await;
        assert_eq!(status, StatusCode::OK);
        let res: PostsResponse = serde_json::from_slice(&body).unwrap();
        res.posts.iter().any(|p| p.slug == slug)
    }

    // Needs DATABASE_URL; skips otherwise.
    #[tokio::test]
    async fn test_publish_round_trip_reflected_in_latest() {
        let Some(pool) = crate::db::test_support::pool_from_env().await else {
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::for_tests_with_db(pool.clone(), dir.path());
        let slug = format!("round-trip-{}", Uuid::new_v4());

        sqlx::query(
            "INSERT INTO blog_posts (slug, title, content, author, status) \
             VALUES ($1, $1, 'c', 'a', 'draft')",
        )
        .bind(&slug)
        .execute(&pool)
        .await
        .unwrap();

        // Drafts resolve by slug but stay out of the published feed.
        let req = Request::get(format!("/api/blogs/{}", slug))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(blog_router(state.clone()), req).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!latest_contains(&state, &slug).await);

        sqlx::query("UPDATE blog_posts SET status = 'published' WHERE slug = $1")
            .bind(&slug)
            .execute(&pool)
            .await
            .unwrap();
        assert!(latest_contains(&state, &slug).await);

        sqlx::query("UPDATE blog_posts SET status = 'draft' WHERE slug = $1")
            .bind(&slug)
            .execute(&pool)
            .await
            .unwrap();
        assert!(!latest_contains(&state, &slug).await);

        sqlx::query("DELETE FROM blog_posts WHERE slug = $1")
            .bind(&slug)
            .execute(&pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_invalid_id_returns_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::for_tests(dir.path());
        let cookie = session_cookie_for(&state);
        let req = Request::delete("/api/blogs/not-a-uuid")
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(blog_router(state), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
