//! Database Models - structs representing database tables (used by sqlx/serde).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Post status values stored in `blog_posts.status`.
pub const STATUS_DRAFT: &str = "draft";
pub const STATUS_PUBLISHED: &str = "published";

/// Returns true for the two recognised publication states.
pub fn is_valid_status(status: &str) -> bool {
    status == STATUS_DRAFT || status == STATUS_PUBLISHED
}

/// User roles stored in `users.role`.
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_OWNER: &str = "owner";

/// Admin/owner account. Token fields and the password hash never leave the
/// server; serde skips them so handlers can return the row directly.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub role: String,
    pub is_verified: bool,
    #[serde(skip_serializing)]
    pub verification_token: Option<String>,
    #[serde(skip_serializing)]
    pub verification_token_expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub reset_password_token: Option<String>,
    #[serde(skip_serializing)]
    pub reset_password_expires_at: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub invited_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Blog post model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogPost {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub author: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub status: String,
    pub main_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Gallery image record. Every record corresponds to a file on disk under
/// the gallery upload directory; `filename` is server-generated.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryImage {
    pub id: Uuid,
    pub filename: String,
    pub url: String,
    pub alt: String,
    pub category: String,
    pub size: i64,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_validation_accepts_known_values() {
        assert!(is_valid_status("draft"));
        assert!(is_valid_status("published"));
        assert!(!is_valid_status("archived"));
        assert!(!is_valid_status("Published"));
        assert!(!is_valid_status(""));
    }

    #[test]
    fn test_user_serialization_strips_secrets() {
        let user = User {
            id: Uuid::new_v4(),
            email: "owner@example.com".to_string(),
            password_hash: "$2b$12$secret".to_string(),
            name: "Owner".to_string(),
            role: ROLE_OWNER.to_string(),
            is_verified: true,
            verification_token: Some("123456".to_string()),
            verification_token_expires_at: None,
            reset_password_token: None,
            reset_password_expires_at: None,
            last_login: None,
            invited_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret"));
        assert!(!json.contains("123456"));
        assert!(json.contains("owner@example.com"));
    }
}
