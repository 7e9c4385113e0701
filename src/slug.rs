//! Slug generation for blog posts.
//!
//! A slug is derived from the post title (or an explicitly supplied
//! candidate), normalized to lowercase hyphen-separated tokens, then made
//! unique against `blog_posts.slug` by appending `-1`, `-2`, ... until an
//! unused value is found. The check-then-insert sequence is not
//! transactional; the unique index on the column is the backstop and a
//! duplicate-key failure at insert time is surfaced to callers as a
//! retryable conflict.

use sqlx::PgPool;

/// Fallback slug for inputs that normalize to nothing (e.g. all punctuation).
const EMPTY_SLUG_FALLBACK: &str = "post";

/// Normalize an arbitrary string into a URL-safe, lowercase slug.
/// Punctuation is stripped; whitespace, underscores, and existing hyphen
/// runs collapse to a single hyphen; non-ASCII letters are dropped.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_hyphen = false;

    for c in input.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else if c.is_whitespace() || c == '-' || c == '_' {
            pending_hyphen = true;
        }
        // Everything else (punctuation, non-ASCII symbols) is stripped.
    }

    if slug.is_empty() {
        EMPTY_SLUG_FALLBACK.to_string()
    } else {
        slug
    }
}

/// Candidate for the nth collision-resolution attempt: the base slug
/// itself, then `base-1`, `base-2`, ...
fn nth_candidate(base: &str, n: u32) -> String {
    if n == 0 {
        base.to_string()
    } else {
        format!("{}-{}", base, n)
    }
}

/// Produce a slug unique across all posts by consulting the store.
/// Always yields a usable slug; the only error path is store connectivity,
/// which the caller maps to service-unavailable.
pub async fn unique_slug(pool: &PgPool, candidate: &str) -> Result<String, sqlx::Error> {
    let base = slugify(candidate);

    let mut n = 0u32;
    loop {
        let slug = nth_candidate(&base, n);
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM blog_posts WHERE slug = $1)")
                .bind(&slug)
                .fetch_one(pool)
                .await?;
        if !exists {
            return Ok(slug);
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_lowercases_and_hyphenates() {
        assert_eq!(slugify("Harvest Season 2026"), "harvest-season-2026");
        assert_eq!(slugify("Single Origin"), "single-origin");
    }

    #[test]
    fn test_slugify_strips_punctuation() {
        assert_eq!(slugify("Coffee, Altitude & Flavor!"), "coffee-altitude-flavor");
        assert_eq!(slugify("What's brewing?"), "whats-brewing");
    }

    #[test]
    fn test_slugify_collapses_whitespace_and_hyphen_runs() {
        assert_eq!(slugify("a  --  b"), "a-b");
        assert_eq!(slugify("  trimmed  "), "trimmed");
        assert_eq!(slugify("under_score"), "under-score");
    }

    #[test]
    fn test_slugify_idempotent_on_valid_slug() {
        assert_eq!(slugify("already-a-slug"), "already-a-slug");
    }

    #[test]
    fn test_slugify_empty_input_falls_back() {
        assert_eq!(slugify(""), "post");
        assert_eq!(slugify("!!!"), "post");
        assert_eq!(slugify("¿¡?"), "post");
    }

    #[test]
    fn test_nth_candidate_suffixes() {
        assert_eq!(nth_candidate("beans", 0), "beans");
        assert_eq!(nth_candidate("beans", 1), "beans-1");
        assert_eq!(nth_candidate("beans", 12), "beans-12");
    }

    async fn insert_post(pool: &PgPool, slug: &str) {
        sqlx::query(
            "INSERT INTO blog_posts (slug, title, content, author) VALUES ($1, $1, 'c', 'a')",
        )
        .bind(slug)
        .execute(pool)
        .await
        .unwrap();
    }

    // Needs DATABASE_URL; skips otherwise.
    #[tokio::test]
    async fn test_unique_slug_appends_numeric_suffix_on_collision() {
        let Some(pool) = crate::db::test_support::pool_from_env().await else {
            return;
        };
        let base = format!("slug-collision-{}", uuid::Uuid::new_v4());

        let free = unique_slug(&pool, &base).await.unwrap();
        assert_eq!(free, base);

        insert_post(&pool, &base).await;
        let first = unique_slug(&pool, &base).await.unwrap();
        assert_eq!(first, format!("{}-1", base));

        insert_post(&pool, &first).await;
        let second = unique_slug(&pool, &base).await.unwrap();
        assert_eq!(second, format!("{}-2", base));

        sqlx::query("DELETE FROM blog_posts WHERE slug LIKE $1")
            .bind(format!("{}%", base))
            .execute(&pool)
            .await
            .unwrap();
    }
}
