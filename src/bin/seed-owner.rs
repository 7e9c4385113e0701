//! One-off CLI that seeds (or resets) the owner account. The owner cannot
//! be created through the API: invitations require an existing owner
//! session, so the first account has to come from here.
//!
//! Usage: cargo run --bin seed-owner <EMAIL> <PASSWORD> <NAME>

use bcrypt::{hash, DEFAULT_COST};
use std::env;

use altiplano_backend::db;
use altiplano_backend::db::models::ROLE_OWNER;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let mut args = env::args().skip(1);
    let (email, password, name) = match (args.next(), args.next(), args.next()) {
        (Some(email), Some(password), Some(name)) => (email, password, name),
        _ => {
            eprintln!("Usage: cargo run --bin seed-owner <EMAIL> <PASSWORD> <NAME>");
            std::process::exit(1);
        }
    };

    if password.len() < 8 {
        eprintln!("Password must be at least 8 characters");
        std::process::exit(1);
    }

    let pool = match db::init_pool(None).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = db::run_migrations(&pool).await {
        eprintln!("Failed to run migrations: {}", e);
        std::process::exit(1);
    }

    let password_hash = match hash(&password, DEFAULT_COST) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("Error hashing password: {}", e);
            std::process::exit(1);
        }
    };

    // Upsert so re-running refreshes the owner credentials instead of
    // failing on the unique email.
    let result = sqlx::query(
        r#"
        INSERT INTO users (email, password_hash, name, role, is_verified)
        VALUES (LOWER($1), $2, $3, $4, TRUE)
        ON CONFLICT (email) DO UPDATE
        SET password_hash = EXCLUDED.password_hash,
            name = EXCLUDED.name,
            role = EXCLUDED.role,
            is_verified = TRUE,
            updated_at = now()
        "#,
    )
    .bind(&email)
    .bind(&password_hash)
    .bind(&name)
    .bind(ROLE_OWNER)
    .execute(&pool)
    .await;

    match result {
        Ok(_) => {
            println!("Owner account ready: {} <{}>", name, email.to_lowercase());
        }
        Err(e) => {
            eprintln!("Failed to seed owner: {}", e);
            std::process::exit(1);
        }
    }
}
