// ==================== USER LIFECYCLE ====================
// Mirrors the identity provider's record into the users store. Creation is
// idempotent and tolerant of read-after-write races with the provider:
// concurrent creations are resolved through the unique clerk_id index.

use crate::database::MongoDB;
use crate::middleware::auth::Claims;
use crate::models::User;
use crate::utils::error::AppError;
use mongodb::bson::{doc, DateTime as BsonDateTime};
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Retries a transient-failure-prone operation with exponential backoff and
/// jitter. Bounded; the last error is returned after exhaustion.
pub async fn retry_operation<T, E, F, Fut>(
    mut operation: F,
    max_retries: u32,
    base_delay_ms: u64,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                log::warn!(
                    "⚠️  Operation attempt {}/{} failed: {}",
                    attempt,
                    max_retries,
                    e
                );
                if attempt >= max_retries {
                    return Err(e);
                }
                let jitter = rand::thread_rng().gen_range(0..1000);
                let delay = base_delay_ms * 2u64.pow(attempt - 1) + jitter;
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
        }
    }
}

fn is_duplicate_key_error(err: &mongodb::error::Error) -> bool {
    matches!(
        *err.kind,
        mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(ref we))
            if we.code == 11000
    )
}

/// Finds the local record for the identity, creating it when absent. If a
/// concurrent request wins the insert race, the winner's record is returned.
pub async fn ensure_user(db: &MongoDB, identity: &Claims) -> Result<(bool, User), AppError> {
    let users = db.collection::<User>("users");
    let clerk_id = identity.sub.clone();

    let existing = retry_operation(
        || {
            let users = users.clone();
            let clerk_id = clerk_id.clone();
            async move { users.find_one(doc! { "clerk_id": clerk_id }).await }
        },
        2,
        1000,
    )
    .await
    .map_err(|e| AppError::DatabaseError(format!("Failed to check existing user: {}", e)))?;

    if let Some(user) = existing {
        log::info!("👤 User already exists: {}", user.clerk_id);
        return Ok((false, user));
    }

    let now = BsonDateTime::now();
    let new_user = User {
        id: None,
        clerk_id: clerk_id.clone(),
        email: identity.email.clone(),
        name: identity.name.clone(),
        image: identity.image.clone(),
        email_verified: if identity.email_verified {
            Some(now)
        } else {
            None
        },
        is_active: true,
        last_login: None,
        liked_tools: vec![],
        saved_tools: vec![],
        folders: vec![],
        is_subscribed: false,
        plan_amount: 0,
        payment_history: vec![],
        created_at: Some(now),
        updated_at: Some(now),
    };

    let insert_result = retry_operation(
        || {
            let users = users.clone();
            let new_user = new_user.clone();
            async move { users.insert_one(new_user).await }
        },
        2,
        1000,
    )
    .await;

    match insert_result {
        Ok(_) => {
            log::info!("✅ User created: {}", clerk_id);
            Ok((true, new_user))
        }
        Err(e) if is_duplicate_key_error(&e) => {
            // Another concurrent request won the race; return its record
            log::info!("👥 Duplicate key on user create, fetching winner: {}", clerk_id);
            let user = users
                .find_one(doc! { "clerk_id": &clerk_id })
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?
                .ok_or_else(|| AppError::NotFound("User".to_string()))?;
            Ok((false, user))
        }
        Err(e) => Err(AppError::DatabaseError(format!(
            "Failed to create user: {}",
            e
        ))),
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum LoginTracking {
    Updated,
    /// The identity provider redirect arrived before local creation finished.
    /// Callers surface this as 202 Accepted so the client retries later.
    UserNotFoundYet,
}

/// Best-effort activity tracking; stamps last_login for an existing user
pub async fn record_login(db: &MongoDB, clerk_id: &str) -> Result<LoginTracking, AppError> {
    let users = db.collection::<User>("users");

    let result = users
        .update_one(
            doc! { "clerk_id": clerk_id },
            doc! { "$set": { "last_login": BsonDateTime::now(), "updated_at": BsonDateTime::now() } },
        )
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

    if result.matched_count == 0 {
        log::info!(
            "⏳ Activity update skipped, user {} not in database yet",
            clerk_id
        );
        return Ok(LoginTracking::UserNotFoundYet);
    }

    Ok(LoginTracking::Updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<u32, String> = retry_operation(
            move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(format!("transient failure {}", n))
                    } else {
                        Ok(n)
                    }
                }
            },
            3,
            1,
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausts_and_returns_last_error() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<(), String> = retry_operation(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("still down".to_string())
                }
            },
            3,
            1,
        )
        .await;

        assert_eq!(result.unwrap_err(), "still down");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_returns_first_success_immediately() {
        let result: Result<&str, String> =
            retry_operation(|| async { Ok("ok") }, 3, 1).await;
        assert_eq!(result.unwrap(), "ok");
    }
}
