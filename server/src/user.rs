use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgPool;
use tracing::info;
use uuid::Uuid;

/// Columns every user query selects. Followers and following are derived
/// from the `follows` table so both sides of an edge always agree.
const SELECT_USER: &str = r#"
    SELECT u.id, u.name, u.email, u.password_hash,
        ARRAY(
            SELECT f.follower_id FROM follows f
            WHERE f.followee_id = u.id
            ORDER BY f.created_at_utc
        ) AS followers,
        ARRAY(
            SELECT f.followee_id FROM follows f
            WHERE f.follower_id = u.id
            ORDER BY f.created_at_utc
        ) AS following,
        u.created_at_utc, u.updated_at_utc
    FROM users u
"#;

/// Represents a user in the system
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Users following this user
    pub followers: Vec<Uuid>,
    /// Users this user follows
    pub following: Vec<Uuid>,
    #[serde(rename = "createdAt")]
    pub created_at_utc: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at_utc: DateTime<Utc>,
}

/// What a follow toggle ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Followed,
    Unfollowed,
    /// The user to (un)follow does not exist
    TargetMissing,
}

/// Emails are compared case-insensitively, so store them in one form
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl User {
    /// Get a user by their ID
    pub async fn get_by_id(pool: &PgPool, user_id: Uuid) -> color_eyre::Result<Option<User>> {
        let sql = format!("{SELECT_USER} WHERE u.id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    /// Get a user by email (already normalized)
    pub async fn get_by_email(pool: &PgPool, email: &str) -> color_eyre::Result<Option<User>> {
        let sql = format!("{SELECT_USER} WHERE u.email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    /// Create a new user.
    ///
    /// Returns `None` when the email is already registered, including when a
    /// concurrent registration wins the race on the unique index.
    pub async fn create(
        pool: &PgPool,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> color_eyre::Result<Option<User>> {
        let inserted = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO users (name, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(pool)
        .await;

        let user_id = match inserted {
            Ok(id) => id,
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                info!("Registration for an already used email");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        info!("Created new user with ID: {}", user_id);

        Self::get_by_id(pool, user_id).await
    }

    /// Follow `target_id` if not already following it, otherwise unfollow.
    ///
    /// Runs in a single transaction, so a failure part way leaves the graph
    /// untouched. The follower's row is locked first, so toggles from the same
    /// follower are applied one at a time and each sees the previous result.
    pub async fn toggle_follow(
        pool: &PgPool,
        follower_id: Uuid,
        target_id: Uuid,
    ) -> color_eyre::Result<FollowOutcome> {
        let mut tx = pool.begin().await?;

        // NO KEY UPDATE and KEY SHARE don't conflict, so two users following
        // each other at the same moment can't deadlock
        sqlx::query("SELECT 1 FROM users WHERE id = $1 FOR NO KEY UPDATE")
            .bind(follower_id)
            .fetch_optional(&mut *tx)
            .await?;

        let target_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM users WHERE id = $1 FOR KEY SHARE)",
        )
        .bind(target_id)
        .fetch_one(&mut *tx)
        .await?;

        if !target_exists {
            tx.rollback().await?;
            return Ok(FollowOutcome::TargetMissing);
        }

        let removed = sqlx::query(
            "DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2",
        )
        .bind(follower_id)
        .bind(target_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let outcome = if removed > 0 {
            FollowOutcome::Unfollowed
        } else {
            sqlx::query(
                r#"
                INSERT INTO follows (follower_id, followee_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(follower_id)
            .bind(target_id)
            .execute(&mut *tx)
            .await?;

            FollowOutcome::Followed
        };

        tx.commit().await?;

        info!(%follower_id, %target_id, ?outcome, "Toggled follow");
        Ok(outcome)
    }
}
