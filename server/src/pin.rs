use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgPool;
use tracing::info;
use uuid::Uuid;

/// Reference to an image stored on the image host
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Image {
    /// The host's public id, needed to delete it again
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Comment {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub pin_id: Uuid,
    /// The commenting user
    #[sqlx(rename = "user_id")]
    pub user: Uuid,
    /// Commenter's name when the comment was written
    pub name: String,
    pub comment: String,
    #[serde(skip_serializing)]
    pub created_at_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pin {
    pub id: Uuid,
    pub title: String,
    /// The free-text body of the pin
    pub pin: String,
    pub owner: Uuid,
    pub image: Image,
    pub comments: Vec<Comment>,
    #[serde(rename = "createdAt")]
    pub created_at_utc: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at_utc: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct PinRow {
    id: Uuid,
    title: String,
    body: String,
    owner_id: Uuid,
    image_public_id: String,
    image_url: String,
    created_at_utc: DateTime<Utc>,
    updated_at_utc: DateTime<Utc>,
}

impl PinRow {
    fn into_pin(self, comments: Vec<Comment>) -> Pin {
        Pin {
            id: self.id,
            title: self.title,
            pin: self.body,
            owner: self.owner_id,
            image: Image {
                id: self.image_public_id,
                url: self.image_url,
            },
            comments,
            created_at_utc: self.created_at_utc,
            updated_at_utc: self.updated_at_utc,
        }
    }
}

const PIN_COLUMNS: &str =
    "id, title, body, owner_id, image_public_id, image_url, created_at_utc, updated_at_utc";

const COMMENT_COLUMNS: &str = "id, pin_id, user_id, name, comment, created_at_utc";

/// Fields for a pin that is about to be stored
pub struct NewPin<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub owner_id: Uuid,
    pub image: &'a Image,
}

impl Pin {
    pub async fn create(pool: &PgPool, new_pin: NewPin<'_>) -> color_eyre::Result<Pin> {
        let sql = format!(
            r#"
            INSERT INTO pins (title, body, owner_id, image_public_id, image_url)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {PIN_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, PinRow>(&sql)
            .bind(new_pin.title)
            .bind(new_pin.body)
            .bind(new_pin.owner_id)
            .bind(&new_pin.image.id)
            .bind(&new_pin.image.url)
            .fetch_one(pool)
            .await?;

        info!("Created pin {} for user {}", row.id, row.owner_id);

        Ok(row.into_pin(vec![]))
    }

    /// Every pin, newest first, each with its comments oldest first
    pub async fn all(pool: &PgPool) -> color_eyre::Result<Vec<Pin>> {
        let sql = format!("SELECT {PIN_COLUMNS} FROM pins ORDER BY created_at_utc DESC, id");
        let rows = sqlx::query_as::<_, PinRow>(&sql).fetch_all(pool).await?;

        let pin_ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE pin_id = ANY($1) ORDER BY created_at_utc, id"
        );
        let comments = sqlx::query_as::<_, Comment>(&sql)
            .bind(&pin_ids)
            .fetch_all(pool)
            .await?;

        let mut by_pin: HashMap<Uuid, Vec<Comment>> = HashMap::new();
        for comment in comments {
            by_pin.entry(comment.pin_id).or_default().push(comment);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let comments = by_pin.remove(&row.id).unwrap_or_default();
                row.into_pin(comments)
            })
            .collect())
    }

    pub async fn get_by_id(pool: &PgPool, pin_id: Uuid) -> color_eyre::Result<Option<Pin>> {
        let sql = format!("SELECT {PIN_COLUMNS} FROM pins WHERE id = $1");
        let Some(row) = sqlx::query_as::<_, PinRow>(&sql)
            .bind(pin_id)
            .fetch_optional(pool)
            .await?
        else {
            return Ok(None);
        };

        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE pin_id = $1 ORDER BY created_at_utc, id"
        );
        let comments = sqlx::query_as::<_, Comment>(&sql)
            .bind(pin_id)
            .fetch_all(pool)
            .await?;

        Ok(Some(row.into_pin(comments)))
    }

    /// Replace whichever of title/body are given and bump `updated_at_utc`
    pub async fn update(
        &mut self,
        pool: &PgPool,
        title: Option<&str>,
        body: Option<&str>,
    ) -> color_eyre::Result<()> {
        let updated_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            UPDATE pins
            SET title = COALESCE($1, title),
                body = COALESCE($2, body),
                updated_at_utc = NOW()
            WHERE id = $3
            RETURNING updated_at_utc
            "#,
        )
        .bind(title)
        .bind(body)
        .bind(self.id)
        .fetch_one(pool)
        .await?;

        if let Some(title) = title {
            self.title = title.to_string();
        }
        if let Some(body) = body {
            self.pin = body.to_string();
        }
        self.updated_at_utc = updated_at;

        info!("Updated pin {}", self.id);
        Ok(())
    }

    /// Delete the pin; its comments go with it
    pub async fn delete(self, pool: &PgPool) -> color_eyre::Result<()> {
        sqlx::query("DELETE FROM pins WHERE id = $1")
            .bind(self.id)
            .execute(pool)
            .await?;

        info!("Deleted pin {}", self.id);
        Ok(())
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.owner == user_id
    }
}

impl Comment {
    /// Append a comment to a pin. Returns `None` if the pin does not exist.
    pub async fn add(
        pool: &PgPool,
        pin_id: Uuid,
        user_id: Uuid,
        name: &str,
        text: &str,
    ) -> color_eyre::Result<Option<Comment>> {
        let sql = format!(
            r#"
            INSERT INTO comments (pin_id, user_id, name, comment)
            SELECT p.id, $2, $3, $4 FROM pins p WHERE p.id = $1
            RETURNING {COMMENT_COLUMNS}
            "#
        );

        let comment = sqlx::query_as::<_, Comment>(&sql)
            .bind(pin_id)
            .bind(user_id)
            .bind(name)
            .bind(text)
            .fetch_optional(pool)
            .await?;

        if let Some(comment) = &comment {
            info!("User {} commented {} on pin {}", user_id, comment.id, pin_id);
        }

        Ok(comment)
    }

    /// Remove a comment, but only the caller's own one on the given pin.
    /// Returns whether anything was removed.
    pub async fn delete_own(
        pool: &PgPool,
        pin_id: Uuid,
        comment_id: Uuid,
        user_id: Uuid,
    ) -> color_eyre::Result<bool> {
        let removed = sqlx::query(
            "DELETE FROM comments WHERE id = $1 AND pin_id = $2 AND user_id = $3",
        )
        .bind(comment_id)
        .bind(pin_id)
        .bind(user_id)
        .execute(pool)
        .await?
        .rows_affected();

        Ok(removed > 0)
    }
}
