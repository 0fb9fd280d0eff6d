//! Forum CRUD operations

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::ranking::{FeedPost, FeedSort};
use crate::storage::{parse_timestamp, timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subforum {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

const POST_SELECT: &str = "
SELECT p.id, p.subforum_id, p.author_id, p.title, p.body, p.created_at,
       COALESCE((SELECT SUM(v.value) FROM votes v WHERE v.post_id = p.id), 0) AS score,
       (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count
FROM posts p";

/// Store for subforums, posts, votes and comments
pub struct ForumStore<'a> {
    conn: &'a Connection,
}

impl<'a> ForumStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn create_subforum(&self, slug: &str, name: &str, description: &str) -> Result<Subforum> {
        if slug.is_empty()
            || !slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            bail!("Subforum slug must be lowercase letters, digits and hyphens: {}", slug);
        }

        let subforum = Subforum {
            id: uuid::Uuid::new_v4().to_string(),
            slug: slug.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
        };

        self.conn
            .execute(
                "INSERT INTO subforums (id, slug, name, description, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    subforum.id,
                    subforum.slug,
                    subforum.name,
                    subforum.description,
                    timestamp(&subforum.created_at)
                ],
            )
            .with_context(|| format!("Failed to create subforum {}", slug))?;

        info!("Created subforum {}", slug);
        Ok(subforum)
    }

    pub fn subforum_by_slug(&self, slug: &str) -> Result<Option<Subforum>> {
        self.conn
            .query_row(
                "SELECT id, slug, name, description, created_at FROM subforums WHERE slug = ?1",
                [slug],
                |row| {
                    let created_at: String = row.get(4)?;
                    Ok(Subforum {
                        id: row.get(0)?,
                        slug: row.get(1)?,
                        name: row.get(2)?,
                        description: row.get(3)?,
                        created_at: parse_timestamp(&created_at),
                    })
                },
            )
            .optional()
            .context("Failed to load subforum")
    }

    /// Join a subforum. Returns false if already a member.
    pub fn join(&self, subforum_id: &str, user_id: &str) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO subforum_members (subforum_id, user_id, joined_at)
             VALUES (?1, ?2, ?3)",
            params![subforum_id, user_id, timestamp(&Utc::now())],
        )?;
        Ok(inserted > 0)
    }

    /// Leave a subforum. Returns false if not a member.
    pub fn leave(&self, subforum_id: &str, user_id: &str) -> Result<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM subforum_members WHERE subforum_id = ?1 AND user_id = ?2",
            params![subforum_id, user_id],
        )?;
        Ok(deleted > 0)
    }

    pub fn is_member(&self, subforum_id: &str, user_id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM subforum_members WHERE subforum_id = ?1 AND user_id = ?2",
            params![subforum_id, user_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Member user IDs in join order
    pub fn members(&self, subforum_id: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id FROM subforum_members WHERE subforum_id = ?1 ORDER BY joined_at",
        )?;
        let rows = stmt.query_map([subforum_id], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<String>>>()
            .context("Failed to list members")
    }

    /// Create a post. Only members may post.
    pub fn create_post(
        &self,
        subforum_id: &str,
        author_id: &str,
        title: &str,
        body: &str,
    ) -> Result<FeedPost> {
        if title.trim().is_empty() {
            bail!("Post title cannot be empty");
        }
        if !self.is_member(subforum_id, author_id)? {
            bail!("User {} must join the subforum before posting", author_id);
        }

        let post = FeedPost {
            id: uuid::Uuid::new_v4().to_string(),
            subforum_id: subforum_id.to_string(),
            author_id: author_id.to_string(),
            title: title.trim().to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
            score: 0,
            comment_count: 0,
        };

        self.conn.execute(
            "INSERT INTO posts (id, subforum_id, author_id, title, body, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                post.id,
                post.subforum_id,
                post.author_id,
                post.title,
                post.body,
                timestamp(&post.created_at)
            ],
        )?;

        debug!("Created post {} in {}", post.id, subforum_id);
        Ok(post)
    }

    pub fn get_post(&self, post_id: &str) -> Result<Option<FeedPost>> {
        self.conn
            .query_row(
                &format!("{} WHERE p.id = ?1", POST_SELECT),
                [post_id],
                post_from_row,
            )
            .optional()
            .context("Failed to load post")
    }

    /// Set a user's vote on a post (+1, -1, or 0 to clear) and return the new score
    pub fn vote(&self, post_id: &str, user_id: &str, value: i8) -> Result<i64> {
        if self.get_post(post_id)?.is_none() {
            return Err(anyhow!("Post not found: {}", post_id));
        }

        match value {
            0 => {
                self.conn.execute(
                    "DELETE FROM votes WHERE post_id = ?1 AND user_id = ?2",
                    params![post_id, user_id],
                )?;
            }
            1 | -1 => {
                self.conn.execute(
                    "INSERT INTO votes (post_id, user_id, value) VALUES (?1, ?2, ?3)
                     ON CONFLICT(post_id, user_id) DO UPDATE SET value = excluded.value",
                    params![post_id, user_id, value],
                )?;
            }
            other => bail!("Vote must be -1, 0 or 1, got {}", other),
        }

        let score: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(value), 0) FROM votes WHERE post_id = ?1",
            [post_id],
            |row| row.get(0),
        )?;
        Ok(score)
    }

    pub fn add_comment(&self, post_id: &str, author_id: &str, body: &str) -> Result<Comment> {
        if body.trim().is_empty() {
            bail!("Comment cannot be empty");
        }
        if self.get_post(post_id)?.is_none() {
            return Err(anyhow!("Post not found: {}", post_id));
        }

        let comment = Comment {
            id: uuid::Uuid::new_v4().to_string(),
            post_id: post_id.to_string(),
            author_id: author_id.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
        };
        self.conn.execute(
            "INSERT INTO comments (id, post_id, author_id, body, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                comment.id,
                comment.post_id,
                comment.author_id,
                comment.body,
                timestamp(&comment.created_at)
            ],
        )?;
        Ok(comment)
    }

    /// Comments on a post, oldest first
    pub fn comments(&self, post_id: &str) -> Result<Vec<Comment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, post_id, author_id, body, created_at FROM comments
             WHERE post_id = ?1 ORDER BY created_at, rowid",
        )?;
        let rows = stmt.query_map([post_id], |row| {
            let created_at: String = row.get(4)?;
            Ok(Comment {
                id: row.get(0)?,
                post_id: row.get(1)?,
                author_id: row.get(2)?,
                body: row.get(3)?,
                created_at: parse_timestamp(&created_at),
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list comments")
    }

    /// A page of posts, optionally limited to one subforum
    pub fn feed(
        &self,
        subforum_id: Option<&str>,
        sort: FeedSort,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<FeedPost>> {
        let order = feed_order(sort);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);

        let posts = match subforum_id {
            Some(id) => {
                let mut stmt = self.conn.prepare(&format!(
                    "{} WHERE p.subforum_id = ?1 ORDER BY {} LIMIT ?2 OFFSET ?3",
                    POST_SELECT, order
                ))?;
                let rows = stmt.query_map(params![id, limit, offset], post_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = self.conn.prepare(&format!(
                    "{} ORDER BY {} LIMIT ?1 OFFSET ?2",
                    POST_SELECT, order
                ))?;
                let rows = stmt.query_map(params![limit, offset], post_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };

        debug!("Loaded {} feed posts ({})", posts.len(), sort);
        Ok(posts)
    }
}

/// SQL ordering matching `rank_posts`. Timestamps are fixed-width RFC3339,
/// so they sort chronologically as text.
fn feed_order(sort: FeedSort) -> &'static str {
    match sort {
        FeedSort::Hot => "score DESC, p.created_at DESC, p.rowid DESC",
        FeedSort::New => "p.created_at DESC, p.rowid DESC",
        FeedSort::Top => "score DESC, comment_count DESC, p.created_at DESC, p.rowid DESC",
    }
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<FeedPost> {
    let created_at: String = row.get(5)?;
    Ok(FeedPost {
        id: row.get(0)?,
        subforum_id: row.get(1)?,
        author_id: row.get(2)?,
        title: row.get(3)?,
        body: row.get(4)?,
        created_at: parse_timestamp(&created_at),
        score: row.get(6)?,
        comment_count: row.get(7)?,
    })
}
