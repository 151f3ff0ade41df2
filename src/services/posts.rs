//! Domain-scoped posts. Every operation takes the domain it acts in, and a
//! post is only ever found through its own domain.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::post::{Post, PostRequest};
use crate::models::user::User;

#[async_trait]
pub trait PostStore: Send + Sync {
    /// Newest first.
    async fn list(&self, domain: Uuid) -> StoreResult<Vec<Post>>;

    async fn find(&self, domain: Uuid, uuid: Uuid) -> StoreResult<Option<Post>>;

    /// `None` when `domain` does not exist.
    async fn create(&self, domain: Uuid, author: &User, req: &PostRequest) -> StoreResult<Option<Post>>;

    /// `None` when there is no such post in `domain`.
    async fn update(&self, domain: Uuid, uuid: Uuid, req: &PostRequest) -> StoreResult<Option<Post>>;

    /// False when there was no such post in `domain`.
    async fn delete(&self, domain: Uuid, uuid: Uuid) -> StoreResult<bool>;
}

const POST_SELECT: &str = "SELECT p.id, p.uuid, d.uuid AS domain, u.uuid AS author,
            p.title, p.content, p.created_at, p.updated_at
     FROM posts p
     JOIN domains d ON d.id = p.domain_id
     JOIN users u ON u.id = p.author_id";

#[derive(Clone)]
pub struct PgPostStore {
    pool: PgPool,
}

impl PgPostStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn list(&self, domain: Uuid) -> StoreResult<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(&format!(
            "{POST_SELECT} WHERE d.uuid = $1 ORDER BY p.created_at DESC, p.id DESC"
        ))
        .bind(domain)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    async fn find(&self, domain: Uuid, uuid: Uuid) -> StoreResult<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(&format!(
            "{POST_SELECT} WHERE d.uuid = $1 AND p.uuid = $2"
        ))
        .bind(domain)
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(post)
    }

    async fn create(&self, domain: Uuid, author: &User, req: &PostRequest) -> StoreResult<Option<Post>> {
        let uuid = Uuid::new_v4();
        let inserted = sqlx::query(
            "INSERT INTO posts (uuid, domain_id, author_id, title, content)
             SELECT $1, d.id, $3, $4, $5 FROM domains d WHERE d.uuid = $2",
        )
        .bind(uuid)
        .bind(domain)
        .bind(author.id)
        .bind(&req.title)
        .bind(&req.content)
        .execute(&self.pool)
        .await?;
        if inserted.rows_affected() == 0 {
            return Ok(None);
        }
        self.find(domain, uuid).await
    }

    async fn update(&self, domain: Uuid, uuid: Uuid, req: &PostRequest) -> StoreResult<Option<Post>> {
        let updated = sqlx::query(
            "UPDATE posts p SET title = $3, content = $4, updated_at = NOW()
             FROM domains d
             WHERE d.id = p.domain_id AND d.uuid = $1 AND p.uuid = $2",
        )
        .bind(domain)
        .bind(uuid)
        .bind(&req.title)
        .bind(&req.content)
        .execute(&self.pool)
        .await?;
        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        self.find(domain, uuid).await
    }

    async fn delete(&self, domain: Uuid, uuid: Uuid) -> StoreResult<bool> {
        let deleted = sqlx::query(
            "DELETE FROM posts p USING domains d
             WHERE d.id = p.domain_id AND d.uuid = $1 AND p.uuid = $2",
        )
        .bind(domain)
        .bind(uuid)
        .execute(&self.pool)
        .await?;
        Ok(deleted.rows_affected() > 0)
    }
}

/// In-process store for tests and local development.
#[derive(Default)]
pub struct MemoryPostStore {
    posts: RwLock<Vec<Post>>,
}

impl MemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn list(&self, domain: Uuid) -> StoreResult<Vec<Post>> {
        let mut posts: Vec<Post> = self
            .posts
            .read()
            .await
            .iter()
            .filter(|p| p.domain == domain)
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(posts)
    }

    async fn find(&self, domain: Uuid, uuid: Uuid) -> StoreResult<Option<Post>> {
        Ok(self
            .posts
            .read()
            .await
            .iter()
            .find(|p| p.domain == domain && p.uuid == uuid)
            .cloned())
    }

    async fn create(&self, domain: Uuid, author: &User, req: &PostRequest) -> StoreResult<Option<Post>> {
        let mut posts = self.posts.write().await;
        let now = Utc::now();
        let post = Post {
            id: posts.iter().map(|p| p.id).max().unwrap_or(0) + 1,
            uuid: Uuid::new_v4(),
            domain,
            author: author.uuid,
            title: req.title.clone(),
            content: req.content.clone(),
            created_at: now,
            updated_at: now,
        };
        posts.push(post.clone());
        Ok(Some(post))
    }

    async fn update(&self, domain: Uuid, uuid: Uuid, req: &PostRequest) -> StoreResult<Option<Post>> {
        let mut posts = self.posts.write().await;
        Ok(posts
            .iter_mut()
            .find(|p| p.domain == domain && p.uuid == uuid)
            .map(|post| {
                post.title = req.title.clone();
                post.content = req.content.clone();
                post.updated_at = Utc::now();
                post.clone()
            }))
    }

    async fn delete(&self, domain: Uuid, uuid: Uuid) -> StoreResult<bool> {
        let mut posts = self.posts.write().await;
        let before = posts.len();
        posts.retain(|p| !(p.domain == domain && p.uuid == uuid));
        Ok(posts.len() < before)
    }
}
