//! Shared-connection plumbing behind IM-15's per-record savepoint
//! isolation: a promotion batch's [`ImportStore`](acctkernel_ingest::ImportStore),
//! its entity promoters, and -- for journal rows -- the `PostingSession`/
//! `AuditSink` pair all need to land their writes on the *same* Postgres
//! session for a `SAVEPOINT`/`ROLLBACK TO SAVEPOINT` issued by one of them
//! to actually cover what the others write. [`PgConn`] is that shared
//! session, handed out as a [`SharedConn`] and wrapped back up by every
//! collaborator that needs to participate.

use std::sync::Arc;

use sqlx::{PgConnection, PgPool};
use tokio::sync::Mutex as AsyncMutex;

pub type SharedConn = Arc<AsyncMutex<PgConnection>>;

/// Either an ordinary pool -- every call checks out its own connection and
/// (where the call needs atomicity across statements) its own transaction
/// -- or a connection shared with the rest of a promotion batch, already
/// sitting inside the batch's outer transaction.
#[derive(Clone)]
pub enum PgConn {
    Pool(PgPool),
    Shared(SharedConn),
}

impl PgConn {
    /// Runs `f` against a connection: a freshly checked-out one for `Pool`,
    /// the batch's shared one for `Shared`. No transaction boundary of its
    /// own -- callers that need one use [`Self::with_tx`].
    pub async fn with<F, Fut, T>(&self, f: F) -> sqlx::Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Fut,
        Fut: std::future::Future<Output = sqlx::Result<T>>,
    {
        match self {
            PgConn::Pool(pool) => {
                let mut conn = pool.acquire().await?;
                f(&mut conn).await
            }
            PgConn::Shared(shared) => {
                let mut guard = shared.lock().await;
                f(&mut guard).await
            }
        }
    }

    /// Runs `f` inside a transaction scoped to this call. On `Pool` that's
    /// a real `BEGIN ... COMMIT` around a dedicated connection. On `Shared`
    /// the caller is already inside the batch's outer transaction (and,
    /// during promotion, inside that record's `SAVEPOINT`), so `f` just
    /// runs against it directly -- nesting another `BEGIN` here would only
    /// open a second, pointless savepoint underneath the one the batch
    /// already manages.
    pub async fn with_tx<F, Fut, T>(&self, f: F) -> sqlx::Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Fut,
        Fut: std::future::Future<Output = sqlx::Result<T>>,
    {
        match self {
            PgConn::Pool(pool) => {
                let mut tx = pool.begin().await?;
                let out = f(&mut tx).await?;
                tx.commit().await?;
                Ok(out)
            }
            PgConn::Shared(shared) => {
                let mut guard = shared.lock().await;
                f(&mut guard).await
            }
        }
    }
}

/// Checks out a connection, detaches it from the pool, and opens the outer
/// transaction a promotion batch's collaborators will share (spec.md's
/// "nest[ed] inside the outer transaction").
pub async fn begin_transaction(pool: &PgPool) -> sqlx::Result<SharedConn> {
    use sqlx::Executor;
    let mut conn = pool.acquire().await?.detach();
    (&mut conn).execute("BEGIN").await?;
    Ok(Arc::new(AsyncMutex::new(conn)))
}

pub async fn commit_transaction(shared: &SharedConn) -> sqlx::Result<()> {
    use sqlx::Executor;
    let mut guard = shared.lock().await;
    (&mut *guard).execute("COMMIT").await?;
    Ok(())
}

pub async fn rollback_transaction(shared: &SharedConn) -> sqlx::Result<()> {
    use sqlx::Executor;
    let mut guard = shared.lock().await;
    (&mut *guard).execute("ROLLBACK").await?;
    Ok(())
}

/// Opens a `SAVEPOINT` under `shared`'s outer transaction. Savepoint names
/// can't be bound as query parameters, so callers pass a fixed identifier;
/// that's safe here because a batch promotes one record at a time and
/// always releases or rolls back the previous savepoint before opening the
/// next one under the same name.
pub async fn savepoint(shared: &SharedConn, name: &str) -> sqlx::Result<()> {
    use sqlx::Executor;
    let sql = format!("SAVEPOINT {name}");
    let mut guard = shared.lock().await;
    (&mut *guard).execute(sql.as_str()).await?;
    Ok(())
}

pub async fn release_savepoint(shared: &SharedConn, name: &str) -> sqlx::Result<()> {
    use sqlx::Executor;
    let sql = format!("RELEASE SAVEPOINT {name}");
    let mut guard = shared.lock().await;
    (&mut *guard).execute(sql.as_str()).await?;
    Ok(())
}

pub async fn rollback_to_savepoint(shared: &SharedConn, name: &str) -> sqlx::Result<()> {
    use sqlx::Executor;
    let sql = format!("ROLLBACK TO SAVEPOINT {name}");
    let mut guard = shared.lock().await;
    (&mut *guard).execute(sql.as_str()).await?;
    Ok(())
}
