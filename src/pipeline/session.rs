use sqlx::{PgConnection, PgPool, Postgres, Transaction};

/// An owned transaction, begun by the pipeline for a single manager call.
pub struct Session<'a> {
    tx: Transaction<'a, Postgres>,
}

impl<'a> Session<'a> {
    pub async fn begin(pool: &PgPool) -> Result<Session<'static>, sqlx::Error> {
        Ok(Session { tx: pool.begin().await? })
    }

    pub fn executor(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    pub async fn commit(self) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }

    pub async fn rollback(self) -> Result<(), sqlx::Error> {
        self.tx.rollback().await
    }
}
