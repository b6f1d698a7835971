use std::sync::Arc;
use std::time::Duration;

use oracle::pool::{CloseMode, Pool, PoolBuilder};
use oracle::Connection;

use crate::config::DatabaseConfig;
use crate::error::{DhakiraError, Result};

/// Sessions older than this are replaced by the pool.
const SESSION_MAX_LIFETIME: Duration = Duration::from_secs(30 * 60);

/// Pooled Oracle connectivity, shared by every store.
///
/// Holds an `oracle` session pool behind `Arc` so it can be cloned cheaply
/// into each store and into blocking closures. All database calls go
/// through [`with_conn`](Self::with_conn), which runs them on the Tokio
/// blocking thread-pool.
#[derive(Clone)]
pub struct ConnectionManager {
    pool: Arc<Pool>,
}

impl ConnectionManager {
    /// Build the connect string for `cfg`, open the session pool, and ping.
    ///
    /// A failed ping releases the pool and reports the error — there is no
    /// partially initialized state to clean up afterwards.
    pub async fn connect(cfg: &DatabaseConfig) -> Result<Self> {
        let connect_string = build_connect_string(cfg);
        let user = cfg.user.clone();
        let password = cfg.password.clone();
        let max_open = cfg.pool_max_open;
        let max_idle = cfg.pool_max_idle;

        let pool = tokio::task::spawn_blocking(move || -> Result<Pool> {
            let pool = PoolBuilder::new(&user, &password, &connect_string)
                .max_connections(max_open)
                .min_connections(max_idle)
                .max_lifetime_session(SESSION_MAX_LIFETIME)
                .build()
                .map_err(|e| {
                    DhakiraError::Storage(format!("failed to open Oracle pool: {e}"))
                })?;

            let conn = pool
                .get()
                .map_err(|e| DhakiraError::Storage(format!("failed to acquire connection: {e}")))?;
            conn.ping()
                .map_err(|e| DhakiraError::Storage(format!("Oracle ping failed: {e}")))?;

            Ok(pool)
        })
        .await
        .map_err(|e| DhakiraError::Storage(format!("task join error: {e}")))??;

        tracing::info!("oracle: connection pool established");
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Run a blocking closure against a pooled connection on the Tokio
    /// blocking thread-pool. This is the primary way the stores interact
    /// with the database. The connection is in autocommit mode; use
    /// [`with_tx`](Self::with_tx) for multi-statement units of work.
    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            conn.set_autocommit(true);
            f(&conn)
        })
        .await
        .map_err(|e| DhakiraError::Storage(format!("task join error: {e}")))?
    }

    /// Execute `f` inside a transaction. Any error rolls back and surfaces
    /// the original error; a rollback failure wraps both. Success commits.
    pub async fn with_tx<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            match f(&conn) {
                Ok(value) => {
                    conn.commit()?;
                    Ok(value)
                }
                Err(err) => {
                    if let Err(rb_err) = conn.rollback() {
                        return Err(DhakiraError::Storage(format!(
                            "rollback failed: {rb_err} (original error: {err})"
                        )));
                    }
                    Err(err)
                }
            }
        })
        .await
        .map_err(|e| DhakiraError::Storage(format!("task join error: {e}")))?
    }

    /// Liveness check against a pooled connection.
    pub async fn ping(&self) -> Result<()> {
        self.with_conn(|conn| conn.ping().map_err(Into::into)).await
    }

    /// Close the pool, releasing all sessions.
    pub fn close(&self) {
        tracing::info!("oracle: closing connection pool");
        if let Err(e) = self.pool.close(&CloseMode::Default) {
            tracing::warn!("oracle: pool close failed: {e}");
        }
    }
}

/// Construct the Oracle connect string for the configured deployment mode.
///
/// - autonomous with a DSN: the DSN is used verbatim (wallet-less TLS)
/// - autonomous with a wallet: a TCPS descriptor carrying the wallet
///   directory for mutual TLS
/// - otherwise: plain EZConnect against the local instance
pub fn build_connect_string(cfg: &DatabaseConfig) -> String {
    if cfg.is_autonomous() {
        if let Some(dsn) = cfg.dsn.as_deref().filter(|d| !d.is_empty()) {
            return dsn.to_string();
        }

        if let Some(wallet) = cfg.wallet_path.as_deref().filter(|w| !w.is_empty()) {
            return format!(
                "(DESCRIPTION=(RETRY_COUNT=3)(RETRY_DELAY=2)\
                 (ADDRESS=(PROTOCOL=TCPS)(HOST={})(PORT={}))\
                 (CONNECT_DATA=(SERVICE_NAME={}))\
                 (SECURITY=(SSL_SERVER_DN_MATCH=TRUE)(MY_WALLET_DIRECTORY={})))",
                cfg.host, cfg.port, cfg.service, wallet
            );
        }
    }

    format!("//{}:{}/{}", cfg.host, cfg.port, cfg.service)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_string_local() {
        let cfg = DatabaseConfig {
            mode: "local".to_string(),
            host: "localhost".to_string(),
            port: 1521,
            service: "FREEPDB1".to_string(),
            ..Default::default()
        };
        assert_eq!(build_connect_string(&cfg), "//localhost:1521/FREEPDB1");
    }

    #[test]
    fn test_connect_string_dsn_passthrough() {
        let dsn = "tcps://adb.eu-frankfurt-1.oraclecloud.com:1522/abc_high.adb.oraclecloud.com";
        let cfg = DatabaseConfig {
            mode: "autonomous".to_string(),
            dsn: Some(dsn.to_string()),
            ..Default::default()
        };
        assert_eq!(build_connect_string(&cfg), dsn);
    }

    #[test]
    fn test_connect_string_wallet_descriptor() {
        let cfg = DatabaseConfig {
            mode: "autonomous".to_string(),
            host: "adb.eu-frankfurt-1.oraclecloud.com".to_string(),
            port: 1522,
            service: "abc_high.adb.oraclecloud.com".to_string(),
            wallet_path: Some("/opt/wallet".to_string()),
            ..Default::default()
        };
        let conn_str = build_connect_string(&cfg);
        assert!(conn_str.contains("(PROTOCOL=TCPS)"));
        assert!(conn_str.contains("(MY_WALLET_DIRECTORY=/opt/wallet)"));
        assert!(conn_str.contains("(SERVICE_NAME=abc_high.adb.oraclecloud.com)"));
    }

    #[test]
    fn test_connect_string_dsn_ignored_in_local_mode() {
        // A stray DSN must not override the local descriptor.
        let cfg = DatabaseConfig {
            mode: "local".to_string(),
            host: "db".to_string(),
            port: 1521,
            service: "XEPDB1".to_string(),
            dsn: Some("tcps://somewhere/else".to_string()),
            ..Default::default()
        };
        assert_eq!(build_connect_string(&cfg), "//db:1521/XEPDB1");
    }

    #[test]
    fn test_connect_string_dsn_wins_over_wallet() {
        let cfg = DatabaseConfig {
            mode: "autonomous".to_string(),
            dsn: Some("tcps://adb/svc".to_string()),
            wallet_path: Some("/opt/wallet".to_string()),
            ..Default::default()
        };
        assert_eq!(build_connect_string(&cfg), "tcps://adb/svc");
    }
}
