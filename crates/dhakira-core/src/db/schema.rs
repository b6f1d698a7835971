use crate::db::ConnectionManager;
use crate::error::{DhakiraError, Result};

/// Version stamped into `PICO_META` after provisioning.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Table DDL, in creation order (no cross-table dependencies).
const TABLE_DDL: &[(&str, &str)] = &[
    (
        "PICO_META",
        "CREATE TABLE PICO_META (
            meta_key   VARCHAR2(255) PRIMARY KEY,
            meta_value VARCHAR2(4000),
            updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
    ),
    (
        "PICO_MEMORIES",
        "CREATE TABLE PICO_MEMORIES (
            memory_id    VARCHAR2(64) PRIMARY KEY,
            agent_id     VARCHAR2(64) NOT NULL,
            content      CLOB,
            embedding    VECTOR,
            importance   NUMBER(3,2) DEFAULT 0.5,
            category     VARCHAR2(255),
            access_count NUMBER DEFAULT 0,
            created_at   TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            accessed_at  TIMESTAMP,
            updated_at   TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
    ),
    (
        "PICO_DAILY_NOTES",
        "CREATE TABLE PICO_DAILY_NOTES (
            note_id    VARCHAR2(64) PRIMARY KEY,
            agent_id   VARCHAR2(64) NOT NULL,
            note_date  DATE NOT NULL,
            content    CLOB,
            embedding  VECTOR,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
    ),
    (
        "PICO_SESSIONS",
        "CREATE TABLE PICO_SESSIONS (
            session_key VARCHAR2(255) PRIMARY KEY,
            agent_id    VARCHAR2(64) NOT NULL,
            messages    CLOB,
            summary     CLOB,
            created_at  TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            updated_at  TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
    ),
    (
        "PICO_STATE",
        "CREATE TABLE PICO_STATE (
            state_key   VARCHAR2(255) NOT NULL,
            agent_id    VARCHAR2(64) NOT NULL,
            state_value VARCHAR2(4000),
            updated_at  TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (state_key, agent_id)
        )",
    ),
    (
        "PICO_CONFIG",
        "CREATE TABLE PICO_CONFIG (
            config_key   VARCHAR2(255) PRIMARY KEY,
            agent_id     VARCHAR2(64) NOT NULL,
            config_value CLOB,
            updated_at   TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
    ),
    (
        "PICO_PROMPTS",
        "CREATE TABLE PICO_PROMPTS (
            prompt_name VARCHAR2(255) NOT NULL,
            agent_id    VARCHAR2(64) NOT NULL,
            content     CLOB,
            updated_at  TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (prompt_name, agent_id)
        )",
    ),
    (
        "PICO_TRANSCRIPTS",
        "CREATE TABLE PICO_TRANSCRIPTS (
            id           NUMBER GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
            session_key  VARCHAR2(255),
            agent_id     VARCHAR2(64),
            sequence_num NUMBER,
            role         VARCHAR2(32),
            content      CLOB,
            created_at   TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
    ),
];

const INDEX_DDL: &[&str] = &[
    "CREATE INDEX IDX_PICO_MEMORIES_AGENT ON PICO_MEMORIES(agent_id)",
    "CREATE INDEX IDX_PICO_DAILY_AGENT_DATE ON PICO_DAILY_NOTES(agent_id, note_date)",
    "CREATE INDEX IDX_PICO_SESSIONS_AGENT ON PICO_SESSIONS(agent_id)",
    "CREATE INDEX IDX_PICO_TRANSCRIPTS_SESSION ON PICO_TRANSCRIPTS(session_key)",
    "CREATE INDEX IDX_PICO_STATE_AGENT ON PICO_STATE(agent_id)",
];

const VECTOR_INDEX_DDL: &[&str] = &[
    "CREATE VECTOR INDEX IDX_PICO_MEMORIES_VEC ON PICO_MEMORIES(embedding)
     ORGANIZATION NEIGHBOR PARTITIONS
     DISTANCE COSINE
     WITH TARGET ACCURACY 95",
    "CREATE VECTOR INDEX IDX_PICO_DAILY_NOTES_VEC ON PICO_DAILY_NOTES(embedding)
     ORGANIZATION NEIGHBOR PARTITIONS
     DISTANCE COSINE
     WITH TARGET ACCURACY 95",
];

/// Expected-duplicate classes of DDL errors, recognized by ORA code rather
/// than message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdlClass {
    /// ORA-00955: name already used by an existing object.
    AlreadyExists,
    /// ORA-01408: such column list already indexed.
    AlreadyIndexed,
    Other,
}

pub(crate) fn classify_ddl_code(code: Option<i32>) -> DdlClass {
    match code {
        Some(955) => DdlClass::AlreadyExists,
        Some(1408) => DdlClass::AlreadyIndexed,
        _ => DdlClass::Other,
    }
}

fn classify_ddl(err: &DhakiraError) -> DdlClass {
    match err {
        DhakiraError::Database(e) => classify_ddl_code(e.db_error().map(|d| d.code())),
        _ => DdlClass::Other,
    }
}

/// Create all tables and indexes, then stamp the schema version.
///
/// Safe to call repeatedly, including concurrently from independent
/// processes: already-exists and already-indexed DDL errors are treated as
/// success. Any other DDL error aborts initialization.
pub async fn init_schema(cm: &ConnectionManager) -> Result<()> {
    tracing::info!("oracle: initializing schema");

    cm.with_conn(|conn| {
        for (table, ddl) in TABLE_DDL {
            match conn.execute(ddl, &[]) {
                Ok(_) => tracing::info!("oracle: created table {table}"),
                Err(e) => {
                    let err = DhakiraError::from(e);
                    match classify_ddl(&err) {
                        DdlClass::AlreadyExists => {
                            tracing::debug!("oracle: table {table} already exists");
                        }
                        _ => {
                            return Err(DhakiraError::Storage(format!(
                                "failed to create table {table}: {err}"
                            )));
                        }
                    }
                }
            }
        }

        for ddl in INDEX_DDL.iter().chain(VECTOR_INDEX_DDL) {
            if let Err(e) = conn.execute(ddl, &[]) {
                let err = DhakiraError::from(e);
                match classify_ddl(&err) {
                    DdlClass::AlreadyExists | DdlClass::AlreadyIndexed => {
                        tracing::debug!("oracle: index already exists");
                    }
                    DdlClass::Other => {
                        return Err(DhakiraError::Storage(format!(
                            "failed to create index: {err}"
                        )));
                    }
                }
            }
        }

        // Version stamp is best-effort; a race between two initializers
        // writing the same value is harmless.
        if let Err(e) = conn.execute(
            "MERGE INTO PICO_META m
             USING (SELECT 'schema_version' AS meta_key FROM DUAL) s
             ON (m.meta_key = s.meta_key)
             WHEN MATCHED THEN
                 UPDATE SET meta_value = :1, updated_at = CURRENT_TIMESTAMP
             WHEN NOT MATCHED THEN
                 INSERT (meta_key, meta_value) VALUES ('schema_version', :2)",
            &[&SCHEMA_VERSION, &SCHEMA_VERSION],
        ) {
            tracing::warn!("oracle: failed to set schema version: {e}");
        }

        Ok(())
    })
    .await?;

    tracing::info!("oracle: schema initialization complete");
    Ok(())
}

/// Read the provisioned schema version, if any.
pub async fn schema_version(cm: &ConnectionManager) -> Result<Option<String>> {
    let result = cm
        .with_conn(|conn| {
            let value: Option<String> = conn.query_row_as(
                "SELECT meta_value FROM PICO_META WHERE meta_key = 'schema_version'",
                &[],
            )?;
            Ok(value)
        })
        .await;

    match result {
        Ok(v) => Ok(v),
        Err(e) if e.is_no_rows() => Ok(None),
        Err(e) => Err(e),
    }
}
