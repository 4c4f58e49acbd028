//! Forward-only, named, idempotent migrations (M1–M9).
//!
//! Applied in order inside a single transaction per `open()`. The applied
//! set is persisted in `schema_migrations`; if that table names a
//! migration this build doesn't know about, opening fails with
//! [`StoreError::Downgrade`] rather than silently dropping schema.

use rusqlite::Connection;

use crate::error::StoreError;

pub struct Migration {
    pub name: &'static str,
    pub sql: &'static str,
}

/// All known migrations, in application order. Each statement uses
/// `IF NOT EXISTS` / guarded `ALTER TABLE` so re-applying a migration that
/// already ran is a no-op.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "m1_initial_tables",
        sql: r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id              TEXT PRIMARY KEY,
                path            TEXT NOT NULL,
                content         TEXT NOT NULL,
                start_line      INTEGER NOT NULL,
                end_line        INTEGER NOT NULL,
                kind            TEXT NOT NULL,
                symbols         TEXT NOT NULL DEFAULT '[]',
                refs            TEXT NOT NULL DEFAULT '[]',
                token_count     INTEGER NOT NULL DEFAULT 0,
                file_hash       TEXT NOT NULL,
                created_at      TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chunks_path ON chunks(path);

            CREATE TABLE IF NOT EXISTS file_hashes (
                path        TEXT PRIMARY KEY,
                hash        TEXT NOT NULL,
                indexed_at  TEXT NOT NULL
            );

            CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
                content,
                content='chunks',
                content_rowid='rowid'
            );

            CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
                INSERT INTO chunks_fts(rowid, content) VALUES (new.rowid, new.content);
            END;
            CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
                INSERT INTO chunks_fts(chunks_fts, rowid, content) VALUES ('delete', old.rowid, old.content);
            END;
            CREATE TRIGGER IF NOT EXISTS chunks_au AFTER UPDATE ON chunks BEGIN
                INSERT INTO chunks_fts(chunks_fts, rowid, content) VALUES ('delete', old.rowid, old.content);
                INSERT INTO chunks_fts(rowid, content) VALUES (new.rowid, new.content);
            END;
        "#,
    },
    Migration {
        name: "m2_rich_metadata_columns",
        sql: r#"
            ALTER TABLE chunks ADD COLUMN signature TEXT;
            ALTER TABLE chunks ADD COLUMN breadcrumb TEXT;
            ALTER TABLE chunks ADD COLUMN language TEXT NOT NULL DEFAULT '';
            ALTER TABLE chunks ADD COLUMN doc_comment TEXT;
        "#,
    },
    Migration {
        name: "m3_info_snippets",
        sql: r#"
            CREATE TABLE IF NOT EXISTS info_snippets (
                id          TEXT PRIMARY KEY,
                path        TEXT NOT NULL,
                content     TEXT NOT NULL,
                start_line  INTEGER NOT NULL,
                end_line    INTEGER NOT NULL,
                language    TEXT NOT NULL DEFAULT '',
                file_hash   TEXT NOT NULL,
                content_hash TEXT NOT NULL DEFAULT '',
                created_at  TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_info_snippets_path ON info_snippets(path);

            CREATE VIRTUAL TABLE IF NOT EXISTS info_snippets_fts USING fts5(
                content,
                content='info_snippets',
                content_rowid='rowid'
            );
            CREATE TRIGGER IF NOT EXISTS info_snippets_ai AFTER INSERT ON info_snippets BEGIN
                INSERT INTO info_snippets_fts(rowid, content) VALUES (new.rowid, new.content);
            END;
            CREATE TRIGGER IF NOT EXISTS info_snippets_ad AFTER DELETE ON info_snippets BEGIN
                INSERT INTO info_snippets_fts(info_snippets_fts, rowid, content) VALUES ('delete', old.rowid, old.content);
            END;
            CREATE TRIGGER IF NOT EXISTS info_snippets_au AFTER UPDATE ON info_snippets BEGIN
                INSERT INTO info_snippets_fts(info_snippets_fts, rowid, content) VALUES ('delete', old.rowid, old.content);
                INSERT INTO info_snippets_fts(rowid, content) VALUES (new.rowid, new.content);
            END;
        "#,
    },
    Migration {
        name: "m4_content_hash_column",
        sql: r#"
            ALTER TABLE chunks ADD COLUMN content_hash TEXT NOT NULL DEFAULT '';
            CREATE INDEX IF NOT EXISTS idx_chunks_content_hash ON chunks(content_hash);
        "#,
    },
    Migration {
        name: "m5_generated_description_column",
        sql: r#"
            ALTER TABLE chunks ADD COLUMN generated_description TEXT;
        "#,
    },
    Migration {
        name: "m6_description_in_fts",
        sql: r#"
            DROP TABLE IF EXISTS chunks_fts;
            CREATE VIRTUAL TABLE chunks_fts USING fts5(
                content,
                signature,
                breadcrumb,
                doc_comment,
                generated_description,
                content='chunks',
                content_rowid='rowid'
            );
            DROP TRIGGER IF EXISTS chunks_ai;
            DROP TRIGGER IF EXISTS chunks_ad;
            DROP TRIGGER IF EXISTS chunks_au;
            CREATE TRIGGER chunks_ai AFTER INSERT ON chunks BEGIN
                INSERT INTO chunks_fts(rowid, content, signature, breadcrumb, doc_comment, generated_description)
                VALUES (new.rowid, new.content, new.signature, new.breadcrumb, new.doc_comment, new.generated_description);
            END;
            CREATE TRIGGER chunks_ad AFTER DELETE ON chunks BEGIN
                INSERT INTO chunks_fts(chunks_fts, rowid, content, signature, breadcrumb, doc_comment, generated_description)
                VALUES ('delete', old.rowid, old.content, old.signature, old.breadcrumb, old.doc_comment, old.generated_description);
            END;
            CREATE TRIGGER chunks_au AFTER UPDATE ON chunks BEGIN
                INSERT INTO chunks_fts(chunks_fts, rowid, content, signature, breadcrumb, doc_comment, generated_description)
                VALUES ('delete', old.rowid, old.content, old.signature, old.breadcrumb, old.doc_comment, old.generated_description);
                INSERT INTO chunks_fts(rowid, content, signature, breadcrumb, doc_comment, generated_description)
                VALUES (new.rowid, new.content, new.signature, new.breadcrumb, new.doc_comment, new.generated_description);
            END;
            INSERT INTO chunks_fts(chunks_fts) VALUES ('rebuild');
        "#,
    },
    Migration {
        name: "m7_conformances_column_and_fts",
        sql: r#"
            ALTER TABLE chunks ADD COLUMN conformances TEXT NOT NULL DEFAULT '[]';

            DROP TABLE IF EXISTS chunks_fts;
            CREATE VIRTUAL TABLE chunks_fts USING fts5(
                content,
                signature,
                breadcrumb,
                doc_comment,
                generated_description,
                conformances,
                content='chunks',
                content_rowid='rowid'
            );
            DROP TRIGGER IF EXISTS chunks_ai;
            DROP TRIGGER IF EXISTS chunks_ad;
            DROP TRIGGER IF EXISTS chunks_au;
            CREATE TRIGGER chunks_ai AFTER INSERT ON chunks BEGIN
                INSERT INTO chunks_fts(rowid, content, signature, breadcrumb, doc_comment, generated_description, conformances)
                VALUES (new.rowid, new.content, new.signature, new.breadcrumb, new.doc_comment, new.generated_description, new.conformances);
            END;
            CREATE TRIGGER chunks_ad AFTER DELETE ON chunks BEGIN
                INSERT INTO chunks_fts(chunks_fts, rowid, content, signature, breadcrumb, doc_comment, generated_description, conformances)
                VALUES ('delete', old.rowid, old.content, old.signature, old.breadcrumb, old.doc_comment, old.generated_description, old.conformances);
            END;
            CREATE TRIGGER chunks_au AFTER UPDATE ON chunks BEGIN
                INSERT INTO chunks_fts(chunks_fts, rowid, content, signature, breadcrumb, doc_comment, generated_description, conformances)
                VALUES ('delete', old.rowid, old.content, old.signature, old.breadcrumb, old.doc_comment, old.generated_description, old.conformances);
                INSERT INTO chunks_fts(rowid, content, signature, breadcrumb, doc_comment, generated_description, conformances)
                VALUES (new.rowid, new.content, new.signature, new.breadcrumb, new.doc_comment, new.generated_description, new.conformances);
            END;
            INSERT INTO chunks_fts(chunks_fts) VALUES ('rebuild');
        "#,
    },
    Migration {
        name: "m8_is_type_declaration_and_conformance_index",
        sql: r#"
            ALTER TABLE chunks ADD COLUMN is_type_declaration INTEGER NOT NULL DEFAULT 0;

            CREATE TABLE IF NOT EXISTS conformance_index (
                chunk_id        TEXT NOT NULL,
                protocol_name   TEXT NOT NULL,
                PRIMARY KEY (chunk_id, protocol_name)
            );
            CREATE INDEX IF NOT EXISTS idx_conformance_index_protocol ON conformance_index(protocol_name);

            DROP TRIGGER IF EXISTS conformance_ai;
            DROP TRIGGER IF EXISTS conformance_ad;
            DROP TRIGGER IF EXISTS conformance_au;
            CREATE TRIGGER conformance_ai AFTER INSERT ON chunks BEGIN
                INSERT INTO conformance_index(chunk_id, protocol_name)
                SELECT new.id, value FROM json_each(new.conformances);
            END;
            CREATE TRIGGER conformance_ad AFTER DELETE ON chunks BEGIN
                DELETE FROM conformance_index WHERE chunk_id = old.id;
            END;
            CREATE TRIGGER conformance_au AFTER UPDATE ON chunks BEGIN
                DELETE FROM conformance_index WHERE chunk_id = old.id;
                INSERT INTO conformance_index(chunk_id, protocol_name)
                SELECT new.id, value FROM json_each(new.conformances);
            END;
        "#,
    },
    Migration {
        name: "m9_identifier_preserving_tokenizer",
        sql: r#"
            DROP TABLE IF EXISTS chunks_fts;
            CREATE VIRTUAL TABLE chunks_fts USING fts5(
                content,
                signature,
                breadcrumb,
                doc_comment,
                generated_description,
                conformances,
                content='chunks',
                content_rowid='rowid',
                tokenize='unicode61 remove_diacritics 0 categories ''L* N* Co'' tokenchars ''_'''
            );
            DROP TRIGGER IF EXISTS chunks_ai;
            DROP TRIGGER IF EXISTS chunks_ad;
            DROP TRIGGER IF EXISTS chunks_au;
            CREATE TRIGGER chunks_ai AFTER INSERT ON chunks BEGIN
                INSERT INTO chunks_fts(rowid, content, signature, breadcrumb, doc_comment, generated_description, conformances)
                VALUES (new.rowid, new.content, new.signature, new.breadcrumb, new.doc_comment, new.generated_description, new.conformances);
            END;
            CREATE TRIGGER chunks_ad AFTER DELETE ON chunks BEGIN
                INSERT INTO chunks_fts(chunks_fts, rowid, content, signature, breadcrumb, doc_comment, generated_description, conformances)
                VALUES ('delete', old.rowid, old.content, old.signature, old.breadcrumb, old.doc_comment, old.generated_description, old.conformances);
            END;
            CREATE TRIGGER chunks_au AFTER UPDATE ON chunks BEGIN
                INSERT INTO chunks_fts(chunks_fts, rowid, content, signature, breadcrumb, doc_comment, generated_description, conformances)
                VALUES ('delete', old.rowid, old.content, old.signature, old.breadcrumb, old.doc_comment, old.generated_description, old.conformances);
                INSERT INTO chunks_fts(rowid, content, signature, breadcrumb, doc_comment, generated_description, conformances)
                VALUES (new.rowid, new.content, new.signature, new.breadcrumb, new.doc_comment, new.generated_description, new.conformances);
            END;
            INSERT INTO chunks_fts(chunks_fts) VALUES ('rebuild');

            DROP TABLE IF EXISTS info_snippets_fts;
            CREATE VIRTUAL TABLE info_snippets_fts USING fts5(
                content,
                content='info_snippets',
                content_rowid='rowid',
                tokenize='unicode61 remove_diacritics 0 categories ''L* N* Co'' tokenchars ''_'''
            );
            DROP TRIGGER IF EXISTS info_snippets_ai;
            DROP TRIGGER IF EXISTS info_snippets_ad;
            DROP TRIGGER IF EXISTS info_snippets_au;
            CREATE TRIGGER info_snippets_ai AFTER INSERT ON info_snippets BEGIN
                INSERT INTO info_snippets_fts(rowid, content) VALUES (new.rowid, new.content);
            END;
            CREATE TRIGGER info_snippets_ad AFTER DELETE ON info_snippets BEGIN
                INSERT INTO info_snippets_fts(info_snippets_fts, rowid, content) VALUES ('delete', old.rowid, old.content);
            END;
            CREATE TRIGGER info_snippets_au AFTER UPDATE ON info_snippets BEGIN
                INSERT INTO info_snippets_fts(info_snippets_fts, rowid, content) VALUES ('delete', old.rowid, old.content);
                INSERT INTO info_snippets_fts(rowid, content) VALUES (new.rowid, new.content);
            END;
            INSERT INTO info_snippets_fts(info_snippets_fts) VALUES ('rebuild');
        "#,
    },
];

/// Apply every migration in `MIGRATIONS` not yet recorded in
/// `schema_migrations`. Fails with [`StoreError::Downgrade`] if the
/// recorded set names a migration unknown to this build.
pub fn run_migrations(conn: &mut Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL
        );",
    )?;

    let applied: Vec<String> = {
        let mut stmt = conn.prepare("SELECT name FROM schema_migrations")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<_, _>>()?
    };

    let known: std::collections::HashSet<&str> = MIGRATIONS.iter().map(|m| m.name).collect();
    let unknown: Vec<String> = applied
        .iter()
        .filter(|name| !known.contains(name.as_str()))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(StoreError::Downgrade(unknown));
    }
    let applied_set: std::collections::HashSet<&str> = applied.iter().map(|s| s.as_str()).collect();

    for migration in MIGRATIONS {
        if applied_set.contains(migration.name) {
            continue;
        }
        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations(name, applied_at) VALUES (?1, ?2)",
            rusqlite::params![migration.name, chrono::Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        tracing::debug!(migration = migration.name, "applied schema migration");
    }

    Ok(())
}
