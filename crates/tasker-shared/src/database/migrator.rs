//! Embedded reference schema, used by `#[sqlx::test(migrator = "...")]` in
//! every integration test across the workspace.

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
