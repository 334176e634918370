//! Generic guarded-transition engine shared by [`super::TaskStateMachine`] and
//! [`super::StepStateMachine`] (§4.6, DESIGN NOTES).
//!
//! Both entities need the exact same dance: lock the entity row, read the
//! current `most_recent` transition, check the guard, flip `most_recent` on the
//! old row, insert the new one with the next `sort_key`, all in one
//! transaction. Rather than duplicate that dance per entity, each entity
//! implements [`TransitionLog`] and calls [`transition`].

use std::fmt::Display;
use std::str::FromStr;

use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::{TaskerError, TaskerResult};

/// Describes how a concrete entity's transition log is persisted and guarded.
pub trait TransitionLog {
    type State: Copy + PartialEq + Display + FromStr + Send + Sync;

    fn entity_table(&self) -> &'static str;
    fn transition_table(&self) -> &'static str;
    fn entity_id_column(&self) -> &'static str;
    fn entity_uuid(&self) -> Uuid;
    fn default_state(&self) -> Self::State;
    fn is_legal(&self, from: Self::State, to: Self::State) -> bool;
}

/// The outcome of a single guarded transition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// A new transition row was inserted; the entity moved `from -> to`.
    Applied,
    /// The entity was already in the target state and `idempotent` was set;
    /// no new row was inserted (§4.6, §8 property 7).
    NoOpAlreadyInTargetState,
}

/// Applies a guarded transition for one entity, inside a single database
/// transaction. Returns [`TransitionOutcome::Applied`] on success, or
/// [`TaskerError::StateTransitionFailed`] if the guard rejects the move.
pub async fn transition<L: TransitionLog>(
    log: &L,
    pool: &PgPool,
    to: L::State,
    processor_uuid: Uuid,
    metadata: Value,
    idempotent: bool,
) -> TaskerResult<TransitionOutcome> {
    let mut tx = pool.begin().await?;

    // Row-level lock on the entity: writers to this entity's transitions are
    // serialized (§5 shared-resource policy).
    let lock_sql = format!(
        "SELECT 1 FROM {} WHERE {} = $1 FOR UPDATE",
        log.entity_table(),
        log.entity_id_column()
    );
    sqlx::query(&lock_sql)
        .bind(log.entity_uuid())
        .fetch_optional(&mut *tx)
        .await?;

    let current_sql = format!(
        "SELECT to_state, sort_key FROM {} WHERE entity_uuid = $1 AND most_recent = true",
        log.transition_table()
    );
    let current_row: Option<(String, i64)> = sqlx::query_as(&current_sql)
        .bind(log.entity_uuid())
        .fetch_optional(&mut *tx)
        .await?;

    let (current_state, last_sort_key) = match &current_row {
        Some((state_str, sort_key)) => {
            let parsed = L::State::from_str(state_str).map_err(|_| {
                TaskerError::ValidationError(format!(
                    "corrupt transition row: unrecognized state {state_str}"
                ))
            })?;
            (parsed, *sort_key)
        }
        None => (log.default_state(), 0),
    };

    if idempotent && state_eq(current_state, to) {
        tx.commit().await?;
        return Ok(TransitionOutcome::NoOpAlreadyInTargetState);
    }

    if !log.is_legal(current_state, to) {
        return Err(TaskerError::StateTransitionFailed {
            entity_type: log.entity_table().to_string(),
            entity_uuid: log.entity_uuid(),
            reason: format!("illegal transition {current_state} -> {to}"),
        });
    }

    let clear_sql = format!(
        "UPDATE {} SET most_recent = false WHERE entity_uuid = $1 AND most_recent = true",
        log.transition_table()
    );
    sqlx::query(&clear_sql)
        .bind(log.entity_uuid())
        .execute(&mut *tx)
        .await?;

    let insert_sql = format!(
        "INSERT INTO {} (id, entity_uuid, from_state, to_state, metadata, sort_key, most_recent, processor_uuid, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, true, $7, now())",
        log.transition_table()
    );
    sqlx::query(&insert_sql)
        .bind(Uuid::now_v7())
        .bind(log.entity_uuid())
        .bind(current_row.as_ref().map(|(s, _)| s.clone()))
        .bind(to.to_string())
        .bind(metadata)
        .bind(last_sort_key + 1)
        .bind(processor_uuid)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(TransitionOutcome::Applied)
}

fn state_eq<S: PartialEq>(a: S, b: S) -> bool {
    a == b
}
