//! # Step Discovery
//!
//! Resolves which steps of a claimed group are dispatchable right now:
//! pending default-type steps whose throttle instant has passed and whose
//! previous block index has concluded. The SQL prefilter narrows the
//! candidate set; the sequencing gates are evaluated over one batched
//! sibling fetch per discovery pass.

use std::collections::HashMap;

use sqlx::PgPool;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{Result, StepflowError};
use crate::models::step::previous_index_gate;
use crate::models::{BlockSibling, Step};

pub struct StepDiscovery {
    pool: PgPool,
}

impl StepDiscovery {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Dispatchable steps of a group, ordered by priority then block
    /// position
    #[instrument(skip(self))]
    pub async fn dispatchable_steps(&self, group: Option<&str>) -> Result<Vec<Step>> {
        let candidates = Step::dispatch_candidates(&self.pool, group)
            .await
            .map_err(|e| StepflowError::DatabaseError(format!("Dispatch query failed: {e}")))?;

        if candidates.is_empty() {
            return Ok(candidates);
        }

        let mut block_uuids: Vec<Uuid> = candidates.iter().map(|s| s.block_uuid).collect();
        block_uuids.sort_unstable();
        block_uuids.dedup();

        let siblings = Step::block_siblings(&self.pool, &block_uuids)
            .await
            .map_err(|e| StepflowError::DatabaseError(format!("Sibling fetch failed: {e}")))?;

        let mut by_block: HashMap<Uuid, Vec<BlockSibling>> = HashMap::new();
        for sibling in siblings {
            by_block.entry(sibling.block_uuid).or_default().push(sibling);
        }

        let total = candidates.len();
        let dispatchable: Vec<Step> = candidates
            .into_iter()
            .filter(|step| {
                by_block
                    .get(&step.block_uuid)
                    .map(|block| previous_index_gate(block, step.id, step.step_index))
                    .unwrap_or(false)
            })
            .collect();

        debug!(
            candidates = total,
            dispatchable = dispatchable.len(),
            "Step discovery pass"
        );

        Ok(dispatchable)
    }
}
