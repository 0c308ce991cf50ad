//! # Step Creator
//!
//! The creation entry point collaborators use to enqueue work. Applies the
//! creation-time defaults before the row is written:
//!
//! - an omitted block becomes a fresh single-step block;
//! - an omitted or zero index collapses to the first position;
//! - an omitted group is inherited from a parent pointing at the block,
//!   else from a sibling already in the block, else freshly allocated.
//!   Inheritance keeps every step of one workflow tree on a single
//!   partition.

use sqlx::PgPool;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::constants::events;
use crate::error::{Result, StepflowError};
use crate::events::EventPublisher;
use crate::models::step::resolve_step_index;
use crate::models::{NewStep, Step};
use crate::orchestration::group_allocator::GroupAllocator;

pub struct StepCreator {
    pool: PgPool,
    allocator: GroupAllocator,
    publisher: EventPublisher,
}

impl StepCreator {
    pub fn new(pool: PgPool, allocator: GroupAllocator, publisher: EventPublisher) -> Self {
        Self {
            pool,
            allocator,
            publisher,
        }
    }

    /// Create a step, resolving defaults and group inheritance
    #[instrument(skip(self, new_step), fields(class = %new_step.class))]
    pub async fn create_step(&self, new_step: NewStep) -> Result<Step> {
        if new_step.class.is_empty() {
            return Err(StepflowError::ValidationError(
                "Step class must not be empty".to_string(),
            ));
        }

        let block_uuid = new_step.block_uuid.unwrap_or_else(Uuid::new_v4);
        let step_index = resolve_step_index(new_step.step_index);
        let group_name = self.resolve_group(&new_step, block_uuid).await?;

        let step = Step::insert(&self.pool, &new_step, block_uuid, step_index, &group_name)
            .await
            .map_err(|e| StepflowError::DatabaseError(format!("Step creation failed: {e}")))?;

        debug!(
            step_id = step.id,
            block_uuid = %step.block_uuid,
            group = %step.group_name,
            step_index = step.step_index,
            "Step created"
        );

        let context = serde_json::json!({
            "step_id": step.id,
            "class": step.class,
            "block_uuid": step.block_uuid,
            "group": step.group_name,
            "step_index": step.step_index,
            "step_type": step.step_type.to_string(),
        });
        self.publisher
            .publish(events::STEP_CREATED, context)
            .await
            .map_err(|e| StepflowError::EventError(e.to_string()))?;

        Ok(step)
    }

    async fn resolve_group(&self, new_step: &NewStep, block_uuid: Uuid) -> Result<String> {
        if let Some(group) = &new_step.group {
            return Ok(group.clone());
        }

        let inherited = Step::inherited_group(&self.pool, block_uuid)
            .await
            .map_err(|e| {
                StepflowError::DatabaseError(format!("Group inheritance lookup failed: {e}"))
            })?;

        Ok(inherited.unwrap_or_else(|| self.allocator.next()))
    }
}
