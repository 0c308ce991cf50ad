use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use stepflow_core::models::{Step, StepType};
use stepflow_core::state_machine::StepState;

/// Factory for planting step rows directly, including concluded states the
/// public creation path would never produce
#[derive(Debug, Clone)]
pub struct StepFactory {
    class: String,
    arguments: serde_json::Value,
    queue: String,
    block_uuid: Uuid,
    child_block_uuid: Option<Uuid>,
    step_index: i32,
    step_type: StepType,
    group_name: String,
    priority: i32,
    state: StepState,
    dispatch_after: Option<DateTime<Utc>>,
    relatable: Option<(String, i64)>,
}

impl Default for StepFactory {
    fn default() -> Self {
        Self {
            class: "orders::PlaceOrder".to_string(),
            arguments: serde_json::json!({"symbol": "BTC-USDT"}),
            queue: "trading".to_string(),
            block_uuid: Uuid::new_v4(),
            child_block_uuid: None,
            step_index: 1,
            step_type: StepType::Default,
            group_name: "fast".to_string(),
            priority: 0,
            state: StepState::Pending,
            dispatch_after: None,
            relatable: None,
        }
    }
}

impl StepFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.class = class.to_string();
        self
    }

    pub fn in_block(mut self, block_uuid: Uuid) -> Self {
        self.block_uuid = block_uuid;
        self
    }

    pub fn with_child_block(mut self, child_block_uuid: Uuid) -> Self {
        self.child_block_uuid = Some(child_block_uuid);
        self
    }

    pub fn at_index(mut self, step_index: i32) -> Self {
        self.step_index = step_index;
        self
    }

    pub fn resolve_exception(mut self) -> Self {
        self.step_type = StepType::ResolveException;
        self
    }

    pub fn in_group(mut self, group_name: &str) -> Self {
        self.group_name = group_name.to_string();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn in_state(mut self, state: StepState) -> Self {
        self.state = state;
        self
    }

    pub fn dispatch_after(mut self, instant: DateTime<Utc>) -> Self {
        self.dispatch_after = Some(instant);
        self
    }

    pub fn for_relatable(mut self, kind: &str, id: i64) -> Self {
        self.relatable = Some((kind.to_string(), id));
        self
    }

    pub async fn create(&self, pool: &PgPool) -> Step {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO stepflow_steps (
                 block_uuid, child_block_uuid, step_index, step_type, class,
                 arguments, queue, group_name, priority, state,
                 dispatch_after, relatable_kind, relatable_id
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             RETURNING id",
        )
        .bind(self.block_uuid)
        .bind(self.child_block_uuid)
        .bind(self.step_index)
        .bind(self.step_type.to_string())
        .bind(&self.class)
        .bind(&self.arguments)
        .bind(&self.queue)
        .bind(&self.group_name)
        .bind(self.priority)
        .bind(self.state.to_string())
        .bind(self.dispatch_after)
        .bind(self.relatable.as_ref().map(|(kind, _)| kind.clone()))
        .bind(self.relatable.as_ref().map(|(_, id)| *id))
        .fetch_one(pool)
        .await
        .expect("step factory insert");

        Step::find_by_id(pool, id)
            .await
            .expect("step factory fetch")
            .expect("step factory row")
    }
}

/// Factory for dispatcher lock rows with a controlled claim state and age
#[derive(Debug, Clone)]
pub struct DispatcherFactory {
    group_name: Option<String>,
    can_dispatch: bool,
    age_seconds: f64,
}

impl Default for DispatcherFactory {
    fn default() -> Self {
        Self {
            group_name: Some("fast".to_string()),
            can_dispatch: true,
            age_seconds: 0.0,
        }
    }
}

impl DispatcherFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_group(mut self, group_name: &str) -> Self {
        self.group_name = Some(group_name.to_string());
        self
    }

    pub fn global(mut self) -> Self {
        self.group_name = None;
        self
    }

    pub fn claimed(mut self) -> Self {
        self.can_dispatch = false;
        self
    }

    pub fn aged_seconds(mut self, age_seconds: f64) -> Self {
        self.age_seconds = age_seconds;
        self
    }

    pub async fn create(&self, pool: &PgPool) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO stepflow_steps_dispatchers (group_name, can_dispatch, updated_at)
             VALUES ($1, $2, NOW() - make_interval(secs => $3))
             RETURNING id",
        )
        .bind(self.group_name.as_deref())
        .bind(self.can_dispatch)
        .bind(self.age_seconds)
        .fetch_one(pool)
        .await
        .expect("dispatcher factory insert")
    }
}
