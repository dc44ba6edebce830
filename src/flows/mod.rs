//! Interactive workflow engine — per-user multi-step flows.
//!
//! Each flow is a small finite-state machine over a sequence of user inputs.
//! The presentation layer maps raw UI events onto [`FlowInput`] values and
//! renders the returned [`FlowReply`]; this module owns only transitions and
//! side effects.
//!
//! One active flow per user. Starting a new flow explicitly replaces any
//! existing one, so stale scratch state from an abandoned flow can never leak
//! into the next. Cancellation is valid in every state and idempotent.

pub mod add_channel;
pub mod create_post;
pub mod multipost;
pub mod schedule;
pub mod timezone;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::delivery::DeliveryAdapter;
use crate::error::Result;
use crate::model::{Channel, DueTime, MediaKind};
use crate::store::Repository;

/// One user input, already shaped by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowInput {
    /// Free text.
    Text(String),
    /// Skip an optional step.
    Skip,
    /// A post picked from a list.
    SelectPost(i64),
    /// A channel picked from a list.
    SelectChannel(String),
    /// Toggle a channel in a working selection set.
    ToggleChannel(String),
    /// Confirm the current selection.
    Confirm,
    /// A media attachment.
    Media { kind: MediaKind, file_ref: String },
}

/// What the engine tells the user after processing an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowReply {
    /// Next prompt; the flow continues.
    Prompt(String),
    /// Input rejected; same state, re-prompt with the reason.
    Invalid(String),
    /// Flow finished successfully.
    Done(FlowOutcome),
    /// Flow cancelled; scratch state discarded.
    Cancelled,
    /// No flow is active for this user.
    NoActiveFlow,
}

/// Terminal result of a completed flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    ChannelAdded {
        destination_id: String,
        display_name: String,
        /// `false` when the channel was already registered.
        newly_added: bool,
    },
    PostCreated {
        post_id: i64,
        /// The owner's channels, for publish-now affordances.
        channels: Vec<ChannelRef>,
    },
    Multipost(MultipostSummary),
    Scheduled {
        item_id: i64,
        due_at: DueTime,
        destination_name: String,
    },
    TimezoneSet(String),
}

/// Lightweight channel reference for outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    pub destination_id: String,
    pub display_name: String,
}

impl From<&Channel> for ChannelRef {
    fn from(ch: &Channel) -> Self {
        Self {
            destination_id: ch.destination_id.clone(),
            display_name: ch.display_name.clone(),
        }
    }
}

/// Per-destination results of one multipost fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipostSummary {
    pub post_id: i64,
    /// Display names of destinations that received the post.
    pub delivered: Vec<String>,
    /// (display name, error detail) for each destination that did not.
    pub failed: Vec<(String, String)>,
}

/// Shared collaborators handed to every flow step.
#[derive(Clone)]
pub struct FlowDeps {
    pub repo: Arc<dyn Repository>,
    pub adapter: Arc<dyn DeliveryAdapter>,
}

/// Scratch state of the one flow a user currently has active.
///
/// Tagged union over the flow kinds; each variant carries only its own
/// fields, so nothing can bleed between unrelated flows.
#[derive(Debug)]
pub enum ActiveFlow {
    AddChannel(add_channel::AddChannelState),
    CreatePost(create_post::CreatePostState),
    Multipost(multipost::MultipostState),
    Schedule(schedule::ScheduleState),
    Timezone(timezone::TimezoneState),
}

/// Result of feeding one input to a flow: either a new state to keep, or a
/// terminal reply.
pub(crate) enum Step {
    Continue(ActiveFlow, FlowReply),
    Finished(FlowReply),
}

/// The engine: a session store plus the per-flow transition functions.
pub struct FlowEngine {
    deps: FlowDeps,
    sessions: RwLock<HashMap<i64, ActiveFlow>>,
}

impl FlowEngine {
    pub fn new(repo: Arc<dyn Repository>, adapter: Arc<dyn DeliveryAdapter>) -> Self {
        Self {
            deps: FlowDeps { repo, adapter },
            sessions: RwLock::new(HashMap::new()),
        }
    }

    // ── Entry points ────────────────────────────────────────────────

    pub async fn start_add_channel(&self, owner_id: i64) -> FlowReply {
        let (state, reply) = add_channel::start();
        self.replace(owner_id, ActiveFlow::AddChannel(state)).await;
        reply
    }

    pub async fn start_create_post(&self, owner_id: i64) -> FlowReply {
        let (state, reply) = create_post::start();
        self.replace(owner_id, ActiveFlow::CreatePost(state)).await;
        reply
    }

    pub async fn start_multipost(&self, owner_id: i64) -> FlowReply {
        let (state, reply) = multipost::start();
        self.replace(owner_id, ActiveFlow::Multipost(state)).await;
        reply
    }

    pub async fn start_schedule(&self, owner_id: i64) -> FlowReply {
        let (state, reply) = schedule::start();
        self.replace(owner_id, ActiveFlow::Schedule(state)).await;
        reply
    }

    pub async fn start_set_timezone(&self, owner_id: i64) -> FlowReply {
        let (state, reply) = timezone::start();
        self.replace(owner_id, ActiveFlow::Timezone(state)).await;
        reply
    }

    // ── Input and cancellation ──────────────────────────────────────

    /// Feed one input to the user's active flow.
    ///
    /// The session entry is taken out of the map while the step runs; a
    /// continuing flow is put back, a finished one stays removed.
    pub async fn handle_input(&self, owner_id: i64, input: FlowInput) -> Result<FlowReply> {
        let Some(flow) = self.sessions.write().await.remove(&owner_id) else {
            return Ok(FlowReply::NoActiveFlow);
        };

        let step = match flow {
            ActiveFlow::AddChannel(state) => {
                add_channel::handle(state, input, &self.deps, owner_id).await?
            }
            ActiveFlow::CreatePost(state) => {
                create_post::handle(state, input, &self.deps, owner_id).await?
            }
            ActiveFlow::Multipost(state) => {
                multipost::handle(state, input, &self.deps, owner_id).await?
            }
            ActiveFlow::Schedule(state) => {
                schedule::handle(state, input, &self.deps, owner_id).await?
            }
            ActiveFlow::Timezone(state) => {
                timezone::handle(state, input, &self.deps, owner_id).await?
            }
        };

        match step {
            Step::Continue(next, reply) => {
                self.sessions.write().await.insert(owner_id, next);
                Ok(reply)
            }
            Step::Finished(reply) => {
                debug!(owner_id, "Flow finished");
                Ok(reply)
            }
        }
    }

    /// Cancel the user's active flow, if any. Idempotent.
    pub async fn cancel(&self, owner_id: i64) -> FlowReply {
        match self.sessions.write().await.remove(&owner_id) {
            Some(_) => {
                debug!(owner_id, "Flow cancelled");
                FlowReply::Cancelled
            }
            None => FlowReply::NoActiveFlow,
        }
    }

    /// Whether the user currently has a flow in progress.
    pub async fn has_active_flow(&self, owner_id: i64) -> bool {
        self.sessions.read().await.contains_key(&owner_id)
    }

    async fn replace(&self, owner_id: i64, flow: ActiveFlow) {
        let previous = self.sessions.write().await.insert(owner_id, flow);
        if previous.is_some() {
            debug!(owner_id, "Superseding abandoned flow");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::testing::MockAdapter;
    use crate::store::LibSqlBackend;

    async fn engine() -> FlowEngine {
        let repo = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let adapter = Arc::new(MockAdapter::new());
        FlowEngine::new(repo, adapter)
    }

    #[tokio::test]
    async fn cancel_without_active_flow_is_a_noop() {
        let engine = engine().await;
        assert_eq!(engine.cancel(42).await, FlowReply::NoActiveFlow);
        // Still a no-op the second time
        assert_eq!(engine.cancel(42).await, FlowReply::NoActiveFlow);
    }

    #[tokio::test]
    async fn input_without_active_flow_is_rejected_softly() {
        let engine = engine().await;
        let reply = engine
            .handle_input(42, FlowInput::Text("hello".into()))
            .await
            .unwrap();
        assert_eq!(reply, FlowReply::NoActiveFlow);
    }

    #[tokio::test]
    async fn cancel_discards_scratch_state() {
        let engine = engine().await;
        engine.start_add_channel(42).await;
        assert!(engine.has_active_flow(42).await);

        assert_eq!(engine.cancel(42).await, FlowReply::Cancelled);
        assert!(!engine.has_active_flow(42).await);

        let reply = engine
            .handle_input(42, FlowInput::Text("@news".into()))
            .await
            .unwrap();
        assert_eq!(reply, FlowReply::NoActiveFlow);
    }

    #[tokio::test]
    async fn starting_a_flow_supersedes_the_previous_one() {
        let engine = engine().await;
        engine.start_create_post(42).await;
        // Feed a title into the create-post flow, then abandon it
        engine
            .handle_input(42, FlowInput::Text("Old title".into()))
            .await
            .unwrap();

        // New flow replaces the old scratch state entirely
        engine.start_set_timezone(42).await;
        let reply = engine
            .handle_input(42, FlowInput::Text("Europe/Paris".into()))
            .await
            .unwrap();
        assert_eq!(
            reply,
            FlowReply::Done(FlowOutcome::TimezoneSet("Europe/Paris".into()))
        );
        assert!(!engine.has_active_flow(42).await);
    }

    #[tokio::test]
    async fn flows_are_independent_per_user() {
        let engine = engine().await;
        engine.start_set_timezone(1).await;
        engine.start_add_channel(2).await;

        let reply = engine
            .handle_input(1, FlowInput::Text("UTC".into()))
            .await
            .unwrap();
        assert_eq!(reply, FlowReply::Done(FlowOutcome::TimezoneSet("UTC".into())));

        // User 2's flow is untouched
        assert!(engine.has_active_flow(2).await);
    }
}
