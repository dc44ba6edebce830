//! Multipost flow: pick a post, toggle-select channels, fan out.
//!
//! Deliveries are independent: one failing destination never aborts the
//! rest. Successful destinations each get a `multipost_sent` audit entry;
//! failures only appear in the returned summary.

use tracing::{info, warn};

use crate::delivery::DeliveryContent;
use crate::error::Result;
use crate::flows::{
    ActiveFlow, ChannelRef, FlowDeps, FlowInput, FlowOutcome, FlowReply, MultipostSummary, Step,
};
use crate::model::{EventKind, Post};

#[derive(Debug)]
pub enum MultipostState {
    SelectingPost,
    SelectingChannels {
        post: Post,
        /// Working selection set, in toggle order.
        selected: Vec<ChannelRef>,
    },
}

pub(crate) fn start() -> (MultipostState, FlowReply) {
    (
        MultipostState::SelectingPost,
        FlowReply::Prompt("Pick the post to send.".to_string()),
    )
}

pub(crate) async fn handle(
    state: MultipostState,
    input: FlowInput,
    deps: &FlowDeps,
    owner_id: i64,
) -> Result<Step> {
    match state {
        MultipostState::SelectingPost => {
            let FlowInput::SelectPost(post_id) = input else {
                return Ok(Step::Continue(
                    ActiveFlow::Multipost(MultipostState::SelectingPost),
                    FlowReply::Invalid("Pick one of your posts.".to_string()),
                ));
            };

            let post = deps.repo.get_post(post_id).await?;
            let Some(post) = post.filter(|p| p.owner_id == owner_id) else {
                return Ok(Step::Continue(
                    ActiveFlow::Multipost(MultipostState::SelectingPost),
                    FlowReply::Invalid("Post not found.".to_string()),
                ));
            };

            Ok(Step::Continue(
                ActiveFlow::Multipost(MultipostState::SelectingChannels {
                    post,
                    selected: Vec::new(),
                }),
                FlowReply::Prompt(
                    "Toggle the channels to send to, then confirm.".to_string(),
                ),
            ))
        }

        MultipostState::SelectingChannels { post, mut selected } => match input {
            FlowInput::ToggleChannel(destination_id) => {
                if let Some(pos) = selected
                    .iter()
                    .position(|c| c.destination_id == destination_id)
                {
                    selected.remove(pos);
                } else {
                    let Some(channel) = deps.repo.get_channel(owner_id, &destination_id).await?
                    else {
                        return Ok(Step::Continue(
                            ActiveFlow::Multipost(MultipostState::SelectingChannels {
                                post,
                                selected,
                            }),
                            FlowReply::Invalid("That channel is not registered.".to_string()),
                        ));
                    };
                    selected.push(ChannelRef::from(&channel));
                }

                let reply = FlowReply::Prompt(format!(
                    "{} channel(s) selected. Toggle more or confirm.",
                    selected.len()
                ));
                Ok(Step::Continue(
                    ActiveFlow::Multipost(MultipostState::SelectingChannels { post, selected }),
                    reply,
                ))
            }

            FlowInput::Confirm => {
                if selected.is_empty() {
                    // Selection state survives, nothing is lost.
                    return Ok(Step::Continue(
                        ActiveFlow::Multipost(MultipostState::SelectingChannels {
                            post,
                            selected,
                        }),
                        FlowReply::Invalid("Select at least one channel.".to_string()),
                    ));
                }

                let summary = fan_out(deps, owner_id, &post, &selected).await?;
                Ok(Step::Finished(FlowReply::Done(FlowOutcome::Multipost(
                    summary,
                ))))
            }

            _ => Ok(Step::Continue(
                ActiveFlow::Multipost(MultipostState::SelectingChannels { post, selected }),
                FlowReply::Invalid("Toggle a channel or confirm.".to_string()),
            )),
        },
    }
}

/// Deliver a post to every selected destination, collecting per-destination
/// results.
async fn fan_out(
    deps: &FlowDeps,
    owner_id: i64,
    post: &Post,
    selected: &[ChannelRef],
) -> Result<MultipostSummary> {
    let content = DeliveryContent::from_post(post);
    let mut delivered = Vec::new();
    let mut failed = Vec::new();

    for channel in selected {
        match deps.adapter.deliver(&channel.destination_id, &content).await {
            Ok(()) => {
                // The message is out; a failed audit write must not stop
                // the remaining destinations.
                if let Err(e) = deps
                    .repo
                    .log_event(
                        owner_id,
                        EventKind::MultipostSent,
                        &format!(
                            "Post '{}' sent to {}",
                            post.title_or_untitled(),
                            channel.display_name
                        ),
                        Some(&channel.destination_id),
                        Some(post.id),
                    )
                    .await
                {
                    warn!(
                        owner_id,
                        post_id = post.id,
                        destination_id = %channel.destination_id,
                        "Could not record multipost event: {e}"
                    );
                }
                delivered.push(channel.display_name.clone());
            }
            Err(e) => {
                warn!(
                    owner_id,
                    post_id = post.id,
                    destination_id = %channel.destination_id,
                    "Multipost delivery failed: {e}"
                );
                failed.push((channel.display_name.clone(), e.to_string()));
            }
        }
    }

    info!(
        owner_id,
        post_id = post.id,
        delivered = delivered.len(),
        failed = failed.len(),
        "Multipost finished"
    );
    Ok(MultipostSummary {
        post_id: post.id,
        delivered,
        failed,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::delivery::testing::MockAdapter;
    use crate::flows::{FlowEngine, FlowInput, FlowOutcome, FlowReply};
    use crate::model::EventKind;
    use crate::store::testing::FaultyRepository;
    use crate::store::{LibSqlBackend, Repository};

    async fn setup() -> (FlowEngine, Arc<LibSqlBackend>, Arc<MockAdapter>) {
        let repo = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let adapter = Arc::new(MockAdapter::new());
        let engine = FlowEngine::new(repo.clone(), adapter.clone());
        (engine, repo, adapter)
    }

    async fn seed_post(repo: &LibSqlBackend, owner: i64) -> i64 {
        repo.insert_post(owner, Some("Title"), "Body", None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn one_failing_destination_does_not_abort_the_rest() {
        let (engine, repo, adapter) = setup().await;
        for dest in ["@a", "@b", "@c"] {
            repo.add_channel(1, dest, dest.trim_start_matches('@'))
                .await
                .unwrap();
        }
        adapter.fail_destination("@b");
        let post_id = seed_post(&repo, 1).await;

        engine.start_multipost(1).await;
        engine
            .handle_input(1, FlowInput::SelectPost(post_id))
            .await
            .unwrap();
        for dest in ["@a", "@b", "@c"] {
            engine
                .handle_input(1, FlowInput::ToggleChannel(dest.into()))
                .await
                .unwrap();
        }
        let reply = engine.handle_input(1, FlowInput::Confirm).await.unwrap();

        let FlowReply::Done(FlowOutcome::Multipost(summary)) = reply else {
            panic!("expected Multipost outcome, got {reply:?}");
        };
        assert_eq!(summary.post_id, post_id);
        assert_eq!(summary.delivered, vec!["a", "c"]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "b");

        // Exactly one multipost_sent per success, none for the failure
        let events = repo.list_events(1, 30).await.unwrap();
        let sent: Vec<_> = events
            .iter()
            .filter(|e| e.kind == EventKind::MultipostSent)
            .collect();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|e| e.destination_id.as_deref() != Some("@b")));

        assert_eq!(adapter.delivered_to(), vec!["@a", "@c"]);
    }

    #[tokio::test]
    async fn audit_write_failure_does_not_abort_remaining_deliveries() {
        let backend = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let repo = Arc::new(FaultyRepository::wrap(backend.clone()));
        let adapter = Arc::new(MockAdapter::new());
        let engine = FlowEngine::new(repo.clone(), adapter.clone());

        for dest in ["@a", "@b"] {
            backend
                .add_channel(1, dest, dest.trim_start_matches('@'))
                .await
                .unwrap();
        }
        let post_id = seed_post(&backend, 1).await;
        repo.fail_log_event();

        engine.start_multipost(1).await;
        engine
            .handle_input(1, FlowInput::SelectPost(post_id))
            .await
            .unwrap();
        for dest in ["@a", "@b"] {
            engine
                .handle_input(1, FlowInput::ToggleChannel(dest.into()))
                .await
                .unwrap();
        }
        let reply = engine.handle_input(1, FlowInput::Confirm).await.unwrap();

        let FlowReply::Done(FlowOutcome::Multipost(summary)) = reply else {
            panic!("expected Multipost outcome, got {reply:?}");
        };
        assert_eq!(summary.delivered, vec!["a", "b"]);
        assert!(summary.failed.is_empty());
        assert_eq!(adapter.delivered_to(), vec!["@a", "@b"]);

        // No audit entries could be written; deliveries happened anyway
        assert!(backend.list_events(1, 30).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn toggle_is_idempotent_add_remove() {
        let (engine, repo, adapter) = setup().await;
        repo.add_channel(1, "@a", "a").await.unwrap();
        let post_id = seed_post(&repo, 1).await;

        engine.start_multipost(1).await;
        engine
            .handle_input(1, FlowInput::SelectPost(post_id))
            .await
            .unwrap();

        // On, off, on again: ends selected exactly once
        for _ in 0..3 {
            engine
                .handle_input(1, FlowInput::ToggleChannel("@a".into()))
                .await
                .unwrap();
        }
        let reply = engine.handle_input(1, FlowInput::Confirm).await.unwrap();
        let FlowReply::Done(FlowOutcome::Multipost(summary)) = reply else {
            panic!("expected Multipost outcome");
        };
        assert_eq!(summary.delivered, vec!["a"]);
        assert_eq!(adapter.delivery_count(), 1);
    }

    #[tokio::test]
    async fn confirm_with_empty_selection_keeps_the_state() {
        let (engine, repo, _) = setup().await;
        repo.add_channel(1, "@a", "a").await.unwrap();
        let post_id = seed_post(&repo, 1).await;

        engine.start_multipost(1).await;
        engine
            .handle_input(1, FlowInput::SelectPost(post_id))
            .await
            .unwrap();

        let reply = engine.handle_input(1, FlowInput::Confirm).await.unwrap();
        assert!(matches!(reply, FlowReply::Invalid(_)));

        // The flow is still in channel selection; a toggle then confirm works
        engine
            .handle_input(1, FlowInput::ToggleChannel("@a".into()))
            .await
            .unwrap();
        let reply = engine.handle_input(1, FlowInput::Confirm).await.unwrap();
        assert!(matches!(reply, FlowReply::Done(_)));
    }

    #[tokio::test]
    async fn foreign_post_is_not_selectable() {
        let (engine, repo, _) = setup().await;
        let foreign = seed_post(&repo, 99).await;

        engine.start_multipost(1).await;
        let reply = engine
            .handle_input(1, FlowInput::SelectPost(foreign))
            .await
            .unwrap();
        assert_eq!(reply, FlowReply::Invalid("Post not found.".into()));
    }
}
