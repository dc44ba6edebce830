//! Create-post flow: optional title, required content, optional media.

use tracing::info;

use crate::error::Result;
use crate::flows::{ActiveFlow, FlowDeps, FlowInput, FlowOutcome, FlowReply, Step};
use crate::model::{EventKind, MediaAttachment};

/// Scratch state, one variant per prompt.
#[derive(Debug)]
pub enum CreatePostState {
    AwaitingTitle,
    AwaitingContent { title: Option<String> },
    AwaitingMedia { title: Option<String>, content: String },
}

pub(crate) fn start() -> (CreatePostState, FlowReply) {
    (
        CreatePostState::AwaitingTitle,
        FlowReply::Prompt("Send a title for the post, or skip.".to_string()),
    )
}

pub(crate) async fn handle(
    state: CreatePostState,
    input: FlowInput,
    deps: &FlowDeps,
    owner_id: i64,
) -> Result<Step> {
    match state {
        CreatePostState::AwaitingTitle => {
            let title = match input {
                FlowInput::Text(t) if !t.trim().is_empty() => Some(t.trim().to_string()),
                FlowInput::Skip => None,
                _ => {
                    return Ok(Step::Continue(
                        ActiveFlow::CreatePost(CreatePostState::AwaitingTitle),
                        FlowReply::Invalid("Send a title as text, or skip.".to_string()),
                    ));
                }
            };
            Ok(Step::Continue(
                ActiveFlow::CreatePost(CreatePostState::AwaitingContent { title }),
                FlowReply::Prompt("Send the post content.".to_string()),
            ))
        }

        CreatePostState::AwaitingContent { title } => {
            let content = match input {
                FlowInput::Text(c) if !c.trim().is_empty() => c.trim().to_string(),
                _ => {
                    return Ok(Step::Continue(
                        ActiveFlow::CreatePost(CreatePostState::AwaitingContent { title }),
                        FlowReply::Invalid("The content cannot be empty.".to_string()),
                    ));
                }
            };
            Ok(Step::Continue(
                ActiveFlow::CreatePost(CreatePostState::AwaitingMedia { title, content }),
                FlowReply::Prompt(
                    "Attach a photo, video or document, or skip to finish.".to_string(),
                ),
            ))
        }

        CreatePostState::AwaitingMedia { title, content } => {
            let media = match input {
                FlowInput::Media { kind, file_ref } => Some(MediaAttachment { kind, file_ref }),
                FlowInput::Skip => None,
                _ => {
                    return Ok(Step::Continue(
                        ActiveFlow::CreatePost(CreatePostState::AwaitingMedia { title, content }),
                        FlowReply::Invalid(
                            "Attach a photo, video or document, or skip.".to_string(),
                        ),
                    ));
                }
            };

            let post_id = deps
                .repo
                .insert_post(owner_id, title.as_deref(), &content, media.as_ref())
                .await?;

            let display = title.as_deref().unwrap_or("Untitled");
            deps.repo
                .log_event(
                    owner_id,
                    EventKind::PostCreated,
                    &format!("Post '{display}' saved as draft"),
                    None,
                    Some(post_id),
                )
                .await?;
            info!(owner_id, post_id, "Post created");

            // The caller renders per-channel publish-now buttons from this.
            let channels = deps
                .repo
                .list_channels(owner_id)
                .await?
                .iter()
                .map(Into::into)
                .collect();

            Ok(Step::Finished(FlowReply::Done(FlowOutcome::PostCreated {
                post_id,
                channels,
            })))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::delivery::testing::MockAdapter;
    use crate::flows::{FlowEngine, FlowInput, FlowOutcome, FlowReply};
    use crate::model::{EventKind, MediaKind, PostStatus};
    use crate::store::{LibSqlBackend, Repository};

    async fn setup() -> (FlowEngine, Arc<LibSqlBackend>) {
        let repo = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let engine = FlowEngine::new(repo.clone(), Arc::new(MockAdapter::new()));
        (engine, repo)
    }

    #[tokio::test]
    async fn full_flow_with_title_and_photo() {
        let (engine, repo) = setup().await;
        repo.add_channel(1, "@news", "News").await.unwrap();

        engine.start_create_post(1).await;
        engine
            .handle_input(1, FlowInput::Text("Launch".into()))
            .await
            .unwrap();
        engine
            .handle_input(1, FlowInput::Text("We are live!".into()))
            .await
            .unwrap();
        let reply = engine
            .handle_input(
                1,
                FlowInput::Media {
                    kind: MediaKind::Photo,
                    file_ref: "file-1".into(),
                },
            )
            .await
            .unwrap();

        let FlowReply::Done(FlowOutcome::PostCreated { post_id, channels }) = reply else {
            panic!("expected PostCreated, got {reply:?}");
        };
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].destination_id, "@news");

        let post = repo.get_post(post_id).await.unwrap().unwrap();
        assert_eq!(post.title.as_deref(), Some("Launch"));
        assert_eq!(post.content, "We are live!");
        assert_eq!(post.media.unwrap().kind, MediaKind::Photo);
        assert_eq!(post.status, PostStatus::Draft);

        let events = repo.list_events(1, 10).await.unwrap();
        assert_eq!(events[0].kind, EventKind::PostCreated);
        assert_eq!(events[0].post_id, Some(post_id));
    }

    #[tokio::test]
    async fn title_and_media_are_skippable() {
        let (engine, repo) = setup().await;

        engine.start_create_post(1).await;
        engine.handle_input(1, FlowInput::Skip).await.unwrap();
        engine
            .handle_input(1, FlowInput::Text("plain text".into()))
            .await
            .unwrap();
        let reply = engine.handle_input(1, FlowInput::Skip).await.unwrap();

        let FlowReply::Done(FlowOutcome::PostCreated { post_id, .. }) = reply else {
            panic!("expected PostCreated, got {reply:?}");
        };
        let post = repo.get_post(post_id).await.unwrap().unwrap();
        assert!(post.title.is_none());
        assert!(post.media.is_none());
    }

    #[tokio::test]
    async fn empty_content_reprompts() {
        let (engine, _) = setup().await;

        engine.start_create_post(1).await;
        engine.handle_input(1, FlowInput::Skip).await.unwrap();

        let reply = engine
            .handle_input(1, FlowInput::Text("   ".into()))
            .await
            .unwrap();
        assert!(matches!(reply, FlowReply::Invalid(_)));

        // Content cannot be skipped either
        let reply = engine.handle_input(1, FlowInput::Skip).await.unwrap();
        assert!(matches!(reply, FlowReply::Invalid(_)));
        assert!(engine.has_active_flow(1).await);
    }
}
