//! Schedule-post flow: pick a post, pick a channel, set a future due time.
//!
//! The due time must parse as `YYYY-MM-DD HH:MM` and be strictly in the
//! future (UTC, minute granularity). The post's content and media are
//! snapshotted into the scheduled item, so later edits or deletion of the
//! post never change what gets delivered.

use tracing::info;

use crate::error::Result;
use crate::flows::{ActiveFlow, FlowDeps, FlowInput, FlowOutcome, FlowReply, Step};
use crate::model::{Channel, DueTime, EventKind, NewScheduledItem, Post};

#[derive(Debug)]
pub enum ScheduleState {
    SelectingPost,
    SelectingChannel { post: Post },
    AwaitingDueTime { post: Post, channel: Channel },
}

pub(crate) fn start() -> (ScheduleState, FlowReply) {
    (
        ScheduleState::SelectingPost,
        FlowReply::Prompt("Pick the post to schedule.".to_string()),
    )
}

pub(crate) async fn handle(
    state: ScheduleState,
    input: FlowInput,
    deps: &FlowDeps,
    owner_id: i64,
) -> Result<Step> {
    match state {
        ScheduleState::SelectingPost => {
            let FlowInput::SelectPost(post_id) = input else {
                return Ok(Step::Continue(
                    ActiveFlow::Schedule(ScheduleState::SelectingPost),
                    FlowReply::Invalid("Pick one of your posts.".to_string()),
                ));
            };

            let post = deps.repo.get_post(post_id).await?;
            let Some(post) = post.filter(|p| p.owner_id == owner_id) else {
                return Ok(Step::Continue(
                    ActiveFlow::Schedule(ScheduleState::SelectingPost),
                    FlowReply::Invalid("Post not found.".to_string()),
                ));
            };

            Ok(Step::Continue(
                ActiveFlow::Schedule(ScheduleState::SelectingChannel { post }),
                FlowReply::Prompt("Pick the channel to deliver to.".to_string()),
            ))
        }

        ScheduleState::SelectingChannel { post } => {
            let FlowInput::SelectChannel(destination_id) = input else {
                return Ok(Step::Continue(
                    ActiveFlow::Schedule(ScheduleState::SelectingChannel { post }),
                    FlowReply::Invalid("Pick one of your channels.".to_string()),
                ));
            };

            let Some(channel) = deps.repo.get_channel(owner_id, &destination_id).await? else {
                return Ok(Step::Continue(
                    ActiveFlow::Schedule(ScheduleState::SelectingChannel { post }),
                    FlowReply::Invalid("That channel is not registered.".to_string()),
                ));
            };

            Ok(Step::Continue(
                ActiveFlow::Schedule(ScheduleState::AwaitingDueTime { post, channel }),
                FlowReply::Prompt(
                    "Send the delivery time as YYYY-MM-DD HH:MM (UTC).".to_string(),
                ),
            ))
        }

        ScheduleState::AwaitingDueTime { post, channel } => {
            let FlowInput::Text(raw) = input else {
                return Ok(Step::Continue(
                    ActiveFlow::Schedule(ScheduleState::AwaitingDueTime { post, channel }),
                    FlowReply::Invalid("Send the time as text: YYYY-MM-DD HH:MM.".to_string()),
                ));
            };

            let Ok(due_at) = DueTime::parse(&raw) else {
                return Ok(Step::Continue(
                    ActiveFlow::Schedule(ScheduleState::AwaitingDueTime { post, channel }),
                    FlowReply::Invalid(
                        "That is not a valid time. Use YYYY-MM-DD HH:MM.".to_string(),
                    ),
                ));
            };

            if !due_at.is_future(&DueTime::now_utc()) {
                return Ok(Step::Continue(
                    ActiveFlow::Schedule(ScheduleState::AwaitingDueTime { post, channel }),
                    FlowReply::Invalid("The time must be in the future.".to_string()),
                ));
            }

            let item = NewScheduledItem::snapshot(&post, &channel, due_at.clone());
            let item_id = deps.repo.insert_scheduled(&item).await?;
            deps.repo
                .log_event(
                    owner_id,
                    EventKind::PostScheduled,
                    &format!(
                        "Post '{}' scheduled for {} to {}",
                        post.title_or_untitled(),
                        due_at,
                        channel.display_name
                    ),
                    Some(&channel.destination_id),
                    Some(post.id),
                )
                .await?;
            info!(owner_id, item_id, due_at = %due_at, "Post scheduled");

            Ok(Step::Finished(FlowReply::Done(FlowOutcome::Scheduled {
                item_id,
                due_at,
                destination_name: channel.display_name,
            })))
        }
    }
}
