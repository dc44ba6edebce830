//! Add-channel flow: one prompt, resolve the destination, register it.

use tracing::info;

use crate::error::Result;
use crate::flows::{ActiveFlow, FlowDeps, FlowInput, FlowOutcome, FlowReply, Step};
use crate::model::EventKind;

/// Scratch state. A single input state: waiting for the identifier.
#[derive(Debug)]
pub struct AddChannelState;

pub(crate) fn start() -> (AddChannelState, FlowReply) {
    (
        AddChannelState,
        FlowReply::Prompt(
            "Send the channel identifier (e.g. @channelname or a numeric id).".to_string(),
        ),
    )
}

pub(crate) async fn handle(
    state: AddChannelState,
    input: FlowInput,
    deps: &FlowDeps,
    owner_id: i64,
) -> Result<Step> {
    let FlowInput::Text(identifier) = input else {
        return Ok(Step::Continue(
            ActiveFlow::AddChannel(state),
            FlowReply::Invalid("Send the channel identifier as text.".to_string()),
        ));
    };

    // Resolution failure keeps the flow alive; the user can retry or cancel.
    let resolved = match deps.adapter.resolve_destination(&identifier).await {
        Ok(resolved) => resolved,
        Err(e) => {
            return Ok(Step::Continue(
                ActiveFlow::AddChannel(state),
                FlowReply::Invalid(format!("Cannot use that channel: {e}. Try another one.")),
            ));
        }
    };

    let newly_added = deps
        .repo
        .add_channel(owner_id, &resolved.destination_id, &resolved.display_name)
        .await?;

    if newly_added {
        deps.repo
            .log_event(
                owner_id,
                EventKind::ChannelAdded,
                &format!("Added channel {}", resolved.display_name),
                Some(&resolved.destination_id),
                None,
            )
            .await?;
        info!(owner_id, destination_id = %resolved.destination_id, "Channel added");
    }

    Ok(Step::Finished(FlowReply::Done(FlowOutcome::ChannelAdded {
        destination_id: resolved.destination_id,
        display_name: resolved.display_name,
        newly_added,
    })))
}
