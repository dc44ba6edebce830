//! Set-timezone flow: a single free-text prompt.
//!
//! Validation is non-empty only. The value is stored on the user's settings
//! and surfaces in the UI; scheduling itself stays naive UTC.

use tracing::info;

use crate::error::Result;
use crate::flows::{ActiveFlow, FlowDeps, FlowInput, FlowOutcome, FlowReply, Step};
use crate::model::{EventKind, SettingsValue};

#[derive(Debug)]
pub struct TimezoneState;

pub(crate) fn start() -> (TimezoneState, FlowReply) {
    (
        TimezoneState,
        FlowReply::Prompt("Send your timezone (e.g. Europe/Paris).".to_string()),
    )
}

pub(crate) async fn handle(
    state: TimezoneState,
    input: FlowInput,
    deps: &FlowDeps,
    owner_id: i64,
) -> Result<Step> {
    let timezone = match input {
        FlowInput::Text(t) if !t.trim().is_empty() => t.trim().to_string(),
        _ => {
            return Ok(Step::Continue(
                ActiveFlow::Timezone(state),
                FlowReply::Invalid("Send a non-empty timezone name.".to_string()),
            ));
        }
    };

    deps.repo
        .update_setting(owner_id, SettingsValue::Timezone(timezone.clone()))
        .await?;
    deps.repo
        .log_event(
            owner_id,
            EventKind::SettingsChanged,
            &format!("Timezone set to {timezone}"),
            None,
            None,
        )
        .await?;
    info!(owner_id, timezone = %timezone, "Timezone updated");

    Ok(Step::Finished(FlowReply::Done(FlowOutcome::TimezoneSet(
        timezone,
    ))))
}
