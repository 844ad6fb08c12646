//! API data transfer objects.
//!
//! These types define the API contract shared between the server and
//! clients.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::signal::{AntidelaySeconds, Signal};

/// What the alarm surface shows.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct AlarmView {
    pub ringing: bool,
    /// The signal on display while ringing: the first one of the session.
    pub signal: Option<Signal>,
    /// Every signal ringing in the current session, in firing order.
    pub ringing_signals: Vec<Signal>,
    /// True briefly after a dismiss, for button feedback.
    pub dismiss_pressed: bool,
    pub antidelay_secs: AntidelaySeconds,
}

/// Current engine configuration.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct ConfigState {
    pub antidelay_secs: AntidelaySeconds,
    /// Whether a custom alarm sound is loaded.
    pub custom_sound: bool,
}

/// Partial configuration update.
#[derive(Clone, Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct ConfigPatchRequest {
    pub antidelay_secs: Option<AntidelaySeconds>,
}
