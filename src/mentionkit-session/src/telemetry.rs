//! Tracing setup for hosts that do not install their own subscriber.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::MentionSettings;

/// Default filter directive for the given settings.
pub fn default_directive(settings: &MentionSettings) -> &'static str {
    if settings.debug_logging {
        "mentionkit_session=debug,mentionkit_position=debug"
    } else {
        "info"
    }
}

/// Installs a global fmt subscriber.
///
/// `RUST_LOG` wins over the settings. Returns `false` if a global subscriber
/// was already set.
pub fn init_tracing(settings: &MentionSettings, json: bool) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(settings)));

    let subscriber = tracing_subscriber::registry().with(filter);

    let result = if json {
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        subscriber.with(tracing_subscriber::fmt::layer()).try_init()
    };
    result.is_ok()
}
