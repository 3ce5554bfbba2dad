//! Protection configuration.

use packshield_tick::Ticks;
use packshield_types::{OverlayColor, OverlayStyle};
use serde::{Deserialize, Serialize};

/// How long protection may last without a natural release (20 s).
pub const FALLBACK_TIMEOUT: Ticks = Ticks::from_secs(20);

/// How long the "released" overlay stays up while it drains (5 s).
pub const RELEASE_COUNTDOWN: Ticks = Ticks::from_secs(5);

/// Invulnerability written while a player is protected.
pub const PROTECTION_INVULNERABLE: bool = true;

/// Collidability written while a player is protected.
pub const PROTECTION_COLLIDABLE: bool = false;

// ---------------------------------------------------------------------------
// AirPolicy
// ---------------------------------------------------------------------------

/// What happens to a protected player's breath.
///
/// Servers disagree on whether drowning protection belongs to the
/// protection episode itself or to the event layer, so it is a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AirPolicy {
    /// Leave air alone entirely.
    Ignore,
    /// The event listener cancels air loss while the player is protected.
    #[default]
    CancelDepletion,
    /// As `CancelDepletion`, and the manager also refills air whenever it
    /// applies protection or re-checks the release conditions.
    Maintain,
}

impl AirPolicy {
    /// Returns `true` if air-loss events should be cancelled.
    pub fn cancels_depletion(self) -> bool {
        matches!(self, Self::CancelDepletion | Self::Maintain)
    }

    /// Returns `true` if the manager refills air itself.
    pub fn refills(self) -> bool {
        matches!(self, Self::Maintain)
    }
}

// ---------------------------------------------------------------------------
// Presentation
// ---------------------------------------------------------------------------

/// Color and title of the overlay in one phase of an episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayPresentation {
    pub color: OverlayColor,
    pub title: String,
}

impl OverlayPresentation {
    fn protecting() -> Self {
        Self {
            color: OverlayColor::Green,
            title: "🛡 Protected while resource packs load".to_string(),
        }
    }

    fn released() -> Self {
        Self {
            color: OverlayColor::Yellow,
            title: "⚠ Protection disabled".to_string(),
        }
    }
}

/// Chat messages sent over an episode. May contain engine markup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionMessages {
    /// Sent once when an episode starts.
    pub enabled: String,
    /// Sent on natural release.
    pub released: String,
    /// Sent when the fallback timeout ended the episode.
    pub timed_out: String,
    /// Sent in addition to the release message when another plugin
    /// changed a protection flag during the episode.
    pub interference: String,
}

impl Default for ProtectionMessages {
    fn default() -> Self {
        Self {
            enabled: "🛡 <green>Protection enabled while your packs load.</green> \
                      <gray>You are safe until loading finishes.</gray>"
                .to_string(),
            released: "⚠ <yellow>Protection disabled.</yellow> \
                       <gray>You can take damage and be knocked back again.</gray>"
                .to_string(),
            timed_out: "⚠ <red>Protection disabled after timing out.</red> \
                        <gray>You can take damage and be knocked back again.</gray>"
                .to_string(),
            interference: "⚠ <gold>Another plugin changed your protection flags; \
                           its settings were kept.</gold>"
                .to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// ProtectionConfig
// ---------------------------------------------------------------------------

/// Configuration for the protection manager.
///
/// Every field has a default, so a config file only needs the values it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionConfig {
    /// Protection ends after this long even if deliveries are outstanding
    /// or the player never moved.
    pub fallback_timeout: Ticks,

    /// How long the "released" overlay drains before it disappears.
    pub release_countdown: Ticks,

    /// How often the draining overlay is updated.
    pub countdown_period: Ticks,

    pub air_policy: AirPolicy,

    pub overlay_style: OverlayStyle,

    /// Overlay while the player is protected.
    pub protecting: OverlayPresentation,

    /// Overlay after protection ended.
    pub released: OverlayPresentation,

    pub messages: ProtectionMessages,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            fallback_timeout: FALLBACK_TIMEOUT,
            release_countdown: RELEASE_COUNTDOWN,
            countdown_period: Ticks::ONE,
            air_policy: AirPolicy::default(),
            overlay_style: OverlayStyle::Solid,
            protecting: OverlayPresentation::protecting(),
            released: OverlayPresentation::released(),
            messages: ProtectionMessages::default(),
        }
    }
}

impl ProtectionConfig {
    /// Fix out-of-range values so the config is safe to use.
    ///
    /// Called by [`ProtectionManager::new`](crate::ProtectionManager::new).
    /// Rules:
    /// - a zero `fallback_timeout` would release instantly; it falls back
    ///   to [`FALLBACK_TIMEOUT`].
    /// - `countdown_period` is at least one tick and at most
    ///   `release_countdown` (when that is non-zero).
    pub fn validated(mut self) -> Self {
        if self.fallback_timeout.is_zero() {
            tracing::warn!(
                default = %FALLBACK_TIMEOUT,
                "fallback_timeout of zero would disable protection, using default"
            );
            self.fallback_timeout = FALLBACK_TIMEOUT;
        }
        if self.countdown_period.is_zero() {
            self.countdown_period = Ticks::ONE;
        }
        if !self.release_countdown.is_zero() && self.countdown_period > self.release_countdown {
            tracing::warn!(
                period = %self.countdown_period,
                countdown = %self.release_countdown,
                "countdown_period exceeds release_countdown, clamping"
            );
            self.countdown_period = self.release_countdown;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_fixed_constants() {
        let config = ProtectionConfig::default();
        assert_eq!(config.fallback_timeout, Ticks(400));
        assert_eq!(config.release_countdown, Ticks(100));
        assert_eq!(config.countdown_period, Ticks::ONE);
        assert_eq!(config.air_policy, AirPolicy::CancelDepletion);
        assert_eq!(config.protecting.color, OverlayColor::Green);
        assert_eq!(config.released.color, OverlayColor::Yellow);
    }

    #[test]
    fn test_validated_replaces_zero_fallback() {
        let config = ProtectionConfig {
            fallback_timeout: Ticks::ZERO,
            ..ProtectionConfig::default()
        }
        .validated();
        assert_eq!(config.fallback_timeout, FALLBACK_TIMEOUT);
    }

    #[test]
    fn test_validated_clamps_countdown_period() {
        let config = ProtectionConfig {
            countdown_period: Ticks(500),
            ..ProtectionConfig::default()
        }
        .validated();
        assert_eq!(config.countdown_period, RELEASE_COUNTDOWN);

        let config = ProtectionConfig {
            countdown_period: Ticks::ZERO,
            ..ProtectionConfig::default()
        }
        .validated();
        assert_eq!(config.countdown_period, Ticks::ONE);
    }

    #[test]
    fn test_air_policy_flags() {
        assert!(!AirPolicy::Ignore.cancels_depletion());
        assert!(AirPolicy::CancelDepletion.cancels_depletion());
        assert!(!AirPolicy::CancelDepletion.refills());
        assert!(AirPolicy::Maintain.cancels_depletion());
        assert!(AirPolicy::Maintain.refills());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: ProtectionConfig =
            serde_json::from_str(r#"{ "fallback_timeout": 200, "air_policy": "maintain" }"#)
                .unwrap();
        assert_eq!(config.fallback_timeout, Ticks(200));
        assert_eq!(config.air_policy, AirPolicy::Maintain);
        assert_eq!(config.release_countdown, RELEASE_COUNTDOWN);
        assert_eq!(config.messages, ProtectionMessages::default());
    }
}
