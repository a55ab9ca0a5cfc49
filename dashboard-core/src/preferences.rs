//! Display preferences: theme mode, style, motion and contrast.
//!
//! Preferences are independent of weather state. What a preference *means* on
//! a given machine ("system" mode on a dark desktop, for instance) is decided
//! by the pure functions at the bottom of this module, fed by an
//! [`EnvironmentSignals`] implementation chosen by the application.

use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::warn;

use crate::storage::{KeyValueStore, PREFERENCES_KEY, load_json, save_json};

macro_rules! preference_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let lower = value.to_lowercase();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == lower)
                    .ok_or_else(|| {
                        let allowed: Vec<&str> = $name::ALL.iter().map(|v| v.as_str()).collect();
                        anyhow::anyhow!(
                            "Unknown {} '{value}'. Supported values: {}.",
                            stringify!($name),
                            allowed.join(", ")
                        )
                    })
            }
        }
    };
}

preference_enum!(
    /// Light/dark selection.
    ThemeMode { Light => "light", Dark => "dark", System => "system" }
);

preference_enum!(
    /// Named color palette.
    ThemeStyle { Default => "default", Neon => "neon", Pastel => "pastel" }
);

preference_enum!(
    MotionPreference { Full => "full", Reduced => "reduced", System => "system" }
);

preference_enum!(
    ContrastMode { Normal => "normal", High => "high" }
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub mode: ThemeMode,
    pub style: ThemeStyle,
    pub motion: MotionPreference,
    pub contrast: ContrastMode,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            mode: ThemeMode::System,
            style: ThemeStyle::Default,
            motion: MotionPreference::Full,
            contrast: ContrastMode::Normal,
        }
    }
}

/// Stored shape: `{"state": {...}, "version": 0}`.
#[derive(Debug, Serialize, Deserialize)]
struct Persisted {
    state: Preferences,
    #[serde(default)]
    version: u32,
}

const STORAGE_VERSION: u32 = 0;

/// Holds [`Preferences`] and writes them back on every change.
#[derive(Debug)]
pub struct PreferenceStore {
    storage: Arc<dyn KeyValueStore>,
    state: watch::Sender<Preferences>,
}

impl PreferenceStore {
    /// Read stored preferences once, falling back to defaults.
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        let initial = match load_json::<Persisted>(storage.as_ref(), PREFERENCES_KEY) {
            Ok(Some(persisted)) => persisted.state,
            Ok(None) => Preferences::default(),
            Err(err) => {
                warn!(error = %err, "ignoring unreadable preferences");
                Preferences::default()
            }
        };

        let (tx, _rx) = watch::channel(initial);
        Self { storage, state: tx }
    }

    pub fn get(&self) -> Preferences {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Preferences> {
        self.state.subscribe()
    }

    pub fn set_mode(&self, mode: ThemeMode) {
        self.apply(|p| p.mode = mode);
    }

    pub fn set_style(&self, style: ThemeStyle) {
        self.apply(|p| p.style = style);
    }

    pub fn set_motion(&self, motion: MotionPreference) {
        self.apply(|p| p.motion = motion);
    }

    pub fn set_contrast(&self, contrast: ContrastMode) {
        self.apply(|p| p.contrast = contrast);
    }

    fn apply(&self, f: impl FnOnce(&mut Preferences)) {
        self.state.send_modify(f);

        let persisted = Persisted {
            state: self.get(),
            version: STORAGE_VERSION,
        };
        if let Err(err) = save_json(self.storage.as_ref(), PREFERENCES_KEY, &persisted) {
            warn!(error = %err, "failed to persist preferences");
        }
    }
}

/// What the host environment prefers when a preference says "system".
pub trait EnvironmentSignals {
    fn prefers_dark(&self) -> bool;

    fn prefers_reduced_motion(&self) -> bool;
}

/// Signals fixed at construction; also what non-interactive contexts use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixedEnvironment {
    pub prefers_dark: bool,
    pub prefers_reduced_motion: bool,
}

impl EnvironmentSignals for FixedEnvironment {
    fn prefers_dark(&self) -> bool {
        self.prefers_dark
    }

    fn prefers_reduced_motion(&self) -> bool {
        self.prefers_reduced_motion
    }
}

/// Preferences resolved against the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appearance {
    pub dark: bool,
    pub reduced_motion: bool,
    pub high_contrast: bool,
    pub style: ThemeStyle,
}

pub fn resolve_dark(mode: ThemeMode, system_prefers_dark: bool) -> bool {
    match mode {
        ThemeMode::Dark => true,
        ThemeMode::Light => false,
        ThemeMode::System => system_prefers_dark,
    }
}

pub fn resolve_reduced_motion(motion: MotionPreference, system_prefers_reduced: bool) -> bool {
    match motion {
        MotionPreference::Reduced => true,
        MotionPreference::Full => false,
        MotionPreference::System => system_prefers_reduced,
    }
}

pub fn resolve_appearance(prefs: &Preferences, env: &dyn EnvironmentSignals) -> Appearance {
    Appearance {
        dark: resolve_dark(prefs.mode, env.prefers_dark()),
        reduced_motion: resolve_reduced_motion(prefs.motion, env.prefers_reduced_motion()),
        high_contrast: prefs.contrast == ContrastMode::High,
        style: prefs.style,
    }
}
