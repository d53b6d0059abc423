// TrayStack — Vertical Relayout of the System Tray Icon Cluster
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration surface. Read at init and on the settings-changed
//! notification, immutable in between. Anything invalid falls back to
//! defaults; a broken settings file must never take the feature down.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::foreign::Thickness;

// Grenzen wie im Settings-UI dokumentiert.
const ICON_SIZE_MIN: u32 = 16;
const ICON_SIZE_MAX: u32 = 48;
const ICON_SPACING_MAX: u32 = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Master switch. Off = next layout pass resets the cluster to neutral.
    pub enabled: bool,
    /// Icon edge length in pixels (16–48).
    pub icon_size: u32,
    /// Vertical spacing between stacked icons in pixels (0–32).
    pub icon_spacing: u32,
    /// Verbose diagnostics on the side channel.
    pub debug_logging: bool,
    /// Margin nudge for the first cluster member. A right margin pushes the
    /// icon left; corrects the optical offset of wide glyphs.
    pub first_nudge: Thickness,
    /// Margin nudge for the last cluster member.
    pub last_nudge: Thickness,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            enabled: true,
            icon_size: 32,
            icon_spacing: 4,
            debug_logging: false,
            first_nudge: Thickness::new(0.0, 0.0, 4.0, 0.0),
            last_nudge: Thickness::new(2.0, 0.0, 0.0, 0.0),
        }
    }
}

impl Settings {
    /// Clamp everything into its documented range.
    pub fn clamped(mut self) -> Settings {
        self.icon_size = self.icon_size.clamp(ICON_SIZE_MIN, ICON_SIZE_MAX);
        self.icon_spacing = self.icon_spacing.min(ICON_SPACING_MAX);
        self
    }

    /// Parse a settings document. Invalid input yields the defaults.
    pub fn from_json(text: &str) -> Settings {
        match serde_json::from_str::<Settings>(text) {
            Ok(settings) => settings.clamped(),
            Err(err) => {
                warn!(%err, "settings unparsable, using defaults");
                Settings::default()
            }
        }
    }

    /// Read the settings file; missing file yields the defaults.
    pub fn load(path: &Path) -> Settings {
        match std::fs::read_to_string(path) {
            Ok(text) => Settings::from_json(&text),
            Err(err) => {
                warn!(path = %path.display(), %err, "settings file unreadable, using defaults");
                Settings::default()
            }
        }
    }
}
