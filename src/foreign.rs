// TrayStack — Vertical Relayout of the System Tray Icon Cluster
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Foreign Object Adapter — the only place that knows what a host UI object
//! actually is.
//!
//! Everything above this layer handles host objects exclusively through
//! [`UiNode`]: an opaque, reference-counted handle with a minimal capability
//! surface. One `UiNode` value owns exactly one host reference: `Clone`
//! acquires another, `Drop` releases. That makes every acquisition scoped:
//! the matching release happens on every exit path, error paths included,
//! without any manual bookkeeping.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Capability-IDs ──────────────────────────────────
// Das fremde Äquivalent von Interface-Discovery: ein Objekt wird gefragt,
// ob es eine Fähigkeit unterstützt. Unsupported ist ein normales Ergebnis.

/// Capabilities a host object may or may not support.
///
/// Only the minimal subset this system actually needs is modeled; unknown
/// interfaces on the host side simply never get asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Layout surface: margins, alignment, display name.
    FrameworkElement,
    /// Container surface: an ordered child list.
    Panel,
    /// Stack container surface: orientation and uniform spacing.
    StackPanel,
}

// ── Fehler ──────────────────────────────────────────

/// Failures when talking to a foreign object.
///
/// `Unsupported` is expected and handled at every call site; `CallFailed`
/// is the catch-all around any call into the host and is always recovered
/// locally (skip the node or the frame, never propagate to the host).
#[derive(Debug, Clone, Error)]
pub enum ForeignError {
    /// The object does not implement the requested capability.
    #[error("capability {0:?} not supported")]
    Unsupported(Capability),

    /// A call into the host object failed.
    #[error("host call failed: {0}")]
    CallFailed(String),
}

// ── Geometrie ───────────────────────────────────────

/// Four-sided margin, in device-independent pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thickness {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Thickness {
    pub const ZERO: Thickness = Thickness { left: 0.0, top: 0.0, right: 0.0, bottom: 0.0 };

    pub const fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Thickness { left, top, right, bottom }
    }

    pub fn is_zero(&self) -> bool {
        *self == Thickness::ZERO
    }

    /// Component-wise sum. Used when first and last rank collapse onto the
    /// same child (cluster of one).
    pub fn merged(&self, other: &Thickness) -> Thickness {
        Thickness {
            left: self.left + other.left,
            top: self.top + other.top,
            right: self.right + other.right,
            bottom: self.bottom + other.bottom,
        }
    }
}

impl Default for Thickness {
    fn default() -> Self {
        Thickness::ZERO
    }
}

/// Stacking direction of a panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// Horizontal placement of an element inside its slot. `Stretch` is the
/// host default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HAlign {
    Stretch,
    Center,
}

// ── Adapter-Vertrag ─────────────────────────────────

/// A live, reference-counted handle into the host's UI tree.
///
/// Implementors wrap one host reference per value. The XAML backend maps
/// this onto `IInspectable` + `QueryInterface`; the test mock maps it onto a
/// counting in-memory graph. No component outside the adapter layer ever
/// touches a raw host pointer.
///
/// Mutating calls (`set_margin`, `set_orientation`, ...) are absolute
/// writes: applying the same value twice leaves the host in the same state
/// as applying it once.
pub trait UiNode: Clone {
    /// Capability query. On success the returned handle owns a fresh host
    /// reference to the same underlying object.
    fn query(&self, cap: Capability) -> Result<Self, ForeignError>;

    /// Runtime class name, e.g. `Windows.UI.Xaml.Controls.StackPanel`.
    fn class_name(&self) -> Result<String, ForeignError>;

    /// Display name (`FrameworkElement.Name`); empty string when unset.
    fn display_name(&self) -> Result<String, ForeignError>;

    fn child_count(&self) -> Result<usize, ForeignError>;

    /// Child at `index`, a fresh host reference. Fails with `CallFailed`
    /// when the index is stale (tree mutated under us).
    fn child_at(&self, index: usize) -> Result<Self, ForeignError>;

    /// Visual parent, or `None` at the root. Relation only: the returned
    /// handle is released like any other and never implies ownership.
    fn parent(&self) -> Result<Option<Self>, ForeignError>;

    // Mutationen, nur über FrameworkElement/StackPanel-Capability sinnvoll.

    fn set_margin(&self, margin: Thickness) -> Result<(), ForeignError>;

    fn set_alignment(&self, align: HAlign) -> Result<(), ForeignError>;

    /// Fix width and height to `side` pixels. `NaN` means auto-sized, the
    /// host default.
    fn set_fixed_size(&self, side: f64) -> Result<(), ForeignError>;

    fn set_orientation(&self, orientation: Orientation) -> Result<(), ForeignError>;

    fn set_spacing(&self, spacing: f64) -> Result<(), ForeignError>;
}
