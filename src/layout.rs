// TrayStack — Vertical Relayout of the System Tray Icon Cluster
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Layout Override Engine — per-child adjustments for the located cluster.
//!
//! Rules are assigned by rank, not by fixed index: the cluster always has a
//! recognizable first and last member, while the interior count varies with
//! optional members. Every write is absolute, so re-applying on each host
//! layout pass cannot accumulate drift. `reset` restores neutral geometry by
//! recomputing the touched set from the live cluster.

use tracing::{debug, trace, warn};

use crate::foreign::{Capability, ForeignError, HAlign, Orientation, Thickness, UiNode};
use crate::settings::Settings;

/// Positional adjustment for one cluster member.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverrideRule {
    pub margin: Thickness,
}

impl OverrideRule {
    pub const NEUTRAL: OverrideRule = OverrideRule { margin: Thickness::ZERO };

    pub fn is_neutral(&self) -> bool {
        self.margin.is_zero()
    }
}

/// Rule plan for a cluster of `count` children: first and last rank get the
/// configured nudges, interiors stay neutral. A cluster of one gets both
/// nudges merged onto its single member.
pub fn plan(count: usize, settings: &Settings) -> Vec<OverrideRule> {
    match count {
        0 => Vec::new(),
        1 => vec![OverrideRule { margin: settings.first_nudge.merged(&settings.last_nudge) }],
        _ => {
            let mut rules = vec![OverrideRule::NEUTRAL; count];
            rules[0] = OverrideRule { margin: settings.first_nudge };
            rules[count - 1] = OverrideRule { margin: settings.last_nudge };
            rules
        }
    }
}

/// Write the per-child rules, pin each child to the configured icon size,
/// and flip the cluster panel to a vertical stack with the configured
/// spacing.
///
/// Failures on individual children are skipped; the worst case for any
/// child is "unchanged this frame". Idempotent for fixed input.
pub fn apply<N: UiNode>(cluster: &N, rules: &[OverrideRule], settings: &Settings) {
    let side = f64::from(settings.icon_size);
    for (index, rule) in rules.iter().enumerate() {
        if let Err(err) = write_child(cluster, index, rule, HAlign::Center, side) {
            trace!(index, %err, "child skipped");
        }
    }

    match cluster.query(Capability::StackPanel) {
        Ok(panel) => {
            if let Err(err) = panel.set_orientation(Orientation::Vertical) {
                warn!(%err, "orientation flip failed");
            }
            if let Err(err) = panel.set_spacing(f64::from(settings.icon_spacing)) {
                trace!(%err, "spacing not applied");
            }
        }
        Err(err) => trace!(%err, "cluster is not a stack panel, orientation untouched"),
    }

    debug!(children = rules.len(), "overrides applied");
}

fn write_child<N: UiNode>(
    cluster: &N,
    index: usize,
    rule: &OverrideRule,
    align: HAlign,
    side: f64,
) -> Result<(), ForeignError> {
    let child = cluster.child_at(index)?;
    let element = child.query(Capability::FrameworkElement)?;
    element.set_margin(rule.margin)?;
    element.set_alignment(align)?;
    element.set_fixed_size(side)?;
    Ok(())
}

/// Restore neutral geometry: zero margins, stretch alignment and auto size
/// on every current child, horizontal orientation, zero spacing. The
/// touched set is recomputed from the live cluster, so children that
/// appeared since the last apply are covered too.
pub fn reset<N: UiNode>(cluster: &N) {
    let count = match cluster.child_count() {
        Ok(count) => count,
        Err(err) => {
            warn!(%err, "reset skipped, cluster unreadable");
            return;
        }
    };

    for index in 0..count {
        if let Err(err) = write_child(cluster, index, &OverrideRule::NEUTRAL, HAlign::Stretch, f64::NAN) {
            trace!(index, %err, "child skipped during reset");
        }
    }

    if let Ok(panel) = cluster.query(Capability::StackPanel) {
        if let Err(err) = panel.set_orientation(Orientation::Horizontal) {
            warn!(%err, "orientation restore failed");
        }
        let _ = panel.set_spacing(0.0);
    }

    debug!(children = count, "overrides reset");
}
