// TrayStack — Vertical Relayout of the System Tray Icon Cluster
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tree Locator — finds the icon cluster inside a graph we do not control.
//!
//! The graph is host-owned: it can be arbitrarily deep, mid-rebuild, or (in
//! pathological cases) cyclic through custom elements. Traversal is
//! therefore iterative pre-order with an explicit depth ceiling and a hard
//! visit budget, never unguarded recursion.
//!
//! Identification is heuristic and must survive both false positives
//! (structurally similar but unrelated panels elsewhere in the tree) and
//! false negatives (host versions moving things around). Each signal is an
//! independent, unit-testable strategy; a candidate is accepted only with
//! corroboration from at least two signals whenever two or more are
//! configured.

use tracing::{debug, trace};

use crate::foreign::{Capability, ForeignError, UiNode};

/// Depth ceiling for the downward search.
pub const MAX_DEPTH: usize = 12;
/// Hard budget on visited nodes per search; bounds per-frame cost.
pub const MAX_VISITS: usize = 2048;
/// Ascent ceiling for the parent-chain signal.
pub const MAX_ASCENT: usize = 10;

// Erkennungsmerkmale des Icon-Clusters, wie im Host beobachtet.
const CLUSTER_CLASS: &str = "Windows.UI.Xaml.Controls.StackPanel";
const CLUSTER_MIN_CHILDREN: usize = 3;
const CLUSTER_MAX_CHILDREN: usize = 5;
const PARENT_MARKERS: &[&str] = &["OmniButton", "ControlCenterButton"];

// ── Signale ─────────────────────────────────────────

/// Verdict of one identification signal for one candidate node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalVerdict {
    Match,
    Mismatch,
    /// The node could not be asked (capability missing, host call failed).
    /// Counts like a mismatch: an unanswerable signal corroborates nothing.
    Unavailable,
}

/// One independent identification strategy. New signals plug in here
/// without touching the traversal.
pub trait Signal<N: UiNode> {
    fn describe(&self) -> &'static str;

    fn evaluate(&self, node: &N) -> SignalVerdict;
}

/// How [`ClassNameSignal`] compares the runtime class name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassMatch {
    Exact,
    Substring,
}

/// Matches on the runtime class name.
pub struct ClassNameSignal {
    pub pattern: &'static str,
    pub mode: ClassMatch,
}

impl<N: UiNode> Signal<N> for ClassNameSignal {
    fn describe(&self) -> &'static str {
        "class-name"
    }

    fn evaluate(&self, node: &N) -> SignalVerdict {
        match node.class_name() {
            Ok(class) => {
                let hit = match self.mode {
                    ClassMatch::Exact => class == self.pattern,
                    ClassMatch::Substring => class.contains(self.pattern),
                };
                if hit {
                    SignalVerdict::Match
                } else {
                    SignalVerdict::Mismatch
                }
            }
            Err(_) => SignalVerdict::Unavailable,
        }
    }
}

/// Matches on the element's display name (exact).
pub struct DisplayNameSignal {
    pub expected: &'static str,
}

impl<N: UiNode> Signal<N> for DisplayNameSignal {
    fn describe(&self) -> &'static str {
        "display-name"
    }

    fn evaluate(&self, node: &N) -> SignalVerdict {
        match node.display_name() {
            Ok(name) if name == self.expected => SignalVerdict::Match,
            Ok(_) => SignalVerdict::Mismatch,
            Err(_) => SignalVerdict::Unavailable,
        }
    }
}

/// Matches when the child count falls into the expected range. The cluster
/// has 3 fixed members plus up to two optional ones (e.g. microphone), so
/// the size varies between passes.
pub struct ChildCountSignal {
    pub min: usize,
    pub max: usize,
}

impl<N: UiNode> Signal<N> for ChildCountSignal {
    fn describe(&self) -> &'static str {
        "child-count"
    }

    fn evaluate(&self, node: &N) -> SignalVerdict {
        match node.child_count() {
            Ok(count) if (self.min..=self.max).contains(&count) => SignalVerdict::Match,
            Ok(_) => SignalVerdict::Mismatch,
            Err(_) => SignalVerdict::Unavailable,
        }
    }
}

/// Matches when an ancestor's class name carries one of the markers.
/// Bounded upward walk; the parent relation is host-controlled too.
pub struct ParentChainSignal {
    pub markers: &'static [&'static str],
    pub max_ascent: usize,
}

impl<N: UiNode> Signal<N> for ParentChainSignal {
    fn describe(&self) -> &'static str {
        "parent-chain"
    }

    fn evaluate(&self, node: &N) -> SignalVerdict {
        let mut current = match node.parent() {
            Ok(Some(parent)) => parent,
            Ok(None) => return SignalVerdict::Mismatch,
            Err(_) => return SignalVerdict::Unavailable,
        };

        for _ in 0..self.max_ascent {
            if let Ok(class) = current.class_name() {
                if self.markers.iter().any(|m| class.contains(m)) {
                    return SignalVerdict::Match;
                }
            }
            current = match current.parent() {
                Ok(Some(parent)) => parent,
                Ok(None) => return SignalVerdict::Mismatch,
                Err(_) => return SignalVerdict::Unavailable,
            };
        }

        SignalVerdict::Mismatch
    }
}

// ── Prädikat ────────────────────────────────────────

/// Multi-signal predicate. Accepts a candidate only when at least two
/// signals corroborate (one, if only one is configured).
pub struct ClusterPredicate<N: UiNode> {
    signals: Vec<Box<dyn Signal<N>>>,
}

impl<N: UiNode> ClusterPredicate<N> {
    pub fn new(signals: Vec<Box<dyn Signal<N>>>) -> Self {
        ClusterPredicate { signals }
    }

    /// The production predicate for the tray icon cluster: a StackPanel
    /// with 3–5 children underneath an OmniButton/ControlCenterButton.
    pub fn tray_cluster() -> Self {
        ClusterPredicate::new(vec![
            Box::new(ClassNameSignal { pattern: CLUSTER_CLASS, mode: ClassMatch::Exact }),
            Box::new(ChildCountSignal { min: CLUSTER_MIN_CHILDREN, max: CLUSTER_MAX_CHILDREN }),
            Box::new(ParentChainSignal { markers: PARENT_MARKERS, max_ascent: MAX_ASCENT }),
        ])
    }

    pub fn matches(&self, node: &N) -> bool {
        if self.signals.is_empty() {
            return false;
        }
        let required = self.signals.len().min(2);
        let mut confirmed = 0;
        for signal in &self.signals {
            let verdict = signal.evaluate(node);
            trace!(signal = signal.describe(), ?verdict, "signal evaluated");
            if verdict == SignalVerdict::Match {
                confirmed += 1;
                if confirmed >= required {
                    return true;
                }
            }
        }
        false
    }
}

// ── Traversierung ───────────────────────────────────

/// Depth-bounded pre-order search for the first node matching `predicate`.
///
/// `None` is a normal outcome (cluster absent, e.g. mid-rebuild) and simply
/// means: skip modification for this invocation. Nodes without the
/// `FrameworkElement` capability are not evaluated but their subtrees are
/// still searched. Host call failures skip the affected node.
pub fn locate<N: UiNode>(root: &N, predicate: &ClusterPredicate<N>) -> Option<N> {
    let mut stack: Vec<(N, usize)> = vec![(root.clone(), 0)];
    let mut visited = 0usize;

    while let Some((node, depth)) = stack.pop() {
        visited += 1;
        if visited > MAX_VISITS {
            debug!(visited, "visit budget exhausted, aborting search");
            return None;
        }

        match node.query(Capability::FrameworkElement) {
            Ok(element) => {
                if predicate.matches(&element) {
                    debug!(depth, visited, "cluster located");
                    return Some(element);
                }
            }
            // Kein FrameworkElement: nicht bewertbar, Subtree trotzdem.
            Err(ForeignError::Unsupported(_)) => {}
            Err(ForeignError::CallFailed(_)) => continue,
        }

        if depth >= MAX_DEPTH {
            continue;
        }

        let count = match node.child_count() {
            Ok(count) => count,
            Err(_) => continue,
        };
        // Rückwärts schieben, damit Kind 0 zuerst besucht wird.
        for index in (0..count).rev() {
            if let Ok(child) = node.child_at(index) {
                stack.push((child, depth + 1));
            }
        }
    }

    None
}
