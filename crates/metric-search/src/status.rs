//! Visibility and mutability status of tree directories and metrics.
//!
//! Every node in the metric tree carries a [`MetricStatus`]. The status decides
//! whether the node shows up in search results, whether new samples for it are
//! accepted, and which automatic status writes are legal. The numeric id of
//! each variant is the persisted representation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

/// Status of a directory or metric in the tree.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MetricStatus {
    /// Default for newly created directories and metrics.
    #[default]
    Simple,
    /// Operator ban. The node and everything below it disappear from search
    /// and incoming samples are rejected. Only an explicit move to
    /// [`MetricStatus::Approved`] reopens it.
    Ban,
    /// Operator approval. Visible regardless of auto-hide.
    Approved,
    /// Operator hide. Invisible until a new sample arrives, which reopens the
    /// node and all of its parents.
    Hidden,
    /// Set by the system when every child is invisible. Reopens to
    /// [`MetricStatus::Simple`] on new data.
    AutoHidden,
}

/// Sources from which the system may not move a node into the keyed status.
static RESTRICTED_GRAPH_EDGES: [(MetricStatus, &[MetricStatus]); 3] = [
    (
        MetricStatus::Ban,
        &[MetricStatus::Simple, MetricStatus::AutoHidden],
    ),
    (MetricStatus::Hidden, &[MetricStatus::AutoHidden]),
    (
        MetricStatus::Approved,
        &[MetricStatus::Simple, MetricStatus::AutoHidden],
    ),
];

impl MetricStatus {
    /// All statuses in id order.
    pub const ALL: [MetricStatus; 5] = [
        MetricStatus::Simple,
        MetricStatus::Ban,
        MetricStatus::Approved,
        MetricStatus::Hidden,
        MetricStatus::AutoHidden,
    ];

    /// Returns the persisted numeric id.
    pub fn id(self) -> u8 {
        match self {
            MetricStatus::Simple => 0,
            MetricStatus::Ban => 1,
            MetricStatus::Approved => 2,
            MetricStatus::Hidden => 3,
            MetricStatus::AutoHidden => 4,
        }
    }

    /// Decodes a persisted id.
    pub fn from_id(id: i64) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|s| i64::from(s.id()) == id)
            .ok_or(SearchError::UnknownStatusId(id))
    }

    /// Whether the node (and, for a directory, everything below it) is
    /// returned by search.
    pub fn visible(self) -> bool {
        match self {
            MetricStatus::Simple | MetricStatus::Approved => true,
            MetricStatus::Ban | MetricStatus::Hidden | MetricStatus::AutoHidden => false,
        }
    }

    /// Whether the status can only come from an operator.
    pub fn handmade(self) -> bool {
        match self {
            MetricStatus::Approved | MetricStatus::Ban | MetricStatus::Hidden => true,
            MetricStatus::Simple | MetricStatus::AutoHidden => false,
        }
    }

    /// Whether new samples for the node are written.
    pub fn accepts_writes(self) -> bool {
        self != MetricStatus::Ban
    }

    /// Status the node takes when a new sample arrives for it.
    pub fn status_on_new_data(self) -> MetricStatus {
        match self {
            MetricStatus::Hidden | MetricStatus::AutoHidden => MetricStatus::Simple,
            other => other,
        }
    }

    /// Returns the statuses from which an automatic move into `target` is
    /// forbidden. Empty for unrestricted targets.
    pub fn restricted_sources(target: MetricStatus) -> &'static [MetricStatus] {
        RESTRICTED_GRAPH_EDGES
            .iter()
            .find(|(to, _)| *to == target)
            .map(|(_, from)| *from)
            .unwrap_or(&[])
    }

    /// True iff an automatic move `from -> to` is listed in the restricted table.
    pub fn is_transition_restricted(from: MetricStatus, to: MetricStatus) -> bool {
        Self::restricted_sources(to).contains(&from)
    }

    /// Rejects an automatic status write the table forbids.
    pub fn ensure_transition_allowed(from: MetricStatus, to: MetricStatus) -> Result<()> {
        if Self::is_transition_restricted(from, to) {
            return Err(SearchError::RestrictedTransition { from, to });
        }
        Ok(())
    }
}

impl fmt::Display for MetricStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricStatus::Simple => "SIMPLE",
            MetricStatus::Ban => "BAN",
            MetricStatus::Approved => "APPROVED",
            MetricStatus::Hidden => "HIDDEN",
            MetricStatus::AutoHidden => "AUTO_HIDDEN",
        };
        f.write_str(name)
    }
}

impl TryFrom<u8> for MetricStatus {
    type Error = SearchError;

    fn try_from(id: u8) -> Result<Self> {
        Self::from_id(i64::from(id))
    }
}

impl From<MetricStatus> for u8 {
    fn from(status: MetricStatus) -> u8 {
        status.id()
    }
}
