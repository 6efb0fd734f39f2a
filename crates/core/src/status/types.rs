use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::options::ProductOptions;

/// Lifecycle of a scene.
///
/// ```text
/// submitted -> on_order -> on_cache -> queued -> processing -> complete -> purged
///     |            |           |          |           |-> error -> queued (retry)
///     +------------+-----------+----------+-----------+-> unavailable
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneStatus {
    Submitted,
    OnOrder,
    OnCache,
    Queued,
    Processing,
    Complete,
    Error,
    Unavailable,
    Purged,
}

impl SceneStatus {
    pub const ALL: [SceneStatus; 9] = [
        SceneStatus::Submitted,
        SceneStatus::OnOrder,
        SceneStatus::OnCache,
        SceneStatus::Queued,
        SceneStatus::Processing,
        SceneStatus::Complete,
        SceneStatus::Error,
        SceneStatus::Unavailable,
        SceneStatus::Purged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SceneStatus::Submitted => "submitted",
            SceneStatus::OnOrder => "on_order",
            SceneStatus::OnCache => "on_cache",
            SceneStatus::Queued => "queued",
            SceneStatus::Processing => "processing",
            SceneStatus::Complete => "complete",
            SceneStatus::Error => "error",
            SceneStatus::Unavailable => "unavailable",
            SceneStatus::Purged => "purged",
        }
    }

    /// Statuses a scene may move into `self` from (excluding `self`).
    pub fn predecessors(&self) -> &'static [SceneStatus] {
        use SceneStatus::*;
        match self {
            Submitted => &[],
            OnOrder => &[Submitted],
            OnCache => &[Submitted, OnOrder],
            Queued => &[OnCache, Error],
            Processing => &[Queued],
            Complete => &[Processing],
            Error => &[Processing],
            Unavailable => &[Submitted, OnOrder, OnCache, Queued, Processing],
            Purged => &[Complete],
        }
    }

    /// Whether a scene in `self` may be moved to `next`. Re-applying the
    /// current status is always allowed.
    pub fn can_transition_to(&self, next: SceneStatus) -> bool {
        *self == next || next.predecessors().contains(self)
    }

    /// Targets the generic status update may set. `error`, `complete`,
    /// `unavailable` and `purged` carry data only their own operations record.
    pub fn is_generic_target(&self) -> bool {
        matches!(
            self,
            SceneStatus::OnOrder
                | SceneStatus::OnCache
                | SceneStatus::Queued
                | SceneStatus::Processing
        )
    }

    /// No automatic transition leaves these statuses.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SceneStatus::Complete | SceneStatus::Unavailable | SceneStatus::Purged
        )
    }

    /// Statuses that count as finished when deciding order completion.
    /// Purged scenes were complete before their artifacts expired.
    pub fn counts_toward_completion(&self) -> bool {
        self.is_terminal()
    }
}

impl fmt::Display for SceneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SceneStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SceneStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown scene status: {}", s))
    }
}

/// Order status, derived from its scenes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Ordered,
    Complete,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Ordered => "ordered",
            OrderStatus::Complete => "complete",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ordered" => Ok(OrderStatus::Ordered),
            "complete" => Ok(OrderStatus::Complete),
            other => Err(format!("unknown order status: {}", other)),
        }
    }
}

/// Identifies one scene within one order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SceneRef {
    pub order_id: String,
    pub scene_id: String,
}

impl SceneRef {
    pub fn new(order_id: impl Into<String>, scene_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            scene_id: scene_id.into(),
        }
    }
}

impl fmt::Display for SceneRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.order_id, self.scene_id)
    }
}

/// A submitter's request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub submitter: String,
    pub options: ProductOptions,
    pub status: OrderStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completion_date: Option<DateTime<Utc>>,
    /// When the completion notification went out.
    pub notified_at: Option<DateTime<Utc>>,
}

/// One unit of processable input/output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub order_id: String,
    pub scene_id: String,
    pub status: SceneStatus,
    /// Worker (or dispatcher) that last touched the scene.
    pub processing_location: Option<String>,
    pub job_name: Option<String>,
    pub product_location: Option<String>,
    pub checksum_location: Option<String>,
    pub completion_date: Option<DateTime<Utc>>,
    /// Diagnostic or processing log.
    pub log: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Scene {
    pub fn scene_ref(&self) -> SceneRef {
        SceneRef::new(&self.order_id, &self.scene_id)
    }
}

/// Order intake request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub submitter: String,
    #[serde(default)]
    pub options: ProductOptions,
    pub scenes: Vec<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// A scene eligible for dispatch, with its order's options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneToProcess {
    pub order_id: String,
    pub scene_id: String,
    pub options: ProductOptions,
}

impl SceneToProcess {
    pub fn scene_ref(&self) -> SceneRef {
        SceneRef::new(&self.order_id, &self.scene_id)
    }
}

/// Terminal success report from a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneCompletion {
    pub order_id: String,
    pub scene_id: String,
    pub location: String,
    pub product_location: String,
    pub checksum_location: String,
    #[serde(default)]
    pub log: Option<String>,
}

impl SceneCompletion {
    pub fn scene_ref(&self) -> SceneRef {
        SceneRef::new(&self.order_id, &self.scene_id)
    }
}

/// Distributed artifacts of a completed scene past retention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurgeCandidate {
    pub order_id: String,
    pub scene_id: String,
    pub product_location: Option<String>,
    pub checksum_location: Option<String>,
    pub completion_date: DateTime<Utc>,
}

impl PurgeCandidate {
    pub fn scene_ref(&self) -> SceneRef {
        SceneRef::new(&self.order_id, &self.scene_id)
    }
}

/// Filter for listing scenes.
#[derive(Debug, Clone, Default)]
pub struct SceneFilter {
    pub order_id: Option<String>,
    pub status: Option<SceneStatus>,
    pub limit: i64,
    pub offset: i64,
}

impl SceneFilter {
    pub fn new() -> Self {
        Self {
            order_id: None,
            status: None,
            limit: 1000,
            offset: 0,
        }
    }

    pub fn with_order(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn with_status(mut self, status: SceneStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Filter for listing orders.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub submitter: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl OrderFilter {
    pub fn new() -> Self {
        Self {
            status: None,
            submitter: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_submitter(mut self, submitter: impl Into<String>) -> Self {
        self.submitter = Some(submitter.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Human-readable order id: submitter local part plus `MMDDYY-HHMMSS`.
pub fn generate_order_id(submitter: &str, at: DateTime<Utc>) -> String {
    let local = submitter.split('@').next().unwrap_or_default();
    let mut prefix: String = local
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if prefix.is_empty() {
        prefix = "order".to_string();
    }
    format!("{}-{}", prefix, at.format("%m%d%y-%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_forward_chain_is_permitted() {
        use SceneStatus::*;
        let chain = [Submitted, OnOrder, OnCache, Queued, Processing, Complete, Purged];
        for pair in chain.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?}", pair);
        }
        assert!(Submitted.can_transition_to(OnCache));
        assert!(Processing.can_transition_to(Error));
        assert!(Processing.can_transition_to(Unavailable));
        assert!(Error.can_transition_to(Queued));
    }

    #[test]
    fn test_forbidden_edges() {
        use SceneStatus::*;
        assert!(!Submitted.can_transition_to(Complete));
        assert!(!Submitted.can_transition_to(Queued));
        assert!(!OnCache.can_transition_to(Processing));
        assert!(!Queued.can_transition_to(Complete));
        assert!(!Complete.can_transition_to(Queued));
        assert!(!Complete.can_transition_to(Error));
        assert!(!Error.can_transition_to(Purged));
        assert!(!Unavailable.can_transition_to(Queued));
        assert!(!Purged.can_transition_to(Complete));
        assert!(!Queued.can_transition_to(OnCache));
    }

    #[test]
    fn test_every_edge_moves_forward_or_retries() {
        // Only error -> queued goes backwards in the pipeline order.
        let rank = |s: SceneStatus| SceneStatus::ALL.iter().position(|x| *x == s).unwrap();
        for from in SceneStatus::ALL {
            for to in SceneStatus::ALL {
                if from != to && from.can_transition_to(to) && rank(to) < rank(from) {
                    assert_eq!((from, to), (SceneStatus::Error, SceneStatus::Queued));
                }
            }
        }
    }

    #[test]
    fn test_same_status_is_idempotent() {
        for status in SceneStatus::ALL {
            assert!(status.can_transition_to(status));
        }
    }

    #[test]
    fn test_terminal() {
        assert!(SceneStatus::Complete.is_terminal());
        assert!(SceneStatus::Unavailable.is_terminal());
        assert!(SceneStatus::Purged.is_terminal());
        assert!(!SceneStatus::Error.is_terminal());
        assert!(!SceneStatus::Processing.counts_toward_completion());
    }

    #[test]
    fn test_generic_targets() {
        let generic: Vec<_> = SceneStatus::ALL
            .into_iter()
            .filter(|s| s.is_generic_target())
            .collect();
        assert_eq!(
            generic,
            vec![
                SceneStatus::OnOrder,
                SceneStatus::OnCache,
                SceneStatus::Queued,
                SceneStatus::Processing
            ]
        );
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in SceneStatus::ALL {
            assert_eq!(status.as_str().parse::<SceneStatus>().unwrap(), status);
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        assert!("done".parse::<SceneStatus>().is_err());
        assert_eq!("complete".parse::<OrderStatus>(), Ok(OrderStatus::Complete));
    }

    #[test]
    fn test_generate_order_id() {
        let at = Utc.with_ymd_and_hms(2014, 10, 19, 9, 30, 15).unwrap();
        assert_eq!(
            generate_order_id("Jane.Doe@usgs.gov", at),
            "jane.doe-101914-093015"
        );
        assert_eq!(generate_order_id("ops team", at), "ops_team-101914-093015");
        assert_eq!(generate_order_id("@nowhere", at), "order-101914-093015");
    }
}
