//! Common types used across ScaleHub

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ScaleHubError;

// =============================================================================
// ID Wrappers
// =============================================================================

/// User ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Team ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(pub Uuid);

impl TeamId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TeamId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for TeamId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TeamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Subscription plan identifier.
///
/// Variants are declared in tier order, so `Ord` compares plan rank
/// (`Free < Starter < Enterprise`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanId {
    Free,
    Starter,
    Enterprise,
}

impl Default for PlanId {
    fn default() -> Self {
        Self::Free
    }
}

impl PlanId {
    /// All plans, lowest tier first
    pub const ALL: [PlanId; 3] = [PlanId::Free, PlanId::Starter, PlanId::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Starter => "starter",
            Self::Enterprise => "enterprise",
        }
    }

    /// Parse a stored plan identifier, treating anything unknown as the free plan.
    ///
    /// Team rows can carry identifiers from retired plans; those must not fail
    /// plan resolution.
    pub fn from_str_lossy(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl std::fmt::Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlanId {
    type Err = ScaleHubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "starter" => Ok(Self::Starter),
            "enterprise" => Ok(Self::Enterprise),
            _ => Err(ScaleHubError::UnknownPlan(s.to_string())),
        }
    }
}

/// Gated product feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Search,
    ScaleView,
    AiInterpretation,
    ApiCall,
    CaseStudy,
    DataExport,
}

impl Feature {
    pub const ALL: [Feature; 6] = [
        Feature::Search,
        Feature::ScaleView,
        Feature::AiInterpretation,
        Feature::ApiCall,
        Feature::CaseStudy,
        Feature::DataExport,
    ];

    /// Features with a per-period usage counter
    pub const METERED: [Feature; 4] = [
        Feature::Search,
        Feature::ScaleView,
        Feature::AiInterpretation,
        Feature::ApiCall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::ScaleView => "scale_view",
            Self::AiInterpretation => "ai_interpretation",
            Self::ApiCall => "api_call",
            Self::CaseStudy => "case_study",
            Self::DataExport => "data_export",
        }
    }

    pub fn is_metered(&self) -> bool {
        matches!(
            self,
            Self::Search | Self::ScaleView | Self::AiInterpretation | Self::ApiCall
        )
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Feature {
    type Err = ScaleHubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .into_iter()
            .find(|feature| feature.as_str() == s)
            .ok_or_else(|| ScaleHubError::UnknownFeature(s.to_string()))
    }
}

/// Subscription status as reported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    /// Team plan is current
    Active,
    /// Team plan expired; the free plan applies
    Expired,
    /// No active team membership
    None,
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Expired => write!(f, "expired"),
            Self::None => write!(f, "none"),
        }
    }
}
