//! Plan Catalog
//!
//! Static table of subscription plans and the features and limits each unlocks.
//! Lookups are pure and never fail: anything that is not a known plan resolves
//! to the free plan.

use scalehub_shared::{Feature, PlanId};
use serde::Serialize;

/// Per-period limits for metered features. `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanLimits {
    pub searches: Option<u64>,
    pub scale_views: Option<u64>,
    pub ai_interpretations: Option<u64>,
    pub api_calls: Option<u64>,
}

impl PlanLimits {
    /// Limit for a metered feature; unmetered features have no limit
    pub fn for_feature(&self, feature: Feature) -> Option<u64> {
        match feature {
            Feature::Search => self.searches,
            Feature::ScaleView => self.scale_views,
            Feature::AiInterpretation => self.ai_interpretations,
            Feature::ApiCall => self.api_calls,
            Feature::CaseStudy | Feature::DataExport => None,
        }
    }
}

/// A subscription plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub id: PlanId,
    pub features: &'static [Feature],
    pub limits: PlanLimits,
}

impl Plan {
    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    /// Limit for `feature` on this plan
    pub fn limit_for(&self, feature: Feature) -> Option<u64> {
        self.limits.for_feature(feature)
    }

    /// Whether `used` units leave room for one more on this plan
    fn has_headroom(&self, feature: Feature, used: u64) -> bool {
        self.has_feature(feature) && self.limit_for(feature).map_or(true, |limit| used < limit)
    }
}

static FREE: Plan = Plan {
    id: PlanId::Free,
    features: &[Feature::Search, Feature::ScaleView],
    limits: PlanLimits {
        searches: Some(30),
        scale_views: Some(50),
        ai_interpretations: Some(0),
        api_calls: Some(0),
    },
};

static STARTER: Plan = Plan {
    id: PlanId::Starter,
    features: &[
        Feature::Search,
        Feature::ScaleView,
        Feature::AiInterpretation,
        Feature::CaseStudy,
        Feature::DataExport,
    ],
    limits: PlanLimits {
        searches: Some(500),
        scale_views: None,
        ai_interpretations: Some(50),
        api_calls: Some(0),
    },
};

static ENTERPRISE: Plan = Plan {
    id: PlanId::Enterprise,
    features: &Feature::ALL,
    limits: PlanLimits {
        searches: None,
        scale_views: None,
        ai_interpretations: None,
        api_calls: Some(100_000),
    },
};

/// Get the plan definition for a plan id
pub fn get_plan(plan_id: PlanId) -> &'static Plan {
    match plan_id {
        PlanId::Free => &FREE,
        PlanId::Starter => &STARTER,
        PlanId::Enterprise => &ENTERPRISE,
    }
}

/// Get the plan for a stored identifier; unknown identifiers get the free plan
pub fn get_plan_lossy(plan_id: &str) -> &'static Plan {
    get_plan(PlanId::from_str_lossy(plan_id))
}

pub fn is_feature_available(plan_id: PlanId, feature: Feature) -> bool {
    get_plan(plan_id).has_feature(feature)
}

pub fn limit_for(plan_id: PlanId, feature: Feature) -> Option<u64> {
    get_plan(plan_id).limit_for(feature)
}

/// Lowest plan above `current` that includes `feature`
pub fn upgrade_for_feature(current: PlanId, feature: Feature) -> Option<PlanId> {
    PlanId::ALL
        .into_iter()
        .filter(|plan| *plan > current)
        .find(|plan| is_feature_available(*plan, feature))
}

/// Lowest plan above `current` whose limit for `feature` exceeds `used`
pub fn upgrade_for_quota(current: PlanId, feature: Feature, used: u64) -> Option<PlanId> {
    PlanId::ALL
        .into_iter()
        .filter(|plan| *plan > current)
        .find(|plan| get_plan(*plan).has_headroom(feature, used))
}
