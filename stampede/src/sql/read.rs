//! Read statements and their parameter generators.
//!
//! Two of the six shapes force large scans (a window-function ranking and
//! a wide time-ordered join); the other four are bounded filter and join
//! probes. Parameter lists are generated ahead of time so the dispatch
//! loops spend their round trips on the store, not the RNG.

use rand::Rng;
use stampede_dataset::synth::{self, CREATED_WINDOW};

use super::Value;

/// Ranks ads within each campaign by impression volume. Requires a scan.
pub const RANK_IMPRESSIONS: &str = "\
SELECT a.campaign_id,
       RANK() OVER (
         PARTITION BY a.campaign_id
         ORDER BY a.campaign_id, count(*) desc
       ), count(*) as n_impressions, a.id
FROM ads as a
       JOIN impressions as i
            ON i.company_id = a.company_id
              AND i.ad_id = a.id
WHERE i.cost_per_impression_usd > $1
GROUP BY a.campaign_id, a.id
ORDER BY a.campaign_id, n_impressions desc
LIMIT 100;";

/// Joins impressions to their ads over a time range. Heavy on data moved,
/// light on planning.
pub const IMPRESSIONS_JOIN: &str = "\
SELECT i.*, a.name, a.target_url
FROM impressions as i
       JOIN ads as a
            ON i.company_id = a.company_id
              AND i.ad_id = a.id
WHERE i.cost_per_impression_usd > $1 AND i.seen_at > $2
ORDER BY i.seen_at
LIMIT 100;";

/// Companies created inside a window.
pub const COMPANY_RANGE: &str = "\
SELECT *
FROM companies
WHERE created_at > $1 AND created_at < $2
ORDER BY created_at
LIMIT 100;";

/// Campaigns filtered by window, state and budget floor.
pub const CAMPAIGN_FILTER: &str = "\
SELECT *
FROM campaigns
WHERE created_at > $1 AND created_at < $2 AND state = $3 AND monthly_budget > $4
ORDER BY created_at
LIMIT 100;";

/// Ads joined to their campaigns over a creation window.
pub const ADS_JOIN: &str = "\
SELECT *
FROM ads as a
JOIN campaigns c
    ON c.company_id = a.company_id
           AND c.id = a.campaign_id
WHERE a.created_at > $1 AND a.created_at < $2
ORDER BY a.created_at
LIMIT 100;";

/// Clicks joined to their ads, filtered by cost floor.
pub const CLICKS_JOIN: &str = "\
SELECT *
FROM clicks as c
JOIN ads as a
    ON c.company_id = a.company_id
           AND c.ad_id = a.id
WHERE a.created_at > $1 AND c.cost_per_click_usd > $2
ORDER BY c.cost_per_click_usd
LIMIT 100;";

/// The canonical read shapes, in selector order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Window-function ranking over an impressions join.
    RankImpressions,
    /// Wide impressions join ordered by time.
    ImpressionsJoin,
    /// Company creation-window scan.
    CompanyRange,
    /// Campaign filter probe.
    CampaignFilter,
    /// Ads to campaigns join probe.
    AdsJoin,
    /// Clicks to ads join probe.
    ClicksJoin,
}

impl QueryKind {
    /// All shapes, selector order.
    pub const ALL: [QueryKind; 6] = [
        QueryKind::RankImpressions,
        QueryKind::ImpressionsJoin,
        QueryKind::CompanyRange,
        QueryKind::CampaignFilter,
        QueryKind::AdsJoin,
        QueryKind::ClicksJoin,
    ];

    /// The shapes that force large scans.
    pub const HEAVY: [QueryKind; 2] = [QueryKind::RankImpressions, QueryKind::ImpressionsJoin];

    /// The bounded filter and join probes.
    pub const LIGHT: [QueryKind; 4] = [
        QueryKind::CompanyRange,
        QueryKind::CampaignFilter,
        QueryKind::AdsJoin,
        QueryKind::ClicksJoin,
    ];

    /// Resolve a CLI selector.
    #[must_use]
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }

    /// Whether this shape is in the heavy mix.
    #[must_use]
    pub fn is_heavy(self) -> bool {
        Self::HEAVY.contains(&self)
    }

    /// Statement text.
    #[must_use]
    pub fn sql(self) -> &'static str {
        match self {
            QueryKind::RankImpressions => RANK_IMPRESSIONS,
            QueryKind::ImpressionsJoin => IMPRESSIONS_JOIN,
            QueryKind::CompanyRange => COMPANY_RANGE,
            QueryKind::CampaignFilter => CAMPAIGN_FILTER,
            QueryKind::AdsJoin => ADS_JOIN,
            QueryKind::ClicksJoin => CLICKS_JOIN,
        }
    }

    /// One parameter tuple for this shape.
    pub fn params<R>(self, rng: &mut R) -> Vec<Value>
    where
        R: Rng + ?Sized,
    {
        match self {
            QueryKind::RankImpressions => vec![cost_floor(rng).into()],
            QueryKind::ImpressionsJoin => vec![
                cost_floor(rng).into(),
                synth::datetime_between(rng, CREATED_WINDOW).into(),
            ],
            QueryKind::CompanyRange | QueryKind::AdsJoin => vec![
                synth::datetime_between(rng, CREATED_WINDOW).into(),
                synth::datetime_between(rng, CREATED_WINDOW).into(),
            ],
            QueryKind::CampaignFilter => vec![
                synth::datetime_between(rng, CREATED_WINDOW).into(),
                synth::datetime_between(rng, CREATED_WINDOW).into(),
                synth::us_state(rng).into(),
                rng.random_range(0..100_000i64).into(),
            ],
            QueryKind::ClicksJoin => vec![
                synth::datetime_between(rng, CREATED_WINDOW).into(),
                cost_floor(rng).into(),
            ],
        }
    }

    /// A pre-generated list of `count` parameter tuples.
    pub fn param_list<R>(self, rng: &mut R, count: usize) -> Vec<Vec<Value>>
    where
        R: Rng + ?Sized,
    {
        (0..count).map(|_| self.params(rng)).collect()
    }
}

/// A cost threshold in [0, 1) with millidollar resolution, matching the
/// generated cost columns.
fn cost_floor<R>(rng: &mut R) -> f64
where
    R: Rng + ?Sized,
{
    f64::from(rng.random_range(0..1_000)) / 1_000.0
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::SmallRng};

    use super::{QueryKind, Value};

    fn placeholders(sql: &str) -> usize {
        (1..).take_while(|n| sql.contains(&format!("${n}"))).count()
    }

    #[test]
    fn params_match_placeholders() {
        let mut rng = SmallRng::seed_from_u64(21);
        for kind in QueryKind::ALL {
            assert_eq!(
                kind.params(&mut rng).len(),
                placeholders(kind.sql()),
                "{kind:?}"
            );
        }
    }

    #[test]
    fn selector_order_is_stable() {
        assert_eq!(QueryKind::from_index(0), Some(QueryKind::RankImpressions));
        assert_eq!(QueryKind::from_index(5), Some(QueryKind::ClicksJoin));
        assert_eq!(QueryKind::from_index(6), None);
    }

    #[test]
    fn heavy_and_light_partition_the_set() {
        for kind in QueryKind::ALL {
            assert_ne!(
                QueryKind::HEAVY.contains(&kind),
                QueryKind::LIGHT.contains(&kind)
            );
        }
    }

    #[test]
    fn cost_floors_are_sub_dollar() {
        let mut rng = SmallRng::seed_from_u64(22);
        for _ in 0..1_000 {
            let params = QueryKind::RankImpressions.params(&mut rng);
            match &params[0] {
                Value::Double(v) => assert!((0.0..1.0).contains(v)),
                other => panic!("expected a double, got {other:?}"),
            }
        }
    }

    #[test]
    fn param_list_has_requested_length() {
        let mut rng = SmallRng::seed_from_u64(23);
        let list = QueryKind::CampaignFilter.param_list(&mut rng, 64);
        assert_eq!(list.len(), 64);
        assert!(list.iter().all(|p| p.len() == 4));
    }
}
