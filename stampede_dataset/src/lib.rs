//! Deterministic dataset synthesis for stampede.
//!
//! One [`DataSet`] is the unit of insert work: a strict five-level
//! hierarchy (companies, campaigns, ads, clicks, impressions) with fixed
//! integer fan-out between levels. Generation is a pure function of a
//! string seed so that two runs, or two workers handed the same seed,
//! produce byte-identical records. The whole set is built in memory up
//! front; nothing here touches a database.

#![deny(clippy::cargo)]
#![deny(missing_docs)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::multiple_crate_versions)]

use std::hash::{Hash, Hasher};

use rand::{Rng, SeedableRng, rngs::SmallRng};
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

mod entity;
pub mod fixtures;
pub mod synth;

pub use entity::{Ad, Campaign, Click, Company, Impression};

use synth::{CREATED_WINDOW, UPDATED_WINDOW};

/// Errors produced by dataset generation.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The company count was zero, leaving nothing to anchor the hierarchy.
    #[error("company count must be at least 1")]
    ZeroCompanies,
    /// A fan-out ratio was zero, which would orphan every level below it.
    #[error("fan-out ratio `{0}` must be at least 1")]
    ZeroRatio(&'static str),
    /// A child level's record count is not an integer multiple of its
    /// parent level's, so records cannot be walked hierarchically.
    #[error("{child} count {child_len} does not divide evenly by {parent} count {parent_len}")]
    UnevenFanOut {
        /// Child level name.
        child: &'static str,
        /// Child record count.
        child_len: usize,
        /// Parent level name.
        parent: &'static str,
        /// Parent record count.
        parent_len: usize,
    },
}

/// Fixed integer multipliers between adjacent hierarchy levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Ratios {
    /// Campaigns generated per company.
    pub campaigns_per_company: u32,
    /// Ads generated per campaign.
    pub ads_per_campaign: u32,
    /// Clicks generated per ad.
    pub clicks_per_ad: u32,
    /// Impressions generated per click.
    pub impressions_per_click: u32,
}

impl Default for Ratios {
    /// The reference chain: 10 campaigns per company, 1 ad per campaign,
    /// 10 clicks per ad, 10 impressions per click.
    fn default() -> Self {
        Self {
            campaigns_per_company: 10,
            ads_per_campaign: 1,
            clicks_per_ad: 10,
            impressions_per_click: 10,
        }
    }
}

impl Ratios {
    fn validate(self) -> Result<(), Error> {
        if self.campaigns_per_company == 0 {
            return Err(Error::ZeroRatio("campaigns_per_company"));
        }
        if self.ads_per_campaign == 0 {
            return Err(Error::ZeroRatio("ads_per_campaign"));
        }
        if self.clicks_per_ad == 0 {
            return Err(Error::ZeroRatio("clicks_per_ad"));
        }
        if self.impressions_per_click == 0 {
            return Err(Error::ZeroRatio("impressions_per_click"));
        }
        Ok(())
    }
}

/// Shape of one generated dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Spec {
    /// Companies per dataset; every other count follows from the ratios.
    pub companies: u32,
    /// Fan-out multipliers.
    pub ratios: Ratios,
}

impl Default for Spec {
    /// The reference shape: 2000 companies, which with default ratios is
    /// 20 000 campaigns, 20 000 ads, 200 000 clicks and 2 000 000
    /// impressions per dataset.
    fn default() -> Self {
        Self {
            companies: 2_000,
            ratios: Ratios::default(),
        }
    }
}

impl Spec {
    /// Total records one dataset of this shape will contain.
    #[must_use]
    pub fn total_records(&self) -> u64 {
        let companies = u64::from(self.companies);
        let campaigns = companies * u64::from(self.ratios.campaigns_per_company);
        let ads = campaigns * u64::from(self.ratios.ads_per_campaign);
        let clicks = ads * u64::from(self.ratios.clicks_per_ad);
        let impressions = clicks * u64::from(self.ratios.impressions_per_click);
        companies + campaigns + ads + clicks + impressions
    }
}

/// One fully generated hierarchy, ready to be walked by a dispatch loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSet {
    /// Top level of the hierarchy.
    pub companies: Vec<Company>,
    /// `campaigns[i * campaigns_per_company .. (i+1) * ..]` belong to
    /// `companies[i]`, and so on down each level.
    pub campaigns: Vec<Campaign>,
    /// Creative units, one slice per campaign.
    pub ads: Vec<Ad>,
    /// Click events, one slice per ad.
    pub clicks: Vec<Click>,
    /// View events, one slice per ad.
    pub impressions: Vec<Impression>,
}

impl DataSet {
    /// Generate a dataset. Equal seeds yield identical datasets.
    ///
    /// # Errors
    ///
    /// Returns an error if the spec names a zero company count or a zero
    /// fan-out ratio.
    pub fn generate(seed: &str, spec: &Spec) -> Result<Self, Error> {
        if spec.companies == 0 {
            return Err(Error::ZeroCompanies);
        }
        spec.ratios.validate()?;

        let mut rng = SmallRng::seed_from_u64(seed_to_u64(seed));

        let company_count = spec.companies as usize;
        let campaign_count = company_count * spec.ratios.campaigns_per_company as usize;
        let ad_count = campaign_count * spec.ratios.ads_per_campaign as usize;
        let click_count = ad_count * spec.ratios.clicks_per_ad as usize;
        let impression_count = click_count * spec.ratios.impressions_per_click as usize;

        let companies = (0..company_count)
            .map(|_| Company {
                name: synth::person_name(&mut rng),
                image_url: synth::image_url(&mut rng),
                created_at: synth::datetime_between(&mut rng, CREATED_WINDOW),
                updated_at: synth::datetime_between(&mut rng, UPDATED_WINDOW),
            })
            .collect();

        let campaigns = (0..campaign_count)
            .map(|_| Campaign {
                name: synth::person_name(&mut rng),
                cost_model: rng.random::<synth::CostModel>().to_string(),
                state: synth::us_state(&mut rng),
                monthly_budget: rng.random_range(0..100_000),
                blacklisted_site_urls: vec![synth::url(&mut rng)],
                created_at: synth::datetime_between(&mut rng, CREATED_WINDOW),
                updated_at: synth::datetime_between(&mut rng, UPDATED_WINDOW),
            })
            .collect();

        let ads = (0..ad_count)
            .map(|_| Ad {
                name: synth::person_name(&mut rng),
                image_url: synth::image_url(&mut rng),
                target_url: synth::url(&mut rng),
                impressions_count: rng.random_range(0..100_000),
                clicks_count: rng.random_range(0..100_000),
                created_at: synth::datetime_between(&mut rng, CREATED_WINDOW),
                updated_at: synth::datetime_between(&mut rng, UPDATED_WINDOW),
            })
            .collect();

        let clicks = (0..click_count)
            .map(|_| Click {
                clicked_at: synth::datetime_between(&mut rng, CREATED_WINDOW),
                site_url: synth::url(&mut rng),
                cost_per_click_usd: f64::from(rng.random_range(0..1_000)) / 1_000.0,
                user_ip: rng.random::<synth::IpV4>().to_string(),
                user_data: synth::json_payload(&mut rng),
            })
            .collect();

        let impressions = (0..impression_count)
            .map(|_| Impression {
                seen_at: synth::datetime_between(&mut rng, CREATED_WINDOW),
                site_url: synth::url(&mut rng),
                cost_per_impression_usd: f64::from(rng.random_range(0..1_000)) / 10_000.0,
                user_ip: rng.random::<synth::IpV4>().to_string(),
                user_data: synth::json_payload(&mut rng),
            })
            .collect();

        Ok(Self {
            companies,
            campaigns,
            ads,
            clicks,
            impressions,
        })
    }

    /// Assemble a dataset from pre-built record vectors, as
    /// [`fixtures::load`] does with records read back from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the hierarchy is empty or any level's count is
    /// not an integer multiple of its parent's.
    pub fn from_parts(
        companies: Vec<Company>,
        campaigns: Vec<Campaign>,
        ads: Vec<Ad>,
        clicks: Vec<Click>,
        impressions: Vec<Impression>,
    ) -> Result<Self, Error> {
        let set = Self {
            companies,
            campaigns,
            ads,
            clicks,
            impressions,
        };
        set.check_fan_out()?;
        Ok(set)
    }

    fn check_fan_out(&self) -> Result<(), Error> {
        if self.companies.is_empty() {
            return Err(Error::ZeroCompanies);
        }
        check_divides("campaigns", self.campaigns.len(), "companies", self.companies.len())?;
        check_divides("ads", self.ads.len(), "campaigns", self.campaigns.len())?;
        check_divides("clicks", self.clicks.len(), "ads", self.ads.len())?;
        check_divides("impressions", self.impressions.len(), "ads", self.ads.len())?;
        Ok(())
    }

    /// Records across all five levels.
    #[must_use]
    pub fn total_records(&self) -> u64 {
        (self.companies.len()
            + self.campaigns.len()
            + self.ads.len()
            + self.clicks.len()
            + self.impressions.len()) as u64
    }

    /// Campaigns belonging to each company.
    #[must_use]
    pub fn campaigns_per_company(&self) -> usize {
        self.campaigns.len() / self.companies.len()
    }

    /// Ads belonging to each campaign.
    #[must_use]
    pub fn ads_per_campaign(&self) -> usize {
        self.ads.len() / self.campaigns.len()
    }

    /// Clicks belonging to each ad.
    #[must_use]
    pub fn clicks_per_ad(&self) -> usize {
        self.clicks.len() / self.ads.len()
    }

    /// Impressions belonging to each ad. Note the reference ratios express
    /// impressions per click; per ad that multiplies out through the click
    /// fan-out.
    #[must_use]
    pub fn impressions_per_ad(&self) -> usize {
        self.impressions.len() / self.ads.len()
    }
}

fn check_divides(
    child: &'static str,
    child_len: usize,
    parent: &'static str,
    parent_len: usize,
) -> Result<(), Error> {
    if parent_len == 0 || child_len % parent_len != 0 {
        return Err(Error::UnevenFanOut {
            child,
            child_len,
            parent,
            parent_len,
        });
    }
    Ok(())
}

/// Collapse a string seed, typically `"{worker_id}-{index}"`, into RNG
/// seed material.
#[must_use]
pub fn seed_to_u64(seed: &str) -> u64 {
    let mut hasher = FxHasher::default();
    seed.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{DataSet, Error, Ratios, Spec};

    fn small_spec(companies: u32) -> Spec {
        Spec {
            companies,
            ratios: Ratios::default(),
        }
    }

    #[test]
    fn reference_cardinalities() {
        // seed=1, companies=2, ratios 10/1/10/10.
        let set = DataSet::generate("1", &small_spec(2)).expect("generation must succeed");

        assert_eq!(set.companies.len(), 2);
        assert_eq!(set.campaigns.len(), 20);
        assert_eq!(set.ads.len(), 20);
        assert_eq!(set.clicks.len(), 200);
        assert_eq!(set.impressions.len(), 2_000);
        assert_eq!(set.total_records(), 2_242);
        assert_eq!(small_spec(2).total_records(), 2_242);

        assert_eq!(set.campaigns_per_company(), 10);
        assert_eq!(set.ads_per_campaign(), 1);
        assert_eq!(set.clicks_per_ad(), 10);
        assert_eq!(set.impressions_per_ad(), 100);
    }

    #[test]
    fn equal_seeds_equal_sets() {
        let spec = small_spec(3);
        let a = DataSet::generate("0-7", &spec).expect("generation must succeed");
        let b = DataSet::generate("0-7", &spec).expect("generation must succeed");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_seeds_diverge() {
        let spec = small_spec(3);
        let a = DataSet::generate("0-0", &spec).expect("generation must succeed");
        let b = DataSet::generate("0-1", &spec).expect("generation must succeed");
        assert_ne!(a, b);
    }

    #[test]
    fn zero_companies_refused() {
        assert_eq!(
            DataSet::generate("1", &small_spec(0)),
            Err(Error::ZeroCompanies)
        );
    }

    #[test]
    fn zero_ratio_refused() {
        let spec = Spec {
            companies: 1,
            ratios: Ratios {
                ads_per_campaign: 0,
                ..Ratios::default()
            },
        };
        assert_eq!(
            DataSet::generate("1", &spec),
            Err(Error::ZeroRatio("ads_per_campaign"))
        );
    }

    #[test]
    fn from_parts_rejects_uneven_fan_out() {
        let spec = small_spec(2);
        let mut set = DataSet::generate("1", &spec).expect("generation must succeed");
        set.campaigns.pop();
        let result = DataSet::from_parts(
            set.companies,
            set.campaigns,
            set.ads,
            set.clicks,
            set.impressions,
        );
        assert!(matches!(result, Err(Error::UnevenFanOut { .. })));
    }

    proptest! {
        #[test]
        fn cardinality_ratios_hold(
            companies in 1u32..8,
            campaigns_per_company in 1u32..5,
            ads_per_campaign in 1u32..4,
            clicks_per_ad in 1u32..4,
            impressions_per_click in 1u32..4,
        ) {
            let spec = Spec {
                companies,
                ratios: Ratios {
                    campaigns_per_company,
                    ads_per_campaign,
                    clicks_per_ad,
                    impressions_per_click,
                },
            };
            let set = DataSet::generate("prop", &spec).expect("generation must succeed");

            prop_assert_eq!(
                set.campaigns.len(),
                set.companies.len() * campaigns_per_company as usize
            );
            prop_assert_eq!(
                set.ads.len(),
                set.campaigns.len() * ads_per_campaign as usize
            );
            prop_assert_eq!(set.clicks.len(), set.ads.len() * clicks_per_ad as usize);
            prop_assert_eq!(
                set.impressions.len(),
                set.clicks.len() * impressions_per_click as usize
            );
            prop_assert_eq!(set.total_records(), spec.total_records());
        }
    }
}
