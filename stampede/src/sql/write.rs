//! Insert statements and their parameter builders.
//!
//! Each statement draws its id from the table's sequence and returns it,
//! so the dispatch loop can thread parent ids into child rows without a
//! second round trip.

use stampede_dataset::{Ad, Campaign, Click, Company, Impression};
use tokio_postgres::Row;

use super::Value;

/// Insert one company, returning its id.
pub const INSERT_COMPANY: &str = "\
INSERT INTO companies(
  id,
  name,
  image_url,
  created_at,
  updated_at
) VALUES (
  nextval('companies_id_seq'),
  $1,
  $2,
  $3,
  $4
) RETURNING id;";

/// Insert one campaign under a company, returning its id.
pub const INSERT_CAMPAIGN: &str = "\
INSERT INTO campaigns(
  id,
  company_id,
  name,
  cost_model,
  state,
  monthly_budget,
  blacklisted_site_urls,
  created_at,
  updated_at
) VALUES (
  nextval('campaigns_id_seq'),
  $1,
  $2,
  $3,
  $4,
  $5,
  $6,
  $7,
  $8
) RETURNING id;";

/// Insert one ad under a campaign, returning its id.
pub const INSERT_AD: &str = "\
INSERT INTO ads(
  id,
  company_id,
  campaign_id,
  name,
  image_url,
  target_url,
  impressions_count,
  clicks_count,
  created_at,
  updated_at
) VALUES (
  nextval('ads_id_seq'),
  $1,
  $2,
  $3,
  $4,
  $5,
  $6,
  $7,
  $8,
  $9
) RETURNING id;";

/// Insert one click against an ad, returning its id.
pub const INSERT_CLICK: &str = "\
INSERT INTO clicks(
  id,
  company_id,
  ad_id,
  clicked_at,
  site_url,
  cost_per_click_usd,
  user_ip,
  user_data
) VALUES (
  nextval('clicks_id_seq'),
  $1,
  $2,
  $3,
  $4,
  $5,
  $6,
  $7
) RETURNING id;";

/// Insert one impression against an ad, returning its id.
pub const INSERT_IMPRESSION: &str = "\
INSERT INTO impressions(
  id,
  company_id,
  ad_id,
  seen_at,
  site_url,
  cost_per_impression_usd,
  user_ip,
  user_data
) VALUES (
  nextval('impressions_id_seq'),
  $1,
  $2,
  $3,
  $4,
  $5,
  $6,
  $7
) RETURNING id;";

/// Bind values for [`INSERT_COMPANY`].
#[must_use]
pub fn company_params(company: &Company) -> Vec<Value> {
    vec![
        company.name.clone().into(),
        company.image_url.clone().into(),
        company.created_at.into(),
        company.updated_at.into(),
    ]
}

/// Bind values for [`INSERT_CAMPAIGN`].
#[must_use]
pub fn campaign_params(company_id: i64, campaign: &Campaign) -> Vec<Value> {
    vec![
        company_id.into(),
        campaign.name.clone().into(),
        campaign.cost_model.clone().into(),
        campaign.state.clone().into(),
        campaign.monthly_budget.into(),
        campaign.blacklisted_site_urls.clone().into(),
        campaign.created_at.into(),
        campaign.updated_at.into(),
    ]
}

/// Bind values for [`INSERT_AD`].
#[must_use]
pub fn ad_params(company_id: i64, campaign_id: i64, ad: &Ad) -> Vec<Value> {
    vec![
        company_id.into(),
        campaign_id.into(),
        ad.name.clone().into(),
        ad.image_url.clone().into(),
        ad.target_url.clone().into(),
        ad.impressions_count.into(),
        ad.clicks_count.into(),
        ad.created_at.into(),
        ad.updated_at.into(),
    ]
}

/// Bind values for [`INSERT_CLICK`].
#[must_use]
pub fn click_params(company_id: i64, ad_id: i64, click: &Click) -> Vec<Value> {
    vec![
        company_id.into(),
        ad_id.into(),
        click.clicked_at.into(),
        click.site_url.clone().into(),
        click.cost_per_click_usd.into(),
        click.user_ip.clone().into(),
        Value::Json(click.user_data.clone()),
    ]
}

/// Bind values for [`INSERT_IMPRESSION`].
#[must_use]
pub fn impression_params(company_id: i64, ad_id: i64, impression: &Impression) -> Vec<Value> {
    vec![
        company_id.into(),
        ad_id.into(),
        impression.seen_at.into(),
        impression.site_url.clone().into(),
        impression.cost_per_impression_usd.into(),
        impression.user_ip.clone().into(),
        Value::Json(impression.user_data.clone()),
    ]
}

/// Pull the `RETURNING id` column out of an insert's single row,
/// tolerating `integer` and `bigint` id schemes.
///
/// # Errors
///
/// Returns an error if the column is absent or of an unsupported type.
pub fn returned_id(row: &Row) -> Result<i64, tokio_postgres::Error> {
    match row.try_get::<_, i64>(0) {
        Ok(id) => Ok(id),
        Err(_) => row.try_get::<_, i32>(0).map(i64::from),
    }
}

#[cfg(test)]
mod tests {
    use stampede_dataset::{DataSet, Spec};

    use super::{
        INSERT_AD, INSERT_CAMPAIGN, INSERT_CLICK, INSERT_COMPANY, INSERT_IMPRESSION, ad_params,
        campaign_params, click_params, company_params, impression_params,
    };

    fn placeholders(sql: &str) -> usize {
        (1..).take_while(|n| sql.contains(&format!("${n}"))).count()
    }

    #[test]
    fn parameter_counts_match_statements() {
        let spec = Spec {
            companies: 1,
            ..Spec::default()
        };
        let set = DataSet::generate("write-test", &spec).expect("valid spec");

        assert_eq!(
            company_params(&set.companies[0]).len(),
            placeholders(INSERT_COMPANY)
        );
        assert_eq!(
            campaign_params(1, &set.campaigns[0]).len(),
            placeholders(INSERT_CAMPAIGN)
        );
        assert_eq!(ad_params(1, 2, &set.ads[0]).len(), placeholders(INSERT_AD));
        assert_eq!(
            click_params(1, 3, &set.clicks[0]).len(),
            placeholders(INSERT_CLICK)
        );
        assert_eq!(
            impression_params(1, 3, &set.impressions[0]).len(),
            placeholders(INSERT_IMPRESSION)
        );
    }

    #[test]
    fn every_statement_returns_an_id() {
        for sql in [
            INSERT_COMPANY,
            INSERT_CAMPAIGN,
            INSERT_AD,
            INSERT_CLICK,
            INSERT_IMPRESSION,
        ] {
            assert!(sql.contains("RETURNING id"));
            assert!(sql.contains("nextval("));
        }
    }
}
