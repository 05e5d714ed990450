//! The generated record types.
//!
//! These mirror the five tables of the target schema. Parent references
//! (`company_id` and friends) are deliberately absent: identifiers are
//! generated by the store at insert time and threaded through by the
//! dispatch loop, never by the generator.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Top-level tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    /// Display name.
    pub name: String,
    /// Logo reference.
    pub image_url: String,
    /// Creation instant.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last-modified instant.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// An advertising campaign belonging to a [`Company`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    /// Display name.
    pub name: String,
    /// Billing model label.
    pub cost_model: String,
    /// US state the campaign targets.
    pub state: String,
    /// Monthly spend ceiling in whole dollars.
    pub monthly_budget: i32,
    /// Sites the campaign must not appear on.
    pub blacklisted_site_urls: Vec<String>,
    /// Creation instant.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last-modified instant.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A creative unit belonging to a [`Campaign`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ad {
    /// Display name.
    pub name: String,
    /// Creative asset reference.
    pub image_url: String,
    /// Click-through destination.
    pub target_url: String,
    /// Denormalized impression tally.
    pub impressions_count: i32,
    /// Denormalized click tally.
    pub clicks_count: i32,
    /// Creation instant.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last-modified instant.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A click event against an [`Ad`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Click {
    /// When the click happened.
    #[serde(with = "time::serde::rfc3339")]
    pub clicked_at: OffsetDateTime,
    /// Site the ad was served on.
    pub site_url: String,
    /// Billed cost of this click.
    pub cost_per_click_usd: f64,
    /// Origin address of the clicking user.
    pub user_ip: String,
    /// Opaque client-side payload, JSON-encoded.
    pub user_data: String,
}

/// A view event against an [`Ad`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Impression {
    /// When the view happened.
    #[serde(with = "time::serde::rfc3339")]
    pub seen_at: OffsetDateTime,
    /// Site the ad was served on.
    pub site_url: String,
    /// Billed cost of this impression.
    pub cost_per_impression_usd: f64,
    /// Origin address of the viewing user.
    pub user_ip: String,
    /// Opaque client-side payload, JSON-encoded.
    pub user_data: String,
}
