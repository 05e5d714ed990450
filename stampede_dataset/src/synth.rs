//! Synthetic field values.
//!
//! Every value here is a pure function of the caller's RNG, which is what
//! makes whole-dataset generation reproducible from a seed. Pools are
//! deliberately small; the point is realistic shape and cardinality, not
//! uniqueness.

use core::fmt;

use rand::{
    Rng,
    distr::{Distribution, StandardUniform},
    seq::IndexedRandom,
};
use time::OffsetDateTime;
use time::macros::datetime;

/// Creation timestamps fall in this window.
pub const CREATED_WINDOW: (OffsetDateTime, OffsetDateTime) =
    (datetime!(2015-01-01 0:00 UTC), datetime!(2021-01-01 0:00 UTC));

/// Update timestamps fall in this window, after every possible creation.
pub const UPDATED_WINDOW: (OffsetDateTime, OffsetDateTime) =
    (datetime!(2021-01-01 0:00 UTC), datetime!(2021-06-01 0:00 UTC));

const FIRST_NAMES: [&str; 24] = [
    "Ada", "Alonzo", "Barbara", "Claude", "Donald", "Edsger", "Frances", "Grace", "Hedy", "Ivan",
    "John", "Katherine", "Kurt", "Leslie", "Margaret", "Niklaus", "Ole", "Peter", "Radia",
    "Robin", "Sophie", "Tony", "Vint", "Whitfield",
];

const LAST_NAMES: [&str; 24] = [
    "Lovelace", "Church", "Liskov", "Shannon", "Knuth", "Dijkstra", "Allen", "Hopper", "Lamarr",
    "Sutherland", "Backus", "Johnson", "Goedel", "Lamport", "Hamilton", "Wirth", "Dahl", "Naur",
    "Perlman", "Milner", "Wilson", "Hoare", "Cerf", "Diffie",
];

const US_STATES: [&str; 20] = [
    "Alabama",
    "Arizona",
    "California",
    "Colorado",
    "Florida",
    "Georgia",
    "Illinois",
    "Kansas",
    "Maine",
    "Michigan",
    "Nevada",
    "New York",
    "Ohio",
    "Oregon",
    "Texas",
    "Utah",
    "Vermont",
    "Virginia",
    "Washington",
    "Wyoming",
];

const DOMAIN_WORDS: [&str; 16] = [
    "alfa", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel", "india", "juliett",
    "kilo", "lima", "mike", "november", "oscar", "papa",
];

const TLDS: [&str; 5] = ["com", "net", "org", "io", "dev"];

const PAYLOAD_KEYS: [&str; 7] = [
    "foo", "bar", "bike", "a", "b", "name", "prop",
];

/// How a campaign is billed.
#[derive(Debug, Clone, Copy)]
pub(crate) enum CostModel {
    PerClick,
    PerImpression,
    PerAction,
}

impl Distribution<CostModel> for StandardUniform {
    fn sample<R>(&self, rng: &mut R) -> CostModel
    where
        R: Rng + ?Sized,
    {
        match rng.random_range(0..3) {
            0 => CostModel::PerClick,
            1 => CostModel::PerImpression,
            2 => CostModel::PerAction,
            _ => unreachable!(),
        }
    }
}

impl fmt::Display for CostModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CostModel::PerClick => "cost_per_click",
            CostModel::PerImpression => "cost_per_impression",
            CostModel::PerAction => "cost_per_action",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct IpV4 {
    zero: u8,
    one: u8,
    two: u8,
    three: u8,
}

impl Distribution<IpV4> for StandardUniform {
    fn sample<R>(&self, rng: &mut R) -> IpV4
    where
        R: Rng + ?Sized,
    {
        IpV4 {
            zero: rng.random(),
            one: rng.random(),
            two: rng.random(),
            three: rng.random(),
        }
    }
}

impl fmt::Display for IpV4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.zero, self.one, self.two, self.three)
    }
}

/// `"First Last"` drawn from two small pools.
pub fn person_name<R>(rng: &mut R) -> String
where
    R: Rng + ?Sized,
{
    let first = FIRST_NAMES.choose(rng).expect("pool is non-empty");
    let last = LAST_NAMES.choose(rng).expect("pool is non-empty");
    format!("{first} {last}")
}

/// A US state name.
pub fn us_state<R>(rng: &mut R) -> String
where
    R: Rng + ?Sized,
{
    (*US_STATES.choose(rng).expect("pool is non-empty")).to_string()
}

/// An `https` site URL with a plausible domain.
pub fn url<R>(rng: &mut R) -> String
where
    R: Rng + ?Sized,
{
    let a = DOMAIN_WORDS.choose(rng).expect("pool is non-empty");
    let b = DOMAIN_WORDS.choose(rng).expect("pool is non-empty");
    let tld = TLDS.choose(rng).expect("pool is non-empty");
    format!("https://{a}-{b}.{tld}")
}

/// An image asset URL with random dimensions in the path.
pub fn image_url<R>(rng: &mut R) -> String
where
    R: Rng + ?Sized,
{
    let width: u16 = rng.random_range(1..=1024);
    let height: u16 = rng.random_range(1..=1024);
    let word = DOMAIN_WORDS.choose(rng).expect("pool is non-empty");
    format!("https://images.{word}.test/{width}/{height}")
}

/// A uniform instant in `window`, whole seconds.
pub fn datetime_between<R>(rng: &mut R, window: (OffsetDateTime, OffsetDateTime)) -> OffsetDateTime
where
    R: Rng + ?Sized,
{
    let (lo, hi) = window;
    let secs = rng.random_range(lo.unix_timestamp()..hi.unix_timestamp());
    OffsetDateTime::from_unix_timestamp(secs).expect("timestamp is within the valid range")
}

/// A small JSON object rendered to a string, standing in for opaque
/// client-side event data.
pub fn json_payload<R>(rng: &mut R) -> String
where
    R: Rng + ?Sized,
{
    let mut map = serde_json::Map::new();
    let fields = rng.random_range(2..=5);
    for key in PAYLOAD_KEYS.choose_multiple(rng, fields) {
        let value: u32 = rng.random_range(0..100_000);
        map.insert((*key).to_string(), serde_json::Value::from(value));
    }
    serde_json::Value::Object(map).to_string()
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::SmallRng};

    use super::{CREATED_WINDOW, UPDATED_WINDOW, datetime_between, json_payload, url};

    #[test]
    fn datetimes_stay_in_window() {
        let mut rng = SmallRng::seed_from_u64(11);
        for _ in 0..1_000 {
            let created = datetime_between(&mut rng, CREATED_WINDOW);
            let updated = datetime_between(&mut rng, UPDATED_WINDOW);
            assert!(created >= CREATED_WINDOW.0 && created < CREATED_WINDOW.1);
            assert!(updated >= UPDATED_WINDOW.0 && updated < UPDATED_WINDOW.1);
            assert!(created < updated);
        }
    }

    #[test]
    fn payload_is_valid_json() {
        let mut rng = SmallRng::seed_from_u64(12);
        for _ in 0..100 {
            let raw = json_payload(&mut rng);
            let parsed: serde_json::Value =
                serde_json::from_str(&raw).expect("payload must parse as JSON");
            assert!(parsed.is_object());
        }
    }

    #[test]
    fn urls_have_scheme_and_tld() {
        let mut rng = SmallRng::seed_from_u64(13);
        let u = url(&mut rng);
        assert!(u.starts_with("https://"));
        assert!(u.rsplit('.').next().is_some());
    }
}
