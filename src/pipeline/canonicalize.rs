//! Optional canonicalization of location names after coercion.
//!
//! State (negeri) and city (bandar) names arrive in many spellings: "WP KL",
//! "W.P. Kuala Lumpur" and "Wilayah Persekutuan Kuala Lumpur" are the same
//! state. Matching works on a key that is lowercased, has punctuation turned
//! into spaces and has runs of whitespace collapsed. A name matches an alias
//! exactly, or contains a long alias as whole words. Unknown names are title
//! cased. The level column is folded to `Rendah` or `Menengah`.

use crate::types::{NameChanges, SchoolRecord};
use tracing::debug;

/// Shortest alias key that may match inside a longer state name
const STATE_CONTAINS_MIN: usize = 6;
/// Shortest alias key that may match inside a longer city name
const CITY_CONTAINS_MIN: usize = 4;

type AliasTable = &'static [(&'static str, &'static [&'static str])];

const STATES: AliasTable = &[
    (
        "Kuala Lumpur",
        &[
            "kuala lumpur",
            "kl",
            "k.l.",
            "wp kl",
            "wpkl",
            "wpkualalumpur",
            "wp kuala lumpur",
            "w.p. kuala lumpur",
            "w.p.k.l",
            "wp k.l",
            "wilayah persekutuan kuala lumpur",
            "wilaya persekutuan kuala lumpur",
            "wilayah persekutuan kl",
            "kuala lumpur wp",
            "kl wp",
            "kl (wp)",
        ],
    ),
    (
        "Labuan",
        &[
            "labuan",
            "wp labuan",
            "wplabuan",
            "w.p. labuan",
            "wilayah persekutuan labuan",
            "wilaya persekutuan labuan",
            "labuan wp",
        ],
    ),
    (
        "Putrajaya",
        &[
            "putrajaya",
            "wp putrajaya",
            "wpputrajaya",
            "w.p. putrajaya",
            "wilayah persekutuan putrajaya",
            "wilaya persekutuan putrajaya",
            "putrajaya wp",
        ],
    ),
    (
        "Pulau Pinang",
        &[
            "pulau pinang",
            "penang",
            "p.pinang",
            "p pinang",
            "pp",
            "pinang",
            "penang island",
        ],
    ),
    (
        "Negeri Sembilan",
        &[
            "negeri sembilan",
            "n.sembilan",
            "n sembilan",
            "ns",
            "negeri 9",
            "n9",
            "sembilan",
        ],
    ),
    ("Johor", &["johor", "johore", "johor darul takzim", "jdt"]),
    ("Kedah", &["kedah", "kedah darul aman"]),
    ("Kelantan", &["kelantan", "kelantan darul naim"]),
    ("Melaka", &["melaka", "malacca", "malaka"]),
    ("Pahang", &["pahang", "pahang darul makmur"]),
    ("Perak", &["perak", "perak darul ridzuan"]),
    ("Perlis", &["perlis", "perlis indah kayangan"]),
    ("Sabah", &["sabah", "negeri di bawah bayu", "north borneo"]),
    ("Sarawak", &["sarawak", "bumi kenyalang"]),
    ("Selangor", &["selangor", "selangor darul ehsan"]),
    ("Terengganu", &["terengganu", "trengganu", "terengganu darul iman"]),
];

const CITIES: AliasTable = &[
    (
        "Kuala Lumpur",
        &["kuala lumpur", "kl", "k.l.", "kl city", "klcc", "w.p kuala lumpur"],
    ),
    ("Petaling Jaya", &["petaling jaya", "pj", "p.j."]),
    ("Subang Jaya", &["subang jaya", "usj", "subang"]),
    ("Shah Alam", &["shah alam"]),
    ("Klang", &["klang", "port klang", "pelabuhan klang"]),
    ("Ampang", &["ampang", "ampang jaya", "pandan indah", "pandan jaya"]),
    ("Cheras", &["cheras"]),
    ("Gombak", &["gombak"]),
    ("Kajang", &["kajang"]),
    ("Selayang", &["selayang"]),
    ("Rawang", &["rawang"]),
    ("Puchong", &["puchong"]),
    ("Cyberjaya", &["cyberjaya"]),
    ("Putrajaya", &["putrajaya", "presint", "precinct"]),
    ("Ipoh", &["ipoh"]),
    ("Georgetown", &["georgetown", "george town"]),
    ("Bayan Lepas", &["bayan lepas", "bayan baru"]),
    ("Butterworth", &["butterworth", "bagan luar"]),
    ("Johor Bahru", &["johor bahru", "johor baru", "jb", "j.b."]),
    ("Skudai", &["skudai"]),
    ("Muar", &["muar", "bandar maharani"]),
    ("Batu Pahat", &["batu pahat", "bp", "b.p."]),
    ("Kluang", &["kluang"]),
    ("Kota Bharu", &["kota bharu", "kota bahru", "kb", "k.b."]),
    ("Kuala Terengganu", &["kuala terengganu", "kuala trengganu", "kt", "k.t."]),
    ("Kuantan", &["kuantan"]),
    ("Kota Kinabalu", &["kota kinabalu", "kk", "k.k."]),
    ("Sandakan", &["sandakan"]),
    ("Kuching", &["kuching"]),
    ("Miri", &["miri"]),
    ("Sibu", &["sibu"]),
    ("Alor Setar", &["alor setar", "alor star"]),
    ("Sungai Petani", &["sungai petani", "sg petani", "sg. petani"]),
    ("Kangar", &["kangar"]),
    ("Seremban", &["seremban"]),
    ("Port Dickson", &["port dickson", "pd", "p.d."]),
    ("Nilai", &["nilai"]),
    ("Melaka", &["melaka", "malacca", "malaka", "bandaraya melaka"]),
    ("Ayer Keroh", &["ayer keroh", "air keroh"]),
    ("Labuan", &["labuan"]),
];

/// Abbreviated words expanded in city names that match no known city
const CITY_WORDS: &[(&str, &str)] = &[
    ("bdr", "bandar"),
    ("bandr", "bandar"),
    ("tm", "taman"),
    ("kpg", "kampung"),
    ("kg", "kampung"),
    ("bkt", "bukit"),
    ("bt", "batu"),
    ("jln", "jalan"),
    ("sg", "sungai"),
];

const SMALL_WORDS: &[&str] = &["a", "an", "and", "at", "by", "for", "in", "of", "on", "or", "the", "to"];

fn match_key(raw: &str) -> String {
    let spaced: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn contains_words(haystack: &str, needle: &str) -> bool {
    format!(" {haystack} ").contains(&format!(" {needle} "))
}

fn lookup(table: AliasTable, key: &str, contains_min: usize) -> Option<&'static str> {
    let exact = table
        .iter()
        .find(|(_, aliases)| aliases.iter().any(|a| match_key(a) == key));
    let contained = || {
        table.iter().find(|(_, aliases)| {
            aliases.iter().any(|a| {
                let alias = match_key(a);
                alias.len() >= contains_min && contains_words(key, &alias)
            })
        })
    };
    exact.or_else(contained).map(|(canonical, _)| *canonical)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Canonical state name; blank input stays blank
pub fn canonical_state(raw: &str) -> String {
    let key = match_key(raw);
    if key.is_empty() {
        return String::new();
    }
    if let Some(state) = lookup(STATES, &key, STATE_CONTAINS_MIN) {
        return state.to_string();
    }
    raw.split_whitespace()
        .map(|w| match w.to_lowercase().as_str() {
            "wp" => "WP".to_string(),
            "kl" => "KL".to_string(),
            lower => capitalize(lower),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonical city name; blank input stays blank
pub fn canonical_city(raw: &str) -> String {
    let key = match_key(raw);
    if key.is_empty() {
        return String::new();
    }
    if let Some(city) = lookup(CITIES, &key, CITY_CONTAINS_MIN) {
        return city.to_string();
    }
    raw.split_whitespace()
        .enumerate()
        .map(|(i, w)| {
            let lower = w.to_lowercase();
            let bare = lower.trim_end_matches('.');
            let word = CITY_WORDS
                .iter()
                .find(|(abbr, _)| *abbr == bare)
                .map_or(lower.as_str(), |(_, full)| *full);
            if i > 0 && SMALL_WORDS.contains(&word) {
                word.to_string()
            } else {
                capitalize(word)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// `Rendah` or `Menengah` when the level mentions either, otherwise unchanged
pub fn canonical_level(raw: &str) -> String {
    let lower = raw.to_lowercase();
    if lower.contains("rendah") {
        "Rendah".to_string()
    } else if lower.contains("menengah") {
        "Menengah".to_string()
    } else {
        raw.to_string()
    }
}

/// Rewrites location names in place and remembers every rewrite
#[derive(Debug, Default)]
pub struct Canonicalizer {
    changes: NameChanges,
}

impl Canonicalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, record: &mut SchoolRecord) {
        let state = canonical_state(&record.region);
        if state != record.region {
            debug!(from = %record.region, to = %state, "Canonical state");
            self.changes
                .states
                .insert(std::mem::replace(&mut record.region, state.clone()), state);
        }

        let city = canonical_city(&record.city);
        if city != record.city {
            debug!(from = %record.city, to = %city, "Canonical city");
            self.changes
                .cities
                .insert(std::mem::replace(&mut record.city, city.clone()), city);
        }

        record.level = canonical_level(&record.level);
    }

    pub fn into_changes(self) -> NameChanges {
        self.changes
    }
}
