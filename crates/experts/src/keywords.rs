use regex::Regex;
use std::sync::LazyLock;

pub const MAP_TERMS: &[&str] = &["map", "carte", "géologique"];

pub const FIGURE_TERMS: &[&str] = &["figure", "fig."];

pub const TABLE_TERMS: &[&str] = &["table", "tableau", "data", "analysis"];

pub const SPATIAL_TERMS: &[&str] = &[
    "location",
    "coordinate",
    "latitude",
    "longitude",
    "outcrop",
    "deposit",
    "prospect",
    "fault",
    "formation",
    "mine",
    "zone",
];

pub const GEOCHEM_TERMS: &[&str] = &[
    "geochemical",
    "géochimique",
    "chemical",
    "composition",
    "assay",
    "ppm",
    "ppb",
    "g/t",
    "wt%",
    "oxide",
    "trace element",
    "major element",
    "rare earth",
    "tholeiitic",
    "calc-alkaline",
];

// Case-sensitive whole words, so "Au" matches but "auger" does not
static ELEMENT_SYMBOL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(Au|Ag|Cu|Pb|Zn|Ni|Cr|Mo|Sn|Sb|Bi|Pt|Pd|Li|Zr|Nb|REE|SiO2|Al2O3|Fe2O3|FeO|MgO|CaO|Na2O|K2O|TiO2|P2O5)\b",
    )
    .expect("static regex")
});

pub fn contains_any(lowercase_text: &str, terms: &[&str]) -> bool {
    terms.iter().any(|term| lowercase_text.contains(term))
}

pub fn has_geochem_signal(text: &str) -> bool {
    contains_any(&text.to_lowercase(), GEOCHEM_TERMS) || ELEMENT_SYMBOL.is_match(text)
}

pub fn has_spatial_signal(text: &str) -> bool {
    let lower = text.to_lowercase();
    contains_any(&lower, MAP_TERMS)
        || contains_any(&lower, FIGURE_TERMS)
        || contains_any(&lower, SPATIAL_TERMS)
}

pub fn has_table_signal(text: &str) -> bool {
    contains_any(
        &text.to_lowercase(),
        &["table", "tableau", "data", "sample", "analysis", "coordinate"],
    )
}
