/// Display labels for the numeric census fields the layer exposes. Labels
/// carrying `($)` select currency formatting (see `format`).
pub const LAYER_ATTRIBUTES: &[(&str, &str)] = &[
    ("POPULATION", "Population"),
    ("FARMS", "Number of Farms"),
    ("ACRES_OPERATED", "Acres Operated"),
    ("CROPLAND_ACRES", "Cropland Acres"),
    ("HARVESTED_ACRES", "Harvested Cropland Acres"),
    ("IRRIGATED_ACRES", "Irrigated Land Acres"),
    ("AVG_FARM_SIZE", "Average Farm Size (Acres)"),
    ("MKTVAL_PRODUCTS", "Market Value of Ag Products Sold ($)"),
    ("MKTVAL_CROPS", "Market Value of Crops Sold ($)"),
    ("MKTVAL_LIVESTOCK", "Market Value of Livestock Sold ($)"),
    ("NET_CASH_INCOME", "Net Cash Farm Income ($)"),
    ("GOVT_PAYMENTS", "Government Payments ($)"),
    ("PRODUCTION_EXPENSES", "Total Production Expenses ($)"),
    ("MEDIAN_HH_INCOME", "Median Household Income ($)"),
    ("HIRED_WORKERS", "Hired Farm Workers"),
    ("PRODUCERS", "Number of Producers"),
];

/// Bookkeeping fields hidden from the attribute list and the info panel.
pub const SKIP_FIELDS: &[&str] = &[
    "OBJECTID",
    "NAME",
    "GEOID",
    "STATE_NAME",
    "STATE_ABBR",
    "STATE_FIPS",
    "COUNTY_FIPS",
    "Shape__Area",
    "Shape__Length",
];

/// Attribute driving the render rule on startup.
pub const DEFAULT_ATTRIBUTE: &str = "POPULATION";

pub fn label_for(key: &str) -> &str {
    LAYER_ATTRIBUTES
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, label)| *label)
        .unwrap_or(key)
}

pub fn keys() -> Vec<&'static str> {
    LAYER_ATTRIBUTES.iter().map(|(k, _)| *k).collect()
}

/// Keys whose label contains `filter`, case-insensitively. An empty filter
/// matches everything.
pub fn matching_keys(filter: &str) -> Vec<&'static str> {
    let needle = filter.to_lowercase();
    LAYER_ATTRIBUTES
        .iter()
        .filter(|(_, label)| label.to_lowercase().contains(&needle))
        .map(|(k, _)| *k)
        .collect()
}
