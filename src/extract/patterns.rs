//! Ordered pattern lists and table-label synonyms per canonical BOL field.

use regex::Regex;

/// Canonical BOL fields, in the order they appear in the extracted map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BolField {
    BolNumber,
    PoNumber,
    Carrier,
    TrailerNumber,
    ShipDate,
    DeliveryDate,
    Origin,
    Destination,
    Weight,
    ItemCount,
}

/// Semantic role of a date match, decided by its context window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateClass {
    Ship,
    Delivery,
}

/// Semantic role of a location match, decided by its context window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationClass {
    Origin,
    Destination,
}

/// Compiled pattern sets for the extraction cascade.
///
/// Per field: an ordered regex list, most specific first; the cascade takes
/// the first non-empty capture. Date and location values share generic value
/// patterns and are disambiguated afterwards by their preceding context
/// window. All patterns capture the raw value in group 1; name-like value
/// classes deliberately exclude `\n` so captures never cross lines.
pub struct PatternLibrary {
    pub bol_number: Vec<Regex>,
    pub po_number: Vec<Regex>,
    pub carrier: Vec<Regex>,
    pub trailer_number: Vec<Regex>,
    pub weight: Vec<Regex>,
    pub item_count: Vec<Regex>,
    /// Bare date literal, classified by context window
    pub date_value: Regex,
    /// Labeled location value, classified by context window
    pub location_value: Regex,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("Invalid regex pattern"))
        .collect()
}

impl PatternLibrary {
    pub fn new() -> Self {
        Self {
            bol_number: compile(&[
                // Fully labeled forms first so they win over the bare "BOL:" form
                // regardless of where each appears in the text
                r"(?i)\bBOL\s*(?:#|Number|No\.?|NUM)\s*[:=]?\s*([A-Z0-9-]{6,20})",
                r"(?i)\b(?:Bill\s+of\s+Lading|B/L)\s*(?:#|Number|No\.?|NUM)?\s*[:=]?\s*([A-Z0-9-]{6,20})",
                r"(?i)\bBOL\s*[:#=]\s*([A-Z0-9-]{4,20})",
                r"(?i)\b(?:SHIPMENT|TRACKING)\s*(?:#|Number|No\.?)?\s*[:=]?\s*([A-Z0-9-]{6,20})",
                // Standalone fallbacks, e.g. HZL-123456 or a long numeric run
                r"\b([A-Z]{3,4}-?[0-9]{6,10})\b",
                r"\b([0-9]{10,12})\b",
            ]),
            po_number: compile(&[
                r"(?i)\b(?:Purchase\s+Order|P\.O\.|PO)\s*(?:#|Number|No\.?|NUM)?\s*[:=]\s*([A-Z0-9-]{3,20})",
                r"(?i)\b(?:Purchase\s+Order|P\.O\.|PO)\s*#\s*([A-Z0-9-]{3,20})",
            ]),
            carrier: compile(&[
                r"(?i)\b(?:Carrier|CARR|Transport(?:er)?)\s*(?:Name)?\s*[:=]\s*([A-Za-z0-9][A-Za-z0-9 &.,'-]{2,49})",
                r"(?i)\b(?:SCAC|Carrier\s+Code)\s*[:=]?\s*([A-Z]{2,4})\b",
            ]),
            trailer_number: compile(&[
                r"(?i)\b(?:Trailer|TRLR)\s*(?:#|Number|No\.?)?\s*[:=]\s*([A-Z0-9-]{2,15})",
                r"(?i)\b(?:Trailer|TRLR)\s*#\s*([A-Z0-9-]{2,15})",
            ]),
            weight: compile(&[
                // Raw string including any unit; no normalization happens downstream
                r"(?i)\b(?:Gross\s+Weight|Net\s+Weight|Total\s+Weight|Weight|Wt)\s*[:=]?\s*([0-9][0-9,.]*(?:\s*(?:lbs?|kgs?|pounds|kilograms))?)",
            ]),
            item_count: compile(&[
                r"(?i)\b(?:Pieces|Pallets|Cases|Cartons|Quantity|Qty|Units|Item\s+Count)\s*[:=]?\s*([0-9]{1,6})\b",
            ]),
            date_value: Regex::new(r"\b(\d{1,2}[-/]\d{1,2}[-/]\d{2,4})\b")
                .expect("Invalid regex pattern"),
            location_value: Regex::new(
                r"(?i)\b(?:Origin|Ship\s*From|From|Pickup|Shipper|Destination|Ship\s*To|Deliver\s*To|Consignee|To)\s*[:#=]\s*([A-Za-z0-9][A-Za-z0-9 &.,'-]{2,59})",
            )
            .expect("Invalid regex pattern"),
        }
    }

    /// Ordered cascade for a field resolved purely by its pattern list
    pub fn cascade(&self, field: BolField) -> Option<&[Regex]> {
        match field {
            BolField::BolNumber => Some(&self.bol_number),
            BolField::PoNumber => Some(&self.po_number),
            BolField::Carrier => Some(&self.carrier),
            BolField::TrailerNumber => Some(&self.trailer_number),
            BolField::Weight => Some(&self.weight),
            BolField::ItemCount => Some(&self.item_count),
            // Dates and locations go through context-window classification
            BolField::ShipDate
            | BolField::DeliveryDate
            | BolField::Origin
            | BolField::Destination => None,
        }
    }

    /// Table-fallback label synonyms per field (matched by case-insensitive
    /// substring containment against column 0)
    pub fn table_synonyms(field: BolField) -> &'static [&'static str] {
        match field {
            BolField::BolNumber => &["bol", "bill of lading", "b/l", "shipment"],
            BolField::PoNumber => &["po", "p.o", "purchase order"],
            BolField::Carrier => &["carrier", "scac", "transport"],
            BolField::TrailerNumber => &["trailer", "trlr"],
            BolField::ShipDate => &["ship date", "shipped", "pickup date"],
            BolField::DeliveryDate => &["delivery date", "deliver", "due date", "eta"],
            BolField::Origin => &["origin", "ship from", "from", "pickup"],
            BolField::Destination => &["destination", "ship to", "deliver to", "consignee"],
            BolField::Weight => &["weight", "wt"],
            BolField::ItemCount => &["pieces", "pallets", "qty", "quantity", "count", "units"],
        }
    }
}

impl Default for PatternLibrary {
    fn default() -> Self {
        Self::new()
    }
}

/// Classify a date match by the keywords in the text preceding it
pub fn classify_date(window: &str) -> Option<DateClass> {
    let w = window.to_lowercase();
    if w.contains("ship") || w.contains("pickup") {
        Some(DateClass::Ship)
    } else if w.contains("deliver")
        || w.contains("due")
        || w.contains("eta")
        || w.contains("expected")
        || w.contains("arriv")
    {
        Some(DateClass::Delivery)
    } else {
        None
    }
}

/// Classify a location match by the keywords in the text preceding it.
///
/// Destination keywords are checked first so "Ship To" is not swallowed by
/// the bare "from"/"to" words; those two are matched as whole words to avoid
/// substring traps ("to" occurs inside "destination").
pub fn classify_location(window: &str) -> Option<LocationClass> {
    let w = window.to_lowercase();
    let has_word = |kw: &str| {
        w.split(|c: char| !c.is_ascii_alphanumeric())
            .any(|word| word == kw)
    };

    if w.contains("destination")
        || w.contains("consignee")
        || w.contains("deliver")
        || w.contains("ship to")
        || has_word("to")
    {
        Some(LocationClass::Destination)
    } else if w.contains("origin")
        || w.contains("pickup")
        || w.contains("shipper")
        || w.contains("ship from")
        || has_word("from")
    {
        Some(LocationClass::Origin)
    } else {
        None
    }
}
