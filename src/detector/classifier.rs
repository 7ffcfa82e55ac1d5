use crate::config::{PURCHASE_LABEL, STATUS_LABELS};
use crate::detector::probe::ListingProbe;
use crate::types::AvailabilityRecord;

/// Turn the raw facts read from the page into an availability record.
///
/// A live purchase action wins over any status label; a listing is never
/// reported both available and unavailable.
pub fn classify(probe: &ListingProbe, opponent: &str) -> AvailabilityRecord {
    if !probe.card_found {
        return AvailabilityRecord::not_found(opponent);
    }

    let match_date = clean(probe.date.as_deref());
    let price = clean(probe.price.as_deref());

    let purchase_live = probe
        .purchase_label
        .as_deref()
        .is_some_and(|label| label.contains(PURCHASE_LABEL));
    if purchase_live {
        return AvailabilityRecord {
            found: true,
            available: true,
            match_date,
            price,
            status: None,
            message: "tickets available".to_string(),
        };
    }

    if let Some(label) = status_label(&probe.button_labels) {
        return AvailabilityRecord {
            found: true,
            available: false,
            match_date,
            price,
            message: format!("Tickets for {opponent} are {label}"),
            status: Some(label),
        };
    }

    AvailabilityRecord {
        found: true,
        available: false,
        match_date,
        price,
        status: None,
        message: "purchase action not found".to_string(),
    }
}

/// First button whose text carries one of the known status labels, trimmed.
fn status_label(labels: &[String]) -> Option<String> {
    labels
        .iter()
        .find(|text| STATUS_LABELS.iter().any(|l| text.contains(l)))
        .map(|text| text.trim().to_string())
}

fn clean(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
