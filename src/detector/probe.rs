use serde::Deserialize;
use serde_json::Value;

use crate::browser::{Extract, NavigationError};
use crate::config::selectors;
use crate::detector::classifier::classify;
use crate::types::AvailabilityRecord;

/// Raw facts about the target listing, as read by the in-page script.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListingProbe {
    pub card_found: bool,
    /// Text of the primary purchase button, if the card has one.
    pub purchase_label: Option<String>,
    /// Text of every button in the card.
    pub button_labels: Vec<String>,
    pub date: Option<String>,
    pub price: Option<String>,
}

/// Finds the `home vs opponent` listing on the ticket page and classifies it.
#[derive(Debug, Clone)]
pub struct AvailabilityExtractor {
    home_team: String,
    opponent: String,
}

impl AvailabilityExtractor {
    pub fn new(home_team: impl Into<String>, opponent: impl Into<String>) -> Self {
        Self {
            home_team: home_team.into(),
            opponent: opponent.into(),
        }
    }

    pub fn opponent(&self) -> &str {
        &self.opponent
    }
}

impl Extract for AvailabilityExtractor {
    type Output = AvailabilityRecord;

    fn script(&self) -> String {
        // Values are embedded as JSON literals so quotes in names stay inert.
        let lit = |s: &str| Value::from(s).to_string();
        format!(
            r#"(() => {{
  const home = {home};
  const opponent = {opponent};
  const card = Array.from(document.querySelectorAll({card}))
    .find((c) => c.textContent.includes(home) && c.textContent.includes(opponent));
  if (!card) return {{ cardFound: false }};
  const text = (el) => (el ? el.textContent : null);
  return {{
    cardFound: true,
    purchaseLabel: text(card.querySelector({buy})),
    buttonLabels: Array.from(card.querySelectorAll("button")).map((b) => b.textContent),
    date: text(card.querySelector({date})),
    price: text(card.querySelector({price})),
  }};
}})()"#,
            home = lit(&self.home_team),
            opponent = lit(&self.opponent),
            card = lit(selectors::MATCH_CARD),
            buy = lit(selectors::BUY_BUTTON),
            date = lit(selectors::MATCH_DATE),
            price = lit(selectors::PRICE),
        )
    }

    fn parse(&self, raw: Value) -> Result<AvailabilityRecord, NavigationError> {
        let probe: ListingProbe = serde_json::from_value(raw)
            .map_err(|e| NavigationError::Evaluation(format!("unexpected probe result: {e}")))?;
        Ok(classify(&probe, &self.opponent))
    }
}
