use crate::types::AvailabilityRecord;

pub const URGENT_REPEAT: &str = "⚠️ *URGENT: TICKETS AVAILABLE!* ⚠️";

pub fn monitoring_started(home_short: &str, opponent: &str, interval_minutes: u64) -> String {
    format!(
        "🏏 *Monitoring Started*\nLooking for tickets: {home_short} vs {opponent}\nWill check every {interval_minutes} minutes"
    )
}

pub fn tickets_available(
    home_short: &str,
    opponent: &str,
    record: &AvailabilityRecord,
    ticket_url: &str,
) -> String {
    format!(
        "🚨 *TICKETS NOW AVAILABLE!* 🚨\n\n\
         *Match:* {home_short} vs {opponent}\n\
         *Date:* {}\n\
         *Price:* {}\n\n\
         Hurry! Go book your tickets now!\n\
         {ticket_url}",
        record.match_date.as_deref().unwrap_or("Date not found"),
        record.price.as_deref().unwrap_or("Price not available"),
    )
}

/// The full alert: the detailed message followed by repeats, `count` sends in total.
pub fn alert_sequence(
    home_short: &str,
    opponent: &str,
    record: &AvailabilityRecord,
    ticket_url: &str,
    count: usize,
) -> Vec<String> {
    let mut seq = Vec::with_capacity(count);
    if count == 0 {
        return seq;
    }
    seq.push(tickets_available(home_short, opponent, record, ticket_url));
    seq.extend(std::iter::repeat(URGENT_REPEAT.to_string()).take(count - 1));
    seq
}

pub fn stopped_by_user() -> String {
    "🛑 *Monitoring stopped* by user request.".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> AvailabilityRecord {
        AvailabilityRecord {
            found: true,
            available: true,
            match_date: Some("2025-04-10".to_string()),
            price: Some("₹500-₹2000".to_string()),
            status: None,
            message: "tickets available".to_string(),
        }
    }

    #[test]
    fn alert_sequence_has_detail_then_repeats() {
        let seq = alert_sequence("RCB", "Delhi Capitals", &record(), "https://example.test/ticket", 3);
        assert_eq!(seq.len(), 3);
        assert!(seq[0].contains("*Match:* RCB vs Delhi Capitals"));
        assert!(seq[0].contains("*Date:* 2025-04-10"));
        assert!(seq[0].contains("₹500-₹2000"));
        assert!(seq[0].ends_with("https://example.test/ticket"));
        assert_eq!(seq[1], URGENT_REPEAT);
        assert_eq!(seq[2], URGENT_REPEAT);
    }

    #[test]
    fn missing_fields_use_placeholders() {
        let mut rec = record();
        rec.match_date = None;
        rec.price = None;
        let msg = tickets_available("RCB", "Punjab Kings", &rec, "u");
        assert!(msg.contains("Date not found"));
        assert!(msg.contains("Price not available"));
    }

    #[test]
    fn started_mentions_interval() {
        let msg = monitoring_started("RCB", "Mumbai Indians", 3);
        assert!(msg.contains("RCB vs Mumbai Indians"));
        assert!(msg.contains("every 3 minutes"));
    }
}
