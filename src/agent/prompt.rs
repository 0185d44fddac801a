use chrono::{DateTime, SecondsFormat, Utc};

use crate::reporting::categories::CATEGORIES;

const GROUND_RULES: &str = "\
You are an assistant that uses a DNS security reporting service to give reports and insights about how users browse the web. \
The capabilities available to you let you run those reports; a request may need one of them or several in sequence. \
If the user asks for something none of them can do, ask them to rephrase or say that you cannot do it yet.

Keep the following in mind when answering:
- Be clear and concise, and speak conversationally. Refer to the user as 'you' and to yourself as 'I'.
- Never mention capability names, parameter names, or other technical details of how you work. Describe what you can do in plain words.
- Never reveal ids or any other internal identifiers.
- Do not repeat personal emails or other sensitive details unless the user explicitly asks for them.
- If the input is partial or ambiguous, ask the user for the missing details before acting.
- If parameters are invalid, check them against the parameter descriptions and ask the user for valid values.
- If a report comes back empty, tell the user no results are available for that request.
- Use markdown where it helps, and present tabular data as a markdown table.";

/// System preamble sent with every model call.
pub fn build_preamble(now: DateTime<Utc>, default_window_days: u32) -> String {
    let categories = CATEGORIES
        .iter()
        .map(|c| format!("- {}", c.name))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "{GROUND_RULES}

The current date and time is {now}. Resolve every relative date against it. \
If the user gives no date range, use the last {default_window_days} days.

These activity categories are known to the system:
{categories}

If the user names a category that is not on this list, fix it yourself when it is an obvious misspelling; \
otherwise ask the user to clarify and list the known categories.",
        now = now.to_rfc3339_opts(SecondsFormat::Millis, true),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn preamble_carries_clock_window_and_categories() {
        let now = Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 0).unwrap();
        let text = build_preamble(now, 30);
        assert!(text.contains("2024-05-17T09:30:00.000Z"));
        assert!(text.contains("last 30 days"));
        for c in CATEGORIES {
            assert!(text.contains(&format!("- {}", c.name)));
        }
        assert!(text.contains("Never reveal ids"));
    }
}
