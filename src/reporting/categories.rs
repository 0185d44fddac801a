//! Activity categories the reporting API filters on.

use super::Rejection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Category {
    /// Display name, as users say it.
    pub name: &'static str,
    pub codes: &'static [u32],
}

pub const CATEGORIES: &[Category] = &[
    Category { name: "CTR", codes: &[85] },
    Category { name: "Command and Control", codes: &[64, 65] },
    Category { name: "Cryptomining", codes: &[150] },
    Category { name: "DNS Tunneling VPN", codes: &[110] },
    Category { name: "Dynamic DNS", codes: &[61] },
    Category { name: "Malware", codes: &[66] },
    Category { name: "Newly Seen Domains", codes: &[108] },
    Category { name: "Phishing", codes: &[68] },
    Category { name: "Potentially Harmful", codes: &[109] },
    Category { name: "Secure X", codes: &[87] },
    Category { name: "Adult", codes: &[161] },
    Category { name: "Advertisements", codes: &[27] },
    Category { name: "Alcohol", codes: &[1] },
    Category { name: "Animals and Pets", codes: &[19] },
    Category { name: "Arts", codes: &[111] },
    Category { name: "Astrology", codes: &[112] },
    Category { name: "Auctions", codes: &[2] },
];

pub fn lookup(name: &str) -> Option<&'static Category> {
    let needle = name.trim();
    CATEGORIES.iter().find(|c| c.name.eq_ignore_ascii_case(needle))
}

/// Lowercased names joined for error messages.
pub fn known_names() -> String {
    CATEGORIES
        .iter()
        .map(|c| c.name.to_lowercase())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Maps a comma-separated category list to API codes. Every entry must be known.
pub fn resolve_codes(list: &str) -> Result<Vec<u32>, Rejection> {
    let mut codes = Vec::new();
    for token in list.split(',') {
        let Some(category) = lookup(token) else {
            return Err(Rejection::new(format!(
                "Invalid categories provided. Please provide one or more of the following: {}",
                known_names()
            )));
        };
        codes.extend_from_slice(category.codes);
    }
    Ok(codes)
}
