use crate::types::AttributeOption;
use std::sync::OnceLock;

/// Sentinel tokens an attribute's `default_options` can carry instead of an
/// inline list. Stored metadata keeps the token; reads expand it.
pub const COUNTRIES_SENTINEL: &str = "$countries";
pub const LANGUAGES_SENTINEL: &str = "$languages";

const COUNTRY_NAMES: &[&str] = &[
    "Afghanistan", "Albania", "Algeria", "Argentina", "Armenia", "Australia",
    "Austria", "Azerbaijan", "Bahrain", "Bangladesh", "Belarus", "Belgium",
    "Bolivia", "Bosnia and Herzegovina", "Brazil", "Bulgaria", "Cambodia",
    "Cameroon", "Canada", "Chile", "China", "Colombia", "Costa Rica",
    "Croatia", "Cuba", "Cyprus", "Czech Republic", "Denmark",
    "Dominican Republic", "Ecuador", "Egypt", "El Salvador", "Estonia",
    "Ethiopia", "Finland", "France", "Georgia", "Germany", "Ghana", "Greece",
    "Guatemala", "Honduras", "Hong Kong", "Hungary", "Iceland", "India",
    "Indonesia", "Iran", "Iraq", "Ireland", "Israel", "Italy", "Ivory Coast",
    "Jamaica", "Japan", "Jordan", "Kazakhstan", "Kenya", "Kuwait", "Latvia",
    "Lebanon", "Libya", "Lithuania", "Luxembourg", "Malaysia", "Malta",
    "Mexico", "Moldova", "Monaco", "Mongolia", "Montenegro", "Morocco",
    "Myanmar", "Nepal", "Netherlands", "New Zealand", "Nicaragua", "Nigeria",
    "North Macedonia", "Norway", "Oman", "Pakistan", "Panama", "Paraguay",
    "Peru", "Philippines", "Poland", "Portugal", "Qatar", "Romania",
    "Russia", "Saudi Arabia", "Senegal", "Serbia", "Singapore", "Slovakia",
    "Slovenia", "South Africa", "South Korea", "Spain", "Sri Lanka",
    "Sweden", "Switzerland", "Syria", "Taiwan", "Tanzania", "Thailand",
    "Tunisia", "Turkey", "Uganda", "Ukraine", "United Arab Emirates",
    "United Kingdom", "United States", "Uruguay", "Uzbekistan", "Venezuela",
    "Vietnam", "Yemen", "Zambia", "Zimbabwe",
];

const LANGUAGE_NAMES: &[&str] = &[
    "Arabic", "Bengali", "Bulgarian", "Cantonese", "Croatian", "Czech",
    "Danish", "Dutch", "English", "Estonian", "Farsi", "Finnish", "French",
    "German", "Greek", "Hebrew", "Hindi", "Hungarian", "Indonesian",
    "Italian", "Japanese", "Korean", "Latvian", "Lithuanian", "Malay",
    "Mandarin", "Norwegian", "Polish", "Portuguese", "Punjabi", "Romanian",
    "Russian", "Serbian", "Slovak", "Slovenian", "Spanish", "Swahili",
    "Swedish", "Tagalog", "Tamil", "Thai", "Turkish", "Ukrainian", "Urdu",
    "Vietnamese",
];

fn countries() -> &'static Vec<AttributeOption> {
    static CACHE: OnceLock<Vec<AttributeOption>> = OnceLock::new();
    CACHE.get_or_init(|| {
        COUNTRY_NAMES
            .iter()
            .map(|n| AttributeOption::Plain((*n).to_string()))
            .collect()
    })
}

fn languages() -> &'static Vec<AttributeOption> {
    static CACHE: OnceLock<Vec<AttributeOption>> = OnceLock::new();
    CACHE.get_or_init(|| {
        LANGUAGE_NAMES
            .iter()
            .map(|n| AttributeOption::Plain((*n).to_string()))
            .collect()
    })
}

/// Expand reference-list sentinels in an option list. Non-sentinel entries
/// pass through unchanged, in order.
pub fn resolve_options(options: &[AttributeOption]) -> Vec<AttributeOption> {
    let mut resolved = Vec::with_capacity(options.len());
    for option in options {
        match option {
            AttributeOption::Plain(token) if token == COUNTRIES_SENTINEL => {
                resolved.extend(countries().iter().cloned());
            }
            AttributeOption::Plain(token) if token == LANGUAGES_SENTINEL => {
                resolved.extend(languages().iter().cloned());
            }
            other => resolved.push(other.clone()),
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countries_sentinel_expands() {
        let options = vec![AttributeOption::Plain("$countries".into())];
        let resolved = resolve_options(&options);
        assert_eq!(resolved.len(), COUNTRY_NAMES.len());
        assert!(resolved.contains(&AttributeOption::Plain("France".into())));
    }

    #[test]
    fn inline_options_pass_through_around_sentinel() {
        let options = vec![
            AttributeOption::Plain("Other".into()),
            AttributeOption::Plain("$languages".into()),
        ];
        let resolved = resolve_options(&options);
        assert_eq!(resolved[0], AttributeOption::Plain("Other".into()));
        assert_eq!(resolved.len(), 1 + LANGUAGE_NAMES.len());
    }

    #[test]
    fn plain_list_is_unchanged() {
        let options = vec![
            AttributeOption::Plain("Yes".into()),
            AttributeOption::Plain("No".into()),
        ];
        assert_eq!(resolve_options(&options), options);
    }
}
