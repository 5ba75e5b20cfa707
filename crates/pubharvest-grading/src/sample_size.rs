//! Sample-size extraction from abstract text.

use lazy_static::lazy_static;
use regex::Regex;

/// Smallest and largest counts accepted as a plausible study population.
pub const MIN_SAMPLE: u64 = 10;
pub const MAX_SAMPLE: u64 = 50_000_000;

lazy_static! {
    // n = 1,200
    static ref N_EQUALS: Regex =
        Regex::new(r"(?i)\bn\s*=\s*(\d{1,3}(?:,\d{3})+|\d+)").unwrap();

    // 1200 patients
    static ref COUNT_NOUN: Regex = Regex::new(
        r"(?i)(\d{1,3}(?:,\d{3})+|\d+)\s*(?:patients|participants|subjects|individuals|cases|women|men|adults|children)"
    ).unwrap();

    // enrolled 1200
    static ref VERB_COUNT: Regex = Regex::new(
        r"(?i)(?:included|enrolled|recruited|analyzed|analysed|studied)\s*(\d{1,3}(?:,\d{3})+|\d+)"
    ).unwrap();

    // a total of 1200
    static ref TOTAL_OF: Regex =
        Regex::new(r"(?i)(?:total of|sample of)\s*(\d{1,3}(?:,\d{3})+|\d+)").unwrap();
}

/// Largest plausible population count mentioned in `text`, or 0.
pub fn extract_sample_size(text: &str) -> u64 {
    if text.is_empty() {
        return 0;
    }

    [&*N_EQUALS, &*COUNT_NOUN, &*VERB_COUNT, &*TOTAL_OF]
        .iter()
        .flat_map(|re| re.captures_iter(text))
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| m.as_str().replace(',', "").parse::<u64>().ok())
        .filter(|n| (MIN_SAMPLE..=MAX_SAMPLE).contains(n))
        .max()
        .unwrap_or(0)
}
