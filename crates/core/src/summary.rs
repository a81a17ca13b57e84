//! View-model shaping over fetched rows.
//!
//! Pure functions used by page renderers: display names, listing captions,
//! calendar day counts and boxplot statistics.

use std::collections::{BTreeMap, HashSet};
use time::Date;
use time::macros::format_description;

/// Experiment names are stored slugged ("root-growth-2023"); display them as
/// "Root growth 2023".
pub fn display_name(name: &str) -> String {
    let spaced = name.replace('-', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Truncate to `max_chars` characters, appending "..." when anything was cut.
pub fn truncate_description(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// "N accessions", counting distinct names.
pub fn accession_count<'a, I>(names: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let distinct: HashSet<&str> = names.into_iter().collect();
    format!("{} accessions", distinct.len())
}

/// "N replicates".
pub fn replicate_count(plants: usize) -> String {
    format!("{plants} replicates")
}

/// "1 experiment" / "N experiments".
pub fn experiment_count(n: usize) -> String {
    let suffix = if n == 1 { "" } else { "s" };
    format!("{n} experiment{suffix}")
}

/// Parse the leading `YYYY-MM-DD` of a stored date or timestamp.
pub fn parse_day(value: &str) -> Option<Date> {
    let day = value.get(..10)?;
    Date::parse(day, format_description!("[year]-[month]-[day]")).ok()
}

/// Total counts per calendar day, in date order.
///
/// Rows whose date cannot be parsed are skipped.
pub fn calendar_counts<'a, I>(rows: I) -> Vec<(Date, i64)>
where
    I: IntoIterator<Item = (&'a str, i64)>,
{
    let mut days: BTreeMap<Date, i64> = BTreeMap::new();
    for (date, count) in rows {
        if let Some(day) = parse_day(date) {
            *days.entry(day).or_default() += count;
        }
    }
    days.into_iter().collect()
}

/// Five-number summary plus 1.5 IQR whiskers.
#[derive(Clone, Debug, PartialEq)]
pub struct BoxplotStats {
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub lower_whisker: f64,
    pub upper_whisker: f64,
}

impl BoxplotStats {
    /// Compute statistics; `None` for an empty input. NaNs are ignored.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);

        let q1 = quantile(&sorted, 0.25);
        let median = quantile(&sorted, 0.5);
        let q3 = quantile(&sorted, 0.75);
        let iqr = q3 - q1;

        Some(Self {
            count: sorted.len(),
            min: sorted[0],
            q1,
            median,
            q3,
            max: sorted[sorted.len() - 1],
            lower_whisker: q1 - 1.5 * iqr,
            upper_whisker: q3 + 1.5 * iqr,
        })
    }
}

/// Linear-interpolated quantile over sorted, non-empty values.
fn quantile(sorted: &[f64], p: f64) -> f64 {
    let pos = (sorted.len() - 1) as f64 * p;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("root-growth-2023"), "Root growth 2023");
        assert_eq!(display_name("already Fine"), "Already Fine");
        assert_eq!(display_name(""), "");
    }

    #[test]
    fn test_truncate_description() {
        let long = "x".repeat(120);
        let truncated = truncate_description(&long, 100);
        assert_eq!(truncated.len(), 103);
        assert!(truncated.ends_with("..."));

        assert_eq!(truncate_description("short", 100), "short");
        assert_eq!(truncate_description(&"y".repeat(100), 100), "y".repeat(100));
        // multi-byte characters are not split
        assert_eq!(truncate_description("ééé", 2), "éé...");
    }

    #[test]
    fn test_listing_captions() {
        assert_eq!(
            accession_count(["Col-0", "PI458606", "Col-0"]),
            "2 accessions"
        );
        assert_eq!(replicate_count(12), "12 replicates");
        assert_eq!(experiment_count(1), "1 experiment");
        assert_eq!(experiment_count(0), "0 experiments");
    }

    #[test]
    fn test_calendar_counts_merges_days() {
        let rows = vec![
            ("2023-05-02", 10),
            ("2023-05-01T12:00:00+00:00", 3),
            ("2023-05-02", 5),
            ("not a date", 100),
        ];
        let counts = calendar_counts(rows.iter().map(|(d, c)| (*d, *c)));
        assert_eq!(
            counts,
            vec![(date!(2023 - 05 - 01), 3), (date!(2023 - 05 - 02), 15)]
        );
    }

    #[test]
    fn test_boxplot_stats() {
        let stats = BoxplotStats::from_values(&[4.0, 1.0, 3.0, 2.0, 5.0]).unwrap();
        assert_eq!(stats.count, 5);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.q1, 2.0);
        assert_eq!(stats.median, 3.0);
        assert_eq!(stats.q3, 4.0);
        assert_eq!(stats.max, 5.0);
        assert_eq!(stats.lower_whisker, -1.0);
        assert_eq!(stats.upper_whisker, 7.0);
    }

    #[test]
    fn test_boxplot_interpolates() {
        let stats = BoxplotStats::from_values(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(stats.median, 2.5);
        assert_eq!(stats.q1, 1.75);
        assert_eq!(stats.q3, 3.25);
    }

    #[test]
    fn test_boxplot_empty() {
        assert!(BoxplotStats::from_values(&[]).is_none());
        assert!(BoxplotStats::from_values(&[f64::NAN]).is_none());
    }
}
